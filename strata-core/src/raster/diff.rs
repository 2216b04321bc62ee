//! # Image diffs
//!
//! Capture the minimal rectangle that differs between two equally-sized buffers, and write it back later.
//! Writing a diff hands back the pixels it overwrote, so a diff and its result form a self-inverting pair:
//! history only ever needs to store one of them at a time.

use crate::util::{DimensionMismatch, Rect, Size};

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum DiffError {
    #[error(transparent)]
    DimensionMismatch(#[from] DimensionMismatch),
    #[error("region {rect:?} lies outside of the {size} buffer")]
    OutOfBounds { rect: Rect, size: Size },
}

/// Controls when to skip the bounding box and record the entire frame instead.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct DiffPolicy {
    /// If the changed area covers at least this fraction of the buffer, a full frame is stored.
    /// Values above 1.0 disable the fallback.
    pub full_frame_ratio: f32,
}
impl Default for DiffPolicy {
    fn default() -> Self {
        Self {
            full_frame_ratio: 0.75,
        }
    }
}
impl DiffPolicy {
    /// Always store full frames, e.g. for global filters where every pixel is expected to change.
    pub const FULL_FRAME: Self = Self {
        full_frame_ratio: 0.0,
    };
    /// Never store full frames.
    pub const TIGHT: Self = Self {
        full_frame_ratio: f32::INFINITY,
    };
    fn prefers_full_frame(&self, changed: Rect, size: Size) -> bool {
        // Precision loss is irrelevant at these magnitudes.
        #[allow(clippy::cast_precision_loss)]
        let ratio = changed.area() as f64 / size.area().max(1) as f64;
        ratio >= f64::from(self.full_frame_ratio)
    }
}

#[derive(Clone, PartialEq)]
pub enum ImageDiff {
    /// New contents for a sub-rectangle of the buffer.
    Region {
        rect: Rect,
        pixels: image::RgbaImage,
    },
    /// New contents for the whole buffer.
    Full(image::RgbaImage),
}
impl std::fmt::Debug for ImageDiff {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Region { rect, .. } => f.debug_struct("Region").field("rect", rect).finish(),
            Self::Full(image) => f
                .debug_tuple("Full")
                .field(&Size::of_image(image))
                .finish(),
        }
    }
}

/// Find the tight bounding rectangle of every pixel that differs, or None if the buffers are identical.
pub fn changed_rect(
    before: &image::RgbaImage,
    after: &image::RgbaImage,
) -> Result<Option<Rect>, DimensionMismatch> {
    let size = Size::of_image(before);
    size.expect(Size::of_image(after))?;
    let width = size.width as usize;
    if width == 0 {
        return Ok(None);
    }
    let before_px: &[[u8; 4]] = bytemuck::cast_slice(before.as_raw());
    let after_px: &[[u8; 4]] = bytemuck::cast_slice(after.as_raw());

    let mut min = [u32::MAX; 2];
    let mut max = [0u32; 2];
    for (y, (row_a, row_b)) in before_px
        .chunks_exact(width)
        .zip(after_px.chunks_exact(width))
        .enumerate()
    {
        // Cheap whole-row reject first.
        if row_a == row_b {
            continue;
        }
        let differs = |(a, b): (&[u8; 4], &[u8; 4])| a != b;
        // Rows differ, so both searches succeed.
        let first = row_a.iter().zip(row_b).position(differs).unwrap_or(0);
        let last = row_a.iter().zip(row_b).rposition(differs).unwrap_or(first);
        let (first, last, y) = (first as u32, last as u32, y as u32);
        min = [min[0].min(first), min[1].min(y)];
        max = [max[0].max(last + 1), max[1].max(y + 1)];
    }
    Ok((min[0] != u32::MAX).then(|| Rect::from_corners(min, max)))
}

/// Diff two buffers with the default policy, producing the "after" pixels of the changed region.
pub fn diff(
    before: &image::RgbaImage,
    after: &image::RgbaImage,
) -> Result<Option<ImageDiff>, DimensionMismatch> {
    diff_with(before, after, DiffPolicy::default())
}

/// Diff two buffers, producing the "after" pixels of the changed region, or None if identical.
pub fn diff_with(
    before: &image::RgbaImage,
    after: &image::RgbaImage,
    policy: DiffPolicy,
) -> Result<Option<ImageDiff>, DimensionMismatch> {
    let Some(rect) = changed_rect(before, after)? else {
        return Ok(None);
    };
    if policy.prefers_full_frame(rect, Size::of_image(after)) {
        Ok(Some(ImageDiff::Full(after.clone())))
    } else {
        // Unwrap-free: rect was computed from `after`'s own dimensions.
        Ok(Some(ImageDiff::Region {
            rect,
            pixels: crop(after, rect),
        }))
    }
}

fn crop(source: &image::RgbaImage, rect: Rect) -> image::RgbaImage {
    image::imageops::crop_imm(source, rect.x, rect.y, rect.width, rect.height).to_image()
}

impl ImageDiff {
    /// A diff holding all of `source`.
    #[must_use]
    pub fn full(source: &image::RgbaImage) -> Self {
        Self::Full(source.clone())
    }
    /// A diff holding `rect` of `source`.
    pub fn extract(source: &image::RgbaImage, rect: Rect) -> Result<Self, DiffError> {
        let size = Size::of_image(source);
        if !rect.fits_within(size) {
            return Err(DiffError::OutOfBounds { rect, size });
        }
        Ok(Self::Region {
            rect,
            pixels: crop(source, rect),
        })
    }
    /// Capture the same area as this diff, but from a different buffer.
    pub fn recapture(&self, source: &image::RgbaImage) -> Result<Self, DiffError> {
        match self {
            Self::Region { rect, .. } => Self::extract(source, *rect),
            Self::Full(pixels) => {
                Size::of_image(pixels).expect(Size::of_image(source))?;
                Ok(Self::full(source))
            }
        }
    }
    /// The area of the buffer this diff overwrites.
    #[must_use]
    pub fn rect(&self) -> Rect {
        match self {
            Self::Region { rect, .. } => *rect,
            Self::Full(pixels) => Rect::of_size(Size::of_image(pixels)),
        }
    }
    #[must_use]
    pub fn is_full_frame(&self) -> bool {
        matches!(self, Self::Full(_))
    }
    /// Approximate heap usage.
    #[must_use]
    pub fn byte_size(&self) -> usize {
        match self {
            Self::Region { pixels, .. } | Self::Full(pixels) => pixels.as_raw().len(),
        }
    }
    /// Check that this diff can be written into a buffer of the given size.
    pub fn check_fits(&self, size: Size) -> Result<(), DiffError> {
        match self {
            Self::Region { rect, .. } => {
                if rect.fits_within(size) {
                    Ok(())
                } else {
                    Err(DiffError::OutOfBounds { rect: *rect, size })
                }
            }
            Self::Full(pixels) => Ok(size.expect(Size::of_image(pixels))?),
        }
    }
    /// Write this diff into `buffer`, returning a diff of the pixels that were overwritten.
    /// On error, `buffer` is untouched.
    pub fn apply_and_capture(&self, buffer: &mut image::RgbaImage) -> Result<Self, DiffError> {
        self.check_fits(Size::of_image(buffer))?;
        match self {
            Self::Region { rect, pixels } => {
                let previous = crop(buffer, *rect);
                image::imageops::replace(buffer, pixels, i64::from(rect.x), i64::from(rect.y));
                Ok(Self::Region {
                    rect: *rect,
                    pixels: previous,
                })
            }
            Self::Full(pixels) => Ok(Self::Full(std::mem::replace(buffer, pixels.clone()))),
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use image::{Rgba, RgbaImage};

    fn checker(width: u32, height: u32) -> RgbaImage {
        RgbaImage::from_fn(width, height, |x, y| {
            let v = if (x + y) % 2 == 0 { 255 } else { 0 };
            Rgba([v, v, v, 255])
        })
    }
    #[test]
    fn identical_is_none() {
        let a = checker(32, 16);
        let b = a.clone();
        assert_eq!(diff(&a, &b).unwrap(), None);
    }
    #[test]
    fn tight_rect() {
        let a = checker(32, 16);
        let mut b = a.clone();
        b.put_pixel(4, 3, Rgba([1, 2, 3, 4]));
        b.put_pixel(10, 7, Rgba([1, 2, 3, 4]));
        assert_eq!(changed_rect(&a, &b).unwrap(), Some(Rect::new(4, 3, 7, 5)));

        let diff = diff(&a, &b).unwrap().unwrap();
        assert_eq!(diff.rect(), Rect::new(4, 3, 7, 5));
        assert!(!diff.is_full_frame());
    }
    #[test]
    fn mismatched() {
        assert!(diff(&checker(4, 4), &checker(4, 5)).is_err());
    }
    #[test]
    fn full_frame_when_mostly_changed() {
        let a = checker(8, 8);
        let b = RgbaImage::from_pixel(8, 8, Rgba([9, 9, 9, 9]));
        let diff = diff(&a, &b).unwrap().unwrap();
        assert!(diff.is_full_frame());
        let tight = diff_with(&a, &b, DiffPolicy::TIGHT).unwrap().unwrap();
        assert!(!tight.is_full_frame());
    }
    #[test]
    fn self_inverting_chain() {
        let original = checker(20, 20);
        let mut edited = original.clone();
        for x in 5..9 {
            edited.put_pixel(x, 6, Rgba([200, 0, 0, 255]));
        }
        let forward = diff(&original, &edited).unwrap().unwrap();

        let mut buffer = original.clone();
        let backward = forward.apply_and_capture(&mut buffer).unwrap();
        assert_eq!(buffer, edited);
        let forward_again = backward.apply_and_capture(&mut buffer).unwrap();
        assert_eq!(buffer, original);
        assert_eq!(forward_again, forward);
    }
    #[test]
    fn out_of_bounds_untouched() {
        let diff = ImageDiff::extract(&checker(10, 10), Rect::new(5, 5, 5, 5)).unwrap();
        let mut small = checker(6, 6);
        let copy = small.clone();
        assert!(matches!(
            diff.apply_and_capture(&mut small),
            Err(DiffError::OutOfBounds { .. })
        ));
        assert_eq!(small, copy);
    }
}
