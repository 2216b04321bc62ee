//! # Selection
//!
//! A per-pixel boolean mask over the canvas plane, independent of any layer. Stored as a byte
//! mask where `0` is unselected and `255` is selected - any other value is normalized away on
//! construction, so the mask is always strictly binary.
//!
//! Every mutator takes a [`CombineMode`], describing how the new region merges with the old.

pub mod contour;
mod shapes;
mod wand;

pub use contour::Contour;

use crate::util::{DimensionMismatch, Rect, Size};

const SELECTED: u8 = 255;

/// How a freshly described region merges into an existing selection.
#[derive(
    strum::AsRefStr,
    strum::EnumIter,
    Copy,
    Clone,
    PartialEq,
    Eq,
    Hash,
    Debug,
    Default,
    serde::Serialize,
    serde::Deserialize,
)]
pub enum CombineMode {
    /// Discard the old selection entirely.
    #[default]
    New,
    /// Union.
    Add,
    /// Old minus new.
    Subtract,
    /// Keep only the overlap.
    Intersect,
    /// Symmetric difference.
    Xor,
}
impl CombineMode {
    #[must_use]
    pub fn combine(self, old: bool, new: bool) -> bool {
        match self {
            Self::New => new,
            Self::Add => old || new,
            Self::Subtract => old && !new,
            Self::Intersect => old && new,
            Self::Xor => old != new,
        }
    }
}

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum SelectionError {
    #[error(transparent)]
    DimensionMismatch(#[from] DimensionMismatch),
    #[error("pixel ({x}, {y}) lies outside of the {size} canvas")]
    OutOfBounds { x: u32, y: u32, size: Size },
}

#[derive(Clone, PartialEq, Eq)]
pub struct Selection {
    mask: image::GrayImage,
}
impl Selection {
    /// An empty selection of the given size.
    #[must_use]
    pub fn new(size: Size) -> Self {
        Self {
            mask: image::GrayImage::new(size.width, size.height),
        }
    }
    /// Every pixel selected.
    #[must_use]
    pub fn full(size: Size) -> Self {
        Self {
            mask: image::GrayImage::from_pixel(size.width, size.height, image::Luma([SELECTED])),
        }
    }
    /// Wrap a byte mask. Any nonzero byte counts as selected.
    #[must_use]
    pub fn from_mask(mut mask: image::GrayImage) -> Self {
        for byte in mask.iter_mut() {
            if *byte != 0 {
                *byte = SELECTED;
            }
        }
        Self { mask }
    }
    /// Build from a predicate over pixel coordinates.
    pub fn from_fn(size: Size, mut selected: impl FnMut(u32, u32) -> bool) -> Self {
        Self {
            mask: image::GrayImage::from_fn(size.width, size.height, |x, y| {
                image::Luma([if selected(x, y) { SELECTED } else { 0 }])
            }),
        }
    }
    #[must_use]
    pub fn size(&self) -> Size {
        Size::of_image(&self.mask)
    }
    #[must_use]
    pub fn mask(&self) -> &image::GrayImage {
        &self.mask
    }
    #[must_use]
    pub fn into_mask(self) -> image::GrayImage {
        self.mask
    }
    /// Raw mask bytes, row-major, one per pixel.
    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        self.mask.as_raw()
    }
    /// Is the given pixel selected? Out of bounds pixels never are.
    #[must_use]
    pub fn contains(&self, x: u32, y: u32) -> bool {
        x < self.mask.width() && y < self.mask.height() && self.mask.get_pixel(x, y).0[0] != 0
    }
    /// Like [`Self::contains`], for coordinates that may be negative.
    pub(crate) fn contains_signed(&self, x: i64, y: i64) -> bool {
        match (u32::try_from(x), u32::try_from(y)) {
            (Ok(x), Ok(y)) => self.contains(x, y),
            _ => false,
        }
    }
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.mask.iter().all(|&byte| byte == 0)
    }
    /// Number of selected pixels.
    #[must_use]
    pub fn count(&self) -> usize {
        self.mask.iter().filter(|&&byte| byte != 0).count()
    }
    /// Tight bounding box of the selected pixels, or None if empty.
    #[must_use]
    pub fn bounds(&self) -> Option<Rect> {
        let width = self.mask.width() as usize;
        if width == 0 {
            return None;
        }
        let mut min = [u32::MAX; 2];
        let mut max = [0u32; 2];
        for (y, row) in self.mask.as_raw().chunks_exact(width).enumerate() {
            let Some(first) = row.iter().position(|&byte| byte != 0) else {
                continue;
            };
            let last = row.iter().rposition(|&byte| byte != 0).unwrap_or(first);
            let (first, last, y) = (first as u32, last as u32, y as u32);
            min = [min[0].min(first), min[1].min(y)];
            max = [max[0].max(last + 1), max[1].max(y + 1)];
        }
        (min[0] != u32::MAX).then(|| Rect::from_corners(min, max))
    }
    pub fn select_all(&mut self) {
        self.mask.iter_mut().for_each(|byte| *byte = SELECTED);
    }
    pub fn clear(&mut self) {
        self.mask.iter_mut().for_each(|byte| *byte = 0);
    }
    pub fn invert(&mut self) {
        self.mask.iter_mut().for_each(|byte| *byte = !*byte);
    }
    #[must_use]
    pub fn inverted(&self) -> Self {
        let mut new = self.clone();
        new.invert();
        new
    }
    /// Shift the selection by whole pixels. Pixels shifted off the canvas are lost, and the
    /// newly exposed area is unselected.
    pub fn translate(&mut self, dx: i64, dy: i64) {
        if dx == 0 && dy == 0 {
            return;
        }
        let old = std::mem::replace(&mut self.mask, image::GrayImage::new(0, 0));
        self.mask = image::GrayImage::from_fn(old.width(), old.height(), |x, y| {
            let source_x = i64::from(x) - dx;
            let source_y = i64::from(y) - dy;
            match (u32::try_from(source_x), u32::try_from(source_y)) {
                (Ok(sx), Ok(sy)) if sx < old.width() && sy < old.height() => *old.get_pixel(sx, sy),
                _ => image::Luma([0]),
            }
        });
    }
    /// Merge another selection of the same size into this one.
    pub fn combine(&mut self, other: &Selection, mode: CombineMode) -> Result<(), DimensionMismatch> {
        self.size().expect(other.size())?;
        for (old, &new) in self.mask.iter_mut().zip(other.mask.iter()) {
            *old = if mode.combine(*old != 0, new != 0) {
                SELECTED
            } else {
                0
            };
        }
        Ok(())
    }
    /// Merge a region described by a predicate, which is only consulted within `rect`.
    /// Everything outside of `rect` is treated as not part of the new region.
    pub(crate) fn combine_region(
        &mut self,
        rect: Rect,
        mode: CombineMode,
        mut covered: impl FnMut(u32, u32) -> bool,
    ) {
        let canvas = Rect::of_size(self.size());
        let rect = rect.intersect(&canvas);
        // Outside the region the new coverage is false, which only matters for these modes.
        match mode {
            CombineMode::New => self.clear(),
            CombineMode::Intersect => {
                let keep = rect.unwrap_or_default();
                for (x, y, pixel) in self.mask.enumerate_pixels_mut() {
                    if !keep.contains(x, y) {
                        pixel.0[0] = 0;
                    }
                }
            }
            CombineMode::Add | CombineMode::Subtract | CombineMode::Xor => (),
        }
        let Some(rect) = rect else {
            return;
        };
        for y in rect.y..rect.bottom() {
            for x in rect.x..rect.right() {
                let pixel = self.mask.get_pixel_mut(x, y);
                // For `New`, the mask was cleared above so `old` is irrelevant.
                let old = pixel.0[0] != 0;
                pixel.0[0] = if mode.combine(old, covered(x, y)) {
                    SELECTED
                } else {
                    0
                };
            }
        }
    }
    /// Merge a coverage mask of the same size. Nonzero bytes are covered.
    pub fn combine_mask(
        &mut self,
        mask: &image::GrayImage,
        mode: CombineMode,
    ) -> Result<(), DimensionMismatch> {
        self.size().expect(Size::of_image(mask))?;
        self.combine_region(Rect::of_size(self.size()), mode, |x, y| {
            mask.get_pixel(x, y).0[0] != 0
        });
        Ok(())
    }
}
impl std::fmt::Debug for Selection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Selection")
            .field("size", &self.size())
            .field("bounds", &self.bounds())
            .finish()
    }
}

/// Combine two selections of equal size into a new one.
pub fn combine(
    a: &Selection,
    b: &Selection,
    mode: CombineMode,
) -> Result<Selection, DimensionMismatch> {
    let mut out = a.clone();
    out.combine(b, mode)?;
    Ok(out)
}
