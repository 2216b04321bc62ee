use std::sync::{Arc, OnceLock};

use crate::util::{DimensionMismatch, Rect, Revision, Size};

/// An RGBA8 (straight alpha) pixel buffer, shared copy-on-write between document states.
///
/// Derived data (like the bounds of the non-transparent content) is computed lazily and
/// forgotten whenever the pixels are touched, at which point the buffer also receives a fresh
/// [`Revision`].
#[derive(Clone)]
pub struct RasterBuffer {
    image: Arc<image::RgbaImage>,
    revision: Revision,
    content_bounds: OnceLock<Option<Rect>>,
}
impl RasterBuffer {
    /// Create a fully transparent buffer.
    #[must_use]
    pub fn new(size: Size) -> Self {
        Self::from_image(image::RgbaImage::new(size.width, size.height))
    }
    #[must_use]
    pub fn from_image(image: image::RgbaImage) -> Self {
        Self {
            image: Arc::new(image),
            revision: Revision::next(),
            content_bounds: OnceLock::new(),
        }
    }
    #[must_use]
    pub fn size(&self) -> Size {
        Size::of_image(&self.image)
    }
    #[must_use]
    pub fn image(&self) -> &image::RgbaImage {
        &self.image
    }
    #[must_use]
    pub fn revision(&self) -> Revision {
        self.revision
    }
    /// Raw RGBA bytes, row-major.
    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        self.image.as_raw()
    }
    /// Bounding box of every pixel with nonzero alpha, or None if the buffer is fully transparent.
    #[must_use]
    pub fn content_bounds(&self) -> Option<Rect> {
        *self
            .content_bounds
            .get_or_init(|| compute_content_bounds(&self.image))
    }
    /// Mutably access the pixels, cloning them first if they are shared with another state.
    pub fn make_mut(&mut self) -> &mut image::RgbaImage {
        self.touch();
        Arc::make_mut(&mut self.image)
    }
    /// Swap in new pixel data of the same size.
    pub fn replace(&mut self, image: image::RgbaImage) -> Result<(), DimensionMismatch> {
        self.size().expect(Size::of_image(&image))?;
        self.touch();
        self.image = Arc::new(image);
        Ok(())
    }
    fn touch(&mut self) {
        self.revision = Revision::next();
        self.content_bounds = OnceLock::new();
    }
}
impl PartialEq for RasterBuffer {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.image, &other.image)
            || (self.size() == other.size() && self.image.as_raw() == other.image.as_raw())
    }
}
impl std::fmt::Debug for RasterBuffer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RasterBuffer")
            .field("size", &self.size())
            .field("revision", &self.revision)
            .finish_non_exhaustive()
    }
}

fn compute_content_bounds(image: &image::RgbaImage) -> Option<Rect> {
    let width = image.width() as usize;
    if width == 0 {
        return None;
    }
    let pixels: &[[u8; 4]] = bytemuck::cast_slice(image.as_raw());
    let mut min = [u32::MAX; 2];
    let mut max = [0u32; 2];
    for (y, row) in pixels.chunks_exact(width).enumerate() {
        let Some(first) = row.iter().position(|px| px[3] != 0) else {
            continue;
        };
        // Found one in this row, so rposition will too.
        let last = row.iter().rposition(|px| px[3] != 0).unwrap_or(first);
        // Dimensions came from u32s, so indices fit.
        let (first, last, y) = (first as u32, last as u32, y as u32);
        min = [min[0].min(first), min[1].min(y)];
        max = [max[0].max(last + 1), max[1].max(y + 1)];
    }
    (min[0] != u32::MAX).then(|| Rect::from_corners(min, max))
}
