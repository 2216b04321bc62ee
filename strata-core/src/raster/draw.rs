//! # Drawing context
//!
//! Pixel operations materialize themselves by drawing into a scratch copy of their target layer
//! through a [`DrawContext`]. The context offers a small canvas-like API: path building, clipping,
//! and fills. Paths use the even-odd rule and sample at pixel centers.

use crate::{
    blend::{composite_pixel, Blend},
    selection::Selection,
    util::{Rect, Size},
};

/// Anything that accepts canvas-style path commands.
pub trait PathSink {
    fn move_to(&mut self, x: f32, y: f32);
    fn line_to(&mut self, x: f32, y: f32);
    fn close_path(&mut self);
}

/// A set of polygons, built up with [`PathSink`] commands.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct PathBuilder {
    subpaths: Vec<Vec<[f32; 2]>>,
}
impl PathBuilder {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
    #[must_use]
    pub fn subpaths(&self) -> &[Vec<[f32; 2]>] {
        &self.subpaths
    }
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.subpaths.iter().all(Vec::is_empty)
    }
    pub fn clear(&mut self) {
        self.subpaths.clear();
    }
}
impl PathSink for PathBuilder {
    fn move_to(&mut self, x: f32, y: f32) {
        self.subpaths.push(vec![[x, y]]);
    }
    fn line_to(&mut self, x: f32, y: f32) {
        match self.subpaths.last_mut() {
            Some(subpath) => subpath.push([x, y]),
            // Canvas semantics - a line with no current point acts as a move.
            None => self.move_to(x, y),
        }
    }
    fn close_path(&mut self) {
        // Every subpath is implicitly closed when rasterized. Start a fresh one at the same point,
        // so further line_to's don't extend the closed polygon.
        if let Some(&first) = self.subpaths.last().and_then(|subpath| subpath.first()) {
            self.subpaths.push(vec![first]);
        }
    }
}

/// Rasterize closed polygons with the even-odd rule, sampling each pixel at its center.
/// Covered pixels are 255, all others 0.
#[must_use]
pub fn rasterize_even_odd(subpaths: &[Vec<[f32; 2]>], size: Size) -> image::GrayImage {
    let mut mask = image::GrayImage::new(size.width, size.height);
    let mut crossings = Vec::<f32>::new();
    for y in 0..size.height {
        #[allow(clippy::cast_precision_loss)]
        let center_y = y as f32 + 0.5;
        crossings.clear();
        for subpath in subpaths.iter().filter(|subpath| subpath.len() >= 3) {
            // Implicitly closed - pair each point with the next, wrapping around.
            let edges = subpath.iter().zip(subpath.iter().cycle().skip(1));
            for (&[x0, y0], &[x1, y1]) in edges {
                // Half-open in y so shared vertices aren't counted twice.
                if (y0 <= center_y && center_y < y1) || (y1 <= center_y && center_y < y0) {
                    crossings.push(x0 + (center_y - y0) * (x1 - x0) / (y1 - y0));
                }
            }
        }
        crossings.sort_by(f32::total_cmp);
        for span in crossings.chunks_exact(2) {
            let (start, end) = (pixel_index(span[0], size.width), pixel_index(span[1], size.width));
            for x in start..end {
                mask.put_pixel(x, y, image::Luma([255]));
            }
        }
    }
    mask
}

/// Index of the first pixel whose center lies at or right of `x`, clamped to `[0, limit]`.
fn pixel_index(x: f32, limit: u32) -> u32 {
    use az::SaturatingAs;
    if x.is_nan() {
        return 0;
    }
    (x - 0.5).ceil().saturating_as::<i64>().clamp(0, i64::from(limit)) as u32
}

/// A drawing surface over a scratch buffer, with an optional clip and access to the
/// document's current selection.
pub struct DrawContext<'a> {
    target: &'a mut image::RgbaImage,
    selection: Option<&'a Selection>,
    clip: Option<image::GrayImage>,
    path: PathBuilder,
}
impl<'a> DrawContext<'a> {
    pub fn new(target: &'a mut image::RgbaImage) -> Self {
        Self {
            target,
            selection: None,
            clip: None,
            path: PathBuilder::new(),
        }
    }
    #[must_use]
    pub fn with_selection(mut self, selection: Option<&'a Selection>) -> Self {
        self.selection = selection;
        self
    }
    #[must_use]
    pub fn size(&self) -> Size {
        Size::of_image(self.target)
    }
    /// The document's selection at the time the operation is applied, if any.
    #[must_use]
    pub fn selection(&self) -> Option<&'a Selection> {
        self.selection
    }
    #[must_use]
    pub fn image(&self) -> &image::RgbaImage {
        self.target
    }
    /// Direct pixel access. Ignores the clip!
    pub fn image_mut(&mut self) -> &mut image::RgbaImage {
        self.target
    }
    #[must_use]
    pub fn is_clipped(&self) -> bool {
        self.clip.is_some()
    }
    pub fn begin_path(&mut self) {
        self.path.clear();
    }
    /// Intersect the clip region with the current path, consuming the path.
    pub fn clip(&mut self) {
        let path = std::mem::take(&mut self.path);
        let mut mask = rasterize_even_odd(path.subpaths(), self.size());
        if let Some(old) = &self.clip {
            for (new, old) in mask.pixels_mut().zip(old.pixels()) {
                new.0[0] = new.0[0].min(old.0[0]);
            }
        }
        self.clip = Some(mask);
    }
    pub fn reset_clip(&mut self) {
        self.clip = None;
    }
    /// Clip to the document selection. Returns false, leaving the clip alone, if there is no selection.
    pub fn clip_to_selection(&mut self) -> bool {
        let Some(selection) = self.selection else {
            return false;
        };
        self.begin_path();
        selection.set_canvas_clip(self);
        self.clip();
        true
    }
    fn clip_allows(&self, x: u32, y: u32) -> bool {
        self.clip
            .as_ref()
            .map_or(true, |clip| clip.get_pixel(x, y).0[0] != 0)
    }
    /// Composite `color` over a single pixel. Out of bounds and clipped pixels are ignored.
    pub fn blend_pixel(&mut self, x: u32, y: u32, color: image::Rgba<u8>, blend: Blend) {
        if x < self.target.width() && y < self.target.height() && self.clip_allows(x, y) {
            let pixel = self.target.get_pixel_mut(x, y);
            pixel.0 = composite_pixel(pixel.0, color.0, blend);
        }
    }
    /// Overwrite a single pixel. Out of bounds and clipped pixels are ignored.
    pub fn put_pixel(&mut self, x: u32, y: u32, color: image::Rgba<u8>) {
        if x < self.target.width() && y < self.target.height() && self.clip_allows(x, y) {
            self.target.put_pixel(x, y, color);
        }
    }
    fn fill_mask(&mut self, mask: Option<&image::GrayImage>, rect: Rect, color: image::Rgba<u8>) {
        let Some(rect) = rect.intersect(&Rect::of_size(self.size())) else {
            return;
        };
        for y in rect.y..rect.bottom() {
            for x in rect.x..rect.right() {
                if mask.map_or(true, |mask| mask.get_pixel(x, y).0[0] != 0) {
                    self.blend_pixel(x, y, color, Blend::default());
                }
            }
        }
    }
    /// Fill the current path with `color`, consuming the path.
    pub fn fill_path(&mut self, color: image::Rgba<u8>) {
        let path = std::mem::take(&mut self.path);
        let mask = rasterize_even_odd(path.subpaths(), self.size());
        self.fill_mask(Some(&mask), Rect::of_size(self.size()), color);
    }
    pub fn fill_rect(&mut self, rect: Rect, color: image::Rgba<u8>) {
        self.fill_mask(None, rect, color);
    }
    /// Fill the whole (clipped) surface.
    pub fn fill(&mut self, color: image::Rgba<u8>) {
        self.fill_rect(Rect::of_size(self.size()), color);
    }
    /// Make a (clipped) rect fully transparent.
    pub fn clear_rect(&mut self, rect: Rect) {
        let Some(rect) = rect.intersect(&Rect::of_size(self.size())) else {
            return;
        };
        for y in rect.y..rect.bottom() {
            for x in rect.x..rect.right() {
                self.put_pixel(x, y, image::Rgba([0; 4]));
            }
        }
    }
    /// Make the whole (clipped) surface fully transparent.
    pub fn clear(&mut self) {
        self.clear_rect(Rect::of_size(self.size()));
    }
    /// Composite an image with its top-left corner at `(x, y)`.
    pub fn draw_image(&mut self, image: &image::RgbaImage, x: i64, y: i64, blend: Blend) {
        for (src_x, src_y, pixel) in image.enumerate_pixels() {
            let (Ok(dst_x), Ok(dst_y)) = (
                u32::try_from(x + i64::from(src_x)),
                u32::try_from(y + i64::from(src_y)),
            ) else {
                continue;
            };
            self.blend_pixel(dst_x, dst_y, *pixel, blend);
        }
    }
}
impl PathSink for DrawContext<'_> {
    fn move_to(&mut self, x: f32, y: f32) {
        self.path.move_to(x, y);
    }
    fn line_to(&mut self, x: f32, y: f32) {
        self.path.line_to(x, y);
    }
    fn close_path(&mut self) {
        self.path.close_path();
    }
}
