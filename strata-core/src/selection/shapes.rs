//! Geometric selection mutators. All coverage tests sample at pixel centers.

use super::{CombineMode, Selection};
use crate::{raster::draw::rasterize_even_odd, util::Rect};

/// Bounding box of some float-space extent, rounded outward and clipped to the canvas.
fn pixel_bounds(min: [f32; 2], max: [f32; 2], canvas: Rect) -> Option<Rect> {
    use az::SaturatingAs;
    if min.iter().chain(max.iter()).any(|v| v.is_nan()) {
        return None;
    }
    let lo = |v: f32| v.floor().max(0.0).saturating_as::<u32>();
    let hi = |v: f32| v.ceil().max(0.0).saturating_as::<u32>();
    Rect::from_corners([lo(min[0]), lo(min[1])], [hi(max[0]), hi(max[1])]).intersect(&canvas)
}

/// Squared distance from `p` to the segment `a..b`.
fn segment_distance_sq(p: [f32; 2], a: [f32; 2], b: [f32; 2]) -> f32 {
    let ab = [b[0] - a[0], b[1] - a[1]];
    let ap = [p[0] - a[0], p[1] - a[1]];
    let len_sq = ab[0] * ab[0] + ab[1] * ab[1];
    let t = if len_sq > 0.0 {
        ((ap[0] * ab[0] + ap[1] * ab[1]) / len_sq).clamp(0.0, 1.0)
    } else {
        0.0
    };
    let closest = [a[0] + ab[0] * t, a[1] + ab[1] * t];
    let d = [p[0] - closest[0], p[1] - closest[1]];
    d[0] * d[0] + d[1] * d[1]
}

#[allow(clippy::cast_precision_loss)]
fn center(x: u32, y: u32) -> [f32; 2] {
    [x as f32 + 0.5, y as f32 + 0.5]
}

impl Selection {
    /// Merge an axis-aligned rectangle.
    pub fn add_rect(&mut self, rect: Rect, mode: CombineMode) {
        self.combine_region(rect, mode, |_, _| true);
    }
    /// Merge the ellipse inscribed in `rect`.
    pub fn add_ellipse(&mut self, rect: Rect, mode: CombineMode) {
        #[allow(clippy::cast_precision_loss)]
        let (rx, ry) = (rect.width as f32 / 2.0, rect.height as f32 / 2.0);
        #[allow(clippy::cast_precision_loss)]
        let (cx, cy) = (rect.x as f32 + rx, rect.y as f32 + ry);
        self.combine_region(rect, mode, |x, y| {
            let [px, py] = center(x, y);
            let (dx, dy) = ((px - cx) / rx, (py - cy) / ry);
            dx * dx + dy * dy <= 1.0
        });
    }
    /// Merge a closed polygon, filled with the even-odd rule. The closing edge is implicit.
    pub fn add_lasso(&mut self, polygon: &[[f32; 2]], mode: CombineMode) {
        let coverage = rasterize_even_odd(&[polygon.to_vec()], self.size());
        let bounds = polygon.iter().fold(
            ([f32::INFINITY; 2], [f32::NEG_INFINITY; 2]),
            |(min, max), p| {
                (
                    [min[0].min(p[0]), min[1].min(p[1])],
                    [max[0].max(p[0]), max[1].max(p[1])],
                )
            },
        );
        let rect = pixel_bounds(bounds.0, bounds.1, Rect::of_size(self.size()))
            .unwrap_or_default();
        self.combine_region(rect, mode, |x, y| coverage.get_pixel(x, y).0[0] != 0);
    }
    /// Merge a brush-painted region: a disc of diameter `brush_size` stamped at every point of
    /// `path`, with consecutive stamps joined by capsules for continuous coverage.
    pub fn add_paint(&mut self, path: &[[f32; 2]], brush_size: f32, mode: CombineMode) {
        let radius = (brush_size / 2.0).max(0.0);
        let canvas = Rect::of_size(self.size());
        let mut coverage = image::GrayImage::new(canvas.width, canvas.height);

        // A lone point is a zero-length capsule, i.e. a disc.
        let segments: Vec<([f32; 2], [f32; 2])> = match path {
            [] => Vec::new(),
            [single] => vec![(*single, *single)],
            _ => path.windows(2).map(|pair| (pair[0], pair[1])).collect(),
        };
        let mut touched: Option<Rect> = None;
        for (a, b) in segments {
            let min = [a[0].min(b[0]) - radius, a[1].min(b[1]) - radius];
            let max = [a[0].max(b[0]) + radius, a[1].max(b[1]) + radius];
            let Some(rect) = pixel_bounds(min, max, canvas) else {
                continue;
            };
            touched = Some(touched.map_or(rect, |t| t.union(&rect)));
            for y in rect.y..rect.bottom() {
                for x in rect.x..rect.right() {
                    if segment_distance_sq(center(x, y), a, b) <= radius * radius {
                        coverage.put_pixel(x, y, image::Luma([255]));
                    }
                }
            }
        }
        self.combine_region(touched.unwrap_or_default(), mode, |x, y| {
            coverage.get_pixel(x, y).0[0] != 0
        });
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::util::Size;

    #[test]
    fn rect_new_replaces() {
        let mut selection = Selection::new(Size::new(8, 8));
        selection.add_rect(Rect::new(0, 0, 2, 2), CombineMode::New);
        selection.add_rect(Rect::new(4, 4, 2, 2), CombineMode::New);
        assert_eq!(selection.bounds(), Some(Rect::new(4, 4, 2, 2)));
    }
    #[test]
    fn rect_intersect_outside() {
        let mut selection = Selection::full(Size::new(8, 8));
        selection.add_rect(Rect::new(2, 2, 3, 3), CombineMode::Intersect);
        assert_eq!(selection.count(), 9);
        assert_eq!(selection.bounds(), Some(Rect::new(2, 2, 3, 3)));
    }
    #[test]
    fn rect_clipped_to_canvas() {
        let mut selection = Selection::new(Size::new(4, 4));
        selection.add_rect(Rect::new(2, 2, 50, 50), CombineMode::Add);
        assert_eq!(selection.count(), 4);
    }
    #[test]
    fn ellipse() {
        let mut selection = Selection::new(Size::new(20, 20));
        selection.add_ellipse(Rect::new(0, 0, 20, 20), CombineMode::New);
        assert!(selection.contains(10, 10));
        assert!(selection.contains(0, 10));
        assert!(!selection.contains(0, 0));
        assert!(!selection.contains(19, 19));
        assert_eq!(selection.bounds(), Some(Rect::new(0, 0, 20, 20)));
    }
    #[test]
    fn lasso_triangle() {
        let mut selection = Selection::new(Size::new(10, 10));
        selection.add_lasso(&[[0.0, 0.0], [10.0, 0.0], [0.0, 10.0]], CombineMode::New);
        assert!(selection.contains(1, 1));
        assert!(!selection.contains(8, 8));
        // Subtracting the same lasso leaves nothing.
        selection.add_lasso(&[[0.0, 0.0], [10.0, 0.0], [0.0, 10.0]], CombineMode::Subtract);
        assert!(selection.is_empty());
    }
    #[test]
    fn paint_is_continuous() {
        let mut selection = Selection::new(Size::new(40, 10));
        selection.add_paint(&[[5.0, 5.0], [35.0, 5.0]], 4.0, CombineMode::New);
        // Every column along the stroke is covered, not just the stamps.
        for x in 5..35 {
            assert!(selection.contains(x, 4), "gap at {x}");
        }
        assert!(!selection.contains(20, 0));
    }
    #[test]
    fn paint_single_stamp() {
        let mut selection = Selection::new(Size::new(10, 10));
        selection.add_paint(&[[5.0, 5.0]], 2.0, CombineMode::New);
        assert_eq!(selection.bounds(), Some(Rect::new(4, 4, 2, 2)));
    }
}
