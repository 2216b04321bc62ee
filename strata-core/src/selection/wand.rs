use bitvec::vec::BitVec;

use super::{CombineMode, Selection, SelectionError};
use crate::util::{Rect, Size};

/// Sum of absolute per-channel differences, alpha included.
fn color_distance(a: [u8; 4], b: [u8; 4]) -> u16 {
    a.iter()
        .zip(b.iter())
        .map(|(&a, &b)| u16::from(a.abs_diff(b)))
        .sum()
}

impl Selection {
    /// Merge the 4-connected region around `seed` whose colors lie within `tolerance` of the
    /// seed color. A pixel matches if the summed absolute difference of its channels from the
    /// seed's is at most `tolerance * 4`.
    pub fn add_magic_wand(
        &mut self,
        buffer: &image::RgbaImage,
        seed: (u32, u32),
        tolerance: u8,
        mode: CombineMode,
    ) -> Result<(), SelectionError> {
        let size = self.size();
        size.expect(Size::of_image(buffer))?;
        let (seed_x, seed_y) = seed;
        if seed_x >= size.width || seed_y >= size.height {
            return Err(SelectionError::OutOfBounds {
                x: seed_x,
                y: seed_y,
                size,
            });
        }
        let region = flood(buffer, seed, tolerance);
        let width = size.width as usize;
        self.combine_region(Rect::of_size(size), mode, |x, y| {
            region[y as usize * width + x as usize]
        });
        Ok(())
    }
}

/// Bitmask, row major, of every pixel reached from `seed`.
fn flood(buffer: &image::RgbaImage, seed: (u32, u32), tolerance: u8) -> BitVec {
    let (width, height) = buffer.dimensions();
    let index = |x: u32, y: u32| y as usize * width as usize + x as usize;
    let target = buffer.get_pixel(seed.0, seed.1).0;
    let limit = u16::from(tolerance) * 4;

    let mut visited = bitvec::bitvec![0; width as usize * height as usize];
    let mut stack = vec![seed];
    visited.set(index(seed.0, seed.1), true);
    while let Some((x, y)) = stack.pop() {
        let neighbors = [
            x.checked_sub(1).map(|x| (x, y)),
            (x + 1 < width).then_some((x + 1, y)),
            y.checked_sub(1).map(|y| (x, y)),
            (y + 1 < height).then_some((x, y + 1)),
        ];
        for (nx, ny) in neighbors.into_iter().flatten() {
            let idx = index(nx, ny);
            if visited[idx] {
                continue;
            }
            if color_distance(buffer.get_pixel(nx, ny).0, target) <= limit {
                visited.set(idx, true);
                stack.push((nx, ny));
            }
        }
    }
    visited
}

#[cfg(test)]
mod test {
    use super::*;
    use image::{Rgba, RgbaImage};

    /// Left half red, right half blue, with a red island in the blue.
    fn sample() -> RgbaImage {
        RgbaImage::from_fn(10, 4, |x, y| {
            if x < 5 || (x == 8 && y == 1) {
                Rgba([255, 0, 0, 255])
            } else {
                Rgba([0, 0, 255, 255])
            }
        })
    }

    #[test]
    fn four_connected_only() {
        let mut selection = Selection::new(Size::new(10, 4));
        selection
            .add_magic_wand(&sample(), (0, 0), 0, CombineMode::New)
            .unwrap();
        assert_eq!(selection.count(), 20);
        // The island matches in color, but isn't connected.
        assert!(!selection.contains(8, 1));
    }
    #[test]
    fn tolerance_is_summed() {
        let image = RgbaImage::from_fn(3, 1, |x, _| match x {
            0 => Rgba([100, 100, 100, 255]),
            // Off by 4 in every channel - sum 12, within tolerance 3 * 4.
            1 => Rgba([104, 104, 104, 255]),
            // Compared against the seed, not the neighbor: sum 25, outside it.
            _ => Rgba([117, 104, 104, 255]),
        });
        let mut selection = Selection::new(Size::new(3, 1));
        selection
            .add_magic_wand(&image, (0, 0), 3, CombineMode::New)
            .unwrap();
        assert_eq!(selection.as_bytes(), &[255, 255, 0]);
    }
    #[test]
    fn bad_inputs() {
        let mut selection = Selection::new(Size::new(10, 4));
        assert!(matches!(
            selection.add_magic_wand(&sample(), (10, 0), 0, CombineMode::New),
            Err(SelectionError::OutOfBounds { .. })
        ));
        let mut wrong = Selection::new(Size::new(3, 3));
        assert!(matches!(
            wrong.add_magic_wand(&sample(), (0, 0), 0, CombineMode::New),
            Err(SelectionError::DimensionMismatch(_))
        ));
    }
}
