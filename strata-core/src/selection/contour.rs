//! # Contour tracing
//!
//! Converts a selection bitmap into closed polylines along pixel boundaries, suitable for vector
//! display.
//!
//! The tracer walks horizontal grid lines top to bottom, comparing the vertical boundary
//! crossings of the row above each line with those of the row below it. Where crossings appear
//! or vanish, horizontal edges run along the line between them. Pairing those events left to
//! right gives one of:
//! * a *cap* (∩): two new crossings below, joined above. Starts a new partial path.
//! * a *cup* (∪): two crossings from above end here, joined below. Either closes a path or
//!   stitches two partial paths together.
//! * a *jog*: a crossing from above continues below, shifted sideways.
//!
//! A crossing present both above and below continues straight down unless the four pixels
//! around it form a diagonal saddle, in which case it produces both kinds of event. Saddles
//! are always resolved so that diagonally touching regions stay separate, matching the
//! 4-connectivity of the magic wand.
//!
//! Every loop is oriented with the selected area on its right-hand side in screen space
//! (y down), so outer boundaries run clockwise and holes counter-clockwise.

use std::collections::VecDeque;

use super::Selection;
use crate::raster::draw::PathSink;

/// A closed, axis-aligned polyline. The edge from the last point back to the first is implicit.
/// Consecutive edges always alternate between horizontal and vertical, so every point is a corner.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Contour {
    points: Vec<[u32; 2]>,
}
impl Contour {
    #[must_use]
    pub fn points(&self) -> &[[u32; 2]] {
        &self.points
    }
    /// Iterate over the edges, including the closing one.
    pub fn edges(&self) -> impl Iterator<Item = ([u32; 2], [u32; 2])> + '_ {
        self.points
            .iter()
            .copied()
            .zip(self.points.iter().copied().cycle().skip(1))
    }
    /// Shoelace area in screen space. Positive for clockwise (outer) loops, negative for holes.
    #[must_use]
    pub fn signed_area(&self) -> i64 {
        let twice: i64 = self
            .edges()
            .map(|([x0, y0], [x1, y1])| {
                i64::from(x0) * i64::from(y1) - i64::from(x1) * i64::from(y0)
            })
            .sum();
        twice / 2
    }
    #[must_use]
    pub fn is_hole(&self) -> bool {
        self.signed_area() < 0
    }
    /// Total edge length, in pixels.
    #[must_use]
    pub fn perimeter(&self) -> u64 {
        self.edges()
            .map(|([x0, y0], [x1, y1])| u64::from(x0.abs_diff(x1) + y0.abs_diff(y1)))
            .sum()
    }
    /// Replay as a closed subpath.
    #[allow(clippy::cast_precision_loss)]
    pub fn write_to(&self, sink: &mut (impl PathSink + ?Sized)) {
        let mut points = self.points.iter();
        let Some(&[x, y]) = points.next() else {
            return;
        };
        sink.move_to(x as f32, y as f32);
        for &[x, y] in points {
            sink.line_to(x as f32, y as f32);
        }
        sink.close_path();
    }
}

type EndId = usize;

#[derive(Copy, Clone, PartialEq, Eq, Debug)]
enum Side {
    Front,
    Back,
}

/// Where an open end of a partial path lives.
#[derive(Copy, Clone, Debug)]
struct EndRecord {
    path: usize,
    side: Side,
}

/// An open polyline, both of whose ends hang down into rows not yet scanned.
struct Partial {
    points: VecDeque<[u32; 2]>,
    front: EndId,
    back: EndId,
}
impl Partial {
    fn push(&mut self, side: Side, point: [u32; 2]) {
        match side {
            Side::Front => self.points.push_front(point),
            Side::Back => self.points.push_back(point),
        }
    }
    fn reverse(&mut self, ends: &mut [EndRecord]) {
        self.points.make_contiguous().reverse();
        std::mem::swap(&mut self.front, &mut self.back);
        ends[self.front].side = Side::Front;
        ends[self.back].side = Side::Back;
    }
}

#[derive(Copy, Clone, Debug)]
enum Event {
    /// A crossing from the row above ends on this line.
    Above { x: u32, end: EndId },
    /// A crossing of the row below starts on this line.
    Below { x: u32 },
}

#[derive(Default)]
struct Tracer {
    partials: Vec<Option<Partial>>,
    ends: Vec<EndRecord>,
    finished: Vec<Contour>,
}
impl Tracer {
    fn new_partial(&mut self, left: [u32; 2], right: [u32; 2]) -> (EndId, EndId) {
        let path = self.partials.len();
        let front = self.ends.len();
        let back = front + 1;
        self.ends.push(EndRecord {
            path,
            side: Side::Front,
        });
        self.ends.push(EndRecord {
            path,
            side: Side::Back,
        });
        self.partials.push(Some(Partial {
            points: VecDeque::from([left, right]),
            front,
            back,
        }));
        (front, back)
    }
    fn extend(&mut self, end: EndId, points: &[[u32; 2]]) {
        let EndRecord { path, side } = self.ends[end];
        if let Some(partial) = self.partials[path].as_mut() {
            for &point in points {
                partial.push(side, point);
            }
        }
    }
    /// Join two ends arriving from above with a horizontal edge along `y`.
    fn cup(&mut self, (left_x, left): (u32, EndId), (right_x, right): (u32, EndId), y: u32) {
        self.extend(left, &[[left_x, y]]);
        self.extend(right, &[[right_x, y]]);
        let (left_path, right_path) = (self.ends[left].path, self.ends[right].path);
        if left_path == right_path {
            // Both ends of one path met, it's a closed loop now.
            if let Some(partial) = self.partials[left_path].take() {
                self.finished.push(Contour {
                    points: partial.points.into(),
                });
            }
            return;
        }
        let (Some(mut first), Some(mut second)) = (
            self.partials[left_path].take(),
            self.partials[right_path].take(),
        ) else {
            log::warn!("contour tracer lost a partial path");
            return;
        };
        // Orient so that `first` ends at `left` and `second` begins at `right`, then concatenate.
        if self.ends[left].side == Side::Front {
            first.reverse(&mut self.ends);
        }
        if self.ends[right].side == Side::Back {
            second.reverse(&mut self.ends);
        }
        first.points.extend(second.points);
        first.back = second.back;
        self.ends[first.back] = EndRecord {
            path: left_path,
            side: Side::Back,
        };
        self.partials[left_path] = Some(first);
    }
}

/// Columns of the vertical boundary edges within row `y`, ascending.
fn crossings(selection: &Selection, y: i64, out: &mut Vec<u32>) {
    out.clear();
    let width = selection.size().width;
    if y < 0 || y >= i64::from(selection.size().height) {
        return;
    }
    let mut prev = false;
    for x in 0..=width {
        let current = selection.contains_signed(i64::from(x), y);
        if current != prev {
            out.push(x);
        }
        prev = current;
    }
}

impl Selection {
    /// Trace the boundary of the selection into closed loops, one per boundary component.
    /// Holes get their own loops, oriented opposite to the outer boundaries.
    #[must_use]
    pub fn to_path(&self) -> Vec<Contour> {
        let height = self.size().height;
        let mut tracer = Tracer::default();
        // Open ends hanging down from the row above the current line, by column.
        let mut active: Vec<(u32, EndId)> = Vec::new();
        let mut next_active: Vec<(u32, EndId)> = Vec::new();
        let mut below: Vec<u32> = Vec::new();
        let mut events: Vec<Event> = Vec::new();

        for y in 0..=height {
            let row = i64::from(y);
            crossings(self, row, &mut below);
            events.clear();
            next_active.clear();

            // Merge-walk the two sorted crossing lists.
            let (mut a, mut b) = (0, 0);
            while a < active.len() || b < below.len() {
                let above_x = active.get(a).map(|&(x, _)| x);
                let below_x = below.get(b).copied();
                match (above_x, below_x) {
                    (Some(ax), Some(bx)) if ax == bx => {
                        let end = active[a].1;
                        let top_left = self.contains_signed(i64::from(ax) - 1, row - 1);
                        let bottom_left = self.contains_signed(i64::from(ax) - 1, row);
                        if top_left == bottom_left {
                            // Straight down, no corner here.
                            next_active.push((ax, end));
                        } else if top_left {
                            // Saddle. The top-left pixel's bottom edge turns up into its right edge.
                            events.push(Event::Above { x: ax, end });
                            events.push(Event::Below { x: ax });
                        } else {
                            // Saddle. The bottom-left pixel's top edge turns down into its right edge.
                            events.push(Event::Below { x: ax });
                            events.push(Event::Above { x: ax, end });
                        }
                        a += 1;
                        b += 1;
                    }
                    (Some(ax), Some(bx)) if ax < bx => {
                        events.push(Event::Above {
                            x: ax,
                            end: active[a].1,
                        });
                        a += 1;
                    }
                    (Some(ax), None) => {
                        events.push(Event::Above {
                            x: ax,
                            end: active[a].1,
                        });
                        a += 1;
                    }
                    (_, Some(bx)) => {
                        events.push(Event::Below { x: bx });
                        b += 1;
                    }
                    (None, None) => break,
                }
            }

            // Horizontal edges span consecutive pairs of events.
            for pair in events.chunks_exact(2) {
                match (pair[0], pair[1]) {
                    (Event::Below { x: left }, Event::Below { x: right }) => {
                        let (front, back) = tracer.new_partial([left, y], [right, y]);
                        next_active.push((left, front));
                        next_active.push((right, back));
                    }
                    (Event::Above { x: left, end: l }, Event::Above { x: right, end: r }) => {
                        tracer.cup((left, l), (right, r), y);
                    }
                    (Event::Above { x: from, end }, Event::Below { x: to })
                    | (Event::Below { x: to }, Event::Above { x: from, end }) => {
                        tracer.extend(end, &[[from, y], [to, y]]);
                        next_active.push((to, end));
                    }
                }
            }
            if events.len() % 2 != 0 {
                log::warn!("unpaired contour event on line {y}");
            }
            next_active.sort_unstable_by_key(|&(x, _)| x);
            std::mem::swap(&mut active, &mut next_active);
        }

        let mut loops = tracer.finished;
        for contour in &mut loops {
            if !self.is_right_handed(contour) {
                contour.points.reverse();
            }
        }
        loops
    }
    /// Is the selected area on the right of this loop's direction of travel?
    fn is_right_handed(&self, contour: &Contour) -> bool {
        // Every loop has horizontal edges, check against any one of them.
        contour
            .edges()
            .find(|([_, y0], [_, y1])| y0 == y1)
            .map_or(true, |([x0, y], [x1, _])| {
                let (y, left) = (i64::from(y), i64::from(x0.min(x1)));
                if x1 > x0 {
                    // Travelling right, the right-hand side is the row below.
                    self.contains_signed(left, y)
                } else {
                    self.contains_signed(left, y - 1)
                }
            })
    }
    /// Replay the traced loops as closed subpaths, e.g. for drawing an outline.
    pub fn write_outline(&self, sink: &mut (impl PathSink + ?Sized)) {
        for contour in self.to_path() {
            contour.write_to(sink);
        }
    }
    /// Emit clip path commands covering exactly the selected pixels under the even-odd rule.
    ///
    /// Walks the same row crossings as [`Self::to_path`]. Runs spanning the same columns on
    /// consecutive rows are emitted together as one rectangle, without stitching loops.
    pub fn set_canvas_clip(&self, sink: &mut (impl PathSink + ?Sized)) {
        // Runs still growing downwards, as (left, right, top row).
        let mut open: Vec<(u32, u32, u32)> = Vec::new();
        let mut continued = Vec::new();
        let mut row = Vec::new();
        // One past the last row has no crossings, closing everything still open.
        for y in 0..=self.size().height {
            crossings(self, i64::from(y), &mut row);
            for run in row.chunks_exact(2) {
                let (left, right) = (run[0], run[1]);
                let top = open
                    .iter()
                    .find(|&&(l, r, _)| (l, r) == (left, right))
                    .map_or(y, |&(_, _, top)| top);
                continued.push((left, right, top));
            }
            for &(left, right, top) in &open {
                if !continued.iter().any(|&(l, r, _)| (l, r) == (left, right)) {
                    clip_rect(sink, [left, top], [right, y]);
                }
            }
            std::mem::swap(&mut open, &mut continued);
            continued.clear();
        }
    }
}

#[allow(clippy::cast_precision_loss)]
fn clip_rect(sink: &mut (impl PathSink + ?Sized), [left, top]: [u32; 2], [right, bottom]: [u32; 2]) {
    let (left, top, right, bottom) = (left as f32, top as f32, right as f32, bottom as f32);
    sink.move_to(left, top);
    sink.line_to(right, top);
    sink.line_to(right, bottom);
    sink.line_to(left, bottom);
    sink.close_path();
}
