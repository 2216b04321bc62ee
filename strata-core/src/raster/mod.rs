//! Pixel storage, diffing, and the scratch drawing surface used by pixel operations.

pub mod buffer;
pub mod diff;
pub mod draw;

pub use buffer::RasterBuffer;
pub use diff::{DiffError, DiffPolicy, ImageDiff};
pub use draw::{DrawContext, PathBuilder, PathSink};
