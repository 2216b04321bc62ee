#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod blend;
pub mod commands;
pub mod config;
pub mod patch;
pub mod queue;
pub mod raster;
pub mod render;
pub mod selection;
pub mod state;
pub mod util;

pub use commands::{Operation, OperationKind};
pub use config::DocumentConfig;
pub use queue::{Applied, DocumentError, DocumentQueue};
pub use render::{InFlightEdit, Renderer};
pub use selection::{CombineMode, Selection};
pub use state::{LayerNode, NodeId, State};
