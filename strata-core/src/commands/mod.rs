//! # Commands
//!
//! Operations are the way the document is modified. Each one is a single user-level intent (a stroke, a
//! fill, toggling visibility...) produced by the tool layer, stamped with the time it happened, and handed
//! to a [`crate::queue::DocumentQueue`] to be applied and recorded.
//!
//! There are two flavors of edit:
//! * Pixel edits carry a drawing callback, invoked against a scratch copy of the target layer.
//! * Structural edits carry a list of patches against the document tree.

mod builders;

pub use builders::*;

use crate::{
    patch::{Patch, PatchError},
    raster::DrawContext,
    selection::SelectionError,
    state::{NodeId, TargetError},
    util::Timestamp,
};

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum CommandError {
    #[error(transparent)]
    Target(#[from] TargetError),
    #[error(transparent)]
    Patch(#[from] PatchError),
    #[error(transparent)]
    Selection(#[from] SelectionError),
}

/// What an operation does, as far as history is concerned.
#[derive(
    Copy,
    Clone,
    PartialEq,
    Eq,
    Hash,
    Debug,
    strum::AsRefStr,
    strum::EnumIter,
    serde::Serialize,
    serde::Deserialize,
)]
pub enum OperationKind {
    // Pixel edits.
    Stroke,
    FilledPath,
    FloodFill,
    BucketFill,
    Transform,
    SelectionFill,
    SelectionDelete,
    ApplyEffect,
    // Structural edits.
    Patch,
    AddNode,
    RemoveNode,
    MoveNode,
    SetVisibility,
    SetOpacity,
    SetBlend,
    SetLocked,
    SetName,
    ReplaceSelection,
}
impl OperationKind {
    /// Does this kind of operation draw into a layer?
    #[must_use]
    pub fn is_pixel(self) -> bool {
        matches!(
            self,
            Self::Stroke
                | Self::FilledPath
                | Self::FloodFill
                | Self::BucketFill
                | Self::Transform
                | Self::SelectionFill
                | Self::SelectionDelete
                | Self::ApplyEffect
        )
    }
    /// Can consecutive operations of this kind collapse into one undo step?
    ///
    /// Adding, removing, moving, and (un)locking nodes are always their own steps.
    #[must_use]
    pub fn is_mergeable(self) -> bool {
        !matches!(
            self,
            Self::AddNode | Self::RemoveNode | Self::MoveNode | Self::SetLocked
        )
    }
    /// May this operation touch a locked node? Only the toggles a user needs to get out of a lock.
    #[must_use]
    pub fn ignores_lock(self) -> bool {
        matches!(self, Self::SetLocked | Self::SetVisibility)
    }
}

/// A pixel drawing callback. Invoked exactly once, against a scratch copy of the target layer.
pub type DrawFn = Box<dyn FnOnce(&mut DrawContext<'_>)>;

pub enum Edit {
    Pixels(DrawFn),
    Structural(Vec<Patch>),
}
impl std::fmt::Debug for Edit {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Pixels(_) => f.write_str("Pixels(..)"),
            Self::Structural(patches) => f.debug_tuple("Structural").field(patches).finish(),
        }
    }
}

/// Everything about an operation except the edit itself, as kept in history.
#[derive(Clone, PartialEq, Eq, Debug, serde::Serialize, serde::Deserialize)]
pub struct OperationRecord {
    pub kind: OperationKind,
    pub target: Option<NodeId>,
    pub timestamp: Timestamp,
}
impl OperationRecord {
    /// Could `next` be folded into this record, ignoring time?
    #[must_use]
    pub fn is_compatible(&self, next: &OperationRecord) -> bool {
        self.kind == next.kind && self.kind.is_mergeable() && self.target == next.target
    }
}

#[derive(Debug)]
pub struct Operation {
    pub kind: OperationKind,
    /// The layer or group this operation edits, if any. Locks are checked against it.
    pub target: Option<NodeId>,
    pub timestamp: Timestamp,
    pub edit: Edit,
}
impl Operation {
    /// A pixel edit of the given layer, stamped now.
    pub fn pixels(
        kind: OperationKind,
        target: NodeId,
        draw: impl FnOnce(&mut DrawContext<'_>) + 'static,
    ) -> Self {
        Self {
            kind,
            target: Some(target),
            timestamp: Timestamp::now(),
            edit: Edit::Pixels(Box::new(draw)),
        }
    }
    /// A structural edit, stamped now.
    #[must_use]
    pub fn structural(kind: OperationKind, target: Option<NodeId>, patches: Vec<Patch>) -> Self {
        Self {
            kind,
            target,
            timestamp: Timestamp::now(),
            edit: Edit::Structural(patches),
        }
    }
    /// Override the timestamp, e.g. with the time of the input event that caused it.
    #[must_use]
    pub fn at(mut self, timestamp: Timestamp) -> Self {
        self.timestamp = timestamp;
        self
    }
    #[must_use]
    pub fn record(&self) -> OperationRecord {
        OperationRecord {
            kind: self.kind,
            target: self.target.clone(),
            timestamp: self.timestamp,
        }
    }
    #[must_use]
    pub fn into_parts(self) -> (OperationRecord, Edit) {
        let record = self.record();
        (record, self.edit)
    }
}
