//! Document Queue
//!
//! The queue holds the current state of a document, along with the history of every operation applied to it.
//! It is the ground truth for the document: all edits go through [`DocumentQueue::apply`], and every successful
//! edit becomes (or extends) one undoable step.
//!
//! Each call is a complete transaction. Either the state transitions and history records it, or an error is returned
//! and nothing observable changed.

pub mod history;

use crate::{
    commands::{Edit, Operation, OperationKind, OperationRecord},
    config::DocumentConfig,
    patch::{self, Key, Patch, Path, PatchError},
    raster::{diff, DiffError, DiffPolicy, DrawContext},
    state::{fields, LayerNode, NodeId, State, StateError, TargetError},
    util::DimensionMismatch,
};
use history::{Diff, HistoryEntry, LayerImageDiff};

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum DocumentError {
    /// The target, or a group containing it, is locked. The operation was dropped.
    #[error("node {0} is locked")]
    LayerLocked(NodeId),
    #[error("pixel operations need a target layer")]
    NoTarget,
    #[error(transparent)]
    Target(#[from] TargetError),
    #[error(transparent)]
    InvalidPath(#[from] PatchError),
    #[error(transparent)]
    Diff(#[from] DiffError),
    #[error(transparent)]
    DimensionMismatch(#[from] DimensionMismatch),
    #[error(transparent)]
    State(#[from] StateError),
}

/// What became of an applied operation.
#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub enum Applied {
    /// A new step was added to history.
    Pushed,
    /// The operation was folded into the most recent step.
    Merged,
    /// The operation changed nothing. History is untouched.
    Unchanged,
}

pub struct DocumentQueue {
    state: State,
    /// Applied steps, most recent last.
    backward: Vec<HistoryEntry>,
    /// Undone steps, most recently undone last.
    forward: Vec<HistoryEntry>,
    config: DocumentConfig,
    /// Set after undo and redo, so the next edit never merges into a step from before them.
    merge_barrier: bool,
}
impl DocumentQueue {
    /// Create a queue from a state, without a history.
    #[must_use]
    pub fn new(state: State) -> Self {
        Self::with_config(state, DocumentConfig::default())
    }
    #[must_use]
    pub fn with_config(state: State, config: DocumentConfig) -> Self {
        Self {
            state,
            backward: Vec::new(),
            forward: Vec::new(),
            config,
            merge_barrier: false,
        }
    }
    #[must_use]
    pub fn state(&self) -> &State {
        &self.state
    }
    #[must_use]
    pub fn config(&self) -> &DocumentConfig {
        &self.config
    }
    /// Number of steps that can be undone.
    #[must_use]
    pub fn backward_len(&self) -> usize {
        self.backward.len()
    }
    /// Number of steps that can be redone.
    #[must_use]
    pub fn forward_len(&self) -> usize {
        self.forward.len()
    }
    #[must_use]
    pub fn can_undo(&self) -> bool {
        !self.backward.is_empty()
    }
    #[must_use]
    pub fn can_redo(&self) -> bool {
        !self.forward.is_empty()
    }
    /// The most recent step that would be undone.
    #[must_use]
    pub fn peek(&self) -> Option<&OperationRecord> {
        self.backward.last().map(|entry| &entry.record)
    }
    /// The most recently undone step that would be redone.
    #[must_use]
    pub fn peek_forward(&self) -> Option<&OperationRecord> {
        self.forward.last().map(|entry| &entry.record)
    }
    /// Estimated heap usage of both stacks, in bytes.
    #[must_use]
    pub fn memory_usage(&self) -> usize {
        self.backward
            .iter()
            .chain(self.forward.iter())
            .map(|entry| entry.diff.byte_size())
            .sum()
    }
    /// End the current merge run, such that the next operation always starts a new step.
    pub fn barrier(&mut self) {
        self.merge_barrier = true;
    }
    /// Apply an operation to the document.
    pub fn apply(&mut self, operation: Operation) -> Result<Applied, DocumentError> {
        let (record, edit) = operation.into_parts();
        if let Some(target) = &record.target {
            let locked = self
                .state
                .is_locked(target)
                .ok_or_else(|| TargetError::NotFound(target.clone()))?;
            if locked && !record.kind.ignores_lock() {
                log::debug!("rejected {} on locked {target}", record.kind.as_ref());
                return Err(DocumentError::LayerLocked(target.clone()));
            }
        }
        let undo = match edit {
            Edit::Structural(patches) => self.apply_structural(&patches)?,
            Edit::Pixels(draw) => {
                let target = record.target.as_ref().ok_or(DocumentError::NoTarget)?;
                self.apply_pixels(record.kind, target, draw)?
            }
        };
        let Some(undo) = undo else {
            log::trace!("{} changed nothing", record.kind.as_ref());
            return Ok(Applied::Unchanged);
        };
        self.forward.clear();
        Ok(self.push(HistoryEntry { record, diff: undo }))
    }
    /// Returns the diff undoing the change, or None if there was no change.
    fn apply_structural(&mut self, patches: &[patch::Patch]) -> Result<Option<Diff>, DocumentError> {
        if patches.is_empty() {
            return Ok(None);
        }
        // Each patch addresses the state left by the ones before it, locks included.
        let mut next = self.state.clone();
        let mut undo = Vec::with_capacity(patches.len());
        for patch in patches {
            let before = next.clone();
            undo.push(patch::apply_in_place(&mut next, patch)?);
            check_unlocked(&before, &next, patch)?;
        }
        undo.reverse();
        next.validate()?;
        if next == self.state {
            return Ok(None);
        }
        self.state = next;
        Ok(Some(Diff::Structural(undo)))
    }
    fn apply_pixels(
        &mut self,
        kind: OperationKind,
        target: &NodeId,
        draw: crate::commands::DrawFn,
    ) -> Result<Option<Diff>, DocumentError> {
        let before = self.state.layer(target)?.buffer().image();
        let mut scratch = before.clone();
        {
            let mut ctx = DrawContext::new(&mut scratch).with_selection(self.state.selection());
            draw(&mut ctx);
        }
        // Global effects are expected to touch everything.
        let policy = if kind == OperationKind::ApplyEffect {
            DiffPolicy::FULL_FRAME
        } else {
            DiffPolicy {
                full_frame_ratio: self.config.full_frame_ratio,
            }
        };
        let Some(redo) = diff::diff_with(before, &scratch, policy)? else {
            return Ok(None);
        };
        let undo = redo.recapture(before)?;
        let layer = self
            .state
            .node_mut(target)
            .and_then(|node| node.layer_mut())
            .ok_or_else(|| TargetError::NotALayer(target.clone()))?;
        layer.buffer_mut().replace(scratch)?;
        Ok(Some(Diff::Image(vec![LayerImageDiff {
            layer: target.clone(),
            diff: undo,
        }])))
    }
    #[allow(clippy::cast_precision_loss)]
    fn push(&mut self, entry: HistoryEntry) -> Applied {
        let barrier = std::mem::take(&mut self.merge_barrier);
        let window = self.config.merge_window_ms;
        let entry = match self.backward.last_mut() {
            Some(last) if !barrier && mergeable(&last.record, &entry.record, window) => {
                match last.diff.absorb(entry.diff) {
                    Ok(()) => {
                        last.record.timestamp = entry.record.timestamp;
                        log::trace!(
                            "merged {} into previous step",
                            last.record.kind.as_ref()
                        );
                        return Applied::Merged;
                    }
                    Err(diff) => HistoryEntry {
                        record: entry.record,
                        diff,
                    },
                }
            }
            _ => entry,
        };
        log::trace!(
            "pushed {} ({})",
            entry.record.kind.as_ref(),
            human_bytes::human_bytes(entry.diff.byte_size() as f64)
        );
        self.backward.push(entry);
        if let Some(limit) = self.config.history_limit {
            if self.backward.len() > limit {
                let excess = self.backward.len() - limit;
                self.backward.drain(..excess);
                log::debug!("dropped {excess} oldest history steps");
            }
        }
        Applied::Pushed
    }
    /// Apply a recorded diff, returning the diff that reverts it.
    /// Everything is checked up front, so on error the state is untouched.
    fn apply_diff(&mut self, diff: &Diff) -> Result<Diff, DocumentError> {
        match diff {
            Diff::Structural(patches) => {
                let mut next = self.state.clone();
                let inverse = patch::apply_all(&mut next, patches)?;
                self.state = next;
                Ok(Diff::Structural(inverse))
            }
            Diff::Image(diffs) => {
                for LayerImageDiff { layer, diff } in diffs {
                    diff.check_fits(self.state.layer(layer)?.buffer().size())?;
                }
                let mut inverse = Vec::with_capacity(diffs.len());
                for LayerImageDiff { layer, diff } in diffs {
                    let buffer = self
                        .state
                        .node_mut(layer)
                        .and_then(|node| node.layer_mut())
                        .ok_or_else(|| TargetError::NotALayer(layer.clone()))?
                        .buffer_mut();
                    inverse.push(LayerImageDiff {
                        layer: layer.clone(),
                        diff: diff.apply_and_capture(buffer.make_mut())?,
                    });
                }
                inverse.reverse();
                Ok(Diff::Image(inverse))
            }
        }
    }
    /// Step back one entry. Returns false if there was nothing to undo.
    pub fn undo(&mut self) -> Result<bool, DocumentError> {
        let Some(entry) = self.backward.pop() else {
            return Ok(false);
        };
        match self.apply_diff(&entry.diff) {
            Ok(redo) => {
                log::trace!("undid {}", entry.record.kind.as_ref());
                self.forward.push(HistoryEntry {
                    record: entry.record,
                    diff: redo,
                });
                self.merge_barrier = true;
                Ok(true)
            }
            Err(err) => {
                log::warn!("history entry could not be undone: {err}");
                self.backward.push(entry);
                Err(err)
            }
        }
    }
    /// Step forward one entry. Returns false if there was nothing to redo.
    pub fn redo(&mut self) -> Result<bool, DocumentError> {
        let Some(entry) = self.forward.pop() else {
            return Ok(false);
        };
        match self.apply_diff(&entry.diff) {
            Ok(undo) => {
                log::trace!("redid {}", entry.record.kind.as_ref());
                self.backward.push(HistoryEntry {
                    record: entry.record,
                    diff: undo,
                });
                self.merge_barrier = true;
                Ok(true)
            }
            Err(err) => {
                log::warn!("history entry could not be redone: {err}");
                self.forward.push(entry);
                Err(err)
            }
        }
    }
    /// Undo up to `num` steps, returning how many were undone.
    pub fn undo_n(&mut self, num: usize) -> Result<usize, DocumentError> {
        for done in 0..num {
            if !self.undo()? {
                return Ok(done);
            }
        }
        Ok(num)
    }
    /// Redo up to `num` steps, returning how many were redone.
    pub fn redo_n(&mut self, num: usize) -> Result<usize, DocumentError> {
        for done in 0..num {
            if !self.redo()? {
                return Ok(done);
            }
        }
        Ok(num)
    }
}

/// Reject a patch touching a locked node or a node within a locked group. Adding counts as
/// touching the receiving group, moving as touching both ends. Flipping `locked` or `visible` is
/// always allowed.
fn check_unlocked(before: &State, after: &State, patch: &Patch) -> Result<(), DocumentError> {
    let exempt = |path: &Path| {
        matches!(
            path.last().and_then(Key::as_field),
            Some(fields::LOCKED | fields::VISIBLE)
        )
    };
    let touched = match patch {
        Patch::Replace { path, .. } if exempt(path) => return Ok(()),
        Patch::Replace { path, .. } | Patch::Remove { path } => touched_by(before, path),
        Patch::Add { path, .. } => path
            .parent()
            .map(|list| touched_by(before, &list))
            .unwrap_or_default(),
        Patch::Move { from, to } => {
            let mut touched = touched_by(before, from);
            // `to` only makes sense once the value was moved.
            if let Some(list) = to.parent() {
                touched.extend(touched_by(after, &list));
            }
            touched
        }
    };
    match touched.into_iter().find(|node| node.props().locked) {
        Some(node) => {
            log::debug!("rejected patch at {} within locked {}", patch.path(), node.id());
            Err(DocumentError::LayerLocked(node.id().clone()))
        }
        None => Ok(()),
    }
}

/// Nodes along `path`, plus every member if it addresses a whole node list.
fn touched_by<'s>(state: &'s State, path: &Path) -> Vec<&'s LayerNode> {
    let mut nodes = state.nodes_along(path);
    let list = match path.last().and_then(Key::as_field) {
        Some(fields::LAYERS) => state.layers(),
        Some(fields::CHILDREN) => nodes.last().copied().map_or(&[][..], LayerNode::children),
        _ => &[],
    };
    nodes.extend(list);
    nodes
}

/// Is `next` compatible with `last`, and recent enough to fold into it?
fn mergeable(last: &OperationRecord, next: &OperationRecord, window_ms: u64) -> bool {
    last.is_compatible(next)
        && next
            .timestamp
            .millis_since(last.timestamp)
            .is_some_and(|elapsed| elapsed <= window_ms)
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::{
        commands,
        patch::{Value, APPEND},
        path,
        selection::{CombineMode, Selection},
        state::{Location, NodeProps},
        util::{Opacity, Rect, Size, Timestamp},
    };
    use image::Rgba;
    use proptest::prelude::*;

    const RED: Rgba<u8> = Rgba([255, 0, 0, 255]);

    fn init_log() {
        let _ = env_logger::builder().is_test(true).try_init();
    }
    fn canvas(size: u32) -> (DocumentQueue, NodeId) {
        init_log();
        let state = State::new(Size::new(size, size)).with_layer("background");
        let id = state.layers()[0].id().clone();
        (DocumentQueue::new(state), id)
    }
    fn dot(target: &NodeId, x: u32, millis: u64) -> Operation {
        commands::stroke(target.clone(), move |ctx| ctx.put_pixel(x, 0, RED))
            .at(Timestamp::from_millis(millis))
    }

    #[test]
    fn fill_selection_undo_redo() -> anyhow::Result<()> {
        let (mut queue, layer) = canvas(400);
        let before = queue.state().clone();

        let mut selection = Selection::new(queue.state().size());
        selection.add_rect(Rect::new(10, 10, 50, 50), CombineMode::New);
        queue.apply(commands::replace_selection(queue.state(), Some(selection)))?;
        queue.apply(commands::selection_fill(layer.clone(), RED))?;
        let after = queue.state().clone();
        let buffer = after.layer(&layer)?.buffer();
        assert_eq!(buffer.content_bounds(), Some(Rect::new(10, 10, 50, 50)));
        assert_eq!(queue.backward_len(), 2);

        assert!(queue.undo()?);
        assert_eq!(
            queue.state().layer(&layer)?.buffer(),
            before.layer(&layer)?.buffer()
        );
        assert!(queue.redo()?);
        assert_eq!(queue.state().layer(&layer)?.buffer(), buffer);
        assert_eq!(queue.state(), &after);
        Ok(())
    }
    #[test]
    fn locked_layer_rejected() -> anyhow::Result<()> {
        let (mut queue, layer) = canvas(8);
        queue.apply(commands::set_locked(queue.state(), &layer, true)?)?;
        let depth = queue.backward_len();
        assert_eq!(
            queue.apply(dot(&layer, 0, 0)),
            Err(DocumentError::LayerLocked(layer.clone()))
        );
        assert_eq!(queue.backward_len(), depth);
        // Unlocking is still allowed.
        queue.apply(commands::set_locked(queue.state(), &layer, false)?)?;
        assert_eq!(queue.apply(dot(&layer, 0, 0))?, Applied::Pushed);
        Ok(())
    }
    #[test]
    fn locked_group_protects_children() -> anyhow::Result<()> {
        let (mut queue, _) = canvas(8);
        let (op, group) = commands::add_group(queue.state(), Location::IndexIntoRoot(0), "g")?;
        queue.apply(op)?;
        let (op, child) =
            commands::add_layer(queue.state(), Location::IndexIntoGroup(&group, 0), "c")?;
        queue.apply(op)?;
        queue.apply(commands::set_locked(queue.state(), &group, true)?)?;
        assert_eq!(
            queue.apply(dot(&child, 1, 0)),
            Err(DocumentError::LayerLocked(child.clone()))
        );
        assert!(matches!(
            queue.apply(commands::set_opacity(
                queue.state(),
                &child,
                crate::util::Opacity::TRANSPARENT
            )?),
            Err(DocumentError::LayerLocked(_))
        ));
        Ok(())
    }
    #[test]
    fn appended_node_undoes() -> anyhow::Result<()> {
        let (mut queue, _) = canvas(8);
        let before = queue.state().clone();
        let node = LayerNode::new_layer("extra".into(), NodeProps::named("extra"), Size::new(8, 8));
        let op = commands::patches(vec![Patch::Add {
            path: path![fields::LAYERS, APPEND],
            value: node.into(),
        }]);
        assert_eq!(queue.apply(op)?, Applied::Pushed);
        let after = queue.state().clone();
        assert_eq!(after.layers().len(), 2);
        assert!(queue.undo()?);
        assert_eq!(queue.state(), &before);
        assert!(queue.redo()?);
        assert_eq!(queue.state(), &after);
        Ok(())
    }
    #[test]
    fn raw_patches_respect_locks() -> anyhow::Result<()> {
        let (mut queue, layer) = canvas(8);
        queue.apply(commands::set_locked(queue.state(), &layer, true)?)?;
        let before = queue.state().clone();
        let rejected = [
            Patch::Replace {
                path: path![fields::LAYERS, 0, fields::OPACITY],
                value: Value::Number(0.0),
            },
            Patch::Remove {
                path: path![fields::LAYERS, 0],
            },
            Patch::Replace {
                path: path![fields::LAYERS],
                value: Value::Seq(Vec::new()),
            },
            Patch::Move {
                from: path![fields::LAYERS, 0],
                to: path![fields::LAYERS, APPEND],
            },
        ];
        for patch in rejected {
            assert_eq!(
                queue.apply(commands::patches(vec![patch])),
                Err(DocumentError::LayerLocked(layer.clone()))
            );
            assert_eq!(queue.state(), &before);
        }
        // Hiding is fine, and so is unlocking then editing within one batch.
        let unlock_then_fade = vec![
            Patch::Replace {
                path: path![fields::LAYERS, 0, fields::LOCKED],
                value: Value::Bool(false),
            },
            Patch::Replace {
                path: path![fields::LAYERS, 0, fields::OPACITY],
                value: Value::Number(0.0),
            },
        ];
        assert_eq!(queue.apply(commands::patches(unlock_then_fade))?, Applied::Pushed);
        assert_eq!(
            queue.state().layers()[0].props().blend.opacity,
            Opacity::TRANSPARENT
        );
        Ok(())
    }
    #[test]
    fn locked_group_refuses_arrivals() -> anyhow::Result<()> {
        let (mut queue, background) = canvas(8);
        let (op, group) = commands::add_group(queue.state(), Location::IndexIntoRoot(0), "g")?;
        queue.apply(op)?;
        queue.apply(commands::set_locked(queue.state(), &group, true)?)?;
        let before = queue.state().clone();
        assert_eq!(
            queue.apply(commands::move_node(
                queue.state(),
                &background,
                Location::IndexIntoGroup(&group, 0),
            )?),
            Err(DocumentError::LayerLocked(group.clone()))
        );
        assert_eq!(
            queue.apply(commands::patches(vec![Patch::Add {
                path: path![fields::LAYERS, 0, fields::CHILDREN, APPEND],
                value: LayerNode::new_group("x".into(), NodeProps::named("x"), Vec::new()).into(),
            }])),
            Err(DocumentError::LayerLocked(group.clone()))
        );
        assert_eq!(queue.state(), &before);
        assert!(queue.state().get(&group).is_some_and(|g| g.children().is_empty()));
        Ok(())
    }
    #[test]
    fn merge_window() -> anyhow::Result<()> {
        let (mut queue, layer) = canvas(8);
        assert_eq!(queue.apply(dot(&layer, 0, 10_000))?, Applied::Pushed);
        assert_eq!(queue.apply(dot(&layer, 1, 10_500))?, Applied::Merged);
        assert_eq!(queue.backward_len(), 1);
        // Merged entries keep the later timestamp.
        assert_eq!(queue.peek().map(|r| r.timestamp.millis()), Some(10_500));
        assert_eq!(queue.apply(dot(&layer, 2, 12_000))?, Applied::Pushed);
        assert_eq!(queue.backward_len(), 2);

        // One undo takes out both merged dots.
        queue.undo_n(2)?;
        assert_eq!(queue.state().layer(&layer)?.buffer().content_bounds(), None);
        Ok(())
    }
    #[test]
    fn no_merge_across_undo() -> anyhow::Result<()> {
        let (mut queue, layer) = canvas(8);
        queue.apply(dot(&layer, 0, 0))?;
        queue.apply(dot(&layer, 1, 2000))?;
        queue.undo()?;
        // Within the window of the first dot, but history moved in between.
        assert_eq!(queue.apply(dot(&layer, 2, 500))?, Applied::Pushed);
        assert_eq!(queue.backward_len(), 2);
        // New edits invalidate redo.
        assert!(!queue.can_redo());
        Ok(())
    }
    #[test]
    fn empty_diff_is_noop() -> anyhow::Result<()> {
        let (mut queue, layer) = canvas(8);
        let before = queue.state().clone();
        // Nothing selected, so nothing to fill.
        assert_eq!(
            queue.apply(commands::selection_fill(layer.clone(), RED))?,
            Applied::Unchanged
        );
        // Already visible.
        assert_eq!(
            queue.apply(commands::set_visibility(queue.state(), &layer, true)?)?,
            Applied::Unchanged
        );
        assert_eq!(queue.backward_len(), 0);
        assert_eq!(queue.state(), &before);
        Ok(())
    }
    #[test]
    fn history_limit() -> anyhow::Result<()> {
        init_log();
        let state = State::new(Size::new(4, 4)).with_layer("a");
        let layer = state.layers()[0].id().clone();
        let mut queue = DocumentQueue::with_config(
            state,
            DocumentConfig {
                history_limit: Some(2),
                ..Default::default()
            },
        );
        for x in 0..4 {
            queue.apply(dot(&layer, x, u64::from(x) * 10_000))?;
        }
        assert_eq!(queue.backward_len(), 2);
        assert_eq!(queue.undo_n(10)?, 2);
        // The two oldest dots can no longer be undone.
        let image = queue.state().layer(&layer)?.buffer().image().clone();
        assert_eq!(image.get_pixel(1, 0), &RED);
        assert_eq!(image.get_pixel(2, 0).0, [0; 4]);
        Ok(())
    }
    #[test]
    fn undo_all_redo_all() -> anyhow::Result<()> {
        let (mut queue, background) = canvas(16);
        let (op, top) = commands::add_layer(queue.state(), Location::IndexIntoRoot(0), "top")?;
        queue.apply(op)?;
        queue.apply(commands::flood_fill(background.clone(), RED).at(Timestamp::from_millis(0)))?;
        queue.apply(commands::modify_selection(queue.state(), |s| {
            s.add_ellipse(Rect::new(2, 2, 10, 8), CombineMode::New);
        }))?;
        queue.apply(commands::selection_delete(background.clone()))?;
        queue.apply(commands::filled_path(
            top.clone(),
            vec![[0.0, 0.0], [16.0, 0.0], [0.0, 16.0]],
            Rgba([0, 0, 255, 128]),
        ))?;
        queue.apply(commands::set_blend_mode(
            queue.state(),
            &top,
            crate::blend::BlendMode::Multiply,
        )?)?;
        queue.apply(commands::move_node(
            queue.state(),
            &top,
            Location::IndexIntoRoot(1),
        )?)?;
        queue.apply(commands::remove_node(queue.state(), &background)?)?;
        let final_state = queue.state().clone();
        let steps = queue.backward_len();
        assert_eq!(steps, 8);
        assert_eq!(queue.undo_n(usize::MAX)?, steps);
        let initial = queue.state().clone();
        assert_eq!(queue.redo_n(usize::MAX)?, steps);
        assert_eq!(queue.state(), &final_state);
        assert_eq!(initial.layers().len(), 1);
        assert_eq!(initial.layers()[0].id(), &background);
        assert_eq!(initial.layer(&background)?.buffer().content_bounds(), None);
        assert_eq!(initial.selection(), None);
        Ok(())
    }
    #[test]
    fn effect_records_full_frame() -> anyhow::Result<()> {
        let (mut queue, layer) = canvas(8);
        queue.apply(commands::apply_effect(layer.clone(), |ctx| {
            ctx.put_pixel(3, 3, RED);
        }))?;
        queue.undo()?;
        let Some(HistoryEntry {
            diff: Diff::Image(diffs),
            ..
        }) = queue.forward.last()
        else {
            panic!("expected an image diff");
        };
        assert!(diffs[0].diff.is_full_frame());
        Ok(())
    }

    /// Interpret a random triple as some operation on the current state. None where the choice
    /// makes no sense for it, e.g. painting without any layer.
    #[allow(clippy::cast_possible_truncation, clippy::cast_precision_loss)]
    fn arbitrary_op(state: &State, op: u8, a: usize, b: usize) -> Option<Operation> {
        let nodes: Vec<&LayerNode> = state.iter().map(|(node, _)| node).collect();
        let layers: Vec<&LayerNode> = nodes.iter().copied().filter(|n| !n.is_group()).collect();
        let groups: Vec<&LayerNode> = nodes.iter().copied().filter(|n| n.is_group()).collect();
        let node = (!nodes.is_empty()).then(|| nodes[a % nodes.len()].id().clone());
        let layer = (!layers.is_empty()).then(|| layers[a % layers.len()].id().clone());
        let (x, y) = ((b % 8) as u32, (b / 8 % 8) as u32);
        let color = Rgba([(a % 256) as u8, 0, (b % 256) as u8, 255]);
        Some(match op {
            0 => commands::stroke(layer?, move |ctx| ctx.put_pixel(x, y, color)),
            1 => commands::flood_fill(layer?, color),
            2 => match groups.get(b % (groups.len() + 1)) {
                Some(group) => {
                    commands::add_layer(state, Location::IndexIntoGroup(group.id(), a % 3), "l")
                        .ok()?
                        .0
                }
                None => commands::add_layer(state, Location::IndexIntoRoot(a % 4), "l").ok()?.0,
            },
            3 => commands::add_group(state, Location::IndexIntoRoot(a % 4), "g").ok()?.0,
            4 => commands::remove_node(state, &node?).ok()?,
            5 => {
                let dest = nodes.get(b % nodes.len().max(1))?.id();
                let location = match b % 3 {
                    0 => Location::IndexIntoRoot(a % 4),
                    1 => Location::IndexIntoGroup(dest, a % 3),
                    _ => Location::Above(dest),
                };
                commands::move_node(state, &node?, location).ok()?
            }
            6 => commands::set_opacity(state, &node?, Opacity::new((b % 11) as f32 / 10.0).ok()?)
                .ok()?,
            7 => commands::set_visibility(state, &node?, b % 2 == 0).ok()?,
            8 => commands::set_locked(state, &node?, b % 4 == 0).ok()?,
            9 => commands::set_name(state, &node?, &format!("n{b}")).ok()?,
            10 => {
                let selection = (b % 3 != 0).then(|| {
                    let mut selection = Selection::new(state.size());
                    selection.add_rect(Rect::new(x, y, 3, 2), CombineMode::New);
                    selection
                });
                commands::replace_selection(state, selection)
            }
            11 => commands::selection_fill(layer?, color),
            _ => commands::selection_delete(layer?),
        })
    }

    proptest! {
        #[test]
        fn history_round_trips(
            steps in proptest::collection::vec((0..13u8, any::<usize>(), any::<usize>(), any::<bool>()), 1..16)
        ) {
            let (mut queue, _) = canvas(8);
            let initial = queue.state().clone();
            let mut millis = 0;
            for (op, a, b, quick) in steps {
                let Some(op) = arbitrary_op(queue.state(), op, a, b) else {
                    continue;
                };
                millis += if quick { 100 } else { 5000 };
                let before = queue.state().clone();
                if queue.apply(op.at(Timestamp::from_millis(millis))).is_err() {
                    // Rejected edits leave no trace.
                    prop_assert_eq!(queue.state(), &before);
                }
            }
            let last = queue.state().clone();
            let steps = queue.backward_len();
            prop_assert_eq!(queue.undo_n(usize::MAX).unwrap(), steps);
            prop_assert_eq!(queue.state(), &initial);
            prop_assert_eq!(queue.redo_n(usize::MAX).unwrap(), steps);
            prop_assert_eq!(queue.state(), &last);
        }
    }
}
