//! Constructors for every operation the tool layer emits.
//!
//! Structural builders read the current state to resolve ids into patch paths, so the resulting
//! operation must be applied to that same state.

use super::{CommandError, Operation, OperationKind};
use crate::{
    blend::BlendMode,
    patch::{self, Patch, Path, Value},
    raster::{DrawContext, PathSink},
    selection::{CombineMode, Selection, SelectionError},
    state::{fields, LayerNode, Location, NodeId, NodeProps, State, TargetError},
    util::Opacity,
};

/// The containing group of the slot a location refers to, for lock checks.
fn location_owner(state: &State, location: Location<'_>) -> Option<NodeId> {
    match location {
        Location::IndexIntoGroup(group, _) => Some(group.clone()),
        Location::IndexIntoRoot(_) => None,
        Location::Above(sibling) => parent_of(state, sibling),
    }
}

fn parent_of(state: &State, id: &NodeId) -> Option<NodeId> {
    let lineage = state.lineage(id)?;
    let parent = lineage.len().checked_sub(2)?;
    Some(lineage[parent].id().clone())
}

fn node_path(state: &State, id: &NodeId) -> Result<Path, TargetError> {
    state
        .path_of(id)
        .ok_or_else(|| TargetError::NotFound(id.clone()))
}

#[allow(clippy::cast_precision_loss)]
fn bump_id(state: &State) -> Patch {
    Patch::Replace {
        path: Path::root().with(fields::NEXT_ID),
        value: Value::Number((state.next_id() + 1) as f64),
    }
}

fn add_node(state: &State, location: Location<'_>, node: LayerNode) -> Result<Operation, CommandError> {
    let path = state.resolve(location)?;
    Ok(Operation::structural(
        OperationKind::AddNode,
        location_owner(state, location),
        vec![
            Patch::Add {
                path,
                value: Value::Node(node),
            },
            bump_id(state),
        ],
    ))
}

/// Insert a new transparent layer. Returns the operation along with the id the layer will have.
pub fn add_layer(
    state: &State,
    location: Location<'_>,
    name: &str,
) -> Result<(Operation, NodeId), CommandError> {
    let id = state.peek_id("layer");
    let node = LayerNode::new_layer(id.clone(), NodeProps::named(name), state.size());
    Ok((add_node(state, location, node)?, id))
}

/// Insert a new empty group. Returns the operation along with the id the group will have.
pub fn add_group(
    state: &State,
    location: Location<'_>,
    name: &str,
) -> Result<(Operation, NodeId), CommandError> {
    let id = state.peek_id("group");
    let node = LayerNode::new_group(id.clone(), NodeProps::named(name), Vec::new());
    Ok((add_node(state, location, node)?, id))
}

/// Delete a node, along with all its descendants.
pub fn remove_node(state: &State, id: &NodeId) -> Result<Operation, CommandError> {
    Ok(Operation::structural(
        OperationKind::RemoveNode,
        Some(id.clone()),
        vec![Patch::Remove {
            path: node_path(state, id)?,
        }],
    ))
}

/// Move a node, and all its descendants, to a new location.
pub fn move_node(
    state: &State,
    id: &NodeId,
    location: Location<'_>,
) -> Result<Operation, CommandError> {
    let from = node_path(state, id)?;
    let node = state.get(id).ok_or_else(|| TargetError::NotFound(id.clone()))?;
    let to = match location {
        Location::Above(sibling) if sibling == id => from.clone(),
        Location::Above(target) | Location::IndexIntoGroup(target, _) if node.contains(target) => {
            return Err(TargetError::WouldCycle.into());
        }
        _ => {
            // Destinations are addressed as they are after the node is taken out.
            let mut without = state.clone();
            patch::apply_in_place(
                &mut without,
                &Patch::Remove {
                    path: from.clone(),
                },
            )?;
            without.resolve(location)?
        }
    };
    Ok(Operation::structural(
        OperationKind::MoveNode,
        Some(id.clone()),
        vec![Patch::Move { from, to }],
    ))
}

fn set_prop(
    state: &State,
    kind: OperationKind,
    id: &NodeId,
    field: &str,
    value: Value,
) -> Result<Operation, CommandError> {
    Ok(Operation::structural(
        kind,
        Some(id.clone()),
        vec![Patch::Replace {
            path: node_path(state, id)?.with(field),
            value,
        }],
    ))
}

pub fn set_visibility(state: &State, id: &NodeId, visible: bool) -> Result<Operation, CommandError> {
    set_prop(state, OperationKind::SetVisibility, id, fields::VISIBLE, visible.into())
}
pub fn set_opacity(state: &State, id: &NodeId, opacity: Opacity) -> Result<Operation, CommandError> {
    set_prop(state, OperationKind::SetOpacity, id, fields::OPACITY, opacity.get().into())
}
pub fn set_blend_mode(state: &State, id: &NodeId, mode: BlendMode) -> Result<Operation, CommandError> {
    set_prop(state, OperationKind::SetBlend, id, fields::BLEND, mode.into())
}
pub fn set_locked(state: &State, id: &NodeId, locked: bool) -> Result<Operation, CommandError> {
    set_prop(state, OperationKind::SetLocked, id, fields::LOCKED, locked.into())
}
pub fn set_name(state: &State, id: &NodeId, name: &str) -> Result<Operation, CommandError> {
    set_prop(state, OperationKind::SetName, id, fields::NAME, name.into())
}

/// Swap out the document selection. `None` deselects.
#[must_use]
pub fn replace_selection(state: &State, selection: Option<Selection>) -> Operation {
    let path = Path::root().with(fields::SELECTION);
    let patches = match (state.selection().is_some(), selection) {
        (false, None) => Vec::new(),
        (false, Some(selection)) => vec![Patch::Add {
            path,
            value: selection.into(),
        }],
        (true, None) => vec![Patch::Remove { path }],
        (true, Some(selection)) => vec![Patch::Replace {
            path,
            value: selection.into(),
        }],
    };
    Operation::structural(OperationKind::ReplaceSelection, None, patches)
}

/// Derive a new selection from the current one (or an empty one), e.g. with a selection tool.
#[must_use]
pub fn modify_selection(state: &State, edit: impl FnOnce(&mut Selection)) -> Operation {
    let mut selection = state
        .selection()
        .cloned()
        .unwrap_or_else(|| Selection::new(state.size()));
    edit(&mut selection);
    replace_selection(state, Some(selection))
}

/// A raw list of patches, not associated with any node.
#[must_use]
pub fn patches(patches: Vec<Patch>) -> Operation {
    Operation::structural(OperationKind::Patch, None, patches)
}

/// A brush stroke, already rasterized by the caller's callback.
pub fn stroke(target: NodeId, draw: impl FnOnce(&mut DrawContext<'_>) + 'static) -> Operation {
    Operation::pixels(OperationKind::Stroke, target, draw)
}

/// Fill a closed polygon, restricted to the selection if there is one.
#[must_use]
pub fn filled_path(target: NodeId, polygon: Vec<[f32; 2]>, color: image::Rgba<u8>) -> Operation {
    Operation::pixels(OperationKind::FilledPath, target, move |ctx| {
        ctx.clip_to_selection();
        ctx.begin_path();
        let mut points = polygon.into_iter();
        if let Some([x, y]) = points.next() {
            ctx.move_to(x, y);
        }
        for [x, y] in points {
            ctx.line_to(x, y);
        }
        ctx.close_path();
        ctx.fill_path(color);
    })
}

/// Fill the whole layer, or just the selection if there is one.
#[must_use]
pub fn flood_fill(target: NodeId, color: image::Rgba<u8>) -> Operation {
    Operation::pixels(OperationKind::FloodFill, target, move |ctx| {
        ctx.clip_to_selection();
        ctx.fill(color);
    })
}

/// Fill the selection. Does nothing if nothing is selected.
#[must_use]
pub fn selection_fill(target: NodeId, color: image::Rgba<u8>) -> Operation {
    Operation::pixels(OperationKind::SelectionFill, target, move |ctx| {
        if ctx.clip_to_selection() {
            ctx.fill(color);
        }
    })
}

/// Erase the selection. Does nothing if nothing is selected.
#[must_use]
pub fn selection_delete(target: NodeId) -> Operation {
    Operation::pixels(OperationKind::SelectionDelete, target, |ctx| {
        if ctx.clip_to_selection() {
            ctx.clear();
        }
    })
}

/// Paint bucket: fill the contiguous region of similar color around `seed`, within the selection.
pub fn bucket_fill(
    state: &State,
    target: &NodeId,
    seed: (u32, u32),
    tolerance: u8,
    color: image::Rgba<u8>,
) -> Result<Operation, CommandError> {
    let layer = state.layer(target)?;
    let mut region = Selection::new(state.size());
    region.add_magic_wand(layer.buffer().image(), seed, tolerance, CombineMode::New)?;
    if let Some(selection) = state.selection() {
        region
            .combine(selection, CombineMode::Intersect)
            .map_err(SelectionError::from)?;
    }
    Ok(Operation::pixels(
        OperationKind::BucketFill,
        target.clone(),
        move |ctx| {
            let Some(bounds) = region.bounds() else {
                return;
            };
            for y in bounds.y..bounds.bottom() {
                for x in bounds.x..bounds.right() {
                    if region.contains(x, y) {
                        ctx.put_pixel(x, y, color);
                    }
                }
            }
        },
    ))
}

/// Geometric transform of the layer contents, performed by the callback.
pub fn transform(target: NodeId, draw: impl FnOnce(&mut DrawContext<'_>) + 'static) -> Operation {
    Operation::pixels(OperationKind::Transform, target, draw)
}

/// A filter or effect over the layer contents, performed by the callback.
pub fn apply_effect(
    target: NodeId,
    draw: impl FnOnce(&mut DrawContext<'_>) + 'static,
) -> Operation {
    Operation::pixels(OperationKind::ApplyEffect, target, draw)
}
