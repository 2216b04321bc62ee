//! # Document state
//!
//! One immutable snapshot of the whole document: the layer tree, the selection, the canvas size,
//! and the id counter. Edits never mutate a published state. Instead they derive a new one,
//! sharing every untouched subtree and buffer with the old.

pub mod graph;
pub mod persist;
mod tree;

use std::sync::Arc;

pub use graph::{Group, Layer, LayerNode, Location, NodeId, NodeProps, TargetError};

use crate::{
    patch::{Key, Path},
    selection::Selection,
    util::{DimensionMismatch, Size},
};

/// Field names of the state tree, as used in patch paths.
pub mod fields {
    pub const LAYERS: &str = "layers";
    pub const CHILDREN: &str = "children";
    pub const SELECTION: &str = "selection";
    pub const NEXT_ID: &str = "next_id";
    pub const WIDTH: &str = "width";
    pub const HEIGHT: &str = "height";
    pub const ID: &str = "id";
    pub const NAME: &str = "name";
    pub const VISIBLE: &str = "visible";
    pub const OPACITY: &str = "opacity";
    pub const BLEND: &str = "blend";
    pub const LOCKED: &str = "locked";
}

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum StateError {
    #[error("duplicate node id {0}")]
    DuplicateId(NodeId),
    #[error("buffer of layer {id}: {source}")]
    BufferSize {
        id: NodeId,
        #[source]
        source: DimensionMismatch,
    },
    #[error("selection: {0}")]
    SelectionSize(#[source] DimensionMismatch),
}

#[derive(Clone, Debug, PartialEq)]
pub struct State {
    size: Size,
    next_id: u64,
    layers: Vec<LayerNode>,
    selection: Option<Arc<Selection>>,
}
impl State {
    /// An empty document.
    #[must_use]
    pub fn new(size: Size) -> Self {
        Self {
            size,
            next_id: 0,
            layers: Vec::new(),
            selection: None,
        }
    }
    /// Assemble a state from parts, checking every structural invariant.
    pub fn from_parts(
        size: Size,
        next_id: u64,
        layers: Vec<LayerNode>,
        selection: Option<Selection>,
    ) -> Result<Self, StateError> {
        let state = Self {
            size,
            next_id,
            layers,
            selection: selection.map(Arc::new),
        };
        state.validate()?;
        Ok(state)
    }
    /// Builder for fresh documents - add a new transparent layer at the bottom.
    #[must_use]
    pub fn with_layer(mut self, name: &str) -> Self {
        let id = self.peek_id("layer");
        self.next_id += 1;
        self.layers
            .push(LayerNode::new_layer(id, NodeProps::named(name), self.size));
        self
    }
    #[must_use]
    pub fn size(&self) -> Size {
        self.size
    }
    /// The counter from which the next node id is derived.
    #[must_use]
    pub fn next_id(&self) -> u64 {
        self.next_id
    }
    /// The id the next created node would receive.
    #[must_use]
    pub fn peek_id(&self, prefix: &str) -> NodeId {
        NodeId::new(&format!("{prefix}-{}", self.next_id))
    }
    /// Top-level nodes, top-most first.
    #[must_use]
    pub fn layers(&self) -> &[LayerNode] {
        &self.layers
    }
    #[must_use]
    pub fn selection(&self) -> Option<&Selection> {
        self.selection.as_deref()
    }
    #[must_use]
    pub fn selection_arc(&self) -> Option<&Arc<Selection>> {
        self.selection.as_ref()
    }
    /// Every node, depth-first, top-most first, along with its nesting depth.
    pub fn iter(&self) -> graph::Iter<'_> {
        graph::Iter::new(&self.layers)
    }
    /// Child indices leading from the root to the node.
    fn index_path(&self, id: &NodeId) -> Option<Vec<usize>> {
        fn search(nodes: &[LayerNode], id: &NodeId, trail: &mut Vec<usize>) -> bool {
            for (idx, node) in nodes.iter().enumerate() {
                trail.push(idx);
                if node.id() == id || search(node.children(), id, trail) {
                    return true;
                }
                trail.pop();
            }
            false
        }
        let mut trail = Vec::new();
        search(&self.layers, id, &mut trail).then_some(trail)
    }
    #[must_use]
    pub fn get(&self, id: &NodeId) -> Option<&LayerNode> {
        let indices = self.index_path(id)?;
        let (&first, rest) = indices.split_first()?;
        let mut node = self.layers.get(first)?;
        for &idx in rest {
            node = node.children().get(idx)?;
        }
        Some(node)
    }
    pub fn layer(&self, id: &NodeId) -> Result<&Layer, TargetError> {
        self.get(id)
            .ok_or_else(|| TargetError::NotFound(id.clone()))?
            .as_layer()
            .ok_or_else(|| TargetError::NotALayer(id.clone()))
    }
    /// Patch path addressing the node, e.g. `/layers/1/children/0`.
    #[must_use]
    pub fn path_of(&self, id: &NodeId) -> Option<Path> {
        let indices = self.index_path(id)?;
        let mut path = Path::root().with(fields::LAYERS);
        for (depth, idx) in indices.into_iter().enumerate() {
            if depth != 0 {
                path.push(fields::CHILDREN);
            }
            path.push(idx);
        }
        Some(path)
    }
    /// The chain of nodes from the top level down to and including the node.
    #[must_use]
    pub fn lineage(&self, id: &NodeId) -> Option<Vec<&LayerNode>> {
        let indices = self.index_path(id)?;
        let mut lineage = Vec::with_capacity(indices.len());
        let mut siblings = self.layers.as_slice();
        for idx in indices {
            let node = siblings.get(idx)?;
            lineage.push(node);
            siblings = node.children();
        }
        Some(lineage)
    }
    /// The nodes a patch path walks through, top-level first. `/layers/1/children/0/name` yields the
    /// group at `/layers/1` and its first child. Stops early at missing indices.
    #[must_use]
    pub fn nodes_along(&self, path: &Path) -> Vec<&LayerNode> {
        let mut nodes = Vec::new();
        let mut keys = path.keys().iter();
        if keys.next().and_then(Key::as_field) != Some(fields::LAYERS) {
            return nodes;
        }
        let mut siblings = self.layers.as_slice();
        while let Some(node) = keys
            .next()
            .and_then(Key::as_index)
            .and_then(move |idx| siblings.get(idx))
        {
            nodes.push(node);
            if keys.next().and_then(Key::as_field) != Some(fields::CHILDREN) {
                break;
            }
            siblings = node.children();
        }
        nodes
    }
    /// Whether the node or any group containing it is locked. None if no such node.
    #[must_use]
    pub fn is_locked(&self, id: &NodeId) -> Option<bool> {
        Some(
            self.lineage(id)?
                .into_iter()
                .any(|node| node.props().locked),
        )
    }
    /// Copy-on-write access to a node, refreshing the revision of every group along the way.
    pub fn node_mut(&mut self, id: &NodeId) -> Option<&mut LayerNode> {
        let indices = self.index_path(id)?;
        let (&first, rest) = indices.split_first()?;
        let mut node = self.layers.get_mut(first)?;
        for &idx in rest {
            node = node.children_mut()?.get_mut(idx)?;
        }
        Some(node)
    }
    /// Resolve a location into the path of a new list slot, e.g. `/layers/0/children/3`.
    pub fn resolve(&self, location: Location<'_>) -> Result<Path, TargetError> {
        match location {
            Location::IndexIntoRoot(idx) => Ok(Path::root()
                .with(fields::LAYERS)
                .with(idx.min(self.layers.len()))),
            Location::IndexIntoGroup(group_id, idx) => {
                let group = self
                    .get(group_id)
                    .ok_or_else(|| TargetError::NotFound(group_id.clone()))?;
                let children = group
                    .as_group()
                    .ok_or_else(|| TargetError::NotAGroup(group_id.clone()))?
                    .children();
                // Found above, so has a path.
                let path = self
                    .path_of(group_id)
                    .ok_or_else(|| TargetError::NotFound(group_id.clone()))?;
                Ok(path.with(fields::CHILDREN).with(idx.min(children.len())))
            }
            Location::Above(sibling) => self
                .path_of(sibling)
                .ok_or_else(|| TargetError::NotFound(sibling.clone())),
        }
    }
    /// Check the structural invariants: unique ids, buffer sizes, selection size.
    pub fn validate(&self) -> Result<(), StateError> {
        let mut seen = hashbrown::HashSet::new();
        for (node, _) in self.iter() {
            if !seen.insert(node.id()) {
                return Err(StateError::DuplicateId(node.id().clone()));
            }
            if let Some(layer) = node.as_layer() {
                self.size
                    .expect(layer.buffer().size())
                    .map_err(|source| StateError::BufferSize {
                        id: node.id().clone(),
                        source,
                    })?;
            }
        }
        if let Some(selection) = &self.selection {
            self.size
                .expect(selection.size())
                .map_err(StateError::SelectionSize)?;
        }
        Ok(())
    }
}
