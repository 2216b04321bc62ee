//! # Graph
//!
//! The layers of the document form a tree, with raster layers as leaves and groups forming upper
//! levels. Nodes are shared between document states through `Arc`s, and are copied on write along
//! the path from the root to whichever node changed.
//!
//! Within any list of siblings, index 0 is the top-most node.

use std::sync::Arc;

use crate::{
    blend::Blend,
    raster::RasterBuffer,
    util::{Revision, Size},
};

/// Globally unique (within a document) identifier of a layer or group.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, serde::Serialize, serde::Deserialize)]
#[serde(transparent)]
pub struct NodeId(Arc<str>);
impl NodeId {
    #[must_use]
    pub fn new(id: &str) -> Self {
        Self(id.into())
    }
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}
impl From<&str> for NodeId {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}
impl std::fmt::Display for NodeId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}
impl std::fmt::Debug for NodeId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Properties common to layers and groups.
#[derive(Clone, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct NodeProps {
    pub name: String,
    pub visible: bool,
    pub blend: Blend,
    /// Locked nodes, and all of their descendants, reject edits.
    pub locked: bool,
}
impl Default for NodeProps {
    fn default() -> Self {
        Self {
            name: String::new(),
            visible: true,
            blend: Blend::default(),
            locked: false,
        }
    }
}
impl NodeProps {
    #[must_use]
    pub fn named(name: &str) -> Self {
        Self {
            name: name.to_owned(),
            ..Default::default()
        }
    }
}

#[derive(Clone, Debug)]
pub struct Layer {
    id: NodeId,
    props: NodeProps,
    buffer: RasterBuffer,
    revision: Revision,
}
impl Layer {
    #[must_use]
    pub fn new(id: NodeId, props: NodeProps, buffer: RasterBuffer) -> Self {
        Self {
            id,
            props,
            buffer,
            revision: Revision::next(),
        }
    }
    #[must_use]
    pub fn id(&self) -> &NodeId {
        &self.id
    }
    #[must_use]
    pub fn props(&self) -> &NodeProps {
        &self.props
    }
    #[must_use]
    pub fn buffer(&self) -> &RasterBuffer {
        &self.buffer
    }
    /// Stamped whenever the layer's properties or pixels change.
    #[must_use]
    pub fn revision(&self) -> Revision {
        self.revision
    }
    pub fn props_mut(&mut self) -> &mut NodeProps {
        self.revision = Revision::next();
        &mut self.props
    }
    pub fn buffer_mut(&mut self) -> &mut RasterBuffer {
        self.revision = Revision::next();
        &mut self.buffer
    }
}
// Revisions are bookkeeping, not content.
impl PartialEq for Layer {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id && self.props == other.props && self.buffer == other.buffer
    }
}

#[derive(Clone, Debug)]
pub struct Group {
    id: NodeId,
    props: NodeProps,
    children: Vec<LayerNode>,
    revision: Revision,
}
impl Group {
    #[must_use]
    pub fn new(id: NodeId, props: NodeProps, children: Vec<LayerNode>) -> Self {
        Self {
            id,
            props,
            children,
            revision: Revision::next(),
        }
    }
    #[must_use]
    pub fn id(&self) -> &NodeId {
        &self.id
    }
    #[must_use]
    pub fn props(&self) -> &NodeProps {
        &self.props
    }
    /// Children, top-most first.
    #[must_use]
    pub fn children(&self) -> &[LayerNode] {
        &self.children
    }
    /// Stamped whenever the group's properties or any descendant change.
    #[must_use]
    pub fn revision(&self) -> Revision {
        self.revision
    }
    pub fn props_mut(&mut self) -> &mut NodeProps {
        self.revision = Revision::next();
        &mut self.props
    }
    pub fn children_mut(&mut self) -> &mut Vec<LayerNode> {
        self.revision = Revision::next();
        &mut self.children
    }
}
impl PartialEq for Group {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id && self.props == other.props && self.children == other.children
    }
}

#[derive(Clone, Debug)]
pub enum LayerNode {
    Layer(Arc<Layer>),
    Group(Arc<Group>),
}
impl PartialEq for LayerNode {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Layer(a), Self::Layer(b)) => Arc::ptr_eq(a, b) || a == b,
            (Self::Group(a), Self::Group(b)) => Arc::ptr_eq(a, b) || a == b,
            _ => false,
        }
    }
}
impl LayerNode {
    /// A fresh, fully transparent layer.
    #[must_use]
    pub fn new_layer(id: NodeId, props: NodeProps, size: Size) -> Self {
        Self::Layer(Arc::new(Layer::new(id, props, RasterBuffer::new(size))))
    }
    #[must_use]
    pub fn new_group(id: NodeId, props: NodeProps, children: Vec<LayerNode>) -> Self {
        Self::Group(Arc::new(Group::new(id, props, children)))
    }
    #[must_use]
    pub fn id(&self) -> &NodeId {
        match self {
            Self::Layer(layer) => layer.id(),
            Self::Group(group) => group.id(),
        }
    }
    #[must_use]
    pub fn props(&self) -> &NodeProps {
        match self {
            Self::Layer(layer) => layer.props(),
            Self::Group(group) => group.props(),
        }
    }
    #[must_use]
    pub fn revision(&self) -> Revision {
        match self {
            Self::Layer(layer) => layer.revision(),
            Self::Group(group) => group.revision(),
        }
    }
    #[must_use]
    pub fn is_group(&self) -> bool {
        matches!(self, Self::Group(_))
    }
    #[must_use]
    pub fn as_layer(&self) -> Option<&Layer> {
        match self {
            Self::Layer(layer) => Some(layer),
            Self::Group(_) => None,
        }
    }
    #[must_use]
    pub fn as_group(&self) -> Option<&Group> {
        match self {
            Self::Group(group) => Some(group),
            Self::Layer(_) => None,
        }
    }
    /// Children, top-most first. Always empty for layers.
    #[must_use]
    pub fn children(&self) -> &[LayerNode] {
        match self {
            Self::Layer(_) => &[],
            Self::Group(group) => group.children(),
        }
    }
    /// Copy-on-write access to the properties.
    pub fn props_mut(&mut self) -> &mut NodeProps {
        match self {
            Self::Layer(layer) => Arc::make_mut(layer).props_mut(),
            Self::Group(group) => Arc::make_mut(group).props_mut(),
        }
    }
    /// Copy-on-write access to a group's children, or None for layers.
    pub fn children_mut(&mut self) -> Option<&mut Vec<LayerNode>> {
        match self {
            Self::Layer(_) => None,
            Self::Group(group) => Some(Arc::make_mut(group).children_mut()),
        }
    }
    /// Copy-on-write access to a layer, or None for groups.
    pub fn layer_mut(&mut self) -> Option<&mut Layer> {
        match self {
            Self::Layer(layer) => Some(Arc::make_mut(layer)),
            Self::Group(_) => None,
        }
    }
    /// Does this subtree contain a node with this id, including itself?
    #[must_use]
    pub fn contains(&self, id: &NodeId) -> bool {
        self.id() == id || self.children().iter().any(|child| child.contains(id))
    }
}

/// Depth-first, pre-order traversal of a forest of nodes, top-most first.
pub struct Iter<'a> {
    stack: Vec<std::slice::Iter<'a, LayerNode>>,
}
impl<'a> Iter<'a> {
    pub(crate) fn new(roots: &'a [LayerNode]) -> Self {
        Self {
            stack: vec![roots.iter()],
        }
    }
}
impl<'a> Iterator for Iter<'a> {
    /// The node, and how many groups deep it is.
    type Item = (&'a LayerNode, usize);
    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let depth = self.stack.len().checked_sub(1)?;
            let Some(node) = self.stack.last_mut()?.next() else {
                self.stack.pop();
                continue;
            };
            if !node.children().is_empty() {
                self.stack.push(node.children().iter());
            }
            return Some((node, depth));
        }
    }
}

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum TargetError {
    #[error("node {0} not found")]
    NotFound(NodeId),
    #[error("node {0} is not a group")]
    NotAGroup(NodeId),
    #[error("node {0} is not a layer")]
    NotALayer(NodeId),
    #[error("can't move a group into its own [grand]children")]
    WouldCycle,
}

/// Where to insert a node into the tree.
#[derive(Copy, Clone, Debug)]
pub enum Location<'a> {
    /// The sibling position directly above this node.
    Above(&'a NodeId),
    /// The nth child of this group, where top = 0.
    ///
    /// An index too large will be clamped to the bottom position.
    IndexIntoGroup(&'a NodeId, usize),
    /// The nth child of the root, where top = 0.
    ///
    /// An index too large will be clamped to the bottom position.
    IndexIntoRoot(usize),
}

#[cfg(test)]
mod test {
    use super::*;

    fn layer(id: &str) -> LayerNode {
        LayerNode::new_layer(id.into(), NodeProps::named(id), Size::new(2, 2))
    }

    #[test]
    fn depth_first() {
        let forest = vec![
            layer("a"),
            LayerNode::new_group(
                "g".into(),
                NodeProps::default(),
                vec![
                    layer("b"),
                    LayerNode::new_group("h".into(), NodeProps::default(), vec![layer("c")]),
                ],
            ),
            layer("d"),
        ];
        let order: Vec<(String, usize)> = Iter::new(&forest)
            .map(|(node, depth)| (node.id().to_string(), depth))
            .collect();
        assert_eq!(
            order,
            [("a", 0), ("g", 0), ("b", 1), ("h", 1), ("c", 2), ("d", 0)]
                .map(|(id, depth)| (id.to_owned(), depth))
        );
    }
    #[test]
    fn cow_bumps_revision() {
        let mut group = LayerNode::new_group("g".into(), NodeProps::default(), vec![layer("a")]);
        let shared = group.clone();
        let before = group.revision();
        group.children_mut().unwrap()[0].props_mut().visible = false;
        assert_ne!(group.revision(), before);
        // The old version is untouched.
        assert!(shared.children()[0].props().visible);
        assert_eq!(shared.revision(), before);
    }
    #[test]
    fn equality_ignores_revision() {
        let a = layer("a");
        let mut b = a.clone();
        b.props_mut().visible = true;
        assert_ne!(a.revision(), b.revision());
        assert_eq!(a, b);
    }
}
