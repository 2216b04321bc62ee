//! Entries of the backward and forward stacks.

use crate::{
    commands::OperationRecord,
    patch::{Patch, Value},
    raster::ImageDiff,
    state::{LayerNode, NodeId},
};

/// A pixel diff, and which layer it belongs to.
#[derive(Clone, PartialEq, Debug)]
pub struct LayerImageDiff {
    pub layer: NodeId,
    pub diff: ImageDiff,
}

/// The recorded change of a history entry.
///
/// Applying it to the current state steps history by one entry, and yields the diff that steps
/// back again.
#[derive(Clone, PartialEq, Debug)]
pub enum Diff {
    /// Patches, in the order they are to be applied.
    Structural(Vec<Patch>),
    /// Pixel diffs, in the order they are to be applied.
    Image(Vec<LayerImageDiff>),
}
impl Diff {
    /// Fold a newer diff into this one, such that applying the result undoes both.
    ///
    /// Fails, returning `newer` unchanged, if the diffs are of different flavors.
    pub(super) fn absorb(&mut self, newer: Diff) -> Result<(), Diff> {
        match (self, newer) {
            (Self::Structural(older), Self::Structural(mut newer)) => {
                // The newer change has to be unwound first.
                newer.append(older);
                *older = newer;
                Ok(())
            }
            (Self::Image(older), Self::Image(mut newer)) => {
                newer.append(older);
                *older = newer;
                Ok(())
            }
            (_, newer) => Err(newer),
        }
    }
    #[must_use]
    pub fn len(&self) -> usize {
        match self {
            Self::Structural(patches) => patches.len(),
            Self::Image(diffs) => diffs.len(),
        }
    }
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
    /// Approximate heap usage. Layers held by structural patches count in full, even though their
    /// buffers may be shared with the live state.
    #[must_use]
    pub fn byte_size(&self) -> usize {
        match self {
            Self::Structural(patches) => patches
                .iter()
                .map(|patch| {
                    std::mem::size_of::<Patch>()
                        + match patch {
                            Patch::Add { value, .. } | Patch::Replace { value, .. } => {
                                value_size(value)
                            }
                            Patch::Remove { .. } | Patch::Move { .. } => 0,
                        }
                })
                .sum(),
            Self::Image(diffs) => diffs.iter().map(|diff| diff.diff.byte_size()).sum(),
        }
    }
}

fn value_size(value: &Value) -> usize {
    match value {
        Value::Null | Value::Bool(_) | Value::Number(_) | Value::Blend(_) => 0,
        Value::Text(text) => text.len(),
        Value::Seq(items) => items.iter().map(value_size).sum(),
        Value::Map(map) => map.iter().map(|(k, v)| k.len() + value_size(v)).sum(),
        Value::Node(node) => node_size(node),
        Value::Selection(selection) => selection.as_bytes().len(),
    }
}

fn node_size(node: &LayerNode) -> usize {
    node.as_layer()
        .map_or(0, |layer| layer.buffer().as_bytes().len())
        + node.children().iter().map(node_size).sum::<usize>()
}

/// One step of history.
#[derive(Clone, PartialEq, Debug)]
pub struct HistoryEntry {
    pub record: OperationRecord,
    pub diff: Diff,
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::{patch::Path, path};

    fn replace(idx: usize) -> Patch {
        Patch::Replace {
            path: path!["layers", idx, "visible"],
            value: true.into(),
        }
    }

    #[test]
    fn absorb_orders_newest_first() {
        let mut older = Diff::Structural(vec![replace(0), replace(1)]);
        older.absorb(Diff::Structural(vec![replace(2)])).unwrap();
        assert_eq!(older, Diff::Structural(vec![replace(2), replace(0), replace(1)]));
    }
    #[test]
    fn absorb_rejects_mixed() {
        let mut older = Diff::Structural(vec![replace(0)]);
        let newer = Diff::Image(Vec::new());
        assert_eq!(older.absorb(newer.clone()), Err(newer));
        assert_eq!(older.len(), 1);
    }
    #[test]
    fn sizes_count_payloads() {
        let diff = Diff::Structural(vec![Patch::Remove {
            path: Path::root().with("selection"),
        }]);
        assert_eq!(diff.byte_size(), std::mem::size_of::<Patch>());
    }
}
