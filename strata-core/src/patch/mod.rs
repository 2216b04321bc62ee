//! # Patches
//!
//! A generic structural editor over path-addressed trees, in the spirit of JSON Patch.
//! Anything implementing [`Patchable`] can be edited - the document [`State`](crate::state::State)
//! as well as free-form [`Value`] trees.
//!
//! Every applied patch yields its inverse, so callers never need to keep the pre-patch tree
//! around just for undo.

pub mod value;

pub use value::Value;

/// One step of a [`Path`].
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Key {
    /// A named member of a map-like node.
    Field(String),
    /// An element of a sequence.
    Index(usize),
}
impl Key {
    #[must_use]
    pub fn field(name: &str) -> Self {
        Self::Field(name.to_owned())
    }
    #[must_use]
    pub fn as_index(&self) -> Option<usize> {
        match self {
            Self::Index(idx) => Some(*idx),
            Self::Field(_) => None,
        }
    }
    #[must_use]
    pub fn as_field(&self) -> Option<&str> {
        match self {
            Self::Field(name) => Some(name),
            Self::Index(_) => None,
        }
    }
}
impl From<usize> for Key {
    fn from(value: usize) -> Self {
        Self::Index(value)
    }
}
impl From<&str> for Key {
    fn from(value: &str) -> Self {
        Self::Field(value.to_owned())
    }
}

/// A location within a tree, as a sequence of keys from the root.
///
/// Displays and parses as a JSON Pointer, e.g. `/layers/0/opacity`. Numeric segments parse as
/// indices, everything else as fields.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct Path(smallvec::SmallVec<[Key; 4]>);
impl Path {
    /// The empty path, addressing the root itself.
    #[must_use]
    pub fn root() -> Self {
        Self::default()
    }
    #[must_use]
    pub fn keys(&self) -> &[Key] {
        &self.0
    }
    #[must_use]
    pub fn is_root(&self) -> bool {
        self.0.is_empty()
    }
    pub fn push(&mut self, key: impl Into<Key>) {
        self.0.push(key.into());
    }
    /// Builder-style [`Self::push`].
    #[must_use]
    pub fn with(mut self, key: impl Into<Key>) -> Self {
        self.push(key);
        self
    }
    #[must_use]
    pub fn last(&self) -> Option<&Key> {
        self.0.last()
    }
    /// The path of the containing node, or None for the root.
    #[must_use]
    pub fn parent(&self) -> Option<Path> {
        let (_, parent) = self.0.split_last()?;
        Some(Self(parent.iter().cloned().collect()))
    }
    /// Is `self` a strict ancestor of `other`?
    #[must_use]
    pub fn is_ancestor_of(&self, other: &Path) -> bool {
        other.0.len() > self.0.len() && other.0.starts_with(&self.0)
    }
}
impl FromIterator<Key> for Path {
    fn from_iter<T: IntoIterator<Item = Key>>(iter: T) -> Self {
        Self(iter.into_iter().collect())
    }
}
impl std::fmt::Display for Path {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        for key in &self.0 {
            match key {
                Key::Index(idx) => write!(f, "/{idx}")?,
                Key::Field(name) => write!(f, "/{}", name.replace('~', "~0").replace('/', "~1"))?,
            }
        }
        Ok(())
    }
}
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
#[error("path must be empty or start with '/'")]
pub struct ParsePathError;
impl std::str::FromStr for Path {
    type Err = ParsePathError;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.is_empty() {
            return Ok(Self::root());
        }
        let rest = s.strip_prefix('/').ok_or(ParsePathError)?;
        Ok(rest
            .split('/')
            .map(|segment| match segment.parse::<usize>() {
                Ok(idx) => Key::Index(idx),
                Err(_) => Key::Field(segment.replace("~1", "/").replace("~0", "~")),
            })
            .collect())
    }
}
impl serde::Serialize for Path {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}
impl<'de> serde::Deserialize<'de> for Path {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = <std::borrow::Cow<'de, str>>::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// Build a [`Path`] from a list of keys, e.g. `path!["layers", 0, "name"]`.
#[macro_export]
macro_rules! path {
    ($($key:expr),* $(,)?) => {
        $crate::patch::Path::from_iter([$($crate::patch::Key::from($key)),*])
    };
}

#[derive(Clone, Debug, PartialEq)]
pub enum Patch {
    /// Insert a new value. Inserting into a sequence shifts later elements back.
    Add { path: Path, value: Value },
    /// Delete a value. Removing from a sequence shifts later elements forward.
    Remove { path: Path },
    /// Overwrite an existing value.
    Replace { path: Path, value: Value },
    /// Relocate a value. `to` is resolved after the value is removed from `from`, and addresses
    /// its final location.
    Move { from: Path, to: Path },
}
impl Patch {
    /// The path this patch primarily concerns, used for reporting.
    #[must_use]
    pub fn path(&self) -> &Path {
        match self {
            Self::Add { path, .. } | Self::Remove { path } | Self::Replace { path, .. } => path,
            Self::Move { from, .. } => from,
        }
    }
}

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum PatchError {
    /// Malformed or out-of-range path. Always a bug in whoever constructed the patch.
    #[error("invalid path `{path}`: {reason}")]
    InvalidPath { path: Path, reason: &'static str },
}

/// Why a [`Patchable`] rejected a path. The engine attaches the full path when reporting.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct Invalid(pub &'static str);

/// A single primitive edit at a location.
#[derive(Clone, Debug, PartialEq)]
pub enum Change {
    Insert(Value),
    Remove,
    Replace(Value),
}

/// A tree that can be read and edited by path.
pub trait Patchable: Clone {
    /// Fetch a copy of the value at `path`.
    fn get_at(&self, path: &[Key]) -> Result<Value, Invalid>;
    /// Apply one change at `path`. Returns the previous value for removals and replacements.
    ///
    /// On error, the tree must be left unmodified.
    fn edit_at(&mut self, path: &[Key], change: Change) -> Result<Option<Value>, Invalid>;
}

fn fail(path: &Path) -> impl FnOnce(Invalid) -> PatchError + '_ {
    move |Invalid(reason)| PatchError::InvalidPath {
        path: path.clone(),
        reason,
    }
}

fn removed(path: &Path, previous: Option<Value>) -> Result<Value, PatchError> {
    previous.ok_or_else(|| PatchError::InvalidPath {
        path: path.clone(),
        reason: "nothing was removed",
    })
}

/// Read the value at a path.
pub fn get<T: Patchable>(tree: &T, path: &Path) -> Result<Value, PatchError> {
    tree.get_at(path.keys()).map_err(fail(path))
}

/// Apply a patch to a copy of `tree`.
pub fn apply<T: Patchable>(tree: &T, patch: &Patch) -> Result<T, PatchError> {
    let mut tree = tree.clone();
    apply_in_place(&mut tree, patch)?;
    Ok(tree)
}

/// JSON Pointer's "one past the end" of a sequence.
pub const APPEND: &str = "-";

/// Replace a trailing [`APPEND`] marker with the index it currently stands for. Paths not
/// ending in the marker, or whose parent is not a sequence, come back unchanged.
fn resolve_append<T: Patchable>(tree: &T, path: &Path) -> Path {
    match (path.last(), path.parent()) {
        (Some(Key::Field(marker)), Some(parent)) if marker == APPEND => {
            match tree.get_at(parent.keys()) {
                Ok(Value::Seq(items)) => parent.with(items.len()),
                _ => path.clone(),
            }
        }
        _ => path.clone(),
    }
}

/// Compute the patch undoing `patch`, given the tree it is about to be applied to.
pub fn reverse<T: Patchable>(tree: &T, patch: &Patch) -> Result<Patch, PatchError> {
    Ok(match patch {
        Patch::Add { path, .. } => Patch::Remove {
            path: resolve_append(tree, path),
        },
        Patch::Remove { path } => Patch::Add {
            path: path.clone(),
            value: get(tree, path)?,
        },
        Patch::Replace { path, .. } => Patch::Replace {
            path: path.clone(),
            value: get(tree, path)?,
        },
        Patch::Move { from, to } => {
            // An append marker is only meaningful once `from` is detached.
            let landed = if to.last().and_then(Key::as_field) == Some(APPEND) {
                move_value(&mut tree.clone(), from, to)?
            } else {
                to.clone()
            };
            Patch::Move {
                from: landed,
                to: from.clone(),
            }
        }
    })
}

/// Apply a patch, returning its inverse. On error, the tree is untouched.
pub fn apply_in_place<T: Patchable>(tree: &mut T, patch: &Patch) -> Result<Patch, PatchError> {
    match patch {
        Patch::Add { path, value } => {
            let at = resolve_append(tree, path);
            tree.edit_at(at.keys(), Change::Insert(value.clone()))
                .map_err(fail(path))?;
            Ok(Patch::Remove { path: at })
        }
        Patch::Remove { path } => {
            let previous = tree.edit_at(path.keys(), Change::Remove).map_err(fail(path))?;
            Ok(Patch::Add {
                path: path.clone(),
                value: removed(path, previous)?,
            })
        }
        Patch::Replace { path, value } => {
            let previous = tree
                .edit_at(path.keys(), Change::Replace(value.clone()))
                .map_err(fail(path))?;
            Ok(Patch::Replace {
                path: path.clone(),
                value: removed(path, previous)?,
            })
        }
        Patch::Move { from, to } => Ok(Patch::Move {
            from: move_value(tree, from, to)?,
            to: from.clone(),
        }),
    }
}

/// Apply every patch in order, atomically. Returns the inverse patches, ordered for undoing.
pub fn apply_all<T: Patchable>(tree: &mut T, patches: &[Patch]) -> Result<Vec<Patch>, PatchError> {
    let mut scratch = tree.clone();
    let mut inverse = patches
        .iter()
        .map(|patch| apply_in_place(&mut scratch, patch))
        .collect::<Result<Vec<_>, _>>()?;
    inverse.reverse();
    *tree = scratch;
    Ok(inverse)
}

/// Returns the path the value landed at, with any append marker resolved.
fn move_value<T: Patchable>(tree: &mut T, from: &Path, to: &Path) -> Result<Path, PatchError> {
    if from.is_root() || to.is_root() {
        return Err(PatchError::InvalidPath {
            path: if from.is_root() { from } else { to }.clone(),
            reason: "cannot move the root",
        });
    }
    if from == to {
        // Still has to exist.
        get(tree, from)?;
        return Ok(to.clone());
    }
    // Neither is root, so both have a last key.
    let (from_parent, from_key) = from.keys().split_at(from.keys().len() - 1);
    let (to_parent, to_key) = to.keys().split_at(to.keys().len() - 1);
    let same_list = from_parent == to_parent;
    match (same_list, from_key[0].as_index(), to_key[0].as_index()) {
        (true, Some(from_idx), Some(to_idx)) if from_idx < to_idx => {
            // Insert a copy after the destination first, then remove the original in front of
            // it - the copy shifts down into exactly `to_idx`.
            let value = get(tree, from)?;
            let mut after = Path(to_parent.iter().cloned().collect());
            after.push(to_idx + 1);
            let mut scratch = tree.clone();
            scratch
                .edit_at(after.keys(), Change::Insert(value))
                .map_err(fail(to))?;
            scratch.edit_at(from.keys(), Change::Remove).map_err(fail(from))?;
            *tree = scratch;
            Ok(to.clone())
        }
        _ => {
            // Remove first, then insert at the destination as addressed after the removal.
            let mut scratch = tree.clone();
            let previous = scratch
                .edit_at(from.keys(), Change::Remove)
                .map_err(fail(from))?;
            let value = removed(from, previous)?;
            let landed = resolve_append(&scratch, to);
            scratch
                .edit_at(landed.keys(), Change::Insert(value))
                .map_err(fail(to))?;
            *tree = scratch;
            Ok(landed)
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use proptest::prelude::*;

    fn numbers(values: &[f64]) -> Value {
        Value::Seq(values.iter().copied().map(Value::Number).collect())
    }

    #[test]
    fn pointer_round_trip() {
        let path = path!["layers", 3, "a/b~c"];
        assert_eq!(path.to_string(), "/layers/3/a~1b~0c");
        assert_eq!(path.to_string().parse::<Path>(), Ok(path));
        assert_eq!("".parse::<Path>(), Ok(Path::root()));
        assert_eq!("layers".parse::<Path>(), Err(ParsePathError));
    }
    #[test]
    fn move_forward() {
        let tree = numbers(&[1.0, 2.0, 3.0, 4.0]);
        let patch = Patch::Move {
            from: path![0],
            to: path![2],
        };
        assert_eq!(apply(&tree, &patch).unwrap(), numbers(&[2.0, 3.0, 1.0, 4.0]));
    }
    #[test]
    fn move_backward() {
        let tree = numbers(&[1.0, 2.0, 3.0, 4.0]);
        let patch = Patch::Move {
            from: path![2],
            to: path![0],
        };
        assert_eq!(apply(&tree, &patch).unwrap(), numbers(&[3.0, 1.0, 2.0, 4.0]));
    }
    #[test]
    fn move_adjacent() {
        let tree = numbers(&[1.0, 2.0, 3.0, 4.0]);
        let forward = Patch::Move {
            from: path![1],
            to: path![2],
        };
        let moved = apply(&tree, &forward).unwrap();
        assert_eq!(moved, numbers(&[1.0, 3.0, 2.0, 4.0]));
        let back = reverse(&tree, &forward).unwrap();
        assert_eq!(apply(&moved, &back).unwrap(), tree);

        let to_end = Patch::Move {
            from: path![0],
            to: path![3],
        };
        assert_eq!(apply(&tree, &to_end).unwrap(), numbers(&[2.0, 3.0, 4.0, 1.0]));
    }
    #[test]
    fn move_past_end_fails() {
        let tree = numbers(&[1.0, 2.0]);
        let patch = Patch::Move {
            from: path![0],
            to: path![2],
        };
        assert!(matches!(
            apply(&tree, &patch),
            Err(PatchError::InvalidPath { .. })
        ));
    }
    #[test]
    fn move_between_lists() {
        let tree = Value::Seq(vec![numbers(&[1.0, 2.0]), numbers(&[3.0])]);
        let patch = Patch::Move {
            from: path![0, 0],
            to: path![1, 1],
        };
        let moved = apply(&tree, &patch).unwrap();
        assert_eq!(moved, Value::Seq(vec![numbers(&[2.0]), numbers(&[3.0, 1.0])]));
        let back = reverse(&tree, &patch).unwrap();
        assert_eq!(apply(&moved, &back).unwrap(), tree);
    }
    #[test]
    fn move_addresses_after_removal() {
        // `to` is looked up once the value is detached, so it can never land inside itself.
        let tree = Value::Seq(vec![numbers(&[1.0]), numbers(&[2.0])]);
        let patch = Patch::Move {
            from: path![0],
            to: path![0, 0],
        };
        let moved = apply(&tree, &patch).unwrap();
        assert_eq!(
            moved,
            Value::Seq(vec![Value::Seq(vec![numbers(&[1.0]), Value::Number(2.0)])])
        );
        let back = reverse(&tree, &patch).unwrap();
        assert_eq!(apply(&moved, &back).unwrap(), tree);
    }
    #[test]
    fn append_inverts_to_index() {
        let tree = numbers(&[1.0, 2.0, 3.0]);
        let add = Patch::Add {
            path: path![APPEND],
            value: Value::Null,
        };
        assert_eq!(reverse(&tree, &add).unwrap(), Patch::Remove { path: path![3] });
        let mut added = tree.clone();
        let inverse = apply_in_place(&mut added, &add).unwrap();
        assert_eq!(inverse, Patch::Remove { path: path![3] });
        assert_eq!(apply(&added, &inverse).unwrap(), tree);

        // Appending to the same list lands one earlier, the value was detached first.
        let to_end = Patch::Move {
            from: path![0],
            to: path![APPEND],
        };
        let back = reverse(&tree, &to_end).unwrap();
        assert_eq!(
            back,
            Patch::Move {
                from: path![2],
                to: path![0]
            }
        );
        let mut moved = tree.clone();
        assert_eq!(apply_in_place(&mut moved, &to_end).unwrap(), back);
        assert_eq!(moved, numbers(&[2.0, 3.0, 1.0]));
        assert_eq!(apply(&moved, &back).unwrap(), tree);

        let nested = Value::Seq(vec![numbers(&[1.0]), numbers(&[2.0, 3.0])]);
        let across = Patch::Move {
            from: path![0, 0],
            to: path![1, APPEND],
        };
        let back = reverse(&nested, &across).unwrap();
        let moved = apply(&nested, &across).unwrap();
        assert_eq!(moved, Value::Seq(vec![numbers(&[]), numbers(&[2.0, 3.0, 1.0])]));
        assert_eq!(apply(&moved, &back).unwrap(), nested);
    }
    #[test]
    fn error_names_full_path() {
        let tree = Value::Seq(vec![numbers(&[1.0])]);
        let err = apply(
            &tree,
            &Patch::Remove {
                path: path![0, 5],
            },
        )
        .unwrap_err();
        let PatchError::InvalidPath { path, .. } = err;
        assert_eq!(path, path![0, 5]);
    }
    #[test]
    fn apply_all_is_atomic() {
        let mut tree = numbers(&[1.0, 2.0]);
        let patches = [
            Patch::Replace {
                path: path![0],
                value: Value::Number(10.0),
            },
            Patch::Remove { path: path![9] },
        ];
        assert!(apply_all(&mut tree, &patches).is_err());
        assert_eq!(tree, numbers(&[1.0, 2.0]));

        let inverse = apply_all(&mut tree, &patches[..1]).unwrap();
        assert_eq!(tree, numbers(&[10.0, 2.0]));
        apply_all(&mut tree, &inverse).unwrap();
        assert_eq!(tree, numbers(&[1.0, 2.0]));
    }

    /// Arbitrary nested trees of finite numbers.
    fn arb_tree() -> impl Strategy<Value = Value> {
        let leaf = (-1000i32..1000).prop_map(|n| Value::Number(f64::from(n)));
        leaf.prop_recursive(3, 24, 4, |inner| {
            prop_oneof![
                proptest::collection::vec(inner.clone(), 0..4).prop_map(Value::Seq),
                proptest::collection::btree_map("[a-c]", inner, 0..3).prop_map(Value::Map),
            ]
        })
    }

    /// Walk `choices` down the tree, collecting a path to some existing node.
    fn pick_path(tree: &Value, choices: &[usize]) -> Path {
        let mut path = Path::root();
        let mut node = tree;
        for &choice in choices {
            let next = match node {
                Value::Seq(items) if !items.is_empty() => {
                    let idx = choice % items.len();
                    path.push(idx);
                    &items[idx]
                }
                Value::Map(fields) if !fields.is_empty() => {
                    let (name, child) = fields.iter().nth(choice % fields.len()).unwrap();
                    path.push(name.as_str());
                    child
                }
                _ => break,
            };
            node = next;
        }
        path
    }

    fn arb_case() -> impl Strategy<Value = (Value, Patch)> {
        (
            arb_tree(),
            proptest::collection::vec(any::<usize>(), 0..4),
            proptest::collection::vec(any::<usize>(), 0..4),
            0..4u8,
        )
            .prop_filter_map("no patch fits this tree", |(tree, a, b, op)| {
                let from = pick_path(&tree, &a);
                let patch = match op {
                    0 => Patch::Replace {
                        path: from,
                        value: Value::Text("new".into()),
                    },
                    1 => {
                        // Only removable where the parent is a container, i.e. not the root.
                        if from.is_root() {
                            return None;
                        }
                        Patch::Remove { path: from }
                    }
                    2 => {
                        // Append to some sequence, by index or by marker.
                        match get(&tree, &from).ok()? {
                            Value::Seq(items) if b.len() % 2 == 0 => Patch::Add {
                                path: from.with(items.len()),
                                value: Value::Bool(true),
                            },
                            Value::Seq(_) => Patch::Add {
                                path: from.with(APPEND),
                                value: Value::Bool(true),
                            },
                            _ => return None,
                        }
                    }
                    _ => {
                        let mut to = pick_path(&tree, &b);
                        if from.is_root() || to.is_root() {
                            return None;
                        }
                        if a.len() % 2 == 1 {
                            to = to.parent()?.with(APPEND);
                        }
                        Patch::Move { from, to }
                    }
                };
                Some((tree, patch))
            })
    }

    proptest! {
        #[test]
        fn round_trip((tree, patch) in arb_case()) {
            // Some generated moves are not applicable, e.g. into a sibling that shifted.
            let Ok(applied) = apply(&tree, &patch) else {
                return Ok(());
            };
            let inverse = reverse(&tree, &patch).unwrap();
            prop_assert_eq!(apply(&applied, &inverse).unwrap(), tree.clone());

            // The inverse handed back by the engine agrees with `reverse`.
            let mut in_place = tree.clone();
            let engine_inverse = apply_in_place(&mut in_place, &patch).unwrap();
            prop_assert_eq!(apply(&in_place, &engine_inverse).unwrap(), tree);
        }
    }
}
