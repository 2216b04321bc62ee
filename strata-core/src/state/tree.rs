//! Path-addressed access to the document state, so the patch engine can edit it.
//!
//! The state looks like this to a patch:
//! ```text
//! /width, /height          read-only numbers
//! /next_id                 number
//! /selection               selection, or null when absent
//! /layers/<i>              layer node
//! /layers/<i>/children/<j> layer node within a group
//! /layers/<i>/<field>      id (read-only), name, visible, opacity, blend, locked
//! ```

use super::{fields, LayerNode, State};
use crate::{
    patch::{Change, Invalid, Key, Patchable, Value, APPEND},
    util::Opacity,
};

fn expect_node(value: Value) -> Result<LayerNode, Invalid> {
    value.into_node().ok_or(Invalid("expected a layer node"))
}

fn list_get(list: &[LayerNode], path: &[Key]) -> Result<Value, Invalid> {
    match path.split_first() {
        None => Ok(Value::Seq(list.iter().cloned().map(Value::Node).collect())),
        Some((key, rest)) => {
            let idx = key.as_index().ok_or(Invalid("expected an index"))?;
            list.get(idx)
                .ok_or(Invalid("index out of range"))?
                .get_at(rest)
        }
    }
}

fn list_edit(
    list: &mut Vec<LayerNode>,
    path: &[Key],
    change: Change,
) -> Result<Option<Value>, Invalid> {
    let Some((key, rest)) = path.split_first() else {
        // The whole list at once.
        let Change::Replace(Value::Seq(items)) = change else {
            return Err(Invalid("a node list can only be replaced by a sequence"));
        };
        let nodes = items
            .into_iter()
            .map(expect_node)
            .collect::<Result<Vec<_>, _>>()?;
        let old = std::mem::replace(list, nodes);
        return Ok(Some(Value::Seq(old.into_iter().map(Value::Node).collect())));
    };
    if key.as_field() == Some(APPEND) && rest.is_empty() {
        let Change::Insert(value) = change else {
            return Err(Invalid("`-` may only be inserted into"));
        };
        list.push(expect_node(value)?);
        return Ok(None);
    }
    let idx = key.as_index().ok_or(Invalid("expected an index"))?;
    if !rest.is_empty() {
        return list
            .get_mut(idx)
            .ok_or(Invalid("index out of range"))?
            .edit_at(rest, change);
    }
    match change {
        Change::Insert(value) => {
            if idx > list.len() {
                return Err(Invalid("index out of range"));
            }
            list.insert(idx, expect_node(value)?);
            Ok(None)
        }
        Change::Remove => {
            if idx >= list.len() {
                return Err(Invalid("index out of range"));
            }
            Ok(Some(Value::Node(list.remove(idx))))
        }
        Change::Replace(value) => {
            let node = expect_node(value)?;
            let slot = list.get_mut(idx).ok_or(Invalid("index out of range"))?;
            Ok(Some(Value::Node(std::mem::replace(slot, node))))
        }
    }
}

/// A property write, checked before anything is touched.
enum PropWrite {
    Name(String),
    Visible(bool),
    Opacity(Opacity),
    Blend(crate::blend::BlendMode),
    Locked(bool),
}
impl PropWrite {
    fn parse(field: &str, value: &Value) -> Result<Self, Invalid> {
        Ok(match field {
            fields::ID => return Err(Invalid("node ids are read-only")),
            fields::NAME => Self::Name(value.as_str().ok_or(Invalid("expected text"))?.to_owned()),
            fields::VISIBLE => Self::Visible(value.as_bool().ok_or(Invalid("expected a bool"))?),
            fields::OPACITY => {
                let number = value.as_f64().ok_or(Invalid("expected a number"))?;
                #[allow(clippy::cast_possible_truncation)]
                let opacity = Opacity::new(number as f32);
                Self::Opacity(opacity.map_err(|_| Invalid("opacity outside of [0, 1]"))?)
            }
            fields::BLEND => Self::Blend(value.as_blend().ok_or(Invalid("expected a blend mode"))?),
            fields::LOCKED => Self::Locked(value.as_bool().ok_or(Invalid("expected a bool"))?),
            _ => return Err(Invalid("no such field")),
        })
    }
}

impl Patchable for LayerNode {
    fn get_at(&self, path: &[Key]) -> Result<Value, Invalid> {
        let Some((key, rest)) = path.split_first() else {
            return Ok(Value::Node(self.clone()));
        };
        let field = key.as_field().ok_or(Invalid("expected a field name"))?;
        if field == fields::CHILDREN {
            let group = self.as_group().ok_or(Invalid("layers have no children"))?;
            return list_get(group.children(), rest);
        }
        if !rest.is_empty() {
            return Err(Invalid("not a container"));
        }
        let props = self.props();
        Ok(match field {
            fields::ID => Value::Text(self.id().to_string()),
            fields::NAME => Value::Text(props.name.clone()),
            fields::VISIBLE => Value::Bool(props.visible),
            fields::OPACITY => Value::Number(f64::from(props.blend.opacity.get())),
            fields::BLEND => Value::Blend(props.blend.mode),
            fields::LOCKED => Value::Bool(props.locked),
            _ => return Err(Invalid("no such field")),
        })
    }
    fn edit_at(&mut self, path: &[Key], change: Change) -> Result<Option<Value>, Invalid> {
        let Some((key, rest)) = path.split_first() else {
            return Err(Invalid("nodes are replaced through their parent list"));
        };
        let field = key.as_field().ok_or(Invalid("expected a field name"))?;
        if field == fields::CHILDREN {
            if !self.is_group() {
                return Err(Invalid("layers have no children"));
            }
            // Dry-run on a detached copy, so a bad path doesn't even touch revisions.
            let mut children = self.children().to_vec();
            let previous = list_edit(&mut children, rest, change)?;
            if let Some(slot) = self.children_mut() {
                *slot = children;
            }
            return Ok(previous);
        }
        if !rest.is_empty() {
            return Err(Invalid("not a container"));
        }
        let Change::Replace(value) = change else {
            return Err(Invalid("node fields can only be replaced"));
        };
        let write = PropWrite::parse(field, &value)?;
        let props = self.props_mut();
        Ok(Some(match write {
            PropWrite::Name(name) => Value::Text(std::mem::replace(&mut props.name, name)),
            PropWrite::Visible(visible) => {
                Value::Bool(std::mem::replace(&mut props.visible, visible))
            }
            PropWrite::Opacity(opacity) => Value::Number(f64::from(
                std::mem::replace(&mut props.blend.opacity, opacity).get(),
            )),
            PropWrite::Blend(mode) => Value::Blend(std::mem::replace(&mut props.blend.mode, mode)),
            PropWrite::Locked(locked) => Value::Bool(std::mem::replace(&mut props.locked, locked)),
        }))
    }
}

#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn parse_counter(value: &Value) -> Result<u64, Invalid> {
    const MAX_EXACT: f64 = 9_007_199_254_740_992.0;
    match value.as_f64() {
        Some(n) if n.fract() == 0.0 && (0.0..=MAX_EXACT).contains(&n) => Ok(n as u64),
        _ => Err(Invalid("expected a non-negative integer")),
    }
}

impl Patchable for State {
    #[allow(clippy::cast_precision_loss)]
    fn get_at(&self, path: &[Key]) -> Result<Value, Invalid> {
        let Some((key, rest)) = path.split_first() else {
            return Err(Invalid("the document root is not a value"));
        };
        let field = key.as_field().ok_or(Invalid("expected a field name"))?;
        if field == fields::LAYERS {
            return list_get(&self.layers, rest);
        }
        if !rest.is_empty() {
            return Err(Invalid("not a container"));
        }
        Ok(match field {
            fields::WIDTH => Value::Number(f64::from(self.size.width)),
            fields::HEIGHT => Value::Number(f64::from(self.size.height)),
            fields::NEXT_ID => Value::Number(self.next_id as f64),
            fields::SELECTION => self
                .selection
                .clone()
                .map_or(Value::Null, Value::Selection),
            _ => return Err(Invalid("no such field")),
        })
    }
    #[allow(clippy::cast_precision_loss)]
    fn edit_at(&mut self, path: &[Key], change: Change) -> Result<Option<Value>, Invalid> {
        let Some((key, rest)) = path.split_first() else {
            return Err(Invalid("the document root is not a value"));
        };
        let field = key.as_field().ok_or(Invalid("expected a field name"))?;
        if field == fields::LAYERS {
            // Top-level list is cheap to copy, it's just Arcs.
            let mut layers = self.layers.clone();
            let previous = list_edit(&mut layers, rest, change)?;
            self.layers = layers;
            return Ok(previous);
        }
        if !rest.is_empty() {
            return Err(Invalid("not a container"));
        }
        match (field, change) {
            (fields::WIDTH | fields::HEIGHT, _) => Err(Invalid("canvas size is read-only")),
            (fields::NEXT_ID, Change::Replace(value)) => {
                let next = parse_counter(&value)?;
                let old = std::mem::replace(&mut self.next_id, next);
                Ok(Some(Value::Number(old as f64)))
            }
            (fields::SELECTION, Change::Insert(value)) => {
                if self.selection.is_some() {
                    return Err(Invalid("selection already present"));
                }
                let selection = value
                    .into_selection()
                    .ok_or(Invalid("expected a selection"))?;
                self.selection = Some(selection);
                Ok(None)
            }
            (fields::SELECTION, Change::Remove) => self
                .selection
                .take()
                .map(|old| Some(Value::Selection(old)))
                .ok_or(Invalid("no selection to remove")),
            (fields::SELECTION, Change::Replace(value)) => {
                if self.selection.is_none() {
                    return Err(Invalid("no selection to replace"));
                }
                let selection = value
                    .into_selection()
                    .ok_or(Invalid("expected a selection"))?;
                Ok(self
                    .selection
                    .replace(selection)
                    .map(Value::Selection))
            }
            (fields::NEXT_ID, _) => Err(Invalid("unsupported change")),
            _ => Err(Invalid("no such field")),
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::{
        blend::BlendMode,
        patch::{apply, apply_in_place, get, reverse, Patch, PatchError, Path},
        path,
        selection::Selection,
        state::{test::nested, NodeId, NodeProps},
        util::Size,
    };
    use proptest::prelude::*;

    #[test]
    fn read_fields() {
        let state = nested();
        assert_eq!(
            get(&state, &path!["layers", 1, "children", 0, "name"]).unwrap(),
            Value::from("layer-2")
        );
        assert_eq!(get(&state, &path!["width"]).unwrap(), Value::Number(4.0));
        assert_eq!(get(&state, &path!["selection"]).unwrap(), Value::Null);
    }
    #[test]
    fn replace_prop_and_invert() {
        let state = nested();
        let mut edited = state.clone();
        let inverse = apply_in_place(
            &mut edited,
            &Patch::Replace {
                path: path!["layers", 1, "children", 1, "blend"],
                value: BlendMode::Screen.into(),
            },
        )
        .unwrap();
        assert_eq!(
            edited.get(&NodeId::new("layer-3")).unwrap().props().blend.mode,
            BlendMode::Screen
        );
        // The group containing it was path-copied.
        assert_ne!(edited.layers()[1].revision(), state.layers()[1].revision());
        let restored = apply(&edited, &inverse).unwrap();
        assert_eq!(restored, state);
    }
    #[test]
    fn bad_values_rejected() {
        let state = nested();
        let opacity = Patch::Replace {
            path: path!["layers", 0, "opacity"],
            value: Value::Number(2.0),
        };
        assert!(matches!(
            apply(&state, &opacity),
            Err(PatchError::InvalidPath {
                reason: "opacity outside of [0, 1]",
                ..
            })
        ));
        let id = Patch::Replace {
            path: path!["layers", 0, "id"],
            value: "x".into(),
        };
        assert!(apply(&state, &id).is_err());
        let children_of_layer = Patch::Remove {
            path: path!["layers", 0, "children", 0],
        };
        assert!(apply(&state, &children_of_layer).is_err());
        let size = Patch::Replace {
            path: path!["width"],
            value: Value::Number(1.0),
        };
        assert!(apply(&state, &size).is_err());
    }
    #[test]
    fn move_between_groups() {
        let state = nested();
        let patch = Patch::Move {
            from: path!["layers", 0],
            to: path!["layers", 0, "children", 2],
        };
        // After removing /layers/0, the group is at index 0.
        let moved = apply(&state, &patch).unwrap();
        let group = moved.get(&NodeId::new("group-1")).unwrap();
        let ids: Vec<&str> = group.children().iter().map(|n| n.id().as_str()).collect();
        assert_eq!(ids, ["layer-2", "layer-3", "layer-0"]);
        let back = apply(&moved, &Patch::Move {
            from: path!["layers", 0, "children", 2],
            to: path!["layers", 0],
        })
        .unwrap();
        assert_eq!(back, state);
    }
    #[test]
    fn selection_lifecycle() {
        let state = nested();
        let selection = Selection::full(Size::new(4, 4));
        let with = apply(
            &state,
            &Patch::Add {
                path: path!["selection"],
                value: selection.clone().into(),
            },
        )
        .unwrap();
        assert_eq!(with.selection(), Some(&selection));
        // Can't add twice.
        assert!(apply(
            &with,
            &Patch::Add {
                path: path!["selection"],
                value: selection.into()
            }
        )
        .is_err());
        let without = apply(&with, &Patch::Remove { path: path!["selection"] }).unwrap();
        assert_eq!(without, state);
    }
    #[test]
    fn insert_node() {
        let state = nested();
        let node = LayerNode::new_layer("new".into(), NodeProps::named("new"), Size::new(4, 4));
        let added = apply(
            &state,
            &Patch::Add {
                path: path!["layers", 1, "children", "-"],
                value: node.into(),
            },
        )
        .unwrap();
        assert_eq!(
            added.path_of(&NodeId::new("new")).unwrap().to_string(),
            "/layers/1/children/2"
        );
    }

    proptest! {
        #[test]
        fn state_patches_invert(
            op in 0..5u8,
            a in any::<usize>(),
            b in any::<usize>(),
            append in any::<bool>(),
        ) {
            let state = nested();
            let paths: Vec<Path> = state
                .iter()
                .filter_map(|(node, _)| state.path_of(node.id()))
                .collect();
            let from = paths[a % paths.len()].clone();
            let to = paths[b % paths.len()].clone();
            // Either the slot of an existing node, or the end of its list.
            let slot = if append {
                to.parent().unwrap().with(APPEND)
            } else {
                to
            };
            let node = LayerNode::new_layer("new".into(), NodeProps::named("new"), state.size());
            let patch = match op {
                0 => Patch::Add {
                    path: slot,
                    value: node.into(),
                },
                1 => Patch::Remove { path: from },
                2 => Patch::Replace {
                    path: from.with(fields::NAME),
                    value: "renamed".into(),
                },
                3 => Patch::Replace {
                    path: from.with(fields::OPACITY),
                    value: Value::Number(0.25),
                },
                _ => Patch::Move { from, to: slot },
            };
            // Some moves land nowhere, e.g. into what used to be a group.
            let Ok(applied) = apply(&state, &patch) else {
                return Ok(());
            };
            let inverse = reverse(&state, &patch).unwrap();
            prop_assert_eq!(apply(&applied, &inverse).unwrap(), state.clone());
            let mut in_place = state.clone();
            let engine_inverse = apply_in_place(&mut in_place, &patch).unwrap();
            prop_assert_eq!(&in_place, &applied);
            prop_assert_eq!(apply(&applied, &engine_inverse).unwrap(), state);
        }
    }
}
