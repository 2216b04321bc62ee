use std::{collections::BTreeMap, sync::Arc};

use super::{Change, Invalid, Key, Patchable, APPEND};
use crate::{blend::BlendMode, selection::Selection, state::LayerNode};

/// A dynamically typed value, as read from or written into a patchable tree.
///
/// Besides the usual JSON-like shapes, it can carry whole document payloads so that structural
/// patches can insert and remove layer subtrees and selections.
#[derive(Clone, Debug, PartialEq, Default)]
pub enum Value {
    #[default]
    Null,
    Bool(bool),
    Number(f64),
    Text(String),
    Blend(BlendMode),
    Seq(Vec<Value>),
    Map(BTreeMap<String, Value>),
    Node(LayerNode),
    Selection(Arc<Selection>),
}
impl Value {
    /// Short name of the variant, for diagnostics.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Null => "null",
            Self::Bool(_) => "bool",
            Self::Number(_) => "number",
            Self::Text(_) => "text",
            Self::Blend(_) => "blend mode",
            Self::Seq(_) => "sequence",
            Self::Map(_) => "map",
            Self::Node(_) => "layer node",
            Self::Selection(_) => "selection",
        }
    }
    #[must_use]
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(b) => Some(*b),
            _ => None,
        }
    }
    #[must_use]
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Number(n) => Some(*n),
            _ => None,
        }
    }
    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Text(s) => Some(s),
            _ => None,
        }
    }
    #[must_use]
    pub fn as_blend(&self) -> Option<BlendMode> {
        match self {
            Self::Blend(mode) => Some(*mode),
            // Accept the mode's name too, for patches that came from text.
            Self::Text(s) => s.parse().ok(),
            _ => None,
        }
    }
    #[must_use]
    pub fn into_node(self) -> Option<LayerNode> {
        match self {
            Self::Node(node) => Some(node),
            _ => None,
        }
    }
    #[must_use]
    pub fn into_selection(self) -> Option<Arc<Selection>> {
        match self {
            Self::Selection(selection) => Some(selection),
            _ => None,
        }
    }
    fn child(&self, key: &Key) -> Result<&Value, Invalid> {
        match (self, key) {
            (Self::Seq(items), Key::Index(idx)) => items.get(*idx).ok_or(Invalid("index out of range")),
            (Self::Map(fields), Key::Field(name)) => fields.get(name).ok_or(Invalid("no such field")),
            (Self::Seq(_), Key::Field(_)) => Err(Invalid("expected an index")),
            (Self::Map(_), Key::Index(_)) => Err(Invalid("expected a field name")),
            _ => Err(Invalid("not a container")),
        }
    }
    fn child_mut(&mut self, key: &Key) -> Result<&mut Value, Invalid> {
        match (self, key) {
            (Self::Seq(items), Key::Index(idx)) => {
                items.get_mut(*idx).ok_or(Invalid("index out of range"))
            }
            (Self::Map(fields), Key::Field(name)) => {
                fields.get_mut(name).ok_or(Invalid("no such field"))
            }
            (Self::Seq(_), Key::Field(_)) => Err(Invalid("expected an index")),
            (Self::Map(_), Key::Index(_)) => Err(Invalid("expected a field name")),
            _ => Err(Invalid("not a container")),
        }
    }
}

impl Patchable for Value {
    fn get_at(&self, path: &[Key]) -> Result<Value, Invalid> {
        match (self, path.split_first()) {
            (_, None) => Ok(self.clone()),
            (Self::Node(node), Some(_)) => node.get_at(path),
            (_, Some((key, rest))) => self.child(key)?.get_at(rest),
        }
    }
    fn edit_at(&mut self, path: &[Key], change: Change) -> Result<Option<Value>, Invalid> {
        let Some((key, rest)) = path.split_first() else {
            return match change {
                Change::Replace(value) => Ok(Some(std::mem::replace(self, value))),
                Change::Insert(_) | Change::Remove => {
                    Err(Invalid("cannot insert or remove the root"))
                }
            };
        };
        if let Self::Node(node) = self {
            return node.edit_at(path, change);
        }
        if !rest.is_empty() {
            return self.child_mut(key)?.edit_at(rest, change);
        }
        match (self, key, change) {
            (Self::Seq(items), Key::Index(idx), Change::Insert(value)) => {
                if *idx > items.len() {
                    return Err(Invalid("index out of range"));
                }
                items.insert(*idx, value);
                Ok(None)
            }
            // JSON Pointer's "one past the end".
            (Self::Seq(items), Key::Field(name), Change::Insert(value)) if name == APPEND => {
                items.push(value);
                Ok(None)
            }
            (Self::Seq(items), Key::Index(idx), Change::Remove) => {
                if *idx >= items.len() {
                    return Err(Invalid("index out of range"));
                }
                Ok(Some(items.remove(*idx)))
            }
            (Self::Seq(items), Key::Index(idx), Change::Replace(value)) => {
                let slot = items.get_mut(*idx).ok_or(Invalid("index out of range"))?;
                Ok(Some(std::mem::replace(slot, value)))
            }
            (Self::Map(fields), Key::Field(name), Change::Insert(value)) => {
                if fields.contains_key(name) {
                    return Err(Invalid("field already present"));
                }
                fields.insert(name.clone(), value);
                Ok(None)
            }
            (Self::Map(fields), Key::Field(name), Change::Remove) => fields
                .remove(name)
                .map(Some)
                .ok_or(Invalid("no such field")),
            (Self::Map(fields), Key::Field(name), Change::Replace(value)) => {
                let slot = fields.get_mut(name).ok_or(Invalid("no such field"))?;
                Ok(Some(std::mem::replace(slot, value)))
            }
            (Self::Seq(_), Key::Field(_), _) => Err(Invalid("expected an index")),
            (Self::Map(_), Key::Index(_), _) => Err(Invalid("expected a field name")),
            _ => Err(Invalid("not a container")),
        }
    }
}

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}
impl From<f64> for Value {
    fn from(value: f64) -> Self {
        Self::Number(value)
    }
}
impl From<f32> for Value {
    fn from(value: f32) -> Self {
        Self::Number(f64::from(value))
    }
}
impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Self::Text(value.to_owned())
    }
}
impl From<String> for Value {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}
impl From<BlendMode> for Value {
    fn from(value: BlendMode) -> Self {
        Self::Blend(value)
    }
}
impl From<LayerNode> for Value {
    fn from(value: LayerNode) -> Self {
        Self::Node(value)
    }
}
impl From<Selection> for Value {
    fn from(value: Selection) -> Self {
        Self::Selection(Arc::new(value))
    }
}
