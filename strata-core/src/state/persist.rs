//! # Persistence boundary
//!
//! Plain serializable forms of a [`State`], for a storage collaborator to write wherever it likes.
//! Pixel data travels as opaque blobs: base64 of the raw bytes, tagged with a `blake3` hash so
//! corruption is caught on the way back in. The core itself never performs I/O.

use base64::Engine;

use super::{Layer, LayerNode, NodeId, NodeProps, State, StateError};
use crate::{
    raster::RasterBuffer,
    selection::Selection,
    util::Size,
};

#[derive(thiserror::Error, Debug)]
pub enum PersistError {
    #[error("blob is not valid base64: {0}")]
    Base64(#[from] base64::DecodeError),
    #[error("blob checksum mismatch, expected {expected}, found {found}")]
    Checksum { expected: String, found: String },
    #[error("blob holds {found} bytes, expected {expected}")]
    BlobLength { expected: usize, found: usize },
    #[error(transparent)]
    State(#[from] StateError),
}

/// An opaque chunk of raw bytes.
#[derive(Clone, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct BlobRecord {
    /// Standard base64 of the bytes.
    pub data: String,
    /// Hex `blake3` of the *decoded* bytes.
    pub blake3: String,
}
impl BlobRecord {
    #[must_use]
    pub fn encode(bytes: &[u8]) -> Self {
        Self {
            data: base64::engine::general_purpose::STANDARD.encode(bytes),
            blake3: blake3::hash(bytes).to_hex().to_string(),
        }
    }
    /// Decode and verify, expecting exactly `len` bytes.
    pub fn decode(&self, len: usize) -> Result<Vec<u8>, PersistError> {
        let bytes = base64::engine::general_purpose::STANDARD.decode(&self.data)?;
        let found = blake3::hash(&bytes).to_hex();
        if found.as_str() != self.blake3.to_ascii_lowercase() {
            return Err(PersistError::Checksum {
                expected: self.blake3.clone(),
                found: found.to_string(),
            });
        }
        if bytes.len() != len {
            return Err(PersistError::BlobLength {
                expected: len,
                found: bytes.len(),
            });
        }
        Ok(bytes)
    }
}

#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum NodeRecord {
    Layer {
        id: NodeId,
        props: NodeProps,
        /// Row-major straight-alpha RGBA8, canvas sized.
        pixels: BlobRecord,
    },
    Group {
        id: NodeId,
        props: NodeProps,
        children: Vec<NodeRecord>,
    },
}

#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct StateRecord {
    pub width: u32,
    pub height: u32,
    pub next_id: u64,
    /// Top-most first.
    pub layers: Vec<NodeRecord>,
    /// Row-major byte mask, canvas sized, 0 or 255 per pixel.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub selection: Option<BlobRecord>,
}

fn node_record(node: &LayerNode) -> NodeRecord {
    match node {
        LayerNode::Layer(layer) => NodeRecord::Layer {
            id: layer.id().clone(),
            props: layer.props().clone(),
            pixels: BlobRecord::encode(layer.buffer().as_bytes()),
        },
        LayerNode::Group(group) => NodeRecord::Group {
            id: group.id().clone(),
            props: group.props().clone(),
            children: group.children().iter().map(node_record).collect(),
        },
    }
}

fn byte_len(size: Size, channels: usize) -> usize {
    size.width as usize * size.height as usize * channels
}

fn restore_node(record: &NodeRecord, size: Size) -> Result<LayerNode, PersistError> {
    Ok(match record {
        NodeRecord::Layer { id, props, pixels } => {
            let bytes = pixels.decode(byte_len(size, 4))?;
            // Length was checked above.
            let image = image::RgbaImage::from_raw(size.width, size.height, bytes).ok_or(
                PersistError::BlobLength {
                    expected: byte_len(size, 4),
                    found: 0,
                },
            )?;
            LayerNode::Layer(std::sync::Arc::new(Layer::new(
                id.clone(),
                props.clone(),
                RasterBuffer::from_image(image),
            )))
        }
        NodeRecord::Group {
            id,
            props,
            children,
        } => LayerNode::new_group(
            id.clone(),
            props.clone(),
            children
                .iter()
                .map(|child| restore_node(child, size))
                .collect::<Result<_, _>>()?,
        ),
    })
}

impl State {
    #[must_use]
    pub fn to_record(&self) -> StateRecord {
        StateRecord {
            width: self.size.width,
            height: self.size.height,
            next_id: self.next_id,
            layers: self.layers.iter().map(node_record).collect(),
            selection: self
                .selection()
                .map(|selection| BlobRecord::encode(selection.as_bytes())),
        }
    }
    /// Rebuild a state, verifying every blob and every structural invariant.
    pub fn from_record(record: &StateRecord) -> Result<Self, PersistError> {
        let size = Size::new(record.width, record.height);
        let layers = record
            .layers
            .iter()
            .map(|node| restore_node(node, size))
            .collect::<Result<Vec<_>, _>>()?;
        let selection = match &record.selection {
            Some(blob) => {
                let bytes = blob.decode(byte_len(size, 1))?;
                let mask = image::GrayImage::from_raw(size.width, size.height, bytes).ok_or(
                    PersistError::BlobLength {
                        expected: byte_len(size, 1),
                        found: 0,
                    },
                )?;
                Some(Selection::from_mask(mask))
            }
            None => None,
        };
        let state = State::from_parts(size, record.next_id, layers, selection)?;
        log::debug!(
            "restored {} document with {} nodes",
            size,
            state.iter().count()
        );
        Ok(state)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::{selection::CombineMode, state::test::nested, util::Rect};

    fn painted() -> State {
        let mut state = nested();
        let layer = state.node_mut(&NodeId::new("layer-3")).unwrap();
        layer
            .layer_mut()
            .unwrap()
            .buffer_mut()
            .make_mut()
            .put_pixel(1, 2, image::Rgba([10, 20, 30, 40]));
        let mut selection = Selection::new(state.size());
        selection.add_rect(Rect::new(1, 1, 2, 2), CombineMode::New);
        State::from_parts(
            state.size(),
            state.next_id(),
            state.layers().to_vec(),
            Some(selection),
        )
        .unwrap()
    }

    #[test]
    fn json_round_trip() -> anyhow::Result<()> {
        let state = painted();
        let json = serde_json::to_string(&state.to_record())?;
        let record: StateRecord = serde_json::from_str(&json)?;
        let restored = State::from_record(&record)?;
        assert_eq!(restored, state);
        Ok(())
    }
    #[test]
    fn corruption_detected() {
        let mut record = painted().to_record();
        let NodeRecord::Layer { pixels, .. } = &mut record.layers[0] else {
            panic!("expected a layer on top");
        };
        // Valid base64 of the right length, different content.
        let original = pixels.data.clone();
        *pixels = BlobRecord {
            data: BlobRecord::encode(&[1; 64]).data,
            blake3: pixels.blake3.clone(),
        };
        assert_ne!(pixels.data, original);
        assert!(matches!(
            State::from_record(&record),
            Err(PersistError::Checksum { .. })
        ));
    }
    #[test]
    fn wrong_length_detected() {
        let mut record = painted().to_record();
        record.selection = Some(BlobRecord::encode(&[255; 3]));
        assert!(matches!(
            State::from_record(&record),
            Err(PersistError::BlobLength {
                expected: 16,
                found: 3
            })
        ));
    }
    #[test]
    fn duplicate_ids_rejected() {
        let mut record = painted().to_record();
        let copy = record.layers[0].clone();
        record.layers.push(copy);
        assert!(matches!(
            State::from_record(&record),
            Err(PersistError::State(StateError::DuplicateId(_)))
        ));
    }
}
