//! Block-tree canonicalization.
//!
//! Editor block trees arrive as arbitrary JSON. Canonicalization
//! validates the shape, fills defaults and recursively sorts object
//! keys so that identical content always serializes to identical
//! bytes, which is what the release hashes are computed over.
//! Array order is content and is never touched.

pub mod render;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;

use crate::error::CoreError;

#[derive(Debug, Error)]
pub enum BlockError {
    #[error("invalid blocks: {0}")]
    InvalidBlocks(String),
}

impl From<BlockError> for CoreError {
    fn from(err: BlockError) -> Self {
        CoreError::Validation(err.to_string())
    }
}

/// One node in a canonical block tree.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Block {
    pub name: String,
    #[serde(default)]
    pub attributes: Map<String, Value>,
    #[serde(default)]
    pub inner_blocks: Vec<Block>,
}

/// Normalize a raw block value into a canonical tree.
///
/// `None` (the field was absent) normalizes to an empty tree. The
/// function is pure and idempotent: normalizing an already-normalized
/// tree yields a byte-identical serialization.
pub fn normalize(raw: Option<&Value>) -> Result<Vec<Block>, BlockError> {
    let raw = match raw {
        None | Some(Value::Null) => return Ok(Vec::new()),
        Some(v) => v,
    };
    let items = raw
        .as_array()
        .ok_or_else(|| BlockError::InvalidBlocks("blocks must be an array".into()))?;
    items.iter().map(normalize_block).collect()
}

fn normalize_block(raw: &Value) -> Result<Block, BlockError> {
    let obj = raw
        .as_object()
        .ok_or_else(|| BlockError::InvalidBlocks("block must be an object".into()))?;

    let name = match obj.get("name") {
        Some(Value::String(s)) if !s.is_empty() => s.clone(),
        Some(Value::String(_)) => {
            return Err(BlockError::InvalidBlocks("block name must be non-empty".into()))
        }
        _ => return Err(BlockError::InvalidBlocks("block name must be a string".into())),
    };

    let attributes = match obj.get("attributes") {
        None | Some(Value::Null) => Map::new(),
        Some(Value::Object(m)) => canonicalize_map(m),
        Some(_) => {
            return Err(BlockError::InvalidBlocks("attributes must be an object".into()))
        }
    };

    let inner_blocks = match obj.get("innerBlocks") {
        None | Some(Value::Null) => Vec::new(),
        Some(v @ Value::Array(_)) => normalize(Some(v))?,
        Some(_) => {
            return Err(BlockError::InvalidBlocks("innerBlocks must be an array".into()))
        }
    };

    Ok(Block {
        name,
        attributes,
        inner_blocks,
    })
}

/// Recursively sort object keys; arrays keep their order.
fn canonicalize_value(value: &Value) -> Value {
    match value {
        Value::Object(map) => Value::Object(canonicalize_map(map)),
        Value::Array(items) => Value::Array(items.iter().map(canonicalize_value).collect()),
        other => other.clone(),
    }
}

fn canonicalize_map(map: &Map<String, Value>) -> Map<String, Value> {
    let mut keys: Vec<&String> = map.keys().collect();
    keys.sort();
    let mut out = Map::new();
    for key in keys {
        out.insert(key.clone(), canonicalize_value(&map[key]));
    }
    out
}

/// Serialize a canonical tree to its defining JSON bytes.
pub fn canonical_json(blocks: &[Block]) -> Result<String, CoreError> {
    serde_json::to_string(blocks).map_err(Into::into)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn missing_blocks_normalize_to_empty() {
        assert_eq!(normalize(None).unwrap(), Vec::new());
        assert_eq!(normalize(Some(&Value::Null)).unwrap(), Vec::new());
    }

    #[test]
    fn defaults_are_filled() {
        let blocks = normalize(Some(&json!([{ "name": "core/paragraph" }]))).unwrap();
        assert_eq!(blocks.len(), 1);
        assert!(blocks[0].attributes.is_empty());
        assert!(blocks[0].inner_blocks.is_empty());
    }

    #[test]
    fn attribute_order_does_not_change_bytes() {
        let a = normalize(Some(&json!([
            { "name": "core/image", "attributes": { "b": 1, "a": { "y": 2, "x": 1 } } }
        ])))
        .unwrap();
        let b = normalize(Some(&json!([
            { "name": "core/image", "attributes": { "a": { "x": 1, "y": 2 }, "b": 1 } }
        ])))
        .unwrap();
        assert_eq!(canonical_json(&a).unwrap(), canonical_json(&b).unwrap());
    }

    #[test]
    fn array_order_is_preserved() {
        let blocks = normalize(Some(&json!([
            { "name": "core/list", "attributes": { "items": [3, 1, 2] } }
        ])))
        .unwrap();
        assert_eq!(blocks[0].attributes["items"], json!([3, 1, 2]));
    }

    #[test]
    fn normalize_is_idempotent() {
        let raw = json!([
            {
                "name": "core/heading",
                "attributes": { "level": 2, "content": "Hi" },
                "innerBlocks": [
                    { "name": "core/paragraph", "attributes": { "z": 1, "a": 2 } }
                ]
            }
        ]);
        let once = normalize(Some(&raw)).unwrap();
        let reparsed: Value = serde_json::from_str(&canonical_json(&once).unwrap()).unwrap();
        let twice = normalize(Some(&reparsed)).unwrap();
        assert_eq!(canonical_json(&once).unwrap(), canonical_json(&twice).unwrap());
    }

    #[test]
    fn rejects_bad_shapes() {
        assert!(normalize(Some(&json!("nope"))).is_err());
        assert!(normalize(Some(&json!([42]))).is_err());
        assert!(normalize(Some(&json!([{ "name": "" }]))).is_err());
        assert!(normalize(Some(&json!([{ "name": 7 }]))).is_err());
        assert!(normalize(Some(&json!([{ "name": "x", "attributes": [] }]))).is_err());
        assert!(normalize(Some(&json!([{ "name": "x", "innerBlocks": {} }]))).is_err());
    }
}
