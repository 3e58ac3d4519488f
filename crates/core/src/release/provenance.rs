//! Provenance normalization for publish requests.

use serde_json::Value;

use crate::error::CoreError;

/// The revision lineage a release claims to be built from.
#[derive(Debug, Clone, PartialEq)]
pub struct Provenance {
    pub source_revision_id: Option<String>,
    pub source_revision_set: Vec<String>,
}

impl Provenance {
    /// Normalize a `sourceRevisionId` / `sourceRevisionSet` pair.
    ///
    /// When the id is omitted it is derived as the first element of
    /// the set; after normalization the set always starts with the id
    /// (prepended if absent) and contains no duplicates, preserving
    /// first-seen order. Malformed sets are rejected before any store
    /// mutation.
    pub fn resolve(
        source_revision_id: Option<String>,
        source_revision_set: Option<&Value>,
    ) -> Result<Self, CoreError> {
        let mut set = match source_revision_set {
            None | Some(Value::Null) => Vec::new(),
            Some(Value::Array(items)) => {
                let mut out = Vec::with_capacity(items.len());
                for item in items {
                    match item {
                        Value::String(s) => out.push(s.clone()),
                        _ => {
                            return Err(CoreError::Validation(
                                "sourceRevisionSet entries must be strings".into(),
                            ))
                        }
                    }
                }
                out
            }
            Some(_) => {
                return Err(CoreError::Validation(
                    "sourceRevisionSet must be an array".into(),
                ))
            }
        };

        let id = source_revision_id.or_else(|| set.first().cloned());

        if let Some(id) = &id {
            set.retain(|s| s != id);
            set.insert(0, id.clone());
        }
        let mut seen = std::collections::HashSet::new();
        set.retain(|s| seen.insert(s.clone()));

        Ok(Provenance {
            source_revision_id: id,
            source_revision_set: set,
        })
    }
}
