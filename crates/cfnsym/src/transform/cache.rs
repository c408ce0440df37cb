//! Collection Cache: stable placeholders for collections that can not be resolved
use crate::value::Value;
use std::collections::HashMap;

/// Number of placeholder items generated for an unresolved collection
pub const PLACEHOLDER_COUNT: usize = 2;

#[derive(Debug, Default)]
pub struct CollectionCache {
    entries: HashMap<String, Vec<Value>>,
}

impl CollectionCache {
    /// Placeholder items standing in for the collection `expression`
    ///
    /// Structurally equal expressions get the same placeholders for the lifetime of the cache.
    pub fn placeholders(&mut self, expression: &Value) -> Vec<Value> {
        let key = expression.digest();
        self.entries
            .entry(key)
            .or_insert_with_key(|key| {
                tracing::debug!(
                    expression = %expression.to_json_string(),
                    "collection replaced by placeholders"
                );
                (0..PLACEHOLDER_COUNT)
                    .map(|index| Value::String(format!("Placeholder{}{index}", &key[..12])))
                    .collect()
            })
            .clone()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
