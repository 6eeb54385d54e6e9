//! Document loader
//!
//! Parses YAML documents into the language-neutral tree and layers them:
//! later documents override earlier ones, nested mappings are merged key by
//! key, every other value is replaced.

use crate::error::Result;
use crate::model::StackConfig;
use crate::parser;
use serde_json::Value;
use tracing::{debug, info, instrument};

/// Parse one YAML document into a tree. Blank documents yield `Null`.
pub fn parse_tree(source: &str) -> Result<Value> {
    if source.trim().is_empty() {
        return Ok(Value::Null);
    }
    Ok(serde_yaml::from_str(source)?)
}

/// Load a stack from a single YAML document
#[instrument(skip(source), fields(bytes = source.len()))]
pub fn load_str(source: &str) -> Result<StackConfig> {
    let tree = parse_tree(source)?;
    parser::load(&tree)
}

/// Load a stack from layered YAML documents (defaults first, overrides last)
#[instrument(skip(sources), fields(documents = sources.len()))]
pub fn load_documents(sources: &[&str]) -> Result<StackConfig> {
    let mut tree = Value::Null;
    for (index, source) in sources.iter().enumerate() {
        let layer = parse_tree(source)?;
        debug!(index, "Merging document layer");
        merge_trees(&mut tree, layer);
    }

    let stack = parser::load(&tree)?;
    info!(
        stack = %stack.name,
        resources = stack.resource_count(),
        "Stack loaded"
    );
    Ok(stack)
}

/// Deep-merge `overlay` into `base`
///
/// A `Null` overlay leaves `base` untouched, so an empty document never
/// erases earlier layers.
pub fn merge_trees(base: &mut Value, overlay: Value) {
    match (base, overlay) {
        (_, Value::Null) => {}
        (Value::Object(base_map), Value::Object(overlay_map)) => {
            for (key, value) in overlay_map {
                match base_map.get_mut(&key) {
                    Some(existing) => merge_trees(existing, value),
                    None => {
                        base_map.insert(key, value);
                    }
                }
            }
        }
        (base, overlay) => *base = overlay,
    }
}
