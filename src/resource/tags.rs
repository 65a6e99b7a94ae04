//! Tag codec
//!
//! Backend services carry tags in their free-text description as
//! `Key1:Value1|Key2:Value2`. `|` separates entries and the first `:` in an
//! entry separates key from value, so values may contain `:`.
//!
//! There is no escaping. Keys containing `|` or `:`, and values containing
//! `|`, do not survive an encode/decode round trip.

use crate::error::TagFormatError;
use std::collections::BTreeMap;

/// Separator between tag entries
pub const ENTRY_SEPARATOR: char = '|';

/// Separator between a key and its value
pub const KEY_VALUE_SEPARATOR: char = ':';

/// Decoded tags, keyed by tag name
pub type TagMap = BTreeMap<String, String>;

/// Encode tags into description form. Entry order is not part of the format.
pub fn encode(tags: &TagMap) -> String {
    tags.iter()
        .map(|(key, value)| format!("{key}{KEY_VALUE_SEPARATOR}{value}"))
        .collect::<Vec<_>>()
        .join(&ENTRY_SEPARATOR.to_string())
}

/// Decode a description into tags.
///
/// An empty description is an empty map. Any entry without a `:` rejects the
/// whole description. A repeated key keeps its last value.
pub fn decode(description: &str) -> Result<TagMap, TagFormatError> {
    if description.is_empty() {
        return Ok(TagMap::new());
    }

    description
        .split(ENTRY_SEPARATOR)
        .map(|entry| {
            entry
                .split_once(KEY_VALUE_SEPARATOR)
                .map(|(key, value)| (key.to_string(), value.to_string()))
                .ok_or_else(|| TagFormatError {
                    entry: entry.to_string(),
                    description: description.to_string(),
                })
        })
        .collect()
}
