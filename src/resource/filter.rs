//! Resource filter
//!
//! Name and tag constraints applied to decoded backend services. An absent
//! constraint matches everything; present constraints are ANDed.

use super::tags::TagMap;

/// Caller-supplied filter for backend services
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResourceFilter {
    /// Exact, case-sensitive name
    pub name: Option<String>,
    /// Every entry must be present with an equal value
    pub tags: Option<TagMap>,
}

impl ResourceFilter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn with_tags(mut self, tags: TagMap) -> Self {
        self.tags = Some(tags);
        self
    }

    /// Whether a resource with `name` and decoded `tags` satisfies the filter.
    ///
    /// An empty tag filter matches any resource, including untagged ones.
    pub fn matches(&self, name: &str, tags: &TagMap) -> bool {
        if let Some(wanted) = &self.name {
            if wanted != name {
                return false;
            }
        }

        match &self.tags {
            Some(wanted) => wanted
                .iter()
                .all(|(key, value)| tags.get(key) == Some(value)),
            None => true,
        }
    }
}
