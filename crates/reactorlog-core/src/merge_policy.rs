use std::collections::{BTreeMap, HashSet};

use crate::config::AlignmentConfig;

/// Decides output column names when two tables are joined on a shared key.
///
/// A name present on both sides (other than the key) gets the left suffix on the left column
/// and the right suffix on the right column. Names unique to one side are kept as they are.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MergePolicy {
    left_suffix: String,
    right_suffix: String,
}

impl MergePolicy {
    pub fn new(left_suffix: impl Into<String>, right_suffix: impl Into<String>) -> Self {
        Self {
            left_suffix: left_suffix.into(),
            right_suffix: right_suffix.into(),
        }
    }

    pub fn left_suffix(&self) -> &str {
        &self.left_suffix
    }

    pub fn right_suffix(&self) -> &str {
        &self.right_suffix
    }

    pub fn rename_map<L, R>(&self, left: L, right: R, key: &str) -> RenameMap
    where
        L: IntoIterator,
        L::Item: AsRef<str>,
        R: IntoIterator,
        R::Item: AsRef<str>,
    {
        let left: HashSet<String> = left
            .into_iter()
            .map(|name| name.as_ref().to_string())
            .collect();

        let mut map = RenameMap::default();
        for name in right {
            let name = name.as_ref();
            if name == key || !left.contains(name) {
                continue;
            }
            map.left
                .insert(name.to_string(), format!("{name}{}", self.left_suffix));
            map.right
                .insert(name.to_string(), format!("{name}{}", self.right_suffix));
        }
        map
    }
}

impl Default for MergePolicy {
    fn default() -> Self {
        Self::from(&AlignmentConfig::default())
    }
}

impl From<&AlignmentConfig> for MergePolicy {
    fn from(config: &AlignmentConfig) -> Self {
        Self::new(&config.left_suffix, &config.right_suffix)
    }
}

/// Per-side renames for colliding column names.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RenameMap {
    left: BTreeMap<String, String>,
    right: BTreeMap<String, String>,
}

impl RenameMap {
    pub fn left_name<'a>(&'a self, name: &'a str) -> &'a str {
        self.left.get(name).map(String::as_str).unwrap_or(name)
    }

    pub fn right_name<'a>(&'a self, name: &'a str) -> &'a str {
        self.right.get(name).map(String::as_str).unwrap_or(name)
    }

    /// Original names that appear on both sides, sorted.
    pub fn collisions(&self) -> impl Iterator<Item = &str> {
        self.left.keys().map(String::as_str)
    }

    pub fn is_empty(&self) -> bool {
        self.left.is_empty()
    }
}
