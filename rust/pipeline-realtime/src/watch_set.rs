use serde::{Deserialize, Serialize};
use std::fmt;

/// Ordered set of resource names a subscription watches.
///
/// Identity is the canonical [`WatchSet::key`], not the allocation: two sets
/// built independently from the same names in the same order share a key and
/// therefore a connection.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct WatchSet {
    resources: Vec<String>,
}

impl WatchSet {
    pub fn new<I, S>(resources: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut out: Vec<String> = Vec::new();
        for name in resources {
            let name = name.into();
            if !out.contains(&name) {
                out.push(name);
            }
        }
        Self { resources: out }
    }

    pub fn single(resource: impl Into<String>) -> Self {
        Self {
            resources: vec![resource.into()],
        }
    }

    pub fn resources(&self) -> &[String] {
        &self.resources
    }

    pub fn is_empty(&self) -> bool {
        self.resources.is_empty()
    }

    pub fn len(&self) -> usize {
        self.resources.len()
    }

    pub fn contains(&self, resource: &str) -> bool {
        self.resources.iter().any(|r| r == resource)
    }

    pub fn key(&self) -> WatchKey {
        WatchKey(self.resources.join("_"))
    }
}

impl From<&str> for WatchSet {
    fn from(resource: &str) -> Self {
        Self::single(resource)
    }
}

impl From<String> for WatchSet {
    fn from(resource: String) -> Self {
        Self::single(resource)
    }
}

impl From<Vec<String>> for WatchSet {
    fn from(resources: Vec<String>) -> Self {
        Self::new(resources)
    }
}

impl From<Vec<&str>> for WatchSet {
    fn from(resources: Vec<&str>) -> Self {
        Self::new(resources)
    }
}

impl From<&[&str]> for WatchSet {
    fn from(resources: &[&str]) -> Self {
        Self::new(resources.iter().copied())
    }
}

impl<const N: usize> From<[&str; N]> for WatchSet {
    fn from(resources: [&str; N]) -> Self {
        Self::new(resources)
    }
}

/// Canonical, comparable identity of a [`WatchSet`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct WatchKey(String);

impl WatchKey {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for WatchKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_joins_in_order() {
        let set = WatchSet::from(["applications", "application_steps"]);
        assert_eq!(set.key().as_str(), "applications_application_steps");
    }

    #[test]
    fn test_reallocated_sets_share_key() {
        let a = WatchSet::from(vec!["applications".to_string(), "application_steps".to_string()]);
        let b = WatchSet::from(["applications", "application_steps"]);
        assert_eq!(a.key(), b.key());
    }

    #[test]
    fn test_order_is_significant() {
        let a = WatchSet::from(["applications", "application_steps"]);
        let b = WatchSet::from(["application_steps", "applications"]);
        assert_ne!(a.key(), b.key());
    }

    #[test]
    fn test_single_name_matches_one_element_list() {
        assert_eq!(
            WatchSet::from("applications").key(),
            WatchSet::from(vec!["applications"]).key()
        );
    }

    #[test]
    fn test_duplicates_collapse() {
        let set = WatchSet::from(["applications", "applications"]);
        assert_eq!(set.len(), 1);
        assert!(set.contains("applications"));
    }

    #[test]
    fn test_serializes_as_list() {
        let set = WatchSet::from(["applications"]);
        assert_eq!(serde_json::to_string(&set).unwrap(), r#"["applications"]"#);
    }
}
