use serde::{Deserialize, Serialize};

/// Separator between entries in the engine's path string.
///
/// There is no escaping: a `:` inside a path cannot be represented.
pub const PATH_SEPARATOR: char = ':';

/// Ordered list of magic database locations.
///
/// An empty list stands for "whatever the engine was built with".
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SearchPath(Vec<String>);

impl SearchPath {
    pub fn new(paths: Vec<String>) -> Self {
        Self(paths)
    }

    /// Split an engine path string. Empty input yields an empty list and
    /// trailing empty entries are dropped.
    pub fn parse(joined: &str) -> Self {
        let mut paths: Vec<String> = if joined.is_empty() {
            Vec::new()
        } else {
            joined.split(PATH_SEPARATOR).map(str::to_string).collect()
        };

        while paths.last().is_some_and(|p| p.is_empty()) {
            paths.pop();
        }

        Self(paths)
    }

    /// Join into the engine's colon-delimited form.
    pub fn join(&self) -> String {
        self.0.join(&PATH_SEPARATOR.to_string())
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn as_slice(&self) -> &[String] {
        &self.0
    }

    pub fn into_vec(self) -> Vec<String> {
        self.0
    }
}

impl<S: Into<String>> FromIterator<S> for SearchPath {
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        Self(iter.into_iter().map(Into::into).collect())
    }
}

impl From<Vec<String>> for SearchPath {
    fn from(paths: Vec<String>) -> Self {
        Self(paths)
    }
}

impl From<SearchPath> for Vec<String> {
    fn from(path: SearchPath) -> Self {
        path.0
    }
}

impl std::fmt::Display for SearchPath {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.join())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_splits_on_colon() {
        let path = SearchPath::parse("/etc/magic:/usr/share/misc/magic");
        assert_eq!(
            path.as_slice(),
            &["/etc/magic".to_string(), "/usr/share/misc/magic".to_string()]
        );
    }

    #[test]
    fn test_parse_empty_is_empty_list() {
        assert!(SearchPath::parse("").is_empty());
    }

    #[test]
    fn test_parse_keeps_inner_empty_entries_drops_trailing() {
        let path = SearchPath::parse("/a::/b::");
        assert_eq!(path.into_vec(), vec!["/a", "", "/b"]);
    }

    #[test]
    fn test_join() {
        let path: SearchPath = ["/a/b", "/c/d"].into_iter().collect();
        assert_eq!(path.join(), "/a/b:/c/d");
        assert_eq!(path.to_string(), "/a/b:/c/d");
        assert_eq!(SearchPath::default().join(), "");
    }
}
