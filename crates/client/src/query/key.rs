use std::fmt;

/// Hierarchical cache key, an ordered tuple of string segments.
///
/// Keys compare segment-wise, so `["exercises", "history"]` and
/// `["exercises", "progress"]` are distinct entries while sharing a
/// readable prefix.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct QueryKey(Vec<String>);

impl QueryKey {
    pub fn new<I, S>(segments: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self(segments.into_iter().map(Into::into).collect())
    }

    pub fn segments(&self) -> &[String] {
        &self.0
    }

    /// Derive a child key by appending a segment (e.g., a record id)
    #[must_use]
    pub fn with(&self, segment: impl Into<String>) -> Self {
        let mut segments = self.0.clone();
        segments.push(segment.into());
        Self(segments)
    }
}

impl fmt::Display for QueryKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.join(":"))
    }
}

impl<S: Into<String>> From<S> for QueryKey {
    fn from(segment: S) -> Self {
        Self(vec![segment.into()])
    }
}
