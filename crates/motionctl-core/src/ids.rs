//! Correlation ids.
//!
//! Correlation ids are opaque to the remote supervisor: it echoes whatever
//! string the client put on the request. Freshly generated ids are UUID v7
//! (time-ordered) via [`uuid::Uuid::now_v7`], which keeps collisions between
//! concurrently in-flight transactions practically impossible. Nothing checks
//! for collisions at runtime.

use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Token linking an outbound request to its inbound response(s).
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CorrelationId(String);

impl CorrelationId {
    /// Create a fresh id (UUID v7, time-ordered).
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::now_v7().to_string())
    }

    /// The id as sent on the wire.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for CorrelationId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for CorrelationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<String> for CorrelationId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for CorrelationId {
    fn from(s: &str) -> Self {
        Self(s.to_owned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_is_uuid_v7() {
        let id = CorrelationId::new();
        let parsed = Uuid::parse_str(id.as_str()).expect("should be valid UUID");
        assert_eq!(parsed.get_version(), Some(uuid::Version::SortRand));
    }

    #[test]
    fn ids_are_unique() {
        let a = CorrelationId::new();
        let b = CorrelationId::new();
        assert_ne!(a, b);
    }

    #[test]
    fn caller_supplied_ids_are_kept_verbatim() {
        let id = CorrelationId::from("req-42");
        assert_eq!(id.as_str(), "req-42");
        assert_eq!(format!("{id}"), "req-42");
    }

    #[test]
    fn serde_is_transparent() {
        let id = CorrelationId::from("abc");
        let json = serde_json::to_string(&id).unwrap();
        assert_eq!(json, "\"abc\"");
        let back: CorrelationId = serde_json::from_str(&json).unwrap();
        assert_eq!(back, id);
    }
}
