use crate::error::CoreError;
use serde::{Deserialize, Serialize};
use std::fmt::Display;

/// Opaque identifier of the user owning a record.
///
/// The storage layer never interprets it beyond equality; session issuance
/// decides its format.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OwnerId(String);

impl OwnerId {
    /// Creates an owner id, rejecting blank values.
    pub fn new(id: impl Into<String>) -> std::result::Result<Self, CoreError> {
        let id = id.into();
        if id.trim().is_empty() {
            return Err(CoreError::InvalidOwnerId("owner id cannot be blank".to_string()));
        }
        Ok(Self(id))
    }

    /// Wraps a value read back from storage.
    pub fn new_unchecked(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for OwnerId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_blank() {
        assert!(OwnerId::new("").is_err());
        assert!(OwnerId::new("   ").is_err());
        assert_eq!(OwnerId::new("user-1").unwrap().as_str(), "user-1");
    }
}
