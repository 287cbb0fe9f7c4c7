//! Capability identifiers shared across the tool runtime.

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

const MAX_ID_LEN: usize = 64;

/// Identifier for a runtime precondition a tool may require.
///
/// Capabilities are opaque tokens ("git", "network", "notion_api") resolved
/// against the environment by a checker; the identifier itself carries no
/// probing logic.
#[derive(Clone, Debug, Eq, PartialEq, Ord, PartialOrd, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CapabilityId(String);

impl CapabilityId {
    /// Creates a new capability identifier after validating its format.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidCapabilityId`] if the supplied identifier is
    /// empty, too long, or contains unsupported characters.
    pub fn new(id: impl Into<String>) -> Result<Self> {
        let id = id.into();
        validate_identifier(&id)?;
        Ok(Self(id))
    }

    /// Returns the capability identifier as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for CapabilityId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<CapabilityId> for String {
    fn from(value: CapabilityId) -> Self {
        value.0
    }
}

fn validate_identifier(id: &str) -> Result<()> {
    if id.is_empty() {
        return Err(Error::InvalidCapabilityId {
            id: String::new(),
            reason: "identifier cannot be empty".into(),
        });
    }

    if id.len() > MAX_ID_LEN {
        return Err(Error::InvalidCapabilityId {
            id: id.into(),
            reason: format!("identifier length must be <= {MAX_ID_LEN}"),
        });
    }

    if !id
        .chars()
        .all(|c| matches!(c, 'a'..='z' | '0'..='9' | '-' | '_' | '.'))
    {
        return Err(Error::InvalidCapabilityId {
            id: id.into(),
            reason: "identifier must contain lowercase alphanumeric, dash, underscore, or dot"
                .into(),
        });
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_valid_identifiers() {
        for id in ["git", "notion_api", "web-search", "vision.describe"] {
            CapabilityId::new(id).expect(id);
        }
    }

    #[test]
    fn rejects_empty_identifier() {
        let err = CapabilityId::new("").expect_err("empty should fail");
        assert!(matches!(err, Error::InvalidCapabilityId { .. }));
    }

    #[test]
    fn rejects_invalid_characters() {
        let err = CapabilityId::new("Notion API").expect_err("spaces should fail");
        assert!(matches!(err, Error::InvalidCapabilityId { .. }));
    }

    #[test]
    fn serde_is_transparent() {
        let id = CapabilityId::new("github_api").unwrap();
        let json = serde_json::to_string(&id).unwrap();
        assert_eq!(json, "\"github_api\"");
    }
}
