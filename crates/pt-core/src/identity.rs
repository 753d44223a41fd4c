//! User identity.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

/// Error returned when a string is not a canonical identity.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("invalid identity {value:?}")]
pub struct IdentityError {
    pub value: String,
}

/// A user identity, backed by a UUID.
///
/// Rendered as 36-character lowercase hyphenated text, which is also the key
/// format of every persisted record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Identity(Uuid);

impl Identity {
    pub const fn new(uuid: Uuid) -> Self {
        Self(uuid)
    }

    /// Generates a random identity.
    pub fn random() -> Self {
        Self(Uuid::new_v4())
    }

    pub const fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl From<Uuid> for Identity {
    fn from(uuid: Uuid) -> Self {
        Self(uuid)
    }
}

impl FromStr for Identity {
    type Err = IdentityError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s.trim())
            .map(Self)
            .map_err(|_| IdentityError {
                value: s.to_string(),
            })
    }
}

impl TryFrom<String> for Identity {
    type Error = IdentityError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Identity> for String {
    fn from(id: Identity) -> Self {
        id.to_string()
    }
}

impl fmt::Display for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.hyphenated())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_is_lowercase_hyphenated() {
        let id: Identity = "6F9619FF-8B86-D011-B42D-00C04FC964FF".parse().unwrap();
        assert_eq!(id.to_string(), "6f9619ff-8b86-d011-b42d-00c04fc964ff");
        assert_eq!(id.to_string().len(), 36);
    }

    #[test]
    fn rejects_garbage() {
        let err = "not-a-uuid".parse::<Identity>().unwrap_err();
        assert_eq!(err.value, "not-a-uuid");
    }

    #[test]
    fn serde_uses_text_form() {
        let id: Identity = "6f9619ff-8b86-d011-b42d-00c04fc964ff".parse().unwrap();
        let json = serde_json::to_string(&id).unwrap();
        assert_eq!(json, r#""6f9619ff-8b86-d011-b42d-00c04fc964ff""#);
        let back: Identity = serde_json::from_str(&json).unwrap();
        assert_eq!(back, id);
    }
}
