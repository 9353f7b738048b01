//! Job identifiers.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Identifier of a single push/pull job, also used as its directory name.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct JobId(String);

impl JobId {
    /// Generates a fresh id: 8 lowercase hex characters from a random v4
    /// UUID. No collision check is made.
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().to_string()[..8].to_string())
    }

    /// Validates a user-supplied id.
    ///
    /// Only ASCII alphanumerics, `-` and `_` are accepted, so the id is
    /// always a single path component.
    pub fn parse(id: &str) -> Result<Self> {
        if id.is_empty() {
            return Err(Error::Config("job id cannot be empty".to_string()));
        }
        if let Some(bad) = id
            .chars()
            .find(|c| !(c.is_ascii_alphanumeric() || *c == '-' || *c == '_'))
        {
            return Err(Error::Config(format!(
                "invalid job id {:?}: unexpected character {:?}",
                id, bad
            )));
        }
        Ok(Self(id.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for JobId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for JobId {
    type Error = Error;

    fn try_from(value: String) -> Result<Self> {
        Self::parse(&value)
    }
}

impl From<JobId> for String {
    fn from(id: JobId) -> Self {
        id.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generated_ids_are_eight_lowercase_hex() {
        for _ in 0..32 {
            let id = JobId::generate();
            assert_eq!(id.as_str().len(), 8);
            assert!(id
                .as_str()
                .chars()
                .all(|c| c.is_ascii_digit() || ('a'..='f').contains(&c)));
        }
    }

    #[test]
    fn generated_ids_differ() {
        assert_ne!(JobId::generate(), JobId::generate());
    }

    #[test]
    fn parse_accepts_generated_and_readable_ids() {
        let id = JobId::generate();
        assert_eq!(JobId::parse(id.as_str()).unwrap(), id);
        assert_eq!(JobId::parse("fix-login_2").unwrap().to_string(), "fix-login_2");
    }

    #[test]
    fn parse_rejects_path_tricks() {
        for bad in ["", "..", "../etc", "a/b", "a b", "job\n", "~"] {
            let err = JobId::parse(bad).unwrap_err();
            assert!(matches!(err, Error::Config(_)), "accepted {:?}", bad);
        }
    }

    #[test]
    fn serde_validates_ids() {
        let id: JobId = serde_json::from_str("\"deadbeef\"").unwrap();
        assert_eq!(id.as_str(), "deadbeef");
        assert!(serde_json::from_str::<JobId>("\"../x\"").is_err());
    }
}
