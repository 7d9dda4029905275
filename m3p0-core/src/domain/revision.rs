//! Revision identifiers

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use uuid::Uuid;

/// Opaque identifier of one migration in the chain
///
/// Rendered as 32 lowercase hex characters. Parsing also accepts the
/// hyphenated form, which is how the database hands UUID columns back.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Revision(Uuid);

impl Revision {
    /// Generate a new random revision
    pub fn generate() -> Self {
        Self(Uuid::new_v4())
    }

    /// Hyphenated form, as bound into UUID columns
    pub fn to_hyphenated(&self) -> String {
        self.0.hyphenated().to_string()
    }
}

impl fmt::Display for Revision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.simple())
    }
}

impl FromStr for Revision {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s.trim()).map(Self)
    }
}

impl From<Uuid> for Revision {
    fn from(uuid: Uuid) -> Self {
        Self(uuid)
    }
}

impl Serialize for Revision {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Revision {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_is_simple_hex() {
        let revision = Revision::generate();
        let rendered = revision.to_string();
        assert_eq!(rendered.len(), 32);
        assert!(rendered.chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase()));
    }

    #[test]
    fn test_hyphenated_and_simple_forms_are_equal() {
        let revision = Revision::generate();
        let from_db: Revision = revision.to_hyphenated().parse().unwrap();
        let from_file: Revision = revision.to_string().parse().unwrap();
        assert_eq!(from_db, from_file);
    }

    #[test]
    fn test_rejects_garbage() {
        assert!("not-a-revision".parse::<Revision>().is_err());
    }
}
