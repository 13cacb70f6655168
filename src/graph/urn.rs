//! Canonical resource addresses.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::GraphError;

/// Canonical identity of a resource, encoded as `"<type>:<id>"`.
///
/// The type never contains a colon; the ID may, so parsing splits on the
/// first colon only.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Urn(String);

impl Urn {
    /// Builds the URN for a resource type and local ID.
    #[must_use]
    pub fn new(resource_type: &str, id: &str) -> Self {
        Self(format!("{resource_type}:{id}"))
    }

    /// Parses a URN string.
    ///
    /// # Errors
    ///
    /// Returns an error if either half is empty or the separator is missing.
    pub fn parse(value: &str) -> Result<Self, GraphError> {
        match value.split_once(':') {
            Some((resource_type, id)) if !resource_type.is_empty() && !id.is_empty() => {
                Ok(Self(value.to_string()))
            }
            _ => Err(GraphError::InvalidUrn {
                urn: value.to_string(),
            }),
        }
    }

    /// Returns the resource type half.
    #[must_use]
    pub fn resource_type(&self) -> &str {
        self.0.split_once(':').map_or("", |(t, _)| t)
    }

    /// Returns the local ID half.
    #[must_use]
    pub fn id(&self) -> &str {
        self.0.split_once(':').map_or("", |(_, id)| id)
    }

    /// Returns the full URN string.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Urn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for Urn {
    type Err = GraphError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for Urn {
    type Error = GraphError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<Urn> for String {
    fn from(urn: Urn) -> Self {
        urn.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_urn_round_trip() {
        let urn = Urn::new("tracking-plan", "tp1");
        assert_eq!(urn.as_str(), "tracking-plan:tp1");
        assert_eq!(urn.resource_type(), "tracking-plan");
        assert_eq!(urn.id(), "tp1");
        assert_eq!(Urn::parse("tracking-plan:tp1").unwrap(), urn);
    }

    #[test]
    fn test_urn_id_may_contain_colon() {
        let urn = Urn::parse("source:ws:main").unwrap();
        assert_eq!(urn.resource_type(), "source");
        assert_eq!(urn.id(), "ws:main");
    }

    #[test]
    fn test_urn_invalid() {
        assert!(Urn::parse("no-separator").is_err());
        assert!(Urn::parse(":id").is_err());
        assert!(Urn::parse("type:").is_err());
    }
}
