//! Type identifiers.

use std::fmt;
use std::str::FromStr;

use schemars::JsonSchema;
use schemars::r#gen::SchemaGenerator;
use schemars::schema::Schema;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::{RuntimeResult, SchemeError};

/// A type identifier: `(group, name, version)`.
///
/// The canonical string form is `name[.group][/version]`, for example
/// `OCIImage/v1`, `localBlob.access.ocm.software/v1` or the unversioned
/// alias `OCIImage`. Names never contain a dot, so the first dot always
/// starts the group.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Type {
    group: String,
    name: String,
    version: String,
}

impl Type {
    /// Create an unversioned type with no group.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            group: String::new(),
            name: name.into(),
            version: String::new(),
        }
    }

    /// Create a versioned type with no group.
    #[must_use]
    pub fn versioned(name: impl Into<String>, version: impl Into<String>) -> Self {
        Self::new(name).with_version(version)
    }

    /// Set the group.
    #[must_use]
    pub fn with_group(mut self, group: impl Into<String>) -> Self {
        self.group = group.into();
        self
    }

    /// Set the version.
    #[must_use]
    pub fn with_version(mut self, version: impl Into<String>) -> Self {
        self.version = version.into();
        self
    }

    /// Parse the canonical string form.
    ///
    /// An empty (or all-whitespace) input yields the empty type.
    ///
    /// # Errors
    ///
    /// Returns [`SchemeError::InvalidType`] if a component is empty or the
    /// name contains whitespace.
    pub fn parse(input: &str) -> RuntimeResult<Self> {
        let trimmed = input.trim();
        if trimmed.is_empty() {
            return Ok(Self::default());
        }

        let invalid = |reason: &str| SchemeError::InvalidType {
            input: input.to_string(),
            reason: reason.to_string(),
        };

        let (head, version) = match trimmed.rsplit_once('/') {
            Some((_, "")) => return Err(invalid("version after '/' must not be empty")),
            Some((head, version)) => (head, version),
            None => (trimmed, ""),
        };

        let (name, group) = match head.split_once('.') {
            Some((_, "")) => return Err(invalid("group after '.' must not be empty")),
            Some((name, group)) => (name, group),
            None => (head, ""),
        };

        if name.is_empty() {
            return Err(invalid("name must not be empty"));
        }
        if trimmed.chars().any(char::is_whitespace) {
            return Err(invalid("identifiers must not contain whitespace"));
        }

        Ok(Self {
            group: group.to_string(),
            name: name.to_string(),
            version: version.to_string(),
        })
    }

    /// The group, empty if none.
    #[must_use]
    pub fn group(&self) -> &str {
        &self.group
    }

    /// The name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The version, empty for unversioned aliases.
    #[must_use]
    pub fn version(&self) -> &str {
        &self.version
    }

    /// Whether this is the empty type (no name).
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.name.is_empty()
    }

    /// Whether the identifier carries a version.
    #[must_use]
    pub fn is_versioned(&self) -> bool {
        !self.version.is_empty()
    }

    /// The same identifier without its version.
    #[must_use]
    pub fn unversioned(&self) -> Self {
        Self {
            group: self.group.clone(),
            name: self.name.clone(),
            version: String::new(),
        }
    }
}

impl fmt::Display for Type {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)?;
        if !self.group.is_empty() {
            write!(f, ".{}", self.group)?;
        }
        if !self.version.is_empty() {
            write!(f, "/{}", self.version)?;
        }
        Ok(())
    }
}

impl FromStr for Type {
    type Err = SchemeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl Serialize for Type {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Type {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Self::parse(&s).map_err(serde::de::Error::custom)
    }
}

/// Types are plain strings on the wire.
impl JsonSchema for Type {
    fn schema_name() -> String {
        "Type".to_string()
    }

    fn json_schema(generator: &mut SchemaGenerator) -> Schema {
        String::json_schema(generator)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_versioned() {
        let typ = Type::parse("OCIImage/v1").unwrap();
        assert_eq!(typ.name(), "OCIImage");
        assert_eq!(typ.version(), "v1");
        assert!(typ.group().is_empty());
        assert!(typ.is_versioned());
    }

    #[test]
    fn test_parse_grouped() {
        let typ = Type::parse("localBlob.access.ocm.software/v1").unwrap();
        assert_eq!(typ.name(), "localBlob");
        assert_eq!(typ.group(), "access.ocm.software");
        assert_eq!(typ.version(), "v1");
        assert_eq!(typ.to_string(), "localBlob.access.ocm.software/v1");
    }

    #[test]
    fn test_parse_unversioned_and_empty() {
        let typ = Type::parse("OCIImage").unwrap();
        assert!(!typ.is_versioned());
        assert_eq!(typ, Type::new("OCIImage"));

        assert!(Type::parse("").unwrap().is_empty());
        assert!(Type::parse("   ").unwrap().is_empty());
    }

    #[test]
    fn test_parse_rejects_malformed() {
        assert!(Type::parse("OCIImage/").is_err());
        assert!(Type::parse("/v1").is_err());
        assert!(Type::parse("OCIImage./v1").is_err());
        assert!(Type::parse("OCI Image/v1").is_err());
    }

    #[test]
    fn test_display_roundtrip() {
        for input in ["a", "a/v1", "a.b.c", "a.b.c/v1alpha1"] {
            assert_eq!(Type::parse(input).unwrap().to_string(), input);
        }
    }

    #[test]
    fn test_unversioned_alias() {
        let typ = Type::versioned("helm", "v1").with_group("access.ocm.software");
        assert_eq!(typ.unversioned().to_string(), "helm.access.ocm.software");
    }

    #[test]
    fn test_serde_as_string() {
        let typ = Type::versioned("OCIImage", "v1");
        let json = serde_json::to_string(&typ).unwrap();
        assert_eq!(json, "\"OCIImage/v1\"");
        let back: Type = serde_json::from_str(&json).unwrap();
        assert_eq!(back, typ);
        assert!(serde_json::from_str::<Type>("\"x/\"").is_err());
    }
}
