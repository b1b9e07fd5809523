//! Validated PostgreSQL schema identifiers.

use std::borrow::Cow;
use std::fmt;
use std::str::FromStr;
use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::ErrorHint;

/// Maximum identifier length accepted by PostgreSQL (`NAMEDATALEN - 1`).
pub const MAX_SCHEMA_NAME_LEN: usize = 63;

/// Prefix PostgreSQL reserves for system schemas.
const RESERVED_PREFIX: &str = "pg_";

static SCHEMA_NAME_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[a-zA-Z_][a-zA-Z0-9_]*$").expect("schema name pattern must compile")
});

/// Reasons a schema identifier is rejected.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SchemaNameError {
    /// The identifier is empty.
    #[error("schema name cannot be empty")]
    Empty,

    /// The identifier exceeds [`MAX_SCHEMA_NAME_LEN`] bytes.
    #[error("schema name is {len} bytes long, the maximum is {MAX_SCHEMA_NAME_LEN}")]
    TooLong { len: usize },

    /// The identifier contains characters outside `[a-zA-Z0-9_]` or starts with a digit.
    #[error("schema name {name:?} contains disallowed characters")]
    InvalidCharacters { name: String },

    /// The identifier uses the `pg_` prefix reserved for system schemas.
    #[error("schema name {name:?} uses the reserved `pg_` prefix")]
    Reserved { name: String },
}

impl ErrorHint for SchemaNameError {
    fn hint(&self) -> Cow<'static, str> {
        match self {
            Self::Empty | Self::InvalidCharacters { .. } => Cow::Borrowed(
                "Schema names must start with a letter or underscore and contain only ASCII letters, digits and underscores",
            ),
            Self::TooLong { .. } => Cow::Borrowed(
                "PostgreSQL truncates identifiers longer than 63 bytes, pick a shorter tenant name",
            ),
            Self::Reserved { .. } => Cow::Borrowed(
                "Names starting with `pg_` are reserved for PostgreSQL system schemas",
            ),
        }
    }
}

/// A schema name that is safe to embed in SQL.
///
/// Construction checks the identifier against the allow-list
/// `^[a-zA-Z_][a-zA-Z0-9_]*$`, the PostgreSQL length limit, and the reserved
/// `pg_` prefix. Anything that could terminate a statement or escape an
/// identifier (`;`, quotes, whitespace, comments) is rejected here, before any
/// SQL is built.
///
/// Names are case-sensitive: `Acme` and `acme` are different schemas. The
/// session `search_path` keeps such a name quoted, so for a mixed-case name or
/// a keyword `current_setting('search_path')` reads `"Acme"` rather than `Acme`.
///
/// ```
/// use tenantdb_postgres::TenantSchema;
///
/// let schema = TenantSchema::new("tenant_42").unwrap();
/// assert_eq!(schema.quoted(), "\"tenant_42\"");
///
/// assert!(TenantSchema::new("x; DROP SCHEMA public").is_err());
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct TenantSchema(Cow<'static, str>);

impl TenantSchema {
    /// The schema used when no tenant has been selected.
    pub const PUBLIC: Self = Self(Cow::Borrowed("public"));

    /// Validates `name` and wraps it.
    pub fn new(name: impl AsRef<str>) -> Result<Self, SchemaNameError> {
        let name = name.as_ref();
        Self::validate(name)?;
        Ok(Self(Cow::Owned(name.to_owned())))
    }

    /// Checks `name` without allocating.
    pub fn validate(name: &str) -> Result<(), SchemaNameError> {
        if name.is_empty() {
            return Err(SchemaNameError::Empty);
        }

        if name.len() > MAX_SCHEMA_NAME_LEN {
            return Err(SchemaNameError::TooLong { len: name.len() });
        }

        if !SCHEMA_NAME_PATTERN.is_match(name) {
            return Err(SchemaNameError::InvalidCharacters {
                name: name.to_owned(),
            });
        }

        if name
            .get(..RESERVED_PREFIX.len())
            .is_some_and(|prefix| prefix.eq_ignore_ascii_case(RESERVED_PREFIX))
        {
            return Err(SchemaNameError::Reserved {
                name: name.to_owned(),
            });
        }

        Ok(())
    }

    /// Returns the bare schema name.
    #[inline]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Returns the name as a double-quoted SQL identifier.
    ///
    /// The allow-list excludes `"`, so no escaping is needed.
    #[inline]
    pub fn quoted(&self) -> String {
        format!("\"{}\"", self.0)
    }

    /// Returns whether this is the default `public` schema.
    #[inline]
    pub fn is_public(&self) -> bool {
        self.0 == Self::PUBLIC.0
    }

    /// Consumes the wrapper and returns the owned name.
    pub fn into_inner(self) -> String {
        self.0.into_owned()
    }
}

impl Default for TenantSchema {
    fn default() -> Self {
        Self::PUBLIC
    }
}

impl fmt::Display for TenantSchema {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for TenantSchema {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl FromStr for TenantSchema {
    type Err = SchemaNameError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

impl TryFrom<String> for TenantSchema {
    type Error = SchemaNameError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::validate(&value)?;
        Ok(Self(Cow::Owned(value)))
    }
}

impl TryFrom<&str> for TenantSchema {
    type Error = SchemaNameError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<TenantSchema> for String {
    fn from(value: TenantSchema) -> Self {
        value.into_inner()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_accepts_valid_names() {
        for name in ["public", "tenant_1", "_private", "Acme", "a", "T0_9"] {
            let schema = TenantSchema::new(name).unwrap();
            assert_eq!(schema.as_str(), name);
        }
    }

    #[test]
    fn test_default_is_public() {
        let schema = TenantSchema::default();
        assert!(schema.is_public());
        assert_eq!(schema.as_str(), "public");
        assert_eq!(schema, TenantSchema::new("public").unwrap());
    }

    #[test]
    fn test_rejects_empty() {
        assert_eq!(TenantSchema::new(""), Err(SchemaNameError::Empty));
    }

    #[test]
    fn test_length_limit() {
        let longest = "a".repeat(MAX_SCHEMA_NAME_LEN);
        assert!(TenantSchema::new(&longest).is_ok());

        let too_long = "a".repeat(MAX_SCHEMA_NAME_LEN + 1);
        assert_eq!(
            TenantSchema::new(&too_long),
            Err(SchemaNameError::TooLong {
                len: MAX_SCHEMA_NAME_LEN + 1
            })
        );
    }

    #[test]
    fn test_rejects_injection_attempts() {
        let hostile = [
            "tenant; DROP SCHEMA public CASCADE",
            "tenant;",
            "public, pg_catalog",
            "\"tenant\"",
            "tenant\"; --",
            "tenant'",
            "tenant -- comment",
            "tenant/*x*/",
            "ten ant",
            "tenant\n",
            "tenant$1",
            "tenant.other",
        ];

        for name in hostile {
            assert!(
                matches!(
                    TenantSchema::new(name),
                    Err(SchemaNameError::InvalidCharacters { .. })
                ),
                "{name:?} should be rejected"
            );
        }
    }

    #[test]
    fn test_rejects_leading_digit_and_non_ascii() {
        assert!(TenantSchema::new("1tenant").is_err());
        assert!(TenantSchema::new("tenänt").is_err());
    }

    #[test]
    fn test_rejects_reserved_prefix() {
        assert!(matches!(
            TenantSchema::new("pg_catalog"),
            Err(SchemaNameError::Reserved { .. })
        ));
        assert!(matches!(
            TenantSchema::new("PG_temp"),
            Err(SchemaNameError::Reserved { .. })
        ));
        assert!(TenantSchema::new("pgtenant").is_ok());
    }

    #[test]
    fn test_quoted() {
        let schema = TenantSchema::new("Acme_Corp").unwrap();
        assert_eq!(schema.quoted(), "\"Acme_Corp\"");
        assert_eq!(TenantSchema::PUBLIC.quoted(), "\"public\"");
    }

    #[test]
    fn test_parse_and_display() {
        let schema: TenantSchema = "tenant_a".parse().unwrap();
        assert_eq!(schema.to_string(), "tenant_a");
        assert!("tenant a".parse::<TenantSchema>().is_err());
    }

    #[test]
    fn test_serde_validates() {
        let schema: TenantSchema = serde_json::from_str("\"tenant_a\"").unwrap();
        assert_eq!(schema.as_str(), "tenant_a");
        assert_eq!(serde_json::to_string(&schema).unwrap(), "\"tenant_a\"");

        let hostile = serde_json::from_str::<TenantSchema>("\"a; DROP TABLE users\"");
        assert!(hostile.is_err());
    }

    #[test]
    fn test_error_hints() {
        assert!(SchemaNameError::Empty.hint().contains("letter"));
        assert!(
            SchemaNameError::Reserved {
                name: "pg_x".into()
            }
            .hint()
            .contains("pg_")
        );
    }
}
