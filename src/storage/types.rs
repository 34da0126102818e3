//! Validated names used by the storage layer.

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Reasons a table name or row key is rejected.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum InvalidNameError {
    #[error("name is empty")]
    Empty,

    #[error("name is too long ({0} characters)")]
    TooLong(usize),

    #[error("name must start with a letter or underscore, found '{0}'")]
    InvalidStart(char),

    #[error("invalid character '{char}' at position {position}")]
    InvalidCharacter { char: char, position: usize },

    #[error("name is reserved: {0}")]
    Reserved(String),
}

fn validate_chars(name: &str) -> Result<(), InvalidNameError> {
    for (i, c) in name.chars().enumerate() {
        if !c.is_ascii_alphanumeric() && c != '_' && c != '-' {
            return Err(InvalidNameError::InvalidCharacter { char: c, position: i });
        }
    }
    Ok(())
}

/// A validated table name.
///
/// Valid names:
/// - 1-64 characters
/// - Alphanumeric, underscores, hyphens only
/// - Must start with a letter or underscore
/// - Cannot be a reserved name (`_schema`, `_meta`, `_system`)
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TableName(String);

impl TableName {
    const RESERVED: &'static [&'static str] = &["_schema", "_meta", "_system"];

    /// Create a new TableName, validating the input.
    pub fn new(name: impl Into<String>) -> Result<Self, InvalidNameError> {
        let name = name.into();
        Self::validate(&name)?;
        Ok(Self(name))
    }

    fn validate(name: &str) -> Result<(), InvalidNameError> {
        let Some(first) = name.chars().next() else {
            return Err(InvalidNameError::Empty);
        };
        if name.len() > 64 {
            return Err(InvalidNameError::TooLong(name.len()));
        }
        if !first.is_ascii_alphabetic() && first != '_' {
            return Err(InvalidNameError::InvalidStart(first));
        }
        validate_chars(name)?;
        if Self::RESERVED.contains(&name.to_lowercase().as_str()) {
            return Err(InvalidNameError::Reserved(name.to_string()));
        }
        Ok(())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TableName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl AsRef<str> for TableName {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// A validated row key (primary key).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RowKey(String);

impl RowKey {
    pub fn new(key: impl Into<String>) -> Result<Self, InvalidNameError> {
        let key = key.into();
        if key.is_empty() {
            return Err(InvalidNameError::Empty);
        }
        if key.len() > 128 {
            return Err(InvalidNameError::TooLong(key.len()));
        }
        validate_chars(&key)?;
        Ok(Self(key))
    }

    /// Generate a new ULID-based row key.
    pub fn generate() -> Self {
        Self(ulid::Ulid::new().to_string().to_lowercase())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RowKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl AsRef<str> for RowKey {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_table_name_validation() {
        assert!(TableName::new("users").is_ok());
        assert!(TableName::new("_audit-log").is_ok());
        assert_eq!(TableName::new(""), Err(InvalidNameError::Empty));
        assert_eq!(TableName::new("1users"), Err(InvalidNameError::InvalidStart('1')));
        assert_eq!(
            TableName::new("us ers"),
            Err(InvalidNameError::InvalidCharacter { char: ' ', position: 2 })
        );
        assert!(matches!(TableName::new("_META"), Err(InvalidNameError::Reserved(_))));
        assert!(matches!(TableName::new("a".repeat(65)), Err(InvalidNameError::TooLong(65))));
    }

    #[test]
    fn test_row_key_validation() {
        assert!(RowKey::new("123").is_ok());
        assert!(RowKey::new("a/b").is_err());
        let generated = RowKey::generate();
        assert_eq!(generated.as_str().len(), 26);
        assert!(RowKey::new(generated.as_str()).is_ok());
    }
}
