//! SQL safety utilities.
//!
//! Caller-supplied values never reach query text: the predicate compiler binds
//! them as parameters. The only text that is spliced into SQL are identifiers
//! and key names taken from the field catalog configuration, and those pass
//! through [`SqlSecurity`] when the catalog is built and again when rendered.

use crate::error::{EngineError, Result};
use once_cell::sync::Lazy;
use regex::Regex;

/// Maximum accepted identifier length.
const MAX_IDENTIFIER_LENGTH: usize = 128;

static IDENTIFIER_REGEX: Lazy<Regex> = Lazy::new(|| {
    // Must start with letter or underscore; dots separate qualified parts.
    #[allow(clippy::expect_used)]
    Regex::new(r"^[a-zA-Z_][a-zA-Z0-9_]*(\.[a-zA-Z_][a-zA-Z0-9_]*)*$")
        .expect("Hard-coded regex pattern should be valid")
});

/// SQL identifier validation and escaping utilities.
pub struct SqlSecurity;

impl SqlSecurity {
    /// Validates and escapes a SQL identifier (table name, column name).
    ///
    /// Qualified names are quoted part by part, so `public.listings` becomes
    /// `"public"."listings"`.
    ///
    /// # Examples
    /// ```rust
    /// use houm_insight::security::SqlSecurity;
    ///
    /// assert_eq!(SqlSecurity::escape_identifier("price").unwrap(), "\"price\"");
    /// assert!(SqlSecurity::escape_identifier("price; DROP TABLE listings--").is_err());
    /// ```
    pub fn escape_identifier(identifier: &str) -> Result<String> {
        Self::validate_identifier(identifier)?;

        let quoted: Vec<String> = identifier
            .split('.')
            .map(|part| format!("\"{part}\""))
            .collect();
        Ok(quoted.join("."))
    }

    /// Validates a SQL identifier without escaping it.
    pub fn validate_identifier(identifier: &str) -> Result<()> {
        if identifier.trim().is_empty() {
            return Err(EngineError::SecurityError(
                "SQL identifier cannot be empty or whitespace-only".to_string(),
            ));
        }

        if identifier.len() > MAX_IDENTIFIER_LENGTH {
            return Err(EngineError::SecurityError(format!(
                "SQL identifier too long (max {MAX_IDENTIFIER_LENGTH} characters)"
            )));
        }

        if !IDENTIFIER_REGEX.is_match(identifier) {
            return Err(EngineError::SecurityError(format!(
                "Invalid SQL identifier format: '{identifier}'. Identifiers must start with a letter or underscore and contain only letters, numbers, underscores, and dots"
            )));
        }

        Ok(())
    }

    /// Validates a column name, which unlike a table name may not be qualified.
    pub fn validate_column(column: &str) -> Result<()> {
        Self::validate_identifier(column)?;
        if column.contains('.') {
            return Err(EngineError::SecurityError(format!(
                "Column name '{column}' must not be qualified"
            )));
        }
        Ok(())
    }

    /// Quotes a configuration-owned key (e.g. a struct field name) as a SQL
    /// string literal.
    ///
    /// The key must itself be a valid identifier; this is not a general
    /// purpose escaping routine for caller input.
    pub fn quote_key_literal(key: &str) -> Result<String> {
        Self::validate_column(key)?;
        Ok(format!("'{key}'"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_sql_identifiers() {
        assert!(SqlSecurity::validate_identifier("hemnet_id").is_ok());
        assert!(SqlSecurity::validate_identifier("listings2").is_ok());
        assert!(SqlSecurity::validate_identifier("_private_col").is_ok());
        assert!(SqlSecurity::validate_identifier("public.listings").is_ok());
    }

    #[test]
    fn test_invalid_sql_identifiers() {
        assert!(SqlSecurity::validate_identifier("").is_err());
        assert!(SqlSecurity::validate_identifier("   ").is_err());
        assert!(SqlSecurity::validate_identifier(&"a".repeat(200)).is_err());
        assert!(SqlSecurity::validate_identifier("id; DROP TABLE").is_err());
        assert!(SqlSecurity::validate_identifier("col--comment").is_err());
        assert!(SqlSecurity::validate_identifier("col name").is_err());
        assert!(SqlSecurity::validate_identifier("col-name").is_err());
        assert!(SqlSecurity::validate_identifier("123col").is_err());
        assert!(SqlSecurity::validate_identifier("col\"quoted").is_err());
    }

    #[test]
    fn test_escaping() {
        assert_eq!(
            SqlSecurity::escape_identifier("municipality_name").unwrap(),
            "\"municipality_name\""
        );
        assert_eq!(
            SqlSecurity::escape_identifier("public.listings").unwrap(),
            "\"public\".\"listings\""
        );
    }

    #[test]
    fn test_columns_and_key_literals() {
        assert!(SqlSecurity::validate_column("labels").is_ok());
        assert!(SqlSecurity::validate_column("public.labels").is_err());
        assert_eq!(SqlSecurity::quote_key_literal("title").unwrap(), "'title'");
        assert!(SqlSecurity::quote_key_literal("ti'tle").is_err());
    }
}
