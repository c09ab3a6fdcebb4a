//! Identifier checks for generated SQL.
//!
//! Table, column, index and schema names are spliced into statements, so they
//! are restricted to ASCII letters, digits and underscores and always emitted
//! bracket-quoted.

use crate::error::{DbError, DbResult};

/// Check a single identifier; returns it unchanged on success.
pub fn validate_identifier<'a>(kind: &str, name: &'a str) -> DbResult<&'a str> {
    if name.is_empty() {
        return Err(DbError::invalid_input(format!("{} cannot be empty", kind)));
    }
    if !name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
        return Err(DbError::invalid_input(format!(
            "Invalid {} '{}'. Only letters, digits and underscores are allowed.",
            kind.to_lowercase(),
            name
        )));
    }
    Ok(name)
}

/// Bracket-quote an identifier that already passed [`validate_identifier`].
pub fn quote(name: &str) -> String {
    format!("[{}]", name)
}

/// Validate and quote a possibly schema-qualified name (`table` or `schema.table`).
pub fn quote_qualified(kind: &str, name: &str) -> DbResult<String> {
    let parts: Vec<&str> = name.split('.').collect();
    match parts.as_slice() {
        [table] => Ok(quote(validate_identifier(kind, table)?)),
        [schema, table] => Ok(format!(
            "{}.{}",
            quote(validate_identifier("Schema name", schema)?),
            quote(validate_identifier(kind, table)?)
        )),
        _ => Err(DbError::invalid_input(format!(
            "Invalid {} '{}'. Use 'name' or 'schema.name'.",
            kind.to_lowercase(),
            name
        ))),
    }
}
