//! SQL text validation for the `read_data` tool.
//!
//! This is a layered textual defense, not a parser. A query passes only if it
//! survives every stage, checked in this order (first failure wins):
//!
//! 1. non-empty input
//! 2. non-empty after stripping `--` and `/* */` comments and collapsing whitespace
//! 3. starts with `SELECT`
//! 4. no denylisted keyword as a whole word in the stripped, upper-cased text
//! 5. no denylisted pattern in the **original** text
//! 6. a single statement
//! 7. no `CHAR(`, `NCHAR(` or `ASCII(` (case-sensitive, original text)
//! 8. at most [`MAX_QUERY_LENGTH`] characters
//!
//! Stage 4 sees the stripped text while stage 5 sees the original, so a
//! mutation hidden in a comment slips past the keyword scan but is caught by
//! the comment patterns.

use crate::error::DbError;
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value as JsonValue;
use thiserror::Error;

/// Maximum query length in characters.
pub const MAX_QUERY_LENGTH: usize = 10_000;

/// Keywords that may not appear as whole words, checked in this order.
pub const DANGEROUS_KEYWORDS: &[&str] = &[
    "DELETE",
    "DROP",
    "UPDATE",
    "INSERT",
    "ALTER",
    "CREATE",
    "TRUNCATE",
    "EXEC",
    "EXECUTE",
    "MERGE",
    "REPLACE",
    "GRANT",
    "REVOKE",
    "COMMIT",
    "ROLLBACK",
    "TRANSACTION",
    "BEGIN",
    "DECLARE",
    "SET",
    "USE",
    "BACKUP",
    "RESTORE",
    "KILL",
    "SHUTDOWN",
    "WAITFOR",
    "OPENROWSET",
    "OPENDATASOURCE",
    "OPENQUERY",
    "OPENXML",
    "BULK",
    "INTO",
];

/// Reason a query was rejected. `Display` is the message shown to the client.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum QueryRejection {
    #[error("Query must be a non-empty string")]
    Empty,

    #[error("Query cannot be empty after removing comments")]
    EmptyAfterComments,

    #[error("Query must start with SELECT for security reasons")]
    NotSelect,

    #[error("Dangerous keyword '{0}' detected in query. Only SELECT operations are allowed.")]
    DangerousKeyword(&'static str),

    #[error("Potentially malicious SQL pattern detected. Only simple SELECT queries are allowed.")]
    MaliciousPattern { rule: &'static str },

    #[error("Multiple SQL statements are not allowed. Use only a single SELECT statement.")]
    MultipleStatements,

    #[error(
        "Character conversion functions are not allowed as they may be used for obfuscation."
    )]
    CharacterConversion,

    #[error("Query is too long. Maximum allowed length is 10,000 characters.")]
    TooLong,
}

impl From<QueryRejection> for DbError {
    fn from(rejection: QueryRejection) -> Self {
        DbError::validation_rejected(rejection.to_string())
    }
}

/// A named pattern rule applied to the original query text.
pub struct PatternRule {
    pub name: &'static str,
    pub regex: Regex,
}

fn rule(name: &'static str, pattern: &str) -> PatternRule {
    PatternRule {
        name,
        regex: Regex::new(pattern)
            .unwrap_or_else(|e| panic!("Invalid regex for rule '{}': {}", name, e)),
    }
}

const MUTATING: &str = "DELETE|DROP|UPDATE|INSERT|ALTER|CREATE|TRUNCATE|EXEC|EXECUTE";

/// Pattern denylist, checked in order. All rules share one rejection message.
pub static PATTERN_RULES: Lazy<Vec<PatternRule>> = Lazy::new(|| {
    vec![
        rule("select_into", r"(?i)SELECT\s+.*?\s+INTO\s+"),
        rule(
            "stacked_mutation",
            r"(?i);\s*(?:DELETE|DROP|UPDATE|INSERT|ALTER|CREATE|TRUNCATE|EXEC|EXECUTE|MERGE|REPLACE|GRANT|REVOKE)",
        ),
        rule(
            "union_mutation",
            &format!(r"(?i)UNION\s+(?:ALL\s+)?SELECT.*?(?:{MUTATING})"),
        ),
        rule("line_comment_mutation", &format!(r"(?i)--.*?(?:{MUTATING})")),
        rule(
            "block_comment_mutation",
            &format!(r"(?i)/\*.*?(?:{MUTATING}).*?\*/"),
        ),
        rule("exec_call", r"(?i)EXEC\s*\("),
        rule("execute_call", r"(?i)EXECUTE\s*\("),
        rule("system_procedure", r"(?i)sp_"),
        rule("extended_procedure", r"(?i)xp_"),
        rule("bulk_insert", r"(?i)BULK\s+INSERT"),
        rule("openrowset", r"(?i)OPENROWSET"),
        rule("opendatasource", r"(?i)OPENDATASOURCE"),
        rule("global_variable", r"@@"),
        rule("system_user", r"(?i)SYSTEM_USER"),
        rule("user_name", r"(?i)USER_NAME"),
        rule("db_name", r"(?i)DB_NAME"),
        rule("host_name", r"(?i)HOST_NAME"),
        rule("waitfor_delay", r"(?i)WAITFOR\s+DELAY"),
        rule("waitfor_time", r"(?i)WAITFOR\s+TIME"),
        rule("statement_after_semicolon", r";\s*[A-Za-z0-9_]"),
        rule("char_concat", r"(?i)\+\s*CHAR\s*\("),
        rule("nchar_concat", r"(?i)\+\s*NCHAR\s*\("),
        rule("ascii_concat", r"(?i)\+\s*ASCII\s*\("),
    ]
});

static LINE_COMMENT_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"--[^\r\n]*").expect("Invalid regex: line comment pattern")
});

static BLOCK_COMMENT_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?s)/\*.*?\*/").expect("Invalid regex: block comment pattern")
});

static WHITESPACE_REGEX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\s+").expect("Invalid regex: whitespace pattern"));

/// Whole-word matchers for [`DANGEROUS_KEYWORDS`], in the same order.
static KEYWORD_REGEXES: Lazy<Vec<(&'static str, Regex)>> = Lazy::new(|| {
    DANGEROUS_KEYWORDS
        .iter()
        .map(|kw| {
            let pattern = format!(r"(?:^|[^A-Za-z0-9_]){kw}(?:$|[^A-Za-z0-9_])");
            let regex = Regex::new(&pattern)
                .unwrap_or_else(|e| panic!("Invalid regex for keyword '{}': {}", kw, e));
            (*kw, regex)
        })
        .collect()
});

/// Remove comments and collapse whitespace.
pub fn strip_comments(query: &str) -> String {
    let without_line = LINE_COMMENT_REGEX.replace_all(query, "");
    let without_block = BLOCK_COMMENT_REGEX.replace_all(&without_line, "");
    WHITESPACE_REGEX
        .replace_all(&without_block, " ")
        .trim()
        .to_string()
}

/// Validate a query for read-only execution.
///
/// Pure and stateless: the same text always yields the same verdict.
pub fn validate_read_query(query: &str) -> Result<(), QueryRejection> {
    if query.is_empty() {
        return Err(QueryRejection::Empty);
    }

    let clean = strip_comments(query);
    if clean.is_empty() {
        return Err(QueryRejection::EmptyAfterComments);
    }

    let upper = clean.to_uppercase();
    if !upper.starts_with("SELECT") {
        return Err(QueryRejection::NotSelect);
    }

    if let Some((kw, _)) = KEYWORD_REGEXES.iter().find(|(_, re)| re.is_match(&upper)) {
        return Err(QueryRejection::DangerousKeyword(kw));
    }

    if let Some(rule) = PATTERN_RULES.iter().find(|r| r.regex.is_match(query)) {
        return Err(QueryRejection::MaliciousPattern { rule: rule.name });
    }

    let statements = clean.split(';').filter(|s| !s.trim().is_empty()).count();
    if statements > 1 {
        return Err(QueryRejection::MultipleStatements);
    }

    if query.contains("CHAR(") || query.contains("NCHAR(") || query.contains("ASCII(") {
        return Err(QueryRejection::CharacterConversion);
    }

    if query.chars().count() > MAX_QUERY_LENGTH {
        return Err(QueryRejection::TooLong);
    }

    Ok(())
}

/// Validate an untyped JSON value; anything but a non-empty string is rejected.
pub fn validate_read_query_value(value: &JsonValue) -> Result<(), QueryRejection> {
    match value {
        JsonValue::String(query) => validate_read_query(query),
        _ => Err(QueryRejection::Empty),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_pattern_table_compiles() {
        assert_eq!(PATTERN_RULES.len(), 23);
        assert_eq!(KEYWORD_REGEXES.len(), DANGEROUS_KEYWORDS.len());
    }

    #[test]
    fn test_strip_comments() {
        assert_eq!(
            strip_comments("SELECT *  -- trailing\nFROM /* inline */ users"),
            "SELECT * FROM users"
        );
        assert_eq!(strip_comments("/* multi\nline */ SELECT 1"), "SELECT 1");
        assert_eq!(strip_comments("  \t\n "), "");
    }

    #[test]
    fn test_simple_select_is_valid() {
        assert!(validate_read_query("SELECT * FROM movies").is_ok());
        assert!(validate_read_query("select id, name from dbo.users where id = 1").is_ok());
    }

    #[test]
    fn test_keyword_requires_word_boundary() {
        // "updated_at" and "users" contain UPDATE / USE as substrings only
        assert!(validate_read_query("SELECT updated_at FROM users").is_ok());
        assert!(validate_read_query("SELECT offset FROM settings").is_ok());
    }

    #[test]
    fn test_first_keyword_in_list_order_wins() {
        let err = validate_read_query("SELECT * FROM t WHERE x = 'INSERT' OR y = 'DELETE'")
            .unwrap_err();
        assert_eq!(err, QueryRejection::DangerousKeyword("DELETE"));
    }

    #[test]
    fn test_value_entry_point_rejects_non_strings() {
        for value in [json!(null), json!(42), json!(["SELECT 1"]), json!({})] {
            assert_eq!(
                validate_read_query_value(&value),
                Err(QueryRejection::Empty)
            );
        }
        assert!(validate_read_query_value(&json!("SELECT 1")).is_ok());
    }

    #[test]
    fn test_rejection_converts_to_db_error() {
        let err: DbError = QueryRejection::NotSelect.into();
        assert_eq!(
            err.to_string(),
            "Security validation failed: Query must start with SELECT for security reasons"
        );
    }

    #[test]
    fn test_pattern_rule_name_is_reported() {
        assert_eq!(
            validate_read_query("SELECT @@VERSION"),
            Err(QueryRejection::MaliciousPattern {
                rule: "global_variable"
            })
        );
    }
}
