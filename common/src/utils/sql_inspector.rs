//! SQL text inspection.
//!
//! Pure functions over statement text: table-name extraction for fallback
//! lookup, read/write classification, and the single-statement check.

use once_cell::sync::Lazy;
use regex::Regex;

use crate::errors::AppError;
use crate::models::StatementKind;

/// `FROM` / `INTO` / `UPDATE` followed by an optionally backtick-quoted,
/// optionally schema-qualified identifier. `DELETE FROM` is covered by `FROM`.
static TABLE_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\b(?:from|into|update)\s+`?([\w$]+)`?(?:\.`?([\w$]+)`?)?")
        .expect("table pattern is a valid regex")
});

const READ_KEYWORDS: [&str; 6] = ["SELECT", "SHOW", "DESCRIBE", "DESC", "EXPLAIN", "WITH"];

/// Inspects SQL statements without touching a database.
pub struct SqlInspector;

impl SqlInspector {
    /// Extracts the first table referenced after `FROM`, `INTO` or `UPDATE`.
    ///
    /// Leading comments are skipped. Returns `None` when no keyword is
    /// followed by an identifier.
    pub fn extract_table(sql: &str) -> Option<String> {
        let caps = TABLE_PATTERN.captures(strip_leading_comments(sql))?;
        caps.get(2)
            .or_else(|| caps.get(1))
            .map(|m| m.as_str().to_string())
    }

    /// Classifies a statement by its leading keyword, after any comments.
    pub fn statement_kind(sql: &str) -> StatementKind {
        let keyword: String = strip_leading_comments(sql)
            .trim_start_matches(|c: char| c == '(' || c.is_whitespace())
            .chars()
            .take_while(|c| c.is_ascii_alphabetic())
            .collect::<String>()
            .to_ascii_uppercase();

        if READ_KEYWORDS.contains(&keyword.as_str()) {
            StatementKind::Read
        } else {
            StatementKind::Write
        }
    }

    /// Rejects empty input and batched statements.
    ///
    /// A trailing `;` is accepted; a `;` followed by further text outside a
    /// quoted literal, a quoted identifier or a comment is not.
    ///
    /// # Errors
    /// Returns `AppError::Validation` for empty or multi-statement SQL.
    pub fn ensure_single_statement(sql: &str) -> Result<(), AppError> {
        if strip_leading_comments(sql).is_empty() {
            return Err(AppError::Validation("SQL statement is empty".into()));
        }

        let mut quote: Option<char> = None;
        let mut escaped = false;
        let mut skip_to = 0;
        for (idx, ch) in sql.char_indices() {
            if idx < skip_to {
                continue;
            }
            if let Some(q) = quote {
                if escaped {
                    escaped = false;
                } else if ch == '\\' && q != '`' {
                    escaped = true;
                } else if ch == q {
                    quote = None;
                }
                continue;
            }

            let tail = &sql[idx..];
            match ch {
                '\'' | '"' | '`' => quote = Some(ch),
                '#' => skip_to = line_end(sql, idx),
                '-' if is_dash_comment(tail) => skip_to = line_end(sql, idx),
                '/' if tail.starts_with("/*") => {
                    skip_to = tail[2..].find("*/").map_or(sql.len(), |end| idx + end + 4);
                }
                ';' => {
                    if !strip_trailing_terminators(&sql[idx + 1..]).is_empty() {
                        return Err(AppError::Validation(
                            "multiple statements are not allowed".into(),
                        ));
                    }
                    return Ok(());
                }
                _ => {}
            }
        }
        Ok(())
    }
}

/// Skips leading whitespace and `/* */`, `-- ` and `#` comments.
fn strip_leading_comments(mut sql: &str) -> &str {
    loop {
        sql = sql.trim_start();
        if let Some(rest) = sql.strip_prefix("/*") {
            sql = rest.find("*/").map_or("", |end| &rest[end + 2..]);
        } else if sql.starts_with('#') || is_dash_comment(sql) {
            sql = sql.find('\n').map_or("", |end| &sql[end + 1..]);
        } else {
            return sql;
        }
    }
}

/// Skips whitespace, comments and repeated `;` after a terminator.
fn strip_trailing_terminators(mut rest: &str) -> &str {
    loop {
        let stripped = strip_leading_comments(rest).trim_start_matches(';');
        if stripped.len() == rest.len() {
            return stripped;
        }
        rest = stripped;
    }
}

/// MySQL only treats `--` as a comment when whitespace or the end follows.
fn is_dash_comment(sql: &str) -> bool {
    sql.strip_prefix("--")
        .is_some_and(|rest| rest.is_empty() || rest.starts_with(char::is_whitespace))
}

fn line_end(sql: &str, idx: usize) -> usize {
    sql[idx..].find('\n').map_or(sql.len(), |end| idx + end + 1)
}
