//! Identifier and placeholder checks.
//!
//! Identifiers are always emitted double-quoted, so keywords are fine as
//! column names. What is checked is the shape: plain ASCII words, at most
//! one qualifier, and nothing PostgreSQL would silently truncate.

use std::collections::BTreeSet;

use crate::{FinderError, Result};

/// PostgreSQL truncates longer names (NAMEDATALEN - 1).
const MAX_NAME_BYTES: usize = 63;

/// Catalog schemas; relations there are never finder sources.
const SYSTEM_SCHEMAS: &[&str] = &["information_schema", "pg_catalog", "pg_toast"];

/// Double-quotes every part of a dotted name.
pub fn quote_identifier(name: &str) -> String {
    name.split('.')
        .map(|part| format!("\"{}\"", part))
        .collect::<Vec<_>>()
        .join(".")
}

/// Checks a column reference: `column` or `alias.column`.
pub fn validate_identifier(name: &str) -> Result<()> {
    name_parts(name, "column").map(|_| ())
}

/// Checks a table or view name: `name` or `schema.name`, outside the
/// system catalogs.
pub fn validate_relation(name: &str) -> Result<()> {
    let parts = name_parts(name, "relation")?;
    let head = parts[0].to_ascii_lowercase();
    if head.starts_with("pg_") || SYSTEM_SCHEMAS.contains(&head.as_str()) {
        return Err(FinderError::invalid(format!(
            "Relation '{}' belongs to the system catalog",
            name
        )));
    }
    Ok(())
}

fn name_parts<'a>(name: &'a str, what: &str) -> Result<Vec<&'a str>> {
    let parts: Vec<&str> = name.split('.').collect();
    if parts.len() > 2 {
        return Err(FinderError::invalid(format!(
            "Invalid {} name '{}': at most one qualifier is allowed",
            what, name
        )));
    }
    for part in &parts {
        check_word(part, name, what)?;
    }
    Ok(parts)
}

fn check_word(part: &str, name: &str, what: &str) -> Result<()> {
    if part.is_empty() {
        return Err(FinderError::invalid(format!(
            "Invalid {} name '{}': empty part",
            what, name
        )));
    }
    if part.len() > MAX_NAME_BYTES {
        return Err(FinderError::invalid(format!(
            "Invalid {} name '{}': '{}' is longer than {} bytes",
            what, name, part, MAX_NAME_BYTES
        )));
    }

    let leading = part
        .chars()
        .next()
        .is_some_and(|c| c.is_ascii_alphabetic() || c == '_');
    let word = part.chars().all(|c| c.is_ascii_alphanumeric() || c == '_');
    if !leading || !word {
        return Err(FinderError::invalid(format!(
            "Invalid {} name '{}'",
            what, name
        )));
    }
    Ok(())
}

/// Collects the distinct `$n` placeholder numbers used in `sql`.
///
/// Markers inside single-quoted literals are ignored.
pub fn placeholder_indices(sql: &str) -> BTreeSet<usize> {
    let bytes = sql.as_bytes();
    let mut indices = BTreeSet::new();
    let mut in_literal = false;
    let mut pos = 0;

    while pos < bytes.len() {
        match bytes[pos] {
            b'\'' => in_literal = !in_literal,
            b'$' if !in_literal => {
                let digits = bytes[pos + 1..]
                    .iter()
                    .take_while(|b| b.is_ascii_digit())
                    .count();
                if let Ok(index) = sql[pos + 1..pos + 1 + digits].parse::<usize>() {
                    indices.insert(index);
                }
                pos += digits;
            }
            _ => {}
        }
        pos += 1;
    }

    indices
}

/// Checks that a hand-written statement uses exactly `$1..$n` for `n` parameters.
pub fn check_placeholders(sql: &str, param_count: usize) -> Result<()> {
    let indices = placeholder_indices(sql);
    let expected: BTreeSet<usize> = (1..=param_count).collect();
    if indices != expected {
        return Err(FinderError::invalid(format!(
            "Statement uses placeholders {:?} but {} parameter(s) were supplied",
            indices, param_count
        )));
    }
    Ok(())
}
