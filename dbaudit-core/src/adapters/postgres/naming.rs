//! Table naming for PostgreSQL sources.
//!
//! Tables in the default schema are named by their bare table name, tables in
//! other schemas as `schema.table`. A part containing `.` or `"` is written
//! as a double-quoted identifier with embedded quotes doubled, the way
//! PostgreSQL itself quotes identifiers, so every name maps back to exactly
//! one `(schema, table)` pair.

use super::DEFAULT_SCHEMA;
use crate::error::{AuditError, Result};

fn needs_quoting(part: &str) -> bool {
    part.is_empty() || part.contains('.') || part.contains('"')
}

fn push_part(out: &mut String, part: &str) {
    if needs_quoting(part) {
        out.push('"');
        out.push_str(&part.replace('"', "\"\""));
        out.push('"');
    } else {
        out.push_str(part);
    }
}

/// Name under which a table is reported by `list_tables`.
pub(crate) fn qualify_table_name(schema: &str, table: &str) -> String {
    let mut name = String::with_capacity(schema.len() + table.len() + 3);
    if schema != DEFAULT_SCHEMA {
        push_part(&mut name, schema);
        name.push('.');
    }
    push_part(&mut name, table);
    name
}

/// Reads one part starting at `input`, returning it and the unread rest.
fn read_part(input: &str) -> Option<(String, &str)> {
    if let Some(quoted) = input.strip_prefix('"') {
        let mut part = String::new();
        let mut chars = quoted.char_indices().peekable();
        while let Some((index, c)) = chars.next() {
            if c == '"' {
                if matches!(chars.peek(), Some((_, '"'))) {
                    part.push('"');
                    chars.next();
                } else {
                    return Some((part, &quoted[index + 1..]));
                }
            } else {
                part.push(c);
            }
        }
        // unterminated quote
        None
    } else {
        let end = input.find('.').unwrap_or(input.len());
        let part = &input[..end];
        if part.is_empty() || part.contains('"') {
            return None;
        }
        Some((part.to_string(), &input[end..]))
    }
}

/// Splits a name produced by [`qualify_table_name`] back into schema and table.
///
/// # Errors
/// Returns a `Schema` error for a name no table could have been reported as.
pub(crate) fn parse_table_name(name: &str) -> Result<(String, String)> {
    let malformed = || AuditError::schema(name, "not a valid PostgreSQL table name");

    let (first, rest) = read_part(name).ok_or_else(malformed)?;
    if rest.is_empty() {
        return Ok((DEFAULT_SCHEMA.to_string(), first));
    }

    let rest = rest.strip_prefix('.').ok_or_else(malformed)?;
    let (second, rest) = read_part(rest).ok_or_else(malformed)?;
    if !rest.is_empty() {
        return Err(malformed());
    }
    Ok((first, second))
}
