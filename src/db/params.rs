//! Client-side parameter formatting for MySQL text protocol queries.
//!
//! `?` placeholders outside quoted literals and identifiers are replaced, in
//! order, by escaped literals of the given parameters.

use crate::error::{DriverError, ErrorCode};
use crate::models::QueryParam;
use std::fmt::Write;

/// Substitute `params` into the `?` placeholders of `sql`.
pub fn format_query(sql: &str, params: &[QueryParam]) -> Result<String, DriverError> {
    if params.is_empty() {
        return Ok(sql.to_string());
    }

    let mut out = String::with_capacity(sql.len() + params.len() * 8);
    let mut remaining = params.iter();
    let mut quote: Option<char> = None;
    let mut escaped = false;

    for ch in sql.chars() {
        match quote {
            Some(q) => {
                out.push(ch);
                if escaped {
                    escaped = false;
                } else if ch == '\\' && q != '`' {
                    escaped = true;
                } else if ch == q {
                    quote = None;
                }
            }
            None => match ch {
                '\'' | '"' | '`' => {
                    quote = Some(ch);
                    out.push(ch);
                }
                '?' => {
                    let param = remaining.next().ok_or_else(|| {
                        DriverError::new(
                            ErrorCode::Client,
                            format!("Not enough parameters: {} supplied", params.len()),
                        )
                    })?;
                    write_literal(&mut out, param)?;
                }
                _ => out.push(ch),
            },
        }
    }

    let unused = remaining.count();
    if unused > 0 {
        return Err(DriverError::new(
            ErrorCode::Client,
            format!(
                "Too many parameters: {} supplied, {} unused",
                params.len(),
                unused
            ),
        ));
    }

    Ok(out)
}

fn write_literal(out: &mut String, param: &QueryParam) -> Result<(), DriverError> {
    match param {
        QueryParam::Null => out.push_str("NULL"),
        QueryParam::Bool(v) => out.push_str(if *v { "true" } else { "false" }),
        QueryParam::Int(v) => {
            let _ = write!(out, "{}", v);
        }
        QueryParam::UInt(v) => {
            let _ = write!(out, "{}", v);
        }
        QueryParam::Float(v) => {
            if !v.is_finite() {
                return Err(DriverError::new(
                    ErrorCode::Client,
                    format!("Cannot format non-finite float {}", v),
                ));
            }
            let _ = write!(out, "{}", v);
        }
        QueryParam::String(v) => escape_string_into(out, v),
        QueryParam::Bytes(v) => {
            out.push_str("X'");
            for byte in v {
                let _ = write!(out, "{:02X}", byte);
            }
            out.push('\'');
        }
    }
    Ok(())
}

fn escape_string_into(out: &mut String, value: &str) {
    out.push('\'');
    for ch in value.chars() {
        match ch {
            '\0' => out.push_str("\\0"),
            '\x08' => out.push_str("\\b"),
            '\t' => out.push_str("\\t"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\x1a' => out.push_str("\\Z"),
            '\'' => out.push_str("\\'"),
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            other => out.push(other),
        }
    }
    out.push('\'');
}

/// Quote an identifier with backticks, doubling embedded backticks.
pub fn escape_identifier(name: &str) -> String {
    format!("`{}`", name.replace('`', "``"))
}

/// Quote a possibly qualified identifier (`db.table`) part by part.
pub fn escape_qualified_identifier(name: &str) -> String {
    name.split('.')
        .map(escape_identifier)
        .collect::<Vec<_>>()
        .join(".")
}
