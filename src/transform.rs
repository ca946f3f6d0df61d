//! Value shaping between MySQL results and SeaTable cells.
//!
//! Raw column values are tagged with a semantic kind when they are read off
//! the wire (see [`crate::mysql`]); this module dispatches on the tag alone.

use crate::error::{Error, Result};
use bigdecimal::{BigDecimal, RoundingMode};
use chrono::{NaiveDate, NaiveDateTime};
use serde_json::Value as JsonValue;

/// A record ready for the destination store: destination field name mapped to
/// a transformed scalar, in field-mapping order.
pub type Record = serde_json::Map<String, JsonValue>;

/// One result row as returned by the query executor, in query column order.
pub type RawRow = Vec<(String, SourceValue)>;

/// A raw scalar read from the source database, tagged with its semantic kind.
#[derive(Debug, Clone, PartialEq)]
pub enum SourceValue {
    /// SQL NULL
    Null,
    /// Boolean (MySQL `TINYINT(1)`)
    Bool(bool),
    /// Signed integer family
    Int(i64),
    /// Unsigned integer family
    UInt(u64),
    /// FLOAT / DOUBLE
    Float(f64),
    /// DECIMAL / NEWDECIMAL, kept exact
    Decimal(BigDecimal),
    /// DATE
    Date(NaiveDate),
    /// DATETIME / TIMESTAMP
    DateTime(NaiveDateTime),
    /// Textual and unrecognized types
    Text(String),
}

/// Convert one tagged source value into its destination representation.
///
/// Amounts become grouped two-decimal strings, dates and datetimes become
/// `YYYY-MM-DD`, everything else passes through unchanged.
pub fn transform(value: SourceValue) -> JsonValue {
    match value {
        SourceValue::Null => JsonValue::Null,
        SourceValue::Bool(b) => JsonValue::Bool(b),
        SourceValue::Int(n) => JsonValue::Number(n.into()),
        SourceValue::UInt(n) => JsonValue::Number(n.into()),
        SourceValue::Float(f) => serde_json::Number::from_f64(f)
            .map(JsonValue::Number)
            .unwrap_or(JsonValue::Null),
        SourceValue::Decimal(d) => JsonValue::String(format_amount(&d)),
        SourceValue::Date(d) => JsonValue::String(d.format("%Y-%m-%d").to_string()),
        SourceValue::DateTime(dt) => JsonValue::String(dt.format("%Y-%m-%d").to_string()),
        SourceValue::Text(s) => JsonValue::String(s),
    }
}

/// Project one raw row through a field mapping, transforming each value.
///
/// The output record carries the destination field names in mapping order.
/// A source column named by the mapping but absent from the row is a
/// configuration/query mismatch, not a data error.
pub fn project(row: &RawRow, field_mappings: &[(String, String)]) -> Result<Record> {
    let mut record = Record::new();
    for (source, dest) in field_mappings {
        let value = row
            .iter()
            .find(|(name, _)| name == source)
            .map(|(_, v)| v.clone())
            .ok_or_else(|| {
                Error::validation(format!("source column '{source}' missing from query result"))
            })?;
        record.insert(dest.clone(), transform(value));
    }
    Ok(record)
}

/// Format a decimal amount with thousands separators and exactly two
/// fraction digits, rounding half-even.
pub fn format_amount(value: &BigDecimal) -> String {
    let plain = value.with_scale_round(2, RoundingMode::HalfEven).to_string();
    let (sign, digits) = match plain.strip_prefix('-') {
        Some(rest) => ("-", rest),
        None => ("", plain.as_str()),
    };
    let (int_part, frac_part) = digits.split_once('.').unwrap_or((digits, "00"));

    let mut grouped = String::with_capacity(int_part.len() + int_part.len() / 3);
    for (i, ch) in int_part.chars().enumerate() {
        if i > 0 && (int_part.len() - i) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(ch);
    }

    format!("{sign}{grouped}.{frac_part}")
}
