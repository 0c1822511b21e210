//! MySQL row to JSON mapping.
//!
//! Type conversion uses a two-phase approach:
//! 1. `TypeCategory` classifies the column type name into a logical category
//! 2. A per-category decoder extracts the value
//!
//! Values that cannot be decoded become `null` and are logged.

use crate::models::Row;
use base64::{Engine as _, engine::general_purpose::STANDARD};
use serde_json::Value as JsonValue;
use sqlx::mysql::{MySqlRow, MySqlTypeInfo, MySqlValueRef};
use sqlx::{Column, Decode, Row as _, Type, TypeInfo};

/// Logical category for MySQL column types.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TypeCategory {
    Integer,
    Float,
    Decimal,
    Boolean,
    Text,
    Binary,
    Json,
    DateTime,
    Date,
    Time,
}

/// Classify a MySQL type name into a logical category.
pub fn categorize_type(type_name: &str) -> TypeCategory {
    let lower = type_name.to_lowercase();

    if lower.contains("decimal") || lower.contains("numeric") {
        return TypeCategory::Decimal;
    }
    if lower == "boolean" || lower == "bool" {
        return TypeCategory::Boolean;
    }
    if lower.contains("int") {
        return TypeCategory::Integer;
    }
    if lower.contains("float") || lower.contains("double") || lower == "real" {
        return TypeCategory::Float;
    }
    if lower == "json" {
        return TypeCategory::Json;
    }
    if lower == "datetime" || lower == "timestamp" {
        return TypeCategory::DateTime;
    }
    if lower == "date" {
        return TypeCategory::Date;
    }
    if lower == "time" {
        return TypeCategory::Time;
    }
    if lower.contains("blob") || lower.contains("binary") || lower == "bit" {
        return TypeCategory::Binary;
    }
    TypeCategory::Text
}

/// Wrapper type for raw DECIMAL values as strings.
/// This preserves the exact database representation.
#[derive(Debug)]
pub struct RawDecimal(pub String);

impl Type<sqlx::MySql> for RawDecimal {
    fn type_info() -> MySqlTypeInfo {
        <String as Type<sqlx::MySql>>::type_info()
    }

    fn compatible(ty: &MySqlTypeInfo) -> bool {
        let name = ty.name().to_lowercase();
        name.contains("decimal") || name.contains("numeric")
    }
}

impl<'r> Decode<'r, sqlx::MySql> for RawDecimal {
    fn decode(value: MySqlValueRef<'r>) -> Result<Self, sqlx::error::BoxDynError> {
        let s = <&str as Decode<sqlx::MySql>>::decode(value)?;
        Ok(RawDecimal(s.to_string()))
    }
}

/// Convert a row into a JSON map keyed by column name.
pub fn row_to_json(row: &MySqlRow) -> Row {
    row.columns()
        .iter()
        .enumerate()
        .map(|(idx, col)| {
            let category = categorize_type(col.type_info().name());
            (col.name().to_string(), decode_column(row, idx, category))
        })
        .collect()
}

fn decode_column(row: &MySqlRow, idx: usize, category: TypeCategory) -> JsonValue {
    match category {
        TypeCategory::Integer => decode_integer(row, idx),
        TypeCategory::Float => decode_float(row, idx),
        TypeCategory::Decimal => decode_as::<RawDecimal>(row, idx, |v| JsonValue::String(v.0)),
        TypeCategory::Boolean => decode_as::<bool>(row, idx, JsonValue::Bool),
        TypeCategory::Json => decode_as::<JsonValue>(row, idx, |v| v),
        TypeCategory::Binary => {
            decode_as::<Vec<u8>>(row, idx, |v| JsonValue::String(STANDARD.encode(v)))
        }
        TypeCategory::DateTime => decode_datetime(row, idx),
        TypeCategory::Date => decode_as::<chrono::NaiveDate>(row, idx, |v| {
            JsonValue::String(v.to_string())
        }),
        TypeCategory::Time => decode_as::<chrono::NaiveTime>(row, idx, |v| {
            JsonValue::String(v.to_string())
        }),
        TypeCategory::Text => decode_text(row, idx),
    }
}

fn decode_as<'r, T>(row: &'r MySqlRow, idx: usize, map: impl FnOnce(T) -> JsonValue) -> JsonValue
where
    T: Decode<'r, sqlx::MySql> + Type<sqlx::MySql>,
{
    match row.try_get::<Option<T>, _>(idx) {
        Ok(Some(v)) => map(v),
        Ok(None) => JsonValue::Null,
        Err(e) => {
            tracing::warn!(column = idx, error = %e, "Failed to decode column");
            JsonValue::Null
        }
    }
}

fn decode_integer(row: &MySqlRow, idx: usize) -> JsonValue {
    if let Ok(v) = row.try_get::<Option<i64>, _>(idx) {
        return v.map_or(JsonValue::Null, |v| JsonValue::Number(v.into()));
    }
    // BIGINT UNSIGNED does not fit i64
    decode_as::<u64>(row, idx, |v| JsonValue::Number(v.into()))
}

fn decode_float(row: &MySqlRow, idx: usize) -> JsonValue {
    let to_json = |v: f64| {
        serde_json::Number::from_f64(v)
            .map(JsonValue::Number)
            .unwrap_or_else(|| JsonValue::String(v.to_string()))
    };
    if let Ok(v) = row.try_get::<Option<f64>, _>(idx) {
        return v.map_or(JsonValue::Null, to_json);
    }
    decode_as::<f32>(row, idx, |v| to_json(v as f64))
}

fn decode_datetime(row: &MySqlRow, idx: usize) -> JsonValue {
    if let Ok(v) = row.try_get::<Option<chrono::NaiveDateTime>, _>(idx) {
        return v.map_or(JsonValue::Null, |v| JsonValue::String(v.to_string()));
    }
    decode_as::<chrono::DateTime<chrono::Utc>>(row, idx, |v| JsonValue::String(v.to_rfc3339()))
}

fn decode_text(row: &MySqlRow, idx: usize) -> JsonValue {
    if let Ok(v) = row.try_get::<Option<String>, _>(idx) {
        return v.map_or(JsonValue::Null, JsonValue::String);
    }
    // VARBINARY-backed text such as SHOW output on some servers
    decode_as::<Vec<u8>>(row, idx, |v| {
        JsonValue::String(String::from_utf8_lossy(&v).into_owned())
    })
}
