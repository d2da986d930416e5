//! Database-agnostic type mappings.
//!
//! Result rows are decoded into `serde_json` values so every shaped output has the
//! same value type regardless of driver.
//!
//! # Architecture
//!
//! Type conversion uses a two-phase approach:
//! 1. `TypeCategory` classifies column types into logical categories
//! 2. Database-specific decoders handle the actual value extraction

use crate::db::DatabaseType;
use crate::models::Row as JsonRow;
use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use serde_json::Value as JsonValue;
use sqlx::mysql::{MySqlRow, MySqlTypeInfo, MySqlValueRef};
use sqlx::postgres::{PgRow, PgTypeInfo, PgValueRef};
use sqlx::sqlite::SqliteRow;
use sqlx::{Column, ColumnIndex, Decode, Row, Type, TypeInfo, ValueRef};

// =============================================================================
// Type Classification
// =============================================================================

/// Logical category for database column types.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TypeCategory {
    Integer,
    Float,
    Decimal,
    Boolean,
    Text,
    Binary,
    Json,
    Temporal,
    Unknown,
}

/// Classify a database type name into a logical category.
pub fn categorize_type(type_name: &str, db: DatabaseType) -> TypeCategory {
    let lower = type_name.to_lowercase();

    // Decimal/Numeric - check first as it overlaps with "numeric" in float checks
    if lower.contains("decimal") || lower.contains("numeric") {
        // SQLite's NUMERIC is actually a float
        if db == DatabaseType::SQLite && lower == "numeric" {
            return TypeCategory::Float;
        }
        return TypeCategory::Decimal;
    }

    // Date/time - before integers so INTERVAL and friends don't match "int"
    if lower.starts_with("date") || lower.starts_with("time") {
        return TypeCategory::Temporal;
    }
    if lower == "interval" {
        return TypeCategory::Unknown;
    }

    if lower.contains("int") || lower.contains("serial") || lower.contains("tiny") {
        return TypeCategory::Integer;
    }

    if lower == "bool" || lower == "boolean" {
        return TypeCategory::Boolean;
    }

    if lower.contains("float")
        || lower.contains("double")
        || lower == "real"
        || lower == "float4"
        || lower == "float8"
    {
        return TypeCategory::Float;
    }

    if lower == "json" || lower == "jsonb" {
        return TypeCategory::Json;
    }

    if lower.contains("blob") || lower.contains("binary") || lower == "bytea" {
        return TypeCategory::Binary;
    }

    if lower.contains("char") || lower.contains("text") || lower == "name" {
        return TypeCategory::Text;
    }

    TypeCategory::Unknown
}

// =============================================================================
// Decimal Type Support
// =============================================================================

/// Wrapper type for raw DECIMAL/NUMERIC values as strings.
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

impl Type<sqlx::Postgres> for RawDecimal {
    fn type_info() -> PgTypeInfo {
        <String as Type<sqlx::Postgres>>::type_info()
    }

    fn compatible(ty: &PgTypeInfo) -> bool {
        let name = ty.name().to_lowercase();
        name.contains("numeric") || name.contains("decimal")
    }
}

impl<'r> Decode<'r, sqlx::Postgres> for RawDecimal {
    fn decode(value: PgValueRef<'r>) -> Result<Self, sqlx::error::BoxDynError> {
        let s = <&str as Decode<sqlx::Postgres>>::decode(value)?;
        Ok(RawDecimal(s.to_string()))
    }
}

// =============================================================================
// Shared Decoders
// =============================================================================

/// Encode binary column data as base64 text.
pub fn encode_binary(bytes: &[u8]) -> JsonValue {
    use base64::{Engine as _, engine::general_purpose::STANDARD};
    JsonValue::String(STANDARD.encode(bytes))
}

fn float_value(v: f64) -> JsonValue {
    serde_json::Number::from_f64(v)
        .map(JsonValue::Number)
        .unwrap_or_else(|| JsonValue::String(v.to_string()))
}

/// Try the chrono types in turn; `None` when none of them accepts the column.
fn decode_temporal<R>(row: &R, idx: usize) -> Option<JsonValue>
where
    R: Row,
    usize: ColumnIndex<R>,
    for<'r> NaiveDateTime: Decode<'r, R::Database>,
    for<'r> DateTime<Utc>: Decode<'r, R::Database>,
    for<'r> NaiveDate: Decode<'r, R::Database>,
    for<'r> NaiveTime: Decode<'r, R::Database>,
    NaiveDateTime: Type<R::Database>,
    DateTime<Utc>: Type<R::Database>,
    NaiveDate: Type<R::Database>,
    NaiveTime: Type<R::Database>,
{
    fn text<T: ToString>(v: Option<T>) -> JsonValue {
        v.map_or(JsonValue::Null, |t| JsonValue::String(t.to_string()))
    }

    if let Ok(v) = row.try_get::<Option<NaiveDateTime>, _>(idx) {
        return Some(text(v));
    }
    if let Ok(v) = row.try_get::<Option<DateTime<Utc>>, _>(idx) {
        return Some(v.map_or(JsonValue::Null, |t| JsonValue::String(t.to_rfc3339())));
    }
    if let Ok(v) = row.try_get::<Option<NaiveDate>, _>(idx) {
        return Some(text(v));
    }
    if let Ok(v) = row.try_get::<Option<NaiveTime>, _>(idx) {
        return Some(text(v));
    }
    None
}

// =============================================================================
// Row to JSON Trait
// =============================================================================

/// Trait for converting database rows to JSON values.
pub trait RowToJson {
    /// Decode the value of column `idx`. SQL NULL becomes `JsonValue::Null`.
    fn value_at(&self, idx: usize) -> JsonValue;

    fn column_names(&self) -> Vec<String>;

    /// Column name to value, in select-list order.
    fn to_json_map(&self) -> JsonRow {
        self.column_names()
            .into_iter()
            .enumerate()
            .map(|(idx, name)| (name, self.value_at(idx)))
            .collect()
    }

    /// Value of the first column, `None` for a row without columns.
    fn first_value(&self) -> Option<JsonValue> {
        if self.column_names().is_empty() {
            None
        } else {
            Some(self.value_at(0))
        }
    }
}

macro_rules! impl_row_to_json {
    ($row:ty, $db:expr, $decoder:path) => {
        impl RowToJson for $row {
            fn value_at(&self, idx: usize) -> JsonValue {
                let Some(col) = self.columns().get(idx) else {
                    return JsonValue::Null;
                };
                let Ok(raw) = self.try_get_raw(idx) else {
                    return JsonValue::Null;
                };
                if raw.is_null() {
                    return JsonValue::Null;
                }
                // Expression columns have no declared type; use the value's own.
                let value_type = raw.type_info().into_owned();
                let type_info = if col.type_info().is_null() {
                    &value_type
                } else {
                    col.type_info()
                };
                let type_name = type_info.name();
                let category = categorize_type(type_name, $db);
                $decoder(self, idx, type_name, category)
            }

            fn column_names(&self) -> Vec<String> {
                self.columns()
                    .iter()
                    .map(|col| col.name().to_string())
                    .collect()
            }
        }
    };
}

impl_row_to_json!(MySqlRow, DatabaseType::MySql, mysql::decode_column);
impl_row_to_json!(PgRow, DatabaseType::Postgres, postgres::decode_column);
impl_row_to_json!(SqliteRow, DatabaseType::SQLite, sqlite::decode_column);

// =============================================================================
// Database-Specific Decoders
// =============================================================================

mod mysql {
    use super::*;

    pub fn decode_column(
        row: &MySqlRow,
        idx: usize,
        type_name: &str,
        category: TypeCategory,
    ) -> JsonValue {
        match category {
            TypeCategory::Decimal => decode_decimal(row, idx),
            TypeCategory::Integer => decode_integer(row, idx),
            TypeCategory::Boolean => decode_boolean(row, idx),
            TypeCategory::Float => decode_float(row, idx),
            TypeCategory::Binary => decode_binary(row, idx),
            TypeCategory::Json => decode_json(row, idx),
            TypeCategory::Temporal => {
                decode_temporal(row, idx).unwrap_or_else(|| decode_text(row, idx, type_name))
            }
            _ => decode_text(row, idx, type_name),
        }
    }

    fn decode_decimal(row: &MySqlRow, idx: usize) -> JsonValue {
        match row.try_get::<Option<RawDecimal>, _>(idx) {
            Ok(Some(v)) => JsonValue::String(v.0),
            Ok(None) => JsonValue::Null,
            Err(e) => {
                tracing::error!("Failed to decode DECIMAL: {:?}", e);
                JsonValue::Null
            }
        }
    }

    fn decode_integer(row: &MySqlRow, idx: usize) -> JsonValue {
        // MySQL reports signed and unsigned widths separately; the first
        // compatible Rust type wins.
        if let Ok(v) = row.try_get::<Option<i64>, _>(idx) {
            return v.map_or(JsonValue::Null, |v| JsonValue::Number(v.into()));
        }
        if let Ok(v) = row.try_get::<Option<i32>, _>(idx) {
            return v.map_or(JsonValue::Null, |v| JsonValue::Number(v.into()));
        }
        if let Ok(v) = row.try_get::<Option<i16>, _>(idx) {
            return v.map_or(JsonValue::Null, |v| JsonValue::Number(v.into()));
        }
        if let Ok(v) = row.try_get::<Option<i8>, _>(idx) {
            return v.map_or(JsonValue::Null, |v| JsonValue::Number(v.into()));
        }
        if let Ok(v) = row.try_get::<Option<u64>, _>(idx) {
            return v.map_or(JsonValue::Null, |v| JsonValue::Number(v.into()));
        }
        if let Ok(v) = row.try_get::<Option<u32>, _>(idx) {
            return v.map_or(JsonValue::Null, |v| JsonValue::Number(v.into()));
        }
        if let Ok(v) = row.try_get::<Option<u16>, _>(idx) {
            return v.map_or(JsonValue::Null, |v| JsonValue::Number(v.into()));
        }
        if let Ok(v) = row.try_get::<Option<u8>, _>(idx) {
            return v.map_or(JsonValue::Null, |v| JsonValue::Number(v.into()));
        }
        JsonValue::Null
    }

    fn decode_boolean(row: &MySqlRow, idx: usize) -> JsonValue {
        row.try_get::<Option<bool>, _>(idx)
            .ok()
            .flatten()
            .map(JsonValue::Bool)
            .unwrap_or(JsonValue::Null)
    }

    fn decode_float(row: &MySqlRow, idx: usize) -> JsonValue {
        if let Ok(Some(v)) = row.try_get::<Option<f64>, _>(idx) {
            return float_value(v);
        }
        if let Ok(Some(v)) = row.try_get::<Option<f32>, _>(idx) {
            return float_value(f64::from(v));
        }
        JsonValue::Null
    }

    fn decode_binary(row: &MySqlRow, idx: usize) -> JsonValue {
        row.try_get::<Option<Vec<u8>>, _>(idx)
            .ok()
            .flatten()
            .map(|v| encode_binary(&v))
            .unwrap_or(JsonValue::Null)
    }

    fn decode_json(row: &MySqlRow, idx: usize) -> JsonValue {
        row.try_get::<Option<JsonValue>, _>(idx)
            .ok()
            .flatten()
            .unwrap_or(JsonValue::Null)
    }

    fn decode_text(row: &MySqlRow, idx: usize, type_name: &str) -> JsonValue {
        match row.try_get::<Option<String>, _>(idx) {
            Ok(Some(v)) => JsonValue::String(v),
            Ok(None) => JsonValue::Null,
            Err(e) => {
                tracing::debug!(column = idx, type_name, error = %e, "Undecodable column");
                JsonValue::Null
            }
        }
    }
}

mod postgres {
    use super::*;

    pub fn decode_column(
        row: &PgRow,
        idx: usize,
        _type_name: &str,
        category: TypeCategory,
    ) -> JsonValue {
        match category {
            TypeCategory::Decimal => decode_decimal(row, idx),
            TypeCategory::Integer => decode_integer(row, idx),
            TypeCategory::Boolean => decode_boolean(row, idx),
            TypeCategory::Float => decode_float(row, idx),
            TypeCategory::Binary => decode_binary(row, idx),
            TypeCategory::Json => decode_json(row, idx),
            TypeCategory::Temporal => decode_temporal(row, idx).unwrap_or(JsonValue::Null),
            _ => decode_text(row, idx),
        }
    }

    fn decode_decimal(row: &PgRow, idx: usize) -> JsonValue {
        match row.try_get::<Option<RawDecimal>, _>(idx) {
            Ok(Some(v)) => JsonValue::String(v.0),
            Ok(None) => JsonValue::Null,
            Err(e) => {
                tracing::error!("Failed to decode NUMERIC: {:?}", e);
                JsonValue::Null
            }
        }
    }

    fn decode_integer(row: &PgRow, idx: usize) -> JsonValue {
        if let Ok(v) = row.try_get::<Option<i64>, _>(idx) {
            return v.map_or(JsonValue::Null, |v| JsonValue::Number(v.into()));
        }
        if let Ok(v) = row.try_get::<Option<i32>, _>(idx) {
            return v.map_or(JsonValue::Null, |v| JsonValue::Number(v.into()));
        }
        if let Ok(v) = row.try_get::<Option<i16>, _>(idx) {
            return v.map_or(JsonValue::Null, |v| JsonValue::Number(v.into()));
        }
        JsonValue::Null
    }

    fn decode_boolean(row: &PgRow, idx: usize) -> JsonValue {
        row.try_get::<Option<bool>, _>(idx)
            .ok()
            .flatten()
            .map(JsonValue::Bool)
            .unwrap_or(JsonValue::Null)
    }

    fn decode_float(row: &PgRow, idx: usize) -> JsonValue {
        if let Ok(Some(v)) = row.try_get::<Option<f64>, _>(idx) {
            return float_value(v);
        }
        if let Ok(Some(v)) = row.try_get::<Option<f32>, _>(idx) {
            return float_value(f64::from(v));
        }
        JsonValue::Null
    }

    fn decode_binary(row: &PgRow, idx: usize) -> JsonValue {
        row.try_get::<Option<Vec<u8>>, _>(idx)
            .ok()
            .flatten()
            .map(|v| encode_binary(&v))
            .unwrap_or(JsonValue::Null)
    }

    fn decode_json(row: &PgRow, idx: usize) -> JsonValue {
        row.try_get::<Option<JsonValue>, _>(idx)
            .ok()
            .flatten()
            .unwrap_or(JsonValue::Null)
    }

    fn decode_text(row: &PgRow, idx: usize) -> JsonValue {
        // uuid, enums, inet and the like come back through their text form
        if let Ok(v) = row.try_get::<Option<String>, _>(idx) {
            return v.map_or(JsonValue::Null, JsonValue::String);
        }
        row.try_get_unchecked::<Option<String>, _>(idx)
            .ok()
            .flatten()
            .map(JsonValue::String)
            .unwrap_or(JsonValue::Null)
    }
}

mod sqlite {
    use super::*;

    pub fn decode_column(
        row: &SqliteRow,
        idx: usize,
        type_name: &str,
        category: TypeCategory,
    ) -> JsonValue {
        match category {
            TypeCategory::Integer => decode_integer(row, idx),
            TypeCategory::Boolean => decode_boolean(row, idx),
            TypeCategory::Float | TypeCategory::Decimal => decode_float(row, idx),
            TypeCategory::Binary => decode_binary(row, idx),
            TypeCategory::Temporal => {
                decode_temporal(row, idx).unwrap_or_else(|| decode_text(row, idx, type_name))
            }
            _ => decode_text(row, idx, type_name),
        }
    }

    fn decode_integer(row: &SqliteRow, idx: usize) -> JsonValue {
        match row.try_get::<Option<i64>, _>(idx) {
            Ok(v) => v.map_or(JsonValue::Null, |v| JsonValue::Number(v.into())),
            Err(_) => decode_text(row, idx, "INTEGER"),
        }
    }

    fn decode_boolean(row: &SqliteRow, idx: usize) -> JsonValue {
        row.try_get::<Option<bool>, _>(idx)
            .ok()
            .flatten()
            .map(JsonValue::Bool)
            .unwrap_or(JsonValue::Null)
    }

    fn decode_float(row: &SqliteRow, idx: usize) -> JsonValue {
        match row.try_get::<Option<f64>, _>(idx) {
            Ok(v) => v.map_or(JsonValue::Null, float_value),
            Err(_) => decode_text(row, idx, "REAL"),
        }
    }

    fn decode_binary(row: &SqliteRow, idx: usize) -> JsonValue {
        row.try_get::<Option<Vec<u8>>, _>(idx)
            .ok()
            .flatten()
            .map(|v| encode_binary(&v))
            .unwrap_or(JsonValue::Null)
    }

    fn decode_text(row: &SqliteRow, idx: usize, type_name: &str) -> JsonValue {
        // SQLite columns are dynamically typed; read whatever is stored as text.
        if let Ok(Some(v)) = row.try_get_unchecked::<Option<String>, _>(idx) {
            if type_name.to_lowercase().contains("json") {
                if let Ok(json) = serde_json::from_str::<JsonValue>(&v) {
                    return json;
                }
            }
            return JsonValue::String(v);
        }
        JsonValue::Null
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_categorize_type_integer() {
        assert_eq!(
            categorize_type("INT", DatabaseType::MySql),
            TypeCategory::Integer
        );
        assert_eq!(
            categorize_type("BIGINT", DatabaseType::Postgres),
            TypeCategory::Integer
        );
        assert_eq!(
            categorize_type("TINYINT UNSIGNED", DatabaseType::MySql),
            TypeCategory::Integer
        );
        assert_eq!(
            categorize_type("INTEGER", DatabaseType::SQLite),
            TypeCategory::Integer
        );
    }

    #[test]
    fn test_categorize_type_decimal() {
        assert_eq!(
            categorize_type("DECIMAL", DatabaseType::MySql),
            TypeCategory::Decimal
        );
        assert_eq!(
            categorize_type("NUMERIC", DatabaseType::Postgres),
            TypeCategory::Decimal
        );
        // SQLite NUMERIC is a float
        assert_eq!(
            categorize_type("numeric", DatabaseType::SQLite),
            TypeCategory::Float
        );
    }

    #[test]
    fn test_categorize_type_temporal() {
        assert_eq!(
            categorize_type("DATETIME", DatabaseType::MySql),
            TypeCategory::Temporal
        );
        assert_eq!(
            categorize_type("TIMESTAMPTZ", DatabaseType::Postgres),
            TypeCategory::Temporal
        );
        assert_eq!(
            categorize_type("DATE", DatabaseType::SQLite),
            TypeCategory::Temporal
        );
        assert_eq!(
            categorize_type("INTERVAL", DatabaseType::Postgres),
            TypeCategory::Unknown
        );
    }

    #[test]
    fn test_categorize_type_other() {
        assert_eq!(
            categorize_type("jsonb", DatabaseType::Postgres),
            TypeCategory::Json
        );
        assert_eq!(
            categorize_type("BYTEA", DatabaseType::Postgres),
            TypeCategory::Binary
        );
        assert_eq!(
            categorize_type("VARCHAR", DatabaseType::MySql),
            TypeCategory::Text
        );
        assert_eq!(
            categorize_type("UUID", DatabaseType::Postgres),
            TypeCategory::Unknown
        );
    }

    #[test]
    fn test_encode_binary() {
        assert_eq!(
            encode_binary(b"hello world"),
            JsonValue::String("aGVsbG8gd29ybGQ=".to_string())
        );
        assert_eq!(
            encode_binary(&[0xFF, 0xFE, 0x00, 0x01]),
            JsonValue::String("//4AAQ==".to_string())
        );
        assert_eq!(encode_binary(&[]), JsonValue::String(String::new()));
    }

    #[test]
    fn test_float_value_non_finite() {
        assert_eq!(float_value(1.5), serde_json::json!(1.5));
        assert_eq!(float_value(f64::NAN), JsonValue::String("NaN".to_string()));
    }
}
