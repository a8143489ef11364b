//! Decoding arbitrary result rows into records.

use crate::model::work::Record;
use serde_json::Value;
use sqlx::postgres::PgRow;
use sqlx::{Column, Row, TypeInfo, ValueRef};

/// Convert a row into a record keyed by column name.
///
/// Common Postgres types decode to their natural JSON form. `bytea` becomes
/// text (lossy UTF-8). Types without a mapping are read as text, and become
/// null if that fails; cast such columns in the query (`amount::text`).
pub fn row_to_record(row: &PgRow) -> Record {
    let mut record = Record::new();
    for (index, column) in row.columns().iter().enumerate() {
        let value = column_value(row, index, column.type_info().name());
        record.insert(column.name().to_string(), value);
    }
    record
}

fn column_value(row: &PgRow, index: usize, type_name: &str) -> Value {
    let is_null = row
        .try_get_raw(index)
        .map(|raw| raw.is_null())
        .unwrap_or(true);
    if is_null {
        return Value::Null;
    }

    let decoded = match type_name {
        "BOOL" => row.try_get::<bool, _>(index).map(Value::from),
        "INT2" => row.try_get::<i16, _>(index).map(Value::from),
        "INT4" => row.try_get::<i32, _>(index).map(Value::from),
        "INT8" => row.try_get::<i64, _>(index).map(Value::from),
        "FLOAT4" => row.try_get::<f32, _>(index).map(Value::from),
        "FLOAT8" => row.try_get::<f64, _>(index).map(Value::from),
        "JSON" | "JSONB" => row.try_get::<Value, _>(index),
        "UUID" => row
            .try_get::<uuid::Uuid, _>(index)
            .map(|u| Value::from(u.to_string())),
        "TIMESTAMPTZ" => row
            .try_get::<chrono::DateTime<chrono::Utc>, _>(index)
            .map(|t| Value::from(t.to_rfc3339())),
        "TIMESTAMP" => row
            .try_get::<chrono::NaiveDateTime, _>(index)
            .map(|t| Value::from(t.format("%Y-%m-%dT%H:%M:%S%.f").to_string())),
        "DATE" => row
            .try_get::<chrono::NaiveDate, _>(index)
            .map(|d| Value::from(d.to_string())),
        "BYTEA" => row
            .try_get::<Vec<u8>, _>(index)
            .map(|b| Value::from(String::from_utf8_lossy(&b).into_owned())),
        _ => row.try_get::<String, _>(index).map(Value::from),
    };

    decoded.unwrap_or_else(|e| {
        tracing::debug!(column = index, type_name, error = %e, "column not decodable, using null");
        Value::Null
    })
}
