//! Native row values and their SQL-literal encoding.

use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use rust_decimal::Decimal;
use sqlx::mysql::MySqlRow;
use sqlx::{Row, TypeInfo, ValueRef};
use uuid::Uuid;

use crate::error::Result;

/// One native value read off the wire, typed for literal encoding.
///
/// MySQL has no wire-level UUID type (UUIDs arrive as `CHAR(36)` or
/// `BINARY(16)`), so [`decode_row`] never produces the `Uuid` variant; it
/// exists for callers that build rows directly.
#[derive(Debug, Clone, PartialEq)]
pub enum SqlValue {
    Null,
    Bool(bool),
    Int(i64),
    UInt(u64),
    Float(f64),
    Decimal(Decimal),
    DateTime(NaiveDateTime),
    Date(NaiveDate),
    Time(NaiveTime),
    Bytes(Vec<u8>),
    Uuid(Uuid),
    Json(serde_json::Value),
    Text(String),
}

impl SqlValue {
    /// Render this value as a SQL literal.
    ///
    /// Embedded single quotes in text are escaped by doubling; double quotes
    /// are left alone. Byte strings become lowercase hex `X'..'` literals.
    pub fn to_literal(&self) -> String {
        match self {
            SqlValue::Null => "NULL".to_string(),
            SqlValue::Bool(b) => if *b { "1" } else { "0" }.to_string(),
            SqlValue::Int(i) => i.to_string(),
            SqlValue::UInt(u) => u.to_string(),
            SqlValue::Float(f) => f.to_string(),
            SqlValue::Decimal(d) => d.to_string(),
            SqlValue::DateTime(dt) => format!("'{}'", dt.format("%Y-%m-%d %H:%M:%S")),
            SqlValue::Date(d) => format!("'{}'", d.format("%Y-%m-%d")),
            SqlValue::Time(t) => format!("'{}'", t.format("%H:%M:%S")),
            SqlValue::Bytes(b) => format!("X'{}'", hex::encode(b)),
            SqlValue::Uuid(u) => format!("'{u}'"),
            SqlValue::Json(j) => {
                let encoded = j.to_string().replace('\'', "''");
                format!("'{encoded}'")
            }
            SqlValue::Text(s) => {
                let escaped = s.replace('\'', "''");
                format!("'{escaped}'")
            }
        }
    }
}

/// Render a whole row as the comma-separated body of a `VALUES` tuple.
/// The enclosing parentheses are the caller's responsibility.
pub fn encode_row(values: &[SqlValue]) -> String {
    values
        .iter()
        .map(SqlValue::to_literal)
        .collect::<Vec<_>>()
        .join(", ")
}

/// Decode every column of a result row into the value model.
pub fn decode_row(row: &MySqlRow) -> Result<Vec<SqlValue>> {
    (0..row.len()).map(|i| decode_column(row, i)).collect()
}

fn decode_column(row: &MySqlRow, index: usize) -> Result<SqlValue> {
    let raw = row.try_get_raw(index)?;
    if raw.is_null() {
        return Ok(SqlValue::Null);
    }
    let type_name = raw.type_info().name().to_string();
    drop(raw);

    let value = match type_name.as_str() {
        "BOOLEAN" => SqlValue::Bool(row.try_get(index)?),
        "TINYINT" | "SMALLINT" | "MEDIUMINT" | "INT" | "BIGINT" => {
            SqlValue::Int(row.try_get(index)?)
        }
        "TINYINT UNSIGNED" | "SMALLINT UNSIGNED" | "MEDIUMINT UNSIGNED" | "INT UNSIGNED"
        | "BIGINT UNSIGNED" => SqlValue::UInt(row.try_get(index)?),
        "YEAR" => SqlValue::UInt(row.try_get::<u16, _>(index)? as u64),
        "FLOAT" => SqlValue::Float(row.try_get::<f32, _>(index)? as f64),
        "DOUBLE" => SqlValue::Float(row.try_get(index)?),
        "DECIMAL" => SqlValue::Decimal(row.try_get(index)?),
        "DATETIME" => SqlValue::DateTime(row.try_get(index)?),
        "TIMESTAMP" => {
            let ts: chrono::DateTime<chrono::Utc> = row.try_get(index)?;
            SqlValue::DateTime(ts.naive_utc())
        }
        "DATE" => SqlValue::Date(row.try_get(index)?),
        "TIME" => SqlValue::Time(row.try_get(index)?),
        "JSON" => SqlValue::Json(row.try_get(index)?),
        "BINARY" | "VARBINARY" | "TINYBLOB" | "BLOB" | "MEDIUMBLOB" | "LONGBLOB" | "BIT"
        | "GEOMETRY" => SqlValue::Bytes(row.try_get(index)?),
        _ => match row.try_get::<String, _>(index) {
            Ok(text) => SqlValue::Text(text),
            Err(_) => SqlValue::Bytes(row.try_get(index)?),
        },
    };
    Ok(value)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{NaiveDate, NaiveTime};

    #[test]
    fn null_bool_and_numbers() {
        assert_eq!(encode_row(&[SqlValue::Null]), "NULL");
        assert_eq!(
            encode_row(&[SqlValue::Bool(true), SqlValue::Bool(false)]),
            "1, 0"
        );
        assert_eq!(
            encode_row(&[
                SqlValue::Int(123),
                SqlValue::Float(456.789),
                SqlValue::Decimal("123.456".parse().unwrap()),
            ]),
            "123, 456.789, 123.456"
        );
    }

    #[test]
    fn temporal_values_use_second_precision() {
        let dt = NaiveDate::from_ymd_opt(2023, 10, 1)
            .unwrap()
            .and_hms_opt(12, 30, 45)
            .unwrap();
        assert_eq!(
            SqlValue::DateTime(dt).to_literal(),
            "'2023-10-01 12:30:45'"
        );
        assert_eq!(
            SqlValue::Date(dt.date()).to_literal(),
            "'2023-10-01'"
        );
        assert_eq!(
            SqlValue::Time(NaiveTime::from_hms_opt(12, 30, 0).unwrap()).to_literal(),
            "'12:30:00'"
        );
    }

    #[test]
    fn bytes_become_lowercase_hex() {
        assert_eq!(
            SqlValue::Bytes(vec![0x00, 0x01, 0xAB]).to_literal(),
            "X'0001ab'"
        );
    }

    #[test]
    fn text_single_quotes_are_doubled() {
        assert_eq!(
            SqlValue::Text("O'Reilly".into()).to_literal(),
            "'O''Reilly'"
        );
        assert_eq!(
            SqlValue::Text("Hello 'World'".into()).to_literal(),
            "'Hello ''World'''"
        );
        assert_eq!(
            SqlValue::Text(r#"String with "double quotes""#.into()).to_literal(),
            r#"'String with "double quotes"'"#
        );
    }

    #[test]
    fn json_values_are_encoded_and_escaped() {
        let json = serde_json::json!({ "key": "it's" });
        assert_eq!(
            SqlValue::Json(json).to_literal(),
            r#"'{"key":"it''s"}'"#
        );
    }

    #[test]
    fn mixed_row_matches_expected_literal_list() {
        let dt = NaiveDate::from_ymd_opt(2023, 10, 1)
            .unwrap()
            .and_hms_opt(12, 30, 45)
            .unwrap();
        let uuid: Uuid = "12345678-1234-5678-1234-567812345678".parse().unwrap();
        assert_eq!(
            encode_row(&[
                SqlValue::Null,
                SqlValue::Bool(true),
                SqlValue::Int(123),
                SqlValue::DateTime(dt),
                SqlValue::Uuid(uuid),
            ]),
            "NULL, 1, 123, '2023-10-01 12:30:45', '12345678-1234-5678-1234-567812345678'"
        );
    }
}
