use std::fmt;

use bytes::Bytes;
use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime};
use serde_json::json;
use thiserror::Error;

/// Formats accepted when a string column is read as a date or a timestamp.
const DATE_TIME_FORMATS: &[&str] = &[
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%dT%H:%M:%S",
];
const DATE_FORMAT: &str = "%Y-%m-%d";
const TIME_FORMAT: &str = "%H:%M:%S";

/// Estimated in-memory size of a date column.
const DATE_BYTE_SIZE: usize = 8;
/// Estimated in-memory size of a timestamp column, which also carries nanoseconds.
const TIMESTAMP_BYTE_SIZE: usize = 12;

/// Logical type of a [`Column`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ColumnType {
    String,
    Long,
    Double,
    Bool,
    Date,
    Bytes,
    Timestamp,
    Null,
}

impl fmt::Display for ColumnType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ColumnType::String => "string",
            ColumnType::Long => "long",
            ColumnType::Double => "double",
            ColumnType::Bool => "bool",
            ColumnType::Date => "date",
            ColumnType::Bytes => "bytes",
            ColumnType::Timestamp => "timestamp",
            ColumnType::Null => "null",
        };

        f.write_str(name)
    }
}

/// Which part of a date time value a date column carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DateKind {
    Date,
    Time,
    DateTime,
}

#[derive(Debug, Clone, Error, PartialEq)]
pub enum TypeConversionError {
    #[error("a {from} column cannot be read as {to}")]
    Unsupported { from: ColumnType, to: ColumnType },

    #[error("the {from} value `{value}` cannot be read as {to}: {reason}")]
    InvalidValue {
        from: ColumnType,
        to: ColumnType,
        value: String,
        reason: String,
    },
}

/// A single typed value of a [`crate::record::Record`].
///
/// Columns are immutable. Accessors coerce the value on demand and return `Ok(None)` for null
/// columns, whatever the requested type.
#[derive(Debug, Clone, PartialEq)]
pub enum Column {
    /// A null value, keeping the type it was declared with.
    Null(ColumnType),
    String(String),
    Long(i64),
    Double(f64),
    Bool(bool),
    Date(NaiveDateTime, DateKind),
    Bytes(Bytes),
    Timestamp(NaiveDateTime),
}

impl Column {
    pub fn null(column_type: ColumnType) -> Self {
        Column::Null(column_type)
    }

    pub fn string(value: impl Into<String>) -> Self {
        Column::String(value.into())
    }

    pub fn date(value: NaiveDate) -> Self {
        Column::Date(value.and_time(NaiveTime::MIN), DateKind::Date)
    }

    pub fn time(value: NaiveTime) -> Self {
        Column::Date(DateTime::UNIX_EPOCH.date_naive().and_time(value), DateKind::Time)
    }

    pub fn date_time(value: NaiveDateTime) -> Self {
        Column::Date(value, DateKind::DateTime)
    }

    pub fn bytes(value: impl Into<Bytes>) -> Self {
        Column::Bytes(value.into())
    }

    /// Builds a column from optional raw data, mapping `None` to a null column of `column_type`.
    pub fn from_option<T>(value: Option<T>, column_type: ColumnType) -> Self
    where
        T: Into<Column>,
    {
        value.map_or(Column::Null(column_type), Into::into)
    }

    pub fn column_type(&self) -> ColumnType {
        match self {
            Column::Null(column_type) => *column_type,
            Column::String(_) => ColumnType::String,
            Column::Long(_) => ColumnType::Long,
            Column::Double(_) => ColumnType::Double,
            Column::Bool(_) => ColumnType::Bool,
            Column::Date(_, _) => ColumnType::Date,
            Column::Bytes(_) => ColumnType::Bytes,
            Column::Timestamp(_) => ColumnType::Timestamp,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Column::Null(_))
    }

    /// Estimated size of the value in bytes, used for throughput accounting and byte
    /// backpressure. Null columns weigh nothing.
    pub fn byte_size(&self) -> usize {
        match self {
            Column::Null(_) => 0,
            Column::String(value) => value.len(),
            Column::Long(_) | Column::Double(_) => 8,
            Column::Bool(_) => 1,
            Column::Date(_, _) => DATE_BYTE_SIZE,
            Column::Bytes(value) => value.len(),
            Column::Timestamp(_) => TIMESTAMP_BYTE_SIZE,
        }
    }

    pub fn as_string(&self) -> Result<Option<String>, TypeConversionError> {
        let value = match self {
            Column::Null(_) => return Ok(None),
            Column::String(value) => value.clone(),
            Column::Long(value) => value.to_string(),
            Column::Double(value) => value.to_string(),
            Column::Bool(value) => value.to_string(),
            Column::Date(value, DateKind::Date) => value.format(DATE_FORMAT).to_string(),
            Column::Date(value, DateKind::Time) => value.format(TIME_FORMAT).to_string(),
            Column::Date(value, DateKind::DateTime) => {
                value.format("%Y-%m-%d %H:%M:%S").to_string()
            }
            Column::Bytes(value) => String::from_utf8(value.to_vec())
                .map_err(|err| self.invalid(ColumnType::String, err))?,
            Column::Timestamp(value) => value.format("%Y-%m-%d %H:%M:%S%.f").to_string(),
        };

        Ok(Some(value))
    }

    pub fn as_long(&self) -> Result<Option<i64>, TypeConversionError> {
        let value = match self {
            Column::Null(_) => return Ok(None),
            Column::String(value) => value
                .trim()
                .parse::<i64>()
                .map_err(|err| self.invalid(ColumnType::Long, err))?,
            Column::Long(value) => *value,
            Column::Double(value) => {
                if !value.is_finite() || *value < i64::MIN as f64 || *value >= i64::MAX as f64 {
                    return Err(self.invalid(ColumnType::Long, "value out of range"));
                }

                value.trunc() as i64
            }
            Column::Bool(value) => i64::from(*value),
            Column::Date(value, _) | Column::Timestamp(value) => {
                value.and_utc().timestamp_millis()
            }
            Column::Bytes(_) => return Err(self.unsupported(ColumnType::Long)),
        };

        Ok(Some(value))
    }

    pub fn as_double(&self) -> Result<Option<f64>, TypeConversionError> {
        let value = match self {
            Column::Null(_) => return Ok(None),
            Column::String(value) => value
                .trim()
                .parse::<f64>()
                .map_err(|err| self.invalid(ColumnType::Double, err))?,
            Column::Long(value) => *value as f64,
            Column::Double(value) => *value,
            _ => return Err(self.unsupported(ColumnType::Double)),
        };

        Ok(Some(value))
    }

    pub fn as_bool(&self) -> Result<Option<bool>, TypeConversionError> {
        let value = match self {
            Column::Null(_) => return Ok(None),
            Column::String(value) => match value.trim().to_ascii_lowercase().as_str() {
                "true" => true,
                "false" => false,
                _ => return Err(self.invalid(ColumnType::Bool, "expected `true` or `false`")),
            },
            Column::Long(value) => *value != 0,
            Column::Bool(value) => *value,
            _ => return Err(self.unsupported(ColumnType::Bool)),
        };

        Ok(Some(value))
    }

    pub fn as_date(&self) -> Result<Option<NaiveDateTime>, TypeConversionError> {
        let value = match self {
            Column::Null(_) => return Ok(None),
            Column::String(value) => self.parse_date_time(value, ColumnType::Date)?,
            Column::Long(millis) => self.millis_to_date_time(*millis, ColumnType::Date)?,
            Column::Date(value, _) | Column::Timestamp(value) => *value,
            _ => return Err(self.unsupported(ColumnType::Date)),
        };

        Ok(Some(value))
    }

    pub fn as_bytes(&self) -> Result<Option<Bytes>, TypeConversionError> {
        let value = match self {
            Column::Null(_) => return Ok(None),
            Column::String(value) => Bytes::copy_from_slice(value.as_bytes()),
            Column::Bytes(value) => value.clone(),
            _ => return Err(self.unsupported(ColumnType::Bytes)),
        };

        Ok(Some(value))
    }

    pub fn as_timestamp(&self) -> Result<Option<NaiveDateTime>, TypeConversionError> {
        let value = match self {
            Column::Null(_) => return Ok(None),
            Column::String(value) => self.parse_date_time(value, ColumnType::Timestamp)?,
            Column::Long(millis) => self.millis_to_date_time(*millis, ColumnType::Timestamp)?,
            Column::Date(value, _) | Column::Timestamp(value) => *value,
            _ => return Err(self.unsupported(ColumnType::Timestamp)),
        };

        Ok(Some(value))
    }

    /// Renders the column the way dirty records are reported.
    pub fn to_json(&self) -> serde_json::Value {
        let raw = match self {
            Column::Null(_) => serde_json::Value::Null,
            Column::String(value) => json!(value),
            Column::Long(value) => json!(value),
            Column::Double(value) => json!(value),
            Column::Bool(value) => json!(value),
            Column::Bytes(value) => json!(String::from_utf8_lossy(value)),
            Column::Date(_, _) | Column::Timestamp(_) => {
                json!(self.as_string().ok().flatten())
            }
        };

        json!({
            "type": self.column_type().to_string(),
            "raw_data": raw,
            "byte_size": self.byte_size(),
        })
    }

    fn parse_date_time(
        &self,
        value: &str,
        to: ColumnType,
    ) -> Result<NaiveDateTime, TypeConversionError> {
        let value = value.trim();
        for format in DATE_TIME_FORMATS {
            if let Ok(parsed) = NaiveDateTime::parse_from_str(value, format) {
                return Ok(parsed);
            }
        }

        NaiveDate::parse_from_str(value, DATE_FORMAT)
            .map(|date| date.and_time(NaiveTime::MIN))
            .map_err(|err| self.invalid(to, err))
    }

    fn millis_to_date_time(&self, millis: i64, to: ColumnType) -> Result<NaiveDateTime, TypeConversionError> {
        DateTime::from_timestamp_millis(millis)
            .map(|value| value.naive_utc())
            .ok_or_else(|| self.invalid(to, "timestamp out of range"))
    }

    fn unsupported(&self, to: ColumnType) -> TypeConversionError {
        TypeConversionError::Unsupported {
            from: self.column_type(),
            to,
        }
    }

    fn invalid(&self, to: ColumnType, reason: impl fmt::Display) -> TypeConversionError {
        let value = match self {
            Column::Bytes(value) => format!("{} bytes", value.len()),
            other => other
                .as_string()
                .ok()
                .flatten()
                .unwrap_or_default(),
        };

        TypeConversionError::InvalidValue {
            from: self.column_type(),
            to,
            value,
            reason: reason.to_string(),
        }
    }
}

impl From<String> for Column {
    fn from(value: String) -> Self {
        Column::String(value)
    }
}

impl From<&str> for Column {
    fn from(value: &str) -> Self {
        Column::String(value.to_owned())
    }
}

impl From<i64> for Column {
    fn from(value: i64) -> Self {
        Column::Long(value)
    }
}

impl From<i32> for Column {
    fn from(value: i32) -> Self {
        Column::Long(value.into())
    }
}

impl From<f64> for Column {
    fn from(value: f64) -> Self {
        Column::Double(value)
    }
}

impl From<bool> for Column {
    fn from(value: bool) -> Self {
        Column::Bool(value)
    }
}

impl From<Vec<u8>> for Column {
    fn from(value: Vec<u8>) -> Self {
        Column::Bytes(value.into())
    }
}

impl From<NaiveDate> for Column {
    fn from(value: NaiveDate) -> Self {
        Column::date(value)
    }
}

impl From<NaiveDateTime> for Column {
    fn from(value: NaiveDateTime) -> Self {
        Column::Timestamp(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn null_columns_read_as_none_and_weigh_nothing() {
        let column = Column::from_option(None::<i64>, ColumnType::Long);

        assert!(column.is_null());
        assert_eq!(column.column_type(), ColumnType::Long);
        assert_eq!(column.byte_size(), 0);
        assert_eq!(column.as_string(), Ok(None));
        assert_eq!(column.as_long(), Ok(None));
        assert_eq!(column.as_double(), Ok(None));
        assert_eq!(column.as_bool(), Ok(None));
        assert_eq!(column.as_date(), Ok(None));
        assert_eq!(column.as_bytes(), Ok(None));
        assert_eq!(column.as_timestamp(), Ok(None));
    }

    #[test]
    fn strings_coerce_to_other_types() {
        assert_eq!(Column::string("42").as_long(), Ok(Some(42)));
        assert_eq!(Column::string(" 1.5 ").as_double(), Ok(Some(1.5)));
        assert_eq!(Column::string("TRUE").as_bool(), Ok(Some(true)));

        let expected = NaiveDate::from_ymd_opt(2024, 3, 1)
            .unwrap()
            .and_hms_opt(10, 30, 0)
            .unwrap();
        assert_eq!(
            Column::string("2024-03-01 10:30:00").as_date(),
            Ok(Some(expected))
        );
        assert_eq!(
            Column::string("2024-03-01").as_timestamp(),
            Ok(Some(expected.date().and_time(NaiveTime::MIN)))
        );
    }

    #[test]
    fn impossible_conversions_fail() {
        let err = Column::string("abc").as_long().unwrap_err();
        assert!(matches!(
            err,
            TypeConversionError::InvalidValue {
                from: ColumnType::String,
                to: ColumnType::Long,
                ..
            }
        ));

        assert_eq!(
            Column::bytes(vec![1u8, 2]).as_long(),
            Err(TypeConversionError::Unsupported {
                from: ColumnType::Bytes,
                to: ColumnType::Long,
            })
        );
        assert!(Column::Double(f64::NAN).as_long().is_err());
        assert!(Column::Bool(true).as_date().is_err());
        assert!(Column::bytes(vec![0xff, 0xfe]).as_string().is_err());
    }

    #[test]
    fn numeric_conversions() {
        assert_eq!(Column::Double(3.9).as_long(), Ok(Some(3)));
        assert_eq!(Column::Long(7).as_double(), Ok(Some(7.0)));
        assert_eq!(Column::Long(0).as_bool(), Ok(Some(false)));
        assert_eq!(Column::Bool(true).as_long(), Ok(Some(1)));
        assert_eq!(Column::Long(0).as_timestamp(), Ok(Some(DateTime::UNIX_EPOCH.naive_utc())));
    }

    #[test]
    fn dates_render_according_to_their_kind() {
        let date = NaiveDate::from_ymd_opt(2023, 12, 31).unwrap();
        let time = NaiveTime::from_hms_opt(23, 59, 1).unwrap();

        assert_eq!(
            Column::date(date).as_string(),
            Ok(Some("2023-12-31".to_string()))
        );
        assert_eq!(
            Column::time(time).as_string(),
            Ok(Some("23:59:01".to_string()))
        );
        assert_eq!(
            Column::date_time(date.and_time(time)).as_string(),
            Ok(Some("2023-12-31 23:59:01".to_string()))
        );
    }

    #[test]
    fn byte_sizes() {
        assert_eq!(Column::string("héllo").byte_size(), 6);
        assert_eq!(Column::Long(1).byte_size(), 8);
        assert_eq!(Column::Bool(false).byte_size(), 1);
        assert_eq!(Column::bytes(vec![0u8; 10]).byte_size(), 10);
    }
}
