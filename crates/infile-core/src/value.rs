//! Dynamic field values.

use chrono::{NaiveDate, NaiveDateTime, NaiveTime, Timelike};
use serde::Serialize;

/// A dynamically-typed field value.
///
/// Records hand their fields to the encoder as `Value`s; the encoder decides
/// how each one is rendered into the infile line format.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum Value {
    /// NULL value
    Null,

    /// Boolean value
    Bool(bool),

    /// 8-bit signed integer
    TinyInt(i8),

    /// 16-bit signed integer
    SmallInt(i16),

    /// 32-bit signed integer
    Int(i32),

    /// 64-bit signed integer
    BigInt(i64),

    /// 32-bit floating point
    Float(f32),

    /// 64-bit floating point
    Double(f64),

    /// Arbitrary precision decimal (stored as string)
    Decimal(String),

    /// Text string
    Text(String),

    /// Binary data
    Bytes(Vec<u8>),

    /// Date (days since epoch)
    Date(i32),

    /// Time (microseconds since midnight)
    Time(i64),

    /// Timestamp (microseconds since epoch, no zone)
    Timestamp(i64),

    /// UUID (as 16 bytes)
    Uuid([u8; 16]),

    /// JSON value
    Json(serde_json::Value),

    /// Enumerated value, rendered as ordinal or name per field hint
    Enum(EnumValue),

    /// Embedded value object, flattened into its own columns
    Embedded(Vec<(&'static str, Value)>),
}

/// Both representations of an enum variant.
///
/// Only the ordinal and the variant name are ever written; a `Display` impl
/// on the source enum plays no part.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct EnumValue {
    pub ordinal: u32,
    pub name: &'static str,
}

/// Enums that can be stored in a column.
///
/// # Example
///
/// ```
/// use infile_core::{SqlEnum, Value};
///
/// #[derive(Clone, Copy)]
/// enum CustomerType { Residential, Business }
///
/// impl SqlEnum for CustomerType {
///     fn ordinal(&self) -> u32 {
///         *self as u32
///     }
///     fn name(&self) -> &'static str {
///         match self {
///             CustomerType::Residential => "RESIDENTIAL",
///             CustomerType::Business => "BUSINESS",
///         }
///     }
/// }
///
/// let value = Value::from_enum(&CustomerType::Business);
/// assert_eq!(value.as_enum().unwrap().ordinal, 1);
/// ```
pub trait SqlEnum {
    /// Zero-based declaration index of the variant.
    fn ordinal(&self) -> u32;

    /// Symbolic variant name.
    fn name(&self) -> &'static str;
}

impl Value {
    /// Check if this value is NULL.
    pub const fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Build a value from any [`SqlEnum`].
    pub fn from_enum<E: SqlEnum + ?Sized>(value: &E) -> Self {
        Value::Enum(EnumValue {
            ordinal: value.ordinal(),
            name: value.name(),
        })
    }

    /// Build a value from an optional [`SqlEnum`], mapping `None` to NULL.
    pub fn from_enum_opt<E: SqlEnum>(value: Option<&E>) -> Self {
        value.map_or(Value::Null, Value::from_enum)
    }

    /// Get the type name of this value.
    pub const fn type_name(&self) -> &'static str {
        match self {
            Value::Null => "NULL",
            Value::Bool(_) => "BOOLEAN",
            Value::TinyInt(_) => "TINYINT",
            Value::SmallInt(_) => "SMALLINT",
            Value::Int(_) => "INTEGER",
            Value::BigInt(_) => "BIGINT",
            Value::Float(_) => "REAL",
            Value::Double(_) => "DOUBLE",
            Value::Decimal(_) => "DECIMAL",
            Value::Text(_) => "TEXT",
            Value::Bytes(_) => "BLOB",
            Value::Date(_) => "DATE",
            Value::Time(_) => "TIME",
            Value::Timestamp(_) => "TIMESTAMP",
            Value::Uuid(_) => "UUID",
            Value::Json(_) => "JSON",
            Value::Enum(_) => "ENUM",
            Value::Embedded(_) => "EMBEDDED",
        }
    }

    /// Try to convert this value to an i64.
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::TinyInt(v) => Some(i64::from(*v)),
            Value::SmallInt(v) => Some(i64::from(*v)),
            Value::Int(v) => Some(i64::from(*v)),
            Value::BigInt(v) => Some(*v),
            Value::Bool(v) => Some(if *v { 1 } else { 0 }),
            _ => None,
        }
    }

    /// Try to get this value as a string reference.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Text(s) => Some(s),
            Value::Decimal(s) => Some(s),
            _ => None,
        }
    }

    /// Try to get the enum representation.
    pub fn as_enum(&self) -> Option<EnumValue> {
        match self {
            Value::Enum(e) => Some(*e),
            _ => None,
        }
    }

    /// Look up a sub-field of an embedded value.
    ///
    /// Returns `None` when this is not an embedded value or the sub-field is
    /// absent.
    pub fn embedded_field(&self, name: &str) -> Option<&Value> {
        match self {
            Value::Embedded(fields) => fields.iter().find(|(n, _)| *n == name).map(|(_, v)| v),
            _ => None,
        }
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Bool(v)
    }
}

impl From<i8> for Value {
    fn from(v: i8) -> Self {
        Value::TinyInt(v)
    }
}

impl From<i16> for Value {
    fn from(v: i16) -> Self {
        Value::SmallInt(v)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Value::Int(v)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::BigInt(v)
    }
}

impl From<u32> for Value {
    fn from(v: u32) -> Self {
        Value::BigInt(i64::from(v))
    }
}

impl From<f32> for Value {
    fn from(v: f32) -> Self {
        Value::Float(v)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Double(v)
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::Text(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::Text(v.to_string())
    }
}

impl From<Vec<u8>> for Value {
    fn from(v: Vec<u8>) -> Self {
        Value::Bytes(v)
    }
}

impl From<&[u8]> for Value {
    fn from(v: &[u8]) -> Self {
        Value::Bytes(v.to_vec())
    }
}

impl From<[u8; 16]> for Value {
    fn from(v: [u8; 16]) -> Self {
        Value::Uuid(v)
    }
}

impl From<serde_json::Value> for Value {
    fn from(v: serde_json::Value) -> Self {
        Value::Json(v)
    }
}

impl From<NaiveDate> for Value {
    fn from(v: NaiveDate) -> Self {
        let days = v.signed_duration_since(epoch_date()).num_days();
        // chrono's date range fits comfortably in i32 days
        #[allow(clippy::cast_possible_truncation)]
        Value::Date(days as i32)
    }
}

impl From<NaiveTime> for Value {
    fn from(v: NaiveTime) -> Self {
        let micros = i64::from(v.num_seconds_from_midnight()) * 1_000_000
            + i64::from(v.nanosecond() / 1_000);
        Value::Time(micros)
    }
}

impl From<NaiveDateTime> for Value {
    fn from(v: NaiveDateTime) -> Self {
        Value::Timestamp(v.and_utc().timestamp_micros())
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        match v {
            Some(v) => v.into(),
            None => Value::Null,
        }
    }
}

fn epoch_date() -> NaiveDate {
    NaiveDate::from_ymd_opt(1970, 1, 1).unwrap_or_default()
}
