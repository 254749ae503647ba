//! SQL column types and value compatibility checks.

use crate::value::Value;

/// SQL data types a mapped column can declare.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SqlType {
    // Integer types
    TinyInt,
    SmallInt,
    Integer,
    BigInt,

    // Floating point
    Real,
    Double,

    // Fixed precision
    Decimal { precision: u8, scale: u8 },

    // Boolean
    Boolean,

    // String types
    Char(u32),
    VarChar(u32),
    Text,

    // Binary types
    Binary(u32),
    VarBinary(u32),
    Blob,

    // Date/time types
    Date,
    Time,
    DateTime,
    Timestamp,

    // UUID (stored as text or BINARY(16))
    Uuid,

    // JSON
    Json,

    // Custom type name, never checked
    Custom(&'static str),
}

/// Outcome of matching a value against a column type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TypeCheck {
    /// The value fits the column as-is.
    Exact,
    /// The value is accepted but the store will coerce it.
    Lossy(String),
    /// The value does not belong in this column at all.
    Mismatch,
}

impl SqlType {
    /// Get the SQL type name for this type.
    pub fn sql_name(&self) -> String {
        match self {
            SqlType::TinyInt => "TINYINT".to_string(),
            SqlType::SmallInt => "SMALLINT".to_string(),
            SqlType::Integer => "INT".to_string(),
            SqlType::BigInt => "BIGINT".to_string(),
            SqlType::Real => "FLOAT".to_string(),
            SqlType::Double => "DOUBLE".to_string(),
            SqlType::Decimal { precision, scale } => format!("DECIMAL({}, {})", precision, scale),
            SqlType::Boolean => "BOOLEAN".to_string(),
            SqlType::Char(len) => format!("CHAR({})", len),
            SqlType::VarChar(len) => format!("VARCHAR({})", len),
            SqlType::Text => "TEXT".to_string(),
            SqlType::Binary(len) => format!("BINARY({})", len),
            SqlType::VarBinary(len) => format!("VARBINARY({})", len),
            SqlType::Blob => "BLOB".to_string(),
            SqlType::Date => "DATE".to_string(),
            SqlType::Time => "TIME".to_string(),
            SqlType::DateTime => "DATETIME".to_string(),
            SqlType::Timestamp => "TIMESTAMP".to_string(),
            SqlType::Uuid => "CHAR(36)".to_string(),
            SqlType::Json => "JSON".to_string(),
            SqlType::Custom(name) => name.to_string(),
        }
    }

    /// Check if this type is an integer type.
    pub const fn is_integer(&self) -> bool {
        matches!(
            self,
            SqlType::TinyInt | SqlType::SmallInt | SqlType::Integer | SqlType::BigInt
        )
    }

    /// Check if this type is text-based.
    pub const fn is_text(&self) -> bool {
        matches!(self, SqlType::Char(_) | SqlType::VarChar(_) | SqlType::Text)
    }

    /// Check if this type is a date/time type.
    pub const fn is_temporal(&self) -> bool {
        matches!(
            self,
            SqlType::Date | SqlType::Time | SqlType::DateTime | SqlType::Timestamp
        )
    }

    /// Inclusive range for integer columns.
    const fn integer_range(&self) -> Option<(i64, i64)> {
        match self {
            SqlType::TinyInt => Some((i8::MIN as i64, i8::MAX as i64)),
            SqlType::SmallInt => Some((i16::MIN as i64, i16::MAX as i64)),
            SqlType::Integer => Some((i32::MIN as i64, i32::MAX as i64)),
            SqlType::BigInt => Some((i64::MIN, i64::MAX)),
            _ => None,
        }
    }

    /// Match a value against this column type.
    ///
    /// NULL always fits; nullability is the store's concern.
    pub fn check(&self, value: &Value) -> TypeCheck {
        if value.is_null() {
            return TypeCheck::Exact;
        }
        if let SqlType::Custom(_) = self {
            return TypeCheck::Exact;
        }

        if let Some((min, max)) = self.integer_range() {
            return match value {
                Value::Enum(_) => TypeCheck::Exact,
                Value::Float(_) | Value::Double(_) | Value::Decimal(_) => TypeCheck::Lossy(
                    format!("{} written to {} column", value.type_name(), self.sql_name()),
                ),
                other => match other.as_i64() {
                    Some(v) if v < min || v > max => {
                        TypeCheck::Lossy(format!("{} out of range for {}", v, self.sql_name()))
                    }
                    Some(_) => TypeCheck::Exact,
                    None => TypeCheck::Mismatch,
                },
            };
        }

        match (self, value) {
            (SqlType::Real, Value::Double(v)) => {
                #[allow(clippy::cast_possible_truncation)]
                let narrowed = f64::from(*v as f32);
                if narrowed == *v || v.is_nan() {
                    TypeCheck::Exact
                } else {
                    TypeCheck::Lossy(format!("precision loss writing {} to FLOAT", v))
                }
            }
            (SqlType::Real | SqlType::Double, Value::Decimal(_)) => {
                TypeCheck::Lossy(format!("DECIMAL written to {} column", self.sql_name()))
            }
            (SqlType::Real | SqlType::Double, v) if v.as_i64().is_some() => TypeCheck::Exact,
            (SqlType::Real | SqlType::Double, Value::Float(_) | Value::Double(_)) => {
                TypeCheck::Exact
            }
            (SqlType::Decimal { .. }, Value::Decimal(_) | Value::Float(_) | Value::Double(_)) => {
                TypeCheck::Exact
            }
            (SqlType::Decimal { .. }, v) if v.as_i64().is_some() => TypeCheck::Exact,
            (SqlType::Boolean, Value::Bool(_)) => TypeCheck::Exact,
            (SqlType::Boolean, v) => match v.as_i64() {
                Some(0 | 1) => TypeCheck::Exact,
                Some(n) => TypeCheck::Lossy(format!("{} written to BOOLEAN column", n)),
                None => TypeCheck::Mismatch,
            },
            (SqlType::Char(len) | SqlType::VarChar(len), Value::Text(s)) => {
                let chars = s.chars().count();
                if chars as u64 > u64::from(*len) {
                    TypeCheck::Lossy(format!(
                        "{} characters exceed {}; the store will truncate",
                        chars,
                        self.sql_name()
                    ))
                } else {
                    TypeCheck::Exact
                }
            }
            (SqlType::Char(_) | SqlType::VarChar(_) | SqlType::Text, Value::Bytes(_)) => {
                TypeCheck::Mismatch
            }
            (SqlType::Char(_) | SqlType::VarChar(_) | SqlType::Text, _) => TypeCheck::Exact,
            (
                SqlType::Binary(_) | SqlType::VarBinary(_) | SqlType::Blob,
                Value::Bytes(_) | Value::Text(_) | Value::Uuid(_),
            ) => TypeCheck::Exact,
            (SqlType::Date, Value::Date(_) | Value::Text(_)) => TypeCheck::Exact,
            (SqlType::Date, Value::Timestamp(_)) => {
                TypeCheck::Lossy("time of day dropped writing TIMESTAMP to DATE".to_string())
            }
            (SqlType::Time, Value::Time(_) | Value::Text(_)) => TypeCheck::Exact,
            (
                SqlType::DateTime | SqlType::Timestamp,
                Value::Timestamp(_) | Value::Date(_) | Value::Text(_),
            ) => TypeCheck::Exact,
            (SqlType::Uuid, Value::Uuid(_) | Value::Text(_)) => TypeCheck::Exact,
            (SqlType::Json, Value::Json(_) | Value::Text(_)) => TypeCheck::Exact,
            _ => TypeCheck::Mismatch,
        }
    }
}

/// Trait for types that have a corresponding SQL type.
pub trait TypeInfo {
    /// The SQL type for this Rust type.
    const SQL_TYPE: SqlType;

    /// Whether this type is nullable by default.
    const NULLABLE: bool = false;
}

impl TypeInfo for i8 {
    const SQL_TYPE: SqlType = SqlType::TinyInt;
}

impl TypeInfo for i16 {
    const SQL_TYPE: SqlType = SqlType::SmallInt;
}

impl TypeInfo for i32 {
    const SQL_TYPE: SqlType = SqlType::Integer;
}

impl TypeInfo for i64 {
    const SQL_TYPE: SqlType = SqlType::BigInt;
}

impl TypeInfo for f32 {
    const SQL_TYPE: SqlType = SqlType::Real;
}

impl TypeInfo for f64 {
    const SQL_TYPE: SqlType = SqlType::Double;
}

impl TypeInfo for bool {
    const SQL_TYPE: SqlType = SqlType::Boolean;
}

impl TypeInfo for String {
    const SQL_TYPE: SqlType = SqlType::Text;
}

impl TypeInfo for Vec<u8> {
    const SQL_TYPE: SqlType = SqlType::Blob;
}

impl TypeInfo for chrono::NaiveDate {
    const SQL_TYPE: SqlType = SqlType::Date;
}

impl TypeInfo for chrono::NaiveDateTime {
    const SQL_TYPE: SqlType = SqlType::DateTime;
}

impl<T: TypeInfo> TypeInfo for Option<T> {
    const SQL_TYPE: SqlType = T::SQL_TYPE;
    const NULLABLE: bool = true;
}
