//! Table bindings and the record encoder.
//!
//! A [`TableBinding`] fixes, once, which columns of one physical table a
//! record type fills and where each column's value comes from. Encoding a
//! record then walks that column list and appends one row to an
//! [`InfileBuffer`].
//!
//! Binding-time problems (bad names, duplicate columns, join columns on
//! collections, unsupported field types) are [`Error::Config`]. Encode-time
//! problems are either [`MappingWarning`]s, recorded and otherwise ignored,
//! or [`Error::Encode`] when a value has no text form at all.

use std::borrow::Cow;
use std::collections::HashSet;
use std::fmt::Write as _;

use chrono::{DateTime, NaiveDate};
use infile_core::{
    EncodeError, EnumType, EnumValue, Error, FieldInfo, MappingWarning, RecordRef, RecordType,
    Related, RelationshipInfo, Result, SecondaryTable, TypeCheck, Value, is_valid_identifier,
};

use crate::buffer::InfileBuffer;

/// Where a column's value comes from.
#[derive(Debug, Clone)]
pub enum ColumnSource {
    /// A mapped field; `path` is longer than one for embedded sub-fields.
    Field {
        path: Vec<&'static str>,
        field: &'static FieldInfo,
    },
    /// The store-generated key of the record.
    GeneratedId,
    /// The id of the record behind a child-dependent relationship.
    JoinColumn(&'static RelationshipInfo),
    /// The owning record's id, in a secondary table.
    OwnerId,
}

/// One column of a binding.
#[derive(Debug, Clone)]
pub struct Column {
    pub name: &'static str,
    pub source: ColumnSource,
}

/// Columns an embedded field was flattened into.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EmbedMapping {
    /// Path of field names leading to the embedded value.
    pub path: Vec<&'static str>,
    pub columns: Vec<&'static str>,
}

/// Column layout of one record type in one table.
#[derive(Debug, Clone)]
pub struct TableBinding {
    record: RecordType,
    table: &'static str,
    secondary: Option<SecondaryTable>,
    columns: Vec<Column>,
    column_names: Vec<String>,
    embeds: Vec<EmbedMapping>,
    generated_id: Option<&'static FieldInfo>,
}

fn valid_table_name(name: &str) -> bool {
    !name.is_empty() && name.split('.').all(is_valid_identifier)
}

impl TableBinding {
    /// Binding for the record's primary table.
    pub fn primary(record: RecordType) -> Result<Self> {
        let name = record.short_name();
        if !valid_table_name(record.table) {
            return Err(Error::config(
                name,
                format!("invalid table name '{}'", record.table),
            ));
        }

        let declared: HashSet<&str> = record.secondary_tables.iter().map(|s| s.name).collect();
        for field in record.fields {
            if let Some(table) = field.table {
                if !declared.contains(table) {
                    return Err(Error::config(
                        name,
                        format!(
                            "field '{}' is mapped to undeclared secondary table '{}'",
                            field.name, table
                        ),
                    ));
                }
                if field.primary_key {
                    return Err(Error::config(
                        name,
                        format!("primary key '{}' must live in the primary table", field.name),
                    ));
                }
            }
        }

        let generated_id = record.generated_id();
        if let Some(id) = generated_id {
            if !id.sql_type.is_integer() {
                return Err(Error::config(
                    name,
                    format!(
                        "generated key '{}' must be an integer column, not {}",
                        id.name,
                        id.sql_type.sql_name()
                    ),
                ));
            }
        }

        let mut builder = Builder::new(name);
        for field in record.fields.iter().filter(|f| f.table.is_none()) {
            if field.is_generated_id() {
                builder.push(field.column_name, ColumnSource::GeneratedId)?;
            } else {
                builder.push_field(Vec::new(), field)?;
            }
        }

        for rel in record.relationships {
            let Some(join_column) = rel.join_column else {
                continue;
            };
            if !rel.is_child_dependent() {
                return Err(Error::config(
                    name,
                    format!(
                        "relationship '{}' is {:?} and cannot own join column '{}'",
                        rel.name, rel.kind, join_column
                    ),
                ));
            }
            builder.push(join_column, ColumnSource::JoinColumn(rel))?;
        }

        builder.finish(record, record.table, None, generated_id)
    }

    /// Binding for one of the record's secondary tables.
    ///
    /// The first column receives the owner's id, followed by the fields
    /// assigned to that table.
    pub fn secondary(record: RecordType, secondary: SecondaryTable) -> Result<Self> {
        let name = record.short_name();
        if !valid_table_name(secondary.name) {
            return Err(Error::config(
                name,
                format!("invalid secondary table name '{}'", secondary.name),
            ));
        }
        if !record.secondary_tables.contains(&secondary) {
            return Err(Error::config(
                name,
                format!("secondary table '{}' is not declared", secondary.name),
            ));
        }
        if record.primary_key().is_none() {
            return Err(Error::config(
                name,
                format!(
                    "secondary table '{}' needs a primary key to join on",
                    secondary.name
                ),
            ));
        }

        let mut builder = Builder::new(name);
        builder.push(secondary.pk_join_column, ColumnSource::OwnerId)?;
        for field in record
            .fields
            .iter()
            .filter(|f| f.table == Some(secondary.name))
        {
            builder.push_field(Vec::new(), field)?;
        }
        builder.finish(record, secondary.name, Some(secondary), None)
    }

    pub fn record(&self) -> RecordType {
        self.record
    }

    pub fn table(&self) -> &'static str {
        self.table
    }

    pub fn is_secondary(&self) -> bool {
        self.secondary.is_some()
    }

    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    pub fn column_names(&self) -> &[String] {
        &self.column_names
    }

    pub fn embeds(&self) -> &[EmbedMapping] {
        &self.embeds
    }

    /// The store-generated key column, primary bindings only.
    pub fn generated_id(&self) -> Option<&'static FieldInfo> {
        self.generated_id
    }

    /// Append one row for `record`.
    ///
    /// `id` is the key to write for the generated-id column; when `None`,
    /// the record's own id is used. Recoverable oddities are pushed onto
    /// `warnings`. On error the buffer is left exactly as it was.
    pub fn encode_into(
        &self,
        buffer: &mut InfileBuffer,
        record: &RecordRef,
        id: Option<i64>,
        warnings: &mut Vec<MappingWarning>,
    ) -> Result<()> {
        let row = record.to_row()?;
        let record_id = match id {
            Some(id) => Some(id),
            None => record.id()?,
        };

        let checkpoint = buffer.checkpoint();
        buffer.begin_row();
        let result = self
            .columns
            .iter()
            .try_for_each(|column| self.encode_column(buffer, column, &row, record, record_id, warnings));
        match result {
            Ok(()) => {
                buffer.end_row();
                Ok(())
            }
            Err(err) => {
                buffer.rollback(checkpoint);
                Err(err)
            }
        }
    }

    fn encode_column(
        &self,
        buffer: &mut InfileBuffer,
        column: &Column,
        row: &[(&'static str, Value)],
        record: &RecordRef,
        record_id: Option<i64>,
        warnings: &mut Vec<MappingWarning>,
    ) -> Result<()> {
        match &column.source {
            ColumnSource::GeneratedId | ColumnSource::OwnerId => {
                append_id(buffer, record_id);
                Ok(())
            }
            ColumnSource::JoinColumn(rel) => {
                let related_id = match record.related(rel.name)? {
                    Related::None => None,
                    Related::One(target) => target.id()?,
                    Related::Many(_) => {
                        return Err(Error::traversal(
                            self.record.short_name(),
                            Some(rel.name),
                            "join column relationship returned a collection",
                        ));
                    }
                };
                append_id(buffer, related_id);
                Ok(())
            }
            ColumnSource::Field { path, field } => {
                let value = self.resolve(row, path, column.name)?;
                self.check(field, column.name, value, warnings);
                self.append_value(buffer, field, column.name, value)
            }
        }
    }

    fn resolve<'r>(
        &self,
        row: &'r [(&'static str, Value)],
        path: &[&'static str],
        column: &str,
    ) -> Result<&'r Value> {
        static NULL: Value = Value::Null;

        let (first, rest) = path
            .split_first()
            .ok_or_else(|| self.encode_error(column, "column has no field path"))?;
        let mut value = row
            .iter()
            .find(|(name, _)| name == first)
            .map(|(_, v)| v)
            .ok_or_else(|| self.encode_error(column, format!("field '{}' missing from row", first)))?;

        for segment in rest {
            value = match value {
                // a NULL embedded object nulls all of its columns
                Value::Null => return Ok(&NULL),
                Value::Embedded(_) => value.embedded_field(segment).ok_or_else(|| {
                    self.encode_error(
                        column,
                        format!("embedded field '{}' missing from value", segment),
                    )
                })?,
                other => {
                    return Err(self.encode_error(
                        column,
                        format!("expected an embedded value, got {}", other.type_name()),
                    ));
                }
            };
        }
        Ok(value)
    }

    fn check(
        &self,
        field: &FieldInfo,
        column: &str,
        value: &Value,
        warnings: &mut Vec<MappingWarning>,
    ) {
        let message = match field.sql_type.check(value) {
            TypeCheck::Exact => None,
            TypeCheck::Lossy(message) => Some(message),
            TypeCheck::Mismatch => Some(format!(
                "{} value written to {} column",
                value.type_name(),
                field.sql_type.sql_name()
            )),
        };
        let message = message.or_else(|| {
            (value.is_null() && !field.nullable)
                .then(|| "NULL written to NOT NULL column".to_string())
        });

        if let Some(message) = message {
            tracing::warn!(
                table = self.table,
                column = column,
                message = %message,
                "Mapping warning"
            );
            warnings.push(MappingWarning::new(self.table, column, message));
        }
    }

    fn append_value(
        &self,
        buffer: &mut InfileBuffer,
        field: &FieldInfo,
        column: &str,
        value: &Value,
    ) -> Result<()> {
        match value {
            Value::Null => buffer.append_null(),
            Value::Bool(v) => buffer.append_raw(if *v { b"1" } else { b"0" }),
            Value::TinyInt(v) => buffer.append_raw(v.to_string().as_bytes()),
            Value::SmallInt(v) => buffer.append_raw(v.to_string().as_bytes()),
            Value::Int(v) => buffer.append_raw(v.to_string().as_bytes()),
            Value::BigInt(v) => buffer.append_raw(v.to_string().as_bytes()),
            Value::Float(v) => {
                if !v.is_finite() {
                    return Err(self.encode_error(column, format!("{} has no SQL form", v)));
                }
                buffer.append_raw(v.to_string().as_bytes());
            }
            Value::Double(v) => {
                if !v.is_finite() {
                    return Err(self.encode_error(column, format!("{} has no SQL form", v)));
                }
                buffer.append_raw(v.to_string().as_bytes());
            }
            Value::Decimal(s) | Value::Text(s) => buffer.append_field(s.as_bytes()),
            Value::Bytes(b) => buffer.append_field(b),
            Value::Date(days) => {
                let date = format_date(*days)
                    .ok_or_else(|| self.encode_error(column, format!("date {} out of range", days)))?;
                buffer.append_raw(date.as_bytes());
            }
            Value::Time(micros) => buffer.append_raw(format_time(*micros).as_bytes()),
            Value::Timestamp(micros) => {
                let ts = format_timestamp(*micros).ok_or_else(|| {
                    self.encode_error(column, format!("timestamp {} out of range", micros))
                })?;
                buffer.append_raw(ts.as_bytes());
            }
            Value::Uuid(bytes) => buffer.append_raw(format_uuid(bytes).as_bytes()),
            Value::Json(json) => {
                let text = serde_json::to_string(json)
                    .map_err(|e| self.encode_error(column, e.to_string()))?;
                buffer.append_field(text.as_bytes());
            }
            Value::Enum(e) => buffer.append_field(enum_value_to_append(field, e).as_bytes()),
            Value::Embedded(_) => {
                return Err(self.encode_error(
                    column,
                    "embedded value in a column not declared as embedded",
                ));
            }
        }
        Ok(())
    }

    fn encode_error(&self, column: &str, message: impl Into<String>) -> Error {
        Error::Encode(EncodeError {
            table: self.table.to_string(),
            column: column.to_string(),
            message: message.into(),
        })
    }
}

/// Text written for an enum value in `field`.
///
/// The ordinal unless the field asks for [`EnumType::String`], in which case
/// the variant name. Nothing else about the enum is consulted.
pub fn enum_value_to_append(field: &FieldInfo, value: &EnumValue) -> Cow<'static, str> {
    match field.enum_type() {
        EnumType::Ordinal => Cow::Owned(value.ordinal.to_string()),
        EnumType::String => Cow::Borrowed(value.name),
    }
}

fn append_id(buffer: &mut InfileBuffer, id: Option<i64>) {
    match id {
        Some(id) => buffer.append_raw(id.to_string().as_bytes()),
        None => buffer.append_null(),
    }
}

fn format_date(days: i32) -> Option<String> {
    let epoch = NaiveDate::from_ymd_opt(1970, 1, 1)?;
    let date = epoch.checked_add_signed(chrono::Duration::days(i64::from(days)))?;
    Some(date.format("%Y-%m-%d").to_string())
}

fn format_time(micros: i64) -> String {
    let sign = if micros < 0 { "-" } else { "" };
    let abs = micros.unsigned_abs();
    let frac = abs % 1_000_000;
    let secs = abs / 1_000_000;
    let mut out = format!(
        "{}{:02}:{:02}:{:02}",
        sign,
        secs / 3600,
        (secs / 60) % 60,
        secs % 60
    );
    if frac != 0 {
        let _ = write!(out, ".{:06}", frac);
    }
    out
}

fn format_timestamp(micros: i64) -> Option<String> {
    let ts = DateTime::from_timestamp_micros(micros)?.naive_utc();
    Some(ts.format("%Y-%m-%d %H:%M:%S%.f").to_string())
}

fn format_uuid(bytes: &[u8; 16]) -> String {
    let mut out = String::with_capacity(36);
    for (i, byte) in bytes.iter().enumerate() {
        if matches!(i, 4 | 6 | 8 | 10) {
            out.push('-');
        }
        let _ = write!(out, "{:02x}", byte);
    }
    out
}

struct Builder {
    record: &'static str,
    columns: Vec<Column>,
    seen: HashSet<&'static str>,
    embeds: Vec<EmbedMapping>,
}

impl Builder {
    fn new(record: &'static str) -> Self {
        Self {
            record,
            columns: Vec::new(),
            seen: HashSet::new(),
            embeds: Vec::new(),
        }
    }

    fn push(&mut self, name: &'static str, source: ColumnSource) -> Result<()> {
        if !is_valid_identifier(name) {
            return Err(Error::config(
                self.record,
                format!("invalid column name '{}'", name),
            ));
        }
        if !self.seen.insert(name) {
            return Err(Error::config(
                self.record,
                format!("column '{}' is mapped more than once", name),
            ));
        }
        self.columns.push(Column { name, source });
        Ok(())
    }

    fn push_field(&mut self, mut path: Vec<&'static str>, field: &'static FieldInfo) -> Result<()> {
        path.push(field.name);

        let Some(sub_fields) = field.embedded else {
            if field.enumerated.is_some()
                && !(field.sql_type.is_integer() || field.sql_type.is_text())
            {
                return Err(Error::config(
                    self.record,
                    format!(
                        "enum field '{}' cannot be stored in a {} column",
                        field.name,
                        field.sql_type.sql_name()
                    ),
                ));
            }
            if field.enumerated == Some(EnumType::String) && field.sql_type.is_integer() {
                return Err(Error::config(
                    self.record,
                    format!(
                        "enum field '{}' is stored by name but its column is {}",
                        field.name,
                        field.sql_type.sql_name()
                    ),
                ));
            }
            return self.push(field.column_name, ColumnSource::Field { path, field });
        };

        if field.primary_key {
            return Err(Error::config(
                self.record,
                format!("embedded field '{}' cannot be a primary key", field.name),
            ));
        }
        let sub_fields = sub_fields();
        if sub_fields.is_empty() {
            return Err(Error::config(
                self.record,
                format!("embedded field '{}' has no columns", field.name),
            ));
        }

        let start = self.columns.len();
        for sub in sub_fields {
            self.push_field(path.clone(), sub)?;
        }
        let columns = self.columns[start..].iter().map(|c| c.name).collect();
        self.embeds.push(EmbedMapping { path, columns });
        Ok(())
    }

    fn finish(
        self,
        record: RecordType,
        table: &'static str,
        secondary: Option<SecondaryTable>,
        generated_id: Option<&'static FieldInfo>,
    ) -> Result<TableBinding> {
        if self.columns.is_empty() {
            return Err(Error::config(
                self.record,
                format!("no columns are mapped to table '{}'", table),
            ));
        }
        let column_names = self.columns.iter().map(|c| c.name.to_string()).collect();
        Ok(TableBinding {
            record,
            table,
            secondary,
            columns: self.columns,
            column_names,
            embeds: self.embeds,
            generated_id,
        })
    }
}
