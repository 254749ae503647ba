//! Field and column definitions.

use crate::types::SqlType;

/// How an enumerated field is written.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum EnumType {
    /// Zero-based variant index (the default).
    #[default]
    Ordinal,
    /// Symbolic variant name.
    String,
}

/// Metadata about a record field/column.
#[derive(Debug, Clone)]
pub struct FieldInfo {
    /// Rust field name, also the key used in [`Record::to_row`](crate::Record::to_row)
    pub name: &'static str,
    /// Database column name (may differ from field name)
    pub column_name: &'static str,
    /// SQL type for this field
    pub sql_type: SqlType,
    /// Whether this field is nullable
    pub nullable: bool,
    /// Whether this is the primary key
    pub primary_key: bool,
    /// Whether the store generates this key
    pub auto_increment: bool,
    /// Encoding hint for enumerated values; `None` means ordinal
    pub enumerated: Option<EnumType>,
    /// Secondary table this column lives in; `None` means the primary table
    pub table: Option<&'static str>,
    /// Sub-fields of an embedded value object, flattened in place
    pub embedded: Option<fn() -> &'static [FieldInfo]>,
}

impl FieldInfo {
    /// Create a new field info with minimal required data.
    pub const fn new(name: &'static str, column_name: &'static str, sql_type: SqlType) -> Self {
        Self {
            name,
            column_name,
            sql_type,
            nullable: false,
            primary_key: false,
            auto_increment: false,
            enumerated: None,
            table: None,
            embedded: None,
        }
    }

    /// Set the database column name.
    pub const fn column(mut self, name: &'static str) -> Self {
        self.column_name = name;
        self
    }

    /// Set nullable flag.
    pub const fn nullable(mut self, value: bool) -> Self {
        self.nullable = value;
        self
    }

    /// Set primary key flag.
    pub const fn primary_key(mut self, value: bool) -> Self {
        self.primary_key = value;
        self
    }

    /// Set auto-increment flag.
    pub const fn auto_increment(mut self, value: bool) -> Self {
        self.auto_increment = value;
        self
    }

    /// Declare the field as an enum written with the given representation.
    pub const fn enumerated(mut self, kind: EnumType) -> Self {
        self.enumerated = Some(kind);
        self
    }

    /// Move the column to a secondary table.
    pub const fn secondary_table(mut self, table: &'static str) -> Self {
        self.table = Some(table);
        self
    }

    /// Declare the field as an embedded value object.
    ///
    /// The sub-fields are written as additional columns of the owning
    /// table, in their declaration order.
    pub const fn embedded(mut self, fields: fn() -> &'static [FieldInfo]) -> Self {
        self.embedded = Some(fields);
        self
    }

    /// Effective enum representation, ordinal unless `String` was asked for.
    pub fn enum_type(&self) -> EnumType {
        self.enumerated.unwrap_or_default()
    }

    /// Is this the store-generated key?
    pub const fn is_generated_id(&self) -> bool {
        self.primary_key && self.auto_increment
    }

    /// Does this field belong to the table named `table` of a record whose
    /// primary table is `primary`?
    pub fn belongs_to(&self, primary: &str, table: &str) -> bool {
        match self.table {
            Some(own) => own == table,
            None => primary == table,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder_chain() {
        let f = FieldInfo::new("id", "id", SqlType::BigInt)
            .primary_key(true)
            .auto_increment(true);
        assert!(f.is_generated_id());
        assert!(!f.nullable);
        assert_eq!(f.enum_type(), EnumType::Ordinal);
    }

    #[test]
    fn test_enum_hint_defaults_to_ordinal() {
        let plain = FieldInfo::new("kind", "kind", SqlType::Integer);
        assert_eq!(plain.enum_type(), EnumType::Ordinal);

        let explicit = FieldInfo::new("kind", "kind", SqlType::Integer).enumerated(EnumType::Ordinal);
        assert_eq!(explicit.enum_type(), EnumType::Ordinal);

        let named = FieldInfo::new("kind", "kind", SqlType::VarChar(16)).enumerated(EnumType::String);
        assert_eq!(named.enum_type(), EnumType::String);
    }

    #[test]
    fn test_table_membership() {
        let primary = FieldInfo::new("name", "name", SqlType::Text);
        assert!(primary.belongs_to("customer", "customer"));
        assert!(!primary.belongs_to("customer", "customer_info"));

        let secondary = FieldInfo::new("note", "note", SqlType::Text).secondary_table("customer_info");
        assert!(secondary.belongs_to("customer", "customer_info"));
        assert!(!secondary.belongs_to("customer", "customer"));
    }
}
