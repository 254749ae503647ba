//! The store collaborator.
//!
//! This module defines what the loader needs from a database:
//!
//! - [`Store`] - integrity toggling, batched loads and generated-key lookup
//! - [`BulkLoad`] - one batched-load request (table, columns, mode, format)
//! - [`InsertMode`] - strict insert or insert-or-replace
//! - [`InfileFormat`] - the encoded line format shared by encoder and store
//!
//! Everything is synchronous; a store call may block on I/O.

use std::io::Read;

use crate::error::Result;

/// How rows that collide with existing keys are treated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum InsertMode {
    /// Colliding rows are rejected by the store.
    #[default]
    Insert,
    /// Colliding rows replace the existing ones.
    Replace,
}

impl InsertMode {
    /// Keyword used in a `LOAD DATA` statement, if any.
    pub const fn as_sql(&self) -> Option<&'static str> {
        match self {
            InsertMode::Insert => None,
            InsertMode::Replace => Some("REPLACE"),
        }
    }
}

/// Byte-level layout of encoded rows.
///
/// The defaults match what `LOAD DATA` assumes when no `FIELDS`/`LINES`
/// clause is given: tab-separated fields, newline-terminated lines,
/// backslash escapes and `\N` for NULL.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InfileFormat {
    pub field_delimiter: u8,
    pub line_terminator: u8,
    pub escape: u8,
}

impl Default for InfileFormat {
    fn default() -> Self {
        Self {
            field_delimiter: b'\t',
            line_terminator: b'\n',
            escape: b'\\',
        }
    }
}

impl InfileFormat {
    /// Render the `FIELDS ... LINES ...` clause describing this format.
    ///
    /// ```
    /// use infile_core::InfileFormat;
    ///
    /// assert_eq!(
    ///     InfileFormat::default().clause(),
    ///     r"FIELDS TERMINATED BY '\t' ESCAPED BY '\\' LINES TERMINATED BY '\n'"
    /// );
    /// ```
    pub fn clause(&self) -> String {
        format!(
            "FIELDS TERMINATED BY {} ESCAPED BY {} LINES TERMINATED BY {}",
            byte_literal(self.field_delimiter),
            byte_literal(self.escape),
            byte_literal(self.line_terminator),
        )
    }

    /// Written in place of a NULL field: the escape byte followed by `N`.
    pub fn null_marker(&self) -> [u8; 2] {
        [self.escape, b'N']
    }

    /// Bytes that must be escaped inside a field value.
    pub fn is_special(&self, byte: u8) -> bool {
        byte == self.field_delimiter || byte == self.line_terminator || byte == self.escape
    }
}

/// Render one byte as a single-quoted SQL string literal.
fn byte_literal(byte: u8) -> String {
    match byte {
        b'\t' => r"'\t'".to_string(),
        b'\n' => r"'\n'".to_string(),
        b'\r' => r"'\r'".to_string(),
        0 => r"'\0'".to_string(),
        b'\\' => r"'\\'".to_string(),
        b'\'' => r"'\''".to_string(),
        b if b.is_ascii_graphic() || b == b' ' => format!("'{}'", b as char),
        b => format!("X'{:02X}'", b),
    }
}

/// A batched-load request for one table.
#[derive(Debug, Clone, Copy)]
pub struct BulkLoad<'a> {
    /// Target table.
    pub table: &'a str,
    /// Columns in the order fields appear in each line.
    pub columns: &'a [String],
    pub mode: InsertMode,
    pub format: InfileFormat,
}

/// The store-side collaborator of the loader.
///
/// Implementations own the connection. The loader never issues arbitrary
/// SQL; these three operations are all it needs.
pub trait Store {
    /// Enable or disable foreign-key/integrity checking for this connection.
    fn set_integrity_checks(&mut self, enabled: bool) -> Result<()>;

    /// Ingest the encoded rows in `rows` into `load.table`.
    ///
    /// Returns the number of rows the store reports as affected.
    fn load_rows(&mut self, load: &BulkLoad<'_>, rows: &mut dyn Read) -> Result<u64>;

    /// Most recently assigned value of the generated key `id_column` in
    /// `table`, or `None` for an empty table.
    fn last_generated_id(&mut self, table: &str, id_column: &str) -> Result<Option<i64>>;
}

impl<S: Store + ?Sized> Store for &mut S {
    fn set_integrity_checks(&mut self, enabled: bool) -> Result<()> {
        (**self).set_integrity_checks(enabled)
    }

    fn load_rows(&mut self, load: &BulkLoad<'_>, rows: &mut dyn Read) -> Result<u64> {
        (**self).load_rows(load, rows)
    }

    fn last_generated_id(&mut self, table: &str, id_column: &str) -> Result<Option<i64>> {
        (**self).last_generated_id(table, id_column)
    }
}

impl<S: Store + ?Sized> Store for Box<S> {
    fn set_integrity_checks(&mut self, enabled: bool) -> Result<()> {
        (**self).set_integrity_checks(enabled)
    }

    fn load_rows(&mut self, load: &BulkLoad<'_>, rows: &mut dyn Read) -> Result<u64> {
        (**self).load_rows(load, rows)
    }

    fn last_generated_id(&mut self, table: &str, id_column: &str) -> Result<Option<i64>> {
        (**self).last_generated_id(table, id_column)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_format() {
        let format = InfileFormat::default();
        assert_eq!(format.field_delimiter, b'\t');
        assert_eq!(format.line_terminator, b'\n');
        assert_eq!(format.null_marker(), *b"\\N");
        assert!(format.is_special(b'\\'));
        assert!(format.is_special(b'\t'));
        assert!(!format.is_special(b'a'));
    }

    #[test]
    fn test_custom_format_clause() {
        let format = InfileFormat {
            field_delimiter: b',',
            line_terminator: b'\n',
            escape: b'\\',
        };
        assert_eq!(
            format.clause(),
            r"FIELDS TERMINATED BY ',' ESCAPED BY '\\' LINES TERMINATED BY '\n'"
        );
    }

    #[test]
    fn test_null_marker_follows_escape() {
        let format = InfileFormat {
            escape: b'|',
            ..InfileFormat::default()
        };
        assert_eq!(format.null_marker(), *b"|N");
    }

    #[test]
    fn test_insert_mode_keyword() {
        assert_eq!(InsertMode::default(), InsertMode::Insert);
        assert_eq!(InsertMode::Insert.as_sql(), None);
        assert_eq!(InsertMode::Replace.as_sql(), Some("REPLACE"));
    }

    #[test]
    fn test_byte_literal_fallbacks() {
        assert_eq!(byte_literal(b'|'), "'|'");
        assert_eq!(byte_literal(b'\''), r"'\''");
        assert_eq!(byte_literal(0x1f), "X'1F'");
    }
}
