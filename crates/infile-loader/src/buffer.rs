//! Row buffer for one target table.
//!
//! Rows are written field by field in the infile line format: fields joined
//! by the delimiter, NULL as the two-byte marker, special bytes escaped.
//! The terminator separates rows, so the buffer never ends with one.

use infile_core::InfileFormat;

/// Growable byte buffer of encoded rows.
#[derive(Debug, Clone)]
pub struct InfileBuffer {
    format: InfileFormat,
    bytes: Vec<u8>,
    rows: usize,
    fields_in_row: usize,
}

/// Position to roll back to when a row fails half-way.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Checkpoint {
    len: usize,
    rows: usize,
}

impl Default for InfileBuffer {
    fn default() -> Self {
        Self::new(InfileFormat::default())
    }
}

impl InfileBuffer {
    pub fn new(format: InfileFormat) -> Self {
        Self {
            format,
            bytes: Vec::new(),
            rows: 0,
            fields_in_row: 0,
        }
    }

    pub fn with_capacity(format: InfileFormat, capacity: usize) -> Self {
        Self {
            bytes: Vec::with_capacity(capacity),
            ..Self::new(format)
        }
    }

    pub fn format(&self) -> &InfileFormat {
        &self.format
    }

    /// Append one complete row. `None` fields are written as NULL.
    pub fn append<'a, I>(&mut self, fields: I)
    where
        I: IntoIterator<Item = Option<&'a [u8]>>,
    {
        self.begin_row();
        for field in fields {
            match field {
                Some(bytes) => self.append_field(bytes),
                None => self.append_null(),
            }
        }
        self.end_row();
    }

    /// Start a new row.
    pub fn begin_row(&mut self) {
        if self.rows > 0 {
            self.bytes.push(self.format.line_terminator);
        }
        self.fields_in_row = 0;
    }

    /// Finish the current row.
    pub fn end_row(&mut self) {
        self.rows += 1;
    }

    fn separate(&mut self) {
        if self.fields_in_row > 0 {
            self.bytes.push(self.format.field_delimiter);
        }
        self.fields_in_row += 1;
    }

    /// Append the NULL marker as the next field.
    pub fn append_null(&mut self) {
        self.separate();
        self.bytes.extend_from_slice(&self.format.null_marker());
    }

    /// Append a field value, escaping special bytes.
    pub fn append_field(&mut self, value: &[u8]) {
        self.separate();
        let escape = self.format.escape;
        for &byte in value {
            if self.format.is_special(byte) {
                self.bytes.push(escape);
                self.bytes.push(byte);
            } else if byte == b'\r' {
                self.bytes.extend_from_slice(&[escape, b'r']);
            } else if byte == 0 {
                self.bytes.extend_from_slice(&[escape, b'0']);
            } else {
                self.bytes.push(byte);
            }
        }
    }

    /// Append a field known to contain no special bytes (numbers, dates).
    pub fn append_raw(&mut self, value: &[u8]) {
        debug_assert!(!value.iter().any(|b| self.format.is_special(*b)));
        self.separate();
        self.bytes.extend_from_slice(value);
    }

    pub fn checkpoint(&self) -> Checkpoint {
        Checkpoint {
            len: self.bytes.len(),
            rows: self.rows,
        }
    }

    /// Drop everything written after `checkpoint`.
    pub fn rollback(&mut self, checkpoint: Checkpoint) {
        self.bytes.truncate(checkpoint.len);
        self.rows = checkpoint.rows;
        self.fields_in_row = 0;
    }

    /// Current contents, ready to be streamed to the store.
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows == 0
    }

    pub fn row_count(&self) -> usize {
        self.rows
    }

    /// Reset to empty, keeping the allocation.
    pub fn clear(&mut self) {
        self.bytes.clear();
        self.rows = 0;
        self.fields_in_row = 0;
    }
}
