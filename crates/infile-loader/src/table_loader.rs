//! Per-table loader.
//!
//! A [`TableLoader`] owns one binding and one buffer. `add` encodes a record
//! and, for tables whose key the store generates, hands the record a
//! predicted id straight away so dependent rows can reference it before
//! anything reaches the store. `flush` ships the buffer in one batched load
//! and checks the store's key against the prediction.

use std::borrow::Cow;
use std::io::Read;

use infile_core::{
    BulkLoad, ConsistencyError, EnumValue, Error, FieldInfo, InsertMode, MappingWarning,
    RecordRef, Result, Store,
};

use crate::binding::{EmbedMapping, TableBinding, enum_value_to_append};
use crate::buffer::InfileBuffer;
use crate::config::LoaderConfig;

/// Buffered loader bound to one physical table.
#[derive(Debug)]
pub struct TableLoader {
    binding: TableBinding,
    buffer: InfileBuffer,
    mode: InsertMode,
    verify_generated_ids: bool,
    /// Key reported by the store when the loader was created.
    id_base: i64,
    /// Next key to predict; `None` once the key type is exhausted.
    next_id: Option<i64>,
    /// Highest key the table should hold once everything is flushed.
    high_water: i64,
    /// Key reported by the store after the last flush.
    last_flushed_id: Option<i64>,
    warnings: Vec<MappingWarning>,
    rows_flushed: u64,
}

impl TableLoader {
    /// Create a loader, asking the store for the current key if the table
    /// generates one.
    #[tracing::instrument(level = "debug", skip(binding, config, store), fields(table = binding.table()))]
    pub fn new<S: Store + ?Sized>(
        binding: TableBinding,
        config: &LoaderConfig,
        store: &mut S,
    ) -> Result<Self> {
        let id_base = match binding.generated_id() {
            Some(id) => store
                .last_generated_id(binding.table(), id.column_name)?
                .unwrap_or(0),
            None => 0,
        };

        tracing::debug!(
            table = binding.table(),
            columns = binding.columns().len(),
            id_base = id_base,
            "Created table loader"
        );

        Ok(Self {
            buffer: InfileBuffer::with_capacity(config.format, config.buffer_capacity),
            binding,
            mode: config.mode,
            verify_generated_ids: config.verify_generated_ids,
            id_base,
            next_id: id_base.checked_add(1),
            high_water: id_base,
            last_flushed_id: None,
            warnings: Vec::new(),
            rows_flushed: 0,
        })
    }

    /// Encode `record` into the buffer.
    ///
    /// On a generated-key table a record without an id is given the next
    /// predicted id; a record that already has one keeps it.
    pub fn add(&mut self, record: &RecordRef) -> Result<()> {
        if !self.is_auto_generate_id() {
            return self
                .binding
                .encode_into(&mut self.buffer, record, None, &mut self.warnings);
        }

        match record.id()? {
            Some(explicit) => {
                self.binding
                    .encode_into(&mut self.buffer, record, Some(explicit), &mut self.warnings)?;
                // the store's counter moves past explicit keys too
                self.next_id = self
                    .next_id
                    .zip(explicit.checked_add(1))
                    .map(|(next, after)| next.max(after));
                self.high_water = self.high_water.max(explicit);
            }
            None => {
                let predicted = self.next_id.ok_or_else(|| self.exhausted())?;
                self.binding.encode_into(
                    &mut self.buffer,
                    record,
                    Some(predicted),
                    &mut self.warnings,
                )?;
                record.set_id(predicted)?;
                tracing::trace!(
                    table = self.binding.table(),
                    id = predicted,
                    "Assigned predicted id"
                );
                self.next_id = predicted.checked_add(1);
                self.high_water = self.high_water.max(predicted);
            }
        }
        Ok(())
    }

    fn exhausted(&self) -> Error {
        Error::config(
            self.binding.record().short_name(),
            format!(
                "generated key of table '{}' has no values left after {}",
                self.binding.table(),
                self.high_water
            ),
        )
    }

    /// Send the buffered rows to the store.
    ///
    /// Returns the number of rows sent; an empty buffer sends nothing.
    #[tracing::instrument(level = "debug", skip(self, store), fields(table = self.binding.table()))]
    pub fn flush<S: Store + ?Sized>(&mut self, store: &mut S) -> Result<u64> {
        if self.buffer.is_empty() {
            tracing::trace!(table = self.binding.table(), "Nothing to flush");
            return Ok(0);
        }

        let rows = self.buffer.row_count() as u64;
        let load = BulkLoad {
            table: self.binding.table(),
            columns: self.binding.column_names(),
            mode: self.mode,
            format: *self.buffer.format(),
        };
        // Terminate the last line too; an empty final line is otherwise
        // indistinguishable from end of input.
        let terminator = [load.format.line_terminator];
        let mut reader = self.buffer.as_bytes().chain(&terminator[..]);
        let affected = store.load_rows(&load, &mut reader)?;
        self.buffer.clear();
        self.rows_flushed += rows;

        tracing::info!(
            table = self.binding.table(),
            rows = rows,
            affected = affected,
            "Flushed table"
        );

        if let Some(id) = self.binding.generated_id() {
            if self.verify_generated_ids {
                let actual = store.last_generated_id(self.binding.table(), id.column_name)?;
                self.last_flushed_id = actual;
                if actual.unwrap_or(0) != self.high_water {
                    tracing::warn!(
                        table = self.binding.table(),
                        expected = self.high_water,
                        actual = ?actual,
                        "Generated id drift"
                    );
                    return Err(Error::Consistency(ConsistencyError {
                        table: self.binding.table().to_string(),
                        expected: self.high_water,
                        actual,
                    }));
                }
            }
        }

        Ok(rows)
    }

    pub fn binding(&self) -> &TableBinding {
        &self.binding
    }

    pub fn table(&self) -> &'static str {
        self.binding.table()
    }

    /// Column names in line order.
    pub fn columns(&self) -> &[String] {
        self.binding.column_names()
    }

    pub fn embeds(&self) -> &[EmbedMapping] {
        self.binding.embeds()
    }

    /// Does this loader predict store-generated keys?
    pub fn is_auto_generate_id(&self) -> bool {
        self.binding.generated_id().is_some()
    }

    /// Key the store reported when this loader was created.
    pub fn generated_id_base(&self) -> i64 {
        self.id_base
    }

    /// Key the store reported after the last verified flush.
    pub fn last_flushed_id(&self) -> Option<i64> {
        self.last_flushed_id
    }

    pub fn warnings(&self) -> &[MappingWarning] {
        &self.warnings
    }

    /// Rows currently buffered.
    pub fn row_count(&self) -> usize {
        self.buffer.row_count()
    }

    /// Rows sent to the store so far.
    pub fn rows_flushed(&self) -> u64 {
        self.rows_flushed
    }

    pub fn buffer(&self) -> &InfileBuffer {
        &self.buffer
    }

    pub fn mode(&self) -> InsertMode {
        self.mode
    }

    /// Text this loader writes for an enum value of `field`.
    pub fn enum_value_to_append(&self, field: &FieldInfo, value: &EnumValue) -> Cow<'static, str> {
        enum_value_to_append(field, value)
    }
}
