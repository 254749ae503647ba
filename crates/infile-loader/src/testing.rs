//! In-memory [`Store`] for tests.
//!
//! [`RecordingStore`] records every statement it is asked to run, keeps the
//! bytes of every batched load, and answers generated-key queries the way a
//! real table would: the highest key among the seeded value and the rows
//! loaded so far.

use std::collections::HashMap;
use std::io::Read;

use infile_core::{
    BulkLoad, Error, InfileFormat, InsertMode, QueryError, QueryErrorKind, Result, Store,
    quote_ident_mysql, quote_qualified_mysql,
};

/// One batched load received by a [`RecordingStore`].
#[derive(Debug, Clone)]
pub struct RecordedLoad {
    pub table: String,
    pub columns: Vec<String>,
    pub mode: InsertMode,
    pub format: InfileFormat,
    pub data: Vec<u8>,
}

impl RecordedLoad {
    /// The raw bytes as text.
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.data).into_owned()
    }

    /// Rows split and un-escaped; `None` is NULL.
    pub fn rows(&self) -> Vec<Vec<Option<String>>> {
        decode_rows(&self.data, &self.format)
    }

    /// Values of one column across all rows.
    pub fn column(&self, name: &str) -> Vec<Option<String>> {
        let Some(index) = self.columns.iter().position(|c| c == name) else {
            return Vec::new();
        };
        self.rows()
            .into_iter()
            .map(|row| row.get(index).cloned().flatten())
            .collect()
    }
}

/// Statement-recording store double.
#[derive(Debug)]
pub struct RecordingStore {
    statements: Vec<String>,
    loads: Vec<RecordedLoad>,
    seeded_ids: HashMap<String, i64>,
    integrity_checks: bool,
    fail_loads: bool,
}

impl Default for RecordingStore {
    fn default() -> Self {
        Self::new()
    }
}

impl RecordingStore {
    pub fn new() -> Self {
        Self {
            statements: Vec::new(),
            loads: Vec::new(),
            seeded_ids: HashMap::new(),
            integrity_checks: true,
            fail_loads: false,
        }
    }

    /// Pretend `table` already holds rows up to key `max_id`.
    pub fn with_generated_id(mut self, table: &str, max_id: i64) -> Self {
        self.seeded_ids.insert(table.to_string(), max_id);
        self
    }

    /// Simulate another client inserting a row with key `id`.
    pub fn simulate_external_insert(&mut self, table: &str, id: i64) {
        let entry = self.seeded_ids.entry(table.to_string()).or_insert(id);
        *entry = (*entry).max(id);
    }

    /// Make every following load fail.
    pub fn fail_loads(&mut self, fail: bool) {
        self.fail_loads = fail;
    }

    pub fn statements(&self) -> &[String] {
        &self.statements
    }

    /// Number of recorded statements starting with `prefix`.
    pub fn count(&self, prefix: &str) -> usize {
        self.statements
            .iter()
            .filter(|s| s.starts_with(prefix))
            .count()
    }

    pub fn loads(&self) -> &[RecordedLoad] {
        &self.loads
    }

    /// Loads into `table`, oldest first.
    pub fn loads_for<'a>(&'a self, table: &'a str) -> impl Iterator<Item = &'a RecordedLoad> + 'a {
        self.loads.iter().filter(move |l| l.table == table)
    }

    pub fn integrity_checks_enabled(&self) -> bool {
        self.integrity_checks
    }

    fn max_loaded_id(&self, table: &str, id_column: &str) -> Option<i64> {
        self.loads_for(table)
            .flat_map(|load| load.column(id_column))
            .filter_map(|v| v.and_then(|s| s.parse::<i64>().ok()))
            .max()
    }
}

impl Store for RecordingStore {
    fn set_integrity_checks(&mut self, enabled: bool) -> Result<()> {
        self.statements.push(format!(
            "SET FOREIGN_KEY_CHECKS = {}",
            if enabled { 1 } else { 0 }
        ));
        self.integrity_checks = enabled;
        Ok(())
    }

    fn load_rows(&mut self, load: &BulkLoad<'_>, rows: &mut dyn Read) -> Result<u64> {
        let sql = format!(
            "LOAD DATA LOCAL INFILE 'stream' {}INTO TABLE {} ({})",
            load.mode.as_sql().map(|m| format!("{} ", m)).unwrap_or_default(),
            quote_qualified_mysql(load.table),
            load.columns
                .iter()
                .map(|c| quote_ident_mysql(c))
                .collect::<Vec<_>>()
                .join(", ")
        );
        self.statements.push(sql.clone());

        if self.fail_loads {
            return Err(Error::Query(QueryError {
                kind: QueryErrorKind::Database,
                sql: Some(sql),
                sqlstate: Some("HY000".to_string()),
                message: "simulated load failure".to_string(),
                source: None,
            }));
        }

        let mut data = Vec::new();
        rows.read_to_end(&mut data)?;
        let recorded = RecordedLoad {
            table: load.table.to_string(),
            columns: load.columns.to_vec(),
            mode: load.mode,
            format: load.format,
            data,
        };
        let count = recorded.rows().len() as u64;
        self.loads.push(recorded);
        Ok(count)
    }

    fn last_generated_id(&mut self, table: &str, id_column: &str) -> Result<Option<i64>> {
        self.statements.push(format!(
            "SELECT MAX({}) FROM {}",
            quote_ident_mysql(id_column),
            quote_qualified_mysql(table)
        ));
        let seeded = self.seeded_ids.get(table).copied();
        let loaded = self.max_loaded_id(table, id_column);
        Ok(seeded.max(loaded))
    }
}

/// Split encoded rows back into fields, undoing the escaping.
///
/// Reads input the way `LOAD DATA` does: a final terminator ends the last
/// row, and an empty unterminated tail is not a row.
pub fn decode_rows(data: &[u8], format: &InfileFormat) -> Vec<Vec<Option<String>>> {
    if data.is_empty() {
        return Vec::new();
    }

    let mut rows = Vec::new();
    let mut row = Vec::new();
    let mut field: Vec<u8> = Vec::new();
    let mut null = false;
    let mut bytes = data.iter().copied();

    let finish = |field: &mut Vec<u8>, null: &mut bool, row: &mut Vec<Option<String>>| {
        let value = if *null && field.is_empty() {
            None
        } else {
            Some(String::from_utf8_lossy(field).into_owned())
        };
        row.push(value);
        field.clear();
        *null = false;
    };

    while let Some(byte) = bytes.next() {
        if byte == format.escape {
            match bytes.next() {
                Some(b'N') if field.is_empty() => null = true,
                Some(b'0') => field.push(0),
                Some(b'r') => field.push(b'\r'),
                Some(b'n') => field.push(b'\n'),
                Some(b't') => field.push(b'\t'),
                Some(other) => field.push(other),
                None => field.push(byte),
            }
        } else if byte == format.field_delimiter {
            finish(&mut field, &mut null, &mut row);
        } else if byte == format.line_terminator {
            finish(&mut field, &mut null, &mut row);
            rows.push(std::mem::take(&mut row));
        } else {
            field.push(byte);
        }
    }
    // an unterminated tail is a row only if it holds something
    if null || !field.is_empty() || !row.is_empty() {
        finish(&mut field, &mut null, &mut row);
        rows.push(row);
    }
    rows
}
