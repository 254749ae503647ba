//! [`Store`] implementation for [`MySqlConnection`].

use std::io::{Read, Write};

use infile_core::{
    BulkLoad, Error, ProtocolError, Result, Store, quote_ident_mysql, quote_qualified_mysql,
};

use crate::connection::MySqlConnection;

/// Name announced in the statement; the server echoes it back in its file
/// request and the client answers with the buffered rows.
pub const INFILE_NAME: &str = "stream";

/// Render the `LOAD DATA LOCAL INFILE` statement for one batched load.
pub fn load_statement(load: &BulkLoad<'_>) -> String {
    let mut sql = format!("LOAD DATA LOCAL INFILE '{INFILE_NAME}' ");
    if let Some(keyword) = load.mode.as_sql() {
        sql.push_str(keyword);
        sql.push(' ');
    }
    sql.push_str("INTO TABLE ");
    sql.push_str(&quote_qualified_mysql(load.table));
    sql.push_str(" CHARACTER SET utf8mb4 ");
    sql.push_str(&load.format.clause());
    sql.push_str(" (");
    for (i, column) in load.columns.iter().enumerate() {
        if i > 0 {
            sql.push_str(", ");
        }
        sql.push_str(&quote_ident_mysql(column));
    }
    sql.push(')');
    sql
}

pub fn integrity_statement(enabled: bool) -> &'static str {
    if enabled {
        "SET FOREIGN_KEY_CHECKS = 1"
    } else {
        "SET FOREIGN_KEY_CHECKS = 0"
    }
}

pub fn max_id_statement(table: &str, id_column: &str) -> String {
    format!(
        "SELECT MAX({}) FROM {}",
        quote_ident_mysql(id_column),
        quote_qualified_mysql(table)
    )
}

impl<S: Read + Write> Store for MySqlConnection<S> {
    fn set_integrity_checks(&mut self, enabled: bool) -> Result<()> {
        self.execute(integrity_statement(enabled)).map(|_| ())
    }

    fn load_rows(&mut self, load: &BulkLoad<'_>, rows: &mut dyn Read) -> Result<u64> {
        let sql = load_statement(load);
        let loaded = self.load_local_infile(&sql, rows)?;
        if self.warnings() > 0 {
            tracing::warn!(
                table = load.table,
                warnings = self.warnings(),
                "server reported warnings for load"
            );
        }
        Ok(loaded)
    }

    fn last_generated_id(&mut self, table: &str, id_column: &str) -> Result<Option<i64>> {
        let sql = max_id_statement(table, id_column);
        let rows = self.query(&sql)?;
        let Some(value) = rows.into_iter().next().and_then(|row| row.into_iter().next()) else {
            return Ok(None);
        };
        value
            .map(|text| {
                text.parse::<i64>().map_err(|_| {
                    Error::Protocol(ProtocolError {
                        message: format!("{sql} returned non-integer '{text}'"),
                        raw_data: None,
                    })
                })
            })
            .transpose()
    }
}
