//! Bulk loading of record graphs through `LOAD DATA INFILE`.
//!
//! `infile` persists graphs of in-memory records by encoding every record
//! into a per-table text buffer and sending each buffer to the database in
//! one batched `LOAD DATA LOCAL INFILE` statement. Generated keys are
//! predicted locally so related rows can reference each other before
//! anything is written, and verified against the database after each flush.
//!
//! # Quick Start
//!
//! ```ignore
//! use infile::prelude::*;
//!
//! struct Customer {
//!     id: Option<i64>,
//!     name: String,
//! }
//!
//! impl Record for Customer {
//!     const TABLE_NAME: &'static str = "customer";
//!
//!     fn fields() -> &'static [FieldInfo] {
//!         static FIELDS: &[FieldInfo] = &[
//!             FieldInfo::new("id", "id", SqlType::BigInt)
//!                 .primary_key(true)
//!                 .auto_increment(true),
//!             FieldInfo::new("name", "name", SqlType::Text),
//!         ];
//!         FIELDS
//!     }
//!
//!     fn to_row(&self) -> Vec<(&'static str, Value)> {
//!         vec![("id", self.id.into()), ("name", self.name.clone().into())]
//!     }
//!
//!     fn id(&self) -> Option<i64> {
//!         self.id
//!     }
//!
//!     fn set_id(&mut self, id: i64) {
//!         self.id = Some(id);
//!     }
//! }
//!
//! let conn = MySqlConnection::connect(MySqlConfig::from_url("mysql://loader@localhost/shop")?)?;
//! let mut loader = HierarchicalLoader::open(conn, LoaderConfig::default())?;
//! let customer = shared(Customer { id: None, name: "Ada".into() });
//! loader.persist_one(&customer)?;
//! loader.close()?;
//! ```
//!
//! # Crates
//!
//! - `infile-core`: record metadata, values, the `Store` trait and errors
//! - `infile-loader`: buffers, encoders, per-table and hierarchical loaders
//! - `infile-mysql`: the MySQL `Store`

pub use infile_core::{
    AnyRecord, BulkLoad, ConfigError, ConnectionError, ConnectionErrorKind, ConsistencyError,
    EncodeError, EnumType, EnumValue, Error, FieldInfo, InfileFormat, InsertMode, MappingWarning,
    ProtocolError, QueryError, QueryErrorKind, Record, RecordIdentity, RecordRef, RecordType,
    Related, RelationshipInfo, RelationshipKind, Result, SecondaryTable, Shared, SqlEnum,
    SqlType, Store, TraversalError, TypeCheck, TypeInfo, Value, is_valid_identifier,
    quote_ident_mysql, quote_qualified_mysql, shared,
};

pub use infile_loader::{
    Checkpoint, Column, ColumnSource, EmbedMapping, EventCallback, FlushStats, FnCallback,
    HierarchicalLoader, InfileBuffer, LoaderConfig, NoOpCallback, PersistStats, TableBinding,
    TableLoader, TypeDependencies, enum_value_to_append, testing,
};

pub use infile_mysql::{MySqlConfig, MySqlConnection};

/// Everything needed to declare records and run a load.
pub mod prelude {
    pub use crate::{
        EnumType, Error, EventCallback, FieldInfo, FnCallback, HierarchicalLoader, InsertMode,
        LoaderConfig, MySqlConfig, MySqlConnection, Record, RecordRef, RecordType, Related,
        RelationshipInfo, Result, SecondaryTable, Shared, SqlEnum, SqlType, Store, Value,
        shared,
    };
}
