//! Core types and traits for infile bulk loading.
//!
//! This crate provides the metadata and collaborator abstractions the
//! loader is built on:
//!
//! - `Record` trait describing how a struct maps to its tables
//! - `FieldInfo`, `RelationshipInfo` and `SecondaryTable` declarations
//! - `Value` for dynamically typed field values, `SqlType` for columns
//! - `RecordRef` for type-erased, identity-compared record handles
//! - `Store` trait for the database side of a load

pub mod error;
pub mod field;
pub mod identifiers;
pub mod record;
pub mod relationship;
pub mod store;
pub mod types;
pub mod value;

pub use error::{
    ConfigError, ConnectionError, ConnectionErrorKind, ConsistencyError, EncodeError, Error,
    MappingWarning, ProtocolError, QueryError, QueryErrorKind, Result, TraversalError,
};
pub use field::{EnumType, FieldInfo};
pub use identifiers::{is_valid_identifier, quote_ident_mysql, quote_qualified_mysql};
pub use record::{AnyRecord, Record, RecordIdentity, RecordRef, RecordType, Related, Shared, shared};
pub use relationship::{RelationshipInfo, RelationshipKind, SecondaryTable};
pub use store::{BulkLoad, InfileFormat, InsertMode, Store};
pub use types::{SqlType, TypeCheck, TypeInfo};
pub use value::{EnumValue, SqlEnum, Value};
