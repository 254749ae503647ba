//! Record trait and type-erased record handles.
//!
//! A [`Record`] describes how a struct maps to its table: columns, the
//! store-generated key, secondary tables and relationships. Records live in
//! shared handles ([`Shared`]) so that a graph of records can reference each
//! other, including cyclically; the loader walks that graph through
//! [`RecordRef`], which erases the concrete type and compares by identity.

use crate::error::{Error, Result};
use crate::field::FieldInfo;
use crate::relationship::{RelationshipInfo, SecondaryTable};
use crate::value::Value;
use std::any::{Any, TypeId};
use std::fmt;
use std::sync::{Arc, RwLock};

/// Shared, mutable handle to a record.
pub type Shared<T> = Arc<RwLock<T>>;

/// Wrap a record in a [`Shared`] handle.
pub fn shared<T: Record>(record: T) -> Shared<T> {
    Arc::new(RwLock::new(record))
}

/// Trait for types that can be bulk-loaded into a table.
///
/// # Example
///
/// ```
/// use infile_core::{FieldInfo, Record, SqlType, Value};
///
/// struct Customer {
///     id: Option<i64>,
///     name: Option<String>,
/// }
///
/// impl Record for Customer {
///     const TABLE_NAME: &'static str = "customer";
///
///     fn fields() -> &'static [FieldInfo] {
///         static FIELDS: &[FieldInfo] = &[
///             FieldInfo::new("id", "id", SqlType::BigInt)
///                 .primary_key(true)
///                 .auto_increment(true),
///             FieldInfo::new("name", "name", SqlType::VarChar(64)).nullable(true),
///         ];
///         FIELDS
///     }
///
///     fn to_row(&self) -> Vec<(&'static str, Value)> {
///         vec![("id", self.id.into()), ("name", self.name.clone().into())]
///     }
///
///     fn id(&self) -> Option<i64> {
///         self.id
///     }
///
///     fn set_id(&mut self, id: i64) {
///         self.id = Some(id);
///     }
/// }
/// ```
pub trait Record: Send + Sync + Sized + 'static {
    /// The primary table.
    const TABLE_NAME: &'static str;

    /// Relationship metadata for this record.
    const RELATIONSHIPS: &'static [RelationshipInfo] = &[];

    /// Additional tables holding part of this record's columns.
    const SECONDARY_TABLES: &'static [SecondaryTable] = &[];

    /// Get field metadata for all columns, in column order.
    fn fields() -> &'static [FieldInfo];

    /// Current field values keyed by field name.
    fn to_row(&self) -> Vec<(&'static str, Value)>;

    /// The primary key value, if set.
    fn id(&self) -> Option<i64> {
        None
    }

    /// Assign the primary key.
    #[allow(unused_variables)]
    fn set_id(&mut self, id: i64) {}

    /// Resolve a relationship declared in [`RELATIONSHIPS`](Self::RELATIONSHIPS).
    fn related(&self, name: &str) -> Result<Related> {
        Err(Error::traversal(
            std::any::type_name::<Self>(),
            Some(name),
            "no such relationship",
        ))
    }
}

/// Static metadata of a record type, usable without an instance.
#[derive(Debug, Clone, Copy)]
pub struct RecordType {
    pub type_id: TypeId,
    pub type_name: &'static str,
    pub table: &'static str,
    pub fields: &'static [FieldInfo],
    pub relationships: &'static [RelationshipInfo],
    pub secondary_tables: &'static [SecondaryTable],
}

impl RecordType {
    /// Metadata of `T`.
    pub fn of<T: Record>() -> Self {
        Self {
            type_id: TypeId::of::<T>(),
            type_name: std::any::type_name::<T>(),
            table: T::TABLE_NAME,
            fields: T::fields(),
            relationships: T::RELATIONSHIPS,
            secondary_tables: T::SECONDARY_TABLES,
        }
    }

    /// The store-generated key field, if the table has one.
    pub fn generated_id(&self) -> Option<&'static FieldInfo> {
        self.fields.iter().find(|f| f.is_generated_id())
    }

    /// The primary key field.
    pub fn primary_key(&self) -> Option<&'static FieldInfo> {
        self.fields.iter().find(|f| f.primary_key)
    }

    /// Find a relationship by name.
    pub fn relationship(&self, name: &str) -> Option<&'static RelationshipInfo> {
        self.relationships.iter().find(|r| r.name == name)
    }

    /// Type name without the module path.
    pub fn short_name(&self) -> &'static str {
        self.type_name.rsplit("::").next().unwrap_or(self.type_name)
    }
}

impl PartialEq for RecordType {
    fn eq(&self, other: &Self) -> bool {
        self.type_id == other.type_id
    }
}

impl Eq for RecordType {}

/// Result of resolving a relationship on one record.
#[derive(Debug, Clone, Default)]
pub enum Related {
    /// Nothing is related.
    #[default]
    None,
    /// A single related record.
    One(RecordRef),
    /// A collection of related records.
    Many(Vec<RecordRef>),
}

impl Related {
    /// Wrap an optional single reference.
    pub fn one<T: Record>(record: Option<&Shared<T>>) -> Self {
        record.map_or(Related::None, |r| Related::One(RecordRef::new(r)))
    }

    /// Wrap a collection.
    pub fn many<T: Record>(records: &[Shared<T>]) -> Self {
        Related::Many(records.iter().map(RecordRef::new).collect())
    }

    pub fn is_none(&self) -> bool {
        matches!(self, Related::None)
    }
}

/// Object-safe view of a shared record.
///
/// Implemented for `RwLock<T>` of every [`Record`]; callers use
/// [`RecordRef`] rather than this trait directly.
pub trait AnyRecord: Send + Sync {
    fn record_type(&self) -> RecordType;
    fn to_row(&self) -> Result<Vec<(&'static str, Value)>>;
    fn id(&self) -> Result<Option<i64>>;
    fn set_id(&self, id: i64) -> Result<()>;
    fn related(&self, name: &str) -> Result<Related>;
    fn as_any(&self) -> &dyn Any;
}

fn poisoned<T>() -> Error {
    Error::traversal(std::any::type_name::<T>(), None, "record lock poisoned")
}

impl<T: Record> AnyRecord for RwLock<T> {
    fn record_type(&self) -> RecordType {
        RecordType::of::<T>()
    }

    fn to_row(&self) -> Result<Vec<(&'static str, Value)>> {
        let guard = self.read().map_err(|_| poisoned::<T>())?;
        Ok(guard.to_row())
    }

    fn id(&self) -> Result<Option<i64>> {
        let guard = self.read().map_err(|_| poisoned::<T>())?;
        Ok(guard.id())
    }

    fn set_id(&self, id: i64) -> Result<()> {
        let mut guard = self.write().map_err(|_| poisoned::<T>())?;
        guard.set_id(id);
        Ok(())
    }

    fn related(&self, name: &str) -> Result<Related> {
        let guard = self.read().map_err(|_| poisoned::<T>())?;
        guard.related(name)
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// Identity of a record instance (its allocation), never its field values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RecordIdentity(usize);

/// Type-erased handle to a shared record.
#[derive(Clone)]
pub struct RecordRef(Arc<dyn AnyRecord>);

impl RecordRef {
    /// Erase a shared record.
    pub fn new<T: Record>(record: &Shared<T>) -> Self {
        let erased: Arc<dyn AnyRecord> = record.clone();
        RecordRef(erased)
    }

    /// Allocation identity of the underlying record.
    pub fn identity(&self) -> RecordIdentity {
        RecordIdentity(Arc::as_ptr(&self.0).cast::<()>() as usize)
    }

    /// Do both handles point at the same record?
    pub fn ptr_eq(&self, other: &RecordRef) -> bool {
        self.identity() == other.identity()
    }

    pub fn record_type(&self) -> RecordType {
        self.0.record_type()
    }

    /// `TypeId` of the record type itself (not of its lock).
    pub fn type_id(&self) -> TypeId {
        self.0.record_type().type_id
    }

    pub fn to_row(&self) -> Result<Vec<(&'static str, Value)>> {
        self.0.to_row()
    }

    pub fn id(&self) -> Result<Option<i64>> {
        self.0.id()
    }

    pub fn set_id(&self, id: i64) -> Result<()> {
        self.0.set_id(id)
    }

    pub fn related(&self, name: &str) -> Result<Related> {
        self.0.related(name)
    }

    /// Borrow the concrete record lock, if `T` is the record's type.
    pub fn downcast<T: Record>(&self) -> Option<&RwLock<T>> {
        self.0.as_any().downcast_ref::<RwLock<T>>()
    }
}

impl<T: Record> From<&Shared<T>> for RecordRef {
    fn from(record: &Shared<T>) -> Self {
        RecordRef::new(record)
    }
}

impl<T: Record> From<Shared<T>> for RecordRef {
    fn from(record: Shared<T>) -> Self {
        RecordRef::new(&record)
    }
}

impl fmt::Debug for RecordRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}@{:#x}",
            self.record_type().short_name(),
            self.identity().0
        )
    }
}
