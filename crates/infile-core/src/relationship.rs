//! Relationship metadata.
//!
//! Relationships are declared statically on each [`Record`](crate::Record)
//! as a slice of [`RelationshipInfo`]. The loader classifies every
//! relationship as *child-dependent* (persisted before the owner, because the
//! owner's row stores the related key) or *parent-dependent* (persisted after
//! the owner, because the related rows store the owner's key).

use crate::record::RecordType;

/// The type of relationship between two records.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelationshipKind {
    /// Many-to-one: many `Order`s reference one `Customer`.
    ManyToOne,
    /// One-to-many: one `Customer` has many `Order`s.
    OneToMany,
    /// One-to-one: `Customer` has one `Contact`.
    OneToOne,
}

/// Metadata about a relationship between records.
#[derive(Debug, Clone, Copy)]
pub struct RelationshipInfo {
    /// Name of the relationship, passed back to [`Record::related`](crate::Record::related).
    pub name: &'static str,

    /// Kind of relationship.
    pub kind: RelationshipKind,

    /// Metadata of the related record type.
    pub target: fn() -> RecordType,

    /// Column in the owner's table holding the related record's id.
    ///
    /// Only meaningful for child-dependent relationships.
    pub join_column: Option<&'static str>,

    /// One-to-one sharing the owner's primary key.
    ///
    /// The related record is written after the owner and receives the
    /// owner's id as its own.
    pub primary_key_join: bool,
}

impl RelationshipInfo {
    /// Create a new relationship.
    pub const fn new(
        name: &'static str,
        kind: RelationshipKind,
        target: fn() -> RecordType,
    ) -> Self {
        Self {
            name,
            kind,
            target,
            join_column: None,
            primary_key_join: false,
        }
    }

    /// Many-to-one reference stored in `join_column`.
    pub const fn many_to_one(
        name: &'static str,
        target: fn() -> RecordType,
        join_column: &'static str,
    ) -> Self {
        Self::new(name, RelationshipKind::ManyToOne, target).join_column(join_column)
    }

    /// One-to-many collection.
    pub const fn one_to_many(name: &'static str, target: fn() -> RecordType) -> Self {
        Self::new(name, RelationshipKind::OneToMany, target)
    }

    /// One-to-one.
    pub const fn one_to_one(name: &'static str, target: fn() -> RecordType) -> Self {
        Self::new(name, RelationshipKind::OneToOne, target)
    }

    /// Set the join column.
    pub const fn join_column(mut self, column: &'static str) -> Self {
        self.join_column = Some(column);
        self
    }

    /// Mark a one-to-one as sharing the owner's primary key.
    pub const fn primary_key_join(mut self, value: bool) -> Self {
        self.primary_key_join = value;
        self
    }

    /// Must the related record be written before the owner?
    ///
    /// Many-to-one, and one-to-one without a shared primary key.
    pub const fn is_child_dependent(&self) -> bool {
        match self.kind {
            RelationshipKind::ManyToOne => true,
            RelationshipKind::OneToOne => !self.primary_key_join,
            RelationshipKind::OneToMany => false,
        }
    }

    /// Must the related record be written after the owner?
    ///
    /// One-to-many, and one-to-one with a shared primary key.
    pub const fn is_parent_dependent(&self) -> bool {
        match self.kind {
            RelationshipKind::OneToMany => true,
            RelationshipKind::OneToOne => self.primary_key_join,
            RelationshipKind::ManyToOne => false,
        }
    }
}

/// An additional table holding part of a record's columns.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SecondaryTable {
    /// Table name.
    pub name: &'static str,
    /// Column receiving the owner's id.
    pub pk_join_column: &'static str,
}

impl SecondaryTable {
    pub const fn new(name: &'static str, pk_join_column: &'static str) -> Self {
        Self {
            name,
            pk_join_column,
        }
    }
}
