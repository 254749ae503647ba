//! Loader configuration.

use std::any::TypeId;
use std::collections::HashSet;

use infile_core::{InfileFormat, InsertMode, Record};

/// Settings shared by every table loader of a session.
#[derive(Debug, Clone)]
pub struct LoaderConfig {
    /// Insert or insert-or-replace.
    pub mode: InsertMode,
    /// Record types never written, nor traversed through.
    pub ignored_types: HashSet<TypeId>,
    /// Secondary tables that get no loader.
    pub ignored_secondary_tables: HashSet<String>,
    /// Compare predicted ids with the store after every flush.
    pub verify_generated_ids: bool,
    /// Line format of the encoded rows.
    pub format: InfileFormat,
    /// Initial buffer capacity per loader, in bytes.
    pub buffer_capacity: usize,
}

impl Default for LoaderConfig {
    fn default() -> Self {
        Self {
            mode: InsertMode::Insert,
            ignored_types: HashSet::new(),
            ignored_secondary_tables: HashSet::new(),
            verify_generated_ids: true,
            format: InfileFormat::default(),
            buffer_capacity: 8 * 1024,
        }
    }
}

impl LoaderConfig {
    /// Create a new config with defaults.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the insert mode.
    pub fn mode(mut self, mode: InsertMode) -> Self {
        self.mode = mode;
        self
    }

    /// Use insert-or-replace instead of strict insert.
    pub fn replace(self, replace: bool) -> Self {
        self.mode(if replace {
            InsertMode::Replace
        } else {
            InsertMode::Insert
        })
    }

    /// Skip records of type `T`.
    pub fn ignore_type<T: Record>(mut self) -> Self {
        self.ignored_types.insert(TypeId::of::<T>());
        self
    }

    /// Skip the secondary table `name`.
    pub fn ignore_secondary_table(mut self, name: impl Into<String>) -> Self {
        self.ignored_secondary_tables.insert(name.into());
        self
    }

    /// Enable or disable the post-flush generated id check.
    pub fn verify_generated_ids(mut self, verify: bool) -> Self {
        self.verify_generated_ids = verify;
        self
    }

    /// Set the line format.
    pub fn format(mut self, format: InfileFormat) -> Self {
        self.format = format;
        self
    }

    /// Set the initial buffer capacity.
    pub fn buffer_capacity(mut self, bytes: usize) -> Self {
        self.buffer_capacity = bytes;
        self
    }

    pub fn is_ignored_type(&self, type_id: TypeId) -> bool {
        self.ignored_types.contains(&type_id)
    }

    pub fn is_ignored_secondary_table(&self, name: &str) -> bool {
        self.ignored_secondary_tables.contains(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use infile_core::{FieldInfo, Value};

    struct Audit;

    impl Record for Audit {
        const TABLE_NAME: &'static str = "audit";

        fn fields() -> &'static [FieldInfo] {
            &[]
        }

        fn to_row(&self) -> Vec<(&'static str, Value)> {
            Vec::new()
        }
    }

    #[test]
    fn test_defaults() {
        let config = LoaderConfig::default();
        assert_eq!(config.mode, InsertMode::Insert);
        assert!(config.verify_generated_ids);
        assert!(config.ignored_types.is_empty());
        assert_eq!(config.format, InfileFormat::default());
    }

    #[test]
    fn test_builder_chain() {
        let config = LoaderConfig::new()
            .replace(true)
            .ignore_type::<Audit>()
            .ignore_secondary_table("audit_detail")
            .verify_generated_ids(false)
            .buffer_capacity(16);

        assert_eq!(config.mode, InsertMode::Replace);
        assert!(config.is_ignored_type(TypeId::of::<Audit>()));
        assert!(config.is_ignored_secondary_table("audit_detail"));
        assert!(!config.is_ignored_secondary_table("audit"));
        assert!(!config.verify_generated_ids);
        assert_eq!(config.buffer_capacity, 16);
    }
}
