//! Hierarchical bulk loading through `LOAD DATA INFILE`.
//!
//! `infile-loader` turns graphs of [`Record`](infile_core::Record)s into
//! batched loads, one per table:
//!
//! - [`InfileBuffer`] accumulates encoded rows for one table.
//! - [`TableBinding`] fixes a record type's columns and encodes records.
//! - [`TableLoader`] owns a binding and a buffer, predicts generated keys
//!   and flushes to a [`Store`](infile_core::Store).
//! - [`HierarchicalLoader`] walks record graphs in dependency order and
//!   drives one loader per table.
//!
//! The [`testing`] module provides [`RecordingStore`](testing::RecordingStore),
//! an in-memory store for tests.

pub mod binding;
pub mod buffer;
pub mod callback;
pub mod config;
pub mod hierarchy;
pub mod table_loader;
pub mod testing;

pub use binding::{Column, ColumnSource, EmbedMapping, TableBinding, enum_value_to_append};
pub use buffer::{Checkpoint, InfileBuffer};
pub use callback::{EventCallback, FnCallback, NoOpCallback};
pub use config::LoaderConfig;
pub use hierarchy::{FlushStats, HierarchicalLoader, PersistStats, TypeDependencies};
pub use table_loader::TableLoader;
