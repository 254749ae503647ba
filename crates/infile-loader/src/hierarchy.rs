//! Hierarchical persistence of record graphs.
//!
//! [`HierarchicalLoader`] walks a graph of records depth-first and feeds
//! every record to the loader of its table, in an order that satisfies the
//! graph's key dependencies:
//!
//! - *child-dependent* relationships (many-to-one, plain one-to-one) are
//!   written before the owner, whose row stores their key;
//! - *parent-dependent* relationships (one-to-many, one-to-one sharing the
//!   primary key) are written after the owner, once its key is known.
//!
//! Keys come from the per-table loaders' predictions, so the whole graph
//! can be buffered before anything reaches the store. Each record is
//! written at most once per `persist` call; cycles are cut by identity.
//!
//! # Example
//!
//! ```ignore
//! let mut loader = HierarchicalLoader::new();
//! loader.set_connection(store)?;
//! loader.persist(&[RecordRef::new(&customer)])?;
//! loader.close()?;
//! ```

use std::any::TypeId;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use infile_core::{
    Error, InsertMode, MappingWarning, Record, RecordIdentity, RecordRef, RecordType, Related,
    RelationshipInfo, Result, Store,
};

use crate::binding::TableBinding;
use crate::callback::{EventCallback, NoOpCallback};
use crate::config::LoaderConfig;
use crate::table_loader::TableLoader;

/// Relationships of one record type, split by write order.
#[derive(Debug, Default)]
pub struct TypeDependencies {
    /// Written before the owner.
    pub child: Vec<&'static RelationshipInfo>,
    /// Written after the owner.
    pub parent: Vec<&'static RelationshipInfo>,
}

/// Outcome of one `persist` call.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PersistStats {
    /// Records buffered.
    pub persisted: usize,
    /// Records reached again in the same call and skipped.
    pub skipped_visited: usize,
    /// Records skipped because their type is ignored.
    pub skipped_ignored: usize,
}

/// Outcome of a `flush`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FlushStats {
    /// Tables that received a batched load.
    pub tables: usize,
    /// Rows sent across all tables.
    pub rows: u64,
}

/// Per-call traversal state.
#[derive(Default)]
struct Visit {
    visited: HashSet<RecordIdentity>,
    // keeps visited allocations alive so identities are never reused
    pinned: Vec<RecordRef>,
    stats: PersistStats,
}

/// Loads graphs of records through one store connection.
pub struct HierarchicalLoader<S: Store> {
    store: Option<S>,
    config: LoaderConfig,
    callback: Box<dyn EventCallback>,
    primaries: Vec<TableLoader>,
    primary_index: HashMap<TypeId, usize>,
    secondaries: Vec<TableLoader>,
    secondary_index: HashMap<TypeId, Vec<usize>>,
    dependencies: HashMap<TypeId, Arc<TypeDependencies>>,
}

impl<S: Store> Default for HierarchicalLoader<S> {
    fn default() -> Self {
        Self::new()
    }
}

impl<S: Store> std::fmt::Debug for HierarchicalLoader<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HierarchicalLoader")
            .field("connected", &self.store.is_some())
            .field("config", &self.config)
            .field("primaries", &self.primaries.len())
            .field("secondaries", &self.secondaries.len())
            .finish_non_exhaustive()
    }
}

impl<S: Store> HierarchicalLoader<S> {
    /// Create a loader with default settings and no connection.
    pub fn new() -> Self {
        Self::with_config(LoaderConfig::default())
    }

    /// Create a loader with `config` and no connection.
    pub fn with_config(config: LoaderConfig) -> Self {
        Self {
            store: None,
            config,
            callback: Box::new(NoOpCallback),
            primaries: Vec::new(),
            primary_index: HashMap::new(),
            secondaries: Vec::new(),
            secondary_index: HashMap::new(),
            dependencies: HashMap::new(),
        }
    }

    /// Create a loader and attach `store` in one step.
    pub fn open(store: S, config: LoaderConfig) -> Result<Self> {
        let mut loader = Self::with_config(config);
        loader.set_connection(store)?;
        Ok(loader)
    }

    /// Attach a store, disabling its integrity checks.
    ///
    /// Returns the previously attached store, if any.
    #[tracing::instrument(level = "debug", skip(self, store))]
    pub fn set_connection(&mut self, mut store: S) -> Result<Option<S>> {
        store.set_integrity_checks(false)?;
        tracing::debug!("Integrity checks disabled");
        Ok(self.store.replace(store))
    }

    pub fn store(&self) -> Option<&S> {
        self.store.as_ref()
    }

    pub fn store_mut(&mut self) -> Option<&mut S> {
        self.store.as_mut()
    }

    /// Detach and return the store without touching it.
    pub fn into_store(self) -> Option<S> {
        self.store
    }

    pub fn config(&self) -> &LoaderConfig {
        &self.config
    }

    /// Replace the event callback.
    pub fn set_event_callback(&mut self, callback: impl EventCallback + 'static) {
        self.callback = Box::new(callback);
    }

    pub fn set_insert_mode(&mut self, mode: InsertMode) {
        self.config.mode = mode;
    }

    /// Replace the set of ignored record types.
    pub fn set_ignored_types(&mut self, types: impl IntoIterator<Item = TypeId>) {
        self.config.ignored_types = types.into_iter().collect();
    }

    /// Ignore records of type `T` from now on.
    pub fn ignore_type<T: Record>(&mut self) {
        self.config.ignored_types.insert(TypeId::of::<T>());
    }

    /// Replace the set of ignored secondary tables.
    ///
    /// Only affects loaders created afterwards.
    pub fn set_ignored_secondary_tables<I, N>(&mut self, names: I)
    where
        I: IntoIterator<Item = N>,
        N: Into<String>,
    {
        self.config.ignored_secondary_tables = names.into_iter().map(Into::into).collect();
    }

    fn no_connection() -> Error {
        Error::Precondition("no store connection; call set_connection first".to_string())
    }

    /// Persist `records` and everything reachable from them.
    ///
    /// Records are buffered, not sent; see [`flush`](Self::flush).
    #[tracing::instrument(level = "debug", skip(self, records), fields(roots = records.len()))]
    pub fn persist(&mut self, records: &[RecordRef]) -> Result<PersistStats> {
        if self.store.is_none() {
            return Err(Self::no_connection());
        }

        let mut visit = Visit::default();
        for record in records {
            self.persist_record(record, &mut visit)?;
        }

        tracing::debug!(
            visited = visit.pinned.len(),
            persisted = visit.stats.persisted,
            skipped_visited = visit.stats.skipped_visited,
            skipped_ignored = visit.stats.skipped_ignored,
            "Persist complete"
        );
        Ok(visit.stats)
    }

    /// Persist a single record graph.
    pub fn persist_one(&mut self, record: impl Into<RecordRef>) -> Result<PersistStats> {
        self.persist(&[record.into()])
    }

    fn persist_record(&mut self, record: &RecordRef, visit: &mut Visit) -> Result<()> {
        let identity = record.identity();
        if visit.visited.contains(&identity) {
            tracing::trace!(record = ?record, "Already visited");
            visit.stats.skipped_visited += 1;
            return Ok(());
        }

        let record_type = record.record_type();
        if self.config.is_ignored_type(record_type.type_id) {
            tracing::debug!(record = ?record, "Ignoring record type");
            visit.stats.skipped_ignored += 1;
            return Ok(());
        }

        let dependencies = self.dependencies_of(record_type);
        let primary = self.ensure_loaders(record_type)?;

        visit.visited.insert(identity);
        visit.pinned.push(record.clone());

        for rel in &dependencies.child {
            match record.related(rel.name)? {
                Related::None => {}
                Related::One(child) => self.persist_record(&child, visit)?,
                Related::Many(children) => {
                    for child in &children {
                        self.persist_record(child, visit)?;
                    }
                }
            }
        }

        self.callback.on_before_save(record)?;
        self.primaries[primary].add(record)?;
        self.callback.on_after_save(record)?;
        visit.stats.persisted += 1;

        let id = record.id()?;

        for rel in &dependencies.parent {
            match record.related(rel.name)? {
                Related::None => {}
                // elements carry their own back-reference to the owner
                Related::Many(children) => {
                    for child in &children {
                        self.persist_record(child, visit)?;
                    }
                }
                Related::One(child) => {
                    if let Some(id) = id {
                        child.set_id(id)?;
                    }
                    self.persist_record(&child, visit)?;
                }
            }
        }

        if let Some(indexes) = self.secondary_index.get(&record_type.type_id) {
            for &index in indexes {
                self.secondaries[index].add(record)?;
            }
        }

        Ok(())
    }

    /// Dependency sets of `record_type`, discovering every type reachable
    /// from it on first use.
    pub fn dependencies_of(&mut self, record_type: RecordType) -> Arc<TypeDependencies> {
        if let Some(found) = self.dependencies.get(&record_type.type_id) {
            return Arc::clone(found);
        }
        self.discover(record_type);
        self.dependencies
            .get(&record_type.type_id)
            .map(Arc::clone)
            .unwrap_or_default()
    }

    fn discover(&mut self, record_type: RecordType) {
        if self.dependencies.contains_key(&record_type.type_id) {
            return;
        }

        let mut deps = TypeDependencies::default();
        for rel in record_type.relationships {
            if rel.is_child_dependent() {
                deps.child.push(rel);
            } else if rel.is_parent_dependent() {
                deps.parent.push(rel);
            }
        }
        tracing::debug!(
            record = record_type.short_name(),
            child = deps.child.len(),
            parent = deps.parent.len(),
            "Discovered dependencies"
        );
        // insert before recursing so cyclic type graphs terminate
        self.dependencies
            .insert(record_type.type_id, Arc::new(deps));

        for rel in record_type.relationships {
            let target = (rel.target)();
            if self.config.is_ignored_type(target.type_id) {
                continue;
            }
            self.discover(target);
        }
    }

    /// Primary loader index for `record_type`, creating it and its
    /// secondary loaders on first use.
    fn ensure_loaders(&mut self, record_type: RecordType) -> Result<usize> {
        if let Some(&index) = self.primary_index.get(&record_type.type_id) {
            return Ok(index);
        }
        let store = self.store.as_mut().ok_or_else(Self::no_connection)?;

        let binding = TableBinding::primary(record_type)?;
        let primary = TableLoader::new(binding, &self.config, &mut *store)?;

        let mut secondary = Vec::new();
        for table in record_type.secondary_tables {
            if self.config.is_ignored_secondary_table(table.name) {
                tracing::debug!(table = table.name, "Ignoring secondary table");
                continue;
            }
            let binding = TableBinding::secondary(record_type, *table)?;
            secondary.push(TableLoader::new(binding, &self.config, &mut *store)?);
        }

        let index = self.primaries.len();
        self.primaries.push(primary);
        self.primary_index.insert(record_type.type_id, index);

        let mut indexes = Vec::with_capacity(secondary.len());
        for loader in secondary {
            indexes.push(self.secondaries.len());
            self.secondaries.push(loader);
        }
        if !indexes.is_empty() {
            self.secondary_index.insert(record_type.type_id, indexes);
        }
        Ok(index)
    }

    /// Send every buffered row: primary tables first, then secondary.
    #[tracing::instrument(level = "info", skip(self))]
    pub fn flush(&mut self) -> Result<FlushStats> {
        let store = self.store.as_mut().ok_or_else(Self::no_connection)?;

        let mut stats = FlushStats::default();
        for loader in self.primaries.iter_mut().chain(self.secondaries.iter_mut()) {
            let rows = loader.flush(&mut *store)?;
            if rows > 0 {
                stats.tables += 1;
                stats.rows += rows;
            }
        }

        tracing::info!(tables = stats.tables, rows = stats.rows, "Flush complete");
        Ok(stats)
    }

    /// Flush, re-enable integrity checks and drop all loaders.
    ///
    /// Integrity checks are re-enabled even when the flush fails; the flush
    /// error is returned in that case.
    #[tracing::instrument(level = "info", skip(self))]
    pub fn close(&mut self) -> Result<FlushStats> {
        if self.store.is_none() {
            self.clear();
            return Ok(FlushStats::default());
        }

        let flushed = self.flush();
        let restored = match self.store.as_mut() {
            Some(store) => store.set_integrity_checks(true),
            None => Ok(()),
        };
        self.clear();

        let stats = flushed?;
        restored?;
        tracing::info!(
            tables = stats.tables,
            rows = stats.rows,
            "Closed; integrity checks enabled"
        );
        Ok(stats)
    }

    fn clear(&mut self) {
        self.primaries.clear();
        self.primary_index.clear();
        self.secondaries.clear();
        self.secondary_index.clear();
        self.dependencies.clear();
    }

    /// Primary loader of `T`, if one was created.
    pub fn loader<T: Record>(&self) -> Option<&TableLoader> {
        self.primary_index
            .get(&TypeId::of::<T>())
            .map(|&i| &self.primaries[i])
    }

    /// Secondary loader for the table `name`, if one was created.
    pub fn secondary_loader(&self, name: &str) -> Option<&TableLoader> {
        self.secondaries.iter().find(|l| l.table() == name)
    }

    /// All loaders, primary first.
    pub fn loaders(&self) -> impl Iterator<Item = &TableLoader> {
        self.primaries.iter().chain(self.secondaries.iter())
    }

    /// Warnings of every loader.
    pub fn warnings(&self) -> Vec<MappingWarning> {
        self.loaders()
            .flat_map(|l| l.warnings().iter().cloned())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::callback::FnCallback;
    use crate::testing::RecordingStore;
    use infile_core::{FieldInfo, Shared, SqlType, Value, shared};
    use std::sync::Mutex;

    // Author -> many Books (parent-dependent), Book -> Author (child-dependent)
    #[derive(Default)]
    struct Author {
        id: Option<i64>,
        name: String,
        books: Vec<Shared<Book>>,
    }

    #[derive(Default)]
    struct Book {
        id: Option<i64>,
        title: String,
        author: Option<Shared<Author>>,
    }

    impl Record for Author {
        const TABLE_NAME: &'static str = "author";
        const RELATIONSHIPS: &'static [RelationshipInfo] =
            &[RelationshipInfo::one_to_many("books", RecordType::of::<Book>)];

        fn fields() -> &'static [FieldInfo] {
            static FIELDS: &[FieldInfo] = &[
                FieldInfo::new("id", "id", SqlType::BigInt)
                    .primary_key(true)
                    .auto_increment(true),
                FieldInfo::new("name", "name", SqlType::Text),
            ];
            FIELDS
        }

        fn to_row(&self) -> Vec<(&'static str, Value)> {
            vec![("id", self.id.into()), ("name", self.name.clone().into())]
        }

        fn id(&self) -> Option<i64> {
            self.id
        }

        fn set_id(&mut self, id: i64) {
            self.id = Some(id);
        }

        fn related(&self, name: &str) -> Result<Related> {
            match name {
                "books" => Ok(Related::many(&self.books)),
                _ => Err(Error::traversal("Author", Some(name), "unknown relationship")),
            }
        }
    }

    impl Record for Book {
        const TABLE_NAME: &'static str = "book";
        const RELATIONSHIPS: &'static [RelationshipInfo] = &[RelationshipInfo::many_to_one(
            "author",
            RecordType::of::<Author>,
            "author_id",
        )];

        fn fields() -> &'static [FieldInfo] {
            static FIELDS: &[FieldInfo] = &[
                FieldInfo::new("id", "id", SqlType::BigInt)
                    .primary_key(true)
                    .auto_increment(true),
                FieldInfo::new("title", "title", SqlType::Text),
            ];
            FIELDS
        }

        fn to_row(&self) -> Vec<(&'static str, Value)> {
            vec![("id", self.id.into()), ("title", self.title.clone().into())]
        }

        fn id(&self) -> Option<i64> {
            self.id
        }

        fn set_id(&mut self, id: i64) {
            self.id = Some(id);
        }

        fn related(&self, name: &str) -> Result<Related> {
            match name {
                "author" => Ok(Related::one(self.author.as_ref())),
                _ => Err(Error::traversal("Book", Some(name), "unknown relationship")),
            }
        }
    }

    fn author_with_books(titles: &[&str]) -> Shared<Author> {
        let author = shared(Author {
            name: "Le Guin".to_string(),
            ..Author::default()
        });
        let books = titles
            .iter()
            .map(|t| {
                shared(Book {
                    title: (*t).to_string(),
                    author: Some(Arc::clone(&author)),
                    ..Book::default()
                })
            })
            .collect();
        author.write().unwrap().books = books;
        author
    }

    fn connected() -> HierarchicalLoader<RecordingStore> {
        HierarchicalLoader::open(RecordingStore::new(), LoaderConfig::default()).unwrap()
    }

    #[test]
    fn test_persist_without_connection_fails() {
        let mut loader: HierarchicalLoader<RecordingStore> = HierarchicalLoader::new();
        let author = author_with_books(&[]);
        let err = loader.persist(&[RecordRef::new(&author)]).unwrap_err();
        assert!(matches!(err, Error::Precondition(_)));
        assert!(loader.loaders().next().is_none());
        assert!(loader.flush().is_err());
    }

    #[test]
    fn test_dependencies_are_split_and_memoized() {
        let mut loader = connected();
        let author = loader.dependencies_of(RecordType::of::<Author>());
        assert_eq!(author.child.len(), 0);
        assert_eq!(author.parent[0].name, "books");

        // Book was discovered through Author
        let book = loader.dependencies_of(RecordType::of::<Book>());
        assert_eq!(book.child[0].name, "author");
        assert!(Arc::ptr_eq(
            &book,
            &loader.dependencies_of(RecordType::of::<Book>())
        ));
    }

    #[test]
    fn test_cycle_is_written_once() {
        let mut loader = connected();
        let author = author_with_books(&["A", "B", "C"]);
        let stats = loader.persist(&[RecordRef::new(&author)]).unwrap();

        assert_eq!(stats.persisted, 4);
        // each book's back-reference reaches the author again
        assert_eq!(stats.skipped_visited, 3);
        assert_eq!(loader.loader::<Author>().unwrap().row_count(), 1);
        assert_eq!(loader.loader::<Book>().unwrap().row_count(), 3);
    }

    #[test]
    fn test_children_get_parent_key() {
        let mut loader = connected();
        let author = author_with_books(&["A", "B", "C"]);
        loader.persist(&[RecordRef::new(&author)]).unwrap();
        loader.flush().unwrap();

        let author_id = author.read().unwrap().id.unwrap();
        let store = loader.store().unwrap();
        let books = store.loads_for("book").next().unwrap();
        assert_eq!(books.columns, ["id", "title", "author_id"]);
        assert_eq!(
            books.column("author_id"),
            vec![Some(author_id.to_string()); 3]
        );
    }

    #[test]
    fn test_callback_order() {
        let events = Arc::new(Mutex::new(Vec::new()));
        let before = Arc::clone(&events);
        let after = Arc::clone(&events);

        let mut loader = connected();
        loader.set_event_callback(FnCallback::new(
            move |r: &RecordRef| {
                before
                    .lock()
                    .unwrap()
                    .push(format!("before {}", r.record_type().table));
                Ok(())
            },
            move |r: &RecordRef| {
                after.lock().unwrap().push(format!(
                    "after {} {}",
                    r.record_type().table,
                    r.id()?.unwrap_or(-1)
                ));
                Ok(())
            },
        ));

        let author = author_with_books(&["A"]);
        loader.persist(&[RecordRef::new(&author)]).unwrap();

        assert_eq!(
            *events.lock().unwrap(),
            ["before author", "after author 1", "before book", "after book 1"]
        );
    }

    #[test]
    fn test_callback_error_aborts() {
        let mut loader = connected();
        loader.set_event_callback(FnCallback::new(
            |_: &RecordRef| Err(Error::Custom("nope".into())),
            |_: &RecordRef| Ok(()),
        ));
        let author = author_with_books(&["A"]);
        assert!(loader.persist(&[RecordRef::new(&author)]).is_err());
        assert_eq!(loader.loader::<Author>().unwrap().row_count(), 0);
    }

    #[test]
    fn test_ignored_types_are_not_traversed() {
        let mut loader = connected();
        loader.ignore_type::<Book>();
        let author = author_with_books(&["A", "B"]);
        let stats = loader.persist(&[RecordRef::new(&author)]).unwrap();

        assert_eq!(stats.persisted, 1);
        assert_eq!(stats.skipped_ignored, 2);
        assert!(loader.loader::<Book>().is_none());
    }

    #[test]
    fn test_visited_set_is_per_call() {
        let mut loader = connected();
        let author = author_with_books(&[]);
        loader.persist(&[RecordRef::new(&author)]).unwrap();
        // same instance in a second call is written again; it keeps its id
        loader.persist(&[RecordRef::new(&author)]).unwrap();
        assert_eq!(loader.loader::<Author>().unwrap().row_count(), 2);
        assert_eq!(
            loader.loader::<Author>().unwrap().buffer().as_bytes(),
            b"1\tLe Guin\n1\tLe Guin"
        );
    }

    #[test]
    fn test_roots_share_one_visited_set() {
        let mut loader = connected();
        let author = author_with_books(&["A"]);
        let book = RecordRef::new(&author.read().unwrap().books[0]);
        let stats = loader
            .persist(&[RecordRef::new(&author), book])
            .unwrap();
        assert_eq!(stats.persisted, 2);
        assert_eq!(loader.loader::<Book>().unwrap().row_count(), 1);
    }

    #[test]
    fn test_close_restores_integrity_even_when_flush_fails() {
        let mut loader = connected();
        let author = author_with_books(&["A"]);
        loader.persist(&[RecordRef::new(&author)]).unwrap();
        loader.store_mut().unwrap().fail_loads(true);

        assert!(loader.close().is_err());
        let store = loader.store().unwrap();
        assert!(store.integrity_checks_enabled());
        assert_eq!(store.count("SET FOREIGN_KEY_CHECKS = 1"), 1);
        assert!(loader.loaders().next().is_none());
    }

    struct Label {
        text: String,
    }

    impl Record for Label {
        const TABLE_NAME: &'static str = "label";

        fn fields() -> &'static [FieldInfo] {
            static FIELDS: &[FieldInfo] = &[FieldInfo::new("text", "text", SqlType::VarChar(3))];
            FIELDS
        }

        fn to_row(&self) -> Vec<(&'static str, Value)> {
            vec![("text", self.text.clone().into())]
        }
    }

    #[test]
    fn test_warnings_are_aggregated() {
        let mut loader = connected();
        let fits = shared(Label { text: "abc".into() });
        let long = shared(Label {
            text: "abcdef".into(),
        });
        let author = author_with_books(&["A"]);
        loader
            .persist(&[
                RecordRef::new(&fits),
                RecordRef::new(&long),
                RecordRef::new(&author),
            ])
            .unwrap();

        let warnings = loader.warnings();
        assert_eq!(warnings.len(), 1);
        assert_eq!(warnings[0].table, "label");
        assert_eq!(warnings[0].column, "text");
        // a warning never stops the row
        assert_eq!(loader.loader::<Label>().unwrap().row_count(), 2);
        assert!(!loader.loader::<Label>().unwrap().is_auto_generate_id());
    }
}
