mod common;

use std::sync::{Arc, Mutex};

use chrono::NaiveDate;
use infile::prelude::*;
use infile::testing::RecordingStore;

use common::{Customer, CustomerType, Order, OrderLine, Person, Profile, customer, order_with_lines};

/// Declares a collection whose accessor always fails.
#[derive(Debug, Default)]
struct Batch {
    id: Option<i64>,
}

impl Record for Batch {
    const TABLE_NAME: &'static str = "batch";
    const RELATIONSHIPS: &'static [RelationshipInfo] =
        &[RelationshipInfo::one_to_many("lines", RecordType::of::<OrderLine>)];

    fn fields() -> &'static [FieldInfo] {
        static FIELDS: &[FieldInfo] = &[FieldInfo::new("id", "id", SqlType::BigInt)
            .primary_key(true)
            .auto_increment(true)];
        FIELDS
    }

    fn to_row(&self) -> Vec<(&'static str, Value)> {
        vec![("id", self.id.into())]
    }

    fn id(&self) -> Option<i64> {
        self.id
    }

    fn set_id(&mut self, id: i64) {
        self.id = Some(id);
    }

    fn related(&self, name: &str) -> Result<Related> {
        Err(Error::traversal("Batch", Some(name), "lines are not loaded"))
    }
}

fn open(store: RecordingStore) -> HierarchicalLoader<RecordingStore> {
    HierarchicalLoader::open(store, LoaderConfig::default()).unwrap()
}

fn store(loader: &HierarchicalLoader<RecordingStore>) -> &RecordingStore {
    loader.store().unwrap()
}

#[test]
fn customer_alone_gets_predicted_id_and_null_sentinels() {
    let mut loader = open(RecordingStore::new().with_generated_id("customer", 123));
    let c = customer();

    let stats = loader.persist_one(&c).unwrap();
    assert_eq!(stats.persisted, 1);
    assert_eq!(c.read().unwrap().id, Some(124));

    let customers = loader.loader::<Customer>().unwrap();
    assert_eq!(customers.buffer().as_bytes(), b"124\t\\N\t\\N");

    let flushed = loader.flush().unwrap();
    assert_eq!(flushed.tables, 1);
    assert_eq!(flushed.rows, 1);
    assert_eq!(store(&loader).count("LOAD DATA"), 1);
    assert_eq!(
        store(&loader).loads()[0].rows(),
        vec![vec![Some("124".to_string()), None, None]]
    );
}

#[test]
fn flush_with_nothing_buffered_sends_nothing() {
    let mut loader = open(RecordingStore::new());
    let stats = loader.flush().unwrap();
    assert_eq!(stats.tables, 0);
    assert_eq!(store(&loader).count("LOAD DATA"), 0);

    loader.persist_one(&customer()).unwrap();
    loader.flush().unwrap();
    loader.flush().unwrap();
    assert_eq!(store(&loader).count("LOAD DATA"), 1);
}

#[test]
fn collection_children_carry_parent_key() {
    let mut loader = open(RecordingStore::new().with_generated_id("orders", 41));
    let order = order_with_lines(None, &["A-1", "B-2", "C-3"]);

    loader.persist_one(&order).unwrap();
    assert_eq!(loader.loader::<OrderLine>().unwrap().row_count(), 3);
    loader.flush().unwrap();

    let order_id = order.read().unwrap().id;
    assert_eq!(order_id, Some(42));
    for line in &order.read().unwrap().lines {
        assert!(line.read().unwrap().id.is_some());
    }

    let lines = store(&loader).loads_for("order_line").next().unwrap();
    assert_eq!(lines.columns, ["id", "sku", "note", "order_id"]);
    assert_eq!(lines.column("order_id"), vec![Some("42".to_string()); 3]);
    assert_eq!(
        lines.column("sku"),
        ["A-1", "B-2", "C-3"].map(|s| Some(s.to_string()))
    );
}

#[test]
fn child_dependency_is_buffered_before_owner() {
    let order_of_saves = Arc::new(Mutex::new(Vec::new()));
    let seen = Arc::clone(&order_of_saves);

    let mut loader = open(RecordingStore::new());
    loader.set_event_callback(FnCallback::new(
        move |record: &RecordRef| {
            seen.lock().unwrap().push(record.record_type().table);
            Ok(())
        },
        |_: &RecordRef| Ok(()),
    ));

    let c = customer();
    let order = order_with_lines(Some(&c), &["A-1"]);
    loader.persist_one(&order).unwrap();

    assert_eq!(
        *order_of_saves.lock().unwrap(),
        ["customer", "orders", "order_line"]
    );

    loader.flush().unwrap();
    let customer_id = c.read().unwrap().id.unwrap().to_string();
    let orders = store(&loader).loads_for("orders").next().unwrap();
    assert_eq!(orders.columns, ["id", "reference", "customer_id"]);
    assert_eq!(orders.column("customer_id"), vec![Some(customer_id)]);
}

#[test]
fn connection_statements_are_issued_once() {
    let mut loader: HierarchicalLoader<RecordingStore> = HierarchicalLoader::new();
    assert!(loader.set_connection(RecordingStore::new()).unwrap().is_none());

    let c = customer();
    loader.persist_one(&order_with_lines(Some(&c), &["A-1", "B-2"])).unwrap();

    let first = loader.set_connection(RecordingStore::new()).unwrap().unwrap();
    assert_eq!(first.count("SET FOREIGN_KEY_CHECKS = 0"), 1);
    assert_eq!(first.count("SET FOREIGN_KEY_CHECKS = 1"), 0);
    assert_eq!(store(&loader).count("SET FOREIGN_KEY_CHECKS = 0"), 1);

    let stats = loader.close().unwrap();
    assert_eq!(stats.tables, 3);
    let second = loader.into_store().unwrap();
    assert_eq!(second.count("SET FOREIGN_KEY_CHECKS = 0"), 1);
    assert_eq!(second.count("SET FOREIGN_KEY_CHECKS = 1"), 1);
    assert!(second.integrity_checks_enabled());
    assert_eq!(
        second.statements().last().map(String::as_str),
        Some("SET FOREIGN_KEY_CHECKS = 1")
    );
}

#[test]
fn persist_without_connection_is_a_precondition_error() {
    let mut loader: HierarchicalLoader<RecordingStore> = HierarchicalLoader::new();
    let err = loader.persist_one(&customer()).unwrap_err();
    assert!(matches!(err, Error::Precondition(_)));
}

#[test]
fn failing_accessor_aborts_persist_without_rollback() {
    let mut loader = open(RecordingStore::new());
    let first = customer();
    let batch = infile::shared(Batch::default());
    let second = customer();

    let err = loader
        .persist(&[
            RecordRef::new(&first),
            RecordRef::new(&batch),
            RecordRef::new(&second),
        ])
        .unwrap_err();
    match &err {
        Error::Traversal(e) => {
            assert_eq!(e.record, "Batch");
            assert_eq!(e.relationship.as_deref(), Some("lines"));
        }
        other => panic!("expected traversal error, got {other}"),
    }

    // rows buffered before the failure stay; later roots are never reached
    assert_eq!(loader.loader::<Customer>().unwrap().row_count(), 1);
    assert_eq!(loader.loader::<Batch>().unwrap().row_count(), 1);
    assert!(batch.read().unwrap().id.is_some());
    assert!(second.read().unwrap().id.is_none());
    assert!(loader.loader::<OrderLine>().is_none());
}

#[test]
fn revisited_record_is_written_once() {
    let mut loader = open(RecordingStore::new());
    let c = customer();

    let stats = loader
        .persist(&[RecordRef::new(&c), RecordRef::new(&c)])
        .unwrap();
    assert_eq!(stats.persisted, 1);
    assert_eq!(stats.skipped_visited, 1);
    assert_eq!(loader.loader::<Customer>().unwrap().row_count(), 1);
}

#[test]
fn escaped_values_keep_their_column_count() {
    let mut loader = open(RecordingStore::new());
    let order = order_with_lines(None, &["A-1", "B-2"]);
    let tricky = "tab\there\nnew line \\ and \\N";
    order.read().unwrap().lines[0].write().unwrap().note = tricky.to_string();
    order.read().unwrap().lines[1].write().unwrap().note = "\\N".to_string();

    loader.persist_one(&order).unwrap();
    loader.flush().unwrap();

    let lines = store(&loader).loads_for("order_line").next().unwrap();
    let rows = lines.rows();
    assert_eq!(rows.len(), 2);
    assert!(rows.iter().all(|row| row.len() == 4));
    assert_eq!(rows[0][2].as_deref(), Some(tricky));
    // a literal "\N" stays distinguishable from NULL
    assert_eq!(rows[1][2].as_deref(), Some("\\N"));
    assert!(!lines.text().contains("\t\\N\t"));
}

#[test]
fn foreign_writes_between_prediction_and_flush_are_fatal() {
    let mut loader = open(RecordingStore::new().with_generated_id("customer", 123));
    loader.persist_one(&customer()).unwrap();
    loader
        .store_mut()
        .unwrap()
        .simulate_external_insert("customer", 500);

    let err = loader.flush().unwrap_err();
    assert!(err.is_consistency_error());
    let msg = err.to_string();
    assert!(msg.contains("500"));
    assert!(msg.contains("124"));
}

#[test]
fn secondary_table_rows_carry_owner_id() {
    let mut loader = open(RecordingStore::new().with_generated_id("person", 9));
    let profile = infile::shared(Profile {
        handle: "ada".to_string(),
        ..Profile::default()
    });
    let person = infile::shared(Person {
        name: "Ada".to_string(),
        bio: Some("Analyst".to_string()),
        profile: Some(Arc::clone(&profile)),
        ..Person::default()
    });

    loader.persist_one(&person).unwrap();
    assert!(loader.secondary_loader("person_detail").is_some());
    // single parent-dependent relation shares the owner's key
    assert_eq!(profile.read().unwrap().id, Some(10));

    let stats = loader.flush().unwrap();
    assert_eq!(stats.tables, 3);

    let store = store(&loader);
    let people = store.loads_for("person").next().unwrap();
    assert_eq!(people.columns, ["id", "name"]);
    let detail = store.loads_for("person_detail").next().unwrap();
    assert_eq!(detail.columns, ["person_id", "bio"]);
    assert_eq!(
        detail.rows(),
        vec![vec![Some("10".to_string()), Some("Analyst".to_string())]]
    );
    let profiles = store.loads_for("profile").next().unwrap();
    assert_eq!(profiles.column("id"), vec![Some("10".to_string())]);
}

#[test]
fn ignored_secondary_table_gets_no_loader() {
    let config = LoaderConfig::new().ignore_secondary_table("person_detail");
    let mut loader = HierarchicalLoader::open(RecordingStore::new(), config).unwrap();
    let person = infile::shared(Person {
        name: "Grace".to_string(),
        bio: Some("Admiral".to_string()),
        ..Person::default()
    });

    loader.persist_one(&person).unwrap();
    assert!(loader.secondary_loader("person_detail").is_none());
    loader.close().unwrap();

    let store = loader.into_store().unwrap();
    assert_eq!(store.loads().len(), 1);
    assert_eq!(store.loads()[0].table, "person");
}

#[test]
fn ignored_type_is_neither_written_nor_traversed() {
    let mut loader = open(RecordingStore::new());
    loader.ignore_type::<Customer>();

    let c = customer();
    let order = order_with_lines(Some(&c), &[]);
    let stats = loader.persist_one(&order).unwrap();
    assert_eq!(stats.persisted, 1);
    assert_eq!(stats.skipped_ignored, 1);
    assert!(loader.loader::<Customer>().is_none());
    assert!(c.read().unwrap().id.is_none());

    loader.flush().unwrap();
    let orders = store(&loader).loads_for("orders").next().unwrap();
    assert_eq!(orders.column("customer_id"), vec![None]);
}

#[test]
fn replace_mode_and_enum_names_reach_the_statement() {
    let mut loader = open(RecordingStore::new());
    loader.set_insert_mode(InsertMode::Replace);

    let c = infile::shared(Customer {
        id: Some(7),
        last_seen_on: NaiveDate::from_ymd_opt(2024, 3, 1),
        kind: Some(CustomerType::Business),
    });
    loader.persist_one(&c).unwrap();
    loader.flush().unwrap();

    let store = store(&loader);
    assert_eq!(store.count("LOAD DATA LOCAL INFILE 'stream' REPLACE INTO TABLE `customer`"), 1);
    assert_eq!(
        store.loads()[0].rows(),
        vec![vec![
            Some("7".to_string()),
            Some("2024-03-01".to_string()),
            Some("BUSINESS".to_string()),
        ]]
    );
}

#[test]
fn explicit_ids_advance_the_prediction() {
    let mut loader = open(RecordingStore::new().with_generated_id("customer", 3));
    let explicit = infile::shared(Customer {
        id: Some(50),
        ..Customer::default()
    });
    let generated = customer();

    loader
        .persist(&[RecordRef::new(&explicit), RecordRef::new(&generated)])
        .unwrap();
    assert_eq!(explicit.read().unwrap().id, Some(50));
    assert_eq!(generated.read().unwrap().id, Some(51));
    loader.flush().unwrap();
}

#[test]
fn loader_warnings_are_collected() {
    let mut loader = open(RecordingStore::new());
    let order = order_with_lines(None, &["A-VERY-LONG-SKU-VALUE"]);
    loader.persist_one(&order).unwrap();

    let warnings = loader.warnings();
    assert_eq!(warnings.len(), 1);
    assert_eq!(warnings[0].table, "order_line");
    assert_eq!(warnings[0].column, "sku");
}

#[test]
fn failed_flush_keeps_rows_for_retry() {
    let mut loader = open(RecordingStore::new());
    loader.persist_one(&customer()).unwrap();

    loader.store_mut().unwrap().fail_loads(true);
    assert!(loader.flush().is_err());
    assert_eq!(loader.loader::<Customer>().unwrap().row_count(), 1);

    loader.store_mut().unwrap().fail_loads(false);
    let stats = loader.flush().unwrap();
    assert_eq!(stats.rows, 1);
}

#[test]
fn order_type_used_only_through_lines_is_discovered() {
    let mut loader = open(RecordingStore::new());
    let deps = loader.dependencies_of(RecordType::of::<OrderLine>());
    assert_eq!(deps.child.len(), 1);
    assert_eq!(deps.child[0].name, "order");

    let order = loader.dependencies_of(RecordType::of::<Order>());
    assert_eq!(order.child[0].name, "customer");
    assert_eq!(order.parent[0].name, "lines");
}
