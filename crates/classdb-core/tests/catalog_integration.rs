//! Integration tests for the schema catalog.

use classdb_core::{
    AllowAll, Catalog, CatalogConfig, ClassChange, Error, LocalTransactions,
    MemoryCollectionStore, MemoryIndexManager, NewProperty, PropertyChange, PropertyType,
    RoleChecker, SessionHandle, SledDocumentStore, StoreConfig, StoredValue,
};
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::{mpsc, Arc};
use std::thread;
use std::time::Duration;

struct TestContext {
    catalog: Catalog,
    collections: Arc<MemoryCollectionStore>,
    indexes: Arc<MemoryIndexManager>,
    session: SessionHandle,
    _catalog_dir: tempfile::TempDir,
}

impl TestContext {
    fn new() -> Self {
        Self::with_config(CatalogConfig::new())
    }

    fn with_config(config: CatalogConfig) -> Self {
        init_tracing();
        let catalog_dir = tempfile::tempdir().unwrap();
        let collections = Arc::new(MemoryCollectionStore::new());
        let indexes = Arc::new(MemoryIndexManager::new());
        let catalog = open_catalog(catalog_dir.path(), config, &collections, &indexes);

        Self {
            catalog,
            collections,
            indexes,
            session: SessionHandle::embedded("test"),
            _catalog_dir: catalog_dir,
        }
    }

    /// Close the catalog and open it again from disk, keeping the
    /// collection store and index manager.
    fn reopen(self) -> Self {
        let TestContext {
            catalog,
            collections,
            indexes,
            session,
            _catalog_dir,
        } = self;
        drop(catalog);
        let catalog = open_catalog(_catalog_dir.path(), CatalogConfig::new(), &collections, &indexes);
        Self {
            catalog,
            collections,
            indexes,
            session,
            _catalog_dir,
        }
    }
}

fn open_catalog(
    path: &Path,
    config: CatalogConfig,
    collections: &Arc<MemoryCollectionStore>,
    indexes: &Arc<MemoryIndexManager>,
) -> Catalog {
    let store = SledDocumentStore::open_with_config(&StoreConfig::new(path).with_sync_writes())
        .unwrap();
    Catalog::open(config, Arc::new(store), collections.clone(), indexes.clone()).unwrap()
}

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

#[test]
fn test_inheritance_cycle_is_rejected() {
    let ctx = TestContext::new();
    let s = &ctx.session;
    ctx.catalog.create_class(s, "A", &[]).unwrap();
    ctx.catalog.create_class(s, "B", &["A"]).unwrap();
    ctx.catalog.create_class(s, "C", &["B"]).unwrap();

    let err = ctx.catalog.add_super_class(s, "A", "C").unwrap_err();
    assert!(matches!(err, Error::Cycle { .. }));
    assert!(err.is_schema_violation());
    assert!(ctx.catalog.add_super_class(s, "A", "A").is_err());

    let snapshot = ctx.catalog.snapshot();
    let a = snapshot.class("A").unwrap();
    assert!(a.super_class_names().is_empty());
    assert_eq!(
        snapshot.class("C").unwrap().all_super_class_names(),
        &["B".to_string(), "A".to_string()]
    );
}

#[test]
fn test_polymorphic_ids_cover_subclasses() {
    let ctx = TestContext::new();
    let s = &ctx.session;
    ctx.catalog.create_abstract_class(s, "V", &[]).unwrap();
    ctx.catalog.create_class(s, "Person", &["V"]).unwrap();
    ctx.catalog
        .create_class_with_collections(s, "Employee", 3, &["Person"])
        .unwrap();
    ctx.catalog.create_class(s, "Place", &["V"]).unwrap();

    let snapshot = ctx.catalog.snapshot();
    for view in snapshot.classes() {
        for parent in snapshot.super_classes(view) {
            for id in view.polymorphic_collection_ids() {
                assert!(
                    parent.has_polymorphic_collection_id(*id),
                    "{} is missing collection {} of {}",
                    parent.name(),
                    id,
                    view.name()
                );
            }
        }
    }
    let employee = snapshot.class("employee").unwrap();
    assert_eq!(employee.collection_ids().len(), 3);
    assert_eq!(snapshot.class("V").unwrap().polymorphic_collection_ids().len(), 5);
    for id in employee.collection_ids() {
        assert_eq!(snapshot.class_by_collection_id(*id).unwrap().name(), "Employee");
    }

    ctx.catalog.remove_super_class(s, "Employee", "Person").unwrap();
    let snapshot = ctx.catalog.snapshot();
    let person = snapshot.class("Person").unwrap();
    assert_eq!(person.polymorphic_collection_ids().len(), 1);
    assert_eq!(snapshot.class("V").unwrap().polymorphic_collection_ids().len(), 2);
}

#[test]
fn test_names_are_unique_ignoring_case() {
    let ctx = TestContext::new();
    let s = &ctx.session;
    ctx.catalog.create_class(s, "Person", &[]).unwrap();
    ctx.catalog.create_class(s, "Car", &[]).unwrap();

    assert!(ctx.catalog.create_class(s, "PERSON", &[]).unwrap_err().is_schema_violation());
    assert!(ctx
        .catalog
        .rename_class(s, "Car", "person")
        .unwrap_err()
        .is_schema_violation());
    assert!(ctx
        .catalog
        .rename_class(s, "Car", "CAR")
        .unwrap_err()
        .is_schema_violation());

    ctx.catalog.rename_class(s, "Person", "Human").unwrap();
    assert!(!ctx.catalog.exists_class("person"));
    assert!(ctx.catalog.exists_class("HUMAN"));
    assert_eq!(ctx.catalog.class_names(), vec!["Car", "Human"]);

    let same = ctx.catalog.get_or_create_class(s, "human", &[]).unwrap();
    assert_eq!(same.name(), "Human");
    assert_eq!(ctx.catalog.count_classes(), 2);
}

#[test]
fn test_abstract_round_trip() {
    let ctx = TestContext::new();
    let s = &ctx.session;
    ctx.catalog.create_class(s, "Shape", &[]).unwrap();
    ctx.catalog.create_class(s, "Circle", &["Shape"]).unwrap();

    ctx.catalog.set_abstract(s, "Shape", true).unwrap();
    let snapshot = ctx.catalog.snapshot();
    let shape = snapshot.class("Shape").unwrap();
    let circle = snapshot.class("Circle").unwrap();
    assert!(shape.is_abstract());
    assert_eq!(shape.collection_ids(), &[-1]);
    assert_eq!(shape.polymorphic_collection_ids(), circle.polymorphic_collection_ids());

    ctx.catalog.set_abstract(s, "Shape", false).unwrap();
    let shape = ctx.catalog.snapshot().class("Shape").unwrap();
    assert!(!shape.is_abstract());
    assert_eq!(shape.collection_ids().len(), 1);
    assert!(shape.has_polymorphic_collection_id(shape.default_collection_id()));
    assert!(shape.has_polymorphic_collection_id(circle.default_collection_id()));
}

#[test]
fn test_property_type_changes() {
    let ctx = TestContext::new();
    let s = &ctx.session;
    ctx.catalog.create_class(s, "Person", &[]).unwrap();
    ctx.catalog
        .add_property(s, "Person", NewProperty::new("age", PropertyType::Integer))
        .unwrap();
    ctx.catalog
        .add_property(s, "Person", NewProperty::new("car", PropertyType::Link))
        .unwrap();

    ctx.catalog
        .alter_property(s, "Person", "age", PropertyChange::Type(PropertyType::Long))
        .unwrap();
    let err = ctx
        .catalog
        .alter_property(s, "Person", "car", PropertyChange::Type(PropertyType::String))
        .unwrap_err();
    assert!(err.is_schema_violation());

    let person = ctx.catalog.snapshot().class("Person").unwrap();
    assert_eq!(person.property("age").unwrap().property_type(), PropertyType::Long);
    assert_eq!(person.property("car").unwrap().property_type(), PropertyType::Link);
}

#[test]
fn test_snapshots_are_isolated() {
    let ctx = TestContext::new();
    let s = &ctx.session;
    ctx.catalog.create_class(s, "Person", &[]).unwrap();

    let before = ctx.catalog.snapshot();
    let person_before = before.class("Person").unwrap();
    ctx.catalog
        .add_property(s, "Person", NewProperty::new("name", PropertyType::String))
        .unwrap();
    ctx.catalog.create_class(s, "Car", &[]).unwrap();

    assert_eq!(before.version(), 1);
    assert!(!before.exists_class("Car"));
    assert!(!person_before.exists_property("name"));

    let after = ctx.catalog.snapshot();
    assert_eq!(after.version(), 3);
    assert!(after.class("Person").unwrap().exists_property("name"));
}

#[test]
fn test_animal_and_dog() {
    let ctx = TestContext::new();
    let s = &ctx.session;
    ctx.catalog.create_class(s, "Animal", &[]).unwrap();
    ctx.catalog
        .add_property(s, "Animal", NewProperty::new("name", PropertyType::String))
        .unwrap();
    let dog = ctx.catalog.create_class(s, "Dog", &["Animal"]).unwrap();

    assert!(dog.is_sub_class_of("animal"));
    let name = dog.property("name").unwrap();
    assert_eq!(name.owner_class(), "Animal");
    assert!(dog.declared_property("name").is_none());

    let snapshot = ctx.catalog.snapshot();
    let animal = snapshot.class("Animal").unwrap();
    assert_eq!(animal.sub_class_names(), &["Dog".to_string()]);
    assert!(animal.has_polymorphic_collection_id(dog.default_collection_id()));
    assert!(ctx.catalog.drop_class(s, "Animal").is_err());

    // added after Dog exists
    ctx.catalog
        .add_property(s, "Animal", NewProperty::new("age", PropertyType::Integer))
        .unwrap();
    let dog = ctx.catalog.snapshot().class("dog").unwrap();
    let age = dog.property("AGE").unwrap();
    assert_eq!(age.owner_class(), "Animal");
    assert_eq!(age.property_type(), PropertyType::Integer);
    assert!(dog.declared_property("age").is_none());
}

#[test]
fn test_inherited_property_follows_first_super_chain() {
    let ctx = TestContext::new();
    let s = &ctx.session;
    ctx.catalog.create_class(s, "Root", &[]).unwrap();
    ctx.catalog.create_class(s, "First", &["Root"]).unwrap();
    ctx.catalog.create_class(s, "Second", &[]).unwrap();
    ctx.catalog
        .add_property(s, "Root", NewProperty::new("code", PropertyType::String))
        .unwrap();
    ctx.catalog
        .alter_property(s, "Root", "code", PropertyChange::Mandatory(true))
        .unwrap();
    ctx.catalog
        .add_property(s, "Second", NewProperty::new("code", PropertyType::String))
        .unwrap();

    let child = ctx.catalog.create_class(s, "Child", &["First", "Second"]).unwrap();
    let code = child.property("code").unwrap();
    assert_eq!(code.owner_class(), "Root");
    assert!(code.descriptor().is_mandatory());

    ctx.catalog.set_super_classes(s, "Child", &["Second", "First"]).unwrap();
    let child = ctx.catalog.snapshot().class("Child").unwrap();
    let code = child.property("code").unwrap();
    assert_eq!(code.owner_class(), "Second");
    assert!(!code.descriptor().is_mandatory());
}

#[test]
fn test_conflicting_super_classes() {
    let ctx = TestContext::new();
    let s = &ctx.session;
    ctx.catalog.create_class(s, "Base", &[]).unwrap();
    ctx.catalog.create_class(s, "Other", &[]).unwrap();
    ctx.catalog
        .add_property(s, "Base", NewProperty::new("x", PropertyType::String))
        .unwrap();
    ctx.catalog
        .add_property(s, "Other", NewProperty::new("x", PropertyType::Integer))
        .unwrap();

    let err = ctx.catalog.create_class(s, "Child", &["Base", "Other"]).unwrap_err();
    assert!(err.is_schema_violation());
    assert!(!ctx.catalog.exists_class("Child"));

    ctx.catalog.create_class(s, "Child", &["Base"]).unwrap();
    assert!(ctx.catalog.add_super_class(s, "Child", "Other").is_err());
    let child = ctx.catalog.snapshot().class("Child").unwrap();
    assert_eq!(child.super_class_names(), &["Base".to_string()]);
}

#[test]
fn test_non_empty_class_cannot_become_abstract() {
    let ctx = TestContext::new();
    let s = &ctx.session;
    let person = ctx.catalog.create_class(s, "Person", &[]).unwrap();
    ctx.collections
        .insert_record(
            person.default_collection_id(),
            [("name", StoredValue::of(PropertyType::String))],
        )
        .unwrap();

    let err = ctx.catalog.set_abstract(s, "Person", true).unwrap_err();
    assert!(err.is_schema_violation());
    assert!(!ctx.catalog.snapshot().class("Person").unwrap().is_abstract());

    let err = ctx
        .catalog
        .add_property(s, "Person", NewProperty::new("name", PropertyType::Integer))
        .unwrap_err();
    assert!(matches!(err, Error::DataIncompatibility { .. }));
}

#[test]
fn test_schema_survives_reopen() {
    let ctx = TestContext::new();
    {
        let s = &ctx.session;
        ctx.catalog.create_abstract_class(s, "Animal", &[]).unwrap();
        ctx.catalog.create_class(s, "Dog", &["Animal"]).unwrap();
        ctx.catalog.create_class(s, "Scratch", &[]).unwrap();
        ctx.catalog
            .add_property(
                s,
                "Dog",
                NewProperty::new("tags", PropertyType::EmbeddedList)
                    .with_linked_type(PropertyType::String),
            )
            .unwrap();
        ctx.catalog
            .alter_property(s, "Dog", "tags", PropertyChange::Mandatory(true))
            .unwrap();
        ctx.catalog
            .alter_class(s, "Dog", ClassChange::Custom("owner".into(), Some("kennel".into())))
            .unwrap();
        ctx.catalog.drop_class(s, "Scratch").unwrap();
        ctx.catalog.add_blob_collection(s, 99).unwrap();
    }
    let dog_before = ctx.catalog.snapshot().class("Dog").unwrap();

    let ctx = ctx.reopen();
    let snapshot = ctx.catalog.snapshot();
    assert_eq!(snapshot.class_names(), vec!["Animal", "Dog"]);
    let dog = snapshot.class("Dog").unwrap();
    assert_eq!(dog.collection_ids(), dog_before.collection_ids());
    assert_eq!(dog.custom("owner"), Some("kennel"));
    let tags = dog.property("tags").unwrap();
    assert_eq!(tags.property_type(), PropertyType::EmbeddedList);
    assert_eq!(tags.descriptor().linked_type(), Some(PropertyType::String));
    assert!(tags.descriptor().is_mandatory());
    assert!(snapshot.class("Animal").unwrap().is_abstract());
    assert!(snapshot.blob_collections().contains(&99));
    assert!(snapshot.global_property(tags.descriptor().global_id()).is_some());
}

#[test]
fn test_index_follows_class() {
    let ctx = TestContext::new();
    let s = &ctx.session;
    ctx.catalog.create_class(s, "Person", &[]).unwrap();
    ctx.catalog
        .add_property(s, "Person", NewProperty::new("email", PropertyType::String))
        .unwrap();
    ctx.catalog
        .create_index(s, "Person", "Person.email", "UNIQUE", &["email"], &BTreeMap::new())
        .unwrap();

    let student = ctx.catalog.create_class(s, "Student", &["Person"]).unwrap();
    let index = ctx.indexes.index("Person.email").unwrap();
    assert!(index.collection_ids.contains(&student.default_collection_id()));
    let student = ctx.catalog.snapshot().class("Student").unwrap();
    assert_eq!(student.indexes().len(), 1);

    ctx.catalog.rename_class(s, "Person", "Member").unwrap();
    let index = ctx.indexes.index("Person.email").unwrap();
    assert_eq!(index.definition.class_name, "Member");
    assert_eq!(ctx.catalog.snapshot().class("Member").unwrap().indexes().len(), 1);
}

#[test]
fn test_lock_timeout() {
    let ctx = TestContext::with_config(
        CatalogConfig::new().with_lock_timeout(Duration::from_millis(50)),
    );
    let catalog = &ctx.catalog;
    let (locked_tx, locked_rx) = mpsc::channel();
    let (done_tx, done_rx) = mpsc::channel::<()>();

    thread::scope(|scope| {
        scope.spawn(move || {
            let session = SessionHandle::embedded("holder");
            let mut guard = catalog.write(&session).unwrap();
            guard.create_class("Held", &[]).unwrap();
            locked_tx.send(()).unwrap();
            done_rx.recv().unwrap();
            guard.release(true).unwrap();
        });

        locked_rx.recv().unwrap();
        let err = catalog.create_class(&ctx.session, "Other", &[]).unwrap_err();
        assert!(matches!(err, Error::LockTimeout { .. }));
        done_tx.send(()).unwrap();
    });

    assert!(catalog.exists_class("Held"));
    assert!(!catalog.exists_class("Other"));
    catalog.create_class(&ctx.session, "Other", &[]).unwrap();
}

#[test]
fn test_nested_write_detected_under_contention() {
    let ctx = TestContext::new();
    let catalog = &ctx.catalog;

    thread::scope(|scope| {
        for worker in 0..2 {
            scope.spawn(move || {
                let session = SessionHandle::embedded(format!("writer-{}", worker));
                for _ in 0..200 {
                    let guard = catalog.write(&session).unwrap();
                    assert!(matches!(catalog.write(&session), Err(Error::NestedWrite)));
                    guard.release(false).unwrap();
                }
            });
        }
    });

    assert_eq!(catalog.version(), 0);
    catalog.create_class(&ctx.session, "After", &[]).unwrap();
}

#[test]
fn test_schema_changes_inside_transaction() {
    let ctx = TestContext::new();
    ctx.catalog.create_class(&ctx.session, "Person", &[]).unwrap();

    let transactions = Arc::new(LocalTransactions::new());
    let session = SessionHandle::new("tx", Arc::new(AllowAll), transactions.clone());
    transactions.begin();

    let err = ctx
        .catalog
        .add_property(&session, "Person", NewProperty::new("name", PropertyType::String))
        .unwrap_err();
    assert!(matches!(err, Error::TransactionState(_)));
    assert!(matches!(
        ctx.catalog.drop_class(&session, "Person"),
        Err(Error::TransactionState(_))
    ));
    assert!(matches!(
        ctx.catalog.create_class(&session, "Car", &[]),
        Err(Error::TransactionState(_))
    ));
    assert!(!ctx.catalog.exists_class("Car"));
    assert_eq!(transactions.exclusive_depth(), 0);

    transactions.commit();
    ctx.catalog
        .add_property(&session, "Person", NewProperty::new("name", PropertyType::String))
        .unwrap();
    ctx.catalog.create_class(&session, "Car", &[]).unwrap();
}

#[test]
fn test_permissions_are_checked() {
    let ctx = TestContext::new();
    ctx.catalog.create_class(&ctx.session, "Person", &[]).unwrap();
    ctx.catalog.create_class(&ctx.session, "Secret", &[]).unwrap();

    let checker =
        RoleChecker::from_strings(&["read:schema", "read:class:Person", "update:schema:Person"])
            .unwrap();
    let session = SessionHandle::new("reader", Arc::new(checker), Arc::new(LocalTransactions::new()));

    assert!(ctx.catalog.snapshot_for(&session).is_ok());
    assert!(ctx.catalog.class_for(&session, "person").is_ok());
    assert!(matches!(
        ctx.catalog.class_for(&session, "Secret"),
        Err(Error::Security(_))
    ));
    assert!(matches!(
        ctx.catalog.create_class(&session, "Intruder", &[]),
        Err(Error::Security(_))
    ));
    assert!(matches!(
        ctx.catalog.drop_class(&session, "Person"),
        Err(Error::Security(_))
    ));
    ctx.catalog
        .add_property(&session, "Person", NewProperty::new("name", PropertyType::String))
        .unwrap();
    assert!(matches!(
        ctx.catalog.drop_property(&session, "Person", "name"),
        Err(Error::Security(_))
    ));
    assert!(!ctx.catalog.exists_class("Intruder"));

    let checker = RoleChecker::from_strings(&["delete:schema:Person"]).unwrap();
    let session = SessionHandle::new("owner", Arc::new(checker), Arc::new(LocalTransactions::new()));
    ctx.catalog.drop_property(&session, "Person", "name").unwrap();
    assert!(!ctx.catalog.snapshot().class("Person").unwrap().exists_property("name"));
}

#[test]
fn test_closed_session_and_remote_mode() {
    let ctx = TestContext::new();
    let closed = SessionHandle::embedded("closed");
    closed.close();
    assert!(matches!(
        ctx.catalog.create_class(&closed, "Person", &[]),
        Err(Error::SessionClosed)
    ));

    let remote = TestContext::with_config(CatalogConfig::remote());
    assert!(matches!(
        remote.catalog.create_class(&remote.session, "Person", &[]),
        Err(Error::ReadOnly(_))
    ));
    assert!(matches!(
        remote.catalog.write(&remote.session),
        Err(Error::ReadOnly(_))
    ));
    remote.catalog.reload(&remote.session).unwrap();
    assert_eq!(remote.catalog.count_classes(), 0);
}
