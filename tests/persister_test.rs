use arkiv::error::EngineError;
use arkiv::graph::{GraphStore, PropertyValue};
use arkiv::index::EntityIndex;
use arkiv::persistence::{BundlePersister, CascadeConsent, MutationState, Serializer};
use arkiv::{Bundle, EngineConfig, SchemaRegistry};

fn description(lang: &str, title: &str) -> Bundle {
    Bundle::new("UnitDescription")
        .with_value("languageCode", lang)
        .with_value("title", title)
}

fn dated(bundle: Bundle, start: &str) -> Bundle {
    bundle.with_relation_item("hasDate", Bundle::new("DatePeriod").with_value("startDate", start))
}

fn unit(identifier: &str, descriptions: Vec<Bundle>) -> Bundle {
    Bundle::new("Unit")
        .with_value("identifier", identifier)
        .with_relation("describes", descriptions)
}

#[test]
fn test_mutation_states_across_reimport() {
    let registry = SchemaRegistry::archival();
    let config = EngineConfig::default();
    let persister = BundlePersister::new(&registry, &config);
    let mut store = GraphStore::new();

    let first = persister
        .create_or_update(&mut store, &unit("c1", vec![description("en", "Letters")]))
        .unwrap();
    assert_eq!(first.state(), MutationState::Created);
    assert_eq!(first.node().id, "c1");

    let second = persister
        .create_or_update(&mut store, &unit("c1", vec![description("en", "Letters")]))
        .unwrap();
    assert_eq!(second.state(), MutationState::Unchanged);
    assert!(second.prior().is_none());

    let third = persister
        .create_or_update(&mut store, &unit("c1", vec![description("en", "Correspondence")]))
        .unwrap();
    assert_eq!(third.state(), MutationState::Updated);
    let prior = third.prior().unwrap();
    assert_eq!(
        prior.relation("describes")[0].value("title"),
        Some(&PropertyValue::from("Letters"))
    );

    let desc = store.entity("c1.en").unwrap();
    let current = Serializer::new(&registry, &config).to_bundle(&store, &desc).unwrap();
    assert_eq!(current.value("title"), Some(&PropertyValue::from("Correspondence")));
}

#[test]
fn test_create_rejects_existing_root() {
    let registry = SchemaRegistry::archival();
    let config = EngineConfig::default();
    let persister = BundlePersister::new(&registry, &config);
    let mut store = GraphStore::new();

    persister.create(&mut store, &unit("c1", vec![description("en", "A")])).unwrap();
    let err = persister
        .create(&mut store, &unit("c1", vec![description("en", "A")]))
        .unwrap_err();
    assert!(matches!(err, EngineError::Integrity(_)), "{err:?}");
}

#[test]
fn test_cascading_delete_counts_whole_subtree() {
    let registry = SchemaRegistry::archival();
    let config = EngineConfig::default();
    let persister = BundlePersister::new(&registry, &config);
    let mut store = GraphStore::new();

    let tree = unit(
        "c1",
        vec![
            dated(description("en", "Letters"), "1901-01-01"),
            dated(description("fr", "Lettres"), "1901-01-01"),
        ],
    );
    persister.create(&mut store, &tree).unwrap();
    assert_eq!(store.node_count(), 5);

    let target = Bundle::new("Unit").with_id("c1");
    let err = persister
        .delete_with(&mut store, &target, CascadeConsent::Shallow)
        .unwrap_err();
    assert!(matches!(err, EngineError::Hierarchy(_)), "{err:?}");
    assert_eq!(store.node_count(), 5);

    assert_eq!(persister.delete(&mut store, &target).unwrap(), 5);
    assert_eq!(store.node_count(), 0);
    assert!(!store.exists("c1.en"));
}

#[test]
fn test_shallow_delete_of_single_level() {
    let registry = SchemaRegistry::archival();
    let config = EngineConfig::default();
    let persister = BundlePersister::new(&registry, &config);
    let mut store = GraphStore::new();

    persister
        .create(&mut store, &unit("c1", vec![description("en", "A"), description("de", "B")]))
        .unwrap();
    let removed = persister
        .delete_with(&mut store, &Bundle::new("Unit").with_id("c1"), CascadeConsent::Shallow)
        .unwrap();
    assert_eq!(removed, 3);
}

#[test]
fn test_missing_reference_rolls_back_transaction() {
    let registry = SchemaRegistry::archival();
    let config = EngineConfig::default();
    let persister = BundlePersister::new(&registry, &config);
    let mut store = GraphStore::new();

    let result = {
        let mut tx = store.begin();
        persister
            .create(&mut tx, &Bundle::new("Country").with_value("identifier", "gb"))
            .unwrap();
        let held = unit("c1", vec![description("en", "A")])
            .with_relation_item("heldBy", Bundle::new("Repository").with_id("nowhere"));
        let result = persister.create(&mut tx, &held);
        if result.is_ok() {
            tx.commit();
        } else {
            tx.rollback();
        }
        result
    };

    match result {
        Err(err) => assert!(err.is_not_found(), "{err:?}"),
        Ok(entity) => panic!("created {entity}"),
    }
    assert_eq!(store.node_count(), 0);
    assert!(!store.exists("gb"));
}

#[test]
fn test_references_follow_updates() {
    let registry = SchemaRegistry::archival();
    let config = EngineConfig::default();
    let persister = BundlePersister::new(&registry, &config);
    let mut store = GraphStore::new();

    for id in ["r1", "r2"] {
        persister
            .create(&mut store, &Bundle::new("Repository").with_value("identifier", id))
            .unwrap();
    }
    let held_by = |repo: &str| {
        unit("c1", vec![description("en", "A")]).with_relation_item("heldBy", Bundle::new("Repository").with_id(repo))
    };
    persister.create(&mut store, &held_by("r1")).unwrap();

    let same = persister.update(&mut store, &held_by("r1")).unwrap();
    assert!(same.unchanged_existing());

    let moved = persister.update(&mut store, &held_by("r2")).unwrap();
    assert!(moved.updated_existing());

    let c1 = store.entity("c1").unwrap();
    let bundle = Serializer::new(&registry, &config).to_bundle(&store, &c1).unwrap();
    assert_eq!(bundle.relation("heldBy")[0].id(), Some("r2"));
}

#[test]
fn test_scoped_ids() {
    let registry = SchemaRegistry::archival();
    let config = EngineConfig::default();
    let mut store = GraphStore::new();
    let persister = BundlePersister::new(&registry, &config);

    let country = persister
        .create(&mut store, &Bundle::new("Country").with_value("identifier", "gb"))
        .unwrap();
    let repo = BundlePersister::new(&registry, &config)
        .with_scope(&store, &country)
        .create(&mut store, &Bundle::new("Repository").with_value("identifier", "r1"))
        .unwrap();
    assert_eq!(repo.id, "gb-r1");

    let child = BundlePersister::new(&registry, &config)
        .with_scope(&store, &repo)
        .create(&mut store, &unit("C 1", vec![description("en", "A")]))
        .unwrap();
    assert_eq!(child.id, "gb-r1-c_1");
    assert!(store.exists("gb-r1-c_1.en"));
}

#[test]
fn test_colliding_nested_ids_leave_no_writes() {
    let registry = SchemaRegistry::archival();
    let config = EngineConfig::default();
    let persister = BundlePersister::new(&registry, &config);
    let mut store = GraphStore::new();

    let repository = |addresses: Vec<Bundle>| {
        Bundle::new("Repository").with_value("identifier", "r1").with_relation_item(
            "describes",
            Bundle::new("RepositoryDescription")
                .with_value("languageCode", "en")
                .with_value("name", "Archive")
                .with_relation("hasAddress", addresses),
        )
    };

    let twice = vec![Bundle::new("Address").with_id("a1"), Bundle::new("Address").with_id("a1")];
    let err = persister.create(&mut store, &repository(twice)).unwrap_err();
    assert!(matches!(err, EngineError::Validation(_)), "{err:?}");
    assert_eq!(store.node_count(), 0);

    persister.create(&mut store, &unit("c1", vec![])).unwrap();
    let taken = vec![Bundle::new("Address").with_id("c1")];
    let err = persister.create(&mut store, &repository(taken)).unwrap_err();
    assert!(matches!(err, EngineError::Integrity(_)), "{err:?}");
    assert_eq!(store.node_count(), 1);
    assert!(!store.exists("r1"));
}
