use arkiv::acl::{Accessor, AclManager, PermissionTarget, PermissionType};
use arkiv::error::EngineError;
use arkiv::graph::GraphStore;
use arkiv::index::Entity;
use arkiv::persistence::BundlePersister;
use arkiv::{Bundle, EngineConfig, SchemaRegistry};

fn account(persister: &BundlePersister, store: &mut GraphStore, ty: &str, id: &str, groups: &[&str]) -> Entity {
    let refs = groups.iter().map(|g| Bundle::new("Group").with_id(*g)).collect();
    persister
        .create(
            store,
            &Bundle::new(ty)
                .with_value("identifier", id)
                .with_value("name", id)
                .with_relation("belongsTo", refs),
        )
        .unwrap()
}

fn unit(persister: &BundlePersister, store: &mut GraphStore, id: &str) -> Entity {
    persister
        .create(store, &Bundle::new("Unit").with_value("identifier", id))
        .unwrap()
}

struct Fixture {
    store: GraphStore,
    staff: Entity,
    archivists: Entity,
    mike: Entity,
    eve: Entity,
    root: Entity,
}

fn fixture(registry: &SchemaRegistry, config: &EngineConfig) -> Fixture {
    let persister = BundlePersister::new(registry, config);
    let mut store = GraphStore::new();
    account(&persister, &mut store, "Group", "admin", &[]);
    let staff = account(&persister, &mut store, "Group", "staff", &[]);
    let archivists = account(&persister, &mut store, "Group", "archivists", &["staff"]);
    let mike = account(&persister, &mut store, "UserProfile", "mike", &["archivists"]);
    let eve = account(&persister, &mut store, "UserProfile", "eve", &[]);
    let root = account(&persister, &mut store, "UserProfile", "root", &["admin"]);
    Fixture {
        store,
        staff,
        archivists,
        mike,
        eve,
        root,
    }
}

#[test]
fn test_visibility_through_nested_groups() {
    let registry = SchemaRegistry::archival();
    let config = EngineConfig::default();
    let persister = BundlePersister::new(&registry, &config);
    let acl = AclManager::new(&registry, &config);
    let mut f = fixture(&registry, &config);

    let open = unit(&persister, &mut f.store, "c1");
    let closed = unit(&persister, &mut f.store, "c2");
    acl.set_accessors(&mut f.store, &closed, &[f.staff.clone()]).unwrap();

    assert_eq!(acl.groups(&f.store, &f.mike), vec![f.archivists.clone()]);
    assert_eq!(acl.accessors(&f.store, &closed), vec![f.staff.clone()]);

    let mike = Accessor::from(&f.mike);
    let eve = Accessor::from(&f.eve);
    let root = Accessor::from(&f.root);
    for accessor in [&mike, &eve, &root, &Accessor::Anonymous] {
        assert!(acl.is_accessible(&f.store, &open, accessor), "{accessor}");
    }
    assert!(acl.is_accessible(&f.store, &closed, &mike));
    assert!(acl.is_accessible(&f.store, &closed, &root));
    assert!(!acl.is_accessible(&f.store, &closed, &eve));
    assert!(!acl.is_accessible(&f.store, &closed, &Accessor::Anonymous));

    // the filter resolves groups once and is reused over many items
    let visible_to_eve = acl.acl_filter(&f.store, &eve);
    let visible: Vec<&Entity> = [&open, &closed].into_iter().filter(|e| visible_to_eve(*e)).collect();
    assert_eq!(visible, vec![&open]);
    drop(visible_to_eve);

    acl.set_accessors(&mut f.store, &closed, &[]).unwrap();
    assert!(acl.is_accessible(&f.store, &closed, &eve));
}

#[test]
fn test_admin_status() {
    let registry = SchemaRegistry::archival();
    let config = EngineConfig::default();
    let acl = AclManager::new(&registry, &config);
    let f = fixture(&registry, &config);

    assert!(acl.is_admin(&f.store, &Accessor::from(&f.root)));
    assert!(!acl.is_admin(&f.store, &Accessor::from(&f.mike)));
    assert!(!acl.is_admin(&f.store, &Accessor::Anonymous));
}

#[test]
fn test_inherited_item_and_type_permissions() {
    let registry = SchemaRegistry::archival();
    let config = EngineConfig::default();
    let persister = BundlePersister::new(&registry, &config);
    let acl = AclManager::new(&registry, &config);
    let mut f = fixture(&registry, &config);
    let c1 = unit(&persister, &mut f.store, "c1");

    let staff = Accessor::from(&f.staff);
    let mike = Accessor::from(&f.mike);
    acl.grant_permission(&mut f.store, &staff, &PermissionTarget::Item(c1.clone()), PermissionType::Update)
        .unwrap();
    assert!(acl.has_permission(&f.store, &c1, PermissionType::Update, &mike).unwrap());
    assert!(!acl.has_permission(&f.store, &c1, PermissionType::Delete, &mike).unwrap());
    assert!(acl
        .has_permission(&f.store, &c1, PermissionType::Delete, &Accessor::from(&f.root))
        .unwrap());

    let err = acl
        .check_entity_permission(&f.store, &c1, &Accessor::from(&f.eve), PermissionType::Update)
        .unwrap_err();
    assert!(matches!(err, EngineError::PermissionDenied(_)));

    let archivists = Accessor::from(&f.archivists);
    let all_units = PermissionTarget::ContentType("Unit".to_string());
    acl.grant_permission(&mut f.store, &archivists, &all_units, PermissionType::Owner)
        .unwrap();
    assert!(acl
        .has_content_type_permission(&f.store, "Unit", PermissionType::Create, &mike)
        .unwrap());
    assert!(acl.has_permission(&f.store, &c1, PermissionType::Delete, &mike).unwrap());
    assert!(!acl
        .has_content_type_permission(&f.store, "Repository", PermissionType::Create, &mike)
        .unwrap());

    let inherited = acl.inherited_global_permissions(&f.store, &f.mike).unwrap();
    assert_eq!(inherited[0].0, f.mike);
    assert!(inherited[0].1.is_empty());
    let from_archivists = inherited.iter().find(|(e, _)| *e == f.archivists).unwrap();
    assert_eq!(from_archivists.1["Unit"], vec![PermissionType::Owner]);

    assert!(acl
        .revoke_permission(&mut f.store, &archivists, &all_units, PermissionType::Owner)
        .unwrap());
    assert!(!acl.has_permission(&f.store, &c1, PermissionType::Delete, &mike).unwrap());
}

#[test]
fn test_grants_on_a_scope_cover_its_items() {
    let registry = SchemaRegistry::archival();
    let config = EngineConfig::default();
    let persister = BundlePersister::new(&registry, &config);
    let acl = AclManager::new(&registry, &config);
    let mut f = fixture(&registry, &config);

    let repo = persister
        .create(&mut f.store, &Bundle::new("Repository").with_value("identifier", "r1"))
        .unwrap();
    let scoped = BundlePersister::new(&registry, &config).with_scope(&f.store, &repo);
    let c1 = scoped
        .create(&mut f.store, &Bundle::new("Unit").with_value("identifier", "c1"))
        .unwrap();
    let elsewhere = unit(&persister, &mut f.store, "c2");

    let mike = Accessor::from(&f.mike);
    acl.grant_permission(&mut f.store, &mike, &PermissionTarget::Item(repo.clone()), PermissionType::Annotate)
        .unwrap();
    assert!(acl.has_permission(&f.store, &c1, PermissionType::Annotate, &mike).unwrap());
    assert!(!acl
        .has_permission(&f.store, &elsewhere, PermissionType::Annotate, &mike)
        .unwrap());

    // type-wide grants made within a scope stay inside it
    let in_repo = AclManager::new(&registry, &config).with_scope(repo.clone());
    in_repo
        .grant_permission(&mut f.store, &mike, &PermissionTarget::ContentType("Unit".into()), PermissionType::Update)
        .unwrap();
    assert!(acl.has_permission(&f.store, &c1, PermissionType::Update, &mike).unwrap());
    assert!(!acl.has_permission(&f.store, &elsewhere, PermissionType::Update, &mike).unwrap());
    assert!(in_repo
        .has_content_type_permission(&f.store, "Unit", PermissionType::Update, &mike)
        .unwrap());
    assert!(!acl
        .has_content_type_permission(&f.store, "Unit", PermissionType::Update, &mike)
        .unwrap());
}

#[test]
fn test_grants_need_a_real_accessor() {
    let registry = SchemaRegistry::archival();
    let config = EngineConfig::default();
    let persister = BundlePersister::new(&registry, &config);
    let acl = AclManager::new(&registry, &config);
    let mut f = fixture(&registry, &config);
    let c1 = unit(&persister, &mut f.store, "c1");
    let target = PermissionTarget::Item(c1.clone());

    let err = acl
        .grant_permission(&mut f.store, &Accessor::Anonymous, &target, PermissionType::Update)
        .unwrap_err();
    assert!(matches!(err, EngineError::PermissionDenied(_)));
    assert!(!acl
        .has_permission(&f.store, &c1, PermissionType::Update, &Accessor::Anonymous)
        .unwrap());

    let mike = Accessor::from(&f.mike);
    let first = acl.grant_permission(&mut f.store, &mike, &target, PermissionType::Update).unwrap();
    let again = acl.grant_permission(&mut f.store, &mike, &target, PermissionType::Update).unwrap();
    assert_eq!(first.entity, again.entity);

    acl.set_item_permissions(&mut f.store, &c1, &mike, &[PermissionType::Delete, PermissionType::Annotate])
        .unwrap();
    assert_eq!(
        acl.item_permissions(&f.store, &c1, &f.mike).unwrap(),
        vec![PermissionType::Delete, PermissionType::Annotate]
    );
}

#[test]
fn test_membership_changes() {
    let registry = SchemaRegistry::archival();
    let config = EngineConfig::default();
    let acl = AclManager::new(&registry, &config);
    let mut f = fixture(&registry, &config);

    let err = acl.add_to_group(&mut f.store, &f.archivists, &f.staff).unwrap_err();
    assert!(matches!(err, EngineError::Hierarchy(_)));

    acl.add_to_group(&mut f.store, &f.staff, &f.eve).unwrap();
    assert!(acl.group_closure(&f.store, &f.eve).contains(&f.staff.node));
    assert!(acl.remove_from_group(&mut f.store, &f.staff, &f.eve).unwrap());
    assert!(!acl.remove_from_group(&mut f.store, &f.staff, &f.eve).unwrap());
    assert!(acl.groups(&f.store, &f.eve).is_empty());
}

#[test]
fn test_membership_cycles_rejected_on_import() {
    let registry = SchemaRegistry::archival();
    let config = EngineConfig::default();
    let persister = BundlePersister::new(&registry, &config);
    let acl = AclManager::new(&registry, &config);
    let mut f = fixture(&registry, &config);

    let group = |id: &str, groups: &[&str]| {
        Bundle::new("Group")
            .with_value("identifier", id)
            .with_value("name", id)
            .with_relation("belongsTo", groups.iter().map(|g| Bundle::new("Group").with_id(*g)).collect())
    };

    // archivists already belongs to staff
    let err = persister.update(&mut f.store, &group("staff", &["archivists"])).unwrap_err();
    assert!(matches!(err, EngineError::Hierarchy(_)), "{err:?}");
    assert!(acl.groups(&f.store, &f.staff).is_empty());

    let err = persister.update(&mut f.store, &group("staff", &["staff"])).unwrap_err();
    assert!(matches!(err, EngineError::Hierarchy(_)), "{err:?}");

    persister.update(&mut f.store, &group("staff", &["admin"])).unwrap();
    assert_eq!(acl.groups(&f.store, &f.staff).len(), 1);
}
