use anyhow::Context;
use arkiv::index::apply_index_policy;
use arkiv::{
    Accessor, AclManager, ActionManager, Bundle, BundlePersister, EngineConfig, EventType, GraphStore, Query,
    SchemaRegistry, SortOrder,
};

fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt::init();

    println!("Arkiv v{}", arkiv::version());
    println!("==========================================");

    let config = match std::env::args().nth(1) {
        Some(path) => EngineConfig::load(&path).with_context(|| format!("loading {}", path))?,
        None => EngineConfig::default(),
    };
    let registry = SchemaRegistry::archival();
    let mut store = GraphStore::new();
    apply_index_policy(&mut store, &registry, &config);

    let persister = BundlePersister::new(&registry, &config);
    let actions = ActionManager::new(&registry, &config);
    let acl = AclManager::new(&registry, &config);

    // Accounts
    println!("\n=== Accounts ===");
    let staff = persister.create(
        &mut store,
        &Bundle::new("Group")
            .with_value("identifier", "staff")
            .with_value("name", "Staff"),
    )?;
    let user = persister.create(
        &mut store,
        &Bundle::new("UserProfile")
            .with_value("identifier", "mike")
            .with_value("name", "Mike")
            .with_value("email", "mike@example.org"),
    )?;
    acl.add_to_group(&mut store, &staff, &user)?;
    println!("✓ {} joined {}", user, staff);

    // A repository and one of its units, inside a single transaction
    println!("\n=== Documents ===");
    let unit = {
        let mut tx = store.begin();
        let country = persister.create(&mut tx, &Bundle::new("Country").with_value("identifier", "gb"))?;
        let repo = BundlePersister::new(&registry, &config).with_scope(&tx, &country).create(
            &mut tx,
            &Bundle::new("Repository")
                .with_value("identifier", "r1")
                .with_relation_item(
                    "describes",
                    Bundle::new("RepositoryDescription")
                        .with_value("languageCode", "en")
                        .with_value("name", "County Record Office"),
                ),
        )?;
        let unit = BundlePersister::new(&registry, &config).with_scope(&tx, &repo).create(
            &mut tx,
            &unit_bundle("Letters of the Smith family"),
        )?;
        actions
            .new_event_context(&unit, &user, EventType::Creation, Some("initial import"))
            .commit(&mut tx)?;
        tx.commit();
        unit
    };
    println!("✓ Created {}", unit);

    // Same document again: nothing changes
    let mutation = persister.create_or_update(&mut store, &unit_bundle("Letters of the Smith family").with_id(&unit.id))?;
    println!("✓ Re-import of {} -> {}", unit.id, mutation.state());

    // Retitle, keeping the prior state as a version
    let mut context = actions.new_event_context(&unit, &user, EventType::Modification, Some("retitled"));
    let mutation = persister.update(&mut store, &unit_bundle("Smith family correspondence").with_id(&unit.id))?;
    if let Some(prior) = mutation.prior() {
        context.create_version_from(&unit, prior.clone());
    }
    context.commit(&mut store)?;
    println!("✓ Update of {} -> {}", unit.id, mutation.state());

    for event in actions.subject_history(&store, &unit)? {
        println!(
            "  {} {} {}",
            event.timestamp.to_rfc3339(),
            event.event_type,
            event.log_message.as_deref().unwrap_or("")
        );
    }
    for version in actions.versions(&store, &unit)? {
        println!("  version of {}: {}", version.entity_id, version.data.to_json()?);
    }

    // Restrict the unit to staff and list units as different accessors
    println!("\n=== Access ===");
    acl.set_accessors(&mut store, &unit, &[staff.clone()])?;
    let query = Query::new(&config).order_by("identifier", SortOrder::Asc);
    for accessor in [Accessor::Anonymous, Accessor::from(&user)] {
        let page = query.page(&store, &acl, "Unit", &accessor);
        let total = page.total().unwrap_or_default();
        let ids: Vec<String> = page.map(|e| e.id).collect();
        println!("  {} sees {} unit(s): {:?}", accessor, total, ids);
    }

    println!("\nGraph holds {} vertices and {} edges", store.node_count(), store.edge_count());
    Ok(())
}

fn unit_bundle(title: &str) -> Bundle {
    Bundle::new("Unit").with_value("identifier", "c1").with_relation_item(
        "describes",
        Bundle::new("UnitDescription")
            .with_value("languageCode", "en")
            .with_value("title", title)
            .with_value("levelOfDescription", "file"),
    )
}
