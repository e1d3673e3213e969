use arkiv::bundle::{Bundle, PathError};
use arkiv::error::{EngineError, EngineResult};
use arkiv::graph::{GraphStore, PropertyValue};
use arkiv::persistence::{BundlePersister, MutationState, Serializer};
use arkiv::{EngineConfig, SchemaRegistry};

const UNIT_JSON: &str = r#"{
  "id": "c1",
  "type": "Unit",
  "data": { "identifier": "c1", "extent": 3 },
  "relationships": {
    "describes": [
      {
        "type": "UnitDescription",
        "data": { "languageCode": "en", "title": "Letters", "levelOfDescription": "file" },
        "relationships": {
          "hasDate": [ { "type": "DatePeriod", "data": { "startDate": "1939" } } ]
        }
      }
    ]
  }
}"#;

#[test]
fn test_json_import_and_reexport() {
    let registry = SchemaRegistry::archival();
    let config = EngineConfig::default();
    let persister = BundlePersister::new(&registry, &config);
    let mut store = GraphStore::new();

    let incoming = Bundle::from_json(UNIT_JSON).unwrap();
    assert_eq!(incoming.count(), 3);
    let c1 = persister.create(&mut store, &incoming).unwrap();

    let exported = Serializer::new(&registry, &config).to_json(&store, &c1).unwrap();
    let reread = Bundle::from_json(&exported).unwrap();
    assert_eq!(reread, incoming);
    assert_eq!(reread.get_bundle("describes[0]").unwrap().id(), Some("c1.en"));

    // feeding the export back in is a no-op
    let again = persister.create_or_update(&mut store, &reread).unwrap();
    assert_eq!(again.state(), MutationState::Unchanged);
}

#[test]
fn test_path_edits_drive_updates() -> EngineResult<()> {
    let registry = SchemaRegistry::archival();
    let config = EngineConfig::default();
    let persister = BundlePersister::new(&registry, &config);
    let serializer = Serializer::new(&registry, &config).dependent_only();
    let mut store = GraphStore::new();

    let c1 = persister.create(&mut store, &Bundle::from_json(UNIT_JSON)?)?;
    let current = serializer.to_bundle(&store, &c1)?;

    let edited = current
        .set_value("describes[0]/title", "Family letters")?
        .set_bundle(
            "describes[0]/hasDate[-1]",
            Bundle::new("DatePeriod").with_value("startDate", "1945"),
        )?;
    let mutation = persister.update(&mut store, &edited)?;
    assert_eq!(mutation.state(), MutationState::Updated);

    let stored = serializer.to_bundle(&store, &c1)?;
    assert_eq!(
        stored.get_value("describes[0]/title")?,
        Some(&PropertyValue::from("Family letters"))
    );
    assert_eq!(stored.get_relations("describes[0]/hasDate")?.len(), 2);

    let trimmed = stored.delete_bundle("describes[0]/hasDate[0]")?;
    persister.update(&mut store, &trimmed)?;
    let stored = serializer.to_bundle(&store, &c1)?;
    let dates = stored.get_relations("describes[0]/hasDate")?;
    assert_eq!(dates.len(), 1);
    assert_eq!(dates[0].value("startDate"), Some(&PropertyValue::from("1945")));
    Ok(())
}

#[test]
fn test_path_errors() {
    let bundle = Bundle::from_json(UNIT_JSON).unwrap();

    let missing = bundle.get_bundle("hasAddress[0]").unwrap_err();
    assert!(matches!(missing, PathError::MissingSegment { .. }), "{missing:?}");

    let out_of_bounds = bundle.get_bundle("describes[3]").unwrap_err();
    assert!(matches!(out_of_bounds, PathError::Index { .. }), "{out_of_bounds:?}");

    let err: EngineError = bundle.delete_bundle("describes[-1]").unwrap_err().into();
    assert!(matches!(err, EngineError::Path(PathError::Index { .. })), "{err:?}");
}

#[test]
fn test_lite_serialization() {
    let registry = SchemaRegistry::archival();
    let config = EngineConfig::default();
    let persister = BundlePersister::new(&registry, &config);
    let mut store = GraphStore::new();
    let c1 = persister.create(&mut store, &Bundle::from_json(UNIT_JSON).unwrap()).unwrap();

    let lite = Serializer::new(&registry, &config).lite().to_bundle(&store, &c1).unwrap();
    assert!(lite.value("extent").is_none());
    assert_eq!(lite.value("identifier"), Some(&PropertyValue::from("c1")));

    let with_extent = Serializer::new(&registry, &config)
        .lite()
        .include_props(&["extent"])
        .to_bundle(&store, &c1)
        .unwrap();
    assert_eq!(with_extent.value("extent"), Some(&PropertyValue::from(3i64)));
}
