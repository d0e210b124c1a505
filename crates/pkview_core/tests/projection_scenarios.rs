use pkview_core::{
    default_maps_dir, DomainObject, MapRegistry, ObjectRef, ProjectionEngine, ProjectionError,
    PropertyValue,
};
use serde_json::{json, Value};

fn species(id: &str, name: &str) -> ObjectRef {
    DomainObject::new("Species")
        .with("SessionID", json!(id))
        .with("Name", json!(name))
        .with("InitialAmount", json!(0.0))
        .with("InitialAmountUnits", json!("milligram"))
        .into_ref()
}

fn model(species: Vec<ObjectRef>) -> ObjectRef {
    DomainObject::new("Model")
        .with("SessionID", json!("M1"))
        .with("Name", json!("two-compartment"))
        .with("Species", species)
        .with("Parameters", PropertyValue::Objects(Vec::new()))
        .with("Doses", PropertyValue::Objects(Vec::new()))
        .with("Variants", PropertyValue::Objects(Vec::new()))
        .into_ref()
}

fn plot_settings() -> ObjectRef {
    DomainObject::new("PlotSettings")
        .with("Title", json!("Plasma concentration"))
        .with("XLabel", json!("Time"))
        .with("YLabel", json!("Concentration"))
        .with("XScale", json!("linear"))
        .with("YScale", json!("log"))
        .with("ShowLegend", json!(true))
        .into_ref()
}

fn analysis(model: Option<ObjectRef>, selected: Vec<ObjectRef>) -> ObjectRef {
    let model = model.map_or(PropertyValue::Empty, PropertyValue::Object);
    DomainObject::new("Analysis")
        .with("Name", json!("Simulation 1"))
        .with("Description", json!(""))
        .with("ModelObj", model)
        .with("SelectedSpecies", selected)
        .with("SelectedParams", PropertyValue::Objects(Vec::new()))
        .with("SelectedDoses", PropertyValue::Objects(Vec::new()))
        .with("SelectedVariants", PropertyValue::Objects(Vec::new()))
        .with("StartTime", json!(0))
        .with("StopTime", json!(24))
        .with("PlotSettings", plot_settings())
        .with("FilePath", json!("/data/sim1.mat"))
        .into_ref()
}

fn registry() -> MapRegistry {
    MapRegistry::load(default_maps_dir()).unwrap()
}

#[test]
fn model_species_are_embedded_and_selections_are_markers() {
    let registry = registry();
    let s1 = species("S1", "Central");
    let s2 = species("S2", "Peripheral");
    let s3 = species("S3", "Effect");
    let root = analysis(
        Some(model(vec![s1.clone(), s2.clone(), s3])),
        vec![s1, s2],
    );

    let projected = ProjectionEngine::new(&registry).to_json(&root).unwrap();

    let model_species = projected["Model"]["Species"].as_array().unwrap();
    assert_eq!(model_species.len(), 3);
    assert_eq!(
        model_species[0],
        json!({
            "$class": "Species",
            "SessionID": "S1",
            "Name": "Central",
            "InitialAmount": 0.0,
            "Units": "milligram"
        })
    );
    assert_eq!(model_species[2]["SessionID"], json!("S3"));

    assert_eq!(
        projected["SelectedSpecies"],
        json!([
            {"$ref": "S1", "$class": "Species"},
            {"$ref": "S2", "$class": "Species"}
        ])
    );
}

#[test]
fn references_never_embed_properties_even_when_projected_first() {
    let registry = registry();
    let s1 = species("S1", "Central");
    let root = analysis(None, vec![s1]);

    let projected = ProjectionEngine::new(&registry).to_json(&root).unwrap();

    assert_eq!(projected["Model"], Value::Null);
    let marker = projected["SelectedSpecies"][0].as_object().unwrap();
    assert_eq!(marker.len(), 2);
    assert!(!marker.contains_key("Name"));
}

#[test]
fn keys_follow_declared_order_after_class_tag() {
    let registry = registry();
    let root = analysis(Some(model(Vec::new())), Vec::new());

    let projected = ProjectionEngine::new(&registry).to_json(&root).unwrap();
    let keys: Vec<&str> = projected
        .as_object()
        .unwrap()
        .keys()
        .map(String::as_str)
        .collect();
    assert_eq!(
        keys,
        vec![
            "$class",
            "Name",
            "Description",
            "Model",
            "SelectedSpecies",
            "SelectedParameters",
            "SelectedDoses",
            "SelectedVariants",
            "StartTime",
            "StopTime",
            "PlotSettings",
            "FilePath",
        ]
    );
    assert_eq!(projected["$class"], json!("PKPDAnalysis"));
}

#[test]
fn empty_array_properties_project_to_empty_arrays() {
    let registry = registry();
    let root = analysis(Some(model(Vec::new())), Vec::new());

    let projected = ProjectionEngine::new(&registry).to_json(&root).unwrap();

    assert_eq!(projected["Model"]["Species"], json!([]));
    assert_eq!(projected["Model"]["Doses"], json!([]));
    assert_eq!(projected["SelectedSpecies"], json!([]));
    assert_eq!(projected["SelectedVariants"], json!([]));
}

#[test]
fn unmapped_root_type_fails() {
    let registry = registry();
    let root = DomainObject::new("Compartment").into_ref();

    let err = ProjectionEngine::new(&registry).to_json(&root).unwrap_err();
    assert_eq!(err, ProjectionError::NoMappingForType("Compartment".to_string()));
}

#[test]
fn object_missing_a_mapped_property_fails() {
    let registry = registry();
    let root = DomainObject::new("PlotSettings")
        .with("Title", json!("only a title"))
        .into_ref();

    let err = ProjectionEngine::new(&registry).to_json(&root).unwrap_err();
    assert!(matches!(
        err,
        ProjectionError::UnknownProperty { ref property, .. } if property == "XLabel"
    ));
}

#[test]
fn selected_species_without_key_fails() {
    let registry = registry();
    let unkeyed = species("   ", "Orphan");
    let root = analysis(None, vec![unkeyed]);

    let err = ProjectionEngine::new(&registry).to_json(&root).unwrap_err();
    assert!(matches!(
        err,
        ProjectionError::MissingIdentityKey { ref type_name, .. } if type_name == "Species"
    ));
}

#[test]
fn projection_does_not_mutate_the_graph() {
    let registry = registry();
    let s1 = species("S1", "Central");
    let root = analysis(Some(model(vec![s1.clone()])), vec![s1.clone()]);

    let engine = ProjectionEngine::new(&registry);
    let first = engine.to_json(&root).unwrap();
    let second = engine.to_json(&root).unwrap();

    assert_eq!(first, second);
    let selected = root.get("SelectedSpecies").unwrap().objects();
    assert!(selected[0].ptr_eq(&s1));
}
