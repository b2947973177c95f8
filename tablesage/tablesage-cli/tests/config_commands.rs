use std::fs;
use tablesage_cli::{OutputFormat, commands};
use tablesage_core::{AssistantConfig, BackendKind, Intent};
use tempfile::tempdir;

#[test]
fn test_init_then_override_routing() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("nested").join("tablesage.toml");
    commands::config_init(&path, false).unwrap();

    let mut content = fs::read_to_string(&path).unwrap();
    content.push_str(
        r#"
[[routing]]
intent = "menu_innovation"
steps = [{ backend = "web", on_hit = "assemble", on_empty = "assemble" }]
"#,
    );
    fs::write(&path, content).unwrap();

    let config = AssistantConfig::load(Some(&path)).unwrap();
    assert_eq!(config.routing.len(), 1);
    assert_eq!(config.routing[0].intent(), Intent::MenuInnovation);
    assert_eq!(config.routing[0].backends(), vec![BackendKind::Web]);

    commands::routes(&config, OutputFormat::Json).unwrap();
    commands::config_show(&config, OutputFormat::Human).unwrap();
}

#[test]
fn test_routes_reject_forward_jump_without_target() {
    let config = AssistantConfig {
        routing: Vec::new(),
        ..AssistantConfig::default()
    };
    commands::routes(&config, OutputFormat::Human).unwrap();

    let invalid = r#"
[[routing]]
intent = "historical_context"
steps = [{ backend = "web", on_hit = { jump_to = "graph" }, on_empty = "assemble" }]
"#;
    assert!(AssistantConfig::from_toml_str(invalid).is_err());
}
