use std::fs;

use careerchat_widget_lib::{server::CompanyDirectory, FetchFailurePolicy, WidgetSettings};
use tempfile::tempdir;

#[test]
fn missing_settings_file_yields_defaults() {
    let dir = tempdir().unwrap();

    let settings = WidgetSettings::load(&dir.path().join("widget.json")).unwrap();

    assert_eq!(settings, WidgetSettings::default());
}

#[test]
fn settings_file_overrides_selected_fields() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("widget.json");
    fs::write(
        &path,
        r#"{ "apiOrigin": "http://localhost:8787", "fallbackDelaysMs": [500], "fetchFailurePolicy": "useDefaults" }"#,
    )
    .unwrap();

    let settings = WidgetSettings::load(&path).unwrap();

    assert_eq!(settings.api_origin, "http://localhost:8787");
    assert_eq!(settings.fallback_delays_ms, vec![500]);
    assert_eq!(settings.fetch_failure_policy, Some(FetchFailurePolicy::UseDefaults));
    assert_eq!(settings.max_attempts, 15);
    assert_eq!(
        settings.config_url("a b"),
        "http://localhost:8787/api/widget-config?company_id=a%20b"
    );
}

#[test]
fn malformed_settings_file_reports_path() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("widget.json");
    fs::write(&path, "{ not json").unwrap();

    let err = WidgetSettings::load(&path).unwrap_err();

    assert!(format!("{err:#}").contains("widget.json"));
}

#[test]
fn company_directory_loads_from_file() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("companies.json");
    fs::write(
        &path,
        r#"[{ "publicId": "acme", "websiteUrl": "https://acme.com" }]"#,
    )
    .unwrap();

    let directory = CompanyDirectory::load(&path).unwrap();

    assert_eq!(directory.len(), 1);
    assert!(directory.find_active("acme").is_some());
    assert!(CompanyDirectory::load(&dir.path().join("absent.json")).is_err());
}
