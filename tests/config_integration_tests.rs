//! Integration tests for ConfigStore and ConfigWatcher
//!
//! These tests verify:
//! - Field-level defaults, applied independently
//! - The first-run template round trip
//! - Validation (duplicate names, port range, empty entries)
//! - Reload after an edit and the bounded modification-time watcher

mod common;

use camino::Utf8Path;
use common::{OFFICE_CONFIG, empty_store, store_with};
use proptest::prelude::*;
use socksvpn::config::{ConfigError, ConfigStore, ConfigWatcher};
use socksvpn::models::{ConfigFile, Configuration, ServerOptionsFile};
use std::fs;
use std::time::{Duration, SystemTime};
use tokio::sync::watch;

#[test]
fn test_empty_server_options_use_defaults() {
    let (_temp_dir, store) = store_with(r#"{"server_options": {}, "commands": []}"#);
    let config = store.load().unwrap();

    assert_eq!(config.options.server_alive_interval, 10);
    assert_eq!(config.options.server_alive_count_max, 3);
    assert_eq!(config.local_port, 1234);
    assert_eq!(config.interface, "Wi-Fi");
    assert_eq!(config.autossh_path.as_str(), "/opt/homebrew/bin/autossh");
}

#[test]
fn test_empty_object_uses_defaults() {
    let (_temp_dir, store) = store_with("{}");
    let config = store.load().unwrap();

    assert_eq!(config, Configuration::default());
}

#[test]
fn test_present_values_are_respected_independently() {
    let (_temp_dir, store) = store_with(
        r#"{"local_port": 1080, "server_options": {"server_alive_count_max": 7}, "commands": []}"#,
    );
    let config = store.load().unwrap();

    assert_eq!(config.local_port, 1080);
    assert_eq!(config.options.server_alive_count_max, 7);
    // Neighbours of set fields still default
    assert_eq!(config.options.server_alive_interval, 10);
    assert_eq!(config.interface, "Wi-Fi");
}

#[test]
fn test_create_default_then_load() {
    let (_temp_dir, store) = empty_store();

    store.create_default().unwrap();
    let config = store.load().unwrap();

    assert_eq!(config.profile_count(), 1);
    let example = config.profiles().next().unwrap();
    assert_eq!(example.name, "example");
    assert_eq!(example.server, "your-server-name-or-ip");
    assert_eq!(example.description, "Example VPN Server");
}

#[test]
fn test_ensure_exists_does_not_overwrite() {
    let (_temp_dir, store) = store_with(OFFICE_CONFIG);

    assert!(!store.ensure_exists().unwrap());
    assert_eq!(store.load().unwrap().profile_count(), 2);
}

#[test]
fn test_profiles_keep_file_order() {
    let (_temp_dir, store) = store_with(OFFICE_CONFIG);
    let config = store.load().unwrap();

    let names: Vec<&str> = config.profiles().map(|p| p.name.as_str()).collect();
    assert_eq!(names, vec!["office", "home"]);
    assert_eq!(config.profile("home").unwrap().server, "home.example.net");
}

#[test]
fn test_duplicate_profile_names_rejected() {
    let (_temp_dir, store) = store_with(
        r#"{"commands": [
            {"name": "office", "server": "a.example.com"},
            {"name": "office", "server": "b.example.com"}
        ]}"#,
    );

    let result = store.load();
    assert!(
        matches!(result, Err(ConfigError::DuplicateProfile(ref name)) if name == "office"),
        "expected duplicate error, got {:?}",
        result
    );
}

#[test]
fn test_port_out_of_range_rejected() {
    let (_temp_dir, store) = store_with(r#"{"local_port": 70000}"#);

    let result = store.load();
    assert!(matches!(result, Err(ConfigError::InvalidValue { ref key, .. }) if key == "local_port"));
}

#[test]
fn test_unknown_fields_ignored() {
    let (_temp_dir, store) =
        store_with(r#"{"theme": "dark", "commands": [{"name": "x", "server": "x.io", "icon": 3}]}"#);

    let config = store.load().unwrap();
    assert_eq!(config.profile("x").unwrap().server, "x.io");
}

#[test]
fn test_missing_and_malformed_files() {
    let (_temp_dir, store) = empty_store();
    assert!(matches!(store.load(), Err(ConfigError::Read { .. })));

    let (_temp_dir, store) = store_with("{ not json");
    let err = store.load().unwrap_err();
    assert!(matches!(err, ConfigError::Parse { .. }));
    assert!(err.to_string().contains(".vpn.json"));
}

#[test]
fn test_reload_sees_edits() {
    let (_temp_dir, store) = store_with(OFFICE_CONFIG);
    assert_eq!(store.load().unwrap().profile_count(), 2);

    fs::write(
        store.path(),
        r#"{"commands": [{"name": "lab", "server": "lab.example.org"}]}"#,
    )
    .unwrap();

    let config = store.reload().unwrap();
    assert_eq!(config.profile_count(), 1);
    assert!(config.profile("office").is_none());
}

#[tokio::test]
async fn test_watcher_reports_modification() {
    let (_temp_dir, store) = store_with(OFFICE_CONFIG);
    let watcher = ConfigWatcher::new(
        store.path(),
        Duration::from_millis(20),
        Duration::from_secs(5),
    );
    let (_shutdown_tx, shutdown_rx) = watch::channel(false);

    let path = store.path().to_path_buf();
    let writer = tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(100)).await;
        let file = fs::OpenOptions::new().write(true).open(&path).unwrap();
        // Explicit mtime so coarse filesystem timestamps cannot hide the edit
        file.set_modified(SystemTime::now() + Duration::from_secs(60))
            .unwrap();
    });

    let changed = watcher.wait_for_change(shutdown_rx).await;
    writer.await.unwrap();
    assert!(changed.is_some());
}

#[tokio::test]
async fn test_watcher_gives_up_after_limit() {
    let (_temp_dir, store) = store_with(OFFICE_CONFIG);
    let watcher = ConfigWatcher::new(
        store.path(),
        Duration::from_millis(10),
        Duration::from_millis(100),
    );
    let (_shutdown_tx, shutdown_rx) = watch::channel(false);

    let result = tokio::time::timeout(Duration::from_secs(2), watcher.wait_for_change(shutdown_rx))
        .await
        .expect("watcher ignored its limit");
    assert!(result.is_none());
}

#[tokio::test]
async fn test_watcher_stops_on_shutdown() {
    let (_temp_dir, store) = store_with(OFFICE_CONFIG);
    let watcher = ConfigWatcher::new(
        store.path(),
        Duration::from_millis(10),
        Duration::from_secs(300),
    );
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let task = tokio::spawn(async move { watcher.wait_for_change(shutdown_rx).await });
    tokio::time::sleep(Duration::from_millis(50)).await;
    shutdown_tx.send(true).unwrap();

    let result = tokio::time::timeout(Duration::from_secs(2), task)
        .await
        .expect("watcher ignored shutdown")
        .unwrap();
    assert!(result.is_none());
}

#[tokio::test]
async fn test_watcher_sees_file_created() {
    let (_temp_dir, store) = empty_store();
    let watcher = ConfigWatcher::new(
        store.path(),
        Duration::from_millis(20),
        Duration::from_secs(5),
    );
    let (_shutdown_tx, shutdown_rx) = watch::channel(false);

    let creator = store.clone();
    let writer = tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(60)).await;
        creator.create_default().unwrap();
    });

    assert!(watcher.wait_for_change(shutdown_rx).await.is_some());
    writer.await.unwrap();
}

proptest! {
    // Zero means "unset" for every numeric field, anything else is kept
    #[test]
    fn prop_numeric_defaults(interval in 0u32..1000, count in 0u32..50, port in 0u32..=65535) {
        let file = ConfigFile {
            local_port: port,
            server_options: ServerOptionsFile {
                server_alive_interval: interval,
                server_alive_count_max: count,
            },
            ..ConfigFile::default()
        };
        let config = Configuration::from_file(file).unwrap();

        let expected_interval = if interval == 0 { 10 } else { interval };
        let expected_count = if count == 0 { 3 } else { count };
        let expected_port = if port == 0 { 1234 } else { port as u16 };
        prop_assert_eq!(config.options.server_alive_interval, expected_interval);
        prop_assert_eq!(config.options.server_alive_count_max, expected_count);
        prop_assert_eq!(config.local_port, expected_port);
    }

    #[test]
    fn prop_unique_names_all_load(names in prop::collection::btree_set("[a-z]{1,12}", 0..8)) {
        let commands: Vec<String> = names
            .iter()
            .map(|n| format!(r#"{{"name": "{}", "server": "{}.example.com"}}"#, n, n))
            .collect();
        let json = format!(r#"{{"commands": [{}]}}"#, commands.join(","));

        let config = ConfigStore::parse(Utf8Path::new("prop.json"), &json).unwrap();
        prop_assert_eq!(config.profile_count(), names.len());
        for name in &names {
            prop_assert!(config.profile(name).is_some());
        }
    }
}
