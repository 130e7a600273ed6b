//! Integration tests for process start, shared stores and the backup worker

use np_config::remote::StaticProbe;
use np_config::settings::SettingsOverrides;
use np_config::{
    BackupOutcome, BackupWorker, ConfigContext, ConfigMap, ConfigStore, InMemoryCoordination,
    LocalStore, Settings, backup_if_stale,
};
use serde_json::json;
use serial_test::serial;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};
use tempfile::TempDir;

fn map(value: serde_json::Value) -> ConfigMap {
    value.as_object().unwrap().clone()
}

#[test]
fn test_concurrent_writers_on_one_file() {
    let temp = TempDir::new().unwrap();
    let path = temp.path().join("shared.yaml");
    let first = Arc::new(LocalStore::open(&path).unwrap());
    let second = Arc::new(LocalStore::open(&path).unwrap());

    let handles: Vec<_> = [Arc::clone(&first), Arc::clone(&second)]
        .into_iter()
        .enumerate()
        .map(|(writer, store)| {
            thread::spawn(move || {
                for i in 0..25 {
                    store
                        .set(&format!("/w{writer}/k{i}"), map(json!({"i": i})))
                        .unwrap();
                }
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }

    // Every persisted file is a complete table from one of the writers.
    let reloaded = LocalStore::open(&path).unwrap();
    assert!(reloaded.contains("/w0/k24") || reloaded.contains("/w1/k24"));
    assert!(reloaded.len() >= 25);
    assert!(!temp.path().join("shared.yaml.tmp").exists());
}

#[test]
fn test_bootstrap_warms_backup_and_gate_then_skips() {
    let temp = TempDir::new().unwrap();
    let tree = InMemoryCoordination::new();
    tree.put_map("/a", &map(json!({"x": 1})));
    tree.put_map("/b/c", &map(json!({"y": 2})));
    let mut settings = Settings::default();
    settings.storage.data_dir = Some(temp.path().to_path_buf());

    let ctx = ConfigContext::builder(settings)
        .probe(StaticProbe(true))
        .client_factory(tree.clone())
        .bootstrap()
        .unwrap();

    assert_eq!(ctx.backup().snapshot(), map(json!({"/a": {"x": 1}, "/b/c": {"y": 2}})));
    assert_eq!(tree.connect_count(), 1);
    assert_eq!(backup_if_stale(&ctx).unwrap(), None);
    assert_eq!(tree.connect_count(), 1);
}

#[test]
fn test_stale_backup_is_refreshed() {
    let temp = TempDir::new().unwrap();
    let tree = InMemoryCoordination::new();
    tree.put_map("/a", &map(json!({"x": 2})));
    let backup_path = temp.path().join("zk_backup.yaml");
    std::fs::write(&backup_path, "/a:\n  x: 1\n").unwrap();
    let old = std::time::SystemTime::now() - Duration::from_secs(30 * 24 * 3600);
    std::fs::File::options()
        .write(true)
        .open(&backup_path)
        .unwrap()
        .set_modified(old)
        .unwrap();

    let mut settings = Settings::default();
    settings.storage.data_dir = Some(temp.path().to_path_buf());
    settings.backup.enabled = false;
    let ctx = ConfigContext::builder(settings)
        .probe(StaticProbe(true))
        .client_factory(tree.clone())
        .build()
        .unwrap();
    assert_eq!(ctx.backup().get("/a").unwrap(), map(json!({"x": 1})));

    let outcome = backup_if_stale(&ctx).unwrap();
    assert_eq!(outcome, Some(BackupOutcome::Completed { leaves: 1 }));
    assert_eq!(ctx.backup().get("/a").unwrap(), map(json!({"x": 2})));
}

#[test]
fn test_worker_drop_joins_thread() {
    let temp = TempDir::new().unwrap();
    let tree = InMemoryCoordination::new();
    let mut settings = Settings::default();
    settings.storage.data_dir = Some(temp.path().to_path_buf());
    let ctx = Arc::new(
        ConfigContext::builder(settings)
            .probe(StaticProbe(false))
            .client_factory(tree.clone())
            .build()
            .unwrap(),
    );

    let start = Instant::now();
    {
        let _worker = BackupWorker::spawn(Arc::clone(&ctx), Duration::from_secs(3600)).unwrap();
    }
    assert!(start.elapsed() < Duration::from_secs(5));
    assert_eq!(Arc::strong_count(&ctx), 1);
}

#[test]
#[serial]
fn test_from_environment_uses_home_override() {
    let home = TempDir::new().unwrap();
    unsafe {
        std::env::set_var("NP_CONFIG_HOME", home.path());
    }

    let overrides = SettingsOverrides {
        disable_backup: true,
        ..Default::default()
    };
    let ctx = ConfigContext::from_environment(&overrides);
    unsafe {
        std::env::remove_var("NP_CONFIG_HOME");
    }
    let ctx = ctx.unwrap();

    let data_dir = home.path().join(".np_config/resources");
    assert_eq!(ctx.backup().path(), data_dir.join("zk_backup.yaml"));
    assert!(ctx.session_record().path().starts_with(&data_dir));
    assert!(!ctx.settings().backup.enabled);
}
