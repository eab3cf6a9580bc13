use std::time::Duration;
use sysdash::core::config::Config;
use tempfile::TempDir;

#[test]
fn test_config_default() {
    let config = Config::default();
    assert_eq!(config.history_capacity, 60);
    assert_eq!(config.max_blocking_threads, None);
    assert_eq!(config.load_timeout(), None);
}

#[test]
fn test_config_path_is_json_under_sysdash() {
    let path = Config::get_config_path().unwrap();
    assert!(path.ends_with("sysdash/config.json"));
}

#[test]
fn test_config_roundtrip() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("config.json");
    let config = Config {
        worker_threads: 4,
        max_blocking_threads: Some(8),
        stop_grace_ms: 2500,
        load_timeout_ms: 10_000,
        ..Default::default()
    };

    config.save_to(&path).unwrap();
    let loaded = Config::load_from(&path).unwrap();

    assert_eq!(loaded, config);
    assert_eq!(loaded.load_timeout(), Some(Duration::from_secs(10)));
}

#[test]
fn test_config_drives_pool_settings() {
    let config = Config {
        worker_threads: 3,
        max_blocking_threads: Some(2),
        stop_grace_ms: 400,
        ..Default::default()
    };
    let pool = config.pool_config();

    assert_eq!(pool.worker_threads, 3);
    assert_eq!(pool.max_blocking_threads, Some(2));
    assert_eq!(pool.stop_grace, Duration::from_millis(400));
}
