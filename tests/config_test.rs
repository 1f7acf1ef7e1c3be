use std::sync::Mutex;
use std::time::Duration;

use secrecy::ExposeSecret;
use stepsync::SyncPolicy;
use stepsync::config::Config;

// Tests in this file mutate process-wide environment variables.
static ENV_LOCK: Mutex<()> = Mutex::new(());

const VARS: [&str; 5] = [
    "STEPSYNC_DATABASE_URL",
    "STEPSYNC_ENDPOINT",
    "STEPSYNC_API_TOKEN",
    "STEPSYNC_DELIVERY_TIMEOUT_MS",
    "STEPSYNC_SYNC_POLICY",
];

fn reset_env() {
    for var in VARS {
        unsafe {
            std::env::remove_var(var);
        }
    }
}

#[test]
fn config_defaults_when_unset() {
    let _lock = ENV_LOCK.lock().unwrap_or_else(|e| e.into_inner());
    reset_env();

    let config = Config::from_env().unwrap();
    assert_eq!(config.database_url, "sqlite://stepsync.db");
    assert!(config.endpoint.is_none());
    assert!(config.api_token.is_none());
    assert_eq!(config.delivery_timeout, Some(Duration::from_millis(30_000)));
    assert_eq!(config.sync_policy, SyncPolicy::RetainAll);
    assert!(config.require_endpoint().is_err());
}

#[test]
fn config_from_env_loads_all_fields() {
    let _lock = ENV_LOCK.lock().unwrap_or_else(|e| e.into_inner());
    reset_env();
    unsafe {
        std::env::set_var("STEPSYNC_DATABASE_URL", "sqlite::memory:");
        std::env::set_var("STEPSYNC_ENDPOINT", "http://localhost:8000");
        std::env::set_var("STEPSYNC_API_TOKEN", "secret-token");
        std::env::set_var("STEPSYNC_DELIVERY_TIMEOUT_MS", "0");
        std::env::set_var("STEPSYNC_SYNC_POLICY", "drop-delivered");
    }

    let config = Config::from_env().unwrap();
    assert_eq!(config.database_url, "sqlite::memory:");
    assert_eq!(config.require_endpoint().unwrap(), "http://localhost:8000");
    assert_eq!(
        config.api_token.as_ref().unwrap().expose_secret(),
        "secret-token"
    );
    assert!(!format!("{config:?}").contains("secret-token"));

    let sync = config.sync_config();
    assert_eq!(sync.policy, SyncPolicy::DropDelivered);
    assert_eq!(sync.delivery_timeout, None);

    reset_env();
}

#[test]
fn config_rejects_unknown_policy() {
    let _lock = ENV_LOCK.lock().unwrap_or_else(|e| e.into_inner());
    reset_env();
    unsafe {
        std::env::set_var("STEPSYNC_SYNC_POLICY", "retry-forever");
    }

    let result = Config::from_env();
    assert!(result.is_err());

    reset_env();
}
