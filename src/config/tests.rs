use super::settings::Settings;
use super::{load_config, load_config_from};
use serial_test::serial;
use std::fs;
use tempfile::TempDir;

#[test]
fn test_default_settings() {
    let settings = Settings::default();
    assert_eq!(settings.server.host, "127.0.0.1");
    assert_eq!(settings.server.port, 8080);
    assert_eq!(settings.broker.data_dir, "postbox_db");
    assert_eq!(settings.broker.default_expires_after_secs, Some(3600));
    assert_eq!(settings.logging.level, "info");
}

#[test]
#[serial]
fn load_config_without_sources_uses_defaults() {
    temp_env::with_vars_unset(
        ["POSTBOX_SERVER__PORT", "POSTBOX_BROKER__DATA_DIR"],
        || {
            let cfg = load_config_from("does/not/exist").expect("load_config failed");
            assert_eq!(cfg.server.port, 8080);
            assert_eq!(cfg.broker.data_dir, "postbox_db");
        },
    );
}

#[test]
#[serial]
fn load_config_from_file_overrides_defaults() {
    let tmp = TempDir::new().expect("create tempdir");
    let path = tmp.path().join("postbox.toml");
    let toml = r#"
        [server]
        host = "0.0.0.0"
        port = 9000

        [broker]
        data_dir = "/var/lib/postbox"
        default_expires_after_secs = 60
    "#;
    fs::write(&path, toml).expect("write config file");

    let base = tmp.path().join("postbox");
    let cfg = load_config_from(base.to_str().unwrap()).expect("load_config failed");
    assert_eq!(cfg.server.host, "0.0.0.0");
    assert_eq!(cfg.server.port, 9000);
    assert_eq!(cfg.broker.data_dir, "/var/lib/postbox");
    assert_eq!(cfg.broker.default_expires_after_secs, Some(60));
    // not in the file
    assert_eq!(cfg.logging.level, "info");
}

#[test]
#[serial]
fn load_config_reads_environment() {
    temp_env::with_vars(
        [
            ("POSTBOX_SERVER__PORT", Some("9100")),
            ("POSTBOX_LOGGING__LEVEL", Some("debug")),
        ],
        || {
            let cfg = load_config().expect("load_config failed");
            assert_eq!(cfg.server.port, 9100);
            assert_eq!(cfg.logging.level, "debug");
            assert_eq!(cfg.server.host, "127.0.0.1");
        },
    );
}
