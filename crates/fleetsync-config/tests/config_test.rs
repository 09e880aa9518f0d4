#![allow(clippy::unwrap_used)]

use std::time::Duration;

use pretty_assertions::assert_eq;
use secrecy::SecretString;

use fleetsync_config::{
    Config, ConfigError, Profile, fleet_config_with_token, load_config_from, save_config_to,
};

const SAMPLE: &str = r#"
default_profile = "prod"

[defaults]
output = "json"

[profiles.prod]
channel_url = "wss://fleet.example/ws"
store_url = "https://store.example/api"
admin = true
token_env = "PROD_FLEET_TOKEN"
poll_interval_ms = 500

[profiles.prod.ttls]
command = 45

[profiles.lab]
channel_url = "ws://10.0.0.2:8080/ws"
store_url = "http://10.0.0.2:8081"
stations_collection = "lab_stations"
"#;

fn token() -> SecretString {
    SecretString::from("t0k3n".to_owned())
}

#[test]
fn missing_file_yields_defaults() {
    let dir = tempfile::tempdir().unwrap();
    let cfg = load_config_from(&dir.path().join("absent.toml")).unwrap();

    assert_eq!(cfg.default_profile.as_deref(), Some("default"));
    assert_eq!(cfg.defaults.output, "table");
    assert_eq!(cfg.defaults.timeout, 15);
    assert!(cfg.profiles.is_empty());
}

#[test]
fn loads_profiles_and_defaults() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("config.toml");
    std::fs::write(&path, SAMPLE).unwrap();

    let cfg = load_config_from(&path).unwrap();
    assert_eq!(cfg.defaults.output, "json");
    assert_eq!(cfg.defaults.color, "auto");
    assert_eq!(cfg.profiles.len(), 2);

    let (name, prod) = cfg.profile(None).unwrap();
    assert_eq!(name, "prod");
    assert!(prod.admin);
    assert_eq!(prod.ttls.command, Some(45));

    let (name, lab) = cfg.profile(Some("lab")).unwrap();
    assert_eq!(name, "lab");
    assert!(!lab.admin);

    let err = cfg.profile(Some("staging")).unwrap_err();
    assert!(matches!(err, ConfigError::UnknownProfile { .. }));
}

#[test]
fn profile_translates_to_fleet_config() {
    let cfg: Config = toml::from_str(SAMPLE).unwrap();

    let prod = fleet_config_with_token(&cfg.profiles["prod"], token()).unwrap();
    assert!(prod.admin_channel);
    assert_eq!(prod.reconnect_delay, Duration::from_secs(5));
    assert_eq!(prod.poll_interval, Duration::from_millis(500));
    assert_eq!(prod.ttls.command, Duration::from_secs(45));
    assert_eq!(prod.ttls.lock_confirm, Duration::from_secs(20));
    assert_eq!(prod.stations_collection, "stations");

    let lab = fleet_config_with_token(&cfg.profiles["lab"], token()).unwrap();
    assert!(!lab.admin_channel);
    assert_eq!(lab.reconnect_delay, Duration::from_secs(1));
    assert_eq!(lab.stations_collection, "lab_stations");
    assert_eq!(lab.channel_url.as_str(), "ws://10.0.0.2:8080/ws");
}

#[test]
fn channel_url_must_be_websocket() {
    let profile = Profile {
        channel_url: "https://fleet.example/ws".into(),
        store_url: "https://store.example/api".into(),
        ..Profile::default()
    };

    let err = fleet_config_with_token(&profile, token()).unwrap_err();
    assert!(matches!(err, ConfigError::Validation { ref field, .. } if field == "channel_url"));
}

#[test]
fn save_then_load_keeps_profiles() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("nested").join("config.toml");

    let mut cfg = Config::default();
    cfg.profiles.insert(
        "default".into(),
        Profile {
            channel_url: "wss://fleet.example/ws".into(),
            store_url: "https://store.example/api".into(),
            token_env: Some("FLEET_TOKEN".into()),
            ..Profile::default()
        },
    );
    save_config_to(&cfg, &path).unwrap();

    let written = std::fs::read_to_string(&path).unwrap();
    assert!(written.contains("token_env = \"FLEET_TOKEN\""));
    assert!(!written.contains("ttls"));

    let loaded = load_config_from(&path).unwrap();
    assert_eq!(loaded.profiles, cfg.profiles);
}
