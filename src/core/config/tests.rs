use super::data::{Config, Profile};
use super::defaults::{CONFIG_KEYS, DEFAULT_BASE_URL, DEFAULT_PROFILE_NAME, DEFAULT_SYSTEM_PROMPT};
use super::io::ConfigError;
use super::orchestrator::ConfigOrchestrator;
use std::path::PathBuf;
use std::time::Duration;
use tempfile::TempDir;

#[test]
fn test_load_nonexistent_config() {
    let temp_dir = TempDir::new().expect("Failed to create temp directory");
    let config_path = temp_dir.path().join("nonexistent_config.toml");

    let config = Config::load_from_path(&config_path).expect("Failed to load config");

    assert_eq!(config, Config::default());
    assert_eq!(config.base_url(), DEFAULT_BASE_URL);
}

#[test]
fn test_config_round_trip_through_toml() {
    let temp_dir = TempDir::new().expect("Failed to create temp directory");
    let config_path = temp_dir.path().join("nested").join("config.toml");

    let mut config = Config {
        base_url: Some("http://studio.local:1234".into()),
        default_profile: Some("Coder".into()),
        chat_timeout_secs: Some(120),
        max_tokens: Some(2048),
        ..Default::default()
    };
    config.upsert_profile(Profile::new("Coder", "You write idiomatic Rust."));
    config.save_to_path(&config_path).expect("save failed");

    let loaded = Config::load_from_path(&config_path).expect("load failed");
    assert_eq!(loaded, config);
}

#[test]
fn parse_error_names_the_file() {
    let temp_dir = TempDir::new().expect("Failed to create temp directory");
    let config_path = temp_dir.path().join("config.toml");
    std::fs::write(&config_path, "base_url = [unterminated").expect("write");

    let err = Config::load_from_path(&config_path).expect_err("should fail");
    assert!(matches!(err, ConfigError::Parse { .. }));
    assert!(err.to_string().contains("config.toml"));
}

#[test]
fn profiles_table_parses_from_toml() {
    let config: Config = toml::from_str(
        r#"
        base_url = "localhost:8080/v1/"
        default_profile = "pirate"

        [[profiles]]
        name = "Pirate"
        system_prompt = "Talk like a pirate."

        [[profiles]]
        name = "Blank"
        "#,
    )
    .expect("valid toml");

    assert_eq!(config.base_url(), "http://localhost:8080");
    assert_eq!(config.profiles.len(), 2);
    assert_eq!(config.profiles[1].system_prompt, "");

    let snapshot = config.resolve_profile(None).expect("profile");
    assert_eq!(snapshot.profile_name(), "Pirate");
    assert_eq!(snapshot.system_prompt(), "Talk like a pirate.");
}

#[test]
fn resolve_profile_falls_back_to_builtin() {
    let config = Config::default();
    let snapshot = config.resolve_profile(None).expect("profile");
    assert_eq!(snapshot.profile_name(), DEFAULT_PROFILE_NAME);
    assert_eq!(snapshot.system_prompt(), DEFAULT_SYSTEM_PROMPT);

    let explicit = config.resolve_profile(Some("default")).expect("profile");
    assert_eq!(explicit.profile_name(), DEFAULT_PROFILE_NAME);
}

#[test]
fn resolve_profile_rejects_unknown_names() {
    let config = Config::default();
    let err = config.resolve_profile(Some("Nobody")).expect_err("unknown");
    assert!(matches!(err, ConfigError::UnknownProfile(name) if name == "Nobody"));
}

#[test]
fn set_and_unset_every_key() {
    let mut config = Config::default();
    config.upsert_profile(Profile::new("Coder", "Write Rust."));
    let values = [
        ("base-url", " http://gpu-box:1234/v1 "),
        ("model", "qwen2.5-coder"),
        ("default-profile", "Coder"),
        ("chat-timeout", "300"),
        ("title-timeout", "15"),
        ("temperature", "0.2"),
        ("max-tokens", "512"),
        ("save-debounce-ms", "500"),
        ("state-file", "/tmp/parlor/sessions.json"),
    ];
    assert_eq!(values.len(), CONFIG_KEYS.len());
    for (key, value) in values {
        config.set_value(key, value).expect("set");
    }

    assert_eq!(config.base_url.as_deref(), Some("http://gpu-box:1234"));
    assert_eq!(config.chat_timeout(), Duration::from_secs(300));
    assert_eq!(config.title_timeout(), Duration::from_secs(15));
    assert_eq!(config.save_debounce(), Duration::from_millis(500));
    let options = config.transport_options();
    assert_eq!(options.max_tokens, Some(512));
    assert!((options.temperature - 0.2).abs() < f32::EPSILON);
    assert_eq!(
        config.state_path().expect("state path"),
        PathBuf::from("/tmp/parlor/sessions.json")
    );

    for key in CONFIG_KEYS {
        config.unset_value(key).expect("unset");
    }
    let mut expected = Config::default();
    expected.upsert_profile(Profile::new("Coder", "Write Rust."));
    assert_eq!(config, expected);
}

#[test]
fn set_value_validates_input() {
    let mut config = Config::default();
    assert!(matches!(
        config.set_value("chat-timeout", "soon"),
        Err(ConfigError::InvalidValue { .. })
    ));
    assert!(matches!(
        config.set_value("colour", "blue"),
        Err(ConfigError::UnknownKey(_))
    ));
    assert!(matches!(
        config.set_value("default-profile", "Ghost"),
        Err(ConfigError::UnknownProfile(_))
    ));
    assert_eq!(config, Config::default());
}

#[test]
fn negative_max_tokens_means_server_default() {
    let config = Config {
        max_tokens: Some(-1),
        ..Default::default()
    };
    assert_eq!(config.transport_options().max_tokens, None);
}

#[test]
fn upsert_profile_replaces_case_insensitively() {
    let mut config = Config::default();
    config.upsert_profile(Profile::new("Coder", "v1"));
    config.upsert_profile(Profile::new("coder", "v2"));
    assert_eq!(config.profiles.len(), 1);
    assert_eq!(config.get_profile("CODER").map(|p| p.system_prompt.as_str()), Some("v2"));
    assert!(config.remove_profile("Coder"));
    assert!(!config.remove_profile("Coder"));
}

#[test]
fn removing_the_default_profile_clears_the_default() {
    let mut config = Config::default();
    config.upsert_profile(Profile::new("Coder", "Write code."));
    config.upsert_profile(Profile::new("Poet", "Write verse."));
    config
        .set_value("default-profile", "coder")
        .expect("known profile");

    assert!(config.remove_profile("Poet"));
    assert_eq!(config.default_profile.as_deref(), Some("coder"));

    assert!(config.remove_profile("CODER"));
    assert!(config.default_profile.is_none());
}

#[test]
fn profile_commands_round_trip_through_the_orchestrator() {
    let temp_dir = TempDir::new().expect("Failed to create temp directory");
    let config_path = temp_dir.path().join("config.toml");
    let orchestrator = ConfigOrchestrator::new(config_path.clone());

    orchestrator
        .mutate(|config| {
            config.upsert_profile(Profile::new("Coder", "Answer with code."));
            Ok(())
        })
        .expect("add failed");
    let persisted = Config::load_from_path(&config_path).expect("load failed");
    assert_eq!(
        persisted.get_profile("coder").map(|p| p.system_prompt.as_str()),
        Some("Answer with code.")
    );

    let missing = orchestrator.mutate(|config| {
        if config.remove_profile("Nobody") {
            Ok(())
        } else {
            Err(ConfigError::UnknownProfile("Nobody".into()))
        }
    });
    assert!(matches!(missing, Err(ConfigError::UnknownProfile(name)) if name == "Nobody"));

    orchestrator
        .mutate(|config| {
            assert!(config.remove_profile("Coder"));
            Ok(())
        })
        .expect("remove failed");
    let persisted = Config::load_from_path(&config_path).expect("load failed");
    assert!(persisted.profiles.is_empty());
}

#[test]
fn config_orchestrator_detects_external_updates() {
    let temp_dir = TempDir::new().expect("Failed to create temp directory");
    let config_path = temp_dir.path().join("config.toml");
    let orchestrator = ConfigOrchestrator::new(config_path.clone());

    orchestrator
        .mutate(|config| config.set_value("model", "first"))
        .expect("mutate failed");

    let persisted = Config::load_from_path(&config_path).expect("load failed");
    assert_eq!(persisted.model.as_deref(), Some("first"));

    let cached = orchestrator.load_with_cache().expect("cached load failed");
    assert_eq!(cached.model.as_deref(), Some("first"));

    std::thread::sleep(Duration::from_millis(1100));

    let external = Config {
        model: Some("second".to_string()),
        ..Default::default()
    };
    external
        .save_to_path(&config_path)
        .expect("external save failed");

    let reloaded = orchestrator.load_with_cache().expect("reload failed");
    assert_eq!(reloaded.model.as_deref(), Some("second"));
}

#[test]
fn failed_mutation_writes_nothing() {
    let temp_dir = TempDir::new().expect("Failed to create temp directory");
    let config_path = temp_dir.path().join("config.toml");
    let orchestrator = ConfigOrchestrator::new(config_path.clone());

    let result = orchestrator.mutate(|config| config.set_value("bogus", "1"));

    assert!(result.is_err());
    assert!(!config_path.exists());
}
