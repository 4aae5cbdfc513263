use std::io::Write;
use std::time::Duration;

use tamagotchi_core::{PetError, TamagotchiConfig};
use tempfile::NamedTempFile;

#[test]
fn loads_overrides_from_file() {
    let mut file = NamedTempFile::new().unwrap();
    writeln!(
        file,
        r#"
[vitals]
history_cap = 10

[evolution]
neglect_cycles = 3

[evolution.weights]
happy_dance = 8

[scheduler]
interval_secs = 600
fetch_timeout_secs = 5
"#
    )
    .unwrap();

    let config = TamagotchiConfig::load(file.path()).unwrap();
    assert_eq!(config.vitals.history_cap, 10);
    assert_eq!(config.evolution.neglect_cycles, 3);
    assert_eq!(config.evolution.weights.happy_dance, 8);
    assert_eq!(config.evolution.weights.fed_and_grew, 10);
    assert_eq!(config.scheduler.interval(), Duration::from_secs(600));
    assert_eq!(config.scheduler.fetch_timeout(), Duration::from_secs(5));
    assert_eq!(config.scheduler.degraded_threshold, 5);
}

#[test]
fn missing_file_is_a_config_error() {
    let dir = tempfile::tempdir().unwrap();
    let err = TamagotchiConfig::load(&dir.path().join("absent.toml")).unwrap_err();
    assert!(matches!(err, PetError::Config(ref m) if m.contains("absent.toml")));
}

#[test]
fn invalid_values_are_rejected_on_load() {
    let mut file = NamedTempFile::new().unwrap();
    writeln!(file, "[vitals]\nhistory_cap = 0").unwrap();
    assert!(matches!(
        TamagotchiConfig::load(file.path()),
        Err(PetError::Config(_))
    ));
}
