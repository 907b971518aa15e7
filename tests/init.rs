use std::process::Command;

#[test]
fn init_creates_valid_toml() {
    let dir = tempfile::tempdir().unwrap();

    let output = Command::new(env!("CARGO_BIN_EXE_tribunal"))
        .arg("init")
        .current_dir(dir.path())
        .output()
        .unwrap();

    assert!(
        output.status.success(),
        "tribunal init failed: {}",
        String::from_utf8_lossy(&output.stderr)
    );

    let config_path = dir.path().join(".tribunal.toml");
    assert!(config_path.exists(), ".tribunal.toml should exist");

    let content = std::fs::read_to_string(&config_path).unwrap();
    for section in ["[llm]", "[routing]", "[reliability]", "[conflicts]", "[specialists]"] {
        assert!(content.contains(section), "missing {section}");
    }

    // Everything is commented out, so it must parse to the defaults.
    let config: tribunal_core::TribunalConfig = toml::from_str(&content).unwrap();
    config.validate().unwrap();
    assert_eq!(config.routing.max_snippets_per_agent, 5);
}

#[test]
fn init_refuses_if_exists() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join(".tribunal.toml"), "# existing").unwrap();

    let output = Command::new(env!("CARGO_BIN_EXE_tribunal"))
        .arg("init")
        .current_dir(dir.path())
        .output()
        .unwrap();

    assert!(!output.status.success());
    assert_eq!(
        std::fs::read_to_string(dir.path().join(".tribunal.toml")).unwrap(),
        "# existing"
    );
}
