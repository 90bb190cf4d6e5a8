use std::fs;
use std::path::PathBuf;

use tempfile::TempDir;

use atelier::cli::{Cli, Commands};

/// Writes `contents` to a `config.yaml` inside a fresh temporary directory.
#[allow(dead_code)]
pub fn temp_config_file(contents: &str) -> (TempDir, PathBuf) {
    let temp_dir = TempDir::new().expect("failed to create tempdir");
    let config_path = temp_dir.path().join("config.yaml");
    fs::write(&config_path, contents).expect("failed to write config file");
    (temp_dir, config_path)
}

/// CLI arguments with no overrides.
#[allow(dead_code)]
pub fn bare_cli() -> Cli {
    Cli {
        config: None,
        verbose: false,
        json_logs: false,
        base_url: None,
        ephemeral: false,
        command: Commands::Status,
    }
}

/// Removes every `ATELIER_*` override from the process environment.
#[allow(dead_code)]
pub fn clear_atelier_env() {
    for var in [
        "ATELIER_BASE_URL",
        "ATELIER_TIMEOUT_SECONDS",
        "ATELIER_STORAGE_BACKEND",
        "ATELIER_KEYRING_SERVICE",
    ] {
        std::env::remove_var(var);
    }
}
