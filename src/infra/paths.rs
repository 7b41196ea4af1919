// src/infra/paths.rs — Path management
//
// All paths respect the RAGLINE_HOME environment variable for isolation.
// When unset, config lives under ~/.ragline/.

use std::path::PathBuf;

/// Returns the RAGLINE_HOME override, if set.
fn ragline_home() -> Option<PathBuf> {
    std::env::var_os("RAGLINE_HOME").map(PathBuf::from)
}

/// Configuration directory: $RAGLINE_HOME/ or ~/.ragline/
pub fn config_dir() -> PathBuf {
    if let Some(home) = ragline_home() {
        return home;
    }
    dirs_home().join(".ragline")
}

/// Home directory
pub fn dirs_home() -> PathBuf {
    directories::BaseDirs::new()
        .expect("Could not determine home directory")
        .home_dir()
        .to_path_buf()
}

/// Config file path
pub fn config_file_path() -> PathBuf {
    config_dir().join("config.toml")
}
