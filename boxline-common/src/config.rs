//! Configuration loading and data folder resolution

use crate::{Error, Result};
use std::path::PathBuf;

/// Data folder resolution priority order:
/// 1. Command-line argument (highest priority)
/// 2. Environment variable
/// 3. TOML config file
/// 4. OS-dependent compiled default (fallback)
pub fn resolve_data_folder(cli_arg: Option<&str>, env_var_name: &str) -> PathBuf {
    // Priority 1: Command-line argument
    if let Some(path) = cli_arg {
        return PathBuf::from(path);
    }

    // Priority 2: Environment variable
    if let Ok(path) = std::env::var(env_var_name) {
        return PathBuf::from(path);
    }

    // Priority 3: TOML config file
    if let Ok(config_path) = find_config_file() {
        if let Ok(toml_content) = std::fs::read_to_string(&config_path) {
            if let Ok(config) = toml::from_str::<toml::Value>(&toml_content) {
                if let Some(folder) = config.get("data_folder").and_then(|v| v.as_str()) {
                    return PathBuf::from(folder);
                }
            }
        }
    }

    // Priority 4: OS-dependent compiled default
    default_data_folder()
}

/// Locate the platform config file (~/.config/boxline/config.toml,
/// falling back to /etc/boxline/config.toml on Linux)
fn find_config_file() -> Result<PathBuf> {
    if let Some(user_config) = dirs::config_dir().map(|d| d.join("boxline").join("config.toml")) {
        if user_config.exists() {
            return Ok(user_config);
        }
    }

    if cfg!(target_os = "linux") {
        let system_config = PathBuf::from("/etc/boxline/config.toml");
        if system_config.exists() {
            return Ok(system_config);
        }
    }

    Err(Error::Config("No config file found".to_string()))
}

/// Default data folder when nothing else is configured
fn default_data_folder() -> PathBuf {
    dirs::data_dir()
        .map(|d| d.join("boxline"))
        .unwrap_or_else(|| PathBuf::from("./boxline-data"))
}

/// Database file path inside the data folder
pub fn database_path(data_folder: &std::path::Path) -> PathBuf {
    data_folder.join("boxline.db")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cli_argument_wins() {
        let folder = resolve_data_folder(Some("/tmp/boxline-test"), "BOXLINE_TEST_UNSET");
        assert_eq!(folder, PathBuf::from("/tmp/boxline-test"));
    }

    #[test]
    fn database_path_appends_file_name() {
        let path = database_path(&PathBuf::from("/var/lib/boxline"));
        assert_eq!(path, PathBuf::from("/var/lib/boxline/boxline.db"));
    }
}
