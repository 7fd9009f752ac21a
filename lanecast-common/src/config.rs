//! Configuration loading and root folder resolution

use crate::{Error, Result};
use std::path::{Path, PathBuf};

/// Environment variable naming the shared data folder
pub const ROOT_FOLDER_ENV: &str = "LANECAST_ROOT_FOLDER";

/// Database file name inside the root folder
pub const DATABASE_FILE_NAME: &str = "lanecast.db";

/// Root folder resolution in priority order:
/// 1. Command-line argument (highest priority)
/// 2. Environment variable
/// 3. TOML config file (`root_folder` key)
/// 4. OS-dependent compiled default (fallback)
pub fn resolve_root_folder(cli_arg: Option<&str>, env_var_name: &str) -> PathBuf {
    // Priority 1: Command-line argument
    if let Some(path) = cli_arg {
        return PathBuf::from(path);
    }

    // Priority 2: Environment variable
    if let Ok(path) = std::env::var(env_var_name) {
        if !path.trim().is_empty() {
            return PathBuf::from(path);
        }
    }

    // Priority 3: TOML config file
    if let Ok(config_path) = default_config_file() {
        if let Ok(toml_content) = std::fs::read_to_string(&config_path) {
            if let Ok(config) = toml::from_str::<toml::Value>(&toml_content) {
                if let Some(root_folder) = config.get("root_folder").and_then(|v| v.as_str()) {
                    return PathBuf::from(root_folder);
                }
            }
        }
    }

    // Priority 4: OS-dependent compiled default
    default_root_folder()
}

/// Shared database path for a root folder
pub fn database_path(root_folder: &Path) -> PathBuf {
    root_folder.join(DATABASE_FILE_NAME)
}

/// Locate the default configuration file for the platform
pub fn default_config_file() -> Result<PathBuf> {
    let user_config = dirs::config_dir().map(|d| d.join("lanecast").join("config.toml"));

    if let Some(path) = user_config {
        if path.exists() {
            return Ok(path);
        }
    }

    if cfg!(target_os = "linux") {
        let system_config = PathBuf::from("/etc/lanecast/config.toml");
        if system_config.exists() {
            return Ok(system_config);
        }
    }

    Err(Error::Config("No config file found".to_string()))
}

/// OS-dependent default root folder path
fn default_root_folder() -> PathBuf {
    if cfg!(target_os = "linux") {
        // ~/.local/share/lanecast (or /var/lib/lanecast for system-wide)
        dirs::data_local_dir()
            .map(|d| d.join("lanecast"))
            .unwrap_or_else(|| PathBuf::from("/var/lib/lanecast"))
    } else if cfg!(target_os = "macos") {
        dirs::data_dir()
            .map(|d| d.join("lanecast"))
            .unwrap_or_else(|| PathBuf::from("/Library/Application Support/lanecast"))
    } else if cfg!(target_os = "windows") {
        dirs::data_local_dir()
            .map(|d| d.join("lanecast"))
            .unwrap_or_else(|| PathBuf::from("C:\\ProgramData\\lanecast"))
    } else {
        PathBuf::from("./lanecast_data")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    const TEST_ENV: &str = "LANECAST_TEST_ROOT_FOLDER";

    #[test]
    #[serial]
    fn test_cli_argument_wins() {
        std::env::set_var(TEST_ENV, "/from/env");
        let root = resolve_root_folder(Some("/from/cli"), TEST_ENV);
        std::env::remove_var(TEST_ENV);
        assert_eq!(root, PathBuf::from("/from/cli"));
    }

    #[test]
    #[serial]
    fn test_env_var_used_without_cli() {
        std::env::set_var(TEST_ENV, "/from/env");
        let root = resolve_root_folder(None, TEST_ENV);
        std::env::remove_var(TEST_ENV);
        assert_eq!(root, PathBuf::from("/from/env"));
    }

    #[test]
    #[serial]
    fn test_blank_env_var_ignored() {
        std::env::set_var(TEST_ENV, "   ");
        let root = resolve_root_folder(None, TEST_ENV);
        std::env::remove_var(TEST_ENV);
        assert_ne!(root, PathBuf::from("   "));
    }

    #[test]
    fn test_database_path_inside_root() {
        let path = database_path(Path::new("/srv/lanecast"));
        assert_eq!(path, PathBuf::from("/srv/lanecast/lanecast.db"));
    }
}
