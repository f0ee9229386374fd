//! Settings parser for config.toml

use std::path::{Path, PathBuf};

use super::types::Settings;
use chatlink_core::prelude::*;

pub const CONFIG_FILENAME: &str = "config.toml";
const APP_DIR: &str = "chatlink";

/// Overrides [`default_config_dir`] when set to a non-empty path.
pub const CONFIG_DIR_ENV: &str = "CHATLINK_CONFIG_DIR";

/// Per-user configuration directory: `$CHATLINK_CONFIG_DIR`, else
/// `<config_dir>/chatlink`.
pub fn default_config_dir() -> Option<PathBuf> {
    match std::env::var_os(CONFIG_DIR_ENV) {
        Some(dir) if !dir.is_empty() => Some(PathBuf::from(dir)),
        _ => dirs::config_dir().map(|dir| dir.join(APP_DIR)),
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Settings Loading
// ─────────────────────────────────────────────────────────────────────────────

/// Load settings from `<config_dir>/config.toml`
///
/// Returns default settings if file doesn't exist or can't be parsed.
pub fn load_settings(config_dir: &Path) -> Settings {
    load_settings_file(&config_dir.join(CONFIG_FILENAME))
}

/// Load settings from an explicit file path.
///
/// Returns default settings if file doesn't exist or can't be parsed.
pub fn load_settings_file(config_path: &Path) -> Settings {
    if !config_path.exists() {
        debug!("No config file at {:?}, using defaults", config_path);
        return Settings::default();
    }

    match std::fs::read_to_string(config_path) {
        Ok(content) => match toml::from_str(&content) {
            Ok(settings) => {
                debug!("Loaded settings from {:?}", config_path);
                settings
            }
            Err(e) => {
                warn!("Failed to parse {:?}: {}", config_path, e);
                Settings::default()
            }
        },
        Err(e) => {
            warn!("Failed to read {:?}: {}", config_path, e);
            Settings::default()
        }
    }
}

/// Create `config_dir` with a commented default config.toml
///
/// Never overwrites an existing file.
pub fn init_config_dir(config_dir: &Path) -> Result<()> {
    if !config_dir.exists() {
        std::fs::create_dir_all(config_dir)
            .map_err(|e| Error::config(format!("Failed to create config dir: {}", e)))?;
    }

    let config_path = config_dir.join(CONFIG_FILENAME);
    if !config_path.exists() {
        std::fs::write(&config_path, generate_default_config())
            .map_err(|e| Error::config(format!("Failed to write config.toml: {}", e)))?;
        info!("Created default {:?}", config_path);
    }

    Ok(())
}

fn generate_default_config() -> String {
    r#"# chatlink configuration

[server]
host = "127.0.0.1"
port = 8000
secure = false              # true = wss:// and https://

[session]
page_size = 50              # history records per page
auto_reconnect = false      # reconnect with backoff after an unexpected drop
max_reconnect_attempts = 10

[auth]
refresh_interval_secs = 300 # background token refresh
remember_me = true          # keep the refresh token for silent login
"#
    .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use tempfile::tempdir;

    #[test]
    fn test_load_settings_defaults() {
        let temp = tempdir().unwrap();
        let settings = load_settings(temp.path());

        assert_eq!(settings.server.port, 8000);
        assert_eq!(settings.session.page_size, 50);
        assert!(!settings.session.auto_reconnect);
    }

    #[test]
    fn test_load_settings_custom() {
        let temp = tempdir().unwrap();
        let config = r#"
[server]
host = "10.0.2.2"

[session]
auto_reconnect = true

[auth]
refresh_interval_secs = 60
"#;
        std::fs::write(temp.path().join(CONFIG_FILENAME), config).unwrap();

        let settings = load_settings(temp.path());

        assert_eq!(settings.server.host, "10.0.2.2");
        assert_eq!(settings.server.port, 8000);
        assert!(settings.session.auto_reconnect);
        assert_eq!(settings.auth.refresh_interval_secs, 60);
    }

    #[test]
    fn test_load_settings_invalid_toml() {
        let temp = tempdir().unwrap();
        std::fs::write(temp.path().join(CONFIG_FILENAME), "not valid toml {{{{").unwrap();

        let settings = load_settings(temp.path());
        assert_eq!(settings.server.host, "127.0.0.1");
    }

    #[test]
    fn test_init_config_dir() {
        let temp = tempdir().unwrap();
        let dir = temp.path().join("chatlink");

        init_config_dir(&dir).unwrap();

        let content = std::fs::read_to_string(dir.join(CONFIG_FILENAME)).unwrap();
        let parsed: Settings = toml::from_str(&content).expect("Default config should be valid TOML");
        assert_eq!(parsed.session.page_size, 50);
        assert_eq!(parsed.auth.refresh_interval_secs, 300);
    }

    #[test]
    fn test_init_config_dir_idempotent() {
        let temp = tempdir().unwrap();
        init_config_dir(temp.path()).unwrap();

        let config_path = temp.path().join(CONFIG_FILENAME);
        std::fs::write(&config_path, "[server]\nport = 9999\n").unwrap();

        init_config_dir(temp.path()).unwrap();

        let content = std::fs::read_to_string(&config_path).unwrap();
        assert!(content.contains("port = 9999"));
    }

    #[test]
    #[serial]
    fn test_config_dir_env_override() {
        let temp = tempdir().unwrap();
        std::env::set_var(CONFIG_DIR_ENV, temp.path());
        assert_eq!(default_config_dir(), Some(temp.path().to_path_buf()));
        std::env::remove_var(CONFIG_DIR_ENV);
    }

    #[test]
    #[serial]
    fn test_config_dir_empty_env_ignored() {
        std::env::set_var(CONFIG_DIR_ENV, "");
        let dir = default_config_dir();
        std::env::remove_var(CONFIG_DIR_ENV);
        if let Some(dir) = dir {
            assert!(dir.ends_with("chatlink"));
        }
    }
}
