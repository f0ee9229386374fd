//! Configuration file parsing for chatlink
//!
//! Supports `<config_dir>/chatlink/config.toml` or an explicit file path.

pub mod settings;
pub mod types;

pub use settings::{
    default_config_dir, init_config_dir, load_settings, load_settings_file, CONFIG_DIR_ENV,
    CONFIG_FILENAME,
};
pub use types::*;
