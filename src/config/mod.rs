//! Configuration module for commitlens
//!
//! This module handles:
//! - Repository settings (commitlens.toml / .commitlensrc.json)
//! - Ignore-pattern compilation

mod ignore_filter;
mod settings;

pub use ignore_filter::IgnoreFilter;
pub use settings::{
    ConfigError,
    JSON_CONFIG_FILE,
    MAX_CONCURRENCY,
    SettingKey,
    Settings,
    TOML_CONFIG_FILE,
    load_json_settings,
    load_settings,
    load_toml_settings,
    settings_file,
};
