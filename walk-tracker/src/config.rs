//! Configuration resolution for walk-tracker
//!
//! The Flickr API key is resolved with ENV → TOML priority; the port with
//! CLI → TOML → compiled default.

use tracing::{info, warn};
use walk_common::config::{CompiledDefaults, TomlConfig};

/// Environment variable holding the Flickr API key
pub const FLICKR_API_KEY_ENV: &str = "WALK_FLICKR_API_KEY";

/// Resolve the Flickr API key
///
/// Returns `None` when no source has a usable key; photo search is then
/// disabled but the rest of the tracker still runs.
pub fn resolve_flickr_api_key(toml_config: &TomlConfig) -> Option<String> {
    let env_key = std::env::var(FLICKR_API_KEY_ENV)
        .ok()
        .filter(|k| is_valid_key(k));
    let toml_key = toml_config
        .flickr_api_key
        .clone()
        .filter(|k| is_valid_key(k));

    if env_key.is_some() && toml_key.is_some() {
        warn!(
            "Flickr API key found in environment and TOML config. Using {} (highest priority).",
            FLICKR_API_KEY_ENV
        );
    }

    if let Some(key) = env_key {
        info!("Flickr API key loaded from environment variable");
        return Some(key);
    }

    if let Some(key) = toml_key {
        info!("Flickr API key loaded from TOML config");
        return Some(key);
    }

    warn!(
        "Flickr API key not configured. Set {} or flickr_api_key in the TOML config. \
         Obtain a key at https://www.flickr.com/services/apps/create/",
        FLICKR_API_KEY_ENV
    );
    None
}

/// Validate API key (non-empty, non-whitespace)
pub fn is_valid_key(key: &str) -> bool {
    !key.trim().is_empty()
}

/// HTTP port: command line, then TOML, then compiled default
pub fn resolve_port(cli_port: Option<u16>, toml_config: &TomlConfig) -> u16 {
    cli_port
        .or(toml_config.port)
        .unwrap_or_else(|| CompiledDefaults::for_current_platform().port)
}
