mod types;

pub use types::*;

use anyhow::{Context, Result};
use std::collections::HashSet;
use std::path::Path;

/// Load configuration from a TOML file
pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {:?}", path))?;

    let config: Config = toml::from_str(&content)
        .with_context(|| format!("Failed to parse config file: {:?}", path))?;

    validate_config(&config)?;

    Ok(config)
}

/// Default config file locations, in search order.
pub const DEFAULT_PATHS: &[&str] = &[
    "./reelhunt.toml",
    "~/.config/reelhunt/config.toml",
    "/etc/reelhunt/config.toml",
];

/// Find the first default config file that exists.
pub fn find_default_config() -> Option<std::path::PathBuf> {
    DEFAULT_PATHS.iter().find_map(|path_str| {
        let path = shellexpand::tilde(path_str);
        let path = Path::new(path.as_ref());
        path.exists().then(|| path.to_path_buf())
    })
}

/// Load config from the given path, a default location, or defaults.
pub fn load_config_or_default(custom_path: Option<&Path>) -> Result<Config> {
    if let Some(path) = custom_path {
        return load_config(path);
    }

    match find_default_config() {
        Some(path) => load_config(&path),
        None => Ok(Config::default()),
    }
}

/// Validate configuration
pub fn validate_config(config: &Config) -> Result<()> {
    if config.server.port == 0 {
        anyhow::bail!("Server port cannot be 0");
    }

    if config.cloud.enabled {
        if config.cloud.base_url.trim().is_empty() {
            anyhow::bail!("Cloud backend is enabled but has no base_url");
        }
        if config.cloud.api_key.trim().is_empty() {
            anyhow::bail!("Cloud backend is enabled but has no API key");
        }
    }

    let mut names = HashSet::new();
    for library in &config.local_index.libraries {
        if library.name.trim().is_empty() {
            anyhow::bail!("Library name cannot be empty");
        }
        if !library
            .name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
        {
            anyhow::bail!(
                "Library name '{}' may only contain letters, digits, '-' and '_'",
                library.name
            );
        }
        if !names.insert(library.name.as_str()) {
            anyhow::bail!("Duplicate library name '{}'", library.name);
        }
        if !library.path.exists() {
            tracing::warn!("Library path does not exist: {:?}", library.path);
        }
    }

    if config.cache.ttl_hours == 0 {
        anyhow::bail!("cache.ttl_hours must be greater than 0");
    }
    if config.cache.sweep_interval_secs == 0 || config.jobs.reap_interval_secs == 0 {
        anyhow::bail!("Sweep and reap intervals must be greater than 0");
    }

    let playback = &config.playback;
    if playback.window_ms == 0 {
        anyhow::bail!("playback.window_ms must be greater than 0");
    }
    if playback.low_threshold < 1 {
        anyhow::bail!("playback.low_threshold must be at least 1");
    }
    if playback.consecutive_threshold < 2 {
        anyhow::bail!("playback.consecutive_threshold must be at least 2");
    }
    if !(1..=10).contains(&playback.test_duration_secs) {
        anyhow::bail!("playback.test_duration_secs must be between 1 and 10");
    }

    Ok(())
}
