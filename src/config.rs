use std::path::PathBuf;

use log::{debug, info};
use serde::Deserialize;

use crate::prefetch::DEFAULT_RADIUS;

// ---------------------------------------------------------------------------
// ConfigFile — deserialized from TOML (all fields optional)
// ---------------------------------------------------------------------------

#[derive(Default, Deserialize)]
#[serde(default)]
pub struct ConfigFile {
    pub workers: Option<usize>,
    pub cache_capacity: Option<usize>,
    #[serde(default)]
    pub prefetch: PrefetchConfigFile,
}

#[derive(Default, Deserialize)]
#[serde(default)]
pub struct PrefetchConfigFile {
    pub behind: Option<usize>,
    pub ahead: Option<usize>,
}

// ---------------------------------------------------------------------------
// PipelineConfig — resolved (all fields concrete)
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub workers: usize,
    pub cache_capacity: usize,
    pub prefetch_behind: usize,
    pub prefetch_ahead: usize,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        ConfigFile::default().resolve()
    }
}

impl PipelineConfig {
    /// Distance beyond which a queued job is considered stale. Tied to
    /// the prefetch window: anything the planner would not warm is not
    /// worth rendering either.
    pub fn stale_radius(&self) -> usize {
        self.prefetch_behind.max(self.prefetch_ahead)
    }
}

impl ConfigFile {
    /// Resolve to a PipelineConfig by applying defaults to missing fields.
    pub fn resolve(self) -> PipelineConfig {
        let config = PipelineConfig {
            workers: self.workers.unwrap_or(2).max(1),
            cache_capacity: self.cache_capacity.unwrap_or(100).max(1),
            prefetch_behind: self.prefetch.behind.unwrap_or(DEFAULT_RADIUS),
            prefetch_ahead: self.prefetch.ahead.unwrap_or(DEFAULT_RADIUS),
        };
        info!(
            "config: resolved workers={}, cache_capacity={}, prefetch={}+{}",
            config.workers, config.cache_capacity, config.prefetch_behind, config.prefetch_ahead,
        );
        config
    }
}

/// Resolve the XDG config path for panelflow.
fn config_path() -> Option<PathBuf> {
    let config_dir = std::env::var_os("XDG_CONFIG_HOME")
        .map(PathBuf::from)
        .or_else(|| std::env::var_os("HOME").map(|h| PathBuf::from(h).join(".config")))?;
    Some(config_dir.join("panelflow").join("config.toml"))
}

/// Load config file. Returns `ConfigFile::default()` if no file exists.
/// Returns an error if the file exists but cannot be parsed.
pub fn load_config() -> anyhow::Result<ConfigFile> {
    let path = match config_path() {
        Some(p) => p,
        None => {
            info!("config: no HOME or XDG_CONFIG_HOME set, using defaults");
            return Ok(ConfigFile::default());
        }
    };
    debug!("config: looking for {}", path.display());
    match std::fs::read_to_string(&path) {
        Ok(text) => {
            info!("config: loaded from {}", path.display());
            let cfg: ConfigFile = toml::from_str(&text)
                .map_err(|e| anyhow::anyhow!("failed to parse {}: {e}", path.display()))?;
            Ok(cfg)
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            info!("config: {} not found, using defaults", path.display());
            Ok(ConfigFile::default())
        }
        Err(e) => Err(anyhow::anyhow!("failed to read {}: {e}", path.display())),
    }
}
