//! User configuration for the `mvgrid` tool.
//!
//! Stored in `~/.mvgrid/config.toml`. Partial files are fine: every missing
//! key falls back to its default.

use std::path::{Path, PathBuf};
use std::str::FromStr;

use anyhow::{anyhow, Context, Result};
use mvgrid_algo::LinkOptions;
use mvgrid_core::ValidationOptions;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MvgridConfig {
    pub core: CoreConfig,
    pub metrics: MetricsConfig,
    pub linking: LinkingConfig,
    pub diagnostics: DiagnosticsConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CoreConfig {
    /// Relative snapshot paths that do not exist are looked up here.
    pub snapshot_dir: Option<PathBuf>,

    /// Log level used when `--log-level` is not given.
    pub log_level: String,
}

impl Default for CoreConfig {
    fn default() -> Self {
        Self {
            snapshot_dir: None,
            log_level: "info".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MetricsConfig {
    /// Allowed length difference (km) between per-entity and bulk results.
    pub parity_tolerance: f64,

    /// Use the bulk evaluation unless asked otherwise.
    pub bulk: bool,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            parity_tolerance: 1e-9,
            bulk: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LinkingConfig {
    pub require_temporal_overlap: bool,
    pub link_layers: bool,
}

impl Default for LinkingConfig {
    fn default() -> Self {
        let options = LinkOptions::default();
        Self {
            require_temporal_overlap: options.require_temporal_overlap,
            link_layers: options.link_layers,
        }
    }
}

impl LinkingConfig {
    pub fn options(&self) -> LinkOptions {
        LinkOptions {
            require_temporal_overlap: self.require_temporal_overlap,
            link_layers: self.link_layers,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DiagnosticsConfig {
    /// Relative deviation of recorded vs. drawn length before a warning.
    pub length_deviation: f64,
}

impl Default for DiagnosticsConfig {
    fn default() -> Self {
        Self {
            length_deviation: ValidationOptions::default().length_deviation,
        }
    }
}

impl DiagnosticsConfig {
    pub fn options(&self) -> ValidationOptions {
        ValidationOptions {
            length_deviation: self.length_deviation,
        }
    }
}

impl MvgridConfig {
    pub fn config_dir() -> Option<PathBuf> {
        dirs::home_dir().map(|h| h.join(".mvgrid"))
    }

    pub fn config_path() -> Option<PathBuf> {
        Self::config_dir().map(|d| d.join("config.toml"))
    }

    /// Load from the default location; defaults when there is no file.
    pub fn load() -> Result<Self> {
        match Self::config_path() {
            Some(path) if path.exists() => Self::load_from(&path),
            _ => Ok(Self::default()),
        }
    }

    /// An explicit path must exist.
    pub fn load_from(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("reading config '{}'", path.display()))?;
        toml::from_str(&contents).with_context(|| format!("parsing config '{}'", path.display()))
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let contents = toml::to_string_pretty(self).context("serializing config")?;
        std::fs::write(path, contents)
            .with_context(|| format!("writing config '{}'", path.display()))
    }

    pub fn log_level(&self) -> Result<tracing::Level> {
        tracing::Level::from_str(&self.core.log_level)
            .map_err(|_| anyhow!("invalid core.log_level '{}'", self.core.log_level))
    }

    /// Resolve a snapshot argument: as given if it exists, otherwise under
    /// `core.snapshot_dir` when that is set.
    pub fn resolve_snapshot(&self, path: &Path) -> PathBuf {
        if path.exists() || path.is_absolute() {
            return path.to_path_buf();
        }
        match &self.core.snapshot_dir {
            Some(dir) if dir.join(path).exists() => dir.join(path),
            _ => path.to_path_buf(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::NamedTempFile;

    #[test]
    fn test_default_config() {
        let config = MvgridConfig::default();
        assert_eq!(config.core.log_level, "info");
        assert!(!config.metrics.bulk);
        assert!(config.linking.require_temporal_overlap);
        assert!((config.diagnostics.length_deviation - 0.1).abs() < 1e-12);
    }

    #[test]
    fn test_partial_config_parsing() {
        let toml = r#"
            [metrics]
            bulk = true

            [linking]
            link_layers = false
        "#;
        let config: MvgridConfig = toml::from_str(toml).unwrap();
        assert!(config.metrics.bulk);
        assert!((config.metrics.parity_tolerance - 1e-9).abs() < 1e-15);
        assert!(!config.linking.options().link_layers);
        assert!(config.linking.options().require_temporal_overlap);
        assert_eq!(config.core, CoreConfig::default());
    }

    #[test]
    fn test_save_and_load_roundtrip() {
        let mut config = MvgridConfig::default();
        config.core.log_level = "debug".to_string();
        config.diagnostics.length_deviation = 0.25;

        let file = NamedTempFile::new().unwrap();
        config.save_to(file.path()).unwrap();
        let loaded = MvgridConfig::load_from(file.path()).unwrap();
        assert_eq!(loaded, config);
        assert_eq!(loaded.log_level().unwrap(), tracing::Level::DEBUG);
    }

    #[test]
    fn test_bad_log_level() {
        let mut config = MvgridConfig::default();
        config.core.log_level = "chatty".to_string();
        assert!(config.log_level().is_err());
    }

    #[test]
    fn test_snapshot_dir_lookup() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("grid.json"), "{}").unwrap();
        let mut config = MvgridConfig::default();
        config.core.snapshot_dir = Some(dir.path().to_path_buf());
        assert_eq!(
            config.resolve_snapshot(Path::new("grid.json")),
            dir.path().join("grid.json")
        );
        assert_eq!(
            config.resolve_snapshot(Path::new("missing.json")),
            PathBuf::from("missing.json")
        );
    }
}
