//! Recovery configuration.
//!
//! Loaded from an optional TOML file, then overridden by `SALVAGE__*`
//! environment variables (`SALVAGE__ESCROW__SCAN_DEPTH=20000`). Every
//! field has a default, so both sources are optional.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use config::{Config, Environment, File, FileFormat};
use serde::Deserialize;

use salvage_escrow::feed::DEFAULT_MIN_FEED_ROWS;
use salvage_escrow::SessionConfig;
use salvage_wallet::GenerationConfig;

/// Public escrow UTXO feed.
pub const DEFAULT_FEED_URL: &str =
    "https://localcryptos-public-escrow-data.s3.ap-southeast-2.amazonaws.com/escrow-txos-unspent.csv";

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct RecoveryConfig {
    pub generation: GenerationSettings,
    pub escrow: EscrowSettings,
    pub export: ExportSettings,
    /// Log level filter string (e.g. "info", "salvage_escrow=debug").
    pub log_level: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct GenerationSettings {
    pub first_batch: usize,
    pub max_batch: usize,
    pub export_minimum: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct EscrowSettings {
    /// Wallet keys checked against the feed.
    pub scan_depth: usize,
    pub feed_url: String,
    pub min_feed_rows: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct ExportSettings {
    pub file_prefix: String,
    pub output_dir: PathBuf,
}

impl Default for RecoveryConfig {
    fn default() -> Self {
        Self {
            generation: GenerationSettings::default(),
            escrow: EscrowSettings::default(),
            export: ExportSettings::default(),
            log_level: "info".to_string(),
        }
    }
}

impl Default for GenerationSettings {
    fn default() -> Self {
        let g = GenerationConfig::default();
        Self {
            first_batch: g.first_batch,
            max_batch: g.max_batch,
            export_minimum: g.export_minimum,
        }
    }
}

impl Default for EscrowSettings {
    fn default() -> Self {
        Self {
            scan_depth: SessionConfig::default().scan_depth,
            feed_url: DEFAULT_FEED_URL.to_string(),
            min_feed_rows: DEFAULT_MIN_FEED_ROWS,
        }
    }
}

impl Default for ExportSettings {
    fn default() -> Self {
        Self {
            file_prefix: "LocalCryptos".to_string(),
            output_dir: PathBuf::from("."),
        }
    }
}

impl RecoveryConfig {
    /// Load from `file` (if given) and the process environment.
    pub fn load(file: Option<&Path>) -> Result<Self> {
        Self::build(file, environment())
    }

    fn build(file: Option<&Path>, env: Environment) -> Result<Self> {
        let mut builder = Config::builder();
        if let Some(path) = file {
            builder = builder.add_source(File::from(path.to_path_buf()).format(FileFormat::Toml));
        }
        builder
            .add_source(env)
            .build()
            .context("Failed to read configuration")?
            .try_deserialize()
            .context("Invalid configuration")
    }

    pub fn generation(&self) -> GenerationConfig {
        GenerationConfig {
            first_batch: self.generation.first_batch,
            max_batch: self.generation.max_batch,
            export_minimum: self.generation.export_minimum,
        }
    }

    pub fn session(&self) -> SessionConfig {
        SessionConfig {
            scan_depth: self.escrow.scan_depth,
            min_feed_rows: self.escrow.min_feed_rows,
            generation: self.generation(),
        }
    }
}

fn environment() -> Environment {
    Environment::with_prefix("SALVAGE")
        .separator("__")
        .try_parsing(true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn empty_env() -> Environment {
        environment().source(Some(HashMap::new()))
    }

    #[test]
    fn defaults() {
        let cfg = RecoveryConfig::default();
        assert_eq!(cfg.log_level, "info");
        assert_eq!(cfg.generation.first_batch, 100);
        assert_eq!(cfg.generation.max_batch, 10_000);
        assert_eq!(cfg.generation.export_minimum, 1_000);
        assert_eq!(cfg.escrow.scan_depth, 10_000);
        assert_eq!(cfg.escrow.min_feed_rows, 10);
        assert_eq!(cfg.export.file_prefix, "LocalCryptos");
        assert_eq!(cfg.export.output_dir, PathBuf::from("."));
    }

    #[test]
    fn no_sources_gives_defaults() {
        let cfg = RecoveryConfig::build(None, empty_env()).unwrap();
        assert_eq!(cfg, RecoveryConfig::default());
    }

    #[test]
    fn file_overrides_some_fields() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("salvage.toml");
        std::fs::write(
            &path,
            "log_level = \"debug\"\n[escrow]\nscan_depth = 250\n[export]\noutput_dir = \"/tmp/keys\"\n",
        )
        .unwrap();
        let cfg = RecoveryConfig::build(Some(&path), empty_env()).unwrap();
        assert_eq!(cfg.log_level, "debug");
        assert_eq!(cfg.escrow.scan_depth, 250);
        assert_eq!(cfg.escrow.min_feed_rows, 10);
        assert_eq!(cfg.export.output_dir, PathBuf::from("/tmp/keys"));
        assert_eq!(cfg.generation, GenerationSettings::default());
    }

    #[test]
    fn environment_overrides_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("salvage.toml");
        std::fs::write(&path, "[generation]\nmax_batch = 2000\n").unwrap();
        let env = environment().source(Some(HashMap::from([(
            "SALVAGE__GENERATION__MAX_BATCH".to_string(),
            "500".to_string(),
        )])));
        let cfg = RecoveryConfig::build(Some(&path), env).unwrap();
        assert_eq!(cfg.generation.max_batch, 500);
        assert_eq!(cfg.generation().max_batch, 500);
    }

    #[test]
    fn missing_file_is_an_error() {
        let path = Path::new("/nonexistent/salvage.toml");
        assert!(RecoveryConfig::build(Some(path), empty_env()).is_err());
    }

    #[test]
    fn session_config_mirrors_settings() {
        let cfg = RecoveryConfig {
            escrow: EscrowSettings {
                scan_depth: 42,
                min_feed_rows: 3,
                ..EscrowSettings::default()
            },
            ..RecoveryConfig::default()
        };
        let session = cfg.session();
        assert_eq!(session.scan_depth, 42);
        assert_eq!(session.min_feed_rows, 3);
        assert_eq!(session.generation, GenerationConfig::default());
    }
}
