mod file_config;

pub use file_config::{CatalogConfig, EnrichmentConfig, FileConfig, ImportConfig, ReorderConfig};

use crate::catalog::CatalogSettings;
use crate::import::{ImportLimits, DEFAULT_BATCH_SIZE};
use crate::reorder::DEFAULT_DEBOUNCE;
use anyhow::{bail, Result};
use std::path::PathBuf;
use std::time::Duration;

pub const DEFAULT_TEMPO_API_URL: &str = "https://api.getsong.co";
pub const DEFAULT_BROADCAST_CAPACITY: usize = 256;

/// CLI arguments that can be overridden by the TOML config.
#[derive(Debug, Clone, Default)]
pub struct CliConfig {
    pub db_path: Option<PathBuf>,
    pub band_id: Option<String>,
    pub enrichment_api_key: Option<String>,
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub db_path: PathBuf,
    pub band_id: Option<String>,
    pub broadcast_capacity: usize,

    pub catalog: CatalogSettings,
    pub import: ImportSettings,
    pub debounce: Duration,
    pub enrichment: Option<EnrichmentSettings>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ImportSettings {
    pub limits: ImportLimits,
    pub batch_size: usize,
}

impl Default for ImportSettings {
    fn default() -> Self {
        Self {
            limits: ImportLimits::default(),
            batch_size: DEFAULT_BATCH_SIZE,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnrichmentSettings {
    pub api_url: String,
    pub api_key: String,
    pub timeout_sec: u64,
    pub user_agent: String,
}

impl AppConfig {
    /// Resolve configuration from CLI arguments and optional TOML file config.
    /// TOML values override CLI values where present.
    pub fn resolve(cli: &CliConfig, file_config: Option<FileConfig>) -> Result<Self> {
        let file = file_config.unwrap_or_default();

        let db_path = file
            .db_path
            .map(PathBuf::from)
            .or_else(|| cli.db_path.clone())
            .ok_or_else(|| {
                anyhow::anyhow!("db_path must be specified via --db-path or in config file")
            })?;
        if db_path.is_dir() {
            bail!("db_path points to a directory: {:?}", db_path);
        }
        if let Some(parent) = db_path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                bail!("Database directory does not exist: {:?}", parent);
            }
        }

        let band_id = file
            .band_id
            .or_else(|| cli.band_id.clone())
            .filter(|b| !b.trim().is_empty());

        let broadcast_capacity = file
            .broadcast_capacity
            .unwrap_or(DEFAULT_BROADCAST_CAPACITY);
        if broadcast_capacity == 0 {
            bail!("broadcast_capacity must be at least 1");
        }

        let catalog_file = file.catalog.unwrap_or_default();
        let defaults = CatalogSettings::default();
        let catalog = CatalogSettings {
            canonical_name: catalog_file
                .canonical_name
                .unwrap_or(defaults.canonical_name),
            legacy_names: catalog_file.legacy_names.unwrap_or(defaults.legacy_names),
        };
        if catalog.canonical_name.trim().is_empty() {
            bail!("catalog.canonical_name cannot be empty");
        }

        let import_file = file.import.unwrap_or_default();
        let defaults = ImportSettings::default();
        let import = ImportSettings {
            limits: ImportLimits {
                max_rows: import_file.max_rows.unwrap_or(defaults.limits.max_rows),
                min_bpm: import_file.min_bpm.unwrap_or(defaults.limits.min_bpm),
                max_bpm: import_file.max_bpm.unwrap_or(defaults.limits.max_bpm),
            },
            batch_size: import_file.batch_size.unwrap_or(defaults.batch_size),
        };
        if import.batch_size == 0 {
            bail!("import.batch_size must be at least 1");
        }
        if import.limits.max_rows == 0 {
            bail!("import.max_rows must be at least 1");
        }
        if import.limits.min_bpm >= import.limits.max_bpm {
            bail!(
                "import.min_bpm ({}) must be lower than import.max_bpm ({})",
                import.limits.min_bpm,
                import.limits.max_bpm
            );
        }

        let debounce = file
            .reorder
            .and_then(|r| r.debounce_ms)
            .map(Duration::from_millis)
            .unwrap_or(DEFAULT_DEBOUNCE);

        let enrichment_file = file.enrichment.unwrap_or_default();
        let enrichment = if enrichment_file.enabled.unwrap_or(false) {
            let Some(api_key) = enrichment_file
                .api_key
                .or_else(|| cli.enrichment_api_key.clone())
            else {
                bail!("enrichment is enabled but no api_key was given");
            };
            Some(EnrichmentSettings {
                api_url: enrichment_file
                    .api_url
                    .unwrap_or_else(|| DEFAULT_TEMPO_API_URL.to_string()),
                api_key,
                timeout_sec: enrichment_file.timeout_sec.unwrap_or(10),
                user_agent: enrichment_file
                    .user_agent
                    .unwrap_or_else(|| format!("setlist-catalog/{}", env!("CARGO_PKG_VERSION"))),
            })
        } else {
            None
        };

        Ok(Self {
            db_path,
            band_id,
            broadcast_capacity,
            catalog,
            import,
            debounce,
            enrichment,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn cli_with_db(dir: &TempDir) -> CliConfig {
        CliConfig {
            db_path: Some(dir.path().join("setlists.db")),
            ..Default::default()
        }
    }

    #[test]
    fn cli_only_uses_defaults() {
        let dir = TempDir::new().unwrap();
        let config = AppConfig::resolve(&cli_with_db(&dir), None).unwrap();
        assert_eq!(config.db_path, dir.path().join("setlists.db"));
        assert_eq!(config.catalog, CatalogSettings::default());
        assert_eq!(config.import, ImportSettings::default());
        assert_eq!(config.import.limits.max_rows, 500);
        assert_eq!(config.import.batch_size, 25);
        assert_eq!(config.debounce, Duration::from_millis(500));
        assert_eq!(config.broadcast_capacity, 256);
        assert!(config.enrichment.is_none());
        assert!(config.band_id.is_none());
    }

    #[test]
    fn file_overrides_cli() {
        let dir = TempDir::new().unwrap();
        let cli = CliConfig {
            band_id: Some("from-cli".to_string()),
            ..cli_with_db(&dir)
        };
        let file = FileConfig {
            band_id: Some("from-file".to_string()),
            reorder: Some(ReorderConfig {
                debounce_ms: Some(250),
            }),
            import: Some(ImportConfig {
                batch_size: Some(5),
                ..Default::default()
            }),
            ..Default::default()
        };
        let config = AppConfig::resolve(&cli, Some(file)).unwrap();
        assert_eq!(config.band_id.as_deref(), Some("from-file"));
        assert_eq!(config.debounce, Duration::from_millis(250));
        assert_eq!(config.import.batch_size, 5);
        assert_eq!(config.import.limits.max_bpm, 300);
    }

    #[test]
    fn missing_db_path_fails() {
        let err = AppConfig::resolve(&CliConfig::default(), None).unwrap_err();
        assert!(err.to_string().contains("db_path"));
    }

    #[test]
    fn invalid_combinations_fail() {
        let dir = TempDir::new().unwrap();
        let cli = cli_with_db(&dir);

        let zero_batch = FileConfig {
            import: Some(ImportConfig {
                batch_size: Some(0),
                ..Default::default()
            }),
            ..Default::default()
        };
        assert!(AppConfig::resolve(&cli, Some(zero_batch)).is_err());

        let inverted_bpm = FileConfig {
            import: Some(ImportConfig {
                min_bpm: Some(200),
                max_bpm: Some(100),
                ..Default::default()
            }),
            ..Default::default()
        };
        assert!(AppConfig::resolve(&cli, Some(inverted_bpm)).is_err());

        let keyless = FileConfig {
            enrichment: Some(EnrichmentConfig {
                enabled: Some(true),
                ..Default::default()
            }),
            ..Default::default()
        };
        assert!(AppConfig::resolve(&cli, Some(keyless)).is_err());
    }

    #[test]
    fn enrichment_key_can_come_from_cli() {
        let dir = TempDir::new().unwrap();
        let cli = CliConfig {
            enrichment_api_key: Some("cli-key".to_string()),
            ..cli_with_db(&dir)
        };
        let file = FileConfig {
            enrichment: Some(EnrichmentConfig {
                enabled: Some(true),
                ..Default::default()
            }),
            ..Default::default()
        };
        let enrichment = AppConfig::resolve(&cli, Some(file))
            .unwrap()
            .enrichment
            .unwrap();
        assert_eq!(enrichment.api_key, "cli-key");
        assert_eq!(enrichment.api_url, DEFAULT_TEMPO_API_URL);
        assert_eq!(enrichment.timeout_sec, 10);
    }
}
