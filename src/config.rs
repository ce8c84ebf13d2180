//! Configuration for index maintenance
//!
//! Supports loading configuration from:
//! - Default values
//! - Config file (docmap.toml)
//! - Environment variables (DOCMAP__*)
//!
//! ## Example config file (docmap.toml):
//! ```toml
//! [reconcile]
//! wait = true
//! wait_timeout_secs = 30
//! verbose = true
//!
//! [schema]
//! path = "config/schema.toml"
//! ```

use config_crate::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::reconcile::ReconcileOptions;

/// Main configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SchemaConfig {
    /// Index reconciliation settings
    #[serde(default)]
    pub reconcile: ReconcileConfig,

    /// Declarative schema file settings
    #[serde(default)]
    pub schema: SchemaFileConfig,
}

/// Reconciliation configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReconcileConfig {
    /// Wait for created indexes to become ready
    #[serde(default = "default_true")]
    pub wait: bool,

    /// Give up waiting after this many seconds
    #[serde(default)]
    pub wait_timeout_secs: Option<u64>,

    /// Log every created and dropped index
    #[serde(default)]
    pub verbose: bool,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SchemaFileConfig {
    /// Path to the declarative schema file
    #[serde(default)]
    pub path: Option<PathBuf>,
}

fn default_true() -> bool {
    true
}

impl Default for ReconcileConfig {
    fn default() -> Self {
        Self {
            wait: true,
            wait_timeout_secs: None,
            verbose: false,
        }
    }
}

impl From<&ReconcileConfig> for ReconcileOptions {
    fn from(config: &ReconcileConfig) -> Self {
        Self {
            wait: config.wait,
            verbose: config.verbose,
            wait_timeout: config.wait_timeout_secs.map(Duration::from_secs),
        }
    }
}

impl SchemaConfig {
    /// Load configuration from default locations
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from(None)
    }

    /// Load configuration, adding a required file on top of the defaults
    pub fn load_from(config_path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut builder = Config::builder();

        let config_locations = ["docmap.toml", ".docmap.toml", "config/docmap.toml"];

        for location in config_locations {
            builder = builder.add_source(File::with_name(location).required(false));
        }

        if let Some(config_dir) = directories::ProjectDirs::from("dev", "docmap", "docmap") {
            let xdg_config = config_dir.config_dir().join("docmap.toml");
            if xdg_config.exists() {
                builder = builder.add_source(File::from(xdg_config).required(false));
            }
        }

        if let Some(path) = config_path {
            builder = builder.add_source(File::from(path).required(true));
        }

        // DOCMAP__RECONCILE__VERBOSE=true
        builder = builder.add_source(
            Environment::with_prefix("DOCMAP")
                .prefix_separator("__")
                .separator("__")
                .try_parsing(true),
        );

        let config = builder.build()?;
        config.try_deserialize()
    }

    /// Save configuration to a file
    pub fn save(&self, path: &Path) -> std::io::Result<()> {
        let content = toml::to_string_pretty(self)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;
        std::fs::write(path, content)
    }

    pub fn reconcile_options(&self) -> ReconcileOptions {
        ReconcileOptions::from(&self.reconcile)
    }

    /// Schema file path, resolved against the current directory
    pub fn schema_path(&self) -> Option<PathBuf> {
        self.schema.path.as_ref().map(|p| {
            if p.is_absolute() {
                p.clone()
            } else {
                std::env::current_dir().unwrap_or_default().join(p)
            }
        })
    }
}
