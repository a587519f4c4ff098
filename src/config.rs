//! # Configuration Management Module
//!
//! Questo modulo gestisce tutta la configurazione della conversione.
//!
//! ## Responsabilità:
//! - Definisce la struct `Config` con tutti i parametri di conversione
//! - Fornisce validazione dei parametri di input
//! - Supporta caricamento/salvataggio configurazione da/verso file JSON
//! - Fornisce valori di default sensati per tutti i parametri
//!
//! ## Parametri di configurazione:
//! - `quality`: Qualità WebP (1-100, default: 75)
//! - `max_dimension`: Lato massimo in pixel (default: 3000)
//! - `max_concurrency`: Ampiezza massima di un'onda (default: 4, limitata dai core)
//! - `collision_policy`: Gestione nomi duplicati nell'archivio (default: suffix)
//! - `output_path`: Directory di output (default: None = directory corrente)
//! - `archive_name`: Nome del file ZIP (default: `webp_converted_<millis>.zip`)
//! - `json_output`: Output JSON per uso programmatico (default: false)
//! - `timeout_secs`: Timeout esterno sull'intera esecuzione (default: nessuno)
//!
//! ## Esempio:
//! ```rust,ignore
//! let config = Config {
//!     quality: 85,
//!     max_concurrency: 2,
//!     ..Default::default()
//! };
//! config.validate()?;
//! ```

use crate::archive::CollisionPolicy;
use crate::source::DEFAULT_MAX_DIMENSION;
use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

/// Configuration for image conversion
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// WebP quality (1-100)
    pub quality: u8,
    /// Larger side limit in pixels
    pub max_dimension: u32,
    /// Upper bound for concurrent transcodes in one wave
    pub max_concurrency: usize,
    /// Duplicate entry name handling
    pub collision_policy: CollisionPolicy,
    /// Output directory (None = current directory)
    pub output_path: Option<PathBuf>,
    /// Archive file name
    pub archive_name: Option<String>,
    /// Output progress and status as JSON for programmatic use
    pub json_output: bool,
    /// Caller-side timeout for a whole run
    pub timeout_secs: Option<u64>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            quality: 75,
            max_dimension: DEFAULT_MAX_DIMENSION,
            max_concurrency: 4,
            collision_policy: CollisionPolicy::Suffix,
            output_path: None,
            archive_name: None,
            json_output: false,
            timeout_secs: None,
        }
    }
}

impl Config {
    /// Validate configuration parameters
    pub fn validate(&self) -> Result<()> {
        if self.quality == 0 || self.quality > 100 {
            return Err(anyhow::anyhow!("Quality must be between 1 and 100"));
        }

        if self.max_dimension == 0 {
            return Err(anyhow::anyhow!("Max dimension must be greater than 0"));
        }

        if self.max_concurrency == 0 {
            return Err(anyhow::anyhow!("Concurrency must be greater than 0"));
        }

        if let Some(ref name) = self.archive_name {
            if name.trim().is_empty() || name.contains('/') || name.contains('\\') {
                return Err(anyhow::anyhow!("Invalid archive name: {:?}", name));
            }
        }

        if self.timeout_secs == Some(0) {
            return Err(anyhow::anyhow!("Timeout must be greater than 0 seconds"));
        }

        // Validate output path if specified
        if let Some(ref output_path) = self.output_path {
            if output_path.exists() && !output_path.is_dir() {
                return Err(anyhow::anyhow!("Output path is not a directory: {}", output_path.display()));
            }
        }

        Ok(())
    }

    /// Archive file name, generated from the clock when not configured
    pub fn resolved_archive_name(&self) -> String {
        match self.archive_name {
            Some(ref name) if name.ends_with(".zip") => name.clone(),
            Some(ref name) => format!("{}.zip", name),
            None => {
                let millis = SystemTime::now()
                    .duration_since(UNIX_EPOCH)
                    .unwrap_or_default()
                    .as_millis();
                format!("webp_converted_{}.zip", millis)
            }
        }
    }

    /// `<config_dir>/webp-batch/config.json`
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("webp-batch").join("config.json"))
    }

    /// Load configuration from file
    pub async fn from_file(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let content = tokio::fs::read_to_string(path).await?;
        let config: Config = serde_json::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Save configuration to file
    pub async fn save_to_file(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let content = serde_json::to_string_pretty(self)?;
        tokio::fs::write(path, content).await?;
        Ok(())
    }
}
