//! # Delivery Module
//!
//! Consegna dei byte prodotti (archivio ZIP o singolo WebP) su disco.
//!
//! ## Responsabilità:
//! - Crea la directory di destinazione se manca
//! - Scrive prima in un file temporaneo nella stessa directory, poi lo rinomina
//!   sul nome finale: un errore a metà non lascia file parziali
//! - Il file temporaneo viene rimosso automaticamente se la consegna fallisce
//! - I file sorgente protetti non vengono mai sovrascritti: il nome riceve
//!   un suffisso `_2`, `_3`, ...

use anyhow::{Context, Result};
use std::io::Write;
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use tracing::{debug, info, warn};

/// Writes conversion output into a target directory
#[derive(Debug, Clone)]
pub struct Delivery {
    output_dir: PathBuf,
    /// Canonical paths that must never be replaced
    protected: Vec<PathBuf>,
}

impl Delivery {
    pub fn new(output_dir: impl Into<PathBuf>) -> Self {
        Self {
            output_dir: output_dir.into(),
            protected: Vec::new(),
        }
    }

    /// Never overwrite any of `paths`; a clashing save gets a suffixed name.
    ///
    /// Paths that do not exist are ignored.
    pub fn with_protected(mut self, paths: impl IntoIterator<Item = PathBuf>) -> Self {
        self.protected
            .extend(paths.into_iter().filter_map(|path| path.canonicalize().ok()));
        self
    }

    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    /// Save `bytes` as `suggested_name` inside the output directory.
    ///
    /// Only the final path component of `suggested_name` is used.
    pub async fn save(&self, bytes: Vec<u8>, suggested_name: &str) -> Result<PathBuf> {
        let output_dir = self.output_dir.clone();
        let protected = self.protected.clone();
        let file_name = sanitize_name(suggested_name)?;

        let target = tokio::task::spawn_blocking(move || {
            write_atomically(&output_dir, &file_name, &bytes, &protected)
        })
            .await
            .context("Delivery task failed")??;

        info!("Saved {}", target.display());
        Ok(target)
    }
}

fn sanitize_name(suggested_name: &str) -> Result<String> {
    Path::new(suggested_name)
        .file_name()
        .map(|name| name.to_string_lossy().to_string())
        .filter(|name| !name.trim().is_empty())
        .ok_or_else(|| anyhow::anyhow!("Invalid output name: {:?}", suggested_name))
}

/// First of `name`, `stem_2.ext`, `stem_3.ext`, ... that does not replace a protected file
fn unprotected_target(output_dir: &Path, file_name: &str, protected: &[PathBuf]) -> Result<PathBuf> {
    let target = output_dir.join(file_name);
    if protected.is_empty() {
        return Ok(target);
    }

    let canonical_dir = output_dir.canonicalize()?;
    if !protected.contains(&canonical_dir.join(file_name)) {
        return Ok(target);
    }

    let (stem, extension) = match file_name.rfind('.') {
        Some(dot) if dot > 0 => (&file_name[..dot], &file_name[dot..]),
        _ => (file_name, ""),
    };
    let mut n = 2;
    loop {
        let candidate = format!("{}_{}{}", stem, n, extension);
        if !protected.contains(&canonical_dir.join(&candidate)) && !output_dir.join(&candidate).exists() {
            warn!("{} is an input file, saving as {}", file_name, candidate);
            return Ok(output_dir.join(candidate));
        }
        n += 1;
    }
}

fn write_atomically(output_dir: &Path, file_name: &str, bytes: &[u8], protected: &[PathBuf]) -> Result<PathBuf> {
    std::fs::create_dir_all(output_dir)
        .with_context(|| format!("Cannot create output directory {}", output_dir.display()))?;

    let target = unprotected_target(output_dir, file_name, protected)?;
    let mut temp = NamedTempFile::new_in(output_dir)?;
    temp.write_all(bytes)?;
    temp.flush()?;
    debug!("Staged {} bytes in {}", bytes.len(), temp.path().display());

    temp.persist(&target)
        .map_err(|e| e.error)
        .with_context(|| format!("Cannot write {}", target.display()))?;
    Ok(target)
}
