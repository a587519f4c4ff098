//! # File Management Module
//!
//! Questo modulo gestisce la discovery delle immagini e il caricamento delle sorgenti.
//!
//! ## Responsabilità:
//! - Discovery ricorsiva di immagini in directory (ordine deterministico)
//! - Espansione degli input CLI (file e directory mescolati)
//! - Caricamento asincrono dei byte in `SourceImage` con MIME hint
//! - Formattazione human-readable delle dimensioni
//!
//! ## Formati supportati in input:
//! JPG, JPEG, PNG, WebP, GIF, BMP, TIFF

use crate::source::SourceImage;
use anyhow::Result;
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::debug;
use walkdir::WalkDir;

/// Manages file operations and discovery
pub struct FileManager;

impl FileManager {
    /// Find all supported images in a directory, sorted by path
    pub fn find_image_files(dir: &Path) -> Result<Vec<PathBuf>> {
        let mut files = Vec::new();

        for entry in WalkDir::new(dir)
            .sort_by_file_name()
            .into_iter()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_type().is_file())
        {
            let path = entry.path();
            if Self::is_supported_image(path) {
                files.push(path.to_path_buf());
            }
        }

        Ok(files)
    }

    /// Expand CLI inputs: directories are walked, files are kept in order
    pub fn collect_inputs(inputs: &[PathBuf]) -> Result<Vec<PathBuf>> {
        let mut files = Vec::new();
        for input in inputs {
            if input.is_dir() {
                let found = Self::find_image_files(input)?;
                debug!("Found {} images in {}", found.len(), input.display());
                files.extend(found);
            } else if input.is_file() {
                files.push(input.clone());
            } else {
                return Err(anyhow::anyhow!("Input does not exist: {}", input.display()));
            }
        }
        Ok(files)
    }

    /// Check if a file is a supported image
    pub fn is_supported_image(path: &Path) -> bool {
        Self::mime_for(path).is_some()
    }

    /// MIME type from the file extension
    pub fn mime_for(path: &Path) -> Option<&'static str> {
        let ext = path.extension()?.to_string_lossy().to_lowercase();
        match ext.as_str() {
            "jpg" | "jpeg" => Some("image/jpeg"),
            "png" => Some("image/png"),
            "webp" => Some("image/webp"),
            "gif" => Some("image/gif"),
            "bmp" => Some("image/bmp"),
            "tif" | "tiff" => Some("image/tiff"),
            _ => None,
        }
    }

    /// Read a file into a source image named after its file name
    pub async fn load_source(path: &Path) -> Result<SourceImage> {
        let bytes = fs::read(path).await?;
        let name = path
            .file_name()
            .ok_or_else(|| anyhow::anyhow!("Invalid file name: {}", path.display()))?
            .to_string_lossy()
            .to_string();

        let source = SourceImage::new(name, bytes);
        Ok(match Self::mime_for(path) {
            Some(mime) => source.with_mime_hint(mime),
            None => source,
        })
    }

    /// Get human-readable file size
    pub fn format_size(size: u64) -> String {
        const UNITS: &[&str] = &["B", "KB", "MB", "GB", "TB"];
        let mut size = size as f64;
        let mut unit_index = 0;

        while size >= 1024.0 && unit_index < UNITS.len() - 1 {
            size /= 1024.0;
            unit_index += 1;
        }

        if unit_index == 0 {
            format!("{} {}", size as u64, UNITS[unit_index])
        } else {
            format!("{:.2} {}", size, UNITS[unit_index])
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_format_size() {
        assert_eq!(FileManager::format_size(512), "512 B");
        assert_eq!(FileManager::format_size(2048), "2.00 KB");
        assert_eq!(FileManager::format_size(5 * 1024 * 1024), "5.00 MB");
    }

    #[test]
    fn test_supported_images() {
        assert!(FileManager::is_supported_image(Path::new("a.JPG")));
        assert!(FileManager::is_supported_image(Path::new("b.tiff")));
        assert!(!FileManager::is_supported_image(Path::new("c.mp4")));
        assert!(!FileManager::is_supported_image(Path::new("noext")));
        assert_eq!(FileManager::mime_for(Path::new("x.png")), Some("image/png"));
    }

    #[test]
    fn test_find_and_collect() {
        let temp_dir = TempDir::new().unwrap();
        let nested = temp_dir.path().join("nested");
        std::fs::create_dir_all(&nested).unwrap();
        std::fs::write(temp_dir.path().join("b.png"), b"b").unwrap();
        std::fs::write(temp_dir.path().join("a.jpg"), b"a").unwrap();
        std::fs::write(temp_dir.path().join("notes.txt"), b"n").unwrap();
        std::fs::write(nested.join("c.webp"), b"c").unwrap();

        let found = FileManager::find_image_files(temp_dir.path()).unwrap();
        let names: Vec<String> = found
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().to_string())
            .collect();
        assert_eq!(names, vec!["a.jpg", "b.png", "c.webp"]);

        let single = temp_dir.path().join("notes.txt");
        let collected = FileManager::collect_inputs(&[single.clone(), nested.clone()]).unwrap();
        assert_eq!(collected, vec![single, nested.join("c.webp")]);

        assert!(FileManager::collect_inputs(&[temp_dir.path().join("missing.png")]).is_err());
    }

    #[tokio::test]
    async fn test_load_source() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("photo.jpeg");
        tokio::fs::write(&path, vec![1u8, 2, 3]).await.unwrap();

        let source = FileManager::load_source(&path).await.unwrap();
        assert_eq!(source.name(), "photo.jpeg");
        assert_eq!(source.len(), 3);
        assert_eq!(source.mime_hint(), Some("image/jpeg"));
    }
}
