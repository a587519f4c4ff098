//! # Progress Tracking and Statistics Module
//!
//! Questo modulo gestisce il progress tracking e le statistiche di compressione.
//!
//! ## Responsabilità:
//! - `BatchProgress`: evento transitorio (indice corrente, totale, nome item)
//! - `CompressionStatistics`: aggregazione pura dei `TranscodeResult`
//! - `ProgressManager`: progress bar visuale con `indicatif`
//!
//! ## Statistiche calcolate:
//! - **total_original_size**: somma delle dimensioni originali dei successi
//! - **total_compressed_size**: somma di `compressed_size` dei successi
//! - **savings_percent**: `round(100 × (1 − compressed / original))`, 0 se original = 0
//! - **success_count** / **total_count**
//!
//! L'aggregazione è idempotente: ricalcolarla sulla stessa lista di risultati
//! produce sempre gli stessi valori.
//!
//! ## Visual feedback:
//! ```text
//! ⠋ [00:00:04] [========================>---------------] 12/20 (60%) photo.jpg
//! ```

use crate::file_manager::FileManager;
use crate::transcoder::TranscodeResult;
use indicatif::{ProgressBar, ProgressStyle};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Item name reported once every wave has finished
pub const PACKAGING_LABEL: &str = "packaging";

/// Transient progress notification
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BatchProgress {
    pub current_index: usize,
    pub total_count: usize,
    pub current_item_name: String,
}

impl BatchProgress {
    pub fn new(current_index: usize, total_count: usize, current_item_name: impl Into<String>) -> Self {
        Self {
            current_index,
            total_count,
            current_item_name: current_item_name.into(),
        }
    }

    pub fn packaging(total_count: usize) -> Self {
        Self::new(total_count, total_count, PACKAGING_LABEL)
    }

    pub fn is_packaging(&self) -> bool {
        self.current_index == self.total_count && self.current_item_name == PACKAGING_LABEL
    }

    pub fn percentage(&self) -> f64 {
        if self.total_count > 0 {
            (self.current_index as f64 / self.total_count as f64) * 100.0
        } else {
            0.0
        }
    }
}

/// Aggregate compression statistics for one batch
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompressionStatistics {
    pub total_original_size: u64,
    pub total_compressed_size: u64,
    pub savings_percent: i64,
    pub success_count: usize,
    pub total_count: usize,
}

impl CompressionStatistics {
    /// Fold a result list into statistics
    pub fn from_results(results: &[TranscodeResult]) -> Self {
        let mut stats = Self {
            total_count: results.len(),
            ..Self::default()
        };

        for result in results.iter().filter(|r| r.success) {
            stats.success_count += 1;
            stats.total_original_size += result.original_size;
            stats.total_compressed_size += result.compressed_size;
        }

        stats.savings_percent = savings_percent(stats.total_original_size, stats.total_compressed_size);
        stats
    }

    pub fn failure_count(&self) -> usize {
        self.total_count - self.success_count
    }

    pub fn bytes_saved(&self) -> u64 {
        self.total_original_size.saturating_sub(self.total_compressed_size)
    }

    pub fn format_summary(&self) -> String {
        format!(
            "Converted: {}/{} | Failed: {} | {} -> {} | Saved: {} ({}%)",
            self.success_count,
            self.total_count,
            self.failure_count(),
            FileManager::format_size(self.total_original_size),
            FileManager::format_size(self.total_compressed_size),
            FileManager::format_size(self.bytes_saved()),
            self.savings_percent
        )
    }
}

/// `round(100 × (1 − compressed / original))`, 0 when nothing was measured.
///
/// Halves round towards positive infinity, so -12.5 becomes -12.
pub fn savings_percent(original: u64, compressed: u64) -> i64 {
    if original == 0 {
        return 0;
    }
    (100.0 * (1.0 - compressed as f64 / original as f64) + 0.5).floor() as i64
}

/// Terminal progress bar for a batch
#[derive(Clone)]
pub struct ProgressManager {
    bar: ProgressBar,
}

impl ProgressManager {
    /// Create a new progress manager
    pub fn new(total_files: u64) -> Self {
        let bar = ProgressBar::new(total_files);

        bar.set_style(
            ProgressStyle::default_bar()
                .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} ({percent}%) {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_bar())
                .progress_chars("=>-"),
        );

        bar.enable_steady_tick(Duration::from_millis(100));

        Self { bar }
    }

    /// Hidden bar, used when output is machine-readable
    pub fn hidden() -> Self {
        Self {
            bar: ProgressBar::hidden(),
        }
    }

    /// Move to an absolute position with a message
    pub fn update(&self, position: u64, message: &str) {
        self.bar.set_position(position);
        self.bar.set_message(message.to_string());
    }

    /// Set a custom message without moving
    pub fn set_message(&self, message: &str) {
        self.bar.set_message(message.to_string());
    }

    /// Finish with a final message
    pub fn finish(&self, message: &str) {
        self.bar.finish_with_message(message.to_string());
    }

    pub fn position(&self) -> u64 {
        self.bar.position()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ok(original: u64, compressed: u64) -> TranscodeResult {
        TranscodeResult {
            output_name: "x.webp".to_string(),
            output_bytes: vec![0; compressed as usize],
            success: true,
            original_size: original,
            compressed_size: compressed,
            error_message: None,
            quality_used: Some(75.0),
            retried: false,
            dimensions: Some((1, 1)),
        }
    }

    fn failed(original: u64) -> TranscodeResult {
        TranscodeResult::failed(
            "y.webp".to_string(),
            original,
            &crate::error::ConvertError::Decode("bad".to_string()),
        )
    }

    #[test]
    fn test_statistics_only_count_successes() {
        let results = vec![ok(1000, 250), failed(5000), ok(1000, 350)];
        let stats = CompressionStatistics::from_results(&results);

        assert_eq!(stats.total_count, 3);
        assert_eq!(stats.success_count, 2);
        assert_eq!(stats.failure_count(), 1);
        assert_eq!(stats.total_original_size, 2000);
        assert_eq!(stats.total_compressed_size, 600);
        assert_eq!(stats.savings_percent, 70);
        assert_eq!(stats.bytes_saved(), 1400);
    }

    #[test]
    fn test_statistics_are_idempotent() {
        let results = vec![ok(300, 100), failed(10), ok(700, 650)];
        let first = CompressionStatistics::from_results(&results);
        let second = CompressionStatistics::from_results(&results);
        assert_eq!(first, second);
    }

    #[test]
    fn test_savings_percent_edges() {
        assert_eq!(savings_percent(0, 0), 0);
        assert_eq!(savings_percent(0, 10), 0);
        assert_eq!(savings_percent(100, 100), 0);
        assert_eq!(savings_percent(100, 150), -50);
        assert_eq!(savings_percent(3, 2), 33);
        assert_eq!(savings_percent(1000, 1), 100);
    }

    #[test]
    fn test_savings_percent_half_rounds_up() {
        assert_eq!(savings_percent(8, 9), -12);
        assert_eq!(savings_percent(8, 7), 13);
        assert_eq!(savings_percent(200, 1), 100);
    }

    #[test]
    fn test_empty_results() {
        let stats = CompressionStatistics::from_results(&[]);
        assert_eq!(stats, CompressionStatistics::default());
        assert!(stats.format_summary().contains("0/0"));
    }

    #[test]
    fn test_packaging_progress() {
        let progress = BatchProgress::packaging(5);
        assert!(progress.is_packaging());
        assert_eq!(progress.percentage(), 100.0);
        assert!(!BatchProgress::new(2, 5, "a.png").is_packaging());
    }

    #[test]
    fn test_hidden_progress_manager_tracks_position() {
        let manager = ProgressManager::hidden();
        manager.update(3, "c.png");
        assert_eq!(manager.position(), 3);
    }
}
