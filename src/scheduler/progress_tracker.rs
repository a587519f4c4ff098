//! # Progress Tracking Module
//!
//! Riceve gli eventi `BatchProgress` dallo scheduler e li inoltra così come sono
//! alla progress bar oppure allo stream JSON.

use crate::json_output::JsonMessage;
use crate::progress::{BatchProgress, CompressionStatistics, ProgressManager};
use crate::transcoder::TranscodeResult;
use tracing::{info, warn};

/// Relays scheduler progress to the terminal or to JSON lines
pub struct ProgressTracker {
    pub total_files: usize,
    json_output: bool,
    progress_manager: ProgressManager,
    last: Option<BatchProgress>,
}

impl ProgressTracker {
    pub fn new(total_files: usize, json_output: bool) -> Self {
        let progress_manager = if json_output {
            ProgressManager::hidden()
        } else {
            ProgressManager::new(total_files as u64)
        };
        Self {
            total_files,
            json_output,
            progress_manager,
            last: None,
        }
    }

    /// Tracker that draws nothing
    pub fn hidden(total_files: usize) -> Self {
        Self {
            total_files,
            json_output: false,
            progress_manager: ProgressManager::hidden(),
            last: None,
        }
    }

    /// Progress callback handed to the scheduler
    pub fn report(&mut self, progress: &BatchProgress) {
        if self.json_output {
            JsonMessage::progress(progress).emit();
        } else if progress.is_packaging() {
            self.progress_manager
                .update(progress.current_index as u64, "building archive...");
        } else {
            self.progress_manager
                .update(progress.current_index as u64, &progress.current_item_name);
        }
        self.last = Some(progress.clone());
    }

    pub fn last(&self) -> Option<&BatchProgress> {
        self.last.as_ref()
    }

    /// Report per-file outcomes once the batch is done
    pub fn report_results(&self, source_names: &[String], results: &[TranscodeResult]) {
        for (source, result) in source_names.iter().zip(results) {
            if self.json_output {
                JsonMessage::file_complete(source, result).emit();
            } else if result.success {
                info!(
                    "[OK] {} -> {}: {}% saved",
                    source,
                    result.output_name,
                    result.savings_percent()
                );
            } else {
                warn!(
                    "[ERROR] {}: {}",
                    source,
                    result.error_message.as_deref().unwrap_or("unknown error")
                );
            }
        }
    }

    /// Finalize progress bar
    pub fn finish(&self, statistics: &CompressionStatistics) {
        self.progress_manager.finish(&statistics.format_summary());
    }

    pub fn position(&self) -> u64 {
        self.progress_manager.position()
    }
}
