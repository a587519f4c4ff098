//! # JSON Output Module
//!
//! Questo modulo gestisce l'output strutturato in JSON per l'integrazione con
//! altri processi (UI esterne, script, layer HTTP).
//!
//! ## Tipi di messaggi:
//! - `start`: Inizio del batch
//! - `progress`: Evento `BatchProgress` inoltrato così com'è
//! - `file_complete`: Esito di un singolo file
//! - `complete`: Fine del batch con statistiche finali
//! - `error`: Errore a livello di batch
//!
//! Ogni messaggio è una riga JSON su stdout.

use crate::progress::{BatchProgress, CompressionStatistics};
use crate::transcoder::TranscodeResult;
use serde::Serialize;
use std::path::PathBuf;

/// Tipo di messaggio JSON
#[derive(Debug, Serialize)]
#[serde(tag = "type")]
pub enum JsonMessage {
    /// Inizio del batch
    #[serde(rename = "start")]
    Start {
        total_files: usize,
        quality: u8,
        wave_width: usize,
        max_dimension: u32,
    },

    /// Progresso corrente
    #[serde(rename = "progress")]
    Progress {
        current: usize,
        total: usize,
        percentage: f64,
        item: String,
    },

    /// Fine elaborazione di un file specifico
    #[serde(rename = "file_complete")]
    FileComplete {
        source: String,
        output_name: String,
        original_size: u64,
        compressed_size: u64,
        savings_percent: i64,
        quality_used: Option<f32>,
        success: bool,
        error: Option<String>,
    },

    /// Batch completato
    #[serde(rename = "complete")]
    Complete {
        statistics: CompressionStatistics,
        output: Option<PathBuf>,
        cancelled: bool,
        duration_seconds: f64,
    },

    /// Errore generale
    #[serde(rename = "error")]
    Error {
        message: String,
        details: Option<String>,
    },
}

impl JsonMessage {
    /// Serializza il messaggio in una riga
    pub fn to_line(&self) -> Option<String> {
        serde_json::to_string(self).ok()
    }

    /// Emette il messaggio JSON su stdout
    pub fn emit(&self) {
        if let Some(json) = self.to_line() {
            println!("{}", json);
        }
    }

    pub fn start(total_files: usize, quality: u8, wave_width: usize, max_dimension: u32) -> Self {
        Self::Start {
            total_files,
            quality,
            wave_width,
            max_dimension,
        }
    }

    pub fn progress(progress: &BatchProgress) -> Self {
        Self::Progress {
            current: progress.current_index,
            total: progress.total_count,
            percentage: progress.percentage(),
            item: progress.current_item_name.clone(),
        }
    }

    pub fn file_complete(source: &str, result: &TranscodeResult) -> Self {
        Self::FileComplete {
            source: source.to_string(),
            output_name: result.output_name.clone(),
            original_size: result.original_size,
            compressed_size: result.compressed_size,
            savings_percent: result.savings_percent(),
            quality_used: result.quality_used,
            success: result.success,
            error: result.error_message.clone(),
        }
    }

    pub fn complete(
        statistics: CompressionStatistics,
        output: Option<PathBuf>,
        cancelled: bool,
        duration_seconds: f64,
    ) -> Self {
        Self::Complete {
            statistics,
            output,
            cancelled,
            duration_seconds,
        }
    }

    pub fn error(message: String, details: Option<String>) -> Self {
        Self::Error { message, details }
    }
}
