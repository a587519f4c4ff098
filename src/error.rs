//! # Error Types Module
//!
//! Questo modulo definisce tutti i tipi di errore custom della libreria.
//!
//! ## Responsabilità:
//! - Definisce `ConvertError` enum per categorizzare tutti gli errori possibili
//! - Definisce `BatchFailure` per i fallimenti a livello di batch
//! - Integra con `thiserror` per automatic error conversion
//!
//! ## Categorie di errori:
//! - `Io`: Errori di I/O (file non trovati, permessi, etc.)
//! - `Decode`: I byte sorgente non sono un'immagine decodificabile
//! - `Encode`: Il codec non ha prodotto byte in uscita
//! - `Archive`: Serializzazione dell'archivio ZIP fallita
//! - `InvalidInput`: Lista vuota o qualità fuori range (rifiutati prima dello scheduling)
//! - `Task`: Un task di conversione è andato in panic o è stato abortito
//! - `Cancelled`: L'item non è stato processato perché il batch è stato fermato
//!
//! ## Politica di propagazione:
//! - `Decode` / `Encode` / `Task` / `Cancelled` sono errori per singolo item: diventano un
//!   `TranscodeResult` fallito e il batch prosegue
//! - `Archive` / `InvalidInput` interrompono il batch e vengono restituiti come
//!   `BatchFailure`, che conserva comunque i risultati già calcolati
//!
//! ## Esempio:
//! ```rust,ignore
//! if !(1..=100).contains(&quality) {
//!     return Err(ConvertError::InvalidInput(format!("quality {} out of range", quality)));
//! }
//! ```

use crate::progress::CompressionStatistics;
use crate::scheduler::batch_converter::BatchState;
use crate::transcoder::TranscodeResult;

/// Custom error types for image transcoding
#[derive(thiserror::Error, Debug)]
pub enum ConvertError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Decode error: {0}")]
    Decode(String),

    #[error("Encode error: {0}")]
    Encode(String),

    #[error("Archive error: {0}")]
    Archive(#[from] zip::result::ZipError),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Transcode task failed: {0}")]
    Task(String),

    #[error("Cancelled before processing")]
    Cancelled,
}

impl From<image::ImageError> for ConvertError {
    fn from(err: image::ImageError) -> Self {
        ConvertError::Decode(err.to_string())
    }
}

/// Batch-level failure.
///
/// Carries the per-item results computed before the failure so callers can
/// still report which files converted and which did not.
#[derive(thiserror::Error, Debug)]
#[error("Batch conversion failed: {error}")]
pub struct BatchFailure {
    #[source]
    pub error: ConvertError,
    pub results: Vec<TranscodeResult>,
    pub statistics: CompressionStatistics,
    /// Transitions up to and including `Failed`
    pub states: Vec<BatchState>,
}

impl BatchFailure {
    /// Failure raised before any item was scheduled
    pub fn rejected(error: ConvertError) -> Self {
        Self {
            error,
            results: Vec::new(),
            statistics: CompressionStatistics::default(),
            states: vec![BatchState::Idle, BatchState::Failed],
        }
    }
}
