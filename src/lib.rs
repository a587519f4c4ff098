//! # WebP Batch Converter Library
//!
//! Questo è il modulo principale della libreria che espone tutte le API pubbliche.
//!
//! ## Responsabilità:
//! - Definisce la struttura modulare dell'applicazione
//! - Espone i tipi e le funzioni principali tramite re-exports
//! - Fornisce un'interfaccia pulita per il main.rs e per altri consumatori
//!
//! ## Architettura dei moduli:
//! - `source`: Immagini sorgente, identità e richieste di conversione
//! - `codec`: Confine verso decode/resize/encode (WebP)
//! - `transcoder`: Pipeline per singola immagine con size-guard
//! - `scheduler`: Esecuzione a onde, orchestratore batch e progresso
//! - `archive`: Serializzazione ZIP dei risultati riusciti
//! - `progress`: Eventi di progresso, statistiche e progress bar
//! - `cache`: Memoizzazione dei risultati per (sorgente, qualità)
//! - `delivery`: Scrittura atomica dell'output su disco
//! - `file_manager`: Discovery e caricamento dei file
//! - `config`: Gestione configurazione e validazione parametri
//! - `error`: Tipi di errore custom
//! - `json_output`: Output JSON per uso programmatico
//!
//! ## Utilizzo:
//! ```rust,no_run
//! use webp_batch_converter::{transcode_batch, SourceImage};
//!
//! # async fn run(bytes: Vec<u8>) -> Result<(), Box<dyn std::error::Error>> {
//! let sources = vec![SourceImage::new("photo.png", bytes)];
//! let output = transcode_batch(&sources, 75, |p| println!("{}/{}", p.current_index, p.total_count)).await?;
//! println!("{}", output.statistics.format_summary());
//! # Ok(())
//! # }
//! ```

pub mod archive;
pub mod cache;
pub mod codec;
pub mod config;
pub mod delivery;
pub mod error;
pub mod file_manager;
pub mod json_output;
pub mod progress;
pub mod scheduler;
pub mod source;
pub mod transcoder;

pub use archive::{Archive, ArchiveEntry, ArchivePackager, CollisionPolicy};
pub use cache::ConversionCache;
pub use codec::{ImageCodec, WebpCodec};
pub use config::Config;
pub use delivery::Delivery;
pub use error::{BatchFailure, ConvertError};
pub use progress::{BatchProgress, CompressionStatistics};
pub use scheduler::batch_converter::{transcode_batch, transcode_one};
pub use scheduler::{BatchConverter, BatchOutput, BatchState, WaveScheduler};
pub use source::{SourceId, SourceImage, TranscodeRequest};
pub use transcoder::{TranscodeResult, Transcoder};
