//! # Transcoder Module
//!
//! Questo modulo converte una singola immagine sorgente nel formato target.
//!
//! ## Pipeline per singola immagine:
//! 1. **Decode**: byte sorgente → buffer RGBA (errore → risultato fallito, mai panic)
//! 2. **Flatten**: la trasparenza viene composta su bianco opaco
//! 3. **Resize**: se un lato supera `max_dimension` (default 3000) si riduce
//!    preservando l'aspect ratio, con un solo passaggio di resample
//! 4. **Encode**: codifica alla qualità richiesta
//! 5. **Size-guard**: se l'output è più grande dell'originale e la qualità è > 50,
//!    si ricodifica UNA sola volta a `max(qualità × 0.8, 40)`
//! 6. **Naming**: si toglie l'estensione sorgente e si aggiunge quella del codec
//!
//! ## Error handling:
//! - Decode ed encode falliti diventano `success: false` con messaggio descrittivo
//! - Il batch non viene mai interrotto da un singolo item
//!
//! ## Concorrenza:
//! Il lavoro CPU-bound gira su `tokio::task::spawn_blocking`; i buffer di decode e
//! resize appartengono solo all'invocazione che li crea e vengono rilasciati al
//! ritorno, anche sul percorso di errore.

use crate::codec::{flatten_onto_white, ImageCodec, WebpCodec};
use crate::error::ConvertError;
use crate::source::{SourceImage, TranscodeRequest, DEFAULT_MAX_DIMENSION};
use image::RgbaImage;
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Size-guard fires only above this quality
pub const RETRY_QUALITY_THRESHOLD: u8 = 50;
/// Retry quality multiplier
pub const RETRY_QUALITY_FACTOR: f32 = 0.8;
/// Retry quality never drops below this
pub const RETRY_QUALITY_FLOOR: f32 = 40.0;

/// Outcome of transcoding one source
#[derive(Debug, Clone, Serialize)]
pub struct TranscodeResult {
    pub output_name: String,
    #[serde(skip)]
    pub output_bytes: Vec<u8>,
    pub success: bool,
    pub original_size: u64,
    pub compressed_size: u64,
    pub error_message: Option<String>,
    /// Quality of the encoding that was kept
    pub quality_used: Option<f32>,
    /// Whether the size-guard retry fired
    pub retried: bool,
    pub dimensions: Option<(u32, u32)>,
}

impl TranscodeResult {
    pub fn failed(output_name: String, original_size: u64, error: &ConvertError) -> Self {
        Self {
            output_name,
            output_bytes: Vec::new(),
            success: false,
            original_size,
            compressed_size: 0,
            error_message: Some(error.to_string()),
            quality_used: None,
            retried: false,
            dimensions: None,
        }
    }

    /// Per-item savings, same rounding as the batch statistics
    pub fn savings_percent(&self) -> i64 {
        if !self.success {
            return 0;
        }
        crate::progress::savings_percent(self.original_size, self.compressed_size)
    }
}

/// Single-image transcoder with size-guard fallback
#[derive(Clone)]
pub struct Transcoder {
    codec: Arc<dyn ImageCodec>,
    max_dimension: u32,
}

impl Transcoder {
    pub fn new(codec: Arc<dyn ImageCodec>) -> Self {
        Self {
            codec,
            max_dimension: DEFAULT_MAX_DIMENSION,
        }
    }

    pub fn with_max_dimension(mut self, max_dimension: u32) -> Self {
        self.max_dimension = max_dimension;
        self
    }

    pub fn max_dimension(&self) -> u32 {
        self.max_dimension
    }

    pub fn codec(&self) -> &Arc<dyn ImageCodec> {
        &self.codec
    }

    /// Build a request bound to this transcoder's dimension limit
    pub fn request(&self, source: &SourceImage, quality: u8) -> TranscodeRequest {
        TranscodeRequest::new(source.clone(), quality).with_max_dimension(self.max_dimension)
    }

    /// Transcode on the blocking pool. Never returns an error: failures,
    /// including a panicking codec, are folded into the result.
    pub async fn transcode(&self, source: &SourceImage, quality: u8) -> TranscodeResult {
        let request = self.request(source, quality);
        let output_name = output_name(source.name(), self.codec.extension());
        let original_size = source.len();
        let codec = Arc::clone(&self.codec);

        match tokio::task::spawn_blocking(move || transcode_request(codec.as_ref(), &request)).await {
            Ok(result) => result,
            Err(e) => {
                let err = ConvertError::Task(e.to_string());
                warn!("Transcode task for {} failed: {}", source.name(), err);
                TranscodeResult::failed(output_name, original_size, &err)
            }
        }
    }
}

impl Default for Transcoder {
    fn default() -> Self {
        Self::new(Arc::new(WebpCodec::new()))
    }
}

/// Run the whole pipeline for one request
pub fn transcode_request(codec: &dyn ImageCodec, request: &TranscodeRequest) -> TranscodeResult {
    let source = &request.source;
    let name = output_name(source.name(), codec.extension());

    match encode_with_guard(codec, request) {
        Ok(encoded) => {
            let compressed_size = encoded.bytes.len() as u64;
            info!(
                "Converted {} -> {} ({} -> {} bytes, q={})",
                source.name(),
                name,
                source.len(),
                compressed_size,
                encoded.quality
            );
            TranscodeResult {
                output_name: name,
                output_bytes: encoded.bytes,
                success: true,
                original_size: source.len(),
                compressed_size,
                error_message: None,
                quality_used: Some(encoded.quality),
                retried: encoded.retried,
                dimensions: Some(encoded.dimensions),
            }
        }
        Err(e) => {
            warn!("Failed to convert {}: {}", source.name(), e);
            TranscodeResult::failed(name, source.len(), &e)
        }
    }
}

struct Encoded {
    bytes: Vec<u8>,
    quality: f32,
    retried: bool,
    dimensions: (u32, u32),
}

fn encode_with_guard(codec: &dyn ImageCodec, request: &TranscodeRequest) -> Result<Encoded, ConvertError> {
    let source = &request.source;
    let pixels = prepare_pixels(codec, source, request.max_dimension)?;
    let dimensions = pixels.dimensions();

    let quality = request.quality as f32;
    let first = codec.encode(&pixels, quality)?;
    if first.is_empty() {
        return Err(ConvertError::Encode(format!(
            "codec produced no output for {}",
            source.name()
        )));
    }

    if (first.len() as u64) > source.len() && request.quality > RETRY_QUALITY_THRESHOLD {
        let lower = retry_quality(request.quality);
        debug!(
            "Output for {} is larger than source ({} > {} bytes), retrying at q={}",
            source.name(),
            first.len(),
            source.len(),
            lower
        );
        match codec.encode(&pixels, lower) {
            Ok(second) if !second.is_empty() => {
                return Ok(Encoded {
                    bytes: second,
                    quality: lower,
                    retried: true,
                    dimensions,
                });
            }
            Ok(_) => warn!("Retry for {} produced no output, keeping first encoding", source.name()),
            Err(e) => warn!("Retry for {} failed ({}), keeping first encoding", source.name(), e),
        }
    }

    Ok(Encoded {
        bytes: first,
        quality,
        retried: false,
        dimensions,
    })
}

/// Decode, flatten onto white and downscale if needed
fn prepare_pixels(codec: &dyn ImageCodec, source: &SourceImage, max_dimension: u32) -> Result<RgbaImage, ConvertError> {
    let mut pixels = codec.decode(source.bytes())?;
    let (width, height) = pixels.dimensions();
    debug!("Decoded {}: {}x{}", source.name(), width, height);

    flatten_onto_white(&mut pixels);

    if let Some((target_width, target_height)) = fit_within(width, height, max_dimension) {
        info!(
            "Downscaling {} from {}x{} to {}x{}",
            source.name(),
            width,
            height,
            target_width,
            target_height
        );
        pixels = codec.resize(&pixels, target_width, target_height);
    }

    Ok(pixels)
}

/// Target size when either side exceeds `max_dimension`, `None` otherwise
pub fn fit_within(width: u32, height: u32, max_dimension: u32) -> Option<(u32, u32)> {
    if width <= max_dimension && height <= max_dimension {
        return None;
    }
    let max = max_dimension as u64;
    if width > height {
        let scaled = (height as u64 * max / width as u64).max(1) as u32;
        Some((max_dimension, scaled))
    } else {
        let scaled = (width as u64 * max / height as u64).max(1) as u32;
        Some((scaled, max_dimension))
    }
}

/// Quality for the single size-guard retry
pub fn retry_quality(quality: u8) -> f32 {
    (quality as f32 * RETRY_QUALITY_FACTOR).max(RETRY_QUALITY_FLOOR)
}

/// Strip the source extension and append the target one
pub fn output_name(source_name: &str, extension: &str) -> String {
    let base = source_name
        .rsplit(|c: char| c == '/' || c == '\\')
        .next()
        .unwrap_or(source_name)
        .trim();

    let stem = match base.rsplit_once('.') {
        Some((stem, _)) if !stem.is_empty() => stem,
        _ => base,
    };
    let stem = if stem.is_empty() { "image" } else { stem };

    format!("{}.{}", stem, extension)
}
