//! # Batch Converter Orchestrator
//!
//! Orchestratore che coordina scheduler, packager e statistiche per un batch.
//!
//! ## Flusso di esecuzione:
//! 1. **Validazione**: lista vuota o qualità fuori range → `BatchFailure` immediato
//! 2. **Scheduling**: `WaveScheduler` esegue le onde e notifica il progresso
//! 3. **Packaging**: i successi vengono serializzati in un archivio ZIP
//! 4. **Statistiche**: `CompressionStatistics` calcolate dai risultati
//!
//! ## Macchina a stati:
//! `Idle → Running(onda 1..k) → Packaging → Done | Cancelled | Failed`
//!
//! `Failed` si raggiunge solo per errori di infrastruttura (serializzazione
//! archivio, input invalido): i fallimenti dei singoli item restano dentro
//! `Running`/`Packaging` come risultati `success: false`.

use crate::archive::{Archive, ArchivePackager};
use crate::cache::ConversionCache;
use crate::codec::{ImageCodec, WebpCodec};
use crate::config::Config;
use crate::error::{BatchFailure, ConvertError};
use crate::progress::{BatchProgress, CompressionStatistics};
use crate::scheduler::wave_scheduler::WaveScheduler;
use crate::source::SourceImage;
use crate::transcoder::{TranscodeResult, Transcoder};
use anyhow::Result;
use serde::Serialize;
use std::io::{Cursor, Seek, Write};
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{debug, error, info, warn};

/// Lifecycle of one batch invocation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum BatchState {
    Idle,
    Running { wave: usize, waves: usize },
    Packaging,
    Done,
    Cancelled,
    Failed,
}

impl BatchState {
    pub fn can_transition_to(&self, next: &BatchState) -> bool {
        use BatchState::*;
        match (self, next) {
            (Idle, Running { wave: 1, .. }) => true,
            // A batch stopped before its first wave still packages (empty archive)
            (Idle, Packaging) | (Idle, Failed) => true,
            (Running { wave, .. }, Running { wave: next_wave, .. }) => *next_wave == wave + 1,
            (Running { .. }, Packaging) | (Running { .. }, Failed) => true,
            (Packaging, Done) | (Packaging, Cancelled) | (Packaging, Failed) => true,
            _ => false,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, BatchState::Done | BatchState::Cancelled | BatchState::Failed)
    }
}

/// Records the transitions of one batch, rejecting illegal ones
#[derive(Debug, Clone)]
pub struct BatchStateMachine {
    history: Vec<BatchState>,
}

impl BatchStateMachine {
    pub fn new() -> Self {
        Self {
            history: vec![BatchState::Idle],
        }
    }

    pub fn state(&self) -> BatchState {
        self.history.last().copied().unwrap_or(BatchState::Idle)
    }

    /// Returns false (and stays put) on an illegal transition
    pub fn advance(&mut self, next: BatchState) -> bool {
        let current = self.state();
        if !current.can_transition_to(&next) {
            error!("Illegal batch transition {:?} -> {:?}", current, next);
            return false;
        }
        debug!("Batch state {:?} -> {:?}", current, next);
        self.history.push(next);
        true
    }

    pub fn history(&self) -> &[BatchState] {
        &self.history
    }
}

impl Default for BatchStateMachine {
    fn default() -> Self {
        Self::new()
    }
}

/// Everything a successful batch hands back to the caller
#[derive(Debug)]
pub struct BatchOutput<W = Vec<u8>> {
    pub archive: Archive<W>,
    pub results: Vec<TranscodeResult>,
    pub statistics: CompressionStatistics,
    pub cancelled: bool,
    pub states: Vec<BatchState>,
}

impl<W> BatchOutput<W> {
    pub fn final_state(&self) -> BatchState {
        self.states.last().copied().unwrap_or(BatchState::Idle)
    }

    pub fn failures(&self) -> impl Iterator<Item = &TranscodeResult> {
        self.results.iter().filter(|r| !r.success)
    }
}

/// Batch orchestrator
pub struct BatchConverter {
    config: Config,
    scheduler: WaveScheduler,
    packager: ArchivePackager,
}

impl BatchConverter {
    /// Create a converter with the default WebP codec
    pub fn new(config: Config) -> Result<Self> {
        Self::with_codec(config, Arc::new(WebpCodec::new()))
    }

    pub fn with_codec(config: Config, codec: Arc<dyn ImageCodec>) -> Result<Self> {
        config.validate()?;
        let transcoder = Transcoder::new(codec).with_max_dimension(config.max_dimension);
        let scheduler = WaveScheduler::new(transcoder, config.max_concurrency);
        let packager = ArchivePackager::new(config.collision_policy);

        info!(
            "Batch converter ready: wave width {}, max dimension {}, collisions {:?}",
            scheduler.width(),
            config.max_dimension,
            config.collision_policy
        );

        Ok(Self {
            config,
            scheduler,
            packager,
        })
    }

    /// Stop signal checked at the start of every wave
    pub fn with_cancellation(mut self, stop_receiver: broadcast::Receiver<()>) -> Self {
        self.scheduler = self.scheduler.with_cancellation(stop_receiver);
        self
    }

    /// Exact wave width, bypassing hardware detection
    pub fn with_wave_width(mut self, width: usize) -> Self {
        self.scheduler = self.scheduler.with_width(width);
        self
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn wave_width(&self) -> usize {
        self.scheduler.width()
    }

    /// Convert one image
    pub async fn transcode_one(&self, source: &SourceImage, quality: u8) -> Result<TranscodeResult, ConvertError> {
        validate_quality(quality)?;
        Ok(self.scheduler.transcoder().transcode(source, quality).await)
    }

    /// Convert one image at the cache's quality, reusing a memoized result
    pub async fn transcode_one_cached(
        &self,
        cache: &mut ConversionCache,
        source: &SourceImage,
    ) -> Result<TranscodeResult, ConvertError> {
        let quality = cache.quality();
        if let Some(hit) = cache.get(source.id(), quality) {
            debug!("Cache hit for {} at q={}", source.name(), quality);
            return Ok(hit.clone());
        }

        let result = self.transcode_one(source, quality).await?;
        cache.insert(source.id().clone(), quality, result.clone());
        Ok(result)
    }

    /// Convert many images and bundle the successes into one in-memory archive
    pub async fn transcode_batch<F>(
        &mut self,
        sources: &[SourceImage],
        quality: u8,
        on_progress: F,
    ) -> Result<BatchOutput, BatchFailure>
    where
        F: FnMut(&BatchProgress),
    {
        let output = self
            .transcode_batch_into(sources, quality, on_progress, Cursor::new(Vec::new()))
            .await?;

        Ok(BatchOutput {
            archive: output.archive.map_sink(Cursor::into_inner),
            results: output.results,
            statistics: output.statistics,
            cancelled: output.cancelled,
            states: output.states,
        })
    }

    /// Like `transcode_batch`, writing the archive into `sink`
    pub async fn transcode_batch_into<F, W>(
        &mut self,
        sources: &[SourceImage],
        quality: u8,
        on_progress: F,
        sink: W,
    ) -> Result<BatchOutput<W>, BatchFailure>
    where
        F: FnMut(&BatchProgress),
        W: Write + Seek,
    {
        let mut machine = BatchStateMachine::new();

        if sources.is_empty() {
            return Err(BatchFailure::rejected(ConvertError::InvalidInput(
                "no source images provided".to_string(),
            )));
        }
        validate_quality(quality).map_err(BatchFailure::rejected)?;

        info!("Starting batch of {} images at quality {}", sources.len(), quality);

        let outcome = self
            .scheduler
            .run_with(sources, quality, on_progress, |wave, waves| {
                machine.advance(BatchState::Running { wave, waves });
            })
            .await;

        machine.advance(BatchState::Packaging);
        let mut results = outcome.results;
        let statistics = CompressionStatistics::from_results(&results);

        let archive = match self.packager.pack_into(sink, &results) {
            Ok(archive) => archive,
            Err(e) => {
                error!("Archive serialization failed: {}", e);
                machine.advance(BatchState::Failed);
                return Err(BatchFailure {
                    error: e,
                    results,
                    statistics,
                    states: machine.history().to_vec(),
                });
            }
        };

        for entry in archive.entries() {
            if let Some(result) = results.get_mut(entry.result_index) {
                result.output_name = entry.name.clone();
            }
        }

        if outcome.cancelled {
            warn!(
                "Batch cancelled after {} waves: {}",
                outcome.waves_completed,
                statistics.format_summary()
            );
            machine.advance(BatchState::Cancelled);
        } else {
            info!("Batch complete: {}", statistics.format_summary());
            machine.advance(BatchState::Done);
        }

        Ok(BatchOutput {
            archive,
            results,
            statistics,
            cancelled: outcome.cancelled,
            states: machine.history().to_vec(),
        })
    }
}

fn validate_quality(quality: u8) -> Result<(), ConvertError> {
    if quality == 0 || quality > 100 {
        return Err(ConvertError::InvalidInput(format!(
            "quality must be between 1 and 100, got {}",
            quality
        )));
    }
    Ok(())
}

/// Convert one image with the default configuration
pub async fn transcode_one(source: &SourceImage, quality: u8) -> Result<TranscodeResult, ConvertError> {
    validate_quality(quality)?;
    Ok(Transcoder::default().transcode(source, quality).await)
}

/// Convert a batch with the default configuration
pub async fn transcode_batch<F>(
    sources: &[SourceImage],
    quality: u8,
    on_progress: F,
) -> Result<BatchOutput, BatchFailure>
where
    F: FnMut(&BatchProgress),
{
    let mut converter = BatchConverter::new(Config::default())
        .map_err(|e| BatchFailure::rejected(ConvertError::InvalidInput(e.to_string())))?;
    converter.transcode_batch(sources, quality, on_progress).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgba, RgbaImage};

    struct FlatCodec;

    impl ImageCodec for FlatCodec {
        fn decode(&self, _bytes: &[u8]) -> Result<RgbaImage, ConvertError> {
            Ok(RgbaImage::from_pixel(4, 4, Rgba([10, 10, 10, 255])))
        }

        fn resize(&self, pixels: &RgbaImage, _width: u32, _height: u32) -> RgbaImage {
            pixels.clone()
        }

        fn encode(&self, _pixels: &RgbaImage, _quality: f32) -> Result<Vec<u8>, ConvertError> {
            Ok(vec![3u8; 5])
        }

        fn extension(&self) -> &'static str {
            "webp"
        }
    }

    /// Archive destination that fails on the first write
    #[derive(Debug)]
    struct FullDisk;

    impl Write for FullDisk {
        fn write(&mut self, _buf: &[u8]) -> std::io::Result<usize> {
            Err(std::io::Error::new(std::io::ErrorKind::Other, "no space left on device"))
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    impl Seek for FullDisk {
        fn seek(&mut self, _pos: std::io::SeekFrom) -> std::io::Result<u64> {
            Ok(0)
        }
    }

    #[test]
    fn test_state_transitions() {
        use BatchState::*;
        assert!(Idle.can_transition_to(&Running { wave: 1, waves: 2 }));
        assert!(!Idle.can_transition_to(&Running { wave: 2, waves: 2 }));
        assert!(Running { wave: 1, waves: 2 }.can_transition_to(&Running { wave: 2, waves: 2 }));
        assert!(!Running { wave: 2, waves: 2 }.can_transition_to(&Running { wave: 1, waves: 2 }));
        assert!(Running { wave: 2, waves: 2 }.can_transition_to(&Packaging));
        assert!(Packaging.can_transition_to(&Done));
        assert!(!Done.can_transition_to(&Packaging));
        assert!(!Idle.can_transition_to(&Done));
        assert!(Cancelled.is_terminal());
    }

    #[test]
    fn test_machine_rejects_illegal_transition() {
        let mut machine = BatchStateMachine::new();
        assert!(!machine.advance(BatchState::Done));
        assert_eq!(machine.state(), BatchState::Idle);
        assert!(machine.advance(BatchState::Running { wave: 1, waves: 1 }));
        assert!(machine.advance(BatchState::Packaging));
        assert!(machine.advance(BatchState::Done));
        assert_eq!(machine.history().len(), 4);
    }

    #[tokio::test]
    async fn test_empty_batch_is_rejected() {
        let mut converter = BatchConverter::new(Config::default()).unwrap();
        let failure = converter.transcode_batch(&[], 75, |_| {}).await.unwrap_err();

        assert!(matches!(failure.error, ConvertError::InvalidInput(_)));
        assert!(failure.results.is_empty());
        assert_eq!(failure.states, vec![BatchState::Idle, BatchState::Failed]);
    }

    #[tokio::test]
    async fn test_archive_failure_keeps_results() {
        let mut converter = BatchConverter::with_codec(Config::default(), Arc::new(FlatCodec))
            .unwrap()
            .with_wave_width(2);
        let sources: Vec<SourceImage> = (0..3)
            .map(|i| SourceImage::new(format!("s{}.png", i), vec![1u8; 20]))
            .collect();

        let failure = converter
            .transcode_batch_into(&sources, 75, |_| {}, FullDisk)
            .await
            .unwrap_err();

        assert!(matches!(failure.error, ConvertError::Archive(_)));
        assert_eq!(failure.results.len(), sources.len());
        assert!(failure.results.iter().all(|r| r.success));
        assert_eq!(failure.statistics.success_count, 3);
        assert_eq!(failure.statistics.total_compressed_size, 15);
        assert_eq!(failure.statistics, CompressionStatistics::from_results(&failure.results));
        assert_eq!(
            failure.states,
            vec![
                BatchState::Idle,
                BatchState::Running { wave: 1, waves: 2 },
                BatchState::Running { wave: 2, waves: 2 },
                BatchState::Packaging,
                BatchState::Failed,
            ]
        );
    }

    #[tokio::test]
    async fn test_quality_out_of_range_is_rejected() {
        let mut converter = BatchConverter::new(Config::default()).unwrap();
        let sources = vec![SourceImage::new("a.png", vec![1u8])];

        let mut progress_calls = 0;
        let failure = converter
            .transcode_batch(&sources, 0, |_| progress_calls += 1)
            .await
            .unwrap_err();
        assert!(matches!(failure.error, ConvertError::InvalidInput(_)));
        assert_eq!(progress_calls, 0);

        assert!(converter.transcode_one(&sources[0], 101).await.is_err());
        assert!(transcode_one(&sources[0], 0).await.is_err());
    }

    #[test]
    fn test_invalid_config_is_rejected() {
        let config = Config {
            quality: 0,
            ..Default::default()
        };
        assert!(BatchConverter::new(config).is_err());
    }
}
