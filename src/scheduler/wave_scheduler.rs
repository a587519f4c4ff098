//! # Wave Scheduler Module
//!
//! Esegue il transcoder su una lista di sorgenti a "onde" di ampiezza fissa.
//!
//! ## Strategia:
//! - `W = min(max_concurrency, core disponibili)` (default max 4)
//! - Le sorgenti vengono divise in onde consecutive di `W` elementi, in ordine
//! - Tutti gli item di un'onda partono insieme; l'onda successiva parte solo
//!   quando l'intera onda precedente è terminata (barriera)
//! - Prima di avviare ogni item viene notificato `on_progress(indice, nome)`
//! - Dopo l'ultima onda viene notificato `on_progress(totale, "packaging")`
//!
//! ## Garanzie:
//! - I risultati restano nell'ordine di invio, indipendentemente dall'ordine di completamento
//! - Il progresso è monotono tra onde; dentro un'onda gli item possono finire in qualsiasi ordine
//! - Nessuno stato condiviso viene toccato durante un'onda: i risultati vengono
//!   scritti solo dopo la barriera
//!
//! ## Cancellazione:
//! Il segnale di stop (broadcast) viene controllato all'inizio di ogni onda. Gli item
//! non avviati vengono riportati come falliti con `ConvertError::Cancelled`.
//! `relay_interrupts` trasforma il primo interrupt in stop e riporta il secondo
//! al chiamante, che può terminare subito.

use crate::error::ConvertError;
use crate::progress::BatchProgress;
use crate::source::SourceImage;
use crate::transcoder::{output_name, TranscodeResult, Transcoder};
use futures::future::join_all;
use std::future::Future;
use std::ops::Range;
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

/// Results of one scheduler run, in submission order
#[derive(Debug)]
pub struct ScheduleOutcome {
    pub results: Vec<TranscodeResult>,
    pub cancelled: bool,
    pub waves_completed: usize,
}

/// Effective wave width: `min(max_concurrency, available_parallelism)`
pub fn concurrency_budget(max_concurrency: usize) -> usize {
    let hardware = std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(max_concurrency);
    max_concurrency.min(hardware).max(1)
}

/// Split `0..total` into consecutive ranges of at most `width` items
pub fn plan_waves(total: usize, width: usize) -> Vec<Range<usize>> {
    let width = width.max(1);
    (0..total)
        .step_by(width)
        .map(|start| start..(start + width).min(total))
        .collect()
}

/// Forward the first interrupt from `next_signal` as a stop signal.
///
/// Returns `true` when a second interrupt arrives, `false` if listening fails.
pub async fn relay_interrupts<F, Fut>(mut next_signal: F, stop_sender: broadcast::Sender<()>) -> bool
where
    F: FnMut() -> Fut,
    Fut: Future<Output = std::io::Result<()>>,
{
    if next_signal().await.is_err() {
        return false;
    }
    warn!("Interrupt received, stopping after the current wave (press again to quit)");
    let _ = stop_sender.send(());

    next_signal().await.is_ok()
}

/// Drives the transcoder over a source list in waves
pub struct WaveScheduler {
    transcoder: Transcoder,
    width: usize,
    stop_receiver: Option<broadcast::Receiver<()>>,
}

impl WaveScheduler {
    pub fn new(transcoder: Transcoder, max_concurrency: usize) -> Self {
        Self {
            transcoder,
            width: concurrency_budget(max_concurrency),
            stop_receiver: None,
        }
    }

    /// Exact wave width, ignoring hardware detection
    pub fn with_width(mut self, width: usize) -> Self {
        self.width = width.max(1);
        self
    }

    pub fn with_cancellation(mut self, stop_receiver: broadcast::Receiver<()>) -> Self {
        self.stop_receiver = Some(stop_receiver);
        self
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn transcoder(&self) -> &Transcoder {
        &self.transcoder
    }

    /// Checks if a stop signal has been received
    fn should_stop(&mut self) -> bool {
        if let Some(ref mut receiver) = self.stop_receiver {
            match receiver.try_recv() {
                Ok(_) => return true,
                Err(broadcast::error::TryRecvError::Empty) => return false,
                // Signal was sent but we missed it, treat as stop
                Err(broadcast::error::TryRecvError::Lagged(_)) => return true,
                // Sender dropped, keep going
                Err(broadcast::error::TryRecvError::Closed) => return false,
            }
        }
        false
    }

    pub async fn run<F>(&mut self, sources: &[SourceImage], quality: u8, on_progress: F) -> ScheduleOutcome
    where
        F: FnMut(&BatchProgress),
    {
        self.run_with(sources, quality, on_progress, |_, _| {}).await
    }

    /// Like `run`, also notifying `on_wave(wave_number, wave_count)` as each wave starts
    pub async fn run_with<F, W>(
        &mut self,
        sources: &[SourceImage],
        quality: u8,
        mut on_progress: F,
        mut on_wave: W,
    ) -> ScheduleOutcome
    where
        F: FnMut(&BatchProgress),
        W: FnMut(usize, usize),
    {
        let total = sources.len();
        let waves = plan_waves(total, self.width);
        let wave_count = waves.len();
        let mut slots: Vec<Option<TranscodeResult>> = vec![None; total];
        let mut cancelled = false;
        let mut waves_completed = 0;

        info!("Scheduling {} images in {} waves of up to {}", total, wave_count, self.width);

        for (wave_index, range) in waves.into_iter().enumerate() {
            if self.should_stop() {
                info!("Stop signal received, skipping waves {}..={}", wave_index + 1, wave_count);
                cancelled = true;
                break;
            }

            on_wave(wave_index + 1, wave_count);
            debug!("Wave {}/{}: items {:?}", wave_index + 1, wave_count, range);

            let mut pending = Vec::with_capacity(range.len());
            for index in range.clone() {
                let source = &sources[index];
                on_progress(&BatchProgress::new(index, total, source.name()));
                pending.push(self.transcoder.transcode(source, quality));
            }

            // Barrier: the whole wave settles before anything is recorded
            let wave_results = join_all(pending).await;
            for (index, result) in range.zip(wave_results) {
                slots[index] = Some(result);
            }
            waves_completed += 1;
        }

        on_progress(&BatchProgress::packaging(total));

        let extension = self.transcoder.codec().extension();
        let results = slots
            .into_iter()
            .zip(sources)
            .map(|(slot, source)| {
                slot.unwrap_or_else(|| {
                    TranscodeResult::failed(
                        output_name(source.name(), extension),
                        source.len(),
                        &ConvertError::Cancelled,
                    )
                })
            })
            .collect();

        ScheduleOutcome {
            results,
            cancelled,
            waves_completed,
        }
    }
}
