//! # Scheduler Module
//!
//! Separa le responsabilità dell'esecuzione batch in sottomoduli:
//! - `wave_scheduler`: Esecuzione a onde con barriera e cancellazione
//! - `batch_converter`: Orchestratore (scheduler + packager + statistiche)
//! - `progress_tracker`: Inoltro del progresso a terminale o JSON

pub mod batch_converter;
pub mod progress_tracker;
pub mod wave_scheduler;

pub use batch_converter::{BatchConverter, BatchOutput, BatchState, BatchStateMachine};
pub use progress_tracker::ProgressTracker;
pub use wave_scheduler::{concurrency_budget, plan_waves, relay_interrupts, ScheduleOutcome, WaveScheduler};
