//! # WebP Batch Converter - Main Entry Point
//!
//! Questo è il punto di ingresso principale dell'applicazione.
//!
//! ## Responsabilità:
//! - Parsing degli argomenti della command line con `clap`
//! - Inizializzazione del sistema di logging con `tracing`
//! - Caricamento della configurazione da file e override da CLI
//! - Avvio della conversione singola o batch e consegna dell'output
//!
//! ## Flusso di esecuzione:
//! 1. Parsa gli argomenti CLI (input, quality, concurrency, etc.)
//! 2. Configura il logging (INFO o DEBUG a seconda del flag verbose, su stderr in modalità JSON)
//! 3. Carica `Config` dal file (se presente) e applica gli override
//! 4. Un singolo file → `transcode_one` e salvataggio `<stem>.webp`
//! 5. Più input o una directory → `transcode_batch` e salvataggio dell'archivio ZIP
//! 6. Ctrl-C invia il segnale di stop: l'onda corrente termina, le successive vengono saltate;
//!    un secondo Ctrl-C termina subito il processo
//! 7. I file di input non vengono mai sovrascritti dall'output
//!
//! ## Esempio di utilizzo:
//! ```bash
//! webp-batch ./photos --quality 80 --concurrency 4 --output ./out --verbose
//! ```

use anyhow::Result;
use clap::{Parser, ValueEnum};
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};
use tokio::sync::broadcast;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use webp_batch_converter::file_manager::FileManager;
use webp_batch_converter::json_output::JsonMessage;
use webp_batch_converter::scheduler::{relay_interrupts, ProgressTracker};
use webp_batch_converter::{
    BatchConverter, CollisionPolicy, CompressionStatistics, Config, Delivery, SourceImage,
};

#[derive(Parser)]
#[command(name = "webp-batch")]
#[command(about = "Convert images to WebP in parallel waves and bundle them into a ZIP archive")]
struct Args {
    /// Image files or directories to convert
    #[arg(required = true)]
    inputs: Vec<PathBuf>,

    /// WebP quality (1-100)
    #[arg(short, long)]
    quality: Option<u8>,

    /// Output directory (default: current directory)
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Larger side limit in pixels
    #[arg(long)]
    max_dimension: Option<u32>,

    /// Maximum images converted at once
    #[arg(short = 'j', long)]
    concurrency: Option<usize>,

    /// Archive file name (default: webp_converted_<millis>.zip)
    #[arg(long)]
    archive_name: Option<String>,

    /// How duplicate output names are stored in the archive
    #[arg(long, value_enum)]
    collision: Option<CollisionArg>,

    /// Save each converted image instead of a ZIP archive
    #[arg(long)]
    no_archive: bool,

    /// Output progress and results as JSON lines
    #[arg(long)]
    json: bool,

    /// Abort the whole run after this many seconds
    #[arg(long)]
    timeout: Option<u64>,

    /// Configuration file (default: <config_dir>/webp-batch/config.json)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Verbose logging
    #[arg(short, long)]
    verbose: bool,
}

#[derive(Clone, Copy, ValueEnum)]
enum CollisionArg {
    FirstWins,
    Suffix,
}

impl From<CollisionArg> for CollisionPolicy {
    fn from(arg: CollisionArg) -> Self {
        match arg {
            CollisionArg::FirstWins => CollisionPolicy::FirstWins,
            CollisionArg::Suffix => CollisionPolicy::Suffix,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    init_logging(args.verbose, args.json)?;

    let config = load_config(&args).await?;
    let json_output = config.json_output;

    let conversion = run(args.inputs, config.clone(), args.no_archive);
    let outcome = match config.timeout_secs {
        Some(secs) => match tokio::time::timeout(Duration::from_secs(secs), conversion).await {
            Ok(result) => result,
            Err(_) => Err(anyhow::anyhow!("Conversion timed out after {} seconds", secs)),
        },
        None => conversion.await,
    };

    if let Err(ref e) = outcome {
        if json_output {
            JsonMessage::error(e.to_string(), Some(format!("{:#}", e))).emit();
        }
    }

    outcome
}

fn init_logging(verbose: bool, json_output: bool) -> Result<()> {
    let level = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    let builder = tracing_subscriber::fmt().with_env_filter(filter);

    // stdout is reserved for JSON lines
    if json_output {
        tracing::subscriber::set_global_default(builder.with_writer(std::io::stderr).finish())?;
    } else {
        tracing::subscriber::set_global_default(builder.finish())?;
    }
    Ok(())
}

async fn load_config(args: &Args) -> Result<Config> {
    let mut config = match args.config {
        Some(ref path) => {
            if !path.exists() {
                return Err(anyhow::anyhow!("Config file does not exist: {}", path.display()));
            }
            Config::from_file(path).await?
        }
        None => match Config::default_path() {
            Some(path) => Config::from_file(&path).await?,
            None => Config::default(),
        },
    };

    if let Some(quality) = args.quality {
        config.quality = quality;
    }
    if let Some(max_dimension) = args.max_dimension {
        config.max_dimension = max_dimension;
    }
    if let Some(concurrency) = args.concurrency {
        config.max_concurrency = concurrency;
    }
    if let Some(collision) = args.collision {
        config.collision_policy = collision.into();
    }
    if args.output.is_some() {
        config.output_path = args.output.clone();
    }
    if args.archive_name.is_some() {
        config.archive_name = args.archive_name.clone();
    }
    if args.timeout.is_some() {
        config.timeout_secs = args.timeout;
    }
    if args.json {
        config.json_output = true;
    }

    config.validate()?;
    Ok(config)
}

async fn run(inputs: Vec<PathBuf>, config: Config, no_archive: bool) -> Result<()> {
    let files = FileManager::collect_inputs(&inputs)?;
    if files.is_empty() {
        return Err(anyhow::anyhow!("No supported images found in the given inputs"));
    }

    let output_dir = config.output_path.clone().unwrap_or_else(|| PathBuf::from("."));
    let delivery = Delivery::new(output_dir).with_protected(files.iter().cloned());

    if inputs.len() == 1 && inputs[0].is_file() {
        convert_single(&files[0], &config, &delivery).await
    } else {
        convert_batch(&files, &config, &delivery, no_archive).await
    }
}

async fn convert_single(path: &Path, config: &Config, delivery: &Delivery) -> Result<()> {
    let source = FileManager::load_source(path).await?;
    let converter = BatchConverter::new(config.clone())?;
    let start_time = Instant::now();

    if config.json_output {
        JsonMessage::start(1, config.quality, 1, config.max_dimension).emit();
    }

    let mut result = converter.transcode_one(&source, config.quality).await?;
    let statistics = CompressionStatistics::from_results(std::slice::from_ref(&result));

    if config.json_output {
        JsonMessage::file_complete(source.name(), &result).emit();
    }

    if !result.success {
        return Err(anyhow::anyhow!(
            "Failed to convert {}: {}",
            source.name(),
            result.error_message.as_deref().unwrap_or("unknown error")
        ));
    }

    let bytes = std::mem::take(&mut result.output_bytes);
    let saved = delivery.save(bytes, &result.output_name).await?;

    if config.json_output {
        JsonMessage::complete(statistics, Some(saved), false, start_time.elapsed().as_secs_f64()).emit();
    } else {
        info!(
            "{} -> {} ({} -> {}, {}% saved)",
            source.name(),
            saved.display(),
            FileManager::format_size(result.original_size),
            FileManager::format_size(result.compressed_size),
            result.savings_percent()
        );
    }

    Ok(())
}

async fn convert_batch(files: &[PathBuf], config: &Config, delivery: &Delivery, no_archive: bool) -> Result<()> {
    let mut sources: Vec<SourceImage> = Vec::with_capacity(files.len());
    for path in files {
        match FileManager::load_source(path).await {
            Ok(source) => sources.push(source),
            Err(e) => warn!("Skipping {}: {}", path.display(), e),
        }
    }
    let names: Vec<String> = sources.iter().map(|s| s.name().to_string()).collect();

    let (stop_sender, stop_receiver) = broadcast::channel(1);
    tokio::spawn(async move {
        if relay_interrupts(tokio::signal::ctrl_c, stop_sender).await {
            warn!("Second interrupt received, exiting");
            std::process::exit(130);
        }
    });

    let mut converter = BatchConverter::new(config.clone())?.with_cancellation(stop_receiver);
    if config.json_output {
        JsonMessage::start(sources.len(), config.quality, converter.wave_width(), config.max_dimension).emit();
    }

    let mut tracker = ProgressTracker::new(sources.len(), config.json_output);
    let start_time = Instant::now();

    let batch = converter
        .transcode_batch(&sources, config.quality, |progress| tracker.report(progress))
        .await;
    let output = match batch {
        Ok(output) => output,
        Err(failure) => {
            tracker.report_results(&names, &failure.results);
            return Err(failure.into());
        }
    };

    tracker.report_results(&names, &output.results);
    tracker.finish(&output.statistics);

    if output.statistics.success_count == 0 {
        return Err(anyhow::anyhow!("No images were converted"));
    }

    let saved = if no_archive {
        let dropped = output.archive.dropped();
        for (index, result) in output.results.into_iter().enumerate() {
            if result.success && !dropped.contains(&index) {
                delivery.save(result.output_bytes, &result.output_name).await?;
            }
        }
        Some(delivery.output_dir().to_path_buf())
    } else {
        let archive_name = config.resolved_archive_name();
        Some(delivery.save(output.archive.into_bytes(), &archive_name).await?)
    };

    if output.cancelled {
        warn!("Batch was cancelled, output contains only completed images");
    }

    if config.json_output {
        JsonMessage::complete(
            output.statistics,
            saved,
            output.cancelled,
            start_time.elapsed().as_secs_f64(),
        )
        .emit();
    } else {
        info!("{}", output.statistics.format_summary());
        if let Some(path) = saved {
            info!("Output: {}", path.display());
        }
    }

    Ok(())
}
