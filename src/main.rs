//! Clipsmith - media transcoding from the command line
//!
//! Entry point wiring the engine, the transform executors and the optional
//! worker thread to the `clipsmith` subcommands.

use anyhow::{Context, Result};
use clap::Parser;
use indicatif::{ProgressBar, ProgressStyle};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{error, info, Level};
use tracing_appender::{non_blocking, rolling};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use clipsmith::cancel::CancellationToken;
use clipsmith::cli::{Args, Commands};
use clipsmith::config::Config;
use clipsmith::engine::{EngineLoader, EngineManager, FfmpegLoader};
use clipsmith::error::ClipsmithError;
use clipsmith::media::{
    CompressRequest, CompressionLevel, GifRequest, OutputFormat, ProgressReporter,
    TransformRequest, TransformResult, Transcoder, TrimRequest,
};
use clipsmith::worker::MediaWorker;

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Setup logging to both console and file
    setup_logging(args.verbose)?;

    let config = load_config(args.config.as_deref())?;

    if let Err(e) = run(args, config).await {
        error!("{:#}", e);
        match e.downcast_ref::<ClipsmithError>() {
            Some(err) => eprintln!("Error: {}", err.user_message()),
            None => eprintln!("Error: {:#}", e),
        }
        std::process::exit(1);
    }
    Ok(())
}

/// `--config`, else `clipsmith.toml` in the working directory, else defaults
fn load_config(path: Option<&Path>) -> Result<Config> {
    let config = match path {
        Some(config_path) => Config::from_file(config_path)?,
        None => {
            if Path::new("clipsmith.toml").exists() {
                info!("Found clipsmith.toml in current directory, loading...");
                Config::from_file("clipsmith.toml")?
            } else {
                Config::default()
            }
        }
    };
    Ok(config)
}

async fn run(args: Args, config: Config) -> Result<()> {
    let loader: Arc<dyn EngineLoader> = Arc::new(FfmpegLoader::new()?);
    let direct = Transcoder::new(
        EngineManager::new(loader.clone(), config.engine.clone()),
        config.limits.clone(),
    );

    match args.command {
        Commands::Config { output } => {
            config.save_to_file(&output)?;
            println!("Wrote default configuration to {}", output.display());
        }
        Commands::Check => {
            let engine = direct.ensure_ready().await?;
            println!("Engine ready: {}", engine.version());
            if args.worker {
                let mut worker = MediaWorker::spawn(loader, config)?;
                worker.init().await?;
                worker.terminate()?;
                println!("Worker engine ready");
            }
        }
        Commands::Probe { input, json } => {
            let bytes = read_input(&input).await?;
            let metadata = direct.probe(&bytes).await?;
            if json {
                println!("{}", serde_json::to_string_pretty(&metadata)?);
            } else {
                println!("File:       {}", input.display());
                println!("Duration:   {}", format_duration(metadata.duration_seconds));
                println!("Resolution: {}x{}", metadata.width, metadata.height);
                println!("Bitrate:    {} kb/s", metadata.bitrate_bps / 1000);
                println!("Size:       {} bytes", metadata.size_bytes);
            }
        }
        Commands::Cleanup => {
            let removed = if args.worker {
                let mut worker = MediaWorker::spawn(loader, config)?;
                worker.init().await?;
                let removed = worker.cleanup().await?;
                worker.terminate()?;
                removed
            } else {
                direct.ensure_ready().await?;
                direct.cleanup_all().await
            };
            println!("Removed {} leftover files", removed);
        }
        Commands::Compress { input, output, level, format } => {
            let level: CompressionLevel = level.parse()?;
            let format: OutputFormat = format.parse()?;
            let output = output.unwrap_or_else(|| sibling(&input, "-compressed", format.extension()));
            let request = TransformRequest::Compress(CompressRequest {
                input: read_input(&input).await?,
                level,
                format,
            });
            transform(request, &output, args.worker, direct, loader, config).await?;
        }
        Commands::Trim { input, output, start, end, format } => {
            let format: OutputFormat = format.parse()?;
            let output = output.unwrap_or_else(|| sibling(&input, "-trimmed", format.extension()));
            let request = TransformRequest::Trim(TrimRequest {
                input: read_input(&input).await?,
                start_seconds: start,
                end_seconds: end,
                format,
            });
            transform(request, &output, args.worker, direct, loader, config).await?;
        }
        Commands::Gif { input, output, fps, width, height, start, duration } => {
            let output = output.unwrap_or_else(|| sibling(&input, "", "gif"));
            let request = TransformRequest::Gif(GifRequest {
                input: read_input(&input).await?,
                fps,
                width,
                height,
                start_seconds: start,
                duration_seconds: duration,
            });
            transform(request, &output, args.worker, direct, loader, config).await?;
        }
    }

    Ok(())
}

/// Run one transform directly or on the worker, with a progress bar and Ctrl-C cancellation
async fn transform(
    request: TransformRequest,
    output: &Path,
    use_worker: bool,
    direct: Transcoder,
    loader: Arc<dyn EngineLoader>,
    config: Config,
) -> Result<()> {
    let kind = request.kind();
    info!("Running {} ({})", kind, if use_worker { "worker" } else { "direct" });

    let bar = ProgressBar::new(100);
    bar.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}% {msg}")?
            .progress_chars("#>-"),
    );
    bar.set_message(kind);
    let progress = {
        let bar = bar.clone();
        ProgressReporter::new(move |event| bar.set_position(event.percent.round() as u64))
    };

    let cancel = CancellationToken::new();
    {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                cancel.cancel();
            }
        });
    }

    let result = if use_worker {
        run_on_worker(request, loader, config, &progress, cancel).await
    } else {
        let result = direct.run(&request, &progress, &cancel).await;
        let removed = direct.cleanup_all().await;
        if removed > 0 {
            info!("Removed {} leftover working files", removed);
        }
        result
    };

    let result = match result {
        Ok(result) => {
            bar.finish_with_message("done");
            result
        }
        Err(e) => {
            bar.abandon_with_message("failed");
            return Err(e.into());
        }
    };

    tokio::fs::write(output, &result.bytes)
        .await
        .with_context(|| format!("Failed to write {}", output.display()))?;
    println!("Wrote {} ({} bytes, {})", output.display(), result.len(), result.mime);
    Ok(())
}

async fn run_on_worker(
    request: TransformRequest,
    loader: Arc<dyn EngineLoader>,
    config: Config,
    progress: &ProgressReporter,
    cancel: CancellationToken,
) -> clipsmith::error::Result<TransformResult> {
    let mut worker = MediaWorker::spawn(loader, config)?;
    worker.init().await?;
    let result = match request {
        TransformRequest::Compress(r) => worker.compress(r, progress, cancel).await,
        TransformRequest::Trim(r) => worker.trim(r, progress, cancel).await,
        TransformRequest::Gif(r) => worker.create_gif(r, progress, cancel).await,
    };
    worker.terminate()?;
    result
}

async fn read_input(path: &Path) -> Result<Vec<u8>> {
    tokio::fs::read(path)
        .await
        .with_context(|| format!("Failed to read {}", path.display()))
}

/// `<dir>/<stem><suffix>.<extension>` next to `input`
fn sibling(input: &Path, suffix: &str, extension: &str) -> PathBuf {
    let stem = input
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "output".to_string());
    input.with_file_name(format!("{}{}.{}", stem, suffix, extension))
}

/// Setup logging to both console and file
fn setup_logging(verbose: bool) -> Result<()> {
    let log_dir = std::env::current_dir()?.join(".clipsmith").join("log");
    std::fs::create_dir_all(&log_dir)?;

    // Set up file appender with daily rotation
    let file_appender = rolling::daily(&log_dir, "clipsmith.log");
    let (non_blocking_file, guard) = non_blocking(file_appender);
    // Keep the guard alive for the duration of the program
    std::mem::forget(guard);

    let log_level = if verbose { Level::DEBUG } else { Level::INFO };

    let console_layer = fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_thread_names(true);

    let file_layer = fmt::layer()
        .with_writer(non_blocking_file)
        .with_target(false)
        .with_thread_ids(true)
        .with_thread_names(true)
        .with_file(true)
        .with_line_number(true)
        .with_ansi(false);

    tracing_subscriber::registry()
        .with(EnvFilter::from_default_env().add_directive(log_level.into()))
        .with(console_layer)
        .with(file_layer)
        .try_init()
        .map_err(|e| anyhow::anyhow!("Failed to initialize logging: {}", e))?;

    info!("Logging initialized - console: {}, file: {}",
          log_level, log_dir.join("clipsmith.log").display());

    Ok(())
}

/// Format seconds as `1h 02m 03.5s` style text
fn format_duration(seconds: f64) -> String {
    let whole = seconds as u64;
    let fraction = seconds - whole as f64;
    if whole < 60 {
        format!("{:.1}s", seconds)
    } else if whole < 3600 {
        format!("{}m {:.1}s", whole / 60, (whole % 60) as f64 + fraction)
    } else {
        format!("{}h {:02}m {:.1}s", whole / 3600, (whole % 3600) / 60, (whole % 60) as f64 + fraction)
    }
}
