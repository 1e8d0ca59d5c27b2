//! Thin binary wrapping the capture core: parses arguments, resolves a
//! target process, drives `start`/`pop_batch`/`stop`, and writes a WAV
//! file (§6a). Contains no capture logic of its own.

use std::fs;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use clap::Parser;
use tracing_subscriber::EnvFilter;

use wincap_audio::{CaptureEngine, InclusionMode, SessionDirectory};
use wincap_foundation::config::CaptureConfig;

#[derive(Parser, Debug)]
#[command(name = "wincap", author, version, about = "Process-scoped WASAPI loopback capture")]
struct Cli {
    /// Target process id. Mutually exclusive with --process-name.
    #[arg(long)]
    pid: Option<u32>,

    /// Case-insensitive substring match against running sessions' process names.
    #[arg(long = "process-name")]
    process_name: Option<String>,

    /// How the target process's descendant tree is treated.
    #[arg(long, value_enum, default_value = "process-only")]
    mode: CliMode,

    /// Capture duration in seconds. Omit to run until Ctrl-C.
    #[arg(long = "duration-secs")]
    duration_secs: Option<f64>,

    /// Output WAV path.
    #[arg(long = "out")]
    out: PathBuf,

    /// Chunk size in milliseconds, overriding the config file/default.
    #[arg(long = "chunk-ms")]
    chunk_ms: Option<u32>,

    /// Frame queue capacity in chunks, overriding the config file/default.
    #[arg(long = "queue-capacity")]
    queue_capacity: Option<u32>,

    /// Optional TOML config file, merged under CLI flags and over defaults.
    #[arg(long = "config")]
    config_path: Option<PathBuf>,

    /// Log level passed to `tracing_subscriber`'s `EnvFilter` (overridden by `RUST_LOG`).
    #[arg(long = "log-level", default_value = "info")]
    log_level: String,
}

#[derive(Clone, Copy, Debug, clap::ValueEnum)]
enum CliMode {
    IncludeTree,
    ExcludeTree,
    ProcessOnly,
}

impl From<CliMode> for InclusionMode {
    fn from(m: CliMode) -> Self {
        match m {
            CliMode::IncludeTree => InclusionMode::IncludeTargetTree,
            CliMode::ExcludeTree => InclusionMode::ExcludeTargetTree,
            CliMode::ProcessOnly => InclusionMode::IncludeProcessOnly,
        }
    }
}

fn init_logging(log_level: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_level));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

/// Defaults, then an optional TOML file, then CLI overrides (§10.3).
fn load_config(cli: &Cli) -> anyhow::Result<CaptureConfig> {
    let mut config = match &cli.config_path {
        Some(path) => {
            let text = fs::read_to_string(path)?;
            toml::from_str(&text)?
        }
        None => CaptureConfig::default(),
    };
    if let Some(chunk_ms) = cli.chunk_ms {
        // 48kHz is the only native format this engine negotiates (§4.4).
        config.chunk_frame_count = chunk_ms * 48;
    }
    if let Some(capacity) = cli.queue_capacity {
        config.queue_capacity_chunks = capacity;
    }
    Ok(config)
}

/// Resolves `--pid`/`--process-name` to a concrete pid via a single
/// enumeration (§4.5 Matching rule: substring matching happens here, never
/// inside the directory object itself).
fn resolve_pid(cli: &Cli, directory: &SessionDirectory) -> anyhow::Result<u32> {
    if let Some(pid) = cli.pid {
        return Ok(pid);
    }
    let needle = cli
        .process_name
        .as_ref()
        .ok_or_else(|| anyhow::anyhow!("either --pid or --process-name is required"))?
        .to_lowercase();

    let sessions = directory.enumerate()?;
    sessions
        .into_iter()
        .find(|s| s.process_name.to_lowercase().contains(&needle))
        .map(|s| s.process_id)
        .ok_or_else(|| anyhow::anyhow!("no session matching process name '{}'", needle))
}

fn f32_to_i16(sample: f32) -> i16 {
    (sample.clamp(-1.0, 1.0) * 32767.0) as i16
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_logging(&cli.log_level);

    let config = load_config(&cli)?;
    let directory = SessionDirectory::new();
    let pid = resolve_pid(&cli, &directory)?;
    let mode = cli.mode.into();

    let engine = Arc::new(CaptureEngine::new(config));
    if let Err(e) = engine.start(pid, mode) {
        eprintln!("{}: {}", error_kind_for_display(&e), e);
        std::process::exit(1);
    }
    tracing::info!(pid, ?mode, "capture started");

    let shutdown_engine = Arc::clone(&engine);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("Ctrl-C received, stopping capture");
            shutdown_engine.stop();
        }
    });

    let format = engine
        .format()
        .ok_or_else(|| anyhow::anyhow!("engine reported no format after a successful start"))?;
    let spec = hound::WavSpec {
        channels: format.channels,
        sample_rate: format.sample_rate_hz,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };
    let mut writer = hound::WavWriter::create(&cli.out, spec)?;

    let deadline = cli.duration_secs.map(|secs| Instant::now() + Duration::from_secs_f64(secs));
    let pop_timeout = Duration::from_millis(200);

    while engine.is_running() {
        if let Some(deadline) = deadline {
            if Instant::now() >= deadline {
                break;
            }
        }
        let chunks = engine.pop_batch(64, pop_timeout);
        for chunk in chunks {
            for sample in chunk.samples.iter() {
                writer.write_sample(f32_to_i16(*sample))?;
            }
        }
    }

    engine.stop();
    for chunk in engine.pop_batch(u32::MAX, Duration::from_millis(0)) {
        for sample in chunk.samples.iter() {
            writer.write_sample(f32_to_i16(*sample))?;
        }
    }
    writer.finalize()?;

    let metrics = engine.metrics();
    if let Some(err) = metrics.last_error {
        eprintln!("capture_fatal: {err}");
        std::process::exit(1);
    }

    tracing::info!(
        enqueued = metrics.enqueued,
        dropped = metrics.dropped,
        "capture finished"
    );
    Ok(())
}

fn error_kind_for_display(e: &wincap_foundation::error::CaptureError) -> &'static str {
    use wincap_foundation::error::CaptureError::*;
    match e {
        UnsupportedPlatform => "unsupported_platform",
        NoSuchProcess { .. } => "no_such_process",
        AccessDenied => "access_denied",
        ActivationTimeout(_) => "activation_timeout",
        EndpointInitFailed { .. } => "endpoint_init_failed",
        InvalidState { .. } => "invalid_state",
        CaptureFatal(_) => "capture_fatal",
        Platform(_) => "platform_error",
    }
}
