use anyhow::{Context, Result};
use clap::Parser;
use promptcap::{
    MediaKind, Orientation, PromptcapConfig, PromptcapEvent, RecordingMode, Studio,
    StudioBackends,
};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};
use tracing_appender::non_blocking::WorkerGuard;

#[derive(Parser, Debug)]
#[command(name = "promptcap")]
#[command(about = "Teleprompter recording studio: camera, screen and combined capture with clip editing")]
#[command(version)]
#[command(long_about = "Records camera, screen or combined (screen with a floating camera \
self-view) sessions while pacing a teleprompter script, then exports the recording with an \
edit list. Runs against a simulated capture platform.")]
struct Args {
    /// Path to configuration file
    #[arg(short, long, default_value = "promptcap.toml", help = "Path to TOML configuration file")]
    config: String,

    #[arg(short, long, help = "Enable debug level logging")]
    debug: bool,

    #[arg(short, long, help = "Enable verbose info level logging")]
    verbose: bool,

    #[arg(short, long, help = "Enable quiet mode - only log errors")]
    quiet: bool,

    #[arg(long, value_name = "FORMAT", help = "Log output format: json, pretty, or compact")]
    log_format: Option<String>,

    #[arg(long, value_name = "DIR", help = "Also write daily-rotated JSON logs into DIR")]
    log_dir: Option<PathBuf>,

    #[arg(long, help = "Validate configuration file and exit")]
    validate_config: bool,

    #[arg(long, help = "Print default configuration in TOML format and exit")]
    print_config: bool,

    #[arg(short, long, default_value = "camera", help = "Recording mode: camera, screen or combined")]
    mode: RecordingMode,

    #[arg(long, help = "Record in portrait orientation")]
    portrait: bool,

    #[arg(long, value_name = "SECONDS", value_parser = parse_seconds, help = "Stop automatically after SECONDS")]
    duration: Option<Duration>,

    #[arg(long, value_name = "FILE", help = "Teleprompter script to scroll while recording")]
    script: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    if args.print_config {
        print_default_config()?;
        return Ok(());
    }

    let _log_guard = init_logging(&args)?;

    info!("Starting promptcap v{}", env!("CARGO_PKG_VERSION"));
    info!("Configuration file: {}", args.config);

    let config = PromptcapConfig::load_from_file(&args.config)
        .with_context(|| format!("failed to load configuration from {}", args.config))?;

    if args.validate_config {
        match config.validate() {
            Ok(()) => {
                println!("✓ Configuration is valid");
                return Ok(());
            }
            Err(e) => {
                error!("Configuration validation failed: {}", e);
                eprintln!("✗ Configuration validation failed: {}", e);
                std::process::exit(1);
            }
        }
    }

    #[allow(unused_mut)]
    let mut studio = Studio::new(config, StudioBackends::simulated())?;
    #[cfg(feature = "keyboard")]
    {
        use std::io::IsTerminal;
        if std::io::stdin().is_terminal() {
            studio.enable_keyboard();
        }
    }
    let studio = Arc::new(studio);

    if let Some(path) = &args.script {
        let script = tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("failed to read script {}", path.display()))?;
        studio.load_script(&script);
    }

    studio.set_mode(args.mode)?;
    if args.portrait {
        studio.set_resolution(Orientation::Portrait).await?;
    }
    for kind in [MediaKind::Video, MediaKind::Audio] {
        let listing = studio.list_devices(kind).await?;
        info!(
            "{} {} device(s){}",
            listing.devices.len(),
            kind,
            if listing.permission_needed {
                " (permission needed)"
            } else {
                ""
            }
        );
    }
    if args.mode.uses_camera() {
        studio.show_preview().await?;
    }

    let mut runner = tokio::spawn({
        let studio = Arc::clone(&studio);
        async move { studio.run().await }
    });

    let session_id = match studio.start_session().await {
        Ok(id) => id,
        Err(e) => {
            error!("Could not start recording: {}", e);
            eprintln!("✗ Could not start recording: {}", e);
            studio.shutdown().await?;
            let _ = runner.await;
            std::process::exit(1);
        }
    };
    println!("Recording {} ({}) - press 's' to stop, 'q' to quit", session_id, args.mode);

    if let Some(limit) = args.duration {
        let event_bus = studio.event_bus();
        tokio::spawn(async move {
            tokio::time::sleep(limit).await;
            let _ = event_bus
                .publish(PromptcapEvent::StopRequested {
                    source: "timer".to_string(),
                })
                .await;
        });
    }

    let mut loop_done = false;
    tokio::select! {
        outcome = studio.capture().wait_for_completion() => {
            if let Err(e) = outcome {
                error!("Recording failed: {}", e);
            }
        }
        reason = &mut runner => {
            loop_done = true;
            match reason {
                Ok(Ok(reason)) => info!("Studio loop ended: {:?}", reason),
                Ok(Err(e)) => error!("Studio loop failed: {}", e),
                Err(e) => error!("Studio loop panicked: {}", e),
            }
        }
    }

    let exit_code = studio.shutdown().await?;

    if studio.capture().last_artifact().is_some() {
        match studio.export().await {
            Ok(output) => println!("✓ Saved {}", output.media_path.display()),
            Err(e) => {
                error!("Export failed: {}", e);
                eprintln!("✗ Export failed: {}", e);
            }
        }
    } else {
        warn!("No recording to export");
    }

    if !loop_done {
        if let Err(e) = runner.await {
            error!("Studio loop panicked: {}", e);
        }
    }

    info!("promptcap exited with code: {}", exit_code);
    std::process::exit(exit_code);
}

fn init_logging(args: &Args) -> Result<Option<WorkerGuard>> {
    use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

    let log_level = if args.debug {
        "debug"
    } else if args.verbose {
        "info"
    } else if args.quiet {
        "error"
    } else {
        "warn"
    };

    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("promptcap={}", log_level)));

    let fmt_layer = match args.log_format.as_deref() {
        Some("json") => fmt::layer()
            .json()
            .with_target(true)
            .with_thread_ids(true)
            .with_file(true)
            .with_line_number(true)
            .boxed(),
        Some("compact") => fmt::layer()
            .compact()
            .with_target(false)
            .with_thread_ids(false)
            .boxed(),
        Some("pretty") | None => fmt::layer()
            .pretty()
            .with_target(true)
            .with_thread_ids(args.debug)
            .with_file(args.debug)
            .with_line_number(args.debug)
            .boxed(),
        Some(format) => {
            eprintln!("Warning: Unknown log format '{}', using default", format);
            fmt::layer().with_target(true).boxed()
        }
    };

    let (file_layer, guard) = match &args.log_dir {
        Some(dir) => {
            let appender = tracing_appender::rolling::daily(dir, "promptcap.log");
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let layer = fmt::layer()
                .json()
                .with_ansi(false)
                .with_writer(writer);
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(fmt_layer)
        .with(file_layer)
        .with(env_filter)
        .init();

    Ok(guard)
}

/// Parse a non-negative, finite number of seconds
fn parse_seconds(value: &str) -> std::result::Result<Duration, String> {
    let seconds: f64 = value
        .parse()
        .map_err(|_| format!("'{}' is not a number of seconds", value))?;
    if !seconds.is_finite() || seconds < 0.0 {
        return Err(format!("'{}' must be a finite, non-negative duration", value));
    }
    Duration::try_from_secs_f64(seconds).map_err(|e| format!("'{}': {}", value, e))
}

/// Print the default configuration in TOML format
fn print_default_config() -> Result<()> {
    let config = toml::to_string_pretty(&PromptcapConfig::default())
        .context("failed to serialize default configuration")?;
    println!("# promptcap configuration file");
    println!("# Every key is optional; PROMPTCAP_<SECTION>_<KEY> environment variables override it");
    println!();
    println!("{}", config);
    Ok(())
}
