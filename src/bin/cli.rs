//! CLI entry point (C16): load configuration, initialize logging, wire
//! the reference adapters and telemetry dashboard, and run the voice
//! pipeline orchestrator until Ctrl+C.

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use hearthvox::audio::cpal_port::CpalAudioPort;
use hearthvox::config::RuntimeConfig;
use hearthvox::features;
use hearthvox::llm::ScriptedLlm;
use hearthvox::prompt_cache::PromptCache;
use hearthvox::stt::ScriptedStt;
use hearthvox::telemetry::{TelemetryStore, TelemetryWeb};
use hearthvox::tts::SilentTts;
use hearthvox::wake::EnergyWakeDetector;
use hearthvox::Orchestrator;

/// Hearthvox: a local, wake-word-gated voice assistant.
#[derive(Parser)]
#[command(name = "hearthvox", version, about)]
struct Cli {
    /// Path to a TOML configuration file. Defaults to the XDG config
    /// path, falling back to built-in defaults if that doesn't exist.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Directory for rotating log files. Logs to stderr only if unset.
    #[arg(long)]
    log_dir: Option<PathBuf>,
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // tracing-appender's guard must outlive the program for buffered
    // writes to flush; held here rather than dropped at the end of init.
    let _log_guard = init_logging(cli.log_dir.as_deref());

    let config = RuntimeConfig::load(cli.config.as_deref())?;

    let store = Arc::new(TelemetryStore::open(&config.telemetry.db_path, config.telemetry.max_size_bytes)?);
    let bind_addr = format!("{}:{}", config.telemetry.web_host, config.telemetry.web_port);
    let web = TelemetryWeb::start(Arc::clone(&store), &bind_addr)?;
    tracing::info!("telemetry dashboard listening on http://{}", web.addr());

    let audio = Box::new(CpalAudioPort::new(&config.audio)?);
    let wake = Box::new(EnergyWakeDetector::new(config.wake.model.clone(), 500.0, 3.0, 3));
    let stt = Box::new(ScriptedStt::new(Vec::new()));
    let mut tts = SilentTts::new(config.audio.sample_rate);
    let prompt_cache = PromptCache::build(&config.prompt_cache, &mut tts);
    let tts = Box::new(tts);
    let llm = Box::new(ScriptedLlm::new("reference-scripted-llm", &config.llm));

    let running = Arc::new(AtomicBool::new(true));
    spawn_ctrlc_watcher(Arc::clone(&running));

    let mut orchestrator = Orchestrator::new(&config, audio, wake, stt, tts, llm, features::default_registry(), store, Arc::clone(&running))
        .with_prompt_cache(prompt_cache);

    println!("Hearthvox v{} — listening for the wake word. Press Ctrl+C to stop.", env!("CARGO_PKG_VERSION"));
    orchestrator.run()?;

    Ok(())
}

/// Initialize structured logging: `RUST_LOG`-driven stderr output, plus
/// an optional daily-rotating file sink under `log_dir`.
fn init_logging(log_dir: Option<&std::path::Path>) -> Option<tracing_appender::non_blocking::WorkerGuard> {
    let filter = || EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("hearthvox=info,axum=warn"));

    match log_dir {
        Some(dir) => {
            let file_appender = tracing_appender::rolling::daily(dir, "hearthvox.log");
            let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);
            tracing_subscriber::fmt().with_env_filter(filter()).with_writer(non_blocking).init();
            Some(guard)
        }
        None => {
            tracing_subscriber::fmt().with_env_filter(filter()).init();
            None
        }
    }
}

/// Clear `running` on Ctrl+C, on a dedicated thread hosting the minimal
/// tokio runtime `tokio::signal::ctrl_c()` requires. Mirrors the
/// telemetry dashboard's own single-purpose runtime thread: the core
/// stays synchronous, and this is the one other spot that needs an
/// async primitive.
fn spawn_ctrlc_watcher(running: Arc<AtomicBool>) {
    std::thread::Builder::new()
        .name("ctrlc-watcher".to_owned())
        .spawn(move || {
            let runtime = match tokio::runtime::Builder::new_current_thread().enable_all().build() {
                Ok(rt) => rt,
                Err(e) => {
                    tracing::warn!("failed to start Ctrl+C watcher runtime: {e}");
                    return;
                }
            };
            runtime.block_on(async {
                if tokio::signal::ctrl_c().await.is_ok() {
                    tracing::info!("received shutdown signal, finishing the current exchange...");
                    running.store(false, Ordering::SeqCst);
                }
            });
        })
        .expect("spawn ctrlc watcher thread");
}
