//! safevision-worker: runs the rule engine over a stream of detection frames.
//!
//! Reads one JSON object per line from a file or stdin:
//!
//! ```json
//! {"frame": {"video_id": "cam-1", "frame_number": 12, "timestamp_ms": 400},
//!  "detections": [{"track_id": "person_1", "label": "person", "center_x": 310, "center_y": 95}]}
//! ```
//!
//! Every emitted alert is written to stdout as one JSON line and, when a
//! webhook URL is configured, POSTed to it.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use serde::Deserialize;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWriteExt, BufReader};
use tracing::{info, warn};

use safevision_core::config::load_dotenv;
use safevision_core::{Detection, FrameContext, GlobalConfig};
use safevision_notify::{AlertPublisher, Dispatcher, NoopPublisher, WebhookPublisher};
use safevision_rules::engine::{EngineSettings, RuleEngine};
use safevision_rules::loader::FileRuleSource;
use safevision_rules::store::MemoryAlertStore;

// ── CLI ─────────────────────────────────────────────────────────────

/// Evaluate safety rules against detection frames.
#[derive(Parser, Debug)]
#[command(name = "safevision-worker", version, about)]
struct Cli {
    /// Directory containing rule definitions (*.json, *.yml, *.yaml).
    #[arg(long, env = "RULES_DIR", default_value = "data/rules")]
    rules_dir: PathBuf,

    /// Global config file (JSON or YAML). Falls back to environment variables.
    #[arg(long, env = "SAFEVISION_CONFIG")]
    config: Option<PathBuf>,

    /// Frame input, one JSON object per line. `-` reads stdin.
    #[arg(long, default_value = "-")]
    input: String,

    /// Deliver alerts to this webhook in addition to stdout.
    #[arg(long, env = "ALERT_WEBHOOK_URL")]
    webhook_url: Option<String>,

    /// Engine-level dedup window in seconds.
    #[arg(long, env = "ALERT_DEDUP_WINDOW", default_value_t = 3)]
    dedup_window: u64,

    /// Watch the rules directory and re-apply changes periodically.
    #[arg(long)]
    watch: bool,

    /// Seconds between rule reloads when watching.
    #[arg(long, default_value_t = 5)]
    reload_interval: u64,

    /// Seconds of frame time after which idle per-object rule state is dropped.
    #[arg(long, env = "RULE_STATE_TTL", default_value_t = 300)]
    state_ttl: u64,

    /// Seconds to wait for in-flight alert deliveries on shutdown.
    #[arg(long, default_value_t = 5)]
    drain_timeout: u64,
}

/// One line of input.
#[derive(Debug, Deserialize)]
struct FrameInput {
    frame: FrameContext,
    #[serde(default)]
    detections: Vec<Detection>,
}

#[derive(Debug, Default)]
struct RunStats {
    frames: u64,
    alerts: u64,
    bad_lines: u64,
}

// ── main ────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    load_dotenv();
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    let fallback = GlobalConfig::from_env();
    let mut source = FileRuleSource::open(cli.rules_dir.clone(), cli.config.clone())?
        .with_fallback_config(fallback);
    if cli.watch {
        source.watch()?;
    }

    let publisher: Arc<dyn AlertPublisher> = match &cli.webhook_url {
        Some(url) => {
            let mut dispatcher = Dispatcher::empty();
            dispatcher.add_channel(Box::new(WebhookPublisher::new(
                url.clone(),
                None,
                Default::default(),
            )?));
            info!(channels = dispatcher.len(), "alert delivery configured");
            Arc::new(dispatcher)
        }
        None => Arc::new(NoopPublisher),
    };

    let mut engine = RuleEngine::new(Arc::new(source), Arc::new(MemoryAlertStore::new()), publisher)
        .with_settings(EngineSettings {
            dedup_window_secs: cli.dedup_window,
            state_ttl_secs: cli.state_ttl,
        });
    let report = engine.reload()?;
    for skipped in &report.skipped {
        warn!(rule_id = %skipped.rule_id, reason = %skipped.reason, "rule not loaded");
    }
    engine.config().log_summary();

    let reader: Box<dyn AsyncRead + Unpin + Send> = if cli.input == "-" {
        Box::new(tokio::io::stdin())
    } else {
        Box::new(tokio::fs::File::open(&cli.input).await?)
    };

    info!(rules = engine.rules().len(), input = %cli.input, "safevision-worker starting");
    let stats = run(&mut engine, reader, cli.watch.then(|| Duration::from_secs(cli.reload_interval.max(1)))).await?;
    let in_flight = engine
        .flush_publishes(Duration::from_secs(cli.drain_timeout))
        .await;

    info!(
        frames = stats.frames,
        alerts = stats.alerts,
        bad_lines = stats.bad_lines,
        in_flight,
        "safevision-worker exited cleanly"
    );
    Ok(())
}

async fn run(
    engine: &mut RuleEngine,
    reader: Box<dyn AsyncRead + Unpin + Send>,
    reload_every: Option<Duration>,
) -> anyhow::Result<RunStats> {
    let mut lines = BufReader::new(reader).lines();
    let mut stdout = tokio::io::stdout();
    let mut stats = RunStats::default();
    let mut reload_tick = tokio::time::interval(reload_every.unwrap_or(Duration::from_secs(3600)));
    reload_tick.tick().await;

    loop {
        tokio::select! {
            line = lines.next_line() => {
                let Some(line) = line? else { break };
                if line.trim().is_empty() {
                    continue;
                }
                let input: FrameInput = match serde_json::from_str(&line) {
                    Ok(input) => input,
                    Err(e) => {
                        warn!(error = %e, "skipping malformed frame line");
                        stats.bad_lines += 1;
                        continue;
                    }
                };

                stats.frames += 1;
                let alerts = engine.evaluate_frame(&input.detections, &input.frame).await?;
                for alert in &alerts {
                    let mut out = serde_json::to_vec(alert)?;
                    out.push(b'\n');
                    stdout.write_all(&out).await?;
                }
                stdout.flush().await?;
                stats.alerts += alerts.len() as u64;
            }
            _ = reload_tick.tick(), if reload_every.is_some() => {
                if let Err(e) = engine.reload() {
                    warn!(error = %e, "rule reload failed, keeping current rules");
                }
            }
            _ = tokio::signal::ctrl_c() => {
                info!("interrupted, shutting down");
                break;
            }
        }
    }

    Ok(stats)
}
