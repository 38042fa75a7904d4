use std::{path::PathBuf, sync::Arc};

use {
    anyhow::{Context, Result},
    clap::{Parser, ValueEnum},
    companion_protocol::MAX_PAYLOAD_BYTES,
    companion_surface::{Language, Session, SurfaceConfig, WsChannel},
    tracing::{debug, info, warn},
};

/// Companion surface client.
///
/// Connects to a WebSocket relay, answers the agent's display and modal
/// calls, and logs every surface change in place of a renderer.
#[derive(Parser, Debug)]
#[command(version)]
struct Args {
    /// WebSocket URL of the relay.
    #[arg(long, env = "COMPANION_URL")]
    url: String,

    /// Participant identity announced to the relay.
    #[arg(long, env = "COMPANION_IDENTITY", default_value = "companion-surface")]
    identity: String,

    /// Optional TOML config file. Flags below override its values.
    #[arg(long, env = "COMPANION_CONFIG")]
    config: Option<PathBuf>,

    /// Identity of the agent that receives selection events.
    #[arg(long, env = "COMPANION_AGENT_IDENTITY")]
    agent_identity: Option<String>,

    /// Timeout for outbound calls, in milliseconds.
    #[arg(long, env = "COMPANION_CALL_TIMEOUT_MS")]
    call_timeout_ms: Option<u64>,

    /// Language used for entity titles (en or ar).
    #[arg(long, env = "COMPANION_TITLE_LANGUAGE")]
    title_language: Option<Language>,

    /// Largest inbound payload accepted, in bytes.
    #[arg(long, env = "COMPANION_MAX_PAYLOAD_BYTES")]
    max_payload_bytes: Option<usize>,

    /// Log output format.
    #[arg(long, value_enum, env = "COMPANION_LOG_FORMAT", default_value_t = LogFormat::Pretty)]
    log_format: LogFormat,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
enum LogFormat {
    Pretty,
    Json,
}

impl Args {
    /// File values (or defaults), then flag and env overrides.
    fn surface_config(&self) -> Result<SurfaceConfig> {
        let mut config = match &self.config {
            Some(path) => SurfaceConfig::load(path)
                .with_context(|| format!("failed to load config {}", path.display()))?,
            None => SurfaceConfig::default(),
        };
        if let Some(agent) = &self.agent_identity {
            config.agent_identity = agent.clone();
        }
        if let Some(ms) = self.call_timeout_ms {
            config.call_timeout_ms = ms;
        }
        if let Some(lang) = self.title_language {
            config.title_language = lang;
        }
        if let Some(max) = self.max_payload_bytes {
            config.max_payload_bytes = max;
        }
        config.validate().context("invalid configuration")?;
        Ok(config)
    }
}

fn init_tracing(format: LogFormat) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    match format {
        LogFormat::Pretty => builder.init(),
        LogFormat::Json => builder.json().init(),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    init_tracing(args.log_format);

    let config = args.surface_config()?;
    if config.max_payload_bytes > MAX_PAYLOAD_BYTES {
        warn!(
            max_payload_bytes = config.max_payload_bytes,
            "payload limit raised above the protocol default"
        );
    }

    let channel = Arc::new(
        WsChannel::connect(&args.url, &args.identity, config.max_payload_bytes)
            .await
            .with_context(|| format!("failed to connect to {}", args.url))?,
    );
    let session =
        Session::attach(channel.clone(), config).context("failed to attach surface session")?;

    let mut snapshots = session.subscribe();
    let renderer = tokio::spawn(async move {
        while snapshots.changed().await.is_ok() {
            let snapshot = snapshots.borrow_and_update().clone();
            let section = &snapshot.section;
            info!(
                kind = ?section.kind(),
                cards = section.cards().map_or(0, |deck| deck.cards.len()),
                donations = section.orders().map_or(0, |book| book.donations.len()),
                sponsorships = section.orders().map_or(0, |book| book.sponsorships.len()),
                modal_open = snapshot.selection.is_open(),
                "surface changed"
            );
            match serde_json::to_string(&snapshot) {
                Ok(json) => debug!(snapshot = %json, "surface snapshot"),
                Err(e) => warn!(error = %e, "failed to encode snapshot"),
            }
        }
    });

    info!(url = %args.url, identity = channel.identity(), "companion surface running");
    tokio::select! {
        _ = tokio::signal::ctrl_c() => info!("shutting down"),
        _ = channel.closed() => warn!("relay connection lost"),
    }

    session.detach().await;
    channel.close().await;
    renderer.abort();
    Ok(())
}
