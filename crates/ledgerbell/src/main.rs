//! # ledgerbell
//!
//! `serve` runs the notification server; `watch` runs the event consumer
//! against a server and reports alerts and local events on the terminal.

#![deny(unsafe_code)]

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use ledgerbell_client::alert::{Alerter, AudioOutput, PcmStream, TerminalBell};
use ledgerbell_client::bus::LocalEventBus;
use ledgerbell_client::consumer::LogInvalidator;
use ledgerbell_client::{ClientConfig, EventConsumer, Identity};
use ledgerbell_core::{Role, UserId};
use ledgerbell_server::shutdown::DEFAULT_DRAIN_TIMEOUT;
use ledgerbell_server::{NotifyServer, ServerConfig};
use ledgerbell_settings::LedgerbellSettings;
use tokio::sync::broadcast::error::RecvError;

/// Role-partitioned WebSocket notifications.
#[derive(Parser, Debug)]
#[command(name = "ledgerbell", about = "Role-partitioned WebSocket notifications")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the notification server.
    Serve {
        /// Host to bind (overrides settings).
        #[arg(long)]
        host: Option<String>,

        /// Port to bind, 0 for auto-assign (overrides settings).
        #[arg(long)]
        port: Option<u16>,

        /// Settings file (defaults to `~/.ledgerbell/settings.json`).
        #[arg(long)]
        config: Option<PathBuf>,
    },
    /// Consume events for one identity and print them.
    Watch {
        /// User id to register as.
        #[arg(long)]
        user_id: i64,

        /// Role to register as.
        #[arg(long, value_enum)]
        role: RoleArg,

        /// Dashboard origin, e.g. `https://dash.example.com` (overrides settings).
        #[arg(long)]
        origin: Option<String>,

        /// Alert tone output: the terminal bell, or raw s16le PCM on stdout.
        #[arg(long, value_enum, default_value = "bell")]
        audio: AudioArg,

        /// Settings file (defaults to `~/.ledgerbell/settings.json`).
        #[arg(long)]
        config: Option<PathBuf>,
    },
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
enum RoleArg {
    Admin,
    User,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
enum AudioArg {
    Bell,
    Pcm,
}

impl AudioArg {
    fn output(self) -> Arc<dyn AudioOutput> {
        match self {
            Self::Bell => Arc::new(TerminalBell),
            Self::Pcm => Arc::new(PcmStream::new(std::io::stdout())),
        }
    }
}

impl From<RoleArg> for Role {
    fn from(role: RoleArg) -> Self {
        match role {
            RoleArg::Admin => Self::Admin,
            RoleArg::User => Self::User,
        }
    }
}

fn load_settings(path: Option<&Path>) -> Result<LedgerbellSettings> {
    let path = path.map_or_else(ledgerbell_settings::settings_path, Path::to_path_buf);
    ledgerbell_settings::load_settings_from_path(&path)
        .with_context(|| format!("Failed to load settings from {}", path.display()))
}

#[tokio::main]
async fn main() -> Result<()> {
    match Cli::parse().command {
        Command::Serve { host, port, config } => serve(host, port, config.as_deref()).await,
        Command::Watch {
            user_id,
            role,
            origin,
            audio,
            config,
        } => {
            let identity = Identity {
                user_id: UserId(user_id),
                role: role.into(),
            };
            watch(identity, origin, audio, config.as_deref()).await
        }
    }
}

async fn serve(host: Option<String>, port: Option<u16>, config: Option<&Path>) -> Result<()> {
    let mut settings = load_settings(config)?;
    if let Some(host) = host {
        settings.server.host = host;
    }
    if let Some(port) = port {
        settings.server.port = port;
    }
    settings.validate().context("Invalid command-line overrides")?;
    ledgerbell_core::logging::init_subscriber(&settings.logging.level, settings.logging.json);

    let metrics = ledgerbell_server::metrics::install_recorder()
        .context("Failed to install metrics recorder")?;
    let server = NotifyServer::new(ServerConfig::from(&settings.server), metrics);
    let bridge = server.spawn_bridge();
    let (addr, handle) = server.listen().await.context("Failed to bind server")?;

    tracing::info!(ws_path = %server.config().ws_path, "ledgerbell listening on http://{addr}");

    let shutdown = server.shutdown();
    shutdown.track("http", handle);
    shutdown.track("bridge", bridge);
    shutdown.wait_for_signal().await;
    let _ = shutdown.drain(DEFAULT_DRAIN_TIMEOUT).await;

    tracing::info!("Shutdown complete");
    Ok(())
}

async fn watch(
    identity: Identity,
    origin: Option<String>,
    audio: AudioArg,
    config: Option<&Path>,
) -> Result<()> {
    let mut settings = load_settings(config)?;
    if let Some(origin) = origin {
        settings.client.origin = origin;
    }
    ledgerbell_core::logging::init_subscriber(&settings.logging.level, settings.logging.json);

    let config = ClientConfig::from_settings(&settings.client).context("Invalid client settings")?;
    let alerter = Alerter::new(audio.output(), &config.tone, config.banner_duration);
    let consumer = Arc::new(EventConsumer::new(
        Arc::new(LogInvalidator),
        alerter,
        LocalEventBus::default(),
    ));

    let mut events = consumer.bus().subscribe();
    let printer = tokio::spawn(async move {
        loop {
            match events.recv().await {
                Ok(ev) => tracing::info!(name = %ev.name, payload = %ev.payload, "local event"),
                Err(RecvError::Lagged(n)) => tracing::warn!(skipped = n, "local event listener lagged"),
                Err(RecvError::Closed) => break,
            }
        }
    });

    let mut status = consumer.status();
    let indicator = tokio::spawn(async move {
        while status.changed().await.is_ok() {
            let current = *status.borrow_and_update();
            tracing::info!(?current, "connection status");
        }
    });

    tracing::info!(
        endpoint = %config.endpoint,
        user_id = %identity.user_id,
        role = %identity.role,
        "watching for events"
    );
    let handle = ledgerbell_client::spawn(config, identity, consumer);

    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for ctrl-c")?;
    tracing::info!("Shutting down...");
    handle.shutdown().await;
    printer.abort();
    indicator.abort();
    Ok(())
}
