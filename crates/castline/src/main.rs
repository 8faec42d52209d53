use std::path::PathBuf;

use anyhow::{Context, Result};
use castconf::CastConfig;
use castline::session::{SessionHandle, SessionOptions};
use castline::web::{self, AppState};
use castline::{telemetry, FilePersister};
use clap::Parser;
use tokio_util::sync::CancellationToken;

/// Live MP3 ingest relay
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Cli {
    /// Config file to use instead of ./castline.toml
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Port to listen on
    #[arg(short, long)]
    port: Option<u16>,

    /// Interface to bind
    #[arg(long)]
    host: Option<String>,

    /// Directory for recorded segments
    #[arg(short, long)]
    recordings_dir: Option<PathBuf>,

    /// Rotate the buffer to disk after this many milliseconds
    #[arg(long)]
    flush_interval_ms: Option<u64>,

    /// Accept /stream without a prior /start-stream
    #[arg(long)]
    auto_start: bool,

    /// OTLP gRPC endpoint for OpenTelemetry (e.g., "127.0.0.1:4317")
    #[arg(long)]
    otlp_endpoint: Option<String>,

    /// Print the effective configuration as TOML and exit
    #[arg(long)]
    print_config: bool,
}

impl Cli {
    fn apply(self, config: &mut CastConfig) {
        if let Some(port) = self.port {
            config.infra.bind.http_port = port;
        }
        if let Some(host) = self.host {
            config.infra.bind.host = host;
        }
        if let Some(dir) = self.recordings_dir {
            config.infra.paths.recordings_dir = dir;
        }
        if let Some(ms) = self.flush_interval_ms {
            config.session.flush_interval_ms = ms;
        }
        if self.auto_start {
            config.session.auto_start = true;
        }
        if let Some(endpoint) = self.otlp_endpoint {
            config.infra.telemetry.otlp_endpoint = endpoint;
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let print_config = cli.print_config;

    let (mut config, sources) = CastConfig::load_with_sources_from(cli.config.as_deref())
        .context("Failed to load configuration")?;
    cli.apply(&mut config);

    if print_config {
        print!("{}", config.to_toml());
        return Ok(());
    }

    telemetry::init(&config.infra.telemetry).context("Failed to initialize telemetry")?;

    for file in &sources.files {
        tracing::info!(path = %file.display(), "loaded config file");
    }
    if !sources.env_overrides.is_empty() {
        tracing::info!(vars = ?sources.env_overrides, "applied environment overrides");
    }

    let persister = FilePersister::new(&config.infra.paths.recordings_dir);
    persister.ensure_dir().await.with_context(|| {
        format!(
            "Failed to create recordings directory {}",
            persister.dir().display()
        )
    })?;

    let (session, session_task) =
        SessionHandle::spawn(SessionOptions::from(&config.session), persister.clone());

    let app = web::router(AppState::new(session.clone()), config.session.max_chunk_bytes);

    let addr = config.infra.bind.addr();
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;

    tracing::info!("castline listening on http://{}", addr);
    tracing::info!("   Start:  POST http://{}/start-stream", addr);
    tracing::info!("   Ingest: POST http://{}/stream (Content-Type: audio/mpeg)", addr);
    tracing::info!("   End:    POST http://{}/end-stream", addr);
    tracing::info!("   Listen: GET  ws://{}/listen", addr);
    tracing::info!(
        recordings = %persister.dir().display(),
        flush_interval_ms = config.session.flush_interval_ms,
        auto_start = config.session.auto_start,
        "session ready"
    );

    let shutdown = CancellationToken::new();
    tokio::spawn(watch_signals(shutdown.clone()));

    let shutdown_srv = shutdown.clone();
    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            shutdown_srv.cancelled().await;
            tracing::info!("server shutdown signal received");
        })
        .await
        .context("HTTP server failed")?;

    if let Err(e) = session.shutdown().await {
        tracing::error!(error = %e, "failed to flush session on shutdown");
    }
    // Open websockets may still hold handles; the actor must not outlive main
    session_task.abort();

    tracing::info!("shutdown complete");
    telemetry::shutdown();

    Ok(())
}

/// Cancel `token` on SIGINT or SIGTERM.
async fn watch_signals(token: CancellationToken) {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => tracing::info!("received SIGINT, shutting down gracefully"),
        _ = terminate => tracing::info!("received SIGTERM, shutting down gracefully"),
    }
    token.cancel();
}
