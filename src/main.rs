use bg_eraser::config::AppConfig;
use bg_eraser::infrastructure::{remover, storage};
use bg_eraser::services::worker::RetentionSweeper;
use bg_eraser::{AppState, create_app};
use clap::Parser;
use dotenvy::dotenv;
use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;
use std::time::Duration;
use tokio::signal;
use tower_http::trace::TraceLayer;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Address to bind the web server to
    #[arg(long, default_value = "127.0.0.1")]
    host: IpAddr,

    /// Port for the web server
    #[arg(short, long, default_value_t = 8000)]
    port: u16,

    /// Staging directory (overrides STAGING_DIR)
    #[arg(long)]
    staging_dir: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // 1. Environment & logging
    dotenv().ok();
    let args = Args::parse();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "bg_eraser=info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("🚀 Starting Background Eraser...");

    let mut config = AppConfig::from_env();
    if let Some(dir) = args.staging_dir {
        config.staging_dir = dir;
    }
    info!(
        "🛡️  Config: Max Upload={}MB, Remover={}, Model Timeout={}s, Retention={}",
        config.max_upload_size / 1024 / 1024,
        config.remover_type,
        config.model_timeout_secs,
        config
            .output_retention_hours
            .map(|h| format!("{}h", h))
            .unwrap_or_else(|| "keep forever".to_string())
    );

    // 2. Infrastructure
    let store = storage::setup_storage(&config).await?;
    let remover = remover::setup_remover(&config).await;

    // 3. Shutdown channel & retention sweeper
    let (shutdown_tx, shutdown_rx) = tokio::sync::watch::channel(false);

    if let Some(hours) = config.output_retention_hours {
        let sweeper = RetentionSweeper::new(
            store.clone(),
            hours,
            Duration::from_secs(config.sweep_interval_secs),
            shutdown_rx.clone(),
        );
        tokio::spawn(sweeper.run());
        info!("👷 Retention sweeper initialized.");
    } else {
        tracing::warn!("No OUTPUT_RETENTION_HOURS set; processed images are kept until removed by hand.");
    }

    // 4. HTTP server
    let state = AppState::new(store, remover, config);

    let trace_layer = TraceLayer::new_for_http()
        .make_span_with(|request: &axum::http::Request<_>| {
            let request_id = request
                .headers()
                .get("x-request-id")
                .and_then(|v| v.to_str().ok())
                .unwrap_or("unknown");
            tracing::info_span!(
                "http_request",
                method = %request.method(),
                uri = %request.uri(),
                request_id = %request_id,
            )
        })
        .on_request(|request: &axum::http::Request<_>, _span: &tracing::Span| {
            info!("📥 {} {}", request.method(), request.uri());
        })
        .on_response(
            |response: &axum::http::Response<_>, latency: Duration, _span: &tracing::Span| {
                info!(
                    "📤 Finished in {:?} with status {}",
                    latency,
                    response.status()
                );
            },
        );

    let app = create_app(state).layer(trace_layer);
    let addr = SocketAddr::new(args.host, args.port);
    let listener = tokio::net::TcpListener::bind(addr).await?;

    info!("✅ Server ready at http://{}", addr);

    if let Err(e) = axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
    {
        error!("❌ Server runtime error: {}", e);
    }

    let _ = shutdown_tx.send(true);
    info!("👋 Background Eraser exited cleanly.");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("⌨️  Ctrl+C received, starting graceful shutdown...");
        },
        _ = terminate => {
            info!("💤 SIGTERM received, starting graceful shutdown...");
        },
    }
}
