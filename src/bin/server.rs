//! smart-edu server: browser UI + JSON API over an OpenAI-compatible backend.
//!
//! Usage:
//!   OPENAI_API_KEY=... OPENAI_BASE_URL=https://api.openai.com/v1 smart-edu
//!
//! Or with args:
//!   smart-edu --bind 0.0.0.0:7860 --settings ./settings.json

use anyhow::Context;
use clap::Parser;
use smart_edu_lib::app_state::prune_loop;
use smart_edu_lib::http_server::{router, AppState};
use smart_edu_lib::settings::{Settings, BIND_VAR, DEFAULT_BIND};
use std::path::PathBuf;
use std::time::Duration;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser, Debug)]
#[command(name = "smart-edu", version, about = "Digest, Q&A and quizzes for uploaded study material")]
struct Args {
    /// Address to listen on (default: $SMART_EDU_BIND or 127.0.0.1:7860)
    #[arg(long)]
    bind: Option<String>,

    /// JSON file with model and limit settings
    #[arg(long)]
    settings: Option<PathBuf>,
}

fn init_tracing() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "smart_edu=info,smart_edu_lib=info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();
    let args = Args::parse();

    let settings = Settings::from_env(args.settings.as_deref()).context("Invalid configuration")?;
    tracing::info!(
        base_url = %settings.base_url,
        api_key = %settings.masked_api_key(),
        chat_model = %settings.tunables.chat_model,
        transcription_model = %settings.tunables.transcription_model,
        "configuration loaded"
    );

    let bind_addr = args
        .bind
        .or_else(|| std::env::var(BIND_VAR).ok())
        .unwrap_or_else(|| DEFAULT_BIND.to_string());

    let state = AppState::from_settings(&settings).context("Failed to build API client")?;

    let prune_every = settings.session_ttl().min(Duration::from_secs(600)).max(Duration::from_secs(1));
    tokio::spawn(prune_loop(state.sessions.clone(), prune_every));

    let app = router(state, settings.max_upload_bytes());

    let listener = tokio::net::TcpListener::bind(&bind_addr)
        .await
        .with_context(|| format!("Failed to bind to {}", bind_addr))?;

    tracing::info!("Listening on http://{}", bind_addr);
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutting down");
}
