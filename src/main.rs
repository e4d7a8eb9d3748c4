// =============================================================================
// Flowgate — Main Entry Point
// =============================================================================
//
// Boot sequence mirrors the teacher's `main.rs`: load config, build the
// shared state container, spawn background workers, serve the HTTP API,
// then wait for Ctrl+C and persist state on shutdown.
// =============================================================================

// ── Module declarations ──────────────────────────────────────────────────────
mod api;
mod app_state;
mod audit;
mod broker;
mod config;
mod confluence;
mod context_cache;
mod context_store;
mod dedup;
mod error;
mod exit;
mod gex;
mod market_quote;
mod observability;
mod orchestrator;
mod pipeline;
mod position_manager;
mod risk;
mod sizing;
mod types;
mod webhook;

use std::sync::Arc;

use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use crate::api::rest::ApiState;
use crate::app_state::CoreContext;
use crate::broker::paper::PaperAdapter;
use crate::broker::{live::LiveAdapter, Adapter};
use crate::config::Config;
use crate::exit::worker::ExitWorker;
use crate::market_quote::MarketQuoteClient;

const DEFAULT_CONFIG_PATH: &str = "flowgate_config.json";

fn build_adapter() -> Adapter {
    match std::env::var("FLOWGATE_BROKER_MODE").unwrap_or_else(|_| "paper".to_string()).as_str() {
        "live" => {
            let api_key = std::env::var("FLOWGATE_BROKER_API_KEY").unwrap_or_default();
            let secret = std::env::var("FLOWGATE_BROKER_SECRET").unwrap_or_default();
            let base_url = std::env::var("FLOWGATE_BROKER_URL")
                .unwrap_or_else(|_| "https://broker.example".to_string());
            warn!("broker adapter mode = LIVE — real orders will be submitted");
            Adapter::Live(LiveAdapter::new("live-broker", api_key, secret, base_url))
        }
        _ => {
            info!("broker adapter mode = PAPER — orders are simulated");
            Adapter::Paper(PaperAdapter::new())
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // ── 1. Environment & config ──────────────────────────────────────────
    let _ = dotenv::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    info!("╔══════════════════════════════════════════════════════════╗");
    info!("║                Flowgate — Starting Up                    ║");
    info!("╚══════════════════════════════════════════════════════════╝");

    let config_path =
        std::env::var("FLOWGATE_CONFIG_PATH").unwrap_or_else(|_| DEFAULT_CONFIG_PATH.to_string());
    let config = Config::load(&config_path).unwrap_or_else(|e| {
        warn!(error = %e, path = %config_path, "failed to load config, using defaults");
        Config::default()
    });

    // ── 2. Build shared state ────────────────────────────────────────────
    let adapter = build_adapter();
    let ctx = Arc::new(CoreContext::new(config, adapter));

    info!(adapter = %ctx.adapter.name(), mode = ?ctx.adapter.mode(), "decision pipeline wired");

    // ── 3. Build the quote client + exit worker ──────────────────────────
    let quote_base_url =
        std::env::var("FLOWGATE_QUOTE_URL").unwrap_or_else(|_| "https://quotes.example".to_string());
    let quote_client = Arc::new(MarketQuoteClient::new(quote_base_url));
    let exit_worker = Arc::new(ExitWorker::new(ctx.clone(), market_quote::fetcher(quote_client)));

    // ── 4. Spawn the exit worker sweep loop ──────────────────────────────
    {
        let worker = exit_worker.clone();
        tokio::spawn(async move { worker.run().await });
    }

    // ── 5. Start the API server ──────────────────────────────────────────
    let api_state = Arc::new(ApiState {
        ctx: ctx.clone(),
        exit_worker: exit_worker.clone(),
    });
    let bind_addr =
        std::env::var("FLOWGATE_BIND_ADDR").unwrap_or_else(|_| "0.0.0.0:3001".into());

    tokio::spawn(async move {
        let app = api::rest::router(api_state);
        let listener = tokio::net::TcpListener::bind(&bind_addr)
            .await
            .expect("failed to bind API server");
        info!(addr = %bind_addr, "API server listening");
        axum::serve(listener, app).await.expect("API server failed");
    });

    info!("All subsystems running. Press Ctrl+C to stop.");

    // ── 6. Graceful shutdown ─────────────────────────────────────────────
    tokio::signal::ctrl_c().await?;
    warn!("shutdown signal received — stopping gracefully");

    if let Err(e) = ctx.config.read().save(&config_path) {
        error!(error = %e, "failed to save config on shutdown");
    }

    info!("Flowgate shut down complete.");
    Ok(())
}
