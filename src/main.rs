mod aggregate;
mod analytics;
mod config;
mod errors;
mod health;
mod poller;
mod server;
mod source;
mod state;
mod store;
mod table;
mod views;

use crate::aggregate::Scope;
use crate::poller::Scheduler;
use crate::source::client::ApiClient;
use crate::source::legacy::LegacyClient;
use crate::source::Feeds;
use crate::state::{AppState, ControlCommand, DashboardSnapshot};
use crate::views::{ViewContext, ViewSettings};
use std::sync::Arc;
use tokio::sync::mpsc;

#[tokio::main]
async fn main() {
    // Structured logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    tracing::info!("strategy monitor starting");

    // Load config
    let cfg = match config::AppConfig::from_env() {
        Ok(c) => c,
        Err(e) => {
            tracing::error!("config error: {e}");
            std::process::exit(1);
        }
    };

    let client = ApiClient::new(&cfg.api_base_url, cfg.request_timeout);
    let feeds = match &cfg.legacy_base_url {
        Some(url) => {
            tracing::info!(url = %url, "reading logs and alerts from legacy server");
            Feeds::Legacy(LegacyClient::new(url, cfg.request_timeout))
        }
        None => Feeds::Files(client.clone()),
    };

    let scope = Scope::from_platform(cfg.default_platform.clone());
    tracing::info!(
        api = %cfg.api_base_url,
        scope = %scope,
        fast_ms = cfg.fast_poll.as_millis() as u64,
        slow_ms = cfg.slow_poll.as_millis() as u64,
        overlap = ?cfg.overlap_policy,
        "config loaded"
    );

    // Create bounded channels
    let (completion_tx, completion_rx) = mpsc::channel(256);
    let (control_tx, control_rx) = mpsc::channel::<ControlCommand>(64);

    // Create shared state
    let app_state = AppState::new(
        client.clone(),
        DashboardSnapshot::new(scope.clone()),
        control_tx.clone(),
    );

    let ctx = Arc::new(ViewContext {
        source: client,
        feeds,
        settings: ViewSettings::from_config(&cfg),
    });
    let scheduler = Scheduler::new(cfg.overlap_policy, completion_tx);

    // ── Spawn tasks ──

    // 1. Store task (sole writer; owns the scheduler and every view task)
    let store = store::Store::new(app_state.clone(), ctx, scheduler, scope);
    let hold_tick = cfg.hold_tick;
    let store_task = tokio::spawn(store::run_store(store, completion_rx, control_rx, hold_tick));

    // 2. Axum HTTP + WS server
    let app = server::router(app_state.clone());
    let addr = format!("0.0.0.0:{}", cfg.server_port);
    tracing::info!("server listening on {addr}");

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .unwrap_or_else(|e| {
            tracing::error!("bind error: {e}");
            std::process::exit(1);
        });

    let serve = axum::serve(listener, app).with_graceful_shutdown(async {
        let _ = tokio::signal::ctrl_c().await;
        tracing::info!("ctrl-c received");
    });
    if let Err(e) = serve.await {
        tracing::error!("server error: {e}");
    }

    // Stop polling; in-flight cycles finish on their own and are discarded
    let _ = control_tx.send(ControlCommand::Shutdown).await;
    let _ = store_task.await;
    tracing::info!("strategy monitor stopped");
}
