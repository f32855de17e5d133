pub mod routes;
pub mod ws;

use crate::state::AppState;
use axum::routing::{get, post};
use axum::Router;
use std::sync::Arc;

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/api/state", get(routes::get_state))
        .route("/api/views/{view}", get(routes::get_view))
        .route("/api/trades", get(routes::get_trades))
        .route("/api/positions", get(routes::get_positions))
        .route("/api/strategies", get(routes::get_strategies))
        .route("/api/strategies/{name}/docs", get(routes::get_strategy_docs))
        .route("/api/alerts", get(routes::get_alerts))
        .route("/api/scope", post(routes::post_scope))
        .route("/api/sort/{table}", post(routes::post_sort))
        .route("/api/counters", get(routes::get_counters))
        .route("/ws", get(ws::ws_handler))
        .layer(
            tower_http::cors::CorsLayer::new()
                .allow_origin(tower_http::cors::Any)
                .allow_methods(tower_http::cors::Any)
                .allow_headers(tower_http::cors::Any),
        )
        .with_state(state)
}
