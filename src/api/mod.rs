//! HTTP surface over the engines.
pub mod auth;
pub mod dto;
pub mod error;
pub mod routes;
pub mod state;

use axum::{
    Router,
    routing::{get, post, put},
};
use tower_http::trace::TraceLayer;

pub use state::AppState;

pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(routes::health))
        .route("/provider", post(routes::register_provider))
        .route(
            "/provider/carried-over-power-gen-amount",
            get(routes::carried_over),
        )
        .route("/consumer", post(routes::register_consumer))
        .route("/plant", post(routes::register_plant))
        .route("/plant/:plant_id", put(routes::update_plant))
        .route(
            "/power-generation",
            get(routes::list_power_generations).post(routes::record_power_generation),
        )
        .route("/rego", get(routes::list_rego))
        .route("/rego/issue", post(routes::issue_rego))
        .route("/rego/sell", post(routes::sell_rego))
        .route("/rego/expire", post(routes::expire_rego))
        .route("/rego-trade-info", get(routes::list_trades))
        .route("/rego-trade-info/buying", post(routes::request_buying))
        .route("/rego-trade-info/accept", post(routes::accept_trade))
        .route("/rego-trade-info/refuse", post(routes::refuse_trade))
        .route("/rego-trade-info/cancel", put(routes::cancel_trade))
        .route("/buying-rego", get(routes::list_buying_rego))
        .route("/rego-confirmation", get(routes::list_confirmations))
        .route("/rego-confirmation/issue", post(routes::issue_confirmation))
        .route(
            "/rego-confirmation/:confirmation_id",
            get(routes::confirmation_detail),
        )
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
