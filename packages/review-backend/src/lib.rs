//! HTTP service for spaced-repetition review.
//!
//! - [`services::ReviewService`]: due-set selection, review submission and
//!   lazy creation of review records
//! - [`services::ReviewSession`]: cursor over one learner's due queue
//! - [`db`]: PostgreSQL (server) and SQLite (desktop) stores
//! - [`routes`]: `/review/*` and `/health` endpoints

pub mod auth;
pub mod config;
pub mod core;
pub mod db;
pub mod logging;
pub mod middleware;
pub mod models;
pub mod response;
pub mod routes;
pub mod seed;
pub mod services;
pub mod state;

use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::config::Config;
use crate::db::{Database, DbInitError};
use crate::state::AppState;

pub fn build_app(state: AppState) -> axum::Router {
    routes::router(state)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
}

/// Connects the store, applies migrations and returns the ready router
/// together with its state.
pub async fn create_app(config: Config) -> Result<(axum::Router, AppState), DbInitError> {
    let db = Database::connect(&config.database).await?;
    let state = AppState::new(config, db);
    Ok((build_app(state.clone()), state))
}
