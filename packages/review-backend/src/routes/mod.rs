mod health;
mod review;

use axum::http::StatusCode;
use axum::middleware;
use axum::response::{IntoResponse, Response};
use axum::Router;

use crate::middleware::auth::require_auth;
use crate::response::json_error;
use crate::state::AppState;

/// The review UI calls the bare paths; API clients use the versioned prefix.
const REVIEW_MOUNTS: [&str; 2] = ["/review", "/api/v1/review"];

pub fn router(state: AppState) -> Router {
    let mut app = Router::new();

    for path in REVIEW_MOUNTS {
        app = app.nest(
            path,
            review::router().layer(middleware::from_fn_with_state(
                state.clone(),
                require_auth,
            )),
        );
    }

    app.nest("/health", health::router())
        .fallback(fallback_handler)
        .with_state(state)
}

async fn fallback_handler() -> Response {
    json_error(StatusCode::NOT_FOUND, "NOT_FOUND", "route not found").into_response()
}
