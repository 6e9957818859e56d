use axum::body::Body;
use axum::extract::State;
use axum::http::Request;
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};

use crate::auth::{extract_token, verify_token, AuthUser};
use crate::response::AppError;
use crate::state::AppState;

/// Learner that owns every request when the app runs as a single-user
/// desktop build.
pub const DESKTOP_LEARNER_ID: &str = "1";

pub async fn require_auth(
    State(state): State<AppState>,
    mut req: Request<Body>,
    next: Next,
) -> Response {
    if state.config().desktop_mode {
        req.extensions_mut().insert(AuthUser::new(DESKTOP_LEARNER_ID));
        return next.run(req).await;
    }

    let Some(token) = extract_token(req.headers()) else {
        return AppError::unauthorized("missing authentication token").into_response();
    };

    let Some(secret) = state.config().jwt_secret.as_deref() else {
        tracing::error!("JWT_SECRET is not configured; rejecting authenticated request");
        return AppError::unauthorized("authentication is not configured").into_response();
    };

    match verify_token(&token, secret) {
        Ok(user) => {
            req.extensions_mut().insert(user);
            next.run(req).await
        }
        Err(err) => {
            tracing::debug!(error = %err, "token rejected");
            AppError::unauthorized("authentication failed, please sign in again").into_response()
        }
    }
}
