//! Host restriction. Authentication and per-request state construction
//! both live in `access::http::apply_auth` — this is the one remaining
//! ambient middleware concern.

use axum::extract::{Extension, Host};
use axum::http::Request;
use axum::middleware::Next;
use axum::response::Response;

use crate::error::{ServerError, ServerResult};
use crate::AppState;

/// Restricts valid `Host` headers when `allowed_hosts` is non-empty. An
/// empty list (the default) allows any host.
pub async fn restrict_host<B>(
    Extension(state): Extension<AppState>,
    Host(host): Host,
    req: Request<B>,
    next: Next<B>,
) -> ServerResult<Response> {
    let allowed = &state.config.allowed_hosts;
    if !allowed.is_empty() && !allowed.iter().any(|h| h == &host) {
        return Err(ServerError::Forbidden);
    }
    Ok(next.run(req).await)
}
