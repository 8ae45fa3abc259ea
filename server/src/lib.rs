#![deny(
    asm_sub_register,
    deprecated,
    missing_abi,
    unsafe_code,
    unused_macros,
    unused_must_use,
    unused_unsafe
)]
#![cfg_attr(not(debug_assertions), deny(unused_imports, unused_mut, unused_variables))]

pub mod access;
pub mod api;
mod body;
pub mod config;
pub mod error;
mod middleware;
pub mod resumable;
pub mod sink;
pub mod transform;

use std::sync::Arc;

use anyhow::Result;
use axum::extract::Extension;
use axum::Router;
use tower_http::catch_panic::CatchPanicLayer;
use tower_http::trace::TraceLayer;

use access::http::{apply_auth, AuthState};
use config::Config;
use middleware::restrict_host;
use resumable::ResumableManager;

pub type AppState = Arc<AppStateInner>;
pub type RequestState = Arc<RequestStateInner>;

/// Global, immutable-after-startup server state.
pub struct AppStateInner {
    pub config: Config,
    pub resumable: ResumableManager,
}

/// Per-request state threaded through the middleware stack. Auth is the
/// only thing that survives past `apply_auth` — everything else the
/// handlers need (destination, pipeline) is derived fresh per request.
#[derive(Debug)]
pub struct RequestStateInner {
    pub auth: AuthState,
}

impl AppStateInner {
    pub fn new(config: Config) -> AppState {
        let resumable = ResumableManager::new(config.resumable_ttl_seconds);
        Arc::new(Self { config, resumable })
    }
}

/// Assembles the router over an already-constructed `AppState`. Split out
/// from `run_api_server` so integration tests can drive the exact same
/// middleware stack with `tower::ServiceExt::oneshot` instead of binding a
/// real listener.
pub fn app(state: AppState) -> Router {
    let max_body_bytes = state.config.max_body_bytes;
    Router::new()
        .merge(api::router(max_body_bytes))
        .layer(axum::middleware::from_fn(apply_auth))
        .layer(axum::middleware::from_fn(restrict_host))
        .layer(Extension(state))
        .layer(CatchPanicLayer::new())
        .layer(TraceLayer::new_for_http())
}

/// Assembles the router, starts the resumable sweeper, and serves until
/// the process is terminated.
pub async fn run_api_server(config: Config) -> Result<()> {
    let listen = config.listen_addr();
    let uploads_roots: Vec<_> = config.uploads_root.values().cloned().collect();
    let state = AppStateInner::new(config);

    tokio::spawn({
        let state = state.clone();
        async move {
            state.resumable.run_sweeper(uploads_roots).await;
        }
    });

    let app = app(state);

    tracing::info!("listening on {listen}");
    axum::Server::bind(&listen).serve(app.into_make_service()).await?;

    Ok(())
}
