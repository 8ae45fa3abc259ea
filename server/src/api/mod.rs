//! C6: the request dispatcher. Binds HTTP methods and routes to the
//! other components, per §4.6's route table.

pub mod export;
pub mod resumables;
pub mod sns;
pub mod stream;
pub mod upload;

use axum::routing::{get, post, put};
use axum::Router;
use tower_http::limit::RequestBodyLimitLayer;

/// Assembles the full route table. `max_body_bytes` caps only the
/// multi-part form-data endpoint — per §6, streaming uploads are
/// unbounded modulo available disk.
pub fn router(max_body_bytes: u64) -> Router {
    let upload_route = Router::new()
        .route(
            "/:pnum/files/upload",
            post(upload::handle).put(upload::handle).patch(upload::handle),
        )
        .route_layer(RequestBodyLimitLayer::new(max_body_bytes as usize));

    Router::new()
        .merge(upload_route)
        .route(
            "/:pnum/files/stream",
            put(stream::handle).post(stream::handle).head(stream::probe),
        )
        .route(
            "/:pnum/files/stream/:filename",
            put(stream::handle_named)
                .post(stream::handle_named)
                .head(stream::probe_named),
        )
        .route(
            "/:pnum/sns/:key_id/:form_id",
            post(sns::handle).put(sns::handle).patch(sns::handle),
        )
        .route(
            "/:pnum/files/resumables",
            get(resumables::query).delete(resumables::abort),
        )
        .route(
            "/:pnum/files/resumables/:filename",
            get(resumables::query_named).delete(resumables::abort_named),
        )
        .route("/:pnum/files/export", get(export::handle))
        .route("/:pnum/files/export/:filename", get(export::handle_named))
}
