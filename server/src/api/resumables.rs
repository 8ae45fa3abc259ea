//! Introspect/abort resumables: `GET/DELETE /<pnum>/files/resumables[/<filename>]`.
//!
//! The filename path segment exists for symmetry with the streaming
//! endpoint but carries no additional lookup power over `id` — a given
//! `upload_id` already uniquely names one resumable.

use axum::extract::{Extension, Path, Query};
use axum::http::StatusCode;
use axum::Json;
use serde::Deserialize;
use uuid::Uuid;

use ingest_core::ids::Pnum;

use crate::access::Role;
use crate::error::{ServerError, ServerResult};
use crate::{AppState, RequestState};

#[derive(Debug, Deserialize)]
pub struct ResumablesQuery {
    pub id: Option<Uuid>,
}

async fn resolve_root<'a>(state: &'a AppState, pnum: &Pnum) -> ServerResult<&'a std::path::Path> {
    state
        .config
        .uploads_root
        .get(pnum.as_str())
        .map(|p| p.as_path())
        .ok_or_else(|| ServerError::InvalidPath(format!("project not configured: {pnum}")))
}

pub async fn query(
    Extension(state): Extension<AppState>,
    Extension(req_state): Extension<RequestState>,
    Path(pnum_raw): Path<String>,
    Query(q): Query<ResumablesQuery>,
) -> ServerResult<Json<serde_json::Value>> {
    let token = req_state.auth.token()?;
    let pnum = Pnum::new(pnum_raw)?;
    token.require_project(&pnum)?;
    token.require_role(&[Role::AppUser, Role::AdminUser])?;

    let id = q.id.ok_or(ServerError::ResumableNotFound)?;
    let root = resolve_root(&state, &pnum).await?;
    let (filename, max_chunk) = state.resumable.query(root, id).await?;
    Ok(Json(serde_json::json!({"id": id, "filename": filename, "max_chunk": max_chunk})))
}

pub async fn query_named(
    state: Extension<AppState>,
    req_state: Extension<RequestState>,
    Path((pnum_raw, _filename)): Path<(String, String)>,
    q: Query<ResumablesQuery>,
) -> ServerResult<Json<serde_json::Value>> {
    query(state, req_state, Path(pnum_raw), q).await
}

pub async fn abort(
    Extension(state): Extension<AppState>,
    Extension(req_state): Extension<RequestState>,
    Path(pnum_raw): Path<String>,
    Query(q): Query<ResumablesQuery>,
) -> ServerResult<StatusCode> {
    let token = req_state.auth.token()?;
    let pnum = Pnum::new(pnum_raw)?;
    token.require_project(&pnum)?;
    token.require_role(&[Role::AppUser, Role::AdminUser])?;

    let id = q.id.ok_or(ServerError::ResumableNotFound)?;
    let root = resolve_root(&state, &pnum).await?;
    state.resumable.abort(root, id).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn abort_named(
    state: Extension<AppState>,
    req_state: Extension<RequestState>,
    Path((pnum_raw, _filename)): Path<(String, String)>,
    q: Query<ResumablesQuery>,
) -> ServerResult<StatusCode> {
    abort(state, req_state, Path(pnum_raw), q).await
}
