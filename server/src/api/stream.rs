//! Streaming upload endpoint: `PUT/POST /<pnum>/files/stream[/<filename>]`.
//!
//! With no `chunk` query parameter this runs the full transform+sink
//! pipeline directly over the request body. With `chunk=<n>` it stores one
//! resumable chunk; `chunk=end` triggers the merge. See §4.5 and §4.6.

use axum::extract::{BodyStream, Extension, Path, Query};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Deserialize;
use uuid::Uuid;

use ingest_core::ids::{GroupName, Pnum};
use ingest_core::path::resolve_upload;

use crate::access::Role;
use crate::body::{body_to_bytes, stream_reader};
use crate::error::{ServerError, ServerResult};
use crate::sink;
use crate::transform::{self, Decoded};
use crate::{AppState, RequestState};

#[derive(Debug, Deserialize)]
pub struct StreamQuery {
    pub chunk: Option<String>,
    pub id: Option<Uuid>,
    #[serde(default)]
    pub new: bool,
    pub group: Option<String>,
}

pub async fn handle(
    Extension(state): Extension<AppState>,
    Extension(req_state): Extension<RequestState>,
    Path(pnum_raw): Path<String>,
    Query(query): Query<StreamQuery>,
    headers: HeaderMap,
    body: BodyStream,
) -> ServerResult<Response> {
    let filename = headers
        .get("Filename")
        .and_then(|v| v.to_str().ok())
        .map(|s| s.to_string())
        .ok_or(ServerError::MissingFilename)?;
    process(state, req_state, pnum_raw, filename, query, headers, body).await
}

pub async fn handle_named(
    Extension(state): Extension<AppState>,
    Extension(req_state): Extension<RequestState>,
    Path((pnum_raw, filename)): Path<(String, String)>,
    Query(query): Query<StreamQuery>,
    headers: HeaderMap,
    body: BodyStream,
) -> ServerResult<Response> {
    process(state, req_state, pnum_raw, filename, query, headers, body).await
}

async fn process(
    state: AppState,
    req_state: RequestState,
    pnum_raw: String,
    filename: String,
    query: StreamQuery,
    headers: HeaderMap,
    body: BodyStream,
) -> ServerResult<Response> {
    let token = req_state.auth.token()?;
    let pnum = Pnum::new(pnum_raw)?;
    token.require_project(&pnum)?;
    token.require_role(&[Role::AppUser, Role::AdminUser])?;

    let group = match &query.group {
        Some(raw) => {
            let group = GroupName::new(raw.clone())?;
            if !group.belongs_to(&pnum) {
                return Err(ServerError::WrongProject);
            }
            token.require_member(&group)?;
            Some(group)
        }
        None => None,
    };

    let dest = resolve_upload(&state.config.uploads_root, &pnum, group.as_ref(), &filename)?;
    let (owner_uid, primary_gid) = sink::resolve_owner(token.user())?;
    let owner_gid = match &group {
        Some(g) => sink::resolve_group_gid(g.as_str())?,
        None => primary_gid,
    };

    if let Some(chunk_param) = &query.chunk {
        let root = state
            .config
            .uploads_root
            .get(pnum.as_str())
            .ok_or_else(|| ServerError::InvalidPath(format!("project not configured: {pnum}")))?;

        if chunk_param == "end" {
            let id = query.id.ok_or(ServerError::ResumableNotFound)?;
            let client_md5 = headers
                .get("Content-MD5")
                .and_then(|v| v.to_str().ok())
                .map(|s| s.to_string());

            let result = state
                .resumable
                .merge(root, id, &dest, owner_uid, owner_gid, client_md5.as_deref())
                .await?;

            return Ok((
                StatusCode::CREATED,
                Json(serde_json::json!({
                    "id": id,
                    "filename": filename,
                    "md5": result.md5_hex,
                })),
            )
                .into_response());
        }

        let n: u32 = chunk_param
            .parse()
            .map_err(|_| ServerError::InvalidPath(format!("invalid chunk number: {chunk_param}")))?;

        let id = state
            .resumable
            .begin(
                root,
                pnum.as_str(),
                group.as_ref().map(|g| g.as_str()),
                &filename,
                query.id,
                query.new,
            )
            .await?;

        let bytes = body_to_bytes(body).await?;
        state.resumable.put_chunk(root, id, n, &bytes).await?;

        return Ok((StatusCode::CREATED, Json(serde_json::json!({"id": id, "chunk": n}))).into_response());
    }

    let content_type = headers
        .get(axum::http::header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok());
    let aes_key = headers.get("Aes-Key").and_then(|v| v.to_str().ok());
    let aes_iv = headers.get("Aes-Iv").and_then(|v| v.to_str().ok());

    let reader = stream_reader(body);
    let decoded = transform::build(&state.config, content_type, aes_key, aes_iv, reader).await?;

    match decoded {
        Decoded::Stream(reader) => {
            let result = sink::write_atomic(reader, &dest, owner_uid, owner_gid, false).await?;
            Ok((
                StatusCode::CREATED,
                Json(serde_json::json!({
                    "filename": filename,
                    "size": result.bytes_written,
                    "md5": result.md5_hex,
                })),
            )
                .into_response())
        }
        Decoded::Tar(reader) => {
            let dest_dir = dest
                .parent()
                .ok_or_else(|| ServerError::InvalidPath("destination has no parent directory".to_string()))?;
            let entries = transform::tar::extract_tar(reader, dest_dir, owner_uid, owner_gid).await?;
            Ok((StatusCode::CREATED, Json(serde_json::json!({"entries": entries.len()}))).into_response())
        }
    }
}

/// `HEAD /<pnum>/files/stream`: 401 unauthenticated (via `apply_auth`
/// never populating a token), 400 if authenticated but missing the
/// `Filename` header, 201 if the equivalent POST would succeed.
pub async fn probe(
    Extension(_state): Extension<AppState>,
    Extension(req_state): Extension<RequestState>,
    Path(pnum_raw): Path<String>,
    headers: HeaderMap,
) -> ServerResult<StatusCode> {
    let token = req_state.auth.token()?;
    let pnum = Pnum::new(pnum_raw)?;
    token.require_project(&pnum)?;
    token.require_role(&[Role::AppUser, Role::AdminUser])?;

    if headers.get("Filename").is_none() {
        return Err(ServerError::MissingFilename);
    }
    Ok(StatusCode::CREATED)
}

pub async fn probe_named(
    Extension(_state): Extension<AppState>,
    Extension(req_state): Extension<RequestState>,
    Path((pnum_raw, _filename)): Path<(String, String)>,
) -> ServerResult<StatusCode> {
    let token = req_state.auth.token()?;
    let pnum = Pnum::new(pnum_raw)?;
    token.require_project(&pnum)?;
    token.require_role(&[Role::AppUser, Role::AdminUser])?;
    Ok(StatusCode::CREATED)
}
