//! C7: export reader. `GET /<pnum>/files/export[/<filename>]` — a missing
//! filename lists immediate children of the export root; a present one
//! streams that file.

use axum::body::StreamBody;
use axum::extract::{Extension, Path};
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use tokio_util::io::ReaderStream;

use ingest_core::ids::Pnum;
use ingest_core::path::resolve_export;

use crate::access::Role;
use crate::error::{ServerError, ServerResult};
use crate::{AppState, RequestState};

pub async fn handle(
    Extension(state): Extension<AppState>,
    Extension(req_state): Extension<RequestState>,
    Path(pnum_raw): Path<String>,
) -> ServerResult<Response> {
    list_or_download(state, req_state, pnum_raw, None).await
}

pub async fn handle_named(
    Extension(state): Extension<AppState>,
    Extension(req_state): Extension<RequestState>,
    Path((pnum_raw, filename)): Path<(String, String)>,
) -> ServerResult<Response> {
    list_or_download(state, req_state, pnum_raw, Some(filename)).await
}

async fn list_or_download(
    state: AppState,
    req_state: RequestState,
    pnum_raw: String,
    filename: Option<String>,
) -> ServerResult<Response> {
    let token = req_state.auth.token()?;
    let pnum = Pnum::new(pnum_raw)?;
    token.require_project(&pnum)?;
    token.require_role(&[Role::ExportUser, Role::AdminUser])?;

    let dest = resolve_export(&state.config.export_root, &pnum, filename.as_deref())?;

    match filename {
        None => {
            let mut entries = tokio::fs::read_dir(&dest).await?;
            let mut files = Vec::new();
            while let Some(entry) = entries.next_entry().await? {
                let meta = entry.metadata().await?;
                if !meta.is_file() {
                    continue;
                }
                let mtime = meta
                    .modified()
                    .ok()
                    .and_then(|t| t.duration_since(std::time::UNIX_EPOCH).ok())
                    .map(|d| d.as_secs())
                    .unwrap_or(0);
                files.push(serde_json::json!({
                    "name": entry.file_name().to_string_lossy(),
                    "size": meta.len(),
                    "mtime": mtime,
                }));
            }
            Ok(Json(serde_json::json!({"files": files})).into_response())
        }
        Some(_) => {
            // A symlink landing back inside the export root is followed
            // like any other file; one whose target escapes it is
            // rejected, even though `resolve_export` already confirmed
            // containment for the path as it existed at resolution time.
            let link_meta = tokio::fs::symlink_metadata(&dest).await?;
            if link_meta.file_type().is_symlink() {
                let root = state
                    .config
                    .export_root
                    .get(pnum.as_str())
                    .ok_or(ServerError::Forbidden)?;
                let canon_root = tokio::fs::canonicalize(root).await?;
                let canon_target = tokio::fs::canonicalize(&dest).await?;
                if !canon_target.starts_with(&canon_root) {
                    return Err(ServerError::Forbidden);
                }
            }

            // Follows the symlink (if any) for the real file's size, since
            // `symlink_metadata` above reports the link's own size.
            let meta = tokio::fs::metadata(&dest).await?;
            let file = tokio::fs::File::open(&dest).await?;
            let len = meta.len();
            let body = StreamBody::new(ReaderStream::new(file));

            Ok((StatusCode::OK, [(header::CONTENT_LENGTH, len.to_string())], body).into_response())
        }
    }
}
