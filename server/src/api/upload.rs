//! Multi-part form-data upload: `POST/PUT/PATCH /<pnum>/files/upload`.
//!
//! Unlike the streaming endpoint, form-data uploads land flat under the
//! project's upload root (no group subdirectory) and are never
//! resumable — see the persisted on-disk layout in §6.

use axum::extract::{Extension, Multipart, Path};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use futures::StreamExt;
use serde::Serialize;
use tokio_util::io::StreamReader;

use ingest_core::ids::Pnum;
use ingest_core::path::resolve_form_upload;

use crate::access::Role;
use crate::error::{ServerError, ServerResult};
use crate::sink;
use crate::{AppState, RequestState};

#[derive(Serialize)]
pub struct UploadedFile {
    pub filename: String,
    pub size: u64,
    pub md5: String,
}

pub async fn handle(
    Extension(state): Extension<AppState>,
    Extension(req_state): Extension<RequestState>,
    Path(pnum_raw): Path<String>,
    mut multipart: Multipart,
) -> ServerResult<impl IntoResponse> {
    let token = req_state.auth.token()?;
    let pnum = Pnum::new(pnum_raw)?;
    token.require_project(&pnum)?;
    token.require_role(&[Role::AppUser, Role::AdminUser])?;

    let (owner_uid, owner_gid) = sink::resolve_owner(token.user())?;

    let mut uploaded = Vec::new();
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ServerError::TransformError(e.to_string()))?
    {
        let filename = field
            .file_name()
            .map(|s| s.to_string())
            .ok_or(ServerError::MissingFilename)?;

        let dest = resolve_form_upload(&state.config.uploads_root, &pnum, &filename)?;
        let reader = StreamReader::new(
            field.map(|r| r.map_err(|e| std::io::Error::new(std::io::ErrorKind::Other, e))),
        );

        let result = sink::write_atomic(reader, &dest, owner_uid, owner_gid, false).await?;
        uploaded.push(UploadedFile {
            filename,
            size: result.bytes_written,
            md5: result.md5_hex,
        });
    }

    Ok((StatusCode::CREATED, Json(uploaded)))
}
