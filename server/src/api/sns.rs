//! SNS submission upload: `POST/PUT/PATCH /<pnum>/sns/<key_id>/<form_id>`.
//!
//! `<form_id>` names a directory, not the destination file — the
//! client supplies the filename via the `Filename` header, same as the
//! plain streaming endpoint. Every submission is mirrored to a `.tsd`
//! shadow path for internal auditing, and this is the one destination
//! where an empty body is rejected outright.

use axum::extract::{BodyStream, Extension, Path};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;

use ingest_core::ids::{FormId, KeyId, Pnum};
use ingest_core::path::{resolve_sns, resolve_sns_shadow};

use crate::access::Role;
use crate::body::stream_reader;
use crate::error::{ServerError, ServerResult};
use crate::sink;
use crate::transform::{self, Decoded};
use crate::{AppState, RequestState};

pub async fn handle(
    Extension(state): Extension<AppState>,
    Extension(req_state): Extension<RequestState>,
    Path((pnum_raw, key_id_raw, form_id_raw)): Path<(String, String, String)>,
    headers: HeaderMap,
    body: BodyStream,
) -> ServerResult<Response> {
    let token = req_state.auth.token()?;
    let pnum = Pnum::new(pnum_raw)?;
    token.require_project(&pnum)?;
    token.require_role(&[Role::AppUser, Role::AdminUser])?;

    let key_id = KeyId::new(key_id_raw)?;
    let form_id = FormId::new(form_id_raw)?;
    let filename = headers
        .get("Filename")
        .and_then(|v| v.to_str().ok())
        .ok_or(ServerError::MissingFilename)?;

    let dest = resolve_sns(
        &state.config.sns_uploads_root,
        &state.config.uploads_root,
        &pnum,
        &key_id,
        &form_id,
        filename,
    )?;
    let shadow = resolve_sns_shadow(&state.config.sns_uploads_root, &pnum, &key_id, &form_id, filename);

    let (owner_uid, owner_gid) = sink::resolve_owner(token.user())?;

    let content_type = headers
        .get(axum::http::header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok());
    let aes_key = headers.get("Aes-Key").and_then(|v| v.to_str().ok());
    let aes_iv = headers.get("Aes-Iv").and_then(|v| v.to_str().ok());

    let reader = stream_reader(body);
    let decoded = transform::build(&state.config, content_type, aes_key, aes_iv, reader).await?;

    let Decoded::Stream(reader) = decoded else {
        return Err(ServerError::TransformError(
            "tar content-types are not valid for SNS submissions".to_string(),
        ));
    };

    // SNS is the one subtree where an empty body after transform is
    // rejected rather than silently accepted.
    let result = sink::write_atomic(reader, &dest, owner_uid, owner_gid, true).await?;

    if let Some(shadow_dir) = shadow.parent() {
        tokio::fs::create_dir_all(shadow_dir).await?;
    }
    tokio::fs::copy(&dest, &shadow).await?;
    nix::unistd::chown(
        &shadow,
        Some(nix::unistd::Uid::from_raw(owner_uid)),
        Some(nix::unistd::Gid::from_raw(owner_gid)),
    )
    .map_err(|e| ServerError::IOError(e.to_string()))?;

    Ok((
        StatusCode::CREATED,
        Json(serde_json::json!({
            "pnum": pnum.as_str(),
            "key_id": key_id.as_str(),
            "form_id": form_id.as_str(),
            "size": result.bytes_written,
            "md5": result.md5_hex,
        })),
    )
        .into_response())
}
