//! Error handling. Wraps `ingest_core::error::ErrorKind` with the HTTP
//! status mapping from the error taxonomy and a minimal JSON response
//! body — `{"message": ...}`, with no `code`/`error` fields and no stack
//! traces leaked to the client.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;

pub use ingest_core::error::ErrorKind as ServerError;

pub type ServerResult<T> = Result<T, ServerError>;

#[derive(Serialize)]
struct ErrorBody {
    message: String,
}

fn http_status_code(error: &ServerError) -> StatusCode {
    use ServerError::*;
    match error {
        MissingToken => StatusCode::UNAUTHORIZED,
        InvalidSignature => StatusCode::FORBIDDEN,
        Expired => StatusCode::FORBIDDEN,
        WrongProject => StatusCode::UNAUTHORIZED,
        WrongRole => StatusCode::UNAUTHORIZED,
        NotAMember => StatusCode::UNAUTHORIZED,
        InvalidPath(_) => StatusCode::BAD_REQUEST,
        InvalidSnsParam(_) => StatusCode::BAD_REQUEST,
        MissingFilename => StatusCode::BAD_REQUEST,
        EmptyBody => StatusCode::BAD_REQUEST,
        TransformError(_) => StatusCode::BAD_REQUEST,
        ChecksumMismatch => StatusCode::BAD_REQUEST,
        PayloadTooLarge => StatusCode::PAYLOAD_TOO_LARGE,
        ResumableNotFound => StatusCode::NOT_FOUND,
        Forbidden => StatusCode::FORBIDDEN,
        IOError(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl IntoResponse for ServerError {
    fn into_response(self) -> Response {
        if matches!(self, ServerError::IOError(_)) {
            tracing::error!("{}", self);
        } else {
            tracing::debug!("{}", self);
        }

        let status = http_status_code(&self);
        let message = match &self {
            // IOError's Display includes the underlying OS error text,
            // which we don't want to hand back to the client.
            ServerError::IOError(_) => "internal error".to_string(),
            other => other.to_string(),
        };

        (status, Json(ErrorBody { message })).into_response()
    }
}
