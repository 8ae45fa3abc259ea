//! The auth middleware. Runs before any handler touches the request body,
//! so a request that fails authentication or authorization never causes
//! the server to emit `100 Continue` or read a byte of the upload.

use std::sync::Arc;

use axum::extract::Extension;
use axum::http::Request;
use axum::middleware::Next;
use axum::response::Response;
use tokio::sync::OnceCell;

use super::{parse_authorization_header, Token};
use crate::error::ServerError;
use crate::{AppState, RequestStateInner};

/// Per-request auth state. Populated at most once, by `apply_auth`;
/// handlers read it back out via the `RequestState` extension to enforce
/// role/project/group checks specific to their route.
///
/// `None` means no `Authorization` header was present (or it was too
/// mangled to even extract a JWT) — handlers report that as
/// `MissingToken`. `Some(Err(_))` means a JWT was present but
/// `Token::verify` rejected it (bad signature, expired) — handlers
/// report the real `ErrorKind` rather than collapsing it to
/// `MissingToken`.
#[derive(Debug)]
pub struct AuthState {
    pub token: OnceCell<Result<Token, ServerError>>,
}

impl AuthState {
    pub fn new() -> Self {
        Self {
            token: OnceCell::new(),
        }
    }

    /// Returns the verified token, or the specific reason it is
    /// unavailable: `MissingToken` if no `Authorization` header named a
    /// JWT at all, or the `Token::verify` failure (`InvalidSignature`,
    /// `Expired`) if one was present but rejected.
    pub fn token(&self) -> Result<&Token, ServerError> {
        match self.token.get() {
            None => Err(ServerError::MissingToken),
            Some(Ok(token)) => Ok(token),
            Some(Err(e)) => Err(e.clone()),
        }
    }
}

/// Extracts the first path segment (`/<pnum>/...`) without routing —
/// this middleware runs ahead of route matching, so it has to parse the
/// URL itself to know which project's secret to verify against.
fn first_path_segment(path: &str) -> Option<&str> {
    path.trim_start_matches('/').split('/').next().filter(|s| !s.is_empty())
}

/// Verifies the `Authorization` header, if present, against the secret
/// for the project named in the URL. Absence of a token or a secret is
/// not itself an error at this layer — handlers that require auth reject
/// a missing token with `MissingToken`; this just makes a verified token
/// available when one was supplied and validates.
pub async fn apply_auth<B>(
    Extension(state): Extension<AppState>,
    req: Request<B>,
    next: Next<B>,
) -> Response {
    let pnum = first_path_segment(req.uri().path());

    // A JWT string extracted from the header is always run through
    // `Token::verify`; the `Result` (success or failure) is stored as-is
    // so a bad signature or expired `exp` surfaces as that error rather
    // than collapsing to `MissingToken`. Only the absence of a usable
    // header at all leaves the cell empty.
    let verified = pnum
        .and_then(|pnum| state.config.jwt_secret_for(pnum))
        .and_then(|secret| {
            req.headers()
                .get("Authorization")
                .and_then(|v| v.to_str().ok())
                .and_then(parse_authorization_header)
                .map(|jwt| Token::verify(&jwt, secret))
        });

    let req_state = Arc::new(RequestStateInner {
        auth: AuthState::new(),
    });
    if let Some(result) = verified {
        if let Err(e) = &result {
            tracing::debug!("rejecting token: {e}");
        }
        req_state.auth.token.set(result).expect("auth state is request-scoped");
    }

    let mut req = req;
    req.extensions_mut().insert(req_state);
    next.run(req).await
}
