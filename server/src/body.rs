//! Small adapters between axum's request body types and the
//! `tokio::io::AsyncRead` stages the transform pipeline and sink expect.

use axum::extract::BodyStream;
use futures::StreamExt;
use tokio::io::AsyncRead;
use tokio_util::io::StreamReader;

use crate::error::ServerError;

/// Wraps a request body stream as an `AsyncRead`, mapping axum's body
/// errors (disconnects, malformed chunked framing) into `io::Error` so
/// the transform pipeline and sink see an ordinary I/O failure.
pub fn stream_reader(body: BodyStream) -> impl AsyncRead + Unpin + Send + 'static {
    StreamReader::new(body.map(|r| r.map_err(|e| std::io::Error::new(std::io::ErrorKind::Other, e))))
}

/// Buffers an entire body stream into memory. Only used for resumable
/// chunk bodies, whose size is bounded by the client's own chunk-size
/// choice rather than by the total upload size.
pub async fn body_to_bytes(body: BodyStream) -> Result<Vec<u8>, ServerError> {
    let mut buf = Vec::new();
    tokio::pin!(body);
    while let Some(chunk) = body.next().await {
        let chunk = chunk.map_err(|e| ServerError::IOError(e.to_string()))?;
        buf.extend_from_slice(&chunk);
    }
    Ok(buf)
}
