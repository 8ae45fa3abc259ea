//! Gunzip stage, a thin wrapper over `async-compression`'s Tokio decoder.

use async_compression::tokio::bufread::GzipDecoder;
use tokio::io::{AsyncRead, BufReader};

/// Wraps `inner` in a streaming gunzip decoder. `async-compression`
/// requires `AsyncBufRead`, so the raw reader is first given a buffer.
pub fn gunzip<R: AsyncRead + Unpin>(inner: R) -> GzipDecoder<BufReader<R>> {
    GzipDecoder::new(BufReader::new(inner))
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_compression::tokio::write::GzipEncoder;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};

    #[tokio::test]
    async fn round_trips_through_gzip() {
        let plaintext = b"the quick brown fox jumps over the lazy dog".to_vec();

        let mut encoder = GzipEncoder::new(Vec::new());
        encoder.write_all(&plaintext).await.unwrap();
        encoder.shutdown().await.unwrap();
        let gz_bytes = encoder.into_inner();

        let mut decoder = gunzip(std::io::Cursor::new(gz_bytes));
        let mut out = Vec::new();
        decoder.read_to_end(&mut out).await.unwrap();
        assert_eq!(out, plaintext);
    }
}
