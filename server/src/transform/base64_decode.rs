//! A streaming base64 decoder. `application/aes`, `application/gz.aes`,
//! `application/tar.aes` and `application/tar.gz.aes` all carry
//! base64-encoded ciphertext; this adapter decodes it as bytes arrive
//! rather than requiring the whole body in memory first.

use std::collections::VecDeque;
use std::pin::Pin;
use std::task::{Context, Poll};

use base64::engine::general_purpose::STANDARD as BASE64_STANDARD;
use base64::Engine;
use tokio::io::{AsyncRead, ReadBuf};

pub struct Base64Decoder<R> {
    inner: R,
    leftover: Vec<u8>,
    output: VecDeque<u8>,
    eof: bool,
}

impl<R: AsyncRead + Unpin> Base64Decoder<R> {
    pub fn new(inner: R) -> Self {
        Self {
            inner,
            leftover: Vec::new(),
            output: VecDeque::new(),
            eof: false,
        }
    }
}

impl<R: AsyncRead + Unpin> AsyncRead for Base64Decoder<R> {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<std::io::Result<()>> {
        let this = self.get_mut();

        loop {
            if !this.output.is_empty() {
                let n = std::cmp::min(buf.remaining(), this.output.len());
                let drained: Vec<u8> = this.output.drain(..n).collect();
                buf.put_slice(&drained);
                return Poll::Ready(Ok(()));
            }
            if this.eof {
                return Poll::Ready(Ok(()));
            }

            let mut tmp = [0u8; 8192];
            let mut read_buf = ReadBuf::new(&mut tmp);
            match Pin::new(&mut this.inner).poll_read(cx, &mut read_buf) {
                Poll::Pending => return Poll::Pending,
                Poll::Ready(Err(e)) => return Poll::Ready(Err(e)),
                Poll::Ready(Ok(())) => {
                    let chunk = read_buf.filled();
                    if chunk.is_empty() {
                        this.eof = true;
                        if !this.leftover.is_empty() {
                            let decoded = BASE64_STANDARD.decode(&this.leftover).map_err(|e| {
                                std::io::Error::new(std::io::ErrorKind::InvalidData, e)
                            })?;
                            this.leftover.clear();
                            this.output.extend(decoded);
                        }
                        continue;
                    }

                    this.leftover
                        .extend(chunk.iter().copied().filter(|b| !b.is_ascii_whitespace()));
                    let complete_len = (this.leftover.len() / 4) * 4;
                    if complete_len > 0 {
                        let to_decode: Vec<u8> = this.leftover.drain(..complete_len).collect();
                        let decoded = BASE64_STANDARD.decode(&to_decode).map_err(|e| {
                            std::io::Error::new(std::io::ErrorKind::InvalidData, e)
                        })?;
                        this.output.extend(decoded);
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::AsyncReadExt;

    #[tokio::test]
    async fn decodes_across_chunk_boundaries() {
        let plaintext = b"streaming base64 round trip test, with several bytes";
        let encoded = BASE64_STANDARD.encode(plaintext);

        let cursor = std::io::Cursor::new(encoded.into_bytes());
        let mut decoder = Base64Decoder::new(cursor);

        let mut out = Vec::new();
        decoder.read_to_end(&mut out).await.unwrap();
        assert_eq!(out, plaintext);
    }

    #[tokio::test]
    async fn tolerates_embedded_newlines() {
        let plaintext = b"0123456789abcdef0123456789abcdef";
        let mut encoded = BASE64_STANDARD.encode(plaintext);
        encoded.insert(4, '\n');

        let cursor = std::io::Cursor::new(encoded.into_bytes());
        let mut decoder = Base64Decoder::new(cursor);

        let mut out = Vec::new();
        decoder.read_to_end(&mut out).await.unwrap();
        assert_eq!(out, plaintext);
    }
}
