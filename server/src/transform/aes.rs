//! AES-CBC decryption, in both key-material modes described by §4.3:
//!
//! - `Aes-Iv` present: the (PGP-decrypted) `Aes-Key` header is a
//!   hex-encoded 32-byte key; `Aes-Iv` is a hex-encoded 16-byte IV. The
//!   ciphertext is plain AES-256-CBC, no header.
//! - `Aes-Iv` absent: the `Aes-Key` header is a passphrase. The
//!   ciphertext begins with the OpenSSL `Salted__` magic and an 8-byte
//!   salt, from which the real key and IV are derived via the legacy
//!   `EVP_BytesToKey` (MD5, one iteration) — this is what
//!   `openssl enc -aes-256-cbc -pass ...` produces.

use std::collections::VecDeque;
use std::pin::Pin;
use std::task::{Context, Poll};

use aes::cipher::{BlockDecryptMut, KeyIvInit};
use aes::Aes256;
use cbc::Decryptor as CbcDecryptor;
use md5::{Digest, Md5};
use tokio::io::{AsyncRead, ReadBuf};

use crate::error::ServerError;

const BLOCK_SIZE: usize = 16;
const KEY_LEN: usize = 32;
const IV_LEN: usize = 16;
const SALT_MAGIC: &[u8] = b"Salted__";
const SALT_LEN: usize = 8;

type Aes256CbcDec = CbcDecryptor<Aes256>;

/// Resolved key + IV, ready to build a decryptor from.
pub struct KeyMaterial {
    pub key: [u8; KEY_LEN],
    pub iv: [u8; IV_LEN],
}

/// Derives key material from explicit hex key/IV headers.
pub fn key_material_from_hex(key_hex: &str, iv_hex: &str) -> Result<KeyMaterial, ServerError> {
    let key = hex::decode(key_hex)
        .map_err(|e| ServerError::TransformError(format!("invalid Aes-Key hex: {e}")))?;
    let iv = hex::decode(iv_hex)
        .map_err(|e| ServerError::TransformError(format!("invalid Aes-Iv hex: {e}")))?;

    let key: [u8; KEY_LEN] = key
        .try_into()
        .map_err(|_| ServerError::TransformError("Aes-Key must decode to 32 bytes".to_string()))?;
    let iv: [u8; IV_LEN] = iv
        .try_into()
        .map_err(|_| ServerError::TransformError("Aes-Iv must decode to 16 bytes".to_string()))?;

    Ok(KeyMaterial { key, iv })
}

/// Derives key material from a passphrase and the salt embedded in the
/// ciphertext's leading `Salted__<8-byte-salt>` header, consuming that
/// header from `prefix` in the process.
pub fn key_material_from_passphrase(
    passphrase: &str,
    prefix: &[u8],
) -> Result<KeyMaterial, ServerError> {
    if prefix.len() < SALT_MAGIC.len() + SALT_LEN || &prefix[..SALT_MAGIC.len()] != SALT_MAGIC {
        return Err(ServerError::TransformError(
            "ciphertext missing Salted__ header".to_string(),
        ));
    }
    let salt = &prefix[SALT_MAGIC.len()..SALT_MAGIC.len() + SALT_LEN];
    let derived = evp_bytes_to_key_md5(passphrase.as_bytes(), salt, KEY_LEN + IV_LEN);

    let mut key = [0u8; KEY_LEN];
    let mut iv = [0u8; IV_LEN];
    key.copy_from_slice(&derived[..KEY_LEN]);
    iv.copy_from_slice(&derived[KEY_LEN..KEY_LEN + IV_LEN]);
    Ok(KeyMaterial { key, iv })
}

/// OpenSSL's legacy `EVP_BytesToKey` with MD5 and a single iteration:
/// `D_1 = MD5(passphrase || salt)`, `D_n = MD5(D_{n-1} || passphrase || salt)`,
/// concatenated until `len` bytes are available.
fn evp_bytes_to_key_md5(passphrase: &[u8], salt: &[u8], len: usize) -> Vec<u8> {
    let mut derived = Vec::with_capacity(len + Md5::output_size());
    let mut prev: Vec<u8> = Vec::new();
    while derived.len() < len {
        let mut hasher = Md5::new();
        hasher.update(&prev);
        hasher.update(passphrase);
        hasher.update(salt);
        let digest = hasher.finalize();
        derived.extend_from_slice(&digest);
        prev = digest.to_vec();
    }
    derived.truncate(len);
    derived
}

/// Streaming AES-256-CBC decryptor. Holds back the most recently
/// decrypted block until either more ciphertext arrives or EOF is
/// reached, since only at EOF do we know it is the final block and must
/// have its PKCS#7 padding stripped.
pub struct AesCbcDecoder<R> {
    inner: R,
    decryptor: Aes256CbcDec,
    pending_ciphertext: Vec<u8>,
    held_plaintext_block: Option<[u8; BLOCK_SIZE]>,
    output: VecDeque<u8>,
    eof: bool,
}

impl<R: AsyncRead + Unpin> AesCbcDecoder<R> {
    pub fn new(inner: R, key_material: &KeyMaterial) -> Self {
        let decryptor = Aes256CbcDec::new(&key_material.key.into(), &key_material.iv.into());
        Self {
            inner,
            decryptor,
            pending_ciphertext: Vec::with_capacity(BLOCK_SIZE * 4),
            held_plaintext_block: None,
            output: VecDeque::new(),
            eof: false,
        }
    }

    fn decrypt_ready_blocks(&mut self) -> std::io::Result<()> {
        while self.pending_ciphertext.len() >= BLOCK_SIZE {
            if let Some(prev) = self.held_plaintext_block.take() {
                self.output.extend(prev);
            }
            let mut block: [u8; BLOCK_SIZE] = self.pending_ciphertext[..BLOCK_SIZE]
                .try_into()
                .expect("checked length above");
            self.decryptor
                .decrypt_block_mut((&mut block).into());
            self.held_plaintext_block = Some(block);
            self.pending_ciphertext.drain(..BLOCK_SIZE);
        }
        Ok(())
    }

    fn finish(&mut self) -> std::io::Result<()> {
        if !self.pending_ciphertext.is_empty() {
            return Err(std::io::Error::new(
                std::io::ErrorKind::InvalidData,
                "ciphertext length is not a multiple of the AES block size",
            ));
        }
        if let Some(mut block) = self.held_plaintext_block.take() {
            let pad = *block.last().unwrap() as usize;
            if pad == 0 || pad > BLOCK_SIZE {
                return Err(std::io::Error::new(
                    std::io::ErrorKind::InvalidData,
                    "invalid PKCS#7 padding",
                ));
            }
            let plain_len = BLOCK_SIZE - pad;
            self.output.extend(&block[..plain_len]);
            block.fill(0);
        }
        Ok(())
    }
}

impl<R: AsyncRead + Unpin> AsyncRead for AesCbcDecoder<R> {
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
                        this.finish()?;
                        continue;
                    }
                    this.pending_ciphertext.extend_from_slice(chunk);
                    this.decrypt_ready_blocks()?;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn evp_bytes_to_key_is_deterministic_and_sized() {
        let derived = evp_bytes_to_key_md5(b"tOg1qbyhRMdZLg==", b"01234567", KEY_LEN + IV_LEN);
        assert_eq!(derived.len(), KEY_LEN + IV_LEN);
        let derived2 = evp_bytes_to_key_md5(b"tOg1qbyhRMdZLg==", b"01234567", KEY_LEN + IV_LEN);
        assert_eq!(derived, derived2);
    }

    #[test]
    fn key_material_from_hex_requires_exact_lengths() {
        let key_hex = "ed6d4be32230db647bc63627f98daba0ac1c5d04ab6d1b44b74501ff445ddd97";
        let iv_hex = "a53c9b54b5f84e543b592050c52531ef";
        assert!(key_material_from_hex(key_hex, iv_hex).is_ok());
        assert!(key_material_from_hex("abcd", iv_hex).is_err());
    }

    #[test]
    fn passphrase_mode_requires_salted_header() {
        let err = key_material_from_passphrase("pw", b"not-salted-data-").unwrap_err();
        assert!(matches!(err, ServerError::TransformError(_)));
    }

    #[tokio::test]
    async fn round_trips_a_short_plaintext() {
        use aes::cipher::{BlockEncryptMut, KeyIvInit as _};
        use tokio::io::AsyncReadExt;

        let key = [7u8; KEY_LEN];
        let iv = [9u8; IV_LEN];

        // Encrypt "hello aes cbc!!" (15 bytes) with PKCS#7 padding to one block.
        let plaintext = b"hello aes cbc!!";
        let pad = BLOCK_SIZE - (plaintext.len() % BLOCK_SIZE);
        let mut padded = plaintext.to_vec();
        padded.extend(std::iter::repeat(pad as u8).take(pad));

        let mut encryptor = cbc::Encryptor::<Aes256>::new(&key.into(), &iv.into());
        let mut block: [u8; BLOCK_SIZE] = padded[..BLOCK_SIZE].try_into().unwrap();
        encryptor.encrypt_block_mut((&mut block).into());

        let km = KeyMaterial { key, iv };
        let cursor = std::io::Cursor::new(block.to_vec());
        let mut decoder = AesCbcDecoder::new(cursor, &km);

        let mut out = Vec::new();
        decoder.read_to_end(&mut out).await.unwrap();
        assert_eq!(out, plaintext);
    }
}
