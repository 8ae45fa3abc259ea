//! C8: decrypts the PGP-encrypted value of the `Aes-Key` header.
//!
//! There is no actively maintained pure-Rust OpenPGP decryption crate in
//! this dependency family, and the config surface (`gpg_binary`,
//! `gpg_homedir`, `gpg_keyring`, `gpg_secring`) only makes sense if
//! decryption actually goes through the `gpg` CLI — this mirrors the
//! original implementation's use of `python-gnupg`, itself a wrapper
//! around the same binary.

use std::process::Stdio;

use base64::engine::general_purpose::STANDARD as BASE64_STANDARD;
use base64::Engine;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;

use crate::config::Config;
use crate::error::ServerError;

/// Decrypts a base64-encoded PGP message using the server's configured
/// keypair, returning the decrypted value as a UTF-8 string (the
/// plaintext is either a hex key or a passphrase, both ASCII).
pub async fn decrypt_header_value(config: &Config, encoded: &str) -> Result<String, ServerError> {
    let ciphertext = BASE64_STANDARD
        .decode(encoded.trim())
        .map_err(|e| ServerError::TransformError(format!("invalid base64 in Aes-Key header: {e}")))?;

    let mut child = Command::new(&config.gpg_binary)
        .arg("--homedir")
        .arg(&config.gpg_homedir)
        .arg("--no-default-keyring")
        .arg("--keyring")
        .arg(&config.gpg_keyring)
        .arg("--secret-keyring")
        .arg(&config.gpg_secring)
        .arg("--local-user")
        .arg(&config.public_key_id)
        .arg("--batch")
        .arg("--yes")
        .arg("--quiet")
        .arg("--decrypt")
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .map_err(|e| ServerError::IOError(e.to_string()))?;

    {
        let mut stdin = child
            .stdin
            .take()
            .ok_or_else(|| ServerError::IOError("gpg child has no stdin".to_string()))?;
        stdin
            .write_all(&ciphertext)
            .await
            .map_err(|e| ServerError::IOError(e.to_string()))?;
    }

    let output = child
        .wait_with_output()
        .await
        .map_err(|e| ServerError::IOError(e.to_string()))?;

    if !output.status.success() {
        return Err(ServerError::TransformError(format!(
            "gpg decryption failed: {}",
            String::from_utf8_lossy(&output.stderr)
        )));
    }

    String::from_utf8(output.stdout)
        .map_err(|e| ServerError::TransformError(format!("gpg output was not valid UTF-8: {e}")))
        .map(|s| s.trim().to_string())
}
