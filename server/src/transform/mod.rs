//! C3: the transform pipeline. Builds a chain of streaming decoders from
//! the request's `Content-Type`, in the declared order from §4.3.

pub mod aes;
pub mod base64_decode;
pub mod gzip;
pub mod pgp;
pub mod tar;

use tokio::io::{AsyncRead, AsyncReadExt};

use crate::config::Config;
use crate::error::ServerError;

/// The closed set of supported content-type pipelines. Built once per
/// request from the `Content-Type` header; adding a new transform is a
/// single new variant plus one line in `build`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Pipeline {
    Identity,
    Aes,
    AesBin,
    Gz,
    GzAes,
    Tar,
    TarGz,
    TarAes,
    TarGzAes,
}

impl Pipeline {
    pub fn from_content_type(content_type: Option<&str>) -> Result<Self, ServerError> {
        let ct = content_type.unwrap_or("application/octet-stream");
        // Ignore any `;`-separated parameters (charset, boundary, etc).
        let ct = ct.split(';').next().unwrap_or(ct).trim();
        match ct {
            "application/octet-stream" | "" => Ok(Self::Identity),
            "application/aes" => Ok(Self::Aes),
            "application/aes-octet-stream" => Ok(Self::AesBin),
            "application/gz" => Ok(Self::Gz),
            "application/gz.aes" => Ok(Self::GzAes),
            "application/tar" => Ok(Self::Tar),
            "application/tar.gz" => Ok(Self::TarGz),
            "application/tar.aes" => Ok(Self::TarAes),
            "application/tar.gz.aes" => Ok(Self::TarGzAes),
            other => Err(ServerError::TransformError(format!(
                "unsupported content-type: {other}"
            ))),
        }
    }

    pub fn is_tar(self) -> bool {
        matches!(self, Self::Tar | Self::TarGz | Self::TarAes | Self::TarGzAes)
    }

    fn needs_aes(self) -> bool {
        matches!(self, Self::Aes | Self::AesBin | Self::GzAes | Self::TarAes | Self::TarGzAes)
    }

    /// Whether the ciphertext arrives base64-encoded (the non-`Bin`
    /// AES variants) rather than raw.
    fn aes_is_base64(self) -> bool {
        matches!(self, Self::Aes | Self::GzAes | Self::TarAes | Self::TarGzAes)
    }

    fn needs_gz(self) -> bool {
        matches!(self, Self::Gz | Self::GzAes | Self::TarGz | Self::TarGzAes)
    }
}

/// The result of applying a pipeline: either a single decoded byte
/// stream destined for one file, or a tar stream destined for fan-out
/// extraction.
pub enum Decoded {
    Stream(Box<dyn AsyncRead + Unpin + Send>),
    Tar(Box<dyn AsyncRead + Unpin + Send>),
}

/// Builds the decoded body for `content_type`, decrypting the `Aes-Key`
/// header (via PGP, then interpreting it per whichever of the two key
/// material modes `aes_iv_header`'s presence selects) when the pipeline
/// calls for it.
pub async fn build(
    config: &Config,
    content_type: Option<&str>,
    aes_key_header: Option<&str>,
    aes_iv_header: Option<&str>,
    body: impl AsyncRead + Unpin + Send + 'static,
) -> Result<Decoded, ServerError> {
    let pipeline = Pipeline::from_content_type(content_type)?;

    let mut reader: Box<dyn AsyncRead + Unpin + Send> = Box::new(body);

    if pipeline.aes_is_base64() {
        reader = Box::new(base64_decode::Base64Decoder::new(reader));
    }

    if pipeline.needs_aes() {
        let key_header = aes_key_header
            .ok_or_else(|| ServerError::TransformError("missing Aes-Key header".to_string()))?;
        let decrypted = pgp::decrypt_header_value(config, key_header).await?;

        let key_material = if let Some(iv_hex) = aes_iv_header {
            aes::key_material_from_hex(&decrypted, iv_hex)?
        } else {
            let mut prefix = vec![0u8; 16];
            reader
                .read_exact(&mut prefix)
                .await
                .map_err(|e| ServerError::TransformError(format!("short ciphertext: {e}")))?;
            aes::key_material_from_passphrase(&decrypted, &prefix)?
        };

        reader = Box::new(aes::AesCbcDecoder::new(reader, &key_material));
    }

    if pipeline.needs_gz() {
        reader = Box::new(gzip::gunzip(reader));
    }

    if pipeline.is_tar() {
        Ok(Decoded::Tar(reader))
    } else {
        Ok(Decoded::Stream(reader))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dispatches_every_declared_content_type() {
        assert_eq!(Pipeline::from_content_type(None).unwrap(), Pipeline::Identity);
        assert_eq!(
            Pipeline::from_content_type(Some("application/octet-stream")).unwrap(),
            Pipeline::Identity
        );
        assert_eq!(Pipeline::from_content_type(Some("application/aes")).unwrap(), Pipeline::Aes);
        assert_eq!(
            Pipeline::from_content_type(Some("application/aes-octet-stream")).unwrap(),
            Pipeline::AesBin
        );
        assert_eq!(Pipeline::from_content_type(Some("application/gz")).unwrap(), Pipeline::Gz);
        assert_eq!(
            Pipeline::from_content_type(Some("application/gz.aes")).unwrap(),
            Pipeline::GzAes
        );
        assert_eq!(Pipeline::from_content_type(Some("application/tar")).unwrap(), Pipeline::Tar);
        assert_eq!(
            Pipeline::from_content_type(Some("application/tar.gz")).unwrap(),
            Pipeline::TarGz
        );
        assert_eq!(
            Pipeline::from_content_type(Some("application/tar.aes")).unwrap(),
            Pipeline::TarAes
        );
        assert_eq!(
            Pipeline::from_content_type(Some("application/tar.gz.aes")).unwrap(),
            Pipeline::TarGzAes
        );
    }

    #[test]
    fn rejects_unknown_content_type() {
        assert!(Pipeline::from_content_type(Some("application/x-mystery")).is_err());
    }

    #[test]
    fn is_tar_covers_all_tar_variants() {
        assert!(Pipeline::Tar.is_tar());
        assert!(Pipeline::TarGz.is_tar());
        assert!(Pipeline::TarAes.is_tar());
        assert!(Pipeline::TarGzAes.is_tar());
        assert!(!Pipeline::Aes.is_tar());
        assert!(!Pipeline::Identity.is_tar());
    }
}
