//! Tar-extract fan-out sink. Unlike the other transform stages, this one
//! does not produce a single byte stream — it produces one file per tar
//! entry, each placed under the resolved destination directory. Regular
//! files only; symlinks, devices and hardlinks are rejected outright.

use std::path::{Path, PathBuf};

use async_tar::{Archive, EntryType};
use futures::StreamExt;
use tokio::io::AsyncRead;

use ingest_core::util::sanitize_filename;

use crate::error::ServerError;
use crate::sink;

pub struct ExtractedEntry {
    pub path: PathBuf,
    pub size: u64,
}

/// Extracts every regular-file entry in the tar stream `reader` into
/// `dest_dir`, owned by `owner_uid`/`owner_gid`.
pub async fn extract_tar<R>(
    reader: R,
    dest_dir: &Path,
    owner_uid: u32,
    owner_gid: u32,
) -> Result<Vec<ExtractedEntry>, ServerError>
where
    R: AsyncRead + Unpin + Send,
{
    let archive = Archive::new(reader);
    let mut entries = archive
        .entries()
        .map_err(|e| ServerError::TransformError(format!("malformed tar stream: {e}")))?;

    let mut written = Vec::new();

    while let Some(entry) = entries.next().await {
        let mut entry =
            entry.map_err(|e| ServerError::TransformError(format!("malformed tar entry: {e}")))?;

        match entry
            .header()
            .entry_type()
        {
            EntryType::Regular | EntryType::Continuous => {}
            other => {
                return Err(ServerError::TransformError(format!(
                    "tar entry type {other:?} is not a regular file"
                )));
            }
        }

        let entry_path = entry
            .path()
            .map_err(|e| ServerError::TransformError(format!("malformed tar entry path: {e}")))?
            .into_owned();
        let name = entry_path
            .file_name()
            .and_then(|n| n.to_str())
            .ok_or(ServerError::MissingFilename)?;
        let sanitized = sanitize_filename(name).ok_or(ServerError::MissingFilename)?;

        let target = dest_dir.join(&sanitized);
        let result = sink::write_atomic(&mut entry, &target, owner_uid, owner_gid, false).await?;
        written.push(ExtractedEntry {
            path: result.path,
            size: result.bytes_written,
        });
    }

    Ok(written)
}
