//! C5: the resumable manager. Owns the chunk ledger and the per-upload
//! coarse lock; the lock is held only across ledger mutations, never
//! across network I/O, per §5.

pub mod ledger;

use std::collections::{HashMap, VecDeque};
use std::path::{Path, PathBuf};
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Duration;

use chrono::Utc;
use tokio::io::{AsyncRead, ReadBuf};
use tokio::sync::Mutex;
use uuid::Uuid;

use self::ledger::{ChunkMeta, Ledger, ResumableStatus};
use crate::error::ServerError;
use crate::sink;

pub struct ResumableManager {
    locks: Mutex<HashMap<Uuid, Arc<Mutex<()>>>>,
    ttl: Duration,
}

impl ResumableManager {
    pub fn new(ttl_seconds: u64) -> Self {
        Self {
            locks: Mutex::new(HashMap::new()),
            ttl: Duration::from_secs(ttl_seconds),
        }
    }

    async fn lock_for(&self, id: Uuid) -> Arc<Mutex<()>> {
        let mut locks = self.locks.lock().await;
        locks.entry(id).or_insert_with(|| Arc::new(Mutex::new(()))).clone()
    }

    /// Allocates or looks up an upload-id. If `id` is given, the caller
    /// already has one. Otherwise, unless `force_new`, an existing open
    /// upload matching `(pnum, group, filename)` is reused — the
    /// resume-after-failure path.
    pub async fn begin(
        &self,
        uploads_root: &Path,
        pnum: &str,
        group: Option<&str>,
        filename: &str,
        id: Option<Uuid>,
        force_new: bool,
    ) -> Result<Uuid, ServerError> {
        if let Some(id) = id {
            let dir = Ledger::dir(uploads_root, &id);
            Ledger::load(&dir).await?;
            return Ok(id);
        }

        if !force_new {
            if let Some(found) = self.find_open(uploads_root, pnum, group, filename).await? {
                return Ok(found);
            }
        }

        let id = Uuid::new_v4();
        let ledger = Ledger::new(id, pnum.to_string(), group.map(String::from), filename.to_string());
        ledger.save(&Ledger::dir(uploads_root, &id)).await?;
        Ok(id)
    }

    async fn find_open(
        &self,
        uploads_root: &Path,
        pnum: &str,
        group: Option<&str>,
        filename: &str,
    ) -> Result<Option<Uuid>, ServerError> {
        let mut entries = match tokio::fs::read_dir(uploads_root).await {
            Ok(e) => e,
            Err(_) => return Ok(None),
        };
        while let Some(entry) = entries.next_entry().await? {
            let Ok(id) = Uuid::parse_str(&entry.file_name().to_string_lossy()) else {
                continue;
            };
            if let Some(ledger) = Ledger::try_load(&entry.path()).await {
                if ledger.status == ResumableStatus::Open
                    && ledger.pnum == pnum
                    && ledger.filename == filename
                    && ledger.group.as_deref() == group
                {
                    return Ok(Some(id));
                }
            }
        }
        Ok(None)
    }

    /// Stores chunk `n`. If a chunk already exists at that sequence
    /// number with a different MD5 than what is being written, the
    /// resumable is invalidated — the stored chunk was not what the
    /// client thinks it resumed from.
    pub async fn put_chunk(
        &self,
        uploads_root: &Path,
        id: Uuid,
        n: u32,
        bytes: &[u8],
    ) -> Result<(), ServerError> {
        let lock = self.lock_for(id).await;
        let _guard = lock.lock().await;

        let dir = Ledger::dir(uploads_root, &id);
        let mut led = Ledger::load(&dir).await?;

        let md5 = ingest_core::stream::md5_hex(bytes);

        if let Some(existing) = led.chunks.get(&n) {
            if existing.md5 != md5 {
                led.status = ResumableStatus::Aborted;
                led.save(&dir).await?;
                return Err(ServerError::ChecksumMismatch);
            }
        }

        let chunk_path = Ledger::chunk_path(&dir, &led.filename, n);
        tokio::fs::write(&chunk_path, bytes).await?;

        led.chunks.insert(n, ChunkMeta { size: bytes.len() as u64, md5 });
        led.last_activity_at = Utc::now();
        led.save(&dir).await?;
        Ok(())
    }

    /// Returns `(filename, max_chunk)`, where `max_chunk` is either the
    /// highest contiguously-received sequence number or `"end"` for a
    /// finalized upload.
    pub async fn query(&self, uploads_root: &Path, id: Uuid) -> Result<(String, String), ServerError> {
        let dir = Ledger::dir(uploads_root, &id);
        let led = Ledger::load(&dir).await?;
        let max_chunk = if led.status == ResumableStatus::Finalized {
            "end".to_string()
        } else {
            led.max_contiguous_chunk().to_string()
        };
        Ok((led.filename, max_chunk))
    }

    pub async fn abort(&self, uploads_root: &Path, id: Uuid) -> Result<(), ServerError> {
        let lock = self.lock_for(id).await;
        let _guard = lock.lock().await;

        let dir = Ledger::dir(uploads_root, &id);
        if !dir.exists() {
            return Err(ServerError::ResumableNotFound);
        }
        tokio::fs::remove_dir_all(&dir).await?;
        Ok(())
    }

    /// Merges chunks `1..=N` into `dest` in a single streaming pass,
    /// verifying against `client_md5` if the caller supplied a
    /// `Content-MD5` trailer. On any failure the resumable is marked
    /// `aborted` and its chunks are preserved for forensic inspection.
    pub async fn merge(
        &self,
        uploads_root: &Path,
        id: Uuid,
        dest: &Path,
        owner_uid: u32,
        owner_gid: u32,
        client_md5: Option<&str>,
    ) -> Result<sink::SinkResult, ServerError> {
        let lock = self.lock_for(id).await;
        let _guard = lock.lock().await;

        let dir = Ledger::dir(uploads_root, &id);
        let mut led = Ledger::load(&dir).await?;

        if !led.is_contiguous() {
            return Err(ServerError::TransformError(
                "resumable chunks are not a contiguous 1..N sequence".to_string(),
            ));
        }

        led.status = ResumableStatus::Merging;
        led.save(&dir).await?;

        let n = *led.chunks.keys().last().unwrap();
        let mut files = Vec::with_capacity(n as usize);
        for i in 1..=n {
            let path = Ledger::chunk_path(&dir, &led.filename, i);
            files.push(tokio::fs::File::open(&path).await?);
        }
        let chained = ChainedFiles::new(files);

        let write_result = sink::write_atomic(chained, dest, owner_uid, owner_gid, false).await;

        match write_result {
            Ok(result) => {
                if let Some(expected) = client_md5 {
                    if !expected.eq_ignore_ascii_case(&result.md5_hex) {
                        let _ = tokio::fs::remove_file(&result.path).await;
                        led.status = ResumableStatus::Aborted;
                        led.save(&dir).await?;
                        return Err(ServerError::ChecksumMismatch);
                    }
                }

                led.status = ResumableStatus::Finalized;
                for i in 1..=n {
                    let _ = tokio::fs::remove_file(Ledger::chunk_path(&dir, &led.filename, i)).await;
                }
                led.save(&dir).await?;
                Ok(result)
            }
            Err(e) => {
                led.status = ResumableStatus::Aborted;
                led.save(&dir).await?;
                Err(e)
            }
        }
    }

    /// Reaps abandoned (non-finalized, idle past TTL) chunk directories
    /// under `uploads_root`. Intended to run on a periodic timer per
    /// configured upload root.
    pub async fn sweep_once(&self, uploads_root: &Path) -> Result<(), ServerError> {
        let mut entries = match tokio::fs::read_dir(uploads_root).await {
            Ok(e) => e,
            Err(_) => return Ok(()),
        };
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if let Some(led) = Ledger::try_load(&path).await {
                if led.status == ResumableStatus::Finalized {
                    continue;
                }
                let idle = Utc::now().signed_duration_since(led.last_activity_at);
                if idle.num_seconds() >= 0 && idle.num_seconds() as u64 > self.ttl.as_secs() {
                    tracing::info!("sweeping abandoned resumable upload {}", led.upload_id);
                    let _ = tokio::fs::remove_dir_all(&path).await;
                }
            }
        }
        Ok(())
    }

    /// Runs `sweep_once` over every configured upload root on a fixed
    /// interval, for the lifetime of the process.
    pub async fn run_sweeper(&self, uploads_roots: Vec<PathBuf>) {
        let mut interval = tokio::time::interval(Duration::from_secs(3600));
        loop {
            interval.tick().await;
            for root in &uploads_roots {
                if let Err(e) = self.sweep_once(root).await {
                    tracing::warn!("resumable sweeper failed for {}: {e}", root.display());
                }
            }
        }
    }
}

/// Concatenates a sequence of already-open files into one `AsyncRead`,
/// reading them in order. Used to merge chunks without holding more
/// than one open file's buffer in memory at a time.
struct ChainedFiles {
    files: VecDeque<tokio::fs::File>,
}

impl ChainedFiles {
    fn new(files: Vec<tokio::fs::File>) -> Self {
        Self { files: files.into() }
    }
}

impl AsyncRead for ChainedFiles {
    fn poll_read(self: Pin<&mut Self>, cx: &mut Context<'_>, buf: &mut ReadBuf<'_>) -> Poll<std::io::Result<()>> {
        let this = self.get_mut();
        loop {
            let Some(front) = this.files.front_mut() else {
                return Poll::Ready(Ok(()));
            };
            let before = buf.filled().len();
            match Pin::new(front).poll_read(cx, buf) {
                Poll::Ready(Ok(())) => {
                    if buf.filled().len() == before {
                        this.files.pop_front();
                        continue;
                    }
                    return Poll::Ready(Ok(()));
                }
                other => return other,
            }
        }
    }
}
