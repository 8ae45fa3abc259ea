//! The on-disk ledger for one resumable upload: a `ledger.json` file
//! colocated with the chunk files under
//! `<uploads_root[pnum]>/<upload_id>/`.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::ServerError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResumableStatus {
    Open,
    Merging,
    Finalized,
    Aborted,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChunkMeta {
    pub size: u64,
    pub md5: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Ledger {
    pub upload_id: Uuid,
    pub pnum: String,
    pub group: Option<String>,
    pub filename: String,
    pub chunks: BTreeMap<u32, ChunkMeta>,
    pub status: ResumableStatus,
    pub created_at: DateTime<Utc>,
    pub last_activity_at: DateTime<Utc>,
}

impl Ledger {
    pub fn new(upload_id: Uuid, pnum: String, group: Option<String>, filename: String) -> Self {
        let now = Utc::now();
        Self {
            upload_id,
            pnum,
            group,
            filename,
            chunks: BTreeMap::new(),
            status: ResumableStatus::Open,
            created_at: now,
            last_activity_at: now,
        }
    }

    /// The highest contiguously-received chunk number, starting from 1.
    /// Out-of-order chunks are stored but do not advance this.
    pub fn max_contiguous_chunk(&self) -> u32 {
        let mut max = 0u32;
        for n in 1.. {
            if self.chunks.contains_key(&n) {
                max = n;
            } else {
                break;
            }
        }
        max
    }

    /// Whether chunks form a contiguous `1..=N` sequence, required
    /// before a merge can proceed.
    pub fn is_contiguous(&self) -> bool {
        if self.chunks.is_empty() {
            return false;
        }
        let n = *self.chunks.keys().last().unwrap();
        self.max_contiguous_chunk() == n
    }

    pub fn dir(uploads_root: &Path, upload_id: &Uuid) -> PathBuf {
        uploads_root.join(upload_id.to_string())
    }

    pub fn chunk_path(dir: &Path, filename: &str, n: u32) -> PathBuf {
        dir.join(format!("{filename}.chunk.{n}"))
    }

    fn ledger_path(dir: &Path) -> PathBuf {
        dir.join("ledger.json")
    }

    pub async fn load(dir: &Path) -> Result<Self, ServerError> {
        let raw = tokio::fs::read(Self::ledger_path(dir))
            .await
            .map_err(|_| ServerError::ResumableNotFound)?;
        serde_json::from_slice(&raw).map_err(|e| ServerError::IOError(e.to_string()))
    }

    pub async fn save(&self, dir: &Path) -> Result<(), ServerError> {
        tokio::fs::create_dir_all(dir).await?;
        let raw = serde_json::to_vec_pretty(self).map_err(|e| ServerError::IOError(e.to_string()))?;
        tokio::fs::write(Self::ledger_path(dir), raw).await?;
        Ok(())
    }

    pub async fn try_load(dir: &Path) -> Option<Self> {
        Self::load(dir).await.ok()
    }
}
