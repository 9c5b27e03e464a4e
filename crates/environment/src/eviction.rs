//! LRU eviction across the shared environment directory: cap total
//! environments at N or total size at S; when exceeded, remove the
//! least-recently-used environments older than the entry that triggered
//! the cap.

use crate::metadata::EnvMetadata;
use chrono::{DateTime, Utc};
use std::path::PathBuf;

#[derive(Debug, Clone, Copy)]
pub struct EvictionPolicy {
    pub max_envs: usize,
    pub max_total_bytes: u64,
}

impl Default for EvictionPolicy {
    fn default() -> Self {
        Self {
            max_envs: 50,
            max_total_bytes: 10 * 1024 * 1024 * 1024,
        }
    }
}

struct Entry {
    path: PathBuf,
    last_used_at: DateTime<Utc>,
    size_bytes: u64,
}

async fn dir_size(path: &std::path::Path) -> u64 {
    let mut total = 0_u64;
    for entry in walkdir::WalkDir::new(path).into_iter().flatten() {
        if entry.file_type().is_file() {
            total += entry.metadata().map(|m| m.len()).unwrap_or(0);
        }
    }
    total
}

/// Scans `envs_root` for all materialised environments, and returns the
/// paths that should be deleted to bring the set back under `policy`.
/// Environments are only candidates once they are older (by `last_used_at`)
/// than whichever entry pushed the set over a cap: a "least-recently-used
/// ... older than the evicted entry" rule.
pub async fn plan_eviction(envs_root: &std::path::Path, policy: EvictionPolicy) -> Vec<PathBuf> {
    let mut entries = Vec::new();
    let mut read_dir = match tokio::fs::read_dir(envs_root).await {
        Ok(rd) => rd,
        Err(_) => return Vec::new(),
    };

    while let Ok(Some(dir_entry)) = read_dir.next_entry().await {
        let path = dir_entry.path();
        if !path.is_dir() {
            continue;
        }
        let Some(meta) = EnvMetadata::read(&path).await else {
            continue;
        };
        let size_bytes = dir_size(&path).await;
        entries.push(Entry {
            path,
            last_used_at: meta.last_used_at,
            size_bytes,
        });
    }

    entries.sort_by_key(|e| e.last_used_at);

    let total_bytes: u64 = entries.iter().map(|e| e.size_bytes).sum();
    let mut to_evict = Vec::new();
    let mut remaining_count = entries.len();
    let mut remaining_bytes = total_bytes;

    for entry in entries {
        let over_count = remaining_count > policy.max_envs;
        let over_bytes = remaining_bytes > policy.max_total_bytes;
        if !over_count && !over_bytes {
            break;
        }
        remaining_count -= 1;
        remaining_bytes = remaining_bytes.saturating_sub(entry.size_bytes);
        to_evict.push(entry.path);
    }

    to_evict
}
