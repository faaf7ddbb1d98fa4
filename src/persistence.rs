use std::path::{Path, PathBuf};

use anyhow::Context;
use chrono::Utc;
use tokio::fs;
use tracing::{info, warn};

use crate::store::StoreSnapshot;

#[derive(Debug, Clone)]
pub struct SnapshotFile {
    path: PathBuf,
    tmp_path: PathBuf,
    backup_path: PathBuf,
}

impl SnapshotFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        Self {
            tmp_path: with_suffix(&path, "tmp"),
            backup_path: with_suffix(&path, "bak"),
            path,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn backup_path(&self) -> &Path {
        &self.backup_path
    }

    pub async fn save(&self, snapshot: &StoreSnapshot) -> anyhow::Result<()> {
        let json = serde_json::to_vec_pretty(snapshot).context("serialize snapshot")?;

        if let Some(parent) = self.path.parent().filter(|dir| !dir.as_os_str().is_empty()) {
            fs::create_dir_all(parent)
                .await
                .with_context(|| format!("create {}", parent.display()))?;
        }

        let had_primary = fs::try_exists(&self.path).await.unwrap_or(false);
        if had_primary {
            fs::copy(&self.path, &self.backup_path)
                .await
                .with_context(|| format!("back up {}", self.path.display()))?;
        }

        if let Err(error) = self.write_and_swap(&json).await {
            let _ = fs::remove_file(&self.tmp_path).await;
            if had_primary {
                match fs::copy(&self.backup_path, &self.path).await {
                    Ok(_) => warn!(path = %self.path.display(), "snapshot write failed; backup restored"),
                    Err(restore_error) => {
                        warn!(?restore_error, path = %self.path.display(), "failed to restore snapshot backup")
                    }
                }
            }
            return Err(error);
        }

        Ok(())
    }

    async fn write_and_swap(&self, json: &[u8]) -> anyhow::Result<()> {
        fs::write(&self.tmp_path, json)
            .await
            .with_context(|| format!("write {}", self.tmp_path.display()))?;
        fs::rename(&self.tmp_path, &self.path)
            .await
            .with_context(|| format!("rename onto {}", self.path.display()))?;
        Ok(())
    }

    pub async fn load(&self) -> StoreSnapshot {
        for candidate in [&self.path, &self.backup_path] {
            match read_snapshot(candidate).await {
                Ok(Some(snapshot)) => {
                    info!(
                        path = %candidate.display(),
                        chats = snapshot.chats.len(),
                        "snapshot loaded"
                    );
                    return snapshot;
                }
                Ok(None) => {}
                Err(error) => warn!(?error, path = %candidate.display(), "unreadable snapshot"),
            }
        }

        StoreSnapshot {
            saved_at: Utc::now(),
            chats: Vec::new(),
        }
    }
}

async fn read_snapshot(path: &Path) -> anyhow::Result<Option<StoreSnapshot>> {
    if !fs::try_exists(path).await? {
        return Ok(None);
    }
    let raw = fs::read(path).await?;
    let snapshot = serde_json::from_slice(&raw)?;
    Ok(Some(snapshot))
}

fn with_suffix(path: &Path, suffix: &str) -> PathBuf {
    let mut name = path.as_os_str().to_owned();
    name.push(".");
    name.push(suffix);
    PathBuf::from(name)
}
