//! チェックポイントストア
//!
//! 階層データ全体を1つのJSONとして保存する。書き込みは一時ファイル経由の
//! rename で行い、途中クラッシュでも壊れたファイルを残さない。

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::baldor::{Category, Phase};
use crate::error::CatalogError;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Checkpoint {
    /// 保存時点で完了しているフェーズ
    pub phase: Phase,
    pub saved_at: DateTime<Utc>,
    pub categories: Vec<Category>,
}

impl Checkpoint {
    pub fn new(phase: Phase, categories: Vec<Category>) -> Self {
        Self {
            phase,
            saved_at: Utc::now(),
            categories,
        }
    }
}

#[derive(Debug, Clone)]
pub struct CheckpointStore {
    path: PathBuf,
}

impl CheckpointStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn exists(&self) -> bool {
        self.path.exists()
    }

    /// 存在しなければ `None`。壊れたファイルも再開不能として `None` 扱い
    pub fn load(&self) -> Result<Option<Checkpoint>, CatalogError> {
        if !self.path.exists() {
            return Ok(None);
        }

        let content = std::fs::read(&self.path)?;
        match serde_json::from_slice::<Checkpoint>(&content) {
            Ok(checkpoint) => {
                info!(
                    "Loaded checkpoint {:?} (phase={:?}, saved_at={})",
                    self.path, checkpoint.phase, checkpoint.saved_at
                );
                Ok(Some(checkpoint))
            }
            Err(e) => {
                warn!("Ignoring unreadable checkpoint {:?}: {}", self.path, e);
                Ok(None)
            }
        }
    }

    pub fn save(&self, checkpoint: &Checkpoint) -> Result<(), CatalogError> {
        let json = serde_json::to_vec(checkpoint)?;
        write_atomic(&self.path, &json)
            .map_err(|e| CatalogError::Checkpoint(format!("{:?}: {}", self.path, e)))?;
        info!("Saved checkpoint {:?} (phase={:?})", self.path, checkpoint.phase);
        Ok(())
    }

    pub fn clear(&self) -> Result<(), CatalogError> {
        match std::fs::remove_file(&self.path) {
            Ok(()) => {
                info!("Removed checkpoint {:?}", self.path);
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

/// 同じディレクトリの一時ファイルに書いてから rename
pub(crate) fn write_atomic(path: &Path, content: &[u8]) -> std::io::Result<()> {
    let parent = path.parent().filter(|p| !p.as_os_str().is_empty());
    if let Some(parent) = parent {
        std::fs::create_dir_all(parent)?;
    }

    let file_name = path.file_name().unwrap_or_default().to_string_lossy();
    let tmp_path = path.with_file_name(format!(".{}.tmp", file_name));

    std::fs::write(&tmp_path, content)?;
    std::fs::rename(&tmp_path, path)
}
