//! 商品ファイル（マニュアル・CAD・画像）のダウンロード

use std::path::{Path, PathBuf};

use tokio::time::sleep;
use tracing::{debug, error, info, warn};

use crate::checkpoint::write_atomic;
use crate::config::CatalogConfig;
use crate::error::CatalogError;
use crate::traits::Transport;

use super::types::{sub_subcategories_mut, AssetRole, Category};

pub struct AssetDownloader<'a, T: Transport + ?Sized> {
    transport: &'a T,
    config: &'a CatalogConfig,
}

impl<'a, T: Transport + ?Sized> AssetDownloader<'a, T> {
    pub fn new(transport: &'a T, config: &'a CatalogConfig) -> Self {
        Self { transport, config }
    }

    /// `{assets_dir}/{code}/{file}` に保存し、保存済みパスを返す
    ///
    /// `product.files` に記録済み（前回の試行やチェックポイント）でディスクにも
    /// あるファイルは再取得しない。記録のない既存ファイルは上書きする。
    /// 個別の失敗は致命的ではない。
    pub async fn download_all(
        &self,
        categories: &mut [Category],
    ) -> Result<Vec<PathBuf>, CatalogError> {
        std::fs::create_dir_all(&self.config.assets_dir)?;
        let mut saved = Vec::new();

        for product in sub_subcategories_mut(categories).flat_map(|ss| ss.product.iter_mut()) {
            let Some(code) = product.code().map(str::to_string) else {
                continue;
            };
            let folder = self.config.assets_dir.join(&code);

            for role in AssetRole::ALL {
                let Some(url) = product.source_url(role).map(str::to_string) else {
                    product.files.set(role, None);
                    continue;
                };

                let dest = folder.join(role.file_name());
                let recorded = product.files.get(role) == Some(&dest) && dest.is_file();
                let stored = if recorded {
                    debug!(path = ?dest, "Asset already on disk");
                    Some(dest)
                } else {
                    self.fetch_to(&url, &dest).await
                };

                if let Some(path) = &stored {
                    saved.push(path.clone());
                }
                product.files.set(role, stored);
            }
        }

        info!("Asset download finished: {} files available", saved.len());
        Ok(saved)
    }

    async fn fetch_to(&self, url: &str, dest: &Path) -> Option<PathBuf> {
        let Some(content) = self.download_with_retry(url).await else {
            warn!("Failed to download after retries: {}", url);
            return None;
        };

        match write_atomic(dest, &content) {
            Ok(()) => {
                info!("File saved: {:?}", dest);
                Some(dest.to_path_buf())
            }
            Err(e) => {
                error!("Error saving file {:?}: {}", dest, e);
                None
            }
        }
    }

    /// 固定間隔でリトライ。200 以外は失敗扱い
    pub async fn download_with_retry(&self, url: &str) -> Option<Vec<u8>> {
        let retries = self.config.download_retries.max(1);

        for attempt in 1..=retries {
            match self
                .transport
                .get_once(url, &[("Accept", "*/*")], self.config.download_timeout)
                .await
            {
                Ok(response) if response.status == 200 => return Some(response.body),
                Ok(response) => info!(
                    "Try {}/{} - failed to download {} (status {})",
                    attempt, retries, url, response.status
                ),
                Err(e) => info!(
                    "Try {}/{} - error downloading {}: {}",
                    attempt, retries, url, e
                ),
            }

            if attempt < retries {
                sleep(self.config.download_retry_delay).await;
            }
        }

        None
    }
}
