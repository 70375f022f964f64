use std::path::PathBuf;
use std::task::{Context, Poll};

use futures::future::BoxFuture;
use tower::Service;
use tracing::info;

use crate::baldor::{FinalCategory, Pipeline, RunReport};
use crate::config::CatalogConfig;
use crate::error::CatalogError;
use crate::transport::HttpTransport;

/// 対応しているサイト名（大文字小文字は区別しない）
pub const SUPPORTED_SITE: &str = "BALDOR";

/// 収集リクエスト
#[derive(Debug, Clone)]
pub struct CollectRequest {
    pub site: String,
}

impl CollectRequest {
    pub fn new(site: impl Into<String>) -> Self {
        Self { site: site.into() }
    }
}

impl Default for CollectRequest {
    fn default() -> Self {
        Self::new(SUPPORTED_SITE)
    }
}

/// 収集結果
#[derive(Debug, Clone)]
pub struct CollectResponse {
    pub output_path: PathBuf,
    pub categories: Vec<FinalCategory>,
    pub report: RunReport,
}

/// tower::Serviceを実装したカタログ収集サービス
#[derive(Debug, Clone, Default)]
pub struct CatalogService {
    config: CatalogConfig,
}

impl CatalogService {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_config(config: CatalogConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &CatalogConfig {
        &self.config
    }

    pub fn health(&self) -> &'static str {
        "running"
    }
}

fn check_site(site: &str) -> Result<(), CatalogError> {
    if site.trim().eq_ignore_ascii_case(SUPPORTED_SITE) {
        Ok(())
    } else {
        Err(CatalogError::UnsupportedSite(site.to_string()))
    }
}

impl Service<CollectRequest> for CatalogService {
    type Response = CollectResponse;
    type Error = CatalogError;
    type Future = BoxFuture<'static, Result<Self::Response, Self::Error>>;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, req: CollectRequest) -> Self::Future {
        info!("Collect request received: site={}", req.site);
        let config = self.config.clone();

        Box::pin(async move {
            check_site(&req.site)?;

            let transport = HttpTransport::new(&config)?;
            let mut pipeline = Pipeline::new(config, transport);
            let output = pipeline.run().await?;

            info!(
                "Collection finished: path={:?}, categories={}, attempts={}",
                output.output_path,
                output.categories.len(),
                output.report.attempts
            );

            Ok(CollectResponse {
                output_path: output.output_path,
                categories: output.categories,
                report: output.report,
            })
        })
    }
}
