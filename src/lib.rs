//! カタログクローラーライブラリ
//!
//! - Baldor の製品カテゴリ階層を走査して商品一覧を取得
//! - 商品ごとに図面・BOMを補完し、マニュアル/CAD/画像をダウンロード
//! - 商品JSONと階層統合済みの `final_output.json` を出力
//!
//! 途中で失敗した場合はチェックポイントから再開する。
//!
//! # 使用例
//!
//! ```rust,ignore
//! use catalog_crawler::{CatalogConfig, CatalogService, CollectRequest};
//! use tower::Service;
//!
//! #[tokio::main]
//! async fn main() {
//!     let config = CatalogConfig::new()
//!         .with_output_dir("./output")
//!         .with_product_limit(Some(15));
//!     let mut service = CatalogService::with_config(config);
//!
//!     let response = service.call(CollectRequest::new("BALDOR")).await.unwrap();
//!     println!("Final output: {:?}", response.output_path);
//! }
//! ```
//!
//! # パイプラインを直接使う
//!
//! ```rust,ignore
//! use catalog_crawler::{baldor::Pipeline, CatalogConfig, HttpTransport};
//!
//! #[tokio::main]
//! async fn main() {
//!     let config = CatalogConfig::from_env();
//!     let transport = HttpTransport::new(&config).unwrap();
//!     let mut pipeline = Pipeline::new(config, transport);
//!
//!     let output = pipeline.run().await.unwrap();
//!     println!("Attempts: {}", output.report.attempts);
//! }
//! ```

pub mod baldor;
pub mod checkpoint;
pub mod config;
pub mod error;
pub mod logging;
pub mod service;
pub mod traits;
pub mod transport;

#[cfg(test)]
mod test_utils;

// 主要な型をリエクスポート
pub use checkpoint::{Checkpoint, CheckpointStore};
pub use config::CatalogConfig;
pub use error::CatalogError;
pub use logging::init_logging;
pub use service::{CatalogService, CollectRequest, CollectResponse};
pub use traits::{HttpResponse, Transport};
pub use transport::HttpTransport;

// パイプライン関連の型もリエクスポート
pub use baldor::{FinalCategory, Pipeline, PipelineOutput, RunReport};
