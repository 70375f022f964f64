use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use tower::Service;
use tracing::{error, info};

use catalog_crawler::{init_logging, CatalogConfig, CatalogService, CollectRequest};

/// Baldor カタログを収集して final_output.json を生成
#[derive(Debug, Parser)]
#[command(name = "catalog-crawler", version, about)]
struct Args {
    /// 収集対象サイト
    #[arg(long, default_value = "BALDOR")]
    site: String,

    /// ログ出力ディレクトリ
    #[arg(long, default_value = "history_log")]
    log_dir: PathBuf,
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();

    let _guard = match init_logging(&args.log_dir) {
        Ok(guard) => guard,
        Err(e) => {
            eprintln!("エラー: {}", e);
            return ExitCode::FAILURE;
        }
    };

    let mut service = CatalogService::with_config(CatalogConfig::from_env());
    info!("Service status: {}", service.health());

    match service.call(CollectRequest::new(args.site)).await {
        Ok(response) => {
            info!(
                "Catalog written to {:?} ({} categories, {} attempts, {} recoveries)",
                response.output_path,
                response.categories.len(),
                response.report.attempts,
                response.report.recoveries
            );
            ExitCode::SUCCESS
        }
        Err(e) if e.is_client_error() => {
            error!("Rejected request: {}", e);
            ExitCode::from(2)
        }
        Err(e) => {
            error!("Collection failed: {}", e);
            ExitCode::FAILURE
        }
    }
}
