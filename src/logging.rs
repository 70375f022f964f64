//! ログ初期化（コンソール + `{log_dir}/logs.log`）

use std::path::Path;

use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::{non_blocking, rolling};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::error::CatalogError;

pub const LOG_FILE_NAME: &str = "logs.log";

/// `RUST_LOG` 未設定時のフィルタ
fn default_filter() -> EnvFilter {
    EnvFilter::new("info,hyper=warn,reqwest=info")
}

/// 戻り値のガードが drop されるまでファイル書き込みが続く
pub fn init_logging(log_dir: &Path) -> Result<WorkerGuard, CatalogError> {
    std::fs::create_dir_all(log_dir).map_err(|e| {
        CatalogError::Logging(format!("failed to create log directory {:?}: {}", log_dir, e))
    })?;

    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| default_filter());

    let (file_writer, guard) = non_blocking(rolling::never(log_dir, LOG_FILE_NAME));
    let file_layer = fmt::layer()
        .with_writer(file_writer)
        .with_ansi(false)
        .with_target(true);
    let console_layer = fmt::layer().with_target(false);

    tracing_subscriber::registry()
        .with(env_filter)
        .with(console_layer)
        .with(file_layer)
        .try_init()
        .map_err(|e| CatalogError::Logging(e.to_string()))?;

    Ok(guard)
}
