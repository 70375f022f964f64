use thiserror::Error;

#[derive(Error, Debug)]
pub enum CatalogError {
    #[error("HTTPリクエストエラー: {0}")]
    Http(#[from] reqwest::Error),

    /// reqwest 以外の Transport 実装での接続失敗
    #[error("接続エラー: {0}")]
    Connection(String),

    #[error("設定エラー: {0}")]
    Config(String),

    #[error("一時的なHTTPエラー {status}: {url}")]
    TransientStatus { status: u16, url: String },

    #[error("HTTPエラー {status}: {url}")]
    Status { status: u16, url: String },

    #[error("解析エラー: {0}")]
    Parse(String),

    #[error("エンコードエラー: {0}")]
    Encoding(String),

    #[error("チェックポイントエラー: {0}")]
    Checkpoint(String),

    #[error("ファイル操作エラー: {0}")]
    FileIO(#[from] std::io::Error),

    #[error("JSONエラー: {0}")]
    Json(#[from] serde_json::Error),

    #[error("未対応のサイト: {0}")]
    UnsupportedSite(String),

    #[error("リトライ上限に到達しました ({attempts}回)")]
    RetriesExhausted { attempts: u32 },

    #[error("ログ初期化エラー: {0}")]
    Logging(String),
}

impl CatalogError {
    /// リクエスト層のリトライを使い切った一時エラーか
    ///
    /// 下位層では握りつぶさず、パイプラインのリトライに委ねる。
    pub fn is_transient(&self) -> bool {
        matches!(self, CatalogError::TransientStatus { .. })
    }

    /// 呼び出し側の入力に起因するエラーか
    pub fn is_client_error(&self) -> bool {
        matches!(self, CatalogError::UnsupportedSite(_))
    }
}
