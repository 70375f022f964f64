use std::time::Duration;

use async_trait::async_trait;

use crate::error::CatalogError;

/// GETレスポンス（ステータスとボディのみ）
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpResponse {
    pub status: u16,
    pub body: Vec<u8>,
}

impl HttpResponse {
    pub fn new(status: u16, body: impl Into<Vec<u8>>) -> Self {
        Self {
            status,
            body: body.into(),
        }
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }

    /// 2xx 以外を `Status` エラーに変換
    pub fn error_for_status(self, url: &str) -> Result<Self, CatalogError> {
        if self.is_success() {
            Ok(self)
        } else {
            Err(CatalogError::Status {
                status: self.status,
                url: url.to_string(),
            })
        }
    }

    pub fn json(&self) -> Result<serde_json::Value, CatalogError> {
        Ok(serde_json::from_slice(&self.body)?)
    }
}

#[async_trait]
pub trait Transport: Send + Sync {
    /// GET 実行
    ///
    /// ネットワーク障害は `Err`、一時的ステータスのリトライ切れは
    /// `CatalogError::TransientStatus`。それ以外のステータスはそのまま返す。
    async fn get(
        &self,
        url: &str,
        headers: &[(&str, &str)],
        timeout: Duration,
    ) -> Result<HttpResponse, CatalogError>;

    /// リクエスト層のリトライなしで1回だけ GET
    ///
    /// 一時的ステータスもそのまま返す。リトライは呼び出し側が制御する。
    async fn get_once(
        &self,
        url: &str,
        headers: &[(&str, &str)],
        timeout: Duration,
    ) -> Result<HttpResponse, CatalogError>;

    /// セッション（クッキー）をリセット
    fn reset_session(&mut self);
}
