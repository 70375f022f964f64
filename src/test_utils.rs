//! テスト用の固定レスポンス Transport とローカルHTTPサーバー

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};

use crate::error::CatalogError;
use crate::traits::{HttpResponse, Transport};

enum FakeRoute {
    Respond(HttpResponse),
    NetworkError,
}

/// URL 完全一致でレスポンスを返す。未登録URLは 404
#[derive(Default)]
pub struct FakeTransport {
    routes: HashMap<String, FakeRoute>,
    /// URL に含まれる文字列と、それが一時エラーを返し続けるリセット回数
    transient: Vec<(String, usize)>,
    resets: usize,
    requests: Mutex<Vec<String>>,
}

impl FakeTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn route(mut self, url: impl Into<String>, status: u16, body: impl Into<Vec<u8>>) -> Self {
        self.routes
            .insert(url.into(), FakeRoute::Respond(HttpResponse::new(status, body)));
        self
    }

    pub fn json(self, url: impl Into<String>, value: serde_json::Value) -> Self {
        self.route(url, 200, value.to_string())
    }

    pub fn network_error(mut self, url: impl Into<String>) -> Self {
        self.routes.insert(url.into(), FakeRoute::NetworkError);
        self
    }

    /// `pattern` を含むURLは `reset_session` が `resets` 回呼ばれるまで一時エラー
    pub fn transient_until_reset(mut self, pattern: impl Into<String>, resets: usize) -> Self {
        self.transient.push((pattern.into(), resets));
        self
    }

    pub fn requests(&self) -> Vec<String> {
        self.requests.lock().unwrap().clone()
    }

    pub fn request_count(&self, pattern: &str) -> usize {
        self.requests
            .lock()
            .unwrap()
            .iter()
            .filter(|url| url.contains(pattern))
            .count()
    }

    pub fn resets(&self) -> usize {
        self.resets
    }
}

#[async_trait]
impl Transport for FakeTransport {
    async fn get(
        &self,
        url: &str,
        _headers: &[(&str, &str)],
        _timeout: Duration,
    ) -> Result<HttpResponse, CatalogError> {
        self.requests.lock().unwrap().push(url.to_string());

        let blocked = self
            .transient
            .iter()
            .any(|(pattern, resets)| url.contains(pattern.as_str()) && self.resets < *resets);
        if blocked {
            return Err(CatalogError::TransientStatus {
                status: 503,
                url: url.to_string(),
            });
        }

        match self.routes.get(url) {
            Some(FakeRoute::Respond(response)) => Ok(response.clone()),
            Some(FakeRoute::NetworkError) => {
                Err(CatalogError::Connection(format!("connection refused: {}", url)))
            }
            None => Ok(HttpResponse::new(404, Vec::new())),
        }
    }

    async fn get_once(
        &self,
        url: &str,
        headers: &[(&str, &str)],
        timeout: Duration,
    ) -> Result<HttpResponse, CatalogError> {
        self.get(url, headers, timeout).await
    }

    fn reset_session(&mut self) {
        self.resets += 1;
    }
}

/// ローカルHTTPサーバー（1接続1レスポンス）
///
/// `responses` を順に返し、使い切ったら最後の1件を返し続ける。
/// 各要素は (ステータス, 追加ヘッダー行)。
pub struct TestServer {
    pub base_url: String,
    requests: Arc<Mutex<Vec<String>>>,
}

impl TestServer {
    pub async fn start(responses: Vec<(u16, &'static str)>) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let base_url = format!("http://{}", listener.local_addr().unwrap());
        let requests = Arc::new(Mutex::new(Vec::new()));
        let log = requests.clone();

        tokio::spawn(async move {
            let mut index = 0;
            while let Ok((mut stream, _)) = listener.accept().await {
                let head = read_head(&mut stream).await;
                log.lock().unwrap().push(head);

                let (status, extra) = responses[index.min(responses.len() - 1)];
                index += 1;
                let body = "ok";
                let response = format!(
                    "HTTP/1.1 {} Test\r\nContent-Length: {}\r\nConnection: close\r\n{}\r\n{}",
                    status,
                    body.len(),
                    extra,
                    body
                );
                let _ = stream.write_all(response.as_bytes()).await;
                let _ = stream.shutdown().await;
            }
        });

        Self { base_url, requests }
    }

    pub fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// 受信したリクエストヘッダー（小文字化済み）
    pub fn requests(&self) -> Vec<String> {
        self.requests
            .lock()
            .unwrap()
            .iter()
            .map(|head| head.to_ascii_lowercase())
            .collect()
    }
}

async fn read_head(stream: &mut TcpStream) -> String {
    let mut buf = Vec::new();
    let mut chunk = [0u8; 1024];
    loop {
        let n = stream.read(&mut chunk).await.unwrap_or(0);
        if n == 0 {
            break;
        }
        buf.extend_from_slice(&chunk[..n]);
        if buf.windows(4).any(|w| w == b"\r\n\r\n") {
            break;
        }
    }
    String::from_utf8_lossy(&buf).into_owned()
}
