//! reqwest ベースの `Transport` 実装
//!
//! 1回の実行で1つのクッキージャーを共有し、パイプラインのリトライ間で作り直す。

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::cookie::Jar;
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, USER_AGENT};
use reqwest::Client;
use tokio::time::sleep;
use tracing::{debug, info, warn};

use crate::config::CatalogConfig;
use crate::error::CatalogError;
use crate::traits::{HttpResponse, Transport};

/// リクエスト層でリトライするステータス
pub const RETRY_STATUS: [u16; 5] = [429, 500, 502, 503, 504];

pub struct HttpTransport {
    client: Client,
    jar: Arc<Jar>,
    user_agent: String,
    retries: u32,
    retry_delay: Duration,
}

impl HttpTransport {
    pub fn new(config: &CatalogConfig) -> Result<Self, CatalogError> {
        let jar = Arc::new(Jar::default());
        let client = build_client(&config.user_agent, jar.clone())?;

        Ok(Self {
            client,
            jar,
            user_agent: config.user_agent.clone(),
            retries: config.request_retries.max(1),
            retry_delay: config.request_retry_delay,
        })
    }

    /// 現在のセッションのクッキージャー
    pub fn cookie_jar(&self) -> &Arc<Jar> {
        &self.jar
    }

    async fn send(
        &self,
        url: &str,
        headers: &[(&str, &str)],
        timeout: Duration,
    ) -> Result<HttpResponse, CatalogError> {
        let mut request = self.client.get(url).timeout(timeout);
        for (name, value) in headers {
            request = request.header(*name, *value);
        }

        let response = request.send().await?;
        let status = response.status().as_u16();
        let body = response.bytes().await?.to_vec();
        Ok(HttpResponse { status, body })
    }
}

fn build_client(user_agent: &str, jar: Arc<Jar>) -> Result<Client, CatalogError> {
    let mut headers = HeaderMap::new();
    headers.insert(ACCEPT, HeaderValue::from_static("application/json"));
    headers.insert(
        USER_AGENT,
        HeaderValue::from_str(user_agent)
            .map_err(|e| CatalogError::Config(format!("invalid user agent: {}", e)))?,
    );

    let client = Client::builder()
        .default_headers(headers)
        .cookie_provider(jar)
        .gzip(true)
        .build()?;
    Ok(client)
}

#[async_trait]
impl Transport for HttpTransport {
    async fn get(
        &self,
        url: &str,
        headers: &[(&str, &str)],
        timeout: Duration,
    ) -> Result<HttpResponse, CatalogError> {
        let mut last_status = 0;

        for attempt in 1..=self.retries {
            debug!(url, attempt, "HTTP GET");
            let response = self.send(url, headers, timeout).await?;

            if !RETRY_STATUS.contains(&response.status) {
                return Ok(response);
            }

            warn!(
                "GET {} returned {} (attempt {}/{})",
                url, response.status, attempt, self.retries
            );
            last_status = response.status;
            if attempt < self.retries {
                sleep(self.retry_delay).await;
            }
        }

        Err(CatalogError::TransientStatus {
            status: last_status,
            url: url.to_string(),
        })
    }

    async fn get_once(
        &self,
        url: &str,
        headers: &[(&str, &str)],
        timeout: Duration,
    ) -> Result<HttpResponse, CatalogError> {
        debug!(url, "HTTP GET (single try)");
        self.send(url, headers, timeout).await
    }

    fn reset_session(&mut self) {
        let jar = Arc::new(Jar::default());
        match build_client(&self.user_agent, jar.clone()) {
            Ok(client) => {
                self.client = client;
                self.jar = jar;
                info!("HTTP session cookies cleared");
            }
            Err(e) => warn!("Failed to reset HTTP session: {}", e),
        }
    }
}
