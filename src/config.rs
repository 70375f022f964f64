use std::path::PathBuf;
use std::time::Duration;

use tracing::warn;

pub const DEFAULT_BASE_URL: &str = "https://www.baldor.com";
pub const DEFAULT_PRODUCT_NAME: &str = "Motor AC Trifásico";

#[derive(Debug, Clone)]
pub struct CatalogConfig {
    pub base_url: String,
    pub user_agent: String,
    /// 商品JSONの出力先
    pub output_dir: PathBuf,
    /// `{assets_dir}/{code}/manual.pdf` など
    pub assets_dir: PathBuf,
    pub checkpoint_path: PathBuf,
    pub final_output_path: PathBuf,
    /// 商品出力の固定名称
    pub product_name: String,
    /// 全階層を通した商品数の上限（`None` で無制限）
    pub product_limit: Option<usize>,
    pub page_delay: Duration,
    pub request_timeout: Duration,
    pub request_retries: u32,
    pub request_retry_delay: Duration,
    pub download_timeout: Duration,
    pub download_retries: u32,
    pub download_retry_delay: Duration,
    pub max_attempts: u32,
    pub cooldown: Duration,
}

impl Default for CatalogConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            user_agent: "Mozilla/5.0".to_string(),
            output_dir: PathBuf::from("output"),
            assets_dir: PathBuf::from("output/assets"),
            checkpoint_path: PathBuf::from("checkpoint.json"),
            final_output_path: PathBuf::from("final_output.json"),
            product_name: DEFAULT_PRODUCT_NAME.to_string(),
            product_limit: Some(15),
            page_delay: Duration::ZERO,
            request_timeout: Duration::from_secs(30),
            request_retries: 3,
            request_retry_delay: Duration::from_secs(2),
            download_timeout: Duration::from_secs(30),
            download_retries: 5,
            download_retry_delay: Duration::from_secs(10),
            max_attempts: 5,
            cooldown: Duration::from_secs(60),
        }
    }
}

impl CatalogConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// 環境変数で既定値を上書き
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(url) = std::env::var("CATALOG_BASE_URL") {
            config.base_url = url;
        }
        if let Ok(dir) = std::env::var("CATALOG_OUTPUT_DIR") {
            config = config.with_output_dir(dir);
        }
        if let Ok(limit) = std::env::var("CATALOG_PRODUCT_LIMIT") {
            match parse_limit(&limit) {
                Some(limit) => config.product_limit = limit,
                None => warn!(value = %limit, "ignoring invalid CATALOG_PRODUCT_LIMIT"),
            }
        }
        if let Ok(attempts) = std::env::var("CATALOG_MAX_ATTEMPTS") {
            match attempts.parse() {
                Ok(n) => config.max_attempts = n,
                Err(_) => warn!(value = %attempts, "ignoring invalid CATALOG_MAX_ATTEMPTS"),
            }
        }
        if let Ok(secs) = std::env::var("CATALOG_COOLDOWN_SECS") {
            match secs.parse() {
                Ok(n) => config.cooldown = Duration::from_secs(n),
                Err(_) => warn!(value = %secs, "ignoring invalid CATALOG_COOLDOWN_SECS"),
            }
        }

        config
    }

    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into();
        self
    }

    /// 出力ディレクトリを変更（assets は `{dir}/assets` に追従）
    pub fn with_output_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.output_dir = dir.into();
        self.assets_dir = self.output_dir.join("assets");
        self
    }

    pub fn with_checkpoint_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.checkpoint_path = path.into();
        self
    }

    pub fn with_final_output_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.final_output_path = path.into();
        self
    }

    pub fn with_product_limit(mut self, limit: Option<usize>) -> Self {
        self.product_limit = limit;
        self
    }

    pub fn with_max_attempts(mut self, attempts: u32) -> Self {
        self.max_attempts = attempts;
        self
    }

    pub fn with_cooldown(mut self, cooldown: Duration) -> Self {
        self.cooldown = cooldown;
        self
    }

    pub fn with_download_retry(mut self, retries: u32, delay: Duration) -> Self {
        self.download_retries = retries;
        self.download_retry_delay = delay;
        self
    }

    pub fn with_request_retry(mut self, retries: u32, delay: Duration) -> Self {
        self.request_retries = retries;
        self.request_retry_delay = delay;
        self
    }

    /// カテゴリAPI（`category` 指定なしでトップレベル）
    pub fn category_url(&self, category: Option<&str>) -> String {
        let mut url = format!(
            "{}/api/products?include=results&language=en-US&include=filters&include=category&pageSize=10",
            self.base_url
        );
        if let Some(id) = category {
            url.push_str("&category=");
            url.push_str(id);
        }
        url
    }

    pub fn products_page_url(&self, category: &str, page: u32) -> String {
        format!(
            "{}/api/products?include=results&language=en-US&pageIndex={}&pageSize=100&category={}",
            self.base_url, page, category
        )
    }

    pub fn manual_url(&self, code: &str) -> String {
        format!("{}/api/products/{}/infopacket", self.base_url, code)
    }

    pub fn image_url(&self, image_id: &str) -> String {
        format!("{}/api/images/{}", self.base_url, image_id)
    }

    pub fn drawings_url(&self, code: &str) -> String {
        format!("{}/api/products/{}/drawings", self.base_url, code)
    }

    pub fn drawing_url(&self, code: &str, number: &str) -> String {
        format!("{}/api/products/{}/drawings/{}", self.base_url, code, number)
    }

    pub fn parts_url(&self, code: &str) -> String {
        format!("{}/catalog/{}?tab=%22parts%22", self.base_url, code)
    }
}

/// `none` / `off` は無制限
fn parse_limit(value: &str) -> Option<Option<usize>> {
    match value.trim().to_ascii_lowercase().as_str() {
        "none" | "off" => Some(None),
        v => v.parse().ok().map(Some),
    }
}
