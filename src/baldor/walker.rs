//! カテゴリ階層のクロール
//!
//! categories → subcategories → sub-subcategories → products の4段階。
//! 各段階は上流の結果をその場で書き換える。

use std::ops::ControlFlow;

use serde_json::Value;
use tokio::time::sleep;
use tracing::{debug, error, info};

use crate::config::CatalogConfig;
use crate::error::CatalogError;
use crate::traits::Transport;

use super::types::{
    json_string, sub_subcategories_mut, Category, NodeInfo, Product, SubSubcategory, Subcategory,
};

pub struct CatalogWalker<'a, T: Transport + ?Sized> {
    transport: &'a T,
    config: &'a CatalogConfig,
}

impl<'a, T: Transport + ?Sized> CatalogWalker<'a, T> {
    pub fn new(transport: &'a T, config: &'a CatalogConfig) -> Self {
        Self { transport, config }
    }

    /// 4段階すべてを実行
    pub async fn walk(&self) -> Result<Vec<Category>, CatalogError> {
        let mut categories = self.fetch_categories().await?;
        self.fetch_subcategories(&mut categories).await?;
        self.fetch_sub_subcategories(&mut categories).await?;
        let collected = self.fetch_products(&mut categories).await?;
        info!(
            "Catalog walk finished: {} categories, {} products",
            categories.len(),
            collected
        );
        Ok(categories)
    }

    /// 第1階層。失敗時は空リスト
    pub async fn fetch_categories(&self) -> Result<Vec<Category>, CatalogError> {
        let url = self.config.category_url(None);
        info!(url = %url, "Fetching main categories");

        match self.fetch_children(&url).await {
            Ok(children) => Ok(children.into_iter().map(Category::from_info).collect()),
            Err(e) if e.is_transient() => Err(e),
            Err(e) => {
                error!("Error fetching categories: {}", e);
                Ok(Vec::new())
            }
        }
    }

    pub async fn fetch_subcategories(&self, categories: &mut [Category]) -> Result<(), CatalogError> {
        for category in categories.iter_mut() {
            let url = self.config.category_url(Some(&category.info.id));
            info!(category = %category.info.id, "Fetching subcategories");

            category.subcategories = match self.fetch_children(&url).await {
                Ok(children) => children.into_iter().map(Subcategory::from_info).collect(),
                Err(e) if e.is_transient() => return Err(e),
                Err(e) => {
                    error!(
                        "Error fetching subcategories for category {}: {}",
                        category.info.id, e
                    );
                    Vec::new()
                }
            };
        }
        Ok(())
    }

    pub async fn fetch_sub_subcategories(
        &self,
        categories: &mut [Category],
    ) -> Result<(), CatalogError> {
        for subcategory in categories.iter_mut().flat_map(|c| c.subcategories.iter_mut()) {
            let url = self.config.category_url(Some(&subcategory.info.id));
            info!(subcategory = %subcategory.info.id, "Fetching sub-subcategories");

            subcategory.sub_subcategory = match self.fetch_children(&url).await {
                Ok(children) => children.into_iter().map(SubSubcategory::from_info).collect(),
                Err(e) if e.is_transient() => return Err(e),
                Err(e) => {
                    error!(
                        "Error fetching sub-subcategories for subcategory {}: {}",
                        subcategory.info.id, e
                    );
                    Vec::new()
                }
            };
        }
        Ok(())
    }

    /// 商品一覧（ページング）
    ///
    /// `product_limit` は全階層の合計に対する上限。到達した時点で走査全体を打ち切る。
    /// 戻り値は収集した商品数。
    pub async fn fetch_products(&self, categories: &mut [Category]) -> Result<usize, CatalogError> {
        let mut collected = 0;
        if self.limit_reached(collected) {
            return Ok(collected);
        }

        for subsub in sub_subcategories_mut(categories) {
            if self.fetch_product_pages(subsub, &mut collected).await?.is_break() {
                info!(
                    "Limit of {} products reached. Stopping collection.",
                    collected
                );
                break;
            }
        }
        Ok(collected)
    }

    async fn fetch_product_pages(
        &self,
        subsub: &mut SubSubcategory,
        collected: &mut usize,
    ) -> Result<ControlFlow<()>, CatalogError> {
        subsub.product.clear();
        let mut page = 1;

        loop {
            let url = self.config.products_page_url(&subsub.info.id, page);
            info!(sub_subcategory = %subsub.info.id, page, "Fetching products page");

            let matches = match self.fetch_matches(&url).await {
                Ok(matches) => matches,
                Err(e) if e.is_transient() => return Err(e),
                Err(e) => {
                    error!(
                        "Error on sub-subcategory {} page {}: {}",
                        subsub.info.id, page, e
                    );
                    break;
                }
            };

            if matches.is_empty() {
                break;
            }

            for item in &matches {
                let product = self.product_from_listing(item);
                debug!(code = ?product.code, "Listed product");
                subsub.product.push(product);
                *collected += 1;

                if self.limit_reached(*collected) {
                    return Ok(ControlFlow::Break(()));
                }
            }

            page += 1;
            if !self.config.page_delay.is_zero() {
                sleep(self.config.page_delay).await;
            }
        }

        Ok(ControlFlow::Continue(()))
    }

    fn limit_reached(&self, collected: usize) -> bool {
        self.config
            .product_limit
            .map(|limit| collected >= limit)
            .unwrap_or(false)
    }

    async fn get_json(&self, url: &str) -> Result<Value, CatalogError> {
        self.transport
            .get(url, &[], self.config.request_timeout)
            .await?
            .error_for_status(url)?
            .json()
    }

    async fn fetch_children(&self, url: &str) -> Result<Vec<NodeInfo>, CatalogError> {
        let payload = self.get_json(url).await?;

        let children = payload
            .get("category")
            .and_then(|c| c.get("children"))
            .and_then(Value::as_array)
            .map(|children| {
                children
                    .iter()
                    .filter_map(|child| {
                        let info = NodeInfo::from_json(child);
                        if info.is_none() {
                            debug!("Skipping category entry without id: {}", child);
                        }
                        info
                    })
                    .collect()
            })
            .unwrap_or_default();

        Ok(children)
    }

    async fn fetch_matches(&self, url: &str) -> Result<Vec<Value>, CatalogError> {
        let payload = self.get_json(url).await?;
        Ok(extract_matches(&payload))
    }

    /// 一覧の1件を商品レコードに変換（ベンダー属性もここで取り込む）
    pub fn product_from_listing(&self, item: &Value) -> Product {
        let code = item.get("code").and_then(json_string);
        let image_id = item
            .get("imageId")
            .and_then(json_string)
            .filter(|id| !id.is_empty());

        let mut product = Product {
            pdf: code.as_deref().map(|c| self.config.manual_url(c)),
            img: image_id.as_deref().map(|id| self.config.image_url(id)),
            description: item.get("description").and_then(json_string),
            upc: item.get("upc").and_then(json_string),
            usd: item
                .get("listPrice")
                .and_then(|p| p.get("amount"))
                .filter(|v| !v.is_null())
                .cloned(),
            code,
            image_id,
            ..Default::default()
        };

        let attributes = item.get("attributes").and_then(Value::as_array);
        for attr in attributes.into_iter().flatten() {
            let name = attr
                .get("name")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_lowercase();
            if name.is_empty() {
                continue;
            }

            let first = attr
                .get("values")
                .and_then(Value::as_array)
                .and_then(|values| values.first());
            if let Some(first) = first {
                let value = first.get("value").cloned().unwrap_or(Value::Null);
                product.attributes.insert(name, value);
            }
        }

        product
    }
}

/// `results.matches`、または `results` 自体が配列ならそれ
fn extract_matches(payload: &Value) -> Vec<Value> {
    match payload.get("results") {
        Some(Value::Array(items)) => items.clone(),
        Some(results) => results
            .get("matches")
            .and_then(Value::as_array)
            .cloned()
            .unwrap_or_default(),
        None => Vec::new(),
    }
}
