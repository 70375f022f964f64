//! 商品ごとのサブリクエスト（図面選択・BOM取得）
//!
//! それぞれ独立したベストエフォート処理で、片方の失敗で商品を落とさない。

use scraper::{Html, Selector};
use tracing::{debug, info, warn};

use crate::config::CatalogConfig;
use crate::error::CatalogError;
use crate::traits::Transport;

use super::types::{sub_subcategories_mut, BomItem, Category, Product};

/// 優先して選ぶ図面種別
pub const PREFERRED_DRAWING_KIND: &str = "DimensionSheet";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EnrichStats {
    pub enriched: usize,
    /// 前回実行で処理済み
    pub skipped: usize,
    /// code なしで除外
    pub dropped: usize,
}

pub struct ProductEnricher<'a, T: Transport + ?Sized> {
    transport: &'a T,
    config: &'a CatalogConfig,
}

impl<'a, T: Transport + ?Sized> ProductEnricher<'a, T> {
    pub fn new(transport: &'a T, config: &'a CatalogConfig) -> Self {
        Self { transport, config }
    }

    pub async fn enrich(&self, categories: &mut [Category]) -> Result<EnrichStats, CatalogError> {
        let mut stats = EnrichStats::default();

        for subsub in sub_subcategories_mut(categories) {
            let before = subsub.product.len();
            subsub.product.retain(|p| p.code().is_some());
            let dropped = before - subsub.product.len();
            if dropped > 0 {
                debug!(
                    sub_subcategory = %subsub.info.id,
                    dropped, "Dropped products without code"
                );
            }
            stats.dropped += dropped;

            for product in subsub.product.iter_mut() {
                if product.enriched {
                    stats.skipped += 1;
                    continue;
                }
                self.enrich_product(product).await?;
                stats.enriched += 1;
            }
        }

        info!(
            "Enrichment finished: enriched={}, skipped={}, dropped={}",
            stats.enriched, stats.skipped, stats.dropped
        );
        Ok(stats)
    }

    /// 図面URLとBOMを付与。一時エラー以外は商品単位で握りつぶす
    pub async fn enrich_product(&self, product: &mut Product) -> Result<(), CatalogError> {
        let Some(code) = product.code().map(str::to_string) else {
            return Ok(());
        };

        product.dwg = match self.resolve_drawing(&code).await {
            Ok(number) => number.map(|n| self.config.drawing_url(&code, &n)),
            Err(e) if e.is_transient() => return Err(e),
            Err(e) => {
                warn!("dwg {}: {}", code, e);
                None
            }
        };

        product.bom = match self.scrape_bom(&code).await {
            Ok(bom) => bom,
            Err(e) if e.is_transient() => return Err(e),
            Err(e) => {
                warn!("bom {}: {}", code, e);
                Vec::new()
            }
        };

        product.enriched = true;
        info!(
            code = %code,
            drawing = ?product.dwg,
            bom_rows = product.bom.len(),
            "Enriched product"
        );
        Ok(())
    }

    /// 図面一覧XMLから番号を選ぶ。取得できなければ `None`
    pub async fn resolve_drawing(&self, code: &str) -> Result<Option<String>, CatalogError> {
        let url = self.config.drawings_url(code);
        let response = self
            .transport
            .get(&url, &[("Accept", "application/xml")], self.config.request_timeout)
            .await?;

        if !response.is_success() {
            debug!(code, status = response.status, "Drawing list unavailable");
            return Ok(None);
        }

        let text = response.text();
        let text = text.trim();
        if !text.starts_with('<') {
            return Ok(None);
        }
        Ok(select_drawing_number(text))
    }

    pub async fn scrape_bom(&self, code: &str) -> Result<Vec<BomItem>, CatalogError> {
        let url = self.config.parts_url(code);
        let html = self
            .transport
            .get(&url, &[("Accept", "text/html")], self.config.request_timeout)
            .await?
            .error_for_status(&url)?
            .text();

        parse_bom(&html)
    }
}

/// `DimensionSheet` があれば順序に関係なくそれ、なければ番号を持つ最初の図面
///
/// 不正なXMLは `None`。
pub fn select_drawing_number(xml: &str) -> Option<String> {
    let document = match roxmltree::Document::parse(xml) {
        Ok(document) => document,
        Err(e) => {
            debug!("Malformed drawing list: {}", e);
            return None;
        }
    };

    let mut first = None;
    for drawing in document
        .descendants()
        .filter(|n| n.is_element() && n.tag_name().name() == "Drawing")
    {
        let child_text = |name: &str| {
            drawing
                .children()
                .find(|c| c.is_element() && c.tag_name().name() == name)
                .map(|c| c.text().unwrap_or_default().trim().to_string())
        };

        let Some(number) = child_text("Number").filter(|n| !n.is_empty()) else {
            continue;
        };

        if child_text("Kind").as_deref() == Some(PREFERRED_DRAWING_KIND) {
            return Some(number);
        }
        if first.is_none() {
            first = Some(number);
        }
    }

    first
}

/// 部品表テーブル（`table tbody tr`）の先頭3セル
pub fn parse_bom(html: &str) -> Result<Vec<BomItem>, CatalogError> {
    let row_selector = Selector::parse("table tbody tr")
        .map_err(|e| CatalogError::Parse(format!("invalid row selector: {}", e)))?;
    let cell_selector = Selector::parse("td")
        .map_err(|e| CatalogError::Parse(format!("invalid cell selector: {}", e)))?;

    let document = Html::parse_document(html);
    let mut bom = Vec::new();

    for row in document.select(&row_selector) {
        let cells: Vec<String> = row
            .select(&cell_selector)
            .map(|cell| cell.text().map(str::trim).collect())
            .collect();

        if cells.len() < 3 || cells[0].is_empty() {
            continue;
        }

        bom.push(BomItem {
            part_number: cells[0].clone(),
            description: cells[1].clone(),
            quantity: cells[2].clone(),
        });
    }

    Ok(bom)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::baldor::types::{SubSubcategory, Subcategory};
    use crate::test_utils::FakeTransport;

    const DRAWINGS_XML: &str = r#"<?xml version="1.0" encoding="utf-8"?>
<ArrayOfDrawing xmlns="http://schemas.datacontract.org/2004/07/Baldor">
  <Drawing><Kind>Connection</Kind><Number>CD0001</Number></Drawing>
  <Drawing><Kind>Outline</Kind></Drawing>
  <Drawing><Kind>DimensionSheet</Kind><Number>DS1234</Number></Drawing>
</ArrayOfDrawing>"#;

    const PARTS_HTML: &str = r#"<html><body>
<table>
  <thead><tr><th>Part</th><th>Description</th><th>Qty</th></tr></thead>
  <tbody>
    <tr><td> 051000321 </td><td>Bearing, ball</td><td>1</td></tr>
    <tr><td></td><td>Missing part number</td><td>2</td></tr>
    <tr><td>only</td><td>two cells</td></tr>
    <tr><td>AB12</td><td>Fan cover</td><td> 1.00 EA </td></tr>
  </tbody>
</table>
</body></html>"#;

    #[test]
    fn test_dimension_sheet_preferred_regardless_of_order() {
        assert_eq!(select_drawing_number(DRAWINGS_XML).as_deref(), Some("DS1234"));
    }

    #[test]
    fn test_first_numbered_drawing_as_fallback() {
        let xml = r#"<Drawings>
            <Drawing><Kind>Outline</Kind><Number></Number></Drawing>
            <Drawing><Kind>Outline</Kind><Number>OL-1</Number></Drawing>
            <Drawing><Kind>Connection</Kind><Number>CN-2</Number></Drawing>
        </Drawings>"#;
        assert_eq!(select_drawing_number(xml).as_deref(), Some("OL-1"));
    }

    #[test]
    fn test_malformed_or_empty_drawing_list() {
        assert_eq!(select_drawing_number("<Drawings><Drawing>"), None);
        assert_eq!(select_drawing_number("<Drawings/>"), None);
    }

    #[test]
    fn test_parse_bom() {
        let bom = parse_bom(PARTS_HTML).unwrap();
        assert_eq!(bom.len(), 2);
        assert_eq!(bom[0].part_number, "051000321");
        assert_eq!(bom[0].description, "Bearing, ball");
        assert_eq!(bom[0].quantity, "1");
        // 妥当性チェックはここでは行わない
        assert_eq!(bom[1].part_number, "AB12");
        assert_eq!(bom[1].quantity, "1.00 EA");
    }

    #[test]
    fn test_parse_bom_without_table() {
        assert!(parse_bom("<p>no parts</p>").unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_enrich_product() {
        let config = CatalogConfig::new().with_base_url("http://fake");
        let transport = FakeTransport::new()
            .route(config.drawings_url("M1"), 200, DRAWINGS_XML)
            .route(config.parts_url("M1"), 200, PARTS_HTML);
        let enricher = ProductEnricher::new(&transport, &config);

        let mut product = Product::with_code("M1");
        enricher.enrich_product(&mut product).await.unwrap();

        assert!(product.enriched);
        assert_eq!(
            product.dwg.as_deref(),
            Some("http://fake/api/products/M1/drawings/DS1234")
        );
        assert_eq!(product.bom.len(), 2);
    }

    #[tokio::test]
    async fn test_subrequest_failures_keep_product() {
        let config = CatalogConfig::new().with_base_url("http://fake");
        let transport = FakeTransport::new()
            .route(config.drawings_url("M1"), 200, "not xml at all")
            .network_error(config.parts_url("M1"));
        let enricher = ProductEnricher::new(&transport, &config);

        let mut product = Product::with_code("M1");
        enricher.enrich_product(&mut product).await.unwrap();

        assert!(product.enriched);
        assert!(product.dwg.is_none());
        assert!(product.bom.is_empty());
    }

    #[tokio::test]
    async fn test_enrich_drops_codeless_and_skips_enriched() {
        let config = CatalogConfig::new().with_base_url("http://fake");
        let transport = FakeTransport::new();
        let enricher = ProductEnricher::new(&transport, &config);

        let mut done = Product::with_code("DONE");
        done.enriched = true;
        let mut subsub = SubSubcategory::new("ss");
        subsub.product = vec![Product::default(), Product::with_code(""), done, Product::with_code("NEW")];
        let mut sub = Subcategory::new("s");
        sub.sub_subcategory.push(subsub);
        let mut category = Category::new("c");
        category.subcategories.push(sub);
        let mut categories = vec![category];

        let stats = enricher.enrich(&mut categories).await.unwrap();
        assert_eq!(
            stats,
            EnrichStats {
                enriched: 1,
                skipped: 1,
                dropped: 2
            }
        );

        let remaining = &categories[0].subcategories[0].sub_subcategory[0].product;
        assert_eq!(remaining.len(), 2);
        assert_eq!(transport.request_count("/DONE"), 0);
        assert_eq!(transport.request_count("/NEW"), 2);
    }

    #[tokio::test]
    async fn test_transient_subrequest_escalates() {
        let config = CatalogConfig::new().with_base_url("http://fake");
        let transport = FakeTransport::new().transient_until_reset("/drawings", 1);
        let enricher = ProductEnricher::new(&transport, &config);

        let mut product = Product::with_code("M1");
        let err = enricher.enrich_product(&mut product).await.unwrap_err();
        assert!(err.is_transient());
        assert!(!product.enriched);
    }
}
