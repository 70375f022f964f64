//! パイプライン全体の制御
//!
//! Start → (Resume | Fresh) → Walk → Enrich → Download → Assemble → Done。
//! 試行中のエラーは RetryWait を経て先頭からやり直し、上限に達したら Aborted。
//! 再試行はチェックポイントのフェーズ境界から再開する。

use std::path::PathBuf;

use chrono::Utc;
use tokio::time::sleep;
use tracing::{debug, error, info, warn};

use crate::checkpoint::{write_atomic, Checkpoint, CheckpointStore};
use crate::config::CatalogConfig;
use crate::error::CatalogError;
use crate::traits::Transport;

use super::downloader::AssetDownloader;
use super::enricher::{EnrichStats, ProductEnricher};
use super::output::OutputAssembler;
use super::types::{FinalCategory, Phase};
use super::walker::CatalogWalker;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineState {
    Start,
    Resume(Phase),
    Fresh,
    Walk,
    Enrich,
    Download,
    Assemble,
    Done,
    RetryWait,
    Aborted,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunReport {
    pub attempts: u32,
    /// チェックポイント保存 + セッションリセット + クールダウンの回数
    pub recoveries: u32,
    /// 既存チェックポイントから再開したか
    pub resumed: bool,
    /// 成功したチェックポイント保存の回数（フェーズ境界 + 失敗時）
    pub checkpoint_saves: u32,
    pub enrich: EnrichStats,
    /// ダウンロード段階後にディスク上にあるファイル数
    pub downloaded_files: usize,
}

#[derive(Debug, Clone)]
pub struct PipelineOutput {
    pub output_path: PathBuf,
    pub categories: Vec<FinalCategory>,
    pub report: RunReport,
}

pub struct Pipeline<T: Transport> {
    config: CatalogConfig,
    transport: T,
    store: CheckpointStore,
    state: PipelineState,
}

impl<T: Transport> Pipeline<T> {
    pub fn new(config: CatalogConfig, transport: T) -> Self {
        let store = CheckpointStore::new(config.checkpoint_path.clone());
        Self {
            config,
            transport,
            store,
            state: PipelineState::Start,
        }
    }

    pub fn state(&self) -> PipelineState {
        self.state
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn checkpoint_store(&self) -> &CheckpointStore {
        &self.store
    }

    fn transition(&mut self, next: PipelineState) {
        debug!("Pipeline state {:?} -> {:?}", self.state, next);
        self.state = next;
    }

    /// 最終JSONを書き出すまで実行
    pub async fn run(&mut self) -> Result<PipelineOutput, CatalogError> {
        let max_attempts = self.config.max_attempts.max(1);
        let mut progress: Option<Checkpoint> = None;
        let mut report = RunReport::default();
        self.transition(PipelineState::Start);

        for attempt in 1..=max_attempts {
            report.attempts = attempt;
            info!("Pipeline attempt {}/{}", attempt, max_attempts);

            match self.attempt(&mut progress, &mut report).await {
                Ok(categories) => return self.finish(categories, report),
                Err(e) => {
                    error!("Pipeline attempt {}/{} failed: {}", attempt, max_attempts, e);
                    self.transition(PipelineState::RetryWait);

                    if let Some(checkpoint) = progress.as_mut() {
                        checkpoint.saved_at = Utc::now();
                        match self.store.save(checkpoint) {
                            Ok(()) => report.checkpoint_saves += 1,
                            Err(e) => error!("Failed to persist checkpoint: {}", e),
                        }
                    }

                    if attempt < max_attempts {
                        self.transport.reset_session();
                        report.recoveries += 1;
                        info!("Cooling down for {:?} before retry", self.config.cooldown);
                        sleep(self.config.cooldown).await;
                    }
                }
            }
        }

        self.transition(PipelineState::Aborted);
        warn!(
            "Pipeline aborted after {} attempts; checkpoint kept at {:?}",
            max_attempts,
            self.store.path()
        );
        Err(CatalogError::RetriesExhausted {
            attempts: max_attempts,
        })
    }

    async fn attempt(
        &mut self,
        progress: &mut Option<Checkpoint>,
        report: &mut RunReport,
    ) -> Result<Vec<FinalCategory>, CatalogError> {
        if progress.is_none() {
            *progress = Some(self.load_or_walk(report).await?);
        }
        let Some(checkpoint) = progress.as_mut() else {
            return Err(CatalogError::Checkpoint("no pipeline state".into()));
        };

        if checkpoint.phase == Phase::Walked {
            self.transition(PipelineState::Enrich);
            report.enrich = ProductEnricher::new(&self.transport, &self.config)
                .enrich(&mut checkpoint.categories)
                .await?;
            self.advance(checkpoint, Phase::Enriched, report)?;
        }

        if checkpoint.phase == Phase::Enriched {
            self.transition(PipelineState::Download);
            report.downloaded_files = AssetDownloader::new(&self.transport, &self.config)
                .download_all(&mut checkpoint.categories)
                .await?
                .len();
            self.advance(checkpoint, Phase::Downloaded, report)?;
        }

        self.transition(PipelineState::Assemble);
        OutputAssembler::new(&self.config).assemble(&mut checkpoint.categories)
    }

    /// チェックポイントがあれば再開、なければ階層を取得して境界で保存
    async fn load_or_walk(&mut self, report: &mut RunReport) -> Result<Checkpoint, CatalogError> {
        if let Some(checkpoint) = self.store.load()? {
            self.transition(PipelineState::Resume(checkpoint.phase));
            report.resumed = true;
            return Ok(checkpoint);
        }

        self.transition(PipelineState::Fresh);
        self.transition(PipelineState::Walk);
        let categories = CatalogWalker::new(&self.transport, &self.config)
            .walk()
            .await?;

        let checkpoint = Checkpoint::new(Phase::Walked, categories);
        self.store.save(&checkpoint)?;
        report.checkpoint_saves += 1;
        Ok(checkpoint)
    }

    fn advance(
        &self,
        checkpoint: &mut Checkpoint,
        phase: Phase,
        report: &mut RunReport,
    ) -> Result<(), CatalogError> {
        checkpoint.phase = phase;
        checkpoint.saved_at = Utc::now();
        self.store.save(checkpoint)?;
        report.checkpoint_saves += 1;
        Ok(())
    }

    fn finish(
        &mut self,
        categories: Vec<FinalCategory>,
        report: RunReport,
    ) -> Result<PipelineOutput, CatalogError> {
        let path = self.config.final_output_path.clone();
        let json = serde_json::to_vec_pretty(&categories)?;
        write_atomic(&path, &json)?;
        self.store.clear()?;
        self.transition(PipelineState::Done);

        info!(
            "Final output written to {:?} ({} categories, {} attempts)",
            path,
            categories.len(),
            report.attempts
        );
        Ok(PipelineOutput {
            output_path: path,
            categories,
            report,
        })
    }
}

#[cfg(test)]
mod tests {
    use std::path::Path;
    use std::time::Duration;

    use serde_json::{json, Value};

    use super::*;
    use crate::baldor::types::{products, Category, Product, SubSubcategory, Subcategory};
    use crate::test_utils::FakeTransport;

    fn config(dir: &Path) -> CatalogConfig {
        CatalogConfig::new()
            .with_base_url("http://fake")
            .with_output_dir(dir.join("output"))
            .with_checkpoint_path(dir.join("checkpoint.json"))
            .with_final_output_path(dir.join("final_output.json"))
            .with_cooldown(Duration::ZERO)
            .with_download_retry(1, Duration::ZERO)
    }

    fn children(ids: &[&str]) -> Value {
        let children: Vec<Value> = ids
            .iter()
            .map(|id| json!({"id": id, "text": format!("node {}", id), "count": 5}))
            .collect();
        json!({"category": {"children": children}})
    }

    /// 2カテゴリ × 1サブ × 1サブサブ × 5商品
    fn catalog(config: &CatalogConfig) -> FakeTransport {
        let mut transport = FakeTransport::new()
            .json(config.category_url(None), children(&["1", "2"]))
            .json(config.category_url(Some("1")), children(&["11"]))
            .json(config.category_url(Some("2")), children(&["21"]))
            .json(config.category_url(Some("11")), children(&["111"]))
            .json(config.category_url(Some("21")), children(&["211"]));

        for leaf in ["111", "211"] {
            let matches: Vec<Value> = (0..5)
                .map(|i| {
                    json!({
                        "code": format!("P{}-{}", leaf, i),
                        "description": "AC motor",
                        "imageId": format!("img{}{}", leaf, i),
                        "listPrice": {"amount": 100 + i},
                        "attributes": [{"name": "Frame", "values": [{"value": "56C"}]}]
                    })
                })
                .collect();
            transport = transport
                .json(config.products_page_url(leaf, 1), json!({"results": {"matches": matches}}))
                .json(config.products_page_url(leaf, 2), json!({"results": {"matches": []}}));

            for i in 0..5 {
                let code = format!("P{}-{}", leaf, i);
                transport = transport
                    .route(config.manual_url(&code), 200, b"%PDF".to_vec())
                    .route(config.image_url(&format!("img{}{}", leaf, i)), 200, vec![0xFFu8, 0xD8])
                    .route(
                        config.drawings_url(&code),
                        200,
                        "<Drawings><Drawing><Kind>DimensionSheet</Kind><Number>DS1</Number></Drawing></Drawings>",
                    )
                    .route(config.drawing_url(&code, "DS1"), 200, b"AC1015".to_vec());
            }
        }

        transport
    }

    fn json_files(dir: &Path) -> usize {
        std::fs::read_dir(dir)
            .unwrap()
            .filter(|e| e.as_ref().unwrap().path().extension().is_some_and(|x| x == "json"))
            .count()
    }

    #[tokio::test]
    async fn test_end_to_end() {
        let dir = tempfile::tempdir().unwrap();
        let config = config(dir.path());
        let mut pipeline = Pipeline::new(config.clone(), catalog(&config));

        let output = pipeline.run().await.unwrap();

        assert_eq!(pipeline.state(), PipelineState::Done);
        assert_eq!(output.report.attempts, 1);
        assert_eq!(output.report.recoveries, 0);
        // walked / enriched / downloaded の各境界
        assert_eq!(output.report.checkpoint_saves, 3);
        assert_eq!(output.report.enrich.enriched, 10);
        assert_eq!(output.report.downloaded_files, 30);
        assert_eq!(output.categories.len(), 2);
        for category in &output.categories {
            assert_eq!(category.subcategories.len(), 1);
            assert_eq!(category.subcategories[0].sub_subcategory.len(), 1);
            assert_eq!(category.subcategories[0].sub_subcategory[0].product.len(), 5);
        }
        let doc = &output.categories[1].subcategories[0].sub_subcategory[0].product[0];
        assert_eq!(doc.product_id, "P211-0");
        assert_eq!(doc.specs.frame.as_deref(), Some("56C"));
        assert!(doc.docs_base64.cad.as_deref().unwrap().starts_with("data:image/vnd.dwg;base64,"));

        assert_eq!(json_files(&config.output_dir), 10);
        assert!(config.assets_dir.join("P111-0/manual.pdf").is_file());
        assert!(config.assets_dir.join("P111-0/cad.dwg").is_file());
        assert!(!config.checkpoint_path.exists());

        let written: Vec<FinalCategory> =
            serde_json::from_slice(&std::fs::read(&config.final_output_path).unwrap()).unwrap();
        assert_eq!(written, output.categories);
    }

    #[tokio::test]
    async fn test_codeless_products_absent_everywhere() {
        let dir = tempfile::tempdir().unwrap();
        let config = config(dir.path());
        let transport = FakeTransport::new()
            .json(config.category_url(None), children(&["1"]))
            .json(config.category_url(Some("1")), children(&["11"]))
            .json(config.category_url(Some("11")), children(&["111"]))
            .json(
                config.products_page_url("111", 1),
                json!({"results": {"matches": [{"code": "GOOD1"}, {"description": "no code", "imageId": "x"}]}}),
            )
            .json(config.products_page_url("111", 2), json!({"results": {"matches": []}}))
            .route(config.image_url("x"), 200, vec![1u8, 2, 3]);
        let mut pipeline = Pipeline::new(config.clone(), transport);

        let output = pipeline.run().await.unwrap();

        let products = &output.categories[0].subcategories[0].sub_subcategory[0].product;
        assert_eq!(products.len(), 1);
        assert_eq!(products[0].product_id, "GOOD1");
        assert_eq!(json_files(&config.output_dir), 1);
        assert_eq!(std::fs::read_dir(&config.assets_dir).unwrap().count(), 0);
        assert_eq!(pipeline.transport().request_count("/api/images/x"), 0);
    }

    #[tokio::test]
    async fn test_retry_resumes_from_checkpoint() {
        let dir = tempfile::tempdir().unwrap();
        let config = config(dir.path());
        let transport = catalog(&config).transient_until_reset("/drawings", 2);
        let mut pipeline = Pipeline::new(config.clone(), transport);

        let output = pipeline.run().await.unwrap();

        assert_eq!(output.report.attempts, 3);
        assert_eq!(output.report.recoveries, 2);
        assert_eq!(pipeline.transport().resets(), 2);
        // フェーズ境界の3回 + 失敗した2試行ごとの保存
        assert_eq!(output.report.checkpoint_saves, 5);
        // 階層の取得は最初の1回だけ
        assert_eq!(
            pipeline
                .transport()
                .requests()
                .iter()
                .filter(|url| **url == config.category_url(None))
                .count(),
            1
        );
        assert_eq!(output.categories.len(), 2);
        assert!(!config.checkpoint_path.exists());
    }

    #[tokio::test]
    async fn test_exhaustion_keeps_checkpoint() {
        let dir = tempfile::tempdir().unwrap();
        let config = config(dir.path()).with_max_attempts(2);
        let transport = catalog(&config).transient_until_reset("/drawings", 10);
        let mut pipeline = Pipeline::new(config.clone(), transport);

        let err = pipeline.run().await.unwrap_err();

        assert!(matches!(err, CatalogError::RetriesExhausted { attempts: 2 }));
        assert!(!err.is_client_error());
        assert_eq!(pipeline.state(), PipelineState::Aborted);
        assert_eq!(pipeline.transport().resets(), 1);

        let checkpoint = pipeline.checkpoint_store().load().unwrap().unwrap();
        assert_eq!(checkpoint.phase, Phase::Walked);
        assert_eq!(products(&checkpoint.categories).count(), 10);
        assert!(!config.final_output_path.exists());
    }

    #[tokio::test]
    async fn test_resume_skips_walk_and_enrichment() {
        let dir = tempfile::tempdir().unwrap();
        let config = config(dir.path());

        let mut product = Product::with_code("SAVED1");
        product.enriched = true;
        let mut subsub = SubSubcategory::new("111");
        subsub.product.push(product);
        let mut sub = Subcategory::new("11");
        sub.sub_subcategory.push(subsub);
        let mut category = Category::new("1");
        category.subcategories.push(sub);
        CheckpointStore::new(&config.checkpoint_path)
            .save(&Checkpoint::new(Phase::Enriched, vec![category]))
            .unwrap();

        let mut pipeline = Pipeline::new(config.clone(), FakeTransport::new());
        let output = pipeline.run().await.unwrap();

        assert!(output.report.resumed);
        assert!(pipeline.transport().requests().is_empty());
        assert_eq!(
            output.categories[0].subcategories[0].sub_subcategory[0].product[0].product_id,
            "SAVED1"
        );
        assert!(!config.checkpoint_path.exists());
    }
}
