//! 出力整形
//!
//! 商品ごとのJSONを書き出し、それを読み戻してカテゴリ階層に差し込む。

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use base64::Engine;
use tracing::{error, info};

use crate::checkpoint::write_atomic;
use crate::config::CatalogConfig;
use crate::error::CatalogError;

use super::types::{
    products, sub_subcategories_mut, AssetRole, AssetSlots, BomItem, Category, FinalCategory,
    FinalSubSubcategory, FinalSubcategory, Product, ProductDocument, Specs,
};

/// BOM 行の妥当性（part_number 6文字以上、description / quantity が空でない）
pub fn is_valid_bom_item(item: &BomItem) -> bool {
    item.part_number.trim().chars().count() >= 6
        && !item.description.trim().is_empty()
        && !item.quantity.trim().is_empty()
}

pub fn clean_bom(categories: &mut [Category]) {
    for product in sub_subcategories_mut(categories).flat_map(|ss| ss.product.iter_mut()) {
        product.bom.retain(is_valid_bom_item);
    }
}

pub fn mime_for_extension(extension: &str) -> Option<&'static str> {
    match extension.to_ascii_lowercase().as_str() {
        "pdf" => Some("application/pdf"),
        "dwg" => Some("image/vnd.dwg"),
        "png" => Some("image/png"),
        "jpg" | "jpeg" => Some("image/jpeg"),
        _ => None,
    }
}

fn extension_for_mime(mime: &str) -> Option<&'static str> {
    match mime {
        "application/pdf" => Some("pdf"),
        "image/vnd.dwg" => Some("dwg"),
        "image/png" => Some("png"),
        "image/jpeg" => Some("jpg"),
        _ => None,
    }
}

/// ファイルを `data:<mime>;base64,...` に変換
pub fn encode_data_uri(path: &Path) -> Result<String, CatalogError> {
    let extension = path
        .extension()
        .map(|e| e.to_string_lossy().into_owned())
        .unwrap_or_default();
    let mime = mime_for_extension(&extension).ok_or_else(|| {
        CatalogError::Encoding(format!("unsupported file type: {:?}", path))
    })?;

    let content = std::fs::read(path)?;
    let encoded = base64::engine::general_purpose::STANDARD.encode(content);
    Ok(format!("data:{};base64,{}", mime, encoded))
}

/// data URI（またはプレフィックスなしのbase64）をデコード
///
/// 戻り値は (mime, 拡張子, 内容)。プレフィックスなしなら mime は `None`。
pub fn decode_data_uri(
    payload: &str,
) -> Result<(Option<String>, Option<&'static str>, Vec<u8>), CatalogError> {
    let (mime, data) = match payload
        .strip_prefix("data:")
        .and_then(|rest| rest.split_once(";base64,"))
    {
        Some((mime, data)) => (Some(mime.to_string()), data),
        None => (None, payload),
    };

    let content = base64::engine::general_purpose::STANDARD
        .decode(data.trim())
        .map_err(|e| CatalogError::Encoding(e.to_string()))?;
    let extension = mime.as_deref().and_then(extension_for_mime);
    Ok((mime, extension, content))
}

pub struct OutputAssembler<'a> {
    config: &'a CatalogConfig,
}

impl<'a> OutputAssembler<'a> {
    pub fn new(config: &'a CatalogConfig) -> Self {
        Self { config }
    }

    /// BOM整理 → 商品JSON出力 → 読み戻して階層に統合
    pub fn assemble(&self, categories: &mut [Category]) -> Result<Vec<FinalCategory>, CatalogError> {
        clean_bom(categories);
        let written = self.emit_product_documents(categories)?;
        info!("Wrote {} product documents", written.len());

        let documents = self.load_documents()?;
        Ok(self.fold(categories, &documents))
    }

    /// `{output_dir}/{code}.json` を商品ごとに出力
    pub fn emit_product_documents(
        &self,
        categories: &[Category],
    ) -> Result<Vec<PathBuf>, CatalogError> {
        std::fs::create_dir_all(&self.config.output_dir)?;
        let mut written = Vec::new();

        for product in products(categories) {
            let Some(code) = product.code() else {
                continue;
            };

            let document = self.build_document(code, product);
            let path = self.config.output_dir.join(format!("{}.json", code));
            let json = serde_json::to_string_pretty(&document)?;
            write_atomic(&path, json.as_bytes())?;
            written.push(path);
        }

        Ok(written)
    }

    /// ダウンロード段階で `product.files` に記録されたファイルから組み立てる
    pub fn build_document(&self, code: &str, product: &Product) -> ProductDocument {
        let mut assets = AssetSlots::default();
        let mut docs_base64 = AssetSlots::default();

        for role in AssetRole::ALL {
            let Some(path) = product.files.get(role).filter(|p| p.is_file()) else {
                continue;
            };

            assets.set(role, Some(format!("assets/{}/{}", code, role.file_name())));
            let encoded = match encode_data_uri(path) {
                Ok(encoded) => Some(encoded),
                Err(e) => {
                    error!("Error encoding {:?} ({}): {}", path, role.label(), e);
                    None
                }
            };
            docs_base64.set(role, encoded);
        }

        ProductDocument {
            product_id: code.to_string(),
            name: self.config.product_name.clone(),
            description: product.description.clone(),
            upc: product.upc.clone(),
            usd: product.usd.clone(),
            specs: Specs {
                hp: product.attribute_string("output_at_frequency"),
                voltage: product.attribute_string("voltage_at_frequency"),
                rpm: product.attribute_string("synchronous_speed_at_freq"),
                frame: product.attribute_string("frame"),
            },
            bom: product.bom.clone(),
            assets,
            docs_base64,
        }
    }

    /// 出力ディレクトリの `*.json` を product_id で索引化
    pub fn load_documents(&self) -> Result<HashMap<String, ProductDocument>, CatalogError> {
        let mut documents = HashMap::new();
        if !self.config.output_dir.is_dir() {
            return Ok(documents);
        }

        for entry in std::fs::read_dir(&self.config.output_dir)? {
            let path = entry?.path();
            let is_json = path.extension().is_some_and(|e| e == "json");
            if !is_json || !path.is_file() {
                continue;
            }

            let parsed = std::fs::read(&path)
                .map_err(CatalogError::from)
                .and_then(|content| Ok(serde_json::from_slice::<ProductDocument>(&content)?));
            match parsed {
                Ok(document) if !document.product_id.is_empty() => {
                    documents.insert(document.product_id.clone(), document);
                }
                Ok(_) => {}
                Err(e) => error!("Error loading product JSON {:?}: {}", path, e),
            }
        }

        Ok(documents)
    }

    /// 階層を再構築し、各商品を出力JSONで置き換える（JSONがない商品は省く）
    pub fn fold(
        &self,
        categories: &[Category],
        documents: &HashMap<String, ProductDocument>,
    ) -> Vec<FinalCategory> {
        categories
            .iter()
            .map(|category| FinalCategory {
                category_id: category.info.id.clone(),
                name: category.info.text.clone(),
                count: category.info.count,
                subcategories: category
                    .subcategories
                    .iter()
                    .map(|sub| FinalSubcategory {
                        subcategory_id: sub.info.id.clone(),
                        name: sub.info.text.clone(),
                        count: sub.info.count,
                        sub_subcategory: sub
                            .sub_subcategory
                            .iter()
                            .map(|subsub| FinalSubSubcategory {
                                sub_subcategory_id: subsub.info.id.clone(),
                                name: subsub.info.text.clone(),
                                count: subsub.info.count,
                                product: subsub
                                    .product
                                    .iter()
                                    .filter_map(|p| p.code().and_then(|code| documents.get(code)))
                                    .cloned()
                                    .collect(),
                            })
                            .collect(),
                    })
                    .collect(),
            })
            .collect()
    }
}
