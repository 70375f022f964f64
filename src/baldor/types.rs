//! Baldor カタログ関連の型定義

use std::collections::BTreeMap;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// カテゴリ各階層の共通項目
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NodeInfo {
    pub id: String,
    pub text: Option<String>,
    pub count: Option<u64>,
    #[serde(rename = "imageId")]
    pub image_id: Option<String>,
}

impl NodeInfo {
    /// `category.children` の要素から生成（id がなければ `None`）
    pub fn from_json(value: &Value) -> Option<Self> {
        Some(Self {
            id: value.get("id").and_then(json_string)?,
            text: value.get("text").and_then(json_string),
            count: value.get("count").and_then(Value::as_u64),
            image_id: value.get("imageId").and_then(json_string),
        })
    }
}

/// 第1階層
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Category {
    #[serde(flatten)]
    pub info: NodeInfo,
    #[serde(default)]
    pub subcategories: Vec<Subcategory>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Subcategory {
    #[serde(flatten)]
    pub info: NodeInfo,
    #[serde(default)]
    pub sub_subcategory: Vec<SubSubcategory>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SubSubcategory {
    #[serde(flatten)]
    pub info: NodeInfo,
    #[serde(default)]
    pub product: Vec<Product>,
}

impl Category {
    pub fn new(id: impl Into<String>) -> Self {
        Self::from_info(NodeInfo {
            id: id.into(),
            ..Default::default()
        })
    }

    pub fn from_info(info: NodeInfo) -> Self {
        Self {
            info,
            subcategories: Vec::new(),
        }
    }
}

impl Subcategory {
    pub fn new(id: impl Into<String>) -> Self {
        Self::from_info(NodeInfo {
            id: id.into(),
            ..Default::default()
        })
    }

    pub fn from_info(info: NodeInfo) -> Self {
        Self {
            info,
            sub_subcategory: Vec::new(),
        }
    }
}

impl SubSubcategory {
    pub fn new(id: impl Into<String>) -> Self {
        Self::from_info(NodeInfo {
            id: id.into(),
            ..Default::default()
        })
    }

    pub fn from_info(info: NodeInfo) -> Self {
        Self {
            info,
            product: Vec::new(),
        }
    }
}

/// BOM 1行
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BomItem {
    pub part_number: String,
    pub description: String,
    pub quantity: String,
}

/// ダウンロード済みファイルのローカルパス
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AssetFiles {
    pub manual: Option<PathBuf>,
    pub cad: Option<PathBuf>,
    pub image: Option<PathBuf>,
}

impl AssetFiles {
    pub fn set(&mut self, role: AssetRole, path: Option<PathBuf>) {
        match role {
            AssetRole::Manual => self.manual = path,
            AssetRole::Cad => self.cad = path,
            AssetRole::Image => self.image = path,
        }
    }

    pub fn get(&self, role: AssetRole) -> Option<&PathBuf> {
        match role {
            AssetRole::Manual => self.manual.as_ref(),
            AssetRole::Cad => self.cad.as_ref(),
            AssetRole::Image => self.image.as_ref(),
        }
    }
}

/// 商品レコード
///
/// 固定項目 + ベンダー属性のマップ。フェーズごとに項目が埋まっていく。
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Product {
    pub code: Option<String>,
    pub description: Option<String>,
    #[serde(rename = "imageId")]
    pub image_id: Option<String>,
    pub upc: Option<String>,
    #[serde(rename = "USD")]
    pub usd: Option<Value>,
    pub pdf: Option<String>,
    pub img: Option<String>,
    pub dwg: Option<String>,
    #[serde(default)]
    pub bom: Vec<BomItem>,
    /// ベンダー属性（キーは小文字化済み）
    #[serde(default)]
    pub attributes: BTreeMap<String, Value>,
    #[serde(default)]
    pub enriched: bool,
    #[serde(default)]
    pub files: AssetFiles,
}

impl Product {
    pub fn with_code(code: impl Into<String>) -> Self {
        Self {
            code: Some(code.into()),
            ..Default::default()
        }
    }

    /// 空文字やパス区切りを含むものは未設定扱い
    ///
    /// code はファイル名とフォルダ名にそのまま使うため、1階層のパス要素に限る。
    pub fn code(&self) -> Option<&str> {
        self.code.as_deref().filter(|c| is_path_safe(c))
    }

    pub fn source_url(&self, role: AssetRole) -> Option<&str> {
        let url = match role {
            AssetRole::Manual => self.pdf.as_deref(),
            AssetRole::Cad => self.dwg.as_deref(),
            AssetRole::Image => self.img.as_deref(),
        };
        url.filter(|u| !u.is_empty())
    }

    pub fn attribute_string(&self, key: &str) -> Option<String> {
        self.attributes.get(key).and_then(json_string)
    }
}

/// 商品ごとのファイル種別
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AssetRole {
    Manual,
    Cad,
    Image,
}

impl AssetRole {
    pub const ALL: [AssetRole; 3] = [AssetRole::Manual, AssetRole::Cad, AssetRole::Image];

    pub fn file_name(self) -> &'static str {
        match self {
            AssetRole::Manual => "manual.pdf",
            AssetRole::Cad => "cad.dwg",
            AssetRole::Image => "img.jpg",
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            AssetRole::Manual => "manual",
            AssetRole::Cad => "cad",
            AssetRole::Image => "image",
        }
    }
}

/// 完了済みフェーズ（チェックポイントの境界）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Phase {
    Walked,
    Enriched,
    Downloaded,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Specs {
    pub hp: Option<String>,
    pub voltage: Option<String>,
    pub rpm: Option<String>,
    pub frame: Option<String>,
}

/// manual / cad / image の3枠
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AssetSlots {
    pub manual: Option<String>,
    pub cad: Option<String>,
    pub image: Option<String>,
}

impl AssetSlots {
    pub fn set(&mut self, role: AssetRole, value: Option<String>) {
        match role {
            AssetRole::Manual => self.manual = value,
            AssetRole::Cad => self.cad = value,
            AssetRole::Image => self.image = value,
        }
    }
}

/// 商品ごとの出力JSON
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProductDocument {
    pub product_id: String,
    pub name: String,
    pub description: Option<String>,
    pub upc: Option<String>,
    #[serde(rename = "USD")]
    pub usd: Option<Value>,
    pub specs: Specs,
    pub bom: Vec<BomItem>,
    pub assets: AssetSlots,
    pub docs_base64: AssetSlots,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FinalCategory {
    pub category_id: String,
    pub name: Option<String>,
    pub count: Option<u64>,
    pub subcategories: Vec<FinalSubcategory>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FinalSubcategory {
    pub subcategory_id: String,
    pub name: Option<String>,
    pub count: Option<u64>,
    pub sub_subcategory: Vec<FinalSubSubcategory>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FinalSubSubcategory {
    pub sub_subcategory_id: String,
    pub name: Option<String>,
    pub count: Option<u64>,
    pub product: Vec<ProductDocument>,
}

/// 全 SubSubcategory を走査
pub fn sub_subcategories_mut(
    categories: &mut [Category],
) -> impl Iterator<Item = &mut SubSubcategory> {
    categories
        .iter_mut()
        .flat_map(|c| c.subcategories.iter_mut())
        .flat_map(|s| s.sub_subcategory.iter_mut())
}

pub fn products(categories: &[Category]) -> impl Iterator<Item = &Product> {
    categories
        .iter()
        .flat_map(|c| c.subcategories.iter())
        .flat_map(|s| s.sub_subcategory.iter())
        .flat_map(|ss| ss.product.iter())
}

fn is_path_safe(code: &str) -> bool {
    !code.trim().is_empty()
        && code != "."
        && code != ".."
        && !code.contains(|c: char| matches!(c, '/' | '\\' | '\0'))
}

/// 文字列・数値を文字列化（それ以外は `None`）
pub fn json_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}
