//! Baldor 製品カタログのクローラー
//!
//! カテゴリ階層の走査、商品ごとの図面・BOM取得、ファイルのダウンロード、
//! 出力JSONの組み立てを行い、[`Pipeline`] がそれらをチェックポイント付きで束ねる。

mod downloader;
mod enricher;
mod output;
mod pipeline;
mod types;
mod walker;

pub use downloader::AssetDownloader;
pub use enricher::{
    parse_bom, select_drawing_number, EnrichStats, ProductEnricher, PREFERRED_DRAWING_KIND,
};
pub use output::{
    clean_bom, decode_data_uri, encode_data_uri, is_valid_bom_item, mime_for_extension,
    OutputAssembler,
};
pub use pipeline::{Pipeline, PipelineOutput, PipelineState, RunReport};
pub use types::{
    products, sub_subcategories_mut, AssetFiles, AssetRole, AssetSlots, BomItem, Category,
    FinalCategory, FinalSubSubcategory, FinalSubcategory, NodeInfo, Phase, Product,
    ProductDocument, Specs, SubSubcategory, Subcategory,
};
pub use walker::CatalogWalker;
