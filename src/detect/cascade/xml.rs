//! Serde mirror of the OpenCV `opencv_storage/cascade` XML layout.
//!
//! Every scalar is read as text and parsed by the loader, so surrounding
//! whitespace and OpenCV's `1.` style floats never reach serde.

use serde::Deserialize;

#[derive(Debug, Deserialize)]
pub(super) struct StorageXml {
    pub cascade: CascadeXml,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(super) struct CascadeXml {
    #[serde(default)]
    pub stage_type: Option<String>,
    #[serde(default)]
    pub feature_type: Option<String>,
    pub height: String,
    pub width: String,
    pub stages: Items<StageXml>,
    pub features: Items<FeatureXml>,
}

/// OpenCV writes sequences as repeated `<_>` children.
#[derive(Debug, Deserialize)]
pub(super) struct Items<T> {
    #[serde(rename = "_", default = "Vec::new")]
    pub items: Vec<T>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(super) struct StageXml {
    pub stage_threshold: String,
    pub weak_classifiers: Items<WeakClassifierXml>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(super) struct WeakClassifierXml {
    pub internal_nodes: String,
    pub leaf_values: String,
}

#[derive(Debug, Deserialize)]
pub(super) struct FeatureXml {
    pub rects: Items<String>,
    #[serde(default)]
    pub tilted: Option<String>,
}
