use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Persisted record describing one item under management.
///
/// Field names follow the store's camelCase schema. Everything except the
/// identifiers is optional because records are created by an external
/// ingestion process that fills fields incrementally.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrackedItem {
    pub id: String,
    pub marketplace_sku: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub origin_url: Option<String>,
    #[serde(default)]
    pub is_image_changed: bool,
    #[serde(default)]
    pub is_title_changed: bool,
    #[serde(default)]
    pub origin_image_urls: Vec<String>,
    #[serde(default)]
    pub origin_title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub weight_grams: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub box_dimensions_cm: Option<Vec<f64>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub marketplace_category: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub marketplace_store_category: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scanned_at: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scan_count: Option<u64>,
    #[serde(flatten)]
    pub listing: ListingMetadata,
}

/// Marketplace-specific listing metadata carried by the extended record shape.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListingMetadata {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub condition: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub condition_description: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub image_urls: Vec<String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub aspect_params: BTreeMap<String, Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl ListingMetadata {
    pub fn is_empty(&self) -> bool {
        self.condition.is_none()
            && self.condition_description.is_none()
            && self.image_urls.is_empty()
            && self.aspect_params.is_empty()
            && self.title.is_none()
            && self.description.is_none()
    }
}

/// Shipping box size in centimetres.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BoxDimensions {
    pub length: f64,
    pub width: f64,
    pub height: f64,
}

impl BoxDimensions {
    pub fn as_array(&self) -> [f64; 3] {
        [self.length, self.width, self.height]
    }
}

impl TrackedItem {
    /// Scan count to persist after this reconciliation. Absent counts start at zero.
    pub fn next_scan_count(&self) -> u64 {
        self.scan_count.unwrap_or(0).saturating_add(1)
    }

    /// Box dimensions when all three sides are present and positive.
    pub fn dimensions(&self) -> Option<BoxDimensions> {
        match self.box_dimensions_cm.as_deref() {
            Some(&[length, width, height])
                if [length, width, height]
                    .iter()
                    .all(|side| side.is_finite() && *side > 0.0) =>
            {
                Some(BoxDimensions {
                    length,
                    width,
                    height,
                })
            }
            _ => None,
        }
    }

    /// Shipping weight when present and positive.
    pub fn weight(&self) -> Option<f64> {
        self.weight_grams
            .filter(|grams| grams.is_finite() && *grams > 0.0)
    }
}
