use super::lenient::string_or_number;
use serde::{Deserialize, Serialize};

/// Upstream status marking an item as still purchasable.
pub const ON_SALE_STATUS: &str = "on_sale";

/// Live state of an item as reported by the origin marketplace.
///
/// Built fresh from a fetcher response on every reconciliation and never
/// persisted as a whole.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UpstreamSnapshot {
    #[serde(deserialize_with = "string_or_number")]
    pub id: String,
    #[serde(default)]
    pub seller: SellerInfo,
    pub status: String,
    #[serde(default, alias = "name")]
    pub title: String,
    #[serde(default)]
    pub price: f64,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub photos: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub item_category: Option<NamedRef>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub item_condition: Option<NamedRef>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub shipping_payer: Option<NamedRef>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub shipping_method: Option<NamedRef>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub shipping_from_area: Option<NamedRef>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub shipping_duration: Option<NamedRef>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub item_brand: Option<NamedRef>,
    #[serde(default)]
    pub num_likes: u64,
    #[serde(default)]
    pub num_comments: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated: Option<i64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SellerInfo {
    #[serde(default, deserialize_with = "string_or_number")]
    pub id: String,
    #[serde(default)]
    pub num_sell_items: u64,
    #[serde(default)]
    pub num_ratings: u64,
    #[serde(default)]
    pub ratings: SellerRatings,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SellerRatings {
    #[serde(default)]
    pub good: u64,
    #[serde(default)]
    pub normal: u64,
    #[serde(default)]
    pub bad: u64,
}

/// Identifier/name pair used by the upstream metadata blocks.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NamedRef {
    #[serde(default, deserialize_with = "string_or_number")]
    pub id: String,
    #[serde(default)]
    pub name: String,
}

impl UpstreamSnapshot {
    pub fn is_on_sale(&self) -> bool {
        self.status == ON_SALE_STATUS
    }

    pub fn brand_name(&self) -> Option<&str> {
        self.item_brand
            .as_ref()
            .map(|brand| brand.name.as_str())
            .filter(|name| !name.is_empty())
    }

    pub fn category_name(&self) -> Option<&str> {
        self.item_category
            .as_ref()
            .map(|category| category.name.as_str())
            .filter(|name| !name.is_empty())
    }

    pub fn condition_name(&self) -> Option<&str> {
        self.item_condition
            .as_ref()
            .map(|condition| condition.name.as_str())
            .filter(|name| !name.is_empty())
    }
}
