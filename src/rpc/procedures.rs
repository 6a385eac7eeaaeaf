//! Typed request/response schemas for each remote procedure the loop calls.
//!
//! Payloads are serialized from these structs right before invocation and
//! results are deserialized right after; a result that does not fit its
//! schema is reported as [`RpcError::Malformed`].

use crate::model::lenient::string_or_number;
use crate::model::{TrackedItem, UpstreamSnapshot};
use crate::rpc::error::RpcError;
use crate::rpc::platform::FunctionInvoker;
use anyhow::{Context, Result};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

pub const MARKETPLACE_ID: &str = "EBAY_US";
pub const LISTING_FORMAT: &str = "FIXED_PRICE";
pub const LISTING_QUANTITY: u32 = 1;

#[derive(Debug, Clone, Serialize)]
pub struct FetchItemRequest<'a> {
    pub id: &'a str,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct EmptyRequest {}

/// Work payload shared by the queue message body and the "next item" reply.
#[derive(Debug, Clone, Deserialize)]
pub struct WorkEnvelope {
    #[serde(default)]
    pub item: Option<TrackedItem>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EligibilityRequest<'a> {
    pub id: &'a str,
    pub title: &'a str,
    pub description: &'a str,
    pub price: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub brand: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub category: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub condition: Option<&'a str>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EligibilityResponse {
    pub is_eligible: bool,
    #[serde(default)]
    pub reasons: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct DelistRequest<'a> {
    pub sku: &'a str,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OfferRequest<'a> {
    pub sku: &'a str,
    pub price: f64,
    pub weight_grams: f64,
    pub dimensions_cm: [f64; 3],
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Amount {
    #[serde(deserialize_with = "string_or_number")]
    pub value: String,
    #[serde(default = "default_currency")]
    pub currency: String,
}

fn default_currency() -> String {
    "USD".to_owned()
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OfferQuote {
    pub price: Amount,
    #[serde(default)]
    pub listing_policies: Option<Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PricingSummary {
    pub price: Amount,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ListingProduct {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub image_urls: Vec<String>,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub aspects: BTreeMap<String, Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub condition: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub condition_description: Option<String>,
}

/// Listing payload for the marketplace-list procedure.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ListingRequest {
    pub sku: String,
    pub marketplace_id: &'static str,
    pub format: &'static str,
    pub available_quantity: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub category_id: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub store_category_names: Vec<String>,
    pub pricing_summary: PricingSummary,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub listing_policies: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub product: Option<ListingProduct>,
}

impl ListingRequest {
    pub fn assemble(item: &TrackedItem, quote: OfferQuote) -> Self {
        let listing = &item.listing;
        let product = (!listing.is_empty()).then(|| ListingProduct {
            title: listing.title.clone(),
            description: listing.description.clone(),
            image_urls: listing.image_urls.clone(),
            aspects: listing.aspect_params.clone(),
            condition: listing.condition.clone(),
            condition_description: listing.condition_description.clone(),
        });

        Self {
            sku: item.marketplace_sku.clone(),
            marketplace_id: MARKETPLACE_ID,
            format: LISTING_FORMAT,
            available_quantity: LISTING_QUANTITY,
            category_id: item.marketplace_category.clone(),
            store_category_names: item.marketplace_store_category.iter().cloned().collect(),
            pricing_summary: PricingSummary { price: quote.price },
            listing_policies: quote.listing_policies,
            product,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct SoldLookupResponse {
    #[serde(default)]
    pub skus: Vec<String>,
}

/// Serializes `request`, invokes `function`, and decodes the result into `R`.
pub async fn call<I, Q, R>(invoker: &I, function: &str, request: &Q) -> Result<R>
where
    I: FunctionInvoker + ?Sized,
    Q: Serialize + ?Sized,
    R: DeserializeOwned,
{
    let payload = serde_json::to_value(request)
        .with_context(|| format!("failed to serialize payload for {function}"))?;
    let result = invoker.invoke(function, payload).await?;
    decode_result(function, result)
}

pub(crate) fn decode_result<R: DeserializeOwned>(function: &str, result: Value) -> Result<R> {
    serde_json::from_value(result).map_err(|err| {
        RpcError::Malformed {
            function: function.to_owned(),
            message: format!("result does not match schema: {err}"),
        }
        .into()
    })
}

pub async fn fetch_snapshot<I: FunctionInvoker + ?Sized>(
    invoker: &I,
    fetcher: &str,
    item_id: &str,
) -> Result<UpstreamSnapshot> {
    call(invoker, fetcher, &FetchItemRequest { id: item_id }).await
}
