//! Decision state machine for one fetched item.
//!
//! The engine receives an item whose upstream snapshot was fetched
//! successfully and resolves it to `OriginGone`, `NeedsUpdate`, or
//! `Eligible`. Sold and fetch-failure handling happen in the loop
//! controller before the engine is involved.

use crate::model::{
    format_scanned_at, BoxDimensions, ItemState, ReconciliationOutcome, TrackedItem,
    UpstreamSnapshot,
};
use crate::rpc::procedures::{
    self, DelistRequest, EligibilityRequest, EligibilityResponse, ListingRequest, OfferQuote,
    OfferRequest,
};
use crate::rpc::{FunctionInvoker, RecordStore};
use crate::runtime::config::ReconcilerConfig;
use crate::store::RecordUpdate;
use anyhow::Result;
use chrono::{DateTime, FixedOffset, Utc};
use serde_json::Value;
use std::sync::Arc;

pub mod fields {
    pub const SCANNED_AT: &str = "scannedAt";
    pub const SCAN_COUNT: &str = "scanCount";
    pub const IS_ORG_LIVE: &str = "isOrgLive";
    pub const IS_LISTED: &str = "isListed";
    pub const IS_LISTED_INDEX: &str = "isListedIndex";
    pub const IS_TITLE_CHANGED: &str = "isTitleChanged";
    pub const IS_IMAGE_CHANGED: &str = "isImageChanged";
    pub const ORIGIN_PRICE: &str = "originPrice";
    pub const ORIGIN_TITLE: &str = "originTitle";
    pub const ORIGIN_IMAGE_URLS: &str = "originImageUrls";
}

/// Identifiers and formatting the engine needs from configuration.
#[derive(Debug, Clone)]
pub struct EngineSettings {
    pub table: String,
    pub key_field: String,
    pub delist_function: String,
    pub list_function: String,
    pub offer_function: String,
    pub eligibility_function: String,
    pub scan_utc_offset: FixedOffset,
}

impl EngineSettings {
    pub fn from_config(config: &ReconcilerConfig) -> Self {
        Self {
            table: config.table_name().to_owned(),
            key_field: config.table_key().to_owned(),
            delist_function: config.delist_function().to_owned(),
            list_function: config.list_function().to_owned(),
            offer_function: config.offer_function().to_owned(),
            eligibility_function: config.eligibility_function().to_owned(),
            scan_utc_offset: config.scan_utc_offset(),
        }
    }
}

/// What the engine did for one item.
#[derive(Debug, Clone, PartialEq)]
pub struct EngineReport {
    pub state: ItemState,
    pub outcome: ReconciliationOutcome,
    pub update: RecordUpdate,
    pub delisted: bool,
    pub listed: bool,
    pub ineligible_reasons: Vec<String>,
    pub missing_dimensions: bool,
}

/// Shipping parcel quoted to the offer procedure.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Parcel {
    pub dimensions: BoxDimensions,
    pub weight_grams: f64,
}

/// Pure part of the decision: everything except the eligibility verdict.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ChangeAssessment {
    pub title_changed: bool,
    pub images_changed: bool,
    pub parcel: Option<Parcel>,
}

impl ChangeAssessment {
    /// Compares the snapshot with the stored record. Stored change flags are
    /// carried forward so a flagged change is never cleared here.
    pub fn of(item: &TrackedItem, snapshot: &UpstreamSnapshot) -> Self {
        Self {
            title_changed: item.is_title_changed || snapshot.title != item.origin_title,
            images_changed: item.is_image_changed || snapshot.photos != item.origin_image_urls,
            parcel: item
                .dimensions()
                .zip(item.weight())
                .map(|(dimensions, weight_grams)| Parcel {
                    dimensions,
                    weight_grams,
                }),
        }
    }

    pub fn dimensions_present(&self) -> bool {
        self.parcel.is_some()
    }

    pub fn outcome(&self, is_eligible: bool) -> ReconciliationOutcome {
        ReconciliationOutcome {
            is_live: true,
            title_changed: self.title_changed,
            images_changed: self.images_changed,
            is_eligible,
            should_list: is_eligible
                && self.dimensions_present()
                && !self.title_changed
                && !self.images_changed,
        }
    }
}

pub struct ReconciliationEngine<P: ?Sized> {
    platform: Arc<P>,
    settings: EngineSettings,
}

impl<P> ReconciliationEngine<P>
where
    P: FunctionInvoker + RecordStore + ?Sized,
{
    pub fn new(platform: Arc<P>, settings: EngineSettings) -> Self {
        Self { platform, settings }
    }

    /// Resolves `item` against a successfully fetched `snapshot`, performing
    /// the store write and remote listing calls its state requires.
    pub async fn reconcile(
        &self,
        item: &TrackedItem,
        snapshot: &UpstreamSnapshot,
        now: DateTime<Utc>,
    ) -> Result<EngineReport> {
        if !snapshot.is_on_sale() {
            return self.retire(item, snapshot, now).await;
        }

        let assessment = ChangeAssessment::of(item, snapshot);
        let verdict = self.check_eligibility(snapshot).await?;
        let outcome = assessment.outcome(verdict.is_eligible);

        match (outcome.state(), assessment.parcel) {
            (ItemState::Eligible, Some(parcel)) => {
                self.list(item, snapshot, outcome, parcel, now).await
            }
            _ => {
                self.delist(item).await?;
                let update = self.plan_record(item, snapshot, &outcome, now);
                self.platform.update_record(&update).await?;
                tracing::info!(
                    item_id = %item.id,
                    sku = %item.marketplace_sku,
                    title_changed = outcome.title_changed,
                    images_changed = outcome.images_changed,
                    eligible = outcome.is_eligible,
                    dimensions_present = assessment.dimensions_present(),
                    "item needs update; delisted"
                );
                Ok(EngineReport {
                    state: ItemState::NeedsUpdate,
                    outcome,
                    update,
                    delisted: true,
                    listed: false,
                    ineligible_reasons: verdict.reasons,
                    missing_dimensions: !assessment.dimensions_present(),
                })
            }
        }
    }

    /// Builds the single atomic store update for `outcome`.
    pub fn plan_record(
        &self,
        item: &TrackedItem,
        snapshot: &UpstreamSnapshot,
        outcome: &ReconciliationOutcome,
        now: DateTime<Utc>,
    ) -> RecordUpdate {
        let update = RecordUpdate::new(&self.settings.table, &self.settings.key_field, &item.id)
            .set(
                fields::SCANNED_AT,
                format_scanned_at(now, self.settings.scan_utc_offset),
            )
            .set(fields::SCAN_COUNT, item.next_scan_count());

        match outcome.state() {
            ItemState::Eligible => update
                .set(fields::IS_ORG_LIVE, true)
                .set(fields::IS_LISTED, true)
                .set(fields::IS_LISTED_INDEX, 1)
                .set(fields::IS_TITLE_CHANGED, false)
                .set(fields::IS_IMAGE_CHANGED, false)
                .set(fields::ORIGIN_PRICE, price_value(snapshot.price)),
            ItemState::OriginGone => update
                .set(fields::IS_ORG_LIVE, false)
                .set(fields::IS_LISTED, false)
                .remove(fields::IS_LISTED_INDEX),
            _ => update
                .set(fields::IS_ORG_LIVE, true)
                .set(fields::IS_LISTED, false)
                .set(fields::IS_TITLE_CHANGED, outcome.title_changed)
                .set(fields::IS_IMAGE_CHANGED, outcome.images_changed)
                .set(fields::ORIGIN_PRICE, price_value(snapshot.price))
                .set(fields::ORIGIN_TITLE, snapshot.title.clone())
                .set(fields::ORIGIN_IMAGE_URLS, snapshot.photos.clone())
                .remove(fields::IS_LISTED_INDEX),
        }
    }

    async fn retire(
        &self,
        item: &TrackedItem,
        snapshot: &UpstreamSnapshot,
        now: DateTime<Utc>,
    ) -> Result<EngineReport> {
        let outcome = ReconciliationOutcome::default();
        self.delist(item).await?;
        let update = self.plan_record(item, snapshot, &outcome, now);
        self.platform.update_record(&update).await?;
        tracing::info!(
            item_id = %item.id,
            sku = %item.marketplace_sku,
            status = %snapshot.status,
            "origin no longer on sale; delisted"
        );
        Ok(EngineReport {
            state: ItemState::OriginGone,
            outcome,
            update,
            delisted: true,
            listed: false,
            ineligible_reasons: Vec::new(),
            missing_dimensions: false,
        })
    }

    async fn list(
        &self,
        item: &TrackedItem,
        snapshot: &UpstreamSnapshot,
        outcome: ReconciliationOutcome,
        parcel: Parcel,
        now: DateTime<Utc>,
    ) -> Result<EngineReport> {
        // The record reflects intent before any listing call is made.
        let update = self.plan_record(item, snapshot, &outcome, now);
        self.platform.update_record(&update).await?;

        let quote: OfferQuote = procedures::call(
            self.platform.as_ref(),
            &self.settings.offer_function,
            &OfferRequest {
                sku: &item.marketplace_sku,
                price: snapshot.price,
                weight_grams: parcel.weight_grams,
                dimensions_cm: parcel.dimensions.as_array(),
            },
        )
        .await?;

        let listing = ListingRequest::assemble(item, quote);
        let _: Value =
            procedures::call(self.platform.as_ref(), &self.settings.list_function, &listing)
                .await?;

        tracing::info!(
            item_id = %item.id,
            sku = %item.marketplace_sku,
            price = %listing.pricing_summary.price.value,
            "item listed"
        );

        Ok(EngineReport {
            state: ItemState::Eligible,
            outcome,
            update,
            delisted: false,
            listed: true,
            ineligible_reasons: Vec::new(),
            missing_dimensions: false,
        })
    }

    async fn delist(&self, item: &TrackedItem) -> Result<()> {
        let _: Value = procedures::call(
            self.platform.as_ref(),
            &self.settings.delist_function,
            &DelistRequest {
                sku: &item.marketplace_sku,
            },
        )
        .await?;
        Ok(())
    }

    async fn check_eligibility(&self, snapshot: &UpstreamSnapshot) -> Result<EligibilityResponse> {
        procedures::call(
            self.platform.as_ref(),
            &self.settings.eligibility_function,
            &EligibilityRequest {
                id: &snapshot.id,
                title: &snapshot.title,
                description: &snapshot.description,
                price: snapshot.price,
                brand: snapshot.brand_name(),
                category: snapshot.category_name(),
                condition: snapshot.condition_name(),
            },
        )
        .await
    }
}

fn price_value(price: f64) -> Value {
    serde_json::Number::from_f64(price)
        .map(Value::Number)
        .unwrap_or(Value::Null)
}
