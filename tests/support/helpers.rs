use std::time::Duration;

use anyhow::Result;
use once_cell::sync::Lazy;
use relistd::{ReconcilerConfig, ReconcilerConfigBuilder, WorkSourceKind};
use serde_json::{json, Value};
use tracing_subscriber::EnvFilter;

pub const QUEUE_URL: &str = "https://queue.local/items";
pub const FETCHERS: [&str; 2] = ["fetch-a", "fetch-b"];

static TRACING_SUBSCRIBER: Lazy<()> = Lazy::new(|| {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
});

pub fn init_tracing() {
    Lazy::force(&TRACING_SUBSCRIBER);
}

/// Queue-backed configuration with pacing and cooldown disabled so scenarios
/// run at full speed.
pub fn config_builder(gateway_url: &str) -> ReconcilerConfigBuilder {
    ReconcilerConfig::builder()
        .gateway_url(gateway_url)
        .gateway_credentials("relist", "s3cret")
        .table_name("tracked-items")
        .work_source(WorkSourceKind::Queue {
            queue_url: QUEUE_URL.into(),
        })
        .fetcher_functions(FETCHERS)
        .delist_function("marketplace-delist")
        .list_function("marketplace-list")
        .offer_function("offer-builder")
        .eligibility_function("eligibility-check")
        .sold_lookup_function("sold-lookup")
        .pacing_min(Duration::ZERO)
        .pacing_max(Duration::ZERO)
        .remediation_cooldown(Duration::ZERO)
        .queue_wait(Duration::ZERO)
        .rpc_timeout(Duration::from_secs(5))
}

pub fn config(gateway_url: &str, iterations: u64) -> Result<ReconcilerConfig> {
    config_builder(gateway_url).max_iterations(iterations).build()
}

/// Queue body for a listable tracked item.
pub fn work_body(id: &str, sku: &str) -> String {
    json!({
        "item": {
            "id": id,
            "marketplaceSku": sku,
            "originUrl": format!("https://origin.local/items/{id}"),
            "originTitle": "Rangefinder camera",
            "originImageUrls": ["https://img.local/1.jpg", "https://img.local/2.jpg"],
            "weightGrams": 640,
            "boxDimensionsCm": [18, 12, 9],
            "marketplaceCategory": "15230",
            "marketplaceStoreCategory": "Film Cameras",
            "scanCount": 7,
            "isTitleChanged": false,
            "isImageChanged": false
        }
    })
    .to_string()
}

/// Upstream snapshot matching [`work_body`].
pub fn live_snapshot(id: &str) -> Value {
    json!({
        "id": id,
        "status": "on_sale",
        "name": "Rangefinder camera",
        "price": 24800,
        "description": "Works well",
        "photos": ["https://img.local/1.jpg", "https://img.local/2.jpg"],
        "seller": {"id": 42, "num_sell_items": 10, "ratings": {"good": 9, "normal": 1, "bad": 0}},
        "item_brand": {"id": 7, "name": "Leica"},
        "num_likes": 3,
        "num_comments": 0,
        "created": 1700000000,
        "updated": 1700003600
    })
}
