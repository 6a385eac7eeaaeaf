use std::sync::Arc;

use crate::support::{
    helpers::{config, config_builder, init_tracing, live_snapshot, work_body},
    mock_gateway::{MockGateway, MockGatewayServer},
};
use anyhow::Result;
use relistd::{GatewayClient, ReconcilerConfig, Runner, RunSummary, WorkSourceKind};
use serde_json::{json, Value};

fn base_gateway() -> MockGateway {
    let gateway = MockGateway::new();
    gateway
        .respond("sold-lookup", json!({"skus": ["sku-sold"]}))
        .respond("fetch-a", live_snapshot("m1"))
        .respond("fetch-b", live_snapshot("m1"))
        .respond("eligibility-check", json!({"isEligible": true, "reasons": []}))
        .respond(
            "offer-builder",
            json!({
                "price": {"value": "172.40", "currency": "USD"},
                "listingPolicies": {"fulfillmentPolicyId": "F1"}
            }),
        )
        .respond("marketplace-list", json!({"listingId": "110001"}))
        .respond("marketplace-delist", json!({"deleted": true}));
    gateway
}

async fn run_loop(config: ReconcilerConfig) -> Result<RunSummary> {
    let client = Arc::new(GatewayClient::from_config(&config)?);
    let runner = Runner::new(config, client);
    let summary = runner.run().await?;
    assert!(runner.cancellation_token().is_cancelled());
    Ok(summary)
}

fn set_value(update: &Value, field: &str) -> Option<Value> {
    let names = update["ExpressionAttributeNames"].as_object()?;
    let (placeholder, _) = names
        .iter()
        .find(|(name, value)| name.starts_with("#f") && value.as_str() == Some(field))?;
    let value_key = placeholder.replacen("#f", ":v", 1);
    update["ExpressionAttributeValues"].get(&value_key).cloned()
}

fn removed(update: &Value) -> Option<String> {
    update["ExpressionAttributeNames"]["#rm"]
        .as_str()
        .map(str::to_owned)
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn happy_path_persists_then_lists() -> Result<()> {
    init_tracing();
    let gateway = base_gateway();
    gateway.enqueue("rh-1", Some(&work_body("m1", "sku-1")));
    let server = MockGatewayServer::start(gateway.clone()).await?;

    let summary = run_loop(config(server.url(), 1)?).await?;
    assert_eq!(summary.iterations, 1);
    assert_eq!(summary.telemetry.listed, 1);

    assert_eq!(gateway.deleted(), vec!["rh-1".to_string()]);
    let update = &gateway.updates()[0];
    assert_eq!(update["Key"], json!({"id": "m1"}));
    assert_eq!(set_value(update, "isListed"), Some(json!(true)));
    assert_eq!(set_value(update, "isListedIndex"), Some(json!(1)));
    assert_eq!(set_value(update, "scanCount"), Some(json!(8)));
    assert_eq!(removed(update), None);

    let update_at = gateway
        .position(|call| call.method == "store.updateItem")
        .unwrap();
    let offer_at = gateway
        .position(|call| call.function().as_deref() == Some("offer-builder"))
        .unwrap();
    let list_at = gateway
        .position(|call| call.function().as_deref() == Some("marketplace-list"))
        .unwrap();
    assert!(update_at < offer_at && offer_at < list_at);

    let eligibility = &gateway.invocations("eligibility-check")[0];
    assert_eq!(eligibility["brand"], "Leica");

    let offer = &gateway.invocations("offer-builder")[0];
    assert_eq!(offer["sku"], "sku-1");
    assert_eq!(offer["dimensionsCm"], json!([18.0, 12.0, 9.0]));

    let listings = gateway.invocations("marketplace-list");
    assert_eq!(listings.len(), 1);
    let listing = &listings[0];
    assert_eq!(listing["marketplaceId"], "EBAY_US");
    assert_eq!(listing["format"], "FIXED_PRICE");
    assert_eq!(listing["availableQuantity"], 1);
    assert_eq!(listing["categoryId"], "15230");
    assert_eq!(listing["storeCategoryNames"], json!(["Film Cameras"]));
    assert_eq!(listing["pricingSummary"]["price"]["value"], "172.40");
    assert_eq!(listing["listingPolicies"]["fulfillmentPolicyId"], "F1");

    server.shutdown().await;
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn sold_sku_is_skipped_without_remote_work() -> Result<()> {
    init_tracing();
    let gateway = base_gateway();
    gateway.enqueue("rh-1", Some(&work_body("m1", "sku-sold")));
    let server = MockGatewayServer::start(gateway.clone()).await?;

    let summary = run_loop(config(server.url(), 1)?).await?;
    assert_eq!(summary.telemetry.sold_skips, 1);

    let invoked: Vec<_> = gateway
        .calls_to("functions.invoke")
        .into_iter()
        .filter_map(|call| call.function())
        .collect();
    assert_eq!(invoked, vec!["sold-lookup".to_string()]);
    assert!(gateway.updates().is_empty());
    assert_eq!(gateway.deleted(), vec!["rh-1".to_string()]);

    server.shutdown().await;
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn dead_origin_is_delisted_and_marked_offline() -> Result<()> {
    init_tracing();
    let gateway = base_gateway();
    gateway.respond("fetch-a", json!({"id": "m1", "status": "sold_out"}));
    gateway.enqueue("rh-1", Some(&work_body("m1", "sku-1")));
    let server = MockGatewayServer::start(gateway.clone()).await?;

    run_loop(config(server.url(), 1)?).await?;

    assert_eq!(
        gateway.invocations("marketplace-delist"),
        vec![json!({"sku": "sku-1"})]
    );
    assert!(gateway.invocations("eligibility-check").is_empty());
    let updates = gateway.updates();
    assert_eq!(updates.len(), 1);
    assert_eq!(set_value(&updates[0], "isOrgLive"), Some(json!(false)));
    assert_eq!(set_value(&updates[0], "isListed"), Some(json!(false)));
    assert_eq!(removed(&updates[0]).as_deref(), Some("isListedIndex"));

    server.shutdown().await;
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn fetch_failure_remediates_and_moves_on() -> Result<()> {
    init_tracing();
    let gateway = base_gateway();
    gateway.fail_once("fetch-a", "Rate exceeded");
    gateway.enqueue("rh-1", Some(&work_body("m1", "sku-1")));
    gateway.enqueue("rh-2", Some(&work_body("m2", "sku-2")));
    let server = MockGatewayServer::start(gateway.clone()).await?;

    let summary = run_loop(config(server.url(), 2)?).await?;
    assert_eq!(summary.telemetry.fetch_failures, 1);
    assert_eq!(summary.telemetry.remediations, 1);
    assert_eq!(summary.telemetry.listed, 1);

    let touched = gateway.touched();
    assert_eq!(touched.len(), 1);
    assert_eq!(touched[0].0, "fetch-a");
    assert!(touched[0].1.starts_with("relistd-remediation:"));

    assert_eq!(gateway.invocations("fetch-b"), vec![json!({"id": "m2"})]);
    let updates = gateway.updates();
    assert_eq!(updates.len(), 1);
    assert_eq!(updates[0]["Key"], json!({"id": "m2"}));

    server.shutdown().await;
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn malformed_work_is_deleted_and_skipped() -> Result<()> {
    init_tracing();
    let gateway = base_gateway();
    gateway.enqueue("rh-1", Some("{\"item\":"));
    gateway.enqueue("rh-2", Some(&work_body("m2", "sku-2")));
    let server = MockGatewayServer::start(gateway.clone()).await?;

    let summary = run_loop(config(server.url(), 2)?).await?;
    assert_eq!(summary.telemetry.skipped, 1);
    assert_eq!(summary.telemetry.reconciled, 1);
    assert_eq!(gateway.deleted(), vec!["rh-1".to_string(), "rh-2".to_string()]);

    server.shutdown().await;
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn pull_source_asks_for_next_item() -> Result<()> {
    init_tracing();
    let gateway = base_gateway();
    gateway.respond(
        "next-item",
        serde_json::from_str::<Value>(&work_body("m1", "sku-1"))?,
    );
    let server = MockGatewayServer::start(gateway.clone()).await?;

    let config = config_builder(server.url())
        .work_source(WorkSourceKind::Pull {
            function: "next-item".into(),
        })
        .max_iterations(1)
        .build()?;
    let summary = run_loop(config).await?;

    assert_eq!(summary.telemetry.listed, 1);
    assert_eq!(gateway.invocations("next-item"), vec![json!({})]);
    assert!(gateway.calls_to("queue.receiveMessage").is_empty());

    server.shutdown().await;
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn sold_lookup_failure_aborts_startup() -> Result<()> {
    init_tracing();
    let gateway = base_gateway();
    gateway.fail_once("sold-lookup", "AccessDenied");
    gateway.enqueue("rh-1", Some(&work_body("m1", "sku-1")));
    let server = MockGatewayServer::start(gateway.clone()).await?;

    let config = config(server.url(), 1)?;
    let client = Arc::new(GatewayClient::from_config(&config)?);
    let err = Runner::new(config, client).run().await.unwrap_err();
    assert!(format!("{err:#}").contains("AccessDenied"));
    assert!(gateway.calls_to("queue.receiveMessage").is_empty());

    server.shutdown().await;
    Ok(())
}
