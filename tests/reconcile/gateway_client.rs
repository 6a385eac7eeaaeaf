use std::time::Duration;

use crate::support::{
    helpers::init_tracing,
    mock_gateway::{MockGateway, MockGatewayServer},
};
use anyhow::Result;
use relistd::rpc::{FunctionControl, FunctionInvoker, MessageQueue, RecordStore};
use relistd::{GatewayClient, RecordUpdate, RpcError};
use serde_json::json;

async fn start() -> Result<(MockGateway, MockGatewayServer, GatewayClient)> {
    init_tracing();
    let gateway = MockGateway::new();
    let server = MockGatewayServer::start(gateway.clone()).await?;
    let client = GatewayClient::new(server.url(), "relist", "s3cret")?;
    Ok((gateway, server, client))
}

fn rpc_error(err: &anyhow::Error) -> RpcError {
    err.downcast_ref::<RpcError>()
        .cloned()
        .unwrap_or_else(|| panic!("expected RpcError, got {err:#}"))
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn invoke_sends_stringified_payload_and_returns_result() -> Result<()> {
    let (gateway, server, client) = start().await?;
    gateway.respond("fetch-a", json!({"id": "m1", "status": "on_sale"}));

    let result = client.invoke("fetch-a", json!({"id": "m1"})).await?;
    assert_eq!(result, json!({"id": "m1", "status": "on_sale"}));

    let call = &gateway.calls_to("functions.invoke")[0];
    assert_eq!(call.param()["Payload"], json!(r#"{"id":"m1"}"#));
    assert_eq!(
        call.authorization.as_deref(),
        Some("Basic cmVsaXN0OnMzY3JldA==")
    );

    let metrics = client.metrics();
    assert_eq!(metrics.total_requests, 1);
    assert_eq!(metrics.total_errors, 0);

    server.shutdown().await;
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn error_envelopes_are_upstream_failures() -> Result<()> {
    let (gateway, server, client) = start().await?;
    gateway.fail_once("fetch-a", "Task timed out after 30.00 seconds");
    gateway.respond_raw("eligibility-check", r#"{"success":false}"#);

    let err = client.invoke("fetch-a", json!({})).await.unwrap_err();
    match rpc_error(&err) {
        RpcError::Upstream { function, detail } => {
            assert_eq!(function, "fetch-a");
            assert!(detail.contains("Task timed out"), "{detail}");
        }
        other => panic!("unexpected {other:?}"),
    }

    let err = client.invoke("eligibility-check", json!({})).await.unwrap_err();
    assert_eq!(
        rpc_error(&err),
        RpcError::Upstream {
            function: "eligibility-check".into(),
            detail: "eligibility-check did not report success".into(),
        }
    );

    server.shutdown().await;
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn undecodable_and_unknown_functions_fail_cleanly() -> Result<()> {
    let (gateway, server, client) = start().await?;
    gateway.respond_raw("fetch-b", "<html>bad gateway</html>");

    let err = client.invoke("fetch-b", json!({})).await.unwrap_err();
    assert_eq!(rpc_error(&err).kind(), "malformed");

    let err = client.invoke("missing", json!({})).await.unwrap_err();
    let rpc = rpc_error(&err);
    assert_eq!(rpc.kind(), "upstream");
    assert!(rpc.to_string().contains("function not found"));

    server.shutdown().await;
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn unreachable_gateway_is_a_transport_failure() -> Result<()> {
    init_tracing();
    let client = GatewayClient::new("http://127.0.0.1:1", "", "")?;
    let err = client.invoke("fetch-a", json!({})).await.unwrap_err();
    assert!(rpc_error(&err).is_transport());
    assert_eq!(client.metrics().total_errors, 1);
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn queue_receive_and_delete() -> Result<()> {
    let (gateway, server, client) = start().await?;
    gateway.enqueue("rh-1", Some(r#"{"item":{"id":"m1","marketplaceSku":"s1"}}"#));

    let message = client
        .receive_message("https://queue.local/items", Duration::from_secs(1))
        .await?
        .expect("one message queued");
    assert_eq!(message.receipt_handle, "rh-1");
    assert_eq!(message.message_id, "msg-rh-1");
    assert!(message.body.unwrap().contains("\"m1\""));

    client
        .delete_message("https://queue.local/items", "rh-1")
        .await?;
    assert_eq!(gateway.deleted(), vec!["rh-1".to_string()]);

    let receive = &gateway.calls_to("queue.receiveMessage")[0];
    assert_eq!(receive.param()["MaxNumberOfMessages"], 1);
    assert_eq!(receive.param()["WaitTimeSeconds"], 1);

    let empty = client
        .receive_message("https://queue.local/items", Duration::ZERO)
        .await?;
    assert!(empty.is_none());

    server.shutdown().await;
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn store_update_uses_placeholder_expression() -> Result<()> {
    let (gateway, server, client) = start().await?;

    let update = RecordUpdate::new("tracked-items", "id", "m1")
        .set("isListed", false)
        .set("scanCount", 8)
        .remove("isListedIndex");
    client.update_record(&update).await?;

    let sent = &gateway.updates()[0];
    assert_eq!(sent["TableName"], "tracked-items");
    assert_eq!(sent["Key"], json!({"id": "m1"}));
    assert_eq!(sent["UpdateExpression"], "REMOVE #rm SET #f0 = :v0, #f1 = :v1");
    assert_eq!(sent["ExpressionAttributeNames"]["#rm"], "isListedIndex");
    assert_eq!(sent["ExpressionAttributeNames"]["#f0"], "isListed");
    assert_eq!(sent["ExpressionAttributeValues"][":v1"], 8);

    server.shutdown().await;
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn configuration_touch_carries_marker() -> Result<()> {
    let (gateway, server, client) = start().await?;

    client.touch_configuration("fetch-a", "Zx81").await?;
    assert_eq!(
        gateway.touched(),
        vec![("fetch-a".to_string(), "relistd-remediation:Zx81".to_string())]
    );

    server.shutdown().await;
    Ok(())
}
