use relistd::runtime::fatal::report_fatal;
use relistd::{init_tracing, GatewayClient, ReconcilerConfig, Runner};
use std::process::ExitCode;
use std::sync::Arc;

#[tokio::main]
async fn main() -> ExitCode {
    init_tracing();

    let config = match ReconcilerConfig::from_env() {
        Ok(config) => config,
        Err(err) => {
            report_fatal("config", &err);
            return ExitCode::FAILURE;
        }
    };

    let client = match GatewayClient::from_config(&config) {
        Ok(client) => Arc::new(client),
        Err(err) => {
            report_fatal("gateway", &err);
            return ExitCode::FAILURE;
        }
    };

    tracing::info!(
        gateway = client.endpoint(),
        table = config.table_name(),
        fetchers = config.fetcher_functions().len(),
        "relistd starting"
    );

    let runner = Runner::new(config, Arc::clone(&client));
    let result = runner.run_until_signal().await;

    let rpc = client.metrics();
    tracing::info!(
        total_requests = rpc.total_requests,
        total_errors = rpc.total_errors,
        total_timeouts = rpc.total_timeouts,
        average_latency_ms = format!("{:.1}", rpc.average_latency_ms),
        "gateway metrics"
    );

    match result {
        Ok(_) => ExitCode::SUCCESS,
        Err(_) => ExitCode::FAILURE,
    }
}
