use std::sync::Arc;

use portal_http::{BroadcastEventSink, ClientEvent, RequestClient, RequestOptions, SetHeader};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let events = BroadcastEventSink::default();
    let mut failures = events.subscribe();
    tokio::spawn(async move {
        while let Ok(ClientEvent::DataError { endpoint, error, method }) = failures.recv().await {
            eprintln!("{method} {endpoint} failed: {error}");
        }
    });

    let client = RequestClient::from_env()
        .map_err(anyhow::Error::msg)?
        .with_event_sink(Arc::new(events));
    client.add_request_interceptor(Arc::new(SetHeader::new("X-Client", "portal-demo")));

    let health = client.check_health().await;
    println!("health: {health}");

    let suites = client
        .get("/test-suites", RequestOptions::new().retry(1))
        .await?;
    println!("suites: {suites:?}");

    Ok(())
}
