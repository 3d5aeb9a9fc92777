//! Tests for processors serving HTTP.

use bytes::Bytes;
use http::{HeaderMap, Uri};
use http_body_util::{BodyExt as _, Empty};
use hyper_util::{client::legacy::Client, rt::TokioExecutor};
use serde_json::json;

use std::net::Ipv4Addr;

use super::*;
use crate::{
    collector::{RunnersCollector, RunsCollector},
    testonly::MockApi,
};

const TEST_TIMEOUT: Duration = Duration::from_secs(10);

fn local_address() -> SocketAddr {
    (Ipv4Addr::LOCALHOST, 0).into()
}

async fn get(address: SocketAddr, path: &str) -> (StatusCode, HeaderMap, String) {
    let client = Client::builder(TokioExecutor::new()).build_http::<Empty<Bytes>>();
    let uri: Uri = format!("http://{address}{path}").parse().unwrap();
    let response = tokio::time::timeout(TEST_TIMEOUT, client.get(uri))
        .await
        .expect("timed out sending request")
        .unwrap();
    let status = response.status();
    let headers = response.headers().clone();
    let body = response.into_body().collect().await.unwrap().to_bytes();
    (status, headers, String::from_utf8(body.to_vec()).unwrap())
}

#[tokio::test]
async fn health_endpoint() {
    let processor = Arc::new(ApiProcessor::bind(local_address()).await.unwrap());
    let address = processor.local_addr();
    let server_task = tokio::spawn({
        let processor = processor.clone();
        async move { processor.run().await }
    });

    let (status, headers, body) = get(address, "/healthz").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(headers[header::CONTENT_TYPE], "text/plain; charset=utf-8");
    assert_eq!(body, "ok");

    let (status, ..) = get(address, "/metrics").await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    processor.stop().await.unwrap();
    tokio::time::timeout(TEST_TIMEOUT, server_task)
        .await
        .expect("server did not stop")
        .unwrap()
        .unwrap();
}

#[tokio::test]
async fn binding_occupied_address_fails() {
    let processor = ApiProcessor::bind(local_address()).await.unwrap();
    let err = ApiProcessor::bind(processor.local_addr()).await.unwrap_err();
    assert!(
        err.to_string().starts_with("failed binding API listener"),
        "{err:#}"
    );
}

#[tokio::test]
async fn serving_twice_is_an_error() {
    let processor = Arc::new(ApiProcessor::bind(local_address()).await.unwrap());
    let server_task = tokio::spawn({
        let processor = processor.clone();
        async move { processor.run().await }
    });
    tokio::task::yield_now().await;

    processor.stop().await.unwrap();
    server_task.await.unwrap().unwrap();
    processor.run().await.unwrap_err();
}

#[tokio::test]
async fn metrics_endpoint_and_collector_loops() {
    let api = MockApi::default();
    api.set_json(
        "/repos/owner/repo/actions/runners?per_page=100&page=1",
        json!({ "total_count": 1, "runners": [{ "id": 1, "name": "runner", "status": "online" }] }),
    );
    for status in ["queued", "in_progress", "completed"] {
        api.set_json(
            &format!("/repos/owner/repo/actions/runs?status={status}&per_page=1"),
            json!({ "total_count": 7 }),
        );
    }

    let mut registry = Registry::default();
    let runners = registry.register(RunnersCollector::new(api.client()));
    registry.register(RunsCollector::new(api.client()));
    let interval = Duration::from_secs(60);
    let processor = MonitorProcessor::bind(local_address(), Arc::new(registry), interval)
        .await
        .unwrap();
    let processor = Arc::new(processor);
    let address = processor.local_addr();
    let server_task = tokio::spawn({
        let processor = processor.clone();
        async move { processor.run().await }
    });

    // Wait for the initial background scrape.
    let runners_family = runners.families()[0].clone();
    tokio::time::timeout(TEST_TIMEOUT, async {
        while runners_family.snapshot().is_empty() {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("runners were not scraped");

    let (status, headers, body) = get(address, "/metrics").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(headers[header::CONTENT_TYPE], OPEN_METRICS_CONTENT_TYPE);
    let lines: Vec<_> = body.lines().collect();
    assert!(
        lines.contains(&r#"github_actions_runners{repository="owner/repo",status="online"} 1.0"#),
        "{lines:#?}"
    );
    assert!(
        lines.contains(&r#"github_actions_runners{repository="owner/repo",status="offline"} 0.0"#),
        "{lines:#?}"
    );
    assert!(
        lines.contains(&r#"github_actions_runs{repository="owner/repo",status="queued"} 7.0"#),
        "{lines:#?}"
    );

    let (status, ..) = get(address, "/healthz").await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    processor.stop().await.unwrap();
    tokio::time::timeout(TEST_TIMEOUT, server_task)
        .await
        .expect("server did not stop")
        .unwrap()
        .unwrap();
}
