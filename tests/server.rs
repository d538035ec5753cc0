mod common;

use std::sync::Arc;
use std::time::Duration;

use serde_json::{json, Value};
use tokio::net::TcpListener;

use shelfwatch::config::PageConfig;
use shelfwatch::server;
use shelfwatch::source::TableSource;

use common::*;

async fn spawn_app(source: Arc<dyn TableSource>) -> String {
    let loader = Arc::new(loader_for(source, Duration::from_secs(3600)));
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let app = server::router(loader, PageConfig::default());
    tokio::spawn(server::serve(listener, app));
    format!("http://{addr}")
}

async fn post_charts(base: &str, categories: Value) -> (u16, Value) {
    let resp = reqwest::Client::new()
        .post(format!("{base}/api/charts"))
        .json(&json!({ "categories": categories }))
        .send()
        .await
        .unwrap();
    let status = resp.status().as_u16();
    (status, resp.json().await.unwrap())
}

#[tokio::test]
async fn test_page_renders_with_all_selected() {
    let base = spawn_app(FrameSource::new(sample_products())).await;

    let resp = reqwest::get(format!("{base}/")).await.unwrap();
    assert_eq!(resp.status().as_u16(), 200);
    let html = resp.text().await.unwrap();

    assert!(html.contains("Apache Hudi - Daft Dataframe"));
    assert!(html.contains(r#"<option value="All" selected>All</option>"#));
    let bakery = html.find(r#"value="bakery""#).unwrap();
    let dairy = html.find(r#"value="dairy""#).unwrap();
    let frozen = html.find(r#"value="frozen""#).unwrap();
    assert!(bakery < dairy && dairy < frozen);
    assert!(html.contains(r#""rows":6"#));
}

#[tokio::test]
async fn test_charts_follow_selection() {
    let base = spawn_app(FrameSource::new(sample_products())).await;

    let (status, body) = post_charts(&base, json!(["dairy"])).await;
    assert_eq!(status, 200);
    assert_eq!(body["rows"], 3);
    assert_eq!(body["product_variety"], json!([{"category": "dairy", "unique_products": 2}]));
    assert_eq!(body["price_distribution"].as_array().unwrap().len(), 1);

    let (_, all) = post_charts(&base, json!([])).await;
    assert_eq!(all["rows"], 6);
    let (_, all) = post_charts(&base, json!(["All", "dairy"])).await;
    assert_eq!(all["rows"], 6);
}

#[tokio::test]
async fn test_empty_view_renders() {
    let base = spawn_app(FrameSource::new(sample_products())).await;

    let (status, body) = post_charts(&base, json!(["household"])).await;
    assert_eq!(status, 200);
    assert_eq!(body["rows"], 0);
    assert_eq!(body["own_brand_share"], json!([]));
}

#[tokio::test]
async fn test_interactions_reuse_the_cached_load() {
    let source = FrameSource::new(sample_products());
    let base = spawn_app(source.clone()).await;

    reqwest::get(format!("{base}/")).await.unwrap();
    post_charts(&base, json!(["dairy"])).await;
    post_charts(&base, json!(["bakery"])).await;
    assert_eq!(source.reads(), 1);

    let resp = reqwest::Client::new()
        .post(format!("{base}/api/refresh"))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status().as_u16(), 204);
    assert_eq!(source.reads(), 2);
}

#[tokio::test]
async fn test_load_failure_replaces_dashboard() {
    let base = spawn_app(Arc::new(UnreachableSource)).await;

    let resp = reqwest::get(format!("{base}/")).await.unwrap();
    assert_eq!(resp.status().as_u16(), 503);
    let html = resp.text().await.unwrap();
    assert!(html.contains("data_source_unreachable"));
    assert!(!html.contains("chart-price"));

    let (status, body) = post_charts(&base, json!(["dairy"])).await;
    assert_eq!(status, 503);
    assert_eq!(body["error"], "data_source_unreachable");
}

#[tokio::test]
async fn test_health() {
    let base = spawn_app(Arc::new(UnreachableSource)).await;
    let resp = reqwest::get(format!("{base}/healthz")).await.unwrap();
    assert_eq!(resp.status().as_u16(), 200);
    assert_eq!(resp.text().await.unwrap(), "ok");
}
