mod common;

use common::memory_store;
use crawlconf::coordinator::{Coordinator, RunOutcome};
use crawlconf::output::SinkFactory;
use crawlconf::spider::HttpSpider;
use serde_json::{json, Value};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const QUOTES: &str = r#"<html><body>
<table>
  <tr><td class="symbol">600519</td><td class="price">1,688.50</td></tr>
  <tr><td class="symbol">000001</td><td class="price">12.34</td></tr>
</table>
</body></html>"#;

fn quotes_document(server: &MockServer, pages: &[&str]) -> Value {
    let urls: Vec<String> = pages.iter().map(|p| format!("{}{}", server.uri(), p)).collect();
    json!({
        "name": "mock-quotes",
        "website_name": "Mock Exchange",
        "start_urls": urls,
        "spider_settings": {"download_delay": 0.0, "concurrent_requests": 2},
        "item_selector": {"list_selector": "table tr"},
        "data_fields": {
            "symbol": {"selector": ".symbol::text", "type": "string", "required": true},
            "price": {"selector": ".price::text", "type": "float", "required": false}
        },
        "output_settings": {"data_type": "stock_data", "save_to_database": false, "save_to_file": true}
    })
}

fn spider(output_dir: &Path) -> Arc<HttpSpider> {
    Arc::new(HttpSpider::new(
        Duration::from_secs(5),
        Duration::from_secs(30),
        SinkFactory::new(output_dir.to_path_buf(), None),
    ))
}

async fn html(server: &MockServer, at: &str, status: u16, body: &str) {
    Mock::given(method("GET"))
        .and(path(at))
        .respond_with(
            ResponseTemplate::new(status)
                .set_body_string(body)
                .insert_header("content-type", "text/html"),
        )
        .mount(server)
        .await;
}

fn read_lines(file: &Path) -> Vec<Value> {
    std::fs::read_to_string(file)
        .unwrap()
        .lines()
        .map(|l| serde_json::from_str(l).unwrap())
        .collect()
}

#[tokio::test]
async fn list_pages_produce_records() {
    let server = MockServer::start().await;
    html(&server, "/quotes", 200, QUOTES).await;
    let out = tempfile::tempdir().unwrap();

    let store = memory_store();
    let id = store
        .create(&quotes_document(&server, &["/quotes"]))
        .await
        .unwrap()
        .id;
    let coordinator = Coordinator::new(store.clone(), spider(out.path()), None);

    let run = coordinator.trigger(id).await.unwrap();
    assert_eq!(run.outcome, RunOutcome::Succeeded, "{}", run.message);
    assert_eq!(run.items, 2);

    let records = read_lines(&out.path().join("stock_data.jsonl"));
    assert_eq!(records.len(), 2);
    assert_eq!(records[0]["symbol"], "600519");
    assert_eq!(records[0]["price"], json!(1688.5));
    assert_eq!(records[0]["source_url"], format!("{}/quotes", server.uri()));
    assert_eq!(records[0]["config_id"], id.get());
    assert!(records[1]["crawl_time"].is_string());

    let config = store.get(id).await.unwrap();
    assert_eq!((config.run_count, config.success_count), (1, 1));
}

#[tokio::test]
async fn duplicate_records_are_dropped() {
    let repeated = r#"<html><body><table>
  <tr><td class="symbol">600519</td><td class="price">1,688.50</td></tr>
  <tr><td class="symbol">600519</td><td class="price">1,688.50</td></tr>
  <tr><td class="symbol">000001</td><td class="price">12.34</td></tr>
</table></body></html>"#;
    let server = MockServer::start().await;
    html(&server, "/quotes", 200, repeated).await;
    let out = tempfile::tempdir().unwrap();

    let store = memory_store();
    let id = store
        .create(&quotes_document(&server, &["/quotes"]))
        .await
        .unwrap()
        .id;
    let coordinator = Coordinator::new(store, spider(out.path()), None);

    let run = coordinator.trigger(id).await.unwrap();
    assert!(run.succeeded(), "{}", run.message);
    assert_eq!(run.items, 2);
    assert_eq!(read_lines(&out.path().join("stock_data.jsonl")).len(), 2);
}

#[tokio::test]
async fn server_errors_fail_the_run() {
    let server = MockServer::start().await;
    html(&server, "/quotes", 500, "oops").await;
    let out = tempfile::tempdir().unwrap();

    let store = memory_store();
    let id = store
        .create(&quotes_document(&server, &["/quotes"]))
        .await
        .unwrap()
        .id;
    let coordinator = Coordinator::new(store.clone(), spider(out.path()), None);

    let run = coordinator.trigger(id).await.unwrap();
    assert_eq!(run.outcome, RunOutcome::Failed);
    assert!(run.message.contains("none of the 1 page requests succeeded"));

    let config = store.get(id).await.unwrap();
    assert_eq!((config.run_count, config.success_count), (1, 0));
}

#[tokio::test]
async fn partial_failures_still_succeed() {
    let server = MockServer::start().await;
    html(&server, "/quotes", 200, QUOTES).await;
    html(&server, "/missing", 404, "").await;
    let out = tempfile::tempdir().unwrap();

    let store = memory_store();
    let id = store
        .create(&quotes_document(&server, &["/quotes", "/missing"]))
        .await
        .unwrap()
        .id;
    let coordinator = Coordinator::new(store, spider(out.path()), None);

    let run = coordinator.trigger(id).await.unwrap();
    assert!(run.succeeded(), "{}", run.message);
    assert_eq!(run.items, 2);
}

#[tokio::test]
async fn slow_runs_time_out() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/slow"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_string(QUOTES)
                .set_delay(Duration::from_secs(5)),
        )
        .mount(&server)
        .await;
    let out = tempfile::tempdir().unwrap();

    let store = memory_store();
    let id = store
        .create(&quotes_document(&server, &["/slow"]))
        .await
        .unwrap()
        .id;
    let spider = Arc::new(HttpSpider::new(
        Duration::from_secs(10),
        Duration::from_secs(1),
        SinkFactory::new(out.path().to_path_buf(), None),
    ));
    let coordinator = Coordinator::new(store, spider, None);

    let run = coordinator.trigger(id).await.unwrap();
    assert_eq!(run.outcome, RunOutcome::Failed);
    assert!(run.message.contains("timed out"));
}

fn linked_page(symbol: &str, next: Option<&str>) -> String {
    let link = next
        .map(|href| format!(r#"<a class="next" href="{}">next</a>"#, href))
        .unwrap_or_default();
    format!(
        r#"<html><body><table>
  <tr><td class="symbol">{}</td><td class="price">1.00</td></tr>
</table>{}</body></html>"#,
        symbol, link
    )
}

fn paginated_document(server: &MockServer, pagination: Value) -> Value {
    let mut doc = quotes_document(server, &["/p1"]);
    doc["pagination"] = pagination;
    doc
}

async fn requests(server: &MockServer) -> Vec<String> {
    server
        .received_requests()
        .await
        .unwrap()
        .iter()
        .map(|r| r.url.path().to_string())
        .collect()
}

async fn run_collecting(doc: &Value) -> (u64, Vec<String>) {
    let out = tempfile::tempdir().unwrap();
    let store = memory_store();
    let id = store.create(doc).await.unwrap().id;
    let coordinator = Coordinator::new(store, spider(out.path()), None);

    let run = coordinator.trigger(id).await.unwrap();
    assert!(run.succeeded(), "{}", run.message);
    let symbols = read_lines(&out.path().join("stock_data.jsonl"))
        .iter()
        .map(|r| r["symbol"].as_str().unwrap().to_string())
        .collect();
    (run.items, symbols)
}

#[tokio::test]
async fn pagination_stops_at_max_pages() {
    let server = MockServer::start().await;
    html(&server, "/p1", 200, &linked_page("P1", Some("/p2"))).await;
    html(&server, "/p2", 200, &linked_page("P2", Some("/p3"))).await;
    html(&server, "/p3", 200, &linked_page("P3", None)).await;

    let doc = paginated_document(
        &server,
        json!({"enabled": true, "next_page_selector": "a.next::attr(href)", "max_pages": 2}),
    );
    let (items, symbols) = run_collecting(&doc).await;
    assert_eq!(items, 2);
    assert_eq!(symbols, ["P1", "P2"]);
    assert_eq!(requests(&server).await, ["/p1", "/p2"]);
}

#[tokio::test]
async fn disabled_pagination_reads_only_the_start_page() {
    let server = MockServer::start().await;
    html(&server, "/p1", 200, &linked_page("P1", Some("/p2"))).await;
    html(&server, "/p2", 200, &linked_page("P2", None)).await;

    let doc = paginated_document(
        &server,
        json!({"enabled": false, "next_page_selector": "a.next::attr(href)", "max_pages": 5}),
    );
    let (items, symbols) = run_collecting(&doc).await;
    assert_eq!(items, 1);
    assert_eq!(symbols, ["P1"]);
    assert_eq!(requests(&server).await, ["/p1"]);
}

#[tokio::test]
async fn next_links_outside_allowed_domains_are_not_followed() {
    let server = MockServer::start().await;
    let port = server.address().port();
    let elsewhere = format!("http://localhost:{}/p2", port);
    html(&server, "/p1", 200, &linked_page("P1", Some(&elsewhere))).await;
    html(&server, "/p2", 200, &linked_page("P2", None)).await;

    let mut doc = paginated_document(
        &server,
        json!({"enabled": true, "next_page_selector": "a.next::attr(href)", "max_pages": 5}),
    );
    doc["allowed_domains"] = json!([server.address().ip().to_string()]);
    let (items, symbols) = run_collecting(&doc).await;
    assert_eq!(items, 1);
    assert_eq!(symbols, ["P1"]);
    assert_eq!(requests(&server).await, ["/p1"]);
}

#[tokio::test]
async fn rows_missing_a_field_do_not_borrow_from_later_rows() {
    let gappy = r#"<html><body><table>
  <tr><td class="symbol">AAA</td><td class="price">1.0</td></tr>
  <tr><td class="symbol">BBB</td></tr>
  <tr><td class="symbol">CCC</td><td class="price">3.0</td></tr>
</table></body></html>"#;
    let server = MockServer::start().await;
    html(&server, "/quotes", 200, gappy).await;
    let out = tempfile::tempdir().unwrap();

    let store = memory_store();
    let id = store
        .create(&quotes_document(&server, &["/quotes"]))
        .await
        .unwrap()
        .id;
    let coordinator = Coordinator::new(store, spider(out.path()), None);
    assert!(coordinator.trigger(id).await.unwrap().succeeded());

    let records = read_lines(&out.path().join("stock_data.jsonl"));
    assert_eq!(records.len(), 3);
    assert_eq!(records[1]["symbol"], "BBB");
    assert!(records[1].get("price").is_none());
    assert_eq!(records[2]["symbol"], "CCC");
    assert_eq!(records[2]["price"], json!(3.0));
}
