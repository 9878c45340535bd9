//! End-to-end routing over real HTTP against a mock site.

mod common;

use std::sync::{Arc, Mutex};

use reqwest::Method;
use scraper::{Html, Selector};
use serde_json::{json, Value};

use common::start_mock_site;
use scrape_router::config::HttpConfig;
use scrape_router::fetch::{HttpFetcher, RequestOptions};
use scrape_router::pipeline::BoxError;
use scrape_router::{Router, ScrapeError, StaticPipeline};

const ARTICLE: &str = r#"<html><head><title>Article 42</title></head>
<body><h1>Hello</h1><a href="/info/1">one</a><a href="/info/2">two</a></body></html>"#;

fn fetcher() -> Arc<HttpFetcher> {
    Arc::new(HttpFetcher::new(&HttpConfig::default()).unwrap())
}

fn texts(selector: &'static str) -> impl Fn(&Html, &[Value]) -> Result<Value, BoxError> + Send + Sync + 'static {
    move |doc: &Html, _: &[Value]| {
        let selector = Selector::parse(selector).map_err(|e| e.to_string())?;
        Ok(json!(doc
            .select(&selector)
            .map(|el| el.text().collect::<String>())
            .collect::<Vec<_>>()))
    }
}

#[tokio::test]
async fn test_route_scrapes_live_page() {
    let site = start_mock_site(&[("/info/42", 200, ARTICLE)]).await;
    let mut router = Router::new(fetcher());
    router
        .on("*/info/:id")
        .unwrap()
        .create_static()
        .unwrap()
        .scrape(texts("a"))
        .then(|links, ctx| {
            Ok(json!({
                "id": ctx.param("id"),
                "status": ctx.status_code(),
                "links": links,
            }))
        });

    let outcome = router.route(&site.url("/info/42")).await.unwrap();
    assert!(outcome.matched);
    assert_eq!(
        outcome.last_return,
        json!({ "id": "42", "status": 200, "links": ["one", "two"] })
    );
}

#[tokio::test]
async fn test_status_gate_on_missing_page() {
    let site = start_mock_site(&[]).await;
    let mut router = Router::new(fetcher());
    router
        .on("*")
        .unwrap()
        .create_static()
        .unwrap()
        .on_status_code(200, |_| json!("found"))
        .on_status_code(404, |_| json!("missing"));

    let outcome = router.route(&site.url("/nowhere")).await.unwrap();
    assert_eq!(outcome.last_return, json!("missing"));
}

#[tokio::test]
async fn test_redirect_sets_final_url() {
    let site = start_mock_site(&[("/old", 302, "/new"), ("/new", 200, ARTICLE)]).await;
    let mut pipeline = StaticPipeline::new(fetcher());
    pipeline.then(|_, ctx| Ok(json!(ctx.url())));

    let final_url = pipeline.get(&site.url("/old")).await.unwrap();
    assert_eq!(final_url, json!(site.url("/new")));
}

#[tokio::test]
async fn test_custom_request_method() {
    let site = start_mock_site(&[("/search", 200, ARTICLE)]).await;
    let mut router = Router::new(fetcher());
    router
        .on("*/search")
        .unwrap()
        .request(RequestOptions::method(Method::POST).body("q=rust"))
        .unwrap()
        .create_static()
        .unwrap()
        .scrape(texts("title"));

    let outcome = router.route(&site.url("/search")).await.unwrap();
    assert_eq!(outcome.last_return, json!(["Article 42"]));
    assert_eq!(site.seen(), vec![("POST".to_string(), "/search".to_string())]);
}

#[tokio::test]
async fn test_overlapping_routes_fetch_in_order() {
    let site = start_mock_site(&[("/info/7", 200, ARTICLE)]).await;
    let order = Arc::new(Mutex::new(Vec::new()));
    let mut router = Router::new(fetcher());

    for name in ["specific", "catch-all"] {
        let order = order.clone();
        let pattern = if name == "specific" { "*/info/:id" } else { "*" };
        router
            .on(pattern)
            .unwrap()
            .create_static()
            .unwrap()
            .done(move |_, _| order.lock().unwrap().push(name));
    }

    assert!(router.route(&site.url("/info/7")).await.unwrap().matched);
    assert_eq!(*order.lock().unwrap(), vec!["specific", "catch-all"]);
    assert_eq!(site.seen().len(), 2);
}

#[tokio::test]
async fn test_connection_failure_reaches_catch() {
    let closed = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = closed.local_addr().unwrap();
    drop(closed);

    let caught = Arc::new(Mutex::new(None));
    let caught_c = caught.clone();
    let mut router = Router::new(fetcher());
    router
        .on("*")
        .unwrap()
        .create_static()
        .unwrap()
        .then(|_, _| Ok(json!("unreachable")))
        .catch(move |err, _| *caught_c.lock().unwrap() = Some(matches!(err, ScrapeError::Fetch(_))));

    let outcome = router.route(&format!("http://{addr}/")).await.unwrap();
    assert!(outcome.matched);
    assert_eq!(outcome.last_return, Value::Null);
    assert_eq!(*caught.lock().unwrap(), Some(true));
}

#[tokio::test]
async fn test_unmatched_url_calls_otherwise() {
    let site = start_mock_site(&[("/info/1", 200, ARTICLE)]).await;
    let missed = Arc::new(Mutex::new(Vec::new()));
    let missed_c = missed.clone();

    let mut router = Router::new(fetcher());
    router.on("*/info/:id").unwrap().create_static().unwrap();
    router.otherwise(move |url| missed_c.lock().unwrap().push(url.to_string()));

    let outcome = router.route(&site.url("/about")).await.unwrap();
    assert!(!outcome.matched);
    assert_eq!(*missed.lock().unwrap(), vec![site.url("/about")]);
    assert!(site.seen().is_empty());
}
