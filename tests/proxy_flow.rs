//! End-to-end request flows against a live server with a fake engine.

mod common;

use common::{start_proxy, start_upstream, test_config, FakeEngine, MockResponse};
use render_proxy::config::validation::ValidationError;
use render_proxy::config::ProxyConfig;
use render_proxy::lifecycle::StartupError;
use render_proxy::HttpServer;
use reqwest::StatusCode;
use serde_json::Value;
use std::sync::atomic::Ordering;
use std::time::Duration;

const PAGE: &str = r#"<!DOCTYPE html><html><head><meta http-equiv="Content-Security-Policy" content="default-src 'self'"><script src="/app.js"></script><link rel="stylesheet" href="styles/site.css"></head><body><img src="//cdn.example.com/logo.png"><a href="/next">next</a></body></html>"#;

#[tokio::test]
async fn document_is_rendered_and_rewritten() {
    let engine = FakeEngine::serving(PAGE);
    let proxy = start_proxy(test_config(), engine.clone()).await;
    let origin = format!("http://{}", proxy.addr);

    let res = reqwest::get(proxy.proxy_url("https://example.com/page")).await.unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let headers = res.headers().clone();
    assert_eq!(headers["x-proxied-url"], "https://example.com/page");
    assert_eq!(headers["access-control-allow-origin"], "*");
    assert_eq!(headers["cache-control"], "no-cache, no-store, must-revalidate");
    assert!(headers["content-type"].to_str().unwrap().starts_with("text/html"));
    assert!(headers.contains_key("x-request-id"));

    let body = res.text().await.unwrap();
    assert!(body.contains(&format!(
        r#"src="{origin}/proxy?url=https%3A%2F%2Fexample.com%2Fapp.js""#
    )));
    assert!(body.contains(&format!(
        r#"href="{origin}/proxy?url=https%3A%2F%2Fexample.com%2Fstyles%2Fsite.css""#
    )));
    assert!(body.contains("proxy?url=https%3A%2F%2Fcdn.example.com%2Flogo.png"));
    assert!(body.contains(r#"<base href="https://example.com/page">"#));
    assert!(body.contains("data-render-proxy-shim"));
    assert!(!body.contains("Content-Security-Policy"));
    // Anchors are left to the click handler.
    assert!(body.contains(r#"<a href="/next">"#));

    assert_eq!(engine.launches.load(Ordering::SeqCst), 1);
    assert_eq!(engine.open_pages.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn failed_script_becomes_empty_stub() {
    let upstream = start_upstream(|req| match req.path.as_str() {
        "/missing.js" => MockResponse::new(404, "text/plain", "not found"),
        "/challenge.js" => MockResponse::new(200, "text/html", "<!DOCTYPE html><html><title>Just a moment...</title></html>"),
        _ => MockResponse::new(200, "application/javascript", "console.log('ok');"),
    })
    .await;
    let engine = FakeEngine::serving(PAGE);
    let proxy = start_proxy(test_config(), engine.clone()).await;

    let res = reqwest::get(proxy.proxy_url(&upstream.url("/missing.js"))).await.unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    assert!(res.headers()["content-type"].to_str().unwrap().starts_with("application/javascript"));
    assert_eq!(res.headers()["x-proxy-stub"], "upstream_status");
    assert_eq!(res.headers()["cache-control"], "no-store");
    assert_eq!(res.text().await.unwrap(), "");

    let res = reqwest::get(proxy.proxy_url(&upstream.url("/challenge.js"))).await.unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    assert_eq!(res.headers()["x-proxy-stub"], "html_challenge");
    assert_eq!(res.text().await.unwrap(), "");

    let res = reqwest::get(proxy.proxy_url(&upstream.url("/app.js"))).await.unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    assert_eq!(res.headers()["cache-control"], "public, max-age=3600");
    assert_eq!(res.headers()["x-proxy-class"], "subresource");
    assert_eq!(res.text().await.unwrap(), "console.log('ok');");

    // Sub-resources never touch the engine.
    assert_eq!(engine.launches.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn upstream_sends_browser_like_headers() {
    let upstream = start_upstream(|_| MockResponse::new(200, "text/css", "body{}")).await;
    let proxy = start_proxy(test_config(), FakeEngine::serving(PAGE)).await;

    let res = reqwest::get(proxy.proxy_url(&upstream.url("/site.css"))).await.unwrap();
    assert_eq!(res.status(), StatusCode::OK);

    let recorded = upstream.recorded();
    assert_eq!(recorded.len(), 1);
    let req = &recorded[0];
    assert_eq!(req.header("accept"), Some("text/css,*/*;q=0.1"));
    assert_eq!(req.header("referer"), Some(format!("http://{}/", upstream.addr).as_str()));
    assert!(req.header("user-agent").unwrap().contains("Mozilla/5.0"));
    assert!(req.header("accept-language").is_some());
}

#[tokio::test]
async fn invalid_and_missing_urls_are_rejected() {
    let proxy = start_proxy(test_config(), FakeEngine::serving(PAGE)).await;

    let res = reqwest::get(proxy.url("/proxy?url=not-a-url")).await.unwrap();
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);
    assert_eq!(res.headers()["access-control-allow-origin"], "*");
    let json: Value = res.json().await.unwrap();
    assert_eq!(json["error"], "Invalid URL format");
    assert_eq!(json["kind"], "invalid_url");

    let res = reqwest::get(proxy.url("/proxy")).await.unwrap();
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);
    let json: Value = res.json().await.unwrap();
    assert_eq!(json["kind"], "missing_url");

    let res = reqwest::get(proxy.url("/proxy?url=https%3A%2F%2Fexample.com%2F&mode=gif")).await.unwrap();
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);

    let res = reqwest::get(proxy.url("/resource?url=ftp%3A%2F%2Fexample.com%2Ffile")).await.unwrap();
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);

    // A query string that does not decode gets the same JSON shape.
    for route in ["/proxy", "/resource"] {
        let res = reqwest::get(proxy.url(&format!(
            "{route}?url=https%3A%2F%2Fa.example%2F&url=https%3A%2F%2Fb.example%2F"
        )))
        .await
        .unwrap();
        assert_eq!(res.status(), StatusCode::BAD_REQUEST);
        let json: Value = res.json().await.unwrap();
        assert_eq!(json["error"], "Invalid URL format");
        assert_eq!(json["kind"], "invalid_url");
    }
}

#[tokio::test]
async fn tracking_requests_are_answered_locally() {
    let engine = FakeEngine::serving(PAGE);
    let proxy = start_proxy(test_config(), engine.clone()).await;

    let res = reqwest::get(proxy.proxy_url("https://www.google-analytics.com/collect?v=1&tid=UA-1"))
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::NO_CONTENT);
    assert_eq!(res.headers()["x-proxy-stub"], "tracking");

    let res = reqwest::get(proxy.proxy_url("https://www.googletagmanager.com/gtag/js?id=G-1"))
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    assert!(res.headers()["content-type"].to_str().unwrap().starts_with("application/javascript"));
    assert_eq!(res.text().await.unwrap(), "");

    assert_eq!(engine.launches.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn api_calls_forward_method_and_body() {
    let upstream = start_upstream(|req| {
        if req.method == "POST" {
            MockResponse::new(201, "application/json", r#"{"created":true}"#)
        } else {
            MockResponse::new(200, "application/json", "[]")
        }
    })
    .await;
    let engine = FakeEngine::serving(PAGE);
    let proxy = start_proxy(test_config(), engine.clone()).await;

    let res = reqwest::Client::new()
        .post(proxy.proxy_url(&upstream.url("/api/items")))
        .header("content-type", "application/json")
        .body(r#"{"name":"widget"}"#)
        .send()
        .await
        .unwrap();
    assert_eq!(res.status().as_u16(), 201);
    assert_eq!(res.headers()["x-proxy-class"], "api");
    assert_eq!(res.headers()["cache-control"], "no-store");
    assert_eq!(res.text().await.unwrap(), r#"{"created":true}"#);

    let recorded = upstream.recorded();
    assert_eq!(recorded.len(), 1);
    assert_eq!(recorded[0].method, "POST");
    assert_eq!(recorded[0].path, "/api/items");
    assert_eq!(recorded[0].body, r#"{"name":"widget"}"#);
    assert_eq!(recorded[0].header("content-type"), Some("application/json"));
    assert_eq!(engine.launches.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn resource_endpoint_never_renders() {
    let upstream = start_upstream(|_| MockResponse::new(200, "text/html", "<html><body>raw</body></html>")).await;
    let engine = FakeEngine::serving(PAGE);
    let proxy = start_proxy(test_config(), engine.clone()).await;

    let res = reqwest::get(proxy.url(&format!(
        "/resource?url={}",
        urlencoding::encode(&upstream.url("/about"))
    )))
    .await
    .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    assert_eq!(res.text().await.unwrap(), "<html><body>raw</body></html>");
    assert_eq!(engine.launches.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn concurrent_documents_share_one_launch() {
    let engine = FakeEngine::serving(PAGE);
    let proxy = start_proxy(test_config(), engine.clone()).await;
    let client = reqwest::Client::new();

    let requests = (0..8).map(|i| {
        let client = client.clone();
        let url = proxy.proxy_url(&format!("https://example.com/page/{i}"));
        tokio::spawn(async move { client.get(url).send().await.unwrap().status() })
    });
    for handle in requests.collect::<Vec<_>>() {
        assert_eq!(handle.await.unwrap(), StatusCode::OK);
    }

    assert_eq!(engine.launches.load(Ordering::SeqCst), 1);
    assert_eq!(engine.pages_created.load(Ordering::SeqCst), 8);
    assert_eq!(engine.open_pages.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn capture_modes_return_binary_payloads() {
    let proxy = start_proxy(test_config(), FakeEngine::serving(PAGE)).await;

    let res = reqwest::get(proxy.url("/proxy?url=https%3A%2F%2Fexample.com%2F&mode=screenshot")).await.unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    assert_eq!(res.headers()["content-type"], "image/png");
    assert!(res.bytes().await.unwrap().starts_with(&[0x89, b'P', b'N', b'G']));

    let res = reqwest::get(proxy.url("/proxy?url=https%3A%2F%2Fexample.com%2F&mode=pdf")).await.unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    assert_eq!(res.headers()["content-type"], "application/pdf");
    assert!(res.bytes().await.unwrap().starts_with(b"%PDF"));
}

#[tokio::test]
async fn unresolvable_host_is_bad_gateway() {
    let engine = FakeEngine::serving(PAGE);
    let proxy = start_proxy(test_config(), engine.clone()).await;

    let res = reqwest::get(proxy.proxy_url("https://nothing-here.invalid/")).await.unwrap();
    assert_eq!(res.status(), StatusCode::BAD_GATEWAY);
    let json: Value = res.json().await.unwrap();
    assert_eq!(json["kind"], "navigation_failed");
    assert!(json["detail"].as_str().unwrap().contains("ERR_NAME_NOT_RESOLVED"));
    assert_eq!(engine.open_pages.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn health_reports_session_lifecycle() {
    let proxy = start_proxy(test_config(), FakeEngine::serving(PAGE)).await;

    let health: Value = reqwest::get(proxy.url("/health")).await.unwrap().json().await.unwrap();
    assert_eq!(health["status"], "ok");
    assert_eq!(health["session_initialized"], false);
    assert_eq!(health["session"]["status"], "uninitialized");

    let res = reqwest::get(proxy.proxy_url("https://example.com/")).await.unwrap();
    assert_eq!(res.status(), StatusCode::OK);

    let health: Value = reqwest::get(proxy.url("/health")).await.unwrap().json().await.unwrap();
    assert_eq!(health["session_initialized"], true);
    assert_eq!(health["session"]["status"], "ready");
    assert_eq!(health["session"]["launches"], 1);
}

#[tokio::test]
async fn failed_launch_is_service_unavailable() {
    let engine = FakeEngine::failing();
    let proxy = start_proxy(test_config(), engine.clone()).await;

    let res = reqwest::get(proxy.proxy_url("https://example.com/")).await.unwrap();
    assert_eq!(res.status(), StatusCode::SERVICE_UNAVAILABLE);
    let json: Value = res.json().await.unwrap();
    assert_eq!(json["kind"], "session_launch_failed");
    assert!(json["detail"].as_str().unwrap().contains("crashed on startup"));

    let health: Value = reqwest::get(proxy.url("/health")).await.unwrap().json().await.unwrap();
    assert_eq!(health["status"], "ok");
    assert_eq!(health["session"]["status"], "failed");

    // The next document request retries the launch.
    let res = reqwest::get(proxy.proxy_url("https://example.com/")).await.unwrap();
    assert_eq!(res.status(), StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(engine.launches.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn classifier_reload_takes_effect_without_restart() {
    let upstream = start_upstream(|_| MockResponse::new(200, "image/gif", "GIF89a")).await;
    let proxy = start_proxy(test_config(), FakeEngine::serving(PAGE)).await;
    let target = upstream.url("/banner.gif");

    let res = reqwest::get(proxy.proxy_url(&target)).await.unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    assert_eq!(upstream.recorded().len(), 1);

    let mut config = test_config();
    config.classifier.tracking_hosts.push("127.0.0.1".into());
    proxy.config_updates.send(config).unwrap();

    let mut status = StatusCode::OK;
    for _ in 0..50 {
        status = reqwest::get(proxy.proxy_url(&target)).await.unwrap().status();
        if status == StatusCode::NO_CONTENT {
            break;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    assert_eq!(status, StatusCode::NO_CONTENT);

    // Suppressed requests never reach the upstream.
    let seen = upstream.recorded().len();
    let res = reqwest::get(proxy.proxy_url(&target)).await.unwrap();
    assert_eq!(res.status(), StatusCode::NO_CONTENT);
    assert_eq!(upstream.recorded().len(), seen);
}

#[tokio::test]
async fn shutdown_drains_and_stops() {
    let proxy = start_proxy(test_config(), FakeEngine::serving(PAGE)).await;

    let res = reqwest::get(proxy.url("/health")).await.unwrap();
    assert_eq!(res.status(), StatusCode::OK);

    proxy.shutdown.trigger();
    let result = tokio::time::timeout(Duration::from_secs(5), proxy.handle).await;
    assert!(matches!(result, Ok(Ok(Ok(())))));
}

#[tokio::test]
async fn request_timeout_must_cover_fallback_chain() {
    let mut config = ProxyConfig::default();
    config.render.executable = test_config().render.executable;
    config.timeouts.request_secs = 60;

    let err = HttpServer::new(config, FakeEngine::serving(PAGE)).err().unwrap();
    match err {
        StartupError::Invalid(errors) => assert!(matches!(
            errors.as_slice(),
            [ValidationError::RequestTimeoutTooShort { request_secs: 60, .. }]
        )),
        other => panic!("unexpected startup error: {other}"),
    }
}
