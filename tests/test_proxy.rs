//! Tests for outbound request preparation

use anyhow::Context;
use api_gateway::config::Config;
use api_gateway::http::request::{Method, RequestBuilder};
use api_gateway::http::response::StatusCode;
use api_gateway::proxy::headers::{
    DefaultHeaders, GATEWAY_HEADER, GATEWAY_ID, Stage, inject_gateway_header, run_stages,
};
use api_gateway::proxy::router::Router;
use api_gateway::proxy::upstream::{ProxyHandler, build_http_request};
use std::time::Duration;

fn router() -> Router {
    Router::from_config(&Config::default()).unwrap()
}

#[test]
fn test_gateway_header_stage_overwrites_client_value() {
    let request = RequestBuilder::new()
        .method(Method::GET)
        .path("/anything")
        .header("x-api-gateway", "client")
        .build()
        .unwrap();

    let stages: [Stage; 1] = [inject_gateway_header];
    let request = run_stages(&stages, request);

    assert_eq!(request.header(GATEWAY_HEADER), Some(GATEWAY_ID));
    assert_eq!(request.headers.len(), 1);
}

#[test]
fn test_default_headers_never_overwrite() {
    let defaults = DefaultHeaders::new()
        .with("X-APP-PACKAGE-NAME", "fallback")
        .with("X-Extra", "1");

    let mut request = RequestBuilder::new()
        .method(Method::GET)
        .path("/")
        .header("x-app-package-name", "com.example")
        .build()
        .unwrap();

    defaults.apply(&mut request);

    assert_eq!(request.header("X-APP-PACKAGE-NAME"), Some("com.example"));
    assert_eq!(request.header("X-Extra"), Some("1"));
}

#[test]
fn test_prepare_app_api_request() {
    let router = router();
    let rule = router.route("/api/app-api/foo").unwrap();

    let request = RequestBuilder::new()
        .method(Method::POST)
        .path("/api/app-api/foo/bar?x=1")
        .header("Host", "gateway.local:8080")
        .header("Content-Length", "2")
        .body(b"{}".to_vec())
        .build()
        .unwrap();

    let outbound = ProxyHandler::default().prepare(rule, &request);

    assert_eq!(outbound.method, Method::POST);
    assert_eq!(outbound.path, "/api/app-api/?x=1");
    assert_eq!(outbound.header("Host"), Some("app-service:4000"));
    assert_eq!(
        outbound.header("X-APP-PACKAGE-NAME"),
        Some("your_default_package_name")
    );
    assert_eq!(outbound.header("Content-Length"), Some("2"));
    assert_eq!(outbound.body, b"{}".to_vec());
}

#[test]
fn test_prepare_products_request_has_no_package_header() {
    let router = router();
    let rule = router.route("/api/products").unwrap();

    let request = RequestBuilder::new()
        .method(Method::GET)
        .path("/api/products/widgets/42")
        .build()
        .unwrap();

    let outbound = ProxyHandler::default().prepare(rule, &request);

    assert_eq!(outbound.path, "/widgets/42");
    assert_eq!(outbound.header("Host"), Some("products-service:4000"));
    assert!(!outbound.has_header("X-APP-PACKAGE-NAME"));
}

#[test]
fn test_prepare_removes_hop_by_hop_headers() {
    let router = router();
    let rule = router.route("/api/products").unwrap();

    let request = RequestBuilder::new()
        .method(Method::GET)
        .path("/api/products")
        .header("connection", "keep-alive")
        .header("Upgrade", "websocket")
        .header("Keep-Alive", "timeout=5")
        .header("Expect", "100-continue")
        .header("User-Agent", "Test")
        .build()
        .unwrap();

    let outbound = ProxyHandler::default().prepare(rule, &request);

    assert_eq!(outbound.header("Connection"), Some("close"));
    assert!(!outbound.has_header("Upgrade"));
    assert!(!outbound.has_header("Keep-Alive"));
    assert!(!outbound.has_header("Expect"));
    assert_eq!(outbound.header("User-Agent"), Some("Test"));
}

#[test]
fn test_prepare_keeps_repeated_headers_in_order() {
    let router = router();
    let rule = router.route("/api/products").unwrap();

    let request = RequestBuilder::new()
        .method(Method::GET)
        .path("/api/products")
        .header("X-Forwarded-For", "10.0.0.1")
        .header("X-Forwarded-For", "10.0.0.2")
        .build()
        .unwrap();

    let outbound = ProxyHandler::default().prepare(rule, &request);
    let wire = String::from_utf8(build_http_request(&outbound)).unwrap();

    let first = wire.find("X-Forwarded-For: 10.0.0.1\r\n").unwrap();
    let second = wire.find("X-Forwarded-For: 10.0.0.2\r\n").unwrap();
    assert!(first < second);
}

#[test]
fn test_build_http_request_wire_format() {
    let request = RequestBuilder::new()
        .method(Method::PUT)
        .path("/widgets/42")
        .header("Host", "products-service:4000")
        .body(b"data".to_vec())
        .build()
        .unwrap();

    let wire = build_http_request(&request);
    let text = String::from_utf8_lossy(&wire);

    assert!(text.starts_with("PUT /widgets/42 HTTP/1.1\r\n"));
    assert!(text.contains("Host: products-service:4000\r\n"));
    assert!(text.ends_with("\r\n\r\ndata"));
}

#[test]
fn test_build_http_request_default_path() {
    let request = RequestBuilder::new()
        .method(Method::GET)
        .path("")
        .build()
        .unwrap();

    let wire = build_http_request(&request);
    assert!(String::from_utf8_lossy(&wire).starts_with("GET / HTTP/1.1\r\n"));
}

#[tokio::test]
async fn test_error_response_for_timeout() {
    let elapsed = tokio::time::timeout(Duration::ZERO, std::future::pending::<()>())
        .await
        .unwrap_err();
    let err = Err::<(), _>(elapsed)
        .context("Connection timeout")
        .unwrap_err();

    let response = ProxyHandler::default().error_response(&err);
    assert_eq!(response.status, StatusCode::GatewayTimeout);
}

#[test]
fn test_error_response_for_connect_failure() {
    let err = anyhow::anyhow!("Failed to connect to upstream app-service:4000");

    let response = ProxyHandler::default().error_response(&err);
    assert_eq!(response.status, StatusCode::BadGateway);
}
