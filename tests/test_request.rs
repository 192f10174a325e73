use api_gateway::http::request::{Method, Request, RequestBuilder};

fn get(path: &str) -> Request {
    RequestBuilder::new()
        .method(Method::GET)
        .path(path)
        .build()
        .unwrap()
}

#[test]
fn test_request_header_lookup_ignores_case() {
    let req = RequestBuilder::new()
        .method(Method::GET)
        .path("/")
        .header("content-type", "application/json")
        .build()
        .unwrap();

    assert_eq!(req.header("Content-Type"), Some("application/json"));
    assert_eq!(req.header("CONTENT-TYPE"), Some("application/json"));
    assert_eq!(req.header("Missing"), None);
}

#[test]
fn test_request_set_header_replaces_other_casings() {
    let mut req = RequestBuilder::new()
        .method(Method::GET)
        .path("/")
        .header("x-api-gateway", "spoofed")
        .build()
        .unwrap();

    req.set_header("X-API-GATEWAY", "NODE-1.0");

    assert_eq!(req.headers.len(), 1);
    assert_eq!(req.header("x-api-gateway"), Some("NODE-1.0"));
}

#[test]
fn test_request_remove_header() {
    let mut req = RequestBuilder::new()
        .method(Method::GET)
        .path("/")
        .header("Upgrade", "websocket")
        .build()
        .unwrap();

    req.remove_header("upgrade");
    assert!(!req.has_header("Upgrade"));
}

#[test]
fn test_request_keeps_repeated_headers() {
    let req = RequestBuilder::new()
        .method(Method::GET)
        .path("/")
        .header("X-Forwarded-For", "10.0.0.1")
        .header("x-forwarded-for", "10.0.0.2")
        .build()
        .unwrap();

    assert_eq!(req.headers.len(), 2);
    assert_eq!(req.header("X-Forwarded-For"), Some("10.0.0.1"));
    assert_eq!(
        req.header_values("X-FORWARDED-FOR").collect::<Vec<_>>(),
        vec!["10.0.0.1", "10.0.0.2"]
    );
}

#[test]
fn test_request_remove_header_drops_every_entry() {
    let mut req = RequestBuilder::new()
        .method(Method::GET)
        .path("/")
        .header("Via", "a")
        .header("Accept", "*/*")
        .header("via", "b")
        .build()
        .unwrap();

    req.remove_header("VIA");
    assert_eq!(req.headers, vec![("Accept".to_string(), "*/*".to_string())]);
}

#[test]
fn test_request_keep_alive_defaults_by_version() {
    assert!(get("/").keep_alive());

    let http10 = RequestBuilder::new()
        .method(Method::GET)
        .path("/")
        .version("HTTP/1.0")
        .build()
        .unwrap();
    assert!(!http10.keep_alive());
}

#[test]
fn test_request_keep_alive_explicit_header() {
    let close = RequestBuilder::new()
        .method(Method::GET)
        .path("/")
        .header("Connection", "Close")
        .build()
        .unwrap();
    assert!(!close.keep_alive());

    let http10_keep = RequestBuilder::new()
        .method(Method::GET)
        .path("/")
        .version("HTTP/1.0")
        .header("connection", "Keep-Alive")
        .build()
        .unwrap();
    assert!(http10_keep.keep_alive());
}

#[test]
fn test_request_route_path_and_query() {
    let req = get("/api/app-api/foo?x=1&y=2");
    assert_eq!(req.route_path(), "/api/app-api/foo");
    assert_eq!(req.query(), Some("x=1&y=2"));

    let bare = get("/api/products");
    assert_eq!(bare.route_path(), "/api/products");
    assert_eq!(bare.query(), None);
}

#[test]
fn test_request_query_param_is_decoded() {
    let req = get("/get-status-code?url=http%3A%2F%2Fexample.test%2Fok%3Fa%3Db&other=1");
    assert_eq!(
        req.query_param("url").as_deref(),
        Some("http://example.test/ok?a=b")
    );
    assert_eq!(req.query_param("other").as_deref(), Some("1"));
    assert_eq!(req.query_param("missing"), None);
}

#[test]
fn test_request_query_param_first_value_wins() {
    let req = get("/get-status-code?url=http://a.test&url=http://b.test");
    assert_eq!(req.query_param("url").as_deref(), Some("http://a.test"));
}

#[test]
fn test_request_builder_requires_method_and_path() {
    assert!(RequestBuilder::new().path("/").build().is_err());
    assert!(RequestBuilder::new().method(Method::GET).build().is_err());
}

#[test]
fn test_request_method_from_string() {
    assert_eq!(Method::from_str("GET"), Some(Method::GET));
    assert_eq!(Method::from_str("DELETE"), Some(Method::DELETE));
    assert_eq!(Method::OPTIONS.as_str(), "OPTIONS");
}

#[test]
fn test_request_extension_methods_are_kept() {
    let purge = Method::from_str("PURGE").unwrap();
    assert_eq!(purge, Method::Other("PURGE".to_string()));
    assert_eq!(purge.as_str(), "PURGE");

    assert_eq!(
        Method::from_str("get"),
        Some(Method::Other("get".to_string()))
    );
    assert_eq!(Method::from_str(""), None);
    assert_eq!(Method::from_str("BAD/VERB"), None);
}
