use prefix_proxy::http::headers::Headers;
use prefix_proxy::http::request::{Method, Request, RequestBuilder};

fn request(method: Method, path: &str, headers: Headers) -> Request {
    Request {
        method,
        scheme: None,
        authority: None,
        path: path.to_string(),
        query: String::new(),
        version: "HTTP/1.1".to_string(),
        headers,
        body: vec![],
        peer_addr: None,
    }
}

#[test]
fn test_request_header_retrieval() {
    let mut headers = Headers::new();
    headers.append("Host", "example.com");
    headers.append("Content-Type", "application/json");

    let req = request(Method::GET, "/", headers);

    assert_eq!(req.header("Host"), Some("example.com"));
    assert_eq!(req.header("host"), Some("example.com"));
    assert_eq!(req.header("Content-Type"), Some("application/json"));
    assert_eq!(req.header("Missing"), None);
}

#[test]
fn test_request_set_header_replaces_case_variants() {
    let mut headers = Headers::new();
    headers.append("host", "client.example");

    let mut req = request(Method::GET, "/", headers);
    req.set_header("Host", "upstream.local");

    assert_eq!(req.headers.len(), 1);
    assert_eq!(req.headers.get("Host").unwrap(), "upstream.local");
}

#[test]
fn test_request_content_length_parsing() {
    let mut headers = Headers::new();
    headers.append("Content-Length", "42");

    let req = request(Method::POST, "/api", headers);

    assert_eq!(req.content_length(), 42);
}

#[test]
fn test_request_content_length_missing() {
    let req = request(Method::GET, "/", Headers::new());
    assert_eq!(req.content_length(), 0);
}

#[test]
fn test_request_content_length_invalid() {
    let mut headers = Headers::new();
    headers.append("Content-Length", "not-a-number");

    let req = request(Method::POST, "/api", headers);

    assert_eq!(req.content_length(), 0);
}

#[test]
fn test_request_keep_alive_http11_default() {
    let req = request(Method::GET, "/", Headers::new());
    assert!(req.keep_alive());
}

#[test]
fn test_request_keep_alive_close() {
    let mut headers = Headers::new();
    headers.append("Connection", "close");

    let req = request(Method::GET, "/", headers);

    assert!(!req.keep_alive());
}

#[test]
fn test_request_keep_alive_http10() {
    let mut req = request(Method::GET, "/", Headers::new());
    req.version = "HTTP/1.0".to_string();
    assert!(!req.keep_alive());

    req.headers.insert("Connection", "Keep-Alive");
    assert!(req.keep_alive());
}

#[test]
fn test_request_method_from_string() {
    assert_eq!(Method::from_str("GET"), Some(Method::GET));
    assert_eq!(Method::from_str("POST"), Some(Method::POST));
    assert_eq!(Method::from_str("INVALID"), None);
    assert_eq!(Method::from_str("get"), None); // Case-sensitive
}

#[test]
fn test_request_method_extension_tokens() {
    let propfind = Method::from_token("PROPFIND").unwrap();
    assert_eq!(propfind, Method::Extension("PROPFIND".to_string()));
    assert_eq!(propfind.as_str(), "PROPFIND");
    assert_eq!(Method::from_token("GET"), Some(Method::GET));
    assert_eq!(Method::from_token(""), None);
    assert_eq!(Method::from_token("MK COL"), None);
}

#[test]
fn test_request_repeated_headers_survive_builder() {
    let req = RequestBuilder::new()
        .method(Method::GET)
        .path("/")
        .header("Accept", "text/html")
        .header("Accept", "application/json")
        .build()
        .unwrap();

    assert_eq!(req.header("accept"), Some("text/html"));
    assert_eq!(req.headers.get_all("Accept").count(), 2);
}

#[test]
fn test_request_only_options_is_preflight() {
    let mut req = request(Method::OPTIONS, "/", Headers::new());
    assert!(req.is_preflight());

    req.method = Method::Extension("PROPFIND".to_string());
    assert!(!req.is_preflight());
}

#[test]
fn test_request_method_display() {
    assert_eq!(Method::OPTIONS.to_string(), "OPTIONS");
    assert_eq!(Method::PATCH.as_str(), "PATCH");
}

#[test]
fn test_request_uri_and_url() {
    let mut req = RequestBuilder::new()
        .method(Method::GET)
        .target("/users?x=1")
        .build()
        .unwrap();

    assert_eq!(req.request_uri(), "/users?x=1");
    assert_eq!(req.url(), "/users?x=1");

    req.scheme = Some("http".to_string());
    req.authority = Some("upstream.local".to_string());
    assert_eq!(req.url(), "http://upstream.local/users?x=1");
}

#[test]
fn test_request_uri_empty_path_is_root() {
    let req = RequestBuilder::new()
        .method(Method::GET)
        .path("")
        .query("a=1")
        .build()
        .unwrap();

    assert_eq!(req.request_uri(), "/?a=1");
}

#[test]
fn test_request_builder_requires_method() {
    assert!(RequestBuilder::new().path("/").build().is_err());
}
