use std::sync::Arc;

use async_trait::async_trait;
use prefix_proxy::config::MountConfig;
use prefix_proxy::error::ProxyError;
use prefix_proxy::http::request::{Method, Request, RequestBuilder};
use prefix_proxy::http::response::{Response, StatusCode};
use prefix_proxy::proxy::{ForwardingEngine, ProxyHandler};
use prefix_proxy::server::Router;

/// Echoes the rewritten URL back as the body.
struct EchoEngine;

#[async_trait]
impl ForwardingEngine for EchoEngine {
    async fn forward(&self, request: Request) -> Response {
        Response::ok(request.url())
    }
}

fn mount(target: &str, path_base: &str) -> ProxyHandler {
    ProxyHandler::with_engine(&MountConfig::new(target, path_base), Arc::new(EchoEngine)).unwrap()
}

fn get(target: &str) -> Request {
    RequestBuilder::new()
        .method(Method::GET)
        .target(target)
        .build()
        .unwrap()
}

#[tokio::test]
async fn test_longest_path_base_wins() {
    let mut router = Router::new();
    router.mount(mount("http://general.local", "/api"));
    router.mount(mount("http://users.local/v2", "/api/users"));
    router.mount(mount("http://fallback.local", ""));

    let response = router.dispatch(get("/api/users/7")).await;
    assert_eq!(response.body, b"http://users.local/v2/7".to_vec());

    let response = router.dispatch(get("/api/orders")).await;
    assert_eq!(response.body, b"http://general.local/orders".to_vec());

    let response = router.dispatch(get("/elsewhere")).await;
    assert_eq!(response.body, b"http://fallback.local/elsewhere".to_vec());
}

#[tokio::test]
async fn test_unmatched_path_is_not_found() {
    let mut router = Router::new();
    router.mount(mount("http://general.local", "/api"));

    let response = router.dispatch(get("/static/app.js")).await;

    assert_eq!(response.status, StatusCode::NotFound);
    assert!(router.route("/static/app.js").is_none());
}

#[test]
fn test_from_config_builds_every_mount() {
    let router = Router::from_config(&[
        MountConfig::new("http://a.local", "/a"),
        MountConfig::new("http://b.local", "/b"),
    ])
    .unwrap();

    assert_eq!(router.len(), 2);
    assert_eq!(router.route("/b/x").unwrap().config().path_base(), "/b");
}

#[test]
fn test_from_config_rejects_bad_target() {
    let result = Router::from_config(&[
        MountConfig::new("http://a.local", "/a"),
        MountConfig::new("not a url", "/b"),
    ]);

    assert!(matches!(result, Err(ProxyError::Configuration { .. })));
}
