#![allow(clippy::unwrap_used, clippy::expect_used)]

use httpmock::prelude::*;
use serde_json::json;
use tokio_util::sync::CancellationToken;
use utilities_http::{DiagnosticKind, FetchEngine};
use utilities_resources::Provider;

fn provider() -> Provider {
    Provider::new("test", FetchEngine::default())
}

#[tokio::test]
async fn http_create_stores_flat_state() {
    let server = MockServer::start();
    let mock = server.mock(|when, then| {
        when.method(POST).path("/echo").body("ping");
        then.status(201)
            .header("content-type", "text/plain")
            .body("pong");
    });

    let http = provider().resource("utilities_http").unwrap();
    let url = server.url("/echo");
    let applied = http
        .create(
            json!({
                "url": url,
                "method": "POST",
                "request_body": "ping",
                "keepers": {"rev": "1"},
            }),
            &CancellationToken::new(),
        )
        .await
        .unwrap();

    mock.assert();
    let state = applied.state;
    assert_eq!(state["id"], url.as_str());
    assert_eq!(state["status_code"], 201);
    assert_eq!(state["response_body"], "pong");
    assert_eq!(state["body"], "pong");
    assert_eq!(state["response_headers"]["Content-Type"], "text/plain");
    assert_eq!(state["keepers"]["rev"], "1");
    assert!(applied.diagnostics.is_empty());
}

#[tokio::test]
async fn http_update_fetches_again_with_new_config() {
    let server = MockServer::start();
    let first = server.mock(|when, then| {
        when.method(GET).path("/v1");
        then.status(200).body("one");
    });
    let second = server.mock(|when, then| {
        when.method(GET).path("/v2");
        then.status(200).body("two");
    });

    let http = provider().resource("utilities_http").unwrap();
    let cancel = CancellationToken::new();
    let created = http
        .create(json!({"url": server.url("/v1")}), &cancel)
        .await
        .unwrap();
    let updated = http
        .update(json!({"url": server.url("/v2")}), created.state, &cancel)
        .await
        .unwrap();

    assert_eq!(first.calls(), 1);
    assert_eq!(second.calls(), 1);
    assert_eq!(updated.state["response_body"], "two");
    assert_eq!(updated.state["id"], server.url("/v2").as_str());

    let read = http.read(updated.state.clone()).await.unwrap();
    assert_eq!(read.state, updated.state);
    assert_eq!(second.calls(), 1);
}

#[tokio::test]
async fn http_failure_yields_error_diagnostics_only() {
    let server = MockServer::start();
    let mock = server.mock(|when, then| {
        when.method(GET).path("/busy");
        then.status(503);
    });

    let http = provider().resource("utilities_http").unwrap();
    let diags = http
        .create(
            json!({
                "url": server.url("/busy"),
                "retry": {"attempts": 1, "min_delay_ms": 1, "max_delay_ms": 5},
            }),
            &CancellationToken::new(),
        )
        .await
        .unwrap_err();

    assert_eq!(mock.calls(), 2);
    let diag = diags.find(DiagnosticKind::RequestError).unwrap();
    assert!(diag.detail.contains("giving up after 2 attempt(s)"));
}

#[tokio::test]
async fn http_rejects_unknown_method_as_build_error() {
    let http = provider().resource("utilities_http").unwrap();
    let diags = http
        .create(
            json!({"url": "http://127.0.0.1:9/", "method": "PUT"}),
            &CancellationToken::new(),
        )
        .await
        .unwrap_err();
    assert!(diags.find(DiagnosticKind::RequestBuildError).is_some());
}

#[tokio::test]
async fn http_binary_body_is_a_warning() {
    let server = MockServer::start();
    server.mock(|when, then| {
        when.method(GET).path("/bin");
        then.status(200).body(vec![0xff_u8, 0xfe, 0x00]);
    });

    let http = provider().resource("utilities_http").unwrap();
    let applied = http
        .create(json!({"url": server.url("/bin")}), &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(applied.state["response_body_base64"], "//4A");
    assert!(!applied.diagnostics.has_error());
    assert!(
        applied
            .diagnostics
            .find(DiagnosticKind::ResponseEncodingWarning)
            .is_some()
    );
}

#[tokio::test]
async fn file_create_downloads_any_status() {
    let server = MockServer::start();
    let mock = server.mock(|when, then| {
        when.method(GET).path("/missing");
        then.status(404).body("not here");
    });

    let file = provider().resource("utilities_file").unwrap();
    let applied = file
        .create(
            json!({"url": server.url("/missing")}),
            &CancellationToken::new(),
        )
        .await
        .unwrap();

    assert_eq!(mock.calls(), 1);
    assert_eq!(applied.state["content"], "not here");
    assert_eq!(applied.state["url"], server.url("/missing").as_str());
    assert_eq!(applied.state["id"].as_str().unwrap().len(), 36);
}

#[tokio::test]
async fn nanoid_lifecycle() {
    let nanoid = provider().resource("utilities_nanoid").unwrap();
    let cancel = CancellationToken::new();

    let created = nanoid
        .create(json!({"alphabet": "0123456789", "length": 12}), &cancel)
        .await
        .unwrap();
    let id = created.state["id"].as_str().unwrap().to_owned();
    assert_eq!(id.len(), 12);
    assert!(id.chars().all(|c| c.is_ascii_digit()));

    let updated = nanoid
        .update(json!({"length": 30}), created.state.clone(), &cancel)
        .await
        .unwrap();
    assert_eq!(updated.state, created.state);

    let diags = nanoid
        .create(json!({"alphabet": ""}), &cancel)
        .await
        .unwrap_err();
    let diag = diags.find(DiagnosticKind::InvalidConfiguration).unwrap();
    assert_eq!(diag.summary, "Invalid Attribute Value Length");
}

#[tokio::test]
async fn import_support_per_resource() {
    let provider = provider();

    for name in ["utilities_file", "utilities_http"] {
        let diags = provider.resource(name).unwrap().import("id").await.unwrap_err();
        let diag = diags.find(DiagnosticKind::ImportError).unwrap();
        assert_eq!(diag.summary, "Not Implemented.");
    }

    let imported = provider
        .resource("utilities_nanoid")
        .unwrap()
        .import("abc")
        .await
        .unwrap();
    assert_eq!(imported.state["length"], 3);
}
