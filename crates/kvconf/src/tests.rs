use crate::{server::Server, stores::filesystem::FileSystemStore};
use kvconf_core::{
    auth::Authenticator,
    cors::CorsPolicy,
    store::{memory::MemoryStore, Store},
};
use kvconf_shim::{ConfigShim, Fetch, FetchRequest, ReqwestFetch, ShimConfig};
use reqwest::{header, StatusCode};
use serde_json::Value;
use std::{net::SocketAddr, sync::Arc};
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use url::Url;

struct TestServer {
    addr: SocketAddr,
    token: CancellationToken,
    client: reqwest::Client,
}

impl TestServer {
    async fn start(store: Box<dyn Store>, api_token: Option<&str>, cors: CorsPolicy) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let token = CancellationToken::new();
        let server = Server::new(
            Some(store),
            api_token.map(|t| Authenticator::new(t).unwrap()),
            cors,
            token.clone(),
        );
        tokio::spawn(server.serve(listener));

        Self {
            addr,
            token,
            client: reqwest::Client::new(),
        }
    }

    async fn memory(api_token: Option<&str>) -> Self {
        Self::start(Box::new(MemoryStore::new()), api_token, CorsPolicy::default()).await
    }

    fn url(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }

    async fn save(&self, body: &'static str, token: Option<&str>) -> reqwest::Response {
        let mut request = self
            .client
            .post(self.url("/api/config"))
            .header(header::CONTENT_TYPE, "application/x-yaml")
            .body(body);
        if let Some(token) = token {
            request = request.header("x-api-token", token);
        }
        request.send().await.unwrap()
    }

    async fn meta(&self) -> Value {
        self.client
            .get(self.url("/api/config/meta"))
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap()
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        self.token.cancel();
    }
}

#[tokio::test]
async fn test_save_then_read_with_token() {
    let server = TestServer::memory(Some("secret")).await;

    let response = server.save("foo: bar", Some("secret")).await;
    assert_eq!(response.status(), StatusCode::OK);
    let saved: Value = response.json().await.unwrap();
    assert_eq!(saved["success"], true);
    assert_eq!(saved["metadata"]["size"], 8);
    assert!(saved["metadata"]["lastModified"].is_string());

    let response = server
        .client
        .get(server.url("/api/config"))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response.headers()[header::CONTENT_TYPE],
        "application/x-yaml"
    );
    assert_eq!(response.text().await.unwrap(), "foo: bar");
}

#[tokio::test]
async fn test_reset_then_meta_reports_missing() {
    let server = TestServer::memory(None).await;
    server.save("foo: bar", None).await;

    let response = server
        .client
        .post(server.url("/api/config/reset"))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let meta = server.meta().await;
    assert_eq!(meta["exists"], false);

    let response = server
        .client
        .get(server.url("/api/config"))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["error"], "Config not found");
}

#[tokio::test]
async fn test_unauthorized_writes_do_not_mutate() {
    let server = TestServer::memory(Some("secret")).await;
    server.save("foo: bar", Some("secret")).await;

    for token in [None, Some("wrong")] {
        let response = server.save("evil: 1", token).await;
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        let body: Value = response.json().await.unwrap();
        assert_eq!(body["error"], "Unauthorized");

        let mut reset = server.client.post(server.url("/api/config/reset"));
        if let Some(token) = token {
            reset = reset.bearer_auth(token);
        }
        assert_eq!(
            reset.send().await.unwrap().status(),
            StatusCode::UNAUTHORIZED
        );
    }

    let meta = server.meta().await;
    assert_eq!(meta["exists"], true);
    assert_eq!(meta["metadata"]["size"], 8);

    let response = server
        .client
        .post(server.url("/api/config/reset"))
        .bearer_auth("secret")
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_no_token_configured_accepts_any_token() {
    let server = TestServer::memory(None).await;
    assert_eq!(server.save("a: 1", None).await.status(), StatusCode::OK);
    assert_eq!(
        server.save("a: 2", Some("whatever")).await.status(),
        StatusCode::OK
    );
}

#[tokio::test]
async fn test_blank_save_is_rejected_without_mutation() {
    let server = TestServer::memory(None).await;

    let response = server.save("  \n\t", None).await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["error"], "Invalid config data");

    assert_eq!(server.meta().await["exists"], false);
}

#[tokio::test]
async fn test_json_payload_shapes() {
    let server = TestServer::memory(None).await;

    let response = server
        .client
        .post(server.url("/api/config"))
        .json(&serde_json::json!({ "config": "a: 1" }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = server
        .client
        .get(server.url("/api/config"))
        .send()
        .await
        .unwrap()
        .text()
        .await
        .unwrap();
    assert_eq!(body, "a: 1");

    let response = server
        .client
        .post(server.url("/api/config"))
        .header(header::CONTENT_TYPE, "application/json")
        .body("{broken")
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_cors_headers_on_every_response() {
    let cors = CorsPolicy::new(["https://dash.example", "http://localhost:4000"]).unwrap();
    let server = TestServer::start(Box::new(MemoryStore::new()), Some("secret"), cors).await;

    let preflight = server
        .client
        .request(reqwest::Method::OPTIONS, server.url("/api/config"))
        .header(header::ORIGIN, "http://localhost:4000")
        .send()
        .await
        .unwrap();
    assert_eq!(preflight.status(), StatusCode::OK);
    assert_eq!(
        preflight.headers()[header::ACCESS_CONTROL_ALLOW_ORIGIN],
        "http://localhost:4000"
    );
    assert_eq!(preflight.headers()[header::ACCESS_CONTROL_MAX_AGE], "86400");
    assert!(preflight.headers()[header::ACCESS_CONTROL_ALLOW_HEADERS]
        .to_str()
        .unwrap()
        .contains("X-API-Token"));

    let unauthorized = server
        .client
        .post(server.url("/api/config"))
        .header(header::ORIGIN, "https://evil.example")
        .body("a: 1")
        .send()
        .await
        .unwrap();
    assert_eq!(unauthorized.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(
        unauthorized.headers()[header::ACCESS_CONTROL_ALLOW_ORIGIN],
        "https://dash.example"
    );

    let missing = server
        .client
        .get(server.url("/api/nope"))
        .send()
        .await
        .unwrap();
    assert_eq!(missing.status(), StatusCode::NOT_FOUND);
    assert_eq!(
        missing.headers()[header::ACCESS_CONTROL_ALLOW_ORIGIN],
        "https://dash.example"
    );
}

#[tokio::test]
async fn test_unmatched_routes_list_endpoints() {
    let server = TestServer::memory(None).await;

    for response in [
        server.client.get(server.url("/")).send().await.unwrap(),
        server
            .client
            .delete(server.url("/api/config"))
            .send()
            .await
            .unwrap(),
        server
            .client
            .get(server.url("/api/config/reset"))
            .send()
            .await
            .unwrap(),
    ] {
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        let body: Value = response.json().await.unwrap();
        assert_eq!(body["error"], "Not Found");
        assert_eq!(body["availableEndpoints"].as_array().unwrap().len(), 5);
    }

    for path in ["/api/health", "/api/config", "/api/config/meta", "/api/config/reset"] {
        let response = server.client.head(server.url(path)).send().await.unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND, "HEAD {}", path);
        assert!(response
            .headers()
            .contains_key(header::ACCESS_CONTROL_ALLOW_ORIGIN));
    }
}

#[tokio::test]
async fn test_health() {
    let server = TestServer::memory(None).await;
    let body: Value = server
        .client
        .get(server.url("/api/health"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(body["status"], "ok");
    assert_eq!(body["storeAvailable"], true);
    assert!(body["timestamp"].is_string());
}

#[tokio::test]
async fn test_filesystem_store_survives_restart() {
    let dir = tempfile::tempdir().unwrap();

    let server = TestServer::start(
        Box::new(FileSystemStore::new(dir.path().to_path_buf()).unwrap()),
        None,
        CorsPolicy::default(),
    )
    .await;
    server.save("persisted: true", None).await;
    drop(server);

    let server = TestServer::start(
        Box::new(FileSystemStore::new(dir.path().to_path_buf()).unwrap()),
        None,
        CorsPolicy::default(),
    )
    .await;
    let meta = server.meta().await;
    assert_eq!(meta["exists"], true);
    assert_eq!(meta["metadata"]["size"], 15);
}

#[tokio::test]
async fn test_meta_without_sidecar_still_reports_existing_config() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("dashy-config-yml"), "legacy: true").unwrap();

    let server = TestServer::start(
        Box::new(FileSystemStore::new(dir.path().to_path_buf()).unwrap()),
        None,
        CorsPolicy::default(),
    )
    .await;
    let meta = server.meta().await;
    assert_eq!(meta["exists"], true);
    assert!(meta.get("metadata").is_none());
}

#[tokio::test]
async fn test_shim_round_trip_against_server() {
    let server = TestServer::memory(Some("secret")).await;
    let base = Url::parse(&server.url("/")).unwrap();

    let mut config = ShimConfig::new(base.clone());
    config.api_token = Some("secret".to_string());
    let shim = ConfigShim::new(config, Arc::new(ReqwestFetch::new(Some(base))));

    let saved = shim.save_config("pageInfo:\n  title: Mine\n").await.unwrap();
    assert_eq!(saved.metadata.size, 24);

    shim.clear_cache().await;
    let client = shim.fetch_client();
    let response = client.fetch(FetchRequest::get("/conf.yml")).await.unwrap();
    assert_eq!(response.text().unwrap(), "pageInfo:\n  title: Mine\n");

    let meta = shim.get_meta().await.unwrap();
    assert!(meta.exists);

    shim.reset_config().await.unwrap();
    assert_eq!(server.meta().await["exists"], false);

    // Unrelated requests reach the server untouched.
    let response = client
        .fetch(FetchRequest::get("/api/health"))
        .await
        .unwrap();
    assert_eq!(response.status, StatusCode::OK);
}
