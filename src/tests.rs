//! Integration tests for the Sangh web server.

use std::path::Path;
use std::time::Duration;

use reqwest::Client;
use serde_json::Value;
use tempfile::TempDir;

use crate::config::Config;
use crate::imaging::test_images::{gradient, noisy, png_bytes};
use crate::imaging::{decode, encode_data_url, MAX_DIMENSION};
use crate::{bind_with_retry, create_router, AppState};

const INDEX_HTML: &str = "<!doctype html><html><body><div id=\"root\"></div></body></html>";

/// Test fixture for integration tests.
struct TestFixture {
    client: Client,
    base_url: String,
    _temp_dir: TempDir,
}

impl TestFixture {
    async fn new() -> Self {
        Self::with_options(true, 10 * 1024 * 1024).await
    }

    async fn with_options(with_build: bool, max_upload_bytes: usize) -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let build_dir = temp_dir.path().join("build");
        std::fs::create_dir_all(&build_dir).expect("Failed to create build dir");
        if with_build {
            write_build(&build_dir);
        }

        let config = Config {
            build_dir,
            max_upload_bytes,
            log_level: "warn".to_string(),
            ..Config::default()
        };

        let app = create_router(AppState::new(config));

        // Bind to random port
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("Failed to bind");
        let addr = listener.local_addr().expect("Failed to get addr");
        let base_url = format!("http://{}", addr);

        // Spawn server
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        // Wait for server to start
        tokio::time::sleep(Duration::from_millis(100)).await;

        TestFixture {
            client: Client::new(),
            base_url,
            _temp_dir: temp_dir,
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    async fn get(&self, path: &str) -> reqwest::Response {
        self.client.get(self.url(path)).send().await.unwrap()
    }
}

fn write_build(dir: &Path) {
    let files: &[(&str, &[u8])] = &[
        ("index.html", INDEX_HTML.as_bytes()),
        ("static/js/main.4f1c.js", b"console.log('app');"),
        ("static/css/main.9a2b.css", b"body{margin:0}"),
        ("favicon.ico", b"\x00\x00\x01\x00"),
        ("favicon.webp", b"RIFF0000WEBP"),
        ("manifest.json", br#"{"short_name":"Sangh"}"#),
        ("robots.txt", b"User-agent: *\nAllow: /\n"),
        ("logo192.png", b"\x89PNG\r\n\x1a\n"),
        ("share-images/default-share.jpg", b"\xff\xd8\xff\xe0"),
        ("share-images/private.jpg", b"\xff\xd8\xff\xe1"),
        ("secret.jpg", b"\xff\xd8\xff\xe0"),
    ];
    for (name, contents) in files {
        let path = dir.join(name);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(path, contents).unwrap();
    }
}

fn header<'a>(resp: &'a reqwest::Response, name: &str) -> &'a str {
    resp.headers()
        .get(name)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default()
}

#[tokio::test]
async fn test_health_check() {
    let fixture = TestFixture::new().await;

    let first: Value = fixture.get("/health").await.json().await.unwrap();
    tokio::time::sleep(Duration::from_millis(20)).await;
    let resp = fixture.get("/health").await;
    assert_eq!(resp.status(), 200);
    let second: Value = resp.json().await.unwrap();

    assert_eq!(second["status"], "OK");
    assert!(second["timestamp"].as_str().unwrap().contains('T'));
    assert_eq!(second["environment"], "development");
    let (up1, up2) = (
        first["uptime"].as_f64().unwrap(),
        second["uptime"].as_f64().unwrap(),
    );
    assert!(up2 >= up1);
}

#[tokio::test]
async fn test_named_assets() {
    let fixture = TestFixture::new().await;

    let cases = [
        ("/favicon.ico", "image/x-icon"),
        ("/favicon.webp", "image/webp"),
        ("/manifest.json", "application/json"),
        ("/logo192.png", "image/png"),
        ("/robots.txt", "text/plain; charset=utf-8"),
    ];
    for (path, content_type) in cases {
        let resp = fixture.get(path).await;
        assert_eq!(resp.status(), 200, "{}", path);
        assert_eq!(header(&resp, "content-type"), content_type, "{}", path);
        assert!(header(&resp, "cache-control").starts_with("public"), "{}", path);
    }

    let robots = fixture.get("/robots.txt").await.text().await.unwrap();
    assert!(robots.contains("User-agent"));
}

#[tokio::test]
async fn test_missing_named_asset_is_not_found() {
    let fixture = TestFixture::new().await;

    let resp = fixture.get("/logo512.png").await;
    assert_eq!(resp.status(), 404);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["success"], false);
    assert_eq!(body["error"]["code"], "NOT_FOUND");
}

#[tokio::test]
async fn test_share_images_allow_list() {
    let fixture = TestFixture::new().await;

    let resp = fixture.get("/share-images/default-share.jpg").await;
    assert_eq!(resp.status(), 200);
    assert_eq!(header(&resp, "content-type"), "image/jpeg");

    // exists on disk but is not allow-listed
    let resp = fixture.get("/share-images/secret.jpg").await;
    assert_eq!(resp.status(), 404);

    // allow-listed but not deployed
    let resp = fixture.get("/share-images/news-share.jpg").await;
    assert_eq!(resp.status(), 404);

    let resp = fixture.get("/share-images/..%2Fsecret.jpg").await;
    assert_eq!(resp.status(), 404);
}

#[tokio::test]
async fn test_share_image_allow_list_holds_for_unrouted_paths() {
    let fixture = TestFixture::new().await;

    for path in [
        "/share-images/private.jpg",
        "/share-images//private.jpg",
        "/share-images/private.jpg/",
        "/share-images/",
    ] {
        let resp = fixture.get(path).await;
        assert_eq!(resp.status(), 404, "{}", path);
        let body: Value = resp.json().await.unwrap();
        assert_eq!(body["error"]["code"], "NOT_FOUND", "{}", path);
    }

    let resp = fixture.get("/share-images//default-share.jpg").await;
    assert_eq!(resp.status(), 200);
    assert_eq!(header(&resp, "content-type"), "image/jpeg");
}

#[tokio::test]
async fn test_spa_fallback_serves_index() {
    let fixture = TestFixture::new().await;

    for path in ["/", "/directory", "/listings/42/edit", "/api/unknown"] {
        let resp = fixture.get(path).await;
        assert_eq!(resp.status(), 200, "{}", path);
        assert_eq!(header(&resp, "content-type"), "text/html; charset=utf-8");
        assert!(header(&resp, "cache-control").starts_with("no-cache"));
        assert_eq!(resp.text().await.unwrap(), INDEX_HTML);
    }
}

#[tokio::test]
async fn test_build_files_get_extension_headers() {
    let fixture = TestFixture::new().await;

    let resp = fixture.get("/static/js/main.4f1c.js").await;
    assert_eq!(resp.status(), 200);
    assert_eq!(
        header(&resp, "content-type"),
        "application/javascript; charset=utf-8"
    );
    assert_eq!(
        header(&resp, "cache-control"),
        "public, max-age=31536000, immutable"
    );
    assert_eq!(resp.text().await.unwrap(), "console.log('app');");

    let resp = fixture.get("/static/css/main.9a2b.css").await;
    assert_eq!(header(&resp, "content-type"), "text/css; charset=utf-8");
}

#[tokio::test]
async fn test_fallback_ignores_non_get() {
    let fixture = TestFixture::new().await;

    let resp = fixture
        .client
        .post(fixture.url("/directory"))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 404);
}

#[tokio::test]
async fn test_fallback_without_build() {
    let fixture = TestFixture::with_options(false, 1024).await;

    let resp = fixture.get("/directory").await;
    assert_eq!(resp.status(), 404);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["error"]["code"], "NOT_FOUND");
}

#[tokio::test]
async fn test_compress_with_square_crop() {
    let fixture = TestFixture::new().await;
    let png = png_bytes(&gradient(1000, 600));

    let resp = fixture
        .client
        .post(fixture.url("/api/images/compress?aspect=1"))
        .header("content-type", "image/png")
        .body(png)
        .send()
        .await
        .unwrap();

    assert_eq!(resp.status(), 200);
    assert_eq!(header(&resp, "content-type"), "image/jpeg");
    assert_eq!(header(&resp, "x-image-width"), "600");
    assert_eq!(header(&resp, "x-image-height"), "600");
    assert_eq!(header(&resp, "x-image-quality"), "0.95");

    let bytes = resp.bytes().await.unwrap();
    let img = decode(&bytes).unwrap();
    assert_eq!((img.width(), img.height()), (600, 600));
}

#[tokio::test]
async fn test_compress_respects_budget() {
    let fixture = TestFixture::new().await;
    let budget = 60_000;
    let png = png_bytes(&noisy(1400, 1000));

    let resp = fixture
        .client
        .post(fixture.url(&format!("/api/images/compress?maxBytes={}", budget)))
        .header("content-type", "image/png")
        .body(png)
        .send()
        .await
        .unwrap();

    assert_eq!(resp.status(), 200);
    let within_budget = header(&resp, "x-image-within-budget") == "true";
    let quality = header(&resp, "x-image-quality").to_string();
    let bytes = resp.bytes().await.unwrap();

    assert!(within_budget || quality == "0.10");
    assert_eq!(within_budget, bytes.len() <= budget);

    let img = decode(&bytes).unwrap();
    assert!(img.width() <= MAX_DIMENSION && img.height() <= MAX_DIMENSION);
}

#[tokio::test]
async fn test_compress_data_url_round_trip() {
    let fixture = TestFixture::new().await;
    let data_url = encode_data_url("image/png", &png_bytes(&gradient(320, 240)));

    let resp = fixture
        .client
        .post(fixture.url(
            "/api/images/compress?format=dataUrl&x=10&y=20&width=100&height=50",
        ))
        .header("content-type", "text/plain")
        .body(data_url)
        .send()
        .await
        .unwrap();

    assert_eq!(resp.status(), 200);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["success"], true);
    assert_eq!(body["data"]["width"], 100);
    assert_eq!(body["data"]["height"], 50);
    assert_eq!(body["data"]["withinBudget"], true);
    assert!(body["data"]["dataUrl"]
        .as_str()
        .unwrap()
        .starts_with("data:image/jpeg;base64,"));
}

#[tokio::test]
async fn test_compress_rejects_non_image() {
    let fixture = TestFixture::new().await;

    let resp = fixture
        .client
        .post(fixture.url("/api/images/compress"))
        .header("content-type", "application/pdf")
        .body("%PDF-1.4")
        .send()
        .await
        .unwrap();

    assert_eq!(resp.status(), 415);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["error"]["code"], "UNSUPPORTED_MEDIA_TYPE");
}

#[tokio::test]
async fn test_compress_bad_query_uses_error_envelope() {
    let fixture = TestFixture::new().await;

    let resp = fixture
        .client
        .post(fixture.url("/api/images/compress?maxBytes=abc"))
        .header("content-type", "image/png")
        .body(png_bytes(&gradient(20, 20)))
        .send()
        .await
        .unwrap();

    assert_eq!(resp.status(), 400);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["success"], false);
    assert_eq!(body["error"]["code"], "BAD_REQUEST");
}

#[tokio::test]
async fn test_compress_rejects_partial_crop() {
    let fixture = TestFixture::new().await;

    let resp = fixture
        .client
        .post(fixture.url("/api/images/compress?x=5&width=10"))
        .header("content-type", "image/png")
        .body(png_bytes(&gradient(20, 20)))
        .send()
        .await
        .unwrap();

    assert_eq!(resp.status(), 400);
}

#[tokio::test]
async fn test_compress_upload_too_large() {
    let fixture = TestFixture::with_options(true, 2048).await;

    let resp = fixture
        .client
        .post(fixture.url("/api/images/compress"))
        .header("content-type", "image/png")
        .body(vec![0u8; 4096])
        .send()
        .await
        .unwrap();

    assert_eq!(resp.status(), 413);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["error"]["code"], "PAYLOAD_TOO_LARGE");
}

#[tokio::test]
async fn test_bind_retry_gives_up_while_port_busy() {
    let holder = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = holder.local_addr().unwrap();

    let err = bind_with_retry(addr, 1, Duration::from_millis(20))
        .await
        .unwrap_err();
    assert_eq!(err.kind(), std::io::ErrorKind::AddrInUse);
}

#[tokio::test]
async fn test_bind_retry_succeeds_once_port_frees() {
    let holder = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = holder.local_addr().unwrap();

    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(100)).await;
        drop(holder);
    });

    let listener = bind_with_retry(addr, 20, Duration::from_millis(50))
        .await
        .unwrap();
    assert_eq!(listener.local_addr().unwrap(), addr);
}
