use syncserver_cloud::config::CloudConfig;
use syncserver_cloud::dropbox::{Dropbox, dropbox_path};
use syncserver_cloud::error::CloudError;
use syncserver_cloud::storage::CloudStorage;
use syncserver_cloud::types::*;
use wiremock::matchers::{body_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const NAME: &str = "file-1.device-1.0";

fn setup(server: &MockServer) -> Dropbox {
    Dropbox::new(&CloudConfig::with_base_url(&server.uri())).unwrap()
}

fn creds() -> CloudCredentials {
    CloudCredentials::new("dropbox-token")
}

fn options() -> CloudFileOptions {
    CloudFileOptions::new(Some("Sync".into()), "text/plain")
}

fn not_found_body(tag: &str) -> serde_json::Value {
    serde_json::json!({
        "error_summary": format!("{tag}/not_found/.."),
        "error": { ".tag": tag, tag: { ".tag": "not_found" } }
    })
}

async fn mount_metadata(server: &MockServer, template: ResponseTemplate) {
    Mock::given(method("POST"))
        .and(path("/2/files/get_metadata"))
        .and(body_json(serde_json::json!({ "path": "/Sync/file-1.device-1.0" })))
        .respond_with(template)
        .mount(server)
        .await;
}

// ── Paths ────────────────────────────────────────────────────────

#[test]
fn path_includes_folder() {
    assert_eq!(dropbox_path("a", &options()), "/Sync/a");
    assert_eq!(dropbox_path("a", &CloudFileOptions::new(None, "x")), "/a");
}

// ── Upload ───────────────────────────────────────────────────────

#[tokio::test]
async fn upload_returns_content_hash() {
    let server = MockServer::start().await;
    mount_metadata(&server, ResponseTemplate::new(409).set_body_json(not_found_body("path"))).await;
    Mock::given(method("POST"))
        .and(path("/2/files/upload"))
        .and(header("content-type", "application/octet-stream"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "name": NAME,
            "content_hash": "dropbox-hash"
        })))
        .expect(1)
        .mount(&server)
        .await;

    let dropbox = setup(&server);
    let outcome = dropbox
        .upload_file(&creds(), NAME, b"hello".to_vec(), &options())
        .await
        .unwrap();
    assert_eq!(outcome, UploadOutcome::Uploaded { checksum: "dropbox-hash".into() });
}

#[tokio::test]
async fn upload_skips_existing_file() {
    let server = MockServer::start().await;
    mount_metadata(
        &server,
        ResponseTemplate::new(200)
            .set_body_json(serde_json::json!({ "name": NAME, "content_hash": "h" })),
    )
    .await;
    Mock::given(method("POST"))
        .and(path("/2/files/upload"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;

    let dropbox = setup(&server);
    let outcome = dropbox
        .upload_file(&creds(), NAME, b"hello".to_vec(), &options())
        .await
        .unwrap();
    assert_eq!(outcome, UploadOutcome::AlreadyUploaded);
}

#[tokio::test]
async fn revoked_token_is_distinguished() {
    let server = MockServer::start().await;
    mount_metadata(
        &server,
        ResponseTemplate::new(401).set_body_json(serde_json::json!({
            "error_summary": "invalid_access_token/",
            "error": { ".tag": "invalid_access_token" }
        })),
    )
    .await;

    let dropbox = setup(&server);
    let err = dropbox
        .upload_file(&creds(), NAME, b"hello".to_vec(), &options())
        .await
        .unwrap_err();
    assert!(matches!(err, CloudError::AccessTokenRevokedOrExpired));
}

// ── Download ─────────────────────────────────────────────────────

#[tokio::test]
async fn download_reads_hash_from_result_header() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/2/files/download"))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("Dropbox-API-Result", r#"{"name":"x","content_hash":"header-hash"}"#)
                .set_body_bytes(b"contents".to_vec()),
        )
        .mount(&server)
        .await;

    let dropbox = setup(&server);
    let file = dropbox.download_file(&creds(), NAME, &options()).await.unwrap();
    assert_eq!(file.data, b"contents");
    assert_eq!(file.checksum, "header-hash");
}

#[tokio::test]
async fn download_of_missing_path_is_not_found() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/2/files/download"))
        .respond_with(ResponseTemplate::new(409).set_body_json(not_found_body("path")))
        .mount(&server)
        .await;

    let dropbox = setup(&server);
    let err = dropbox.download_file(&creds(), NAME, &options()).await.unwrap_err();
    assert!(err.is_not_found());
}

// ── Delete / lookup ──────────────────────────────────────────────

#[tokio::test]
async fn delete_of_missing_path_is_not_found() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/2/files/delete_v2"))
        .respond_with(ResponseTemplate::new(409).set_body_json(not_found_body("path_lookup")))
        .mount(&server)
        .await;

    let dropbox = setup(&server);
    let err = dropbox.delete_file(&creds(), NAME, &options()).await.unwrap_err();
    assert!(err.is_not_found());
}

#[tokio::test]
async fn other_conflicts_are_failures() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/2/files/delete_v2"))
        .respond_with(ResponseTemplate::new(409).set_body_json(serde_json::json!({
            "error_summary": "too_many_write_operations/",
            "error": { ".tag": "too_many_write_operations" }
        })))
        .mount(&server)
        .await;

    let dropbox = setup(&server);
    let err = dropbox.delete_file(&creds(), NAME, &options()).await.unwrap_err();
    assert!(matches!(err, CloudError::Failure(_)));
}

#[tokio::test]
async fn lookup_missing_is_false() {
    let server = MockServer::start().await;
    mount_metadata(&server, ResponseTemplate::new(409).set_body_json(not_found_body("path"))).await;

    let dropbox = setup(&server);
    assert!(!dropbox.lookup_file(&creds(), NAME, &options()).await.unwrap());
}
