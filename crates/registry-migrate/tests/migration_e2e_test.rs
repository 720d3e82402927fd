//! End-to-end migration tests against mock source and destination registries.

use base64::Engine;
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use registry_migrate::{Config, EndpointConfig, MigrateError, MigrationConfig, Orchestrator};
use serde_json::{json, Value};
use std::io::Read;
use std::path::Path;
use tokio_util::sync::CancellationToken;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const REPO_URL: &str = "https://git.internal.example.com/acme/left-pad.git";

fn test_config(source_uri: &str, target_uri: &str) -> Config {
    Config {
        source: EndpointConfig {
            url: source_uri.to_string(),
            prefix: None,
            token: Some("src-token".to_string()),
            username: None,
            password: None,
            timeout_ms: 3000,
        },
        target: EndpointConfig {
            url: target_uri.to_string(),
            prefix: None,
            token: Some("dest-token".to_string()),
            username: None,
            password: None,
            timeout_ms: 3000,
        },
        migration: MigrationConfig {
            repository_url: Some(REPO_URL.to_string()),
            workers: Some(2),
            // Keep failure-path tests fast
            max_retries: Some(0),
        },
    }
}

/// Build a gzipped tarball holding a package/ tree with the given manifest.
fn make_tarball(manifest: &Value) -> Vec<u8> {
    let mut data = Vec::new();
    {
        let encoder = GzEncoder::new(&mut data, Compression::default());
        let mut tar = tar::Builder::new(encoder);

        let mut add_file = |name: &str, content: &[u8]| {
            let mut header = tar::Header::new_gnu();
            header.set_size(content.len() as u64);
            header.set_mode(0o644);
            header.set_cksum();
            tar.append_data(&mut header, name, content).unwrap();
        };

        let manifest_bytes = serde_json::to_vec_pretty(manifest).unwrap();
        add_file("package/package.json", &manifest_bytes);
        add_file("package/index.js", b"module.exports = 42;\n");

        tar.into_inner().unwrap().finish().unwrap();
    }
    data
}

/// Read package/package.json back out of a published tarball.
fn read_manifest_from_tarball(bytes: &[u8]) -> Value {
    let mut archive = tar::Archive::new(GzDecoder::new(bytes));
    for entry in archive.entries().unwrap() {
        let mut entry = entry.unwrap();
        if entry.path().unwrap() == Path::new("package/package.json") {
            let mut content = String::new();
            entry.read_to_string(&mut content).unwrap();
            return serde_json::from_str(&content).unwrap();
        }
    }
    panic!("package/package.json not found in published tarball");
}

fn version_record(source_uri: &str, version: &str) -> Value {
    json!({
        "name": "left-pad",
        "version": version,
        "description": "pads left",
        "dist": {
            "tarball": format!("{}/left-pad/-/left-pad-{}.tgz", source_uri, version)
        },
        "_": { "internal": "do-not-forward" }
    })
}

async fn find_publish_body(server: &MockServer) -> Option<Value> {
    server
        .received_requests()
        .await
        .unwrap()
        .iter()
        .find(|r| r.method.to_string() == "PUT")
        .map(|r| serde_json::from_slice(&r.body).unwrap())
}

#[tokio::test]
async fn test_migrates_only_missing_version_and_publishes_patched_artifact() {
    let source = MockServer::start().await;
    let target = MockServer::start().await;

    let source_packument = json!({
        "name": "left-pad",
        "versions": {
            "1.0.0": version_record(&source.uri(), "1.0.0"),
            "1.1.0": version_record(&source.uri(), "1.1.0"),
        }
    });
    let target_packument = json!({
        "name": "left-pad",
        "versions": {
            "1.0.0": version_record(&source.uri(), "1.0.0"),
        }
    });

    let tarball = make_tarball(&json!({
        "name": "left-pad",
        "version": "1.1.0",
        "repository": { "type": "git", "url": "https://old.example.com/left-pad.git" }
    }));

    Mock::given(method("GET"))
        .and(path("/left-pad"))
        .respond_with(ResponseTemplate::new(200).set_body_json(&source_packument))
        .mount(&source)
        .await;

    // Only the missing version's tarball may be fetched
    Mock::given(method("GET"))
        .and(path("/left-pad/-/left-pad-1.1.0.tgz"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(tarball))
        .expect(1)
        .mount(&source)
        .await;
    Mock::given(method("GET"))
        .and(path("/left-pad/-/left-pad-1.0.0.tgz"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&source)
        .await;

    Mock::given(method("GET"))
        .and(path("/left-pad"))
        .respond_with(ResponseTemplate::new(200).set_body_json(&target_packument))
        .mount(&target)
        .await;
    Mock::given(method("PUT"))
        .and(path("/left-pad"))
        .respond_with(ResponseTemplate::new(201))
        .expect(1)
        .mount(&target)
        .await;

    let orchestrator = Orchestrator::new(test_config(&source.uri(), &target.uri())).unwrap();
    let modules = vec!["left-pad".to_string()];
    let result = orchestrator
        .run(&modules, CancellationToken::new(), false)
        .await
        .unwrap();

    assert_eq!(result.status, "completed");
    assert_eq!(result.versions_considered, 1);
    assert_eq!(result.versions_migrated, 1);
    assert_eq!(result.versions_failed, 0);
    assert_eq!(result.modules[0].migrated, ["1.1.0"]);

    // Inspect the publish request the destination actually received
    let body = find_publish_body(&target).await.expect("no publish request");
    assert_eq!(body["name"], "left-pad");
    assert_eq!(body["access"], "public");
    assert_eq!(body["dist-tags"]["latest"], "1.1.0");

    let published = &body["versions"]["1.1.0"];
    assert_eq!(published["version"], "1.1.0");
    // The private field and the source dist object never cross registries
    assert!(published.get("_").is_none());
    assert!(published.get("dist").is_none());

    // The attached artifact carries the patched manifest
    let attachment = &body["_attachments"]["left-pad-1.1.0.tgz"];
    let bytes = base64::engine::general_purpose::STANDARD
        .decode(attachment["data"].as_str().unwrap())
        .unwrap();
    let manifest = read_manifest_from_tarball(&bytes);
    assert_eq!(manifest["repository"]["url"], REPO_URL);
    assert_eq!(manifest["repository"]["type"], "git");
    assert_eq!(manifest["name"], "left-pad");
}

#[tokio::test]
async fn test_identical_version_sets_perform_no_downloads() {
    let source = MockServer::start().await;
    let target = MockServer::start().await;

    let packument = json!({
        "name": "left-pad",
        "versions": {
            "1.0.0": version_record(&source.uri(), "1.0.0"),
            "1.1.0": version_record(&source.uri(), "1.1.0"),
        }
    });

    Mock::given(method("GET"))
        .and(path("/left-pad"))
        .respond_with(ResponseTemplate::new(200).set_body_json(&packument))
        .mount(&source)
        .await;
    Mock::given(method("GET"))
        .and(path("/left-pad"))
        .respond_with(ResponseTemplate::new(200).set_body_json(&packument))
        .mount(&target)
        .await;

    let orchestrator = Orchestrator::new(test_config(&source.uri(), &target.uri())).unwrap();
    let modules = vec!["left-pad".to_string()];
    let result = orchestrator
        .run(&modules, CancellationToken::new(), false)
        .await
        .unwrap();

    assert_eq!(result.status, "completed");
    assert_eq!(result.versions_considered, 0);
    assert_eq!(result.versions_migrated, 0);

    // Nothing was downloaded or published
    let tarball_requests = source
        .received_requests()
        .await
        .unwrap()
        .iter()
        .filter(|r| r.url.path().contains("/-/"))
        .count();
    assert_eq!(tarball_requests, 0);
    assert!(find_publish_body(&target).await.is_none());
}

#[tokio::test]
async fn test_dry_run_stages_but_never_publishes() {
    let source = MockServer::start().await;
    let target = MockServer::start().await;

    let source_packument = json!({
        "name": "left-pad",
        "versions": { "1.1.0": version_record(&source.uri(), "1.1.0") }
    });
    let target_packument = json!({ "name": "left-pad", "versions": {} });

    let tarball = make_tarball(&json!({ "name": "left-pad", "version": "1.1.0" }));

    Mock::given(method("GET"))
        .and(path("/left-pad"))
        .respond_with(ResponseTemplate::new(200).set_body_json(&source_packument))
        .mount(&source)
        .await;
    Mock::given(method("GET"))
        .and(path("/left-pad/-/left-pad-1.1.0.tgz"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(tarball))
        .expect(1)
        .mount(&source)
        .await;
    Mock::given(method("GET"))
        .and(path("/left-pad"))
        .respond_with(ResponseTemplate::new(200).set_body_json(&target_packument))
        .mount(&target)
        .await;
    Mock::given(method("PUT"))
        .respond_with(ResponseTemplate::new(201))
        .expect(0)
        .mount(&target)
        .await;

    let orchestrator = Orchestrator::new(test_config(&source.uri(), &target.uri())).unwrap();
    let modules = vec!["left-pad".to_string()];
    let result = orchestrator
        .run(&modules, CancellationToken::new(), true)
        .await
        .unwrap();

    assert_eq!(result.status, "completed");
    assert_eq!(result.versions_considered, 1);
    assert_eq!(result.versions_migrated, 0);
    assert_eq!(result.versions_skipped, 1);
    assert_eq!(result.modules[0].skipped, ["1.1.0"]);
}

#[tokio::test]
async fn test_dry_run_without_repository_url_skips_after_staging() {
    let source = MockServer::start().await;
    let target = MockServer::start().await;

    let source_packument = json!({
        "name": "left-pad",
        "versions": { "1.1.0": version_record(&source.uri(), "1.1.0") }
    });

    let tarball = make_tarball(&json!({ "name": "left-pad", "version": "1.1.0" }));

    Mock::given(method("GET"))
        .and(path("/left-pad"))
        .respond_with(ResponseTemplate::new(200).set_body_json(&source_packument))
        .mount(&source)
        .await;
    Mock::given(method("GET"))
        .and(path("/left-pad/-/left-pad-1.1.0.tgz"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(tarball))
        .expect(1)
        .mount(&source)
        .await;
    Mock::given(method("GET"))
        .and(path("/left-pad"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"versions": {}})))
        .mount(&target)
        .await;
    Mock::given(method("PUT"))
        .respond_with(ResponseTemplate::new(201))
        .expect(0)
        .mount(&target)
        .await;

    let mut config = test_config(&source.uri(), &target.uri());
    config.migration.repository_url = None;

    let orchestrator = Orchestrator::new(config).unwrap();
    let modules = vec!["left-pad".to_string()];
    let result = orchestrator
        .run(&modules, CancellationToken::new(), true)
        .await
        .unwrap();

    assert_eq!(result.versions_skipped, 1);
    assert_eq!(result.versions_migrated, 0);
    assert_eq!(result.modules[0].skipped, ["1.1.0"]);
}

#[tokio::test]
async fn test_failed_download_does_not_halt_sibling_versions() {
    let source = MockServer::start().await;
    let target = MockServer::start().await;

    let source_packument = json!({
        "name": "left-pad",
        "versions": {
            "1.1.0": version_record(&source.uri(), "1.1.0"),
            "1.2.0": version_record(&source.uri(), "1.2.0"),
        }
    });
    let target_packument = json!({ "name": "left-pad", "versions": {} });

    let tarball = make_tarball(&json!({ "name": "left-pad", "version": "1.2.0" }));

    Mock::given(method("GET"))
        .and(path("/left-pad"))
        .respond_with(ResponseTemplate::new(200).set_body_json(&source_packument))
        .mount(&source)
        .await;
    // 1.1.0's tarball is broken, 1.2.0 downloads fine
    Mock::given(method("GET"))
        .and(path("/left-pad/-/left-pad-1.1.0.tgz"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&source)
        .await;
    Mock::given(method("GET"))
        .and(path("/left-pad/-/left-pad-1.2.0.tgz"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(tarball))
        .mount(&source)
        .await;
    Mock::given(method("GET"))
        .and(path("/left-pad"))
        .respond_with(ResponseTemplate::new(200).set_body_json(&target_packument))
        .mount(&target)
        .await;
    Mock::given(method("PUT"))
        .and(path("/left-pad"))
        .respond_with(ResponseTemplate::new(201))
        .expect(1)
        .mount(&target)
        .await;

    let orchestrator = Orchestrator::new(test_config(&source.uri(), &target.uri())).unwrap();
    let modules = vec!["left-pad".to_string()];
    let result = orchestrator
        .run(&modules, CancellationToken::new(), false)
        .await
        .unwrap();

    assert_eq!(result.status, "completed_with_failures");
    assert_eq!(result.versions_migrated, 1);
    assert_eq!(result.versions_failed, 1);
    assert_eq!(result.modules[0].migrated, ["1.2.0"]);
    assert_eq!(result.modules[0].failed[0].version, "1.1.0");

    let body = find_publish_body(&target).await.expect("no publish request");
    assert!(body["versions"].get("1.2.0").is_some());
}

#[tokio::test]
async fn test_module_read_failure_does_not_halt_other_modules() {
    let source = MockServer::start().await;
    let target = MockServer::start().await;

    let packument = json!({
        "name": "left-pad",
        "versions": { "1.0.0": version_record(&source.uri(), "1.0.0") }
    });

    // "gone" is unknown to the source registry; "left-pad" is in sync
    Mock::given(method("GET"))
        .and(path("/gone"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&source)
        .await;
    Mock::given(method("GET"))
        .and(path("/left-pad"))
        .respond_with(ResponseTemplate::new(200).set_body_json(&packument))
        .mount(&source)
        .await;
    Mock::given(method("GET"))
        .and(path("/gone"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"versions": {}})))
        .mount(&target)
        .await;
    Mock::given(method("GET"))
        .and(path("/left-pad"))
        .respond_with(ResponseTemplate::new(200).set_body_json(&packument))
        .mount(&target)
        .await;

    let orchestrator = Orchestrator::new(test_config(&source.uri(), &target.uri())).unwrap();
    let modules = vec!["gone".to_string(), "left-pad".to_string()];
    let result = orchestrator
        .run(&modules, CancellationToken::new(), false)
        .await
        .unwrap();

    assert_eq!(result.status, "completed_with_failures");
    assert_eq!(result.modules_failed, 1);
    assert_eq!(result.modules[0].module, "gone");
    assert!(result.modules[0].error.as_ref().unwrap().contains("not found"));
    assert_eq!(result.modules[1].module, "left-pad");
    assert!(!result.modules[1].has_failures());
}

#[tokio::test]
async fn test_all_modules_unreadable_fails_the_run() {
    let source = MockServer::start().await;
    let target = MockServer::start().await;

    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&source)
        .await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&target)
        .await;

    let orchestrator = Orchestrator::new(test_config(&source.uri(), &target.uri())).unwrap();
    let modules = vec!["gone".to_string()];
    let err = orchestrator
        .run(&modules, CancellationToken::new(), false)
        .await
        .unwrap_err();

    // The registry error itself surfaces, so the process exits with the
    // registry-read code rather than the partial-failure code.
    assert!(matches!(err, MigrateError::RegistryNotFound { .. }));
}

#[tokio::test]
async fn test_missing_repository_url_rejected_before_any_registry_call() {
    let source = MockServer::start().await;
    let target = MockServer::start().await;

    let mut config = test_config(&source.uri(), &target.uri());
    config.migration.repository_url = None;

    let orchestrator = Orchestrator::new(config).unwrap();
    let modules = vec!["left-pad".to_string()];
    let err = orchestrator
        .run(&modules, CancellationToken::new(), false)
        .await
        .unwrap_err();

    assert!(matches!(err, MigrateError::Config(_)));
    assert!(source.received_requests().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_diff_module_reports_missing_versions() {
    let source = MockServer::start().await;
    let target = MockServer::start().await;

    let source_packument = json!({
        "name": "left-pad",
        "versions": {
            "1.0.0": version_record(&source.uri(), "1.0.0"),
            "1.1.0": version_record(&source.uri(), "1.1.0"),
        }
    });
    let target_packument = json!({
        "name": "left-pad",
        "versions": { "1.0.0": version_record(&source.uri(), "1.0.0") }
    });

    Mock::given(method("GET"))
        .and(path("/left-pad"))
        .respond_with(ResponseTemplate::new(200).set_body_json(&source_packument))
        .mount(&source)
        .await;
    Mock::given(method("GET"))
        .and(path("/left-pad"))
        .respond_with(ResponseTemplate::new(200).set_body_json(&target_packument))
        .mount(&target)
        .await;

    let orchestrator = Orchestrator::new(test_config(&source.uri(), &target.uri())).unwrap();
    let missing = orchestrator.diff_module("left-pad").await.unwrap();

    assert_eq!(missing, ["1.1.0"]);
    assert!(find_publish_body(&target).await.is_none());
}
