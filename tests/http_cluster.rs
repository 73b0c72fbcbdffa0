use driftguard::{
    ClusterApi, HttpClusterClient, HttpClusterError, ProviderError, ReclaimPolicy, ResourceId,
    ResourceSpec,
};
use std::time::Duration;

use wiremock::matchers::{body_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn client(server: &MockServer) -> HttpClusterClient {
    HttpClusterClient::with_base_url("test_token".to_string(), server.uri()).unwrap()
}

fn spec() -> ResourceSpec {
    ResourceSpec {
        id: ResourceId::new("volume", "pg-data"),
        region: "us-west1".to_string(),
        storage_class: Some("regional-ssd".to_string()),
        reclaim_policy: Some(ReclaimPolicy::Retain),
        immutable: false,
    }
}

#[tokio::test]
async fn test_get_resource_success() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/resources/volume/pg-data"))
        .and(header("authorization", "Bearer test_token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "success": true,
            "errors": [],
            "result": {
                "region": "us-west1",
                "storageClass": "regional-ssd",
                "reclaimPolicy": "Delete"
            }
        })))
        .mount(&mock_server)
        .await;

    let live = client(&mock_server)
        .get(&ResourceId::new("volume", "pg-data"))
        .await
        .unwrap();

    assert_eq!(live.kind, "volume");
    assert_eq!(live.name, "pg-data");
    assert_eq!(live.region, "us-west1");
    assert_eq!(live.reclaim_policy, Some(ReclaimPolicy::Delete));
}

#[tokio::test]
async fn test_get_resource_404_is_not_found() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/resources/volume/pg-data"))
        .respond_with(ResponseTemplate::new(404).set_body_json(serde_json::json!({
            "success": false,
            "errors": [{"code": 1004, "message": "resource not found"}],
            "result": null
        })))
        .mount(&mock_server)
        .await;

    let err = client(&mock_server)
        .get(&ResourceId::new("volume", "pg-data"))
        .await
        .unwrap_err();

    match err {
        ProviderError::NotFound(id) => assert_eq!(id.to_string(), "volume/pg-data"),
        other => panic!("expected NotFound, got {:?}", other),
    }
}

#[tokio::test]
async fn test_get_resource_unauthorized() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/resources/volume/pg-data"))
        .respond_with(ResponseTemplate::new(401).set_body_json(serde_json::json!({
            "success": false,
            "errors": [{"code": 1000, "message": "Invalid API Token"}],
            "result": null
        })))
        .mount(&mock_server)
        .await;

    let err = client(&mock_server)
        .get_resource(&ResourceId::new("volume", "pg-data"))
        .await
        .unwrap_err();

    match err {
        HttpClusterError::Auth { message } => assert_eq!(message, "Invalid API Token"),
        other => panic!("expected Auth error, got {:?}", other),
    }
}

#[tokio::test]
async fn test_server_error_is_transient() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/resources/volume/pg-data"))
        .respond_with(ResponseTemplate::new(503).set_body_string("upstream unavailable"))
        .mount(&mock_server)
        .await;

    let err = client(&mock_server)
        .get(&ResourceId::new("volume", "pg-data"))
        .await
        .unwrap_err();

    assert!(err.is_transient(), "expected transient, got {:?}", err);
}

#[tokio::test]
async fn test_rate_limited_reads_retry_after() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/resources/volume/pg-data"))
        .respond_with(ResponseTemplate::new(429).insert_header("retry-after", "7"))
        .mount(&mock_server)
        .await;

    let err = client(&mock_server)
        .get_resource(&ResourceId::new("volume", "pg-data"))
        .await
        .unwrap_err();

    assert!(matches!(err, HttpClusterError::RateLimited { retry_after: 7 }));
    assert!(err.is_transient());

    let provider_err = ProviderError::from(err);
    assert_eq!(provider_err.retry_after(), Some(Duration::from_secs(7)));
}

#[tokio::test]
async fn test_apply_puts_desired_attributes() {
    let mock_server = MockServer::start().await;

    Mock::given(method("PUT"))
        .and(path("/resources/volume/pg-data"))
        .and(body_json(serde_json::json!({
            "region": "us-west1",
            "storageClass": "regional-ssd",
            "reclaimPolicy": "Retain"
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "success": true,
            "errors": [],
            "result": {
                "region": "us-west1",
                "storageClass": "regional-ssd",
                "reclaimPolicy": "Retain"
            }
        })))
        .expect(1)
        .mount(&mock_server)
        .await;

    let live = client(&mock_server).apply(&spec()).await.unwrap();
    assert_eq!(live.reclaim_policy, Some(ReclaimPolicy::Retain));
}

#[tokio::test]
async fn test_apply_rejected_by_api() {
    let mock_server = MockServer::start().await;

    Mock::given(method("PUT"))
        .and(path("/resources/volume/pg-data"))
        .respond_with(ResponseTemplate::new(422).set_body_json(serde_json::json!({
            "success": false,
            "errors": [{"code": 4220, "message": "storage class does not exist"}],
            "result": null
        })))
        .mount(&mock_server)
        .await;

    let err = client(&mock_server).apply(&spec()).await.unwrap_err();
    match err {
        ProviderError::Rejected(message) => {
            assert!(message.contains("storage class does not exist"));
            assert!(message.contains("422"));
        }
        other => panic!("expected Rejected, got {:?}", other),
    }
}

#[tokio::test]
async fn test_success_false_with_200_is_api_error() {
    let mock_server = MockServer::start().await;

    Mock::given(method("PUT"))
        .and(path("/resources/volume/pg-data"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "success": false,
            "errors": [{"code": 9000, "message": "conflict"}],
            "result": null
        })))
        .mount(&mock_server)
        .await;

    let err = client(&mock_server).put_resource(&spec()).await.unwrap_err();
    assert!(matches!(err, HttpClusterError::Api { status: 200, .. }));
}

#[tokio::test]
async fn test_delete_resource() {
    let mock_server = MockServer::start().await;

    Mock::given(method("DELETE"))
        .and(path("/resources/bucket/assets"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "success": true,
            "errors": [],
            "result": null
        })))
        .expect(1)
        .mount(&mock_server)
        .await;

    client(&mock_server)
        .delete(&ResourceId::new("bucket", "assets"))
        .await
        .unwrap();
}

#[tokio::test]
async fn test_delete_accepts_no_content() {
    let mock_server = MockServer::start().await;

    Mock::given(method("DELETE"))
        .and(path("/resources/bucket/assets"))
        .respond_with(ResponseTemplate::new(204))
        .expect(1)
        .mount(&mock_server)
        .await;

    client(&mock_server)
        .delete(&ResourceId::new("bucket", "assets"))
        .await
        .unwrap();
}

#[tokio::test]
async fn test_delete_missing_resource_is_not_found() {
    let mock_server = MockServer::start().await;

    Mock::given(method("DELETE"))
        .and(path("/resources/bucket/assets"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&mock_server)
        .await;

    let err = client(&mock_server)
        .delete(&ResourceId::new("bucket", "assets"))
        .await
        .unwrap_err();
    assert!(matches!(err, ProviderError::NotFound(_)));
}

#[tokio::test]
async fn test_malformed_success_body_is_decode_error() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/resources/volume/pg-data"))
        .respond_with(ResponseTemplate::new(200).set_body_string("<html>proxy</html>"))
        .mount(&mock_server)
        .await;

    let err = client(&mock_server)
        .get_resource(&ResourceId::new("volume", "pg-data"))
        .await
        .unwrap_err();
    assert!(matches!(err, HttpClusterError::Decode { .. }));
}

#[tokio::test]
async fn test_error_does_not_contain_token() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/resources/volume/pg-data"))
        .respond_with(ResponseTemplate::new(403).set_body_json(serde_json::json!({
            "success": false,
            "errors": [{"code": 1003, "message": "forbidden"}],
            "result": null
        })))
        .mount(&mock_server)
        .await;

    let client =
        HttpClusterClient::with_base_url("cf_super_secret_token_12345".to_string(), mock_server.uri())
            .unwrap();
    let err = client
        .get(&ResourceId::new("volume", "pg-data"))
        .await
        .unwrap_err();

    assert!(matches!(err, ProviderError::Auth(_)));
    assert!(!err.to_string().contains("cf_super_secret_token_12345"));
}
