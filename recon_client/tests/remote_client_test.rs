use std::sync::Arc;

use parking_lot::Mutex;
use progress_tracking::{FnProgressUpdater, NoOpProgressUpdater, UploadProgress};
use recon_client::{ReconClientError, ReconstructionClient, RemoteClient, UploadPart};
use recon_config::ReconConfig;
use recon_types::{Method, Quality, RemoteStatus, SessionId, StartRequest};
use serde_json::json;
use tracing_test::traced_test;
use wiremock::matchers::{body_json, body_string_contains, header_regex, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn client_for(server: &MockServer) -> RemoteClient {
    RemoteClient::from_config(&ReconConfig::default().with_endpoint(server.uri())).unwrap()
}

fn jpeg(name: &str, n_bytes: usize) -> UploadPart {
    UploadPart::new(name, "image/jpeg", vec![b'x'; n_bytes])
}

#[tokio::test]
async fn test_upload_sends_one_multipart_request() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/upload"))
        .and(header_regex("content-type", "^multipart/form-data; boundary="))
        .and(body_string_contains("name=\"files\"; filename=\"a.jpg\""))
        .and(body_string_contains("name=\"files\"; filename=\"c.jpg\""))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "session_id": "abc",
            "message": "Successfully uploaded 3 images",
            "status": "success"
        })))
        .expect(1)
        .mount(&server)
        .await;

    let seen = Arc::new(Mutex::new(Vec::new()));
    let updater = {
        let seen = seen.clone();
        FnProgressUpdater::new(move |u: UploadProgress| seen.lock().push(u.percent()))
    };

    let client = client_for(&server);
    let parts = vec![jpeg("a.jpg", 1000), jpeg("b.jpg", 2000), jpeg("c.jpg", 3000)];
    let response = client.upload_images(parts, updater).await.unwrap();

    assert_eq!(response.session_id, SessionId::from("abc"));

    let seen = seen.lock().clone();
    assert_eq!(seen.last(), Some(&100));
    assert!(seen.windows(2).all(|w| w[0] < w[1]), "progress must increase: {seen:?}");
}

#[tokio::test]
async fn test_upload_error_body_becomes_status_error() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/upload"))
        .respond_with(
            ResponseTemplate::new(400)
                .set_body_json(json!({"error": "At least 3 images are required for 3D reconstruction"})),
        )
        .mount(&server)
        .await;

    let client = client_for(&server);
    let err = client
        .upload_images(vec![jpeg("a.jpg", 10)], NoOpProgressUpdater::new())
        .await
        .unwrap_err();

    assert_eq!(
        err,
        ReconClientError::Status {
            status: 400,
            message: "At least 3 images are required for 3D reconstruction".to_owned()
        }
    );
    assert_eq!(err.status_code(), Some(400));
}

#[tokio::test]
async fn test_start_posts_quality_and_method() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/reconstruct/abc"))
        .and(body_json(json!({"quality": "high", "method": "custom"})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "session_id": "abc",
            "status": "processing",
            "message": "Reconstruction started."
        })))
        .expect(1)
        .mount(&server)
        .await;

    let client = client_for(&server);
    let request = StartRequest {
        quality: Quality::High,
        method: Method::Neural,
    };
    let response = client.start_reconstruction(&SessionId::from("abc"), request).await.unwrap();
    assert_eq!(response.status, RemoteStatus::Processing);
}

#[traced_test]
#[tokio::test]
async fn test_status_results_and_model() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/status/abc"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "status": "processing", "progress": 40, "elapsed_time": 17
        })))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/results/abc"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "status": "completed",
            "quality": "medium",
            "method": "colmap",
            "num_images": 3,
            "timestamp": 1700000000.0,
            "files": [{"filename": "model.obj", "url": "/api/download/abc/model.obj"}]
        })))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/model/abc"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "model_url": "/api/results/abc/model.obj", "model_type": "obj", "file_name": "model.obj"
        })))
        .mount(&server)
        .await;

    let client = client_for(&server);
    let id = SessionId::from("abc");

    let status = client.get_status(&id).await.unwrap();
    assert_eq!(status.clamped_progress(), Some(40));
    assert_eq!(status.elapsed_seconds(), Some(17));

    let results = client.get_results(&id).await.unwrap();
    assert_eq!(results.files.len(), 1);
    assert_eq!(results.files[0].filename, "model.obj");

    let model = client.get_model_info(&id).await.unwrap();
    assert_eq!(model.model_type, "obj");

    // Every call goes through the request-logging middleware.
    assert!(logs_contain("request finished"));
    assert!(logs_contain("/api/status/abc"));
    assert!(logs_contain("/api/model/abc"));
}

#[tokio::test]
async fn test_health_check_is_outside_the_api_prefix() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/health"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"status": "ok", "timestamp": 1700000000.0})))
        .expect(1)
        .mount(&server)
        .await;

    let health = client_for(&server).health_check().await.unwrap();
    assert!(health.is_ok());
    assert_eq!(health.timestamp, Some(1700000000.0));
}

#[traced_test]
#[tokio::test]
async fn test_unavailable_service_is_a_status_error() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/health"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&server)
        .await;

    let err = client_for(&server).health_check().await.unwrap_err();
    assert_eq!(err.status_code(), Some(503));
    assert!(logs_contain("status=503"));
}

#[tokio::test]
async fn test_unknown_status_with_404_is_an_error() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/status/abc"))
        .respond_with(ResponseTemplate::new(404).set_body_json(json!({
            "session_id": "abc", "status": "unknown", "error": "Metadata not found or empty"
        })))
        .mount(&server)
        .await;

    let err = client_for(&server).get_status(&SessionId::from("abc")).await.unwrap_err();
    assert!(matches!(err, ReconClientError::Status { status: 404, ref message } if message == "Metadata not found or empty"));
}

#[tokio::test]
async fn test_malformed_json_is_reported() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/model/abc"))
        .respond_with(ResponseTemplate::new(200).set_body_string("<html>oops</html>"))
        .mount(&server)
        .await;

    let err = client_for(&server).get_model_info(&SessionId::from("abc")).await.unwrap_err();
    assert!(matches!(err, ReconClientError::Json(_)));
}

#[tokio::test]
async fn test_delete_and_downloads() {
    let server = MockServer::start().await;
    Mock::given(method("DELETE"))
        .and(path("/api/delete/abc"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"session_id": "abc", "status": "deleted"})))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/download-zip/abc"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(b"PK\x03\x04zip".to_vec()))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/download/abc/model.obj"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(b"v 0 0 0\n".to_vec()))
        .mount(&server)
        .await;

    let client = client_for(&server);
    let id = SessionId::from("abc");

    client.delete_session(&id).await.unwrap();

    let mut zip = Vec::new();
    assert_eq!(client.download_zip(&id, &mut zip).await.unwrap(), 7);
    assert_eq!(zip, b"PK\x03\x04zip");

    let mut obj = Vec::new();
    client.download_file(&id, "model.obj", &mut obj).await.unwrap();
    assert_eq!(obj, b"v 0 0 0\n");

    let mut missing = Vec::new();
    let err = client.download_file(&id, "nope.ply", &mut missing).await.unwrap_err();
    assert_eq!(err.status_code(), Some(404));
}
