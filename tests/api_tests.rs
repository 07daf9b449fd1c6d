mod mocks;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use http_body_util::BodyExt;
use serde_json::{json, Value};
use tower::ServiceExt;

use landwatch_service::messages::StreamEvent;
use landwatch_service::services::ImageOrigin;
use landwatch_service::web::{build_router, OWNER_HEADER};

use mocks::{create_test_detection, png_bytes, TestEnv};

fn app(env: &TestEnv) -> Router {
    build_router(env.state.clone())
}

fn post_json(uri: &str, owner: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/json")
        .header(OWNER_HEADER, owner)
        .body(Body::from(body.to_string()))
        .unwrap()
}

fn get(uri: &str, owner: &str) -> Request<Body> {
    Request::builder()
        .uri(uri)
        .header(OWNER_HEADER, owner)
        .body(Body::empty())
        .unwrap()
}

async fn body_bytes(response: axum::response::Response) -> bytes::Bytes {
    response.into_body().collect().await.unwrap().to_bytes()
}

async fn body_json(response: axum::response::Response) -> Value {
    serde_json::from_slice(&body_bytes(response).await).unwrap()
}

#[tokio::test]
async fn test_start_without_api_key_is_bad_request() {
    let env = TestEnv::new();

    let response = app(&env)
        .oneshot(post_json("/realtime/start", "alice", json!({})))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = body_json(response).await;
    assert_eq!(body["code"], "BAD_REQUEST");

    let response = app(&env)
        .oneshot(post_json("/realtime", "alice", json!({"apiKey": ""})))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert!(!env.state.manager.status().is_running());
}

#[tokio::test]
async fn test_control_plane_over_http() {
    let env = TestEnv::new();

    let response = app(&env)
        .oneshot(post_json("/realtime/start", "alice", json!({"apiKey": "k1"})))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let response = app(&env)
        .oneshot(post_json("/realtime/start", "bob", json!({"apiKey": "k2"})))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CONFLICT);

    let response = app(&env)
        .oneshot(get("/realtime-status", "alice"))
        .await
        .unwrap();
    assert_eq!(
        body_json(response).await,
        json!({"isRunning": true, "apiKey": "k1"})
    );

    let response = app(&env)
        .oneshot(post_json("/realtime/stop", "bob", json!({"apiKey": "k2"})))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(body_json(response).await["code"], "INVALID_KEY");

    let response = app(&env)
        .oneshot(post_json("/realtime/stop", "alice", json!({"apiKey": "k1"})))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let response = app(&env)
        .oneshot(post_json("/realtime/stop", "alice", json!({"apiKey": "k1"})))
        .await
        .unwrap();
    assert_eq!(body_json(response).await["code"], "NOT_RUNNING");
}

#[tokio::test]
async fn test_missing_owner_is_unauthorized() {
    let env = TestEnv::new();
    let request = Request::builder()
        .method("POST")
        .uri("/realtime/start")
        .body(Body::from(json!({"apiKey": "k1"}).to_string()))
        .unwrap();

    let response = app(&env).oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert!(!env.state.manager.status().is_running());
}

#[tokio::test]
async fn test_replay_endpoint_streams_ndjson() {
    let env = TestEnv::new();
    env.state.staging.write("a.jpg", &png_bytes(16, 16)).await.unwrap();
    env.state.staging.write("b.jpg", &png_bytes(16, 16)).await.unwrap();
    env.detector.script(
        "a.jpg",
        vec![create_test_detection(0.9), create_test_detection(0.6)],
    );

    let response = app(&env)
        .oneshot(post_json("/realtime/replay", "alice", json!({})))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response.headers()["content-type"],
        "application/x-ndjson"
    );

    let body = body_bytes(response).await;
    let text = std::str::from_utf8(&body).unwrap();
    let lines: Vec<Value> = text
        .lines()
        .map(|line| serde_json::from_str(line).unwrap())
        .collect();

    assert_eq!(lines.len(), 4);
    assert_eq!(lines[0], json!({"firstDetection": true}));
    assert_eq!(lines[1]["image"], "a.jpg");
    assert_eq!(lines[1]["detections"].as_array().unwrap().len(), 2);
    assert_eq!(lines[2], json!({"image": "b.jpg", "detections": []}));
    assert_eq!(lines[3], json!({"completed": true, "totalDetections": 2}));

    let last: StreamEvent = serde_json::from_value(lines[3].clone()).unwrap();
    assert_eq!(last, StreamEvent::completed(2));
}

fn multipart_upload(owner: &str, filename: &str, bytes: &[u8]) -> Request<Body> {
    let boundary = "landwatch-test-boundary";
    let mut body = Vec::new();
    body.extend_from_slice(format!("--{}\r\n", boundary).as_bytes());
    body.extend_from_slice(
        format!(
            "Content-Disposition: form-data; name=\"file\"; filename=\"{}\"\r\n",
            filename
        )
        .as_bytes(),
    );
    body.extend_from_slice(b"Content-Type: application/octet-stream\r\n\r\n");
    body.extend_from_slice(bytes);
    body.extend_from_slice(format!("\r\n--{}--\r\n", boundary).as_bytes());

    Request::builder()
        .method("POST")
        .uri("/upload")
        .header(
            "content-type",
            format!("multipart/form-data; boundary={}", boundary),
        )
        .header(OWNER_HEADER, owner)
        .body(Body::from(body))
        .unwrap()
}

#[tokio::test]
async fn test_upload_list_details_delete() {
    let env = TestEnv::new();
    env.detector.script("site.png", vec![create_test_detection(0.9)]);

    let response = app(&env)
        .oneshot(multipart_upload("alice", "site.png", &png_bytes(16, 16)))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    let id = body["imageId"].as_str().unwrap().to_string();

    let response = app(&env).oneshot(get("/images", "alice")).await.unwrap();
    let list = body_json(response).await;
    assert_eq!(list.as_array().unwrap().len(), 1);
    assert_eq!(list[0]["detectionCount"], 1);
    assert_eq!(list[0]["source"], "uploaded");

    let response = app(&env)
        .oneshot(get(&format!("/images/{}", id), "alice"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let details = body_json(response).await;
    assert_eq!(details["originalUrl"], "/uploads/site.png");
    assert_eq!(details["annotatedUrl"], "/outputs/site.png_annotated.png");
    assert_eq!(details["detections"][0]["type"], "landfill");
    assert_eq!(details["detections"][0]["boundingBox"]["topLeft"]["lng"], 4.0);

    // Other owners cannot see it.
    let response = app(&env)
        .oneshot(get(&format!("/images/{}", id), "bob"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    let request = Request::builder()
        .method("DELETE")
        .uri(format!("/images/{}", id))
        .header(OWNER_HEADER, "alice")
        .body(Body::empty())
        .unwrap();
    let response = app(&env).oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    assert!(!env.dir.path().join("uploads/site.png").exists());
    assert!(!env.dir.path().join("outputs/site.png_annotated.png").exists());
    assert!(!env.dir.path().join("outputs/site.png_annotations.json").exists());

    let response = app(&env)
        .oneshot(get(&format!("/images/{}", id), "alice"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_upload_rejects_disallowed_type() {
    let env = TestEnv::new();
    let response = app(&env)
        .oneshot(multipart_upload("alice", "notes.txt", b"hello"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = body_json(response).await;
    assert!(body["error"].as_str().unwrap().contains("File type not allowed"));
}

#[tokio::test]
async fn test_rejected_upload_leaves_no_file() {
    let env = TestEnv::new();
    let response = app(&env)
        .oneshot(multipart_upload("alice", "broken.png", b"not really a png"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(body_json(response).await["code"], "UNREADABLE_IMAGE");

    assert!(!env.dir.path().join("uploads/broken.png").exists());
    assert!(env.records_for("alice").await.is_empty());
}

#[tokio::test]
async fn test_unknown_image_is_not_found() {
    let env = TestEnv::new();
    for uri in ["/images/not-a-uuid", "/realtime-images/0190a0e4-0000-7000-8000-000000000000"] {
        let response = app(&env).oneshot(get(uri, "alice")).await.unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }
}

#[tokio::test]
async fn test_images_list_reports_current_session() {
    let env = TestEnv::new();

    let response = app(&env).oneshot(get("/images-list", "alice")).await.unwrap();
    assert_eq!(body_json(response).await, json!({"images": []}));

    env.state.sessions.start_session("alice").await;
    env.state.staging.write("s.png", &png_bytes(8, 8)).await.unwrap();
    let path = env.state.staging.path("s.png");
    env.state
        .pipeline
        .process(
            "s.png",
            &path,
            png_bytes(8, 8),
            "alice",
            ImageOrigin::Realtime,
        )
        .await
        .unwrap();

    let response = app(&env).oneshot(get("/images-list", "alice")).await.unwrap();
    assert_eq!(body_json(response).await, json!({"images": ["s.png"]}));
}

#[tokio::test]
async fn test_health() {
    let env = TestEnv::new();
    let response = app(&env).oneshot(get("/health", "anyone")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_json(response).await["worker"], "idle");
}
