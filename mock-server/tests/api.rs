use axum::http::{self, Request, StatusCode};
use http_body_util::BodyExt;
use mock_server::{app, app_with_state, Db};
use serde_json::Value;
use tower::ServiceExt;

async fn body_json(response: axum::response::Response) -> Value {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}

async fn body_bytes(response: axum::response::Response) -> bytes::Bytes {
    response.into_body().collect().await.unwrap().to_bytes()
}

fn json_request(method: &str, uri: &str, body: &str) -> Request<String> {
    Request::builder()
        .method(method)
        .uri(uri)
        .header(http::header::CONTENT_TYPE, "application/json")
        .body(body.to_string())
        .unwrap()
}

fn empty_request(method: &str, uri: &str) -> Request<String> {
    Request::builder()
        .method(method)
        .uri(uri)
        .body(String::new())
        .unwrap()
}

const SERVICE: &str = r#"{"description":"digits","mllib":"caffe","type":"supervised",
    "parameters":{"input":{"connector":"svm"},"mllib":{"nclasses":10},"output":{}},
    "model":{"repository":"/tmp/digits"}}"#;

async fn with_service(db: &Db) {
    let resp = app_with_state(db.clone())
        .oneshot(json_request("PUT", "/services/digits", SERVICE))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::CREATED);
}

// --- info ---

#[tokio::test]
async fn info_lists_no_services_initially() {
    let resp = app().oneshot(empty_request("GET", "/info")).await.unwrap();

    assert_eq!(resp.status(), StatusCode::OK);
    let body = body_json(resp).await;
    assert_eq!(body["status"]["code"], 200);
    assert_eq!(body["head"]["services"].as_array().unwrap().len(), 0);
}

#[tokio::test]
async fn info_lists_created_service() {
    let db = Db::default();
    with_service(&db).await;

    let resp = app_with_state(db).oneshot(empty_request("GET", "/info")).await.unwrap();
    let body = body_json(resp).await;
    assert_eq!(body["head"]["services"][0]["name"], "digits");
    assert_eq!(body["head"]["services"][0]["mllib"], "caffe");
}

// --- services ---

#[tokio::test]
async fn create_then_get_service() {
    let db = Db::default();
    with_service(&db).await;

    let resp = app_with_state(db)
        .oneshot(empty_request("GET", "/services/digits"))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let body = body_json(resp).await;
    assert_eq!(body["body"]["description"], "digits");
    assert_eq!(body["body"]["model"]["repository"], "/tmp/digits");
}

#[tokio::test]
async fn create_service_twice_conflicts() {
    let db = Db::default();
    with_service(&db).await;

    let resp = app_with_state(db)
        .oneshot(json_request("PUT", "/services/digits", SERVICE))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::CONFLICT);
}

#[tokio::test]
async fn create_service_malformed_json_returns_422() {
    let resp = app()
        .oneshot(json_request("PUT", "/services/x", r#"{"model":{}}"#))
        .await
        .unwrap();

    assert_eq!(resp.status(), StatusCode::UNPROCESSABLE_ENTITY);
}

#[tokio::test]
async fn get_service_not_found() {
    let resp = app()
        .oneshot(empty_request("GET", "/services/missing"))
        .await
        .unwrap();

    assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    let body = body_json(resp).await;
    assert_eq!(body["status"]["dd_msg"], "Service Not Found");
}

#[tokio::test]
async fn delete_service_with_unknown_clear_mode() {
    let db = Db::default();
    with_service(&db).await;

    let resp = app_with_state(db)
        .oneshot(empty_request("DELETE", "/services/digits?clear=everything"))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn delete_service_removes_it() {
    let db = Db::default();
    with_service(&db).await;

    let resp = app_with_state(db.clone())
        .oneshot(empty_request("DELETE", "/services/digits?clear=full"))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    assert!(db.read().await.services.is_empty());
}

// --- train ---

#[tokio::test]
async fn async_training_runs_then_finishes() {
    let db = Db::default();
    with_service(&db).await;

    let resp = app_with_state(db.clone())
        .oneshot(json_request(
            "POST",
            "/train",
            r#"{"service":"digits","async":true,"parameters":{"mllib":{"solver":{"iterations":40}}},"data":["train.svm"]}"#,
        ))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::CREATED);
    let body = body_json(resp).await;
    assert_eq!(body["head"]["job"], 1);
    assert_eq!(body["head"]["status"], "running");

    let resp = app_with_state(db.clone())
        .oneshot(empty_request("GET", "/train?service=digits&job=1&timeout=0"))
        .await
        .unwrap();
    let body = body_json(resp).await;
    assert_eq!(body["head"]["status"], "running");

    let resp = app_with_state(db)
        .oneshot(empty_request(
            "GET",
            "/train?service=digits&job=1&timeout=0&parameters.output.measure_hist=true",
        ))
        .await
        .unwrap();
    let body = body_json(resp).await;
    assert_eq!(body["head"]["status"], "finished");
    assert_eq!(body["body"]["measure"]["iteration"], 40);
    assert!(body["body"]["measure_hist"]["train_loss_hist"].is_array());
}

#[tokio::test]
async fn blocking_training_returns_measures() {
    let db = Db::default();
    with_service(&db).await;

    let resp = app_with_state(db)
        .oneshot(json_request(
            "POST",
            "/train",
            r#"{"service":"digits","async":false,"data":["train.svm"]}"#,
        ))
        .await
        .unwrap();
    let body = body_json(resp).await;
    assert_eq!(body["head"]["status"], "finished");
    assert_eq!(body["body"]["measure"]["iteration"], 100);
}

#[tokio::test]
async fn training_unknown_service_is_404() {
    let resp = app()
        .oneshot(json_request("POST", "/train", r#"{"service":"nope","data":[]}"#))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn training_status_bad_job_id_returns_400() {
    let db = Db::default();
    with_service(&db).await;

    let resp = app_with_state(db)
        .oneshot(empty_request("GET", "/train?service=digits&job=abc"))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn cancel_training_terminates_job() {
    let db = Db::default();
    with_service(&db).await;
    app_with_state(db.clone())
        .oneshot(json_request("POST", "/train", r#"{"service":"digits","data":[]}"#))
        .await
        .unwrap();

    let resp = app_with_state(db.clone())
        .oneshot(empty_request("DELETE", "/train?service=digits&job=1"))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let body = body_json(resp).await;
    assert_eq!(body["head"]["status"], "terminated");

    let resp = app_with_state(db)
        .oneshot(empty_request("DELETE", "/train?service=digits&job=7"))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);
}

// --- predict ---

#[tokio::test]
async fn predict_returns_one_prediction_per_item() {
    let db = Db::default();
    with_service(&db).await;

    let resp = app_with_state(db)
        .oneshot(json_request(
            "POST",
            "/predict",
            r#"{"service":"digits","parameters":{"output":{"best":2}},"data":["a.svm","b.svm"]}"#,
        ))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let body = body_json(resp).await;
    let predictions = body["body"]["predictions"].as_array().unwrap();
    assert_eq!(predictions.len(), 2);
    assert_eq!(predictions[0]["uri"], "a.svm");
    assert_eq!(predictions[0]["classes"].as_array().unwrap().len(), 2);
    assert_eq!(predictions[1]["classes"][0]["cat"], "1");
}

#[tokio::test]
async fn predict_requires_array_data() {
    let db = Db::default();
    with_service(&db).await;

    let resp = app_with_state(db)
        .oneshot(json_request("POST", "/predict", r#"{"service":"digits","data":"a.svm"}"#))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
}

// --- recording and failure injection ---

#[tokio::test]
async fn requests_are_recorded() {
    let db = Db::default();
    app_with_state(db.clone())
        .oneshot(empty_request("GET", "/train?service=digits&job=3"))
        .await
        .unwrap();

    let data = db.read().await;
    let last = data.requests.last().unwrap();
    assert_eq!(last.method, "GET");
    assert_eq!(last.path, "/train");
    assert_eq!(last.query["job"], "3");
    assert!(last.body.is_none());
}

#[tokio::test]
async fn armed_failure_short_circuits() {
    let db = Db::default();
    db.write().await.fail_with = Some(500);

    let resp = app_with_state(db)
        .oneshot(empty_request("GET", "/info"))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);
    let bytes = body_bytes(resp).await;
    let body: Value = serde_json::from_slice(&bytes).unwrap();
    assert_eq!(body["status"]["dd_msg"], "injected failure");
}
