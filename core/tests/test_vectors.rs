//! Verify the `build_*` methods against JSON test vectors stored in
//! `test-vectors/`.
//!
//! Each case names an operation, its inputs, and the request it must
//! produce. Bodies are compared as parsed JSON so field order is irrelevant.

use dd_core::{
    ClearMode, CreateService, DdClient, HttpMethod, HttpRequest, PredictRequest, TrainJob,
    TrainStatusQuery,
};
use serde_json::Value;

/// Parse the method string from test vectors into `HttpMethod`.
fn parse_method(s: &str) -> HttpMethod {
    match s {
        "GET" => HttpMethod::Get,
        "POST" => HttpMethod::Post,
        "PUT" => HttpMethod::Put,
        "DELETE" => HttpMethod::Delete,
        other => panic!("unknown method: {other}"),
    }
}

fn build(client: &DdClient, operation: &str, input: &Value) -> HttpRequest {
    let from = |key: &str| input[key].clone();
    match operation {
        "info" => client.build_info(),
        "put_service" => {
            let service: CreateService = serde_json::from_value(from("service")).unwrap();
            client
                .build_put_service(input["name"].as_str().unwrap(), &service)
                .unwrap()
        }
        "get_service" => client.build_get_service(input["name"].as_str().unwrap()),
        "delete_service" => {
            let clear: Option<ClearMode> = serde_json::from_value(from("clear")).unwrap();
            client.build_delete_service(input["name"].as_str().unwrap(), clear)
        }
        "post_train" => {
            let job: TrainJob = serde_json::from_value(from("job")).unwrap();
            client.build_post_train(&job).unwrap()
        }
        "get_train" => {
            let query: TrainStatusQuery = serde_json::from_value(from("query")).unwrap();
            client.build_get_train(&query)
        }
        "delete_train" => client.build_delete_train(
            input["service"].as_str().unwrap(),
            input["job"].as_u64().unwrap() as u32,
        ),
        "post_predict" => {
            let request: PredictRequest = serde_json::from_value(from("request")).unwrap();
            client.build_post_predict(&request).unwrap()
        }
        other => panic!("unknown operation: {other}"),
    }
}

#[test]
fn request_test_vectors() {
    let raw = include_str!("../../test-vectors/requests.json");
    let vectors: Value = serde_json::from_str(raw).unwrap();
    let base_url = vectors["base_url"].as_str().unwrap();

    let client = DdClient::localhost().unwrap();
    assert_eq!(client.base_url(), base_url);

    for case in vectors["cases"].as_array().unwrap() {
        let name = case["name"].as_str().unwrap();
        let expected = &case["expected_request"];
        let req = build(&client, case["operation"].as_str().unwrap(), &case["input"]);

        assert_eq!(req.method, parse_method(expected["method"].as_str().unwrap()), "{name}: method");
        assert_eq!(req.url, format!("{base_url}{}", expected["path"].as_str().unwrap()), "{name}: url");

        let expected_query: Vec<(String, String)> = expected["query"]
            .as_array()
            .unwrap()
            .iter()
            .map(|pair| {
                let arr = pair.as_array().unwrap();
                (arr[0].as_str().unwrap().to_string(), arr[1].as_str().unwrap().to_string())
            })
            .collect();
        assert_eq!(req.query, expected_query, "{name}: query");

        if expected["body"].is_null() {
            assert!(req.body.is_none(), "{name}: body should be None");
            assert!(req.headers.is_empty(), "{name}: headers should be empty");
        } else {
            let body: Value = serde_json::from_str(req.body.as_deref().unwrap()).unwrap();
            assert_eq!(body, expected["body"], "{name}: body");
            assert_eq!(
                req.headers,
                vec![("content-type".to_string(), "application/json".to_string())],
                "{name}: headers"
            );
        }
    }
}
