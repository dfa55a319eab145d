use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use http_body_util::BodyExt;
use serde_json::{Value, json};
use tower::ServiceExt;

use sqlgate::api::GatewayApi;
use sqlgate::conf::RawConfig;
use sqlgate::driver::Driver;

pub const PATH: &str = "/v1/query";

pub fn backend_config(server: &str, table: &str) -> RawConfig {
    match json!({
        "server": server,
        "port": 10800,
        "username": "gate",
        "password": "secret",
        "table": table,
        "tls": "no",
        "tls-insecure": "no",
        "max-idle-conn": 2,
        "max-open-conn": 4,
    }) {
        Value::Object(map) => map,
        _ => unreachable!(),
    }
}

pub async fn mount(driver: impl Driver, raw: &RawConfig) -> GatewayApi {
    GatewayApi::mount(Arc::new(driver), raw, Duration::from_secs(5)).await
}

pub fn post(body: Value) -> Request<Body> {
    Request::post(PATH)
        .header("content-type", "application/json")
        .body(Body::from(serde_json::to_vec(&body).unwrap()))
        .unwrap()
}

pub async fn body_bytes(router: Router, req: Request<Body>) -> (StatusCode, Vec<u8>) {
    let response = router.oneshot(req).await.unwrap();
    let status = response.status();
    let bytes = response.into_body().collect().await.unwrap().to_bytes().to_vec();
    (status, bytes)
}

pub async fn body_json(router: Router, req: Request<Body>) -> (StatusCode, Value) {
    let (status, bytes) = body_bytes(router, req).await;
    let json: Value = serde_json::from_slice(&bytes).unwrap();
    (status, json)
}
