use procura_infra::EngineConfig;
use reqwest::StatusCode;
use serde_json::{json, Value};

struct TestServer {
    base_url: String,
    client: reqwest::Client,
    handle: tokio::task::JoinHandle<()>,
}

impl TestServer {
    async fn spawn() -> Self {
        // Same router as prod, bound to an ephemeral port.
        let app = procura_api::app::build_app(EngineConfig::default());
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("failed to bind ephemeral port");
        let addr = listener.local_addr().unwrap();
        let base_url = format!("http://{}", addr);

        let handle = tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        Self {
            base_url,
            client: reqwest::Client::new(),
            handle,
        }
    }

    async fn post(&self, path: &str, body: Value) -> (StatusCode, Value) {
        let res = self
            .client
            .post(format!("{}{}", self.base_url, path))
            .json(&body)
            .send()
            .await
            .unwrap();
        let status = res.status();
        (status, res.json().await.unwrap_or(Value::Null))
    }

    async fn get(&self, path: &str) -> (StatusCode, Value) {
        let res = self
            .client
            .get(format!("{}{}", self.base_url, path))
            .send()
            .await
            .unwrap();
        let status = res.status();
        (status, res.json().await.unwrap_or(Value::Null))
    }

    /// Two lines: 10 @ 5 and 5 @ 20 (total 150).
    async fn create_order(&self) -> Value {
        let (status, body) = self
            .post(
                "/orders",
                json!({
                    "supplier_id": "0190a5a4-3c5e-7a1b-9a4e-1f2d3c4b5a60",
                    "created_by": "0190a5a4-3c5e-7a1b-9a4e-1f2d3c4b5a61",
                    "notes": "restock",
                    "items": [
                        { "product_id": "0190a5a4-3c5e-7a1b-9a4e-1f2d3c4b5a62", "quantity": 10, "unit_price": "5" },
                        { "product_id": "0190a5a4-3c5e-7a1b-9a4e-1f2d3c4b5a63", "quantity": 5, "unit_price": "20" }
                    ]
                }),
            )
            .await;
        assert_eq!(status, StatusCode::CREATED, "{body}");
        body
    }

    async fn approved_order(&self) -> Value {
        let order = self.create_order().await;
        let id = order["id"].as_str().unwrap();
        let (status, body) = self.post(&format!("/orders/{id}/approve"), json!({})).await;
        assert_eq!(status, StatusCode::OK, "{body}");
        body
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

#[tokio::test]
async fn health_is_public() {
    let srv = TestServer::spawn().await;
    let res = srv
        .client
        .get(format!("{}/health", srv.base_url))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
}

#[tokio::test]
async fn order_lifecycle_over_http() {
    let srv = TestServer::spawn().await;

    let order = srv.create_order().await;
    assert_eq!(order["status"], "DRAFT");
    assert_eq!(order["total_amount"], "150");
    let id = order["id"].as_str().unwrap().to_string();
    let item_a = order["items"][0]["id"].as_str().unwrap().to_string();
    let item_b = order["items"][1]["id"].as_str().unwrap().to_string();

    let (status, approved) = srv.post(&format!("/orders/{id}/approve"), json!({})).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(approved["status"], "APPROVED");

    let (status, first) = srv.post(&format!("/orders/{id}/payments"), json!({})).await;
    assert_eq!(status, StatusCode::CREATED, "{first}");
    assert_eq!(first["reused"], false);
    assert_eq!(first["payment"]["status"], "PENDING");
    let secret = first["payment"]["client_secret"].clone();
    let intent_id = first["payment"]["external_intent_id"].as_str().unwrap().to_string();

    let (status, again) = srv.post(&format!("/orders/{id}/payments"), json!({})).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(again["reused"], true);
    assert_eq!(again["payment"]["client_secret"], secret);

    let (status, hook) = srv
        .post(
            "/webhooks/gateway",
            json!({ "intent_id": intent_id, "status": "succeeded" }),
        )
        .await;
    assert_eq!(status, StatusCode::OK, "{hook}");
    assert_eq!(hook["order"]["status"], "PAID");
    assert_eq!(hook["payment"]["status"], "SUCCEEDED");

    let (status, settled) = srv.post(&format!("/orders/{id}/payments"), json!({})).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(settled["status"], "already_paid");

    let receipt_path = format!("/orders/{id}/items/{item_a}/receipts");
    let (status, applied) = srv
        .post(&receipt_path, json!({ "quantity": 10, "receipt_id": "grn-1" }))
        .await;
    assert_eq!(status, StatusCode::CREATED, "{applied}");
    assert_eq!(applied["outcome"], "applied");
    assert_eq!(applied["entry"]["new_stock"], 10);

    let (status, replay) = srv
        .post(&receipt_path, json!({ "quantity": 10, "receipt_id": "grn-1" }))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(replay["outcome"], "duplicate");

    let (status, done) = srv
        .post(&format!("/orders/{id}/items/{item_b}/receipts"), json!({ "quantity": 5 }))
        .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(done["order"]["status"], "RECEIVED");

    let (status, closed) = srv.post(&format!("/orders/{id}/close"), json!({})).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(closed["status"], "CLOSED");

    let (status, err) = srv.post(&receipt_path, json!({ "quantity": 1 })).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(err["error"], "invalid_transition");
}

#[tokio::test]
async fn concurrent_initiations_share_one_intent() {
    let srv = TestServer::spawn().await;
    let order = srv.approved_order().await;
    let url = format!("{}/orders/{}/payments", srv.base_url, order["id"].as_str().unwrap());

    let mut tasks = Vec::new();
    for _ in 0..8 {
        let client = srv.client.clone();
        let url = url.clone();
        tasks.push(tokio::spawn(async move {
            let res = client.post(url).json(&json!({})).send().await.unwrap();
            assert!(res.status().is_success());
            let body: Value = res.json().await.unwrap();
            body["payment"]["client_secret"].as_str().unwrap().to_string()
        }));
    }

    let mut secrets = Vec::new();
    for task in tasks {
        secrets.push(task.await.unwrap());
    }
    secrets.dedup();
    assert_eq!(secrets.len(), 1);

    let (_, payments) = srv
        .get(&format!("/orders/{}/payments", order["id"].as_str().unwrap()))
        .await;
    assert_eq!(payments.as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn cancel_releases_open_intent() {
    let srv = TestServer::spawn().await;
    let order = srv.approved_order().await;
    let id = order["id"].as_str().unwrap();

    let (status, _) = srv.post(&format!("/orders/{id}/payments"), json!({})).await;
    assert_eq!(status, StatusCode::CREATED);

    let (status, cancelled) = srv.post(&format!("/orders/{id}/cancel"), json!({})).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(cancelled["status"], "CANCELLED");

    let (_, payments) = srv.get(&format!("/orders/{id}/payments")).await;
    assert_eq!(payments[0]["status"], "CANCELED");

    let (status, _) = srv.post(&format!("/orders/{id}/payments"), json!({})).await;
    assert_eq!(status, StatusCode::CONFLICT);
}

#[tokio::test]
async fn errors_map_to_status_codes() {
    let srv = TestServer::spawn().await;

    let (status, body) = srv.get("/orders/not-a-uuid").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "invalid_id");

    let (status, body) = srv.get("/orders/0190a5a4-3c5e-7a1b-9a4e-000000000000").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"], "not_found");

    let (status, body) = srv
        .post(
            "/orders",
            json!({
                "supplier_id": "0190a5a4-3c5e-7a1b-9a4e-1f2d3c4b5a60",
                "created_by": "0190a5a4-3c5e-7a1b-9a4e-1f2d3c4b5a61",
                "items": []
            }),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "validation_error");

    let draft = srv.create_order().await;
    let id = draft["id"].as_str().unwrap();
    let (status, body) = srv.post(&format!("/orders/{id}/close"), json!({})).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["error"], "invalid_transition");

    let (status, grown) = srv
        .post(
            &format!("/orders/{id}/items"),
            json!({ "product_id": "0190a5a4-3c5e-7a1b-9a4e-1f2d3c4b5a64", "quantity": 2, "unit_price": 1.5 }),
        )
        .await;
    assert_eq!(status, StatusCode::OK, "{grown}");
    assert_eq!(grown["items"].as_array().unwrap().len(), 3);

    let (status, body) = srv
        .post(
            "/webhooks/gateway",
            json!({ "intent_id": "pi_missing", "status": "succeeded" }),
        )
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"], "not_found");
}

#[tokio::test]
async fn over_receipt_is_unprocessable() {
    let srv = TestServer::spawn().await;
    let order = srv.approved_order().await;
    let id = order["id"].as_str().unwrap();
    let item = order["items"][1]["id"].as_str().unwrap();

    let (_, created) = srv.post(&format!("/orders/{id}/payments"), json!({})).await;
    let payment_id = created["payment"]["id"].as_str().unwrap();
    let (status, reconciled) = srv
        .post(
            &format!("/payments/{payment_id}/reconcile"),
            json!({ "status": "succeeded" }),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(reconciled["applied"], true);

    let (status, body) = srv
        .post(&format!("/orders/{id}/items/{item}/receipts"), json!({ "quantity": 6 }))
        .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(body["error"], "over_receipt");

    let (_, current) = srv.get(&format!("/orders/{id}")).await;
    assert_eq!(current["items"][1]["received_qty"], 0);
    assert_eq!(current["status"], "PAID");
}
