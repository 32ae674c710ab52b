//! Integration tests for the API server.

use std::sync::{Arc, OnceLock};

use api::AppState;
use api::config::Config;
use axum::body::Body;
use axum::http::{Request, Response, StatusCode};
use common::{IdempotencyKey, Money, Partner, PartnerId};
use idempotency::{IdempotencyGuard, InMemoryIdempotencyStore};
use metrics_exporter_prometheus::PrometheusHandle;
use serde_json::{Value, json};
use store::{InMemoryOrderStore, InMemoryPartnerStore, PartnerStore};
use tower::ServiceExt;

type State = Arc<AppState<InMemoryPartnerStore, InMemoryOrderStore>>;

static METRICS_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

fn get_metrics_handle() -> PrometheusHandle {
    METRICS_HANDLE
        .get_or_init(|| {
            let builder = metrics_exporter_prometheus::PrometheusBuilder::new();
            builder
                .install_recorder()
                .expect("failed to install Prometheus recorder")
        })
        .clone()
}

/// App over in-memory stores with one partner (limit 1000.00, fully available).
async fn setup() -> (axum::Router, State, PartnerId) {
    let config = Config {
        credit_cache_ttl: std::time::Duration::ZERO,
        ..Config::default()
    };
    let partners = InMemoryPartnerStore::new();
    let partner = partners
        .save(Partner::new(
            "P-001",
            "Acme Corp",
            "billing@acme.test",
            Money::from_cents(100_000),
        ))
        .await
        .unwrap();

    let state = api::build_state(partners, InMemoryOrderStore::new(), &config);
    let guard = IdempotencyGuard::new(InMemoryIdempotencyStore::new(), config.guard_config());
    let app = api::create_app(state.clone(), guard, get_metrics_handle(), "memory");
    (app, state, partner.id)
}

async fn body_json(response: Response<Body>) -> Value {
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&body).unwrap()
}

fn order_body(partner_id: PartnerId, price_cents: i64) -> Value {
    json!({
        "partner-id": partner_id.to_string(),
        "items": [{
            "code": "SKU-001",
            "name": "Widget",
            "quantity": 2,
            "price-cents": price_cents
        }]
    })
}

fn create_request(key: Option<&str>, body: &Value) -> Request<Body> {
    let mut builder = Request::builder()
        .method("POST")
        .uri("/v1/orders")
        .header("content-type", "application/json");
    if let Some(key) = key {
        builder = builder.header("X-Idempotency-Key", key);
    }
    builder.body(Body::from(body.to_string())).unwrap()
}

fn request(method: &str, uri: &str) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .body(Body::empty())
        .unwrap()
}

async fn create_order(app: &axum::Router, partner_id: PartnerId, price_cents: i64) -> String {
    let key = IdempotencyKey::new().to_string();
    let response = app
        .clone()
        .oneshot(create_request(Some(&key), &order_body(partner_id, price_cents)))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CREATED);
    body_json(response).await["body"]["id"]
        .as_str()
        .unwrap()
        .to_string()
}

async fn available_cents(app: &axum::Router, partner_id: PartnerId) -> i64 {
    let response = app
        .clone()
        .oneshot(request("GET", &format!("/v1/partners/{partner_id}/credit")))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    body_json(response).await["body"]["available-credit-cents"]
        .as_i64()
        .unwrap()
}

#[tokio::test]
async fn test_health_check() {
    let (app, _, _) = setup().await;

    let response = app.oneshot(request("GET", "/health")).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let json = body_json(response).await;
    assert_eq!(json["status"], "ok");
    assert_eq!(json["storage"], "memory");
}

#[tokio::test]
async fn test_metrics_endpoint() {
    let (app, _, partner_id) = setup().await;
    create_order(&app, partner_id, 1_000).await;
    app.clone()
        .oneshot(create_request(None, &order_body(partner_id, 1_000)))
        .await
        .unwrap();

    let response = app.oneshot(request("GET", "/metrics")).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let text = String::from_utf8(body.to_vec()).unwrap();
    assert!(text.contains("orders_created_total"));
    assert!(text.contains("api_errors_total"));
}

mod create {
    use super::*;

    #[tokio::test]
    async fn test_create_order() {
        let (app, _, partner_id) = setup().await;
        let key = IdempotencyKey::new().to_string();

        let response = app
            .oneshot(create_request(Some(&key), &order_body(partner_id, 12_550)))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::CREATED);
        assert!(response.headers().get("x-idempotency-replayed").is_none());
        let json = body_json(response).await;
        assert_eq!(json["status"], "SUCCESS");
        assert_eq!(json["body"]["status"], "PENDING");
        assert_eq!(json["body"]["total-value-cents"], 25_100);
        assert_eq!(json["body"]["partner-id"], partner_id.to_string());
        assert_eq!(json["body"]["items"][0]["subtotal-cents"], 25_100);
    }

    #[tokio::test]
    async fn test_missing_key_is_rejected() {
        let (app, state, partner_id) = setup().await;

        let response = app
            .oneshot(create_request(None, &order_body(partner_id, 100)))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let json = body_json(response).await;
        assert_eq!(json["status"], "ERROR");
        assert_eq!(json["error-code"], "E001");
        assert_eq!(state.orders.orders().order_count().await, 0);
    }

    #[tokio::test]
    async fn test_malformed_key_is_rejected() {
        let (app, _, partner_id) = setup().await;

        let response = app
            .oneshot(create_request(Some("not-a-uuid"), &order_body(partner_id, 100)))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(body_json(response).await["error-code"], "E001");
    }

    #[tokio::test]
    async fn test_same_key_replays_first_response() {
        let (app, state, partner_id) = setup().await;
        let key = IdempotencyKey::new().to_string();

        let first = app
            .clone()
            .oneshot(create_request(Some(&key), &order_body(partner_id, 100)))
            .await
            .unwrap();
        assert_eq!(first.status(), StatusCode::CREATED);
        let first_json = body_json(first).await;

        // A different payload under the same key still replays the first result.
        let second = app
            .oneshot(create_request(Some(&key), &order_body(partner_id, 999)))
            .await
            .unwrap();
        assert_eq!(second.status(), StatusCode::CREATED);
        assert_eq!(second.headers()["x-idempotency-replayed"], "true");
        let second_json = body_json(second).await;

        assert_eq!(first_json, second_json);
        assert_eq!(state.orders.orders().order_count().await, 1);
    }

    #[tokio::test]
    async fn test_concurrent_duplicates_create_one_order() {
        let (app, state, partner_id) = setup().await;
        let key = IdempotencyKey::new().to_string();

        let requests = (0..5).map(|_| {
            let app = app.clone();
            let req = create_request(Some(&key), &order_body(partner_id, 100));
            async move { app.oneshot(req).await.unwrap() }
        });
        let responses = futures_util::future::join_all(requests).await;

        let mut ids = Vec::new();
        for response in responses {
            assert_eq!(response.status(), StatusCode::CREATED);
            ids.push(body_json(response).await["body"]["id"].clone());
        }
        ids.dedup();
        assert_eq!(ids.len(), 1);
        assert_eq!(state.orders.orders().order_count().await, 1);
    }

    #[tokio::test]
    async fn test_failures_are_not_cached() {
        let (app, _, partner_id) = setup().await;
        let key = IdempotencyKey::new().to_string();

        // 2 x 600.00 exceeds the 1000.00 available.
        let rejected = app
            .clone()
            .oneshot(create_request(Some(&key), &order_body(partner_id, 60_000)))
            .await
            .unwrap();
        assert_eq!(rejected.status(), StatusCode::BAD_REQUEST);
        assert_eq!(body_json(rejected).await["error-code"], "E002");

        let retried = app
            .oneshot(create_request(Some(&key), &order_body(partner_id, 100)))
            .await
            .unwrap();
        assert_eq!(retried.status(), StatusCode::CREATED);
        assert!(retried.headers().get("x-idempotency-replayed").is_none());
    }

    #[tokio::test]
    async fn test_unknown_partner() {
        let (app, _, _) = setup().await;
        let key = IdempotencyKey::new().to_string();

        let response = app
            .oneshot(create_request(Some(&key), &order_body(PartnerId::new(), 100)))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert_eq!(body_json(response).await["error-code"], "E007");
    }

    #[tokio::test]
    async fn test_overflowing_total_is_rejected() {
        let (app, state, partner_id) = setup().await;
        let key = IdempotencyKey::new().to_string();
        let body = json!({
            "partner-id": partner_id.to_string(),
            "items": [{
                "code": "SKU-001",
                "name": "Widget",
                "quantity": 4,
                "price-cents": 1_i64 << 62
            }]
        });

        let response = app.oneshot(create_request(Some(&key), &body)).await.unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(body_json(response).await["error-code"], "E009");
        assert_eq!(state.orders.orders().order_count().await, 0);
    }

    #[tokio::test]
    async fn test_invalid_body() {
        let (app, _, partner_id) = setup().await;
        let key = IdempotencyKey::new().to_string();

        let malformed = app
            .clone()
            .oneshot(create_request(Some(&key), &json!({"items": "nope"})))
            .await
            .unwrap();
        assert_eq!(malformed.status(), StatusCode::BAD_REQUEST);
        assert_eq!(body_json(malformed).await["error-code"], "E009");

        let no_items = app
            .oneshot(create_request(
                Some(&key),
                &json!({"partner-id": partner_id.to_string(), "items": []}),
            ))
            .await
            .unwrap();
        assert_eq!(no_items.status(), StatusCode::BAD_REQUEST);
        assert_eq!(body_json(no_items).await["error-code"], "E009");
    }
}

mod lifecycle {
    use super::*;

    fn status_request(order_id: &str, status: &str) -> Request<Body> {
        request("PATCH", &format!("/v1/orders/{order_id}/status?status={status}"))
    }

    #[tokio::test]
    async fn test_approve_and_cancel_moves_credit() {
        let (app, _, partner_id) = setup().await;
        let order_id = create_order(&app, partner_id, 12_500).await;
        assert_eq!(available_cents(&app, partner_id).await, 100_000);

        let approved = app
            .clone()
            .oneshot(status_request(&order_id, "APPROVED"))
            .await
            .unwrap();
        assert_eq!(approved.status(), StatusCode::OK);
        assert_eq!(body_json(approved).await["body"]["status"], "APPROVED");
        assert_eq!(available_cents(&app, partner_id).await, 75_000);

        let canceled = app
            .clone()
            .oneshot(request("DELETE", &format!("/v1/orders/{order_id}")))
            .await
            .unwrap();
        assert_eq!(canceled.status(), StatusCode::NO_CONTENT);
        assert_eq!(available_cents(&app, partner_id).await, 100_000);

        let fetched = app
            .oneshot(request("GET", &format!("/v1/orders/{order_id}")))
            .await
            .unwrap();
        assert_eq!(body_json(fetched).await["body"]["status"], "CANCELED");
    }

    #[tokio::test]
    async fn test_status_is_case_insensitive() {
        let (app, _, partner_id) = setup().await;
        let order_id = create_order(&app, partner_id, 100).await;

        let response = app
            .oneshot(status_request(&order_id, "approved"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_invalid_transition() {
        let (app, _, partner_id) = setup().await;
        let order_id = create_order(&app, partner_id, 100).await;

        let response = app
            .clone()
            .oneshot(status_request(&order_id, "SHIPPED"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(body_json(response).await["error-code"], "E003");

        let fetched = app
            .oneshot(request("GET", &format!("/v1/orders/{order_id}")))
            .await
            .unwrap();
        assert_eq!(body_json(fetched).await["body"]["status"], "PENDING");
    }

    #[tokio::test]
    async fn test_unknown_status_value() {
        let (app, _, partner_id) = setup().await;
        let order_id = create_order(&app, partner_id, 100).await;

        let response = app
            .oneshot(status_request(&order_id, "LOST"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(body_json(response).await["error-code"], "E009");
    }

    #[tokio::test]
    async fn test_approval_without_credit() {
        let (app, _, partner_id) = setup().await;
        let first = create_order(&app, partner_id, 40_000).await;
        let second = create_order(&app, partner_id, 40_000).await;

        let ok = app
            .clone()
            .oneshot(status_request(&first, "APPROVED"))
            .await
            .unwrap();
        assert_eq!(ok.status(), StatusCode::OK);

        let rejected = app
            .oneshot(status_request(&second, "APPROVED"))
            .await
            .unwrap();
        assert_eq!(rejected.status(), StatusCode::BAD_REQUEST);
        assert_eq!(body_json(rejected).await["error-code"], "E002");
    }

    #[tokio::test]
    async fn test_order_not_found() {
        let (app, _, _) = setup().await;
        let missing = uuid::Uuid::new_v4();

        let get = app
            .clone()
            .oneshot(request("GET", &format!("/v1/orders/{missing}")))
            .await
            .unwrap();
        assert_eq!(get.status(), StatusCode::NOT_FOUND);
        assert_eq!(body_json(get).await["error-code"], "E008");

        let delete = app
            .oneshot(request("DELETE", &format!("/v1/orders/{missing}")))
            .await
            .unwrap();
        assert_eq!(delete.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_malformed_order_id() {
        let (app, _, _) = setup().await;

        let response = app
            .oneshot(request("GET", "/v1/orders/not-a-uuid"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(body_json(response).await["error-code"], "E009");
    }
}

mod search {
    use super::*;

    #[tokio::test]
    async fn test_search_paginates() {
        let (app, _, partner_id) = setup().await;
        for price in [100, 200, 300] {
            create_order(&app, partner_id, price).await;
        }

        let response = app
            .oneshot(request(
                "GET",
                &format!(
                    "/v1/orders?partner-id={partner_id}&size=2&sort-by=totalValue&sort-direction=ASC"
                ),
            ))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let json = body_json(response).await;
        assert_eq!(json["pagination"]["total-items"], 3);
        assert_eq!(json["pagination"]["total-pages"], 2);
        assert_eq!(json["pagination"]["current-page"], 1);
        let totals: Vec<i64> = json["body"]
            .as_array()
            .unwrap()
            .iter()
            .map(|o| o["total-value-cents"].as_i64().unwrap())
            .collect();
        assert_eq!(totals, vec![200, 400]);
    }

    #[tokio::test]
    async fn test_search_by_status() {
        let (app, _, partner_id) = setup().await;
        create_order(&app, partner_id, 100).await;
        let approved = create_order(&app, partner_id, 100).await;
        app.clone()
            .oneshot(request(
                "PATCH",
                &format!("/v1/orders/{approved}/status?status=APPROVED"),
            ))
            .await
            .unwrap();

        let response = app
            .oneshot(request("GET", "/v1/orders?status=APPROVED"))
            .await
            .unwrap();

        let json = body_json(response).await;
        assert_eq!(json["pagination"]["total-items"], 1);
        assert_eq!(json["body"][0]["id"], approved.as_str());
    }

    #[tokio::test]
    async fn test_search_rejects_huge_page() {
        let (app, _, partner_id) = setup().await;
        create_order(&app, partner_id, 100).await;

        let response = app
            .oneshot(request("GET", &format!("/v1/orders?page={}", u64::MAX)))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(body_json(response).await["error-code"], "E009");
    }

    #[tokio::test]
    async fn test_search_rejects_bad_filter() {
        let (app, _, _) = setup().await;

        let response = app
            .oneshot(request("GET", "/v1/orders?start-date=yesterday"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(body_json(response).await["error-code"], "E009");
    }
}

mod partners {
    use super::*;

    fn limit_request(partner_id: PartnerId, cents: i64) -> Request<Body> {
        Request::builder()
            .method("PUT")
            .uri(format!("/v1/partners/{partner_id}/credit-limit"))
            .header("content-type", "application/json")
            .body(Body::from(json!({ "credit-limit-cents": cents }).to_string()))
            .unwrap()
    }

    #[tokio::test]
    async fn test_get_credit() {
        let (app, _, partner_id) = setup().await;

        let response = app
            .oneshot(request("GET", &format!("/v1/partners/{partner_id}/credit")))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let json = body_json(response).await;
        assert_eq!(json["body"]["partner-code"], "P-001");
        assert_eq!(json["body"]["credit-limit-cents"], 100_000);
        assert_eq!(json["body"]["used-credit-cents"], 0);
    }

    #[tokio::test]
    async fn test_update_limit_keeps_used_credit() {
        let (app, _, partner_id) = setup().await;
        let order_id = create_order(&app, partner_id, 35_000).await;
        app.clone()
            .oneshot(request(
                "PATCH",
                &format!("/v1/orders/{order_id}/status?status=APPROVED"),
            ))
            .await
            .unwrap();

        let response = app
            .oneshot(limit_request(partner_id, 50_000))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let json = body_json(response).await;
        assert_eq!(json["body"]["credit-limit-cents"], 50_000);
        assert_eq!(json["body"]["available-credit-cents"], 0);
    }

    #[tokio::test]
    async fn test_negative_limit_is_rejected() {
        let (app, _, partner_id) = setup().await;

        let response = app.oneshot(limit_request(partner_id, -1)).await.unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(body_json(response).await["error-code"], "E009");
    }

    #[tokio::test]
    async fn test_unknown_partner_credit() {
        let (app, _, _) = setup().await;

        let response = app
            .oneshot(request("GET", &format!("/v1/partners/{}/credit", PartnerId::new())))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert_eq!(body_json(response).await["error-code"], "E007");
    }

    #[tokio::test]
    async fn test_seed_demo_partner_is_idempotent() {
        let partners = InMemoryPartnerStore::new();

        let first = api::seed_demo_partner(&partners).await.unwrap();
        let second = api::seed_demo_partner(&partners).await.unwrap();

        assert_eq!(first.id, second.id);
        assert_eq!(first.id.as_uuid(), api::DEMO_PARTNER_ID);
        assert_eq!(first.available_credit, Money::from_cents(1_000_000));
        assert_eq!(partners.partner_count().await, 1);
    }
}
