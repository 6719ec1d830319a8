mod common;

use axum::{
    body::{to_bytes, Body},
    http::{header, Request, StatusCode},
    Router,
};
use common::*;
use serde_json::{json, Value};
use storefront_api::{app, models::OrderStatus};
use tower::ServiceExt;
use uuid::Uuid;

fn request(method: &str, uri: &str, tenant: Option<Uuid>, body: Option<Value>) -> Request<Body> {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(tenant_id) = tenant {
        builder = builder.header("x-tenant-id", tenant_id.to_string());
    }
    match body {
        Some(value) => builder
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(value.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    }
}

async fn json_body(response: axum::response::Response) -> Value {
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

async fn router_with_app() -> (Router, TestApp) {
    let test_app = spawn_app().await;
    (app(test_app.state.clone()), test_app)
}

#[tokio::test]
async fn health_reports_database_up() {
    let (router, _app) = router_with_app().await;

    let response = router
        .oneshot(request("GET", "/health", None, None))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = json_body(response).await;
    assert_eq!(body["status"], "ok");
    assert_eq!(body["database"], "up");
}

#[tokio::test]
async fn tenant_signup_and_lookup() {
    let (router, _app) = router_with_app().await;

    let response = router
        .clone()
        .oneshot(request(
            "POST",
            "/tenants",
            None,
            Some(json!({ "slug": "acme-pizza" })),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CREATED);
    let created = json_body(response).await;
    let tenant_id: Uuid = serde_json::from_value(created["id"].clone()).unwrap();

    let response = router
        .clone()
        .oneshot(request("GET", "/tenants/me", Some(tenant_id), None))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let me = json_body(response).await;
    assert_eq!(me["slug"], "acme-pizza");

    // public slug resolution
    let response = router
        .clone()
        .oneshot(request("GET", "/tenants/by-slug/acme-pizza", None, None))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let resolved = json_body(response).await;
    assert_eq!(resolved["id"].as_str().unwrap(), tenant_id.to_string());

    // duplicate slug conflicts
    let response = router
        .oneshot(request(
            "POST",
            "/tenants",
            None,
            Some(json!({ "slug": "acme-pizza" })),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CONFLICT);
}

#[tokio::test]
async fn tenant_header_is_required_for_scoped_routes() {
    let (router, app) = router_with_app().await;
    seed_tenant(&app.pool, "acme").await;

    let response = router
        .clone()
        .oneshot(request("GET", "/orders", None, None))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    // unknown tenant id is rejected too
    let response = router
        .oneshot(request("GET", "/orders", Some(Uuid::new_v4()), None))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn product_crud_stays_within_the_tenant() {
    let (router, app) = router_with_app().await;
    let acme = seed_tenant(&app.pool, "acme").await;
    let rival = seed_tenant(&app.pool, "rival").await;

    let response = router
        .clone()
        .oneshot(request(
            "POST",
            "/products",
            Some(acme.id),
            Some(json!({
                "name": "Margherita",
                "sku": "PZ-001",
                "price": 42.0,
                "currency": "BRL",
            })),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CREATED);
    let product = json_body(response).await;
    let product_id = product["id"].as_str().unwrap().to_string();

    // owner sees it
    let response = router
        .clone()
        .oneshot(request(
            "GET",
            &format!("/products/{}", product_id),
            Some(acme.id),
            None,
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    // the other tenant does not
    let response = router
        .clone()
        .oneshot(request(
            "GET",
            &format!("/products/{}", product_id),
            Some(rival.id),
            None,
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    // update and delete
    let response = router
        .clone()
        .oneshot(request(
            "PUT",
            &format!("/products/{}", product_id),
            Some(acme.id),
            Some(json!({ "price": 45.5 })),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let updated = json_body(response).await;
    assert_eq!(updated["price"], "45.5");

    let response = router
        .clone()
        .oneshot(request(
            "DELETE",
            &format!("/products/{}", product_id),
            Some(acme.id),
            None,
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NO_CONTENT);

    let response = router
        .oneshot(request("GET", "/products", Some(acme.id), None))
        .await
        .unwrap();
    let listing = json_body(response).await;
    assert_eq!(listing.as_array().unwrap().len(), 0);
}

#[tokio::test]
async fn order_lifecycle_over_http() {
    let (router, app) = router_with_app().await;
    let tenant = seed_tenant(&app.pool, "acme").await;

    let response = router
        .clone()
        .oneshot(request(
            "POST",
            "/orders",
            Some(tenant.id),
            Some(json!({
                "total_amount": 125.50,
                "currency": "brl",
                "customer_name": "Ana",
                "customer_email": "ana@example.com",
            })),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CREATED);
    let order = json_body(response).await;
    let order_id = order["id"].as_str().unwrap().to_string();
    assert!(order_id.starts_with("order-"));
    assert_eq!(order["status"], "draft");
    assert_eq!(order["currency"], "BRL");

    // draft -> pending_payment
    let response = router
        .clone()
        .oneshot(request(
            "POST",
            &format!("/orders/{}/status", order_id),
            Some(tenant.id),
            Some(json!({ "status": "pending_payment" })),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    // skipping ahead to delivered is rejected by the state machine
    let response = router
        .clone()
        .oneshot(request(
            "POST",
            &format!("/orders/{}/status", order_id),
            Some(tenant.id),
            Some(json!({ "status": "delivered" })),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    // list filtered by status
    let response = router
        .oneshot(request(
            "GET",
            "/orders?status=pending_payment",
            Some(tenant.id),
            None,
        ))
        .await
        .unwrap();
    let listing = json_body(response).await;
    assert_eq!(listing.as_array().unwrap().len(), 1);
    assert_eq!(listing[0]["id"], order_id.as_str());
}

#[tokio::test]
async fn rejected_order_validation_returns_400() {
    let (router, app) = router_with_app().await;
    let tenant = seed_tenant(&app.pool, "acme").await;

    let response = router
        .oneshot(request(
            "POST",
            "/orders",
            Some(tenant.id),
            Some(json!({ "total_amount": 0.0, "currency": "BRL" })),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn oauth_connect_flow_end_to_end() {
    let (router, app) = router_with_app().await;
    let tenant = seed_tenant(&app.pool, "acme").await;

    let response = router
        .clone()
        .oneshot(request(
            "GET",
            "/payments/oauth/start",
            Some(tenant.id),
            None,
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = json_body(response).await;
    let authorization_url = body["authorization_url"].as_str().unwrap().to_string();
    assert!(authorization_url.contains("client_id=client-id"));

    let state_param = url::Url::parse(&authorization_url)
        .unwrap()
        .query_pairs()
        .find(|(k, _)| k == "state")
        .map(|(_, v)| v.to_string())
        .unwrap();

    let response = router
        .clone()
        .oneshot(request(
            "GET",
            &format!(
                "/payments/oauth/callback?code=auth-code&state={}",
                state_param
            ),
            None,
            None,
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = json_body(response).await;
    assert_eq!(body["connected"], true);

    // replaying the same state must fail
    let response = router
        .oneshot(request(
            "GET",
            &format!(
                "/payments/oauth/callback?code=auth-code&state={}",
                state_param
            ),
            None,
            None,
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn webhook_endpoint_acknowledges_processed_and_ignored() {
    let (router, app) = router_with_app().await;
    let tenant = seed_tenant(&app.pool, "acme").await;
    seed_order(&app.pool, tenant.id, "order-42", OrderStatus::PendingPayment).await;
    connect_tenant(&app, tenant.id).await;
    app.processor.put_payment(processor_payment(
        "pay-1",
        storefront_api::models::ProcessorPaymentStatus::Approved,
        Some("order-42"),
    ));

    let response = router
        .clone()
        .oneshot(request(
            "POST",
            "/webhooks/payments",
            None,
            Some(json!({
                "type": "payment",
                "action": "payment.updated",
                "data": { "id": "pay-1" },
                "user_id": "acct-1",
            })),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = json_body(response).await;
    assert_eq!(body["outcome"], "processed");
    assert_eq!(body["order_status"], "paid");

    // non-payment topics are acknowledged without processing
    let response = router
        .clone()
        .oneshot(request(
            "POST",
            "/webhooks/payments",
            None,
            Some(json!({ "topic": "merchant_order", "data": { "id": "1" } })),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = json_body(response).await;
    assert_eq!(body["outcome"], "ignored");
}

#[tokio::test]
async fn webhook_endpoint_surfaces_retryable_failures() {
    let (router, app) = router_with_app().await;
    let tenant = seed_tenant(&app.pool, "acme").await;
    seed_order(&app.pool, tenant.id, "order-42", OrderStatus::PendingPayment).await;
    connect_tenant(&app, tenant.id).await;
    app.processor
        .fail_fetch
        .store(true, std::sync::atomic::Ordering::SeqCst);

    let response = router
        .oneshot(request(
            "POST",
            "/webhooks/payments",
            None,
            Some(json!({
                "type": "payment",
                "action": "payment.updated",
                "data": { "id": "pay-1" },
                "user_id": "acct-1",
            })),
        ))
        .await
        .unwrap();

    // 503 tells the provider to redeliver later
    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
}
