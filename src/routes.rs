//! HTTP router.
//!
//! - Public: `/health`, `POST /api/v1/webhook` (signature authenticated)
//! - Dashboard: `/api/v1/webhooks/...` behind account key authentication

use axum::{
    Router, middleware as axum_middleware,
    routing::{get, post},
};
use tower_http::trace::TraceLayer;

use crate::{handlers, middleware, state::AppState};

pub fn build_router(state: AppState) -> Router {
    let authenticated_routes = Router::new()
        .route(
            "/api/v1/webhooks",
            post(handlers::webhooks::create_webhook).get(handlers::webhooks::list_webhooks),
        )
        .route(
            "/api/v1/webhooks/{id}",
            get(handlers::webhooks::get_webhook)
                .patch(handlers::webhooks::update_webhook)
                .delete(handlers::webhooks::delete_webhook),
        )
        .route(
            "/api/v1/webhooks/{id}/executions",
            get(handlers::webhooks::list_executions),
        )
        .route(
            "/api/v1/webhooks/{id}/usage",
            get(handlers::webhooks::get_usage),
        )
        .route_layer(axum_middleware::from_fn_with_state(
            state.clone(),
            middleware::auth::auth_middleware,
        ));

    Router::new()
        .route("/health", get(handlers::health::health_check))
        .route("/api/v1/webhook", post(handlers::inbound::receive_webhook))
        .merge(authenticated_routes)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use axum::{
        body::{Body, to_bytes},
        http::{Request, StatusCode},
    };
    use chrono::{Duration, Utc};
    use serde_json::{Value, json};
    use tower::ServiceExt;
    use uuid::Uuid;

    use super::*;
    use crate::models::account_key::AccountKey;
    use crate::security::signature;
    use crate::security::vault::{CredentialVault, MasterKey, lookup_hash};
    use crate::services::executor::PaperExecutor;
    use crate::services::gateway::WebhookGateway;
    use crate::services::rate_limiter::{RateLimiter, RateLimits};
    use crate::store::memory::MemoryStore;

    const ACCOUNT_KEY: &str = "acct_test_key";

    fn app() -> Router {
        let store = Arc::new(MemoryStore::new());
        store.insert_account_key(AccountKey {
            id: Uuid::new_v4(),
            account_id: Uuid::new_v4(),
            key_hash: lookup_hash(ACCOUNT_KEY),
            label: "test".to_string(),
            created_at: Utc::now(),
            is_active: true,
        });

        let vault = Arc::new(CredentialVault::new(&MasterKey::generate().unwrap()).unwrap());
        let limiter = Arc::new(RateLimiter::new(store.clone(), RateLimits::default()));
        let gateway = Arc::new(WebhookGateway::new(
            store.clone(),
            vault.clone(),
            limiter.clone(),
            Arc::new(PaperExecutor),
            Duration::minutes(5),
        ));

        build_router(AppState {
            store,
            vault,
            limiter,
            gateway,
        })
    }

    async fn send(app: &Router, request: Request<Body>) -> (StatusCode, Value) {
        let response = app.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let body = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap()
        };
        (status, body)
    }

    fn dashboard(method: &str, uri: &str, body: Option<Value>) -> Request<Body> {
        let builder = Request::builder()
            .method(method)
            .uri(uri)
            .header("Authorization", format!("Bearer {}", ACCOUNT_KEY))
            .header("Content-Type", "application/json");
        match body {
            Some(body) => builder.body(Body::from(body.to_string())).unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        }
    }

    fn webhook(body: &Value) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri("/api/v1/webhook")
            .header("Content-Type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    async fn issue(app: &Router, policy: Value) -> Value {
        let (status, body) = send(
            app,
            dashboard(
                "POST",
                "/api/v1/webhooks",
                Some(json!({"name": "alerts", "policy": policy})),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        body
    }

    fn signed_order(issued: &Value, order: Value) -> Value {
        let mut body = order;
        body["apiKey"] = issued["publicId"].clone();
        body["timestamp"] = json!(Utc::now().timestamp());
        let secret = issued["secret"].as_str().unwrap();
        body["signature"] = json!(signature::sign(&body, secret).unwrap());
        body
    }

    #[tokio::test]
    async fn health_is_public() {
        let app = app();
        let request = Request::builder()
            .uri("/health")
            .body(Body::empty())
            .unwrap();
        let (status, body) = send(&app, request).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "healthy");
    }

    #[tokio::test]
    async fn dashboard_requires_account_key() {
        let app = app();
        let request = Request::builder()
            .uri("/api/v1/webhooks")
            .header("Authorization", "Bearer wrong")
            .body(Body::empty())
            .unwrap();
        let (status, body) = send(&app, request).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["error"]["code"], "invalid_api_key");
    }

    #[tokio::test]
    async fn secret_only_in_issue_response() {
        let app = app();
        let issued = issue(
            &app,
            json!({"maxOrderSize": 1000, "dailyLimit": 5000}),
        )
        .await;
        assert!(issued["secret"].is_string());
        assert!(issued["publicId"].as_str().unwrap().starts_with("whk_"));

        let (status, list) = send(&app, dashboard("GET", "/api/v1/webhooks", None)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(list.as_array().unwrap().len(), 1);
        assert!(list[0].get("secret").is_none());
        assert!(list[0].get("publicId").is_none());
    }

    #[tokio::test]
    async fn signed_order_executes() {
        let app = app();
        let issued = issue(
            &app,
            json!({
                "allowedSymbols": ["BTC"],
                "maxOrderSize": 5000,
                "dailyLimit": 10000,
                "requireStopLoss": true
            }),
        )
        .await;

        let order = signed_order(
            &issued,
            json!({
                "action": "buy",
                "symbol": "BTC",
                "quantity": 0.05,
                "price": 60000,
                "stopLoss": 58000
            }),
        );
        let (status, body) = send(&app, webhook(&order)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["success"], true);
        assert!(body["orderId"].is_string());

        let uri = format!("/api/v1/webhooks/{}/executions", issued["id"].as_str().unwrap());
        let (status, records) = send(&app, dashboard("GET", &uri, None)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(records[0]["status"], "success");

        let uri = format!("/api/v1/webhooks/{}/usage", issued["id"].as_str().unwrap());
        let (_, usage) = send(&app, dashboard("GET", &uri, None)).await;
        assert_eq!(usage.as_array().unwrap().len(), 3);
        assert_eq!(usage[0]["window"], "minute");
        assert_eq!(usage[0]["count"], 1);
    }

    #[tokio::test]
    async fn failure_status_codes() {
        let app = app();
        let issued = issue(
            &app,
            json!({"allowedSymbols": ["BTC"], "maxOrderSize": 1000, "dailyLimit": 5000}),
        )
        .await;

        let (status, body) = send(
            &app,
            Request::builder()
                .method("POST")
                .uri("/api/v1/webhook")
                .body(Body::from("not json"))
                .unwrap(),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["success"], false);

        let mut tampered = signed_order(
            &issued,
            json!({"action": "buy", "symbol": "BTC", "quantity": 1, "price": 10}),
        );
        tampered["price"] = json!(1);
        let (status, body) = send(&app, webhook(&tampered)).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["error"]["code"], "invalid_signature");

        let wrong_symbol = signed_order(
            &issued,
            json!({"action": "sell", "symbol": "ETH", "quantity": 1, "price": 10}),
        );
        let (status, body) = send(&app, webhook(&wrong_symbol)).await;
        assert_eq!(status, StatusCode::FORBIDDEN);
        assert_eq!(body["error"]["code"], "symbol_not_allowed");

        let too_big = signed_order(
            &issued,
            json!({"action": "buy", "symbol": "BTC", "quantity": 1, "price": 50000}),
        );
        let (status, body) = send(&app, webhook(&too_big)).await;
        assert_eq!(status, StatusCode::FORBIDDEN);
        assert_eq!(body["error"]["code"], "order_too_large");
    }

    #[tokio::test]
    async fn disabled_webhook_is_forbidden() {
        let app = app();
        let issued = issue(&app, json!({"maxOrderSize": 1000, "dailyLimit": 5000})).await;
        let uri = format!("/api/v1/webhooks/{}", issued["id"].as_str().unwrap());

        let (status, _) = send(&app, dashboard("DELETE", &uri, None)).await;
        assert_eq!(status, StatusCode::NO_CONTENT);

        let order = signed_order(
            &issued,
            json!({"action": "buy", "symbol": "BTC", "quantity": 1, "price": 10}),
        );
        let (status, body) = send(&app, webhook(&order)).await;
        assert_eq!(status, StatusCode::FORBIDDEN);
        assert_eq!(body["error"]["code"], "webhook_disabled");

        let (status, body) = send(
            &app,
            dashboard("PATCH", &uri, Some(json!({"enabled": true}))),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["enabled"], true);
        assert!(body.get("secret").is_none());
    }

    #[tokio::test]
    async fn rate_limited_request_gets_429() {
        let app = app();
        let issued = issue(&app, json!({"maxOrderSize": 1000, "dailyLimit": 1e9})).await;

        for _ in 0..10 {
            let order = signed_order(
                &issued,
                json!({"action": "buy", "symbol": "BTC", "quantity": 1, "price": 10}),
            );
            let (status, _) = send(&app, webhook(&order)).await;
            assert_eq!(status, StatusCode::OK);
        }

        let order = signed_order(
            &issued,
            json!({"action": "buy", "symbol": "BTC", "quantity": 1, "price": 10}),
        );
        let response = app.clone().oneshot(webhook(&order)).await.unwrap();
        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(response.headers()["X-RateLimit-Window"], "minute");
        assert!(response.headers().contains_key("Retry-After"));
    }
}
