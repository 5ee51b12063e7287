//! HTTP router assembly.

use axum::{
    Router,
    extract::DefaultBodyLimit,
    middleware as axum_middleware,
    routing::{get, post},
};
use tower_http::trace::TraceLayer;

use crate::{handlers, middleware, state::AppState};

/// Build the full application router.
///
/// - Public: `GET /`, `GET /health`
/// - Authenticated (API key + daily quota): conversion, usage, admin routes
pub fn build_router(state: AppState) -> Router {
    let authenticated_routes = Router::new()
        .route(
            "/convert",
            post(handlers::convert::convert_media)
                .layer(DefaultBodyLimit::max(state.max_upload_bytes)),
        )
        .route("/api/v1/usage", get(handlers::usage::get_usage))
        .route(
            "/api/v1/admin/keys",
            get(handlers::admin::list_keys).post(handlers::admin::create_key),
        )
        .route(
            "/api/v1/admin/keys/{hashed_key}/revoke",
            post(handlers::admin::revoke_key),
        )
        .route(
            "/api/v1/admin/keys/{hashed_key}/usage",
            get(handlers::admin::key_usage),
        )
        // Apply authentication middleware to all routes in this group
        .route_layer(axum_middleware::from_fn_with_state(
            state.clone(),
            middleware::auth::auth_middleware,
        ));

    Router::new()
        // Public routes (no authentication required)
        .route("/", get(handlers::health::root))
        .route("/health", get(handlers::health::health_check))
        .merge(authenticated_routes)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::db::test_pool;
    use crate::models::api_key::{NewApiKey, Permissions};
    use crate::services::credential_store::hash_api_key;
    use axum::{
        body::{Body, to_bytes},
        http::{Request, StatusCode},
        response::Response,
    };
    use serde_json::Value;
    use tower::ServiceExt;

    async fn app_with(config: Config) -> (Router, AppState) {
        let state = AppState::new(test_pool().await, &config);
        for (raw, permissions, rate_limit) in [
            ("sk_test_12345", "convert", Some(1000)),
            ("sk_prod_67890", "convert", Some(1)),
            ("sk_admin_99999", "convert,admin", None),
            ("sk_revoked_000", "convert", Some(10)),
        ] {
            state
                .credentials
                .insert(&NewApiKey {
                    hashed_key: hash_api_key(raw),
                    user_id: None,
                    permissions: Permissions::parse(permissions),
                    rate_limit,
                })
                .await
                .unwrap();
        }
        state
            .credentials
            .revoke(&hash_api_key("sk_revoked_000"))
            .await
            .unwrap();
        (build_router(state.clone()), state)
    }

    async fn app() -> (Router, AppState) {
        app_with(Config::default()).await
    }

    async fn send(router: &Router, request: Request<Body>) -> Response {
        router.clone().oneshot(request).await.unwrap()
    }

    fn get_with_key(uri: &str, key: &str) -> Request<Body> {
        Request::builder()
            .uri(uri)
            .header("X-Api-Key", key)
            .body(Body::empty())
            .unwrap()
    }

    async fn json_body(response: Response) -> Value {
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn public_routes_need_no_key() {
        let (router, _) = app().await;

        let response = send(&router, Request::get("/").body(Body::empty()).unwrap()).await;
        assert_eq!(response.status(), StatusCode::OK);

        let response = send(&router, Request::get("/health").body(Body::empty()).unwrap()).await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(json_body(response).await["database"], "connected");
    }

    #[tokio::test]
    async fn missing_and_unknown_keys_are_unauthorized() {
        let (router, _) = app().await;

        let response = send(&router, Request::get("/api/v1/usage").body(Body::empty()).unwrap()).await;
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

        let response = send(&router, get_with_key("/api/v1/usage", "sk_nope")).await;
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(json_body(response).await["error"]["code"], "invalid_api_key");
    }

    #[tokio::test]
    async fn revoked_key_message_is_distinct_unless_unified() {
        let (router, _) = app().await;
        let response = send(&router, get_with_key("/api/v1/usage", "sk_revoked_000")).await;
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(json_body(response).await["error"]["message"], "API key revoked");

        let (router, _) = app_with(Config {
            unify_auth_errors: true,
            ..Config::default()
        })
        .await;
        let response = send(&router, get_with_key("/api/v1/usage", "sk_revoked_000")).await;
        let body = json_body(response).await;
        assert_eq!(body["error"]["code"], "invalid_api_key");
        assert_eq!(body["error"]["message"], "Invalid API key");
    }

    #[tokio::test]
    async fn single_request_key_gets_429_with_retry_after() {
        let (router, _) = app().await;

        let first = send(&router, get_with_key("/api/v1/usage", "sk_prod_67890")).await;
        assert_eq!(first.status(), StatusCode::OK);
        assert_eq!(first.headers()["x-ratelimit-remaining"], "0");
        let body = json_body(first).await;
        assert_eq!(body["usage_count"], 1);
        assert_eq!(body["usage_remaining"], 0);

        let second = send(&router, get_with_key("/api/v1/usage", "sk_prod_67890")).await;
        assert_eq!(second.status(), StatusCode::TOO_MANY_REQUESTS);
        assert!(second.headers().contains_key("retry-after"));
        assert_eq!(second.headers()["x-ratelimit-limit"], "1");
        assert_eq!(json_body(second).await["error"]["code"], "quota_exceeded");
    }

    #[tokio::test]
    async fn bearer_header_is_accepted() {
        let (router, _) = app().await;
        let request = Request::get("/api/v1/usage")
            .header("Authorization", "Bearer sk_test_12345")
            .body(Body::empty())
            .unwrap();
        let response = send(&router, request).await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers()["x-ratelimit-remaining"], "999");
    }

    #[tokio::test]
    async fn storage_outage_is_a_server_error_not_an_auth_failure() {
        let (router, state) = app().await;
        state.pool.close().await;

        let response = send(&router, get_with_key("/api/v1/usage", "sk_test_12345")).await;
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(json_body(response).await["error"]["code"], "internal_error");
    }

    #[tokio::test]
    async fn admin_routes_require_admin_permission() {
        let (router, _) = app().await;
        let response = send(&router, get_with_key("/api/v1/admin/keys", "sk_test_12345")).await;
        assert_eq!(response.status(), StatusCode::FORBIDDEN);

        let response = send(&router, get_with_key("/api/v1/admin/keys", "sk_admin_99999")).await;
        assert_eq!(response.status(), StatusCode::OK);
        assert!(response.headers().get("x-ratelimit-remaining").is_none());
        assert_eq!(json_body(response).await.as_array().unwrap().len(), 4);
    }

    #[tokio::test]
    async fn admin_can_create_use_and_revoke_a_key() {
        let (router, _) = app().await;

        let create = Request::post("/api/v1/admin/keys")
            .header("X-Api-Key", "sk_admin_99999")
            .header("Content-Type", "application/json")
            .body(Body::from(r#"{"permissions":["convert"],"rate_limit":2}"#))
            .unwrap();
        let response = send(&router, create).await;
        assert_eq!(response.status(), StatusCode::CREATED);
        let body = json_body(response).await;
        let raw = body["api_key"].as_str().unwrap().to_string();
        let hashed = body["hashed_key"].as_str().unwrap().to_string();
        assert_eq!(hashed, hash_api_key(&raw));

        let response = send(&router, get_with_key("/api/v1/usage", &raw)).await;
        assert_eq!(response.status(), StatusCode::OK);

        let history = send(
            &router,
            get_with_key(&format!("/api/v1/admin/keys/{hashed}/usage"), "sk_admin_99999"),
        )
        .await;
        assert_eq!(history.status(), StatusCode::OK);
        assert_eq!(json_body(history).await[0]["usage_count"], 1);

        let revoke = Request::post(format!("/api/v1/admin/keys/{hashed}/revoke"))
            .header("X-Api-Key", "sk_admin_99999")
            .body(Body::empty())
            .unwrap();
        assert_eq!(send(&router, revoke).await.status(), StatusCode::NO_CONTENT);

        let response = send(&router, get_with_key("/api/v1/usage", &raw)).await;
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn admin_rejects_non_positive_rate_limit() {
        let (router, _) = app().await;
        let create = Request::post("/api/v1/admin/keys")
            .header("X-Api-Key", "sk_admin_99999")
            .header("Content-Type", "application/json")
            .body(Body::from(r#"{"rate_limit":0}"#))
            .unwrap();
        assert_eq!(send(&router, create).await.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn convert_without_file_is_bad_request() {
        let (router, _) = app().await;
        let boundary = "XBOUNDARY";
        let body = format!(
            "--{boundary}\r\nContent-Disposition: form-data; name=\"output_format\"\r\n\r\nwav\r\n--{boundary}--\r\n"
        );
        let request = Request::post("/convert")
            .header("X-Api-Key", "sk_test_12345")
            .header("Content-Type", format!("multipart/form-data; boundary={boundary}"))
            .body(Body::from(body))
            .unwrap();
        assert_eq!(send(&router, request).await.status(), StatusCode::BAD_REQUEST);
    }
}
