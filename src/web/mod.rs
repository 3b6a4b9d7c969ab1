//! The HTTP surface: application state, router, and server startup.

use std::sync::Arc;

use axum::Router;
use axum::extract::DefaultBodyLimit;
use axum::routing::{get, post};
use sea_orm::DatabaseConnection;
use sha2::{Digest, Sha256};
use tracing::{error, info};

use crate::cli::CliOptions;
use crate::constants::MAX_UPLOAD_BYTES;
use crate::openai::ImageClient;
use crate::storage::{ImageStore, StorageMode};
use crate::stripe::StripeClient;

mod billing;
mod images;

use billing::{
    checkout_handler, deduct_credits_handler, get_profile_handler, list_packages_handler,
    signup_handler, webhook_handler,
};
use images::{create_images_handler, get_image_handler};

/// Everything request handlers need, built once at startup.
#[derive(Clone, Debug)]
pub(crate) struct AppState {
    pub(crate) db: Arc<DatabaseConnection>,
    pub(crate) store: ImageStore,
    pub(crate) openai: ImageClient,
    pub(crate) stripe: Option<StripeClient>,
    /// hex SHA-256 of the shared app password, when the gate is enabled
    pub(crate) password_hash: Option<String>,
    pub(crate) webhook_secret: Option<String>,
    pub(crate) public_base_url: String,
}

impl AppState {
    fn new(
        db: DatabaseConnection,
        store: ImageStore,
        openai: ImageClient,
        stripe: Option<StripeClient>,
        app_password: Option<&str>,
        webhook_secret: Option<String>,
        public_base_url: &str,
    ) -> Self {
        let password_hash =
            app_password.map(|password| hex::encode(Sha256::digest(password.as_bytes())));
        Self {
            db: Arc::new(db),
            store,
            openai,
            stripe,
            password_hash,
            webhook_secret,
            public_base_url: public_base_url.trim_end_matches('/').to_string(),
        }
    }
}

fn create_router() -> Router<AppState> {
    Router::new()
        .route("/api/images", post(create_images_handler))
        .route("/api/image/{filename}", get(get_image_handler))
        .route("/api/packages", get(list_packages_handler))
        .route("/api/signup", post(signup_handler))
        .route("/api/profile/{user_id}", get(get_profile_handler))
        .route("/api/credits/deduct", post(deduct_credits_handler))
        .route("/api/stripe/checkout", post(checkout_handler))
        .route("/api/stripe/webhook", post(webhook_handler))
        .layer(DefaultBodyLimit::max(MAX_UPLOAD_BYTES))
}

/// Builds the application state from the CLI options and serves the API.
pub async fn setup_server(cli: &CliOptions, db: DatabaseConnection) -> Result<(), anyhow::Error> {
    let storage_mode: StorageMode = cli
        .storage_mode
        .parse()
        .map_err(|err: String| anyhow::anyhow!(err))?;
    let store = ImageStore::new(storage_mode, cli.image_dir.clone());
    let openai = ImageClient::new(
        cli.openai_api_key.clone(),
        cli.openai_api_base_url.clone(),
    );
    let stripe = cli.stripe_secret_key.clone().map(StripeClient::new);

    let state = AppState::new(
        db,
        store,
        openai,
        stripe,
        cli.app_password.as_deref(),
        cli.stripe_webhook_secret.clone(),
        &cli.public_base_url,
    );
    let app = create_router().with_state(state);

    let addr = format!("{}:{}", cli.listen_address, cli.port);
    info!("Starting server on http://{}", addr);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    if let Err(err) = axum::serve(listener, app).await {
        error!("Server error: {}", err);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    use axum::body::Body;
    use axum::http::{Request, StatusCode, header::CONTENT_TYPE};
    use http_body_util::BodyExt;
    use sea_orm_migration::MigratorTrait;
    use serde_json::{Value, json};
    use tower::ServiceExt;

    use crate::constants::SIGNUP_CREDITS;
    use crate::db::entities::profiles;
    use crate::stripe::sign_payload;

    const TEST_WEBHOOK_SECRET: &str = "whsec_test_secret";

    struct TestContext {
        state: AppState,
        _image_dir: tempfile::TempDir,
    }

    async fn setup_context(
        app_password: Option<&str>,
        webhook_secret: Option<&str>,
    ) -> TestContext {
        let db = crate::db::connect_test_db().await.expect("connect test db");
        crate::db::migrations::Migrator::up(&db, None)
            .await
            .expect("run migrations");

        let image_dir = tempfile::tempdir().expect("tempdir");
        let store = ImageStore::new(StorageMode::Hosted, image_dir.path().to_path_buf());
        let openai = ImageClient::new("sk-test-key".to_string(), None);

        let state = AppState::new(
            db,
            store,
            openai,
            None,
            app_password,
            webhook_secret.map(str::to_string),
            "http://localhost:9000",
        );
        TestContext {
            state,
            _image_dir: image_dir,
        }
    }

    async fn read_body(response: axum::response::Response) -> String {
        let bytes = response
            .into_body()
            .collect()
            .await
            .expect("collect body")
            .to_bytes();
        String::from_utf8_lossy(&bytes).to_string()
    }

    async fn read_json(response: axum::response::Response) -> Value {
        let body = read_body(response).await;
        serde_json::from_str(&body).expect("parse json body")
    }

    const BOUNDARY: &str = "colorpage-test-boundary";

    fn multipart_request(fields: &[(&str, &str)]) -> Request<Body> {
        let mut body = String::new();
        for (name, value) in fields {
            body.push_str(&format!(
                "--{}\r\nContent-Disposition: form-data; name=\"{}\"\r\n\r\n{}\r\n",
                BOUNDARY, name, value
            ));
        }
        body.push_str(&format!("--{}--\r\n", BOUNDARY));
        Request::builder()
            .method("POST")
            .uri("/api/images")
            .header(
                CONTENT_TYPE,
                format!("multipart/form-data; boundary={}", BOUNDARY),
            )
            .body(Body::from(body))
            .expect("build multipart request")
    }

    fn json_request(uri: &str, body: &Value) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri(uri)
            .header(CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .expect("build json request")
    }

    fn signed_webhook_request(secret: &str, payload: &str) -> Request<Body> {
        let signature = sign_payload(secret, "1700000000", payload.as_bytes());
        Request::builder()
            .method("POST")
            .uri("/api/stripe/webhook")
            .header("stripe-signature", signature)
            .body(Body::from(payload.to_string()))
            .expect("build webhook request")
    }

    fn completed_event(event_id: &str, user_id: &str, credits: &str) -> String {
        json!({
            "id": event_id,
            "type": "checkout.session.completed",
            "data": {
                "object": {
                    "id": "cs_test_1",
                    "customer_email": "buyer@example.org",
                    "metadata": { "userId": user_id, "credits": credits }
                }
            }
        })
        .to_string()
    }

    async fn signup(app: &Router, user_id: &str, email: &str) {
        let response = app
            .clone()
            .oneshot(json_request(
                "/api/signup",
                &json!({ "userId": user_id, "email": email, "fullName": "Test User" }),
            ))
            .await
            .expect("signup request");
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn images_endpoint_requires_mode_and_prompt() {
        let ctx = setup_context(None, None).await;
        let app = create_router().with_state(ctx.state);

        let response = app
            .oneshot(multipart_request(&[("prompt", "a goat")]))
            .await
            .expect("request");
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let body = read_json(response).await;
        assert_eq!(body["error"], "Missing required parameters: mode and prompt");
    }

    #[tokio::test]
    async fn images_endpoint_enforces_the_shared_password() {
        let ctx = setup_context(Some("hunter2"), None).await;
        let app = create_router().with_state(ctx.state);

        let response = app
            .clone()
            .oneshot(multipart_request(&[("mode", "generate"), ("prompt", "a goat")]))
            .await
            .expect("request");
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

        let response = app
            .clone()
            .oneshot(multipart_request(&[
                ("mode", "generate"),
                ("prompt", "a goat"),
                ("passwordHash", "0000"),
            ]))
            .await
            .expect("request");
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

        // The right hash gets past the gate; the missing prompt/mode error
        // proves the request reached validation instead.
        let good_hash = hex::encode(Sha256::digest(b"hunter2"));
        let response = app
            .oneshot(multipart_request(&[("passwordHash", good_hash.as_str())]))
            .await
            .expect("request");
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn edit_mode_requires_a_photo() {
        let ctx = setup_context(None, None).await;
        let app = create_router().with_state(ctx.state);

        let response = app
            .oneshot(multipart_request(&[("mode", "edit"), ("prompt", "clean this up")]))
            .await
            .expect("request");
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let body = read_json(response).await;
        assert_eq!(body["error"], "No image file provided for editing.");
    }

    #[tokio::test]
    async fn unknown_mode_is_rejected() {
        let ctx = setup_context(None, None).await;
        let app = create_router().with_state(ctx.state);

        let response = app
            .oneshot(multipart_request(&[("mode", "paint"), ("prompt", "a goat")]))
            .await
            .expect("request");
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let body = read_json(response).await;
        assert_eq!(body["error"], "Invalid mode specified");
    }

    #[tokio::test]
    async fn image_retrieval_rejects_traversal_names() {
        let ctx = setup_context(None, None).await;
        let app = create_router().with_state(ctx.state);

        let request = Request::builder()
            .method("GET")
            .uri("/api/image/..%2F..%2Fetc%2Fpasswd")
            .body(Body::empty())
            .expect("build request");
        let response = app.oneshot(request).await.expect("request");
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let body = read_json(response).await;
        assert_eq!(body["error"], "Invalid filename");
    }

    #[tokio::test]
    async fn missing_image_is_a_404() {
        let ctx = setup_context(None, None).await;
        let app = create_router().with_state(ctx.state);

        let request = Request::builder()
            .method("GET")
            .uri("/api/image/nope.png")
            .body(Body::empty())
            .expect("build request");
        let response = app.oneshot(request).await.expect("request");
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn stored_images_serve_with_immutable_cache_headers() {
        let ctx = setup_context(None, None).await;
        let store = ctx.state.store.clone();
        let app = create_router().with_state(ctx.state);

        let stored = store
            .store(b"pretend png bytes", "png")
            .await
            .expect("store image")
            .expect("hosted reference");

        let request = Request::builder()
            .method("GET")
            .uri(format!("/api/image/{}", stored.filename))
            .body(Body::empty())
            .expect("build request");
        let response = app.clone().oneshot(request).await.expect("request");
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response.headers().get(CONTENT_TYPE).expect("content type"),
            "image/png"
        );
        assert_eq!(
            response
                .headers()
                .get("cache-control")
                .expect("cache-control"),
            crate::constants::IMAGE_CACHE_CONTROL
        );
        let etag = response
            .headers()
            .get("etag")
            .expect("etag header")
            .clone();
        let body = read_body(response).await;
        assert_eq!(body, "pretend png bytes");

        let request = Request::builder()
            .method("GET")
            .uri(format!("/api/image/{}", stored.filename))
            .header("if-none-match", etag)
            .body(Body::empty())
            .expect("build request");
        let response = app.oneshot(request).await.expect("request");
        assert_eq!(response.status(), StatusCode::NOT_MODIFIED);
    }

    #[tokio::test]
    async fn signup_profile_and_deduction_flow() {
        let ctx = setup_context(None, None).await;
        let app = create_router().with_state(ctx.state);

        let response = app
            .clone()
            .oneshot(json_request(
                "/api/signup",
                &json!({ "userId": "user_1", "email": "one@example.org", "fullName": "User One" }),
            ))
            .await
            .expect("signup");
        assert_eq!(response.status(), StatusCode::OK);
        let body = read_json(response).await;
        assert_eq!(body["credits"], SIGNUP_CREDITS);
        assert_eq!(body["subscriptionTier"], "free");

        let request = Request::builder()
            .method("GET")
            .uri("/api/profile/user_1")
            .body(Body::empty())
            .expect("build request");
        let response = app.clone().oneshot(request).await.expect("profile");
        assert_eq!(response.status(), StatusCode::OK);
        let body = read_json(response).await;
        assert_eq!(body["credits"], SIGNUP_CREDITS);

        for remaining in (0..SIGNUP_CREDITS).rev() {
            let response = app
                .clone()
                .oneshot(json_request(
                    "/api/credits/deduct",
                    &json!({ "userId": "user_1" }),
                ))
                .await
                .expect("deduct");
            assert_eq!(response.status(), StatusCode::OK);
            let body = read_json(response).await;
            assert_eq!(body["credits"], remaining);
        }

        let response = app
            .clone()
            .oneshot(json_request(
                "/api/credits/deduct",
                &json!({ "userId": "user_1" }),
            ))
            .await
            .expect("deduct below zero");
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn duplicate_signup_is_rejected() {
        let ctx = setup_context(None, None).await;
        let app = create_router().with_state(ctx.state);
        signup(&app, "user_1", "one@example.org").await;

        let response = app
            .oneshot(json_request(
                "/api/signup",
                &json!({ "userId": "user_2", "email": "one@example.org", "fullName": "Clone" }),
            ))
            .await
            .expect("duplicate signup");
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn package_listing_includes_the_catalog() {
        let ctx = setup_context(None, None).await;
        let app = create_router().with_state(ctx.state);

        let request = Request::builder()
            .method("GET")
            .uri("/api/packages")
            .body(Body::empty())
            .expect("build request");
        let response = app.oneshot(request).await.expect("packages");
        assert_eq!(response.status(), StatusCode::OK);
        let body = read_json(response).await;
        let packages = body["packages"].as_array().expect("array");
        assert_eq!(packages.len(), 4);
        assert_eq!(packages[0]["id"], "starter");
        assert_eq!(packages[0]["pricePerCredit"], "0.90");
        assert_eq!(packages[1]["popular"], true);
        assert_eq!(packages[3]["credits"], 100);
        assert_eq!(packages[3]["pricePerCredit"], "0.60");
    }

    #[tokio::test]
    async fn checkout_rejects_unknown_packages() {
        let ctx = setup_context(None, None).await;
        let app = create_router().with_state(ctx.state);

        let response = app
            .oneshot(json_request(
                "/api/stripe/checkout",
                &json!({ "userId": "user_1", "packageId": "enterprise" }),
            ))
            .await
            .expect("checkout");
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn checkout_requires_an_existing_profile() {
        let ctx = setup_context(None, None).await;
        let app = create_router().with_state(ctx.state);

        let response = app
            .oneshot(json_request(
                "/api/stripe/checkout",
                &json!({ "userId": "ghost", "packageId": "starter" }),
            ))
            .await
            .expect("checkout");
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn checkout_without_stripe_config_is_a_server_error() {
        let ctx = setup_context(None, None).await;
        let app = create_router().with_state(ctx.state);
        signup(&app, "user_1", "one@example.org").await;

        let response = app
            .oneshot(json_request(
                "/api/stripe/checkout",
                &json!({ "userId": "user_1", "packageId": "starter" }),
            ))
            .await
            .expect("checkout");
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[tokio::test]
    async fn webhook_without_secret_is_a_server_error() {
        let ctx = setup_context(None, None).await;
        let app = create_router().with_state(ctx.state);

        let response = app
            .oneshot(signed_webhook_request(
                TEST_WEBHOOK_SECRET,
                &completed_event("evt_1", "user_1", "10"),
            ))
            .await
            .expect("webhook");
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[tokio::test]
    async fn webhook_rejects_bad_signatures_before_touching_the_ledger() {
        let ctx = setup_context(None, Some(TEST_WEBHOOK_SECRET)).await;
        let db = ctx.state.db.clone();
        let app = create_router().with_state(ctx.state);
        signup(&app, "user_1", "one@example.org").await;

        let response = app
            .clone()
            .oneshot(signed_webhook_request(
                "whsec_wrong_secret",
                &completed_event("evt_1", "user_1", "10"),
            ))
            .await
            .expect("webhook");
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let response = app
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/api/stripe/webhook")
                    .body(Body::from(completed_event("evt_1", "user_1", "10")))
                    .expect("build request"),
            )
            .await
            .expect("webhook without header");
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let profile = profiles::find_by_id(db.as_ref(), "user_1")
            .await
            .expect("fetch profile")
            .expect("profile exists");
        assert_eq!(profile.credits, SIGNUP_CREDITS);
    }

    #[tokio::test]
    async fn webhook_credits_a_purchase_exactly_once() {
        let ctx = setup_context(None, Some(TEST_WEBHOOK_SECRET)).await;
        let db = ctx.state.db.clone();
        let app = create_router().with_state(ctx.state);
        signup(&app, "user_1", "one@example.org").await;

        let payload = completed_event("evt_1", "user_1", "10");
        for _ in 0..2 {
            let response = app
                .clone()
                .oneshot(signed_webhook_request(TEST_WEBHOOK_SECRET, &payload))
                .await
                .expect("webhook");
            assert_eq!(response.status(), StatusCode::OK);
            let body = read_json(response).await;
            assert_eq!(body["received"], true);
        }

        let profile = profiles::find_by_id(db.as_ref(), "user_1")
            .await
            .expect("fetch profile")
            .expect("profile exists");
        assert_eq!(profile.credits, SIGNUP_CREDITS + 10);
    }

    #[tokio::test]
    async fn webhook_ignores_unrelated_event_types() {
        let ctx = setup_context(None, Some(TEST_WEBHOOK_SECRET)).await;
        let db = ctx.state.db.clone();
        let app = create_router().with_state(ctx.state);
        signup(&app, "user_1", "one@example.org").await;

        let payload = json!({
            "id": "evt_other",
            "type": "payment_intent.succeeded",
            "data": { "object": { "id": "pi_1" } }
        })
        .to_string();
        let response = app
            .oneshot(signed_webhook_request(TEST_WEBHOOK_SECRET, &payload))
            .await
            .expect("webhook");
        assert_eq!(response.status(), StatusCode::OK);

        let profile = profiles::find_by_id(db.as_ref(), "user_1")
            .await
            .expect("fetch profile")
            .expect("profile exists");
        assert_eq!(profile.credits, SIGNUP_CREDITS);
    }

    #[tokio::test]
    async fn webhook_requires_user_metadata() {
        let ctx = setup_context(None, Some(TEST_WEBHOOK_SECRET)).await;
        let app = create_router().with_state(ctx.state);

        let payload = json!({
            "id": "evt_1",
            "type": "checkout.session.completed",
            "data": { "object": { "id": "cs_1", "metadata": {} } }
        })
        .to_string();
        let response = app
            .oneshot(signed_webhook_request(TEST_WEBHOOK_SECRET, &payload))
            .await
            .expect("webhook");
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let body = read_json(response).await;
        assert_eq!(body["error"], "Missing userId");
    }
}
