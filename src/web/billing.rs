//! Checkout, webhook, and profile endpoints.

use axum::Json;
use axum::body::Bytes;
use axum::extract::{Path, State};
use axum::http::HeaderMap;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use tracing::{info, instrument};

use crate::constants::{CREDITS_PER_PAGE, DEFAULT_WEBHOOK_CREDITS};
use crate::db::entities::{profiles, webhook_events};
use crate::error::ColorpageError;
use crate::packages::{CREDIT_PACKAGES, package_by_id, price_per_credit};
use crate::storage::opaque_id;
use crate::stripe::{WebhookEvent, verify_webhook_signature};
use crate::web::AppState;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct CheckoutRequest {
    user_id: String,
    package_id: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct SignupRequest {
    #[serde(default)]
    user_id: Option<String>,
    email: String,
    full_name: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct DeductRequest {
    user_id: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct ProfileResponse {
    user_id: String,
    email: String,
    full_name: String,
    credits: i32,
    subscription_tier: String,
}

impl From<profiles::Model> for ProfileResponse {
    fn from(profile: profiles::Model) -> Self {
        Self {
            user_id: profile.id,
            email: profile.email,
            full_name: profile.full_name,
            credits: profile.credits,
            subscription_tier: profile.subscription_tier,
        }
    }
}

/// `GET /api/packages` — the static credit-pack catalog, each pack annotated
/// with its per-credit dollar price.
pub(crate) async fn list_packages_handler() -> Json<Value> {
    let packages: Vec<Value> = CREDIT_PACKAGES
        .iter()
        .map(|package| {
            let mut value = serde_json::to_value(package).unwrap_or_else(|_| json!({}));
            if let Some(object) = value.as_object_mut() {
                object.insert(
                    "pricePerCredit".to_string(),
                    Value::String(price_per_credit(package.price, package.credits)),
                );
            }
            value
        })
        .collect();
    Json(json!({ "packages": packages }))
}

/// `POST /api/signup` — creates a profile seeded with the signup credits.
#[instrument(skip_all, fields(email = %request.email))]
pub(crate) async fn signup_handler(
    State(state): State<AppState>,
    Json(request): Json<SignupRequest>,
) -> Result<Json<ProfileResponse>, ColorpageError> {
    if request.email.trim().is_empty() || request.full_name.trim().is_empty() {
        return Err(ColorpageError::BadRequest(
            "Email and full name are required".to_string(),
        ));
    }

    let user_id = request.user_id.unwrap_or_else(opaque_id);
    let profile = profiles::create(
        state.db.as_ref(),
        &user_id,
        request.email.trim(),
        request.full_name.trim(),
    )
    .await?;
    Ok(Json(profile.into()))
}

/// `GET /api/profile/{user_id}` — backs the client's pre-generation balance
/// check.
pub(crate) async fn get_profile_handler(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
) -> Result<Json<ProfileResponse>, ColorpageError> {
    match profiles::find_by_id(state.db.as_ref(), &user_id).await? {
        Some(profile) => Ok(Json(profile.into())),
        None => Err(ColorpageError::NotFound(format!("User {}", user_id))),
    }
}

/// `POST /api/credits/deduct` — the post-generation deduction. The image has
/// already been delivered when this is called; a failure here surfaces to the
/// caller instead of rolling anything back.
pub(crate) async fn deduct_credits_handler(
    State(state): State<AppState>,
    Json(request): Json<DeductRequest>,
) -> Result<Json<Value>, ColorpageError> {
    let balance =
        profiles::deduct_credits(state.db.as_ref(), &request.user_id, CREDITS_PER_PAGE).await?;
    info!(
        "Deducted {} credit from {}, {} remaining",
        CREDITS_PER_PAGE, request.user_id, balance
    );
    Ok(Json(json!({ "credits": balance })))
}

/// `POST /api/stripe/checkout` — creates a hosted checkout session for a
/// credit pack and returns its redirect URL.
#[instrument(skip_all, fields(user_id = %request.user_id, package_id = %request.package_id))]
pub(crate) async fn checkout_handler(
    State(state): State<AppState>,
    Json(request): Json<CheckoutRequest>,
) -> Result<Json<Value>, ColorpageError> {
    let Some(package) = package_by_id(&request.package_id) else {
        return Err(ColorpageError::BadRequest(format!(
            "Unknown credit package: {}",
            request.package_id
        )));
    };

    let Some(profile) = profiles::find_by_id(state.db.as_ref(), &request.user_id).await? else {
        return Err(ColorpageError::NotFound(format!(
            "User {}",
            request.user_id
        )));
    };

    let Some(stripe) = state.stripe.as_ref() else {
        return Err(ColorpageError::Configuration(
            "Stripe is not configured".to_string(),
        ));
    };

    let session = stripe
        .create_checkout_session(
            package,
            &profile.id,
            &profile.email,
            &state.public_base_url,
        )
        .await?;

    let Some(url) = session.url else {
        return Err(ColorpageError::InternalServerError(
            "Checkout session is missing its redirect URL".to_string(),
        ));
    };
    info!("Created checkout session {} for {}", session.id, profile.id);
    Ok(Json(json!({ "url": url })))
}

/// `POST /api/stripe/webhook` — verifies the vendor signature over the raw
/// body, then credits the purchase exactly once.
pub(crate) async fn webhook_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<Value>, ColorpageError> {
    let Some(secret) = state.webhook_secret.as_deref() else {
        return Err(ColorpageError::Configuration(
            "Stripe webhook secret is not configured".to_string(),
        ));
    };

    let signature = headers
        .get("stripe-signature")
        .and_then(|value| value.to_str().ok())
        .ok_or_else(|| {
            ColorpageError::BadRequest("Missing Stripe-Signature header".to_string())
        })?;

    verify_webhook_signature(secret, signature, &body)?;

    let event: WebhookEvent = serde_json::from_slice(&body)
        .map_err(|err| ColorpageError::BadRequest(format!("Invalid event payload: {}", err)))?;

    if event.event_type == "checkout.session.completed" {
        let session = event.data.object;
        info!("Payment successful: {}", session.id);

        let Some(user_id) = session.metadata.get("userId") else {
            return Err(ColorpageError::BadRequest("Missing userId".to_string()));
        };
        let credits = session
            .metadata
            .get("credits")
            .and_then(|raw| raw.parse::<i32>().ok())
            .unwrap_or(DEFAULT_WEBHOOK_CREDITS);

        if !webhook_events::record_if_new(state.db.as_ref(), &event.id).await? {
            info!("Skipping already-processed event {}", event.id);
            return Ok(Json(json!({ "received": true })));
        }

        profiles::add_credits(state.db.as_ref(), user_id, credits).await?;
        info!("Added {} credits to user {}", credits, user_id);
    }

    Ok(Json(json!({ "received": true })))
}
