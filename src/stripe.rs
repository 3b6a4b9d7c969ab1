//! Stripe Checkout plumbing.
//!
//! Two concerns: creating hosted checkout sessions for credit packs, and
//! verifying the `Stripe-Signature` header on webhook callbacks. The
//! signature scheme is HMAC-SHA256 over `"{timestamp}.{raw body}"` with the
//! webhook signing secret, hex-encoded in the header's `v1` entries.

use hmac::{Hmac, Mac};
use serde::Deserialize;
use sha2::Sha256;
use std::collections::HashMap;

use crate::error::ColorpageError;
use crate::packages::CreditPackage;

const CHECKOUT_SESSIONS_URL: &str = "https://api.stripe.com/v1/checkout/sessions";

type HmacSha256 = Hmac<Sha256>;

/// A Checkout Session as returned by session creation and carried inside
/// `checkout.session.completed` events.
#[derive(Clone, Debug, Deserialize)]
pub struct CheckoutSession {
    /// vendor session id
    pub id: String,
    /// hosted payment page URL (present on freshly created sessions)
    #[serde(default)]
    pub url: Option<String>,
    /// purchaser email
    #[serde(default)]
    pub customer_email: Option<String>,
    /// metadata written at session creation: `userId` and `credits`
    #[serde(default)]
    pub metadata: HashMap<String, String>,
}

/// A webhook event envelope.
#[derive(Clone, Debug, Deserialize)]
pub struct WebhookEvent {
    /// vendor event id, used for exactly-once crediting
    pub id: String,
    /// event type, e.g. `checkout.session.completed`
    #[serde(rename = "type")]
    pub event_type: String,
    /// event payload
    pub data: WebhookEventData,
}

/// Payload wrapper inside a webhook event.
#[derive(Clone, Debug, Deserialize)]
pub struct WebhookEventData {
    /// the session the event describes
    pub object: CheckoutSession,
}

#[derive(Debug, Deserialize)]
struct StripeErrorBody {
    error: Option<StripeErrorDetail>,
}

#[derive(Debug, Deserialize)]
struct StripeErrorDetail {
    message: Option<String>,
}

/// Client for the Stripe API.
#[derive(Clone, Debug)]
pub struct StripeClient {
    http: reqwest::Client,
    secret_key: String,
}

impl StripeClient {
    /// Builds a client from the account's secret key.
    pub fn new(secret_key: String) -> Self {
        Self {
            http: reqwest::Client::new(),
            secret_key,
        }
    }

    /// Creates a hosted checkout session for one credit pack and returns it;
    /// the caller redirects the buyer to `session.url`.
    pub async fn create_checkout_session(
        &self,
        package: &CreditPackage,
        user_id: &str,
        customer_email: &str,
        public_base_url: &str,
    ) -> Result<CheckoutSession, ColorpageError> {
        let unit_amount = package.price.to_string();
        let credits = package.credits.to_string();
        let product_name = format!("{} Coloring Page Credits", package.credits);
        let product_description =
            format!("Generate {} custom coloring pages", package.credits);
        let success_url = format!(
            "{}/purchase/success?session_id={{CHECKOUT_SESSION_ID}}",
            public_base_url
        );
        let cancel_url = format!("{}/", public_base_url);

        let form: Vec<(&str, &str)> = vec![
            ("payment_method_types[0]", "card"),
            ("line_items[0][price_data][currency]", "usd"),
            (
                "line_items[0][price_data][product_data][name]",
                &product_name,
            ),
            (
                "line_items[0][price_data][product_data][description]",
                &product_description,
            ),
            ("line_items[0][price_data][unit_amount]", &unit_amount),
            ("line_items[0][quantity]", "1"),
            ("mode", "payment"),
            ("success_url", &success_url),
            ("cancel_url", &cancel_url),
            ("customer_email", customer_email),
            ("metadata[userId]", user_id),
            ("metadata[credits]", &credits),
        ];

        let response = self
            .http
            .post(CHECKOUT_SESSIONS_URL)
            .basic_auth(&self.secret_key, Option::<&str>::None)
            .form(&form)
            .send()
            .await?;

        let status = response.status();
        let bytes = response.bytes().await?;
        if !status.is_success() {
            let message = serde_json::from_slice::<StripeErrorBody>(&bytes)
                .ok()
                .and_then(|body| body.error)
                .and_then(|detail| detail.message)
                .unwrap_or_else(|| String::from_utf8_lossy(&bytes).to_string());
            return Err(ColorpageError::Upstream {
                status: status.as_u16(),
                message,
            });
        }

        serde_json::from_slice(&bytes).map_err(|err| {
            ColorpageError::InternalServerError(format!(
                "Failed to parse checkout session response: {}",
                err
            ))
        })
    }
}

/// Checks a `Stripe-Signature` header against the raw request body. Any
/// missing, malformed, or mismatched signature is rejected; callers must do
/// this before touching the ledger.
pub fn verify_webhook_signature(
    secret: &str,
    signature_header: &str,
    payload: &[u8],
) -> Result<(), ColorpageError> {
    let mut timestamp: Option<&str> = None;
    let mut candidates: Vec<&str> = Vec::new();

    for element in signature_header.split(',') {
        match element.trim().split_once('=') {
            Some(("t", value)) => timestamp = Some(value),
            Some(("v1", value)) => candidates.push(value),
            _ => {}
        }
    }

    let timestamp = timestamp
        .ok_or_else(|| ColorpageError::BadRequest("Invalid signature".to_string()))?;
    if candidates.is_empty() {
        return Err(ColorpageError::BadRequest("Invalid signature".to_string()));
    }

    for candidate in candidates {
        let Ok(decoded) = hex::decode(candidate) else {
            continue;
        };
        let mut mac = HmacSha256::new_from_slice(secret.as_bytes()).map_err(|err| {
            ColorpageError::InternalServerError(format!("Webhook secret unusable: {}", err))
        })?;
        mac.update(timestamp.as_bytes());
        mac.update(b".");
        mac.update(payload);
        if mac.verify_slice(&decoded).is_ok() {
            return Ok(());
        }
    }

    Err(ColorpageError::BadRequest("Invalid signature".to_string()))
}

/// Produces the `Stripe-Signature` header value for a payload; used by tests
/// to exercise the webhook endpoint end to end.
pub fn sign_payload(secret: &str, timestamp: &str, payload: &[u8]) -> String {
    let mut mac = match HmacSha256::new_from_slice(secret.as_bytes()) {
        Ok(mac) => mac,
        Err(_) => return format!("t={},v1=", timestamp),
    };
    mac.update(timestamp.as_bytes());
    mac.update(b".");
    mac.update(payload);
    let digest = mac.finalize().into_bytes();
    format!("t={},v1={}", timestamp, hex::encode(digest))
}
