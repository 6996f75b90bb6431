use crate::{errors::ServiceError, AppState};
use axum::{
    extract::State,
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
    routing::post,
    Router,
};
use bytes::Bytes;
use hmac::{Hmac, Mac};
use serde_json::Value;
use sha2::Sha256;
use tracing::{info, warn};

type HmacSha256 = Hmac<Sha256>;

/// Provider event types that carry a captured payment.
const SUCCESS_EVENTS: &[&str] = &[
    "payment_intent.succeeded",
    "payment.succeeded",
    "charge.succeeded",
];

pub fn public_routes() -> Router<AppState> {
    Router::new().route("/payments/webhook", post(payment_webhook))
}

// POST /api/v1/payments/webhook
#[utoipa::path(
    post,
    path = "/api/v1/payments/webhook",
    request_body = String,
    responses(
        (status = 200, description = "Webhook accepted", body = String),
        (status = 401, description = "Invalid signature"),
        (status = 400, description = "Invalid payload")
    ),
    tag = "payments"
)]
pub async fn payment_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<impl IntoResponse, ServiceError> {
    if let Some(secret) = state.config.payment_webhook_secret.as_deref() {
        let ok = verify_signature(
            &headers,
            &body,
            secret,
            state.config.payment_webhook_tolerance_secs,
        );
        if !ok {
            warn!("payment webhook signature verification failed");
            return Err(ServiceError::AuthError(
                "Invalid webhook signature".to_string(),
            ));
        }
    } else {
        warn!("payment webhook secret not configured, accepting unsigned event");
    }

    let event: Value = serde_json::from_slice(&body)
        .map_err(|e| ServiceError::ValidationError(format!("Invalid webhook JSON: {e}")))?;

    let event_type = event.get("type").and_then(|v| v.as_str()).unwrap_or("");
    if !SUCCESS_EVENTS.contains(&event_type) {
        info!(event_type, "ignoring webhook event type");
        return Ok((StatusCode::OK, "ignored"));
    }

    // Stripe shape: data.object is the payment intent
    let intent = event
        .pointer("/data/object")
        .ok_or_else(|| ServiceError::ValidationError("Event carries no object".to_string()))?;

    let payment_intent_id = intent
        .get("id")
        .and_then(|v| v.as_str())
        .ok_or_else(|| ServiceError::ValidationError("Payment intent has no id".to_string()))?;

    let amount_paid_cents = intent
        .get("amount_received")
        .or_else(|| intent.get("amount"))
        .and_then(|v| v.as_i64())
        .ok_or_else(|| ServiceError::ValidationError("Payment intent has no amount".to_string()))?;

    let empty = serde_json::Map::new();
    let metadata = intent
        .get("metadata")
        .and_then(|v| v.as_object())
        .unwrap_or(&empty);

    let payload = state.services.payments.resolve_payload(metadata).await?;
    let outcome = state
        .services
        .payments
        .reconcile(payment_intent_id, amount_paid_cents, payload)
        .await?;

    info!(
        order_id = %outcome.order.id,
        duplicate = outcome.duplicate,
        "webhook reconciled"
    );
    Ok((StatusCode::OK, "ok"))
}

fn verify_signature(headers: &HeaderMap, payload: &Bytes, secret: &str, tolerance_secs: u64) -> bool {
    // Generic HMAC: x-timestamp and x-signature headers
    if let (Some(ts), Some(sig)) = (headers.get("x-timestamp"), headers.get("x-signature")) {
        if let (Ok(ts), Ok(sig)) = (ts.to_str(), sig.to_str()) {
            if let Ok(ts_i) = ts.parse::<i64>() {
                let now = chrono::Utc::now().timestamp();
                if (now - ts_i).unsigned_abs() > tolerance_secs {
                    return false;
                }
            }
            return check_hmac(ts, payload, secret, sig);
        }
    }

    // Stripe-like support: Stripe-Signature with t=, v1=
    if let Some(sig) = headers
        .get("Stripe-Signature")
        .and_then(|h| h.to_str().ok())
    {
        let mut ts = "";
        let mut v1 = "";
        for part in sig.split(',') {
            let mut it = part.trim().split('=');
            match (it.next(), it.next()) {
                (Some("t"), Some(val)) => ts = val,
                (Some("v1"), Some(val)) => v1 = val,
                _ => {}
            }
        }
        if !ts.is_empty() && !v1.is_empty() {
            if let Ok(ts_i) = ts.parse::<i64>() {
                let now = chrono::Utc::now().timestamp();
                if (now - ts_i).unsigned_abs() > tolerance_secs {
                    return false;
                }
            }
            return check_hmac(ts, payload, secret, v1);
        }
    }
    false
}

fn check_hmac(timestamp: &str, payload: &Bytes, secret: &str, provided: &str) -> bool {
    let signed = format!("{}.{}", timestamp, std::str::from_utf8(payload).unwrap_or(""));
    let Ok(mut mac) = HmacSha256::new_from_slice(secret.as_bytes()) else {
        return false;
    };
    mac.update(signed.as_bytes());
    let expected = hex::encode(mac.finalize().into_bytes());
    constant_time_eq(&expected, provided)
}

fn constant_time_eq(a: &str, b: &str) -> bool {
    if a.len() != b.len() {
        return false;
    }
    let mut res = 0u8;
    for (x, y) in a.as_bytes().iter().zip(b.as_bytes()) {
        res |= x ^ y;
    }
    res == 0
}
