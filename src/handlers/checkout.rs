use crate::{
    errors::ServiceError, handlers::common::created_response,
    services::payments::WebhookOrderPayload, AppState,
};
use axum::{extract::State, response::Response, routing::post, Json, Router};
use serde::Serialize;
use uuid::Uuid;

#[derive(Debug, Serialize, utoipa::ToSchema)]
pub struct DraftCreatedView {
    pub draft_id: Uuid,
}

pub fn public_routes() -> Router<AppState> {
    Router::new().route("/checkout/drafts", post(create_draft))
}

#[utoipa::path(
    post,
    path = "/api/v1/checkout/drafts",
    request_body = WebhookOrderPayload,
    responses(
        (status = 201, description = "Draft stored; reference it from payment-intent metadata", body = DraftCreatedView),
        (status = 400, description = "Invalid payload")
    ),
    tag = "checkout"
)]
pub async fn create_draft(
    State(state): State<AppState>,
    Json(payload): Json<WebhookOrderPayload>,
) -> Result<Response, ServiceError> {
    if payload.email.trim().is_empty() || payload.items.is_empty() {
        return Err(ServiceError::ValidationError(
            "A draft requires an email and at least one item".to_string(),
        ));
    }
    let draft = state.services.payments.create_draft(&payload).await?;
    Ok(created_response(DraftCreatedView { draft_id: draft.id }))
}
