use utoipa::openapi::security::{HttpAuthScheme, HttpBuilder, SecurityScheme};
use utoipa::{Modify, OpenApi};
use utoipa_swagger_ui::SwaggerUi;

#[derive(OpenApi)]
#[openapi(
    info(
        title = "Crystal Commerce API",
        version = "0.3.0",
        description = r#"
# Crystal Commerce API

Storefront and back-office API for a crystal jewelry shop: catalog, stock
ledger, discount codes, order lifecycle, and payment-provider reconciliation.

## Authentication

Admin endpoints require a JWT issued by `POST /auth/login`:

```
Authorization: Bearer <your-jwt-token>
```

Storefront endpoints (catalog, tracking, auto-apply discounts, checkout
drafts) are unauthenticated. The payment webhook authenticates with an
HMAC signature instead of a bearer token.

## Pagination

List endpoints accept `page` (default 1) and `per_page` (default 20, max 100).
        "#,
        license(
            name = "MIT",
            url = "https://opensource.org/licenses/MIT"
        )
    ),
    servers(
        (url = "http://localhost:8080", description = "Local development")
    ),
    tags(
        (name = "products", description = "Storefront catalog"),
        (name = "orders", description = "Order tracking"),
        (name = "discounts", description = "Discount codes"),
        (name = "checkout", description = "Checkout drafts"),
        (name = "payments", description = "Payment provider webhooks"),
        (name = "auth", description = "Authentication"),
        (name = "admin", description = "Back-office endpoints")
    ),
    paths(
        // Storefront
        crate::handlers::products::list_products,
        crate::handlers::products::get_product,
        crate::handlers::orders::track_order,
        crate::handlers::discounts::auto_apply,
        crate::handlers::checkout::create_draft,
        crate::handlers::payment_webhooks::payment_webhook,

        // Auth
        crate::auth::login_handler,

        // Back office
        crate::handlers::products::create_product,
        crate::handlers::products::update_product,
        crate::handlers::products::deactivate_product,
        crate::handlers::orders::list_orders,
        crate::handlers::orders::get_order,
        crate::handlers::orders::update_status,
        crate::handlers::orders::cancel_order,
        crate::handlers::inventory::adjust_stock,
        crate::handlers::inventory::list_ledger,
        crate::handlers::inventory::recount,
        crate::handlers::inventory::low_stock_report,
        crate::handlers::discounts::list_discounts,
        crate::handlers::discounts::create_discount,
        crate::handlers::discounts::invalidate_discount,
    ),
    components(
        schemas(
            crate::errors::ErrorResponse,
            crate::auth::LoginRequest,
            crate::auth::TokenResponse,

            crate::handlers::products::ProductView,
            crate::services::catalog::CreateProductRequest,
            crate::services::catalog::UpdateProductRequest,

            crate::handlers::orders::OrderView,
            crate::handlers::orders::HistoryView,
            crate::handlers::orders::TrackingView,
            crate::handlers::orders::UpdateStatusRequest,
            crate::handlers::orders::CancelOrderRequest,
            crate::entities::order::OrderStatus,
            crate::entities::order::PaymentStatus,

            crate::handlers::inventory::AdjustStockBody,
            crate::entities::inventory_log_entry::EntryType,

            crate::handlers::discounts::AutoApplyView,
            crate::services::discounts::CreateDiscountRequest,
            crate::entities::discount_code::CodeType,

            crate::handlers::checkout::DraftCreatedView,
            crate::services::payments::WebhookOrderPayload,
            crate::services::payments::PayloadItem,
            crate::services::payments::PayloadAddress,
        )
    ),
    modifiers(&SecurityAddon)
)]
pub struct ApiDoc;

struct SecurityAddon;

impl Modify for SecurityAddon {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        let components = openapi.components.get_or_insert_with(Default::default);
        components.add_security_scheme(
            "bearer_auth",
            SecurityScheme::Http(
                HttpBuilder::new()
                    .scheme(HttpAuthScheme::Bearer)
                    .bearer_format("JWT")
                    .build(),
            ),
        );
    }
}

pub fn swagger_ui() -> SwaggerUi {
    SwaggerUi::new("/swagger-ui")
        .url("/api-docs/openapi.json", ApiDoc::openapi())
        .config(utoipa_swagger_ui::Config::from("/api-docs/openapi.json").try_it_out_enabled(true))
}
