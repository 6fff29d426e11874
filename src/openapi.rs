use utoipa::OpenApi;

use crate::errors::ErrorResponse;
use crate::handlers::webhooks::AckResponse;

/// OpenAPI document for the settlement service, served raw at
/// `/api-docs/openapi.json`.
#[derive(OpenApi)]
#[openapi(
    info(
        title = "Settlement API",
        version = env!("CARGO_PKG_VERSION"),
        description = "Webhook-driven payment settlement: signature-verified, \
idempotent event processing with limited-edition inventory updates, customer \
purchase ledgers, and marketplace transactions.",
        license(name = "MIT", url = "https://opensource.org/licenses/MIT")
    ),
    paths(
        crate::handlers::webhooks::payment_webhook,
        crate::handlers::health::health_check,
        crate::handlers::health::api_status,
    ),
    components(schemas(AckResponse, ErrorResponse)),
    tags(
        (name = "Webhooks", description = "Payment provider event intake"),
        (name = "Health", description = "Liveness and build metadata")
    )
)]
pub struct ApiDoc;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn document_includes_webhook_path() {
        let doc = ApiDoc::openapi();
        let json = serde_json::to_value(&doc).unwrap();
        assert!(json["paths"]["/api/v1/payments/webhook"]["post"].is_object());
        assert!(json["paths"]["/health"]["get"].is_object());
        assert!(json["components"]["schemas"]["AckResponse"].is_object());
    }
}
