use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use utoipa::ToSchema;

fn current_request_id() -> Option<String> {
    crate::tracing::current_request_id().map(|rid| rid.as_str().to_string())
}

/// Simplified error structure for OpenAPI documentation
#[derive(Debug, Serialize, Deserialize, ToSchema)]
#[schema(example = json!({
    "error": "Bad Request",
    "code": "MISSING_SIGNATURE",
    "message": "Signature verification failed: no signature header present",
    "request_id": "req-abc123xyz",
    "timestamp": "2026-03-14T10:30:00.000Z"
}))]
pub struct ErrorResponse {
    /// HTTP status category (e.g., "Bad Request", "Internal Server Error")
    #[schema(example = "Bad Request")]
    pub error: String,
    /// Stable machine-readable code for webhook callers
    #[serde(skip_serializing_if = "Option::is_none")]
    #[schema(example = "MISSING_SIGNATURE")]
    pub code: Option<String>,
    /// Human-readable error description
    #[schema(example = "Signature verification failed")]
    pub message: String,
    /// Additional error details
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
    /// Unique request identifier for support and debugging
    #[serde(skip_serializing_if = "Option::is_none")]
    #[schema(example = "req-abc123xyz")]
    pub request_id: Option<String>,
    /// ISO 8601 timestamp when the error occurred
    #[schema(example = "2026-03-14T10:30:00.000Z")]
    pub timestamp: String,
}

/// Transient failure classes the retry executor understands.
///
/// Everything else is permanent: retrying it would burn attempts on a
/// failure that cannot heal on its own.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransientKind {
    NetworkReset,
    Timeout,
    Dns,
    RateLimit,
    VersionConflict,
}

impl TransientKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::NetworkReset => "network_reset",
            Self::Timeout => "timeout",
            Self::Dns => "dns",
            Self::RateLimit => "rate_limit",
            Self::VersionConflict => "version_conflict",
        }
    }
}

/// Taxonomy label attached to every log line and metric an error produces.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCategory {
    SignatureVerification,
    EventParsing,
    InventoryUpdate,
    CustomerData,
    WebhookProcessing,
    RateLimiting,
    ExternalApi,
    ConsentProcessing,
    Database,
    Configuration,
}

impl ErrorCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::SignatureVerification => "signature_verification",
            Self::EventParsing => "event_parsing",
            Self::InventoryUpdate => "inventory_update",
            Self::CustomerData => "customer_data",
            Self::WebhookProcessing => "webhook_processing",
            Self::RateLimiting => "rate_limiting",
            Self::ExternalApi => "external_api",
            Self::ConsentProcessing => "consent_processing",
            Self::Database => "database",
            Self::Configuration => "configuration",
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    #[error("Signature verification failed: {reason}")]
    SignatureVerification {
        code: &'static str,
        reason: String,
    },

    #[error("Event parsing failed: {0}")]
    EventParsing(String),

    #[error("Webhook secret is not configured")]
    MissingWebhookSecret,

    #[error("Product {product_id} is not a {expected} product (found {found})")]
    WrongProductCategory {
        product_id: String,
        expected: String,
        found: String,
    },

    #[error("Inventory update failed: {0}")]
    InventoryUpdate(String),

    #[error("Inventory version conflict for product {product_id}")]
    VersionConflict { product_id: String },

    #[error("Customer data error: {0}")]
    CustomerData(String),

    #[error("Consent processing error: {0}")]
    ConsentProcessing(String),

    #[error("Webhook processing failed: {0}")]
    WebhookProcessing(String),

    #[error("Payment API rate limit exceeded")]
    RateLimited { retry_after_secs: Option<u64> },

    #[error("Payment API transport failure: {detail}")]
    Transport {
        kind: TransientKind,
        detail: String,
    },

    #[error("Payment API error: {detail}")]
    ExternalApi {
        status: Option<u16>,
        detail: String,
    },

    #[error("Database error: {0}")]
    Database(#[from] sea_orm::error::DbErr),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Configuration error: {0}")]
    Configuration(String),
}

impl From<reqwest::Error> for ServiceError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            return ServiceError::Transport {
                kind: TransientKind::Timeout,
                detail: err.to_string(),
            };
        }
        if err.is_connect() {
            // reqwest folds resolver failures into connect errors; the text
            // is the only way to tell them apart
            let detail = err.to_string();
            let kind = if detail.contains("dns") || detail.contains("resolve") {
                TransientKind::Dns
            } else {
                TransientKind::NetworkReset
            };
            return ServiceError::Transport { kind, detail };
        }
        if err.status() == Some(reqwest::StatusCode::TOO_MANY_REQUESTS) {
            return ServiceError::RateLimited {
                retry_after_secs: None,
            };
        }
        ServiceError::ExternalApi {
            status: err.status().map(|s| s.as_u16()),
            detail: err.to_string(),
        }
    }
}

impl ServiceError {
    pub fn missing_signature() -> Self {
        ServiceError::SignatureVerification {
            code: "MISSING_SIGNATURE",
            reason: "no signature header present".to_string(),
        }
    }

    pub fn invalid_signature(reason: impl Into<String>) -> Self {
        ServiceError::SignatureVerification {
            code: "INVALID_SIGNATURE",
            reason: reason.into(),
        }
    }

    /// Taxonomy category for logs and metrics.
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::SignatureVerification { .. } => ErrorCategory::SignatureVerification,
            Self::EventParsing(_) => ErrorCategory::EventParsing,
            Self::MissingWebhookSecret => ErrorCategory::Configuration,
            Self::WrongProductCategory { .. } => ErrorCategory::Configuration,
            Self::InventoryUpdate(_) | Self::VersionConflict { .. } => {
                ErrorCategory::InventoryUpdate
            }
            Self::CustomerData(_) => ErrorCategory::CustomerData,
            Self::ConsentProcessing(_) => ErrorCategory::ConsentProcessing,
            Self::WebhookProcessing(_) => ErrorCategory::WebhookProcessing,
            Self::RateLimited { .. } => ErrorCategory::RateLimiting,
            Self::Transport { .. } | Self::ExternalApi { .. } => ErrorCategory::ExternalApi,
            Self::Database(_) => ErrorCategory::Database,
            Self::Serialization(_) | Self::Configuration(_) => ErrorCategory::Configuration,
        }
    }

    /// Transient class if the retry executor may retry this error.
    pub fn transient_kind(&self) -> Option<TransientKind> {
        match self {
            Self::Transport { kind, .. } => Some(*kind),
            Self::RateLimited { .. } => Some(TransientKind::RateLimit),
            Self::VersionConflict { .. } => Some(TransientKind::VersionConflict),
            _ => None,
        }
    }

    /// Critical errors indicate deployment misconfiguration rather than a
    /// bad request and are escalated in logs.
    pub fn is_critical(&self) -> bool {
        matches!(
            self,
            Self::MissingWebhookSecret | Self::WrongProductCategory { .. }
        )
    }

    /// Stable machine-readable code surfaced to webhook callers.
    pub fn code(&self) -> Option<&'static str> {
        match self {
            Self::SignatureVerification { code, .. } => Some(code),
            Self::EventParsing(_) => Some("INVALID_PAYLOAD"),
            Self::MissingWebhookSecret => Some("MISSING_WEBHOOK_SECRET"),
            _ => None,
        }
    }

    /// Returns the HTTP status code for this error.
    /// This is the single source of truth for error-to-status mapping.
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::SignatureVerification { .. } | Self::EventParsing(_) => StatusCode::BAD_REQUEST,
            Self::ConsentProcessing(_) => StatusCode::UNPROCESSABLE_ENTITY,
            Self::VersionConflict { .. } => StatusCode::CONFLICT,
            Self::RateLimited { .. } => StatusCode::TOO_MANY_REQUESTS,
            Self::Transport { .. } | Self::ExternalApi { .. } => StatusCode::BAD_GATEWAY,
            Self::MissingWebhookSecret
            | Self::WrongProductCategory { .. }
            | Self::InventoryUpdate(_)
            | Self::CustomerData(_)
            | Self::WebhookProcessing(_)
            | Self::Database(_)
            | Self::Serialization(_)
            | Self::Configuration(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Returns the error message suitable for HTTP responses.
    /// Internal errors return generic messages to avoid leaking implementation details.
    pub fn response_message(&self) -> String {
        match self {
            Self::Database(_) => "Database error".to_string(),
            Self::Serialization(_) => "Internal server error".to_string(),
            Self::MissingWebhookSecret | Self::Configuration(_) => {
                "Service configuration error".to_string()
            }
            Self::WrongProductCategory { .. } => "Service configuration error".to_string(),
            Self::Transport { .. } | Self::ExternalApi { .. } => {
                "Upstream payment API error".to_string()
            }
            // Caller-facing errors keep the actual message
            _ => self.to_string(),
        }
    }
}

impl IntoResponse for ServiceError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let err = ErrorResponse {
            error: status.canonical_reason().unwrap_or("Error").to_string(),
            code: self.code().map(str::to_string),
            message: self.response_message(),
            details: None,
            request_id: current_request_id(),
            timestamp: chrono::Utc::now().to_rfc3339(),
        };

        (status, Json(err)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::to_bytes;

    #[test]
    fn signature_errors_map_to_bad_request() {
        assert_eq!(
            ServiceError::missing_signature().status_code(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            ServiceError::invalid_signature("digest mismatch").status_code(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            ServiceError::EventParsing("not json".into()).status_code(),
            StatusCode::BAD_REQUEST
        );
    }

    #[test]
    fn configuration_and_pipeline_errors_map_to_internal() {
        assert_eq!(
            ServiceError::MissingWebhookSecret.status_code(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
        assert_eq!(
            ServiceError::WebhookProcessing("boom".into()).status_code(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
        assert_eq!(
            ServiceError::RateLimited {
                retry_after_secs: Some(1)
            }
            .status_code(),
            StatusCode::TOO_MANY_REQUESTS
        );
    }

    #[test]
    fn transient_kinds_cover_only_retryable_classes() {
        let conflict = ServiceError::VersionConflict {
            product_id: "prod_1".into(),
        };
        assert_eq!(conflict.transient_kind(), Some(TransientKind::VersionConflict));

        let timeout = ServiceError::Transport {
            kind: TransientKind::Timeout,
            detail: "deadline".into(),
        };
        assert_eq!(timeout.transient_kind(), Some(TransientKind::Timeout));

        assert_eq!(
            ServiceError::CustomerData("bad".into()).transient_kind(),
            None
        );
        assert_eq!(ServiceError::EventParsing("x".into()).transient_kind(), None);
    }

    #[test]
    fn critical_errors_are_flagged() {
        assert!(ServiceError::MissingWebhookSecret.is_critical());
        assert!(ServiceError::WrongProductCategory {
            product_id: "prod_1".into(),
            expected: "limited-edition".into(),
            found: "poster".into(),
        }
        .is_critical());
        assert!(!ServiceError::InventoryUpdate("x".into()).is_critical());
    }

    #[test]
    fn stable_codes_for_webhook_callers() {
        assert_eq!(
            ServiceError::missing_signature().code(),
            Some("MISSING_SIGNATURE")
        );
        assert_eq!(
            ServiceError::invalid_signature("stale").code(),
            Some("INVALID_SIGNATURE")
        );
        assert_eq!(
            ServiceError::MissingWebhookSecret.code(),
            Some("MISSING_WEBHOOK_SECRET")
        );
        assert_eq!(ServiceError::CustomerData("x".into()).code(), None);
    }

    #[test]
    fn internal_detail_never_leaks_into_responses() {
        let err = ServiceError::Database(sea_orm::error::DbErr::Custom(
            "password=hunter2 host=10.0.0.5".into(),
        ));
        assert_eq!(err.response_message(), "Database error");

        let err = ServiceError::ExternalApi {
            status: Some(500),
            detail: "stack trace here".into(),
        };
        assert_eq!(err.response_message(), "Upstream payment API error");
    }

    #[tokio::test]
    async fn error_response_includes_request_id_and_code() {
        let response =
            crate::tracing::scope_request_id(crate::tracing::RequestId::new("req-123"), async {
                ServiceError::missing_signature().into_response()
            })
            .await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let payload: ErrorResponse = serde_json::from_slice(&body).unwrap();
        assert_eq!(payload.request_id.as_deref(), Some("req-123"));
        assert_eq!(payload.code.as_deref(), Some("MISSING_SIGNATURE"));
        assert_eq!(payload.error, "Bad Request");
    }
}
