use std::cell::RefCell;
use std::fmt;
use std::future::Future;

use axum::http::Request;
use tower_http::classify::StatusInRangeAsFailures;
use tower_http::trace::{
    DefaultOnBodyChunk, DefaultOnEos, DefaultOnFailure, DefaultOnRequest, DefaultOnResponse,
    MakeSpan, TraceLayer,
};
use uuid::Uuid;

// Re-export tracing macros for use across the crate
pub use tracing::{debug, error, info, trace, warn};

use crate::errors::ServiceError;

/// Correlation identifier threaded through every log line a webhook
/// delivery produces. Accepted from the `x-request-id` header when the
/// caller supplies one, generated otherwise.
#[derive(Clone, Debug)]
pub struct RequestId(pub String);

impl Default for RequestId {
    fn default() -> Self {
        RequestId(Uuid::new_v4().to_string())
    }
}

impl RequestId {
    pub fn new(value: impl Into<String>) -> Self {
        RequestId(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

tokio::task_local! {
    static CURRENT_REQUEST_ID: RefCell<Option<RequestId>>;
}

pub async fn scope_request_id<Fut, R>(request_id: RequestId, future: Fut) -> R
where
    Fut: Future<Output = R>,
{
    CURRENT_REQUEST_ID
        .scope(RefCell::new(Some(request_id)), future)
        .await
}

pub fn current_request_id() -> Option<RequestId> {
    CURRENT_REQUEST_ID
        .try_with(|cell| cell.borrow().clone())
        .ok()
        .flatten()
}

#[derive(Clone, Default)]
pub struct RequestSpanMaker;

impl<B> MakeSpan<B> for RequestSpanMaker {
    fn make_span(&mut self, request: &Request<B>) -> tracing::Span {
        let request_id = request
            .extensions()
            .get::<RequestId>()
            .cloned()
            .or_else(|| {
                request
                    .headers()
                    .get("x-request-id")
                    .and_then(|v| v.to_str().ok())
                    .map(RequestId::new)
            })
            .unwrap_or_default();

        tracing::info_span!(
            "http.request",
            request_id = %request_id.as_str(),
            method = %request.method(),
            uri = %request.uri(),
        )
    }
}

/// Configure tracing for the application with tower-http
pub fn configure_http_tracing() -> TraceLayer<
    tower_http::classify::SharedClassifier<StatusInRangeAsFailures>,
    RequestSpanMaker,
    DefaultOnRequest,
    DefaultOnResponse,
    DefaultOnBodyChunk,
    DefaultOnEos,
    DefaultOnFailure,
> {
    let classifier =
        tower_http::classify::SharedClassifier::new(StatusInRangeAsFailures::new(500..=599));
    TraceLayer::new(classifier)
        .make_span_with(RequestSpanMaker)
        .on_request(DefaultOnRequest::default())
        .on_response(DefaultOnResponse::default())
        .on_body_chunk(DefaultOnBodyChunk::default())
        .on_eos(DefaultOnEos::default())
        .on_failure(DefaultOnFailure::default())
}

/// Log a pipeline error with its taxonomy fields.
///
/// Critical errors escalate to a dedicated line so deployment
/// misconfiguration is impossible to miss in aggregated logs.
pub fn log_error(err: &ServiceError, context: &str) {
    let category = err.category().as_str();
    let transient = err.transient_kind().map(|k| k.as_str());
    if err.is_critical() {
        error!(
            category,
            context,
            critical = true,
            error = %err,
            "CRITICAL: configuration fault in webhook pipeline"
        );
    } else {
        error!(
            category,
            context,
            transient = transient.unwrap_or("none"),
            error = %err,
            "Error occurred"
        );
    }
}

/// Redact an email address down to its first character and domain.
///
/// Log lines carry at most `j***@example.com`; the full address never
/// leaves the provider's records.
pub fn redact_email(email: &str) -> String {
    match email.split_once('@') {
        Some((local, domain)) => match local.chars().next() {
            Some(first) => format!("{}***@{}", first, domain),
            None => "***".to_string(),
        },
        None => "***".to_string(),
    }
}

/// Presence flag for optional PII fields. The value itself stays out of
/// the logs; audit only needs to know whether it was captured.
pub fn presence(value: Option<&str>) -> bool {
    value.map(|v| !v.is_empty()).unwrap_or(false)
}
