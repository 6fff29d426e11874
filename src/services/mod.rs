// Settlement pipeline services
pub mod consent;
pub mod customers;
pub mod inventory;
pub mod ledger;
pub mod marketplace;
pub mod orders;
pub mod settlement;

use std::future::Future;

use crate::errors::ServiceError;
use crate::tracing::log_error;

/// Run a side write that must never abort the main settlement flow.
///
/// Failures are logged under the operation name and swallowed; the
/// return value says only whether the write landed.
pub async fn attempt_non_critical<F, Fut, T>(name: &str, op: F) -> Option<T>
where
    F: FnOnce() -> Fut,
    Fut: Future<Output = Result<T, ServiceError>>,
{
    match op().await {
        Ok(value) => Some(value),
        Err(err) => {
            log_error(&err, name);
            None
        }
    }
}
