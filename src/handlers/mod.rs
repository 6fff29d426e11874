pub mod health;
pub mod metrics_endpoint;
pub mod webhooks;
