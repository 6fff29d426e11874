use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use serde::Deserialize;
use serde_json::json;
use tracing::instrument;

use crate::errors::ServiceError;
use crate::events::LineItem;
use crate::metrics;

use super::{
    CustomerDraft, CustomerRecord, CustomerUpdate, InventoryState, PaymentGateway, ProductRecord,
};

// Upstream error bodies get clipped before they reach logs
const MAX_ERROR_DETAIL: usize = 300;

/// HTTP client for the payment provider's REST API.
#[derive(Clone)]
pub struct HttpPaymentGateway {
    client: Client,
    base_url: String,
    api_key: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ApiList<T> {
    #[serde(default = "Vec::new")]
    data: Vec<T>,
}

impl HttpPaymentGateway {
    pub fn new(
        base_url: impl Into<String>,
        api_key: Option<String>,
        timeout: Duration,
    ) -> Result<Self, ServiceError> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key,
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    fn authorize(&self, request: RequestBuilder) -> RequestBuilder {
        metrics::increment_counter("settlement_gateway_requests_total");
        match &self.api_key {
            Some(key) => request.bearer_auth(key),
            None => request,
        }
    }

    async fn check(&self, response: Response) -> Result<Response, ServiceError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        if status == StatusCode::TOO_MANY_REQUESTS {
            let retry_after_secs = response
                .headers()
                .get("retry-after")
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.trim().parse().ok());
            return Err(ServiceError::RateLimited { retry_after_secs });
        }

        let mut detail = response.text().await.unwrap_or_default();
        if detail.len() > MAX_ERROR_DETAIL {
            let mut cut = MAX_ERROR_DETAIL;
            while !detail.is_char_boundary(cut) {
                cut -= 1;
            }
            detail.truncate(cut);
        }
        Err(ServiceError::ExternalApi {
            status: Some(status.as_u16()),
            detail,
        })
    }
}

#[async_trait]
impl PaymentGateway for HttpPaymentGateway {
    #[instrument(skip(self))]
    async fn fetch_product(&self, product_id: &str) -> Result<ProductRecord, ServiceError> {
        let response = self
            .authorize(
                self.client
                    .get(self.url(&format!("/v1/products/{}", product_id))),
            )
            .send()
            .await?;
        Ok(self.check(response).await?.json().await?)
    }

    #[instrument(skip(self, state))]
    async fn update_inventory(
        &self,
        product_id: &str,
        expected_version: i64,
        state: &InventoryState,
    ) -> Result<(), ServiceError> {
        let response = self
            .authorize(
                self.client
                    .post(self.url(&format!("/v1/products/{}/inventory", product_id))),
            )
            .json(&json!({
                "expected_version": expected_version,
                "metadata": state.to_metadata(),
            }))
            .send()
            .await?;

        if response.status() == StatusCode::CONFLICT {
            return Err(ServiceError::VersionConflict {
                product_id: product_id.to_string(),
            });
        }
        self.check(response).await?;
        Ok(())
    }

    #[instrument(skip(self))]
    async fn fetch_customer(&self, customer_id: &str) -> Result<CustomerRecord, ServiceError> {
        let response = self
            .authorize(
                self.client
                    .get(self.url(&format!("/v1/customers/{}", customer_id))),
            )
            .send()
            .await?;
        Ok(self.check(response).await?.json().await?)
    }

    #[instrument(skip(self, email))]
    async fn find_customer_by_email(
        &self,
        email: &str,
    ) -> Result<Option<CustomerRecord>, ServiceError> {
        let response = self
            .authorize(self.client.get(self.url("/v1/customers")))
            .query(&[("email", email), ("limit", "1")])
            .send()
            .await?;
        let list: ApiList<CustomerRecord> = self.check(response).await?.json().await?;
        Ok(list.data.into_iter().next())
    }

    #[instrument(skip(self, draft))]
    async fn create_customer(&self, draft: CustomerDraft) -> Result<CustomerRecord, ServiceError> {
        let response = self
            .authorize(self.client.post(self.url("/v1/customers")))
            .json(&draft)
            .send()
            .await?;
        Ok(self.check(response).await?.json().await?)
    }

    #[instrument(skip(self, update))]
    async fn update_customer(
        &self,
        customer_id: &str,
        update: CustomerUpdate,
    ) -> Result<CustomerRecord, ServiceError> {
        let response = self
            .authorize(
                self.client
                    .post(self.url(&format!("/v1/customers/{}", customer_id))),
            )
            .json(&update)
            .send()
            .await?;
        Ok(self.check(response).await?.json().await?)
    }

    #[instrument(skip(self))]
    async fn list_line_items(&self, session_id: &str) -> Result<Vec<LineItem>, ServiceError> {
        let response = self
            .authorize(self.client.get(self.url(&format!(
                "/v1/checkout/sessions/{}/line_items",
                session_id
            ))))
            .send()
            .await?;
        let list: ApiList<LineItem> = self.check(response).await?.json().await?;
        Ok(list.data)
    }
}
