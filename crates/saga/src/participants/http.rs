//! HTTP participant client.

use std::time::Duration;

use async_trait::async_trait;
use common::AggregateId;
use reqwest::Client;
use serde::Serialize;

use super::{Ack, ParticipantClient};
use crate::error::NotifierError;
use crate::events::ProductInfo;

/// Path the participant exposes for performing its action.
pub const REQUEST_PATH: &str = "/api/request";

/// Path the participant exposes for undoing its action.
pub const COMPENSATION_PATH: &str = "/api/compensate";

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct OrderSagaInfo<'a> {
    saga_id: &'a str,
    product: &'a ProductInfo,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ParticipantFailureInfo<'a> {
    saga_id: &'a str,
    external_id: &'a str,
    cause: &'a str,
}

/// Participant reached over HTTP.
///
/// Requests are `POST {base_url}/api/request` with `{sagaId, product}` and
/// `POST {base_url}/api/compensate` with `{sagaId, externalId, cause}`. Any
/// non-2xx answer is reported as [`NotifierError::Rejected`].
#[derive(Debug, Clone)]
pub struct HttpParticipant {
    client: Client,
    base_url: String,
}

impl HttpParticipant {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self, NotifierError> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self::with_client(client, base_url))
    }

    /// Uses an existing client, sharing its connection pool.
    pub fn with_client(client: Client, base_url: impl Into<String>) -> Self {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        Self { client, base_url }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    async fn post<T: Serialize + Sync>(&self, path: &str, body: &T) -> Result<Ack, NotifierError> {
        let url = format!("{}{}", self.base_url, path);
        let response = self.client.post(&url).json(body).send().await?;

        let status = response.status();
        let body = response.text().await.unwrap_or_default();

        if status.is_success() {
            tracing::debug!(%url, %status, "participant accepted call");
            Ok(Ack { body })
        } else {
            tracing::warn!(%url, %status, body = %body, "participant rejected call");
            Err(NotifierError::Rejected {
                status: status.as_u16(),
                body: body.chars().take(200).collect(),
            })
        }
    }
}

#[async_trait]
impl ParticipantClient for HttpParticipant {
    async fn request_action(
        &self,
        saga_id: &AggregateId,
        product: &ProductInfo,
    ) -> Result<Ack, NotifierError> {
        let body = OrderSagaInfo {
            saga_id: saga_id.as_str(),
            product,
        };
        self.post(REQUEST_PATH, &body).await
    }

    async fn compensate_action(
        &self,
        saga_id: &AggregateId,
        external_id: &str,
        cause: &str,
    ) -> Result<Ack, NotifierError> {
        let body = ParticipantFailureInfo {
            saga_id: saga_id.as_str(),
            external_id,
            cause,
        };
        self.post(COMPENSATION_PATH, &body).await
    }
}
