//! Request/response side of the monitoring server.

use async_trait::async_trait;
use monitor_core::{CreateEndpointRequest, EndpointRecord, Error, Result};
use reqwest::{Client, Response};
use std::time::Duration;
use tracing::{debug, warn};
use url::Url;

/// Server operations the dashboard issues. Implemented over HTTP by
/// [`ReqwestApi`]; tests substitute their own.
#[async_trait]
pub trait EndpointApi: Send + Sync {
    /// `GET /api/endpoints`
    async fn list_endpoints(&self) -> Result<Vec<EndpointRecord>>;

    /// `POST /api/endpoints`
    async fn create_endpoint(&self, request: &CreateEndpointRequest) -> Result<()>;

    /// `POST /api/endpoints/{id}/check`
    async fn check_endpoint(&self, id: &str) -> Result<()>;

    /// `DELETE /api/endpoints/{id}`
    async fn delete_endpoint(&self, id: &str) -> Result<()>;
}

#[derive(Debug, Clone)]
pub struct ReqwestApi {
    client: Client,
    base_url: Url,
}

impl ReqwestApi {
    pub fn new(base_url: Url, timeout: Duration) -> Result<Self> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self { client, base_url })
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    fn endpoint_url(&self, segments: &[&str]) -> Result<Url> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| Error::internal(format!("{} cannot be a base URL", self.base_url)))?
            .pop_if_empty()
            .extend(["api", "endpoints"])
            .extend(segments);
        Ok(url)
    }
}

/// Decodes a `GET /api/endpoints` body. The body must be a JSON array; an
/// entry that does not decode is skipped so the rest still loads.
pub fn decode_snapshot(body: &str) -> Result<Vec<EndpointRecord>> {
    let entries: Vec<serde_json::Value> = serde_json::from_str(body)?;
    let total = entries.len();
    let records: Vec<EndpointRecord> = entries
        .into_iter()
        .enumerate()
        .filter_map(|(position, entry)| match serde_json::from_value(entry) {
            Ok(record) => Some(record),
            Err(e) => {
                warn!("Skipping malformed endpoint at position {}: {}", position, e);
                None
            }
        })
        .collect();
    if records.len() < total {
        warn!("Loaded {} of {} endpoints", records.len(), total);
    }
    Ok(records)
}

async fn ensure_success(response: Response) -> Result<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    Err(Error::rejected(status.as_u16(), body.trim()))
}

#[async_trait]
impl EndpointApi for ReqwestApi {
    async fn list_endpoints(&self) -> Result<Vec<EndpointRecord>> {
        let url = self.endpoint_url(&[])?;
        debug!("GET {}", url);
        let response = ensure_success(self.client.get(url).send().await?).await?;
        let body = response.text().await?;
        decode_snapshot(&body)
    }

    async fn create_endpoint(&self, request: &CreateEndpointRequest) -> Result<()> {
        let url = self.endpoint_url(&[])?;
        debug!("POST {} ({})", url, request.name);
        ensure_success(self.client.post(url).json(request).send().await?).await?;
        Ok(())
    }

    async fn check_endpoint(&self, id: &str) -> Result<()> {
        let url = self.endpoint_url(&[id, "check"])?;
        debug!("POST {}", url);
        ensure_success(self.client.post(url).send().await?).await?;
        Ok(())
    }

    async fn delete_endpoint(&self, id: &str) -> Result<()> {
        let url = self.endpoint_url(&[id])?;
        debug!("DELETE {}", url);
        match ensure_success(self.client.delete(url).send().await?).await {
            Err(Error::Rejected { status: 404, .. }) => {
                Err(Error::not_found(format!("endpoint {}", id)))
            }
            other => other.map(|_| ()),
        }
    }
}
