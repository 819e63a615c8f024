//! Mirror node client

use crate::dto::MirrorContract;
use crate::{base_url, error_from, http_client, transport, GatewayError, DEFAULT_TIMEOUT};
use async_trait::async_trait;
use reqwest::Client;
use skm_core::{ContractId, EvmAddress, IndexQueryService, ServiceError};
use std::time::Duration;

/// Index Query Service over the mirror node REST API
#[derive(Debug, Clone)]
pub struct MirrorNodeClient {
    client: Client,
    base_url: String,
}

impl MirrorNodeClient {
    /// Create a new client
    pub fn new(endpoint: &str) -> Result<Self, GatewayError> {
        Self::with_timeout(endpoint, DEFAULT_TIMEOUT)
    }

    /// Create with custom timeout
    pub fn with_timeout(endpoint: &str, timeout: Duration) -> Result<Self, GatewayError> {
        Ok(Self {
            client: http_client(timeout)?,
            base_url: base_url(endpoint)?,
        })
    }

    fn contract_url(&self, address: &EvmAddress) -> String {
        // the mirror node wants the bare hex form
        format!("{}/api/v1/contracts/{}", self.base_url, address.to_bare_hex())
    }
}

#[async_trait]
impl IndexQueryService for MirrorNodeClient {
    async fn lookup_by_native_address(&self, address: &EvmAddress) -> Result<ContractId, ServiceError> {
        let url = self.contract_url(address);
        tracing::debug!(%url, "mirror lookup");
        let response = self.client.get(&url).send().await.map_err(|e| transport(&e))?;
        if !response.status().is_success() {
            return Err(error_from(response).await);
        }

        let body: MirrorContract = response.json().await.map_err(|e| transport(&e))?;
        let id = body
            .contract_id
            .ok_or_else(|| ServiceError::NotFound(address.to_string()))?;
        id.parse()
            .map_err(|e| ServiceError::Malformed(format!("contract_id {id}: {e}")))
    }
}
