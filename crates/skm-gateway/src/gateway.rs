//! JSON transaction gateway client
//!
//! Routes, relative to the network endpoint:
//! - `POST /v1/transactions` takes a signed transaction, answers `{transaction_id}`
//! - `GET /v1/transactions/{id}/receipt` answers the receipt, 404 while pending
//! - `GET /v1/tokens/{id}` answers the token snapshot
//! - `POST /v1/contracts` takes `{bytecode, gas}`, answers `{address}`
//! - `POST /v1/contracts/{address}/calls` takes `{method, args, gas}`,
//!   answers `{status, transaction_hash, logs}`
//!
//! Rejections come back as a 4xx with `{"status": <code>}`.

use crate::dto::{CallReceipt, CallRequest, DeployRequest, Deployed, Submitted};
use crate::{base_url, error_from, http_client, transport, GatewayError, DEFAULT_TIMEOUT};
use async_trait::async_trait;
use reqwest::{Client, RequestBuilder};
use serde::de::DeserializeOwned;
use skm_core::transaction::{LedgerReceipt, SignedTransaction};
use skm_core::{
    Bytecode, ContractCall, ContractExecutionService, EvmAddress, ExecutionReceipt,
    LedgerAuthorityService, ServiceError, TokenId, TokenRecord, TransactionId,
};
use std::time::Duration;

/// Ledger Authority and Contract Execution services over HTTP
#[derive(Debug, Clone)]
pub struct GatewayClient {
    client: Client,
    base_url: String,
}

impl GatewayClient {
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

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    async fn send<T: DeserializeOwned>(request: RequestBuilder) -> Result<T, ServiceError> {
        let response = request.send().await.map_err(|e| transport(&e))?;
        if response.status().is_success() {
            response.json().await.map_err(|e| transport(&e))
        } else {
            Err(error_from(response).await)
        }
    }
}

#[async_trait]
impl LedgerAuthorityService for GatewayClient {
    async fn submit_transaction(&self, transaction: &SignedTransaction) -> Result<TransactionId, ServiceError> {
        tracing::debug!(tx = %transaction.transaction_id, "submitting transaction");
        let submitted: Submitted =
            Self::send(self.client.post(self.url("/v1/transactions")).json(transaction)).await?;
        submitted
            .transaction_id
            .parse()
            .map_err(|e| ServiceError::Malformed(format!("transaction_id: {e}")))
    }

    async fn transaction_receipt(&self, transaction_id: &TransactionId) -> Result<LedgerReceipt, ServiceError> {
        let url = self.url(&format!("/v1/transactions/{transaction_id}/receipt"));
        Self::send(self.client.get(url)).await
    }

    async fn token_info(&self, token_id: &TokenId) -> Result<TokenRecord, ServiceError> {
        Self::send(self.client.get(self.url(&format!("/v1/tokens/{token_id}")))).await
    }
}

#[async_trait]
impl ContractExecutionService for GatewayClient {
    async fn deploy_contract(&self, bytecode: &Bytecode, gas_limit: u64) -> Result<EvmAddress, ServiceError> {
        let body = DeployRequest {
            bytecode: format!("0x{}", hex::encode(bytecode.as_bytes())),
            gas: gas_limit,
        };
        tracing::debug!(version = %bytecode.version(), gas = gas_limit, "deploying contract");
        let deployed: Deployed = Self::send(self.client.post(self.url("/v1/contracts")).json(&body)).await?;
        Ok(deployed.address)
    }

    async fn call_contract(
        &self,
        address: &EvmAddress,
        call: &ContractCall,
        gas_limit: u64,
    ) -> Result<ExecutionReceipt, ServiceError> {
        let body = CallRequest {
            method: call.method(),
            args: call.args(),
            gas: gas_limit,
        };
        let url = self.url(&format!("/v1/contracts/{address}/calls"));
        tracing::debug!(%address, method = body.method, "calling contract");
        let receipt: CallReceipt = Self::send(self.client.post(url).json(&body)).await?;
        let logs = crate::dto::decode_logs(receipt.logs);
        Ok(ExecutionReceipt {
            status: receipt.status,
            transaction_hash: receipt.transaction_hash,
            logs,
        })
    }
}
