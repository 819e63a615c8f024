//! External service seams
//!
//! The workflow drives three systems it does not own:
//! - the Ledger Authority Service (token registry and consensus),
//! - the Contract Execution Service (deploys and calls contracts),
//! - the Index Query Service (eventually-consistent read replica).
//!
//! Each is a trait held as `Arc<dyn _>` so tests and the simulator can stand
//! in for the network.

use crate::abi::ContractCall;
use crate::response_code::ResponseCode;
use crate::transaction::{LedgerReceipt, SignedTransaction};
use crate::types::{Bytecode, ContractId, EvmAddress, LogEntry, TokenId, TokenRecord, TransactionId};
use async_trait::async_trait;
use std::sync::Arc;

/// Errors reported by external services
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ServiceError {
    /// The requested entity is not (yet) known to the service
    #[error("not found: {0}")]
    NotFound(String),

    /// The request itself is invalid (e.g. malformed address)
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// Network or transport failure
    #[error("transport failure: {0}")]
    Transport(String),

    /// The service rejected the operation with a ledger status
    #[error("rejected with {0}")]
    Rejected(ResponseCode),

    /// The service answered with something unparseable
    #[error("malformed response: {0}")]
    Malformed(String),
}

impl ServiceError {
    /// Whether this is the "not found" case
    #[inline]
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }

    /// Whether a caller may safely resubmit
    #[inline]
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Transport(_))
    }
}

/// Raw receipt of a contract execution
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutionReceipt {
    /// Transaction-level status
    pub status: ResponseCode,
    /// EVM transaction hash
    pub transaction_hash: String,
    /// Logs in emission order, possibly from several contracts
    pub logs: Vec<LogEntry>,
}

/// Token registry and consensus
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait LedgerAuthorityService: Send + Sync {
    /// Submit a frozen, signed transaction
    async fn submit_transaction(
        &self,
        transaction: &SignedTransaction,
    ) -> Result<TransactionId, ServiceError>;

    /// Fetch the consensus receipt; `NotFound` while it is pending
    async fn transaction_receipt(
        &self,
        transaction_id: &TransactionId,
    ) -> Result<LedgerReceipt, ServiceError>;

    /// Current token snapshot
    async fn token_info(&self, token_id: &TokenId) -> Result<TokenRecord, ServiceError>;
}

/// Contract deployment and execution
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ContractExecutionService: Send + Sync {
    /// Deploy bytecode; returns the contract's EVM address
    async fn deploy_contract(
        &self,
        bytecode: &Bytecode,
        gas_limit: u64,
    ) -> Result<EvmAddress, ServiceError>;

    /// Execute a method and wait for its receipt
    async fn call_contract(
        &self,
        address: &EvmAddress,
        call: &ContractCall,
        gas_limit: u64,
    ) -> Result<ExecutionReceipt, ServiceError>;
}

/// Eventually-consistent read replica
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait IndexQueryService: Send + Sync {
    /// Map a contract's EVM address to its registry id; `NotFound` while not indexed
    async fn lookup_by_native_address(
        &self,
        address: &EvmAddress,
    ) -> Result<ContractId, ServiceError>;
}

/// The three services a run drives
#[derive(Clone)]
pub struct Services {
    /// Token registry and consensus
    pub ledger: Arc<dyn LedgerAuthorityService>,
    /// Contract deployment and execution
    pub contracts: Arc<dyn ContractExecutionService>,
    /// Read replica
    pub index: Arc<dyn IndexQueryService>,
}

impl Services {
    /// Bundle three service handles
    #[inline]
    #[must_use]
    pub fn new(
        ledger: Arc<dyn LedgerAuthorityService>,
        contracts: Arc<dyn ContractExecutionService>,
        index: Arc<dyn IndexQueryService>,
    ) -> Self {
        Self {
            ledger,
            contracts,
            index,
        }
    }
}
