//! SKM Core - Supply Key Migration
//!
//! Moves a fungible token's supply key from an operator keypair to a
//! capability contract and proves it with a mint through the contract:
//! - Interprets ledger response codes
//! - Polls the lagging index for contract registry ids
//! - Signs and confirms privileged token transactions
//! - Deploys and calls the capability contract, decoding its events
//! - Sequences all of it as a stage machine with an audit trail
//!
//! # Example
//!
//! ```rust,ignore
//! use skm_core::prelude::*;
//! use skm_core::test_harness::{simulate_migration, simulated_operator, SimulatorConfig};
//!
//! # async fn example() {
//! let (_, outcome) = simulate_migration(
//!     &RunContext::unbounded(),
//!     SimulatorConfig::default(),
//!     MigrationConfig::default(),
//!     simulated_operator(42),
//! )
//! .await;
//!
//! let summary = outcome.expect("migration completes");
//! assert_eq!(summary.final_supply, 1_005_000);
//! # }
//! ```

#![warn(unreachable_pub)]

// Leaf modules
pub mod abi;
pub mod context;
pub mod key_spec;
pub mod poll;
pub mod response_code;
pub mod types;

// Service seams and transactions
pub mod services;
pub mod transaction;

// Components
pub mod authority;
pub mod driver;
pub mod index_poller;

// Orchestration
pub mod audit;
pub mod config;
pub mod error;
pub mod orchestrator;
pub mod state_machine;

pub mod test_harness;

// Re-exports for convenience
pub use abi::{ContractCall, EventSchema, RESPONSE_CODE_EVENT, TOKEN_MINT_COMPLETE_EVENT};
pub use audit::{AuditSink, AuditTrail, StepOutcome, StepRecord, TracingAuditSink};
pub use authority::AuthorityExecutor;
pub use config::{
    MigrationConfig, Operator, OperatorConfig, OperatorKeyType, RotationTarget, ValidatedOperator,
};
pub use context::{CancelHandle, ContextError, RunContext};
pub use driver::ContractDriver;
pub use error::{
    AuthorityError, ConfigError, IndexError, InvocationError, MigrationError, MigrationFailure,
};
pub use index_poller::IndexPoller;
pub use key_spec::{CapabilityKeySpec, KeySlot, KeySpecError, KeyValue, SupplyAuthority};
pub use orchestrator::{ContractRotationOrchestrator, MigrationOrchestrator, MigrationSummary};
pub use poll::{poll_until, PollError, PollPolicy, Polled, Probe};
pub use response_code::{interpret, ResponseCode, Verdict};
pub use services::{
    ContractExecutionService, ExecutionReceipt, IndexQueryService, LedgerAuthorityService,
    ServiceError, Services,
};
pub use state_machine::{Plan, Stage};
pub use types::{
    AccountId, Bytecode, ContractId, ContractInstance, DecodedEvent, EvmAddress, LogEntry,
    OperationReceipt, RunId, TokenId, TokenRecord, TokenSpec, TransactionId,
};

/// Prelude module for common imports
pub mod prelude {
    //! Common imports for running a migration
    pub use crate::{
        Bytecode, ContractRotationOrchestrator, MigrationConfig, MigrationError, MigrationFailure,
        MigrationOrchestrator, MigrationSummary, Operator, OperatorConfig, RunContext, Services,
        Stage,
    };
}

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
