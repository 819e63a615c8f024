//! Error types for the migration workflow
//!
//! One enum per component, folded into [`MigrationError`] at the
//! orchestrator:
//! - [`ConfigError`]: missing or malformed settings, raised before any network call
//! - [`AuthorityError`]: privileged ledger operations
//! - [`IndexError`]: registry resolution through the lagging index
//! - [`InvocationError`]: contract deployment and calls
//!
//! A failed run is returned as [`MigrationFailure`], which carries the stage
//! and the full audit trail.

use crate::audit::AuditTrail;
use crate::context::ContextError;
use crate::key_spec::KeySpecError;
use crate::response_code::ResponseCode;
use crate::services::ServiceError;
use crate::state_machine::{Stage, TransitionError};
use crate::types::{EvmAddress, TokenId, TransactionId};

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// A required setting is absent
    #[error("missing required setting: {0}")]
    Missing(&'static str),

    /// A setting is present but unusable
    #[error("invalid {field}: {reason}")]
    Invalid {
        /// Setting name
        field: &'static str,
        /// What is wrong with it
        reason: String,
    },

    /// Config file could not be read
    #[error("cannot read {path}: {source}")]
    Io {
        /// File path
        path: String,
        /// Underlying error
        #[source]
        source: std::io::Error,
    },

    /// Config file is not valid TOML for this schema
    #[error("cannot parse config: {0}")]
    Parse(#[from] toml::de::Error),
}

impl ConfigError {
    /// Create an `Invalid` error
    #[inline]
    pub fn invalid(field: &'static str, reason: impl Into<String>) -> Self {
        Self::Invalid {
            field,
            reason: reason.into(),
        }
    }
}

/// Errors from the Authority Transaction Executor
#[derive(Debug, thiserror::Error)]
pub enum AuthorityError {
    /// Requested authority is not a single-variant key spec
    #[error("invalid key spec: {0}")]
    InvalidKeySpec(#[from] KeySpecError),

    /// Transaction could not be frozen
    #[error("cannot freeze {operation}: {reason}")]
    Freeze {
        /// Operation name
        operation: &'static str,
        /// Serialization failure
        reason: String,
    },

    /// Submission failed before the ledger assigned a status
    #[error("{operation} submission failed: {source}")]
    Submission {
        /// Operation name
        operation: &'static str,
        /// Service error
        #[source]
        source: ServiceError,
    },

    /// Ledger rejected the operation
    #[error("{operation} rejected by ledger: {code}")]
    Rejected {
        /// Operation name
        operation: &'static str,
        /// Ledger status
        code: ResponseCode,
    },

    /// Receipt query failed with a non-pending error
    #[error("receipt for {transaction_id} unavailable: {source}")]
    ReceiptUnavailable {
        /// Transaction id
        transaction_id: TransactionId,
        /// Service error
        #[source]
        source: ServiceError,
    },

    /// Receipt did not reach consensus within the polling budget
    #[error("no receipt for {transaction_id} after {attempts} attempts")]
    ReceiptTimeout {
        /// Transaction id
        transaction_id: TransactionId,
        /// Receipt queries made
        attempts: u32,
    },

    /// Token-create receipt carried no token id
    #[error("receipt for {0} carries no token id")]
    MissingTokenId(TransactionId),

    /// Token query failed
    #[error("token {token_id} query failed: {source}")]
    TokenQuery {
        /// Token id
        token_id: TokenId,
        /// Service error
        #[source]
        source: ServiceError,
    },

    /// Run cancelled or expired while waiting for a receipt
    #[error("interrupted: {0}")]
    Interrupted(ContextError),
}

impl AuthorityError {
    /// Whether the caller may resubmit
    #[inline]
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Submission { source, .. } => source.is_retryable(),
            _ => false,
        }
    }

    /// Ledger status, when the ledger produced one
    #[must_use]
    pub fn status(&self) -> Option<ResponseCode> {
        match self {
            Self::Rejected { code, .. } => Some(*code),
            Self::Submission {
                source: ServiceError::Rejected(code),
                ..
            } => Some(*code),
            _ => None,
        }
    }
}

/// Errors from registry resolution
#[derive(Debug, thiserror::Error)]
pub enum IndexError {
    /// Address never became visible within the attempt budget
    #[error("{address} not indexed after {attempts} attempts")]
    Timeout {
        /// Contract address
        address: EvmAddress,
        /// Lookups made
        attempts: u32,
    },

    /// Lookup failed with a non-retryable error
    #[error("lookup of {address} failed on attempt {attempt}: {source}")]
    Lookup {
        /// Contract address
        address: EvmAddress,
        /// Attempt number
        attempt: u32,
        /// Service error
        #[source]
        source: ServiceError,
    },

    /// Run cancelled or expired between attempts
    #[error("interrupted: {0}")]
    Interrupted(ContextError),
}

/// Errors from contract deployment and calls
#[derive(Debug, thiserror::Error)]
pub enum InvocationError {
    /// Deployment failed
    #[error("deployment failed: {0}")]
    Deploy(#[source] ServiceError),

    /// Call could not be executed
    #[error("{method} call failed: {source}")]
    Call {
        /// Contract method
        method: &'static str,
        /// Service error
        #[source]
        source: ServiceError,
    },

    /// Call executed with a non-success transaction status
    #[error("{method} reverted with {status}")]
    Reverted {
        /// Contract method
        method: &'static str,
        /// Transaction status
        status: ResponseCode,
    },
}

impl InvocationError {
    /// Whether the caller may resubmit
    #[inline]
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Deploy(source) | Self::Call { source, .. } => source.is_retryable(),
            Self::Reverted { .. } => false,
        }
    }
}

/// Top-level migration error
#[derive(Debug, thiserror::Error)]
pub enum MigrationError {
    /// Missing or invalid settings
    #[error("configuration error: {0}")]
    Configuration(#[from] ConfigError),

    /// Privileged ledger operation failed
    #[error("authority error: {0}")]
    Authority(#[source] AuthorityError),

    /// Registry id not resolvable within the budget
    #[error("indexing timeout: {address} not indexed after {attempts} attempts")]
    IndexingTimeout {
        /// Contract address
        address: EvmAddress,
        /// Lookups made
        attempts: u32,
    },

    /// Index lookup failed permanently
    #[error("index lookup failed: {0}")]
    IndexLookup(#[source] IndexError),

    /// Transaction confirmed but its confirming event is absent
    #[error("{method} confirmed but no {event} event observed (tx {transaction_ref})")]
    EventNotObserved {
        /// Contract method
        method: &'static str,
        /// Expected event
        event: &'static str,
        /// Transaction reference
        transaction_ref: String,
    },

    /// Confirming event present with a failing code
    #[error("{operation} returned {code}")]
    ContractResponseFailure {
        /// Operation name
        operation: &'static str,
        /// Embedded code
        code: ResponseCode,
        /// Interpreted category
        category: &'static str,
    },

    /// Contract deployment failed
    #[error("deployment error: {0}")]
    Deployment(#[source] InvocationError),

    /// Contract call failed
    #[error("invocation error: {0}")]
    Invocation(#[source] InvocationError),

    /// Caller cancelled the run
    #[error("migration cancelled")]
    Cancelled,

    /// Run deadline passed
    #[error("migration deadline exceeded")]
    DeadlineExceeded,

    /// Orchestrator attempted an out-of-order step
    #[error(transparent)]
    IllegalTransition(#[from] TransitionError),
}

impl MigrationError {
    /// Taxonomy name of this error
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Configuration(_) => "ConfigurationError",
            Self::Authority(_) => "AuthorityError",
            Self::IndexingTimeout { .. } => "IndexingTimeoutError",
            Self::IndexLookup(_) => "IndexLookupError",
            Self::EventNotObserved { .. } => "EventNotObservedError",
            Self::ContractResponseFailure { .. } => "ContractResponseFailure",
            Self::Deployment(_) => "DeploymentError",
            Self::Invocation(_) => "InvocationError",
            Self::Cancelled => "Cancelled",
            Self::DeadlineExceeded => "DeadlineExceeded",
            Self::IllegalTransition(_) => "IllegalTransition",
        }
    }

    /// Whether the caller may retry the whole run without inspection
    ///
    /// Only transport failures qualify; a ledger or contract verdict never does.
    #[inline]
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Authority(e) => e.is_retryable(),
            Self::Deployment(e) | Self::Invocation(e) => e.is_retryable(),
            _ => false,
        }
    }

    /// Whether the run must not be retried as-is
    #[inline]
    #[must_use]
    pub fn is_fatal(&self) -> bool {
        !self.is_retryable()
    }
}

impl From<ContextError> for MigrationError {
    fn from(e: ContextError) -> Self {
        match e {
            ContextError::Cancelled => Self::Cancelled,
            ContextError::DeadlineExceeded => Self::DeadlineExceeded,
        }
    }
}

impl From<AuthorityError> for MigrationError {
    fn from(e: AuthorityError) -> Self {
        match e {
            AuthorityError::Interrupted(ctx) => ctx.into(),
            other => Self::Authority(other),
        }
    }
}

impl From<IndexError> for MigrationError {
    fn from(e: IndexError) -> Self {
        match e {
            IndexError::Timeout { address, attempts } => Self::IndexingTimeout { address, attempts },
            IndexError::Interrupted(ctx) => ctx.into(),
            lookup @ IndexError::Lookup { .. } => Self::IndexLookup(lookup),
        }
    }
}

/// A run that ended in `Failed(stage, cause)`
#[derive(Debug, thiserror::Error)]
#[error("migration failed at {stage}: {error}")]
pub struct MigrationFailure {
    /// Stage the failing transition targeted
    pub stage: Stage,
    /// Cause
    #[source]
    pub error: MigrationError,
    /// Every record appended before and including the failure
    pub trail: AuditTrail,
}
