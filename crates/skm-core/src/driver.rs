//! Contract Deployment & Invocation Driver

use crate::abi::{ContractCall, EventSchema};
use crate::error::InvocationError;
use crate::services::ContractExecutionService;
use crate::types::{Bytecode, ContractInstance, OperationReceipt};
use std::sync::Arc;

/// Deploys the capability contract and calls it
#[derive(Clone)]
pub struct ContractDriver {
    executor: Arc<dyn ContractExecutionService>,
    schema: EventSchema,
}

impl ContractDriver {
    /// Create new driver for the capability contract's event schema
    #[must_use]
    pub fn new(executor: Arc<dyn ContractExecutionService>) -> Self {
        Self {
            executor,
            schema: EventSchema::capability_contract(),
        }
    }

    /// With a different event schema
    #[inline]
    #[must_use]
    pub fn with_schema(mut self, schema: EventSchema) -> Self {
        self.schema = schema;
        self
    }

    /// Deploy `bytecode`; the instance has no registry id yet
    pub async fn deploy(
        &self,
        bytecode: &Bytecode,
        gas_limit: u64,
    ) -> Result<ContractInstance, InvocationError> {
        let address = self
            .executor
            .deploy_contract(bytecode, gas_limit)
            .await
            .map_err(InvocationError::Deploy)?;

        tracing::info!(%address, version = %bytecode.version(), "contract deployed");
        Ok(ContractInstance {
            native_address: address,
            registry_id: None,
            bytecode_version: bytecode.version(),
        })
    }

    /// Execute `call` on `instance` and decode the logs it emitted.
    ///
    /// Logs from other contracts and logs outside the schema are dropped.
    /// A non-success transaction status is an error; locating the
    /// confirming event is the caller's job.
    pub async fn invoke(
        &self,
        instance: &ContractInstance,
        call: &ContractCall,
        gas_limit: u64,
    ) -> Result<OperationReceipt, InvocationError> {
        let method = call.method();
        let receipt = self
            .executor
            .call_contract(&instance.native_address, call, gas_limit)
            .await
            .map_err(|source| InvocationError::Call { method, source })?;

        if !receipt.status.is_success() {
            tracing::error!(method, status = %receipt.status, tx = %receipt.transaction_hash, "call reverted");
            return Err(InvocationError::Reverted {
                method,
                status: receipt.status,
            });
        }

        let emitted_events = self.schema.decode_from(&instance.native_address, &receipt.logs);
        tracing::debug!(
            method,
            logs = receipt.logs.len(),
            decoded = emitted_events.len(),
            "call receipt decoded"
        );

        Ok(OperationReceipt {
            status: receipt.status,
            emitted_events,
            transaction_ref: receipt.transaction_hash,
        })
    }
}
