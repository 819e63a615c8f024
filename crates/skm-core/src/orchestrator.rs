//! Migration orchestrators
//!
//! Two plans over the same stage machine:
//! - [`MigrationOrchestrator`]: create a token, deploy the capability
//!   contract, resolve its registry id, hand it the supply key, mint.
//! - [`ContractRotationOrchestrator`]: move an existing token's supply key
//!   from a prior contract to a freshly deployed successor, mint.
//!
//! Steps run strictly in order. Every transition appends an audit record
//! whatever its outcome, and the first fatal error ends the run as
//! [`MigrationFailure`]. Only registry resolution retries, inside the
//! poller. A confirmed rotation is never rolled back.

use crate::abi::ContractCall;
use crate::audit::{AuditSink, AuditTrail, StepOutcome, StepRecord, TracingAuditSink};
use crate::authority::AuthorityExecutor;
use crate::config::{MigrationConfig, Operator, RotationTarget};
use crate::context::RunContext;
use crate::driver::ContractDriver;
use crate::error::{AuthorityError, MigrationError, MigrationFailure};
use crate::index_poller::IndexPoller;
use crate::key_spec::{CapabilityKeySpec, KeySlot, KeyValue, SupplyAuthority};
use crate::response_code::ResponseCode;
use crate::services::Services;
use crate::state_machine::{validate_transition, Plan, Stage};
use crate::types::{
    Bytecode, ContractId, ContractInstance, EvmAddress, OperationReceipt, RunId, TokenId,
};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::Instrument;

/// Outcome of a run that reached `Done`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MigrationSummary {
    /// Run id
    pub run_id: RunId,
    /// Plan followed
    pub plan: Plan,
    /// Token
    pub token_id: TokenId,
    /// Token's long-zero EVM address
    pub token_evm_address: EvmAddress,
    /// Contract now holding the supply key
    pub contract_address: EvmAddress,
    /// Its registry id, when resolved
    pub contract_registry_id: Option<ContractId>,
    /// Supply before the run minted
    pub initial_supply: u64,
    /// Supply after the verification mint
    pub final_supply: u64,
    /// Amount minted through the contract
    pub minted: i64,
    /// Supply authority before rotation
    pub initial_supply_authority: Option<SupplyAuthority>,
    /// Supply authority after rotation
    pub final_supply_authority: Option<SupplyAuthority>,
    /// Audit trail
    pub trail: AuditTrail,
}

impl std::fmt::Display for MigrationSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        fn authority(a: Option<&SupplyAuthority>) -> String {
            a.map_or_else(|| "none".to_string(), ToString::to_string)
        }

        writeln!(f, "run:                {}", self.run_id)?;
        writeln!(f, "token:              {} ({})", self.token_id, self.token_evm_address)?;
        match self.contract_registry_id {
            Some(id) => writeln!(f, "contract:           {} ({})", id, self.contract_address)?,
            None => writeln!(f, "contract:           {}", self.contract_address)?,
        }
        writeln!(f, "initial supply:     {}", self.initial_supply)?;
        writeln!(f, "final supply:       {}", self.final_supply)?;
        writeln!(f, "initial authority:  {}", authority(self.initial_supply_authority.as_ref()))?;
        write!(f, "final authority:    {}", authority(self.final_supply_authority.as_ref()))
    }
}

/// Current stage and audit trail of one run
struct RunState<'a> {
    run_id: RunId,
    plan: Plan,
    stage: Stage,
    trail: AuditTrail,
    sink: &'a dyn AuditSink,
}

impl<'a> RunState<'a> {
    fn new(plan: Plan, sink: &'a dyn AuditSink) -> Self {
        Self {
            run_id: RunId::new(),
            plan,
            stage: Stage::Init,
            trail: AuditTrail::new(),
            sink,
        }
    }

    fn record(&mut self, stage: Stage, outcome: StepOutcome, detail: String) {
        let record = StepRecord {
            run_id: self.run_id,
            stage,
            outcome,
            timestamp: Utc::now(),
            detail,
        };
        self.sink.record(&record);
        self.trail.push(record);
    }

    /// Legal next stage, and the run still live
    fn enter(&mut self, ctx: &RunContext, to: Stage) -> Result<(), MigrationFailure> {
        if let Err(e) = validate_transition(self.plan, self.stage, to) {
            return Err(self.fail(to, e.into()));
        }
        ctx.check().map_err(|e| self.fail(to, e.into()))?;
        tracing::debug!(from = %self.stage, %to, "entering stage");
        Ok(())
    }

    fn complete<T>(
        &mut self,
        to: Stage,
        result: Result<T, MigrationError>,
        detail: impl FnOnce(&T) -> String,
    ) -> Result<T, MigrationFailure> {
        match result {
            Ok(value) => {
                self.record(to, StepOutcome::Success, detail(&value));
                self.stage = to;
                Ok(value)
            }
            Err(error) => Err(self.fail(to, error)),
        }
    }

    fn fail(&mut self, stage: Stage, error: MigrationError) -> MigrationFailure {
        tracing::error!(%stage, kind = error.kind(), %error, "migration failed");
        self.record(stage, StepOutcome::FatalFailure, error.to_string());
        MigrationFailure {
            stage,
            error,
            trail: std::mem::take(&mut self.trail),
        }
    }
}

fn require_ok(operation: &'static str, code: ResponseCode) -> Result<ResponseCode, MigrationError> {
    let verdict = code.verdict();
    if verdict.ok {
        Ok(code)
    } else {
        Err(MigrationError::ContractResponseFailure {
            operation,
            code,
            category: verdict.category,
        })
    }
}

/// Locate the call's confirming event and require a success code
fn confirm(receipt: &OperationReceipt, call: &ContractCall) -> Result<ResponseCode, MigrationError> {
    let event = call.confirming_event();
    let found = receipt
        .find_event(event)
        .ok_or_else(|| MigrationError::EventNotObserved {
            method: call.method(),
            event,
            transaction_ref: receipt.transaction_ref.clone(),
        })?;
    require_ok(call.method(), found.response_code)
}

async fn invoke_confirmed(
    driver: &ContractDriver,
    instance: &ContractInstance,
    call: &ContractCall,
    gas_limit: u64,
) -> Result<OperationReceipt, MigrationError> {
    let receipt = driver
        .invoke(instance, call, gas_limit)
        .await
        .map_err(MigrationError::Invocation)?;
    confirm(&receipt, call)?;
    Ok(receipt)
}

/// Keypair-to-contract migration of a new token's supply key
pub struct MigrationOrchestrator {
    authority: AuthorityExecutor,
    driver: ContractDriver,
    poller: IndexPoller,
    bytecode: Bytecode,
    config: MigrationConfig,
    sink: Arc<dyn AuditSink>,
}

impl MigrationOrchestrator {
    /// Create new orchestrator over `services`
    #[must_use]
    pub fn new(services: &Services, operator: Operator, bytecode: Bytecode, config: MigrationConfig) -> Self {
        Self {
            authority: AuthorityExecutor::new(Arc::clone(&services.ledger), operator)
                .with_receipt_poll(config.receipt_poll),
            driver: ContractDriver::new(Arc::clone(&services.contracts)),
            poller: IndexPoller::new(Arc::clone(&services.index)),
            bytecode,
            config,
            sink: Arc::new(TracingAuditSink),
        }
    }

    /// With audit sink
    #[inline]
    #[must_use]
    pub fn with_audit_sink(mut self, sink: Arc<dyn AuditSink>) -> Self {
        self.sink = sink;
        self
    }

    /// Run the workflow to `Done` or the first fatal failure
    pub async fn run(&self, ctx: &RunContext) -> Result<MigrationSummary, MigrationFailure> {
        let mut run = RunState::new(Plan::KeypairToContract, self.sink.as_ref());
        let span = tracing::info_span!("migration", run_id = %run.run_id, plan = "keypair_to_contract");
        self.drive(ctx, &mut run).instrument(span).await
    }

    async fn drive(&self, ctx: &RunContext, run: &mut RunState<'_>) -> Result<MigrationSummary, MigrationFailure> {
        let config = &self.config;

        run.enter(ctx, Stage::TokenEstablished)?;
        let created = self
            .authority
            .create_token(ctx, &config.token)
            .await
            .map_err(MigrationError::from);
        let token = run.complete(Stage::TokenEstablished, created, |t| {
            format!("created {} with supply {}", t.token_id, t.total_supply)
        })?;
        let token_address = token.token_id.to_evm_address();

        run.enter(ctx, Stage::ContractDeployed)?;
        let deployed = self
            .driver
            .deploy(&self.bytecode, config.gas_limit)
            .await
            .map_err(MigrationError::Deployment);
        let instance = run.complete(Stage::ContractDeployed, deployed, |c| {
            format!("deployed at {}", c.native_address)
        })?;

        run.enter(ctx, Stage::RegistryResolved)?;
        let resolved = self
            .poller
            .resolve_registry_id_with(ctx, instance.native_address, config.index_poll, |attempt| {
                run.record(
                    Stage::RegistryResolved,
                    StepOutcome::RetryableFailure,
                    format!("not indexed yet (attempt {attempt})"),
                );
            })
            .await
            .map_err(MigrationError::from);
        let registry_id = run.complete(Stage::RegistryResolved, resolved, |id| format!("registry id {id}"))?;
        let instance = instance.with_registry_id(registry_id);

        run.enter(ctx, Stage::AuthorityRotated)?;
        let new_authority = KeyValue::from(&CapabilityKeySpec::ContractId(registry_id));
        let rotated = match self
            .authority
            .update_supply_key(ctx, token.token_id, &new_authority)
            .await
        {
            Ok(receipt) => require_ok("token_update", receipt.status).map(|_| receipt),
            Err(e) => Err(e.into()),
        };
        run.complete(Stage::AuthorityRotated, rotated, |r| {
            format!("supply key held by contract {registry_id} (tx {})", r.transaction_ref)
        })?;

        run.enter(ctx, Stage::MintVerified)?;
        if let Err(e) = ctx.sleep(config.settle_delay).await {
            return Err(run.fail(Stage::MintVerified, e.into()));
        }
        let mint = ContractCall::mint_tokens(token_address, config.mint_amount);
        let minted = invoke_confirmed(&self.driver, &instance, &mint, config.gas_limit).await;
        run.complete(Stage::MintVerified, minted, |r| {
            format!("minted {} (tx {})", config.mint_amount, r.transaction_ref)
        })?;

        run.enter(ctx, Stage::Done)?;
        let queried = self
            .authority
            .token_info(&token.token_id)
            .await
            .map_err(MigrationError::from);
        let final_token = run.complete(Stage::Done, queried, |t| format!("final supply {}", t.total_supply))?;

        Ok(MigrationSummary {
            run_id: run.run_id,
            plan: run.plan,
            token_id: token.token_id,
            token_evm_address: token_address,
            contract_address: instance.native_address,
            contract_registry_id: instance.registry_id,
            initial_supply: token.total_supply,
            final_supply: final_token.total_supply,
            minted: config.mint_amount,
            initial_supply_authority: token.supply_authority,
            final_supply_authority: final_token.supply_authority,
            trail: std::mem::take(&mut run.trail),
        })
    }
}

/// Contract-to-contract rotation of an existing token's supply key
pub struct ContractRotationOrchestrator {
    authority: AuthorityExecutor,
    driver: ContractDriver,
    bytecode: Bytecode,
    config: MigrationConfig,
    target: RotationTarget,
    sink: Arc<dyn AuditSink>,
}

impl ContractRotationOrchestrator {
    /// Create new orchestrator for `target`
    #[must_use]
    pub fn new(
        services: &Services,
        operator: Operator,
        bytecode: Bytecode,
        config: MigrationConfig,
        target: RotationTarget,
    ) -> Self {
        Self {
            authority: AuthorityExecutor::new(Arc::clone(&services.ledger), operator)
                .with_receipt_poll(config.receipt_poll),
            driver: ContractDriver::new(Arc::clone(&services.contracts)),
            bytecode,
            config,
            target,
            sink: Arc::new(TracingAuditSink),
        }
    }

    /// With audit sink
    #[inline]
    #[must_use]
    pub fn with_audit_sink(mut self, sink: Arc<dyn AuditSink>) -> Self {
        self.sink = sink;
        self
    }

    /// Run the rotation to `Done` or the first fatal failure
    pub async fn run(&self, ctx: &RunContext) -> Result<MigrationSummary, MigrationFailure> {
        let mut run = RunState::new(Plan::ContractToContract, self.sink.as_ref());
        let span = tracing::info_span!(
            "rotation",
            run_id = %run.run_id,
            token_id = %self.target.token_id,
            prior = %self.target.prior_contract
        );
        self.drive(ctx, &mut run).instrument(span).await
    }

    async fn drive(&self, ctx: &RunContext, run: &mut RunState<'_>) -> Result<MigrationSummary, MigrationFailure> {
        let config = &self.config;
        let token_id = self.target.token_id;
        let token_address = token_id.to_evm_address();

        run.enter(ctx, Stage::TokenEstablished)?;
        let queried = self.authority.token_info(&token_id).await.map_err(MigrationError::from);
        let token = run.complete(Stage::TokenEstablished, queried, |t| {
            format!("existing {} with supply {}", t.token_id, t.total_supply)
        })?;

        run.enter(ctx, Stage::ContractDeployed)?;
        let deployed = self
            .driver
            .deploy(&self.bytecode, config.gas_limit)
            .await
            .map_err(MigrationError::Deployment);
        let successor = run.complete(Stage::ContractDeployed, deployed, |c| {
            format!("successor deployed at {}", c.native_address)
        })?;

        run.enter(ctx, Stage::AuthorityRotated)?;
        let new_authority = KeyValue::from(&CapabilityKeySpec::EcdsaSecp256k1(
            successor.native_address.0.to_vec(),
        ));
        let rotated = match ContractCall::update_token_keys(token_address, vec![(KeySlot::Supply, new_authority)]) {
            Ok(call) => {
                let prior = ContractInstance::at(self.target.prior_contract);
                invoke_confirmed(&self.driver, &prior, &call, config.gas_limit).await
            }
            Err(e) => Err(AuthorityError::InvalidKeySpec(e).into()),
        };
        run.complete(Stage::AuthorityRotated, rotated, |r| {
            format!(
                "supply key moved {} -> {} (tx {})",
                self.target.prior_contract, successor.native_address, r.transaction_ref
            )
        })?;

        run.enter(ctx, Stage::MintVerified)?;
        let mint = ContractCall::mint_tokens(token_address, config.mint_amount);
        let minted = invoke_confirmed(&self.driver, &successor, &mint, config.gas_limit).await;
        run.complete(Stage::MintVerified, minted, |r| {
            format!("minted {} (tx {})", config.mint_amount, r.transaction_ref)
        })?;

        run.enter(ctx, Stage::Done)?;
        let queried = self.authority.token_info(&token_id).await.map_err(MigrationError::from);
        let final_token = run.complete(Stage::Done, queried, |t| format!("final supply {}", t.total_supply))?;

        Ok(MigrationSummary {
            run_id: run.run_id,
            plan: run.plan,
            token_id,
            token_evm_address: token_address,
            contract_address: successor.native_address,
            contract_registry_id: None,
            initial_supply: token.total_supply,
            final_supply: final_token.total_supply,
            minted: config.mint_amount,
            initial_supply_authority: token.supply_authority,
            final_supply_authority: final_token.supply_authority,
            trail: std::mem::take(&mut run.trail),
        })
    }
}
