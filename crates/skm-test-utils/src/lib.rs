//! Testing utilities for SKM workspace
//!
//! Shared fixtures: simulated networks for the end-to-end scenarios, a
//! seeded rotation target and an audit sink that keeps what it sees.

#![allow(missing_docs)]

use parking_lot::Mutex;
use skm_core::key_spec::CapabilityKeySpec;
use skm_core::test_harness::{network_for, simulated_operator, SimulatedNetwork, SimulatorConfig};
use skm_core::{
    AuditSink, KeyValue, MigrationConfig, Operator, ResponseCode, RotationTarget, Stage,
    StepOutcome, StepRecord, TokenSpec,
};
use std::sync::Arc;

pub const OPERATOR_SEED: u64 = 42;

pub fn test_operator() -> Operator {
    simulated_operator(OPERATOR_SEED)
}

pub fn test_config() -> MigrationConfig {
    MigrationConfig::default()
}

/// Everything succeeds after a short indexing lag
pub fn scenario_a() -> SimulatorConfig {
    SimulatorConfig::default().with_index_lag(3)
}

/// The supply-key update comes back `INVALID_SIGNATURE`
pub fn scenario_b() -> SimulatorConfig {
    scenario_a().with_rotation_status(ResponseCode::INVALID_SIGNATURE)
}

/// The index never catches up within the budget
pub fn scenario_c(config: &MigrationConfig) -> SimulatorConfig {
    SimulatorConfig::default().with_index_lag(config.index_poll.max_attempts + 5)
}

pub fn setup_network(operator: &Operator, config: SimulatorConfig) -> Arc<SimulatedNetwork> {
    network_for(operator, config)
}

/// Seed a token whose supply key is held by an already-indexed prior contract
pub fn seed_rotation_target(network: &SimulatedNetwork, operator: &Operator) -> RotationTarget {
    let prior = network.seed_contract();
    let registry_id = prior.registry_id.expect("seeded contracts are indexed");
    let admin = KeyValue::from(&CapabilityKeySpec::Ed25519(
        operator.signing_key.verifying_key().to_bytes().to_vec(),
    ));
    let supply = KeyValue::from(&CapabilityKeySpec::ContractId(registry_id));
    let token_id = network.seed_token(&TokenSpec::default(), operator.account, admin, supply);
    RotationTarget {
        token_id,
        prior_contract: prior.native_address,
    }
}

/// Audit sink that keeps every record it is handed
#[derive(Debug, Default)]
pub struct RecordingAuditSink {
    records: Mutex<Vec<StepRecord>>,
}

impl RecordingAuditSink {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn records(&self) -> Vec<StepRecord> {
        self.records.lock().clone()
    }

    pub fn stages(&self, outcome: StepOutcome) -> Vec<Stage> {
        self.records
            .lock()
            .iter()
            .filter(|r| r.outcome == outcome)
            .map(|r| r.stage)
            .collect()
    }
}

impl AuditSink for RecordingAuditSink {
    fn record(&self, record: &StepRecord) {
        self.records.lock().push(record.clone());
    }
}
