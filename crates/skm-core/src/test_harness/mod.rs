//! Simulated network and a ready-made migration run against it.
//!
//! Backs the `simulate` CLI subcommand and the integration tests.

mod simulator;

pub use simulator::{SimulatedNetwork, SimulatorConfig};

use crate::config::{MigrationConfig, Operator};
use crate::context::RunContext;
use crate::error::MigrationFailure;
use crate::orchestrator::{MigrationOrchestrator, MigrationSummary};
use crate::types::{AccountId, Bytecode};
use ed25519_dalek::SigningKey;
use sha2::{Digest, Sha256};
use std::sync::Arc;

/// Account the simulated operator pays from
pub const SIMULATED_OPERATOR: AccountId = AccountId::new(0, 0, 2);

/// Deterministic operator derived from `seed`
#[must_use]
pub fn simulated_operator(seed: u64) -> Operator {
    let secret: [u8; 32] = Sha256::digest(seed.to_be_bytes()).into();
    Operator::new(SIMULATED_OPERATOR, SigningKey::from_bytes(&secret))
}

/// Placeholder bytecode; the simulator does not execute it
#[must_use]
pub fn stub_bytecode() -> Bytecode {
    Bytecode::new(vec![0x60, 0x80, 0x60, 0x40, 0x52])
}

/// Network with `operator` registered
#[must_use]
pub fn network_for(operator: &Operator, config: SimulatorConfig) -> Arc<SimulatedNetwork> {
    let network = Arc::new(SimulatedNetwork::new(config));
    network.register_account(operator.account, operator.signing_key.verifying_key());
    network
}

/// Run the keypair-to-contract migration against a fresh simulated network
pub async fn simulate_migration(
    ctx: &RunContext,
    simulator: SimulatorConfig,
    config: MigrationConfig,
    operator: Operator,
) -> (Arc<SimulatedNetwork>, Result<MigrationSummary, MigrationFailure>) {
    let network = network_for(&operator, simulator);
    let orchestrator = MigrationOrchestrator::new(&network.services(), operator, stub_bytecode(), config);
    let outcome = orchestrator.run(ctx).await;
    (network, outcome)
}
