//! End-to-end scenarios for the keypair-to-contract migration.
//!
//! Every test drives the real orchestrator against the simulated network:
//! - A: everything succeeds after a short indexing lag
//! - B: the supply-key update comes back with a failing status
//! - C: the index never catches up
//! plus deadline, dropped-event and audit-sink behavior.

use skm_core::test_harness::{simulate_migration, stub_bytecode, SimulatorConfig};
use skm_core::{
    MigrationError, MigrationOrchestrator, RunContext, Stage, StepOutcome, SupplyAuthority,
};
use skm_test_utils::{
    scenario_a, scenario_b, scenario_c, setup_network, test_config, test_operator,
    RecordingAuditSink,
};
use std::time::Duration;

/// Tenet: a clean run reaches Done and reports the minted supply.
#[tokio::test(start_paused = true)]
async fn scenario_a_completes_with_minted_supply() {
    let operator = test_operator();
    let operator_key = operator.public_key_hex();

    let (network, outcome) =
        simulate_migration(&RunContext::unbounded(), scenario_a(), test_config(), operator).await;
    let summary = outcome.expect("scenario A completes");

    assert_eq!(summary.initial_supply, 1_000_000);
    assert_eq!(summary.final_supply, 1_005_000);
    assert_eq!(summary.initial_supply_authority, Some(SupplyAuthority::Key(operator_key)));
    let registry_id = summary.contract_registry_id.expect("registry id resolved");
    assert_eq!(summary.final_supply_authority, Some(SupplyAuthority::Contract(registry_id)));
    assert_eq!(summary.token_evm_address, summary.token_id.to_evm_address());

    assert_eq!(
        summary.trail.completed_stages(),
        vec![
            Stage::TokenEstablished,
            Stage::ContractDeployed,
            Stage::RegistryResolved,
            Stage::AuthorityRotated,
            Stage::MintVerified,
            Stage::Done,
        ]
    );
    assert_eq!(
        summary.trail.count(Stage::RegistryResolved, StepOutcome::RetryableFailure),
        3
    );
    assert_eq!(network.call_count("mintTokens"), 1);
    assert_eq!(network.index_lookups(), 4);
}

/// Tenet: a failing key-update status stops the run before any mint.
#[tokio::test(start_paused = true)]
async fn scenario_b_fails_at_rotation_without_minting() {
    let (network, outcome) =
        simulate_migration(&RunContext::unbounded(), scenario_b(), test_config(), test_operator()).await;
    let failure = outcome.expect_err("scenario B fails");

    assert_eq!(failure.stage, Stage::AuthorityRotated);
    match &failure.error {
        MigrationError::ContractResponseFailure { code, category, .. } => {
            assert_eq!(code.0, 7);
            assert_eq!(*category, "INVALID_SIGNATURE");
        }
        other => panic!("expected ContractResponseFailure, got {other:?}"),
    }

    assert_eq!(network.call_count("mintTokens"), 0);
    assert!(!failure.trail.touched(Stage::MintVerified));

    let token_id = network.token_ids()[0];
    let token = network.token(&token_id).expect("token exists");
    assert_eq!(token.total_supply, 1_000_000);
    assert!(matches!(token.supply_authority, Some(SupplyAuthority::Key(_))));
}

/// Tenet: an index that never catches up is a timeout after exactly the budget.
#[tokio::test(start_paused = true)]
async fn scenario_c_times_out_resolving_registry() {
    let config = test_config();
    let budget = config.index_poll.max_attempts;

    let (network, outcome) = simulate_migration(
        &RunContext::unbounded(),
        scenario_c(&config),
        config,
        test_operator(),
    )
    .await;
    let failure = outcome.expect_err("scenario C fails");

    assert_eq!(failure.stage, Stage::RegistryResolved);
    assert!(matches!(
        failure.error,
        MigrationError::IndexingTimeout { attempts, .. } if attempts == budget
    ));
    assert_eq!(network.index_lookups(), budget);
    assert_eq!(
        failure.trail.count(Stage::RegistryResolved, StepOutcome::RetryableFailure),
        budget as usize
    );
    assert!(!failure.trail.touched(Stage::AuthorityRotated));
}

/// Tenet: the run deadline interrupts polling instead of waiting out the budget.
#[tokio::test(start_paused = true)]
async fn deadline_interrupts_registry_polling() {
    let config = test_config();
    let ctx = RunContext::unbounded().with_timeout(Duration::from_millis(3_500));

    let (network, outcome) =
        simulate_migration(&ctx, scenario_c(&config), config, test_operator()).await;
    let failure = outcome.expect_err("deadline hits");

    assert_eq!(failure.stage, Stage::RegistryResolved);
    assert!(matches!(failure.error, MigrationError::DeadlineExceeded));
    assert!(network.index_lookups() < 10);
}

/// Tenet: a missing confirming event is its own failure, and the rotation stays committed.
#[tokio::test(start_paused = true)]
async fn dropped_mint_event_is_event_not_observed() {
    let simulator = SimulatorConfig::default().with_dropped_mint_events();
    let (network, outcome) =
        simulate_migration(&RunContext::unbounded(), simulator, test_config(), test_operator()).await;
    let failure = outcome.expect_err("mint unconfirmed");

    assert_eq!(failure.stage, Stage::MintVerified);
    assert_eq!(failure.error.kind(), "EventNotObservedError");

    let token = network.token(&network.token_ids()[0]).expect("token exists");
    assert!(matches!(token.supply_authority, Some(SupplyAuthority::Contract(_))));
}

/// Tenet: the audit sink sees exactly what ends up in the trail.
#[tokio::test(start_paused = true)]
async fn audit_sink_mirrors_trail() {
    let operator = test_operator();
    let network = setup_network(&operator, scenario_a());
    let sink = RecordingAuditSink::new();

    let summary = MigrationOrchestrator::new(&network.services(), operator, stub_bytecode(), test_config())
        .with_audit_sink(sink.clone())
        .run(&RunContext::unbounded())
        .await
        .expect("run completes");

    assert_eq!(sink.records(), summary.trail.records().to_vec());
    assert!(sink.stages(StepOutcome::FatalFailure).is_empty());
    assert!(summary
        .trail
        .records()
        .iter()
        .all(|r| r.run_id == summary.run_id));
}

/// Tenet: cancelling mid-run stops at the next suspend point.
#[tokio::test(start_paused = true)]
async fn cancellation_during_settle_delay() {
    let operator = test_operator();
    let network = setup_network(&operator, SimulatorConfig::default().with_index_lag(0));
    let (ctx, cancel) = RunContext::new();
    let orchestrator =
        MigrationOrchestrator::new(&network.services(), operator, stub_bytecode(), test_config());

    let run = orchestrator.run(&ctx);
    let cancel_later = async {
        tokio::time::sleep(Duration::from_secs(3)).await;
        cancel.cancel();
    };
    let (outcome, ()) = tokio::join!(run, cancel_later);
    let failure = outcome.expect_err("cancelled");

    assert_eq!(failure.stage, Stage::MintVerified);
    assert!(matches!(failure.error, MigrationError::Cancelled));
    assert_eq!(network.call_count("mintTokens"), 0);
}
