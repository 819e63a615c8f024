//! Subcommand bodies
//!
//! Everything that can fail before a run starts surfaces as an `anyhow`
//! error (exit 2); a run that started always yields a [`RunOutcome`].

use anyhow::{Context, Result};
use clap::ArgMatches;
use skm_core::test_harness::{simulate_migration, simulated_operator, SimulatorConfig};
use skm_core::{
    Bytecode, ConfigError, ContractRotationOrchestrator, MigrationConfig, MigrationFailure,
    MigrationOrchestrator, MigrationSummary, OperatorConfig, Plan, ResponseCode, RunContext,
    Services, ValidatedOperator,
};
use skm_gateway::{GatewayClient, MirrorNodeClient};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

/// Result of a run that got past pre-flight
pub(crate) type RunOutcome = std::result::Result<MigrationSummary, MigrationFailure>;

/// Migration tunables from `--config`, with `--deadline-secs` on top
pub(crate) fn load_config(matches: &ArgMatches) -> Result<MigrationConfig> {
    let mut config = match matches.get_one::<PathBuf>("config") {
        Some(path) => MigrationConfig::load(path)?,
        None => MigrationConfig::default(),
    };
    if let Some(secs) = matches.get_one::<u64>("deadline-secs") {
        config = config.with_deadline(Duration::from_secs(*secs));
    }
    Ok(config)
}

/// `skm migrate`
pub(crate) async fn migrate(args: &ArgMatches, config: MigrationConfig) -> Result<RunOutcome> {
    let validated = operator_config(args).validate(Plan::KeypairToContract)?;
    let bytecode = load_bytecode(bytecode_path(args)?)?;
    let services = live_services(&validated)?;
    tracing::info!(
        operator = %validated.operator.account,
        network = %validated.network_endpoint,
        mirror = %validated.mirror_endpoint,
        bytecode = %bytecode.version(),
        "starting keypair-to-contract migration"
    );

    let ctx = run_context(&config);
    let orchestrator = MigrationOrchestrator::new(&services, validated.operator, bytecode, config);
    Ok(orchestrator.run(&ctx).await)
}

/// `skm rotate`
pub(crate) async fn rotate(args: &ArgMatches, config: MigrationConfig) -> Result<RunOutcome> {
    let validated = operator_config(args).validate(Plan::ContractToContract)?;
    let target = validated.rotation.ok_or(ConfigError::Missing("TOKEN_ID"))?;
    let bytecode = load_bytecode(bytecode_path(args)?)?;
    let services = live_services(&validated)?;
    tracing::info!(
        operator = %validated.operator.account,
        token_id = %target.token_id,
        prior = %target.prior_contract,
        "starting contract-to-contract rotation"
    );

    let ctx = run_context(&config);
    let orchestrator =
        ContractRotationOrchestrator::new(&services, validated.operator, bytecode, config, target);
    Ok(orchestrator.run(&ctx).await)
}

/// `skm simulate`
pub(crate) async fn simulate(args: &ArgMatches, config: MigrationConfig) -> Result<RunOutcome> {
    let simulator = simulator_config(args);
    let seed = args.get_one::<u64>("seed").copied().unwrap_or(42);
    tracing::info!(
        index_lag = simulator.index_lag,
        rotation_status = ?simulator.rotation_status,
        drop_mint_events = simulator.drop_mint_events,
        "starting simulated migration"
    );

    let ctx = run_context(&config);
    let (network, outcome) = simulate_migration(&ctx, simulator, config, simulated_operator(seed)).await;
    tracing::debug!(
        index_lookups = network.index_lookups(),
        mint_calls = network.call_count("mintTokens"),
        "simulated network drained"
    );
    Ok(outcome)
}

pub(crate) fn simulator_config(args: &ArgMatches) -> SimulatorConfig {
    let mut simulator = SimulatorConfig::default();
    if let Some(lag) = args.get_one::<u32>("index-lag") {
        simulator = simulator.with_index_lag(*lag);
    }
    if let Some(code) = args.get_one::<i64>("reject-rotation") {
        simulator = simulator.with_rotation_status(ResponseCode(*code));
    }
    if args.get_flag("drop-mint-event") {
        simulator = simulator.with_dropped_mint_events();
    }
    simulator
}

pub(crate) fn operator_config(args: &ArgMatches) -> OperatorConfig {
    // `token-id` and `prior-contract` exist on `rotate` only
    let get = |name: &str| args.try_get_one::<String>(name).ok().flatten().cloned();
    OperatorConfig {
        operator_key: get("operator-key"),
        operator_key_type: get("operator-key-type"),
        operator_id: get("operator-id"),
        network_endpoint: get("network-endpoint"),
        mirror_endpoint: get("mirror-endpoint"),
        token_id: get("token-id"),
        prior_contract: get("prior-contract"),
    }
}

fn bytecode_path(args: &ArgMatches) -> Result<&Path> {
    args.get_one::<PathBuf>("bytecode")
        .map(PathBuf::as_path)
        .ok_or(ConfigError::Missing("CONTRACT_BYTECODE").into())
}

/// Compiler artifact (`.json`) or a plain hex file
pub(crate) fn load_bytecode(path: &Path) -> Result<Bytecode> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("reading bytecode from {}", path.display()))?;
    let parsed = if path.extension().is_some_and(|ext| ext == "json") {
        Bytecode::from_artifact_json(&text)
    } else {
        Bytecode::from_hex(&text)
    };
    parsed.with_context(|| format!("parsing bytecode from {}", path.display()))
}

fn live_services(validated: &ValidatedOperator) -> Result<Services> {
    let gateway = Arc::new(GatewayClient::new(&validated.network_endpoint)?);
    let mirror = Arc::new(MirrorNodeClient::new(&validated.mirror_endpoint)?);
    Ok(Services::new(gateway.clone(), gateway, mirror))
}

/// Context cancelled by Ctrl-C and bounded by the configured deadline
fn run_context(config: &MigrationConfig) -> RunContext {
    let (ctx, cancel) = RunContext::new();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("interrupt received, cancelling run");
            cancel.cancel();
        }
    });
    match config.deadline() {
        Some(deadline) => ctx.with_timeout(deadline),
        None => ctx,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::build_cli;
    use std::io::Write;

    fn matches(args: &[&str]) -> ArgMatches {
        build_cli().try_get_matches_from(args).unwrap()
    }

    #[test]
    fn simulate_flags_shape_the_simulator() {
        let m = matches(&["skm", "simulate", "--index-lag", "12", "--reject-rotation", "7", "--drop-mint-event"]);
        let (_, sub) = m.subcommand().unwrap();
        let simulator = simulator_config(sub);
        assert_eq!(simulator.index_lag, 12);
        assert_eq!(simulator.rotation_status, Some(ResponseCode::INVALID_SIGNATURE));
        assert!(simulator.drop_mint_events);
    }

    #[test]
    fn deadline_flag_overrides_config() {
        let m = matches(&["skm", "--deadline-secs", "30", "simulate"]);
        let config = load_config(&m).unwrap();
        assert_eq!(config.deadline(), Some(Duration::from_secs(30)));
    }

    #[test]
    fn missing_operator_key_is_reported_by_name() {
        let m = matches(&[
            "skm",
            "migrate",
            "--operator-id",
            "0.0.2",
            "--network-endpoint",
            "http://localhost:8080",
        ]);
        let (_, sub) = m.subcommand().unwrap();
        let mut config = operator_config(sub);
        // OPERATOR_KEY may be set in the environment running the tests
        config.operator_key = None;
        config.operator_key_type = Some("ed25519".to_string());
        assert!(matches!(
            config.validate(Plan::KeypairToContract),
            Err(ConfigError::Missing("OPERATOR_KEY"))
        ));
    }

    #[test]
    fn migrate_matches_leave_rotation_fields_empty() {
        let m = matches(&["skm", "migrate", "--operator-id", "0.0.2"]);
        let (_, sub) = m.subcommand().unwrap();
        let config = operator_config(sub);
        assert_eq!(config.operator_id.as_deref(), Some("0.0.2"));
        assert_eq!(config.token_id, None);
        assert_eq!(config.prior_contract, None);
    }

    #[test]
    fn bytecode_from_artifact_and_hex() {
        let dir = tempfile::tempdir().unwrap();

        let artifact = dir.path().join("KeyManager.json");
        std::fs::File::create(&artifact)
            .unwrap()
            .write_all(br#"{"abi": [], "bytecode": "0x6080604052"}"#)
            .unwrap();
        assert_eq!(load_bytecode(&artifact).unwrap().as_bytes(), &[0x60, 0x80, 0x60, 0x40, 0x52]);

        let raw = dir.path().join("KeyManager.bin");
        std::fs::write(&raw, "6080\n").unwrap();
        assert_eq!(load_bytecode(&raw).unwrap().as_bytes(), &[0x60, 0x80]);

        let bad = dir.path().join("broken.bin");
        std::fs::write(&bad, "zz").unwrap();
        assert!(load_bytecode(&bad).is_err());
    }
}
