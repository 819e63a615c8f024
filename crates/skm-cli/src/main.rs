//! `skm` - supply key migration runner
//!
//! Usage:
//!   skm migrate    - move a new token's supply key from the operator to a contract
//!   skm rotate     - move an existing token's supply key to a successor contract
//!   skm simulate   - run the migration against the in-memory network
//!
//! Exit status: 0 when the run reaches `Done`, 1 when it fails, 2 when
//! configuration is rejected before anything is submitted.

mod commands;
mod logging;

use clap::{value_parser, Arg, ArgAction, ArgMatches, Command};
use commands::RunOutcome;
use std::path::PathBuf;

const EXIT_FAILED: i32 = 1;
const EXIT_CONFIG: i32 = 2;

fn operator_args() -> Vec<Arg> {
    vec![
        Arg::new("operator-key")
            .long("operator-key")
            .env("OPERATOR_KEY")
            .hide_env_values(true)
            .help("Operator ed25519 private key, hex (raw or DER)"),
        Arg::new("operator-key-type")
            .long("operator-key-type")
            .env("OPERATOR_KEY_TYPE")
            .help("Scheme of a raw hex operator key (ed25519)"),
        Arg::new("operator-id")
            .long("operator-id")
            .env("OPERATOR_ID")
            .help("Operator account, shard.realm.num"),
        Arg::new("network-endpoint")
            .long("network-endpoint")
            .env("NETWORK_ENDPOINT")
            .help("Ledger gateway URL"),
        Arg::new("mirror-endpoint")
            .long("mirror-endpoint")
            .env("MIRROR_ENDPOINT")
            .help("Mirror node URL (defaults to the public testnet mirror)"),
        Arg::new("bytecode")
            .long("bytecode")
            .env("CONTRACT_BYTECODE")
            .value_parser(value_parser!(PathBuf))
            .help("Capability contract bytecode: compiler artifact (.json) or hex file"),
    ]
}

fn build_cli() -> Command {
    Command::new("skm")
        .version(skm_core::VERSION)
        .about("Supply key migration for ledger tokens")
        .subcommand_required(true)
        .arg(
            Arg::new("config")
                .long("config")
                .global(true)
                .value_parser(value_parser!(PathBuf))
                .help("Migration tunables (TOML)"),
        )
        .arg(
            Arg::new("deadline-secs")
                .long("deadline-secs")
                .global(true)
                .value_parser(value_parser!(u64))
                .help("Abort the run after this many seconds"),
        )
        .arg(
            Arg::new("log-json")
                .long("log-json")
                .global(true)
                .action(ArgAction::SetTrue)
                .help("Emit logs as JSON"),
        )
        .arg(
            Arg::new("json")
                .long("json")
                .global(true)
                .action(ArgAction::SetTrue)
                .help("Print the outcome as JSON"),
        )
        .subcommand(
            Command::new("migrate")
                .about("Create a token, deploy the capability contract and hand it the supply key")
                .args(operator_args()),
        )
        .subcommand(
            Command::new("rotate")
                .about("Move an existing token's supply key from its contract to a new one")
                .args(operator_args())
                .arg(
                    Arg::new("token-id")
                        .long("token-id")
                        .env("TOKEN_ID")
                        .help("Token whose supply key moves"),
                )
                .arg(
                    Arg::new("prior-contract")
                        .long("prior-contract")
                        .env("KEY_MANAGER_1_ADDRESS")
                        .help("EVM address of the contract holding the supply key"),
                ),
        )
        .subcommand(
            Command::new("simulate")
                .about("Run the migration against the in-memory network")
                .arg(
                    Arg::new("index-lag")
                        .long("index-lag")
                        .value_parser(value_parser!(u32))
                        .help("Not-found lookups before a new contract is indexed"),
                )
                .arg(
                    Arg::new("reject-rotation")
                        .long("reject-rotation")
                        .value_parser(value_parser!(i64))
                        .help("Force this status on the supply-key update"),
                )
                .arg(
                    Arg::new("drop-mint-event")
                        .long("drop-mint-event")
                        .action(ArgAction::SetTrue)
                        .help("Omit the mint confirmation event"),
                )
                .arg(
                    Arg::new("seed")
                        .long("seed")
                        .default_value("42")
                        .value_parser(value_parser!(u64))
                        .help("Seed of the simulated operator key"),
                ),
        )
}

async fn dispatch(matches: &ArgMatches) -> anyhow::Result<RunOutcome> {
    let config = commands::load_config(matches)?;
    match matches.subcommand() {
        Some(("migrate", args)) => commands::migrate(args, config).await,
        Some(("rotate", args)) => commands::rotate(args, config).await,
        Some(("simulate", args)) => commands::simulate(args, config).await,
        _ => anyhow::bail!("unknown subcommand"),
    }
}

fn report(outcome: &RunOutcome, json: bool) -> i32 {
    match outcome {
        Ok(summary) => {
            if json {
                match serde_json::to_string_pretty(summary) {
                    Ok(text) => println!("{text}"),
                    Err(e) => eprintln!("could not encode summary: {e}"),
                }
            } else {
                println!("{summary}");
            }
            0
        }
        Err(failure) => {
            if json {
                let body = serde_json::json!({
                    "stage": failure.stage,
                    "kind": failure.error.kind(),
                    "error": failure.error.to_string(),
                    "trail": failure.trail,
                });
                println!("{body:#}");
            }
            eprintln!("{failure} [{}]", failure.error.kind());
            EXIT_FAILED
        }
    }
}

#[tokio::main]
async fn main() {
    let matches = build_cli().get_matches();
    logging::init_logging(matches.get_flag("log-json"));

    let code = match dispatch(&matches).await {
        Ok(outcome) => report(&outcome, matches.get_flag("json")),
        Err(e) => {
            eprintln!("configuration error: {e:#}");
            EXIT_CONFIG
        }
    };
    std::process::exit(code);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cli_definition_is_consistent() {
        build_cli().debug_assert();
    }

    #[test]
    fn rotate_reads_rotation_arguments() {
        let matches = build_cli()
            .try_get_matches_from([
                "skm",
                "rotate",
                "--token-id",
                "0.0.5005",
                "--prior-contract",
                "0x00000000000000000000000000000000000003e9",
            ])
            .unwrap();
        let (name, args) = matches.subcommand().unwrap();
        assert_eq!(name, "rotate");
        let config = commands::operator_config(args);
        assert_eq!(config.token_id.as_deref(), Some("0.0.5005"));
        assert!(config.rotation_target().is_ok());
    }

    #[test]
    fn subcommand_is_required() {
        assert!(build_cli().try_get_matches_from(["skm"]).is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn simulated_rejection_exits_failed() {
        let matches = build_cli()
            .try_get_matches_from(["skm", "simulate", "--index-lag", "0", "--reject-rotation", "7"])
            .unwrap();
        let outcome = dispatch(&matches).await.unwrap();
        assert_eq!(report(&outcome, false), EXIT_FAILED);
    }

    #[tokio::test]
    async fn migrate_with_bad_operator_key_is_a_config_error() {
        let matches = build_cli()
            .try_get_matches_from([
                "skm",
                "migrate",
                "--operator-key",
                "not-hex",
                "--operator-id",
                "0.0.2",
                "--network-endpoint",
                "http://localhost:8080",
            ])
            .unwrap();
        assert!(dispatch(&matches).await.is_err());
    }

    #[tokio::test]
    async fn unreadable_config_exits_config() {
        let matches = build_cli()
            .try_get_matches_from(["skm", "--config", "/nonexistent/skm.toml", "simulate"])
            .unwrap();
        assert!(dispatch(&matches).await.is_err());
    }
}
