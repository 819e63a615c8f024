//! Migration stages and their legal transitions.

use serde::{Deserialize, Serialize};

/// Illegal stage transition
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("illegal transition {from} -> {to} in {plan:?} plan")]
pub struct TransitionError {
    /// Workflow plan
    pub plan: Plan,
    /// Current stage
    pub from: Stage,
    /// Requested stage
    pub to: Stage,
}

/// Stages of a migration run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Stage {
    /// Nothing done yet
    Init,
    /// Token exists and its initial state is known
    TokenEstablished,
    /// Capability contract deployed
    ContractDeployed,
    /// Contract registry id resolved through the index
    RegistryResolved,
    /// Supply key now held by the contract
    AuthorityRotated,
    /// A mint through the contract was confirmed
    MintVerified,
    /// Summary produced
    Done,
}

impl Stage {
    /// Stage name as used in reports
    #[must_use]
    pub fn name(self) -> &'static str {
        match self {
            Stage::Init => "Init",
            Stage::TokenEstablished => "TokenEstablished",
            Stage::ContractDeployed => "ContractDeployed",
            Stage::RegistryResolved => "RegistryResolved",
            Stage::AuthorityRotated => "AuthorityRotated",
            Stage::MintVerified => "MintVerified",
            Stage::Done => "Done",
        }
    }
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Which workflow a run follows
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Plan {
    /// New token; supply key moves from the operator keypair to a contract id
    KeypairToContract,
    /// Existing token; supply key moves from one contract to its successor
    ContractToContract,
}

/// Stages reachable from `from` under `plan`
#[must_use]
pub fn allowed_transitions(plan: Plan, from: Stage) -> &'static [Stage] {
    use Stage::*;
    match (plan, from) {
        (_, Init) => &[TokenEstablished],
        (_, TokenEstablished) => &[ContractDeployed],
        (Plan::KeypairToContract, ContractDeployed) => &[RegistryResolved],
        (Plan::ContractToContract, ContractDeployed) => &[AuthorityRotated],
        (Plan::KeypairToContract, RegistryResolved) => &[AuthorityRotated],
        (Plan::ContractToContract, RegistryResolved) => &[],
        (_, AuthorityRotated) => &[MintVerified],
        (_, MintVerified) => &[Done],
        (_, Done) => &[],
    }
}

/// Validate a stage transition
pub fn validate_transition(plan: Plan, from: Stage, to: Stage) -> Result<(), TransitionError> {
    if allowed_transitions(plan, from).contains(&to) {
        Ok(())
    } else {
        Err(TransitionError { plan, from, to })
    }
}

/// The full stage sequence of `plan`, from `Init` to `Done`
#[must_use]
pub fn sequence(plan: Plan) -> Vec<Stage> {
    let mut stages = vec![Stage::Init];
    let mut current = Stage::Init;
    while let Some(next) = allowed_transitions(plan, current).first() {
        stages.push(*next);
        current = *next;
    }
    stages
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn keypair_plan_sequence() {
        assert_eq!(
            sequence(Plan::KeypairToContract),
            vec![
                Stage::Init,
                Stage::TokenEstablished,
                Stage::ContractDeployed,
                Stage::RegistryResolved,
                Stage::AuthorityRotated,
                Stage::MintVerified,
                Stage::Done,
            ]
        );
    }

    #[test]
    fn contract_plan_skips_registry() {
        let stages = sequence(Plan::ContractToContract);
        assert!(!stages.contains(&Stage::RegistryResolved));
        assert_eq!(stages.last(), Some(&Stage::Done));
    }

    #[test]
    fn no_skipping_to_mint() {
        assert!(validate_transition(Plan::KeypairToContract, Stage::RegistryResolved, Stage::MintVerified).is_err());
        assert!(validate_transition(Plan::KeypairToContract, Stage::ContractDeployed, Stage::AuthorityRotated).is_err());
    }

    fn any_stage() -> impl Strategy<Value = Stage> {
        prop_oneof![
            Just(Stage::Init),
            Just(Stage::TokenEstablished),
            Just(Stage::ContractDeployed),
            Just(Stage::RegistryResolved),
            Just(Stage::AuthorityRotated),
            Just(Stage::MintVerified),
            Just(Stage::Done),
        ]
    }

    proptest! {
        #[test]
        fn prop_validation_matches_allowed(from in any_stage(), to in any_stage()) {
            for plan in [Plan::KeypairToContract, Plan::ContractToContract] {
                let ok = validate_transition(plan, from, to).is_ok();
                prop_assert_eq!(ok, allowed_transitions(plan, from).contains(&to));
            }
        }
    }
}
