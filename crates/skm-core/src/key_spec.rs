//! Key specifications for token key slots
//!
//! The capability contract takes a key as a five-field tuple ([`KeyValue`]);
//! the ledger treats at most one of those fields as meaningful.
//! [`CapabilityKeySpec`] is the validated form: converting a tuple into it
//! enforces that at most one field is set.

use crate::types::{ContractId, EntityId, EvmAddress};
use serde::{Deserialize, Serialize};

/// Key-spec validation failures
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum KeySpecError {
    /// More than one key variant set in a single request
    #[error("key request sets more than one variant: {0:?}")]
    MultipleVariants(Vec<&'static str>),

    /// Ed25519 public key of the wrong length
    #[error("ed25519 key must be 32 bytes, got {0}")]
    InvalidEd25519Length(usize),

    /// secp256k1 key that is neither a 33-byte compressed key nor a 20-byte address
    #[error("ECDSA secp256k1 key must be 33 or 20 bytes, got {0}")]
    InvalidEcdsaLength(usize),
}

/// Token key slots, as bit flags of the token service
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum KeySlot {
    /// Admin key
    Admin,
    /// KYC key
    Kyc,
    /// Freeze key
    Freeze,
    /// Wipe key
    Wipe,
    /// Supply (mint/burn) key
    Supply,
    /// Custom fee schedule key
    Fee,
    /// Pause key
    Pause,
}

impl KeySlot {
    /// Bit position in the token service key mask; the capability contract takes this as `keyType`
    #[inline]
    #[must_use]
    pub fn index(self) -> u32 {
        match self {
            KeySlot::Admin => 0,
            KeySlot::Kyc => 1,
            KeySlot::Freeze => 2,
            KeySlot::Wipe => 3,
            KeySlot::Supply => 4,
            KeySlot::Fee => 5,
            KeySlot::Pause => 6,
        }
    }

    /// Mask bit of this slot
    #[inline]
    #[must_use]
    pub fn bits(self) -> u32 {
        1 << self.index()
    }

    /// Slot named by a contract `keyType`
    #[must_use]
    pub fn from_index(index: u32) -> Option<Self> {
        [
            KeySlot::Admin,
            KeySlot::Kyc,
            KeySlot::Freeze,
            KeySlot::Wipe,
            KeySlot::Supply,
            KeySlot::Fee,
            KeySlot::Pause,
        ]
        .into_iter()
        .find(|slot| slot.index() == index)
    }
}

/// Wire form of a key: `(inheritAccountKey, contractId, ed25519, ECDSA_secp256k1, delegatableContractId)`
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct KeyValue {
    /// Use the calling account's key
    pub inherit_account_key: bool,
    /// Contract id key, as a long-zero address
    pub contract_id: EvmAddress,
    /// Ed25519 public key bytes
    #[serde(with = "hex::serde")]
    pub ed25519: Vec<u8>,
    /// ECDSA secp256k1 key bytes
    #[serde(with = "hex::serde")]
    pub ecdsa_secp256k1: Vec<u8>,
    /// Delegatable contract id key
    pub delegatable_contract_id: EvmAddress,
}

impl KeyValue {
    fn set_fields(&self) -> Vec<&'static str> {
        let mut set = Vec::new();
        if self.inherit_account_key {
            set.push("inherit_account_key");
        }
        if !self.contract_id.is_zero() {
            set.push("contract_id");
        }
        if !self.ed25519.is_empty() {
            set.push("ed25519");
        }
        if !self.ecdsa_secp256k1.is_empty() {
            set.push("ecdsa_secp256k1");
        }
        if !self.delegatable_contract_id.is_zero() {
            set.push("delegatable_contract_id");
        }
        set
    }
}

/// A validated single-variant key
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum CapabilityKeySpec {
    /// The calling account's own key
    InheritAccountKey,
    /// No key (clears the slot)
    Unset,
    /// Ed25519 public key
    Ed25519(#[serde(with = "hex::serde")] Vec<u8>),
    /// ECDSA secp256k1 key or address
    EcdsaSecp256k1(#[serde(with = "hex::serde")] Vec<u8>),
    /// A contract id
    ContractId(ContractId),
    /// A delegatable contract id
    DelegatableContractId(ContractId),
}

impl CapabilityKeySpec {
    /// Variant name, for logs
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            CapabilityKeySpec::InheritAccountKey => "inherit_account_key",
            CapabilityKeySpec::Unset => "unset",
            CapabilityKeySpec::Ed25519(_) => "ed25519",
            CapabilityKeySpec::EcdsaSecp256k1(_) => "ecdsa_secp256k1",
            CapabilityKeySpec::ContractId(_) => "contract_id",
            CapabilityKeySpec::DelegatableContractId(_) => "delegatable_contract_id",
        }
    }
}

impl TryFrom<&KeyValue> for CapabilityKeySpec {
    type Error = KeySpecError;

    fn try_from(value: &KeyValue) -> Result<Self, Self::Error> {
        let set = value.set_fields();
        match set.as_slice() {
            [] => Ok(Self::Unset),
            ["inherit_account_key"] => Ok(Self::InheritAccountKey),
            ["contract_id"] => Ok(Self::ContractId(ContractId(EntityId::from_evm_address(
                &value.contract_id,
            )))),
            ["ed25519"] => match value.ed25519.len() {
                32 => Ok(Self::Ed25519(value.ed25519.clone())),
                n => Err(KeySpecError::InvalidEd25519Length(n)),
            },
            ["ecdsa_secp256k1"] => match value.ecdsa_secp256k1.len() {
                20 | 33 => Ok(Self::EcdsaSecp256k1(value.ecdsa_secp256k1.clone())),
                n => Err(KeySpecError::InvalidEcdsaLength(n)),
            },
            ["delegatable_contract_id"] => Ok(Self::DelegatableContractId(ContractId(
                EntityId::from_evm_address(&value.delegatable_contract_id),
            ))),
            _ => Err(KeySpecError::MultipleVariants(set)),
        }
    }
}

impl From<&CapabilityKeySpec> for KeyValue {
    fn from(spec: &CapabilityKeySpec) -> Self {
        let mut value = KeyValue::default();
        match spec {
            CapabilityKeySpec::InheritAccountKey => value.inherit_account_key = true,
            CapabilityKeySpec::Unset => {}
            CapabilityKeySpec::Ed25519(key) => value.ed25519.clone_from(key),
            CapabilityKeySpec::EcdsaSecp256k1(key) => value.ecdsa_secp256k1.clone_from(key),
            CapabilityKeySpec::ContractId(id) => value.contract_id = id.to_evm_address(),
            CapabilityKeySpec::DelegatableContractId(id) => {
                value.delegatable_contract_id = id.to_evm_address();
            }
        }
        value
    }
}

/// Who may mint a token
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum SupplyAuthority {
    /// An ed25519 keypair, by public key (hex)
    Key(String),
    /// A contract, by registry id
    Contract(ContractId),
    /// Any other key form
    Other(CapabilityKeySpec),
}

impl From<CapabilityKeySpec> for SupplyAuthority {
    fn from(spec: CapabilityKeySpec) -> Self {
        match spec {
            CapabilityKeySpec::Ed25519(key) => SupplyAuthority::Key(hex::encode(key)),
            CapabilityKeySpec::ContractId(id) => SupplyAuthority::Contract(id),
            other => SupplyAuthority::Other(other),
        }
    }
}

impl std::fmt::Display for SupplyAuthority {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SupplyAuthority::Key(public_key) => write!(f, "ed25519:{public_key}"),
            SupplyAuthority::Contract(id) => write!(f, "contract:{id}"),
            SupplyAuthority::Other(spec) => write!(f, "{}", spec.kind()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn empty_tuple_is_unset() {
        let spec = CapabilityKeySpec::try_from(&KeyValue::default()).unwrap();
        assert_eq!(spec, CapabilityKeySpec::Unset);
    }

    #[test]
    fn contract_id_round_trips() {
        let spec = CapabilityKeySpec::ContractId(ContractId::new(0, 0, 5005));
        let wire = KeyValue::from(&spec);
        assert_eq!(CapabilityKeySpec::try_from(&wire).unwrap(), spec);
    }

    #[test]
    fn two_variants_rejected() {
        let wire = KeyValue {
            inherit_account_key: true,
            ecdsa_secp256k1: vec![1; 20],
            ..KeyValue::default()
        };
        let err = CapabilityKeySpec::try_from(&wire).unwrap_err();
        assert_eq!(
            err,
            KeySpecError::MultipleVariants(vec!["inherit_account_key", "ecdsa_secp256k1"])
        );
    }

    #[test]
    fn ed25519_length_checked() {
        let wire = KeyValue {
            ed25519: vec![0; 31],
            ..KeyValue::default()
        };
        assert_eq!(
            CapabilityKeySpec::try_from(&wire),
            Err(KeySpecError::InvalidEd25519Length(31))
        );
    }

    #[test]
    fn ecdsa_accepts_address_form() {
        let wire = KeyValue {
            ecdsa_secp256k1: vec![0xab; 20],
            ..KeyValue::default()
        };
        assert!(matches!(
            CapabilityKeySpec::try_from(&wire),
            Ok(CapabilityKeySpec::EcdsaSecp256k1(_))
        ));
    }

    #[test]
    fn supply_slot_index_and_bit() {
        assert_eq!(KeySlot::Supply.index(), 4);
        assert_eq!(KeySlot::Supply.bits(), 16);
        assert_eq!(KeySlot::from_index(4), Some(KeySlot::Supply));
        assert_eq!(KeySlot::from_index(7), None);
    }

    #[test]
    fn supply_authority_display() {
        let authority = SupplyAuthority::from(CapabilityKeySpec::ContractId(ContractId::new(0, 0, 7)));
        assert_eq!(authority.to_string(), "contract:0.0.7");
    }

    proptest! {
        #[test]
        fn prop_validated_tuples_have_at_most_one_field(
            inherit in any::<bool>(),
            contract in any::<bool>(),
            ed in any::<bool>(),
            ecdsa in any::<bool>(),
            delegatable in any::<bool>(),
        ) {
            let wire = KeyValue {
                inherit_account_key: inherit,
                contract_id: if contract { ContractId::new(0, 0, 9).to_evm_address() } else { EvmAddress::ZERO },
                ed25519: if ed { vec![1; 32] } else { Vec::new() },
                ecdsa_secp256k1: if ecdsa { vec![2; 33] } else { Vec::new() },
                delegatable_contract_id: if delegatable { ContractId::new(0, 0, 10).to_evm_address() } else { EvmAddress::ZERO },
            };
            let set = [inherit, contract, ed, ecdsa, delegatable].iter().filter(|b| **b).count();
            let result = CapabilityKeySpec::try_from(&wire);
            prop_assert_eq!(result.is_ok(), set <= 1);
            if let Ok(spec) = result {
                prop_assert_eq!(KeyValue::from(&spec), wire);
            }
        }
    }
}
