//! Privileged ledger transactions
//!
//! A transaction goes through three immutable stages:
//! 1. [`TransactionEnvelope`]: header plus body, still editable
//! 2. [`FrozenTransaction`]: canonical body bytes fixed
//! 3. [`SignedTransaction`]: frozen bytes plus signatures, ready to submit

use crate::key_spec::KeyValue;
use crate::response_code::ResponseCode;
use crate::types::{AccountId, SupplyType, TokenId, TransactionId};
use ed25519_dalek::{Signature, Signer, SigningKey, VerifyingKey};
use serde::{Deserialize, Serialize};

/// Default transaction fee ceiling, in tinybars
pub const DEFAULT_MAX_FEE: u64 = 2_000_000_000;

/// Default validity window, in seconds
pub const DEFAULT_VALID_DURATION_SECS: u64 = 120;

/// Privileged operations this workflow submits
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TransactionBody {
    /// Create a fungible token
    TokenCreate {
        /// Token name
        name: String,
        /// Token symbol
        symbol: String,
        /// Decimal places
        decimals: u32,
        /// Initial supply
        initial_supply: u64,
        /// Treasury account
        treasury: AccountId,
        /// Supply type
        supply_type: SupplyType,
        /// Admin key
        admin_key: KeyValue,
        /// Supply key
        supply_key: KeyValue,
    },
    /// Replace a token's supply key
    TokenUpdate {
        /// Token to update
        token_id: TokenId,
        /// New supply key
        supply_key: KeyValue,
    },
}

impl TransactionBody {
    /// Operation name, for logs and errors
    #[must_use]
    pub fn operation(&self) -> &'static str {
        match self {
            TransactionBody::TokenCreate { .. } => "token_create",
            TransactionBody::TokenUpdate { .. } => "token_update",
        }
    }
}

/// Transaction header
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionHeader {
    /// Transaction id (payer + valid start)
    pub transaction_id: TransactionId,
    /// Fee ceiling, in tinybars
    pub max_fee: u64,
    /// Validity window, in seconds
    pub valid_duration_secs: u64,
    /// Free-form memo
    pub memo: String,
}

impl TransactionHeader {
    /// Header paid by `payer`, starting now
    #[must_use]
    pub fn for_payer(payer: AccountId) -> Self {
        Self {
            transaction_id: TransactionId::generate(payer),
            max_fee: DEFAULT_MAX_FEE,
            valid_duration_secs: DEFAULT_VALID_DURATION_SECS,
            memo: String::new(),
        }
    }
}

/// Header and body before freezing
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionEnvelope {
    /// Header
    pub header: TransactionHeader,
    /// Body
    pub body: TransactionBody,
}

impl TransactionEnvelope {
    /// Create new envelope
    #[inline]
    #[must_use]
    pub fn new(header: TransactionHeader, body: TransactionBody) -> Self {
        Self { header, body }
    }

    /// Fix the canonical body bytes
    pub fn freeze(self) -> Result<FrozenTransaction, serde_json::Error> {
        let body_bytes = serde_json::to_vec(&self)?;
        Ok(FrozenTransaction {
            envelope: self,
            body_bytes,
        })
    }
}

/// A transaction whose bytes can no longer change
#[derive(Debug, Clone)]
pub struct FrozenTransaction {
    envelope: TransactionEnvelope,
    body_bytes: Vec<u8>,
}

impl FrozenTransaction {
    /// Transaction id
    #[inline]
    #[must_use]
    pub fn transaction_id(&self) -> TransactionId {
        self.envelope.header.transaction_id
    }

    /// The frozen envelope
    #[inline]
    #[must_use]
    pub fn envelope(&self) -> &TransactionEnvelope {
        &self.envelope
    }

    /// Sign the frozen bytes
    #[must_use]
    pub fn sign(self, key: &SigningKey) -> SignedTransaction {
        let signature = key.sign(&self.body_bytes);
        SignedTransaction {
            transaction_id: self.envelope.header.transaction_id,
            body_bytes: self.body_bytes,
            signatures: vec![SignaturePair {
                public_key: key.verifying_key().to_bytes().to_vec(),
                signature: signature.to_bytes().to_vec(),
            }],
        }
    }
}

/// Public key and signature over the frozen bytes
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignaturePair {
    /// Ed25519 public key
    #[serde(with = "hex::serde")]
    pub public_key: Vec<u8>,
    /// Ed25519 signature
    #[serde(with = "hex::serde")]
    pub signature: Vec<u8>,
}

/// A frozen transaction plus its signatures
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignedTransaction {
    /// Transaction id
    pub transaction_id: TransactionId,
    /// Frozen envelope bytes
    #[serde(with = "hex::serde")]
    pub body_bytes: Vec<u8>,
    /// Signatures over `body_bytes`
    pub signatures: Vec<SignaturePair>,
}

impl SignedTransaction {
    /// Decode the frozen envelope
    pub fn decode_envelope(&self) -> Result<TransactionEnvelope, serde_json::Error> {
        serde_json::from_slice(&self.body_bytes)
    }

    /// Whether some signature by `key` verifies over the frozen bytes
    #[must_use]
    pub fn is_signed_by(&self, key: &VerifyingKey) -> bool {
        let expected = key.to_bytes();
        self.signatures.iter().any(|pair| {
            pair.public_key.as_slice() == expected.as_slice()
                && Signature::from_slice(&pair.signature)
                    .is_ok_and(|sig| key.verify_strict(&self.body_bytes, &sig).is_ok())
        })
    }
}

/// Consensus receipt of a ledger transaction
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerReceipt {
    /// Consensus status
    pub status: ResponseCode,
    /// Created token, for token-create transactions
    #[serde(default)]
    pub token_id: Option<TokenId>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn operator_key() -> SigningKey {
        SigningKey::from_bytes(&[7u8; 32])
    }

    fn update_envelope() -> TransactionEnvelope {
        TransactionEnvelope::new(
            TransactionHeader::for_payer(AccountId::new(0, 0, 2)),
            TransactionBody::TokenUpdate {
                token_id: TokenId::new(0, 0, 1001),
                supply_key: KeyValue::default(),
            },
        )
    }

    #[test]
    fn signed_transaction_verifies_against_signer() {
        let key = operator_key();
        let signed = update_envelope().freeze().unwrap().sign(&key);
        assert!(signed.is_signed_by(&key.verifying_key()));

        let other = SigningKey::from_bytes(&[9u8; 32]);
        assert!(!signed.is_signed_by(&other.verifying_key()));
    }

    #[test]
    fn tampered_body_fails_verification() {
        let key = operator_key();
        let mut signed = update_envelope().freeze().unwrap().sign(&key);
        signed.body_bytes.push(b' ');
        assert!(!signed.is_signed_by(&key.verifying_key()));
    }

    #[test]
    fn envelope_survives_freeze() {
        let envelope = update_envelope();
        let signed = envelope.clone().freeze().unwrap().sign(&operator_key());
        assert_eq!(signed.decode_envelope().unwrap(), envelope);
        assert_eq!(signed.transaction_id, envelope.header.transaction_id);
    }
}
