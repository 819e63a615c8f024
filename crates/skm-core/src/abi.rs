//! Capability contract interface
//!
//! Methods:
//! - `updateTokenKeysPublic(address token, (uint256, KeyValue)[] keys)` emits `ResponseCode(int256)`
//! - `mintTokens(address token, int64 amount)` emits `TokenMintComplete(int256)`
//!
//! Events are identified by topic 0 = keccak256 of their signature; the
//! response code is the first ABI word of the log data.

use crate::key_spec::{CapabilityKeySpec, KeySlot, KeySpecError, KeyValue};
use crate::response_code::ResponseCode;
use crate::types::{DecodedEvent, EvmAddress, LogEntry};
use serde::{Deserialize, Serialize};
use sha3::{Digest, Keccak256};

/// Name of the key-update confirmation event
pub const RESPONSE_CODE_EVENT: &str = "ResponseCode";

/// Name of the mint confirmation event
pub const TOKEN_MINT_COMPLETE_EVENT: &str = "TokenMintComplete";

/// One `(keySlot, keyValue)` pair
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenKey {
    /// Slot bit position
    pub key_type: u32,
    /// Key value tuple
    pub key: KeyValue,
}

/// A call to the capability contract
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ContractCall {
    /// Replace token keys through the contract
    UpdateTokenKeysPublic {
        /// Token, as its long-zero address
        token: EvmAddress,
        /// Keys to install
        keys: Vec<TokenKey>,
    },
    /// Mint through the contract
    MintTokens {
        /// Token, as its long-zero address
        token: EvmAddress,
        /// Amount to mint
        amount: i64,
    },
}

impl ContractCall {
    /// Build a key update; every key must be a valid single-variant spec
    pub fn update_token_keys(
        token: EvmAddress,
        keys: Vec<(KeySlot, KeyValue)>,
    ) -> Result<Self, KeySpecError> {
        let keys = keys
            .into_iter()
            .map(|(slot, key)| {
                CapabilityKeySpec::try_from(&key)?;
                Ok::<_, KeySpecError>(TokenKey {
                    key_type: slot.index(),
                    key,
                })
            })
            .collect::<Result<Vec<_>, KeySpecError>>()?;
        Ok(Self::UpdateTokenKeysPublic { token, keys })
    }

    /// Build a mint call
    #[inline]
    #[must_use]
    pub fn mint_tokens(token: EvmAddress, amount: i64) -> Self {
        Self::MintTokens { token, amount }
    }

    /// Solidity method name
    #[must_use]
    pub fn method(&self) -> &'static str {
        match self {
            ContractCall::UpdateTokenKeysPublic { .. } => "updateTokenKeysPublic",
            ContractCall::MintTokens { .. } => "mintTokens",
        }
    }

    /// Event that confirms this call
    #[must_use]
    pub fn confirming_event(&self) -> &'static str {
        match self {
            ContractCall::UpdateTokenKeysPublic { .. } => RESPONSE_CODE_EVENT,
            ContractCall::MintTokens { .. } => TOKEN_MINT_COMPLETE_EVENT,
        }
    }

    /// Positional arguments as JSON, for gateways that encode the ABI themselves
    #[must_use]
    pub fn args(&self) -> serde_json::Value {
        match self {
            ContractCall::UpdateTokenKeysPublic { token, keys } => {
                let keys: Vec<serde_json::Value> = keys
                    .iter()
                    .map(|k| {
                        serde_json::json!([
                            k.key_type,
                            [
                                k.key.inherit_account_key,
                                k.key.contract_id.to_string(),
                                format!("0x{}", hex::encode(&k.key.ed25519)),
                                format!("0x{}", hex::encode(&k.key.ecdsa_secp256k1)),
                                k.key.delegatable_contract_id.to_string(),
                            ]
                        ])
                    })
                    .collect();
                serde_json::json!([token.to_string(), keys])
            }
            ContractCall::MintTokens { token, amount } => {
                serde_json::json!([token.to_string(), amount.to_string()])
            }
        }
    }
}

/// keccak256 of an event signature
#[must_use]
pub fn event_topic(signature: &str) -> [u8; 32] {
    Keccak256::digest(signature.as_bytes()).into()
}

/// ABI-encode a response code as a signed 256-bit word
#[must_use]
pub fn encode_code_word(code: ResponseCode) -> [u8; 32] {
    let fill = if code.0 < 0 { 0xff } else { 0x00 };
    let mut word = [fill; 32];
    word[24..].copy_from_slice(&code.0.to_be_bytes());
    word
}

/// Decode a signed 256-bit word; `None` if it does not fit in 64 bits
#[must_use]
pub fn decode_code_word(word: &[u8]) -> Option<ResponseCode> {
    let word: &[u8; 32] = word.get(..32)?.try_into().ok()?;
    let mut low = [0u8; 8];
    low.copy_from_slice(&word[24..]);
    let value = i64::from_be_bytes(low);
    let fill = if value < 0 { 0xff } else { 0x00 };
    word[..24]
        .iter()
        .all(|b| *b == fill)
        .then_some(ResponseCode(value))
}

/// An event the schema knows how to decode
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventSignature {
    /// Event name
    pub name: &'static str,
    /// Canonical signature
    pub signature: &'static str,
    /// keccak256(signature)
    pub topic: [u8; 32],
}

impl EventSignature {
    fn new(name: &'static str, signature: &'static str) -> Self {
        Self {
            name,
            signature,
            topic: event_topic(signature),
        }
    }
}

/// Known events of the capability contract
#[derive(Debug, Clone)]
pub struct EventSchema {
    events: Vec<EventSignature>,
}

impl EventSchema {
    /// Schema of the capability contract
    #[must_use]
    pub fn capability_contract() -> Self {
        Self {
            events: vec![
                EventSignature::new(RESPONSE_CODE_EVENT, "ResponseCode(int256)"),
                EventSignature::new(TOKEN_MINT_COMPLETE_EVENT, "TokenMintComplete(int256)"),
            ],
        }
    }

    /// Signature for `name`
    #[must_use]
    pub fn signature(&self, name: &str) -> Option<&EventSignature> {
        self.events.iter().find(|e| e.name == name)
    }

    /// Decode a log; `None` for unknown topics or short data
    #[must_use]
    pub fn decode(&self, log: &LogEntry) -> Option<DecodedEvent> {
        let topic = log.topics.first()?;
        let signature = self.events.iter().find(|e| &e.topic == topic)?;
        let response_code = decode_code_word(&log.data)?;
        Some(DecodedEvent {
            name: signature.name.to_string(),
            response_code,
        })
    }

    /// Decode every log emitted by `emitter`, skipping everything else
    #[must_use]
    pub fn decode_from(&self, emitter: &EvmAddress, logs: &[LogEntry]) -> Vec<DecodedEvent> {
        logs.iter()
            .filter(|log| &log.address == emitter)
            .filter_map(|log| self.decode(log))
            .collect()
    }

    /// Build a log for `name` carrying `code`
    #[must_use]
    pub fn encode(&self, emitter: EvmAddress, name: &str, code: ResponseCode) -> Option<LogEntry> {
        let signature = self.signature(name)?;
        Some(LogEntry {
            address: emitter,
            topics: vec![signature.topic],
            data: encode_code_word(code).to_vec(),
        })
    }
}

impl Default for EventSchema {
    fn default() -> Self {
        Self::capability_contract()
    }
}
