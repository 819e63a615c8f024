//! Core types for supply key migration
//!
//! Defines the identifiers and records exchanged with the external services:
//! - Ledger entity ids (`shard.realm.num`) and their EVM address forms
//! - Token and contract records
//! - Raw receipt logs and decoded events
//! - Operation receipts

use crate::key_spec::SupplyAuthority;
use crate::response_code::ResponseCode;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::str::FromStr;
use ulid::Ulid;

/// Identifier parse failures
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum IdParseError {
    /// Entity id is not `shard.realm.num`
    #[error("invalid entity id '{0}': expected shard.realm.num")]
    InvalidEntityId(String),

    /// EVM address is not 20 bytes of hex
    #[error("invalid EVM address '{0}': expected 20 hex-encoded bytes")]
    InvalidEvmAddress(String),

    /// Transaction id is not `payer@seconds.nanos`
    #[error("invalid transaction id '{0}'")]
    InvalidTransactionId(String),

    /// Bytecode is not hex or the artifact carries none
    #[error("invalid bytecode: {0}")]
    InvalidBytecode(String),
}

/// Unique migration run identifier (ULID for sortability)
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct RunId(pub Ulid);

impl RunId {
    /// Generate new run ID
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self(Ulid::new())
    }
}

impl Default for RunId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for RunId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Ledger-native entity id, rendered `shard.realm.num`
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct EntityId {
    /// Shard number
    pub shard: u32,
    /// Realm number
    pub realm: u64,
    /// Entity number
    pub num: u64,
}

impl EntityId {
    /// Create new entity id
    #[inline]
    #[must_use]
    pub const fn new(shard: u32, realm: u64, num: u64) -> Self {
        Self { shard, realm, num }
    }

    /// Long-zero EVM address: shard (4 bytes) ‖ realm (8) ‖ num (8), big-endian
    #[must_use]
    pub fn to_evm_address(&self) -> EvmAddress {
        let mut bytes = [0u8; 20];
        bytes[..4].copy_from_slice(&self.shard.to_be_bytes());
        bytes[4..12].copy_from_slice(&self.realm.to_be_bytes());
        bytes[12..].copy_from_slice(&self.num.to_be_bytes());
        EvmAddress(bytes)
    }

    /// Inverse of [`EntityId::to_evm_address`]
    #[must_use]
    pub fn from_evm_address(address: &EvmAddress) -> Self {
        let b = &address.0;
        let mut shard = [0u8; 4];
        let mut realm = [0u8; 8];
        let mut num = [0u8; 8];
        shard.copy_from_slice(&b[..4]);
        realm.copy_from_slice(&b[4..12]);
        num.copy_from_slice(&b[12..]);
        Self {
            shard: u32::from_be_bytes(shard),
            realm: u64::from_be_bytes(realm),
            num: u64::from_be_bytes(num),
        }
    }
}

impl std::fmt::Display for EntityId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}.{}.{}", self.shard, self.realm, self.num)
    }
}

impl FromStr for EntityId {
    type Err = IdParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || IdParseError::InvalidEntityId(s.to_string());
        let mut parts = s.trim().split('.');
        let (Some(shard), Some(realm), Some(num), None) =
            (parts.next(), parts.next(), parts.next(), parts.next())
        else {
            return Err(invalid());
        };
        Ok(Self {
            shard: shard.parse().map_err(|_| invalid())?,
            realm: realm.parse().map_err(|_| invalid())?,
            num: num.parse().map_err(|_| invalid())?,
        })
    }
}

impl TryFrom<String> for EntityId {
    type Error = IdParseError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<EntityId> for String {
    fn from(value: EntityId) -> Self {
        value.to_string()
    }
}

macro_rules! entity_newtype {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub EntityId);

        impl $name {
            /// Create from components
            #[inline]
            #[must_use]
            pub const fn new(shard: u32, realm: u64, num: u64) -> Self {
                Self(EntityId::new(shard, realm, num))
            }

            /// Long-zero EVM address of this entity
            #[inline]
            #[must_use]
            pub fn to_evm_address(&self) -> EvmAddress {
                self.0.to_evm_address()
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                self.0.fmt(f)
            }
        }

        impl FromStr for $name {
            type Err = IdParseError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                s.parse().map(Self)
            }
        }
    };
}

entity_newtype!(
    /// Ledger account id
    AccountId
);
entity_newtype!(
    /// Token registry id
    TokenId
);
entity_newtype!(
    /// Contract registry id, as resolved by the index
    ContractId
);

/// 20-byte EVM address, rendered as lowercase `0x` hex
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct EvmAddress(pub [u8; 20]);

impl EvmAddress {
    /// The all-zero address (an unset address field)
    pub const ZERO: Self = Self([0u8; 20]);

    /// Whether this is the all-zero address
    #[inline]
    #[must_use]
    pub fn is_zero(&self) -> bool {
        self.0 == [0u8; 20]
    }

    /// Hex form without the `0x` prefix, as the mirror node expects it
    #[must_use]
    pub fn to_bare_hex(&self) -> String {
        hex::encode(self.0)
    }
}

impl std::fmt::Display for EvmAddress {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "0x{}", hex::encode(self.0))
    }
}

impl FromStr for EvmAddress {
    type Err = IdParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        let digits = trimmed
            .strip_prefix("0x")
            .or_else(|| trimmed.strip_prefix("0X"))
            .unwrap_or(trimmed);
        let mut bytes = [0u8; 20];
        hex::decode_to_slice(digits, &mut bytes)
            .map_err(|_| IdParseError::InvalidEvmAddress(s.to_string()))?;
        Ok(Self(bytes))
    }
}

impl TryFrom<String> for EvmAddress {
    type Error = IdParseError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<EvmAddress> for String {
    fn from(value: EvmAddress) -> Self {
        value.to_string()
    }
}

/// Ledger transaction id: payer plus valid-start timestamp
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct TransactionId {
    /// Paying account
    pub payer: AccountId,
    /// Valid start, seconds since the epoch
    pub valid_start_secs: i64,
    /// Valid start, nanosecond part
    pub valid_start_nanos: u32,
}

impl TransactionId {
    /// Generate a transaction id for `payer` starting now
    #[must_use]
    pub fn generate(payer: AccountId) -> Self {
        let now = chrono::Utc::now();
        Self {
            payer,
            valid_start_secs: now.timestamp(),
            valid_start_nanos: now.timestamp_subsec_nanos(),
        }
    }
}

impl std::fmt::Display for TransactionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}@{}.{:09}",
            self.payer, self.valid_start_secs, self.valid_start_nanos
        )
    }
}

impl FromStr for TransactionId {
    type Err = IdParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || IdParseError::InvalidTransactionId(s.to_string());
        let (payer, start) = s.split_once('@').ok_or_else(invalid)?;
        let (secs, nanos) = start.split_once('.').ok_or_else(invalid)?;
        Ok(Self {
            payer: payer.parse().map_err(|_| invalid())?,
            valid_start_secs: secs.parse().map_err(|_| invalid())?,
            valid_start_nanos: nanos.parse().map_err(|_| invalid())?,
        })
    }
}

impl TryFrom<String> for TransactionId {
    type Error = IdParseError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<TransactionId> for String {
    fn from(value: TransactionId) -> Self {
        value.to_string()
    }
}

/// Token supply type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SupplyType {
    /// No maximum supply
    #[default]
    Infinite,
    /// Capped at a maximum supply
    Finite {
        /// Maximum supply
        max_supply: u64,
    },
}

/// Parameters for creating a fungible token
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TokenSpec {
    /// Token name
    pub name: String,
    /// Token symbol
    pub symbol: String,
    /// Decimal places
    pub decimals: u32,
    /// Initial supply, credited to the treasury
    pub initial_supply: u64,
    /// Supply type
    pub supply_type: SupplyType,
}

impl Default for TokenSpec {
    fn default() -> Self {
        Self {
            name: "Test Token".to_string(),
            symbol: "TST".to_string(),
            decimals: 8,
            initial_supply: 1_000_000,
            supply_type: SupplyType::Infinite,
        }
    }
}

/// Snapshot of a token as held by the ledger
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenRecord {
    /// Token id
    pub token_id: TokenId,
    /// Token name
    pub name: String,
    /// Token symbol
    pub symbol: String,
    /// Decimal places
    pub decimals: u32,
    /// Current total supply
    pub total_supply: u64,
    /// Treasury account
    pub treasury: AccountId,
    /// Current supply authority, if any
    pub supply_authority: Option<SupplyAuthority>,
}

/// Compiled capability contract bytecode
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Bytecode {
    code: Vec<u8>,
}

impl Bytecode {
    /// Wrap raw bytecode
    #[inline]
    #[must_use]
    pub fn new(code: Vec<u8>) -> Self {
        Self { code }
    }

    /// Parse `0x`-prefixed or bare hex
    pub fn from_hex(hex_code: &str) -> Result<Self, IdParseError> {
        let trimmed = hex_code.trim();
        let digits = trimmed.strip_prefix("0x").unwrap_or(trimmed);
        let code = hex::decode(digits).map_err(|e| IdParseError::InvalidBytecode(e.to_string()))?;
        if code.is_empty() {
            return Err(IdParseError::InvalidBytecode("empty bytecode".to_string()));
        }
        Ok(Self { code })
    }

    /// Extract the creation bytecode from a compiler artifact (`{"bytecode": "0x..."}`)
    pub fn from_artifact_json(json: &str) -> Result<Self, IdParseError> {
        #[derive(Deserialize)]
        struct Artifact {
            bytecode: String,
        }

        let artifact: Artifact = serde_json::from_str(json)
            .map_err(|e| IdParseError::InvalidBytecode(e.to_string()))?;
        Self::from_hex(&artifact.bytecode)
    }

    /// Raw bytes
    #[inline]
    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        &self.code
    }

    /// Short digest identifying this build (first 8 bytes of SHA-256, hex)
    #[must_use]
    pub fn version(&self) -> String {
        let digest = Sha256::digest(&self.code);
        hex::encode(&digest[..8])
    }
}

/// A deployed capability contract
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContractInstance {
    /// EVM address the contract was deployed at
    pub native_address: EvmAddress,
    /// Registry id; `None` until the index has caught up
    pub registry_id: Option<ContractId>,
    /// Digest of the deployed bytecode
    pub bytecode_version: String,
}

impl ContractInstance {
    /// Instance known only by address (e.g. a previously deployed contract)
    #[inline]
    #[must_use]
    pub fn at(native_address: EvmAddress) -> Self {
        Self {
            native_address,
            registry_id: None,
            bytecode_version: String::new(),
        }
    }

    /// With resolved registry id
    #[inline]
    #[must_use]
    pub fn with_registry_id(mut self, registry_id: ContractId) -> Self {
        self.registry_id = Some(registry_id);
        self
    }
}

/// Raw log entry from an execution receipt
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogEntry {
    /// Emitting contract
    pub address: EvmAddress,
    /// Indexed topics; topic 0 identifies the event
    pub topics: Vec<[u8; 32]>,
    /// ABI-encoded non-indexed data
    pub data: Vec<u8>,
}

/// Event decoded against the capability contract's schema
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DecodedEvent {
    /// Event name
    pub name: String,
    /// Embedded response code
    pub response_code: ResponseCode,
}

/// Receipt of a ledger or contract operation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OperationReceipt {
    /// Transaction-level status
    pub status: ResponseCode,
    /// Decoded events, in emission order
    pub emitted_events: Vec<DecodedEvent>,
    /// Transaction reference (ledger transaction id or EVM hash)
    pub transaction_ref: String,
}

impl OperationReceipt {
    /// First event with the given name
    #[must_use]
    pub fn find_event(&self, name: &str) -> Option<&DecodedEvent> {
        self.emitted_events.iter().find(|e| e.name == name)
    }
}
