//! Run configuration
//!
//! [`MigrationConfig`] holds tunables with working defaults and loads from
//! TOML. [`OperatorConfig`] holds the credentials and endpoints a run needs;
//! [`OperatorConfig::validate`] turns it into a [`ValidatedOperator`] or a
//! [`ConfigError`] before any service is built.

use crate::error::ConfigError;
use crate::poll::{duration_millis, PollPolicy};
use crate::state_machine::Plan;
use crate::types::{AccountId, EvmAddress, IdParseError, TokenId, TokenSpec};
use ed25519_dalek::SigningKey;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Public testnet mirror node
pub const DEFAULT_MIRROR_ENDPOINT: &str = "https://testnet.mirrornode.hedera.com";

/// DER prefix of a PKCS#8-wrapped ed25519 private key
const ED25519_DER_PREFIX: &str = "302e020100300506032b657004220420";

/// DER encoding of the secp256k1 curve OID (1.3.132.0.10)
const SECP256K1_OID_DER: &str = "06052b8104000a";

/// Signature scheme of the operator key
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OperatorKeyType {
    /// Ed25519
    Ed25519,
    /// ECDSA over secp256k1
    EcdsaSecp256k1,
}

impl std::str::FromStr for OperatorKeyType {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "ed25519" => Ok(Self::Ed25519),
            "ecdsa" | "ecdsa_secp256k1" | "secp256k1" => Ok(Self::EcdsaSecp256k1),
            other => Err(ConfigError::invalid(
                "OPERATOR_KEY_TYPE",
                format!("unknown key type {other:?}, expected ed25519 or ecdsa"),
            )),
        }
    }
}

/// Tunables of a migration run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MigrationConfig {
    /// Registry resolution polling
    pub index_poll: PollPolicy,
    /// Consensus receipt polling
    pub receipt_poll: PollPolicy,
    /// Wait after the supply-key rotation before minting
    #[serde(rename = "settle_delay_ms", with = "duration_millis")]
    pub settle_delay: Duration,
    /// Gas limit for contract deployment and calls
    pub gas_limit: u64,
    /// Amount minted to verify the new authority
    pub mint_amount: i64,
    /// Overall run deadline; none by default
    pub deadline_secs: Option<u64>,
    /// Token created by the primary workflow
    pub token: TokenSpec,
}

impl Default for MigrationConfig {
    fn default() -> Self {
        Self {
            index_poll: PollPolicy::new(Duration::from_secs(1), 10),
            receipt_poll: PollPolicy::new(Duration::from_millis(500), 20),
            settle_delay: Duration::from_secs(5),
            gas_limit: 1_000_000,
            mint_amount: 5_000,
            deadline_secs: None,
            token: TokenSpec::default(),
        }
    }
}

impl MigrationConfig {
    /// Create config with defaults
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse from TOML text; absent keys keep their defaults
    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(text)?;
        config.check()?;
        Ok(config)
    }

    /// Load from a TOML file
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_toml_str(&text)
    }

    /// With index polling policy
    #[inline]
    #[must_use]
    pub fn with_index_poll(mut self, policy: PollPolicy) -> Self {
        self.index_poll = policy;
        self
    }

    /// With receipt polling policy
    #[inline]
    #[must_use]
    pub fn with_receipt_poll(mut self, policy: PollPolicy) -> Self {
        self.receipt_poll = policy;
        self
    }

    /// With settle delay
    #[inline]
    #[must_use]
    pub fn with_settle_delay(mut self, delay: Duration) -> Self {
        self.settle_delay = delay;
        self
    }

    /// With gas limit
    #[inline]
    #[must_use]
    pub fn with_gas_limit(mut self, gas_limit: u64) -> Self {
        self.gas_limit = gas_limit;
        self
    }

    /// With mint amount
    #[inline]
    #[must_use]
    pub fn with_mint_amount(mut self, amount: i64) -> Self {
        self.mint_amount = amount;
        self
    }

    /// With overall deadline
    #[inline]
    #[must_use]
    pub fn with_deadline(mut self, deadline: Duration) -> Self {
        self.deadline_secs = Some(deadline.as_secs());
        self
    }

    /// With token parameters
    #[inline]
    #[must_use]
    pub fn with_token(mut self, token: TokenSpec) -> Self {
        self.token = token;
        self
    }

    /// Overall deadline, if any
    #[inline]
    #[must_use]
    pub fn deadline(&self) -> Option<Duration> {
        self.deadline_secs.map(Duration::from_secs)
    }

    fn check(&self) -> Result<(), ConfigError> {
        if self.mint_amount <= 0 {
            return Err(ConfigError::invalid("mint_amount", "must be positive"));
        }
        if self.gas_limit == 0 {
            return Err(ConfigError::invalid("gas_limit", "must be positive"));
        }
        if self.token.symbol.is_empty() {
            return Err(ConfigError::invalid("token.symbol", "must not be empty"));
        }
        Ok(())
    }
}

/// The account that pays for and signs privileged transactions
#[derive(Debug, Clone)]
pub struct Operator {
    /// Operator account
    pub account: AccountId,
    /// Operator signing key
    pub signing_key: SigningKey,
}

impl Operator {
    /// Create new operator
    #[inline]
    #[must_use]
    pub fn new(account: AccountId, signing_key: SigningKey) -> Self {
        Self {
            account,
            signing_key,
        }
    }

    /// Public key as hex
    #[must_use]
    pub fn public_key_hex(&self) -> String {
        hex::encode(self.signing_key.verifying_key().to_bytes())
    }
}

/// Existing token and contract for the rotation workflow
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RotationTarget {
    /// Token whose supply key is held by `prior_contract`
    pub token_id: TokenId,
    /// Contract currently holding the supply key
    pub prior_contract: EvmAddress,
}

/// Raw operator settings, as collected from flags, env or file
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct OperatorConfig {
    /// Ed25519 private key, hex (raw 32 bytes or DER)
    pub operator_key: Option<String>,
    /// Scheme of `operator_key`; required when the key is raw hex
    pub operator_key_type: Option<String>,
    /// Operator account, `shard.realm.num`
    pub operator_id: Option<String>,
    /// Gateway URL for ledger and contract services
    pub network_endpoint: Option<String>,
    /// Mirror node URL
    pub mirror_endpoint: Option<String>,
    /// Existing token (rotation workflow)
    pub token_id: Option<String>,
    /// Prior contract address (rotation workflow)
    pub prior_contract: Option<String>,
}

/// Operator settings that passed validation
#[derive(Debug, Clone)]
pub struct ValidatedOperator {
    /// Signing operator
    pub operator: Operator,
    /// Gateway URL
    pub network_endpoint: String,
    /// Mirror node URL
    pub mirror_endpoint: String,
    /// Present for [`Plan::ContractToContract`]
    pub rotation: Option<RotationTarget>,
}

impl OperatorConfig {
    /// Parse the operator credential and account
    pub fn operator(&self) -> Result<Operator, ConfigError> {
        let key = required(self.operator_key.as_deref(), "OPERATOR_KEY")?;
        let id = required(self.operator_id.as_deref(), "OPERATOR_ID")?;

        let key_type = self
            .operator_key_type
            .as_deref()
            .map(str::parse::<OperatorKeyType>)
            .transpose()?;
        let signing_key = parse_operator_key(key, key_type)?;
        let account = id
            .parse::<AccountId>()
            .map_err(|e| ConfigError::invalid("OPERATOR_ID", e.to_string()))?;
        Ok(Operator::new(account, signing_key))
    }

    /// Validate everything `plan` needs against a live network
    pub fn validate(&self, plan: Plan) -> Result<ValidatedOperator, ConfigError> {
        let operator = self.operator()?;
        let network_endpoint = parse_url(
            required(self.network_endpoint.as_deref(), "NETWORK_ENDPOINT")?,
            "NETWORK_ENDPOINT",
        )?;
        let mirror_endpoint = parse_url(
            self.mirror_endpoint.as_deref().unwrap_or(DEFAULT_MIRROR_ENDPOINT),
            "MIRROR_ENDPOINT",
        )?;

        let rotation = match plan {
            Plan::KeypairToContract => None,
            Plan::ContractToContract => Some(self.rotation_target()?),
        };

        Ok(ValidatedOperator {
            operator,
            network_endpoint,
            mirror_endpoint,
            rotation,
        })
    }

    /// Parse the token and prior contract of the rotation workflow
    pub fn rotation_target(&self) -> Result<RotationTarget, ConfigError> {
        let token = required(self.token_id.as_deref(), "TOKEN_ID")?;
        let prior = required(self.prior_contract.as_deref(), "KEY_MANAGER_1_ADDRESS")?;
        Ok(RotationTarget {
            token_id: token
                .parse()
                .map_err(|e: IdParseError| ConfigError::invalid("TOKEN_ID", e.to_string()))?,
            prior_contract: prior
                .parse()
                .map_err(|e: IdParseError| ConfigError::invalid("KEY_MANAGER_1_ADDRESS", e.to_string()))?,
        })
    }
}

fn required<'a>(value: Option<&'a str>, name: &'static str) -> Result<&'a str, ConfigError> {
    match value.map(str::trim) {
        Some(v) if !v.is_empty() => Ok(v),
        _ => Err(ConfigError::Missing(name)),
    }
}

fn parse_url(value: &str, field: &'static str) -> Result<String, ConfigError> {
    parse_endpoint(value).map_err(|reason| ConfigError::invalid(field, reason))
}

/// Validate an absolute http(s) URL and drop its trailing slash
pub fn parse_endpoint(value: &str) -> Result<String, String> {
    let value = value.trim();
    let url = url::Url::parse(value).map_err(|e| e.to_string())?;
    if !matches!(url.scheme(), "http" | "https") {
        return Err(format!("unsupported scheme {}", url.scheme()));
    }
    if url.host_str().is_none() {
        return Err("missing host".to_string());
    }
    Ok(value.trim_end_matches('/').to_string())
}

/// Parse the operator key under a declared or DER-encoded scheme.
///
/// A DER key names its own curve. Raw hex carries no scheme, so it is only
/// accepted with an explicit `key_type`. ECDSA secp256k1 keys are refused:
/// reading one as an ed25519 seed would sign with an unrelated key.
pub fn parse_operator_key(text: &str, key_type: Option<OperatorKeyType>) -> Result<SigningKey, ConfigError> {
    let digits = key_digits(text);
    if digits.starts_with("30") && digits.contains(SECP256K1_OID_DER) {
        return Err(ecdsa_unsupported());
    }
    if digits.starts_with(ED25519_DER_PREFIX) {
        return match key_type {
            Some(OperatorKeyType::EcdsaSecp256k1) => Err(ConfigError::invalid(
                "OPERATOR_KEY_TYPE",
                "ecdsa declared but OPERATOR_KEY is DER-encoded ed25519",
            )),
            _ => parse_signing_key(&digits),
        };
    }
    match key_type {
        Some(OperatorKeyType::Ed25519) => parse_signing_key(&digits),
        Some(OperatorKeyType::EcdsaSecp256k1) => Err(ecdsa_unsupported()),
        None => Err(ConfigError::Missing("OPERATOR_KEY_TYPE")),
    }
}

/// Parse a hex ed25519 private key, raw or DER-wrapped, with or without `0x`
pub fn parse_signing_key(text: &str) -> Result<SigningKey, ConfigError> {
    let lower = key_digits(text);
    let digits = lower.strip_prefix(ED25519_DER_PREFIX).unwrap_or(&lower);

    let bytes = hex::decode(digits).map_err(|e| ConfigError::invalid("OPERATOR_KEY", e.to_string()))?;
    let seed: [u8; 32] = bytes.as_slice().try_into().map_err(|_| {
        ConfigError::invalid(
            "OPERATOR_KEY",
            format!("expected 32 key bytes, got {}", bytes.len()),
        )
    })?;
    Ok(SigningKey::from_bytes(&seed))
}

fn key_digits(text: &str) -> String {
    let trimmed = text.trim();
    trimmed.strip_prefix("0x").unwrap_or(trimmed).to_ascii_lowercase()
}

fn ecdsa_unsupported() -> ConfigError {
    ConfigError::invalid(
        "OPERATOR_KEY",
        "ECDSA secp256k1 operator keys are not supported; supply an ed25519 key",
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::io::Write;

    const KEY_HEX: &str = "0707070707070707070707070707070707070707070707070707070707070707";

    fn full_config() -> OperatorConfig {
        OperatorConfig {
            operator_key: Some(KEY_HEX.to_string()),
            operator_key_type: Some("ed25519".to_string()),
            operator_id: Some("0.0.1234".to_string()),
            network_endpoint: Some("http://localhost:7546/".to_string()),
            mirror_endpoint: None,
            token_id: Some("0.0.5005".to_string()),
            prior_contract: Some("0x00000000000000000000000000000000000013a0".to_string()),
        }
    }

    #[test]
    fn defaults_match_workflow_constants() {
        let config = MigrationConfig::default();
        assert_eq!(config.index_poll.max_attempts, 10);
        assert_eq!(config.index_poll.interval, Duration::from_secs(1));
        assert_eq!(config.settle_delay, Duration::from_secs(5));
        assert_eq!(config.gas_limit, 1_000_000);
        assert_eq!(config.mint_amount, 5_000);
        assert_eq!(config.deadline(), None);
        assert_eq!(config.token.initial_supply, 1_000_000);
    }

    #[test]
    fn partial_toml_keeps_defaults() {
        let config = MigrationConfig::from_toml_str(
            r#"
            mint_amount = 42
            settle_delay_ms = 0

            [index_poll]
            interval_ms = 250
            max_attempts = 3

            [token]
            symbol = "ABC"
            "#,
        )
        .unwrap();
        assert_eq!(config.mint_amount, 42);
        assert_eq!(config.settle_delay, Duration::ZERO);
        assert_eq!(config.index_poll, PollPolicy::new(Duration::from_millis(250), 3));
        assert_eq!(config.token.symbol, "ABC");
        assert_eq!(config.token.decimals, 8);
        assert_eq!(config.gas_limit, 1_000_000);
    }

    #[test]
    fn negative_mint_rejected() {
        let err = MigrationConfig::from_toml_str("mint_amount = -5").unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { field: "mint_amount", .. }));
    }

    #[test]
    fn load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "gas_limit = 500000\ndeadline_secs = 30").unwrap();
        let config = MigrationConfig::load(file.path()).unwrap();
        assert_eq!(config.gas_limit, 500_000);
        assert_eq!(config.deadline(), Some(Duration::from_secs(30)));
    }

    #[test]
    fn missing_file_is_io_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = MigrationConfig::load(dir.path().join("absent.toml")).unwrap_err();
        assert!(matches!(err, ConfigError::Io { .. }));
    }

    #[test]
    fn validate_primary_plan() {
        let validated = full_config().validate(Plan::KeypairToContract).unwrap();
        assert_eq!(validated.operator.account, AccountId::new(0, 0, 1234));
        assert_eq!(validated.network_endpoint, "http://localhost:7546");
        assert_eq!(validated.mirror_endpoint, DEFAULT_MIRROR_ENDPOINT);
        assert!(validated.rotation.is_none());
    }

    #[test]
    fn validate_rotation_plan() {
        let validated = full_config().validate(Plan::ContractToContract).unwrap();
        let target = validated.rotation.unwrap();
        assert_eq!(target.token_id, TokenId::new(0, 0, 5005));
        assert_eq!(
            target.prior_contract,
            crate::types::ContractId::new(0, 0, 5024).to_evm_address()
        );
    }

    #[test]
    fn missing_settings_named() {
        let mut config = full_config();
        config.operator_key = None;
        assert!(matches!(
            config.validate(Plan::KeypairToContract),
            Err(ConfigError::Missing("OPERATOR_KEY"))
        ));

        let mut config = full_config();
        config.prior_contract = Some("  ".to_string());
        assert!(matches!(
            config.validate(Plan::ContractToContract),
            Err(ConfigError::Missing("KEY_MANAGER_1_ADDRESS"))
        ));
        assert!(config.validate(Plan::KeypairToContract).is_ok());
    }

    #[test]
    fn malformed_settings_rejected() {
        let mut config = full_config();
        config.operator_id = Some("alice".to_string());
        assert!(matches!(
            config.validate(Plan::KeypairToContract),
            Err(ConfigError::Invalid { field: "OPERATOR_ID", .. })
        ));

        let mut config = full_config();
        config.network_endpoint = Some("localhost:7546".to_string());
        assert!(matches!(
            config.validate(Plan::KeypairToContract),
            Err(ConfigError::Invalid { field: "NETWORK_ENDPOINT", .. })
        ));
    }

    #[test]
    fn endpoints_parsed_as_urls() {
        assert_eq!(parse_endpoint(" https://mirror.example/ ").unwrap(), "https://mirror.example");
        assert!(parse_endpoint("https://").is_err());
        assert!(parse_endpoint("http//localhost:7546").is_err());
        assert!(parse_endpoint("ftp://example.org").unwrap_err().contains("ftp"));
    }

    #[test]
    fn der_and_raw_keys_agree() {
        let raw = parse_signing_key(KEY_HEX).unwrap();
        let der = parse_signing_key(&format!("0x{ED25519_DER_PREFIX}{KEY_HEX}")).unwrap();
        assert_eq!(raw.to_bytes(), der.to_bytes());
        assert!(parse_signing_key("abcd").is_err());
    }

    #[test]
    fn raw_key_needs_declared_type() {
        let mut config = full_config();
        config.operator_key_type = None;
        assert!(matches!(
            config.operator(),
            Err(ConfigError::Missing("OPERATOR_KEY_TYPE"))
        ));

        config.operator_key = Some(format!("{ED25519_DER_PREFIX}{KEY_HEX}"));
        assert!(config.operator().is_ok());
    }

    #[test]
    fn ecdsa_keys_rejected() {
        assert!(matches!(
            parse_operator_key(KEY_HEX, Some(OperatorKeyType::EcdsaSecp256k1)),
            Err(ConfigError::Invalid { field: "OPERATOR_KEY", .. })
        ));

        let pkcs8 = format!("3030020100300706052b8104000a04220420{KEY_HEX}");
        let sec1 = format!("302e0201010420{KEY_HEX}a00706052b8104000a");
        for der in [pkcs8, sec1] {
            assert!(matches!(
                parse_operator_key(&der, None),
                Err(ConfigError::Invalid { field: "OPERATOR_KEY", .. })
            ));
            assert!(parse_operator_key(&der, Some(OperatorKeyType::Ed25519)).is_err());
        }
    }

    #[test]
    fn key_type_names() {
        assert_eq!("ECDSA".parse::<OperatorKeyType>().unwrap(), OperatorKeyType::EcdsaSecp256k1);
        assert_eq!("ed25519".parse::<OperatorKeyType>().unwrap(), OperatorKeyType::Ed25519);
        assert!("rsa".parse::<OperatorKeyType>().is_err());
    }
}
