//! In-memory ledger, contract executor and index
//!
//! One [`SimulatedNetwork`] implements all three service traits over shared
//! state:
//! - token create/update transactions are verified against registered
//!   ed25519 account keys; a bad signature yields `INVALID_SIGNATURE`
//! - the capability contract's `updateTokenKeysPublic` and `mintTokens`
//!   check that the calling contract holds the supply key
//! - the index sees a contract only after a configurable number of
//!   not-found lookups
//! - faults: forced status for the next key update, dropped mint events,
//!   foreign logs in call receipts, pending receipts

use crate::abi::{
    event_topic, ContractCall, EventSchema, RESPONSE_CODE_EVENT, TOKEN_MINT_COMPLETE_EVENT,
};
use crate::key_spec::{CapabilityKeySpec, KeySlot, KeyValue, SupplyAuthority};
use crate::response_code::ResponseCode;
use crate::services::{
    ContractExecutionService, ExecutionReceipt, IndexQueryService, LedgerAuthorityService,
    ServiceError, Services,
};
use crate::transaction::{LedgerReceipt, SignedTransaction, TransactionBody};
use crate::types::{
    AccountId, Bytecode, ContractId, ContractInstance, EntityId, EvmAddress, LogEntry, TokenId,
    TokenRecord, TokenSpec, TransactionId,
};
use async_trait::async_trait;
use ed25519_dalek::VerifyingKey;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;

/// Prefix of simulated contract addresses; the low 8 bytes carry the entity number
const CONTRACT_ADDRESS_PREFIX: [u8; 12] = [0xc0, 0xde, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0];

/// Simulator configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SimulatorConfig {
    /// Not-found lookups before a deployed contract becomes visible in the index
    pub index_lag: u32,
    /// Not-found receipt queries before a receipt becomes available
    pub receipt_lag: u32,
    /// Status forced onto the next supply-key update, without applying it
    pub rotation_status: Option<ResponseCode>,
    /// Omit `TokenMintComplete` from mint receipts
    pub drop_mint_events: bool,
    /// Add logs from other emitters and unknown topics to call receipts
    pub foreign_logs: bool,
    /// First entity number handed out
    pub first_entity_num: u64,
}

impl Default for SimulatorConfig {
    fn default() -> Self {
        Self {
            index_lag: 2,
            receipt_lag: 1,
            rotation_status: None,
            drop_mint_events: false,
            foreign_logs: true,
            first_entity_num: 1001,
        }
    }
}

impl SimulatorConfig {
    /// With index lag
    #[inline]
    #[must_use]
    pub fn with_index_lag(mut self, lag: u32) -> Self {
        self.index_lag = lag;
        self
    }

    /// With forced key-update status
    #[inline]
    #[must_use]
    pub fn with_rotation_status(mut self, status: ResponseCode) -> Self {
        self.rotation_status = Some(status);
        self
    }

    /// Drop mint events
    #[inline]
    #[must_use]
    pub fn with_dropped_mint_events(mut self) -> Self {
        self.drop_mint_events = true;
        self
    }
}

#[derive(Debug, Clone)]
struct SimToken {
    name: String,
    symbol: String,
    decimals: u32,
    total_supply: u64,
    treasury: AccountId,
    admin_key: KeyValue,
    supply_key: KeyValue,
}

#[derive(Debug, Clone)]
struct SimContract {
    registry_id: ContractId,
    lookups_until_visible: u32,
}

#[derive(Debug, Clone)]
struct PendingReceipt {
    receipt: LedgerReceipt,
    queries_until_ready: u32,
}

#[derive(Debug, Default)]
struct NetworkState {
    next_num: u64,
    next_tx: u64,
    accounts: HashMap<AccountId, VerifyingKey>,
    tokens: HashMap<TokenId, SimToken>,
    contracts: HashMap<EvmAddress, SimContract>,
    receipts: HashMap<TransactionId, PendingReceipt>,
    rotation_status: Option<ResponseCode>,
    calls: Vec<&'static str>,
    lookups: u32,
}

impl NetworkState {
    fn allocate(&mut self) -> u64 {
        let num = self.next_num;
        self.next_num += 1;
        num
    }
}

/// In-memory stand-in for the ledger, contract service and index
#[derive(Debug)]
pub struct SimulatedNetwork {
    config: SimulatorConfig,
    schema: EventSchema,
    state: Mutex<NetworkState>,
}

impl SimulatedNetwork {
    /// Create new network
    #[must_use]
    pub fn new(config: SimulatorConfig) -> Self {
        let state = NetworkState {
            next_num: config.first_entity_num,
            rotation_status: config.rotation_status,
            ..NetworkState::default()
        };
        Self {
            config,
            schema: EventSchema::capability_contract(),
            state: Mutex::new(state),
        }
    }

    /// Shared handle implementing all three services
    #[must_use]
    pub fn services(self: &Arc<Self>) -> Services {
        Services::new(self.clone(), self.clone(), self.clone())
    }

    /// Register an account and its signing key
    pub fn register_account(&self, account: AccountId, key: VerifyingKey) {
        self.state.lock().accounts.insert(account, key);
    }

    /// Force the status of the next supply-key update
    pub fn set_rotation_status(&self, status: Option<ResponseCode>) {
        self.state.lock().rotation_status = status;
    }

    /// Create a token directly, bypassing transactions
    pub fn seed_token(&self, spec: &TokenSpec, treasury: AccountId, admin_key: KeyValue, supply_key: KeyValue) -> TokenId {
        let mut state = self.state.lock();
        let token_id = TokenId::new(0, 0, state.allocate());
        state.tokens.insert(
            token_id,
            SimToken {
                name: spec.name.clone(),
                symbol: spec.symbol.clone(),
                decimals: spec.decimals,
                total_supply: spec.initial_supply,
                treasury,
                admin_key,
                supply_key,
            },
        );
        token_id
    }

    /// Deploy a contract directly; it is already visible in the index
    pub fn seed_contract(&self) -> ContractInstance {
        let mut state = self.state.lock();
        let num = state.allocate();
        let address = contract_address(num);
        let registry_id = ContractId::new(0, 0, num);
        state.contracts.insert(
            address,
            SimContract {
                registry_id,
                lookups_until_visible: 0,
            },
        );
        ContractInstance::at(address).with_registry_id(registry_id)
    }

    /// Snapshot of a token
    #[must_use]
    pub fn token(&self, token_id: &TokenId) -> Option<TokenRecord> {
        self.state.lock().tokens.get(token_id).map(|t| snapshot(*token_id, t))
    }

    /// Every token, in creation order
    #[must_use]
    pub fn token_ids(&self) -> Vec<TokenId> {
        let mut ids: Vec<TokenId> = self.state.lock().tokens.keys().copied().collect();
        ids.sort();
        ids
    }

    /// Number of contract calls made to `method`
    #[must_use]
    pub fn call_count(&self, method: &str) -> usize {
        self.state.lock().calls.iter().filter(|m| **m == method).count()
    }

    /// Number of index lookups served
    #[must_use]
    pub fn index_lookups(&self) -> u32 {
        self.state.lock().lookups
    }

    fn apply_transaction(
        state: &mut NetworkState,
        transaction: &SignedTransaction,
    ) -> Result<LedgerReceipt, ServiceError> {
        let envelope = transaction
            .decode_envelope()
            .map_err(|e| ServiceError::InvalidRequest(format!("undecodable body: {e}")))?;
        if envelope.header.transaction_id != transaction.transaction_id {
            return Err(ServiceError::InvalidRequest("transaction id mismatch".into()));
        }

        let payer = transaction.transaction_id.payer;
        let Some(payer_key) = state.accounts.get(&payer).copied() else {
            return Ok(status_only(ResponseCode(2)));
        };
        if !transaction.is_signed_by(&payer_key) {
            return Ok(status_only(ResponseCode::INVALID_SIGNATURE));
        }

        match envelope.body {
            TransactionBody::TokenCreate {
                name,
                symbol,
                decimals,
                initial_supply,
                treasury,
                admin_key,
                supply_key,
                ..
            } => {
                let token_id = TokenId::new(0, 0, state.allocate());
                state.tokens.insert(
                    token_id,
                    SimToken {
                        name,
                        symbol,
                        decimals,
                        total_supply: initial_supply,
                        treasury,
                        admin_key,
                        supply_key,
                    },
                );
                Ok(LedgerReceipt {
                    status: ResponseCode::SUCCESS,
                    token_id: Some(token_id),
                })
            }
            TransactionBody::TokenUpdate {
                token_id,
                supply_key,
            } => {
                if CapabilityKeySpec::try_from(&supply_key).is_err() {
                    return Err(ServiceError::InvalidRequest("invalid key spec".into()));
                }
                let Some(token) = state.tokens.get(&token_id) else {
                    return Ok(status_only(ResponseCode::INVALID_TOKEN_ID));
                };
                if !signed_by_key(transaction, &token.admin_key) {
                    return Ok(status_only(ResponseCode::INVALID_SIGNATURE));
                }
                if let Some(forced) = state.rotation_status.take() {
                    return Ok(status_only(forced));
                }
                if let Some(token) = state.tokens.get_mut(&token_id) {
                    token.supply_key = supply_key;
                }
                Ok(status_only(ResponseCode::SUCCESS))
            }
        }
    }

    fn execute_call(state: &mut NetworkState, caller: &EvmAddress, call: &ContractCall) -> (String, ResponseCode) {
        let registry_id = state.contracts.get(caller).map(|c| c.registry_id);
        match call {
            ContractCall::UpdateTokenKeysPublic { token, keys } => {
                let token_id = TokenId(EntityId::from_evm_address(token));
                let Some(sim) = state.tokens.get(&token_id) else {
                    return (RESPONSE_CODE_EVENT.to_string(), ResponseCode::INVALID_TOKEN_ID);
                };
                if !held_by_contract(&sim.supply_key, caller, registry_id) {
                    return (RESPONSE_CODE_EVENT.to_string(), ResponseCode::INVALID_SIGNATURE);
                }
                if let Some(forced) = state.rotation_status.take() {
                    return (RESPONSE_CODE_EVENT.to_string(), forced);
                }
                if let Some(sim) = state.tokens.get_mut(&token_id) {
                    for key in keys {
                        match KeySlot::from_index(key.key_type) {
                            Some(KeySlot::Supply) => sim.supply_key = key.key.clone(),
                            Some(KeySlot::Admin) => sim.admin_key = key.key.clone(),
                            _ => {}
                        }
                    }
                }
                (RESPONSE_CODE_EVENT.to_string(), ResponseCode::SUCCESS)
            }
            ContractCall::MintTokens { token, amount } => {
                let token_id = TokenId(EntityId::from_evm_address(token));
                let code = match state.tokens.get_mut(&token_id) {
                    None => ResponseCode::INVALID_TOKEN_ID,
                    Some(sim) if sim.supply_key == KeyValue::default() => ResponseCode::TOKEN_HAS_NO_SUPPLY_KEY,
                    Some(sim) if !held_by_contract(&sim.supply_key, caller, registry_id) => {
                        ResponseCode::INVALID_SIGNATURE
                    }
                    Some(sim) => match u64::try_from(*amount) {
                        Ok(amount) if amount > 0 => {
                            sim.total_supply = sim.total_supply.saturating_add(amount);
                            ResponseCode::SUCCESS
                        }
                        _ => ResponseCode(1),
                    },
                };
                (TOKEN_MINT_COMPLETE_EVENT.to_string(), code)
            }
        }
    }

    fn receipt_logs(&self, emitter: EvmAddress, event: &str, code: ResponseCode) -> Vec<LogEntry> {
        let mut logs = Vec::new();
        if self.config.foreign_logs {
            logs.extend(self.schema.encode(EvmAddress([0xee; 20]), event, ResponseCode(21)));
            logs.push(LogEntry {
                address: emitter,
                topics: vec![event_topic("Transfer(address,address,uint256)")],
                data: vec![0u8; 32],
            });
        }
        let dropped = self.config.drop_mint_events && event == TOKEN_MINT_COMPLETE_EVENT;
        if !dropped {
            logs.extend(self.schema.encode(emitter, event, code));
        }
        logs
    }
}

fn contract_address(num: u64) -> EvmAddress {
    let mut bytes = [0u8; 20];
    bytes[..12].copy_from_slice(&CONTRACT_ADDRESS_PREFIX);
    bytes[12..].copy_from_slice(&num.to_be_bytes());
    EvmAddress(bytes)
}

fn status_only(status: ResponseCode) -> LedgerReceipt {
    LedgerReceipt {
        status,
        token_id: None,
    }
}

fn signed_by_key(transaction: &SignedTransaction, key: &KeyValue) -> bool {
    match CapabilityKeySpec::try_from(key) {
        Ok(CapabilityKeySpec::Ed25519(bytes)) => <[u8; 32]>::try_from(bytes.as_slice())
            .ok()
            .and_then(|b| VerifyingKey::from_bytes(&b).ok())
            .is_some_and(|k| transaction.is_signed_by(&k)),
        _ => false,
    }
}

fn held_by_contract(key: &KeyValue, caller: &EvmAddress, registry_id: Option<ContractId>) -> bool {
    match CapabilityKeySpec::try_from(key) {
        Ok(CapabilityKeySpec::ContractId(id) | CapabilityKeySpec::DelegatableContractId(id)) => {
            Some(id) == registry_id
        }
        Ok(CapabilityKeySpec::EcdsaSecp256k1(bytes)) => bytes.as_slice() == caller.0.as_slice(),
        _ => false,
    }
}

fn snapshot(token_id: TokenId, token: &SimToken) -> TokenRecord {
    let supply_authority = match CapabilityKeySpec::try_from(&token.supply_key) {
        Ok(CapabilityKeySpec::Unset) | Err(_) => None,
        Ok(spec) => Some(SupplyAuthority::from(spec)),
    };
    TokenRecord {
        token_id,
        name: token.name.clone(),
        symbol: token.symbol.clone(),
        decimals: token.decimals,
        total_supply: token.total_supply,
        treasury: token.treasury,
        supply_authority,
    }
}

#[async_trait]
impl LedgerAuthorityService for SimulatedNetwork {
    async fn submit_transaction(&self, transaction: &SignedTransaction) -> Result<TransactionId, ServiceError> {
        let mut state = self.state.lock();
        if state.receipts.contains_key(&transaction.transaction_id) {
            return Err(ServiceError::Rejected(ResponseCode::DUPLICATE_TRANSACTION));
        }
        let receipt = Self::apply_transaction(&mut state, transaction)?;
        tracing::debug!(tx = %transaction.transaction_id, status = %receipt.status, "simulated transaction");
        state.receipts.insert(
            transaction.transaction_id,
            PendingReceipt {
                receipt,
                queries_until_ready: self.config.receipt_lag,
            },
        );
        Ok(transaction.transaction_id)
    }

    async fn transaction_receipt(&self, transaction_id: &TransactionId) -> Result<LedgerReceipt, ServiceError> {
        let mut state = self.state.lock();
        let pending = state
            .receipts
            .get_mut(transaction_id)
            .ok_or_else(|| ServiceError::InvalidRequest(format!("unknown transaction {transaction_id}")))?;
        if pending.queries_until_ready > 0 {
            pending.queries_until_ready -= 1;
            return Err(ServiceError::NotFound(transaction_id.to_string()));
        }
        Ok(pending.receipt.clone())
    }

    async fn token_info(&self, token_id: &TokenId) -> Result<TokenRecord, ServiceError> {
        self.token(token_id)
            .ok_or_else(|| ServiceError::NotFound(token_id.to_string()))
    }
}

#[async_trait]
impl ContractExecutionService for SimulatedNetwork {
    async fn deploy_contract(&self, bytecode: &Bytecode, _gas_limit: u64) -> Result<EvmAddress, ServiceError> {
        if bytecode.as_bytes().is_empty() {
            return Err(ServiceError::InvalidRequest("empty bytecode".into()));
        }
        let mut state = self.state.lock();
        let num = state.allocate();
        let address = contract_address(num);
        state.contracts.insert(
            address,
            SimContract {
                registry_id: ContractId::new(0, 0, num),
                lookups_until_visible: self.config.index_lag,
            },
        );
        Ok(address)
    }

    async fn call_contract(
        &self,
        address: &EvmAddress,
        call: &ContractCall,
        _gas_limit: u64,
    ) -> Result<ExecutionReceipt, ServiceError> {
        let mut state = self.state.lock();
        if !state.contracts.contains_key(address) {
            return Err(ServiceError::InvalidRequest(format!("no contract at {address}")));
        }
        state.calls.push(call.method());
        state.next_tx += 1;
        let transaction_hash = format!("0x{:064x}", state.next_tx);

        let (event, code) = Self::execute_call(&mut state, address, call);
        Ok(ExecutionReceipt {
            status: ResponseCode::SUCCESS,
            transaction_hash,
            logs: self.receipt_logs(*address, &event, code),
        })
    }
}

#[async_trait]
impl IndexQueryService for SimulatedNetwork {
    async fn lookup_by_native_address(&self, address: &EvmAddress) -> Result<ContractId, ServiceError> {
        let mut state = self.state.lock();
        state.lookups += 1;
        let contract = state
            .contracts
            .get_mut(address)
            .ok_or_else(|| ServiceError::NotFound(address.to_string()))?;
        if contract.lookups_until_visible > 0 {
            contract.lookups_until_visible -= 1;
            return Err(ServiceError::NotFound(address.to_string()));
        }
        Ok(contract.registry_id)
    }
}
