//! Authority Transaction Executor
//!
//! Builds, freezes, signs and submits privileged token transactions, then
//! waits for their consensus receipt. A pending receipt is polled; any
//! other failure is returned as is. Nothing is resubmitted once the ledger
//! has accepted a transaction.

use crate::config::Operator;
use crate::context::RunContext;
use crate::error::AuthorityError;
use crate::key_spec::{CapabilityKeySpec, KeyValue};
use crate::poll::{poll_until, PollError, PollPolicy, Probe};
use crate::services::{LedgerAuthorityService, ServiceError};
use crate::transaction::{LedgerReceipt, TransactionBody, TransactionEnvelope, TransactionHeader};
use crate::types::{OperationReceipt, TokenId, TokenRecord, TokenSpec, TransactionId};
use std::sync::Arc;
use std::time::Duration;

/// Signs and confirms privileged ledger operations for one operator
#[derive(Clone)]
pub struct AuthorityExecutor {
    ledger: Arc<dyn LedgerAuthorityService>,
    operator: Operator,
    receipt_poll: PollPolicy,
}

impl AuthorityExecutor {
    /// Create new executor
    #[must_use]
    pub fn new(ledger: Arc<dyn LedgerAuthorityService>, operator: Operator) -> Self {
        Self {
            ledger,
            operator,
            receipt_poll: PollPolicy::new(Duration::from_millis(500), 20),
        }
    }

    /// With receipt polling policy
    #[inline]
    #[must_use]
    pub fn with_receipt_poll(mut self, policy: PollPolicy) -> Self {
        self.receipt_poll = policy;
        self
    }

    /// Signing operator
    #[inline]
    #[must_use]
    pub fn operator(&self) -> &Operator {
        &self.operator
    }

    /// The operator's key in wire form
    #[must_use]
    pub fn operator_key(&self) -> KeyValue {
        let public_key = self.operator.signing_key.verifying_key().to_bytes().to_vec();
        KeyValue::from(&CapabilityKeySpec::Ed25519(public_key))
    }

    /// Create a token with the operator as treasury, admin and supply key
    pub async fn create_token(
        &self,
        ctx: &RunContext,
        spec: &TokenSpec,
    ) -> Result<TokenRecord, AuthorityError> {
        let operator_key = self.operator_key();
        let body = TransactionBody::TokenCreate {
            name: spec.name.clone(),
            symbol: spec.symbol.clone(),
            decimals: spec.decimals,
            initial_supply: spec.initial_supply,
            treasury: self.operator.account,
            supply_type: spec.supply_type,
            admin_key: operator_key.clone(),
            supply_key: operator_key,
        };

        let (transaction_id, receipt) = self.execute(ctx, body).await?;
        if !receipt.status.is_success() {
            return Err(AuthorityError::Rejected {
                operation: "token_create",
                code: receipt.status,
            });
        }
        let token_id = receipt
            .token_id
            .ok_or(AuthorityError::MissingTokenId(transaction_id))?;

        tracing::info!(%token_id, symbol = %spec.symbol, supply = spec.initial_supply, "token created");
        self.token_info(&token_id).await
    }

    /// Replace the supply key of `token_id`.
    ///
    /// Returns the receipt for any consensus status; the caller interprets it.
    pub async fn update_supply_key(
        &self,
        ctx: &RunContext,
        token_id: TokenId,
        new_authority: &KeyValue,
    ) -> Result<OperationReceipt, AuthorityError> {
        let spec = CapabilityKeySpec::try_from(new_authority)?;
        tracing::info!(%token_id, authority = spec.kind(), "updating supply key");

        let body = TransactionBody::TokenUpdate {
            token_id,
            supply_key: new_authority.clone(),
        };
        let (transaction_id, receipt) = self.execute(ctx, body).await?;

        Ok(OperationReceipt {
            status: receipt.status,
            emitted_events: Vec::new(),
            transaction_ref: transaction_id.to_string(),
        })
    }

    /// Current token snapshot
    pub async fn token_info(&self, token_id: &TokenId) -> Result<TokenRecord, AuthorityError> {
        self.ledger
            .token_info(token_id)
            .await
            .map_err(|source| AuthorityError::TokenQuery {
                token_id: *token_id,
                source,
            })
    }

    async fn execute(
        &self,
        ctx: &RunContext,
        body: TransactionBody,
    ) -> Result<(TransactionId, LedgerReceipt), AuthorityError> {
        let operation = body.operation();
        let envelope = TransactionEnvelope::new(TransactionHeader::for_payer(self.operator.account), body);
        let frozen = envelope.freeze().map_err(|e| AuthorityError::Freeze {
            operation,
            reason: e.to_string(),
        })?;
        let signed = frozen.sign(&self.operator.signing_key);

        ctx.check().map_err(AuthorityError::Interrupted)?;
        let transaction_id = match self.ledger.submit_transaction(&signed).await {
            Ok(id) => id,
            Err(ServiceError::Rejected(code)) => {
                tracing::error!(operation, %code, "transaction rejected at submission");
                return Err(AuthorityError::Rejected { operation, code });
            }
            Err(source) => return Err(AuthorityError::Submission { operation, source }),
        };
        tracing::debug!(operation, %transaction_id, "transaction submitted");

        let ledger = &self.ledger;
        let id = &transaction_id;
        let polled = poll_until(ctx, self.receipt_poll, |_| async move {
            match ledger.transaction_receipt(id).await {
                Ok(receipt) => Ok(Probe::Ready(receipt)),
                Err(e) if e.is_not_found() => Ok(Probe::NotYet),
                Err(e) => Err(e),
            }
        })
        .await
        .map_err(|e| match e {
            PollError::Exhausted { attempts } => AuthorityError::ReceiptTimeout {
                transaction_id,
                attempts,
            },
            PollError::Failed { error, .. } => AuthorityError::ReceiptUnavailable {
                transaction_id,
                source: error,
            },
            PollError::Interrupted(e) => AuthorityError::Interrupted(e),
        })?;

        tracing::info!(operation, %transaction_id, status = %polled.value.status, "receipt received");
        Ok((transaction_id, polled.value))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::ContextError;
    use crate::key_spec::KeySpecError;
    use crate::response_code::ResponseCode;
    use crate::services::MockLedgerAuthorityService;
    use crate::types::{AccountId, ContractId};
    use ed25519_dalek::SigningKey;

    fn operator() -> Operator {
        Operator::new(AccountId::new(0, 0, 2), SigningKey::from_bytes(&[3u8; 32]))
    }

    fn record(token_id: TokenId) -> TokenRecord {
        TokenRecord {
            token_id,
            name: "Test Token".into(),
            symbol: "TST".into(),
            decimals: 8,
            total_supply: 1_000_000,
            treasury: AccountId::new(0, 0, 2),
            supply_authority: None,
        }
    }

    fn expect_signed_submit(mock: &mut MockLedgerAuthorityService) {
        let verifying = operator().signing_key.verifying_key();
        mock.expect_submit_transaction()
            .times(1)
            .returning(move |tx| {
                assert!(tx.is_signed_by(&verifying));
                Ok(tx.transaction_id)
            });
    }

    #[tokio::test(start_paused = true)]
    async fn create_token_waits_for_receipt() {
        let mut mock = MockLedgerAuthorityService::new();
        expect_signed_submit(&mut mock);
        let mut pending = 2;
        mock.expect_transaction_receipt().times(3).returning(move |id| {
            if pending > 0 {
                pending -= 1;
                Err(ServiceError::NotFound(id.to_string()))
            } else {
                Ok(LedgerReceipt {
                    status: ResponseCode::SUCCESS,
                    token_id: Some(TokenId::new(0, 0, 9001)),
                })
            }
        });
        mock.expect_token_info()
            .times(1)
            .returning(|id| Ok(record(*id)));

        let executor = AuthorityExecutor::new(Arc::new(mock), operator());
        let token = executor
            .create_token(&RunContext::unbounded(), &TokenSpec::default())
            .await
            .unwrap();
        assert_eq!(token.token_id, TokenId::new(0, 0, 9001));
    }

    #[tokio::test(start_paused = true)]
    async fn create_token_rejection_carries_status() {
        let mut mock = MockLedgerAuthorityService::new();
        expect_signed_submit(&mut mock);
        mock.expect_transaction_receipt().returning(|_| {
            Ok(LedgerReceipt {
                status: ResponseCode::INVALID_SIGNATURE,
                token_id: None,
            })
        });
        mock.expect_token_info().never();

        let executor = AuthorityExecutor::new(Arc::new(mock), operator());
        let err = executor
            .create_token(&RunContext::unbounded(), &TokenSpec::default())
            .await
            .unwrap_err();
        assert_eq!(err.status(), Some(ResponseCode::INVALID_SIGNATURE));
    }

    #[tokio::test(start_paused = true)]
    async fn update_returns_receipt_for_any_status() {
        let mut mock = MockLedgerAuthorityService::new();
        mock.expect_submit_transaction().returning(|tx| {
            let envelope = tx.decode_envelope().unwrap();
            assert!(matches!(envelope.body, TransactionBody::TokenUpdate { .. }));
            Ok(tx.transaction_id)
        });
        mock.expect_transaction_receipt().returning(|_| {
            Ok(LedgerReceipt {
                status: ResponseCode::TOKEN_HAS_NO_SUPPLY_KEY,
                token_id: None,
            })
        });

        let executor = AuthorityExecutor::new(Arc::new(mock), operator());
        let key = KeyValue::from(&CapabilityKeySpec::ContractId(ContractId::new(0, 0, 7)));
        let receipt = executor
            .update_supply_key(&RunContext::unbounded(), TokenId::new(0, 0, 9001), &key)
            .await
            .unwrap();
        assert_eq!(receipt.status, ResponseCode::TOKEN_HAS_NO_SUPPLY_KEY);
        assert!(receipt.emitted_events.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn multi_variant_authority_never_submitted() {
        let mut mock = MockLedgerAuthorityService::new();
        mock.expect_submit_transaction().never();

        let executor = AuthorityExecutor::new(Arc::new(mock), operator());
        let key = KeyValue {
            inherit_account_key: true,
            contract_id: ContractId::new(0, 0, 7).to_evm_address(),
            ..KeyValue::default()
        };
        let err = executor
            .update_supply_key(&RunContext::unbounded(), TokenId::new(0, 0, 1), &key)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            AuthorityError::InvalidKeySpec(KeySpecError::MultipleVariants(_))
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn submission_transport_error_is_retryable() {
        let mut mock = MockLedgerAuthorityService::new();
        mock.expect_submit_transaction()
            .returning(|_| Err(ServiceError::Transport("timeout".into())));
        mock.expect_transaction_receipt().never();

        let executor = AuthorityExecutor::new(Arc::new(mock), operator());
        let err = executor
            .create_token(&RunContext::unbounded(), &TokenSpec::default())
            .await
            .unwrap_err();
        assert!(err.is_retryable());
    }

    #[tokio::test(start_paused = true)]
    async fn receipt_never_arrives() {
        let mut mock = MockLedgerAuthorityService::new();
        expect_signed_submit(&mut mock);
        mock.expect_transaction_receipt()
            .times(3)
            .returning(|id| Err(ServiceError::NotFound(id.to_string())));

        let executor = AuthorityExecutor::new(Arc::new(mock), operator())
            .with_receipt_poll(PollPolicy::new(Duration::from_millis(100), 3));
        let err = executor
            .create_token(&RunContext::unbounded(), &TokenSpec::default())
            .await
            .unwrap_err();
        assert!(matches!(err, AuthorityError::ReceiptTimeout { attempts: 3, .. }));
    }

    #[tokio::test(start_paused = true)]
    async fn expired_context_skips_submission() {
        let mut mock = MockLedgerAuthorityService::new();
        mock.expect_submit_transaction().never();

        let ctx = RunContext::unbounded().with_timeout(Duration::ZERO);
        let executor = AuthorityExecutor::new(Arc::new(mock), operator());
        let err = executor
            .create_token(&ctx, &TokenSpec::default())
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            AuthorityError::Interrupted(ContextError::DeadlineExceeded)
        ));
    }
}
