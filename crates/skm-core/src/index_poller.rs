//! Registry id resolution against the eventually-consistent index.
//!
//! "Not found" is the indexing-lag case and is retried within the poll
//! budget. Every other service error is permanent and returned on the
//! attempt that produced it.

use crate::context::RunContext;
use crate::error::IndexError;
use crate::poll::{poll_until, PollError, PollPolicy, Probe};
use crate::services::IndexQueryService;
use crate::types::{ContractId, EvmAddress};
use parking_lot::Mutex;
use std::sync::Arc;

/// Resolves contract addresses to registry ids
#[derive(Clone)]
pub struct IndexPoller {
    index: Arc<dyn IndexQueryService>,
}

impl IndexPoller {
    /// Create new poller
    #[inline]
    #[must_use]
    pub fn new(index: Arc<dyn IndexQueryService>) -> Self {
        Self { index }
    }

    /// Resolve `address`, calling `on_pending(attempt)` after each not-found lookup
    pub async fn resolve_registry_id_with<F>(
        &self,
        ctx: &RunContext,
        address: EvmAddress,
        policy: PollPolicy,
        mut on_pending: F,
    ) -> Result<ContractId, IndexError>
    where
        F: FnMut(u32) + Send,
    {
        let index = &self.index;
        let target = &address;
        let observer = Mutex::new(&mut on_pending);
        let observer = &observer;
        let result = poll_until(ctx, policy, |attempt| async move {
            match index.lookup_by_native_address(target).await {
                Ok(id) => Ok(Probe::Ready(id)),
                Err(e) if e.is_not_found() => {
                    let mut notify = observer.lock();
                    (*notify)(attempt);
                    Ok(Probe::NotYet)
                }
                Err(e) => Err(e),
            }
        })
        .await;

        match result {
            Ok(polled) => {
                tracing::info!(%address, registry_id = %polled.value, attempts = polled.attempts, "registry id resolved");
                Ok(polled.value)
            }
            Err(PollError::Exhausted { attempts }) => {
                tracing::warn!(%address, attempts, "registry id not indexed within budget");
                Err(IndexError::Timeout { address, attempts })
            }
            Err(PollError::Failed { attempt, error }) => Err(IndexError::Lookup {
                address,
                attempt,
                source: error,
            }),
            Err(PollError::Interrupted(e)) => Err(IndexError::Interrupted(e)),
        }
    }

    /// Resolve `address` within `policy`
    pub async fn resolve_registry_id(
        &self,
        ctx: &RunContext,
        address: EvmAddress,
        policy: PollPolicy,
    ) -> Result<ContractId, IndexError> {
        self.resolve_registry_id_with(ctx, address, policy, |_| {}).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::ContextError;
    use crate::services::{MockIndexQueryService, ServiceError};
    use mockall::Sequence;
    use std::time::Duration;

    fn address() -> EvmAddress {
        ContractId::new(0, 0, 7001).to_evm_address()
    }

    fn policy(max_attempts: u32) -> PollPolicy {
        PollPolicy::new(Duration::from_secs(1), max_attempts)
    }

    fn lagging_index(not_found: usize) -> MockIndexQueryService {
        let mut mock = MockIndexQueryService::new();
        let mut seq = Sequence::new();
        mock.expect_lookup_by_native_address()
            .times(not_found)
            .in_sequence(&mut seq)
            .returning(|a| Err(ServiceError::NotFound(a.to_string())));
        mock.expect_lookup_by_native_address()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| Ok(ContractId::new(0, 0, 7001)));
        mock
    }

    #[tokio::test(start_paused = true)]
    async fn resolves_on_nth_attempt() {
        let poller = IndexPoller::new(Arc::new(lagging_index(3)));
        let mut pending = Vec::new();

        let id = poller
            .resolve_registry_id_with(&RunContext::unbounded(), address(), policy(10), |a| pending.push(a))
            .await
            .unwrap();

        assert_eq!(id, ContractId::new(0, 0, 7001));
        assert_eq!(pending, vec![1, 2, 3]);
    }

    #[tokio::test(start_paused = true)]
    async fn resolves_on_last_allowed_attempt() {
        let poller = IndexPoller::new(Arc::new(lagging_index(4)));
        let id = poller
            .resolve_registry_id(&RunContext::unbounded(), address(), policy(5))
            .await
            .unwrap();
        assert_eq!(id, ContractId::new(0, 0, 7001));
    }

    #[tokio::test(start_paused = true)]
    async fn times_out_after_exactly_max_attempts() {
        let mut mock = MockIndexQueryService::new();
        mock.expect_lookup_by_native_address()
            .times(4)
            .returning(|a| Err(ServiceError::NotFound(a.to_string())));
        let poller = IndexPoller::new(Arc::new(mock));

        let err = poller
            .resolve_registry_id(&RunContext::unbounded(), address(), policy(4))
            .await
            .unwrap_err();

        assert!(matches!(err, IndexError::Timeout { attempts: 4, .. }));
    }

    #[tokio::test(start_paused = true)]
    async fn malformed_address_fails_fast() {
        let mut mock = MockIndexQueryService::new();
        mock.expect_lookup_by_native_address()
            .times(1)
            .returning(|_| Err(ServiceError::InvalidRequest("bad address".into())));
        let poller = IndexPoller::new(Arc::new(mock));

        let err = poller
            .resolve_registry_id(&RunContext::unbounded(), address(), policy(10))
            .await
            .unwrap_err();

        assert!(matches!(err, IndexError::Lookup { attempt: 1, .. }));
    }

    #[tokio::test(start_paused = true)]
    async fn transport_failure_is_not_retried() {
        let mut mock = MockIndexQueryService::new();
        mock.expect_lookup_by_native_address()
            .times(2)
            .returning({
                let mut calls = 0;
                move |a| {
                    calls += 1;
                    if calls == 1 {
                        Err(ServiceError::NotFound(a.to_string()))
                    } else {
                        Err(ServiceError::Transport("connection refused".into()))
                    }
                }
            });
        let poller = IndexPoller::new(Arc::new(mock));

        let err = poller
            .resolve_registry_id(&RunContext::unbounded(), address(), policy(10))
            .await
            .unwrap_err();

        assert!(matches!(err, IndexError::Lookup { attempt: 2, .. }));
    }

    #[tokio::test(start_paused = true)]
    async fn cancellation_stops_polling() {
        let mut mock = MockIndexQueryService::new();
        mock.expect_lookup_by_native_address()
            .returning(|a| Err(ServiceError::NotFound(a.to_string())));
        let poller = IndexPoller::new(Arc::new(mock));
        let (ctx, cancel) = RunContext::new();

        let task = tokio::spawn(async move {
            poller.resolve_registry_id(&ctx, address(), policy(100)).await
        });
        tokio::time::sleep(Duration::from_millis(2500)).await;
        cancel.cancel();

        let err = task.await.unwrap().unwrap_err();
        assert!(matches!(err, IndexError::Interrupted(ContextError::Cancelled)));
    }
}
