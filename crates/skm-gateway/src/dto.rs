//! Wire shapes of the gateway and mirror node
//!
//! Hex fields are `0x`-prefixed on the way out and accepted with or
//! without the prefix on the way in.

use serde::{Deserialize, Serialize};
use skm_core::{EvmAddress, LogEntry, ResponseCode, ServiceError};

/// Error body carrying a ledger status
#[derive(Debug, Deserialize)]
pub(crate) struct Rejection {
    pub(crate) status: i64,
}

/// `POST /v1/transactions` answer
#[derive(Debug, Deserialize)]
pub(crate) struct Submitted {
    pub(crate) transaction_id: String,
}

/// `POST /v1/contracts` body
#[derive(Debug, Serialize)]
pub(crate) struct DeployRequest {
    pub(crate) bytecode: String,
    pub(crate) gas: u64,
}

/// `POST /v1/contracts` answer
#[derive(Debug, Deserialize)]
pub(crate) struct Deployed {
    pub(crate) address: EvmAddress,
}

/// `POST /v1/contracts/{address}/calls` body
#[derive(Debug, Serialize)]
pub(crate) struct CallRequest {
    pub(crate) method: &'static str,
    pub(crate) args: serde_json::Value,
    pub(crate) gas: u64,
}

/// `POST /v1/contracts/{address}/calls` answer
#[derive(Debug, Serialize, Deserialize)]
pub(crate) struct CallReceipt {
    pub(crate) status: ResponseCode,
    pub(crate) transaction_hash: String,
    #[serde(default)]
    pub(crate) logs: Vec<Log>,
}

/// One receipt log
#[derive(Debug, Serialize, Deserialize)]
pub(crate) struct Log {
    pub(crate) address: EvmAddress,
    pub(crate) topics: Vec<String>,
    pub(crate) data: String,
}

impl Log {
    pub(crate) fn into_entry(self) -> Result<LogEntry, ServiceError> {
        let topics = self
            .topics
            .iter()
            .map(|t| {
                let mut topic = [0u8; 32];
                hex::decode_to_slice(strip_0x(t), &mut topic)
                    .map_err(|e| ServiceError::Malformed(format!("log topic {t}: {e}")))?;
                Ok(topic)
            })
            .collect::<Result<Vec<_>, ServiceError>>()?;
        let data = hex::decode(strip_0x(&self.data))
            .map_err(|e| ServiceError::Malformed(format!("log data: {e}")))?;
        Ok(LogEntry {
            address: self.address,
            topics,
            data,
        })
    }
}

/// Decode receipt logs, dropping any that are not valid hex.
///
/// A receipt can carry logs from every contract the call touched; one bad
/// log must not hide the confirming event of ours.
pub(crate) fn decode_logs(logs: Vec<Log>) -> Vec<LogEntry> {
    logs.into_iter()
        .filter_map(|log| {
            let address = log.address;
            match log.into_entry() {
                Ok(entry) => Some(entry),
                Err(e) => {
                    tracing::debug!(%address, error = %e, "skipping undecodable log");
                    None
                }
            }
        })
        .collect()
}

/// `GET /api/v1/contracts/{address}` answer from the mirror node
#[derive(Debug, Deserialize)]
pub(crate) struct MirrorContract {
    #[serde(default)]
    pub(crate) contract_id: Option<String>,
}

pub(crate) fn strip_0x(s: &str) -> &str {
    s.strip_prefix("0x").unwrap_or(s)
}
