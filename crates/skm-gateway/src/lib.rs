//! SKM Gateway - HTTP service bindings
//!
//! Network-backed implementations of the three service traits in
//! `skm-core`:
//! - [`MirrorNodeClient`]: the mirror node REST API as the Index Query Service
//! - [`GatewayClient`]: a JSON transaction gateway as the Ledger Authority
//!   and Contract Execution services
//!
//! HTTP status is mapped onto [`ServiceError`]: 404 is `NotFound`, a 4xx
//! carrying a ledger status is `Rejected`, other 4xx are `InvalidRequest`
//! and everything else is `Transport`.

#![warn(unreachable_pub)]

mod dto;
mod gateway;
mod mirror;

pub use gateway::GatewayClient;
pub use mirror::MirrorNodeClient;

use reqwest::{Response, StatusCode};
use skm_core::{ResponseCode, ServiceError};
use std::time::Duration;

/// Default request timeout
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Errors building a client
#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    /// Endpoint is not an absolute http(s) URL
    #[error("invalid endpoint '{endpoint}': {reason}")]
    InvalidEndpoint {
        /// Endpoint as given
        endpoint: String,
        /// What is wrong with it
        reason: String,
    },

    /// The HTTP client could not be built
    #[error("http client: {0}")]
    Client(#[from] reqwest::Error),
}

/// Parse and normalise a base URL (no trailing slash)
fn base_url(endpoint: &str) -> Result<String, GatewayError> {
    skm_core::config::parse_endpoint(endpoint).map_err(|reason| GatewayError::InvalidEndpoint {
        endpoint: endpoint.to_string(),
        reason,
    })
}

fn http_client(timeout: Duration) -> Result<reqwest::Client, GatewayError> {
    Ok(reqwest::Client::builder().timeout(timeout).build()?)
}

fn transport(error: &reqwest::Error) -> ServiceError {
    if error.is_decode() {
        ServiceError::Malformed(error.to_string())
    } else {
        ServiceError::Transport(error.to_string())
    }
}

/// Map a non-success response onto a service error
async fn error_from(response: Response) -> ServiceError {
    let status = response.status();
    let body = response.text().await.unwrap_or_default();
    match status {
        StatusCode::NOT_FOUND => ServiceError::NotFound(body),
        s if s.is_client_error() => match serde_json::from_str::<dto::Rejection>(&body) {
            Ok(rejection) => ServiceError::Rejected(ResponseCode(rejection.status)),
            Err(_) => ServiceError::InvalidRequest(format!("{s}: {body}")),
        },
        s => ServiceError::Transport(format!("{s}: {body}")),
    }
}
