//! Response Code Interpreter
//!
//! Ledger operations and the capability contract report their outcome as an
//! opaque integer. This module is the single place that turns such a code
//! into a verdict; call sites never compare against raw numbers.

use serde::{Deserialize, Serialize};

/// Category reported for codes missing from the lookup table.
pub const UNRECOGNIZED: &str = "unrecognized";

/// Outcome of interpreting a response code
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Verdict {
    /// Whether the code denotes success
    pub ok: bool,
    /// Human-readable category
    pub category: &'static str,
}

/// Numeric status returned by ledger and contract operations
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ResponseCode(pub i64);

impl ResponseCode {
    /// The ledger's success sentinel
    pub const SUCCESS: Self = Self(22);
    /// Transaction signature did not satisfy the required keys
    pub const INVALID_SIGNATURE: Self = Self(7);
    /// Transaction id was already used
    pub const DUPLICATE_TRANSACTION: Self = Self(11);
    /// Receipt is not (yet) available
    pub const RECEIPT_NOT_FOUND: Self = Self(18);
    /// Contract execution reverted
    pub const CONTRACT_REVERT_EXECUTED: Self = Self(33);
    /// Token id does not exist
    pub const INVALID_TOKEN_ID: Self = Self(167);
    /// Token has no supply key
    pub const TOKEN_HAS_NO_SUPPLY_KEY: Self = Self(180);

    /// Interpret this code
    #[inline]
    #[must_use]
    pub fn verdict(self) -> Verdict {
        interpret(self.0)
    }

    /// Shorthand for `verdict().ok`
    #[inline]
    #[must_use]
    pub fn is_success(self) -> bool {
        self.verdict().ok
    }
}

impl From<i64> for ResponseCode {
    fn from(value: i64) -> Self {
        Self(value)
    }
}

impl std::fmt::Display for ResponseCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} ({})", self.verdict().category, self.0)
    }
}

/// Decode a numeric status into a verdict.
///
/// Only the success sentinel (22) is ok. Unmapped codes are not an error;
/// they map to [`UNRECOGNIZED`].
#[must_use]
pub fn interpret(code: i64) -> Verdict {
    Verdict {
        ok: code == ResponseCode::SUCCESS.0,
        category: category(code),
    }
}

fn category(code: i64) -> &'static str {
    match code {
        0 => "OK",
        1 => "INVALID_TRANSACTION",
        2 => "PAYER_ACCOUNT_NOT_FOUND",
        3 => "INVALID_NODE_ACCOUNT",
        4 => "TRANSACTION_EXPIRED",
        5 => "INVALID_TRANSACTION_START",
        6 => "INVALID_TRANSACTION_DURATION",
        7 => "INVALID_SIGNATURE",
        8 => "MEMO_TOO_LONG",
        9 => "INSUFFICIENT_TX_FEE",
        10 => "INSUFFICIENT_PAYER_BALANCE",
        11 => "DUPLICATE_TRANSACTION",
        12 => "BUSY",
        13 => "NOT_SUPPORTED",
        14 => "INVALID_FILE_ID",
        15 => "INVALID_ACCOUNT_ID",
        16 => "INVALID_CONTRACT_ID",
        17 => "INVALID_TRANSACTION_ID",
        18 => "RECEIPT_NOT_FOUND",
        19 => "RECORD_NOT_FOUND",
        20 => "INVALID_SOLIDITY_ID",
        21 => "UNKNOWN",
        22 => "SUCCESS",
        23 => "FAIL_INVALID",
        24 => "FAIL_FEE",
        25 => "FAIL_BALANCE",
        33 => "CONTRACT_REVERT_EXECUTED",
        167 => "INVALID_TOKEN_ID",
        180 => "TOKEN_HAS_NO_SUPPLY_KEY",
        _ => UNRECOGNIZED,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn success_sentinel_is_ok() {
        let verdict = interpret(22);
        assert!(verdict.ok);
        assert_eq!(verdict.category, "SUCCESS");
    }

    #[test]
    fn known_failure_has_category() {
        let verdict = interpret(7);
        assert!(!verdict.ok);
        assert_eq!(verdict.category, "INVALID_SIGNATURE");
    }

    #[test]
    fn ok_zero_is_not_success() {
        // 0 is a precheck status, not a consensus success.
        assert!(!interpret(0).ok);
    }

    #[test]
    fn unknown_code_is_unrecognized() {
        let verdict = interpret(99_999);
        assert!(!verdict.ok);
        assert_eq!(verdict.category, UNRECOGNIZED);
        assert_eq!(interpret(-1).category, UNRECOGNIZED);
    }

    #[test]
    fn display_includes_category_and_code() {
        assert_eq!(ResponseCode(7).to_string(), "INVALID_SIGNATURE (7)");
    }

    proptest! {
        #[test]
        fn prop_only_sentinel_is_ok(code in any::<i64>()) {
            prop_assert_eq!(interpret(code).ok, code == 22);
        }
    }
}
