//! Request/response types exchanged with the external payment processor.

use super::PaymentId;
use super::money::{Currency, Money};
use super::user::PayeeAccount;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LedgerOperation {
    Authorize,
    Capture,
    Transfer,
    Refund,
}

impl fmt::Display for LedgerOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            LedgerOperation::Authorize => "authorize",
            LedgerOperation::Capture => "capture",
            LedgerOperation::Transfer => "transfer",
            LedgerOperation::Refund => "refund",
        };
        f.write_str(name)
    }
}

/// Reference to a held (authorized, not yet captured) charge.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct HoldRef(pub String);

/// Reference to a completed payout.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TransferRef(pub String);

impl fmt::Display for HoldRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl fmt::Display for TransferRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Processor-side deduplication key. Keyed by payment id and operation so a
/// retried call can never charge or pay out twice.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct IdempotencyKey(String);

impl IdempotencyKey {
    pub fn for_payment(payment_id: PaymentId, operation: LedgerOperation) -> Self {
        Self(format!("payment:{payment_id}:{operation}"))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// Audit tags attached to ledger calls.
pub type LedgerMetadata = BTreeMap<String, String>;

#[derive(Debug, Clone, PartialEq)]
pub struct HoldRequest {
    pub amount: Money,
    pub currency: Currency,
    pub metadata: LedgerMetadata,
    pub idempotency_key: IdempotencyKey,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TransferRequest {
    pub amount: Money,
    pub currency: Currency,
    pub payee: PayeeAccount,
    pub metadata: LedgerMetadata,
    pub idempotency_key: IdempotencyKey,
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum GatewayError {
    /// The processor declined this attempt; a later retry may succeed.
    #[error("rejected: {0}")]
    Rejected(String),
    /// The processor refused in a way no retry will fix (e.g. invalid payee).
    #[error("permanently rejected: {0}")]
    Permanent(String),
    #[error("unavailable: {0}")]
    Unavailable(String),
    /// No answer within the deadline; the call may or may not have taken effect.
    #[error("timed out")]
    Timeout,
}

impl GatewayError {
    pub fn outcome_unknown(&self) -> bool {
        matches!(self, GatewayError::Timeout)
    }
}
