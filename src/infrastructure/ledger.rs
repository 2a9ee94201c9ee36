use crate::domain::ledger::{
    GatewayError, HoldRef, HoldRequest, IdempotencyKey, LedgerMetadata, LedgerOperation,
    TransferRef, TransferRequest,
};
use crate::domain::money::{Currency, Money};
use crate::domain::ports::LedgerGateway;
use crate::domain::user::PayeeAccount;
use async_trait::async_trait;
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use uuid::Uuid;

/// Payout destinations the simulated processor accepts.
pub const PAYEE_PREFIX: &str = "acct_";

type GatewayResult<T> = std::result::Result<T, GatewayError>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HoldState {
    Held,
    Captured,
    Refunded,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Hold {
    pub amount: Money,
    pub currency: Currency,
    pub state: HoldState,
    pub metadata: LedgerMetadata,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Transfer {
    pub transfer_ref: TransferRef,
    pub payee: PayeeAccount,
    pub amount: Money,
    pub currency: Currency,
    pub metadata: LedgerMetadata,
}

#[derive(Debug, Clone)]
enum Reply {
    Hold(HoldRef),
    Done,
    Transfer(TransferRef),
}

#[derive(Default)]
struct LedgerState {
    holds: HashMap<HoldRef, Hold>,
    transfers: Vec<Transfer>,
    replies: HashMap<IdempotencyKey, Reply>,
    calls: HashMap<LedgerOperation, usize>,
    faults: HashMap<LedgerOperation, VecDeque<GatewayError>>,
    delays: HashMap<LedgerOperation, VecDeque<Duration>>,
}

impl LedgerState {
    /// Counts the call and pops any injected fault or delay for it.
    fn begin(&mut self, op: LedgerOperation) -> (Option<GatewayError>, Option<Duration>) {
        *self.calls.entry(op).or_default() += 1;
        let fault = self.faults.get_mut(&op).and_then(VecDeque::pop_front);
        let delay = self.delays.get_mut(&op).and_then(VecDeque::pop_front);
        (fault, delay)
    }
}

/// An in-process payment processor.
///
/// Holds, captures, transfers and refunds are recorded in memory and
/// deduplicated by idempotency key. Faults and delays can be queued per
/// operation to exercise the orchestrator's failure paths. A delayed call
/// takes effect before it sleeps, so a caller that gives up waiting sees an
/// unknown outcome exactly like with a real processor.
#[derive(Default, Clone)]
pub struct SimulatedLedger {
    state: Arc<Mutex<LedgerState>>,
}

impl SimulatedLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// The next call to `op` fails with `error` before taking effect.
    pub async fn fail_next(&self, op: LedgerOperation, error: GatewayError) {
        let mut state = self.state.lock().await;
        state.faults.entry(op).or_default().push_back(error);
    }

    /// The next call to `op` answers only after `delay`.
    pub async fn delay_next(&self, op: LedgerOperation, delay: Duration) {
        let mut state = self.state.lock().await;
        state.delays.entry(op).or_default().push_back(delay);
    }

    /// Number of calls received for `op`, replays included.
    pub async fn calls(&self, op: LedgerOperation) -> usize {
        let state = self.state.lock().await;
        state.calls.get(&op).copied().unwrap_or_default()
    }

    pub async fn hold(&self, hold: &HoldRef) -> Option<Hold> {
        let state = self.state.lock().await;
        state.holds.get(hold).cloned()
    }

    /// Payouts that actually moved money, in order.
    pub async fn transfers(&self) -> Vec<Transfer> {
        let state = self.state.lock().await;
        state.transfers.clone()
    }

    async fn settle<T>(delay: Option<Duration>, result: GatewayResult<T>) -> GatewayResult<T> {
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        result
    }
}

#[async_trait]
impl LedgerGateway for SimulatedLedger {
    async fn authorize(&self, request: HoldRequest) -> GatewayResult<HoldRef> {
        let (result, delay) = {
            let mut guard = self.state.lock().await;
            let state = &mut *guard;
            let (fault, delay) = state.begin(LedgerOperation::Authorize);
            let result = match fault {
                Some(error) => Err(error),
                None => match state.replies.get(&request.idempotency_key) {
                    Some(Reply::Hold(hold)) => Ok(hold.clone()),
                    Some(_) => Err(GatewayError::Permanent(format!(
                        "idempotency key {} was used for another operation",
                        request.idempotency_key.as_str()
                    ))),
                    None if !request.amount.is_positive() => Err(GatewayError::Permanent(
                        format!("amount {} must be positive", request.amount),
                    )),
                    None => {
                        let hold = HoldRef(format!("hold_{}", Uuid::new_v4().simple()));
                        state.holds.insert(
                            hold.clone(),
                            Hold {
                                amount: request.amount,
                                currency: request.currency,
                                state: HoldState::Held,
                                metadata: request.metadata,
                            },
                        );
                        state
                            .replies
                            .insert(request.idempotency_key, Reply::Hold(hold.clone()));
                        Ok(hold)
                    }
                },
            };
            (result, delay)
        };
        Self::settle(delay, result).await
    }

    async fn capture(&self, hold: &HoldRef, key: &IdempotencyKey) -> GatewayResult<()> {
        let (result, delay) = {
            let mut guard = self.state.lock().await;
            let state = &mut *guard;
            let (fault, delay) = state.begin(LedgerOperation::Capture);
            let result = match fault {
                Some(error) => Err(error),
                None if matches!(state.replies.get(key), Some(Reply::Done)) => Ok(()),
                None => match state.holds.get_mut(hold) {
                    None => Err(GatewayError::Permanent(format!("no such hold {hold}"))),
                    Some(held) if held.state != HoldState::Held => Err(GatewayError::Permanent(
                        format!("hold {hold} can no longer be captured"),
                    )),
                    Some(held) => {
                        held.state = HoldState::Captured;
                        state.replies.insert(key.clone(), Reply::Done);
                        Ok(())
                    }
                },
            };
            (result, delay)
        };
        Self::settle(delay, result).await
    }

    async fn transfer(&self, request: TransferRequest) -> GatewayResult<TransferRef> {
        let (result, delay) = {
            let mut guard = self.state.lock().await;
            let state = &mut *guard;
            let (fault, delay) = state.begin(LedgerOperation::Transfer);
            let result = match fault {
                Some(error) => Err(error),
                None => match state.replies.get(&request.idempotency_key) {
                    Some(Reply::Transfer(transfer_ref)) => Ok(transfer_ref.clone()),
                    Some(_) => Err(GatewayError::Permanent(format!(
                        "idempotency key {} was used for another operation",
                        request.idempotency_key.as_str()
                    ))),
                    None if !request.payee.0.starts_with(PAYEE_PREFIX) => Err(
                        GatewayError::Permanent(format!("invalid payee account {}", request.payee)),
                    ),
                    None if !request.amount.is_positive() => Err(GatewayError::Permanent(
                        format!("amount {} must be positive", request.amount),
                    )),
                    None => {
                        let transfer_ref = TransferRef(format!("tr_{}", Uuid::new_v4().simple()));
                        state.transfers.push(Transfer {
                            transfer_ref: transfer_ref.clone(),
                            payee: request.payee,
                            amount: request.amount,
                            currency: request.currency,
                            metadata: request.metadata,
                        });
                        state.replies.insert(
                            request.idempotency_key,
                            Reply::Transfer(transfer_ref.clone()),
                        );
                        Ok(transfer_ref)
                    }
                },
            };
            (result, delay)
        };
        Self::settle(delay, result).await
    }

    async fn refund(
        &self,
        hold: &HoldRef,
        amount: Option<Money>,
        key: &IdempotencyKey,
    ) -> GatewayResult<()> {
        let (result, delay) = {
            let mut guard = self.state.lock().await;
            let state = &mut *guard;
            let (fault, delay) = state.begin(LedgerOperation::Refund);
            let result = match fault {
                Some(error) => Err(error),
                None if matches!(state.replies.get(key), Some(Reply::Done)) => Ok(()),
                None => match state.holds.get_mut(hold) {
                    None => Err(GatewayError::Permanent(format!("no such hold {hold}"))),
                    Some(held) if held.state == HoldState::Refunded => Err(
                        GatewayError::Permanent(format!("hold {hold} was already refunded")),
                    ),
                    Some(held) if amount.is_some_and(|a| a > held.amount) => {
                        Err(GatewayError::Permanent(format!(
                            "refund exceeds the held amount {}",
                            held.amount
                        )))
                    }
                    Some(held) => {
                        held.state = HoldState::Refunded;
                        state.replies.insert(key.clone(), Reply::Done);
                        Ok(())
                    }
                },
            };
            (result, delay)
        };
        Self::settle(delay, result).await
    }
}
