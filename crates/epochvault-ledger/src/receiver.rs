//! Post-update acknowledgement hook for requests.
//!
//! The hook runs after the ledger has recorded a request, so it observes
//! the updated balances. It is an untrusted collaborator: whatever it
//! returns is surfaced to the caller, and a failure aborts the request.

use epochvault_types::{AccountId, Amount, RequestId, Result};

/// What a receiver is told about a freshly recorded request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestAck {
    /// Account that submitted the request.
    pub operator: AccountId,
    /// Account whose funds were moved.
    pub owner: AccountId,
    /// Account the request is recorded for.
    pub receiver: AccountId,
    /// Epoch the request was recorded under.
    pub request_id: RequestId,
    /// Amount requested by this call.
    pub amount: Amount,
    /// The receiver's request balance for the epoch after this call.
    pub balance_after: Amount,
    /// Opaque data forwarded from the caller.
    pub data: Vec<u8>,
}

/// Receiver-side acknowledgement capability.
pub trait RequestReceiver {
    /// Called after a deposit request has been recorded.
    fn on_deposit_requested(&mut self, ack: &RequestAck) -> Result<()>;

    /// Called after a redeem request has been recorded.
    fn on_redeem_requested(&mut self, ack: &RequestAck) -> Result<()>;
}

/// Receiver that accepts everything.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopReceiver;

impl RequestReceiver for NoopReceiver {
    fn on_deposit_requested(&mut self, _ack: &RequestAck) -> Result<()> {
        Ok(())
    }

    fn on_redeem_requested(&mut self, _ack: &RequestAck) -> Result<()> {
        Ok(())
    }
}
