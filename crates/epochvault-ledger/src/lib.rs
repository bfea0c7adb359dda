//! # epochvault-ledger
//!
//! **Accounting plane**: everything a vault remembers between calls.
//!
//! ## Architecture
//!
//! 1. **EpochLedger**: per-epoch records with per-account request balances,
//!    pending totals and, once settled, the epoch's `SettleValues`
//! 2. **Custody**: the external unit-of-value collaborator, applied in
//!    all-or-nothing batches of [`Movement`](epochvault_types::Movement)s
//! 3. **RequestReceiver**: the optional acknowledgement hook invoked after
//!    a request has been recorded
//!
//! ## Request Flow
//!
//! ```text
//! request → Custody.apply(owner → PendingSilo) → EpochLedger.record_*()
//!         → RequestReceiver.on_*_requested()   (observes updated state)
//! ```
//!
//! Claims are computed lazily from the settled epoch's snapshot, so a
//! settlement never loops over accounts.

pub mod custody;
pub mod epoch_ledger;
pub mod receiver;

pub use custody::{Custody, InMemoryCustody};
pub use epoch_ledger::{EpochLedger, EpochRecord, RecordReceipt};
pub use receiver::{NoopReceiver, RequestAck, RequestReceiver};
