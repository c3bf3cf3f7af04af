//! Concurrent item synchronization.
//!
//! Clients submit ordered batches of append/modify/remove operations for a
//! list. [`SyncEngine`] turns each into one timestamp-guarded mutation and
//! runs them in order against an [`ItemStore`]; no locks are held across
//! mutations, and racing writers are resolved by the store's atomic guard.

mod clock;
mod engine;
mod error;
mod operation;
mod store;

pub use clock::{Clock, IdGenerator, ManualClock, SequentialIds, SystemClock, UuidIds};
pub use engine::SyncEngine;
pub use error::SyncError;
pub use operation::{Operation, SyncRequest, SyncResponse, WireOperation};
pub use store::{GuardedMutation, ItemStore, MatchOutcome, StoreError};
