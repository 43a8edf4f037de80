//! Poll Ledger Core
//!
//! Append-only poll and ballot ledger with a time-gated lifecycle state machine.
//!
//! # Architecture
//!
//! - **Single Writer**: one actor task totally orders all mutations
//! - **Explicit Time**: effective status is derived from a caller-supplied clock
//! - **Atomic Commits**: a ballot and its tally increment are one write batch
//! - **Typed Rejections**: every failed operation carries exactly one reason
//!
//! # Invariants
//!
//! - Poll IDs are dense, assigned in creation order starting at 0
//! - At most one ballot per `(poll, voter)`; repeats fail `AlreadyVoted`
//! - Ballot choices are always valid indices into the poll's options
//! - `Pending -> Active -> {Ended, Cancelled}`; terminal states are never left
//! - `total_voters` equals the number of distinct addresses with a ballot

#![forbid(unsafe_code)]
#![warn(
    missing_docs,
    rust_2018_idioms,
    missing_debug_implementations,
    clippy::all
)]

pub mod actor;
pub mod clock;
pub mod config;
pub mod error;
pub mod ledger;
pub mod lifecycle;
pub mod metrics;
pub mod store;
pub mod types;

// Re-exports
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::Config;
pub use error::{Error, Result};
pub use ledger::Ledger;
pub use store::Storage;
pub use types::{
    Ballot, CreatePollRequest, Event, OptionIndex, Poll, PollId, PollSnapshot, PollStatus,
    StoredStatus, Tally, VoteType, VoterAddress,
};
