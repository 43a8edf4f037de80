//! Error types for the poll ledger

use crate::types::{PollId, VoterAddress};
use thiserror::Error;

/// Result type for ledger operations
pub type Result<T> = std::result::Result<T, Error>;

/// Ledger errors
///
/// Every rejected state-changing call fails with exactly one typed reason,
/// before any state mutation. Callers surface the failure kind verbatim;
/// `AlreadyVoted` in particular must never be retried.
#[derive(Error, Debug)]
pub enum Error {
    /// Poll creation parameters rejected
    #[error("Invalid parameters: {0}")]
    InvalidParameters(String),

    /// Poll not found (out-of-range ID)
    #[error("Poll not found: {0}")]
    PollNotFound(PollId),

    /// No ballot recorded for this voter on this poll
    #[error("No ballot for voter {voter} on poll {poll_id}")]
    BallotNotFound {
        /// Poll queried
        poll_id: PollId,
        /// Voter queried
        voter: VoterAddress,
    },

    /// Caller is not the poll creator
    #[error("Caller {caller} is not the creator of poll {poll_id}")]
    Unauthorized {
        /// Poll targeted
        poll_id: PollId,
        /// Offending caller
        caller: VoterAddress,
    },

    /// Poll is not currently active (pending, ended, or cancelled)
    #[error("Poll {poll_id} is not active (status: {status})")]
    NotActive {
        /// Poll targeted
        poll_id: PollId,
        /// Effective status at the time of the call
        status: crate::types::PollStatus,
    },

    /// Poll is already in a terminal state
    #[error("Poll {poll_id} is already terminal (status: {status})")]
    AlreadyTerminal {
        /// Poll targeted
        poll_id: PollId,
        /// Effective status at the time of the call
        status: crate::types::PollStatus,
    },

    /// Voter has already cast a ballot for this poll
    #[error("Voter {voter} has already voted on poll {poll_id}")]
    AlreadyVoted {
        /// Poll targeted
        poll_id: PollId,
        /// Voter with an existing ballot
        voter: VoterAddress,
    },

    /// Voter is not on the private poll's allow-list
    #[error("Voter {voter} is not authorized to vote on poll {poll_id}")]
    NotAuthorized {
        /// Poll targeted
        poll_id: PollId,
        /// Rejected voter
        voter: VoterAddress,
    },

    /// More than one choice on a single-choice poll
    #[error("Poll {poll_id} is single-choice but ballot selects {selected} options")]
    TooManyChoices {
        /// Poll targeted
        poll_id: PollId,
        /// Number of options the ballot selected
        selected: usize,
    },

    /// Choice set is empty, out of range, or contains duplicates
    #[error("Invalid choice for poll {poll_id}: {reason}")]
    InvalidChoice {
        /// Poll targeted
        poll_id: PollId,
        /// What was wrong with the choice set
        reason: String,
    },

    /// Storage error (RocksDB)
    #[error("Storage error: {0}")]
    Storage(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] bincode::Error),

    /// Concurrency error (actor mailbox closed, etc.)
    #[error("Concurrency error: {0}")]
    Concurrency(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Stable short name of the failure kind (used as a metrics label)
    pub fn kind(&self) -> &'static str {
        match self {
            Error::InvalidParameters(_) => "invalid_parameters",
            Error::PollNotFound(_) => "poll_not_found",
            Error::BallotNotFound { .. } => "ballot_not_found",
            Error::Unauthorized { .. } => "unauthorized",
            Error::NotActive { .. } => "not_active",
            Error::AlreadyTerminal { .. } => "already_terminal",
            Error::AlreadyVoted { .. } => "already_voted",
            Error::NotAuthorized { .. } => "not_authorized",
            Error::TooManyChoices { .. } => "too_many_choices",
            Error::InvalidChoice { .. } => "invalid_choice",
            Error::Storage(_) => "storage",
            Error::Serialization(_) => "serialization",
            Error::Concurrency(_) => "concurrency",
            Error::Config(_) => "config",
            Error::Io(_) => "io",
        }
    }
}

impl From<rocksdb::Error> for Error {
    fn from(err: rocksdb::Error) -> Self {
        Error::Storage(err.to_string())
    }
}
