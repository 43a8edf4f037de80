//! Core types for the poll ledger
//!
//! All types are designed for:
//! - Deterministic serialization (bincode)
//! - Memory safety (no unsafe code)
//! - Explicit time: status is always derived from a caller-supplied clock reading

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

/// Poll identifier: dense, sequential, assigned in creation order starting at 0
pub type PollId = u64;

/// Option identifier: index into the poll's `options` sequence
pub type OptionIndex = u32;

/// Voter address (public-key pseudonym, hex-encoded)
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct VoterAddress(String);

impl VoterAddress {
    /// Create new voter address
    pub fn new(addr: impl Into<String>) -> Self {
        Self(addr.into())
    }

    /// Get as string
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for VoterAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Ballot cardinality mode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[repr(u8)]
pub enum VoteType {
    /// Exactly one option per ballot
    SingleChoice = 1,
    /// At least one option per ballot, all distinct
    MultiChoice = 2,
}

impl VoteType {
    /// Canonical string form (single source for every consumer)
    pub fn as_str(&self) -> &'static str {
        match self {
            VoteType::SingleChoice => "single_choice",
            VoteType::MultiChoice => "multi_choice",
        }
    }
}

impl fmt::Display for VoteType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Explicitly persisted status flag
///
/// Set only by creator-triggered transitions or the expiry sweep. The status
/// reported to callers is [`PollStatus`], derived from this flag plus time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[repr(u8)]
pub enum StoredStatus {
    /// Open for ballots (subject to the time window)
    Active = 1,
    /// Explicitly ended (terminal)
    Ended = 2,
    /// Explicitly cancelled (terminal)
    Cancelled = 3,
}

/// Effective poll status, derived from stored status plus current time
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[repr(u8)]
pub enum PollStatus {
    /// Start time not yet reached
    Pending = 1,
    /// Within the voting window and not explicitly terminated
    Active = 2,
    /// Past end time, or explicitly ended (terminal)
    Ended = 3,
    /// Explicitly cancelled (terminal)
    Cancelled = 4,
}

impl PollStatus {
    /// Canonical string form (single source for every consumer)
    pub fn as_str(&self) -> &'static str {
        match self {
            PollStatus::Pending => "pending",
            PollStatus::Active => "active",
            PollStatus::Ended => "ended",
            PollStatus::Cancelled => "cancelled",
        }
    }

    /// Check if this status is terminal
    pub fn is_terminal(&self) -> bool {
        matches!(self, PollStatus::Ended | PollStatus::Cancelled)
    }
}

impl fmt::Display for PollStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Poll record (immutable after creation except for the stored status flag)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Poll {
    /// Sequential poll ID
    pub id: PollId,

    /// Poll title (non-empty)
    pub title: String,

    /// Free-form description
    pub description: String,

    /// Ordered option labels; index position is the canonical option identifier
    pub options: Vec<String>,

    /// Ballot cardinality mode
    pub vote_type: VoteType,

    /// Creator address; sole authority for end/cancel
    pub creator: VoterAddress,

    /// Voting window start
    pub start_time: DateTime<Utc>,

    /// Voting window end (strictly after start)
    pub end_time: DateTime<Utc>,

    /// Persisted status flag
    pub stored_status: StoredStatus,

    /// If true, only `allowed_voters` may cast ballots
    pub is_private: bool,

    /// Allow-list, relevant only when `is_private`
    pub allowed_voters: BTreeSet<VoterAddress>,

    /// Creation timestamp
    pub created_at: DateTime<Utc>,
}

impl Poll {
    /// Derive effective status at the given instant
    pub fn status_at(&self, now: DateTime<Utc>) -> PollStatus {
        crate::lifecycle::effective_status(self.stored_status, self.start_time, self.end_time, now)
    }

    /// Check whether the address may vote on this poll
    pub fn is_voter_allowed(&self, voter: &VoterAddress) -> bool {
        !self.is_private || self.allowed_voters.contains(voter)
    }
}

/// Parameters for poll creation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreatePollRequest {
    /// Poll title (non-empty)
    pub title: String,

    /// Free-form description
    pub description: String,

    /// Ordered option labels (>= 2, distinct, non-empty)
    pub options: Vec<String>,

    /// Ballot cardinality mode
    pub vote_type: VoteType,

    /// Creator address
    pub creator: VoterAddress,

    /// Voting window start
    pub start_time: DateTime<Utc>,

    /// Voting window end
    pub end_time: DateTime<Utc>,

    /// Restrict voting to `allowed_voters`
    pub is_private: bool,

    /// Allow-list, relevant only when `is_private`
    pub allowed_voters: BTreeSet<VoterAddress>,
}

/// One voter's immutable recorded choices for a poll
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Ballot {
    /// Poll this ballot belongs to
    pub poll_id: PollId,

    /// Voter address
    pub voter: VoterAddress,

    /// Selected option indices (distinct, in range; exactly 1 for single-choice)
    pub choices: Vec<OptionIndex>,

    /// Cast timestamp
    pub cast_at: DateTime<Utc>,
}

/// Per-poll vote counters (derived data, maintained alongside ballots)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Tally {
    /// Per-option counters, aligned to the poll's `options`
    pub counts: Vec<u64>,

    /// Distinct addresses with a recorded ballot
    pub total_voters: u64,
}

impl Tally {
    /// Empty tally for a poll with `option_count` options
    pub fn new(option_count: usize) -> Self {
        Self {
            counts: vec![0; option_count],
            total_voters: 0,
        }
    }

    /// Apply one ballot: each selected option counter is incremented exactly once
    pub fn apply(&mut self, choices: &[OptionIndex]) {
        for &idx in choices {
            self.counts[idx as usize] += 1;
        }
        self.total_voters += 1;
    }
}

/// Poll snapshot returned by read queries, with effective status resolved
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PollSnapshot {
    /// The poll record
    pub poll: Poll,

    /// Effective status at query time
    pub status: PollStatus,

    /// Distinct addresses with a recorded ballot
    pub total_voters: u64,
}

/// Lifecycle event emitted after each committed mutation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Event {
    /// A poll was created
    PollCreated {
        /// New poll ID
        poll_id: PollId,
        /// Creator address
        creator: VoterAddress,
    },
    /// A ballot was recorded
    BallotCast {
        /// Poll voted on
        poll_id: PollId,
        /// Voter address
        voter: VoterAddress,
        /// Selected option indices
        choices: Vec<OptionIndex>,
    },
    /// A poll was ended (explicitly or by the expiry sweep)
    PollEnded {
        /// Ended poll ID
        poll_id: PollId,
    },
    /// A poll was cancelled
    PollCancelled {
        /// Cancelled poll ID
        poll_id: PollId,
    },
}
