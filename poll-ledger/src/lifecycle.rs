//! Poll lifecycle state machine
//!
//! Pure functions over `(stored status, time window, now)`. The current time
//! is always an explicit argument so every derivation is deterministic and
//! testable without a wall clock.
//!
//! Effective status progression is monotonic along
//! `Pending -> Active -> {Ended, Cancelled}`; the terminal states are never
//! left once entered.

use crate::{
    error::{Error, Result},
    types::{CreatePollRequest, OptionIndex, Poll, PollStatus, StoredStatus, VoteType, VoterAddress},
};
use chrono::{DateTime, Utc};
use std::collections::HashSet;

/// Derive the effective status of a poll at the given instant
///
/// Explicit terminal flags override time; otherwise the time window decides.
/// A poll past its end time reports `Ended` even while the stored flag still
/// says `Active` (the expiry sweep persists this later).
pub fn effective_status(
    stored: StoredStatus,
    start_time: DateTime<Utc>,
    end_time: DateTime<Utc>,
    now: DateTime<Utc>,
) -> PollStatus {
    match stored {
        StoredStatus::Cancelled => PollStatus::Cancelled,
        StoredStatus::Ended => PollStatus::Ended,
        StoredStatus::Active => {
            if now < start_time {
                PollStatus::Pending
            } else if now > end_time {
                PollStatus::Ended
            } else {
                PollStatus::Active
            }
        }
    }
}

/// Validate poll creation parameters
///
/// Rejects with `InvalidParameters` before any state is touched.
pub fn validate_create(req: &CreatePollRequest) -> Result<()> {
    if req.title.trim().is_empty() {
        return Err(Error::InvalidParameters("title must not be empty".to_string()));
    }

    if req.options.len() < 2 {
        return Err(Error::InvalidParameters(
            "at least 2 options are required".to_string(),
        ));
    }

    let mut seen = HashSet::new();
    for option in &req.options {
        if option.trim().is_empty() {
            return Err(Error::InvalidParameters(
                "option labels must not be empty".to_string(),
            ));
        }
        if !seen.insert(option.as_str()) {
            return Err(Error::InvalidParameters(format!(
                "duplicate option label: {}",
                option
            )));
        }
    }

    if req.end_time <= req.start_time {
        return Err(Error::InvalidParameters(
            "end time must be after start time".to_string(),
        ));
    }

    if req.start_time.timestamp() < 0 || req.end_time.timestamp() < 0 {
        return Err(Error::InvalidParameters(
            "timestamps must not precede the epoch".to_string(),
        ));
    }

    Ok(())
}

/// Check that the caller may end the poll now
///
/// Only the creator may end, and only once the poll has started: ending a
/// `Pending` poll is disallowed and fails `NotActive`, as do the terminal
/// states.
pub fn check_end(poll: &Poll, caller: &VoterAddress, now: DateTime<Utc>) -> Result<()> {
    if caller != &poll.creator {
        return Err(Error::Unauthorized {
            poll_id: poll.id,
            caller: caller.clone(),
        });
    }

    let status = poll.status_at(now);
    if status != PollStatus::Active {
        return Err(Error::NotActive {
            poll_id: poll.id,
            status,
        });
    }

    Ok(())
}

/// Check that the caller may cancel the poll now
///
/// Only the creator may cancel, from `Pending` or `Active`. Terminal states
/// fail `AlreadyTerminal`.
pub fn check_cancel(poll: &Poll, caller: &VoterAddress, now: DateTime<Utc>) -> Result<()> {
    if caller != &poll.creator {
        return Err(Error::Unauthorized {
            poll_id: poll.id,
            caller: caller.clone(),
        });
    }

    let status = poll.status_at(now);
    if status.is_terminal() {
        return Err(Error::AlreadyTerminal {
            poll_id: poll.id,
            status,
        });
    }

    Ok(())
}

/// Check every ballot precondition
///
/// `has_voted` is the registry's answer for `(poll, voter)` at the moment of
/// application. All checks run before any state is mutated.
pub fn check_ballot(
    poll: &Poll,
    voter: &VoterAddress,
    choices: &[OptionIndex],
    has_voted: bool,
    now: DateTime<Utc>,
) -> Result<()> {
    let status = poll.status_at(now);
    if status != PollStatus::Active {
        return Err(Error::NotActive {
            poll_id: poll.id,
            status,
        });
    }

    if has_voted {
        return Err(Error::AlreadyVoted {
            poll_id: poll.id,
            voter: voter.clone(),
        });
    }

    if !poll.is_voter_allowed(voter) {
        return Err(Error::NotAuthorized {
            poll_id: poll.id,
            voter: voter.clone(),
        });
    }

    if choices.is_empty() {
        return Err(Error::InvalidChoice {
            poll_id: poll.id,
            reason: "ballot selects no options".to_string(),
        });
    }

    if poll.vote_type == VoteType::SingleChoice && choices.len() > 1 {
        return Err(Error::TooManyChoices {
            poll_id: poll.id,
            selected: choices.len(),
        });
    }

    let mut seen = HashSet::new();
    for &idx in choices {
        if idx as usize >= poll.options.len() {
            return Err(Error::InvalidChoice {
                poll_id: poll.id,
                reason: format!("option index {} out of range", idx),
            });
        }
        if !seen.insert(idx) {
            return Err(Error::InvalidChoice {
                poll_id: poll.id,
                reason: format!("duplicate option index {}", idx),
            });
        }
    }

    Ok(())
}

/// Check whether the expiry sweep should persist `Ended` for this poll
pub fn is_sweepable(poll: &Poll, now: DateTime<Utc>) -> bool {
    poll.stored_status == StoredStatus::Active && now > poll.end_time
}
