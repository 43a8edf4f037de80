//! Actor-based concurrency for the ledger
//!
//! This module implements the single-writer pattern using Tokio actors:
//! - One logical writer task totally orders all state-changing operations
//! - Each operation re-validates status and authorization at the moment of
//!   application, against the clock reading captured by the caller
//! - Each operation either fully commits (one atomic batch) or has no effect
//! - Async message passing with backpressure (bounded mailbox)
//!
//! Reads bypass the actor and go straight to storage: readers only ever
//! observe fully committed batches.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────┐
//! │                Callers (API layer)                    │
//! └─────────────────────┬────────────────────────────────┘
//!                       │
//!                       │ LedgerHandle (Clone)
//!                       ▼
//! ┌──────────────────────────────────────────────────────┐
//! │              LedgerActor (Single Task)                │
//! │   validate -> WriteBatch commit -> broadcast Event    │
//! └─────────────────────┬────────────────────────────────┘
//!                       │
//!                       ▼
//!              Storage (RocksDB, atomic)
//! ```

use crate::{
    lifecycle,
    types::{Ballot, CreatePollRequest, Event, OptionIndex, Poll, PollId, StoredStatus, VoterAddress},
    Error, Result, Storage,
};
use chrono::{DateTime, Utc};
use std::sync::Arc;
use tokio::sync::{broadcast, mpsc, oneshot};

/// Message sent to the ledger actor
///
/// Every state-changing message carries the clock reading captured when the
/// caller submitted it, so the actor itself stays free of ambient time.
pub enum LedgerMessage {
    /// Create a new poll
    CreatePoll {
        request: CreatePollRequest,
        now: DateTime<Utc>,
        response: oneshot::Sender<Result<PollId>>,
    },

    /// Cast a ballot
    CastBallot {
        poll_id: PollId,
        voter: VoterAddress,
        choices: Vec<OptionIndex>,
        now: DateTime<Utc>,
        response: oneshot::Sender<Result<()>>,
    },

    /// End a poll (creator only)
    EndPoll {
        poll_id: PollId,
        caller: VoterAddress,
        now: DateTime<Utc>,
        response: oneshot::Sender<Result<()>>,
    },

    /// Cancel a poll (creator only)
    CancelPoll {
        poll_id: PollId,
        caller: VoterAddress,
        now: DateTime<Utc>,
        response: oneshot::Sender<Result<()>>,
    },

    /// Persist `Ended` for every poll past its end time (permissionless)
    SweepExpired {
        now: DateTime<Utc>,
        response: oneshot::Sender<Result<u64>>,
    },

    /// Shutdown actor
    Shutdown,
}

/// Actor that applies ledger mutations sequentially
pub struct LedgerActor {
    /// Storage backend
    storage: Arc<Storage>,

    /// Mailbox for incoming messages
    mailbox: mpsc::Receiver<LedgerMessage>,

    /// Event broadcast, fired after each committed mutation
    events: broadcast::Sender<Event>,
}

impl LedgerActor {
    /// Create new actor
    pub fn new(
        storage: Arc<Storage>,
        mailbox: mpsc::Receiver<LedgerMessage>,
        events: broadcast::Sender<Event>,
    ) -> Self {
        Self {
            storage,
            mailbox,
            events,
        }
    }

    /// Run the actor event loop
    pub async fn run(mut self) {
        while let Some(msg) = self.mailbox.recv().await {
            match msg {
                LedgerMessage::Shutdown => break,
                _ => self.handle_message(msg),
            }
        }
    }

    /// Handle a single message
    fn handle_message(&mut self, msg: LedgerMessage) {
        match msg {
            LedgerMessage::CreatePoll {
                request,
                now,
                response,
            } => {
                let _ = response.send(self.handle_create(request, now));
            }

            LedgerMessage::CastBallot {
                poll_id,
                voter,
                choices,
                now,
                response,
            } => {
                let _ = response.send(self.handle_cast(poll_id, voter, choices, now));
            }

            LedgerMessage::EndPoll {
                poll_id,
                caller,
                now,
                response,
            } => {
                let _ = response.send(self.handle_end(poll_id, caller, now));
            }

            LedgerMessage::CancelPoll {
                poll_id,
                caller,
                now,
                response,
            } => {
                let _ = response.send(self.handle_cancel(poll_id, caller, now));
            }

            LedgerMessage::SweepExpired { now, response } => {
                let _ = response.send(self.handle_sweep(now));
            }

            LedgerMessage::Shutdown => {
                // Handled in main loop
            }
        }
    }

    fn handle_create(&self, request: CreatePollRequest, now: DateTime<Utc>) -> Result<PollId> {
        lifecycle::validate_create(&request)?;

        let poll_id = self.storage.poll_count()?;
        let poll = Poll {
            id: poll_id,
            title: request.title,
            description: request.description,
            options: request.options,
            vote_type: request.vote_type,
            creator: request.creator,
            start_time: request.start_time,
            end_time: request.end_time,
            stored_status: StoredStatus::Active,
            is_private: request.is_private,
            allowed_voters: request.allowed_voters,
            created_at: now,
        };

        self.storage.create_poll_atomic(&poll)?;

        tracing::info!(poll_id, creator = %poll.creator, "Poll created");
        self.emit(Event::PollCreated {
            poll_id,
            creator: poll.creator.clone(),
        });

        Ok(poll_id)
    }

    fn handle_cast(
        &self,
        poll_id: PollId,
        voter: VoterAddress,
        choices: Vec<OptionIndex>,
        now: DateTime<Utc>,
    ) -> Result<()> {
        let poll = self.storage.get_poll(poll_id)?;
        let has_voted = self.storage.has_ballot(poll_id, &voter)?;

        lifecycle::check_ballot(&poll, &voter, &choices, has_voted, now)?;

        let ballot = Ballot {
            poll_id,
            voter: voter.clone(),
            choices: choices.clone(),
            cast_at: now,
        };

        let mut tally = self.storage.get_tally(poll_id)?;
        tally.apply(&ballot.choices);

        // Ballot and tally commit together or not at all
        self.storage.record_ballot_atomic(&ballot, &tally)?;

        tracing::debug!(poll_id, voter = %voter, "Ballot cast");
        self.emit(Event::BallotCast {
            poll_id,
            voter,
            choices,
        });

        Ok(())
    }

    fn handle_end(&self, poll_id: PollId, caller: VoterAddress, now: DateTime<Utc>) -> Result<()> {
        let mut poll = self.storage.get_poll(poll_id)?;

        lifecycle::check_end(&poll, &caller, now)?;

        poll.stored_status = StoredStatus::Ended;
        self.storage.put_poll(&poll)?;

        tracing::info!(poll_id, "Poll ended");
        self.emit(Event::PollEnded { poll_id });

        Ok(())
    }

    fn handle_cancel(
        &self,
        poll_id: PollId,
        caller: VoterAddress,
        now: DateTime<Utc>,
    ) -> Result<()> {
        let mut poll = self.storage.get_poll(poll_id)?;

        lifecycle::check_cancel(&poll, &caller, now)?;

        poll.stored_status = StoredStatus::Cancelled;
        self.storage.put_poll(&poll)?;

        tracing::info!(poll_id, "Poll cancelled");
        self.emit(Event::PollCancelled { poll_id });

        Ok(())
    }

    fn handle_sweep(&self, now: DateTime<Utc>) -> Result<u64> {
        let mut swept = 0u64;

        for mut poll in self.storage.active_polls()? {
            if lifecycle::is_sweepable(&poll, now) {
                poll.stored_status = StoredStatus::Ended;
                self.storage.put_poll(&poll)?;
                self.emit(Event::PollEnded { poll_id: poll.id });
                swept += 1;
            }
        }

        if swept > 0 {
            tracing::info!(swept, "Expired polls swept");
        }

        Ok(swept)
    }

    fn emit(&self, event: Event) {
        // Send fails only when no subscriber is listening
        let _ = self.events.send(event);
    }
}

/// Handle for sending messages to the actor
#[derive(Clone)]
pub struct LedgerHandle {
    sender: mpsc::Sender<LedgerMessage>,
}

impl LedgerHandle {
    /// Create new handle
    pub fn new(sender: mpsc::Sender<LedgerMessage>) -> Self {
        Self { sender }
    }

    /// Create a poll
    pub async fn create_poll(
        &self,
        request: CreatePollRequest,
        now: DateTime<Utc>,
    ) -> Result<PollId> {
        let (tx, rx) = oneshot::channel();
        self.sender
            .send(LedgerMessage::CreatePoll {
                request,
                now,
                response: tx,
            })
            .await
            .map_err(|_| Error::Concurrency("Actor mailbox closed".to_string()))?;

        rx.await
            .map_err(|_| Error::Concurrency("Response channel closed".to_string()))?
    }

    /// Cast a ballot
    pub async fn cast_ballot(
        &self,
        poll_id: PollId,
        voter: VoterAddress,
        choices: Vec<OptionIndex>,
        now: DateTime<Utc>,
    ) -> Result<()> {
        let (tx, rx) = oneshot::channel();
        self.sender
            .send(LedgerMessage::CastBallot {
                poll_id,
                voter,
                choices,
                now,
                response: tx,
            })
            .await
            .map_err(|_| Error::Concurrency("Actor mailbox closed".to_string()))?;

        rx.await
            .map_err(|_| Error::Concurrency("Response channel closed".to_string()))?
    }

    /// End a poll
    pub async fn end_poll(
        &self,
        poll_id: PollId,
        caller: VoterAddress,
        now: DateTime<Utc>,
    ) -> Result<()> {
        let (tx, rx) = oneshot::channel();
        self.sender
            .send(LedgerMessage::EndPoll {
                poll_id,
                caller,
                now,
                response: tx,
            })
            .await
            .map_err(|_| Error::Concurrency("Actor mailbox closed".to_string()))?;

        rx.await
            .map_err(|_| Error::Concurrency("Response channel closed".to_string()))?
    }

    /// Cancel a poll
    pub async fn cancel_poll(
        &self,
        poll_id: PollId,
        caller: VoterAddress,
        now: DateTime<Utc>,
    ) -> Result<()> {
        let (tx, rx) = oneshot::channel();
        self.sender
            .send(LedgerMessage::CancelPoll {
                poll_id,
                caller,
                now,
                response: tx,
            })
            .await
            .map_err(|_| Error::Concurrency("Actor mailbox closed".to_string()))?;

        rx.await
            .map_err(|_| Error::Concurrency("Response channel closed".to_string()))?
    }

    /// Sweep expired polls
    pub async fn sweep_expired(&self, now: DateTime<Utc>) -> Result<u64> {
        let (tx, rx) = oneshot::channel();
        self.sender
            .send(LedgerMessage::SweepExpired { now, response: tx })
            .await
            .map_err(|_| Error::Concurrency("Actor mailbox closed".to_string()))?;

        rx.await
            .map_err(|_| Error::Concurrency("Response channel closed".to_string()))?
    }

    /// Shutdown actor
    pub async fn shutdown(&self) -> Result<()> {
        self.sender
            .send(LedgerMessage::Shutdown)
            .await
            .map_err(|_| Error::Concurrency("Actor mailbox closed".to_string()))?;
        Ok(())
    }
}

/// Spawn the ledger actor
pub fn spawn_ledger_actor(
    storage: Arc<Storage>,
    events: broadcast::Sender<Event>,
) -> LedgerHandle {
    let (tx, rx) = mpsc::channel(1000); // Bounded channel for backpressure
    let actor = LedgerActor::new(storage, rx, events);

    tokio::spawn(async move {
        actor.run().await;
    });

    LedgerHandle::new(tx)
}
