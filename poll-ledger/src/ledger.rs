//! Main ledger orchestration layer
//!
//! This module ties together storage, lifecycle logic, the single-writer
//! actor, and the injected clock into a high-level API: one method per
//! ledger operation.
//!
//! # Example
//!
//! ```no_run
//! use poll_ledger::{Config, Ledger};
//!
//! #[tokio::main]
//! async fn main() -> poll_ledger::Result<()> {
//!     let config = Config::default();
//!     let ledger = Ledger::open(config).await?;
//!
//!     // Create poll
//!     // let poll_id = ledger.create_poll(...).await?;
//!
//!     Ok(())
//! }
//! ```

use crate::{
    actor::{spawn_ledger_actor, LedgerHandle},
    clock::{Clock, SystemClock},
    metrics::Metrics,
    types::{
        Ballot, CreatePollRequest, Event, OptionIndex, PollId, PollSnapshot, VoterAddress,
    },
    Config, Result, Storage,
};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::broadcast;
use tokio_stream::wrappers::BroadcastStream;

/// Main ledger interface
pub struct Ledger {
    /// Actor handle for state-changing operations
    handle: LedgerHandle,

    /// Direct storage access (for reads)
    storage: Arc<Storage>,

    /// Time source; read once per operation, then threaded explicitly
    clock: Arc<dyn Clock>,

    /// Event broadcast (sender side; subscribers attach via `subscribe`)
    events: broadcast::Sender<Event>,

    /// Metrics collector
    metrics: Metrics,
}

impl Ledger {
    /// Open ledger with configuration and the system clock
    pub async fn open(config: Config) -> Result<Self> {
        Self::open_with_clock(config, Arc::new(SystemClock)).await
    }

    /// Open ledger with an explicit time source (used by tests)
    pub async fn open_with_clock(config: Config, clock: Arc<dyn Clock>) -> Result<Self> {
        // Open storage
        let storage = Arc::new(Storage::open(&config)?);

        // Event broadcast channel
        let (events, _) = broadcast::channel(config.events.channel_capacity);

        // Spawn single-writer actor
        let handle = spawn_ledger_actor(storage.clone(), events.clone());

        let metrics = Metrics::new().map_err(|e| crate::Error::Config(e.to_string()))?;

        Ok(Self {
            handle,
            storage,
            clock,
            events,
            metrics,
        })
    }

    // State-changing operations

    /// Create a new poll, returning its sequential ID
    pub async fn create_poll(&self, request: CreatePollRequest) -> Result<PollId> {
        let now = self.clock.now();
        let poll_id = self.handle.create_poll(request, now).await?;
        self.metrics.record_poll_created();
        Ok(poll_id)
    }

    /// Cast a ballot for `(poll, voter)`
    ///
    /// At most one ballot per voter per poll ever succeeds; repeats fail
    /// `AlreadyVoted`. The ballot and its tally increment commit atomically.
    pub async fn cast_ballot(
        &self,
        poll_id: PollId,
        voter: VoterAddress,
        choices: Vec<OptionIndex>,
    ) -> Result<()> {
        let now = self.clock.now();
        let start = Instant::now();

        let result = self.handle.cast_ballot(poll_id, voter, choices, now).await;

        self.metrics.record_cast_duration(start.elapsed().as_secs_f64());
        match &result {
            Ok(()) => self.metrics.record_ballot_cast(),
            Err(e) => self.metrics.record_ballot_rejected(e.kind()),
        }

        result
    }

    /// End an active poll (creator only)
    pub async fn end_poll(&self, poll_id: PollId, caller: VoterAddress) -> Result<()> {
        let now = self.clock.now();
        self.handle.end_poll(poll_id, caller, now).await
    }

    /// Cancel a pending or active poll (creator only)
    pub async fn cancel_poll(&self, poll_id: PollId, caller: VoterAddress) -> Result<()> {
        let now = self.clock.now();
        self.handle.cancel_poll(poll_id, caller, now).await
    }

    /// Persist `Ended` for every poll past its end time; returns the count
    ///
    /// Permissionless and idempotent: a second sweep with nothing expired
    /// is a no-op returning 0.
    pub async fn sweep_expired(&self) -> Result<u64> {
        let now = self.clock.now();
        let swept = self.handle.sweep_expired(now).await?;
        self.metrics.record_swept(swept);
        Ok(swept)
    }

    // Read queries (pure over committed state + current time)

    /// Get poll snapshot with effective status resolved at the current time
    pub fn get_poll(&self, poll_id: PollId) -> Result<PollSnapshot> {
        let poll = self.storage.get_poll(poll_id)?;
        let tally = self.storage.get_tally(poll_id)?;
        let status = poll.status_at(self.clock.now());

        Ok(PollSnapshot {
            poll,
            status,
            total_voters: tally.total_voters,
        })
    }

    /// Per-option counters, aligned to the poll's options
    ///
    /// Defined for polls in any status; all zeros while pending.
    pub fn get_results(&self, poll_id: PollId) -> Result<Vec<u64>> {
        // Existence check keeps NotFound distinct from an empty tally
        self.storage.get_poll(poll_id)?;
        Ok(self.storage.get_tally(poll_id)?.counts)
    }

    /// All poll IDs in creation order
    pub fn all_poll_ids(&self) -> Result<Vec<PollId>> {
        self.storage.all_poll_ids()
    }

    /// Poll IDs created by the address
    pub fn polls_by_creator(&self, address: &VoterAddress) -> Result<Vec<PollId>> {
        self.storage.polls_by_creator(address)
    }

    /// Poll IDs the address has voted in
    pub fn polls_by_participant(&self, address: &VoterAddress) -> Result<Vec<PollId>> {
        self.storage.polls_by_participant(address)
    }

    /// Whether the address has a recorded ballot for the poll
    pub fn has_voted(&self, poll_id: PollId, voter: &VoterAddress) -> Result<bool> {
        self.storage.has_ballot(poll_id, voter)
    }

    /// The recorded ballot for `(poll, voter)`
    pub fn choices_of(&self, poll_id: PollId, voter: &VoterAddress) -> Result<Ballot> {
        self.storage.get_ballot(poll_id, voter)
    }

    // Events & observability

    /// Subscribe to lifecycle events emitted after each committed mutation
    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.events.subscribe()
    }

    /// Event subscription as an async stream
    pub fn event_stream(&self) -> BroadcastStream<Event> {
        BroadcastStream::new(self.events.subscribe())
    }

    /// Metrics collector
    pub fn metrics(&self) -> &Metrics {
        &self.metrics
    }

    /// Shutdown the writer; storage closes when the last reference drops
    ///
    /// Subsequent state-changing calls fail with a concurrency error; read
    /// queries keep working against the committed state.
    pub async fn shutdown(&self) -> Result<()> {
        self.handle.shutdown().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::types::{PollStatus, StoredStatus, VoteType};
    use crate::Error;
    use chrono::{DateTime, Duration, TimeZone, Utc};
    use std::collections::BTreeSet;

    fn t(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(secs, 0).unwrap()
    }

    async fn create_test_ledger(now: DateTime<Utc>) -> (Ledger, Arc<ManualClock>, tempfile::TempDir) {
        let temp_dir = tempfile::tempdir().unwrap();
        let mut config = Config::default();
        config.data_dir = temp_dir.path().to_path_buf();

        let clock = Arc::new(ManualClock::new(now));
        let ledger = Ledger::open_with_clock(config, clock.clone()).await.unwrap();
        (ledger, clock, temp_dir)
    }

    fn test_request(start: DateTime<Utc>, end: DateTime<Utc>) -> CreatePollRequest {
        CreatePollRequest {
            title: "Favorite color".to_string(),
            description: "pick one".to_string(),
            options: vec!["A".to_string(), "B".to_string()],
            vote_type: VoteType::SingleChoice,
            creator: VoterAddress::new("0xcreator"),
            start_time: start,
            end_time: end,
            is_private: false,
            allowed_voters: BTreeSet::new(),
        }
    }

    #[tokio::test]
    async fn test_basic_vote_scenario() {
        let now = t(1_000);
        let (ledger, _clock, _temp) = create_test_ledger(now).await;

        let poll_id = ledger
            .create_poll(test_request(now, now + Duration::seconds(3600)))
            .await
            .unwrap();

        let x = VoterAddress::new("0xX");
        ledger.cast_ballot(poll_id, x.clone(), vec![1]).await.unwrap();

        assert_eq!(ledger.get_results(poll_id).unwrap(), vec![0, 1]);
        assert!(ledger.has_voted(poll_id, &x).unwrap());

        // Same voter again
        let again = ledger.cast_ballot(poll_id, x, vec![1]).await;
        assert!(matches!(again, Err(Error::AlreadyVoted { .. })));

        // Two choices on a single-choice poll
        let y = VoterAddress::new("0xY");
        let too_many = ledger.cast_ballot(poll_id, y, vec![0, 1]).await;
        assert!(matches!(too_many, Err(Error::TooManyChoices { .. })));

        ledger.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_pending_poll_rejects_ballots() {
        let now = t(1_000);
        let (ledger, _clock, _temp) = create_test_ledger(now).await;

        let poll_id = ledger
            .create_poll(test_request(
                now + Duration::seconds(10_000),
                now + Duration::seconds(20_000),
            ))
            .await
            .unwrap();

        let snapshot = ledger.get_poll(poll_id).unwrap();
        assert_eq!(snapshot.status, PollStatus::Pending);

        let result = ledger
            .cast_ballot(poll_id, VoterAddress::new("0xX"), vec![0])
            .await;
        assert!(matches!(
            result,
            Err(Error::NotActive {
                status: PollStatus::Pending,
                ..
            })
        ));

        ledger.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_cancel_scenario() {
        let now = t(1_000);
        let (ledger, _clock, _temp) = create_test_ledger(now).await;

        let poll_id = ledger
            .create_poll(test_request(now, now + Duration::seconds(3600)))
            .await
            .unwrap();

        let creator = VoterAddress::new("0xcreator");
        ledger.cancel_poll(poll_id, creator.clone()).await.unwrap();

        assert_eq!(ledger.get_poll(poll_id).unwrap().status, PollStatus::Cancelled);

        let vote = ledger
            .cast_ballot(poll_id, VoterAddress::new("0xX"), vec![0])
            .await;
        assert!(matches!(vote, Err(Error::NotActive { .. })));

        let again = ledger.cancel_poll(poll_id, creator).await;
        assert!(matches!(again, Err(Error::AlreadyTerminal { .. })));

        ledger.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_expiry_and_sweep() {
        let now = t(1_000);
        let (ledger, clock, _temp) = create_test_ledger(now).await;

        let poll_id = ledger
            .create_poll(test_request(now, now + Duration::seconds(3600)))
            .await
            .unwrap();

        // Window passes with no explicit end
        clock.advance(Duration::seconds(7200));

        let snapshot = ledger.get_poll(poll_id).unwrap();
        assert_eq!(snapshot.status, PollStatus::Ended);
        assert_eq!(snapshot.poll.stored_status, StoredStatus::Active);

        assert_eq!(ledger.sweep_expired().await.unwrap(), 1);
        let snapshot = ledger.get_poll(poll_id).unwrap();
        assert_eq!(snapshot.poll.stored_status, StoredStatus::Ended);

        // No-op on second call
        assert_eq!(ledger.sweep_expired().await.unwrap(), 0);

        ledger.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_end_poll_authorization() {
        let now = t(1_000);
        let (ledger, _clock, _temp) = create_test_ledger(now).await;

        let poll_id = ledger
            .create_poll(test_request(now, now + Duration::seconds(3600)))
            .await
            .unwrap();

        let stranger = ledger.end_poll(poll_id, VoterAddress::new("0xother")).await;
        assert!(matches!(stranger, Err(Error::Unauthorized { .. })));

        ledger
            .end_poll(poll_id, VoterAddress::new("0xcreator"))
            .await
            .unwrap();
        assert_eq!(ledger.get_poll(poll_id).unwrap().status, PollStatus::Ended);

        ledger.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_private_poll_allow_list() {
        let now = t(1_000);
        let (ledger, _clock, _temp) = create_test_ledger(now).await;

        let mut request = test_request(now, now + Duration::seconds(3600));
        request.is_private = true;
        request.allowed_voters.insert(VoterAddress::new("0xmember"));

        let poll_id = ledger.create_poll(request).await.unwrap();

        ledger
            .cast_ballot(poll_id, VoterAddress::new("0xmember"), vec![0])
            .await
            .unwrap();

        let outsider = ledger
            .cast_ballot(poll_id, VoterAddress::new("0xoutsider"), vec![0])
            .await;
        assert!(matches!(outsider, Err(Error::NotAuthorized { .. })));

        ledger.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_indices_and_history() {
        let now = t(1_000);
        let (ledger, _clock, _temp) = create_test_ledger(now).await;

        let first = ledger
            .create_poll(test_request(now, now + Duration::seconds(3600)))
            .await
            .unwrap();
        let second = ledger
            .create_poll(test_request(now, now + Duration::seconds(3600)))
            .await
            .unwrap();

        assert_eq!(ledger.all_poll_ids().unwrap(), vec![first, second]);
        assert_eq!(
            ledger
                .polls_by_creator(&VoterAddress::new("0xcreator"))
                .unwrap(),
            vec![first, second]
        );

        let voter = VoterAddress::new("0xX");
        ledger.cast_ballot(second, voter.clone(), vec![1]).await.unwrap();

        assert_eq!(ledger.polls_by_participant(&voter).unwrap(), vec![second]);
        assert_eq!(ledger.choices_of(second, &voter).unwrap().choices, vec![1]);
        assert!(matches!(
            ledger.choices_of(first, &voter),
            Err(Error::BallotNotFound { .. })
        ));

        ledger.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_event_emission() {
        let now = t(1_000);
        let (ledger, _clock, _temp) = create_test_ledger(now).await;
        let mut events = ledger.subscribe();

        let poll_id = ledger
            .create_poll(test_request(now, now + Duration::seconds(3600)))
            .await
            .unwrap();
        ledger
            .cast_ballot(poll_id, VoterAddress::new("0xX"), vec![0])
            .await
            .unwrap();
        ledger
            .end_poll(poll_id, VoterAddress::new("0xcreator"))
            .await
            .unwrap();

        assert!(matches!(
            events.recv().await.unwrap(),
            Event::PollCreated { poll_id: 0, .. }
        ));
        assert!(matches!(
            events.recv().await.unwrap(),
            Event::BallotCast { poll_id: 0, .. }
        ));
        assert!(matches!(
            events.recv().await.unwrap(),
            Event::PollEnded { poll_id: 0 }
        ));

        ledger.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_invalid_parameters() {
        let now = t(1_000);
        let (ledger, _clock, _temp) = create_test_ledger(now).await;

        let mut request = test_request(now, now + Duration::seconds(3600));
        request.title = String::new();

        let result = ledger.create_poll(request).await;
        assert!(matches!(result, Err(Error::InvalidParameters(_))));
        assert!(ledger.all_poll_ids().unwrap().is_empty());

        ledger.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_shutdown_stops_writes_keeps_reads() {
        let now = t(1_000);
        let (ledger, _clock, _temp) = create_test_ledger(now).await;

        let poll_id = ledger
            .create_poll(test_request(now, now + Duration::seconds(3600)))
            .await
            .unwrap();

        ledger.shutdown().await.unwrap();

        let write = ledger
            .cast_ballot(poll_id, VoterAddress::new("0xX"), vec![0])
            .await;
        assert!(matches!(write, Err(Error::Concurrency(_))));

        // Committed state stays readable
        assert_eq!(ledger.get_results(poll_id).unwrap(), vec![0, 0]);
    }

    #[tokio::test]
    async fn test_get_poll_not_found() {
        let now = t(1_000);
        let (ledger, _clock, _temp) = create_test_ledger(now).await;

        assert!(matches!(ledger.get_poll(7), Err(Error::PollNotFound(7))));
        assert!(matches!(ledger.get_results(7), Err(Error::PollNotFound(7))));

        ledger.shutdown().await.unwrap();
    }
}
