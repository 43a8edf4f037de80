//! Storage layer using RocksDB
//!
//! # Column Families
//!
//! - `polls` - Dense poll table (key: poll id, big-endian u64)
//! - `ballots` - Sparse per-poll ballot map (key: poll id || voter address)
//! - `tallies` - Per-poll counters (key: poll id)
//! - `indices` - Secondary indices for creator/participant lookups
//!
//! Polls are only ever appended or have their stored-status flag flipped;
//! ballots are append-only. A ballot and its tally increment commit in one
//! `WriteBatch`: both or neither.

use crate::{
    error::{Error, Result},
    types::{Ballot, Poll, PollId, Tally, VoterAddress},
    Config,
};
use rocksdb::{ColumnFamily, ColumnFamilyDescriptor, DBCompactionStyle, IteratorMode, Options, WriteBatch, DB};
use std::sync::Arc;

/// Column family names
const CF_POLLS: &str = "polls";
const CF_BALLOTS: &str = "ballots";
const CF_TALLIES: &str = "tallies";
const CF_INDICES: &str = "indices";

/// Index key tags
const IDX_CREATOR: u8 = b'c';
const IDX_PARTICIPANT: u8 = b'p';

/// Storage wrapper for RocksDB
pub struct Storage {
    db: Arc<DB>,
    // Column family handles are stored in DB, accessed by name
}

impl Storage {
    /// Open or create database
    pub fn open(config: &Config) -> Result<Self> {
        let path = &config.data_dir;

        // Create directory if not exists
        std::fs::create_dir_all(path)?;

        // Database options
        let mut db_opts = Options::default();
        db_opts.create_if_missing(true);
        db_opts.create_missing_column_families(true);

        // Tuning from config
        db_opts.set_write_buffer_size(config.rocksdb.write_buffer_size_mb * 1024 * 1024);
        db_opts.set_max_write_buffer_number(config.rocksdb.max_write_buffer_number);
        db_opts.set_target_file_size_base(config.rocksdb.target_file_size_mb * 1024 * 1024);
        db_opts.set_max_background_jobs(config.rocksdb.max_background_jobs);

        // Universal compaction for append-mostly workload
        db_opts.set_compaction_style(DBCompactionStyle::Universal);

        // Column family descriptors
        let cf_descriptors = vec![
            ColumnFamilyDescriptor::new(CF_POLLS, Self::cf_options_polls()),
            ColumnFamilyDescriptor::new(CF_BALLOTS, Self::cf_options_ballots()),
            ColumnFamilyDescriptor::new(CF_TALLIES, Self::cf_options_tallies()),
            ColumnFamilyDescriptor::new(CF_INDICES, Self::cf_options_indices()),
        ];

        // Open database
        let db = DB::open_cf_descriptors(&db_opts, path, cf_descriptors)?;

        tracing::info!("Opened RocksDB at {:?}", path);

        Ok(Self { db: Arc::new(db) })
    }

    // Column family options

    fn cf_options_polls() -> Options {
        let mut opts = Options::default();
        opts.set_compression_type(rocksdb::DBCompressionType::Zstd);
        opts
    }

    fn cf_options_ballots() -> Options {
        let mut opts = Options::default();
        opts.set_compression_type(rocksdb::DBCompressionType::Zstd);
        // Point lookups dominate; bloom filters pay for themselves
        let mut block_opts = rocksdb::BlockBasedOptions::default();
        block_opts.set_bloom_filter(10.0, false); // 10 bits per key
        opts.set_block_based_table_factory(&block_opts);
        opts
    }

    fn cf_options_tallies() -> Options {
        let mut opts = Options::default();
        // Tallies are frequently read and rewritten, use LZ4 for speed
        opts.set_compression_type(rocksdb::DBCompressionType::Lz4);
        opts
    }

    fn cf_options_indices() -> Options {
        let mut opts = Options::default();
        opts.set_compression_type(rocksdb::DBCompressionType::Lz4);
        opts
    }

    // Helper: get column family handle

    fn cf_handle(&self, name: &str) -> Result<&ColumnFamily> {
        self.db
            .cf_handle(name)
            .ok_or_else(|| Error::Storage(format!("Column family {} not found", name)))
    }

    // Poll operations

    /// Number of polls stored; also the next poll ID to assign
    ///
    /// Poll IDs are dense and big-endian encoded, so the last key in the
    /// polls column family is the highest assigned ID.
    pub fn poll_count(&self) -> Result<u64> {
        let cf = self.cf_handle(CF_POLLS)?;

        let mut iter = self.db.iterator_cf(cf, IteratorMode::End);
        if let Some(item) = iter.next() {
            let (key, _) = item?;
            let id = decode_poll_id(&key)?;
            return Ok(id + 1);
        }

        Ok(0)
    }

    /// Put poll record (creation or stored-status flip)
    pub fn put_poll(&self, poll: &Poll) -> Result<()> {
        let cf = self.cf_handle(CF_POLLS)?;
        let value = bincode::serialize(poll)?;

        self.db.put_cf(cf, poll.id.to_be_bytes(), &value)?;

        Ok(())
    }

    /// Get poll by ID
    pub fn get_poll(&self, poll_id: PollId) -> Result<Poll> {
        let cf = self.cf_handle(CF_POLLS)?;

        let value = self
            .db
            .get_cf(cf, poll_id.to_be_bytes())?
            .ok_or(Error::PollNotFound(poll_id))?;

        let poll: Poll = bincode::deserialize(&value)?;
        Ok(poll)
    }

    /// All poll IDs in creation order
    pub fn all_poll_ids(&self) -> Result<Vec<PollId>> {
        let cf = self.cf_handle(CF_POLLS)?;

        let mut ids = Vec::new();
        for item in self.db.iterator_cf(cf, IteratorMode::Start) {
            let (key, _) = item?;
            ids.push(decode_poll_id(&key)?);
        }

        Ok(ids)
    }

    /// All polls whose stored status is still `Active` (sweep candidates)
    pub fn active_polls(&self) -> Result<Vec<Poll>> {
        let cf = self.cf_handle(CF_POLLS)?;

        let mut polls = Vec::new();
        for item in self.db.iterator_cf(cf, IteratorMode::Start) {
            let (_, value) = item?;
            let poll: Poll = bincode::deserialize(&value)?;
            if poll.stored_status == crate::types::StoredStatus::Active {
                polls.push(poll);
            }
        }

        Ok(polls)
    }

    /// Create poll with empty tally and creator index (atomic)
    pub fn create_poll_atomic(&self, poll: &Poll) -> Result<()> {
        let mut batch = WriteBatch::default();

        // 1. Poll record
        let cf_polls = self.cf_handle(CF_POLLS)?;
        batch.put_cf(cf_polls, poll.id.to_be_bytes(), bincode::serialize(poll)?);

        // 2. Empty tally
        let cf_tallies = self.cf_handle(CF_TALLIES)?;
        let tally = Tally::new(poll.options.len());
        batch.put_cf(cf_tallies, poll.id.to_be_bytes(), bincode::serialize(&tally)?);

        // 3. Creator index
        let cf_indices = self.cf_handle(CF_INDICES)?;
        batch.put_cf(cf_indices, index_key(IDX_CREATOR, &poll.creator, poll.id), []);

        // Atomic commit
        self.db.write(batch)?;

        tracing::debug!(poll_id = poll.id, creator = %poll.creator, "Poll stored");

        Ok(())
    }

    // Ballot operations

    /// Check whether a ballot exists for `(poll, voter)`
    pub fn has_ballot(&self, poll_id: PollId, voter: &VoterAddress) -> Result<bool> {
        let cf = self.cf_handle(CF_BALLOTS)?;
        Ok(self.db.get_cf(cf, ballot_key(poll_id, voter))?.is_some())
    }

    /// Get ballot for `(poll, voter)`
    pub fn get_ballot(&self, poll_id: PollId, voter: &VoterAddress) -> Result<Ballot> {
        let cf = self.cf_handle(CF_BALLOTS)?;

        let value = self
            .db
            .get_cf(cf, ballot_key(poll_id, voter))?
            .ok_or_else(|| Error::BallotNotFound {
                poll_id,
                voter: voter.clone(),
            })?;

        let ballot: Ballot = bincode::deserialize(&value)?;
        Ok(ballot)
    }

    /// Record ballot with tally update and participant index (atomic)
    pub fn record_ballot_atomic(&self, ballot: &Ballot, tally: &Tally) -> Result<()> {
        let mut batch = WriteBatch::default();

        // 1. Ballot
        let cf_ballots = self.cf_handle(CF_BALLOTS)?;
        batch.put_cf(
            cf_ballots,
            ballot_key(ballot.poll_id, &ballot.voter),
            bincode::serialize(ballot)?,
        );

        // 2. Updated tally
        let cf_tallies = self.cf_handle(CF_TALLIES)?;
        batch.put_cf(cf_tallies, ballot.poll_id.to_be_bytes(), bincode::serialize(tally)?);

        // 3. Participant index
        let cf_indices = self.cf_handle(CF_INDICES)?;
        batch.put_cf(
            cf_indices,
            index_key(IDX_PARTICIPANT, &ballot.voter, ballot.poll_id),
            [],
        );

        // Atomic commit
        self.db.write(batch)?;

        tracing::debug!(
            poll_id = ballot.poll_id,
            voter = %ballot.voter,
            "Ballot recorded"
        );

        Ok(())
    }

    // Tally operations

    /// Get tally for a poll
    pub fn get_tally(&self, poll_id: PollId) -> Result<Tally> {
        let cf = self.cf_handle(CF_TALLIES)?;

        let value = self
            .db
            .get_cf(cf, poll_id.to_be_bytes())?
            .ok_or(Error::PollNotFound(poll_id))?;

        let tally: Tally = bincode::deserialize(&value)?;
        Ok(tally)
    }

    // Index scans

    /// Poll IDs created by the address, in creation order
    pub fn polls_by_creator(&self, address: &VoterAddress) -> Result<Vec<PollId>> {
        self.scan_index(IDX_CREATOR, address)
    }

    /// Poll IDs the address has voted in, in creation order
    pub fn polls_by_participant(&self, address: &VoterAddress) -> Result<Vec<PollId>> {
        self.scan_index(IDX_PARTICIPANT, address)
    }

    fn scan_index(&self, tag: u8, address: &VoterAddress) -> Result<Vec<PollId>> {
        let cf = self.cf_handle(CF_INDICES)?;

        let prefix = index_prefix(tag, address);
        let iter = self.db.prefix_iterator_cf(cf, &prefix);

        let mut ids = Vec::new();
        for item in iter {
            let (key, _) = item?;
            if !key.starts_with(&prefix) {
                break;
            }
            // Poll ID is the fixed-width remainder after the prefix
            if key.len() == prefix.len() + 8 {
                ids.push(decode_poll_id(&key[prefix.len()..])?);
            }
        }

        Ok(ids)
    }
}

// Key helpers

fn ballot_key(poll_id: PollId, voter: &VoterAddress) -> Vec<u8> {
    let mut key = poll_id.to_be_bytes().to_vec();
    key.extend_from_slice(voter.as_str().as_bytes());
    key
}

fn index_prefix(tag: u8, address: &VoterAddress) -> Vec<u8> {
    // Length-prefixed address keeps the key self-delimiting: addresses are
    // caller-supplied, so one must never scan as a prefix of another
    let addr = address.as_str().as_bytes();
    let mut key = Vec::with_capacity(1 + 4 + addr.len());
    key.push(tag);
    key.extend_from_slice(&(addr.len() as u32).to_be_bytes());
    key.extend_from_slice(addr);
    key
}

fn index_key(tag: u8, address: &VoterAddress, poll_id: PollId) -> Vec<u8> {
    let mut key = index_prefix(tag, address);
    key.extend_from_slice(&poll_id.to_be_bytes());
    key
}

fn decode_poll_id(bytes: &[u8]) -> Result<PollId> {
    let arr: [u8; 8] = bytes
        .get(..8)
        .and_then(|b| b.try_into().ok())
        .ok_or_else(|| Error::Storage("malformed poll id key".to_string()))?;
    Ok(u64::from_be_bytes(arr))
}
