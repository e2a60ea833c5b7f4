//! Persistent storage for voting codes, candidates, votes and admins.
//!
//! [`VoteStore`] is the only shared mutable resource in the server. Every
//! mutation of a voting code goes through [`VoteStore::set_voter_name`] or
//! [`VoteStore::record_vote`]; the latter is the single atomic unit that
//! consumes a code.

use std::collections::HashMap;

use crate::error::Result;
use crate::model::{
    db::{
        admin::{Admin, NewAdmin},
        candidate::{Candidate, NewCandidate},
        voting_code::{NewVotingCode, VotingCode},
    },
    mongodb::Id,
};

mod memory;
mod mongo;

pub use memory::MemoryStore;
pub use mongo::MongoStore;

/// How many voting codes exist, and how many have been spent.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CodeCounts {
    pub total: u64,
    pub used: u64,
}

/// A spent voting code together with the candidate its vote went to.
#[derive(Debug, Clone)]
pub struct UsedCode {
    pub voting_code: VotingCode,
    pub candidate: Option<Candidate>,
}

#[rocket::async_trait]
pub trait VoteStore: Send + Sync {
    /// Find a voting code by its (already normalized) code.
    async fn voting_code_by_code(&self, code: &str) -> Result<Option<VotingCode>>;

    async fn voting_code_by_id(&self, id: Id) -> Result<Option<VotingCode>>;

    /// Attach a voter's display name to an unused code.
    ///
    /// The write is conditional on the code being unused at the moment it
    /// happens. Fails with [`crate::error::Error::AlreadyUsed`] for a spent
    /// code and [`crate::error::Error::NotFound`] for an unknown one.
    async fn set_voter_name(&self, id: Id, voter_name: &str) -> Result<()>;

    /// Whether any vote references the given voting code.
    async fn vote_exists(&self, voting_code_id: Id) -> Result<bool>;

    async fn candidate_by_id(&self, id: Id) -> Result<Option<Candidate>>;

    /// All candidates, ordered by name.
    async fn candidates(&self) -> Result<Vec<Candidate>>;

    /// Atomically insert a vote and mark the voting code used.
    ///
    /// Either both writes become visible or neither does. Fails with
    /// [`crate::error::Error::AlreadyUsed`] if the code was spent, or a vote
    /// for it was recorded, by anyone else first.
    async fn record_vote(&self, voting_code_id: Id, candidate_id: Id) -> Result<()>;

    /// Number of committed votes per candidate ID. Candidates with no votes
    /// may be absent.
    async fn vote_counts(&self) -> Result<HashMap<Id, u64>>;

    async fn code_counts(&self) -> Result<CodeCounts>;

    /// The most recently spent voting codes, newest first.
    async fn recent_votes(&self, limit: u32) -> Result<Vec<UsedCode>>;

    /// Insert a new voting code. Returns `None` if the code already exists.
    async fn insert_voting_code(&self, voting_code: &NewVotingCode) -> Result<Option<Id>>;

    async fn insert_candidate(&self, candidate: &NewCandidate) -> Result<Id>;

    async fn admin_by_username(&self, username: &str) -> Result<Option<Admin>>;

    async fn admin_by_id(&self, id: Id) -> Result<Option<Admin>>;

    /// Insert a new admin. Returns `None` if the username is taken.
    async fn insert_admin(&self, admin: &NewAdmin) -> Result<Option<Id>>;

    async fn admin_count(&self) -> Result<u64>;
}
