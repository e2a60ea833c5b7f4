use std::ops::Deref;

use mongodb::bson::DateTime;
use serde::{Deserialize, Serialize};

use crate::model::mongodb::Id;

/// Core vote data, as stored in the database. Votes are never modified.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VoteCore {
    /// Foreign Key voting code ID. Unique across all votes.
    pub voting_code_id: Id,
    /// Foreign Key candidate ID.
    pub candidate_id: Id,
    pub created_at: DateTime,
}

impl VoteCore {
    /// A vote cast now.
    pub fn new(voting_code_id: Id, candidate_id: Id) -> Self {
        Self {
            voting_code_id,
            candidate_id,
            created_at: DateTime::now(),
        }
    }
}

/// A vote without an ID.
pub type NewVote = VoteCore;

/// A vote from the database, with its unique ID.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Vote {
    #[serde(rename = "_id")]
    pub id: Id,
    #[serde(flatten)]
    pub vote: VoteCore,
}

impl Deref for Vote {
    type Target = VoteCore;

    fn deref(&self) -> &Self::Target {
        &self.vote
    }
}
