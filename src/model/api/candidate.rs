use serde::{Deserialize, Serialize};

use crate::error::Error;
use crate::model::{
    api::id::ApiId,
    db::candidate::{Candidate, NewCandidate},
};

/// A candidate as submitted by an admin.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct CandidateSpec {
    pub name: String,
    pub party: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub position: String,
}

impl TryFrom<CandidateSpec> for NewCandidate {
    type Error = Error;

    fn try_from(spec: CandidateSpec) -> Result<Self, Self::Error> {
        let name = spec.name.trim();
        let party = spec.party.trim();
        if name.is_empty() || party.is_empty() {
            return Err(Error::InvalidInput(
                "Candidate name and party are required".to_string(),
            ));
        }
        Ok(Self {
            name: name.to_string(),
            party: party.to_string(),
            description: spec.description.trim().to_string(),
            position: spec.position.trim().to_string(),
        })
    }
}

/// A candidate as shown on the ballot.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct CandidateDescription {
    pub id: ApiId,
    pub name: String,
    pub party: String,
    pub description: String,
    pub position: String,
}

impl From<Candidate> for CandidateDescription {
    fn from(candidate: Candidate) -> Self {
        Self {
            id: candidate.id.into(),
            name: candidate.candidate.name,
            party: candidate.candidate.party,
            description: candidate.candidate.description,
            position: candidate.candidate.position,
        }
    }
}

/// One line of the election results.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CandidateResult {
    pub candidate_id: ApiId,
    pub name: String,
    pub party: String,
    pub votes: u64,
}

impl CandidateResult {
    pub fn new(candidate: Candidate, votes: u64) -> Self {
        Self {
            candidate_id: candidate.id.into(),
            name: candidate.candidate.name,
            party: candidate.candidate.party,
            votes,
        }
    }
}

#[cfg(test)]
mod examples {
    use super::*;

    impl CandidateSpec {
        pub fn example() -> Self {
            Self {
                name: " Elena Rodriguez ".to_string(),
                party: "Unity Movement".to_string(),
                description: "Immigration reform and social justice.".to_string(),
                position: "President".to_string(),
            }
        }
    }
}
