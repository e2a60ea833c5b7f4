use serde::{Deserialize, Serialize};

use crate::model::api::id::ApiId;

/// A voter presenting their voting code.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RedeemRequest {
    #[serde(default)]
    pub code: String,
    #[serde(default)]
    pub voter_name: String,
}

/// A successfully redeemed voting code, ready to vote with.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RedeemedCode {
    pub voting_code_id: ApiId,
    pub voter_name: String,
}

/// A ballot submission. Either ID may be missing from a malformed request;
/// the voting code ID may also come from the voter's auth token instead.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BallotRequest {
    #[serde(default)]
    pub voting_code_id: Option<String>,
    #[serde(default)]
    pub candidate_id: Option<String>,
}

/// Confirmation of a committed vote.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CastBallot {
    pub voter_name: Option<String>,
    pub message: String,
}

impl CastBallot {
    pub fn new(voter_name: Option<String>) -> Self {
        Self {
            voter_name,
            message: "Vote cast successfully".to_string(),
        }
    }
}

#[cfg(test)]
mod examples {
    use super::*;

    impl RedeemRequest {
        pub fn example() -> Self {
            Self {
                code: "abc12345 ".to_string(),
                voter_name: " Alice ".to_string(),
            }
        }
    }
}
