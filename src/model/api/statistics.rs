use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::model::api::id::ApiId;
use crate::store::{CodeCounts, UsedCode};

/// How many recent votes the admin dashboard shows.
pub const RECENT_ACTIVITY_LIMIT: u32 = 20;

/// Participation figures for the admin dashboard.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VotingStatistics {
    pub total_codes: u64,
    pub used_codes: u64,
    pub available_codes: u64,
    /// Percentage of codes used, to one decimal place.
    pub participation_rate: f64,
}

impl From<CodeCounts> for VotingStatistics {
    fn from(counts: CodeCounts) -> Self {
        let participation_rate = if counts.total == 0 {
            0.0
        } else {
            (counts.used as f64 / counts.total as f64 * 1000.0).round() / 10.0
        };
        Self {
            total_codes: counts.total,
            used_codes: counts.used,
            available_codes: counts.total.saturating_sub(counts.used),
            participation_rate,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct CandidateSummary {
    pub name: String,
    pub party: String,
}

/// A single spent voting code.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VotingActivity {
    pub id: ApiId,
    pub code: String,
    pub voter_name: Option<String>,
    pub used_at: Option<DateTime<Utc>>,
    pub candidate: Option<CandidateSummary>,
}

impl From<UsedCode> for VotingActivity {
    fn from(used: UsedCode) -> Self {
        let UsedCode {
            voting_code,
            candidate,
        } = used;
        Self {
            id: voting_code.id.into(),
            used_at: voting_code.used_at.map(|at| at.to_chrono()),
            code: voting_code.voting_code.code,
            voter_name: voting_code.voting_code.voter_name,
            candidate: candidate.map(|c| CandidateSummary {
                name: c.candidate.name,
                party: c.candidate.party,
            }),
        }
    }
}

/// Everything the admin dashboard needs in one response.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AdminDashboard {
    pub statistics: VotingStatistics,
    pub recent_activity: Vec<VotingActivity>,
}
