//! The voting core: redeeming codes, committing votes and tallying results.
//!
//! [`BallotBox`] holds no state of its own beyond a handle on the store, so
//! any number of requests may use it concurrently. The one-vote-per-code
//! invariant rests on [`VoteStore::record_vote`] being atomic.

use std::sync::Arc;

use log::{debug, info, warn};

use crate::error::{Error, Result};
use crate::model::{
    api::{
        admin::{AdminCredentials, MAX_CODE_BATCH},
        ballot::{CastBallot, RedeemedCode},
        candidate::{CandidateDescription, CandidateResult, CandidateSpec},
        statistics::{AdminDashboard, RECENT_ACTIVITY_LIMIT},
    },
    db::{
        admin::{Admin, NewAdmin},
        candidate::NewCandidate,
        voting_code::{normalize_code, NewVotingCode},
    },
    mongodb::Id,
};
use crate::store::VoteStore;

/// Shared handle on the voting core. Cheap to clone.
#[derive(Clone)]
pub struct BallotBox {
    store: Arc<dyn VoteStore>,
}

impl BallotBox {
    pub fn new(store: impl VoteStore + 'static) -> Self {
        Self {
            store: Arc::new(store),
        }
    }

    pub fn store(&self) -> &dyn VoteStore {
        self.store.as_ref()
    }

    /// Exchange a voting code for the ID needed to cast a ballot, staging the
    /// voter's display name on the code.
    ///
    /// Redeeming again before voting is allowed and simply overwrites the name.
    pub async fn redeem_code(&self, code: &str, voter_name: &str) -> Result<RedeemedCode> {
        let code = normalize_code(code);
        let voter_name = voter_name.trim();
        if code.is_empty() || voter_name.is_empty() {
            return Err(Error::InvalidInput(
                "Voting code and name are required".to_string(),
            ));
        }

        let voting_code = self
            .store
            .voting_code_by_code(&code)
            .await?
            .ok_or_else(|| Error::not_found("Invalid voting code"))?;
        if voting_code.is_used {
            warn!("Attempt to redeem spent voting code {}", voting_code.id);
            return Err(Error::already_used());
        }

        // The code may have been spent since it was read; the store rechecks.
        self.store.set_voter_name(voting_code.id, voter_name).await?;
        info!("Voting code {} redeemed", voting_code.id);

        Ok(RedeemedCode {
            voting_code_id: voting_code.id.into(),
            voter_name: voter_name.to_string(),
        })
    }

    /// Cast the single vote a voting code allows.
    ///
    /// Either the vote is stored and the code spent, or nothing changes.
    pub async fn commit_vote(
        &self,
        voting_code_id: Option<&str>,
        candidate_id: Option<&str>,
    ) -> Result<CastBallot> {
        let (voting_code_id, candidate_id) = match (non_blank(voting_code_id), non_blank(candidate_id))
        {
            (Some(code), Some(candidate)) => (code, candidate),
            _ => {
                return Err(Error::InvalidInput(
                    "Voting code ID and candidate ID required".to_string(),
                ))
            }
        };

        let voting_code = match Id::parse_opaque(voting_code_id) {
            Some(id) => self.store.voting_code_by_id(id).await?,
            None => None,
        }
        .ok_or_else(|| Error::not_found("Invalid voting session"))?;

        // The flag and the vote are checked independently, so a half-finished
        // earlier attempt can never let a second vote through.
        if voting_code.is_used || self.store.vote_exists(voting_code.id).await? {
            warn!("Second ballot attempted with voting code {}", voting_code.id);
            return Err(Error::already_used());
        }

        let candidate = match Id::parse_opaque(candidate_id) {
            Some(id) => self.store.candidate_by_id(id).await?,
            None => None,
        }
        .ok_or_else(|| Error::InvalidCandidate("Invalid candidate".to_string()))?;

        self.store.record_vote(voting_code.id, candidate.id).await?;
        info!("Vote recorded for voting code {}", voting_code.id);

        Ok(CastBallot::new(voting_code.voting_code.voter_name))
    }

    /// Current vote count for every candidate, ordered by candidate name.
    pub async fn list_results(&self) -> Result<Vec<CandidateResult>> {
        let candidates = self.store.candidates().await?;
        let counts = self.store.vote_counts().await?;
        Ok(candidates
            .into_iter()
            .map(|candidate| {
                let votes = counts.get(&candidate.id).copied().unwrap_or(0);
                CandidateResult::new(candidate, votes)
            })
            .collect())
    }

    pub async fn candidates(&self) -> Result<Vec<CandidateDescription>> {
        let candidates = self.store.candidates().await?;
        Ok(candidates.into_iter().map(Into::into).collect())
    }

    pub async fn dashboard(&self) -> Result<AdminDashboard> {
        let statistics = self.store.code_counts().await?.into();
        let recent_activity = self
            .store
            .recent_votes(RECENT_ACTIVITY_LIMIT)
            .await?
            .into_iter()
            .map(Into::into)
            .collect();
        Ok(AdminDashboard {
            statistics,
            recent_activity,
        })
    }

    /// Provision `count` fresh voting codes, returning them for distribution.
    pub async fn generate_codes(&self, count: u32) -> Result<Vec<String>> {
        if count == 0 || count > MAX_CODE_BATCH {
            return Err(Error::InvalidInput(format!(
                "Can generate between 1 and {MAX_CODE_BATCH} codes at a time"
            )));
        }

        let mut codes = Vec::with_capacity(count as usize);
        while codes.len() < count as usize {
            // The scoped block is needed to force `rng` to be dropped before the next `await`.
            let voting_code = {
                let mut rng = rand::thread_rng();
                NewVotingCode::generate(&mut rng)
            };
            match self.store.insert_voting_code(&voting_code).await? {
                Some(_) => codes.push(voting_code.code),
                None => debug!("Generated voting code collided, retrying"),
            }
        }
        info!("Provisioned {count} voting codes");
        Ok(codes)
    }

    pub async fn add_candidate(&self, spec: CandidateSpec) -> Result<CandidateDescription> {
        let candidate: NewCandidate = spec.try_into()?;
        let id = self.store.insert_candidate(&candidate).await?;
        info!("Added candidate {} ({id})", candidate.name);
        let created = self
            .store
            .candidate_by_id(id)
            .await?
            .ok_or_else(|| Error::not_found(format!("Candidate {id}")))?;
        Ok(created.into())
    }

    /// Create an admin from the given credentials if there are no admins at all.
    pub async fn ensure_admin_exists(&self, credentials: AdminCredentials) -> Result<()> {
        if self.store.admin_count().await? > 0 {
            return Ok(());
        }
        let admin: NewAdmin = credentials.try_into()?;
        if self.store.insert_admin(&admin).await?.is_some() {
            info!("Created default admin '{}'", admin.username);
        }
        Ok(())
    }

    /// Check admin credentials against the stored password hash.
    pub async fn authenticate_admin(&self, credentials: &AdminCredentials) -> Result<Admin> {
        self.store
            .admin_by_username(credentials.username.trim())
            .await?
            .filter(|admin| admin.verify_password(&credentials.password))
            .ok_or_else(|| Error::Unauthorized("Invalid admin credentials".to_string()))
    }
}

fn non_blank(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}
