use std::collections::HashMap;

use mongodb::bson::DateTime;
use rocket::tokio::sync::RwLock;

use crate::error::{Error, Result};
use crate::model::{
    db::{
        admin::{Admin, NewAdmin},
        candidate::{Candidate, NewCandidate},
        vote::{NewVote, Vote},
        voting_code::{NewVotingCode, VotingCode},
    },
    mongodb::Id,
};

use super::{CodeCounts, UsedCode, VoteStore};

/// Every table, guarded together so that a vote commit sees and changes a
/// consistent state.
#[derive(Default)]
struct Tables {
    voting_codes: HashMap<Id, VotingCode>,
    /// Unique index on `VotingCode::code`.
    codes_by_code: HashMap<String, Id>,
    candidates: HashMap<Id, Candidate>,
    /// Votes keyed by voting code ID: at most one each.
    votes: HashMap<Id, Vote>,
    admins: HashMap<Id, Admin>,
}

/// A process-local store. Nothing survives a restart.
#[derive(Default)]
pub struct MemoryStore {
    tables: RwLock<Tables>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[rocket::async_trait]
impl VoteStore for MemoryStore {
    async fn voting_code_by_code(&self, code: &str) -> Result<Option<VotingCode>> {
        let tables = self.tables.read().await;
        Ok(tables
            .codes_by_code
            .get(code)
            .and_then(|id| tables.voting_codes.get(id))
            .cloned())
    }

    async fn voting_code_by_id(&self, id: Id) -> Result<Option<VotingCode>> {
        Ok(self.tables.read().await.voting_codes.get(&id).cloned())
    }

    async fn set_voter_name(&self, id: Id, voter_name: &str) -> Result<()> {
        let mut tables = self.tables.write().await;
        let code = tables
            .voting_codes
            .get_mut(&id)
            .ok_or_else(|| Error::not_found("Invalid voting code"))?;
        // Checked under the same guard as `record_vote`, so a spent code keeps its name.
        if code.is_used {
            return Err(Error::already_used());
        }
        code.voter_name = Some(voter_name.to_string());
        Ok(())
    }

    async fn vote_exists(&self, voting_code_id: Id) -> Result<bool> {
        Ok(self
            .tables
            .read()
            .await
            .votes
            .contains_key(&voting_code_id))
    }

    async fn candidate_by_id(&self, id: Id) -> Result<Option<Candidate>> {
        Ok(self.tables.read().await.candidates.get(&id).cloned())
    }

    async fn candidates(&self) -> Result<Vec<Candidate>> {
        let mut candidates = self
            .tables
            .read()
            .await
            .candidates
            .values()
            .cloned()
            .collect::<Vec<_>>();
        candidates.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(candidates)
    }

    async fn record_vote(&self, voting_code_id: Id, candidate_id: Id) -> Result<()> {
        let mut guard = self.tables.write().await;
        let tables = &mut *guard;

        if !tables.candidates.contains_key(&candidate_id) {
            return Err(Error::InvalidCandidate(format!(
                "No candidate with ID {candidate_id}"
            )));
        }
        let code = tables
            .voting_codes
            .get_mut(&voting_code_id)
            .ok_or_else(|| Error::not_found(format!("Voting code {voting_code_id}")))?;
        if code.is_used || tables.votes.contains_key(&voting_code_id) {
            return Err(Error::already_used());
        }

        // Nothing below can fail, so both writes land together.
        code.is_used = true;
        code.used_at = Some(DateTime::now());
        let vote = Vote {
            id: Id::new(),
            vote: NewVote::new(voting_code_id, candidate_id),
        };
        tables.votes.insert(voting_code_id, vote);
        Ok(())
    }

    async fn vote_counts(&self) -> Result<HashMap<Id, u64>> {
        let tables = self.tables.read().await;
        let mut counts = HashMap::new();
        for vote in tables.votes.values() {
            *counts.entry(vote.candidate_id).or_insert(0) += 1;
        }
        Ok(counts)
    }

    async fn code_counts(&self) -> Result<CodeCounts> {
        let tables = self.tables.read().await;
        Ok(CodeCounts {
            total: tables.voting_codes.len() as u64,
            used: tables.voting_codes.values().filter(|c| c.is_used).count() as u64,
        })
    }

    async fn recent_votes(&self, limit: u32) -> Result<Vec<UsedCode>> {
        let tables = self.tables.read().await;
        let mut used = tables
            .voting_codes
            .values()
            .filter(|c| c.is_used)
            .collect::<Vec<_>>();
        used.sort_by(|a, b| b.used_at.cmp(&a.used_at));
        Ok(used
            .into_iter()
            .take(limit as usize)
            .map(|code| UsedCode {
                voting_code: code.clone(),
                candidate: tables
                    .votes
                    .get(&code.id)
                    .and_then(|vote| tables.candidates.get(&vote.candidate_id))
                    .cloned(),
            })
            .collect())
    }

    async fn insert_voting_code(&self, voting_code: &NewVotingCode) -> Result<Option<Id>> {
        let mut tables = self.tables.write().await;
        if tables.codes_by_code.contains_key(&voting_code.code) {
            return Ok(None);
        }
        let id = Id::new();
        tables.codes_by_code.insert(voting_code.code.clone(), id);
        tables.voting_codes.insert(
            id,
            VotingCode {
                id,
                voting_code: voting_code.clone(),
            },
        );
        Ok(Some(id))
    }

    async fn insert_candidate(&self, candidate: &NewCandidate) -> Result<Id> {
        let id = Id::new();
        self.tables.write().await.candidates.insert(
            id,
            Candidate {
                id,
                candidate: candidate.clone(),
            },
        );
        Ok(id)
    }

    async fn admin_by_username(&self, username: &str) -> Result<Option<Admin>> {
        Ok(self
            .tables
            .read()
            .await
            .admins
            .values()
            .find(|admin| admin.username == username)
            .cloned())
    }

    async fn admin_by_id(&self, id: Id) -> Result<Option<Admin>> {
        Ok(self.tables.read().await.admins.get(&id).cloned())
    }

    async fn insert_admin(&self, admin: &NewAdmin) -> Result<Option<Id>> {
        let mut tables = self.tables.write().await;
        if tables.admins.values().any(|a| a.username == admin.username) {
            return Ok(None);
        }
        let id = Id::new();
        tables.admins.insert(
            id,
            Admin {
                id,
                admin: admin.clone(),
            },
        );
        Ok(Some(id))
    }

    async fn admin_count(&self) -> Result<u64> {
        Ok(self.tables.read().await.admins.len() as u64)
    }
}

#[cfg(test)]
mod tests {
    use crate::model::db::{candidate::CandidateCore, voting_code::VotingCodeCore};

    use super::*;

    #[rocket::async_test]
    async fn record_vote_once() {
        let store = MemoryStore::new();
        let code_id = store
            .insert_voting_code(&VotingCodeCore::example())
            .await
            .unwrap()
            .unwrap();
        let candidate_id = store
            .insert_candidate(&CandidateCore::example1())
            .await
            .unwrap();

        store.record_vote(code_id, candidate_id).await.unwrap();
        let code = store.voting_code_by_id(code_id).await.unwrap().unwrap();
        assert!(code.is_used);
        assert!(code.used_at.is_some());
        assert!(store.vote_exists(code_id).await.unwrap());

        let second = store.record_vote(code_id, candidate_id).await;
        assert!(matches!(second, Err(Error::AlreadyUsed(_))));
        assert_eq!(store.vote_counts().await.unwrap()[&candidate_id], 1);
    }

    #[rocket::async_test]
    async fn spent_code_keeps_its_name() {
        let store = MemoryStore::new();
        let code_id = store
            .insert_voting_code(&VotingCodeCore::example())
            .await
            .unwrap()
            .unwrap();
        let candidate_id = store
            .insert_candidate(&CandidateCore::example1())
            .await
            .unwrap();

        store.set_voter_name(code_id, "Alice").await.unwrap();
        store.record_vote(code_id, candidate_id).await.unwrap();
        let result = store.set_voter_name(code_id, "Mallory").await;
        assert!(matches!(result, Err(Error::AlreadyUsed(_))));

        let code = store.voting_code_by_id(code_id).await.unwrap().unwrap();
        assert_eq!(code.voter_name.as_deref(), Some("Alice"));

        let result = store.set_voter_name(Id::new(), "Nobody").await;
        assert!(matches!(result, Err(Error::NotFound(_))));
    }

    #[rocket::async_test]
    async fn record_vote_for_unknown_candidate_changes_nothing() {
        let store = MemoryStore::new();
        let code_id = store
            .insert_voting_code(&VotingCodeCore::example())
            .await
            .unwrap()
            .unwrap();

        let result = store.record_vote(code_id, Id::new()).await;
        assert!(matches!(result, Err(Error::InvalidCandidate(_))));
        let code = store.voting_code_by_id(code_id).await.unwrap().unwrap();
        assert!(!code.is_used);
        assert!(!store.vote_exists(code_id).await.unwrap());
    }

    #[rocket::async_test]
    async fn unique_codes_and_usernames() {
        let store = MemoryStore::new();
        assert!(store
            .insert_voting_code(&VotingCodeCore::example())
            .await
            .unwrap()
            .is_some());
        assert!(store
            .insert_voting_code(&VotingCodeCore::new("abc12345"))
            .await
            .unwrap()
            .is_none());
        assert_eq!(store.code_counts().await.unwrap().total, 1);

        let admin = NewAdmin {
            username: "admin".to_string(),
            password_hash: "hash".to_string(),
        };
        assert!(store.insert_admin(&admin).await.unwrap().is_some());
        assert!(store.insert_admin(&admin).await.unwrap().is_none());
        assert_eq!(store.admin_count().await.unwrap(), 1);
    }

    #[rocket::async_test]
    async fn recent_votes_newest_first() {
        let store = MemoryStore::new();
        let candidate_id = store
            .insert_candidate(&CandidateCore::example2())
            .await
            .unwrap();
        let first = store
            .insert_voting_code(&VotingCodeCore::example())
            .await
            .unwrap()
            .unwrap();
        let second = store
            .insert_voting_code(&VotingCodeCore::example2())
            .await
            .unwrap()
            .unwrap();
        store
            .insert_voting_code(&VotingCodeCore::new("UNUSED01"))
            .await
            .unwrap();

        store.record_vote(first, candidate_id).await.unwrap();
        // Make sure the timestamps differ at millisecond precision.
        rocket::tokio::time::sleep(std::time::Duration::from_millis(5)).await;
        store.record_vote(second, candidate_id).await.unwrap();

        let recent = store.recent_votes(10).await.unwrap();
        let ids = recent.iter().map(|u| u.voting_code.id).collect::<Vec<_>>();
        assert_eq!(ids, vec![second, first]);
        assert!(recent
            .iter()
            .all(|u| u.candidate.as_ref().map(|c| c.id) == Some(candidate_id)));

        assert_eq!(store.recent_votes(1).await.unwrap().len(), 1);
        assert_eq!(
            store.code_counts().await.unwrap(),
            CodeCounts { total: 3, used: 2 }
        );
    }
}
