use std::collections::HashMap;
use std::time::Duration;

use log::{debug, warn};
use mongodb::{
    bson::{doc, DateTime},
    options::{FindOptions, SessionOptions},
    Client, ClientSession, Database,
};
use rocket::{futures::TryStreamExt, tokio::time::sleep};
use serde::Deserialize;

use crate::error::{Error, Result};
use crate::model::{
    db::{
        admin::{Admin, NewAdmin},
        candidate::{Candidate, NewCandidate},
        vote::{NewVote, Vote},
        voting_code::{NewVotingCode, VotingCode},
    },
    mongodb::{
        ensure_indexes_exist,
        errors::{is_duplicate_key_error, is_transaction_conflict},
        Coll, Id,
    },
};

use super::{CodeCounts, UsedCode, VoteStore};

/// How many times a vote transaction is run before a write conflict is
/// reported to the caller.
const VOTE_TRANSACTION_ATTEMPTS: usize = 8;

/// Base delay between conflicting vote transactions, scaled by the attempt.
const CONFLICT_BACKOFF_MS: u64 = 10;

/// A store backed by a MongoDB replica set. Vote commits use a
/// multi-document transaction.
#[derive(Clone)]
pub struct MongoStore {
    client: Client,
    db: Database,
}

/// One row of the per-candidate vote tally.
#[derive(Debug, Deserialize)]
struct Tally {
    #[serde(rename = "_id")]
    candidate_id: Id,
    votes: u64,
}

impl MongoStore {
    /// Use the named database, creating any missing indexes.
    pub async fn connect(client: Client, db_name: &str) -> Result<Self> {
        let db = client.database(db_name);
        ensure_indexes_exist(&db).await?;
        Ok(Self { client, db })
    }

    pub fn database(&self) -> &Database {
        &self.db
    }

    fn coll<T: crate::model::mongodb::MongoCollection>(&self) -> Coll<T> {
        Coll::from_db(&self.db)
    }

    /// The body of the vote transaction. The caller commits or aborts.
    async fn record_vote_in(
        &self,
        session: &mut ClientSession,
        voting_code_id: Id,
        candidate_id: Id,
    ) -> Result<()> {
        let candidate = self
            .coll::<Candidate>()
            .find_one_with_session(candidate_id.as_doc(), None, session)
            .await?;
        if candidate.is_none() {
            return Err(Error::InvalidCandidate(format!(
                "No candidate with ID {candidate_id}"
            )));
        }

        // Only an unused code may be consumed. Zero matches means someone
        // else got there first.
        let filter = doc! {
            "_id": voting_code_id,
            "is_used": false,
        };
        let update = doc! {
            "$set": {
                "is_used": true,
                "used_at": DateTime::now(),
            }
        };
        let result = self
            .coll::<VotingCode>()
            .update_one_with_session(filter, update, None, session)
            .await?;
        if result.matched_count == 0 {
            return Err(Error::already_used());
        }

        // The unique index on `voting_code_id` backs up the flag.
        let vote = NewVote::new(voting_code_id, candidate_id);
        match self
            .coll::<NewVote>()
            .insert_one_with_session(&vote, None, session)
            .await
        {
            Ok(_) => Ok(()),
            Err(e) if is_duplicate_key_error(&e) => Err(Error::already_used()),
            Err(e) => Err(e.into()),
        }
    }

    /// Turn a failed vote transaction into the error the caller should see.
    /// A conflicting transaction that spent the code is reported as such;
    /// anything else is a store failure.
    async fn classify_vote_failure(&self, err: Error, voting_code_id: Id) -> Error {
        let conflict = matches!(err, Error::StoreUnavailable(ref e) if is_transaction_conflict(e));
        if !conflict {
            return err;
        }
        debug!("Vote transaction for code {voting_code_id} lost a write conflict");
        match self.voting_code_by_id(voting_code_id).await {
            Ok(Some(code)) if code.is_used => Error::already_used(),
            _ => err,
        }
    }
}

#[rocket::async_trait]
impl VoteStore for MongoStore {
    async fn voting_code_by_code(&self, code: &str) -> Result<Option<VotingCode>> {
        let filter = doc! { "code": code };
        Ok(self.coll::<VotingCode>().find_one(filter, None).await?)
    }

    async fn voting_code_by_id(&self, id: Id) -> Result<Option<VotingCode>> {
        Ok(self.coll::<VotingCode>().find_one(id.as_doc(), None).await?)
    }

    async fn set_voter_name(&self, id: Id, voter_name: &str) -> Result<()> {
        // Only an unused code may be renamed.
        let filter = doc! {
            "_id": id,
            "is_used": false,
        };
        let update = doc! {
            "$set": {
                "voter_name": voter_name,
            }
        };
        let result = self
            .coll::<VotingCode>()
            .update_one(filter, update, None)
            .await?;
        if result.matched_count == 1 {
            return Ok(());
        }
        match self.voting_code_by_id(id).await? {
            Some(_) => Err(Error::already_used()),
            None => Err(Error::not_found("Invalid voting code")),
        }
    }

    async fn vote_exists(&self, voting_code_id: Id) -> Result<bool> {
        let filter = doc! { "voting_code_id": voting_code_id };
        let count = self.coll::<Vote>().count_documents(filter, None).await?;
        Ok(count > 0)
    }

    async fn candidate_by_id(&self, id: Id) -> Result<Option<Candidate>> {
        Ok(self.coll::<Candidate>().find_one(id.as_doc(), None).await?)
    }

    async fn candidates(&self) -> Result<Vec<Candidate>> {
        let options = FindOptions::builder().sort(doc! { "name": 1 }).build();
        let candidates = self
            .coll::<Candidate>()
            .find(None, options)
            .await?
            .try_collect()
            .await?;
        Ok(candidates)
    }

    async fn record_vote(&self, voting_code_id: Id, candidate_id: Id) -> Result<()> {
        let mut session = self.client.start_session(None).await?;

        // A concurrent commit on the same code aborts this transaction with a
        // transient write conflict. Rerun it: once the other commit lands, the
        // `is_used: false` filter matches nothing and the code reads as spent.
        let mut attempt = 1;
        loop {
            session.start_transaction(None).await?;
            let outcome = match self
                .record_vote_in(&mut session, voting_code_id, candidate_id)
                .await
            {
                Ok(()) => session.commit_transaction().await.map_err(Error::from),
                Err(e) => {
                    if let Err(abort_err) = session.abort_transaction().await {
                        warn!("Failed to abort vote transaction for code {voting_code_id}: {abort_err}");
                    }
                    Err(e)
                }
            };

            match outcome {
                Err(Error::StoreUnavailable(ref e))
                    if is_transaction_conflict(e) && attempt < VOTE_TRANSACTION_ATTEMPTS =>
                {
                    debug!(
                        "Vote transaction for code {voting_code_id} conflicted (attempt {attempt}), retrying"
                    );
                    sleep(Duration::from_millis(CONFLICT_BACKOFF_MS * attempt as u64)).await;
                    attempt += 1;
                }
                Ok(()) => return Ok(()),
                Err(e) => return Err(self.classify_vote_failure(e, voting_code_id).await),
            }
        }
    }

    async fn vote_counts(&self) -> Result<HashMap<Id, u64>> {
        // Read a consistent snapshot so the tally never straddles a commit.
        let options = SessionOptions::builder().snapshot(true).build();
        let mut session = self.client.start_session(Some(options)).await?;

        let pipeline = vec![doc! {
            "$group": {
                "_id": "$candidate_id",
                "votes": { "$sum": 1 },
            }
        }];
        let mut cursor = self
            .coll::<Vote>()
            .aggregate_with_session(pipeline, None, &mut session)
            .await?;
        let mut counts = HashMap::new();
        while let Some(row) = cursor.next(&mut session).await {
            let tally: Tally = mongodb::bson::from_document(row?)
                .map_err(|e| Error::StoreUnavailable(e.into()))?;
            counts.insert(tally.candidate_id, tally.votes);
        }
        Ok(counts)
    }

    async fn code_counts(&self) -> Result<CodeCounts> {
        let codes = self.coll::<VotingCode>();
        let total = codes.count_documents(None, None).await?;
        let used = codes
            .count_documents(doc! { "is_used": true }, None)
            .await?;
        Ok(CodeCounts { total, used })
    }

    async fn recent_votes(&self, limit: u32) -> Result<Vec<UsedCode>> {
        let options = FindOptions::builder()
            .sort(doc! { "used_at": -1 })
            .limit(i64::from(limit))
            .build();
        let used_codes: Vec<VotingCode> = self
            .coll::<VotingCode>()
            .find(doc! { "is_used": true }, options)
            .await?
            .try_collect()
            .await?;

        let votes = self.coll::<Vote>();
        let candidates = self.coll::<Candidate>();
        let mut recent = Vec::with_capacity(used_codes.len());
        for voting_code in used_codes {
            let vote = votes
                .find_one(doc! { "voting_code_id": voting_code.id }, None)
                .await?;
            let candidate = match vote {
                Some(vote) => candidates.find_one(vote.candidate_id.as_doc(), None).await?,
                None => None,
            };
            recent.push(UsedCode {
                voting_code,
                candidate,
            });
        }
        Ok(recent)
    }

    async fn insert_voting_code(&self, voting_code: &NewVotingCode) -> Result<Option<Id>> {
        match self
            .coll::<NewVotingCode>()
            .insert_one(voting_code, None)
            .await
        {
            Ok(result) => Ok(result.inserted_id.as_object_id().map(Id::from)),
            Err(e) if is_duplicate_key_error(&e) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn insert_candidate(&self, candidate: &NewCandidate) -> Result<Id> {
        let inserted = self
            .coll::<NewCandidate>()
            .insert_one(candidate, None)
            .await?
            .inserted_id
            .as_object_id()
            .ok_or_else(|| {
                Error::Status(
                    rocket::http::Status::InternalServerError,
                    "Database assigned a non-ObjectId candidate ID".to_string(),
                )
            })?;
        Ok(inserted.into())
    }

    async fn admin_by_username(&self, username: &str) -> Result<Option<Admin>> {
        let filter = doc! { "username": username };
        Ok(self.coll::<Admin>().find_one(filter, None).await?)
    }

    async fn admin_by_id(&self, id: Id) -> Result<Option<Admin>> {
        Ok(self.coll::<Admin>().find_one(id.as_doc(), None).await?)
    }

    async fn insert_admin(&self, admin: &NewAdmin) -> Result<Option<Id>> {
        match self.coll::<NewAdmin>().insert_one(admin, None).await {
            Ok(result) => Ok(result.inserted_id.as_object_id().map(Id::from)),
            Err(e) if is_duplicate_key_error(&e) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn admin_count(&self) -> Result<u64> {
        Ok(self.coll::<Admin>().count_documents(None, None).await?)
    }
}

#[cfg(test)]
mod tests {
    use mongodb::Database;

    use crate::ballot_box::BallotBox;
    use crate::model::db::{candidate::CandidateCore, voting_code::VotingCodeCore};

    use super::*;

    #[backend_test]
    async fn record_vote_is_atomic(ballot_box: BallotBox, db: Database) {
        let store = ballot_box.store();
        let code_id = store
            .insert_voting_code(&VotingCodeCore::example())
            .await
            .unwrap()
            .unwrap();
        let candidate_id = store
            .insert_candidate(&CandidateCore::example1())
            .await
            .unwrap();

        // Unknown candidate: the transaction rolls back, nothing is spent.
        let result = store.record_vote(code_id, Id::new()).await;
        assert!(matches!(result, Err(Error::InvalidCandidate(_))));
        let code = store.voting_code_by_id(code_id).await.unwrap().unwrap();
        assert!(!code.is_used);

        store.record_vote(code_id, candidate_id).await.unwrap();
        let result = store.record_vote(code_id, candidate_id).await;
        assert!(matches!(result, Err(Error::AlreadyUsed(_))));

        let votes = Coll::<Vote>::from_db(&db)
            .count_documents(doc! { "voting_code_id": code_id }, None)
            .await
            .unwrap();
        assert_eq!(votes, 1);
        assert_eq!(store.vote_counts().await.unwrap()[&candidate_id], 1);
    }

    #[backend_test]
    async fn concurrent_votes_spend_code_once(ballot_box: BallotBox, db: Database) {
        let store = ballot_box.store();
        let code_id = store
            .insert_voting_code(&VotingCodeCore::example())
            .await
            .unwrap()
            .unwrap();
        let first = store
            .insert_candidate(&CandidateCore::example1())
            .await
            .unwrap();
        let second = store
            .insert_candidate(&CandidateCore::example2())
            .await
            .unwrap();

        let attempts = (0..8)
            .map(|i| {
                let ballot_box = ballot_box.clone();
                let candidate = if i % 2 == 0 { first } else { second };
                rocket::tokio::spawn(async move {
                    ballot_box.store().record_vote(code_id, candidate).await
                })
            })
            .collect::<Vec<_>>();

        // Every loser sees the code as spent, never a store failure.
        let mut successes = 0;
        for attempt in attempts {
            match attempt.await.unwrap() {
                Ok(()) => successes += 1,
                Err(Error::AlreadyUsed(_)) => {}
                Err(e) => panic!("Unexpected error: {e}"),
            }
        }
        assert_eq!(successes, 1);

        let votes: Vec<Vote> = Coll::<Vote>::from_db(&db)
            .find(doc! { "voting_code_id": code_id }, None)
            .await
            .unwrap()
            .try_collect()
            .await
            .unwrap();
        assert_eq!(votes.len(), 1);
        assert!(votes[0].candidate_id == first || votes[0].candidate_id == second);
        let code = store.voting_code_by_id(code_id).await.unwrap().unwrap();
        assert!(code.is_used);
    }

    #[backend_test]
    async fn spent_code_keeps_its_name(ballot_box: BallotBox) {
        let store = ballot_box.store();
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

    #[backend_test]
    async fn duplicate_codes_are_rejected(codes: Coll<VotingCode>, ballot_box: BallotBox) {
        let store = ballot_box.store();
        assert!(store
            .insert_voting_code(&VotingCodeCore::example())
            .await
            .unwrap()
            .is_some());
        assert!(store
            .insert_voting_code(&VotingCodeCore::example())
            .await
            .unwrap()
            .is_none());
        assert_eq!(codes.count_documents(None, None).await.unwrap(), 1);
    }
}
