//! Fixtures shared between test modules.

use mongodb::{Client as DbClient, Database};
use rocket::{
    figment::Figment,
    http::{ContentType, Status},
    local::asynchronous::Client,
    serde::json::serde_json::json,
};

use crate::ballot_box::BallotBox;
use crate::model::{
    api::admin::AdminCredentials,
    db::{candidate::CandidateCore, voting_code::VotingCodeCore},
    mongodb::Id,
};
use crate::store::{MemoryStore, MongoStore, VoteStore};

/// A ballot box holding two unused codes, three candidates and one admin.
pub struct Seeded {
    pub ballot_box: BallotBox,
    /// ID of the code `ABC12345`.
    pub voting_code: Id,
    pub candidate_x: Id,
    pub candidate_y: Id,
    pub candidate_z: Id,
}

pub async fn seed(ballot_box: BallotBox) -> Seeded {
    let store = ballot_box.store();
    let voting_code = store
        .insert_voting_code(&VotingCodeCore::example())
        .await
        .unwrap()
        .unwrap();
    store
        .insert_voting_code(&VotingCodeCore::example2())
        .await
        .unwrap()
        .unwrap();
    let candidate_x = store
        .insert_candidate(&CandidateCore::example1())
        .await
        .unwrap();
    let candidate_y = store
        .insert_candidate(&CandidateCore::example2())
        .await
        .unwrap();
    let candidate_z = store
        .insert_candidate(&CandidateCore::example3())
        .await
        .unwrap();
    ballot_box
        .ensure_admin_exists(AdminCredentials::example1())
        .await
        .unwrap();

    Seeded {
        ballot_box,
        voting_code,
        candidate_x,
        candidate_y,
        candidate_z,
    }
}

pub async fn seeded_ballot_box() -> Seeded {
    seed(BallotBox::new(MemoryStore::new())).await
}

/// Application config for tests. No store settings: tests manage their own
/// [`BallotBox`].
pub fn figment() -> Figment {
    rocket::Config::figment()
        .merge(("jwt_secret", "test jwt secret"))
        .merge(("auth_ttl", 3600))
        .merge(("log_level", "off"))
}

/// A client over a freshly seeded in-memory ballot box.
pub async fn memory_client() -> (Client, Seeded) {
    let seeded = seeded_ballot_box().await;
    let rocket = crate::rocket_for_ballot_box(figment(), seeded.ballot_box.clone());
    let client = Client::tracked(rocket).await.unwrap();
    (client, seeded)
}

/// Log the client in as the seeded admin.
pub async fn login_admin(client: &Client) {
    let response = client
        .post(uri!(crate::api::auth::authenticate))
        .header(ContentType::JSON)
        .body(json!(AdminCredentials::example1()).to_string())
        .dispatch()
        .await;
    assert_eq!(Status::Ok, response.status());
}

/// The database URI for store tests, if one is configured.
pub fn db_uri() -> Option<String> {
    std::env::var("ROCKET_DB_URI").ok()
}

/// A ballot box over a uniquely named MongoDB database, so tests never share state.
pub async fn mongo_ballot_box(db_uri: &str) -> (BallotBox, Database) {
    let client = DbClient::with_uri_str(db_uri).await.unwrap();
    let db_name = format!("votecode_test_{}", Id::new());
    let store = MongoStore::connect(client, &db_name).await.unwrap();
    let db = store.database().clone();
    (BallotBox::new(store), db)
}

/// A client over the given ballot box.
pub async fn client_for(ballot_box: BallotBox) -> Client {
    Client::tracked(crate::rocket_for_ballot_box(figment(), ballot_box))
        .await
        .unwrap()
}
