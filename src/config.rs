use chrono::Duration;
use log::{error, info, warn};
use mongodb::Client as MongoClient;
use rocket::{
    fairing::{Fairing, Info, Kind},
    Build, Rocket,
};
use serde::Deserialize;

use crate::ballot_box::BallotBox;
use crate::model::{api::admin::AdminCredentials, db::admin::DEFAULT_ADMIN_USERNAME};
use crate::store::{MemoryStore, MongoStore};

/// Application configuration, derived from `Rocket.toml` and `ROCKET_*`
/// environment variables. This struct becomes managed state and can be
/// inspected by any endpoint.
#[derive(Deserialize)]
pub struct Config {
    // non-secrets
    auth_ttl: u32,
    // secrets
    jwt_secret: String,
}

impl Config {
    /// Valid lifetime of auth token cookies in seconds.
    pub fn auth_ttl(&self) -> Duration {
        Duration::seconds(self.auth_ttl.into())
    }

    /// Secret key used to sign JWTs.
    pub fn jwt_secret(&self) -> &[u8] {
        self.jwt_secret.as_bytes()
    }
}

/// A fairing that loads the application config and puts it in managed state.
/// This could easily be achieved using `AdHoc::config`, but is written out
/// explicitly for symmetry with the store fairing and control over error
/// messages.
pub struct ConfigFairing;

#[rocket::async_trait]
impl Fairing for ConfigFairing {
    fn info(&self) -> Info {
        Info {
            name: "Config",
            kind: Kind::Ignite,
        }
    }

    async fn on_ignite(&self, mut rocket: Rocket<Build>) -> rocket::fairing::Result {
        // Load the config.
        let config = match rocket.figment().extract::<Config>() {
            Ok(config) => config,
            Err(e) => {
                error!("Failed to load application config");
                rocket::config::pretty_print_error(e);
                return Err(rocket);
            }
        };

        // Manage the state.
        rocket = rocket.manage(config);
        Ok(rocket)
    }
}

/// Which backing store holds the election data.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreKind {
    /// A MongoDB replica set; required for multi-document transactions.
    MongoDb,
    /// Process-local storage for demos. Lost on shutdown.
    Memory,
}

/// Configuration for the store.
#[derive(Deserialize)]
struct StoreConfig {
    // non-secrets
    #[serde(default = "default_store")]
    store: StoreKind,
    #[serde(default = "default_db_name")]
    db_name: String,
    #[serde(default = "default_admin_username")]
    admin_username: String,
    // secrets
    db_uri: Option<String>,
    admin_password: String,
}

fn default_store() -> StoreKind {
    StoreKind::MongoDb
}

fn default_db_name() -> String {
    "votecode".to_string()
}

fn default_admin_username() -> String {
    DEFAULT_ADMIN_USERNAME.to_string()
}

/// A fairing that loads the store config, connects to the database,
/// performs any setup necessary, and places a [`BallotBox`] into managed
/// state.
pub struct StoreFairing;

#[rocket::async_trait]
impl Fairing for StoreFairing {
    fn info(&self) -> Info {
        Info {
            name: "Store",
            kind: Kind::Ignite,
        }
    }

    async fn on_ignite(&self, mut rocket: Rocket<Build>) -> rocket::fairing::Result {
        // Load the config.
        let config = match rocket.figment().extract::<StoreConfig>() {
            Ok(config) => config,
            Err(e) => {
                error!("Failed to load store config");
                rocket::config::pretty_print_error(e);
                return Err(rocket);
            }
        };

        let ballot_box = match config.store {
            StoreKind::Memory => {
                warn!("Using the in-memory store, nothing will survive a restart");
                BallotBox::new(MemoryStore::new())
            }
            StoreKind::MongoDb => {
                let db_uri = match config.db_uri {
                    Some(uri) => uri,
                    None => {
                        error!("`db_uri` must be set when using the MongoDB store");
                        return Err(rocket);
                    }
                };
                info!("Loaded database config, connecting...");
                let client = match MongoClient::with_uri_str(db_uri).await {
                    Ok(client) => client,
                    Err(e) => {
                        error!("Failed to connect to database: {e}");
                        return Err(rocket);
                    }
                };
                // Ensure the required indexes exist.
                let store = match MongoStore::connect(client, &config.db_name).await {
                    Ok(store) => store,
                    Err(e) => {
                        error!("Failed to prepare database {}: {e}", config.db_name);
                        return Err(rocket);
                    }
                };
                info!("...database connection online!");
                BallotBox::new(store)
            }
        };

        // Ensure there is at least one admin who can provision the election.
        let credentials = AdminCredentials {
            username: config.admin_username,
            password: config.admin_password,
        };
        if let Err(e) = ballot_box.ensure_admin_exists(credentials).await {
            error!("Failed to create default admin: {e}");
            return Err(rocket);
        }

        // Manage the state.
        rocket = rocket.manage(ballot_box);
        Ok(rocket)
    }
}
