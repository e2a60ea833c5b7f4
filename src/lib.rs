#[macro_use]
extern crate rocket;

#[cfg(test)]
#[macro_use]
extern crate backend_test;

use rocket::{figment::Figment, Build, Rocket};

use crate::ballot_box::BallotBox;
use crate::config::{ConfigFairing, StoreFairing};
use crate::logging::LoggerFairing;

pub mod api;
pub mod ballot_box;
pub mod config;
pub mod error;
pub mod logging;
pub mod model;
pub mod store;

#[cfg(test)]
mod testing;

/// The server as configured by `Rocket.toml` and the environment. The store is
/// connected and a default admin created when the rocket ignites.
pub fn build() -> Rocket<Build> {
    rocket::build()
        .attach(LoggerFairing)
        .attach(ConfigFairing)
        .attach(StoreFairing)
        .mount("/", api::routes())
}

/// A server around an existing [`BallotBox`], bypassing store configuration.
pub fn rocket_for_ballot_box(figment: Figment, ballot_box: BallotBox) -> Rocket<Build> {
    rocket::custom(figment)
        .attach(LoggerFairing)
        .attach(ConfigFairing)
        .manage(ballot_box)
        .mount("/", api::routes())
}
