//! DB-compatible (e.g. de/serialisable) types.
//!
//! The types in this module are serialised in an DB-friendly way, e.g.:
//!
//! - IDs and datetimes are serialised in MongoDB's own format.
//!
//! Each record comes in two flavours: a `*Core` holding the data, aliased as
//! `New*` for inserts, and a wrapper carrying the `_id` that the database
//! assigned.

pub mod admin;
pub mod candidate;
pub mod vote;
pub mod voting_code;
