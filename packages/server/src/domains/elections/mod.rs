//! Elections domain - elections, posts, parties, and ballots.
//!
//! A ballot is a post contested in an election. Ballots can be locked
//! against candidacy edits once nomination papers are confirmed, and
//! cancelled when the poll will not take place.

pub mod actions;
pub mod models;

pub use models::{Ballot, Election, Party, Post};
