// Candidate Register - Core
//
// This crate provides the engineering core for tracking election candidates:
// person records with append-only version history, candidacies on ballots,
// and the person-merge operation with redirect bookkeeping.
//
// There is deliberately no HTTP layer here; callers drive the domain
// operations directly (see the manage_cli binary).

pub mod common;
pub mod config;
pub mod data_migrations;
pub mod domains;

pub use config::*;
