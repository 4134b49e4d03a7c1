//! Candidacies domain - membership records linking people to ballots.

pub mod actions;
pub mod models;

pub use actions::{CandidacyError, CandidacyRequest};
pub use models::Membership;
