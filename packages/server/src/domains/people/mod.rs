//! People domain - person records, identifiers, version history, merging.
//!
//! A person's editable state is snapshotted into their version history on
//! every change (see `versions`); duplicates get combined by the merge
//! operation (see `merge`), which leaves a redirect behind so old ids keep
//! resolving.

pub mod actions;
pub mod merge;
pub mod models;
pub mod versions;

pub use actions::{PersonError, PersonFields};
pub use merge::{merge_people, MergeError, MergeReport, MergeRequest};
pub use models::{Person, PersonIdentifier, PersonImage, PersonRedirect};
