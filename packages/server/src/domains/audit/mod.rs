//! Audit domain - the logged-action trail behind every edit.

pub mod models;

pub use models::logged_action::{ActionType, LoggedAction};
