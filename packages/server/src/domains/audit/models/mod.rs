pub mod logged_action;

pub use logged_action::*;
