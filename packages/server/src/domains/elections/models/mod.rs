pub mod ballot;
pub mod election;
pub mod party;
pub mod post;

pub use ballot::Ballot;
pub use election::Election;
pub use party::Party;
pub use post::Post;
