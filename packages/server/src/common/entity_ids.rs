//! Typed ID definitions for all domain entities.
//!
//! One marker type and alias per entity, so a `PersonId` and a `BallotId`
//! can never be swapped silently.

pub use super::id::Id;

// ============================================================================
// Entity marker types
// ============================================================================

/// Marker type for Person entities.
pub struct Person;

/// Marker type for PersonIdentifier entities (typed key/value ids).
pub struct PersonIdentifier;

/// Marker type for PersonImage entities (image metadata rows).
pub struct PersonImage;

/// Marker type for OtherName entities (alternate or former names).
pub struct OtherName;

/// Marker type for Election entities.
pub struct Election;

/// Marker type for Post entities (the position being contested).
pub struct Post;

/// Marker type for Party entities.
pub struct Party;

/// Marker type for Ballot entities (post x election contests).
pub struct Ballot;

/// Marker type for Membership entities (candidacies).
pub struct Membership;

/// Marker type for LoggedAction entities (audit trail rows).
pub struct LoggedAction;

// ============================================================================
// Type aliases - the primary API
// ============================================================================

/// Typed ID for Person entities.
pub type PersonId = Id<Person>;

/// Typed ID for PersonIdentifier entities.
pub type IdentifierId = Id<PersonIdentifier>;

/// Typed ID for PersonImage entities.
pub type ImageId = Id<PersonImage>;

/// Typed ID for OtherName entities.
pub type OtherNameId = Id<OtherName>;

/// Typed ID for Election entities.
pub type ElectionId = Id<Election>;

/// Typed ID for Post entities.
pub type PostId = Id<Post>;

/// Typed ID for Party entities.
pub type PartyId = Id<Party>;

/// Typed ID for Ballot entities.
pub type BallotId = Id<Ballot>;

/// Typed ID for Membership entities.
pub type MembershipId = Id<Membership>;

/// Typed ID for LoggedAction entities.
pub type LoggedActionId = Id<LoggedAction>;
