//! Candidacy create/delete, with the invariants enforced.
//!
//! A candidacy can't be created on a locked ballot, for an election in the
//! person's not-standing set, or when the person already stands somewhere
//! in the same election. Both operations snapshot the person's version
//! history and leave a logged action.

use sqlx::types::Json;
use sqlx::{PgPool, Postgres, Transaction};
use thiserror::Error;
use tracing::info;

use crate::common::{BallotId, MembershipId, PartyId, PersonId};
use crate::domains::audit::{ActionType, LoggedAction};
use crate::domains::people::actions::load_person_for_update;
use crate::domains::people::models::Person;
use crate::domains::people::versions::{
    record_version, ChangeMetadata, EditAction, VersionError,
};

use super::models::Membership;

#[derive(Error, Debug)]
pub enum CandidacyError {
    #[error("person {0} not found")]
    PersonNotFound(PersonId),
    #[error("ballot {0} not found")]
    BallotNotFound(BallotId),
    #[error("the ballot {0} is locked against candidacy edits")]
    BallotLocked(String),
    #[error(
        "trying to add a candidacy in \"{election_slug}\", but that's in \
         {person}'s not-standing list"
    )]
    NotStanding {
        person: PersonId,
        election_slug: String,
    },
    #[error(
        "there was an existing candidacy for {person} in the election \"{election_slug}\""
    )]
    AlreadyStanding {
        person: PersonId,
        election_slug: String,
    },
    #[error("{person} is already a candidate on ballot {ballot_paper_id}")]
    DuplicateCandidacy {
        person: PersonId,
        ballot_paper_id: String,
    },
    #[error("{person} has no candidacy on ballot {ballot_paper_id}")]
    NoSuchCandidacy {
        person: PersonId,
        ballot_paper_id: String,
    },
    #[error("edits to person {0} are prevented")]
    EditsPrevented(PersonId),
    #[error(transparent)]
    Version(#[from] VersionError),
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

#[derive(Debug, Clone)]
pub struct CandidacyRequest {
    pub person: PersonId,
    pub ballot: BallotId,
    pub username: String,
    pub information_source: String,
}

#[derive(sqlx::FromRow)]
struct BallotContext {
    ballot_paper_id: String,
    election_id: crate::common::ElectionId,
    election_slug: String,
    locked: bool,
}

async fn load_ballot_context(
    ballot_id: BallotId,
    tx: &mut Transaction<'_, Postgres>,
) -> Result<BallotContext, CandidacyError> {
    sqlx::query_as::<_, BallotContext>(
        "SELECT b.ballot_paper_id, b.election_id, e.slug AS election_slug, b.locked
         FROM ballots b
         JOIN elections e ON e.id = b.election_id
         WHERE b.id = $1",
    )
    .bind(ballot_id)
    .fetch_optional(&mut **tx)
    .await?
    .ok_or(CandidacyError::BallotNotFound(ballot_id))
}

/// Create a candidacy for a person on a ballot.
pub async fn create_candidacy(
    request: &CandidacyRequest,
    party: PartyId,
    party_list_position: Option<i32>,
    pool: &PgPool,
) -> Result<Membership, CandidacyError> {
    let mut tx = pool.begin().await?;

    let mut person = load_person_for_update(request.person, &mut tx)
        .await
        .map_err(person_err)?;
    if !person.user_can_edit() {
        return Err(CandidacyError::EditsPrevented(person.id));
    }

    let ballot = load_ballot_context(request.ballot, &mut tx).await?;
    if ballot.locked {
        return Err(CandidacyError::BallotLocked(ballot.ballot_paper_id));
    }

    let not_standing: i64 = sqlx::query_scalar(
        "SELECT COUNT(*) FROM person_not_standing
         WHERE person_id = $1 AND election_id = $2",
    )
    .bind(person.id)
    .bind(ballot.election_id)
    .fetch_one(&mut *tx)
    .await?;
    if not_standing > 0 {
        return Err(CandidacyError::NotStanding {
            person: person.id,
            election_slug: ballot.election_slug,
        });
    }

    let on_this_ballot: i64 = sqlx::query_scalar(
        "SELECT COUNT(*) FROM memberships WHERE person_id = $1 AND ballot_id = $2",
    )
    .bind(person.id)
    .bind(request.ballot)
    .fetch_one(&mut *tx)
    .await?;
    if on_this_ballot > 0 {
        return Err(CandidacyError::DuplicateCandidacy {
            person: person.id,
            ballot_paper_id: ballot.ballot_paper_id,
        });
    }

    let in_this_election: i64 = sqlx::query_scalar(
        "SELECT COUNT(*) FROM memberships m
         JOIN ballots b ON b.id = m.ballot_id
         WHERE m.person_id = $1 AND b.election_id = $2",
    )
    .bind(person.id)
    .bind(ballot.election_id)
    .fetch_one(&mut *tx)
    .await?;
    if in_this_election > 0 {
        return Err(CandidacyError::AlreadyStanding {
            person: person.id,
            election_slug: ballot.election_slug,
        });
    }

    let membership = sqlx::query_as::<_, Membership>(
        "INSERT INTO memberships (id, person_id, ballot_id, party_id, party_list_position)
         VALUES ($1, $2, $3, $4, $5)
         RETURNING *",
    )
    .bind(MembershipId::new())
    .bind(person.id)
    .bind(request.ballot)
    .bind(party)
    .bind(party_list_position)
    .fetch_one(&mut *tx)
    .await?;

    snapshot_and_log(
        &mut person,
        request,
        ActionType::CandidacyCreate,
        &mut tx,
    )
    .await?;

    tx.commit().await?;

    info!(
        person = %request.person,
        ballot = %ballot.ballot_paper_id,
        by = %request.username,
        "candidacy created"
    );
    Ok(membership)
}

/// Remove a person's candidacy from a ballot.
pub async fn delete_candidacy(
    request: &CandidacyRequest,
    pool: &PgPool,
) -> Result<(), CandidacyError> {
    let mut tx = pool.begin().await?;

    let mut person = load_person_for_update(request.person, &mut tx)
        .await
        .map_err(person_err)?;
    if !person.user_can_edit() {
        return Err(CandidacyError::EditsPrevented(person.id));
    }

    let ballot = load_ballot_context(request.ballot, &mut tx).await?;
    if ballot.locked {
        return Err(CandidacyError::BallotLocked(ballot.ballot_paper_id));
    }

    let deleted = sqlx::query(
        "DELETE FROM memberships WHERE person_id = $1 AND ballot_id = $2",
    )
    .bind(person.id)
    .bind(request.ballot)
    .execute(&mut *tx)
    .await?;
    if deleted.rows_affected() == 0 {
        return Err(CandidacyError::NoSuchCandidacy {
            person: person.id,
            ballot_paper_id: ballot.ballot_paper_id,
        });
    }

    snapshot_and_log(
        &mut person,
        request,
        ActionType::CandidacyDelete,
        &mut tx,
    )
    .await?;

    tx.commit().await?;

    info!(
        person = %request.person,
        ballot = %ballot.ballot_paper_id,
        by = %request.username,
        "candidacy deleted"
    );
    Ok(())
}

async fn snapshot_and_log(
    person: &mut Person,
    request: &CandidacyRequest,
    action_type: ActionType,
    tx: &mut Transaction<'_, Postgres>,
) -> Result<(), CandidacyError> {
    let data = person.version_data_on(tx).await.map_err(db_err)?;
    let meta = ChangeMetadata::new(
        &request.username,
        &request.information_source,
        EditAction::Edit,
    );
    let mut versions = person.versions.0.clone();
    if let Some(version_id) = record_version(&mut versions, &meta, data)? {
        person.versions = Json(versions);
        person.save_versions(tx).await.map_err(db_err)?;
        LoggedAction::record(
            &request.username,
            action_type,
            Some(person.id),
            Some(request.ballot),
            &request.information_source,
            Some(&version_id),
            &mut **tx,
        )
        .await
        .map_err(db_err)?;
    }
    Ok(())
}

fn person_err(err: crate::domains::people::PersonError) -> CandidacyError {
    use crate::domains::people::PersonError;
    match err {
        PersonError::NotFound(id) => CandidacyError::PersonNotFound(id),
        PersonError::EditsPrevented(id) => CandidacyError::EditsPrevented(id),
        PersonError::Database(db) => CandidacyError::Database(db),
        other => CandidacyError::Database(sqlx::Error::Protocol(other.to_string())),
    }
}

/// Collapse anyhow-wrapped sqlx failures from model helpers into the
/// typed database variant.
fn db_err(err: anyhow::Error) -> CandidacyError {
    match err.downcast::<sqlx::Error>() {
        Ok(db) => CandidacyError::Database(db),
        Err(other) => CandidacyError::Database(sqlx::Error::Protocol(other.to_string())),
    }
}
