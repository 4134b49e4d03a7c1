//! Person edit operations.
//!
//! Every mutation here follows the same shape: run inside one transaction,
//! apply the change, rebuild the version snapshot, record it (the recorder
//! drops no-op edits), and leave a logged action behind.

use sqlx::types::Json;
use sqlx::{PgPool, Postgres, Transaction};
use thiserror::Error;
use tracing::info;

use crate::common::approx_date::{validate_date_field, ApproximateDateError};
use crate::common::{ElectionId, MembershipId, PersonId};
use crate::domains::audit::{ActionType, LoggedAction};
use crate::domains::elections::models::Election;
use crate::domains::people::versions::{
    find_version, record_version, ChangeMetadata, EditAction, VersionError,
};

use super::models::Person;

#[derive(Error, Debug)]
pub enum PersonError {
    #[error("person {0} not found")]
    NotFound(PersonId),
    #[error("edits to person {0} are prevented")]
    EditsPrevented(PersonId),
    #[error("can't delete person {person}: {memberships} candidacies still reference them")]
    UnsafeToDelete { person: PersonId, memberships: i64 },
    #[error("{person} has a candidacy in \"{election_slug}\" so can't be marked not standing there")]
    StandingInElection {
        person: PersonId,
        election_slug: String,
    },
    #[error("no election with slug {0:?} exists")]
    UnknownElection(String),
    #[error("no ballot for post {post_slug:?} in election {election_slug:?}")]
    UnknownBallot {
        election_slug: String,
        post_slug: String,
    },
    #[error("no party with EC id {0:?} exists")]
    UnknownParty(String),
    #[error("version data for {0:?} names a candidacy but no party membership")]
    MissingPartyMembership(String),
    #[error(transparent)]
    Date(#[from] ApproximateDateError),
    #[error(transparent)]
    Version(#[from] VersionError),
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

/// The editable biographical fields, as submitted by an edit form.
#[derive(Debug, Clone, Default)]
pub struct PersonFields {
    pub name: String,
    pub honorific_prefix: String,
    pub honorific_suffix: String,
    pub gender: String,
    pub birth_date: String,
    pub death_date: String,
    pub summary: String,
    pub biography: String,
    pub favourite_biscuit: String,
}

impl PersonFields {
    pub fn named(name: &str) -> Self {
        Self {
            name: name.to_string(),
            ..Default::default()
        }
    }

    fn validate(&self) -> Result<(), PersonError> {
        validate_date_field(&self.birth_date)?;
        validate_date_field(&self.death_date)?;
        Ok(())
    }
}

impl From<&Person> for PersonFields {
    fn from(person: &Person) -> Self {
        Self {
            name: person.name.clone(),
            honorific_prefix: person.honorific_prefix.clone(),
            honorific_suffix: person.honorific_suffix.clone(),
            gender: person.gender.clone(),
            birth_date: person.birth_date.clone(),
            death_date: person.death_date.clone(),
            summary: person.summary.clone(),
            biography: person.biography.clone(),
            favourite_biscuit: person.favourite_biscuit.clone(),
        }
    }
}

pub(crate) async fn load_person_for_update(
    id: PersonId,
    tx: &mut Transaction<'_, Postgres>,
) -> Result<Person, PersonError> {
    sqlx::query_as::<_, Person>("SELECT * FROM people WHERE id = $1 FOR UPDATE")
        .bind(id)
        .fetch_optional(&mut **tx)
        .await?
        .ok_or(PersonError::NotFound(id))
}

/// Create a person and record their initial version.
pub async fn create_person(
    fields: PersonFields,
    username: &str,
    information_source: &str,
    pool: &PgPool,
) -> Result<Person, PersonError> {
    fields.validate()?;

    let mut tx = pool.begin().await?;

    let mut person = sqlx::query_as::<_, Person>(
        "INSERT INTO people
            (id, name, honorific_prefix, honorific_suffix, gender, birth_date,
             death_date, summary, biography, favourite_biscuit)
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
         RETURNING *",
    )
    .bind(PersonId::new())
    .bind(&fields.name)
    .bind(&fields.honorific_prefix)
    .bind(&fields.honorific_suffix)
    .bind(&fields.gender)
    .bind(&fields.birth_date)
    .bind(&fields.death_date)
    .bind(&fields.summary)
    .bind(&fields.biography)
    .bind(&fields.favourite_biscuit)
    .fetch_one(&mut *tx)
    .await?;

    let data = person.version_data_on(&mut tx).await.map_err(db_err)?;
    let meta = ChangeMetadata::new(username, information_source, EditAction::Create);
    let mut versions = Vec::new();
    let version_id = record_version(&mut versions, &meta, data)?;
    person.versions = Json(versions);
    person.save_versions(&mut tx).await.map_err(db_err)?;

    LoggedAction::record(
        username,
        ActionType::PersonCreate,
        Some(person.id),
        None,
        information_source,
        version_id.as_deref(),
        &mut *tx,
    )
    .await
    .map_err(db_err)?;

    tx.commit().await?;

    info!(person = %person.id, name = %person.name, by = username, "person created");
    Ok(person)
}

/// Apply an edit to a person's biographical fields.
///
/// Returns the updated person and the new version id; `None` means the
/// edit was a no-op and neither a version nor a logged action was recorded.
pub async fn update_person(
    person_id: PersonId,
    fields: PersonFields,
    username: &str,
    information_source: &str,
    pool: &PgPool,
) -> Result<(Person, Option<String>), PersonError> {
    fields.validate()?;

    let mut tx = pool.begin().await?;

    let person = load_person_for_update(person_id, &mut tx).await?;
    if !person.user_can_edit() {
        return Err(PersonError::EditsPrevented(person_id));
    }

    let mut person = sqlx::query_as::<_, Person>(
        "UPDATE people
         SET name = $2, honorific_prefix = $3, honorific_suffix = $4,
             gender = $5, birth_date = $6, death_date = $7, summary = $8,
             biography = $9, favourite_biscuit = $10, updated_at = now()
         WHERE id = $1
         RETURNING *",
    )
    .bind(person_id)
    .bind(&fields.name)
    .bind(&fields.honorific_prefix)
    .bind(&fields.honorific_suffix)
    .bind(&fields.gender)
    .bind(&fields.birth_date)
    .bind(&fields.death_date)
    .bind(&fields.summary)
    .bind(&fields.biography)
    .bind(&fields.favourite_biscuit)
    .fetch_one(&mut *tx)
    .await?;

    let data = person.version_data_on(&mut tx).await.map_err(db_err)?;
    let meta = ChangeMetadata::new(username, information_source, EditAction::Edit);
    let mut versions = person.versions.0.clone();
    let version_id = record_version(&mut versions, &meta, data)?;

    if let Some(version_id) = &version_id {
        person.versions = Json(versions);
        person.save_versions(&mut tx).await.map_err(db_err)?;
        LoggedAction::record(
            username,
            ActionType::PersonUpdate,
            Some(person.id),
            None,
            information_source,
            Some(version_id),
            &mut *tx,
        )
        .await
        .map_err(db_err)?;
    }

    tx.commit().await?;
    Ok((person, version_id))
}

/// Assert that a person is not standing in an election.
///
/// Rejected when the person already has a candidacy there; that
/// contradiction has to be resolved by deleting the candidacy first.
pub async fn set_not_standing(
    person_id: PersonId,
    election_id: ElectionId,
    username: &str,
    information_source: &str,
    pool: &PgPool,
) -> Result<(), PersonError> {
    let mut tx = pool.begin().await?;

    let mut person = load_person_for_update(person_id, &mut tx).await?;
    let election = sqlx::query_as::<_, Election>("SELECT * FROM elections WHERE id = $1")
        .bind(election_id)
        .fetch_one(&mut *tx)
        .await?;

    let standing: i64 = sqlx::query_scalar(
        "SELECT COUNT(*) FROM memberships m
         JOIN ballots b ON b.id = m.ballot_id
         WHERE m.person_id = $1 AND b.election_id = $2",
    )
    .bind(person_id)
    .bind(election_id)
    .fetch_one(&mut *tx)
    .await?;
    if standing > 0 {
        return Err(PersonError::StandingInElection {
            person: person_id,
            election_slug: election.slug,
        });
    }

    sqlx::query(
        "INSERT INTO person_not_standing (person_id, election_id)
         VALUES ($1, $2)
         ON CONFLICT DO NOTHING",
    )
    .bind(person_id)
    .bind(election_id)
    .execute(&mut *tx)
    .await?;

    record_snapshot_and_log(
        &mut person,
        username,
        information_source,
        ActionType::PersonUpdate,
        &mut tx,
    )
    .await?;

    tx.commit().await?;
    Ok(())
}

/// Withdraw a not-standing assertion.
pub async fn remove_not_standing(
    person_id: PersonId,
    election_id: ElectionId,
    username: &str,
    information_source: &str,
    pool: &PgPool,
) -> Result<(), PersonError> {
    let mut tx = pool.begin().await?;

    let mut person = load_person_for_update(person_id, &mut tx).await?;

    sqlx::query(
        "DELETE FROM person_not_standing WHERE person_id = $1 AND election_id = $2",
    )
    .bind(person_id)
    .bind(election_id)
    .execute(&mut *tx)
    .await?;

    record_snapshot_and_log(
        &mut person,
        username,
        information_source,
        ActionType::PersonUpdate,
        &mut tx,
    )
    .await?;

    tx.commit().await?;
    Ok(())
}

/// Set (or replace) an identifier of one type on a person.
///
/// The register stores one value per value_type, so an existing identifier
/// of the same type is replaced.
pub async fn set_identifier(
    person_id: PersonId,
    value_type: &str,
    value: &str,
    username: &str,
    information_source: &str,
    pool: &PgPool,
) -> Result<(), PersonError> {
    let mut tx = pool.begin().await?;

    let mut person = load_person_for_update(person_id, &mut tx).await?;
    if !person.user_can_edit() {
        return Err(PersonError::EditsPrevented(person_id));
    }

    sqlx::query(
        "INSERT INTO person_identifiers (id, person_id, value, value_type)
         VALUES ($1, $2, $3, $4)
         ON CONFLICT (person_id, value_type)
         DO UPDATE SET value = EXCLUDED.value, updated_at = now()",
    )
    .bind(crate::common::IdentifierId::new())
    .bind(person_id)
    .bind(value)
    .bind(value_type)
    .execute(&mut *tx)
    .await?;

    record_snapshot_and_log(
        &mut person,
        username,
        information_source,
        ActionType::PersonUpdate,
        &mut tx,
    )
    .await?;

    tx.commit().await?;
    Ok(())
}

/// Remove an identifier of one type from a person.
pub async fn remove_identifier(
    person_id: PersonId,
    value_type: &str,
    username: &str,
    information_source: &str,
    pool: &PgPool,
) -> Result<(), PersonError> {
    let mut tx = pool.begin().await?;

    let mut person = load_person_for_update(person_id, &mut tx).await?;
    if !person.user_can_edit() {
        return Err(PersonError::EditsPrevented(person_id));
    }

    sqlx::query(
        "DELETE FROM person_identifiers WHERE person_id = $1 AND value_type = $2",
    )
    .bind(person_id)
    .bind(value_type)
    .execute(&mut *tx)
    .await?;

    record_snapshot_and_log(
        &mut person,
        username,
        information_source,
        ActionType::PersonUpdate,
        &mut tx,
    )
    .await?;

    tx.commit().await?;
    Ok(())
}

/// Add an alternate or former name to a person.
pub async fn add_other_name(
    person_id: PersonId,
    name: &str,
    note: &str,
    username: &str,
    information_source: &str,
    pool: &PgPool,
) -> Result<(), PersonError> {
    let mut tx = pool.begin().await?;

    let mut person = load_person_for_update(person_id, &mut tx).await?;
    if !person.user_can_edit() {
        return Err(PersonError::EditsPrevented(person_id));
    }

    sqlx::query(
        "INSERT INTO other_names (id, person_id, name, note)
         VALUES ($1, $2, $3, $4)
         ON CONFLICT (person_id, name) DO UPDATE SET note = EXCLUDED.note",
    )
    .bind(crate::common::OtherNameId::new())
    .bind(person_id)
    .bind(name)
    .bind(note)
    .execute(&mut *tx)
    .await?;

    record_snapshot_and_log(
        &mut person,
        username,
        information_source,
        ActionType::PersonUpdate,
        &mut tx,
    )
    .await?;

    tx.commit().await?;
    Ok(())
}

/// Remove an alternate name from a person.
pub async fn remove_other_name(
    person_id: PersonId,
    name: &str,
    username: &str,
    information_source: &str,
    pool: &PgPool,
) -> Result<(), PersonError> {
    let mut tx = pool.begin().await?;

    let mut person = load_person_for_update(person_id, &mut tx).await?;
    if !person.user_can_edit() {
        return Err(PersonError::EditsPrevented(person_id));
    }

    sqlx::query("DELETE FROM other_names WHERE person_id = $1 AND name = $2")
        .bind(person_id)
        .bind(name)
        .execute(&mut *tx)
        .await?;

    record_snapshot_and_log(
        &mut person,
        username,
        information_source,
        ActionType::PersonUpdate,
        &mut tx,
    )
    .await?;

    tx.commit().await?;
    Ok(())
}

/// Restore a person's editable state from one of their stored versions.
///
/// Fields, identifiers, other names, candidacies, and not-standing
/// assertions are all rebuilt from the version's data payload. A fresh
/// snapshot is recorded on top (subject to the usual no-op dedup).
pub async fn revert_person(
    person_id: PersonId,
    version_id: &str,
    username: &str,
    pool: &PgPool,
) -> Result<Option<String>, PersonError> {
    let mut tx = pool.begin().await?;

    let person = load_person_for_update(person_id, &mut tx).await?;
    if !person.user_can_edit() {
        return Err(PersonError::EditsPrevented(person_id));
    }
    let data = find_version(&person.versions, person_id, version_id)?
        .data
        .clone();

    let mut person = sqlx::query_as::<_, Person>(
        "UPDATE people
         SET name = $2, honorific_prefix = $3, honorific_suffix = $4,
             gender = $5, birth_date = $6, death_date = $7, summary = $8,
             biography = $9, favourite_biscuit = $10, updated_at = now()
         WHERE id = $1
         RETURNING *",
    )
    .bind(person_id)
    .bind(&data.name)
    .bind(&data.honorific_prefix)
    .bind(&data.honorific_suffix)
    .bind(&data.gender)
    .bind(&data.birth_date)
    .bind(&data.death_date)
    .bind(&data.summary)
    .bind(&data.biography)
    .bind(&data.favourite_biscuit)
    .fetch_one(&mut *tx)
    .await?;

    // Replace identifiers and other names wholesale
    sqlx::query("DELETE FROM person_identifiers WHERE person_id = $1")
        .bind(person_id)
        .execute(&mut *tx)
        .await?;
    for (value_type, value) in &data.identifiers {
        sqlx::query(
            "INSERT INTO person_identifiers (id, person_id, value, value_type)
             VALUES ($1, $2, $3, $4)",
        )
        .bind(crate::common::IdentifierId::new())
        .bind(person_id)
        .bind(value)
        .bind(value_type)
        .execute(&mut *tx)
        .await?;
    }

    sqlx::query("DELETE FROM other_names WHERE person_id = $1")
        .bind(person_id)
        .execute(&mut *tx)
        .await?;
    for other_name in &data.other_names {
        sqlx::query(
            "INSERT INTO other_names (id, person_id, name, note)
             VALUES ($1, $2, $3, $4)",
        )
        .bind(crate::common::OtherNameId::new())
        .bind(person_id)
        .bind(&other_name.name)
        .bind(&other_name.note)
        .execute(&mut *tx)
        .await?;
    }

    // Rebuild candidacies and not-standing assertions
    sqlx::query("DELETE FROM memberships WHERE person_id = $1")
        .bind(person_id)
        .execute(&mut *tx)
        .await?;
    sqlx::query("DELETE FROM person_not_standing WHERE person_id = $1")
        .bind(person_id)
        .execute(&mut *tx)
        .await?;

    for (election_slug, entry) in &data.standing_in {
        let election =
            sqlx::query_as::<_, Election>("SELECT * FROM elections WHERE slug = $1")
                .bind(election_slug)
                .fetch_optional(&mut *tx)
                .await?;

        match entry {
            Some(standing) => {
                let election = election
                    .ok_or_else(|| PersonError::UnknownElection(election_slug.clone()))?;

                let ballot_id: Option<crate::common::BallotId> = sqlx::query_scalar(
                    "SELECT b.id FROM ballots b
                     JOIN posts po ON po.id = b.post_id
                     WHERE b.election_id = $1 AND po.slug = $2",
                )
                .bind(election.id)
                .bind(&standing.post_slug)
                .fetch_optional(&mut *tx)
                .await?;
                let ballot_id = ballot_id.ok_or_else(|| PersonError::UnknownBallot {
                    election_slug: election_slug.clone(),
                    post_slug: standing.post_slug.clone(),
                })?;

                let party = data
                    .party_memberships
                    .get(election_slug)
                    .ok_or_else(|| PersonError::MissingPartyMembership(election_slug.clone()))?;
                let party_id: Option<crate::common::PartyId> =
                    sqlx::query_scalar("SELECT id FROM parties WHERE ec_id = $1")
                        .bind(&party.ec_id)
                        .fetch_optional(&mut *tx)
                        .await?;
                let party_id =
                    party_id.ok_or_else(|| PersonError::UnknownParty(party.ec_id.clone()))?;

                sqlx::query(
                    "INSERT INTO memberships (id, person_id, ballot_id, party_id, elected)
                     VALUES ($1, $2, $3, $4, $5)",
                )
                .bind(MembershipId::new())
                .bind(person_id)
                .bind(ballot_id)
                .bind(party_id)
                .bind(standing.elected)
                .execute(&mut *tx)
                .await?;
            }
            None => {
                // Not-standing assertions for elections this database never
                // had (they can arrive in imported histories) are dropped.
                if let Some(election) = election {
                    sqlx::query(
                        "INSERT INTO person_not_standing (person_id, election_id)
                         VALUES ($1, $2)
                         ON CONFLICT DO NOTHING",
                    )
                    .bind(person_id)
                    .bind(election.id)
                    .execute(&mut *tx)
                    .await?;
                }
            }
        }
    }

    let source = format!("Reverted to version {}", version_id);
    let snapshot = person.version_data_on(&mut tx).await.map_err(db_err)?;
    let meta = ChangeMetadata::new(username, &source, EditAction::Revert);
    let mut versions = person.versions.0.clone();
    let new_version_id = record_version(&mut versions, &meta, snapshot)?;
    if let Some(new_version_id) = &new_version_id {
        person.versions = Json(versions);
        person.save_versions(&mut tx).await.map_err(db_err)?;
        LoggedAction::record(
            username,
            ActionType::PersonRevert,
            Some(person_id),
            None,
            &source,
            Some(new_version_id),
            &mut *tx,
        )
        .await
        .map_err(db_err)?;
    }

    tx.commit().await?;

    info!(person = %person_id, version = version_id, by = username, "person reverted");
    Ok(new_version_id)
}

/// Delete a person outright.
///
/// Refused while candidacies still reference them; a merge (which moves
/// the candidacies first) is the supported way to get rid of a duplicate.
pub async fn delete_person(person_id: PersonId, pool: &PgPool) -> Result<(), PersonError> {
    let mut tx = pool.begin().await?;

    load_person_for_update(person_id, &mut tx).await?;
    let memberships: i64 =
        sqlx::query_scalar("SELECT COUNT(*) FROM memberships WHERE person_id = $1")
            .bind(person_id)
            .fetch_one(&mut *tx)
            .await?;
    if memberships > 0 {
        return Err(PersonError::UnsafeToDelete {
            person: person_id,
            memberships,
        });
    }

    sqlx::query("DELETE FROM people WHERE id = $1")
        .bind(person_id)
        .execute(&mut *tx)
        .await?;

    tx.commit().await?;
    Ok(())
}

/// Shared tail for the small mutations: snapshot, record, save, log.
async fn record_snapshot_and_log(
    person: &mut Person,
    username: &str,
    information_source: &str,
    action_type: ActionType,
    tx: &mut Transaction<'_, Postgres>,
) -> Result<Option<String>, PersonError> {
    let data = person.version_data_on(tx).await.map_err(db_err)?;
    let meta = ChangeMetadata::new(username, information_source, EditAction::Edit);
    let mut versions = person.versions.0.clone();
    let version_id = record_version(&mut versions, &meta, data)?;
    if let Some(version_id) = &version_id {
        person.versions = Json(versions);
        person.save_versions(tx).await.map_err(db_err)?;
        LoggedAction::record(
            username,
            action_type,
            Some(person.id),
            None,
            information_source,
            Some(version_id),
            &mut **tx,
        )
        .await
        .map_err(db_err)?;
    }
    Ok(version_id)
}

/// Collapse anyhow-wrapped sqlx failures from model helpers into the
/// typed database variant.
fn db_err(err: anyhow::Error) -> PersonError {
    match err.downcast::<sqlx::Error>() {
        Ok(db) => PersonError::Database(db),
        Err(other) => PersonError::Database(sqlx::Error::Protocol(other.to_string())),
    }
}
