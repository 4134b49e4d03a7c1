//! Merging duplicate person records.
//!
//! The winner keeps its id; everything the loser had (candidacies,
//! identifiers, images, other names, edit history) moves across, a
//! redirect is written from the loser's id to the winner's, and the loser
//! row is deleted. The whole operation is one transaction: it either
//! completes or leaves both records untouched.

use sqlx::types::Json;
use sqlx::PgPool;
use thiserror::Error;
use tracing::{info, warn};

use crate::common::{BallotId, ElectionId, PersonId};
use crate::domains::audit::{ActionType, LoggedAction};
use crate::domains::people::versions::{
    interleave_versions, move_election_slug, record_version, ChangeMetadata, EditAction,
    VersionError,
};

use super::models::Person;

#[derive(Error, Debug)]
pub enum MergeError {
    #[error("you can't merge a person ({0}) with themself ({0})")]
    SelfMerge(PersonId),
    #[error("Malformed person ID '{0}'")]
    MalformedId(String),
    #[error("person {0} not found")]
    PersonNotFound(PersonId),
    #[error(
        "merging would give {person} a candidacy in \"{election_slug}\", \
         but that election is in their not-standing list"
    )]
    NotStandingConflict {
        person: PersonId,
        election_slug: String,
    },
    #[error(transparent)]
    Version(#[from] VersionError),
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

/// Parse a user-supplied person id, as typed into the merge form.
pub fn parse_person_id(value: &str) -> Result<PersonId, MergeError> {
    PersonId::parse(value.trim()).map_err(|_| MergeError::MalformedId(value.to_string()))
}

#[derive(Debug, Clone)]
pub struct MergeRequest {
    pub winner: PersonId,
    pub loser: PersonId,
    pub username: String,
    /// When the loser (or winner) carries a not-standing assertion that
    /// contradicts a transferred candidacy, remove the assertion instead of
    /// failing. This is the explicit conflict-resolution step; it is never
    /// assumed.
    pub remove_conflicting_not_standing: bool,
}

/// What a completed merge did, for display and logging.
#[derive(Debug, Clone, Default, serde::Serialize)]
pub struct MergeReport {
    pub version_id: String,
    pub moved_memberships: u32,
    pub skipped_duplicate_ballots: Vec<String>,
    pub moved_identifiers: u32,
    pub skipped_identifiers: Vec<String>,
    pub moved_images: u64,
    pub filled_fields: Vec<&'static str>,
}

#[derive(sqlx::FromRow, Debug)]
struct MembershipTransferRow {
    id: crate::common::MembershipId,
    ballot_id: BallotId,
    ballot_paper_id: String,
    election_id: ElectionId,
    election_slug: String,
}

#[derive(sqlx::FromRow, Debug)]
struct NotStandingRow {
    election_id: ElectionId,
    election_slug: String,
}

/// Merge the loser person into the winner.
pub async fn merge_people(
    request: &MergeRequest,
    pool: &PgPool,
) -> Result<MergeReport, MergeError> {
    if request.winner == request.loser {
        return Err(MergeError::SelfMerge(request.winner));
    }

    let mut tx = pool.begin().await?;

    // Lock both rows in id order so two concurrent merges can't deadlock
    let first_id = request.winner.min(request.loser);
    let second_id = request.winner.max(request.loser);
    let first_person =
        sqlx::query_as::<_, Person>("SELECT * FROM people WHERE id = $1 FOR UPDATE")
            .bind(first_id)
            .fetch_optional(&mut *tx)
            .await?
            .ok_or(MergeError::PersonNotFound(first_id))?;
    let second_person =
        sqlx::query_as::<_, Person>("SELECT * FROM people WHERE id = $1 FOR UPDATE")
            .bind(second_id)
            .fetch_optional(&mut *tx)
            .await?
            .ok_or(MergeError::PersonNotFound(second_id))?;
    let (mut winner, loser) = if first_person.id == request.winner {
        (first_person, second_person)
    } else {
        (second_person, first_person)
    };

    let mut report = MergeReport::default();

    // --- Candidacies ---------------------------------------------------

    let loser_memberships = sqlx::query_as::<_, MembershipTransferRow>(
        "SELECT m.id, m.ballot_id, b.ballot_paper_id, b.election_id, e.slug AS election_slug
         FROM memberships m
         JOIN ballots b ON b.id = m.ballot_id
         JOIN elections e ON e.id = b.election_id
         WHERE m.person_id = $1",
    )
    .bind(loser.id)
    .fetch_all(&mut *tx)
    .await?;

    let winner_ballots: Vec<BallotId> =
        sqlx::query_scalar("SELECT ballot_id FROM memberships WHERE person_id = $1")
            .bind(winner.id)
            .fetch_all(&mut *tx)
            .await?;

    let winner_not_standing = sqlx::query_as::<_, NotStandingRow>(
        "SELECT ns.election_id, e.slug AS election_slug
         FROM person_not_standing ns
         JOIN elections e ON e.id = ns.election_id
         WHERE ns.person_id = $1",
    )
    .bind(winner.id)
    .fetch_all(&mut *tx)
    .await?;

    for membership in &loser_memberships {
        if winner_ballots.contains(&membership.ballot_id) {
            // The winner already stands on this ballot; the loser's row is
            // the duplicate and goes away with the merge.
            warn!(
                winner = %winner.id,
                loser = %loser.id,
                ballot = %membership.ballot_paper_id,
                "both people stand on the same ballot; keeping the winner's candidacy"
            );
            sqlx::query("DELETE FROM memberships WHERE id = $1")
                .bind(membership.id)
                .execute(&mut *tx)
                .await?;
            report
                .skipped_duplicate_ballots
                .push(membership.ballot_paper_id.clone());
            continue;
        }

        if winner_not_standing
            .iter()
            .any(|ns| ns.election_id == membership.election_id)
        {
            if !request.remove_conflicting_not_standing {
                return Err(MergeError::NotStandingConflict {
                    person: winner.id,
                    election_slug: membership.election_slug.clone(),
                });
            }
            sqlx::query(
                "DELETE FROM person_not_standing
                 WHERE person_id = $1 AND election_id = $2",
            )
            .bind(winner.id)
            .bind(membership.election_id)
            .execute(&mut *tx)
            .await?;
        }

        sqlx::query("UPDATE memberships SET person_id = $2 WHERE id = $1")
            .bind(membership.id)
            .bind(winner.id)
            .execute(&mut *tx)
            .await?;
        report.moved_memberships += 1;
    }

    // --- Not-standing assertions ---------------------------------------

    let winner_elections: Vec<ElectionId> = sqlx::query_scalar(
        "SELECT DISTINCT b.election_id
         FROM memberships m
         JOIN ballots b ON b.id = m.ballot_id
         WHERE m.person_id = $1",
    )
    .bind(winner.id)
    .fetch_all(&mut *tx)
    .await?;

    let loser_not_standing = sqlx::query_as::<_, NotStandingRow>(
        "SELECT ns.election_id, e.slug AS election_slug
         FROM person_not_standing ns
         JOIN elections e ON e.id = ns.election_id
         WHERE ns.person_id = $1",
    )
    .bind(loser.id)
    .fetch_all(&mut *tx)
    .await?;

    for assertion in &loser_not_standing {
        if winner_elections.contains(&assertion.election_id) {
            if !request.remove_conflicting_not_standing {
                return Err(MergeError::NotStandingConflict {
                    person: loser.id,
                    election_slug: assertion.election_slug.clone(),
                });
            }
            // The assertion loses; the winner demonstrably stands there.
            continue;
        }
        sqlx::query(
            "INSERT INTO person_not_standing (person_id, election_id)
             VALUES ($1, $2)
             ON CONFLICT DO NOTHING",
        )
        .bind(winner.id)
        .bind(assertion.election_id)
        .execute(&mut *tx)
        .await?;
    }

    // --- Identifiers ----------------------------------------------------

    #[derive(sqlx::FromRow)]
    struct IdentifierRow {
        id: crate::common::IdentifierId,
        value: String,
        value_type: String,
    }

    let winner_identifiers = sqlx::query_as::<_, IdentifierRow>(
        "SELECT id, value, value_type FROM person_identifiers WHERE person_id = $1",
    )
    .bind(winner.id)
    .fetch_all(&mut *tx)
    .await?;
    let loser_identifiers = sqlx::query_as::<_, IdentifierRow>(
        "SELECT id, value, value_type FROM person_identifiers WHERE person_id = $1",
    )
    .bind(loser.id)
    .fetch_all(&mut *tx)
    .await?;

    for identifier in &loser_identifiers {
        let clashes = winner_identifiers.iter().any(|existing| {
            existing.value == identifier.value || existing.value_type == identifier.value_type
        });
        if clashes {
            sqlx::query("DELETE FROM person_identifiers WHERE id = $1")
                .bind(identifier.id)
                .execute(&mut *tx)
                .await?;
            report
                .skipped_identifiers
                .push(format!("{}: {}", identifier.value_type, identifier.value));
            continue;
        }
        sqlx::query("UPDATE person_identifiers SET person_id = $2 WHERE id = $1")
            .bind(identifier.id)
            .bind(winner.id)
            .execute(&mut *tx)
            .await?;
        report.moved_identifiers += 1;
    }

    // --- Images ----------------------------------------------------------

    let winner_has_primary: i64 = sqlx::query_scalar(
        "SELECT COUNT(*) FROM person_images WHERE person_id = $1 AND is_primary = true",
    )
    .bind(winner.id)
    .fetch_one(&mut *tx)
    .await?;

    let moved_images = if winner_has_primary > 0 {
        // The winner's primary image stays primary; the loser's images come
        // across demoted.
        sqlx::query(
            "UPDATE person_images SET person_id = $2, is_primary = false WHERE person_id = $1",
        )
        .bind(loser.id)
        .bind(winner.id)
        .execute(&mut *tx)
        .await?
    } else {
        sqlx::query("UPDATE person_images SET person_id = $2 WHERE person_id = $1")
            .bind(loser.id)
            .bind(winner.id)
            .execute(&mut *tx)
            .await?
    };
    report.moved_images = moved_images.rows_affected();

    // --- Other names ------------------------------------------------------

    let winner_other_names: Vec<String> =
        sqlx::query_scalar("SELECT name FROM other_names WHERE person_id = $1")
            .bind(winner.id)
            .fetch_all(&mut *tx)
            .await?;

    #[derive(sqlx::FromRow)]
    struct OtherNameRow {
        id: crate::common::OtherNameId,
        name: String,
    }
    let loser_other_names = sqlx::query_as::<_, OtherNameRow>(
        "SELECT id, name FROM other_names WHERE person_id = $1",
    )
    .bind(loser.id)
    .fetch_all(&mut *tx)
    .await?;

    for other_name in &loser_other_names {
        if other_name.name == winner.name || winner_other_names.contains(&other_name.name) {
            sqlx::query("DELETE FROM other_names WHERE id = $1")
                .bind(other_name.id)
                .execute(&mut *tx)
                .await?;
        } else {
            sqlx::query("UPDATE other_names SET person_id = $2 WHERE id = $1")
                .bind(other_name.id)
                .bind(winner.id)
                .execute(&mut *tx)
                .await?;
        }
    }

    // The loser's primary name is worth keeping as an alternate
    if loser.name != winner.name
        && !winner_other_names.contains(&loser.name)
        && !loser_other_names.iter().any(|n| n.name == loser.name)
    {
        sqlx::query(
            "INSERT INTO other_names (id, person_id, name, note)
             VALUES ($1, $2, $3, $4)
             ON CONFLICT (person_id, name) DO NOTHING",
        )
        .bind(crate::common::OtherNameId::new())
        .bind(winner.id)
        .bind(&loser.name)
        .bind(format!("Added when merging person {}", loser.id))
        .execute(&mut *tx)
        .await?;
    }

    // --- Biographical fields ---------------------------------------------

    {
        let mut fill = |field: &'static str, target: &mut String, source: &String| {
            if target.is_empty() && !source.is_empty() {
                *target = source.clone();
                report.filled_fields.push(field);
            }
        };
        fill("honorific_prefix", &mut winner.honorific_prefix, &loser.honorific_prefix);
        fill("honorific_suffix", &mut winner.honorific_suffix, &loser.honorific_suffix);
        fill("gender", &mut winner.gender, &loser.gender);
        fill("birth_date", &mut winner.birth_date, &loser.birth_date);
        fill("death_date", &mut winner.death_date, &loser.death_date);
        fill("summary", &mut winner.summary, &loser.summary);
        fill("biography", &mut winner.biography, &loser.biography);
        fill(
            "favourite_biscuit",
            &mut winner.favourite_biscuit,
            &loser.favourite_biscuit,
        );
    }

    sqlx::query(
        "UPDATE people
         SET honorific_prefix = $2, honorific_suffix = $3, gender = $4,
             birth_date = $5, death_date = $6, summary = $7, biography = $8,
             favourite_biscuit = $9, updated_at = now()
         WHERE id = $1",
    )
    .bind(winner.id)
    .bind(&winner.honorific_prefix)
    .bind(&winner.honorific_suffix)
    .bind(&winner.gender)
    .bind(&winner.birth_date)
    .bind(&winner.death_date)
    .bind(&winner.summary)
    .bind(&winner.biography)
    .bind(&winner.favourite_biscuit)
    .execute(&mut *tx)
    .await?;

    // --- History, redirect, deletion -------------------------------------

    // The loser's logged actions must keep appearing in recent changes
    sqlx::query("UPDATE logged_actions SET person_id = $2 WHERE person_id = $1")
        .bind(loser.id)
        .bind(winner.id)
        .execute(&mut *tx)
        .await?;

    let mut combined =
        interleave_versions(winner.versions.0.clone(), loser.versions.0.clone());

    #[derive(sqlx::FromRow)]
    struct SlugMove {
        old_slug: String,
        new_slug: String,
    }
    let slug_moves = sqlx::query_as::<_, SlugMove>(
        "SELECT old_slug, new_slug FROM election_slug_moves",
    )
    .fetch_all(&mut *tx)
    .await?;
    for slug_move in &slug_moves {
        move_election_slug(winner.id, &mut combined, &slug_move.old_slug, &slug_move.new_slug)?;
    }

    sqlx::query("DELETE FROM people WHERE id = $1")
        .bind(loser.id)
        .execute(&mut *tx)
        .await?;

    let information_source = format!("After merging person {}", loser.id);
    let snapshot = winner.version_data_on(&mut tx).await.map_err(db_err)?;
    let meta = ChangeMetadata::new(&request.username, &information_source, EditAction::Merge);
    let version_id = record_version(&mut combined, &meta, snapshot)?
        .expect("merge snapshots are always recorded");
    report.version_id = version_id.clone();

    winner.versions = Json(combined);
    sqlx::query("UPDATE people SET versions = $2, updated_at = now() WHERE id = $1")
        .bind(winner.id)
        .bind(&winner.versions)
        .execute(&mut *tx)
        .await?;

    sqlx::query(
        "INSERT INTO person_redirects (old_person_id, new_person_id)
         VALUES ($1, $2)",
    )
    .bind(loser.id)
    .bind(winner.id)
    .execute(&mut *tx)
    .await?;

    LoggedAction::record(
        &request.username,
        ActionType::PersonMerge,
        Some(winner.id),
        None,
        &information_source,
        Some(&version_id),
        &mut *tx,
    )
    .await
    .map_err(db_err)?;

    tx.commit().await?;

    info!(
        winner = %winner.id,
        loser = %loser.id,
        moved_memberships = report.moved_memberships,
        by = %request.username,
        "people merged"
    );

    Ok(report)
}

/// Collapse anyhow-wrapped sqlx failures from model helpers into the
/// typed database variant.
fn db_err(err: anyhow::Error) -> MergeError {
    match err.downcast::<sqlx::Error>() {
        Ok(db) => MergeError::Database(db),
        Err(other) => MergeError::Database(sqlx::Error::Protocol(other.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_person_id_rejects_garbage() {
        let err = parse_person_id("foobar").unwrap_err();
        assert_eq!(err.to_string(), "Malformed person ID 'foobar'");
    }

    #[test]
    fn parse_person_id_accepts_uuids() {
        let id = PersonId::new();
        assert_eq!(parse_person_id(&id.to_string()).unwrap(), id);
    }
}
