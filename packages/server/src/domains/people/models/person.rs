use anyhow::Result;
use chrono::{DateTime, Utc};
use sqlx::types::Json;
use sqlx::{PgConnection, PgPool};

use crate::common::{ElectionId, PersonId};
use crate::domains::people::versions::{
    OtherNameData, StandingInData, Version, VersionData,
};

use super::identifier::PersonIdentifier;
use super::other_name::OtherName;
use super::redirect::PersonRedirect;

/// Edit limitations that can be placed on a person record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EditLimitation {
    NeedsReview,
    EditsPrevented,
}

impl EditLimitation {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::NeedsReview => "needs-review",
            Self::EditsPrevented => "edits-prevented",
        }
    }
}

/// Person model - SQL persistence layer
///
/// A real person, alive or dead. Biographical dates are approximate-date
/// strings (`YYYY[-MM[-DD]]`, empty when unknown). The `versions` column
/// holds the append-only edit history, newest first.
#[derive(sqlx::FromRow, Debug, Clone)]
pub struct Person {
    pub id: PersonId,
    pub name: String,
    pub honorific_prefix: String,
    pub honorific_suffix: String,
    pub gender: String,
    pub birth_date: String,
    pub death_date: String,
    pub summary: String,
    pub biography: String,
    pub favourite_biscuit: String,
    pub edit_limitations: String,
    pub versions: Json<Vec<Version>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// One row of the candidacy join used to build version snapshots.
#[derive(sqlx::FromRow, Debug, Clone)]
pub struct CandidacySnapshotRow {
    pub election_slug: String,
    pub post_slug: String,
    pub post_label: String,
    pub party_ec_id: String,
    pub party_name: String,
    pub elected: Option<bool>,
}

const CANDIDACY_SNAPSHOT_SQL: &str = "SELECT e.slug AS election_slug,
            po.slug AS post_slug,
            po.label AS post_label,
            pa.ec_id AS party_ec_id,
            pa.name AS party_name,
            m.elected
     FROM memberships m
     JOIN ballots b ON b.id = m.ballot_id
     JOIN elections e ON e.id = b.election_id
     JOIN posts po ON po.id = b.post_id
     JOIN parties pa ON pa.id = m.party_id
     WHERE m.person_id = $1";

impl Person {
    pub async fn find_by_id(id: PersonId, pool: &PgPool) -> Result<Option<Self>> {
        sqlx::query_as::<_, Self>("SELECT * FROM people WHERE id = $1")
            .bind(id)
            .fetch_optional(pool)
            .await
            .map_err(Into::into)
    }

    /// Find a person, falling back to the redirect table when the id
    /// belongs to a record that has since been merged away.
    pub async fn find_by_id_with_redirects(
        id: PersonId,
        pool: &PgPool,
    ) -> Result<Option<Self>> {
        if let Some(person) = Self::find_by_id(id, pool).await? {
            return Ok(Some(person));
        }
        match PersonRedirect::resolve(id, pool).await? {
            Some(new_id) => Self::find_by_id(new_id, pool).await,
            None => Ok(None),
        }
    }

    pub async fn count(pool: &PgPool) -> Result<i64> {
        sqlx::query_scalar("SELECT COUNT(*) FROM people")
            .fetch_one(pool)
            .await
            .map_err(Into::into)
    }

    /// Elections this person is asserted not to be standing in
    pub async fn not_standing_slugs(&self, pool: &PgPool) -> Result<Vec<String>> {
        sqlx::query_scalar(
            "SELECT e.slug FROM person_not_standing ns
             JOIN elections e ON e.id = ns.election_id
             WHERE ns.person_id = $1
             ORDER BY e.slug",
        )
        .bind(self.id)
        .fetch_all(pool)
        .await
        .map_err(Into::into)
    }

    pub async fn is_not_standing_in(
        &self,
        election_id: ElectionId,
        pool: &PgPool,
    ) -> Result<bool> {
        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM person_not_standing
             WHERE person_id = $1 AND election_id = $2",
        )
        .bind(self.id)
        .bind(election_id)
        .fetch_one(pool)
        .await?;
        Ok(count > 0)
    }

    /// Whether edits by ordinary users are currently allowed
    pub fn user_can_edit(&self) -> bool {
        self.edit_limitations != EditLimitation::EditsPrevented.as_str()
    }

    pub fn liable_to_vandalism(&self) -> bool {
        self.edit_limitations == EditLimitation::NeedsReview.as_str()
    }

    /// Serialize the person's current editable state into snapshot data.
    pub async fn as_version_data(&self, pool: &PgPool) -> Result<VersionData> {
        let mut conn = pool.acquire().await?;
        self.version_data_on(&mut conn).await
    }

    /// Snapshot builder over an explicit connection, so callers inside a
    /// transaction see their own uncommitted changes.
    pub async fn version_data_on(&self, conn: &mut PgConnection) -> Result<VersionData> {
        let identifiers = sqlx::query_as::<_, PersonIdentifier>(
            "SELECT * FROM person_identifiers WHERE person_id = $1",
        )
        .bind(self.id)
        .fetch_all(&mut *conn)
        .await?;

        let other_names = sqlx::query_as::<_, OtherName>(
            "SELECT * FROM other_names WHERE person_id = $1 ORDER BY name",
        )
        .bind(self.id)
        .fetch_all(&mut *conn)
        .await?;

        let candidacies = sqlx::query_as::<_, CandidacySnapshotRow>(CANDIDACY_SNAPSHOT_SQL)
            .bind(self.id)
            .fetch_all(&mut *conn)
            .await?;

        let not_standing: Vec<String> = sqlx::query_scalar(
            "SELECT e.slug FROM person_not_standing ns
             JOIN elections e ON e.id = ns.election_id
             WHERE ns.person_id = $1",
        )
        .bind(self.id)
        .fetch_all(&mut *conn)
        .await?;

        Ok(build_version_data(
            self,
            &identifiers,
            &other_names,
            &candidacies,
            &not_standing,
        ))
    }

    /// Persist the in-memory version history.
    pub async fn save_versions(&self, conn: &mut PgConnection) -> Result<()> {
        sqlx::query("UPDATE people SET versions = $2, updated_at = now() WHERE id = $1")
            .bind(self.id)
            .bind(&self.versions)
            .execute(conn)
            .await?;
        Ok(())
    }
}

/// Assemble snapshot data from a person row and its related rows.
///
/// Only editable identifier types are included; bot-managed identifiers
/// don't belong in the user-facing history. Not-standing assertions appear
/// as `None` entries in `standing_in`.
pub fn build_version_data(
    person: &Person,
    identifiers: &[PersonIdentifier],
    other_names: &[OtherName],
    candidacies: &[CandidacySnapshotRow],
    not_standing_slugs: &[String],
) -> VersionData {
    let mut data = VersionData {
        id: person.id,
        name: person.name.clone(),
        honorific_prefix: person.honorific_prefix.clone(),
        honorific_suffix: person.honorific_suffix.clone(),
        gender: person.gender.clone(),
        birth_date: person.birth_date.clone(),
        death_date: person.death_date.clone(),
        summary: person.summary.clone(),
        biography: person.biography.clone(),
        favourite_biscuit: person.favourite_biscuit.clone(),
        other_names: other_names
            .iter()
            .map(|n| OtherNameData {
                name: n.name.clone(),
                note: n.note.clone(),
            })
            .collect(),
        identifiers: Default::default(),
        standing_in: Default::default(),
        party_memberships: Default::default(),
    };

    for identifier in identifiers {
        if PersonIdentifier::is_editable_value_type(&identifier.value_type) {
            data.identifiers
                .insert(identifier.value_type.clone(), identifier.value.clone());
        }
    }

    for row in candidacies {
        data.standing_in.insert(
            row.election_slug.clone(),
            Some(StandingInData {
                post_slug: row.post_slug.clone(),
                post_label: row.post_label.clone(),
                elected: row.elected,
            }),
        );
        data.party_memberships.insert(
            row.election_slug.clone(),
            crate::domains::people::versions::PartyData {
                ec_id: row.party_ec_id.clone(),
                name: row.party_name.clone(),
            },
        );
    }

    for slug in not_standing_slugs {
        data.standing_in.entry(slug.clone()).or_insert(None);
    }

    data
}
