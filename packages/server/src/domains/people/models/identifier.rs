use anyhow::Result;
use chrono::{DateTime, Utc};
use serde_json::Value;
use sqlx::types::Json;
use sqlx::PgPool;

use crate::common::{IdentifierId, PersonId};

/// The identifier types users can manage through the edit form.
///
/// The version history currently stores one value per value_type, which is
/// why (person, value_type) is unique; see the table constraints.
pub const EDITABLE_VALUE_TYPES: &[&str] = &[
    "email",
    "facebook_page_url",
    "facebook_personal_url",
    "homepage_url",
    "blog_url",
    "instagram_url",
    "linkedin_url",
    "party_ppc_page_url",
    "twitter_username",
    "wikipedia_url",
    "wikidata_id",
    "youtube_profile",
];

/// PersonIdentifier model - typed key/value identifiers for a person.
///
/// The simplest case is a URL to another website; a value does not have to
/// be resolvable over HTTP (a phone number or a handle are both fine).
/// `internal_identifier` holds a third party's own id for the same thing,
/// e.g. a numeric account id behind a vanity username.
#[derive(sqlx::FromRow, Debug, Clone)]
pub struct PersonIdentifier {
    pub id: IdentifierId,
    pub person_id: PersonId,
    pub value: String,
    pub internal_identifier: Option<String>,
    pub value_type: String,
    pub extra_data: Option<Json<Value>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl PersonIdentifier {
    pub fn is_editable_value_type(value_type: &str) -> bool {
        EDITABLE_VALUE_TYPES.contains(&value_type)
    }

    pub async fn create(
        person_id: PersonId,
        value: &str,
        value_type: &str,
        internal_identifier: Option<&str>,
        pool: &PgPool,
    ) -> Result<Self> {
        sqlx::query_as::<_, Self>(
            "INSERT INTO person_identifiers
                (id, person_id, value, value_type, internal_identifier)
             VALUES ($1, $2, $3, $4, $5)
             RETURNING *",
        )
        .bind(IdentifierId::new())
        .bind(person_id)
        .bind(value)
        .bind(value_type)
        .bind(internal_identifier)
        .fetch_one(pool)
        .await
        .map_err(Into::into)
    }

    pub async fn for_person(person_id: PersonId, pool: &PgPool) -> Result<Vec<Self>> {
        sqlx::query_as::<_, Self>(
            "SELECT * FROM person_identifiers
             WHERE person_id = $1
             ORDER BY value_type, updated_at DESC",
        )
        .bind(person_id)
        .fetch_all(pool)
        .await
        .map_err(Into::into)
    }

    pub async fn find_of_type(
        person_id: PersonId,
        value_type: &str,
        pool: &PgPool,
    ) -> Result<Option<Self>> {
        sqlx::query_as::<_, Self>(
            "SELECT * FROM person_identifiers
             WHERE person_id = $1 AND value_type = $2",
        )
        .bind(person_id)
        .bind(value_type)
        .fetch_optional(pool)
        .await
        .map_err(Into::into)
    }

    /// The value for a single identifier type, if set ("what's their
    /// twitter username?")
    pub async fn value_of_type(
        person_id: PersonId,
        value_type: &str,
        pool: &PgPool,
    ) -> Result<Option<String>> {
        Ok(Self::find_of_type(person_id, value_type, pool)
            .await?
            .map(|identifier| identifier.value))
    }

    pub async fn delete(id: IdentifierId, pool: &PgPool) -> Result<()> {
        sqlx::query("DELETE FROM person_identifiers WHERE id = $1")
            .bind(id)
            .execute(pool)
            .await?;
        Ok(())
    }
}
