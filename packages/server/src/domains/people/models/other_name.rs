use anyhow::Result;
use chrono::{DateTime, Utc};
use sqlx::PgPool;

use crate::common::{OtherNameId, PersonId};

/// OtherName model - an alternate or former name.
///
/// Unique per (person, name); the note says where it came from ("Birth
/// name", "Added when merging person ...").
#[derive(sqlx::FromRow, Debug, Clone)]
pub struct OtherName {
    pub id: OtherNameId,
    pub person_id: PersonId,
    pub name: String,
    pub note: String,
    pub created_at: DateTime<Utc>,
}

impl OtherName {
    pub async fn create(
        person_id: PersonId,
        name: &str,
        note: &str,
        pool: &PgPool,
    ) -> Result<Self> {
        sqlx::query_as::<_, Self>(
            "INSERT INTO other_names (id, person_id, name, note)
             VALUES ($1, $2, $3, $4)
             RETURNING *",
        )
        .bind(OtherNameId::new())
        .bind(person_id)
        .bind(name)
        .bind(note)
        .fetch_one(pool)
        .await
        .map_err(Into::into)
    }

    pub async fn for_person(person_id: PersonId, pool: &PgPool) -> Result<Vec<Self>> {
        sqlx::query_as::<_, Self>(
            "SELECT * FROM other_names WHERE person_id = $1 ORDER BY name",
        )
        .bind(person_id)
        .fetch_all(pool)
        .await
        .map_err(Into::into)
    }

    pub async fn delete(id: OtherNameId, pool: &PgPool) -> Result<()> {
        sqlx::query("DELETE FROM other_names WHERE id = $1")
            .bind(id)
            .execute(pool)
            .await?;
        Ok(())
    }
}
