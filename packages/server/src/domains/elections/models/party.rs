use anyhow::Result;
use chrono::{DateTime, Utc};
use sqlx::PgPool;

use crate::common::PartyId;

/// Party model - SQL persistence layer
///
/// `ec_id` is the registration identifier issued by the electoral
/// commission ("PP53"); it is what version payloads reference.
#[derive(sqlx::FromRow, Debug, Clone)]
pub struct Party {
    pub id: PartyId,
    pub ec_id: String,
    pub name: String,
    pub created_at: DateTime<Utc>,
}

impl Party {
    pub async fn create(ec_id: &str, name: &str, pool: &PgPool) -> Result<Self> {
        sqlx::query_as::<_, Self>(
            "INSERT INTO parties (id, ec_id, name)
             VALUES ($1, $2, $3)
             RETURNING *",
        )
        .bind(PartyId::new())
        .bind(ec_id)
        .bind(name)
        .fetch_one(pool)
        .await
        .map_err(Into::into)
    }

    pub async fn find_by_id(id: PartyId, pool: &PgPool) -> Result<Self> {
        sqlx::query_as::<_, Self>("SELECT * FROM parties WHERE id = $1")
            .bind(id)
            .fetch_one(pool)
            .await
            .map_err(Into::into)
    }

    pub async fn find_by_ec_id(ec_id: &str, pool: &PgPool) -> Result<Option<Self>> {
        sqlx::query_as::<_, Self>("SELECT * FROM parties WHERE ec_id = $1")
            .bind(ec_id)
            .fetch_optional(pool)
            .await
            .map_err(Into::into)
    }
}
