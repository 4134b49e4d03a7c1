use anyhow::Result;
use chrono::{DateTime, NaiveDate, Utc};
use sqlx::PgPool;

use crate::common::ElectionId;

/// Election model - SQL persistence layer
///
/// The slug is the stable public identifier ("parl.2015-05-07"); legacy
/// slugs that were later renamed live on in person version payloads and in
/// the election_slug_moves table.
#[derive(sqlx::FromRow, Debug, Clone)]
pub struct Election {
    pub id: ElectionId,
    pub slug: String,
    pub name: String,
    pub election_date: NaiveDate,
    pub current: bool,
    pub created_at: DateTime<Utc>,
}

impl Election {
    pub async fn create(
        slug: &str,
        name: &str,
        election_date: NaiveDate,
        current: bool,
        pool: &PgPool,
    ) -> Result<Self> {
        sqlx::query_as::<_, Self>(
            "INSERT INTO elections (id, slug, name, election_date, current)
             VALUES ($1, $2, $3, $4, $5)
             RETURNING *",
        )
        .bind(ElectionId::new())
        .bind(slug)
        .bind(name)
        .bind(election_date)
        .bind(current)
        .fetch_one(pool)
        .await
        .map_err(Into::into)
    }

    pub async fn find_by_id(id: ElectionId, pool: &PgPool) -> Result<Self> {
        sqlx::query_as::<_, Self>("SELECT * FROM elections WHERE id = $1")
            .bind(id)
            .fetch_one(pool)
            .await
            .map_err(Into::into)
    }

    pub async fn find_by_slug(slug: &str, pool: &PgPool) -> Result<Option<Self>> {
        sqlx::query_as::<_, Self>("SELECT * FROM elections WHERE slug = $1")
            .bind(slug)
            .fetch_optional(pool)
            .await
            .map_err(Into::into)
    }

    /// All elections flagged as current, soonest polling day first
    pub async fn find_current(pool: &PgPool) -> Result<Vec<Self>> {
        sqlx::query_as::<_, Self>(
            "SELECT * FROM elections WHERE current = true ORDER BY election_date ASC",
        )
        .fetch_all(pool)
        .await
        .map_err(Into::into)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_election_struct() {
        let election = Election {
            id: ElectionId::new(),
            slug: "parl.2015-05-07".to_string(),
            name: "2015 General Election".to_string(),
            election_date: NaiveDate::from_ymd_opt(2015, 5, 7).unwrap(),
            current: true,
            created_at: Utc::now(),
        };

        assert!(election.current);
    }
}
