use anyhow::Result;
use chrono::{DateTime, Utc};
use sqlx::PgPool;

use crate::common::PostId;

/// Post model - a position that exists independent of the person holding it
/// ("Member of Parliament for Dulwich and West Norwood").
///
/// Posts are unique per (slug, organization); the same ward slug can exist
/// under two different councils.
#[derive(sqlx::FromRow, Debug, Clone)]
pub struct Post {
    pub id: PostId,
    pub slug: String,
    pub label: String,
    pub organization: String,
    pub created_at: DateTime<Utc>,
}

impl Post {
    pub async fn create(
        slug: &str,
        label: &str,
        organization: &str,
        pool: &PgPool,
    ) -> Result<Self> {
        sqlx::query_as::<_, Self>(
            "INSERT INTO posts (id, slug, label, organization)
             VALUES ($1, $2, $3, $4)
             RETURNING *",
        )
        .bind(PostId::new())
        .bind(slug)
        .bind(label)
        .bind(organization)
        .fetch_one(pool)
        .await
        .map_err(Into::into)
    }

    pub async fn find_by_id(id: PostId, pool: &PgPool) -> Result<Self> {
        sqlx::query_as::<_, Self>("SELECT * FROM posts WHERE id = $1")
            .bind(id)
            .fetch_one(pool)
            .await
            .map_err(Into::into)
    }

    pub async fn find_by_slug(
        slug: &str,
        organization: &str,
        pool: &PgPool,
    ) -> Result<Option<Self>> {
        sqlx::query_as::<_, Self>(
            "SELECT * FROM posts WHERE slug = $1 AND organization = $2",
        )
        .bind(slug)
        .bind(organization)
        .fetch_optional(pool)
        .await
        .map_err(Into::into)
    }
}
