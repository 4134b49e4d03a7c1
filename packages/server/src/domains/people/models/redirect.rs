use anyhow::Result;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use std::collections::HashSet;

use crate::common::PersonId;

/// PersonRedirect model - old person id to new person id, written by merges.
///
/// Lookups follow chains: after merging A into B and then B into C, A
/// resolves to C.
#[derive(sqlx::FromRow, Debug, Clone)]
pub struct PersonRedirect {
    pub old_person_id: PersonId,
    pub new_person_id: PersonId,
    pub created_at: DateTime<Utc>,
}

impl PersonRedirect {
    pub async fn find(old_person_id: PersonId, pool: &PgPool) -> Result<Option<Self>> {
        sqlx::query_as::<_, Self>(
            "SELECT * FROM person_redirects WHERE old_person_id = $1",
        )
        .bind(old_person_id)
        .fetch_optional(pool)
        .await
        .map_err(Into::into)
    }

    /// Follow the redirect chain from an old id to its final target.
    ///
    /// Returns `None` when no redirect exists for the id. A visited set
    /// guards against a cyclic chain, which would indicate corrupt data;
    /// resolution stops at the last id seen before the repeat.
    pub async fn resolve(old_person_id: PersonId, pool: &PgPool) -> Result<Option<PersonId>> {
        let mut seen: HashSet<PersonId> = HashSet::new();
        seen.insert(old_person_id);

        let mut current = match Self::find(old_person_id, pool).await? {
            Some(redirect) => redirect.new_person_id,
            None => return Ok(None),
        };

        while let Some(redirect) = Self::find(current, pool).await? {
            if !seen.insert(redirect.new_person_id) {
                tracing::warn!(
                    start = %old_person_id,
                    at = %redirect.new_person_id,
                    "redirect chain contains a cycle"
                );
                break;
            }
            current = redirect.new_person_id;
        }

        Ok(Some(current))
    }

    /// All old ids that currently resolve to this person, for export
    /// tooling that wants to advertise previous ids.
    pub async fn olds_for(new_person_id: PersonId, pool: &PgPool) -> Result<Vec<PersonId>> {
        sqlx::query_scalar(
            "SELECT old_person_id FROM person_redirects WHERE new_person_id = $1",
        )
        .bind(new_person_id)
        .fetch_all(pool)
        .await
        .map_err(Into::into)
    }
}
