use anyhow::Result;
use chrono::{DateTime, Utc};
use sqlx::{PgPool, Postgres};
use std::fmt;

use crate::common::{BallotId, LoggedActionId, PersonId};

/// What kind of edit a LoggedAction records.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActionType {
    PersonCreate,
    PersonUpdate,
    PersonMerge,
    PersonRevert,
    CandidacyCreate,
    CandidacyDelete,
    BallotLock,
    BallotUnlock,
}

impl ActionType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::PersonCreate => "person-create",
            Self::PersonUpdate => "person-update",
            Self::PersonMerge => "person-merge",
            Self::PersonRevert => "person-revert",
            Self::CandidacyCreate => "candidacy-create",
            Self::CandidacyDelete => "candidacy-delete",
            Self::BallotLock => "ballot-lock",
            Self::BallotUnlock => "ballot-unlock",
        }
    }
}

impl fmt::Display for ActionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// LoggedAction model - one row per user-visible edit.
///
/// Person references survive merges: the merge operation re-points the
/// loser's actions at the winner so the recent-changes feed keeps showing
/// every edit.
#[derive(sqlx::FromRow, Debug, Clone)]
pub struct LoggedAction {
    pub id: LoggedActionId,
    pub username: String,
    pub action_type: String,
    pub person_id: Option<PersonId>,
    pub ballot_id: Option<BallotId>,
    pub source: String,
    pub version_id: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl LoggedAction {
    /// Insert a logged action. Takes any Postgres executor so callers can
    /// log inside their own transaction.
    pub async fn record<'e, E>(
        username: &str,
        action_type: ActionType,
        person_id: Option<PersonId>,
        ballot_id: Option<BallotId>,
        source: &str,
        version_id: Option<&str>,
        executor: E,
    ) -> Result<Self>
    where
        E: sqlx::Executor<'e, Database = Postgres>,
    {
        sqlx::query_as::<_, Self>(
            "INSERT INTO logged_actions
                (id, username, action_type, person_id, ballot_id, source, version_id)
             VALUES ($1, $2, $3, $4, $5, $6, $7)
             RETURNING *",
        )
        .bind(LoggedActionId::new())
        .bind(username)
        .bind(action_type.as_str())
        .bind(person_id)
        .bind(ballot_id)
        .bind(source)
        .bind(version_id)
        .fetch_one(executor)
        .await
        .map_err(Into::into)
    }

    /// Most recent actions first (the "recent changes" feed)
    pub async fn recent(limit: i64, pool: &PgPool) -> Result<Vec<Self>> {
        sqlx::query_as::<_, Self>(
            "SELECT * FROM logged_actions ORDER BY created_at DESC, id DESC LIMIT $1",
        )
        .bind(limit)
        .fetch_all(pool)
        .await
        .map_err(Into::into)
    }

    pub async fn for_person(person_id: PersonId, pool: &PgPool) -> Result<Vec<Self>> {
        sqlx::query_as::<_, Self>(
            "SELECT * FROM logged_actions
             WHERE person_id = $1
             ORDER BY created_at DESC, id DESC",
        )
        .bind(person_id)
        .fetch_all(pool)
        .await
        .map_err(Into::into)
    }

    pub async fn count(pool: &PgPool) -> Result<i64> {
        sqlx::query_scalar("SELECT COUNT(*) FROM logged_actions")
            .fetch_one(pool)
            .await
            .map_err(Into::into)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn action_type_strings_are_stable() {
        assert_eq!(ActionType::PersonMerge.as_str(), "person-merge");
        assert_eq!(ActionType::CandidacyDelete.to_string(), "candidacy-delete");
    }
}
