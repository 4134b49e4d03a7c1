use anyhow::Result;
use chrono::{DateTime, Utc};
use sqlx::PgPool;

use crate::common::{BallotId, ElectionId, PostId};

/// Ballot model - a specific post contested in a specific election.
///
/// `ballot_paper_id` is the human-facing identifier in the
/// "parl.65808.2015-05-07" shape. Candidacy edits on a locked ballot are
/// rejected; a cancelled ballot is one where the poll will not take place.
#[derive(sqlx::FromRow, Debug, Clone)]
pub struct Ballot {
    pub id: BallotId,
    pub ballot_paper_id: String,
    pub election_id: ElectionId,
    pub post_id: PostId,
    pub locked: bool,
    pub cancelled: bool,
    pub created_at: DateTime<Utc>,
}

impl Ballot {
    pub async fn create(
        ballot_paper_id: &str,
        election_id: ElectionId,
        post_id: PostId,
        pool: &PgPool,
    ) -> Result<Self> {
        sqlx::query_as::<_, Self>(
            "INSERT INTO ballots (id, ballot_paper_id, election_id, post_id)
             VALUES ($1, $2, $3, $4)
             RETURNING *",
        )
        .bind(BallotId::new())
        .bind(ballot_paper_id)
        .bind(election_id)
        .bind(post_id)
        .fetch_one(pool)
        .await
        .map_err(Into::into)
    }

    pub async fn find_by_id(id: BallotId, pool: &PgPool) -> Result<Self> {
        sqlx::query_as::<_, Self>("SELECT * FROM ballots WHERE id = $1")
            .bind(id)
            .fetch_one(pool)
            .await
            .map_err(Into::into)
    }

    pub async fn find_by_paper_id(
        ballot_paper_id: &str,
        pool: &PgPool,
    ) -> Result<Option<Self>> {
        sqlx::query_as::<_, Self>("SELECT * FROM ballots WHERE ballot_paper_id = $1")
            .bind(ballot_paper_id)
            .fetch_optional(pool)
            .await
            .map_err(Into::into)
    }

    /// The ballot for a (election, post) pair, if one exists
    pub async fn find_for_election_post(
        election_id: ElectionId,
        post_id: PostId,
        pool: &PgPool,
    ) -> Result<Option<Self>> {
        sqlx::query_as::<_, Self>(
            "SELECT * FROM ballots WHERE election_id = $1 AND post_id = $2",
        )
        .bind(election_id)
        .bind(post_id)
        .fetch_optional(pool)
        .await
        .map_err(Into::into)
    }

    pub async fn set_cancelled(id: BallotId, cancelled: bool, pool: &PgPool) -> Result<Self> {
        sqlx::query_as::<_, Self>(
            "UPDATE ballots SET cancelled = $2 WHERE id = $1 RETURNING *",
        )
        .bind(id)
        .bind(cancelled)
        .fetch_one(pool)
        .await
        .map_err(Into::into)
    }
}
