use anyhow::Result;
use chrono::{DateTime, Utc};
use sqlx::PgPool;

use crate::common::{BallotId, ElectionId, MembershipId, PartyId, PersonId};

/// Membership model - a person's candidacy for a ballot.
///
/// Unique per (person, ballot). `elected` is tri-state: `None` until a
/// result is recorded. Insertion goes through the candidacy actions, which
/// enforce the ballot-lock and not-standing invariants; the raw model
/// methods here assume those checks already happened.
#[derive(sqlx::FromRow, Debug, Clone)]
pub struct Membership {
    pub id: MembershipId,
    pub person_id: PersonId,
    pub ballot_id: BallotId,
    pub party_id: PartyId,
    pub elected: Option<bool>,
    pub party_list_position: Option<i32>,
    pub created_at: DateTime<Utc>,
}

impl Membership {
    pub async fn find_by_id(id: MembershipId, pool: &PgPool) -> Result<Option<Self>> {
        sqlx::query_as::<_, Self>("SELECT * FROM memberships WHERE id = $1")
            .bind(id)
            .fetch_optional(pool)
            .await
            .map_err(Into::into)
    }

    pub async fn for_person(person_id: PersonId, pool: &PgPool) -> Result<Vec<Self>> {
        sqlx::query_as::<_, Self>(
            "SELECT * FROM memberships WHERE person_id = $1 ORDER BY created_at",
        )
        .bind(person_id)
        .fetch_all(pool)
        .await
        .map_err(Into::into)
    }

    pub async fn for_ballot(ballot_id: BallotId, pool: &PgPool) -> Result<Vec<Self>> {
        sqlx::query_as::<_, Self>(
            "SELECT m.* FROM memberships m
             JOIN parties pa ON pa.id = m.party_id
             WHERE m.ballot_id = $1
             ORDER BY pa.name, m.party_list_position",
        )
        .bind(ballot_id)
        .fetch_all(pool)
        .await
        .map_err(Into::into)
    }

    pub async fn find_for_person_ballot(
        person_id: PersonId,
        ballot_id: BallotId,
        pool: &PgPool,
    ) -> Result<Option<Self>> {
        sqlx::query_as::<_, Self>(
            "SELECT * FROM memberships WHERE person_id = $1 AND ballot_id = $2",
        )
        .bind(person_id)
        .bind(ballot_id)
        .fetch_optional(pool)
        .await
        .map_err(Into::into)
    }

    /// Whether the person already has a candidacy anywhere in an election
    pub async fn exists_in_election(
        person_id: PersonId,
        election_id: ElectionId,
        pool: &PgPool,
    ) -> Result<bool> {
        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM memberships m
             JOIN ballots b ON b.id = m.ballot_id
             WHERE m.person_id = $1 AND b.election_id = $2",
        )
        .bind(person_id)
        .bind(election_id)
        .fetch_one(pool)
        .await?;
        Ok(count > 0)
    }

    pub async fn count(pool: &PgPool) -> Result<i64> {
        sqlx::query_scalar("SELECT COUNT(*) FROM memberships")
            .fetch_one(pool)
            .await
            .map_err(Into::into)
    }

    /// Record whether this candidacy won its ballot
    pub async fn set_elected(
        id: MembershipId,
        elected: Option<bool>,
        pool: &PgPool,
    ) -> Result<Self> {
        sqlx::query_as::<_, Self>(
            "UPDATE memberships SET elected = $2 WHERE id = $1 RETURNING *",
        )
        .bind(id)
        .bind(elected)
        .fetch_one(pool)
        .await
        .map_err(Into::into)
    }
}
