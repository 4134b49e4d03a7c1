//! Ballot lock management.
//!
//! Locking happens once the nomination papers for a ballot have been
//! confirmed; from then on candidacy edits are rejected until an unlock.

use anyhow::Result;
use sqlx::PgPool;
use tracing::info;

use crate::common::BallotId;
use crate::domains::audit::{ActionType, LoggedAction};

use super::models::Ballot;

pub async fn lock_ballot(
    ballot_id: BallotId,
    username: &str,
    source: &str,
    pool: &PgPool,
) -> Result<Ballot> {
    set_locked(ballot_id, true, username, source, pool).await
}

pub async fn unlock_ballot(
    ballot_id: BallotId,
    username: &str,
    source: &str,
    pool: &PgPool,
) -> Result<Ballot> {
    set_locked(ballot_id, false, username, source, pool).await
}

async fn set_locked(
    ballot_id: BallotId,
    locked: bool,
    username: &str,
    source: &str,
    pool: &PgPool,
) -> Result<Ballot> {
    let mut tx = pool.begin().await?;

    let ballot = sqlx::query_as::<_, Ballot>(
        "UPDATE ballots SET locked = $2 WHERE id = $1 RETURNING *",
    )
    .bind(ballot_id)
    .bind(locked)
    .fetch_one(&mut *tx)
    .await?;

    let action_type = if locked {
        ActionType::BallotLock
    } else {
        ActionType::BallotUnlock
    };
    LoggedAction::record(
        username,
        action_type,
        None,
        Some(ballot.id),
        source,
        None,
        &mut *tx,
    )
    .await?;

    tx.commit().await?;

    info!(
        ballot = %ballot.ballot_paper_id,
        locked,
        by = username,
        "ballot lock state changed"
    );

    Ok(ballot)
}
