//! Rename legacy election slugs to their canonical replacements.
//!
//! The `election_slug_moves` table holds (old_slug, new_slug) pairs seeded
//! by operators. The prepare step fixes up the election rows themselves:
//! when the canonical election already exists, ballots and not-standing
//! assertions are re-pointed at it and the legacy row is deleted (refusing
//! if dependent rows would be left dangling); otherwise the legacy row is
//! simply renamed. The batched part then rewrites every person version
//! payload that still references a legacy slug.
//!
//! A legacy slug can survive only inside version payloads when the
//! election row itself never existed in this database; that's expected for
//! histories imported from elsewhere, and the rewrite handles it the same
//! way.

use anyhow::{bail, Result};
use async_trait::async_trait;
use sqlx::types::Json;
use sqlx::PgPool;
use tracing::info;
use uuid::Uuid;

use crate::common::PersonId;
use crate::domains::elections::models::Election;
use crate::domains::people::models::Person;
use crate::domains::people::versions::move_election_slug;

use super::{DataMigration, MigrationContext, MigrationResult, VerifyResult};

pub struct CanonicalizeElectionSlugs;

#[derive(sqlx::FromRow, Debug, Clone)]
struct SlugMove {
    old_slug: String,
    new_slug: String,
}

async fn load_moves(db: &PgPool) -> Result<Vec<SlugMove>> {
    sqlx::query_as::<_, SlugMove>(
        "SELECT old_slug, new_slug FROM election_slug_moves ORDER BY old_slug",
    )
    .fetch_all(db)
    .await
    .map_err(Into::into)
}

const PEOPLE_WITH_LEGACY_SLUGS: &str = "SELECT 1 FROM election_slug_moves m
     WHERE p.versions::text LIKE '%\"' || m.old_slug || '\"%'";

#[async_trait]
impl DataMigration for CanonicalizeElectionSlugs {
    fn name(&self) -> &'static str {
        "canonicalize_election_slugs"
    }

    fn description(&self) -> &'static str {
        "Rename legacy election slugs and rewrite person version payloads"
    }

    async fn prepare(&self, ctx: &MigrationContext) -> Result<()> {
        if ctx.dry_run {
            return Ok(());
        }

        for slug_move in load_moves(&ctx.db).await? {
            let mut tx = ctx.db.begin().await?;

            let source = sqlx::query_as::<_, Election>(
                "SELECT * FROM elections WHERE slug = $1 FOR UPDATE",
            )
            .bind(&slug_move.old_slug)
            .fetch_optional(&mut *tx)
            .await?;
            // The legacy slug may only live inside version payloads; then
            // there's no row to fix up and the batch phase does the rest.
            let Some(source) = source else {
                continue;
            };

            let dest = sqlx::query_as::<_, Election>(
                "SELECT * FROM elections WHERE slug = $1 FOR UPDATE",
            )
            .bind(&slug_move.new_slug)
            .fetch_optional(&mut *tx)
            .await?;

            match dest {
                Some(dest) => {
                    let conflicting: i64 = sqlx::query_scalar(
                        "SELECT COUNT(*) FROM ballots src
                         JOIN ballots dst
                           ON dst.post_id = src.post_id AND dst.election_id = $2
                         WHERE src.election_id = $1",
                    )
                    .bind(source.id)
                    .bind(dest.id)
                    .fetch_one(&mut *tx)
                    .await?;
                    if conflicting > 0 {
                        bail!(
                            "can't merge election {} into {}: {} ballots exist under both",
                            slug_move.old_slug,
                            slug_move.new_slug,
                            conflicting
                        );
                    }

                    sqlx::query("UPDATE ballots SET election_id = $2 WHERE election_id = $1")
                        .bind(source.id)
                        .bind(dest.id)
                        .execute(&mut *tx)
                        .await?;

                    sqlx::query(
                        "INSERT INTO person_not_standing (person_id, election_id)
                         SELECT person_id, $2 FROM person_not_standing
                         WHERE election_id = $1
                         ON CONFLICT DO NOTHING",
                    )
                    .bind(source.id)
                    .bind(dest.id)
                    .execute(&mut *tx)
                    .await?;
                    sqlx::query("DELETE FROM person_not_standing WHERE election_id = $1")
                        .bind(source.id)
                        .execute(&mut *tx)
                        .await?;

                    sqlx::query("DELETE FROM elections WHERE id = $1")
                        .bind(source.id)
                        .execute(&mut *tx)
                        .await?;

                    info!(
                        old = %slug_move.old_slug,
                        new = %slug_move.new_slug,
                        "merged legacy election row into canonical one"
                    );
                }
                None => {
                    sqlx::query("UPDATE elections SET slug = $2 WHERE id = $1")
                        .bind(source.id)
                        .bind(&slug_move.new_slug)
                        .execute(&mut *tx)
                        .await?;

                    info!(
                        old = %slug_move.old_slug,
                        new = %slug_move.new_slug,
                        "renamed election slug"
                    );
                }
            }

            tx.commit().await?;
        }

        Ok(())
    }

    async fn estimate(&self, db: &PgPool) -> Result<i64> {
        sqlx::query_scalar(&format!(
            "SELECT COUNT(*) FROM people p WHERE EXISTS ({})",
            PEOPLE_WITH_LEGACY_SLUGS
        ))
        .fetch_one(db)
        .await
        .map_err(Into::into)
    }

    async fn find_work(
        &self,
        cursor: Option<Uuid>,
        limit: i64,
        db: &PgPool,
    ) -> Result<Vec<Uuid>> {
        sqlx::query_scalar(&format!(
            "SELECT p.id FROM people p
             WHERE EXISTS ({})
               AND ($1::uuid IS NULL OR p.id > $1)
             ORDER BY p.id
             LIMIT $2",
            PEOPLE_WITH_LEGACY_SLUGS
        ))
        .bind(cursor)
        .bind(limit)
        .fetch_all(db)
        .await
        .map_err(Into::into)
    }

    async fn execute_one(&self, id: Uuid, ctx: &MigrationContext) -> Result<MigrationResult> {
        if ctx.dry_run {
            return Ok(MigrationResult::WouldMigrate);
        }

        let person_id = PersonId::from_uuid(id);
        let moves = load_moves(&ctx.db).await?;

        let mut tx = ctx.db.begin().await?;
        let Some(person) = sqlx::query_as::<_, Person>(
            "SELECT * FROM people WHERE id = $1 FOR UPDATE",
        )
        .bind(person_id)
        .fetch_optional(&mut *tx)
        .await?
        else {
            return Ok(MigrationResult::Skipped("person no longer exists".into()));
        };

        let mut versions = person.versions.0.clone();
        let mut changed = false;
        for slug_move in &moves {
            changed |= move_election_slug(
                person_id,
                &mut versions,
                &slug_move.old_slug,
                &slug_move.new_slug,
            )?;
        }
        if !changed {
            return Ok(MigrationResult::Skipped("no legacy slugs present".into()));
        }

        sqlx::query("UPDATE people SET versions = $2, updated_at = now() WHERE id = $1")
            .bind(person_id)
            .bind(Json(&versions))
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;

        Ok(MigrationResult::Migrated)
    }

    async fn verify(&self, db: &PgPool) -> Result<VerifyResult> {
        let remaining = self.estimate(db).await?;
        if remaining == 0 {
            Ok(VerifyResult::Complete)
        } else {
            Ok(VerifyResult::Incomplete { remaining })
        }
    }
}
