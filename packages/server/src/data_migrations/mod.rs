//! Data migration framework for surgical database transformations
//!
//! Data migrations are different from schema migrations (sqlx):
//! - Schema migrations change the database structure
//! - Data migrations transform data within existing structures
//!
//! A migration reports an estimate, pages through work items by id cursor,
//! transforms one item at a time, and verifies completion afterwards. The
//! optional `prepare` hook runs once before the batches, for the row-level
//! groundwork a migration needs (e.g. renaming election rows before
//! rewriting version payloads). Dry-run mode reports what would happen
//! without touching anything.

pub mod canonicalize_election_slugs;

pub use canonicalize_election_slugs::CanonicalizeElectionSlugs;

use anyhow::Result;
use async_trait::async_trait;
use sqlx::PgPool;
use tracing::{debug, error, info};
use uuid::Uuid;

/// Shared context passed to migration hooks.
pub struct MigrationContext {
    pub db: PgPool,
    pub dry_run: bool,
}

/// Outcome of migrating a single item.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MigrationResult {
    Migrated,
    WouldMigrate,
    Skipped(String),
}

/// Outcome of the post-run verification pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VerifyResult {
    Complete,
    Incomplete { remaining: i64 },
}

#[async_trait]
pub trait DataMigration: Send + Sync {
    fn name(&self) -> &'static str;

    fn description(&self) -> &'static str;

    /// One-off groundwork before batching starts. Must respect
    /// `ctx.dry_run`.
    async fn prepare(&self, _ctx: &MigrationContext) -> Result<()> {
        Ok(())
    }

    /// How many items still need migrating.
    async fn estimate(&self, db: &PgPool) -> Result<i64>;

    /// Item ids after `cursor`, ordered by id for stable paging.
    async fn find_work(
        &self,
        cursor: Option<Uuid>,
        limit: i64,
        db: &PgPool,
    ) -> Result<Vec<Uuid>>;

    async fn execute_one(&self, id: Uuid, ctx: &MigrationContext) -> Result<MigrationResult>;

    /// Check nothing was left behind.
    async fn verify(&self, db: &PgPool) -> Result<VerifyResult>;
}

/// All registered migrations.
pub fn all_migrations() -> Vec<Box<dyn DataMigration>> {
    vec![Box::new(CanonicalizeElectionSlugs)]
}

pub fn find_migration(name: &str) -> Option<Box<dyn DataMigration>> {
    all_migrations()
        .into_iter()
        .find(|migration| migration.name() == name)
}

/// Totals from a migration run.
#[derive(Debug, Default, Clone, serde::Serialize)]
pub struct RunSummary {
    pub migrated: u64,
    pub would_migrate: u64,
    pub skipped: u64,
    pub failed: u64,
}

/// Run a migration to completion in id-ordered batches.
///
/// Individual item failures are logged and counted rather than aborting
/// the run; the verify step is how completeness gets judged.
pub async fn run_migration(
    migration: &dyn DataMigration,
    ctx: &MigrationContext,
    batch_size: i64,
) -> Result<RunSummary> {
    info!(
        migration = migration.name(),
        dry_run = ctx.dry_run,
        "starting data migration"
    );

    migration.prepare(ctx).await?;

    let mut summary = RunSummary::default();
    let mut cursor: Option<Uuid> = None;

    loop {
        let batch = migration.find_work(cursor, batch_size, &ctx.db).await?;
        let Some(last) = batch.last().copied() else {
            break;
        };
        cursor = Some(last);

        for id in batch {
            match migration.execute_one(id, ctx).await {
                Ok(MigrationResult::Migrated) => summary.migrated += 1,
                Ok(MigrationResult::WouldMigrate) => summary.would_migrate += 1,
                Ok(MigrationResult::Skipped(reason)) => {
                    debug!(migration = migration.name(), %id, reason, "item skipped");
                    summary.skipped += 1;
                }
                Err(err) => {
                    error!(migration = migration.name(), %id, %err, "item failed");
                    summary.failed += 1;
                }
            }
        }
    }

    info!(
        migration = migration.name(),
        migrated = summary.migrated,
        would_migrate = summary.would_migrate,
        skipped = summary.skipped,
        failed = summary.failed,
        "data migration finished"
    );
    Ok(summary)
}
