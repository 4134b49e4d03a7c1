//! Management CLI for the candidate register.
//!
//! Data-migration plumbing plus the operator-level person tools (merge,
//! redirect resolution). Output is JSON so scripts can drive it.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use register_core::config::Config;
use register_core::data_migrations::{
    find_migration, all_migrations, run_migration, MigrationContext, RunSummary, VerifyResult,
};
use register_core::domains::people::merge::{
    merge_people, parse_person_id, MergeError, MergeReport, MergeRequest,
};
use register_core::domains::people::models::{Person, PersonRedirect};
use serde::Serialize;
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "manage_cli")]
#[command(about = "Candidate register management CLI")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List all registered data migrations
    List,

    /// Estimate items a data migration still has to process
    Estimate { name: String },

    /// Run a data migration to completion
    Run {
        name: String,
        #[arg(long)]
        dry_run: bool,
        #[arg(long, default_value_t = 500)]
        batch_size: i64,
    },

    /// Verify a data migration left nothing behind
    Verify { name: String },

    /// Merge two person records
    Merge {
        /// The two person ids; the older id wins unless --winner is given
        person_a: String,
        person_b: String,
        #[arg(long)]
        winner: Option<String>,
        #[arg(long, default_value = "manage_cli")]
        user: String,
        /// Resolve a not-standing conflict by removing the assertion
        #[arg(long)]
        remove_conflicting_not_standing: bool,
    },

    /// Resolve a person id through the redirect table
    Resolve { id: String },
}

// ============================================================================
// JSON Response Types
// ============================================================================

#[derive(Serialize)]
struct Response {
    success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    count: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    migrations: Option<Vec<MigrationInfo>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    summary: Option<RunSummary>,
    #[serde(skip_serializing_if = "Option::is_none")]
    merge: Option<MergeReport>,
    #[serde(skip_serializing_if = "Option::is_none")]
    person_id: Option<String>,
}

#[derive(Serialize)]
struct MigrationInfo {
    name: String,
    description: String,
}

impl Response {
    fn ok() -> Self {
        Self {
            success: true,
            message: None,
            count: None,
            migrations: None,
            summary: None,
            merge: None,
            person_id: None,
        }
    }

    fn error(message: String) -> Self {
        Self {
            message: Some(message),
            success: false,
            ..Self::ok()
        }
    }

    fn print(&self) {
        match serde_json::to_string_pretty(self) {
            Ok(json) => println!("{}", json),
            Err(err) => eprintln!("failed to serialize response: {}", err),
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "warn,register_core=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();

    let config = Config::from_env().context("Failed to load configuration")?;
    let pool = PgPoolOptions::new()
        .max_connections(config.database_max_connections)
        .connect(&config.database_url)
        .await
        .context("Failed to connect to database")?;

    sqlx::migrate!("./migrations")
        .run(&pool)
        .await
        .context("Failed to run migrations")?;

    let response = match cli.command {
        Commands::List => list_migrations(),
        Commands::Estimate { name } => estimate(&name, &pool).await,
        Commands::Run {
            name,
            dry_run,
            batch_size,
        } => run(&name, dry_run, batch_size, pool.clone()).await,
        Commands::Verify { name } => verify(&name, &pool).await,
        Commands::Merge {
            person_a,
            person_b,
            winner,
            user,
            remove_conflicting_not_standing,
        } => {
            merge(
                &person_a,
                &person_b,
                winner.as_deref(),
                &user,
                remove_conflicting_not_standing,
                &pool,
            )
            .await
        }
        Commands::Resolve { id } => resolve(&id, &pool).await,
    };

    let success = response.success;
    response.print();
    if !success {
        std::process::exit(1);
    }
    Ok(())
}

fn list_migrations() -> Response {
    Response {
        migrations: Some(
            all_migrations()
                .iter()
                .map(|migration| MigrationInfo {
                    name: migration.name().to_string(),
                    description: migration.description().to_string(),
                })
                .collect(),
        ),
        ..Response::ok()
    }
}

async fn estimate(name: &str, pool: &PgPool) -> Response {
    let Some(migration) = find_migration(name) else {
        return Response::error(format!("unknown migration '{}'", name));
    };
    match migration.estimate(pool).await {
        Ok(count) => Response {
            count: Some(count),
            ..Response::ok()
        },
        Err(err) => Response::error(err.to_string()),
    }
}

async fn run(name: &str, dry_run: bool, batch_size: i64, db: PgPool) -> Response {
    let Some(migration) = find_migration(name) else {
        return Response::error(format!("unknown migration '{}'", name));
    };
    let ctx = MigrationContext { db, dry_run };
    match run_migration(migration.as_ref(), &ctx, batch_size).await {
        Ok(summary) => Response {
            summary: Some(summary),
            ..Response::ok()
        },
        Err(err) => Response::error(err.to_string()),
    }
}

async fn verify(name: &str, pool: &PgPool) -> Response {
    let Some(migration) = find_migration(name) else {
        return Response::error(format!("unknown migration '{}'", name));
    };
    match migration.verify(pool).await {
        Ok(VerifyResult::Complete) => Response {
            message: Some("complete".to_string()),
            ..Response::ok()
        },
        Ok(VerifyResult::Incomplete { remaining }) => Response {
            count: Some(remaining),
            ..Response::error("incomplete".to_string())
        },
        Err(err) => Response::error(err.to_string()),
    }
}

async fn merge(
    person_a: &str,
    person_b: &str,
    winner: Option<&str>,
    user: &str,
    remove_conflicting_not_standing: bool,
    pool: &PgPool,
) -> Response {
    let request = match build_merge_request(
        person_a,
        person_b,
        winner,
        user,
        remove_conflicting_not_standing,
    ) {
        Ok(request) => request,
        Err(err) => return Response::error(err.to_string()),
    };

    match merge_people(&request, pool).await {
        Ok(report) => Response {
            message: Some(format!(
                "merged {} into {}",
                request.loser, request.winner
            )),
            merge: Some(report),
            ..Response::ok()
        },
        Err(err) => Response::error(err.to_string()),
    }
}

fn build_merge_request(
    person_a: &str,
    person_b: &str,
    winner: Option<&str>,
    user: &str,
    remove_conflicting_not_standing: bool,
) -> Result<MergeRequest, MergeError> {
    let a = parse_person_id(person_a)?;
    let b = parse_person_id(person_b)?;

    // Ids are time-ordered, so "older record wins" is just min()
    let winner = match winner {
        Some(value) => parse_person_id(value)?,
        None => a.min(b),
    };
    let loser = if winner == a { b } else { a };

    Ok(MergeRequest {
        winner,
        loser,
        username: user.to_string(),
        remove_conflicting_not_standing,
    })
}

async fn resolve(id: &str, pool: &PgPool) -> Response {
    let person_id = match parse_person_id(id) {
        Ok(person_id) => person_id,
        Err(err) => return Response::error(err.to_string()),
    };

    match Person::find_by_id_with_redirects(person_id, pool).await {
        Ok(Some(person)) => Response {
            person_id: Some(person.id.to_string()),
            message: Some(person.name),
            ..Response::ok()
        },
        Ok(None) => {
            // Distinguish "never existed" from "redirect points nowhere"
            match PersonRedirect::find(person_id, pool).await {
                Ok(Some(_)) => Response::error(format!(
                    "redirect for {} points at a missing person",
                    person_id
                )),
                _ => Response::error(format!("no person found for id {}", person_id)),
            }
        }
        Err(err) => Response::error(err.to_string()),
    }
}
