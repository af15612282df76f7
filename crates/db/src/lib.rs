//! PostgreSQL bootstrap for the content store.
//!
//! Provides `init_db_pool` for creating a connection pool and applying the
//! SQL migrations that create the content tables.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use app_config::AppConfig;
use deadpool_postgres::{Manager, ManagerConfig, Pool, RecyclingMethod, Runtime};
use tokio::fs;
use tokio_postgres::{Client, Config as PgConfig, NoTls};
use tracing::{debug, info};

const LEDGER_DDL: &str = "CREATE TABLE IF NOT EXISTS projector_migrations (
    name TEXT PRIMARY KEY,
    applied_at TIMESTAMPTZ NOT NULL DEFAULT now()
)";

/// Initializes the database connection pool and runs migrations.
///
/// # Errors
/// Returns an error if the pool cannot be created or migrations fail.
pub async fn init_db_pool(cfg: &AppConfig) -> Result<Pool> {
    let pg_config: PgConfig = cfg
        .database_dsn()
        .parse()
        .context("Failed to parse Postgres DSN")?;

    let mgr = Manager::from_config(
        pg_config,
        NoTls,
        ManagerConfig {
            recycling_method: RecyclingMethod::Fast,
        },
    );
    let pool = Pool::builder(mgr)
        .max_size(cfg.db_pool_size)
        .runtime(Runtime::Tokio1)
        .build()
        .context("Failed to create database pool")?;

    let mut client = pool
        .get()
        .await
        .context("Failed to get DB connection for migrations")?;
    let applied = run_migrations(&mut client, Path::new(&cfg.migrations_dir)).await?;
    info!(applied, pool_size = cfg.db_pool_size, "Database ready");

    Ok(pool)
}

/// `.sql` files of `dir`, sorted by file name.
pub async fn migration_files(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut entries = fs::read_dir(dir)
        .await
        .with_context(|| format!("Failed to read migrations directory {}", dir.display()))?;

    let mut paths = Vec::new();
    while let Some(entry) = entries.next_entry().await? {
        let path = entry.path();
        if path.extension().is_some_and(|ext| ext == "sql") {
            paths.push(path);
        }
    }
    paths.sort();
    Ok(paths)
}

/// Applies every migration of `dir` not yet recorded in the ledger table.
///
/// Each file runs in its own transaction together with its ledger entry.
/// Returns how many files were applied.
///
/// # Errors
/// Returns an error if migration files cannot be read or applied.
pub async fn run_migrations(client: &mut Client, dir: &Path) -> Result<usize> {
    client
        .batch_execute(LEDGER_DDL)
        .await
        .context("Failed to create migrations ledger")?;

    let mut applied = 0;
    for path in migration_files(dir).await? {
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .with_context(|| format!("Migration path {} has no file name", path.display()))?;

        let done = client
            .query_opt("SELECT 1 FROM projector_migrations WHERE name = $1", &[&name])
            .await?
            .is_some();
        if done {
            debug!(migration = %name, "Migration already applied");
            continue;
        }

        info!(migration = %name, "Applying migration");
        let content = fs::read_to_string(&path)
            .await
            .with_context(|| format!("Failed to read migration file {name}"))?;

        let tx = client.transaction().await?;
        tx.batch_execute(&content)
            .await
            .with_context(|| format!("Failed to execute migration {name}"))?;
        tx.execute("INSERT INTO projector_migrations (name) VALUES ($1)", &[&name])
            .await?;
        tx.commit()
            .await
            .with_context(|| format!("Failed to commit migration {name}"))?;
        applied += 1;
    }
    Ok(applied)
}
