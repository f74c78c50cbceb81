use anyhow::Result;
use async_trait::async_trait;
use sqlx::postgres::{PgConnectOptions, PgPoolOptions};
use sqlx::{Connection, PgConnection, PgPool, Postgres, Transaction};
use tracing::{debug, info, warn};

use crate::config::DatabaseConfig;
use crate::models::rows::{ContributorRow, PullRequestRow, StargazerRow, TrafficKind, TrafficRow};
use crate::store::RecordStore;

/// SQLSTATE for "database does not exist".
const INVALID_CATALOG_NAME: &str = "3D000";
const MAINTENANCE_DATABASE: &str = "postgres";

const SCHEMA: [&str; 5] = [
    r#"
    CREATE TABLE IF NOT EXISTS traffic_views (
        id          BIGSERIAL PRIMARY KEY,
        repo_owner  TEXT NOT NULL,
        repo_name   TEXT NOT NULL,
        forked_from TEXT,
        timestamp   TIMESTAMP NOT NULL,
        count       BIGINT NOT NULL,
        uniques     BIGINT NOT NULL,
        fetched_at  TIMESTAMPTZ NOT NULL DEFAULT now()
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS traffic_clones (
        id          BIGSERIAL PRIMARY KEY,
        repo_owner  TEXT NOT NULL,
        repo_name   TEXT NOT NULL,
        forked_from TEXT,
        timestamp   TIMESTAMP NOT NULL,
        count       BIGINT NOT NULL,
        uniques     BIGINT NOT NULL,
        fetched_at  TIMESTAMPTZ NOT NULL DEFAULT now()
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS stargazers (
        id          BIGSERIAL PRIMARY KEY,
        repo_owner  TEXT NOT NULL,
        repo_name   TEXT NOT NULL,
        forked_from TEXT,
        user_login  TEXT NOT NULL,
        user_id     BIGINT,
        node_id     TEXT,
        avatar_url  TEXT,
        html_url    TEXT,
        user_type   TEXT,
        site_admin  BOOLEAN,
        starred_at  TIMESTAMP NOT NULL,
        fetched_at  TIMESTAMPTZ NOT NULL DEFAULT now()
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS pull_requests (
        id          BIGSERIAL PRIMARY KEY,
        repo_owner  TEXT NOT NULL,
        repo_name   TEXT NOT NULL,
        forked_from TEXT,
        number      BIGINT NOT NULL,
        title       TEXT,
        state       TEXT,
        created_at  TIMESTAMP,
        updated_at  TIMESTAMP,
        closed_at   TIMESTAMP,
        merged_at   TIMESTAMP,
        user_login  TEXT,
        user_id     BIGINT,
        html_url    TEXT,
        fetched_at  TIMESTAMPTZ NOT NULL DEFAULT now()
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS contributors (
        id               BIGSERIAL PRIMARY KEY,
        repo_owner       TEXT NOT NULL,
        repo_name        TEXT NOT NULL,
        forked_from      TEXT,
        login            TEXT,
        user_id          BIGINT,
        contributions    BIGINT NOT NULL,
        contributor_type TEXT,
        fetched_at       TIMESTAMPTZ NOT NULL DEFAULT now()
    )
    "#,
];

fn connect_options(config: &DatabaseConfig, database: &str) -> PgConnectOptions {
    PgConnectOptions::new()
        .host(&config.host)
        .port(config.port)
        .username(&config.user)
        .password(&config.password)
        .database(database)
}

fn is_missing_database(err: &sqlx::Error) -> bool {
    err.as_database_error()
        .and_then(|db_err| db_err.code())
        .is_some_and(|code| code == INVALID_CATALOG_NAME)
}

/// Double-quotes an identifier for use in DDL.
fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

/// Opens the single connection used for the whole run, creating the
/// database first if it does not exist.
pub async fn create_pool(config: &DatabaseConfig) -> Result<PgPool, sqlx::Error> {
    info!(
        "Connecting to PostgreSQL at {}:{} (database '{}')...",
        config.host, config.port, config.name
    );

    let pool = match open_pool(config).await {
        Ok(pool) => pool,
        Err(e) if is_missing_database(&e) => {
            warn!("Database '{}' does not exist; creating it", config.name);
            create_database(config).await?;
            open_pool(config).await?
        }
        Err(e) => return Err(e),
    };

    info!("PostgreSQL connection established");
    Ok(pool)
}

async fn open_pool(config: &DatabaseConfig) -> Result<PgPool, sqlx::Error> {
    PgPoolOptions::new()
        .max_connections(1)
        .connect_with(connect_options(config, &config.name))
        .await
}

async fn create_database(config: &DatabaseConfig) -> Result<(), sqlx::Error> {
    let mut conn = PgConnection::connect_with(&connect_options(config, MAINTENANCE_DATABASE)).await?;
    let statement = format!("CREATE DATABASE {}", quote_ident(&config.name));
    sqlx::query(&statement).execute(&mut conn).await?;
    conn.close().await?;
    info!("Created database '{}'", config.name);
    Ok(())
}

/// PostgreSQL-backed record store. Inserts go into one open transaction
/// that `commit` closes; the next insert opens a new one.
pub struct PgStore {
    pool: PgPool,
    tx: Option<Transaction<'static, Postgres>>,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool, tx: None }
    }

    async fn transaction(&mut self) -> Result<&mut Transaction<'static, Postgres>> {
        let tx = match self.tx.take() {
            Some(tx) => tx,
            None => self.pool.begin().await?,
        };
        Ok(self.tx.insert(tx))
    }

    /// Commits whatever is pending and closes the pool.
    pub async fn close(mut self) -> Result<()> {
        self.commit().await?;
        self.pool.close().await;
        info!("PostgreSQL connection closed");
        Ok(())
    }
}

#[async_trait]
impl RecordStore for PgStore {
    async fn ensure_schema(&mut self) -> Result<()> {
        for statement in SCHEMA {
            sqlx::query(statement).execute(&self.pool).await?;
        }
        info!("Schema ready (traffic_views, traffic_clones, stargazers, pull_requests, contributors)");
        Ok(())
    }

    async fn insert_traffic(&mut self, kind: TrafficKind, row: &TrafficRow) -> Result<()> {
        let statement = format!(
            "INSERT INTO {} (repo_owner, repo_name, forked_from, timestamp, count, uniques) \
             VALUES ($1, $2, $3, $4, $5, $6)",
            kind.table()
        );
        let tx = self.transaction().await?;
        sqlx::query(&statement)
            .bind(&row.repo.owner)
            .bind(&row.repo.name)
            .bind(&row.repo.forked_from)
            .bind(row.timestamp)
            .bind(row.count)
            .bind(row.uniques)
            .execute(&mut **tx)
            .await?;
        Ok(())
    }

    async fn insert_stargazer(&mut self, row: &StargazerRow) -> Result<()> {
        let tx = self.transaction().await?;
        sqlx::query(
            r#"
            INSERT INTO stargazers
                (repo_owner, repo_name, forked_from, user_login, user_id, node_id,
                 avatar_url, html_url, user_type, site_admin, starred_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
            "#,
        )
        .bind(&row.repo.owner)
        .bind(&row.repo.name)
        .bind(&row.repo.forked_from)
        .bind(&row.user_login)
        .bind(row.user_id)
        .bind(&row.node_id)
        .bind(&row.avatar_url)
        .bind(&row.html_url)
        .bind(&row.user_type)
        .bind(row.site_admin)
        .bind(row.starred_at)
        .execute(&mut **tx)
        .await?;
        Ok(())
    }

    async fn insert_pull_request(&mut self, row: &PullRequestRow) -> Result<()> {
        let tx = self.transaction().await?;
        sqlx::query(
            r#"
            INSERT INTO pull_requests
                (repo_owner, repo_name, forked_from, number, title, state, created_at,
                 updated_at, closed_at, merged_at, user_login, user_id, html_url)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)
            "#,
        )
        .bind(&row.repo.owner)
        .bind(&row.repo.name)
        .bind(&row.repo.forked_from)
        .bind(row.number)
        .bind(&row.title)
        .bind(&row.state)
        .bind(row.created_at)
        .bind(row.updated_at)
        .bind(row.closed_at)
        .bind(row.merged_at)
        .bind(&row.user_login)
        .bind(row.user_id)
        .bind(&row.html_url)
        .execute(&mut **tx)
        .await?;
        Ok(())
    }

    async fn insert_contributor(&mut self, row: &ContributorRow) -> Result<()> {
        let tx = self.transaction().await?;
        sqlx::query(
            r#"
            INSERT INTO contributors
                (repo_owner, repo_name, forked_from, login, user_id, contributions, contributor_type)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            "#,
        )
        .bind(&row.repo.owner)
        .bind(&row.repo.name)
        .bind(&row.repo.forked_from)
        .bind(&row.login)
        .bind(row.user_id)
        .bind(row.contributions)
        .bind(&row.contributor_type)
        .execute(&mut **tx)
        .await?;
        Ok(())
    }

    async fn commit(&mut self) -> Result<()> {
        if let Some(tx) = self.tx.take() {
            tx.commit().await?;
            debug!("Committed pending rows");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_quote_ident_escapes_quotes() {
        assert_eq!(quote_ident("traffic"), "\"traffic\"");
        assert_eq!(quote_ident("we\"ird"), "\"we\"\"ird\"");
    }

    #[test]
    fn test_schema_tables_match_traffic_kinds() {
        for kind in [TrafficKind::Views, TrafficKind::Clones] {
            let ddl = format!("CREATE TABLE IF NOT EXISTS {} (", kind.table());
            assert!(SCHEMA.iter().any(|s| s.contains(&ddl)), "no DDL for {ddl}");
        }
    }

    #[test]
    fn test_every_table_records_lineage() {
        assert!(SCHEMA.iter().all(|s| s.contains("forked_from")));
        assert!(SCHEMA.iter().all(|s| s.contains("IF NOT EXISTS")));
    }

    #[test]
    fn test_non_database_errors_are_not_missing_database() {
        assert!(!is_missing_database(&sqlx::Error::PoolTimedOut));
    }
}
