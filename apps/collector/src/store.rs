//! Record store: the seam between row mapping and the database.
//!
//! Production: `db::PgStore` (PostgreSQL, one connection, one open
//! transaction between commit points). Tests: `memory::MemoryStore`.
//!
//! Every method appends. Nothing is ever updated or deduplicated, so
//! repeated runs accumulate history.

use anyhow::Result;
use async_trait::async_trait;

use crate::models::rows::{ContributorRow, PullRequestRow, StargazerRow, TrafficKind, TrafficRow};

#[async_trait]
pub trait RecordStore: Send {
    /// Creates the five destination tables if they do not exist yet.
    async fn ensure_schema(&mut self) -> Result<()>;

    async fn insert_traffic(&mut self, kind: TrafficKind, row: &TrafficRow) -> Result<()>;

    async fn insert_stargazer(&mut self, row: &StargazerRow) -> Result<()>;

    async fn insert_pull_request(&mut self, row: &PullRequestRow) -> Result<()>;

    async fn insert_contributor(&mut self, row: &ContributorRow) -> Result<()>;

    /// Makes every row inserted since the previous commit durable.
    async fn commit(&mut self) -> Result<()>;
}
