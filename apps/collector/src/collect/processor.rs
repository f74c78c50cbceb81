//! Repository processor. Collects one repository and every fork below it.
//!
//! The fork tree is walked with an explicit stack instead of recursion. Forks
//! are pushed in reverse so they are popped in API order, which keeps the
//! visiting order identical to a recursive pre-order walk. A visited set keyed
//! by `owner/name` ensures each repository is processed at most once.

use std::collections::HashSet;

use anyhow::Result;
use tracing::{debug, info, warn};

use crate::collect::persist::{store_contributors, store_pull_requests, store_stargazers, store_traffic};
use crate::github::types::RepoSummary;
use crate::github::{GitHubClient, MediaType, PER_PAGE};
use crate::models::repo::RepoRef;
use crate::models::rows::{RowCounts, TrafficKind};
use crate::store::RecordStore;

/// Outcome of processing one root repository and its forks.
#[derive(Debug, Clone, Default)]
pub struct ProcessReport {
    /// Every repository processed, in visiting order.
    pub visited: Vec<RepoRef>,
    pub rows: RowCounts,
}

pub struct RepoProcessor<'a> {
    client: &'a GitHubClient,
    store: &'a mut dyn RecordStore,
}

impl<'a> RepoProcessor<'a> {
    pub fn new(client: &'a GitHubClient, store: &'a mut dyn RecordStore) -> Self {
        Self { client, store }
    }

    /// Processes `root`, then walks its forks depth-first.
    pub async fn process(&mut self, root: RepoRef) -> Result<ProcessReport> {
        let mut report = ProcessReport::default();
        let mut seen: HashSet<String> = HashSet::new();
        let mut stack = vec![root];

        while let Some(repo) = stack.pop() {
            if !seen.insert(repo.full_name()) {
                warn!(
                    "Skipping '{repo}' (reached again via '{}')",
                    repo.forked_from.as_deref().unwrap_or("-")
                );
                continue;
            }

            report.rows += self.collect_repository(&repo).await?;
            self.store.commit().await?;

            let forks = self.forks_of(&repo).await;
            if !forks.is_empty() {
                info!("Found {} fork(s) of '{repo}'", forks.len());
            }
            stack.extend(forks.into_iter().rev());
            report.visited.push(repo);
        }

        Ok(report)
    }

    /// Fetches and stores views, clones, stargazers, pull requests and
    /// contributors for a single repository.
    async fn collect_repository(&mut self, repo: &RepoRef) -> Result<RowCounts> {
        match &repo.forked_from {
            Some(parent) => info!("Processing fork '{repo}' of '{parent}'"),
            None => info!("Processing repository '{repo}'"),
        }

        let mut rows = RowCounts::default();
        rows.views = self.collect_traffic(repo, TrafficKind::Views).await?;
        rows.clones = self.collect_traffic(repo, TrafficKind::Clones).await?;

        let url = self.list_url(repo, "/stargazers", "");
        let stargazers = self
            .client
            .fetch_all_pages_as(&url, MediaType::StarTimestamps)
            .await;
        rows.stargazers = store_stargazers(self.store, &stargazers, repo).await?;

        let url = self.list_url(repo, "/pulls", "state=all&");
        let pulls = self.client.fetch_all_pages(&url).await;
        rows.pull_requests = store_pull_requests(self.store, &pulls, repo).await?;

        let url = self.list_url(repo, "/contributors", "anon=1&");
        let contributors = self.client.fetch_all_pages(&url).await;
        rows.contributors = store_contributors(self.store, &contributors, repo).await?;

        debug!("Rows for '{repo}': {rows:?}");
        Ok(rows)
    }

    async fn collect_traffic(&mut self, repo: &RepoRef, kind: TrafficKind) -> Result<usize> {
        let url = self.client.repo_url(
            &repo.owner,
            &repo.name,
            &format!("/traffic/{}", kind.json_key()),
        );
        match self.client.fetch_one(&url).await {
            Some(body) => store_traffic(self.store, kind, &body, repo).await,
            None => {
                warn!("Skipping traffic {} for '{repo}'", kind.json_key());
                Ok(0)
            }
        }
    }

    async fn forks_of(&self, repo: &RepoRef) -> Vec<RepoRef> {
        let url = self.list_url(repo, "/forks", "");
        self.client
            .fetch_all_pages(&url)
            .await
            .into_iter()
            .filter_map(|item| {
                let summary: RepoSummary = serde_json::from_value(item).ok()?;
                let Some((owner, name)) = summary.owner_and_name() else {
                    warn!("Skipping fork of '{repo}' without owner or name");
                    return None;
                };
                Some(RepoRef::fork_of(repo, owner, name))
            })
            .collect()
    }

    fn list_url(&self, repo: &RepoRef, tail: &str, query: &str) -> String {
        self.client.repo_url(
            &repo.owner,
            &repo.name,
            &format!("{tail}?{query}per_page={PER_PAGE}"),
        )
    }
}
