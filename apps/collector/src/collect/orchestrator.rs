use anyhow::Result;
use tracing::{info, warn};

use crate::collect::processor::RepoProcessor;
use crate::errors::CollectorError;
use crate::github::types::RepoSummary;
use crate::github::{GitHubClient, PER_PAGE};
use crate::models::repo::RepoRef;
use crate::models::rows::RowCounts;
use crate::store::RecordStore;

/// What one run collected.
#[derive(Debug, Clone, Default)]
pub struct RunSummary {
    /// Organization repositories carrying the required topic.
    pub matched: Vec<String>,
    /// Repositories processed, forks included.
    pub processed: usize,
    pub rows: RowCounts,
}

impl RunSummary {
    pub fn log(&self, topic: &str) {
        info!(
            "Processed {} repositories ({} matched topic '{topic}'); {} rows: views={} clones={} stargazers={} pull_requests={} contributors={}",
            self.processed,
            self.matched.len(),
            self.rows.total(),
            self.rows.views,
            self.rows.clones,
            self.rows.stargazers,
            self.rows.pull_requests,
            self.rows.contributors,
        );
        for repo in &self.matched {
            info!("Repository with topic '{topic}': {repo}");
        }
    }
}

/// Fails unless `GET /user` succeeds with the configured token.
pub async fn validate_token(client: &GitHubClient) -> Result<String, CollectorError> {
    let Some(user) = client.authenticated_user().await else {
        return Err(CollectorError::Unauthorized(
            "GET /user failed; check that GITHUB_TOKEN is valid".to_string(),
        ));
    };
    let login = user
        .get("login")
        .and_then(|v| v.as_str())
        .unwrap_or("<unknown>")
        .to_string();
    info!("Authenticated to GitHub as '{login}'");
    Ok(login)
}

/// Lists every repository of the organization, all pages.
pub async fn discover_repositories(client: &GitHubClient, org: &str) -> Vec<RepoRef> {
    let url = client.url(&format!("/orgs/{org}/repos?per_page={PER_PAGE}"));
    let repos: Vec<RepoRef> = client
        .fetch_all_pages(&url)
        .await
        .into_iter()
        .filter_map(|item| {
            let summary: RepoSummary = serde_json::from_value(item).ok()?;
            let (owner, name) = summary.owner_and_name()?;
            Some(RepoRef::root(owner, name))
        })
        .collect();

    info!("Fetched {} repositories from organization '{org}'", repos.len());
    repos
}

/// Ensures the schema, then processes every repository carrying `topic`.
/// Commits after each repository and once more at the end.
pub async fn collect(
    client: &GitHubClient,
    store: &mut dyn RecordStore,
    repos: &[RepoRef],
    topic: &str,
) -> Result<RunSummary> {
    store.ensure_schema().await?;

    let mut summary = RunSummary::default();
    for repo in repos {
        if !client
            .has_required_topic(&repo.owner, &repo.name, topic)
            .await
        {
            continue;
        }
        info!("Detected repository with topic '{topic}': {repo}");
        summary.matched.push(repo.full_name());

        let report = RepoProcessor::new(client, &mut *store)
            .process(repo.clone())
            .await?;
        summary.processed += report.visited.len();
        summary.rows += report.rows;
    }

    if summary.matched.is_empty() {
        warn!("No repository carries the topic '{topic}'");
    }

    store.commit().await?;
    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::memory::MemoryStore;
    use crate::test_support::{client_for, route};
    use mockito::{Mock, ServerGuard};
    use serde_json::{json, Value};

    async fn mock_json(server: &mut ServerGuard, path: &str, body: Value, hits: usize) -> Mock {
        server
            .mock("GET", route(path))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(body.to_string())
            .expect(hits)
            .create_async()
            .await
    }

    fn repo_item(owner: &str, name: &str) -> Value {
        json!({ "name": name, "owner": { "login": owner } })
    }

    /// Every data endpoint of `full`, one row each, answered `hits` times.
    async fn mock_repository(server: &mut ServerGuard, full: &str, forks: Value, hits: usize) -> Vec<Mock> {
        let day = "2024-05-01T00:00:00Z";
        vec![
            mock_json(
                server,
                &format!("/repos/{full}/traffic/views"),
                json!({ "views": [{ "timestamp": day, "count": 9, "uniques": 4 }] }),
                hits,
            )
            .await,
            mock_json(
                server,
                &format!("/repos/{full}/traffic/clones"),
                json!({ "clones": [{ "timestamp": day, "count": 2, "uniques": 1 }] }),
                hits,
            )
            .await,
            mock_json(
                server,
                &format!("/repos/{full}/stargazers"),
                json!([{ "starred_at": day, "user": { "login": "ann", "id": 7 } }]),
                hits,
            )
            .await,
            mock_json(
                server,
                &format!("/repos/{full}/pulls"),
                json!([{ "number": 3, "state": "merged", "merged_at": day }]),
                hits,
            )
            .await,
            mock_json(
                server,
                &format!("/repos/{full}/contributors"),
                json!([{ "login": "ann", "contributions": 12 }]),
                hits,
            )
            .await,
            mock_json(server, &format!("/repos/{full}/forks"), forks, hits).await,
        ]
    }

    #[tokio::test]
    async fn test_validate_token_accepts_working_token() {
        let mut server = mockito::Server::new_async().await;
        let _user = mock_json(&mut server, "/user", json!({ "login": "octocat" }), 1).await;
        let client = client_for(&server);
        assert_eq!(validate_token(&client).await.unwrap(), "octocat");
    }

    #[tokio::test]
    async fn test_validate_token_rejects_bad_token() {
        let mut server = mockito::Server::new_async().await;
        let _user = server
            .mock("GET", route("/user"))
            .with_status(401)
            .with_body(json!({ "message": "Bad credentials" }).to_string())
            .create_async()
            .await;
        let client = client_for(&server);
        assert!(matches!(
            validate_token(&client).await,
            Err(CollectorError::Unauthorized(_))
        ));
    }

    #[tokio::test]
    async fn test_only_repositories_with_topic_are_collected() {
        let mut server = mockito::Server::new_async().await;
        let _org = mock_json(
            &mut server,
            "/orgs/acme/repos",
            json!([repo_item("acme", "alpha"), repo_item("acme", "beta")]),
            1,
        )
        .await;
        let _alpha_topics = mock_json(
            &mut server,
            "/repos/acme/alpha/topics",
            json!({ "names": ["showcase", "rust"] }),
            1,
        )
        .await;
        let _beta_topics = mock_json(
            &mut server,
            "/repos/acme/beta/topics",
            json!({ "names": ["internal"] }),
            1,
        )
        .await;
        let alpha = mock_repository(&mut server, "acme/alpha", json!([]), 1).await;
        let beta = mock_repository(&mut server, "acme/beta", json!([]), 0).await;

        let client = client_for(&server);
        let repos = discover_repositories(&client, "acme").await;
        assert_eq!(repos.len(), 2);

        let mut store = MemoryStore::default();
        let summary = collect(&client, &mut store, &repos, "showcase").await.unwrap();

        assert_eq!(summary.matched, vec!["acme/alpha".to_string()]);
        assert_eq!(summary.processed, 1);
        assert_eq!(store.schema_ensured, 1);

        let tables = &store.committed;
        assert_eq!(tables.views.len(), 1);
        assert_eq!(tables.clones.len(), 1);
        assert_eq!(tables.stargazers.len(), 1);
        assert_eq!(tables.pull_requests.len(), 1);
        assert_eq!(tables.contributors.len(), 1);
        assert_eq!(tables.lineage_of("acme", "alpha").len(), 5);
        assert!(tables.lineage_of("acme", "beta").is_empty());

        for mock in alpha.iter().chain(beta.iter()) {
            mock.assert_async().await;
        }
    }

    #[tokio::test]
    async fn test_fork_rows_tagged_with_parent() {
        let mut server = mockito::Server::new_async().await;
        let _org = mock_json(
            &mut server,
            "/orgs/acme/repos",
            json!([repo_item("acme", "alpha")]),
            1,
        )
        .await;
        let _topics = mock_json(
            &mut server,
            "/repos/acme/alpha/topics",
            json!({ "names": ["showcase"] }),
            1,
        )
        .await;
        let _alpha = mock_repository(
            &mut server,
            "acme/alpha",
            json!([repo_item("octo", "alpha-fork")]),
            1,
        )
        .await;
        let _fork = mock_repository(&mut server, "octo/alpha-fork", json!([]), 1).await;

        let client = client_for(&server);
        let repos = discover_repositories(&client, "acme").await;
        let mut store = MemoryStore::default();
        let summary = collect(&client, &mut store, &repos, "showcase").await.unwrap();

        assert_eq!(summary.processed, 2);
        assert_eq!(summary.rows.total(), 10);

        let tables = &store.committed;
        let alpha = tables.lineage_of("acme", "alpha");
        assert_eq!(alpha.len(), 5);
        assert!(alpha.iter().all(Option::is_none));

        let fork = tables.lineage_of("octo", "alpha-fork");
        assert_eq!(fork.len(), 5);
        assert!(fork
            .iter()
            .all(|tag| tag.as_deref() == Some("acme/alpha")));
    }

    #[tokio::test]
    async fn test_empty_organization_yields_no_repositories() {
        let mut server = mockito::Server::new_async().await;
        let _org = mock_json(&mut server, "/orgs/acme/repos", json!([]), 1).await;
        let client = client_for(&server);
        assert!(discover_repositories(&client, "acme").await.is_empty());
    }
}
