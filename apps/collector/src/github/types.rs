//! Wire shapes for the GitHub REST endpoints the collector reads.
//!
//! Every field is optional: one malformed item must not sink a whole page,
//! so mandatory-field checks happen when items are mapped to rows.

use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
pub struct Account {
    pub login: Option<String>,
    pub id: Option<i64>,
    pub node_id: Option<String>,
    pub avatar_url: Option<String>,
    pub html_url: Option<String>,
    #[serde(rename = "type")]
    pub account_type: Option<String>,
    pub site_admin: Option<bool>,
}

/// Item of `/orgs/{org}/repos` and `/repos/{owner}/{repo}/forks`.
#[derive(Debug, Clone, Deserialize)]
pub struct RepoSummary {
    pub name: Option<String>,
    pub owner: Option<Account>,
}

impl RepoSummary {
    pub fn owner_and_name(&self) -> Option<(&str, &str)> {
        let owner = self.owner.as_ref()?.login.as_deref()?;
        let name = self.name.as_deref()?;
        Some((owner, name))
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct Topics {
    pub names: Option<Vec<String>>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TrafficSample {
    pub timestamp: Option<String>,
    pub count: Option<i64>,
    pub uniques: Option<i64>,
}

/// Item of `/stargazers` under the `star+json` media type. Without that media
/// type GitHub returns bare accounts, which carry no `starred_at`.
#[derive(Debug, Clone, Deserialize)]
pub struct StarEvent {
    pub starred_at: Option<String>,
    pub user: Option<Account>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PullRequest {
    pub number: Option<i64>,
    pub title: Option<String>,
    pub state: Option<String>,
    pub created_at: Option<String>,
    pub updated_at: Option<String>,
    pub closed_at: Option<String>,
    pub merged_at: Option<String>,
    pub user: Option<Account>,
    pub html_url: Option<String>,
}

/// Item of `/contributors?anon=1`. Anonymous entries carry `name`/`email`
/// instead of an account.
#[derive(Debug, Clone, Deserialize)]
pub struct Contributor {
    pub login: Option<String>,
    pub id: Option<i64>,
    pub name: Option<String>,
    pub contributions: Option<i64>,
    #[serde(rename = "type")]
    pub contributor_type: Option<String>,
}
