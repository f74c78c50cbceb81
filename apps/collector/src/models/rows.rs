use chrono::NaiveDateTime;

use crate::models::repo::RepoRef;

/// Which traffic endpoint a sample came from. Each kind has its own table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrafficKind {
    Views,
    Clones,
}

impl TrafficKind {
    /// Key of the sample array in the traffic response body.
    pub fn json_key(self) -> &'static str {
        match self {
            TrafficKind::Views => "views",
            TrafficKind::Clones => "clones",
        }
    }

    pub fn table(self) -> &'static str {
        match self {
            TrafficKind::Views => "traffic_views",
            TrafficKind::Clones => "traffic_clones",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct TrafficRow {
    pub repo: RepoRef,
    pub timestamp: NaiveDateTime,
    pub count: i64,
    pub uniques: i64,
}

/// Snapshot of the starring user's profile at fetch time.
#[derive(Debug, Clone, PartialEq)]
pub struct StargazerRow {
    pub repo: RepoRef,
    pub user_login: String,
    pub user_id: Option<i64>,
    pub node_id: Option<String>,
    pub avatar_url: Option<String>,
    pub html_url: Option<String>,
    pub user_type: Option<String>,
    pub site_admin: Option<bool>,
    pub starred_at: NaiveDateTime,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PullRequestRow {
    pub repo: RepoRef,
    pub number: i64,
    pub title: Option<String>,
    pub state: Option<String>,
    pub created_at: Option<NaiveDateTime>,
    pub updated_at: Option<NaiveDateTime>,
    pub closed_at: Option<NaiveDateTime>,
    pub merged_at: Option<NaiveDateTime>,
    pub user_login: Option<String>,
    pub user_id: Option<i64>,
    pub html_url: Option<String>,
}

/// Anonymous contributors have no account: `login` holds their display
/// name and `user_id` is empty.
#[derive(Debug, Clone, PartialEq)]
pub struct ContributorRow {
    pub repo: RepoRef,
    pub login: Option<String>,
    pub user_id: Option<i64>,
    pub contributions: i64,
    pub contributor_type: Option<String>,
}

/// Rows written per table.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RowCounts {
    pub views: usize,
    pub clones: usize,
    pub stargazers: usize,
    pub pull_requests: usize,
    pub contributors: usize,
}

impl RowCounts {
    pub fn total(&self) -> usize {
        self.views + self.clones + self.stargazers + self.pull_requests + self.contributors
    }
}

impl std::ops::AddAssign for RowCounts {
    fn add_assign(&mut self, other: Self) {
        self.views += other.views;
        self.clones += other.clones;
        self.stargazers += other.stargazers;
        self.pull_requests += other.pull_requests;
        self.contributors += other.contributors;
    }
}
