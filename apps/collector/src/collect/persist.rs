//! JSON → row mapping and the per-kind store functions.
//!
//! Timestamp policy:
//! - traffic samples and stargazers: row dropped when the timestamp is
//!   missing or fails strict parsing
//! - pull requests: each bad timestamp is stored as NULL, the row is kept

use anyhow::Result;
use chrono::{NaiveDateTime, Timelike};
use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::{debug, warn};

use crate::github::types::{Account, Contributor, PullRequest, StarEvent, TrafficSample};
use crate::models::repo::RepoRef;
use crate::models::rows::{ContributorRow, PullRequestRow, StargazerRow, TrafficKind, TrafficRow};
use crate::store::RecordStore;

const TIMESTAMP_FORMAT: &str = "%Y-%m-%dT%H:%M:%S";

/// Strict `YYYY-MM-DDTHH:MM:SS` parse. GitHub's trailing `Z` is accepted;
/// offsets, fractional seconds and anything else are rejected.
pub fn convert_timestamp(raw: &str) -> Option<NaiveDateTime> {
    let trimmed = raw.strip_suffix('Z').unwrap_or(raw);
    if !has_timestamp_shape(trimmed) {
        warn!("Error parsing timestamp '{raw}': expected YYYY-MM-DDTHH:MM:SS");
        return None;
    }
    match NaiveDateTime::parse_from_str(trimmed, TIMESTAMP_FORMAT) {
        // chrono reads second 60 as a leap second
        Ok(ts) if ts.nanosecond() >= 1_000_000_000 => {
            warn!("Error parsing timestamp '{raw}': second out of range");
            None
        }
        Ok(ts) => Some(ts),
        Err(e) => {
            warn!("Error parsing timestamp '{raw}': {e}");
            None
        }
    }
}

/// `dddd-dd-ddTdd:dd:dd`, byte for byte. chrono alone tolerates padding,
/// signs and short fields.
fn has_timestamp_shape(value: &str) -> bool {
    const SHAPE: &[u8; 19] = b"dddd-dd-ddTdd:dd:dd";
    let bytes = value.as_bytes();
    bytes.len() == SHAPE.len()
        && bytes.iter().zip(SHAPE).all(|(b, expected)| match *expected {
            b'd' => b.is_ascii_digit(),
            _ => b == expected,
        })
}

fn optional_timestamp(raw: Option<&str>) -> Option<NaiveDateTime> {
    raw.and_then(convert_timestamp)
}

fn decode<T: DeserializeOwned>(item: &Value, what: &str, repo: &RepoRef) -> Option<T> {
    match serde_json::from_value::<T>(item.clone()) {
        Ok(decoded) => Some(decoded),
        Err(e) => {
            warn!("Skipping malformed {what} entry for '{repo}': {e}");
            None
        }
    }
}

/// Maps the body of `/traffic/views` or `/traffic/clones` to rows.
pub fn traffic_rows(kind: TrafficKind, body: &Value, repo: &RepoRef) -> Vec<TrafficRow> {
    let Some(samples) = body.get(kind.json_key()).and_then(Value::as_array) else {
        warn!("Traffic response for '{repo}' has no '{}' list", kind.json_key());
        return Vec::new();
    };

    samples
        .iter()
        .filter_map(|item| {
            let sample: TrafficSample = decode(item, kind.json_key(), repo)?;
            let timestamp = match sample.timestamp.as_deref() {
                Some(raw) => convert_timestamp(raw)?,
                None => {
                    warn!("Skipping {} sample without timestamp for '{repo}'", kind.json_key());
                    return None;
                }
            };
            let (Some(count), Some(uniques)) = (sample.count, sample.uniques) else {
                warn!("Skipping incomplete {} sample for '{repo}': {item}", kind.json_key());
                return None;
            };
            Some(TrafficRow {
                repo: repo.clone(),
                timestamp,
                count,
                uniques,
            })
        })
        .collect()
}

/// Accepts both the `star+json` shape (`{starred_at, user}`) and a bare
/// account carrying its own `starred_at`.
pub fn stargazer_rows(items: &[Value], repo: &RepoRef) -> Vec<StargazerRow> {
    items
        .iter()
        .filter_map(|item| {
            let event: StarEvent = decode(item, "stargazer", repo)?;
            let user = match event.user {
                Some(user) => user,
                None => decode::<Account>(item, "stargazer", repo)?,
            };
            let (Some(login), Some(raw_starred_at)) = (user.login, event.starred_at) else {
                warn!("Skipping invalid stargazer entry for '{repo}': {item}");
                return None;
            };
            let starred_at = convert_timestamp(&raw_starred_at)?;
            Some(StargazerRow {
                repo: repo.clone(),
                user_login: login,
                user_id: user.id,
                node_id: user.node_id,
                avatar_url: user.avatar_url,
                html_url: user.html_url,
                user_type: user.account_type,
                site_admin: user.site_admin,
                starred_at,
            })
        })
        .collect()
}

pub fn pull_request_rows(items: &[Value], repo: &RepoRef) -> Vec<PullRequestRow> {
    items
        .iter()
        .filter_map(|item| {
            let pr: PullRequest = decode(item, "pull request", repo)?;
            let Some(number) = pr.number else {
                warn!("Skipping pull request without number for '{repo}'");
                return None;
            };
            let (user_login, user_id) = match pr.user {
                Some(user) => (user.login, user.id),
                None => (None, None),
            };
            Some(PullRequestRow {
                repo: repo.clone(),
                number,
                title: pr.title,
                state: pr.state,
                created_at: optional_timestamp(pr.created_at.as_deref()),
                updated_at: optional_timestamp(pr.updated_at.as_deref()),
                closed_at: optional_timestamp(pr.closed_at.as_deref()),
                merged_at: optional_timestamp(pr.merged_at.as_deref()),
                user_login,
                user_id,
                html_url: pr.html_url,
            })
        })
        .collect()
}

pub fn contributor_rows(items: &[Value], repo: &RepoRef) -> Vec<ContributorRow> {
    items
        .iter()
        .filter_map(|item| {
            let contributor: Contributor = decode(item, "contributor", repo)?;
            let Some(contributions) = contributor.contributions else {
                warn!("Skipping contributor without contribution count for '{repo}': {item}");
                return None;
            };
            Some(ContributorRow {
                repo: repo.clone(),
                login: contributor.login.or(contributor.name),
                user_id: contributor.id,
                contributions,
                contributor_type: contributor.contributor_type,
            })
        })
        .collect()
}

pub async fn store_traffic(
    store: &mut dyn RecordStore,
    kind: TrafficKind,
    body: &Value,
    repo: &RepoRef,
) -> Result<usize> {
    let rows = traffic_rows(kind, body, repo);
    for row in &rows {
        store.insert_traffic(kind, row).await?;
    }
    debug!("Stored {} {} row(s) for '{repo}'", rows.len(), kind.table());
    Ok(rows.len())
}

pub async fn store_stargazers(
    store: &mut dyn RecordStore,
    items: &[Value],
    repo: &RepoRef,
) -> Result<usize> {
    let rows = stargazer_rows(items, repo);
    for row in &rows {
        store.insert_stargazer(row).await?;
    }
    debug!("Stored {} stargazer row(s) for '{repo}'", rows.len());
    Ok(rows.len())
}

pub async fn store_pull_requests(
    store: &mut dyn RecordStore,
    items: &[Value],
    repo: &RepoRef,
) -> Result<usize> {
    let rows = pull_request_rows(items, repo);
    for row in &rows {
        store.insert_pull_request(row).await?;
    }
    debug!("Stored {} pull request row(s) for '{repo}'", rows.len());
    Ok(rows.len())
}

pub async fn store_contributors(
    store: &mut dyn RecordStore,
    items: &[Value],
    repo: &RepoRef,
) -> Result<usize> {
    let rows = contributor_rows(items, repo);
    for row in &rows {
        store.insert_contributor(row).await?;
    }
    debug!("Stored {} contributor row(s) for '{repo}'", rows.len());
    Ok(rows.len())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::memory::MemoryStore;
    use chrono::NaiveDate;
    use serde_json::json;

    fn alpha() -> RepoRef {
        RepoRef::root("acme", "alpha")
    }

    fn at(y: i32, m: u32, d: u32, h: u32, min: u32, s: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(y, m, d)
            .unwrap()
            .and_hms_opt(h, min, s)
            .unwrap()
    }

    #[test]
    fn test_convert_timestamp_strict_format() {
        assert_eq!(
            convert_timestamp("2024-02-29T13:45:07"),
            Some(at(2024, 2, 29, 13, 45, 7))
        );
    }

    #[test]
    fn test_convert_timestamp_accepts_utc_marker() {
        assert_eq!(
            convert_timestamp("2024-01-05T00:00:00Z"),
            Some(at(2024, 1, 5, 0, 0, 0))
        );
    }

    #[test]
    fn test_convert_timestamp_round_trips() {
        for raw in ["1999-12-31T23:59:59", "2023-06-01T08:00:00", "2030-10-17T12:30:45"] {
            let parsed = convert_timestamp(raw).unwrap();
            assert_eq!(parsed.format(TIMESTAMP_FORMAT).to_string(), raw);
        }
    }

    #[test]
    fn test_convert_timestamp_rejects_malformed() {
        for raw in [
            "",
            "not a date",
            "2024-01-05",
            "2024-01-05 10:00:00",
            "2024-13-01T00:00:00",
            "2024-01-05T10:00:00+02:00",
            "2024-01-05T10:00:00.123Z",
            "2024-01-05T10:00:00ZZ",
            " 2024-01-05T10:00:00",
            "+2024-01-05T10:00:00",
            "2024-1-5T1:2:3",
            "2024-01-05T10:00:60",
            "02024-01-05T10:00:00",
            "2024-01-05T10:00:00 ",
        ] {
            assert_eq!(convert_timestamp(raw), None, "accepted {raw:?}");
        }
    }

    #[test]
    fn test_traffic_rows_drop_unparseable_samples() {
        let body = json!({
            "count": 30,
            "uniques": 6,
            "views": [
                { "timestamp": "2024-01-01T00:00:00Z", "count": 10, "uniques": 2 },
                { "timestamp": "yesterday", "count": 12, "uniques": 3 },
                { "count": 8, "uniques": 1 },
                { "timestamp": "2024-01-03T00:00:00Z", "count": 8 }
            ]
        });
        let rows = traffic_rows(TrafficKind::Views, &body, &alpha());
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].timestamp, at(2024, 1, 1, 0, 0, 0));
        assert_eq!((rows[0].count, rows[0].uniques), (10, 2));
    }

    #[test]
    fn test_traffic_rows_read_matching_key() {
        let body = json!({
            "clones": [{ "timestamp": "2024-01-01T00:00:00Z", "count": 4, "uniques": 4 }]
        });
        assert!(traffic_rows(TrafficKind::Views, &body, &alpha()).is_empty());
        assert_eq!(traffic_rows(TrafficKind::Clones, &body, &alpha()).len(), 1);
    }

    #[test]
    fn test_stargazer_rows_keep_profile_snapshot() {
        let items = vec![
            json!({
                "starred_at": "2024-03-01T10:00:00Z",
                "user": {
                    "login": "ann",
                    "id": 7,
                    "node_id": "MDQ6VXNlcjc=",
                    "avatar_url": "https://avatars.example/u/7",
                    "html_url": "https://github.com/ann",
                    "type": "User",
                    "site_admin": false
                }
            }),
            json!({ "starred_at": "garbage", "user": { "login": "bob" } }),
            json!({ "user": { "login": "carl" } }),
            json!({ "starred_at": "2024-03-02T10:00:00Z", "login": "dana", "id": 9 }),
        ];
        let rows = stargazer_rows(&items, &alpha());
        assert_eq!(rows.len(), 2);

        assert_eq!(rows[0].user_login, "ann");
        assert_eq!(rows[0].user_id, Some(7));
        assert_eq!(rows[0].user_type.as_deref(), Some("User"));
        assert_eq!(rows[0].site_admin, Some(false));
        assert_eq!(rows[0].starred_at, at(2024, 3, 1, 10, 0, 0));

        assert_eq!(rows[1].user_login, "dana");
        assert_eq!(rows[1].user_id, Some(9));
    }

    #[test]
    fn test_pull_request_rows_null_bad_timestamps() {
        let items = vec![
            json!({
                "number": 12,
                "title": "Add feature",
                "state": "closed",
                "created_at": "2024-01-01T09:00:00Z",
                "updated_at": "not-a-time",
                "closed_at": "2024-01-02T09:00:00Z",
                "merged_at": null,
                "user": { "login": "ann", "id": 7 },
                "html_url": "https://github.com/acme/alpha/pull/12"
            }),
            json!({ "title": "no number" }),
        ];
        let rows = pull_request_rows(&items, &alpha());
        assert_eq!(rows.len(), 1);
        let pr = &rows[0];
        assert_eq!(pr.number, 12);
        assert_eq!(pr.created_at, Some(at(2024, 1, 1, 9, 0, 0)));
        assert_eq!(pr.updated_at, None);
        assert_eq!(pr.closed_at, Some(at(2024, 1, 2, 9, 0, 0)));
        assert_eq!(pr.merged_at, None);
        assert_eq!(pr.user_login.as_deref(), Some("ann"));
    }

    #[test]
    fn test_contributor_rows_include_anonymous() {
        let items = vec![
            json!({ "login": "ann", "id": 7, "contributions": 40, "type": "User" }),
            json!({ "name": "Jane Doe", "email": "jane@example.com", "contributions": 3, "type": "Anonymous" }),
            json!({ "login": "ghost" }),
        ];
        let rows = contributor_rows(&items, &alpha());
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[1].login.as_deref(), Some("Jane Doe"));
        assert_eq!(rows[1].user_id, None);
        assert_eq!(rows[1].contributor_type.as_deref(), Some("Anonymous"));
    }

    #[tokio::test]
    async fn test_store_functions_insert_one_row_each() {
        let mut store = MemoryStore::default();
        let repo = RepoRef::fork_of(&alpha(), "octo", "alpha-fork");

        let contributors = vec![
            json!({ "login": "ann", "contributions": 1 }),
            json!({ "login": "bob", "contributions": 2 }),
        ];
        let stored = store_contributors(&mut store, &contributors, &repo)
            .await
            .unwrap();
        assert_eq!(stored, 2);

        store.commit().await.unwrap();
        assert_eq!(store.committed.contributors.len(), 2);
        assert!(store.committed.contributors.iter().all(|row| {
            row.repo.forked_from.as_deref() == Some("acme/alpha")
        }));
    }
}
