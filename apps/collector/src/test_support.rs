//! Fixtures shared by the HTTP-backed tests.

use mockito::{Matcher, ServerGuard};

use crate::github::GitHubClient;

/// Matches `path` with or without a query string.
pub fn route(path: &str) -> Matcher {
    Matcher::Regex(format!(r"^{path}(\?.*)?$"))
}

pub fn client_for(server: &ServerGuard) -> GitHubClient {
    GitHubClient::new("test-token", server.url()).expect("client builds")
}
