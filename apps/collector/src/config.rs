use thiserror::Error;

use crate::github::DEFAULT_API_URL;

const DEFAULT_DB_PORT: u16 = 5432;

#[derive(Debug, Error, PartialEq)]
pub enum ConfigError {
    #[error("Required environment variables are not set: {}", .0.join(", "))]
    Missing(Vec<&'static str>),

    #[error("Environment variable '{key}' has an invalid value '{value}'")]
    Invalid { key: &'static str, value: String },
}

/// PostgreSQL connection parameters.
#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    pub host: String,
    pub port: u16,
    pub user: String,
    pub password: String,
    pub name: String,
}

/// Collector configuration loaded from environment variables.
/// Built once in `main` and handed to every component that needs it.
#[derive(Debug, Clone)]
pub struct Config {
    pub github_token: String,
    pub org_name: String,
    pub required_topic: String,
    pub database: DatabaseConfig,
    pub api_url: String,
    pub validate_token: bool,
    pub debug: bool,
    pub rust_log: String,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok(); // load .env if present; ignore if missing

        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds the config from an arbitrary key lookup. Every missing required
    /// key is reported, not just the first one.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut missing = Vec::new();
        let mut require = |key: &'static str| -> String {
            match lookup(key).filter(|v| !v.trim().is_empty()) {
                Some(value) => value,
                None => {
                    missing.push(key);
                    String::new()
                }
            }
        };

        let github_token = require("GITHUB_TOKEN");
        let org_name = require("ORG_NAME");
        let required_topic = require("REQUIRED_TOPIC");
        let host = require("DB_HOST");
        let user = require("DB_USER");
        let password = require("DB_PASSWORD");
        let name = require("DB_NAME");

        if !missing.is_empty() {
            return Err(ConfigError::Missing(missing));
        }

        let port = match lookup("DB_PORT").filter(|v| !v.trim().is_empty()) {
            Some(raw) => raw.trim().parse::<u16>().map_err(|_| ConfigError::Invalid {
                key: "DB_PORT",
                value: raw,
            })?,
            None => DEFAULT_DB_PORT,
        };

        Ok(Config {
            github_token,
            org_name,
            required_topic,
            database: DatabaseConfig {
                host,
                port,
                user,
                password,
                name,
            },
            api_url: lookup("GITHUB_API_URL")
                .filter(|v| !v.trim().is_empty())
                .map(|v| v.trim_end_matches('/').to_string())
                .unwrap_or_else(|| DEFAULT_API_URL.to_string()),
            validate_token: parse_flag(&lookup, "VALIDATE_TOKEN", true)?,
            debug: parse_flag(&lookup, "DEBUG", false)?,
            rust_log: lookup("RUST_LOG").unwrap_or_else(|| "info".to_string()),
        })
    }
}

fn parse_flag<F>(lookup: &F, key: &'static str, default: bool) -> Result<bool, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    let Some(raw) = lookup(key) else {
        return Ok(default);
    };
    match raw.trim().to_ascii_lowercase().as_str() {
        "" => Ok(default),
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(ConfigError::Invalid { key, value: raw }),
    }
}
