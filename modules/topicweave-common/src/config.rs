use std::env;

use tracing::info;

use crate::error::TopicWeaveError;
use crate::types::LinkedBy;

/// Application configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    // Topic store / workspace API
    pub api_url: String,
    pub api_token: String,

    // Linking
    pub linked_by: LinkedBy,
    pub request_timeout_secs: u64,
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self, TopicWeaveError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Same as `from_env`, reading values through `lookup` instead of the process environment.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, TopicWeaveError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let linked_by = match lookup("TOPICWEAVE_LINKED_BY").as_deref() {
            None | Some("user") => LinkedBy::User,
            Some("agent") => LinkedBy::Agent,
            Some(other) => {
                return Err(TopicWeaveError::Config(format!(
                    "TOPICWEAVE_LINKED_BY must be 'user' or 'agent', got '{other}'"
                )))
            }
        };

        let request_timeout_secs = match lookup("TOPICWEAVE_REQUEST_TIMEOUT_SECS") {
            None => 30,
            Some(raw) => raw.parse().map_err(|_| {
                TopicWeaveError::Config("TOPICWEAVE_REQUEST_TIMEOUT_SECS must be a number".to_string())
            })?,
        };

        Ok(Self {
            api_url: required(&lookup, "TOPICWEAVE_API_URL")?
                .trim_end_matches('/')
                .to_string(),
            api_token: required(&lookup, "TOPICWEAVE_API_TOKEN")?,
            linked_by,
            request_timeout_secs,
        })
    }

    /// Log the loaded configuration with secrets masked.
    pub fn log_redacted(&self) {
        info!(
            api_url = self.api_url.as_str(),
            api_token = redact(&self.api_token).as_str(),
            linked_by = %self.linked_by,
            request_timeout_secs = self.request_timeout_secs,
            "Loaded configuration"
        );
    }
}

fn required<F>(lookup: &F, key: &str) -> Result<String, TopicWeaveError>
where
    F: Fn(&str) -> Option<String>,
{
    lookup(key)
        .filter(|v| !v.trim().is_empty())
        .ok_or_else(|| TopicWeaveError::Config(format!("{key} environment variable is required")))
}

fn redact(secret: &str) -> String {
    if secret.chars().count() <= 4 {
        "****".to_string()
    } else {
        format!("{}****", secret.chars().take(4).collect::<String>())
    }
}
