use std::path::PathBuf;

use thiserror::Error;

pub type Result<T> = std::result::Result<T, MirrorError>;

#[derive(Debug, Error)]
pub enum MirrorError {
    /// A required setting is absent. `missing` lists the environment
    /// variables that would have supplied it.
    #[error("missing required configuration:\n{}", format_missing(.missing))]
    Config { missing: Vec<MissingSetting> },

    #[error("invalid configuration in {path}: {message}")]
    ConfigFile { path: PathBuf, message: String },

    #[error("invalid {setting} value {value:?}: {message}")]
    InvalidSetting {
        setting: &'static str,
        value: String,
        message: String,
    },

    #[error("MediaWiki login failed: {reason}")]
    Auth { reason: String },

    #[error("MediaWiki API request failed: {message}")]
    Transport {
        message: String,
        #[source]
        source: Option<reqwest::Error>,
    },

    #[error("MediaWiki API error [{code}]: {info}")]
    Api { code: String, info: String },

    #[error("failed to decode {what} response: {source}")]
    Decode {
        what: &'static str,
        #[source]
        source: serde_json::Error,
    },

    #[error("{action} {}: {source}", .path.display())]
    Io {
        action: &'static str,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl MirrorError {
    pub(crate) fn transport(message: impl Into<String>) -> Self {
        Self::Transport {
            message: message.into(),
            source: None,
        }
    }

    pub(crate) fn io(action: &'static str, path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            action,
            path: path.into(),
            source,
        }
    }

    /// Authentication and configuration problems abort a run before any
    /// page is touched.
    pub fn is_fatal_before_export(&self) -> bool {
        matches!(
            self,
            Self::Config { .. }
                | Self::ConfigFile { .. }
                | Self::InvalidSetting { .. }
                | Self::Auth { .. }
        )
    }

    /// The wiki no longer accepts the login this run started with. Every
    /// later request would fail the same way.
    pub fn is_session_lost(&self) -> bool {
        match self {
            Self::Api { code, .. } => SESSION_LOST_CODES.contains(&code.as_str()),
            _ => false,
        }
    }
}

const SESSION_LOST_CODES: &[&str] = &[
    "readapidenied",
    "assertuserfailed",
    "assertbotfailed",
    "notloggedin",
    "badtoken",
];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MissingSetting {
    pub env_var: &'static str,
    pub description: &'static str,
}

impl MissingSetting {
    pub const API_URL: Self = Self {
        env_var: "WIKI_API",
        description: "MediaWiki API URL",
    };
    pub const USERNAME: Self = Self {
        env_var: "WIKI_USER",
        description: "Username",
    };
    pub const PASSWORD: Self = Self {
        env_var: "WIKI_PASS",
        description: "Password (or bot password)",
    };
}

fn format_missing(missing: &[MissingSetting]) -> String {
    missing
        .iter()
        .map(|setting| format!("  {} - {}", setting.env_var, setting.description))
        .collect::<Vec<_>>()
        .join("\n")
}
