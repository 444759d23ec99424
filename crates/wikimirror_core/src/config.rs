use std::env;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{MirrorError, MissingSetting, Result};

pub const DEFAULT_USER_AGENT: &str = concat!("wikimirror/", env!("CARGO_PKG_VERSION"));
pub const DEFAULT_OUTPUT_DIR: &str = "pages";
pub const DEFAULT_CONFIG_FILENAME: &str = "wikimirror.toml";
pub const DEFAULT_COMMIT_MESSAGE: &str = "Sync from MediaWiki";

#[derive(Debug, Clone, Deserialize, Serialize, Default, PartialEq, Eq)]
pub struct MirrorConfig {
    #[serde(default)]
    pub wiki: WikiSection,
    #[serde(default)]
    pub export: ExportSection,
    #[serde(default)]
    pub git: GitSection,
}

#[derive(Debug, Clone, Deserialize, Serialize, Default, PartialEq, Eq)]
pub struct WikiSection {
    pub api_url: Option<String>,
    pub username: Option<String>,
    pub user_agent: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Serialize, Default, PartialEq, Eq)]
pub struct ExportSection {
    pub output_dir: Option<PathBuf>,
    #[serde(default)]
    pub all_namespaces: bool,
}

#[derive(Debug, Clone, Deserialize, Serialize, Default, PartialEq, Eq)]
pub struct GitSection {
    #[serde(default)]
    pub enabled: bool,
    pub message: Option<String>,
}

/// Load and parse a MirrorConfig from a TOML file. Returns default if file doesn't exist.
pub fn load_config(config_path: &Path) -> Result<MirrorConfig> {
    if !config_path.exists() {
        return Ok(MirrorConfig::default());
    }
    let content = fs::read_to_string(config_path)
        .map_err(|source| MirrorError::io("failed to read", config_path, source))?;
    toml::from_str(&content).map_err(|error| MirrorError::ConfigFile {
        path: config_path.to_path_buf(),
        message: error.to_string(),
    })
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpSettings {
    pub user_agent: String,
    pub timeout_ms: u64,
    pub rate_limit_read_ms: u64,
    pub max_retries: usize,
    pub retry_delay_ms: u64,
}

impl Default for HttpSettings {
    fn default() -> Self {
        Self {
            user_agent: DEFAULT_USER_AGENT.to_string(),
            timeout_ms: 30_000,
            rate_limit_read_ms: 100,
            max_retries: 2,
            retry_delay_ms: 500,
        }
    }
}

#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// Everything one mirror run needs, fully resolved.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MirrorSettings {
    pub api_url: String,
    pub credentials: Credentials,
    pub output_dir: PathBuf,
    pub all_namespaces: bool,
    pub git: Option<GitSettings>,
    pub http: HttpSettings,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GitSettings {
    pub message: String,
}

impl MirrorSettings {
    pub fn diagnostics(&self) -> String {
        format!(
            "api_url={}\nusername={}\npassword=<redacted>\noutput_dir={}\nall_namespaces={}\ngit={}\nuser_agent={}\ntimeout_ms={}\nmax_retries={}\nretry_delay_ms={}\nrate_limit_read_ms={}",
            self.api_url,
            self.credentials.username,
            self.output_dir.to_string_lossy().replace('\\', "/"),
            self.all_namespaces,
            self.git
                .as_ref()
                .map(|git| format!("enabled ({})", git.message))
                .unwrap_or_else(|| "disabled".to_string()),
            self.http.user_agent,
            self.http.timeout_ms,
            self.http.max_retries,
            self.http.retry_delay_ms,
            self.http.rate_limit_read_ms,
        )
    }
}

/// Values given on the command line or collected interactively; they win
/// over the environment and the config file.
#[derive(Debug, Clone, Default)]
pub struct SettingOverrides {
    pub api_url: Option<String>,
    pub username: Option<String>,
    pub password: Option<String>,
    pub output_dir: Option<PathBuf>,
    pub all_namespaces: bool,
    pub git: bool,
    pub git_message: Option<String>,
}

pub fn resolve_settings(
    config: &MirrorConfig,
    overrides: &SettingOverrides,
) -> Result<MirrorSettings> {
    resolve_settings_with_lookup(config, overrides, |key| env::var(key).ok())
}

pub(crate) fn resolve_settings_with_lookup<F>(
    config: &MirrorConfig,
    overrides: &SettingOverrides,
    lookup: F,
) -> Result<MirrorSettings>
where
    F: Fn(&str) -> Option<String>,
{
    let env_value = |key: &str| {
        lookup(key)
            .map(|value| value.trim().to_string())
            .filter(|value| !value.is_empty())
    };

    let api_url = non_empty(overrides.api_url.clone())
        .or_else(|| env_value("WIKI_API"))
        .or_else(|| env_value("WIKI_API_URL"))
        .or_else(|| non_empty(config.wiki.api_url.clone()));
    let username = non_empty(overrides.username.clone())
        .or_else(|| env_value("WIKI_USER"))
        .or_else(|| non_empty(config.wiki.username.clone()));
    // Passwords never come from the config file.
    let password = overrides
        .password
        .clone()
        .filter(|value| !value.is_empty())
        .or_else(|| lookup("WIKI_PASS").filter(|value| !value.is_empty()));

    let (api_url, username, password) = match (api_url, username, password) {
        (Some(api_url), Some(username), Some(password)) => (api_url, username, password),
        (api_url, username, password) => {
            let mut missing = Vec::new();
            if api_url.is_none() {
                missing.push(MissingSetting::API_URL);
            }
            if username.is_none() {
                missing.push(MissingSetting::USERNAME);
            }
            if password.is_none() {
                missing.push(MissingSetting::PASSWORD);
            }
            return Err(MirrorError::Config { missing });
        }
    };

    let output_dir = overrides
        .output_dir
        .clone()
        .or_else(|| env_value("OUTPUT_DIR").map(PathBuf::from))
        .or_else(|| config.export.output_dir.clone())
        .unwrap_or_else(|| PathBuf::from(DEFAULT_OUTPUT_DIR));

    let git = (overrides.git || config.git.enabled).then(|| GitSettings {
        message: non_empty(overrides.git_message.clone())
            .or_else(|| non_empty(config.git.message.clone()))
            .unwrap_or_else(|| DEFAULT_COMMIT_MESSAGE.to_string()),
    });

    let defaults = HttpSettings::default();
    let http = HttpSettings {
        user_agent: env_value("WIKI_USER_AGENT")
            .or_else(|| non_empty(config.wiki.user_agent.clone()))
            .unwrap_or(defaults.user_agent),
        timeout_ms: parsed(&env_value, "WIKI_HTTP_TIMEOUT_MS").unwrap_or(defaults.timeout_ms),
        rate_limit_read_ms: parsed(&env_value, "WIKI_RATE_LIMIT_READ")
            .unwrap_or(defaults.rate_limit_read_ms),
        max_retries: parsed(&env_value, "WIKI_HTTP_RETRIES").unwrap_or(defaults.max_retries),
        retry_delay_ms: parsed(&env_value, "WIKI_HTTP_RETRY_DELAY_MS")
            .unwrap_or(defaults.retry_delay_ms),
    };

    Ok(MirrorSettings {
        api_url,
        credentials: Credentials { username, password },
        output_dir,
        all_namespaces: overrides.all_namespaces || config.export.all_namespaces,
        git,
        http,
    })
}

fn non_empty(value: Option<String>) -> Option<String> {
    value
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

fn parsed<T, F>(env_value: &F, key: &str) -> Option<T>
where
    T: std::str::FromStr,
    F: Fn(&str) -> Option<String>,
{
    env_value(key).and_then(|value| value.parse::<T>().ok())
}
