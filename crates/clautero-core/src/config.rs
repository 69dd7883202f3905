use std::path::PathBuf;

use thiserror::Error;

use crate::TagNames;
use crate::config_file::ConfigFile;

pub const DEFAULT_ZOTERO_BASE_URL: &str = "https://api.zotero.org";
pub const DEFAULT_PROMPT_PATH: &str = "prompt.txt";
pub const DEFAULT_LOG_PATH: &str = "application.log";
pub const DEFAULT_FILE_PATH: &str = "zotero";
pub const DEFAULT_MIN_PAGES: usize = 5;
pub const DEFAULT_MAX_PAGES: usize = 60;
pub const DEFAULT_CLAUDE_TIMEOUT_SECS: u64 = 300;

#[derive(Error, Debug, PartialEq, Eq)]
pub enum ConfigError {
    #[error("missing required config value: {0}")]
    Missing(&'static str),
    #[error("unknown summarization backend {0:?} (expected \"api\" or \"session\")")]
    UnknownBackend(String),
    #[error("invalid page bounds: min {min} is greater than max {max}")]
    InvalidPageBounds { min: usize, max: usize },
}

/// Which summarization backend wraps the language model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BackendKind {
    /// Anthropic Messages API authenticated with an API key.
    #[default]
    Api,
    /// Web chat session authenticated with a session cookie.
    Session,
}

impl std::str::FromStr for BackendKind {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "api" => Ok(Self::Api),
            "session" => Ok(Self::Session),
            other => Err(ConfigError::UnknownBackend(other.to_string())),
        }
    }
}

/// Inclusive page-count range a PDF must fall into to be summarized.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageBounds {
    pub min: usize,
    pub max: usize,
}

impl Default for PageBounds {
    fn default() -> Self {
        Self {
            min: DEFAULT_MIN_PAGES,
            max: DEFAULT_MAX_PAGES,
        }
    }
}

impl PageBounds {
    pub fn contains(&self, pages: usize) -> bool {
        (self.min..=self.max).contains(&pages)
    }
}

/// Fully resolved runtime configuration.
#[derive(Clone)]
pub struct Config {
    pub model_name: String,
    pub backend: BackendKind,
    pub prompt_path: PathBuf,
    pub log_path: PathBuf,
    pub log_level: String,
    pub page_bounds: PageBounds,
    pub tags: TagNames,
    pub zotero_user_id: u64,
    pub zotero_api_key: String,
    pub zotero_base_url: String,
    /// Directory holding `{attachmentKey}.zip` archives.
    pub file_path: PathBuf,
    pub claude_api_key: Option<String>,
    pub claude_base_url: Option<String>,
    pub claude_session_key: Option<String>,
    pub claude_organization_id: Option<String>,
    pub claude_timeout_secs: u64,
    pub server_host: String,
    pub server_port: u16,
}

impl std::fmt::Debug for Config {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Config")
            .field("model_name", &self.model_name)
            .field("backend", &self.backend)
            .field("prompt_path", &self.prompt_path)
            .field("log_path", &self.log_path)
            .field("log_level", &self.log_level)
            .field("page_bounds", &self.page_bounds)
            .field("tags", &self.tags)
            .field("zotero_user_id", &self.zotero_user_id)
            .field("zotero_api_key", &"***")
            .field("zotero_base_url", &self.zotero_base_url)
            .field("file_path", &self.file_path)
            .field("claude_api_key", &self.claude_api_key.as_ref().map(|_| "***"))
            .field("claude_base_url", &self.claude_base_url)
            .field(
                "claude_session_key",
                &self.claude_session_key.as_ref().map(|_| "***"),
            )
            .field("claude_organization_id", &self.claude_organization_id)
            .field("claude_timeout_secs", &self.claude_timeout_secs)
            .field("server_host", &self.server_host)
            .field("server_port", &self.server_port)
            .finish()
    }
}

impl Config {
    /// Resolve a (possibly partial) on-disk config into a runtime config,
    /// filling defaults and rejecting missing credentials.
    pub fn from_file(file: ConfigFile) -> Result<Self, ConfigError> {
        let general = file.general.unwrap_or_default();
        let zotero = file.zotero.unwrap_or_default();
        let claude = file.claude.unwrap_or_default();
        let server = file.server.unwrap_or_default();

        let backend = match general.backend.as_deref() {
            Some(s) => s.parse()?,
            None => BackendKind::default(),
        };
        match backend {
            BackendKind::Api if claude.api_key.is_none() => {
                return Err(ConfigError::Missing("claude.api_key"));
            }
            BackendKind::Session if claude.session_key.is_none() => {
                return Err(ConfigError::Missing("claude.session_key"));
            }
            BackendKind::Session if claude.organization_id.is_none() => {
                return Err(ConfigError::Missing("claude.organization_id"));
            }
            _ => {}
        }

        let page_bounds = PageBounds {
            min: general.min_pages.unwrap_or(DEFAULT_MIN_PAGES),
            max: general.max_pages.unwrap_or(DEFAULT_MAX_PAGES),
        };
        if page_bounds.min > page_bounds.max {
            return Err(ConfigError::InvalidPageBounds {
                min: page_bounds.min,
                max: page_bounds.max,
            });
        }

        let defaults = TagNames::default();
        let tags = TagNames {
            todo: zotero.todo_tag_name.unwrap_or(defaults.todo),
            summarized: zotero.summarized_tag_name.unwrap_or(defaults.summarized),
            denied: zotero.deny_tag_name.unwrap_or(defaults.denied),
            error: zotero.error_tag_name.unwrap_or(defaults.error),
        };

        Ok(Self {
            model_name: general
                .model_name
                .ok_or(ConfigError::Missing("general.model_name"))?,
            backend,
            prompt_path: PathBuf::from(
                general
                    .prompt_path
                    .unwrap_or_else(|| DEFAULT_PROMPT_PATH.to_string()),
            ),
            log_path: PathBuf::from(
                general
                    .log_path
                    .unwrap_or_else(|| DEFAULT_LOG_PATH.to_string()),
            ),
            log_level: general.log_level.unwrap_or_else(|| "info".to_string()),
            page_bounds,
            tags,
            zotero_user_id: zotero
                .user_id
                .ok_or(ConfigError::Missing("zotero.user_id"))?,
            zotero_api_key: zotero
                .api_key
                .ok_or(ConfigError::Missing("zotero.api_key"))?,
            zotero_base_url: zotero
                .base_url
                .unwrap_or_else(|| DEFAULT_ZOTERO_BASE_URL.to_string()),
            file_path: PathBuf::from(
                zotero
                    .file_path
                    .unwrap_or_else(|| DEFAULT_FILE_PATH.to_string()),
            ),
            claude_api_key: claude.api_key,
            claude_base_url: claude.base_url,
            claude_session_key: claude.session_key,
            claude_organization_id: claude.organization_id,
            claude_timeout_secs: claude.timeout_secs.unwrap_or(DEFAULT_CLAUDE_TIMEOUT_SECS),
            server_host: server.host.unwrap_or_else(|| "0.0.0.0".to_string()),
            server_port: server.port.unwrap_or(5000),
        })
    }
}
