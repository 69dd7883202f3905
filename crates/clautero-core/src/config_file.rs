use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// A config source that exists but cannot be used.
#[derive(Error, Debug)]
pub enum ConfigFileError {
    #[error("cannot read config file {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("cannot parse config file {path}: {source}")]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },
    #[error("environment variable {name} has invalid value {value:?}")]
    InvalidEnv { name: &'static str, value: String },
}

/// On-disk TOML configuration structure.
/// All fields are optional so partial configs work (merge with defaults).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ConfigFile {
    pub general: Option<GeneralConfig>,
    pub zotero: Option<ZoteroConfig>,
    pub claude: Option<ClaudeConfig>,
    pub server: Option<ServerConfig>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GeneralConfig {
    pub model_name: Option<String>,
    /// `api` (Anthropic Messages API) or `session` (web chat session).
    pub backend: Option<String>,
    pub prompt_path: Option<String>,
    pub log_path: Option<String>,
    pub log_level: Option<String>,
    pub min_pages: Option<usize>,
    pub max_pages: Option<usize>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ZoteroConfig {
    pub user_id: Option<u64>,
    pub api_key: Option<String>,
    pub todo_tag_name: Option<String>,
    pub summarized_tag_name: Option<String>,
    pub deny_tag_name: Option<String>,
    pub error_tag_name: Option<String>,
    /// Directory holding `{attachmentKey}.zip` archives.
    pub file_path: Option<String>,
    pub base_url: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ClaudeConfig {
    pub api_key: Option<String>,
    pub base_url: Option<String>,
    pub session_key: Option<String>,
    pub organization_id: Option<String>,
    pub timeout_secs: Option<u64>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ServerConfig {
    pub host: Option<String>,
    pub port: Option<u16>,
}

/// Platform config directory path: `<config_dir>/clautero/config.toml`.
pub fn config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("clautero").join("config.toml"))
}

/// Load config by cascading CWD `clautero.toml` over platform config.
/// CWD values override platform values. Missing files are skipped; a file
/// that exists but does not parse is an error.
pub fn load_config() -> Result<ConfigFile, ConfigFileError> {
    let platform = match config_path() {
        Some(p) => load_from_path(&p)?,
        None => None,
    };
    let cwd = load_from_path(Path::new("clautero.toml"))?;

    Ok(match (platform, cwd) {
        (None, None) => ConfigFile::default(),
        (Some(p), None) => p,
        (None, Some(c)) => c,
        (Some(p), Some(c)) => merge(p, c),
    })
}

/// Load a config from a specific path. Returns `Ok(None)` if the file
/// doesn't exist.
pub fn load_from_path(path: &Path) -> Result<Option<ConfigFile>, ConfigFileError> {
    let content = match std::fs::read_to_string(path) {
        Ok(content) => content,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(source) => {
            return Err(ConfigFileError::Read {
                path: path.to_path_buf(),
                source,
            });
        }
    };
    toml::from_str(&content)
        .map(Some)
        .map_err(|source| ConfigFileError::Parse {
            path: path.to_path_buf(),
            source,
        })
}

fn pick<S, T>(
    overlay: &Option<S>,
    base: &Option<S>,
    field: impl Fn(&S) -> Option<T>,
) -> Option<T> {
    overlay
        .as_ref()
        .and_then(&field)
        .or_else(|| base.as_ref().and_then(&field))
}

/// Merge two configs: `overlay` values take precedence over `base`.
pub fn merge(base: ConfigFile, overlay: ConfigFile) -> ConfigFile {
    let (bg, og) = (&base.general, &overlay.general);
    let (bz, oz) = (&base.zotero, &overlay.zotero);
    let (bc, oc) = (&base.claude, &overlay.claude);
    let (bs, os) = (&base.server, &overlay.server);

    ConfigFile {
        general: Some(GeneralConfig {
            model_name: pick(og, bg, |g| g.model_name.clone()),
            backend: pick(og, bg, |g| g.backend.clone()),
            prompt_path: pick(og, bg, |g| g.prompt_path.clone()),
            log_path: pick(og, bg, |g| g.log_path.clone()),
            log_level: pick(og, bg, |g| g.log_level.clone()),
            min_pages: pick(og, bg, |g| g.min_pages),
            max_pages: pick(og, bg, |g| g.max_pages),
        }),
        zotero: Some(ZoteroConfig {
            user_id: pick(oz, bz, |z| z.user_id),
            api_key: pick(oz, bz, |z| z.api_key.clone()),
            todo_tag_name: pick(oz, bz, |z| z.todo_tag_name.clone()),
            summarized_tag_name: pick(oz, bz, |z| z.summarized_tag_name.clone()),
            deny_tag_name: pick(oz, bz, |z| z.deny_tag_name.clone()),
            error_tag_name: pick(oz, bz, |z| z.error_tag_name.clone()),
            file_path: pick(oz, bz, |z| z.file_path.clone()),
            base_url: pick(oz, bz, |z| z.base_url.clone()),
        }),
        claude: Some(ClaudeConfig {
            api_key: pick(oc, bc, |c| c.api_key.clone()),
            base_url: pick(oc, bc, |c| c.base_url.clone()),
            session_key: pick(oc, bc, |c| c.session_key.clone()),
            organization_id: pick(oc, bc, |c| c.organization_id.clone()),
            timeout_secs: pick(oc, bc, |c| c.timeout_secs),
        }),
        server: Some(ServerConfig {
            host: pick(os, bs, |s| s.host.clone()),
            port: pick(os, bs, |s| s.port),
        }),
    }
}

/// Apply environment variable overrides on top of a loaded config.
///
/// Secrets are commonly kept out of the TOML file and supplied through
/// `.env` instead.
pub fn apply_env(config: ConfigFile) -> Result<ConfigFile, ConfigFileError> {
    apply_env_from(config, |name| std::env::var(name).ok())
}

fn apply_env_from(
    mut config: ConfigFile,
    var: impl Fn(&str) -> Option<String>,
) -> Result<ConfigFile, ConfigFileError> {
    let zotero = config.zotero.get_or_insert_with(Default::default);
    if let Some(key) = var("ZOTERO_API_KEY") {
        zotero.api_key = Some(key);
    }
    if let Some(id) = var("ZOTERO_USER_ID") {
        let parsed = id.trim().parse().map_err(|_| ConfigFileError::InvalidEnv {
            name: "ZOTERO_USER_ID",
            value: id.clone(),
        })?;
        zotero.user_id = Some(parsed);
    }

    let claude = config.claude.get_or_insert_with(Default::default);
    if let Some(key) = var("ANTHROPIC_API_KEY") {
        claude.api_key = Some(key);
    }
    if let Some(key) = var("CLAUDE_SESSION_KEY") {
        claude.session_key = Some(key);
    }

    if let Some(model) = var("CLAUTERO_MODEL") {
        config.general.get_or_insert_with(Default::default).model_name = Some(model);
    }
    Ok(config)
}

const REDACTED: &str = "***";

impl ConfigFile {
    /// Copy with every credential replaced by `***`, for display.
    pub fn redacted(&self) -> ConfigFile {
        let mut copy = self.clone();
        let hide = |v: &mut Option<String>| {
            if v.is_some() {
                *v = Some(REDACTED.to_string());
            }
        };
        if let Some(zotero) = copy.zotero.as_mut() {
            hide(&mut zotero.api_key);
        }
        if let Some(claude) = copy.claude.as_mut() {
            hide(&mut claude.api_key);
            hide(&mut claude.session_key);
        }
        copy
    }
}
