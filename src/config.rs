//! Application configuration.
//!
//! Sources, later wins:
//! 1. Built-in defaults
//! 2. Optional YAML file (`$OLLAMA_BRIDGE_CONFIG`, else
//!    `<config_dir>/ollama-mcp-bridge/config.yaml`), with `${VAR}` and
//!    `${VAR:-default}` interpolation
//! 3. Environment variables

use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::ollama::PullEndPolicy;

/// Env var naming an explicit config file.
pub const CONFIG_PATH_ENV: &str = "OLLAMA_BRIDGE_CONFIG";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read {path}: {reason}")]
    Read { path: String, reason: String },

    #[error("failed to parse {path}: {reason}")]
    Parse { path: String, reason: String },

    #[error("invalid value for {key}: {reason}")]
    Invalid { key: String, reason: String },

    #[error("{path} references ${{{var}}}, which is unset and has no default")]
    Unresolved { path: String, var: String },

    #[error("{path}: unterminated '${{' at byte {offset}")]
    Unterminated { path: String, offset: usize },
}

// ─── Types ───────────────────────────────────────────────────────────────────

/// Log output format.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

impl FromStr for LogFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "pretty" | "text" => Ok(LogFormat::Pretty),
            "json" => Ok(LogFormat::Json),
            other => Err(format!("unknown log format '{other}'")),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Ollama daemon base URL.
    pub ollama_base_url: String,
    /// Model used when a request names none.
    pub default_model: String,
    /// Base URL of the envelope endpoint the client talks to.
    pub mcp_base_url: String,
    /// Static bearer token, checked by the server and sent by the client.
    pub api_key: String,
    pub bind_addr: String,
    pub pull_end_policy: PullEndPolicy,
    pub log_format: LogFormat,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            ollama_base_url: "http://localhost:11434".into(),
            default_model: "llama3.2".into(),
            mcp_base_url: "http://localhost:3000".into(),
            api_key: "demo-api-key".into(),
            bind_addr: "127.0.0.1:3000".into(),
            pull_end_policy: PullEndPolicy::default(),
            log_format: LogFormat::default(),
        }
    }
}

// ─── Loading ─────────────────────────────────────────────────────────────────

impl AppConfig {
    /// Load from every source.
    pub fn load() -> Result<Self, ConfigError> {
        let mut config = match config_path() {
            Some(ConfigPath { path, explicit }) if explicit || path.exists() => Self::from_file(&path)?,
            _ => Self::default(),
        };
        config.apply_overrides(|key| std::env::var(key).ok())?;
        Ok(config)
    }

    /// Parse a YAML file, resolving variables from the process environment.
    /// Missing keys keep their defaults.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path).map_err(|e| ConfigError::Read {
            path: path.display().to_string(),
            reason: e.to_string(),
        })?;
        let config = Self::from_yaml(&raw, &path.display().to_string(), |var| std::env::var(var).ok())?;
        tracing::debug!(path = %path.display(), "loaded config file");
        Ok(config)
    }

    /// Parse YAML text from `origin`, resolving `${VAR}` references through
    /// `lookup`.
    pub fn from_yaml<F>(raw: &str, origin: &str, lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let text = substitute_vars(raw, origin, &lookup)?;
        if text.trim().is_empty() {
            return Ok(Self::default());
        }
        serde_yaml::from_str(&text).map_err(|e| ConfigError::Parse {
            path: origin.to_string(),
            reason: e.to_string(),
        })
    }

    /// Apply variable overrides from `lookup` (the process environment in
    /// production).
    pub fn apply_overrides<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let set = |target: &mut String, key: &str| {
            if let Some(value) = lookup(key).filter(|v| !v.is_empty()) {
                *target = value;
            }
        };
        set(&mut self.ollama_base_url, "OLLAMA_BASE_URL");
        set(&mut self.default_model, "OLLAMA_DEFAULT_MODEL");
        set(&mut self.mcp_base_url, "MCP_SERVER_URL");
        set(&mut self.api_key, "MCP_API_KEY");
        set(&mut self.bind_addr, "BIND_ADDR");

        if let Some(value) = lookup("PULL_END_POLICY").filter(|v| !v.is_empty()) {
            self.pull_end_policy = value.parse().map_err(|reason| ConfigError::Invalid {
                key: "PULL_END_POLICY".into(),
                reason,
            })?;
        }
        if let Some(value) = lookup("LOG_FORMAT").filter(|v| !v.is_empty()) {
            self.log_format = value.parse().map_err(|reason| ConfigError::Invalid {
                key: "LOG_FORMAT".into(),
                reason,
            })?;
        }
        Ok(())
    }
}

struct ConfigPath {
    path: PathBuf,
    explicit: bool,
}

/// An explicit path must exist; the platform default is optional.
fn config_path() -> Option<ConfigPath> {
    match std::env::var(CONFIG_PATH_ENV) {
        Ok(path) if !path.is_empty() => Some(ConfigPath {
            path: PathBuf::from(home_relative(&path)),
            explicit: true,
        }),
        _ => dirs::config_dir().map(|dir| ConfigPath {
            path: dir.join("ollama-mcp-bridge").join("config.yaml"),
            explicit: false,
        }),
    }
}

/// Substitute `${VAR}` and `${VAR:-fallback}` references.
///
/// `${VAR}` requires `VAR` to be set (an empty value is kept). The fallback
/// form also applies when `VAR` is empty, and a leading `~/` in the fallback
/// resolves against the home directory. Text without `${` passes through
/// untouched, including lone `$` signs.
fn substitute_vars<F>(raw: &str, origin: &str, lookup: &F) -> Result<String, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    let mut out = String::with_capacity(raw.len());
    let mut rest = raw;

    while let Some(open) = rest.find("${") {
        out.push_str(&rest[..open]);
        let after = &rest[open + 2..];
        let close = after.find('}').ok_or_else(|| ConfigError::Unterminated {
            path: origin.to_string(),
            offset: raw.len() - rest.len() + open,
        })?;

        let reference = &after[..close];
        let value = match reference.split_once(":-") {
            Some((var, fallback)) => lookup(var.trim())
                .filter(|v| !v.is_empty())
                .unwrap_or_else(|| home_relative(fallback)),
            None => lookup(reference.trim()).ok_or_else(|| ConfigError::Unresolved {
                path: origin.to_string(),
                var: reference.trim().to_string(),
            })?,
        };
        out.push_str(&value);
        rest = &after[close + 1..];
    }

    out.push_str(rest);
    Ok(out)
}

/// `~` or `~/...` against the home directory. `~user` forms are left alone.
fn home_relative(path: &str) -> String {
    let tail = match path.strip_prefix('~') {
        Some(tail) if tail.is_empty() || tail.starts_with('/') => tail,
        _ => return path.to_string(),
    };
    match dirs::home_dir() {
        Some(home) => format!("{}{tail}", home.display()),
        None => path.to_string(),
    }
}

// ─── Tests ───────────────────────────────────────────────────────────────────
