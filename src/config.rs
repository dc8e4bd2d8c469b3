use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::gitproxy::{Account, DEFAULT_MAX_BUFFERED_OUTPUT};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub repositories: RepositoriesConfig,
    #[serde(default)]
    pub git: GitConfig,
    #[serde(default)]
    pub module_proxy: ModuleProxyConfig,
    #[serde(default)]
    pub users: Vec<Account>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_bind_address")]
    pub bind_address: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RepositoriesConfig {
    /// directory holding the bare repositories
    #[serde(default = "default_repos_dir")]
    pub dir: PathBuf,
    /// import path prefix every repository is served under
    #[serde(default = "default_domain")]
    pub domain: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GitConfig {
    #[serde(default = "default_upload_pack")]
    pub upload_pack: PathBuf,
    #[serde(default = "default_receive_pack")]
    pub receive_pack: PathBuf,
    /// largest accepted request body after inflating, unlimited when unset
    #[serde(default)]
    pub max_request_bytes: Option<usize>,
    /// pack output held back before a response is committed
    #[serde(default = "default_max_buffered_output")]
    pub max_buffered_output: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModuleProxyConfig {
    /// URL prefix the module proxy is mounted at
    #[serde(default = "default_module_prefix")]
    pub prefix: String,
}

fn default_bind_address() -> String {
    "127.0.0.1:8080".to_string()
}

fn default_repos_dir() -> PathBuf {
    PathBuf::from("repositories")
}

fn default_domain() -> String {
    "localhost".to_string()
}

fn default_upload_pack() -> PathBuf {
    PathBuf::from("git-upload-pack")
}

fn default_receive_pack() -> PathBuf {
    PathBuf::from("git-receive-pack")
}

fn default_max_buffered_output() -> usize {
    DEFAULT_MAX_BUFFERED_OUTPUT
}

fn default_module_prefix() -> String {
    "/api/module/".to_string()
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_address: default_bind_address(),
        }
    }
}

impl Default for RepositoriesConfig {
    fn default() -> Self {
        Self {
            dir: default_repos_dir(),
            domain: default_domain(),
        }
    }
}

impl Default for GitConfig {
    fn default() -> Self {
        Self {
            upload_pack: default_upload_pack(),
            receive_pack: default_receive_pack(),
            max_request_bytes: None,
            max_buffered_output: default_max_buffered_output(),
        }
    }
}

impl Default for ModuleProxyConfig {
    fn default() -> Self {
        Self {
            prefix: default_module_prefix(),
        }
    }
}

impl Config {
    /// Load config from `path`, or use the defaults when no path is given.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let Some(path) = path else {
            return Ok(Config::default());
        };
        let content =
            fs::read_to_string(path).with_context(|| format!("Failed to read config file {}", path.display()))?;
        Self::parse(&content).with_context(|| format!("Failed to parse config file {}", path.display()))
    }

    pub fn parse(content: &str) -> Result<Self> {
        let mut config: Config = toml::from_str(content)?;
        config.module_proxy.prefix = normalize_prefix(&config.module_proxy.prefix);
        Ok(config)
    }
}

/// `/api/module` and `api/module/` both become `/api/module/`.
fn normalize_prefix(prefix: &str) -> String {
    let trimmed = prefix.trim_matches('/');
    if trimmed.is_empty() {
        "/".to_string()
    } else {
        format!("/{}/", trimmed)
    }
}
