//! Process and mount configuration.
//!
//! The process reads a YAML file listing the listen address and one entry per
//! mount point. Each mount is the two-key mapping `target` / `pathBase`; keys
//! the proxy does not know about are ignored.

use std::collections::HashMap;
use std::path::Path;

use anyhow::Context;
use serde::Deserialize;

/// Environment variable naming the YAML config file.
pub const CONFIG_ENV: &str = "PREFIX_PROXY_CONFIG";
/// Environment variable overriding `server.listen_addr`.
pub const LISTEN_ENV: &str = "LISTEN";

const DEFAULT_CONFIG_PATH: &str = "prefix-proxy.yaml";
const DEFAULT_LISTEN_ADDR: &str = "127.0.0.1:8080";

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub mounts: Vec<MountConfig>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_listen_addr")]
    pub listen_addr: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen_addr: default_listen_addr(),
        }
    }
}

fn default_listen_addr() -> String {
    DEFAULT_LISTEN_ADDR.to_string()
}

/// How the target's query and the request's query are combined.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum QueryJoin {
    /// Drop empty sides before joining with `&`.
    #[default]
    SkipEmpty,
    /// Always join both sides with `&`, even when one or both are empty.
    Verbatim,
}

/// One mount point: an upstream target and the path prefix it owns.
///
/// A missing `target` deserializes to an empty string so that the failure is
/// reported by the handler factory as a configuration error, with the same
/// wording as any other unparsable target.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct MountConfig {
    #[serde(default)]
    pub target: String,
    #[serde(default, rename = "pathBase")]
    pub path_base: String,
    #[serde(default, rename = "queryJoin")]
    pub query_join: QueryJoin,
}

impl MountConfig {
    pub fn new(target: impl Into<String>, path_base: impl Into<String>) -> Self {
        Self {
            target: target.into(),
            path_base: path_base.into(),
            query_join: QueryJoin::default(),
        }
    }

    pub fn with_query_join(mut self, query_join: QueryJoin) -> Self {
        self.query_join = query_join;
        self
    }

    /// Builds a mount from a raw string mapping. Only `target`, `pathBase`
    /// and `queryJoin` are read.
    pub fn from_map(map: &HashMap<String, String>) -> anyhow::Result<Self> {
        let query_join = match map.get("queryJoin").map(String::as_str) {
            None | Some("skip-empty") => QueryJoin::SkipEmpty,
            Some("verbatim") => QueryJoin::Verbatim,
            Some(other) => anyhow::bail!("unknown queryJoin value {other:?}"),
        };

        Ok(Self {
            target: map.get("target").cloned().unwrap_or_default(),
            path_base: map.get("pathBase").cloned().unwrap_or_default(),
            query_join,
        })
    }
}

impl Config {
    /// Loads the config file named by `PREFIX_PROXY_CONFIG` (or the default
    /// path) and applies the `LISTEN` override.
    pub fn load() -> anyhow::Result<Self> {
        let path = std::env::var(CONFIG_ENV).unwrap_or_else(|_| DEFAULT_CONFIG_PATH.to_string());
        let mut config = Self::from_file(&path)?;
        config.apply_listen_override(std::env::var(LISTEN_ENV).ok());
        Ok(config)
    }

    pub fn from_file(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config file {}", path.display()))?;
        Self::from_yaml_str(&raw)
            .with_context(|| format!("invalid config file {}", path.display()))
    }

    pub fn from_yaml_str(raw: &str) -> anyhow::Result<Self> {
        let config = serde_yaml::from_str(raw).context("failed to parse YAML config")?;
        Ok(config)
    }

    pub fn apply_listen_override(&mut self, listen_addr: Option<String>) {
        if let Some(addr) = listen_addr.filter(|a| !a.is_empty()) {
            self.server.listen_addr = addr;
        }
    }
}
