//! Tree configuration
//!
//! All fields use `#[serde(default)]` so a partial JSON config file
//! deserializes without error. Environment variables are overlaid on top of
//! the defaults by `TreeConfig::from_env()`.

use crate::db::DEFAULT_BUSY_TIMEOUT_MS;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

pub const ENV_DATABASE_PATH: &str = "CATEGORY_TREE_DB";
pub const ENV_BUSY_TIMEOUT_MS: &str = "CATEGORY_TREE_BUSY_TIMEOUT_MS";
pub const ENV_MAX_RETRIES: &str = "CATEGORY_TREE_MAX_RETRIES";
pub const ENV_RESET_ORDER: &str = "CATEGORY_TREE_RESET_ORDER";

/// Order in which `reset_all` lays out the flattened categories
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResetOrder {
    /// Case-insensitive title, ties broken by id
    #[default]
    Title,
    Id,
}

impl std::str::FromStr for ResetOrder {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "title" => Ok(Self::Title),
            "id" => Ok(Self::Id),
            other => Err(format!("unknown reset order '{}'", other)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TreeConfig {
    #[serde(default = "default_database_path")]
    pub database_path: PathBuf,

    /// How long a connection waits on another writer's lock
    #[serde(default = "default_busy_timeout_ms")]
    pub busy_timeout_ms: u64,

    /// Extra attempts `ConflictRetry` makes after a `StorageConflict`
    #[serde(default = "default_max_conflict_retries")]
    pub max_conflict_retries: u32,

    #[serde(default)]
    pub reset_order: ResetOrder,

    #[serde(default = "default_event_channel_capacity")]
    pub event_channel_capacity: usize,
}

impl Default for TreeConfig {
    fn default() -> Self {
        Self {
            database_path: default_database_path(),
            busy_timeout_ms: default_busy_timeout_ms(),
            max_conflict_retries: default_max_conflict_retries(),
            reset_order: ResetOrder::default(),
            event_channel_capacity: default_event_channel_capacity(),
        }
    }
}

fn default_database_path() -> PathBuf {
    PathBuf::from("./data/categories.db")
}

fn default_busy_timeout_ms() -> u64 {
    DEFAULT_BUSY_TIMEOUT_MS
}

fn default_max_conflict_retries() -> u32 {
    3
}

fn default_event_channel_capacity() -> usize {
    128
}

impl TreeConfig {
    /// Defaults overlaid with the `CATEGORY_TREE_*` environment variables
    pub fn from_env() -> Self {
        Self::default().overlay(|key| std::env::var(key).ok())
    }

    /// Overlay values from `lookup` on top of `self`
    ///
    /// Unparsable values are ignored with a warning and the current value kept.
    pub fn overlay(mut self, lookup: impl Fn(&str) -> Option<String>) -> Self {
        if let Some(path) = lookup(ENV_DATABASE_PATH).filter(|p| !p.trim().is_empty()) {
            self.database_path = PathBuf::from(path);
        }

        if let Some(raw) = lookup(ENV_BUSY_TIMEOUT_MS) {
            match raw.trim().parse() {
                Ok(ms) => self.busy_timeout_ms = ms,
                Err(_) => tracing::warn!(key = ENV_BUSY_TIMEOUT_MS, value = %raw, "Ignoring invalid value"),
            }
        }

        if let Some(raw) = lookup(ENV_MAX_RETRIES) {
            match raw.trim().parse() {
                Ok(retries) => self.max_conflict_retries = retries,
                Err(_) => tracing::warn!(key = ENV_MAX_RETRIES, value = %raw, "Ignoring invalid value"),
            }
        }

        if let Some(raw) = lookup(ENV_RESET_ORDER) {
            match raw.parse() {
                Ok(order) => self.reset_order = order,
                Err(e) => tracing::warn!(key = ENV_RESET_ORDER, error = %e, "Ignoring invalid value"),
            }
        }

        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_defaults() {
        let config = TreeConfig::default();
        assert_eq!(config.database_path, PathBuf::from("./data/categories.db"));
        assert_eq!(config.busy_timeout_ms, 5000);
        assert_eq!(config.max_conflict_retries, 3);
        assert_eq!(config.reset_order, ResetOrder::Title);
        assert_eq!(config.event_channel_capacity, 128);
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let config: TreeConfig =
            serde_json::from_str(r#"{"reset_order": "id", "busy_timeout_ms": 250}"#).unwrap();
        assert_eq!(config.reset_order, ResetOrder::Id);
        assert_eq!(config.busy_timeout_ms, 250);
        assert_eq!(config.max_conflict_retries, 3);
    }

    #[test]
    fn test_overlay_ignores_garbage() {
        let env: HashMap<&str, &str> = [
            (ENV_DATABASE_PATH, "/tmp/cats.db"),
            (ENV_BUSY_TIMEOUT_MS, "soon"),
            (ENV_MAX_RETRIES, "5"),
            (ENV_RESET_ORDER, "ID"),
        ]
        .into_iter()
        .collect();

        let config = TreeConfig::default().overlay(|key| env.get(key).map(|v| v.to_string()));
        assert_eq!(config.database_path, PathBuf::from("/tmp/cats.db"));
        assert_eq!(config.busy_timeout_ms, 5000);
        assert_eq!(config.max_conflict_retries, 5);
        assert_eq!(config.reset_order, ResetOrder::Id);
    }
}
