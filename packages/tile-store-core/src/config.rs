//! Storage configuration.
//!
//! Loaded from JSON with every field optional, then adjusted by environment
//! variables prefixed with `TILESTORE_`.

use std::env;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::StoreError;
use crate::storage::LayoutType;

/// Prefix of environment variable overrides.
pub const ENV_PREFIX: &str = "TILESTORE_";

/// Storage configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Slots per tile group
    pub tuples_per_tile_group: u32,
    /// Tile groups filled concurrently per table
    pub active_tile_group_count: usize,
    /// Cells per indirection array
    pub indirection_array_size: u32,
    /// Indirection arrays filled concurrently per table
    pub active_indirection_array_count: usize,
    /// Column-to-tile layout of new tables
    pub layout: LayoutType,
    /// Deepest chain of cascading foreign key actions
    pub max_cascade_depth: usize,
    /// Whether retired versions are reclaimed and their slots reused
    pub gc_enabled: bool,
    /// Versions reclaimed per collection pass
    pub gc_max_attempts: usize,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            tuples_per_tile_group: 1000,
            active_tile_group_count: 1,
            indirection_array_size: 4096,
            active_indirection_array_count: 1,
            layout: LayoutType::Row,
            max_cascade_depth: 16,
            gc_enabled: true,
            gc_max_attempts: 1000,
        }
    }
}

fn invalid(field: &str, value: impl std::fmt::Display) -> StoreError {
    StoreError::Config(format!("Invalid {}: {}", field, value))
}

fn parse<T: std::str::FromStr>(field: &str, value: &str) -> Result<T, StoreError> {
    value.trim().parse().map_err(|_| invalid(field, value))
}

impl StoreConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Loads configuration from a JSON file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let content = std::fs::read_to_string(path.as_ref())
            .map_err(|e| StoreError::Config(format!("Failed to read config file: {}", e)))?;
        Self::from_json(&content)
    }

    /// Parses configuration from a JSON string and validates it.
    pub fn from_json(json: &str) -> Result<Self, StoreError> {
        let config: Self = serde_json::from_str(json)
            .map_err(|e| StoreError::Config(format!("Invalid JSON: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Serializes the configuration as pretty JSON.
    pub fn to_json(&self) -> Result<String, StoreError> {
        serde_json::to_string_pretty(self)
            .map_err(|e| StoreError::Config(format!("Failed to serialize config: {}", e)))
    }

    /// Applies `TILESTORE_*` environment variables.
    /// Example: `TILESTORE_TUPLES_PER_TILE_GROUP=64`.
    pub fn apply_env_overrides(&mut self) -> Result<(), StoreError> {
        self.apply_overrides(env::vars())
    }

    /// Applies `TILESTORE_*` overrides from an explicit variable list.
    /// Unknown variables are ignored.
    pub fn apply_overrides<I, K, V>(&mut self, vars: I) -> Result<(), StoreError>
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: AsRef<str>,
    {
        for (key, value) in vars {
            let Some(name) = key.as_ref().strip_prefix(ENV_PREFIX) else {
                continue;
            };
            let value = value.as_ref();
            match name {
                "TUPLES_PER_TILE_GROUP" => {
                    self.tuples_per_tile_group = parse("tuples_per_tile_group", value)?
                }
                "ACTIVE_TILE_GROUP_COUNT" => {
                    self.active_tile_group_count = parse("active_tile_group_count", value)?
                }
                "INDIRECTION_ARRAY_SIZE" => {
                    self.indirection_array_size = parse("indirection_array_size", value)?
                }
                "ACTIVE_INDIRECTION_ARRAY_COUNT" => {
                    self.active_indirection_array_count =
                        parse("active_indirection_array_count", value)?
                }
                "LAYOUT" => {
                    self.layout = match value.trim().to_ascii_lowercase().as_str() {
                        "row" => LayoutType::Row,
                        "column" => LayoutType::Column,
                        _ => return Err(invalid("layout", value)),
                    }
                }
                "MAX_CASCADE_DEPTH" => self.max_cascade_depth = parse("max_cascade_depth", value)?,
                "GC_ENABLED" => self.gc_enabled = parse("gc_enabled", value)?,
                "GC_MAX_ATTEMPTS" => self.gc_max_attempts = parse("gc_max_attempts", value)?,
                _ => {}
            }
        }
        self.validate()
    }

    /// Rejects values the storage layer cannot work with.
    pub fn validate(&self) -> Result<(), StoreError> {
        if self.tuples_per_tile_group == 0 {
            return Err(invalid("tuples_per_tile_group", 0));
        }
        if self.active_tile_group_count == 0 {
            return Err(invalid("active_tile_group_count", 0));
        }
        if self.indirection_array_size == 0 {
            return Err(invalid("indirection_array_size", 0));
        }
        if self.active_indirection_array_count == 0 {
            return Err(invalid("active_indirection_array_count", 0));
        }
        if self.max_cascade_depth == 0 {
            return Err(invalid("max_cascade_depth", 0));
        }
        if self.gc_max_attempts == 0 {
            return Err(invalid("gc_max_attempts", 0));
        }
        Ok(())
    }
}
