//! Engine configuration
//!
//! All knobs have defaults; a YAML file only needs the keys it overrides:
//!
//! ```yaml
//! max_depth: 6
//! default_limit: 50
//! indexed_properties:
//!   Unit: [identifier]
//! ```

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use thiserror::Error;
use tracing::info;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Cannot read config: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid config: {0}")]
    Parse(#[from] serde_yaml::Error),
}

pub type ConfigResult<T> = Result<T, ConfigError>;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Deepest relation level the serializer descends to
    pub max_depth: usize,

    /// Levels at which reference relations are emitted in full;
    /// beyond them a reference is an ID-only stub
    pub reference_depth: usize,

    /// Page size when a query sets no limit
    pub default_limit: i64,

    /// Bound on group-membership and scope-chain traversal
    pub max_group_depth: usize,

    /// Refuse group memberships that would close a cycle
    pub reject_group_cycles: bool,

    /// Capacity of the serializer's bundle cache; 0 disables it
    pub serializer_cache_size: usize,

    /// Extra secondary-index keys per type
    pub indexed_properties: BTreeMap<String, Vec<String>>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_depth: 10,
            reference_depth: 1,
            default_limit: 20,
            max_group_depth: 32,
            reject_group_cycles: true,
            serializer_cache_size: 100,
            indexed_properties: BTreeMap::new(),
        }
    }
}

impl EngineConfig {
    pub fn from_yaml_str(text: &str) -> ConfigResult<Self> {
        Ok(serde_yaml::from_str(text)?)
    }

    pub fn load(path: impl AsRef<Path>) -> ConfigResult<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)?;
        let config = Self::from_yaml_str(&text)?;
        info!("loaded engine config from {}", path.display());
        Ok(config)
    }
}
