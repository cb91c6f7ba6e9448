//! Runtime configuration.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::error::PipelineError;
use crate::graph::DATA_CATEGORY;

/// Pattern selecting the policy provider when none is configured.
pub const DEFAULT_POLICY_PATTERN: &str = "//colour/icc";
/// Upper bound on pull requests issued by a single render call.
const DEFAULT_MAX_RENDER_PASSES: usize = 1 << 24;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RuntimeConfig {
    /// Pattern locating the policy provider in the registry.
    pub policy_pattern: String,
    /// Connector category the policy walk follows.
    pub data_category: String,
    /// Machine-wide defaults layer.
    pub system_policy: Option<PathBuf>,
    /// Per-user defaults layer, applied over the system layer.
    pub user_policy: Option<PathBuf>,
    /// Log policy decisions at info level instead of debug.
    pub verbose: bool,
    pub max_render_passes: usize,
}

impl RuntimeConfig {
    /// Built-in values, ignoring the environment.
    pub fn builtin() -> Self {
        Self {
            policy_pattern: DEFAULT_POLICY_PATTERN.to_owned(),
            data_category: DATA_CATEGORY.to_owned(),
            system_policy: None,
            user_policy: None,
            verbose: false,
            max_render_passes: DEFAULT_MAX_RENDER_PASSES,
        }
    }

    pub fn from_json(text: &str) -> Result<Self, PipelineError> {
        Ok(serde_json::from_str(text)?)
    }
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        let builtin = Self::builtin();
        Self {
            policy_pattern: std::env::var("TINCTURE_POLICY_PATTERN")
                .ok()
                .filter(|s| !s.is_empty())
                .unwrap_or(builtin.policy_pattern),
            system_policy: std::env::var("TINCTURE_SYSTEM_POLICY").ok().map(PathBuf::from),
            user_policy: std::env::var("TINCTURE_USER_POLICY")
                .ok()
                .map(PathBuf::from)
                .or_else(|| config_dir().map(|dir| dir.join("policy.json"))),
            verbose: std::env::var("TINCTURE_VERBOSE").is_ok(),
            max_render_passes: std::env::var("TINCTURE_MAX_RENDER_PASSES")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(builtin.max_render_passes),
            ..builtin
        }
    }
}

fn config_dir() -> Option<PathBuf> {
    if let Ok(xdg) = std::env::var("XDG_CONFIG_HOME") {
        Some(PathBuf::from(xdg).join("tincture"))
    } else if let Ok(home) = std::env::var("HOME") {
        Some(PathBuf::from(home).join(".config/tincture"))
    } else {
        None
    }
}
