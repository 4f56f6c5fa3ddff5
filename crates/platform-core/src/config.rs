use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::error::{PlatformError, Result};

/// Top-level configuration for the Platform console.
///
/// Loaded from `./platform.toml` by default. Each section corresponds to one
/// subsystem of the action core.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PlatformConfig {
    #[serde(default)]
    pub general: GeneralConfig,
    #[serde(default)]
    pub registry: RegistryConfig,
    #[serde(default)]
    pub discovery: DiscoveryConfig,
    #[serde(default)]
    pub audit: AuditConfig,
}

impl PlatformConfig {
    /// Load configuration from a TOML file.
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: PlatformConfig = toml::from_str(&content)?;
        info!("Configuration loaded from {}", path.display());
        Ok(config)
    }

    /// Load configuration from a TOML file, falling back to defaults if the
    /// file does not exist or cannot be parsed.
    pub fn load_or_default(path: &Path) -> Self {
        match Self::load(path) {
            Ok(config) => config,
            Err(e) => {
                warn!(
                    "Failed to load config from {}: {}. Using defaults.",
                    path.display(),
                    e
                );
                Self::default()
            }
        }
    }

    /// Save the current configuration to a TOML file.
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let content =
            toml::to_string_pretty(self).map_err(|e| PlatformError::Config(e.to_string()))?;
        std::fs::write(path, content)?;
        info!("Configuration saved to {}", path.display());
        Ok(())
    }
}

/// General application settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    /// Log level: trace, debug, info, warn, error.
    pub log_level: String,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
        }
    }
}

/// Controller registry behaviour, resolved once at construction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RegistryConfig {
    /// Persist every execution attempt through the audit sink.
    pub enable_audit_logging: bool,
    /// Authorize callers before running an action.
    pub enable_permission_checking: bool,
    /// Gate matching actions behind their approval workflow.
    pub enable_approval_workflows: bool,
    /// Time an action body may run before the caller stops waiting.
    pub default_timeout_ms: u64,
    /// Upper bound on actions a single page controller may declare.
    pub max_actions_per_page: usize,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            enable_audit_logging: true,
            enable_permission_checking: true,
            enable_approval_workflows: true,
            default_timeout_ms: 30_000,
            max_actions_per_page: 50,
        }
    }
}

/// Action discovery limits.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DiscoveryConfig {
    pub default_limit: usize,
    pub max_suggestions: usize,
    pub max_related_queries: usize,
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            default_limit: 10,
            max_suggestions: 5,
            max_related_queries: 3,
        }
    }
}

/// Where audit records are persisted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditSinkKind {
    /// Kept in process memory only.
    Memory,
    /// Written as structured log lines.
    Log,
    /// Appended to a JSON-lines file.
    Jsonl,
}

/// Audit sink configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AuditConfig {
    pub sink: AuditSinkKind,
    /// File path for the `jsonl` sink.
    pub path: PathBuf,
}

impl Default for AuditConfig {
    fn default() -> Self {
        Self {
            sink: AuditSinkKind::Log,
            path: PathBuf::from("audit.jsonl"),
        }
    }
}
