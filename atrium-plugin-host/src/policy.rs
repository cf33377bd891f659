//! Execution policy — reads `policy.toml` and decides which plugins may
//! load components at all. Consulted by the registry before any compile.

use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

/// Policy mode over plugin ids.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PolicyMode {
    /// Only listed plugins may load components.
    Allowlist,
    /// All plugins except listed ones may load components.
    Denylist,
    #[default]
    /// No restrictions.
    Unrestricted,
}

/// Policy configuration parsed from `policy.toml`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PolicyConfig {
    #[serde(default)]
    pub mode: PolicyMode,
    /// Meaning depends on `mode`: the allowlist or the denylist.
    #[serde(default)]
    pub plugins: Vec<u64>,
}

/// Enforces the host's plugin execution policy.
pub struct SandboxPolicy {
    config: PolicyConfig,
    policy_path: Option<PathBuf>,
    loaded_at: DateTime<Utc>,
}

impl SandboxPolicy {
    /// Loads policy from an explicit path. A missing file means unrestricted;
    /// an unreadable or malformed file falls back to unrestricted with a
    /// warning rather than blocking every plugin.
    pub fn load_from(policy_path: PathBuf) -> Self {
        if !policy_path.exists() {
            info!(path = %policy_path.display(), "no policy file, running unrestricted");
            return Self {
                config: PolicyConfig::default(),
                policy_path: None,
                loaded_at: Utc::now(),
            };
        }

        let config = match std::fs::read_to_string(&policy_path) {
            Ok(contents) => match toml::from_str::<PolicyFile>(&contents) {
                Ok(file) => {
                    info!(path = %policy_path.display(), "loaded execution policy");
                    file.policy
                }
                Err(e) => {
                    warn!(
                        path = %policy_path.display(),
                        error = %e,
                        "failed to parse policy file, falling back to unrestricted"
                    );
                    PolicyConfig::default()
                }
            },
            Err(e) => {
                warn!(
                    path = %policy_path.display(),
                    error = %e,
                    "failed to read policy file, falling back to unrestricted"
                );
                PolicyConfig::default()
            }
        };

        Self {
            config,
            policy_path: Some(policy_path),
            loaded_at: Utc::now(),
        }
    }

    /// Policy with explicit config (tests, embedded hosts).
    pub fn with_config(config: PolicyConfig) -> Self {
        Self {
            config,
            policy_path: None,
            loaded_at: Utc::now(),
        }
    }

    /// The permissive default: every plugin may load.
    pub fn unrestricted() -> Self {
        Self::with_config(PolicyConfig::default())
    }

    /// Whether this plugin may load components.
    #[must_use]
    pub fn is_allowed(&self, plugin_id: u64) -> bool {
        match self.config.mode {
            PolicyMode::Unrestricted => true,
            PolicyMode::Allowlist => self.config.plugins.contains(&plugin_id),
            PolicyMode::Denylist => !self.config.plugins.contains(&plugin_id),
        }
    }

    /// Whether a policy file was found on disk.
    #[must_use]
    pub fn has_policy_file(&self) -> bool {
        self.policy_path.is_some()
    }

    #[must_use]
    pub fn config(&self) -> &PolicyConfig {
        &self.config
    }

    /// When this policy was read, for operator diagnostics.
    #[must_use]
    pub fn loaded_at(&self) -> DateTime<Utc> {
        self.loaded_at
    }
}

/// Raw TOML structure matching the policy.toml format.
#[derive(Deserialize)]
struct PolicyFile {
    #[serde(default)]
    policy: PolicyConfig,
}
