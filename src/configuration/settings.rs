use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{anyhow, bail, Context, Result};
use serde::{Deserialize, Serialize};

use crate::cache::BoundedCache;
use crate::models::encryption::{KeySecret, DEFAULT_ITERATIONS};
use crate::models::{KeyManager, RetentionPolicy};

/// Application directory name under the platform config dir
pub const APP_DIR: &str = "carelog";
/// Default config file name
pub const CONFIG_FILE: &str = "config.toml";

/// Upper bounds accepted by `validate`
pub const MAX_RETENTION_YEARS: u32 = 100;
pub const MAX_TERM_MONTHS: u32 = 1200;
pub const MAX_NOTICE_DAYS: u32 = 3650;
pub const MAX_WINDOW_MINUTES: i64 = 7 * 24 * 60;

/// Top-level settings for the compliance core
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ComplianceConfig {
    /// Identifier stamped on every audit entry
    pub system_id: String,
    /// JSON-lines audit trail used by the CLI
    pub audit_log_path: Option<PathBuf>,
    pub encryption: EncryptionConfig,
    pub retention: RetentionPolicy,
    pub agreements: AgreementConfig,
    pub patterns: PatternThresholds,
    pub report: ReportConfig,
}

impl Default for ComplianceConfig {
    fn default() -> Self {
        Self {
            system_id: APP_DIR.to_string(),
            audit_log_path: None,
            encryption: EncryptionConfig::default(),
            retention: RetentionPolicy::default(),
            agreements: AgreementConfig::default(),
            patterns: PatternThresholds::default(),
            report: ReportConfig::default(),
        }
    }
}

/// One key version. The secret itself is read from an environment
/// variable and never written to the config file.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct KeyEntry {
    pub version: u32,
    /// Name of the environment variable holding the base secret
    pub secret_env: String,
    pub salt: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct EncryptionConfig {
    /// PBKDF2 iterations
    pub iterations: u32,
    /// Version for new encryption; highest registered when unset
    pub active_version: Option<u32>,
    pub keys: Vec<KeyEntry>,
    /// Memoized key derivations
    pub derivation_cache_size: usize,
}

impl Default for EncryptionConfig {
    fn default() -> Self {
        Self {
            iterations: DEFAULT_ITERATIONS,
            active_version: None,
            keys: Vec::new(),
            derivation_cache_size: 16,
        }
    }
}

impl EncryptionConfig {
    /// Resolve secrets from the environment and derive the key ring
    pub fn key_manager(&self) -> Result<KeyManager> {
        self.key_manager_with(|name| std::env::var(name).ok())
    }

    /// Same as `key_manager` with an explicit secret lookup
    pub fn key_manager_with<F>(&self, lookup: F) -> Result<KeyManager>
    where
        F: Fn(&str) -> Option<String>,
    {
        if self.keys.is_empty() {
            bail!("No encryption keys configured");
        }

        let secrets = self
            .keys
            .iter()
            .map(|entry| {
                let secret = lookup(&entry.secret_env).ok_or_else(|| {
                    anyhow!(
                        "Environment variable '{}' for key version {} is not set",
                        entry.secret_env,
                        entry.version
                    )
                })?;
                Ok(KeySecret::new(entry.version, secret, entry.salt.as_bytes().to_vec()))
            })
            .collect::<Result<Vec<_>>>()?;

        KeyManager::from_secrets(
            &secrets,
            self.active_version,
            self.iterations,
            BoundedCache::new(self.derivation_cache_size),
        )
        .context("Failed to build key manager")
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct AgreementConfig {
    /// Term applied when a caller gives no expiration date
    pub default_term_months: u32,
    /// How far ahead `check_expirations` looks
    pub expiration_notice_days: u32,
}

impl Default for AgreementConfig {
    fn default() -> Self {
        Self {
            default_term_months: 12,
            expiration_notice_days: 30,
        }
    }
}

/// Tunables for suspicious-pattern detection
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct PatternThresholds {
    /// Local hours strictly before this are off-hours
    pub off_hours_before: u32,
    /// Local hours strictly after this are off-hours
    pub off_hours_after: u32,
    /// Flag when an actor has more than this many off-hours entries
    pub off_hours_max_entries: u64,
    pub rapid_access_window_minutes: i64,
    /// Flag when more than this many distinct patients fall in one window
    pub rapid_access_max_patients: u64,
    /// Slide the window across the day instead of requiring the actor's
    /// first and last patient access to fit inside it
    pub rapid_access_sliding_window: bool,
    /// Offset of the facility's local time from UTC
    pub utc_offset_minutes: i32,
}

impl Default for PatternThresholds {
    fn default() -> Self {
        Self {
            off_hours_before: 6,
            off_hours_after: 22,
            off_hours_max_entries: 3,
            rapid_access_window_minutes: 60,
            rapid_access_max_patients: 20,
            rapid_access_sliding_window: false,
            utc_offset_minutes: 0,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ReportConfig {
    /// Memoized reports; zero disables the cache
    pub cache_capacity: usize,
    /// Access volume above which a review is recommended
    pub high_volume_threshold: u64,
}

impl Default for ReportConfig {
    fn default() -> Self {
        Self {
            cache_capacity: 32,
            high_volume_threshold: 10_000,
        }
    }
}

impl ComplianceConfig {
    /// Default config file location
    pub fn default_path() -> Result<PathBuf> {
        let dir = dirs::config_dir().ok_or_else(|| anyhow!("Could not find config directory"))?;
        Ok(dir.join(APP_DIR).join(CONFIG_FILE))
    }

    /// Load and validate a config file
    pub fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        let config: Self = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;
        config
            .validate()
            .with_context(|| format!("Invalid configuration in {}", path.display()))?;
        Ok(config)
    }

    /// Load a config file, falling back to defaults when it does not exist
    pub fn load_or_default(path: &Path) -> Result<Self> {
        if path.exists() {
            Self::load(path)
        } else {
            tracing::debug!(path = %path.display(), "No config file found, using defaults");
            Ok(Self::default())
        }
    }

    /// Write the config as TOML, creating parent directories
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create config directory: {}", parent.display()))?;
        }
        let content = toml::to_string_pretty(self).context("Failed to serialize configuration")?;
        fs::write(path, content).with_context(|| format!("Failed to write config file: {}", path.display()))?;
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        if self.system_id.trim().is_empty() {
            bail!("system_id must not be empty");
        }

        let encryption = &self.encryption;
        if encryption.iterations == 0 {
            bail!("encryption.iterations must be greater than zero");
        }
        let mut versions = BTreeSet::new();
        for key in &encryption.keys {
            if key.secret_env.trim().is_empty() {
                bail!("encryption key version {} has no secret_env", key.version);
            }
            if key.salt.is_empty() {
                bail!("encryption key version {} has an empty salt", key.version);
            }
            if !versions.insert(key.version) {
                bail!("encryption key version {} is declared twice", key.version);
            }
        }
        if let Some(active) = encryption.active_version {
            if !versions.contains(&active) {
                bail!("encryption.active_version {} is not a configured key", active);
            }
        }

        let retention = &self.retention;
        if retention.default_years == 0 {
            bail!("retention.default_years must be greater than zero");
        }
        if retention.extended_years > MAX_RETENTION_YEARS {
            bail!("retention.extended_years must be at most {}", MAX_RETENTION_YEARS);
        }
        if retention.agreement_years < retention.default_years || retention.extended_years < retention.agreement_years {
            bail!("retention periods must satisfy default <= agreement <= extended");
        }

        let agreements = &self.agreements;
        if agreements.default_term_months == 0 || agreements.default_term_months > MAX_TERM_MONTHS {
            bail!("agreements.default_term_months must be between 1 and {}", MAX_TERM_MONTHS);
        }
        if agreements.expiration_notice_days > MAX_NOTICE_DAYS {
            bail!("agreements.expiration_notice_days must be at most {}", MAX_NOTICE_DAYS);
        }

        let patterns = &self.patterns;
        if patterns.off_hours_before > 23 || patterns.off_hours_after > 23 {
            bail!("patterns off-hours bounds must be hours between 0 and 23");
        }
        if patterns.rapid_access_window_minutes <= 0 || patterns.rapid_access_window_minutes > MAX_WINDOW_MINUTES {
            bail!("patterns.rapid_access_window_minutes must be between 1 and {}", MAX_WINDOW_MINUTES);
        }
        if patterns.utc_offset_minutes.abs() > 14 * 60 {
            bail!("patterns.utc_offset_minutes must be within +/-14 hours");
        }

        Ok(())
    }
}
