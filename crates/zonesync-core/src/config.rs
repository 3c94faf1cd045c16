//! Configuration types for zonesync
//!
//! This module defines all configuration structures used throughout the crate.
//! Everything here is plain serde data; the authored configuration is loaded
//! from JSON by the composition root.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

use crate::error::{Error, Result};
use crate::ignore::LabelMatcher;
use crate::record::{DEFAULT_TTL, Record, RecordData, RecordType};

/// Top-level reconciliation configuration
#[derive(Debug, Clone, Deserialize)]
pub struct ReconcileConfig {
    /// Named provider instances, referenced by zones
    pub providers: BTreeMap<String, ProviderConfig>,

    /// Zones to reconcile
    pub zones: Vec<ZoneConfig>,

    /// Optional engine settings
    #[serde(default)]
    pub engine: EngineConfig,
}

impl ReconcileConfig {
    /// Parse a configuration from JSON text
    pub fn from_json(text: &str) -> Result<Self> {
        Ok(serde_json::from_str(text)?)
    }

    /// Load a configuration from a JSON file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_json(&text)
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        if self.zones.is_empty() {
            return Err(Error::config("No zones configured"));
        }

        for (name, provider) in &self.providers {
            provider
                .validate()
                .map_err(|e| Error::config(format!("provider '{}': {}", name, e)))?;
        }

        for zone in &self.zones {
            if !self.providers.contains_key(&zone.provider) {
                return Err(Error::config(format!(
                    "zone '{}' references unknown provider '{}'",
                    zone.name, zone.provider
                )));
            }
        }

        Ok(())
    }
}

/// A named domain with its desired records and reconciliation policy
#[derive(Debug, Clone, Deserialize)]
pub struct ZoneConfig {
    /// Domain name, without trailing dot
    pub name: String,

    /// Name of the provider instance that serves this zone
    pub provider: String,

    /// Desired records; order only matters for output
    #[serde(default)]
    pub records: Vec<Record>,

    /// Delete existing records that are absent from `records`
    #[serde(default = "default_purge")]
    pub purge: bool,

    /// TTL applied to records that specify none
    #[serde(default)]
    pub default_ttl: Option<u32>,

    /// Whether the apex NS set is managed by this configuration
    #[serde(default)]
    pub manage_apex_ns: bool,

    /// Label patterns whose existing records are left alone
    #[serde(default)]
    pub ignore_labels: Vec<String>,

    /// CNAME target patterns whose existing records are left alone
    #[serde(default)]
    pub ignore_targets: Vec<String>,

    /// Desired domain-level feature flags (e.g. `universal_ssl`)
    #[serde(default)]
    pub features: BTreeMap<String, bool>,

    /// Domain-level metadata for adapters
    #[serde(default)]
    pub metadata: BTreeMap<String, String>,
}

impl ZoneConfig {
    /// Create an empty zone served by `provider`
    pub fn new(name: impl Into<String>, provider: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            provider: provider.into(),
            records: Vec::new(),
            purge: default_purge(),
            default_ttl: None,
            manage_apex_ns: false,
            ignore_labels: Vec::new(),
            ignore_targets: Vec::new(),
            features: BTreeMap::new(),
            metadata: BTreeMap::new(),
        }
    }

    /// Add a desired record
    pub fn with_record(mut self, record: Record) -> Self {
        self.records.push(record);
        self
    }

    /// Set the purge policy
    pub fn with_purge(mut self, purge: bool) -> Self {
        self.purge = purge;
        self
    }

    /// Add an ignore-label pattern
    pub fn with_ignore_label(mut self, pattern: impl Into<String>) -> Self {
        self.ignore_labels.push(pattern.into());
        self
    }

    /// Add an ignore-target pattern
    pub fn with_ignore_target(mut self, pattern: impl Into<String>) -> Self {
        self.ignore_targets.push(pattern.into());
        self
    }

    /// Declare a domain-level feature flag
    pub fn with_feature(mut self, feature: impl Into<String>, enabled: bool) -> Self {
        self.features.insert(feature.into(), enabled);
        self
    }

    /// The TTL that replaces a record TTL of 0
    pub fn effective_default_ttl(&self) -> u32 {
        match self.default_ttl {
            Some(ttl) if ttl > 0 => ttl,
            _ => DEFAULT_TTL,
        }
    }

    /// Whether the apex NS set takes part in diffing
    ///
    /// `desired` is the normalized record set, which may differ from
    /// `self.records` after provider preprocessing.
    pub fn manages_apex_ns(&self, desired: &[Record]) -> bool {
        self.manage_apex_ns
            || desired
                .iter()
                .any(|r| r.rtype == RecordType::Ns && r.is_apex())
    }

    /// Check zone-level settings and the ignore-pattern promise
    ///
    /// Expects normalized records: labels are compared as they will be diffed.
    /// A desired record at an ignored label (or a CNAME at an ignored target)
    /// is an error unless the record carries the ignore override.
    pub fn validate(&self, matcher: &dyn LabelMatcher) -> Result<()> {
        if self.name.trim().is_empty() {
            return Err(Error::config("zone name cannot be empty"));
        }
        if self.provider.is_empty() {
            return Err(Error::config(format!(
                "zone '{}' has no provider",
                self.name
            )));
        }

        for pattern in self.ignore_labels.iter().chain(&self.ignore_targets) {
            matcher.check_pattern(pattern)?;
        }

        self.check_ignored(&self.records, matcher)
    }

    /// Reject desired records that touch an ignored label or CNAME target
    ///
    /// Records carrying the ignore override are exempt.
    pub fn check_ignored(&self, records: &[Record], matcher: &dyn LabelMatcher) -> Result<()> {
        for record in records {
            if record.has_ignore_override() {
                continue;
            }
            if let Some(pattern) = self.ignored_label(&record.label, matcher) {
                return Err(Error::validation(
                    record.label.clone(),
                    record.rtype,
                    format!(
                        "label matches ignore pattern '{}'; add {}=true to manage it anyway",
                        pattern,
                        crate::record::META_IGNORE_OVERRIDE
                    ),
                ));
            }
            if let RecordData::Cname(target) = &record.data
                && let Some(pattern) = self.ignored_target(target, matcher)
            {
                return Err(Error::validation(
                    record.label.clone(),
                    record.rtype,
                    format!("target matches ignore-target pattern '{}'", pattern),
                ));
            }
        }

        Ok(())
    }

    /// The ignore-target pattern covering a CNAME target, if any
    pub fn ignored_target<'a>(&'a self, target: &str, matcher: &dyn LabelMatcher) -> Option<&'a str> {
        let target = target.trim_end_matches('.');
        self.ignore_targets
            .iter()
            .find(|p| matcher.matches(p.trim_end_matches('.'), target))
            .map(String::as_str)
    }

    /// The ignore-label pattern covering a label, if any
    pub fn ignored_label<'a>(&'a self, label: &str, matcher: &dyn LabelMatcher) -> Option<&'a str> {
        self.ignore_labels
            .iter()
            .find(|p| matcher.matches(p, label))
            .map(String::as_str)
    }
}

fn default_purge() -> bool {
    true
}

/// DNS record as authored in configuration
///
/// `content` uses the zone-file presentation format for the type.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecordConfig {
    /// Label relative to the zone (`@` or empty for the apex)
    #[serde(default)]
    pub label: String,

    /// Record type name (e.g. "A", "MX", "CF_REDIRECT")
    #[serde(rename = "type")]
    pub record_type: String,

    /// Presentation-format payload
    #[serde(default)]
    pub content: String,

    /// TTL in seconds (0 = zone default)
    #[serde(default)]
    pub ttl: u32,

    /// Explicit TXT strings, used instead of `content` when present
    #[serde(default)]
    pub txt: Vec<String>,

    /// Provider-specific annotations
    #[serde(default)]
    pub metadata: BTreeMap<String, String>,
}

impl TryFrom<RecordConfig> for Record {
    type Error = Error;

    fn try_from(config: RecordConfig) -> Result<Self> {
        let rtype: RecordType = config.record_type.parse()?;
        let mut record = if rtype == RecordType::Txt && !config.txt.is_empty() {
            Record::new(config.label, RecordData::Txt(config.txt))
        } else {
            Record::parse(config.label, rtype, &config.content)?
        };
        record.ttl = config.ttl;
        record.metadata = config.metadata;
        Ok(record)
    }
}

/// DNS provider configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ProviderConfig {
    /// Cloudflare provider
    Cloudflare {
        /// Cloudflare API token
        #[serde(default)]
        api_token: String,
        /// Account ID (optional)
        #[serde(default)]
        account_id: Option<String>,
        /// Manage page rules synthesized from redirect records
        #[serde(default)]
        manage_redirects: bool,
        /// Manage worker routes
        #[serde(default)]
        manage_workers: bool,
        /// Log writes instead of sending them
        #[serde(default)]
        dry_run: bool,
    },

    /// In-memory provider (tests, demos, dry runs)
    Memory,

    /// Custom provider
    Custom {
        /// Factory name to use
        factory: String,
        /// Custom configuration data
        config: serde_json::Value,
    },
}

impl ProviderConfig {
    /// Validate the provider configuration
    pub fn validate(&self) -> Result<()> {
        match self {
            ProviderConfig::Cloudflare { api_token, .. } => {
                if api_token.is_empty() {
                    return Err(Error::config("Cloudflare API token cannot be empty"));
                }
                Ok(())
            }
            ProviderConfig::Memory => Ok(()),
            ProviderConfig::Custom { factory, config } => {
                if factory.is_empty() {
                    return Err(Error::config("Custom provider factory cannot be empty"));
                }
                if config.is_null() {
                    return Err(Error::config("Custom provider config cannot be null"));
                }
                Ok(())
            }
        }
    }

    /// Get the provider type name
    pub fn type_name(&self) -> &str {
        match self {
            ProviderConfig::Cloudflare { .. } => "cloudflare",
            ProviderConfig::Memory => "memory",
            ProviderConfig::Custom { factory, .. } => factory,
        }
    }
}

/// Engine configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Capacity of the engine event channel
    ///
    /// When full, new events are dropped (with a warning log).
    #[serde(default = "default_event_channel_capacity")]
    pub event_channel_capacity: usize,

    /// Upper bound on zones reconciled at the same time
    #[serde(default = "default_max_concurrent_zones")]
    pub max_concurrent_zones: usize,

    /// Skip the remaining corrections of a zone after the first failure
    #[serde(default)]
    pub stop_on_first_error: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            event_channel_capacity: default_event_channel_capacity(),
            max_concurrent_zones: default_max_concurrent_zones(),
            stop_on_first_error: false,
        }
    }
}

fn default_event_channel_capacity() -> usize {
    1000
}

fn default_max_concurrent_zones() -> usize {
    4
}
