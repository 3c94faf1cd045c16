// # Memory Provider
//
// In-memory implementation of DnsProvider.
//
// ## Purpose
//
// Holds zones in a map behind a RwLock. Nothing is persisted. Useful for
// tests, demos, and previewing a configuration without vendor credentials.
//
// ## Behavior
//
// - Unknown zones read as empty and are created on first write
// - Every stored record gets a `mem-N` provider reference on write
// - Features only exist once set through [`MemoryProvider::set_features`]

use async_trait::async_trait;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::debug;

use crate::config::ProviderConfig;
use crate::error::{Error, Result};
use crate::record::Record;
use crate::traits::{DnsProvider, DnsProviderFactory};

#[derive(Debug, Default)]
struct MemoryState {
    zones: HashMap<String, Vec<Record>>,
    features: HashMap<String, BTreeMap<String, bool>>,
    next_id: u64,
}

impl MemoryState {
    fn stamp(&mut self, record: &Record) -> Record {
        self.next_id += 1;
        record
            .clone()
            .with_provider_ref(format!("mem-{}", self.next_id), serde_json::Value::Null)
    }
}

/// In-memory DNS provider
///
/// Clones share the same underlying zones.
///
/// # Example
///
/// ```rust,no_run
/// use zonesync_core::providers::MemoryProvider;
/// use zonesync_core::record::{Record, RecordType};
/// use zonesync_core::DnsProvider;
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let provider = MemoryProvider::new();
///     provider
///         .seed("example.com", vec![Record::parse("@", RecordType::A, "1.2.3.4")?])
///         .await;
///
///     let observed = provider.fetch_observed("example.com").await?;
///     assert_eq!(observed.len(), 1);
///     Ok(())
/// }
/// ```
#[derive(Debug, Clone, Default)]
pub struct MemoryProvider {
    inner: Arc<RwLock<MemoryState>>,
}

impl MemoryProvider {
    /// Create a provider with no zones
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the contents of `zone` with `records`
    pub async fn seed(&self, zone: &str, records: Vec<Record>) {
        let mut state = self.inner.write().await;
        let stamped = records.iter().map(|r| state.stamp(r)).collect();
        state.zones.insert(zone.to_string(), stamped);
    }

    /// Current contents of `zone`
    pub async fn records(&self, zone: &str) -> Vec<Record> {
        let state = self.inner.read().await;
        state.zones.get(zone).cloned().unwrap_or_default()
    }

    /// Report `features` as the current feature state of `zone`
    pub async fn set_features(&self, zone: &str, features: BTreeMap<String, bool>) {
        let mut state = self.inner.write().await;
        state.features.insert(zone.to_string(), features);
    }

    /// Current feature state of `zone`
    pub async fn features(&self, zone: &str) -> BTreeMap<String, bool> {
        let state = self.inner.read().await;
        state.features.get(zone).cloned().unwrap_or_default()
    }
}

/// Locate a stored record by provider id, falling back to value equality
fn position(records: &[Record], target: &Record) -> Option<usize> {
    match &target.provider_ref {
        Some(r) => records
            .iter()
            .position(|stored| stored.provider_ref.as_ref().is_some_and(|s| s.id == r.id)),
        None => records.iter().position(|stored| stored == target),
    }
}

#[async_trait]
impl DnsProvider for MemoryProvider {
    async fn fetch_observed(&self, zone: &str) -> Result<Vec<Record>> {
        Ok(self.records(zone).await)
    }

    async fn create_record(&self, zone: &str, record: &Record) -> Result<()> {
        let mut state = self.inner.write().await;
        let stamped = state.stamp(record);
        debug!("memory: create {} {} in {}", stamped.rtype, stamped.label, zone);
        state.zones.entry(zone.to_string()).or_default().push(stamped);
        Ok(())
    }

    async fn update_record(&self, zone: &str, existing: &Record, desired: &Record) -> Result<()> {
        let mut state = self.inner.write().await;
        let records = state
            .zones
            .get_mut(zone)
            .ok_or_else(|| Error::not_found(format!("zone {}", zone)))?;
        let index = position(records, existing).ok_or_else(|| {
            Error::not_found(format!("{} record '{}' in {}", existing.rtype, existing.label, zone))
        })?;

        let mut updated = desired.clone();
        updated.provider_ref = records[index].provider_ref.clone();
        records[index] = updated;
        Ok(())
    }

    async fn delete_record(&self, zone: &str, record: &Record) -> Result<()> {
        let mut state = self.inner.write().await;
        let records = state
            .zones
            .get_mut(zone)
            .ok_or_else(|| Error::not_found(format!("zone {}", zone)))?;
        let index = position(records, record).ok_or_else(|| {
            Error::not_found(format!("{} record '{}' in {}", record.rtype, record.label, zone))
        })?;
        records.remove(index);
        Ok(())
    }

    async fn fetch_features(&self, zone: &str) -> Result<BTreeMap<String, bool>> {
        Ok(self.features(zone).await)
    }

    async fn set_feature(&self, zone: &str, feature: &str, enabled: bool) -> Result<()> {
        let mut state = self.inner.write().await;
        let slot = state
            .features
            .get_mut(zone)
            .and_then(|features| features.get_mut(feature))
            .ok_or_else(|| Error::unsupported(format!("feature '{}' on {}", feature, zone)))?;
        *slot = enabled;
        Ok(())
    }

    fn provider_name(&self) -> &'static str {
        "memory"
    }
}

/// Factory for [`MemoryProvider`]
pub struct MemoryFactory;

impl DnsProviderFactory for MemoryFactory {
    fn create(&self, config: &ProviderConfig) -> Result<Box<dyn DnsProvider>> {
        match config {
            ProviderConfig::Memory => Ok(Box::new(MemoryProvider::new())),
            other => Err(Error::config(format!(
                "memory factory cannot build a '{}' provider",
                other.type_name()
            ))),
        }
    }
}
