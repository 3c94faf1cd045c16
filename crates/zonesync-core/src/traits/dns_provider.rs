// # DNS Provider Trait
//
// The capability contract between the reconciliation core and a vendor API.
//
// ## Implementations
//
// - In-memory: [`crate::providers::MemoryProvider`]
// - Cloudflare: `zonesync-provider-cloudflare` crate
//
// ## Usage
//
// ```rust,ignore
// use zonesync_core::DnsProvider;
//
// let observed = provider.fetch_observed("example.com").await?;
// provider.create_record("example.com", &record).await?;
// ```

use async_trait::async_trait;
use std::collections::BTreeMap;

use crate::config::ZoneConfig;
use crate::error::{Error, Result};
use crate::record::{Record, RecordType};

/// Trait for DNS provider adapters
///
/// An adapter decodes the vendor's record shape into canonical [`Record`]s
/// on fetch, and executes one vendor call per write primitive.
///
/// # Thread Safety
///
/// Implementations must be usable across async tasks; the engine reconciles
/// several zones concurrently against the same adapter instance.
///
/// # Boundaries
///
/// Adapters do not decide what changes; the differ does. Adapters do not
/// retry either: a failed call is returned as-is and reported to the caller
/// for that single correction.
///
/// Records returned by [`DnsProvider::fetch_observed`] should carry a
/// [`crate::record::ProviderRef`] when the vendor needs an id to update or
/// delete them. Write primitives receive the observed record back untouched.
#[async_trait]
pub trait DnsProvider: Send + Sync {
    /// Fetch the live record set for `zone`, decoded into canonical records
    async fn fetch_observed(&self, zone: &str) -> Result<Vec<Record>>;

    /// Create `record` in `zone`
    async fn create_record(&self, zone: &str, record: &Record) -> Result<()>;

    /// Replace `existing` (as fetched) with `desired`
    async fn update_record(&self, zone: &str, existing: &Record, desired: &Record) -> Result<()>;

    /// Delete `record` (as fetched) from `zone`
    async fn delete_record(&self, zone: &str, record: &Record) -> Result<()>;

    /// Current state of domain-level features (e.g. `universal_ssl`)
    ///
    /// Features missing from the map are treated as unmanaged.
    async fn fetch_features(&self, _zone: &str) -> Result<BTreeMap<String, bool>> {
        Ok(BTreeMap::new())
    }

    /// Switch a domain-level feature on or off
    async fn set_feature(&self, _zone: &str, feature: &str, _enabled: bool) -> Result<()> {
        Err(Error::unsupported(format!(
            "{} does not manage feature '{}'",
            self.provider_name(),
            feature
        )))
    }

    /// Rewrite a copy of the desired zone before it is normalized
    ///
    /// Used for vendor-specific transforms such as forcing a TTL on proxied
    /// records. The caller's zone is never passed here.
    fn preprocess(&self, _zone: &mut ZoneConfig) -> Result<()> {
        Ok(())
    }

    /// Metadata values that take part in modify detection for `record`
    fn comparable_metadata(&self, _record: &Record) -> BTreeMap<String, String> {
        BTreeMap::new()
    }

    /// Whether this adapter can store records of `rtype`
    fn supports_record_type(&self, rtype: RecordType) -> bool {
        !rtype.is_pseudo()
    }

    /// Reject desired records this adapter cannot represent
    fn audit_records(&self, records: &[Record]) -> Result<()> {
        match records.iter().find(|r| !self.supports_record_type(r.rtype)) {
            Some(record) => Err(Error::validation(
                &record.label,
                record.rtype,
                format!("record type not supported by {}", self.provider_name()),
            )),
            None => Ok(()),
        }
    }

    /// Provider name for logs and messages (e.g. "cloudflare")
    fn provider_name(&self) -> &'static str;
}

/// Helper trait for constructing DNS providers from configuration
pub trait DnsProviderFactory: Send + Sync {
    /// Create a provider instance from its configuration block
    fn create(&self, config: &crate::config::ProviderConfig) -> Result<Box<dyn DnsProvider>>;
}
