// # Cloudflare DNS Provider
//
// Cloudflare adapter for the zonesync reconciliation core.
//
// ## What it covers
//
// - DNS records (A, AAAA, CNAME, MX, NS, PTR, TXT, SRV, CAA, TLSA, SSHFP, DS)
// - Proxy state as comparable metadata (`cloudflare_proxy`: on, off, full)
// - Forwarding page rules, synthesized from REDIRECT / TEMP_REDIRECT records
// - Worker routes (WORKER_ROUTE records)
// - The Universal SSL zone setting, exposed as the `universal_ssl` feature
// - Dry-run mode: reads go out, writes are only logged
//
// ## Boundaries
//
// - One HTTP request per write primitive; no retries, no backoff
// - HTTP status codes are mapped onto core error kinds
// - The API token never appears in logs or Debug output
//
// ## API Reference
//
// - Cloudflare API v4: https://developers.cloudflare.com/api/
// - Zones: GET `/zones?name=...`
// - DNS records: `/zones/:zone_id/dns_records[/:id]`
// - Page rules: `/zones/:zone_id/pagerules[/:id]`
// - Worker routes: `/zones/:zone_id/workers/routes[/:id]`
// - Universal SSL: `/zones/:zone_id/ssl/universal/settings`

pub mod native;
pub mod preprocess;

use async_trait::async_trait;
use reqwest::{Method, StatusCode};
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::{Value, json};
use std::collections::{BTreeMap, HashMap};
use std::time::Duration;
use tokio::sync::Mutex;
use zonesync_core::config::{ProviderConfig, ZoneConfig};
use zonesync_core::normalize::split_txt;
use zonesync_core::record::{Record, RecordData, RecordType};
use zonesync_core::traits::{DnsProvider, DnsProviderFactory};
use zonesync_core::{Error, ProviderRegistry, Result};

use native::{
    CfDnsRecord, CfPageRule, CfResponse, CfWorkerRoute, CfZone, is_proxiable, native_to_record,
    page_rule_body, page_rule_to_record, record_to_native, worker_route_to_record,
};

/// Provider name used in logs and errors
pub const PROVIDER: &str = "cloudflare";

/// Record metadata: proxy setting (on, off, full)
pub const META_PROXY: &str = "cloudflare_proxy";

/// Zone metadata: proxy setting for records that carry none
pub const META_PROXY_DEFAULT: &str = "cloudflare_proxy_default";

/// Zone metadata: desired Universal SSL state (on, off)
pub const META_UNIVERSAL_SSL: &str = "cloudflare_universalssl";

/// Feature name for Universal SSL
pub const FEATURE_UNIVERSAL_SSL: &str = "universal_ssl";

/// Cloudflare API base URL
const CLOUDFLARE_API_BASE: &str = "https://api.cloudflare.com/client/v4";

/// Default HTTP timeout for API requests (30 seconds)
const DEFAULT_HTTP_TIMEOUT: Duration = Duration::from_secs(30);

/// Records per page when listing
const PAGE_SIZE: u32 = 100;

/// Cloudflare DNS provider
///
/// # Dry-Run Mode
///
/// When `dry_run` is true, the provider will:
/// - Perform all GET requests (zone lookup, record listing)
/// - Log the intended write with its payload
/// - **NOT** modify anything
///
/// # Security
///
/// The Debug implementation does NOT expose the API token.
pub struct CloudflareProvider {
    /// ⚠️ NEVER log this value
    api_token: String,

    /// Restricts zone lookups to one account
    account_id: Option<String>,

    base_url: String,

    client: reqwest::Client,

    dry_run: bool,

    options: preprocess::Options,

    /// Zone name -> zone id, filled on first use
    zone_ids: Mutex<HashMap<String, String>>,
}

impl std::fmt::Debug for CloudflareProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CloudflareProvider")
            .field("api_token", &"<REDACTED>")
            .field("account_id", &self.account_id)
            .field("base_url", &self.base_url)
            .field("dry_run", &self.dry_run)
            .field("options", &self.options)
            .finish()
    }
}

impl CloudflareProvider {
    /// Create a new Cloudflare provider
    ///
    /// # Parameters
    ///
    /// - `api_token`: Cloudflare API token with Zone:DNS:Edit permissions
    ///
    /// # Errors
    ///
    /// Fails when the token is empty or the HTTP client cannot be built.
    pub fn new(api_token: impl Into<String>) -> Result<Self> {
        let api_token = api_token.into();
        if api_token.is_empty() {
            return Err(Error::config("Cloudflare API token cannot be empty"));
        }

        let client = reqwest::Client::builder()
            .timeout(DEFAULT_HTTP_TIMEOUT)
            .build()
            .map_err(|e| Error::http(format!("failed to build HTTP client: {}", e)))?;

        Ok(Self {
            api_token,
            account_id: None,
            base_url: CLOUDFLARE_API_BASE.to_string(),
            client,
            dry_run: false,
            options: preprocess::Options::default(),
            zone_ids: Mutex::new(HashMap::new()),
        })
    }

    /// Point the client at another API root (tests, proxies)
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    pub fn with_account_id(mut self, account_id: Option<String>) -> Self {
        self.account_id = account_id;
        self
    }

    pub fn with_dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    /// Manage page rules synthesized from redirect records
    pub fn with_redirects(mut self, manage: bool) -> Self {
        self.options.manage_redirects = manage;
        self
    }

    /// Manage worker routes
    pub fn with_workers(mut self, manage: bool) -> Self {
        self.options.manage_workers = manage;
        self
    }

    /// Whether writes are only logged
    pub fn is_dry_run(&self) -> bool {
        self.dry_run
    }

    /// Send one request and unwrap the response envelope
    async fn call<T: DeserializeOwned>(
        &self,
        method: Method,
        path: &str,
        query: &[(&str, String)],
        body: Option<&Value>,
    ) -> Result<CfResponse<T>> {
        let url = format!("{}{}", self.base_url, path);
        tracing::debug!("{} {}", method, path);

        let mut request = self
            .client
            .request(method, &url)
            .bearer_auth(&self.api_token)
            .header("Content-Type", "application/json")
            .query(query);
        if let Some(body) = body {
            request = request.json(body);
        }

        let response = request
            .send()
            .await
            .map_err(|e| Error::http(format!("request to {} failed: {}", path, e)))?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unable to read error response".to_string());
            return Err(map_status(status, path, &error_text));
        }

        let envelope: CfResponse<T> = response.json().await.map_err(|e| {
            Error::provider(PROVIDER, format!("failed to parse response from {}: {}", path, e))
        })?;

        if !envelope.success {
            let messages: Vec<String> = envelope
                .errors
                .iter()
                .map(|e| format!("{} ({})", e.message, e.code))
                .collect();
            return Err(Error::provider(
                PROVIDER,
                format!("{} failed: {}", path, messages.join("; ")),
            ));
        }

        Ok(envelope)
    }

    /// Send a write, or only log it in dry-run mode
    async fn write(&self, method: Method, path: &str, body: Option<Value>) -> Result<()> {
        if self.is_dry_run() {
            let payload = body.as_ref().map(|b| b.to_string()).unwrap_or_default();
            tracing::info!(
                "[DRY-RUN] Would send {} {} with payload: {}",
                method,
                path,
                payload
            );
            return Ok(());
        }

        self.call::<Value>(method, path, &[], body.as_ref())
            .await
            .map(|_| ())
    }

    /// Every item of a paginated listing
    async fn list_all<T: DeserializeOwned>(&self, path: &str) -> Result<Vec<T>> {
        let mut items = Vec::new();
        let mut page = 1;
        loop {
            let query = [
                ("page", page.to_string()),
                ("per_page", PAGE_SIZE.to_string()),
            ];
            let response = self.call::<Vec<T>>(Method::GET, path, &query, None).await?;
            items.extend(response.result.unwrap_or_default());

            match response.result_info {
                Some(info) if info.page < info.total_pages => page = info.page + 1,
                _ => break,
            }
        }
        Ok(items)
    }

    /// Look up (and remember) the zone id for a domain
    async fn zone_id(&self, zone: &str) -> Result<String> {
        if let Some(id) = self.zone_ids.lock().await.get(zone) {
            return Ok(id.clone());
        }

        tracing::debug!("Looking up zone ID for domain: {}", zone);
        let mut query = vec![("name", zone.to_string())];
        if let Some(account_id) = &self.account_id {
            query.push(("account.id", account_id.clone()));
        }

        let response = self
            .call::<Vec<CfZone>>(Method::GET, "/zones", &query, None)
            .await?;
        let found = response
            .result
            .unwrap_or_default()
            .into_iter()
            .find(|z| z.name.eq_ignore_ascii_case(zone))
            .ok_or_else(|| Error::not_found(format!("Zone not found: {}", zone)))?;

        tracing::debug!("Found zone ID: {}", found.id);
        self.zone_ids
            .lock()
            .await
            .insert(zone.to_string(), found.id.clone());
        Ok(found.id)
    }

    fn record_id<'a>(&self, record: &'a Record) -> Result<&'a str> {
        record
            .provider_ref
            .as_ref()
            .map(|r| r.id.as_str())
            .filter(|id| !id.is_empty())
            .ok_or_else(|| {
                Error::provider(
                    PROVIDER,
                    format!("{} {} has no Cloudflare id", record.rtype, record.label),
                )
            })
    }

    /// Collection path for a record's kind
    fn collection(&self, zone_id: &str, rtype: RecordType) -> String {
        match rtype {
            RecordType::PageRule => format!("/zones/{}/pagerules", zone_id),
            RecordType::WorkerRoute => format!("/zones/{}/workers/routes", zone_id),
            _ => format!("/zones/{}/dns_records", zone_id),
        }
    }

    /// Request body for writing `record`
    fn body(&self, zone: &str, record: &Record, proxied: bool) -> Result<Value> {
        let payload = record.data.to_string();
        match record.rtype {
            RecordType::PageRule => to_value(&page_rule_body(&payload)?),
            RecordType::WorkerRoute => {
                let (pattern, script) = native::decode_worker_route(&payload)?;
                Ok(json!({ "pattern": pattern, "script": script }))
            }
            _ => to_value(&record_to_native(zone, record, proxied)?),
        }
    }
}

fn to_value<T: Serialize>(value: &T) -> Result<Value> {
    Ok(serde_json::to_value(value)?)
}

/// Map a failed HTTP status onto a core error
fn map_status(status: StatusCode, path: &str, body: &str) -> Error {
    match status.as_u16() {
        401 | 403 => Error::auth(format!(
            "Invalid API token or insufficient permissions. Status: {}",
            status
        )),
        404 => Error::not_found(format!("{} not found", path)),
        409 => Error::provider(PROVIDER, format!("Conflict on {}: {}", path, body)),
        429 => Error::rate_limited(format!(
            "Rate limit exceeded. Please retry later. Status: {}",
            status
        )),
        500..=599 => Error::provider(
            PROVIDER,
            format!("Cloudflare server error (transient): {} - {}", status, body),
        ),
        _ => Error::provider(PROVIDER, format!("{} failed: {} - {}", path, status, body)),
    }
}

/// Whether the desired record should be proxied
fn wants_proxy(record: &Record) -> bool {
    is_proxiable(record.rtype)
        && record
            .metadata
            .get(META_PROXY)
            .is_some_and(|v| v != "off")
}

#[async_trait]
impl DnsProvider for CloudflareProvider {
    async fn fetch_observed(&self, zone: &str) -> Result<Vec<Record>> {
        let zone_id = self.zone_id(zone).await?;

        let natives: Vec<CfDnsRecord> = self
            .list_all(&format!("/zones/{}/dns_records", zone_id))
            .await?;
        let mut records = natives
            .iter()
            .filter(|n| n.record_type != "SOA")
            .map(|n| native_to_record(zone, n))
            .collect::<Result<Vec<_>>>()?;

        if self.options.manage_redirects {
            let rules = self
                .call::<Vec<CfPageRule>>(
                    Method::GET,
                    &format!("/zones/{}/pagerules", zone_id),
                    &[],
                    None,
                )
                .await?;
            records.extend(
                rules
                    .result
                    .unwrap_or_default()
                    .iter()
                    .filter_map(page_rule_to_record),
            );
        }

        if self.options.manage_workers {
            let routes = self
                .call::<Vec<CfWorkerRoute>>(
                    Method::GET,
                    &format!("/zones/{}/workers/routes", zone_id),
                    &[],
                    None,
                )
                .await?;
            records.extend(
                routes
                    .result
                    .unwrap_or_default()
                    .iter()
                    .map(worker_route_to_record),
            );
        }

        tracing::debug!("{}: fetched {} records", zone, records.len());
        Ok(records)
    }

    async fn create_record(&self, zone: &str, record: &Record) -> Result<()> {
        let zone_id = self.zone_id(zone).await?;
        let body = self.body(zone, record, wants_proxy(record))?;
        self.write(Method::POST, &self.collection(&zone_id, record.rtype), Some(body))
            .await
    }

    async fn update_record(&self, zone: &str, existing: &Record, desired: &Record) -> Result<()> {
        let zone_id = self.zone_id(zone).await?;
        let id = self.record_id(existing)?;

        // Only records Cloudflare reported as proxiable may be proxied
        let proxiable = existing
            .provider_ref
            .as_ref()
            .and_then(|r| r.extra.get("proxiable"))
            .and_then(Value::as_bool)
            .unwrap_or(true);
        let body = self.body(zone, desired, proxiable && wants_proxy(desired))?;

        let path = format!("{}/{}", self.collection(&zone_id, desired.rtype), id);
        self.write(Method::PUT, &path, Some(body)).await
    }

    async fn delete_record(&self, zone: &str, record: &Record) -> Result<()> {
        let zone_id = self.zone_id(zone).await?;
        let id = self.record_id(record)?;
        let path = format!("{}/{}", self.collection(&zone_id, record.rtype), id);
        self.write(Method::DELETE, &path, None).await
    }

    async fn fetch_features(&self, zone: &str) -> Result<BTreeMap<String, bool>> {
        let zone_id = self.zone_id(zone).await?;
        let response = self
            .call::<Value>(
                Method::GET,
                &format!("/zones/{}/ssl/universal/settings", zone_id),
                &[],
                None,
            )
            .await?;

        let mut features = BTreeMap::new();
        if let Some(enabled) = response
            .result
            .as_ref()
            .and_then(|r| r.get("enabled"))
            .and_then(Value::as_bool)
        {
            features.insert(FEATURE_UNIVERSAL_SSL.to_string(), enabled);
        }
        Ok(features)
    }

    async fn set_feature(&self, zone: &str, feature: &str, enabled: bool) -> Result<()> {
        if feature != FEATURE_UNIVERSAL_SSL {
            return Err(Error::unsupported(format!(
                "Cloudflare has no feature '{}'",
                feature
            )));
        }
        let zone_id = self.zone_id(zone).await?;
        self.write(
            Method::PATCH,
            &format!("/zones/{}/ssl/universal/settings", zone_id),
            Some(json!({ "enabled": enabled })),
        )
        .await
    }

    fn preprocess(&self, zone: &mut ZoneConfig) -> Result<()> {
        preprocess::preprocess_zone(zone, self.options)
    }

    fn comparable_metadata(&self, record: &Record) -> BTreeMap<String, String> {
        let mut out = BTreeMap::new();
        if is_proxiable(record.rtype) {
            out.insert("proxy".to_string(), wants_proxy(record).to_string());
        }
        out
    }

    fn supports_record_type(&self, rtype: RecordType) -> bool {
        match rtype {
            RecordType::Soa => false,
            RecordType::Redirect | RecordType::TempRedirect | RecordType::PageRule => {
                self.options.manage_redirects
            }
            RecordType::WorkerRoute => self.options.manage_workers,
            _ => true,
        }
    }

    fn audit_records(&self, records: &[Record]) -> Result<()> {
        for record in records {
            if !self.supports_record_type(record.rtype) {
                return Err(Error::validation(
                    record.label.clone(),
                    record.rtype,
                    "not supported by the Cloudflare provider",
                ));
            }
            // Cloudflare keeps one TXT string and splits it itself
            if let RecordData::Txt(strings) = &record.data
                && *strings != split_txt(&strings.concat())
            {
                return Err(Error::validation(
                    record.label.clone(),
                    record.rtype,
                    "multiple TXT strings are only supported as 255-byte chunks of one value",
                ));
            }
        }
        Ok(())
    }

    fn provider_name(&self) -> &'static str {
        PROVIDER
    }
}

/// Factory for creating Cloudflare providers
pub struct CloudflareFactory;

impl DnsProviderFactory for CloudflareFactory {
    fn create(&self, config: &ProviderConfig) -> Result<Box<dyn DnsProvider>> {
        match config {
            ProviderConfig::Cloudflare {
                api_token,
                account_id,
                manage_redirects,
                manage_workers,
                dry_run,
            } => {
                if *dry_run {
                    tracing::warn!(
                        "Cloudflare provider running in DRY-RUN mode - no changes will be made"
                    );
                }

                Ok(Box::new(
                    CloudflareProvider::new(api_token.clone())?
                        .with_account_id(account_id.clone())
                        .with_dry_run(*dry_run)
                        .with_redirects(*manage_redirects)
                        .with_workers(*manage_workers),
                ))
            }
            _ => Err(Error::config("Invalid config for Cloudflare provider")),
        }
    }
}

/// Register the Cloudflare provider with a registry
///
/// # Example
///
/// ```rust
/// use zonesync_core::ProviderRegistry;
///
/// let mut registry = ProviderRegistry::new();
/// zonesync_provider_cloudflare::register(&mut registry);
/// assert!(registry.has_provider("cloudflare"));
/// ```
pub fn register(registry: &mut ProviderRegistry) {
    registry.register_provider(PROVIDER, Box::new(CloudflareFactory));
}
