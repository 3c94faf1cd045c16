//! Test doubles and common utilities for reconciliation contract tests
//!
//! The recording provider wraps the in-memory provider and keeps a log of
//! every write primitive invoked, so tests can assert on call order.

#![allow(dead_code)]

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use zonesync_core::config::{EngineConfig, ZoneConfig};
use zonesync_core::engine::{EngineEvent, ReconcileEngine};
use zonesync_core::error::{Error, Result};
use zonesync_core::providers::MemoryProvider;
use zonesync_core::record::{Record, RecordType};
use zonesync_core::traits::DnsProvider;

/// A provider that records calls and can be told to fail
#[derive(Clone)]
pub struct RecordingProvider {
    inner: MemoryProvider,
    /// Write calls in invocation order, e.g. "create NS sub"
    calls: Arc<Mutex<Vec<String>>>,
    /// Call counter for fetch_observed()
    fetch_count: Arc<AtomicUsize>,
    /// Labels whose writes fail
    failing_labels: Arc<Mutex<Vec<String>>>,
    /// Fetches currently in progress
    in_flight: Arc<AtomicUsize>,
    /// Highest number of concurrent fetches seen
    max_in_flight: Arc<AtomicUsize>,
    /// Artificial fetch latency
    fetch_delay: Duration,
}

impl RecordingProvider {
    pub fn new() -> Self {
        Self {
            inner: MemoryProvider::new(),
            calls: Arc::new(Mutex::new(Vec::new())),
            fetch_count: Arc::new(AtomicUsize::new(0)),
            failing_labels: Arc::new(Mutex::new(Vec::new())),
            in_flight: Arc::new(AtomicUsize::new(0)),
            max_in_flight: Arc::new(AtomicUsize::new(0)),
            fetch_delay: Duration::ZERO,
        }
    }

    /// Slow down every fetch (to observe concurrency)
    pub fn with_fetch_delay(mut self, delay: Duration) -> Self {
        self.fetch_delay = delay;
        self
    }

    /// Underlying storage
    pub fn memory(&self) -> &MemoryProvider {
        &self.inner
    }

    /// Make every write touching `label` fail
    pub fn fail_label(&self, label: &str) {
        self.failing_labels.lock().unwrap().push(label.to_string());
    }

    /// Write calls so far
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    pub fn clear_calls(&self) {
        self.calls.lock().unwrap().clear();
    }

    pub fn fetch_count(&self) -> usize {
        self.fetch_count.load(Ordering::SeqCst)
    }

    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    fn log(&self, verb: &str, record: &Record) -> Result<()> {
        self.calls
            .lock()
            .unwrap()
            .push(format!("{} {} {}", verb, record.rtype, record.label));
        if self.failing_labels.lock().unwrap().contains(&record.label) {
            return Err(Error::provider("recording", format!("injected failure at {}", record.label)));
        }
        Ok(())
    }
}

#[async_trait::async_trait]
impl DnsProvider for RecordingProvider {
    async fn fetch_observed(&self, zone: &str) -> Result<Vec<Record>> {
        self.fetch_count.fetch_add(1, Ordering::SeqCst);
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);
        if !self.fetch_delay.is_zero() {
            tokio::time::sleep(self.fetch_delay).await;
        }
        let result = self.inner.fetch_observed(zone).await;
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        result
    }

    async fn create_record(&self, zone: &str, record: &Record) -> Result<()> {
        self.log("create", record)?;
        self.inner.create_record(zone, record).await
    }

    async fn update_record(&self, zone: &str, existing: &Record, desired: &Record) -> Result<()> {
        self.log("modify", desired)?;
        self.inner.update_record(zone, existing, desired).await
    }

    async fn delete_record(&self, zone: &str, record: &Record) -> Result<()> {
        self.log("delete", record)?;
        self.inner.delete_record(zone, record).await
    }

    async fn fetch_features(&self, zone: &str) -> Result<BTreeMap<String, bool>> {
        self.inner.fetch_features(zone).await
    }

    async fn set_feature(&self, zone: &str, feature: &str, enabled: bool) -> Result<()> {
        self.calls
            .lock()
            .unwrap()
            .push(format!("toggle {} {}", feature, enabled));
        self.inner.set_feature(zone, feature, enabled).await
    }

    fn provider_name(&self) -> &'static str {
        "recording"
    }
}

/// Engine with a single provider instance named "test"
pub fn engine_with(
    provider: &RecordingProvider,
    config: EngineConfig,
) -> (ReconcileEngine, tokio::sync::mpsc::Receiver<EngineEvent>) {
    let providers: BTreeMap<String, Arc<dyn DnsProvider>> = BTreeMap::from([(
        "test".to_string(),
        Arc::new(provider.clone()) as Arc<dyn DnsProvider>,
    )]);
    ReconcileEngine::new(providers, config)
}

/// Parse a record, panicking on bad test input
pub fn rec(label: &str, rtype: RecordType, content: &str) -> Record {
    Record::parse(label, rtype, content).expect("valid test record")
}

/// A zone bound to the "test" provider
pub fn zone(name: &str, records: Vec<Record>) -> ZoneConfig {
    records
        .into_iter()
        .fold(ZoneConfig::new(name, "test"), |zone, r| zone.with_record(r))
}

/// Drain every event currently buffered
pub fn drain(rx: &mut tokio::sync::mpsc::Receiver<EngineEvent>) -> Vec<EngineEvent> {
    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    events
}
