//! Reconciliation engine
//!
//! The ReconcileEngine is responsible for:
//! - Fetching the observed record set of each zone from its provider
//! - Normalizing desired and observed records
//! - Diffing and sequencing them into corrections
//! - Applying corrections in order, reporting each outcome individually
//!
//! ## Architecture
//!
//! ```text
//!  ZoneConfig ──preprocess (copy)──┐
//!                                  ▼
//!                           ┌────────────┐      ┌─────────────┐
//!  DnsProvider::fetch ────▶ │ Normalizer │ ───▶ │   Differ    │
//!                           └────────────┘      └─────────────┘
//!                                                      │
//!                                                      ▼
//!  ┌─────────────┐          ┌──────────────┐    ┌─────────────┐
//!  │   Events    │ ◀─────── │ apply (push) │ ◀─ │  Sequencer  │
//!  └─────────────┘          └──────────────┘    └─────────────┘
//! ```
//!
//! ## Zone Flow
//!
//! 1. Validate the zone, preprocess a copy through the provider, normalize
//! 2. Audit desired records against provider capabilities
//! 3. Fetch and normalize the observed set
//! 4. Diff, sequence, append feature toggles
//! 5. In push mode, apply corrections in order
//!
//! Validation and diff errors abort the zone before anything is applied.
//! A failed correction is reported and never rolled back. Nothing is retried.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use tokio::sync::{Semaphore, mpsc};
use tracing::{debug, error, info, warn};

use crate::config::{EngineConfig, ReconcileConfig, ZoneConfig};
use crate::diff::{Changeset, Differ};
use crate::error::{Error, Result};
use crate::ignore::{GlobMatcher, LabelMatcher};
use crate::normalize::Normalizer;
use crate::registry::ProviderRegistry;
use crate::sequence::{Correction, feature_corrections, sequence};
use crate::traits::DnsProvider;

/// Events emitted by the ReconcileEngine
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EngineEvent {
    /// Zone reconciliation started
    ZoneStarted { zone: String },

    /// Corrections computed for a zone
    ZonePlanned { zone: String, corrections: usize },

    /// A correction was applied
    CorrectionApplied { zone: String, message: String },

    /// A correction failed; later corrections may still run
    CorrectionFailed {
        zone: String,
        message: String,
        error: String,
    },

    /// Zone aborted before any apply
    ZoneFailed { zone: String, error: String },

    /// Zone push finished
    ZoneApplied {
        zone: String,
        applied: usize,
        failed: usize,
    },
}

/// Whether corrections are only shown or also executed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Mode {
    #[default]
    Preview,
    Push,
}

impl FromStr for Mode {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "preview" => Ok(Mode::Preview),
            "push" => Ok(Mode::Push),
            other => Err(Error::config(format!(
                "unknown mode '{}' (expected preview or push)",
                other
            ))),
        }
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Mode::Preview => f.write_str("preview"),
            Mode::Push => f.write_str("push"),
        }
    }
}

/// Corrections computed for one zone
#[derive(Debug, Clone, PartialEq)]
pub struct ZonePlan {
    /// Zone name
    pub zone: String,
    /// Provider instance name the zone is bound to
    pub provider: String,
    /// The classified changeset
    pub changes: Changeset,
    /// Ordered corrections, feature toggles last
    pub corrections: Vec<Correction>,
}

impl ZonePlan {
    /// True when nothing needs to change
    pub fn is_empty(&self) -> bool {
        self.corrections.is_empty()
    }
}

/// Result of one applied correction
#[derive(Debug)]
pub struct CorrectionOutcome {
    pub message: String,
    pub result: Result<()>,
}

/// What happened when a plan was pushed
#[derive(Debug, Default)]
pub struct ApplyReport {
    pub zone: String,
    /// One entry per attempted correction, in plan order
    pub outcomes: Vec<CorrectionOutcome>,
    /// Corrections not attempted because of `stop_on_first_error`
    pub skipped: usize,
}

impl ApplyReport {
    pub fn succeeded(&self) -> usize {
        self.outcomes.iter().filter(|o| o.result.is_ok()).count()
    }

    pub fn failed(&self) -> usize {
        self.outcomes.iter().filter(|o| o.result.is_err()).count()
    }

    /// Every correction was attempted and none failed
    pub fn is_success(&self) -> bool {
        self.skipped == 0 && self.failed() == 0
    }

    /// Failed corrections with their errors
    pub fn failures(&self) -> impl Iterator<Item = (&str, &Error)> {
        self.outcomes
            .iter()
            .filter_map(|o| o.result.as_ref().err().map(|e| (o.message.as_str(), e)))
    }
}

/// Per-zone result of [`ReconcileEngine::reconcile`]
#[derive(Debug)]
pub enum ZoneOutcome {
    /// The zone was aborted before apply
    Failed { zone: String, error: Error },
    /// Preview: corrections computed, nothing applied
    Planned(ZonePlan),
    /// Push: corrections computed and attempted
    Applied { plan: ZonePlan, report: ApplyReport },
}

impl ZoneOutcome {
    pub fn zone(&self) -> &str {
        match self {
            ZoneOutcome::Failed { zone, .. } => zone,
            ZoneOutcome::Planned(plan) => &plan.zone,
            ZoneOutcome::Applied { plan, .. } => &plan.zone,
        }
    }

    /// No abort and no failed correction
    pub fn is_success(&self) -> bool {
        match self {
            ZoneOutcome::Failed { .. } => false,
            ZoneOutcome::Planned(_) => true,
            ZoneOutcome::Applied { report, .. } => report.is_success(),
        }
    }

    /// The zone was rejected by validation before anything was fetched or applied
    pub fn is_validation_failure(&self) -> bool {
        matches!(self, ZoneOutcome::Failed { error, .. } if error.is_validation())
    }
}

/// Zone reconciliation engine
///
/// Cheap to clone; clones share providers and the event channel. Zones do
/// not share mutable state, so any number of them can be planned at once.
/// Pushing the same zone from two callers at the same time is not guarded.
#[derive(Clone)]
pub struct ReconcileEngine {
    /// Provider instances by name
    providers: Arc<BTreeMap<String, Arc<dyn DnsProvider>>>,

    /// Ignore-pattern matcher
    matcher: Arc<dyn LabelMatcher>,

    /// Engine settings
    config: EngineConfig,

    /// Event sender for external monitoring
    event_tx: mpsc::Sender<EngineEvent>,
}

impl ReconcileEngine {
    /// Create an engine over already-built providers
    ///
    /// Returns the engine and the receiving end of its event channel.
    pub fn new(
        providers: BTreeMap<String, Arc<dyn DnsProvider>>,
        config: EngineConfig,
    ) -> (Self, mpsc::Receiver<EngineEvent>) {
        let (tx, rx) = mpsc::channel(config.event_channel_capacity.max(1));

        let engine = Self {
            providers: Arc::new(providers),
            matcher: Arc::new(GlobMatcher),
            config,
            event_tx: tx,
        };

        (engine, rx)
    }

    /// Validate `config` and build its providers through `registry`
    pub fn from_registry(
        registry: &ProviderRegistry,
        config: &ReconcileConfig,
    ) -> Result<(Self, mpsc::Receiver<EngineEvent>)> {
        config.validate()?;
        let providers = registry.build_providers(&config.providers)?;
        Ok(Self::new(providers, config.engine.clone()))
    }

    /// Replace the ignore-pattern matcher
    pub fn with_matcher(mut self, matcher: Arc<dyn LabelMatcher>) -> Self {
        self.matcher = matcher;
        self
    }

    /// Look up a provider instance by name
    pub fn provider(&self, name: &str) -> Result<&Arc<dyn DnsProvider>> {
        self.providers
            .get(name)
            .ok_or_else(|| Error::config(format!("unknown provider '{}'", name)))
    }

    /// Compute the corrections for one zone without applying anything
    pub async fn plan(&self, zone: &ZoneConfig) -> Result<ZonePlan> {
        let provider = self.provider(&zone.provider)?;
        let matcher = self.matcher.as_ref();

        let mut desired_zone = zone.clone();
        provider.preprocess(&mut desired_zone)?;

        let normalizer = Normalizer::for_zone(&desired_zone);
        normalizer.normalize(&mut desired_zone.records)?;
        desired_zone.validate(matcher)?;
        provider.audit_records(&desired_zone.records)?;

        let mut observed = provider.fetch_observed(&zone.name).await?;
        normalizer.normalize(&mut observed)?;
        debug!(
            "{}: {} desired, {} observed",
            zone.name,
            desired_zone.records.len(),
            observed.len()
        );

        let changes = Differ::new(&desired_zone, matcher)
            .with_comparable_metadata(|r| provider.comparable_metadata(r))
            .diff(&desired_zone.records, &observed)?;
        let mut corrections = sequence(&changes);

        if !desired_zone.features.is_empty() {
            match provider.fetch_features(&zone.name).await {
                Ok(current) => corrections.extend(feature_corrections(
                    &zone.name,
                    &desired_zone.features,
                    &current,
                )),
                Err(e) => warn!("{}: cannot read feature state: {}", zone.name, e),
            }
        }

        self.emit_event(EngineEvent::ZonePlanned {
            zone: zone.name.clone(),
            corrections: corrections.len(),
        });

        Ok(ZonePlan {
            zone: zone.name.clone(),
            provider: zone.provider.clone(),
            changes,
            corrections,
        })
    }

    /// Apply a plan's corrections in order
    ///
    /// Every correction is attempted unless `stop_on_first_error` is set;
    /// earlier successes stay in place when a later one fails.
    pub async fn apply(&self, plan: &ZonePlan) -> Result<ApplyReport> {
        let provider = self.provider(&plan.provider)?;
        let mut report = ApplyReport {
            zone: plan.zone.clone(),
            ..Default::default()
        };

        for (index, correction) in plan.corrections.iter().enumerate() {
            if self.config.stop_on_first_error && report.failed() > 0 {
                report.skipped = plan.corrections.len() - index;
                warn!(
                    "{}: stopping after failure, {} corrections skipped",
                    plan.zone, report.skipped
                );
                break;
            }

            let result = correction.apply(&plan.zone, provider.as_ref()).await;
            match &result {
                Ok(()) => {
                    info!("{}: {}", plan.zone, correction.message);
                    self.emit_event(EngineEvent::CorrectionApplied {
                        zone: plan.zone.clone(),
                        message: correction.message.clone(),
                    });
                }
                Err(e) => {
                    warn!("{}: FAILED {}: {}", plan.zone, correction.message, e);
                    self.emit_event(EngineEvent::CorrectionFailed {
                        zone: plan.zone.clone(),
                        message: correction.message.clone(),
                        error: e.to_string(),
                    });
                }
            }

            report.outcomes.push(CorrectionOutcome {
                message: correction.message.clone(),
                result,
            });
        }

        self.emit_event(EngineEvent::ZoneApplied {
            zone: plan.zone.clone(),
            applied: report.succeeded(),
            failed: report.failed(),
        });

        Ok(report)
    }

    /// Plan (and in push mode, apply) a single zone
    pub async fn reconcile_zone(&self, zone: &ZoneConfig, mode: Mode) -> ZoneOutcome {
        self.emit_event(EngineEvent::ZoneStarted {
            zone: zone.name.clone(),
        });

        let plan = match self.plan(zone).await {
            Ok(plan) => plan,
            Err(error) => return self.fail(&zone.name, error),
        };

        if plan.is_empty() {
            info!("{}: no changes", plan.zone);
        } else {
            info!("{}: {} corrections", plan.zone, plan.corrections.len());
        }

        match mode {
            Mode::Preview => {
                for correction in &plan.corrections {
                    info!("{}: [preview] {}", plan.zone, correction.message);
                }
                ZoneOutcome::Planned(plan)
            }
            Mode::Push => match self.apply(&plan).await {
                Ok(report) => ZoneOutcome::Applied { plan, report },
                Err(error) => self.fail(&zone.name, error),
            },
        }
    }

    /// Reconcile every zone in `config`, several at a time
    ///
    /// Outcomes come back in configuration order. One zone failing does not
    /// stop the others.
    pub async fn reconcile(&self, config: &ReconcileConfig, mode: Mode) -> Result<Vec<ZoneOutcome>> {
        config.validate()?;

        let limit = Arc::new(Semaphore::new(self.config.max_concurrent_zones.max(1)));
        let mut handles = Vec::with_capacity(config.zones.len());

        for zone in &config.zones {
            let engine = self.clone();
            let limit = limit.clone();
            let zone = zone.clone();
            let name = zone.name.clone();
            let handle = tokio::spawn(async move {
                let _permit = limit.acquire_owned().await.ok();
                engine.reconcile_zone(&zone, mode).await
            });
            handles.push((name, handle));
        }

        let mut outcomes = Vec::with_capacity(handles.len());
        for (name, handle) in handles {
            match handle.await {
                Ok(outcome) => outcomes.push(outcome),
                Err(e) => outcomes.push(self.fail(&name, Error::Other(format!("zone task failed: {}", e)))),
            }
        }

        Ok(outcomes)
    }

    fn fail(&self, zone: &str, error: Error) -> ZoneOutcome {
        error!("{}: {}", zone, error);
        self.emit_event(EngineEvent::ZoneFailed {
            zone: zone.to_string(),
            error: error.to_string(),
        });
        ZoneOutcome::Failed {
            zone: zone.to_string(),
            error,
        }
    }

    /// Emit an engine event
    fn emit_event(&self, event: EngineEvent) {
        match self.event_tx.try_send(event) {
            Ok(()) => {}
            Err(mpsc::error::TrySendError::Full(_)) => {
                warn!("Event channel full, dropping event. Consider increasing event_channel_capacity.");
            }
            // Nobody is listening
            Err(mpsc::error::TrySendError::Closed(_)) => {}
        }
    }
}
