// # Correction Sequencer
//
// Turns a changeset into one ordered list of corrections. The order is:
//
// 1. DS deletions
// 2. remaining deletions
// 3. NS creations
// 4. remaining creations
// 5. modifications
// 6. feature toggles
//
// Delegation support goes away before the delegation does, and comes back
// only after it. Within a phase the differ's key order is kept, so preview
// output is stable across runs.
//
// Sequencing is pure. Corrections are plain data; running one is a single
// adapter call through [`Correction::apply`].

use std::collections::BTreeMap;
use std::fmt;

use crate::diff::{Changeset, Correlation};
use crate::error::Result;
use crate::record::{Record, RecordType};
use crate::traits::DnsProvider;

/// What a correction does when applied
#[derive(Debug, Clone, PartialEq)]
pub enum CorrectionKind {
    Create(Record),
    Delete(Record),
    Modify { existing: Record, desired: Record },
    Toggle { feature: String, enabled: bool },
}

/// One applicable, describable unit of change
#[derive(Debug, Clone, PartialEq)]
pub struct Correction {
    pub message: String,
    pub kind: CorrectionKind,
}

impl Correction {
    /// Execute this correction against `provider`
    ///
    /// Exactly one adapter primitive is invoked; errors are returned as-is.
    pub async fn apply(&self, zone: &str, provider: &dyn DnsProvider) -> Result<()> {
        match &self.kind {
            CorrectionKind::Create(record) => provider.create_record(zone, record).await,
            CorrectionKind::Delete(record) => provider.delete_record(zone, record).await,
            CorrectionKind::Modify { existing, desired } => {
                provider.update_record(zone, existing, desired).await
            }
            CorrectionKind::Toggle { feature, enabled } => {
                provider.set_feature(zone, feature, *enabled).await
            }
        }
    }

    /// True for domain-level feature toggles
    pub fn is_toggle(&self) -> bool {
        matches!(self.kind, CorrectionKind::Toggle { .. })
    }

    /// The record this correction writes or removes, if any
    pub fn record(&self) -> Option<&Record> {
        match &self.kind {
            CorrectionKind::Create(record) | CorrectionKind::Delete(record) => Some(record),
            CorrectionKind::Modify { desired, .. } => Some(desired),
            CorrectionKind::Toggle { .. } => None,
        }
    }
}

impl fmt::Display for Correction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

/// Order a changeset into corrections
pub fn sequence(changes: &Changeset) -> Vec<Correction> {
    let mut out = Vec::with_capacity(changes.change_count());

    let (ds_deletes, other_deletes): (Vec<_>, Vec<_>) = changes
        .delete
        .iter()
        .partition(|c| c.rtype() == Some(RecordType::Ds));
    let (ns_creates, other_creates): (Vec<_>, Vec<_>) = changes
        .create
        .iter()
        .partition(|c| c.rtype() == Some(RecordType::Ns));

    out.extend(ds_deletes.into_iter().filter_map(delete));
    out.extend(other_deletes.into_iter().filter_map(delete));
    out.extend(ns_creates.into_iter().filter_map(create));
    out.extend(other_creates.into_iter().filter_map(create));
    out.extend(changes.modify.iter().filter_map(modify));

    debug_assert!(delegation_order_holds(&out), "DS/NS ordering violated");
    out
}

/// Feature toggles needed to bring `current` in line with `desired`
///
/// A feature the provider does not report is left alone.
pub fn feature_corrections(
    zone: &str,
    desired: &BTreeMap<String, bool>,
    current: &BTreeMap<String, bool>,
) -> Vec<Correction> {
    desired
        .iter()
        .filter_map(|(feature, &enabled)| {
            let &actual = current.get(feature)?;
            (actual != enabled).then(|| Correction {
                message: format!(
                    "TOGGLE {} {}: {} -> {}",
                    feature,
                    zone,
                    on_off(actual),
                    on_off(enabled)
                ),
                kind: CorrectionKind::Toggle {
                    feature: feature.clone(),
                    enabled,
                },
            })
        })
        .collect()
}

fn on_off(enabled: bool) -> &'static str {
    if enabled { "on" } else { "off" }
}

fn create(c: &Correlation) -> Option<Correction> {
    Some(Correction {
        message: c.message.clone(),
        kind: CorrectionKind::Create(c.desired.clone()?),
    })
}

fn delete(c: &Correlation) -> Option<Correction> {
    Some(Correction {
        message: c.message.clone(),
        kind: CorrectionKind::Delete(c.existing.clone()?),
    })
}

fn modify(c: &Correlation) -> Option<Correction> {
    Some(Correction {
        message: c.message.clone(),
        kind: CorrectionKind::Modify {
            existing: c.existing.clone()?,
            desired: c.desired.clone()?,
        },
    })
}

/// At every label: no NS delete before a DS delete, no DS create before an NS create
fn delegation_order_holds(corrections: &[Correction]) -> bool {
    let mut ns_deleted = Vec::new();
    let mut ds_created = Vec::new();

    for c in corrections {
        match &c.kind {
            CorrectionKind::Delete(r) if r.rtype == RecordType::Ns => ns_deleted.push(&r.label),
            CorrectionKind::Delete(r) if r.rtype == RecordType::Ds => {
                if ns_deleted.contains(&&r.label) {
                    return false;
                }
            }
            CorrectionKind::Create(r) if r.rtype == RecordType::Ns => {
                if ds_created.contains(&&r.label) {
                    return false;
                }
            }
            CorrectionKind::Create(r) if r.rtype == RecordType::Ds => ds_created.push(&r.label),
            _ => {}
        }
    }
    true
}
