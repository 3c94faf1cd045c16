// # Differ
//
// Computes the changeset between a normalized desired record set and a
// normalized observed record set.
//
// ## Algorithm
//
// 1. Key both sides by identity: (label, type) for single-valued types,
//    (label, type, payload) for multi-value types.
// 2. Keys on both sides: equal TTL, payload and comparable metadata →
//    unchanged, otherwise modify.
// 3. Keys only desired → create.
// 4. Keys only observed → delete, unless purge is off, the label matches an
//    ignore pattern, or a CNAME target matches an ignore-target pattern.
//
// Existing apex NS records only take part when the zone manages its apex
// NS set. Output is ordered by identity key, so identical input always
// yields an identical changeset.

use std::collections::BTreeMap;
use std::fmt;
use tracing::debug;

use crate::config::ZoneConfig;
use crate::error::{Error, Result};
use crate::ignore::LabelMatcher;
use crate::record::{Record, RecordData, RecordType};

/// Metadata values an adapter wants compared (e.g. proxy state)
pub type ComparableMetadata<'a> = dyn Fn(&Record) -> BTreeMap<String, String> + Send + Sync + 'a;

/// Classification of one correlated pair
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeKind {
    Unchanged,
    Create,
    Delete,
    Modify,
}

impl ChangeKind {
    fn verb(&self) -> &'static str {
        match self {
            ChangeKind::Unchanged => "UNCHANGED",
            ChangeKind::Create => "CREATE",
            ChangeKind::Delete => "DELETE",
            ChangeKind::Modify => "MODIFY",
        }
    }
}

/// Pairs an existing record with its desired counterpart
#[derive(Debug, Clone, PartialEq)]
pub struct Correlation {
    /// What happens to this pair
    pub kind: ChangeKind,
    /// The observed record, absent for creates
    pub existing: Option<Record>,
    /// The desired record, absent for deletes
    pub desired: Option<Record>,
    /// Human-readable description, stable for identical input
    pub message: String,
}

impl Correlation {
    /// The record that names this change (desired if present)
    pub fn record(&self) -> Option<&Record> {
        self.desired.as_ref().or(self.existing.as_ref())
    }

    /// Record type of the pair
    pub fn rtype(&self) -> Option<RecordType> {
        self.record().map(|r| r.rtype)
    }

    /// Label of the pair
    pub fn label(&self) -> Option<&str> {
        self.record().map(|r| r.label.as_str())
    }
}

impl fmt::Display for Correlation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

/// Output of [`Differ::diff`]
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Changeset {
    pub unchanged: Vec<Correlation>,
    pub create: Vec<Correlation>,
    pub delete: Vec<Correlation>,
    pub modify: Vec<Correlation>,
}

impl Changeset {
    /// True when nothing needs to change
    pub fn is_empty(&self) -> bool {
        self.create.is_empty() && self.delete.is_empty() && self.modify.is_empty()
    }

    /// Number of entries that require a change
    pub fn change_count(&self) -> usize {
        self.create.len() + self.delete.len() + self.modify.len()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
struct IdentityKey {
    label: String,
    rtype: RecordType,
    payload: Option<String>,
}

impl IdentityKey {
    fn of(record: &Record) -> Self {
        Self {
            label: record.label.clone(),
            rtype: record.rtype,
            payload: record
                .rtype
                .is_multi_value()
                .then(|| record.data.to_string()),
        }
    }
}

impl fmt::Display for IdentityKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.rtype, self.label)?;
        if let Some(payload) = &self.payload {
            write!(f, " {}", payload)?;
        }
        Ok(())
    }
}

/// Changeset calculator for one zone
pub struct Differ<'a> {
    zone: &'a ZoneConfig,
    matcher: &'a dyn LabelMatcher,
    comparable: Option<Box<ComparableMetadata<'a>>>,
}

impl<'a> Differ<'a> {
    /// Create a differ for `zone`, using `matcher` for ignore patterns
    pub fn new(zone: &'a ZoneConfig, matcher: &'a dyn LabelMatcher) -> Self {
        Self {
            zone,
            matcher,
            comparable: None,
        }
    }

    /// Compare adapter-chosen metadata values in addition to TTL and payload
    pub fn with_comparable_metadata(
        mut self,
        f: impl Fn(&Record) -> BTreeMap<String, String> + Send + Sync + 'a,
    ) -> Self {
        self.comparable = Some(Box::new(f));
        self
    }

    /// Compute the changeset between `desired` and `existing`
    ///
    /// Both inputs must already be normalized. Fails with a validation error
    /// if a desired record touches an ignored label, and with a diff error on
    /// duplicate identity keys or malformed payloads.
    pub fn diff(&self, desired: &[Record], existing: &[Record]) -> Result<Changeset> {
        self.zone.check_ignored(desired, self.matcher)?;

        let manages_apex_ns = self.zone.manages_apex_ns(desired);

        let mut pairs: BTreeMap<IdentityKey, (Option<&Record>, Option<&Record>)> = BTreeMap::new();

        for record in existing {
            check_shape(record)?;
            if record.rtype == RecordType::Ns && record.is_apex() && !manages_apex_ns {
                debug!("Skipping apex NS {} (apex NS not managed)", record.data);
                continue;
            }
            let key = IdentityKey::of(record);
            let slot = pairs.entry(key.clone()).or_default();
            if slot.0.replace(record).is_some() {
                return Err(Error::diff(format!("duplicate existing record: {}", key)));
            }
        }

        for record in desired {
            check_shape(record)?;
            let key = IdentityKey::of(record);
            let slot = pairs.entry(key.clone()).or_default();
            if slot.1.replace(record).is_some() {
                return Err(Error::diff(format!("duplicate desired record: {}", key)));
            }
        }

        let mut changes = Changeset::default();
        for (_, pair) in pairs {
            match pair {
                (Some(existing), Some(desired)) => {
                    if self.differs(existing, desired) {
                        changes.modify.push(self.correlate(
                            ChangeKind::Modify,
                            Some(existing),
                            Some(desired),
                        ));
                    } else {
                        changes.unchanged.push(self.correlate(
                            ChangeKind::Unchanged,
                            Some(existing),
                            Some(desired),
                        ));
                    }
                }
                (None, Some(desired)) => {
                    changes
                        .create
                        .push(self.correlate(ChangeKind::Create, None, Some(desired)));
                }
                (Some(existing), None) => {
                    if let Some(reason) = self.keep_reason(existing) {
                        debug!(
                            "Keeping {} {}: {}",
                            existing.rtype,
                            existing.fqdn(&self.zone.name),
                            reason
                        );
                        continue;
                    }
                    changes
                        .delete
                        .push(self.correlate(ChangeKind::Delete, Some(existing), None));
                }
                (None, None) => {}
            }
        }

        Ok(changes)
    }

    fn differs(&self, existing: &Record, desired: &Record) -> bool {
        existing.ttl != desired.ttl
            || existing.data != desired.data
            || self.extra(existing) != self.extra(desired)
    }

    /// Why an unmatched existing record must survive, if it must
    fn keep_reason(&self, existing: &Record) -> Option<String> {
        if !self.zone.purge {
            return Some("purge disabled".to_string());
        }
        if let Some(pattern) = self.zone.ignored_label(&existing.label, self.matcher) {
            return Some(format!("label matches ignore pattern '{}'", pattern));
        }
        if let RecordData::Cname(target) = &existing.data
            && let Some(pattern) = self.zone.ignored_target(target, self.matcher)
        {
            return Some(format!("target matches ignore-target pattern '{}'", pattern));
        }
        None
    }

    fn extra(&self, record: &Record) -> BTreeMap<String, String> {
        self.comparable
            .as_ref()
            .map(|f| f(record))
            .unwrap_or_default()
    }

    fn render(&self, record: &Record) -> String {
        let mut out = record.describe();
        for (key, value) in self.extra(record) {
            out.push_str(&format!(" {}={}", key, value));
        }
        out
    }

    fn correlate(
        &self,
        kind: ChangeKind,
        existing: Option<&Record>,
        desired: Option<&Record>,
    ) -> Correlation {
        let named = desired.or(existing);
        let (rtype, fqdn) = named
            .map(|r| (r.rtype.as_str(), r.fqdn(&self.zone.name)))
            .unwrap_or_default();

        let message = match (existing, desired) {
            (Some(e), Some(d)) if kind == ChangeKind::Modify => format!(
                "{} {} {}: ({}) -> ({})",
                kind.verb(),
                rtype,
                fqdn,
                self.render(e),
                self.render(d)
            ),
            _ => format!(
                "{} {} {} {}",
                kind.verb(),
                rtype,
                fqdn,
                named.map(|r| self.render(r)).unwrap_or_default()
            ),
        };

        Correlation {
            kind,
            existing: existing.cloned(),
            desired: desired.cloned(),
            message,
        }
    }
}

fn check_shape(record: &Record) -> Result<()> {
    if !record.data.fits(record.rtype) {
        return Err(Error::diff(format!(
            "{} record '{}' carries a mismatched payload",
            record.rtype, record.label
        )));
    }
    Ok(())
}
