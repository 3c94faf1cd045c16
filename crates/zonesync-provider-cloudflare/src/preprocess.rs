//! Cloudflare-specific rewrites of a desired zone
//!
//! Runs on the engine's private copy of the zone, before normalization.

use tracing::{debug, warn};
use zonesync_core::config::ZoneConfig;
use zonesync_core::record::{APEX, Record, RecordData, RecordType};
use zonesync_core::{Error, Result};

use crate::native::{AUTO_TTL, decode_page_rule, decode_worker_route, is_proxiable};
use crate::{FEATURE_UNIVERSAL_SSL, META_PROXY, META_PROXY_DEFAULT, META_UNIVERSAL_SSL};

/// Lowest TTL Cloudflare accepts besides "automatic"
pub const MIN_TTL: u32 = 120;

/// Which optional record families the adapter manages
#[derive(Debug, Clone, Copy, Default)]
pub struct Options {
    pub manage_redirects: bool,
    pub manage_workers: bool,
}

/// Check a proxy setting, returning its canonical spelling
pub fn check_proxy_value(value: &str) -> std::result::Result<String, String> {
    let value = value.trim().to_lowercase();
    match value.as_str() {
        "on" | "off" | "full" => Ok(value),
        _ => Err(format!(
            "'{}' is not a valid proxy setting, expected on, off or full",
            value
        )),
    }
}

fn on_off(value: &str) -> std::result::Result<bool, String> {
    match value.trim().to_lowercase().as_str() {
        "on" => Ok(true),
        "off" => Ok(false),
        other => Err(format!("'{}' is not a valid value, expected on or off", other)),
    }
}

/// Apply the Cloudflare rewrites to `zone`
pub fn preprocess_zone(zone: &mut ZoneConfig, options: Options) -> Result<()> {
    if let Some(value) = zone.metadata.get(META_UNIVERSAL_SSL) {
        let enabled = on_off(value)
            .map_err(|e| Error::config(format!("{}: {}: {}", zone.name, META_UNIVERSAL_SSL, e)))?;
        zone.features.insert(FEATURE_UNIVERSAL_SSL.to_string(), enabled);
    }

    let proxy_default = match zone.metadata.get(META_PROXY_DEFAULT) {
        Some(value) => check_proxy_value(value)
            .map_err(|e| Error::config(format!("{}: {}: {}", zone.name, META_PROXY_DEFAULT, e)))?,
        None => "off".to_string(),
    };
    let default_ttl = zone.effective_default_ttl();

    // Cloudflare owns the apex NS set
    zone.manage_apex_ns = false;
    zone.records.retain(|r| {
        let apex_ns = r.is_apex() && r.rtype == RecordType::Ns;
        if apex_ns {
            let target = r.data.to_string();
            if !target.trim_end_matches('.').ends_with(".ns.cloudflare.com") {
                warn!(
                    "{}: apex NS '{}' is not a Cloudflare nameserver; ignoring it",
                    zone.name, target
                );
            }
        }
        !apex_ns
    });

    let mut redirects = Vec::new();
    let mut records = Vec::with_capacity(zone.records.len());
    for mut record in std::mem::take(&mut zone.records) {
        match record.rtype {
            RecordType::Redirect | RecordType::TempRedirect => {
                if !options.manage_redirects {
                    return Err(unmanaged(&record, "manage_redirects"));
                }
                redirects.push(record);
                continue;
            }
            RecordType::PageRule => {
                if !options.manage_redirects {
                    return Err(unmanaged(&record, "manage_redirects"));
                }
                decode_page_rule(&record.data.to_string())?;
            }
            RecordType::WorkerRoute => {
                if !options.manage_workers {
                    return Err(unmanaged(&record, "manage_workers"));
                }
                decode_worker_route(&record.data.to_string())?;
            }
            _ => {}
        }

        let proxy = apply_proxy(&mut record, &proxy_default)?;

        if record.ttl == 0 {
            record.ttl = default_ttl;
        }
        record.ttl = if proxy || record.rtype.is_pseudo() {
            AUTO_TTL
        } else {
            clamp_ttl(record.ttl)
        };

        // Cloudflare flattens CNAME at the apex, so there it is an ALIAS
        match &record.data {
            RecordData::Cname(target) if at_apex(&zone.name, &record.label) => {
                debug!("{}: apex CNAME treated as ALIAS", zone.name);
                record.data = RecordData::Alias(target.clone());
                record.rtype = RecordType::Alias;
            }
            RecordData::Alias(target) if !at_apex(&zone.name, &record.label) => {
                debug!("{}: ALIAS at {} written as CNAME", zone.name, record.label);
                record.data = RecordData::Cname(target.clone());
                record.rtype = RecordType::Cname;
            }
            _ => {}
        }

        records.push(record);
    }

    // Page rule priorities count up from the last redirect
    for (record, priority) in redirects.iter().rev().zip(1u32..) {
        records.push(page_rule_from_redirect(record, priority)?);
    }

    zone.records = records;
    Ok(())
}

/// Labels are not normalized yet; accept every spelling of the apex
fn at_apex(zone: &str, label: &str) -> bool {
    let label = label.trim().trim_end_matches('.');
    label.is_empty() || label == APEX || label.eq_ignore_ascii_case(zone.trim_end_matches('.'))
}

/// 0 and 300 mean "automatic"; anything else is raised to the minimum
pub fn clamp_ttl(ttl: u32) -> u32 {
    match ttl {
        0 | 300 => AUTO_TTL,
        AUTO_TTL => AUTO_TTL,
        ttl if ttl < MIN_TTL => MIN_TTL,
        ttl => ttl,
    }
}

/// Resolve the record's proxy setting in place; true when proxied
fn apply_proxy(record: &mut Record, default: &str) -> Result<bool> {
    if !is_proxiable(record.rtype) {
        if let Some(value) = record.metadata.get(META_PROXY)
            && value != "off"
        {
            return Err(Error::validation(
                record.label.clone(),
                record.rtype,
                format!("{} records cannot be proxied", record.rtype),
            ));
        }
        record.metadata.remove(META_PROXY);
        return Ok(false);
    }

    let value = match record.metadata.get(META_PROXY) {
        Some(value) => check_proxy_value(value)
            .map_err(|e| Error::validation(record.label.clone(), record.rtype, e))?,
        None => default.to_string(),
    };
    let proxied = value != "off";
    record.metadata.insert(META_PROXY.to_string(), value);
    Ok(proxied)
}

fn unmanaged(record: &Record, flag: &str) -> Error {
    Error::validation(
        record.label.clone(),
        record.rtype,
        format!("requires '{}' on the Cloudflare provider", flag),
    )
}

/// Rewrite a `from,to` redirect as an encoded page rule
fn page_rule_from_redirect(record: &Record, priority: u32) -> Result<Record> {
    let payload = record.data.to_string();
    let parts: Vec<&str> = payload.split(',').map(str::trim).collect();
    let [from, to] = parts.as_slice() else {
        return Err(Error::validation(
            record.label.clone(),
            record.rtype,
            format!("expected 'from,to', got '{}'", payload),
        ));
    };
    let code = if record.rtype == RecordType::TempRedirect {
        302
    } else {
        301
    };

    Ok(Record::pseudo(
        APEX,
        RecordType::PageRule,
        format!("{},{},{},{}", from, to, priority, code),
    )
    .with_ttl(AUTO_TTL))
}
