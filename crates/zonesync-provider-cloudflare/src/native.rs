//! Cloudflare API v4 wire types and their translation to canonical records
//!
//! Vendor JSON is decoded into explicit serde types here and converted at
//! this boundary; nothing Cloudflare-shaped leaks into the core.

use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use zonesync_core::record::{APEX, Record, RecordData, RecordType};
use zonesync_core::{Error, Result};

use crate::PROVIDER;

/// Cloudflare's "automatic" TTL
pub const AUTO_TTL: u32 = 1;

/// Standard response envelope
#[derive(Debug, Deserialize)]
pub struct CfResponse<T> {
    #[serde(default)]
    pub success: bool,
    #[serde(default)]
    pub errors: Vec<CfApiError>,
    pub result: Option<T>,
    #[serde(default)]
    pub result_info: Option<CfResultInfo>,
}

#[derive(Debug, Deserialize)]
pub struct CfApiError {
    #[serde(default)]
    pub code: i64,
    #[serde(default)]
    pub message: String,
}

/// Pagination block of list responses
#[derive(Debug, Deserialize)]
pub struct CfResultInfo {
    #[serde(default)]
    pub page: u32,
    #[serde(default)]
    pub total_pages: u32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CfZone {
    pub id: String,
    pub name: String,
}

/// A DNS record as Cloudflare stores it
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CfDnsRecord {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub id: String,
    #[serde(rename = "type")]
    pub record_type: String,
    /// Fully-qualified name without trailing dot
    pub name: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub content: String,
    #[serde(default)]
    pub ttl: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub proxied: Option<bool>,
    #[serde(default, skip_serializing)]
    pub proxiable: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub priority: Option<u16>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<CfRecordData>,
}

/// Structured payload of record types Cloudflare does not express as `content`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum CfRecordData {
    Srv {
        priority: u16,
        weight: u16,
        port: u16,
        target: CfTarget,
    },
    Caa {
        flags: u8,
        tag: String,
        value: String,
    },
    Tlsa {
        usage: u8,
        selector: u8,
        matching_type: u8,
        certificate: String,
    },
    Sshfp {
        algorithm: u8,
        #[serde(rename = "type")]
        fingerprint_type: u8,
        fingerprint: String,
    },
    Ds {
        key_tag: u16,
        algorithm: u8,
        digest_type: u8,
        digest: String,
    },
}

/// SRV target: a name, or `false` for the null target
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum CfTarget {
    Name(String),
    Null(bool),
}

impl CfTarget {
    /// Encode an absolute target for writing; the null target becomes "."
    pub fn from_fqdn(target: &str) -> Self {
        match target.trim_end_matches('.') {
            "" => CfTarget::Name(".".to_string()),
            name => CfTarget::Name(name.to_string()),
        }
    }

    /// Absolute form, "." for the null target
    pub fn fqdn(&self) -> std::result::Result<String, String> {
        match self {
            CfTarget::Name(name) => match name.trim_end_matches('.') {
                "" => Ok(".".to_string()),
                name => Ok(format!("{}.", name)),
            },
            CfTarget::Null(false) => Ok(".".to_string()),
            CfTarget::Null(true) => Err("unknown SRV target value 'true'".to_string()),
        }
    }
}

/// A page rule (only forwarding rules are translated)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CfPageRule {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub id: String,
    pub targets: Vec<CfPageRuleTarget>,
    pub actions: Vec<CfPageRuleAction>,
    #[serde(default)]
    pub priority: u32,
    #[serde(default)]
    pub status: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CfPageRuleTarget {
    pub target: String,
    pub constraint: CfConstraint,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CfConstraint {
    pub operator: String,
    pub value: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CfPageRuleAction {
    pub id: String,
    #[serde(default)]
    pub value: Value,
}

/// A worker route
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CfWorkerRoute {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub id: String,
    pub pattern: String,
    #[serde(default)]
    pub script: String,
}

/// Whether Cloudflare can proxy this record type
pub fn is_proxiable(rtype: RecordType) -> bool {
    matches!(
        rtype,
        RecordType::A | RecordType::Aaaa | RecordType::Cname | RecordType::Alias
    )
}

fn unparsable(native: &CfDnsRecord, reason: impl std::fmt::Display) -> Error {
    Error::provider(
        PROVIDER,
        format!(
            "unparsable {} record '{}' received: {}",
            native.record_type, native.name, reason
        ),
    )
}

/// Label relative to `zone` for a Cloudflare record name
pub fn label_from_fqdn(name: &str, zone: &str) -> String {
    let name = name.trim_end_matches('.');
    if name.eq_ignore_ascii_case(zone) {
        return APEX.to_string();
    }
    match name.strip_suffix(&format!(".{}", zone)) {
        Some(label) => label.to_string(),
        None => name.to_string(),
    }
}

/// Cloudflare record name for a canonical record
pub fn fqdn_for(record: &Record, zone: &str) -> String {
    record.fqdn(zone)
}

fn dotted(name: &str) -> String {
    if name == "." || name.ends_with('.') {
        name.to_string()
    } else {
        format!("{}.", name)
    }
}

/// Translate a Cloudflare DNS record into a canonical record
///
/// Name targets gain their trailing dot, SPF becomes TXT, structured types
/// come from `data`. The native record is kept as the provider reference.
pub fn native_to_record(zone: &str, native: &CfDnsRecord) -> Result<Record> {
    let rtype: RecordType = native
        .record_type
        .parse()
        .map_err(|e| unparsable(native, e))?;
    if rtype.is_pseudo() {
        return Err(unparsable(native, "pseudo-type in DNS record list"));
    }
    let label = label_from_fqdn(&native.name, zone);
    // A CNAME at the apex is served flattened
    let rtype = if rtype == RecordType::Cname && label == APEX {
        RecordType::Alias
    } else {
        rtype
    };

    let data = match (rtype, &native.data) {
        (RecordType::Cname | RecordType::Ns | RecordType::Ptr | RecordType::Alias, _) => {
            RecordData::parse(rtype, &dotted(&native.content)).map_err(|e| unparsable(native, e))?
        }
        (RecordType::Mx, _) => RecordData::Mx {
            preference: native.priority.unwrap_or(0),
            exchange: dotted(&native.content),
        },
        (RecordType::Txt, _) => RecordData::Txt(vec![native.content.clone()]),
        (
            RecordType::Srv,
            Some(CfRecordData::Srv {
                priority,
                weight,
                port,
                target,
            }),
        ) => RecordData::Srv {
            priority: *priority,
            weight: *weight,
            port: *port,
            target: target.fqdn().map_err(|e| unparsable(native, e))?,
        },
        (RecordType::Caa, Some(CfRecordData::Caa { flags, tag, value })) => RecordData::Caa {
            flags: *flags,
            tag: tag.clone(),
            value: value.clone(),
        },
        (
            RecordType::Tlsa,
            Some(CfRecordData::Tlsa {
                usage,
                selector,
                matching_type,
                certificate,
            }),
        ) => RecordData::Tlsa {
            usage: *usage,
            selector: *selector,
            matching_type: *matching_type,
            certificate: certificate.clone(),
        },
        (
            RecordType::Sshfp,
            Some(CfRecordData::Sshfp {
                algorithm,
                fingerprint_type,
                fingerprint,
            }),
        ) => RecordData::Sshfp {
            algorithm: *algorithm,
            fingerprint_type: *fingerprint_type,
            fingerprint: fingerprint.clone(),
        },
        (
            RecordType::Ds,
            Some(CfRecordData::Ds {
                key_tag,
                algorithm,
                digest_type,
                digest,
            }),
        ) => RecordData::Ds {
            key_tag: *key_tag,
            algorithm: *algorithm,
            digest_type: *digest_type,
            digest: digest.clone(),
        },
        // Structured types without structured data fall back to `content`
        _ => RecordData::parse(rtype, &native.content).map_err(|e| unparsable(native, e))?,
    };

    let mut record = Record::new(label, data)
        .with_ttl(native.ttl)
        .with_provider_ref(
            native.id.clone(),
            json!({
                "kind": "dns_record",
                "proxied": native.proxied.unwrap_or(false),
                "proxiable": native.proxiable,
            }),
        );
    record.rtype = rtype;
    if is_proxiable(rtype) {
        record = record.with_metadata(
            crate::META_PROXY,
            if native.proxied.unwrap_or(false) { "on" } else { "off" },
        );
    }
    Ok(record)
}

/// Build the Cloudflare payload for writing a canonical record
pub fn record_to_native(zone: &str, record: &Record, proxied: bool) -> Result<CfDnsRecord> {
    let mut native = CfDnsRecord {
        id: String::new(),
        record_type: record.rtype.as_str().to_string(),
        name: fqdn_for(record, zone),
        content: String::new(),
        ttl: record.ttl,
        proxied: is_proxiable(record.rtype).then_some(proxied),
        proxiable: false,
        priority: None,
        data: None,
    };

    match &record.data {
        RecordData::A(ip) => native.content = ip.to_string(),
        RecordData::Aaaa(ip) => native.content = ip.to_string(),
        RecordData::Cname(target) | RecordData::Alias(target) => {
            // Cloudflare flattens CNAMEs at the apex itself
            native.record_type = RecordType::Cname.as_str().to_string();
            native.content = target.trim_end_matches('.').to_string();
        }
        RecordData::Ns(target) | RecordData::Ptr(target) => {
            native.content = target.trim_end_matches('.').to_string();
        }
        RecordData::Mx {
            preference,
            exchange,
        } => {
            native.priority = Some(*preference);
            native.content = match exchange.as_str() {
                "." => ".".to_string(),
                name => name.trim_end_matches('.').to_string(),
            };
        }
        RecordData::Txt(strings) => native.content = strings.concat(),
        RecordData::Srv {
            priority,
            weight,
            port,
            target,
        } => {
            native.data = Some(CfRecordData::Srv {
                priority: *priority,
                weight: *weight,
                port: *port,
                target: CfTarget::from_fqdn(target),
            });
        }
        RecordData::Caa { flags, tag, value } => {
            native.data = Some(CfRecordData::Caa {
                flags: *flags,
                tag: tag.clone(),
                value: value.clone(),
            });
        }
        RecordData::Tlsa {
            usage,
            selector,
            matching_type,
            certificate,
        } => {
            native.data = Some(CfRecordData::Tlsa {
                usage: *usage,
                selector: *selector,
                matching_type: *matching_type,
                certificate: certificate.clone(),
            });
        }
        RecordData::Sshfp {
            algorithm,
            fingerprint_type,
            fingerprint,
        } => {
            native.data = Some(CfRecordData::Sshfp {
                algorithm: *algorithm,
                fingerprint_type: *fingerprint_type,
                fingerprint: fingerprint.clone(),
            });
        }
        RecordData::Ds {
            key_tag,
            algorithm,
            digest_type,
            digest,
        } => {
            native.data = Some(CfRecordData::Ds {
                key_tag: *key_tag,
                algorithm: *algorithm,
                digest_type: *digest_type,
                digest: digest.clone(),
            });
        }
        RecordData::Soa { .. } | RecordData::Opaque(_) => {
            return Err(Error::unsupported(format!(
                "{} records cannot be written as Cloudflare DNS records",
                record.rtype
            )));
        }
    }

    Ok(native)
}

/// Split an encoded `from,to,priority,code` page rule payload
pub fn decode_page_rule(payload: &str) -> Result<(String, String, u32, u16)> {
    let parts: Vec<&str> = payload.split(',').map(str::trim).collect();
    let bad = || Error::validation(APEX, RecordType::PageRule, format!("bad page rule '{}'", payload));
    if parts.len() != 4 {
        return Err(bad());
    }
    let priority = parts[2].parse().map_err(|_| bad())?;
    let code = parts[3].parse().map_err(|_| bad())?;
    Ok((parts[0].to_string(), parts[1].to_string(), priority, code))
}

/// Page rule request body for an encoded payload
pub fn page_rule_body(payload: &str) -> Result<CfPageRule> {
    let (from, to, priority, code) = decode_page_rule(payload)?;
    Ok(CfPageRule {
        id: String::new(),
        targets: vec![CfPageRuleTarget {
            target: "url".to_string(),
            constraint: CfConstraint {
                operator: "matches".to_string(),
                value: from,
            },
        }],
        actions: vec![CfPageRuleAction {
            id: "forwarding_url".to_string(),
            value: json!({ "url": to, "status_code": code }),
        }],
        priority,
        status: "active".to_string(),
    })
}

/// Canonical record for a forwarding page rule; other rules are skipped
pub fn page_rule_to_record(rule: &CfPageRule) -> Option<Record> {
    let from = &rule.targets.first()?.constraint.value;
    let action = rule.actions.iter().find(|a| a.id == "forwarding_url")?;
    let to = action.value.get("url")?.as_str()?;
    let code = action.value.get("status_code")?.as_u64()?;

    let payload = format!("{},{},{},{}", from, to, rule.priority, code);
    Some(
        Record::pseudo(APEX, RecordType::PageRule, payload)
            .with_ttl(AUTO_TTL)
            .with_provider_ref(rule.id.clone(), json!({ "kind": "page_rule" })),
    )
}

/// Split an encoded `pattern,script` worker route payload
pub fn decode_worker_route(payload: &str) -> Result<(String, String)> {
    match payload.split(',').map(str::trim).collect::<Vec<_>>().as_slice() {
        [pattern, script] if !pattern.is_empty() => Ok((pattern.to_string(), script.to_string())),
        _ => Err(Error::validation(
            APEX,
            RecordType::WorkerRoute,
            format!("bad worker route '{}', expected 'pattern,script'", payload),
        )),
    }
}

pub fn worker_route_to_record(route: &CfWorkerRoute) -> Record {
    Record::pseudo(
        APEX,
        RecordType::WorkerRoute,
        format!("{},{}", route.pattern, route.script),
    )
    .with_ttl(AUTO_TTL)
    .with_provider_ref(route.id.clone(), json!({ "kind": "worker_route" }))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn native(json: Value) -> CfDnsRecord {
        serde_json::from_value(json).unwrap()
    }

    #[test]
    fn test_cname_gains_trailing_dot() {
        let rec = native_to_record(
            "example.com",
            &native(json!({
                "id": "r1", "type": "CNAME", "name": "www.example.com",
                "content": "example.com", "ttl": 1, "proxied": true, "proxiable": true
            })),
        )
        .unwrap();

        assert_eq!(rec.label, "www");
        assert_eq!(rec.data, RecordData::Cname("example.com.".to_string()));
        assert_eq!(rec.ttl, AUTO_TTL);
        assert_eq!(rec.metadata[crate::META_PROXY], "on");
        assert_eq!(rec.provider_ref.unwrap().id, "r1");
    }

    #[test]
    fn test_spf_becomes_txt() {
        let rec = native_to_record(
            "example.com",
            &native(json!({
                "id": "r2", "type": "SPF", "name": "example.com",
                "content": "v=spf1 -all", "ttl": 300
            })),
        )
        .unwrap();
        assert_eq!(rec.rtype, RecordType::Txt);
        assert_eq!(rec.label, APEX);
    }

    #[test]
    fn test_srv_from_data_with_null_target() {
        let rec = native_to_record(
            "example.com",
            &native(json!({
                "id": "r3", "type": "SRV", "name": "_sip._tcp.example.com", "ttl": 300,
                "data": { "service": "_sip", "proto": "_tcp", "name": "example.com",
                          "priority": 10, "weight": 5, "port": 5060, "target": false }
            })),
        )
        .unwrap();
        assert_eq!(
            rec.data,
            RecordData::Srv {
                priority: 10,
                weight: 5,
                port: 5060,
                target: ".".to_string()
            }
        );
    }

    #[test]
    fn test_structured_types_from_data() {
        let ds = native_to_record(
            "example.com",
            &native(json!({
                "id": "r4", "type": "DS", "name": "sub.example.com", "ttl": 3600,
                "data": { "key_tag": 2371, "algorithm": 13, "digest_type": 2, "digest": "ABCDEF" }
            })),
        )
        .unwrap();
        assert!(matches!(ds.data, RecordData::Ds { key_tag: 2371, .. }));

        let sshfp = native_to_record(
            "example.com",
            &native(json!({
                "id": "r5", "type": "SSHFP", "name": "host.example.com", "ttl": 3600,
                "data": { "algorithm": 4, "type": 2, "fingerprint": "abcdef" }
            })),
        )
        .unwrap();
        assert!(matches!(sshfp.data, RecordData::Sshfp { fingerprint_type: 2, .. }));

        let caa = native_to_record(
            "example.com",
            &native(json!({
                "id": "r6", "type": "CAA", "name": "example.com", "ttl": 3600,
                "data": { "flags": 0, "tag": "issue", "value": "letsencrypt.org" }
            })),
        )
        .unwrap();
        assert_eq!(caa.data.to_string(), "0 issue \"letsencrypt.org\"");
    }

    #[test]
    fn test_record_to_native_mx_and_srv() {
        let mx = Record::parse("@", RecordType::Mx, "10 mail.example.com.")
            .unwrap()
            .with_ttl(300);
        let out = record_to_native("example.com", &mx, false).unwrap();
        assert_eq!(out.name, "example.com");
        assert_eq!(out.priority, Some(10));
        assert_eq!(out.content, "mail.example.com");
        assert_eq!(out.proxied, None);

        let srv = Record::parse("_sip._tcp", RecordType::Srv, "10 5 5060 .").unwrap();
        let out = record_to_native("example.com", &srv, false).unwrap();
        let body = serde_json::to_value(&out).unwrap();
        assert_eq!(body["data"]["target"], ".");
        assert_eq!(body["name"], "_sip._tcp.example.com");
    }

    #[test]
    fn test_apex_cname_read_as_alias() {
        let rec = native_to_record(
            "example.com",
            &native(json!({
                "id": "r1", "type": "CNAME", "name": "example.com",
                "content": "lb.example.net", "ttl": 1, "proxied": false, "proxiable": true
            })),
        )
        .unwrap();
        assert_eq!(rec.rtype, RecordType::Alias);
        assert_eq!(rec.data, RecordData::Alias("lb.example.net.".to_string()));

        let rec = native_to_record(
            "example.com",
            &native(json!({
                "id": "r2", "type": "CNAME", "name": "www.example.com",
                "content": "example.com", "ttl": 1
            })),
        )
        .unwrap();
        assert_eq!(rec.rtype, RecordType::Cname);
    }

    #[test]
    fn test_alias_written_as_cname() {
        let alias = Record::parse("@", RecordType::Alias, "lb.example.net.").unwrap();
        let out = record_to_native("example.com", &alias, true).unwrap();
        assert_eq!(out.record_type, "CNAME");
        assert_eq!(out.proxied, Some(true));
    }

    #[test]
    fn test_page_rule_round_trip() {
        let body = page_rule_body("example.com/*,https://www.example.com/$1,1,301").unwrap();
        let mut rule: CfPageRule =
            serde_json::from_value(serde_json::to_value(&body).unwrap()).unwrap();
        rule.id = "pr1".to_string();

        let rec = page_rule_to_record(&rule).unwrap();
        assert_eq!(
            rec.data,
            RecordData::Opaque("example.com/*,https://www.example.com/$1,1,301".to_string())
        );
        assert!(decode_page_rule("a,b,c").is_err());
    }

    #[test]
    fn test_worker_route_decoding() {
        assert_eq!(
            decode_worker_route("example.com/api/*,api-worker").unwrap(),
            ("example.com/api/*".to_string(), "api-worker".to_string())
        );
        assert!(decode_worker_route("only-pattern").is_err());
    }
}
