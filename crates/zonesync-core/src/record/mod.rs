// # Record Model
//
// Canonical, provider-agnostic representation of a single DNS resource
// record. Provider adapters decode their native payloads into [`Record`]
// and keep whatever they need to apply a change later in
// [`Record::provider_ref`].
//
// ## Identity
//
// A record is identified by its label, its type and (for multi-value types)
// its presentation-format payload. TTL and metadata never participate in
// identity; they only decide whether a matched pair is a modification.

use serde::Deserialize;
use std::collections::BTreeMap;
use std::fmt;
use std::net::{Ipv4Addr, Ipv6Addr};
use std::str::FromStr;

use crate::error::{Error, Result};

/// Label of the zone apex
pub const APEX: &str = "@";

/// Fallback TTL when neither the record nor the zone specifies one
pub const DEFAULT_TTL: u32 = 300;

/// Metadata key that lets a desired record live at an ignored label
pub const META_IGNORE_OVERRIDE: &str = "ignore_override";

/// DNS record type, including provider-specific pseudo-types
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum RecordType {
    A,
    Aaaa,
    Cname,
    /// CNAME-like record allowed at the apex (flattened by the provider)
    Alias,
    Mx,
    Ns,
    Txt,
    Srv,
    Caa,
    Tlsa,
    Sshfp,
    Ds,
    Ptr,
    Soa,
    /// Permanent HTTP redirect rule, encoded as `from,to`
    Redirect,
    /// Temporary HTTP redirect rule, encoded as `from,to`
    TempRedirect,
    /// Provider page rule synthesized from a redirect
    PageRule,
    /// Edge worker route, encoded as `pattern,script`
    WorkerRoute,
}

impl RecordType {
    /// Presentation name of the type
    pub fn as_str(&self) -> &'static str {
        match self {
            RecordType::A => "A",
            RecordType::Aaaa => "AAAA",
            RecordType::Cname => "CNAME",
            RecordType::Alias => "ALIAS",
            RecordType::Mx => "MX",
            RecordType::Ns => "NS",
            RecordType::Txt => "TXT",
            RecordType::Srv => "SRV",
            RecordType::Caa => "CAA",
            RecordType::Tlsa => "TLSA",
            RecordType::Sshfp => "SSHFP",
            RecordType::Ds => "DS",
            RecordType::Ptr => "PTR",
            RecordType::Soa => "SOA",
            RecordType::Redirect => "REDIRECT",
            RecordType::TempRedirect => "TEMP_REDIRECT",
            RecordType::PageRule => "PAGE_RULE",
            RecordType::WorkerRoute => "WORKER_ROUTE",
        }
    }

    /// Whether several records of this type may share one label
    ///
    /// Such records are compared as a set, keyed by their payload.
    pub fn is_multi_value(&self) -> bool {
        matches!(
            self,
            RecordType::A
                | RecordType::Aaaa
                | RecordType::Mx
                | RecordType::Txt
                | RecordType::Ns
                | RecordType::Srv
                | RecordType::Caa
                | RecordType::Ds
                | RecordType::Tlsa
                | RecordType::Sshfp
        ) || self.is_pseudo()
    }

    /// Whether the type is synthesized by an adapter rather than served as DNS
    pub fn is_pseudo(&self) -> bool {
        matches!(
            self,
            RecordType::Redirect
                | RecordType::TempRedirect
                | RecordType::PageRule
                | RecordType::WorkerRoute
        )
    }
}

impl fmt::Display for RecordType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RecordType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let rtype = match s.trim().to_uppercase().as_str() {
            "A" => RecordType::A,
            "AAAA" => RecordType::Aaaa,
            "CNAME" => RecordType::Cname,
            "ALIAS" => RecordType::Alias,
            "MX" => RecordType::Mx,
            "NS" => RecordType::Ns,
            "TXT" | "SPF" => RecordType::Txt,
            "SRV" => RecordType::Srv,
            "CAA" => RecordType::Caa,
            "TLSA" => RecordType::Tlsa,
            "SSHFP" => RecordType::Sshfp,
            "DS" => RecordType::Ds,
            "PTR" => RecordType::Ptr,
            "SOA" => RecordType::Soa,
            "REDIRECT" | "CF_REDIRECT" => RecordType::Redirect,
            "TEMP_REDIRECT" | "CF_TEMP_REDIRECT" => RecordType::TempRedirect,
            "PAGE_RULE" => RecordType::PageRule,
            "WORKER_ROUTE" | "CF_WORKER_ROUTE" => RecordType::WorkerRoute,
            other => {
                return Err(Error::config(format!("Unknown record type: {}", other)));
            }
        };
        Ok(rtype)
    }
}

/// Type-specific payload of a record
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecordData {
    A(Ipv4Addr),
    Aaaa(Ipv6Addr),
    Cname(String),
    Alias(String),
    Ns(String),
    Ptr(String),
    Mx {
        preference: u16,
        exchange: String,
    },
    /// One or more character-strings
    Txt(Vec<String>),
    Srv {
        priority: u16,
        weight: u16,
        port: u16,
        target: String,
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
        fingerprint_type: u8,
        fingerprint: String,
    },
    Ds {
        key_tag: u16,
        algorithm: u8,
        digest_type: u8,
        digest: String,
    },
    Soa {
        mname: String,
        rname: String,
        serial: u32,
        refresh: u32,
        retry: u32,
        expire: u32,
        minimum: u32,
    },
    /// Payload of a pseudo-type, compared byte for byte
    Opaque(String),
}

impl RecordData {
    /// Parse a presentation-format payload for the given type
    ///
    /// Returns the reason on failure; [`Record::parse`] attaches the label.
    pub fn parse(rtype: RecordType, content: &str) -> std::result::Result<Self, String> {
        let content = content.trim();
        let fields: Vec<&str> = content.split_whitespace().collect();

        let data = match rtype {
            RecordType::A => RecordData::A(
                content
                    .parse()
                    .map_err(|_| format!("'{}' is not an IPv4 address", content))?,
            ),
            RecordType::Aaaa => RecordData::Aaaa(
                content
                    .parse()
                    .map_err(|_| format!("'{}' is not an IPv6 address", content))?,
            ),
            RecordType::Cname => RecordData::Cname(content.to_string()),
            RecordType::Alias => RecordData::Alias(content.to_string()),
            RecordType::Ns => RecordData::Ns(content.to_string()),
            RecordType::Ptr => RecordData::Ptr(content.to_string()),
            RecordType::Txt => RecordData::Txt(vec![content.to_string()]),
            RecordType::Mx => {
                expect_fields(&fields, 2, "preference exchange")?;
                RecordData::Mx {
                    preference: number(fields[0], "preference")?,
                    exchange: fields[1].to_string(),
                }
            }
            RecordType::Srv => {
                expect_fields(&fields, 4, "priority weight port target")?;
                RecordData::Srv {
                    priority: number(fields[0], "priority")?,
                    weight: number(fields[1], "weight")?,
                    port: number(fields[2], "port")?,
                    target: fields[3].to_string(),
                }
            }
            RecordType::Caa => {
                if fields.len() < 3 {
                    return Err("expected 'flags tag value'".to_string());
                }
                // The value may contain spaces, so take everything after the tag
                let rest = content[fields[0].len()..].trim_start();
                let value = rest[fields[1].len()..].trim();
                RecordData::Caa {
                    flags: number(fields[0], "flags")?,
                    tag: fields[1].to_string(),
                    value: unquote(value),
                }
            }
            RecordType::Tlsa => {
                expect_fields(&fields, 4, "usage selector matching-type certificate")?;
                RecordData::Tlsa {
                    usage: number(fields[0], "usage")?,
                    selector: number(fields[1], "selector")?,
                    matching_type: number(fields[2], "matching type")?,
                    certificate: fields[3].to_string(),
                }
            }
            RecordType::Sshfp => {
                expect_fields(&fields, 3, "algorithm type fingerprint")?;
                RecordData::Sshfp {
                    algorithm: number(fields[0], "algorithm")?,
                    fingerprint_type: number(fields[1], "fingerprint type")?,
                    fingerprint: fields[2].to_string(),
                }
            }
            RecordType::Ds => {
                expect_fields(&fields, 4, "key-tag algorithm digest-type digest")?;
                RecordData::Ds {
                    key_tag: number(fields[0], "key tag")?,
                    algorithm: number(fields[1], "algorithm")?,
                    digest_type: number(fields[2], "digest type")?,
                    digest: fields[3].to_string(),
                }
            }
            RecordType::Soa => {
                expect_fields(&fields, 7, "mname rname serial refresh retry expire minimum")?;
                RecordData::Soa {
                    mname: fields[0].to_string(),
                    rname: fields[1].to_string(),
                    serial: number(fields[2], "serial")?,
                    refresh: number(fields[3], "refresh")?,
                    retry: number(fields[4], "retry")?,
                    expire: number(fields[5], "expire")?,
                    minimum: number(fields[6], "minimum")?,
                }
            }
            RecordType::Redirect
            | RecordType::TempRedirect
            | RecordType::PageRule
            | RecordType::WorkerRoute => RecordData::Opaque(content.to_string()),
        };

        Ok(data)
    }

    /// Whether this payload is a valid shape for `rtype`
    pub fn fits(&self, rtype: RecordType) -> bool {
        match self {
            RecordData::A(_) => rtype == RecordType::A,
            RecordData::Aaaa(_) => rtype == RecordType::Aaaa,
            RecordData::Cname(_) => rtype == RecordType::Cname,
            RecordData::Alias(_) => rtype == RecordType::Alias,
            RecordData::Ns(_) => rtype == RecordType::Ns,
            RecordData::Ptr(_) => rtype == RecordType::Ptr,
            RecordData::Mx { .. } => rtype == RecordType::Mx,
            RecordData::Txt(_) => rtype == RecordType::Txt,
            RecordData::Srv { .. } => rtype == RecordType::Srv,
            RecordData::Caa { .. } => rtype == RecordType::Caa,
            RecordData::Tlsa { .. } => rtype == RecordType::Tlsa,
            RecordData::Sshfp { .. } => rtype == RecordType::Sshfp,
            RecordData::Ds { .. } => rtype == RecordType::Ds,
            RecordData::Soa { .. } => rtype == RecordType::Soa,
            RecordData::Opaque(_) => rtype.is_pseudo(),
        }
    }

    /// The name this payload points at, if any
    pub fn target_name(&self) -> Option<&str> {
        match self {
            RecordData::Cname(t)
            | RecordData::Alias(t)
            | RecordData::Ns(t)
            | RecordData::Ptr(t) => Some(t),
            RecordData::Mx { exchange, .. } => Some(exchange),
            RecordData::Srv { target, .. } => Some(target),
            _ => None,
        }
    }
}

impl fmt::Display for RecordData {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RecordData::A(ip) => write!(f, "{}", ip),
            RecordData::Aaaa(ip) => write!(f, "{}", ip),
            RecordData::Cname(t) | RecordData::Alias(t) | RecordData::Ns(t) | RecordData::Ptr(t) => {
                f.write_str(t)
            }
            RecordData::Mx {
                preference,
                exchange,
            } => write!(f, "{} {}", preference, exchange),
            RecordData::Txt(strings) => {
                let quoted: Vec<String> = strings.iter().map(|s| quote(s)).collect();
                f.write_str(&quoted.join(" "))
            }
            RecordData::Srv {
                priority,
                weight,
                port,
                target,
            } => write!(f, "{} {} {} {}", priority, weight, port, target),
            RecordData::Caa { flags, tag, value } => {
                write!(f, "{} {} {}", flags, tag, quote(value))
            }
            RecordData::Tlsa {
                usage,
                selector,
                matching_type,
                certificate,
            } => write!(f, "{} {} {} {}", usage, selector, matching_type, certificate),
            RecordData::Sshfp {
                algorithm,
                fingerprint_type,
                fingerprint,
            } => write!(f, "{} {} {}", algorithm, fingerprint_type, fingerprint),
            RecordData::Ds {
                key_tag,
                algorithm,
                digest_type,
                digest,
            } => write!(f, "{} {} {} {}", key_tag, algorithm, digest_type, digest),
            RecordData::Soa {
                mname,
                rname,
                serial,
                refresh,
                retry,
                expire,
                minimum,
            } => write!(
                f,
                "{} {} {} {} {} {} {}",
                mname, rname, serial, refresh, retry, expire, minimum
            ),
            RecordData::Opaque(raw) => f.write_str(raw),
        }
    }
}

fn expect_fields(fields: &[&str], n: usize, shape: &str) -> std::result::Result<(), String> {
    if fields.len() != n {
        return Err(format!("expected '{}', got {} field(s)", shape, fields.len()));
    }
    Ok(())
}

fn number<T: FromStr>(field: &str, what: &str) -> std::result::Result<T, String> {
    field
        .parse()
        .map_err(|_| format!("invalid {}: '{}'", what, field))
}

fn quote(s: &str) -> String {
    format!("\"{}\"", s.replace('\\', "\\\\").replace('"', "\\\""))
}

fn unquote(s: &str) -> String {
    match s.strip_prefix('"').and_then(|s| s.strip_suffix('"')) {
        Some(inner) => inner.replace("\\\"", "\"").replace("\\\\", "\\"),
        None => s.to_string(),
    }
}

/// Reference to the provider-native representation a record was decoded from
///
/// Only used when applying corrections; never compared or rendered.
#[derive(Debug, Clone, PartialEq)]
pub struct ProviderRef {
    /// Provider-assigned identifier
    pub id: String,
    /// The native payload, in whatever shape the adapter serialized it
    pub extra: serde_json::Value,
}

/// A single DNS resource record
#[derive(Debug, Clone, Deserialize)]
#[serde(try_from = "crate::config::RecordConfig")]
pub struct Record {
    /// Label relative to the zone; `@` for the apex
    pub label: String,
    /// Record type
    pub rtype: RecordType,
    /// Type-specific payload
    pub data: RecordData,
    /// TTL in seconds; 0 means "use the zone default"
    pub ttl: u32,
    /// Provider-specific annotations (e.g. proxy state)
    pub metadata: BTreeMap<String, String>,
    /// Native representation, populated by `fetch_observed`
    pub provider_ref: Option<ProviderRef>,
}

impl Record {
    /// Create a record from a typed payload
    ///
    /// The type is taken from the payload; pseudo-types go through [`Record::pseudo`].
    pub fn new(label: impl Into<String>, data: RecordData) -> Self {
        let rtype = match &data {
            RecordData::A(_) => RecordType::A,
            RecordData::Aaaa(_) => RecordType::Aaaa,
            RecordData::Cname(_) => RecordType::Cname,
            RecordData::Alias(_) => RecordType::Alias,
            RecordData::Ns(_) => RecordType::Ns,
            RecordData::Ptr(_) => RecordType::Ptr,
            RecordData::Mx { .. } => RecordType::Mx,
            RecordData::Txt(_) => RecordType::Txt,
            RecordData::Srv { .. } => RecordType::Srv,
            RecordData::Caa { .. } => RecordType::Caa,
            RecordData::Tlsa { .. } => RecordType::Tlsa,
            RecordData::Sshfp { .. } => RecordType::Sshfp,
            RecordData::Ds { .. } => RecordType::Ds,
            RecordData::Soa { .. } => RecordType::Soa,
            RecordData::Opaque(_) => RecordType::PageRule,
        };
        Self {
            label: label.into(),
            rtype,
            data,
            ttl: 0,
            metadata: BTreeMap::new(),
            provider_ref: None,
        }
    }

    /// Create a pseudo-type record with an opaque payload
    pub fn pseudo(label: impl Into<String>, rtype: RecordType, payload: impl Into<String>) -> Self {
        let mut record = Self::new(label, RecordData::Opaque(payload.into()));
        record.rtype = rtype;
        record
    }

    /// Parse a record from its presentation-format payload
    pub fn parse(label: impl Into<String>, rtype: RecordType, content: &str) -> Result<Self> {
        let label = label.into();
        let data = RecordData::parse(rtype, content)
            .map_err(|reason| Error::validation(label.clone(), rtype, reason))?;
        let mut record = Self::new(label, data);
        record.rtype = rtype;
        Ok(record)
    }

    /// Set the TTL
    pub fn with_ttl(mut self, ttl: u32) -> Self {
        self.ttl = ttl;
        self
    }

    /// Add a metadata entry
    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    /// Attach the provider-native reference
    pub fn with_provider_ref(mut self, id: impl Into<String>, extra: serde_json::Value) -> Self {
        self.provider_ref = Some(ProviderRef {
            id: id.into(),
            extra,
        });
        self
    }

    /// Whether the record sits at the zone apex
    pub fn is_apex(&self) -> bool {
        self.label == APEX
    }

    /// Fully-qualified name (without trailing dot)
    pub fn fqdn(&self, zone: &str) -> String {
        if self.is_apex() {
            zone.to_string()
        } else {
            format!("{}.{}", self.label, zone)
        }
    }

    /// Whether the record explicitly opts into living at an ignored label
    pub fn has_ignore_override(&self) -> bool {
        self.metadata
            .get(META_IGNORE_OVERRIDE)
            .is_some_and(|v| v.eq_ignore_ascii_case("true"))
    }

    /// Payload plus TTL, as used in change messages
    pub fn describe(&self) -> String {
        format!("{} ttl={}", self.data, self.ttl)
    }
}

impl PartialEq for Record {
    fn eq(&self, other: &Self) -> bool {
        self.label == other.label
            && self.rtype == other.rtype
            && self.data == other.data
            && self.ttl == other.ttl
            && self.metadata == other.metadata
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_record_types_case_insensitive() {
        assert_eq!("aaaa".parse::<RecordType>().unwrap(), RecordType::Aaaa);
        assert_eq!("SPF".parse::<RecordType>().unwrap(), RecordType::Txt);
        assert_eq!(
            "cf_worker_route".parse::<RecordType>().unwrap(),
            RecordType::WorkerRoute
        );
        assert!("NAPTR".parse::<RecordType>().is_err());
    }

    #[test]
    fn test_parse_mx_and_srv() {
        let mx = RecordData::parse(RecordType::Mx, "10 mail").unwrap();
        assert_eq!(
            mx,
            RecordData::Mx {
                preference: 10,
                exchange: "mail".to_string()
            }
        );

        let srv = RecordData::parse(RecordType::Srv, "10 20 5060 sip.example.com.").unwrap();
        assert_eq!(srv.to_string(), "10 20 5060 sip.example.com.");
        assert_eq!(srv.target_name(), Some("sip.example.com."));
    }

    #[test]
    fn test_parse_caa_with_quoted_value() {
        let caa = RecordData::parse(RecordType::Caa, "0 issue \"letsencrypt.org\"").unwrap();
        assert_eq!(
            caa,
            RecordData::Caa {
                flags: 0,
                tag: "issue".to_string(),
                value: "letsencrypt.org".to_string()
            }
        );
        assert_eq!(caa.to_string(), "0 issue \"letsencrypt.org\"");
    }

    #[test]
    fn test_bad_ip_is_validation_error_naming_record() {
        let err = Record::parse("www", RecordType::A, "1.2.3").unwrap_err();
        match err {
            Error::Validation {
                label, record_type, ..
            } => {
                assert_eq!(label, "www");
                assert_eq!(record_type, "A");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_wrong_field_count() {
        assert!(RecordData::parse(RecordType::Ds, "12345 13 2").is_err());
        assert!(RecordData::parse(RecordType::Mx, "mail.example.com.").is_err());
    }

    #[test]
    fn test_multi_value_types() {
        assert!(RecordType::A.is_multi_value());
        assert!(RecordType::Ns.is_multi_value());
        assert!(RecordType::PageRule.is_multi_value());
        assert!(!RecordType::Cname.is_multi_value());
        assert!(!RecordType::Soa.is_multi_value());
    }

    #[test]
    fn test_txt_presentation_escapes_quotes() {
        let txt = RecordData::Txt(vec!["a \"b\"".to_string(), "c".to_string()]);
        assert_eq!(txt.to_string(), r#""a \"b\"" "c""#);
    }

    #[test]
    fn test_equality_ignores_provider_ref() {
        let a = Record::parse("@", RecordType::A, "1.2.3.4").unwrap();
        let b = a
            .clone()
            .with_provider_ref("abc", serde_json::json!({"id": "abc"}));
        assert_eq!(a, b);
    }

    #[test]
    fn test_fqdn() {
        let apex = Record::parse("@", RecordType::A, "1.2.3.4").unwrap();
        let www = Record::parse("www", RecordType::A, "1.2.3.4").unwrap();
        assert_eq!(apex.fqdn("example.com"), "example.com");
        assert_eq!(www.fqdn("example.com"), "www.example.com");
    }
}
