// # Normalizer
//
// Canonicalizes a record collection before diffing so that desired and
// observed records compare on equal footing:
//
// - labels are lowercase and relative to the zone (`@` for the apex)
// - name targets are absolute (trailing dot), single labels expand under the apex
// - TTL 0 becomes the zone default
// - TXT strings longer than 255 octets are split into 255-octet chunks
// - the collection is sorted by label, type, then payload
//
// Normalizing an already-normalized collection is a no-op.

use std::collections::BTreeMap;
use tracing::debug;

use crate::config::ZoneConfig;
use crate::error::{Error, Result};
use crate::record::{APEX, Record, RecordData, RecordType};

/// Maximum length of one TXT character-string, in octets
pub const TXT_CHUNK_LIMIT: usize = 255;

/// Record canonicalizer bound to one zone
#[derive(Debug, Clone)]
pub struct Normalizer {
    zone: String,
    default_ttl: u32,
}

impl Normalizer {
    /// Create a normalizer for `zone` (with or without trailing dot)
    pub fn new(zone: &str, default_ttl: u32) -> Self {
        Self {
            zone: zone.trim().trim_end_matches('.').to_lowercase(),
            default_ttl,
        }
    }

    /// Create a normalizer from the zone's configuration
    pub fn for_zone(zone: &ZoneConfig) -> Self {
        Self::new(&zone.name, zone.effective_default_ttl())
    }

    /// Normalize a collection in place, then validate and sort it
    pub fn normalize(&self, records: &mut [Record]) -> Result<()> {
        for record in records.iter_mut() {
            self.normalize_record(record)?;
        }

        records.sort_by_cached_key(|r| (r.label.clone(), r.rtype, r.data.to_string()));

        check_label_sets(records)
    }

    /// Normalize a single record in place
    pub fn normalize_record(&self, record: &mut Record) -> Result<()> {
        let rtype = record.rtype;
        let fail = |label: &str, reason: String| Error::validation(label, rtype, reason);

        if !record.data.fits(rtype) {
            return Err(fail(&record.label, "payload does not match record type".to_string()));
        }

        let label = self
            .normalize_label(&record.label)
            .map_err(|reason| fail(&record.label, reason))?;
        if label != record.label {
            debug!("Normalized label '{}' -> '{}'", record.label, label);
            record.label = label;
        }

        if record.ttl == 0 {
            record.ttl = self.default_ttl;
        }

        let label = record.label.clone();
        self.normalize_data(&mut record.data)
            .map_err(|reason| fail(&label, reason))
    }

    fn normalize_label(&self, label: &str) -> std::result::Result<String, String> {
        let label = label.trim().to_lowercase();
        if label.is_empty() || label == APEX {
            return Ok(APEX.to_string());
        }

        let Some(name) = label.strip_suffix('.') else {
            return Ok(label);
        };
        if name == self.zone {
            return Ok(APEX.to_string());
        }
        match name.strip_suffix(&format!(".{}", self.zone)) {
            Some(relative) if !relative.is_empty() => Ok(relative.to_string()),
            _ => Err(format!("'{}' is outside zone '{}'", label, self.zone)),
        }
    }

    fn normalize_target(&self, target: &str, allow_null: bool) -> std::result::Result<String, String> {
        let target = target.trim().to_lowercase();
        if target.is_empty() {
            return Err("target cannot be empty".to_string());
        }
        if target == "." {
            if allow_null {
                return Ok(target);
            }
            return Err("null target '.' is not allowed here".to_string());
        }
        if target == APEX {
            return Ok(format!("{}.", self.zone));
        }
        if target.ends_with('.') {
            return Ok(target);
        }
        if target.contains('.') {
            Ok(format!("{}.", target))
        } else {
            Ok(format!("{}.{}.", target, self.zone))
        }
    }

    fn normalize_data(&self, data: &mut RecordData) -> std::result::Result<(), String> {
        match data {
            RecordData::A(_) | RecordData::Aaaa(_) => {}
            RecordData::Cname(target)
            | RecordData::Alias(target)
            | RecordData::Ns(target)
            | RecordData::Ptr(target) => {
                *target = self.normalize_target(target, false)?;
            }
            RecordData::Mx { exchange, .. } => {
                *exchange = self.normalize_target(exchange, true)?;
            }
            RecordData::Srv { target, .. } => {
                *target = self.normalize_target(target, true)?;
            }
            RecordData::Txt(strings) => {
                if strings.is_empty() {
                    return Err("TXT record has no strings".to_string());
                }
                if strings.iter().any(|s| s.len() > TXT_CHUNK_LIMIT) {
                    *strings = strings.iter().flat_map(|s| split_txt(s)).collect();
                }
            }
            RecordData::Caa { tag, .. } => {
                *tag = tag.trim().to_lowercase();
                if tag.is_empty() {
                    return Err("CAA tag cannot be empty".to_string());
                }
            }
            RecordData::Tlsa { certificate, .. } => {
                *certificate = hex(certificate, "certificate data")?.to_lowercase();
            }
            RecordData::Sshfp { fingerprint, .. } => {
                *fingerprint = hex(fingerprint, "fingerprint")?.to_lowercase();
            }
            RecordData::Ds { digest, .. } => {
                *digest = hex(digest, "digest")?.to_uppercase();
            }
            RecordData::Soa { mname, rname, .. } => {
                *mname = self.normalize_target(mname, false)?;
                *rname = self.normalize_target(rname, false)?;
            }
            RecordData::Opaque(payload) => {
                if payload.trim().is_empty() {
                    return Err("payload cannot be empty".to_string());
                }
            }
        }
        Ok(())
    }
}

fn hex<'a>(value: &'a str, what: &str) -> std::result::Result<&'a str, String> {
    let value = value.trim();
    if value.is_empty() || !value.chars().all(|c| c.is_ascii_hexdigit()) {
        return Err(format!("{} must be non-empty hex, got '{}'", what, value));
    }
    Ok(value)
}

/// Split a TXT string into chunks of at most [`TXT_CHUNK_LIMIT`] octets
///
/// Chunks end on UTF-8 character boundaries. Strings already within the
/// limit come back unchanged.
pub fn split_txt(s: &str) -> Vec<String> {
    let mut chunks = Vec::new();
    let mut rest = s;
    while rest.len() > TXT_CHUNK_LIMIT {
        let mut cut = TXT_CHUNK_LIMIT;
        while !rest.is_char_boundary(cut) {
            cut -= 1;
        }
        chunks.push(rest[..cut].to_string());
        rest = &rest[cut..];
    }
    if !rest.is_empty() || chunks.is_empty() {
        chunks.push(rest.to_string());
    }
    chunks
}

/// Label-level rules: CNAME exclusivity and single-valued types
fn check_label_sets(records: &[Record]) -> Result<()> {
    let mut by_label: BTreeMap<&str, Vec<RecordType>> = BTreeMap::new();
    for record in records.iter().filter(|r| !r.rtype.is_pseudo()) {
        by_label.entry(record.label.as_str()).or_default().push(record.rtype);
    }

    for (label, types) in by_label {
        if types.contains(&RecordType::Cname) && types.len() > 1 {
            return Err(Error::validation(
                label,
                RecordType::Cname,
                "a CNAME cannot share its label with other records",
            ));
        }
        // Sorted input keeps equal types adjacent
        if let Some(pair) = types
            .windows(2)
            .find(|w| w[0] == w[1] && !w[0].is_multi_value())
        {
            return Err(Error::validation(
                label,
                pair[0],
                format!("only one {} record is allowed per label", pair[0]),
            ));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn normalizer() -> Normalizer {
        Normalizer::new("Example.com.", 300)
    }

    fn rec(label: &str, rtype: RecordType, content: &str) -> Record {
        Record::parse(label, rtype, content).unwrap()
    }

    #[test]
    fn test_targets_become_absolute() {
        let n = normalizer();
        let mut records = vec![
            rec("www", RecordType::Cname, "web"),
            rec("@", RecordType::Mx, "10 Mail.Example.net"),
            rec("ftp", RecordType::Cname, "@"),
            rec("_sip._tcp", RecordType::Srv, "10 20 5060 sip.example.com."),
        ];
        n.normalize(&mut records).unwrap();

        let targets: Vec<String> = records.iter().map(|r| r.data.to_string()).collect();
        assert!(targets.contains(&"web.example.com.".to_string()));
        assert!(targets.contains(&"10 mail.example.net.".to_string()));
        assert!(targets.contains(&"example.com.".to_string()));
        assert!(targets.contains(&"10 20 5060 sip.example.com.".to_string()));
    }

    #[test]
    fn test_zero_ttl_takes_zone_default() {
        let n = Normalizer::new("example.com", 3600);
        let mut records = vec![
            rec("a", RecordType::A, "1.2.3.4"),
            rec("b", RecordType::A, "1.2.3.4").with_ttl(60),
        ];
        n.normalize(&mut records).unwrap();
        assert_eq!(records[0].ttl, 3600);
        assert_eq!(records[1].ttl, 60);
    }

    #[test]
    fn test_labels_are_made_relative() {
        let n = normalizer();
        let mut records = vec![
            rec("WWW", RecordType::A, "1.2.3.4"),
            rec("example.com.", RecordType::A, "1.2.3.4"),
            rec("api.example.com.", RecordType::A, "1.2.3.4"),
            rec("", RecordType::Txt, "hello"),
        ];
        n.normalize(&mut records).unwrap();
        let labels: Vec<&str> = records.iter().map(|r| r.label.as_str()).collect();
        assert_eq!(labels, vec!["@", "@", "api", "www"]);
    }

    #[test]
    fn test_label_outside_zone_is_rejected() {
        let mut records = vec![rec("www.example.org.", RecordType::A, "1.2.3.4")];
        assert!(normalizer().normalize(&mut records).unwrap_err().is_validation());
    }

    #[test]
    fn test_txt_chunking_is_idempotent() {
        let n = normalizer();
        let long = "x".repeat(600);
        let mut records = vec![rec("@", RecordType::Txt, &long)];
        n.normalize(&mut records).unwrap();

        let RecordData::Txt(chunks) = &records[0].data else {
            panic!("expected TXT");
        };
        assert_eq!(chunks.len(), 3);
        assert!(chunks.iter().all(|c| c.len() <= TXT_CHUNK_LIMIT));
        assert_eq!(chunks.concat(), long);

        let once = records.clone();
        n.normalize(&mut records).unwrap();
        assert_eq!(records, once);
    }

    #[test]
    fn test_split_txt_respects_char_boundaries() {
        let s = "é".repeat(200); // 400 octets
        let chunks = split_txt(&s);
        assert_eq!(chunks.len(), 2);
        assert!(chunks.iter().all(|c| c.len() <= TXT_CHUNK_LIMIT));
        assert_eq!(chunks.concat(), s);
    }

    #[test]
    fn test_ordering_is_stable_regardless_of_input_order() {
        let n = normalizer();
        let mut a = vec![
            rec("www", RecordType::A, "1.2.3.5"),
            rec("@", RecordType::Mx, "10 mail"),
            rec("www", RecordType::A, "1.2.3.4"),
        ];
        let mut b = vec![a[2].clone(), a[0].clone(), a[1].clone()];
        n.normalize(&mut a).unwrap();
        n.normalize(&mut b).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_cname_exclusivity() {
        let mut records = vec![
            rec("www", RecordType::Cname, "web"),
            rec("www", RecordType::A, "1.2.3.4"),
        ];
        assert!(normalizer().normalize(&mut records).is_err());
    }

    #[test]
    fn test_single_valued_type_cannot_repeat() {
        let mut records = vec![
            rec("www", RecordType::Ptr, "a.example.net."),
            rec("www", RecordType::Ptr, "b.example.net."),
        ];
        assert!(normalizer().normalize(&mut records).is_err());
    }

    #[test]
    fn test_empty_cname_target_is_rejected() {
        let mut records = vec![Record::new("www", RecordData::Cname(String::new()))];
        let err = normalizer().normalize(&mut records).unwrap_err();
        assert!(err.to_string().contains("www"));
    }

    #[test]
    fn test_ds_digest_is_uppercased_and_checked() {
        let n = normalizer();
        let mut records = vec![rec("sub", RecordType::Ds, "12345 13 2 abcdef01")];
        n.normalize(&mut records).unwrap();
        assert_eq!(records[0].data.to_string(), "12345 13 2 ABCDEF01");

        let mut bad = vec![rec("sub", RecordType::Ds, "12345 13 2 xyz")];
        assert!(n.normalize(&mut bad).is_err());
    }

    #[test]
    fn test_null_mx_is_kept() {
        let mut records = vec![rec("@", RecordType::Mx, "0 .")];
        normalizer().normalize(&mut records).unwrap();
        assert_eq!(records[0].data.to_string(), "0 .");
    }
}
