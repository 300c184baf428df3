//! Query-time answer synthesis from the mapping store.

use hickory_proto::rr::rdata::{A, CNAME};
use hickory_proto::rr::{DNSClass, LowerName, Name, RData, Record, RecordType};
use hickory_proto::ProtoError;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, trace};

use crate::config::{normalize_host, Settings};
use crate::metrics::{self, QueryResult, Timer};
use crate::state::{MappingEntry, MappingStore};

/// Which misses are handed to the downstream handler.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum Fallthrough {
    /// Never fall through.
    #[default]
    Disabled,
    /// Fall through for names inside any of these zones.
    Zones(Vec<LowerName>),
}

impl Fallthrough {
    /// Build from a configured zone list. An empty list matches every name.
    pub fn from_zones<S: AsRef<str>>(zones: &[S]) -> Result<Self, ProtoError> {
        if zones.is_empty() {
            return Ok(Fallthrough::Zones(vec![LowerName::from(Name::root())]));
        }
        let zones = zones
            .iter()
            .map(|z| Name::from_ascii(z.as_ref()).map(LowerName::from))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Fallthrough::Zones(zones))
    }

    /// Whether a miss for `name` should be passed on.
    pub fn through(&self, name: &LowerName) -> bool {
        match self {
            Fallthrough::Disabled => false,
            Fallthrough::Zones(zones) => zones.iter().any(|zone| zone.zone_of(name)),
        }
    }
}

/// Outcome of answering one query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Response {
    /// Records to return.
    Answer(Vec<Record>),
    /// Hand the query to the downstream handler.
    Delegate,
    /// Name error.
    NxDomain,
}

/// Answers A queries from a [`MappingStore`].
///
/// Holds read-only access to the store; lookups never block on I/O.
#[derive(Debug)]
pub struct QueryResponder {
    store: MappingStore,
    settings: Arc<Settings>,
    has_downstream: bool,
    server: String,
    queries: AtomicU64,
}

impl QueryResponder {
    /// Create a responder. `has_downstream` says whether anything is chained
    /// behind it to take delegated queries.
    pub fn new(store: MappingStore, settings: Arc<Settings>, has_downstream: bool) -> Self {
        let server = settings.listen_addr.to_string();
        Self {
            store,
            settings,
            has_downstream,
            server,
            queries: AtomicU64::new(0),
        }
    }

    /// Number of IN/A queries seen.
    pub fn query_count(&self) -> u64 {
        self.queries.load(Ordering::Relaxed)
    }

    /// Answer a query for `name` (in its original casing).
    pub fn respond(&self, name: &Name, rtype: RecordType, class: DNSClass) -> Response {
        if class != DNSClass::IN || rtype != RecordType::A {
            trace!(name = %name, rtype = ?rtype, class = ?class, "ignoring query");
            metrics::record_ignored_query(&format!("{rtype:?}"));
            return Response::Delegate;
        }

        let timer = Timer::start();
        self.queries.fetch_add(1, Ordering::Relaxed);

        let host = normalize_host(&name.to_string());
        let response = match self.entry_for(&host) {
            Some(entry) => {
                debug!(name = %name, "{}", entry);
                Response::Answer(build_records(name, &entry))
            }
            None => {
                let lower = LowerName::from(name);
                if self.has_downstream && self.settings.fallthrough.through(&lower) {
                    debug!(name = %name, "no mapping, falling through");
                    Response::Delegate
                } else {
                    debug!(name = %name, "no mapping, returning NXDOMAIN");
                    Response::NxDomain
                }
            }
        };

        let result = match response {
            Response::Answer(_) => QueryResult::Hit,
            Response::Delegate => QueryResult::Delegated,
            Response::NxDomain => QueryResult::NxDomain,
        };
        metrics::record_query(&self.server, result, timer.elapsed());

        response
    }

    /// Resolve the answer template for a normalized host. The API host is
    /// checked before the store.
    fn entry_for(&self, host: &str) -> Option<Arc<MappingEntry>> {
        if self.settings.direct_api_host() == Some(host) {
            return Some(Arc::clone(&self.settings.entry));
        }
        self.store.get(host)
    }
}

/// Build the answer records for `name` from an entry.
pub fn build_records(name: &Name, entry: &MappingEntry) -> Vec<Record> {
    match entry {
        MappingEntry::Cname { target, ttl } => {
            let mut record =
                Record::from_rdata(name.clone(), *ttl, RData::CNAME(CNAME(target.clone())));
            record.set_dns_class(DNSClass::IN);
            vec![record]
        }
        MappingEntry::Address { addresses, ttl } => addresses
            .iter()
            .map(|ip| {
                let mut record = Record::from_rdata(name.clone(), *ttl, RData::A(A::from(*ip)));
                record.set_dns_class(DNSClass::IN);
                record
            })
            .collect(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DnsConfig;
    use std::net::Ipv4Addr;

    fn settings(value: serde_json::Value) -> Arc<Settings> {
        let mut base = serde_json::json!({
            "listen_addr": "127.0.0.1:5353",
            "api_url": "https://traefik.example.com/api",
        });
        for (k, v) in value.as_object().unwrap() {
            base[k] = v.clone();
        }
        let config: DnsConfig = serde_json::from_value(base).unwrap();
        Arc::new(config.settings().unwrap())
    }

    fn store_with(settings: &Settings, hosts: &[&str]) -> MappingStore {
        let store = MappingStore::new();
        store.apply_diff(
            hosts
                .iter()
                .map(|h| (h.to_string(), Arc::clone(&settings.entry))),
            Vec::new(),
        );
        store.set_ready();
        store
    }

    fn name(s: &str) -> Name {
        Name::from_ascii(s).unwrap()
    }

    #[test]
    fn test_cname_hit_ignores_query_casing() {
        let settings = settings(serde_json::json!({"cname": "traefik.example.com", "ttl": 45}));
        let responder = QueryResponder::new(
            store_with(&settings, &["foo.example.com"]),
            settings,
            false,
        );

        for qname in ["foo.example.com.", "Foo.Example.com."] {
            let Response::Answer(records) =
                responder.respond(&name(qname), RecordType::A, DNSClass::IN)
            else {
                panic!("expected an answer for {qname}");
            };
            assert_eq!(records.len(), 1);
            let record = &records[0];
            assert_eq!(record.name(), &name(qname));
            assert_eq!(record.record_type(), RecordType::CNAME);
            assert_eq!(record.dns_class(), DNSClass::IN);
            assert_eq!(record.ttl(), 45);
            assert_eq!(
                record.data(),
                &RData::CNAME(CNAME(name("traefik.example.com.")))
            );
        }
    }

    #[test]
    fn test_address_hit_preserves_order() {
        let settings = settings(serde_json::json!({"a": ["10.0.0.3", "10.0.0.1", "10.0.0.2"]}));
        let responder =
            QueryResponder::new(store_with(&settings, &["app.example.com"]), settings, false);

        let Response::Answer(records) =
            responder.respond(&name("app.example.com."), RecordType::A, DNSClass::IN)
        else {
            panic!("expected an answer");
        };
        let ips: Vec<Ipv4Addr> = records
            .iter()
            .filter_map(|r| match r.data() {
                RData::A(a) => Some(Ipv4Addr::from(*a)),
                _ => None,
            })
            .collect();
        assert_eq!(
            ips,
            vec![
                "10.0.0.3".parse::<Ipv4Addr>().unwrap(),
                "10.0.0.1".parse().unwrap(),
                "10.0.0.2".parse().unwrap(),
            ]
        );
        assert!(records.iter().all(|r| r.ttl() == 30));
    }

    #[test]
    fn test_miss_without_fallthrough_is_nxdomain() {
        let settings = settings(serde_json::json!({"cname": "traefik.example.com"}));
        let responder = QueryResponder::new(store_with(&settings, &[]), settings, true);

        assert_eq!(
            responder.respond(&name("missing.example.com."), RecordType::A, DNSClass::IN),
            Response::NxDomain
        );
    }

    #[test]
    fn test_miss_with_fallthrough_delegates() {
        let settings = settings(serde_json::json!({
            "cname": "traefik.example.com",
            "fallthrough": ["example.com"],
        }));
        let responder = QueryResponder::new(store_with(&settings, &[]), settings, true);

        assert_eq!(
            responder.respond(&name("missing.example.com."), RecordType::A, DNSClass::IN),
            Response::Delegate
        );
        assert_eq!(
            responder.respond(&name("missing.example.org."), RecordType::A, DNSClass::IN),
            Response::NxDomain
        );
    }

    #[test]
    fn test_fallthrough_without_downstream_is_nxdomain() {
        let settings = settings(serde_json::json!({
            "cname": "traefik.example.com",
            "fallthrough": [],
        }));
        let responder = QueryResponder::new(store_with(&settings, &[]), settings, false);

        assert_eq!(
            responder.respond(&name("missing.example.com."), RecordType::A, DNSClass::IN),
            Response::NxDomain
        );
    }

    #[test]
    fn test_non_a_queries_delegated_without_counting() {
        let settings = settings(serde_json::json!({"cname": "traefik.example.com"}));
        let responder =
            QueryResponder::new(store_with(&settings, &["app.example.com"]), settings, false);

        assert_eq!(
            responder.respond(&name("app.example.com."), RecordType::AAAA, DNSClass::IN),
            Response::Delegate
        );
        assert_eq!(
            responder.respond(&name("app.example.com."), RecordType::A, DNSClass::CH),
            Response::Delegate
        );
        assert_eq!(responder.query_count(), 0);

        responder.respond(&name("app.example.com."), RecordType::A, DNSClass::IN);
        responder.respond(&name("other.example.com."), RecordType::A, DNSClass::IN);
        assert_eq!(responder.query_count(), 2);
    }

    #[test]
    fn test_api_host_answered_directly() {
        let settings = settings(serde_json::json!({
            "a": ["10.0.0.9"],
            "resolve_api_host": true,
        }));
        let responder = QueryResponder::new(store_with(&settings, &[]), settings, false);

        let Response::Answer(records) =
            responder.respond(&name("Traefik.Example.com."), RecordType::A, DNSClass::IN)
        else {
            panic!("expected an answer for the API host");
        };
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].data(), &RData::A(A::new(10, 0, 0, 9)));
    }

    #[test]
    fn test_fallthrough_zone_matching() {
        let all = Fallthrough::from_zones::<&str>(&[]).unwrap();
        let some = Fallthrough::from_zones(&["Example.com"]).unwrap();
        let inside = LowerName::from(name("a.b.example.com."));
        let outside = LowerName::from(name("example.org."));

        assert!(all.through(&inside));
        assert!(all.through(&outside));
        assert!(some.through(&inside));
        assert!(!some.through(&outside));
        assert!(!Fallthrough::Disabled.through(&inside));
    }
}
