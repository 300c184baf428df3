//! Downstream forwarding authority.
//!
//! Chained after [`TraefikAuthority`](crate::authority::TraefikAuthority)
//! in the catalog, it answers every query the responder delegates by
//! asking the configured upstream resolvers.

use async_trait::async_trait;
use hickory_proto::op::ResponseCode;
use hickory_proto::rr::{LowerName, Name, Record, RecordSet, RecordType};
use hickory_proto::xfer::Protocol;
use hickory_resolver::config::{NameServerConfig, ResolverConfig};
use hickory_resolver::name_server::TokioConnectionProvider;
use hickory_resolver::Resolver;
use hickory_server::authority::{
    Authority, LookupControlFlow, LookupError, LookupOptions, LookupRecords, MessageRequest,
    UpdateResult, ZoneType,
};
use hickory_server::server::RequestInfo;
use std::net::SocketAddr;
use std::sync::Arc;
use tracing::{debug, warn};

use crate::error::DnsError;

/// Forwards queries to upstream resolvers.
pub struct ForwardingAuthority {
    resolver: Resolver<TokioConnectionProvider>,
    origin: LowerName,
}

impl ForwardingAuthority {
    /// Create a forwarder for `origin` using the given upstreams.
    pub fn new(upstreams: &[SocketAddr], origin: LowerName) -> Result<Self, DnsError> {
        if upstreams.is_empty() {
            return Err(DnsError::Config(
                "no upstream DNS servers configured for forwarding".to_string(),
            ));
        }

        let name_servers: Vec<NameServerConfig> = upstreams
            .iter()
            .flat_map(|addr| {
                [
                    NameServerConfig::new(*addr, Protocol::Udp),
                    NameServerConfig::new(*addr, Protocol::Tcp),
                ]
            })
            .collect();

        let config = ResolverConfig::from_parts(None, vec![], name_servers);
        let resolver =
            Resolver::builder_with_config(config, TokioConnectionProvider::default()).build();

        debug!(upstreams = upstreams.len(), origin = %origin, "created forwarding authority");

        Ok(Self { resolver, origin })
    }
}

/// Group resolved records into one record set per owner name and type,
/// keeping the order in which they arrived.
fn group_records<'a>(records: impl Iterator<Item = &'a Record>) -> Vec<Arc<RecordSet>> {
    let mut sets: Vec<RecordSet> = Vec::new();
    for record in records {
        let position = sets
            .iter()
            .position(|set| set.name() == record.name() && set.record_type() == record.record_type());
        let set = match position {
            Some(i) => &mut sets[i],
            None => {
                sets.push(RecordSet::new(record.name().clone(), record.record_type(), 0));
                let last = sets.len() - 1;
                &mut sets[last]
            }
        };
        set.insert(record.clone(), 0);
    }
    sets.into_iter().map(Arc::new).collect()
}

#[async_trait]
impl Authority for ForwardingAuthority {
    type Lookup = LookupRecords;

    fn zone_type(&self) -> ZoneType {
        ZoneType::External
    }

    fn is_axfr_allowed(&self) -> bool {
        false
    }

    fn origin(&self) -> &LowerName {
        &self.origin
    }

    async fn lookup(
        &self,
        name: &LowerName,
        rtype: RecordType,
        lookup_options: LookupOptions,
    ) -> LookupControlFlow<Self::Lookup> {
        let query_name = Name::from(name.clone());
        debug!(name = %query_name, rtype = ?rtype, "forwarding query upstream");

        match self.resolver.lookup(query_name.clone(), rtype).await {
            Ok(lookup) => {
                let sets = group_records(lookup.record_iter());
                debug!(name = %query_name, sets = sets.len(), "forwarded lookup completed");
                LookupControlFlow::Break(Ok(LookupRecords::ManyRecords(lookup_options, sets)))
            }
            Err(e) if e.is_nx_domain() => {
                debug!(name = %query_name, "upstream returned NXDOMAIN");
                LookupControlFlow::Break(Err(LookupError::ResponseCode(ResponseCode::NXDomain)))
            }
            Err(e) if e.is_no_records_found() => {
                LookupControlFlow::Break(Ok(LookupRecords::Empty))
            }
            Err(e) => {
                warn!(name = %query_name, rtype = ?rtype, error = %e, "forwarded lookup failed");
                LookupControlFlow::Break(Err(LookupError::ResponseCode(ResponseCode::ServFail)))
            }
        }
    }

    async fn search(
        &self,
        request_info: RequestInfo<'_>,
        lookup_options: LookupOptions,
    ) -> LookupControlFlow<Self::Lookup> {
        let query = request_info.query;
        self.lookup(query.name(), query.query_type(), lookup_options)
            .await
    }

    async fn get_nsec_records(
        &self,
        _name: &LowerName,
        _lookup_options: LookupOptions,
    ) -> LookupControlFlow<Self::Lookup> {
        LookupControlFlow::Continue(Err(LookupError::ResponseCode(ResponseCode::NotImp)))
    }

    async fn update(&self, _update: &MessageRequest) -> UpdateResult<bool> {
        Err(ResponseCode::NotImp)
    }
}
