//! Hickory DNS authority backed by the Traefik mapping store.

use async_trait::async_trait;
use hickory_proto::op::ResponseCode;
use hickory_proto::rr::{DNSClass, LowerName, Name, RecordSet, RecordType};
use hickory_server::authority::{
    Authority, LookupControlFlow, LookupError, LookupOptions, LookupRecords, MessageRequest,
    UpdateResult, ZoneType,
};
use hickory_server::server::RequestInfo;
use std::sync::Arc;

use crate::config::Settings;
use crate::responder::{QueryResponder, Response};
use crate::state::MappingStore;

/// Authority answering A queries for every host Traefik routes.
///
/// Delegated queries are returned as `LookupControlFlow::Skip` so the next
/// authority registered for the zone answers them instead. Without a
/// downstream they end in SERVFAIL.
pub struct TraefikAuthority {
    origin: LowerName,
    responder: QueryResponder,
    has_downstream: bool,
}

impl TraefikAuthority {
    /// Create a new authority for the given settings and store.
    pub fn new(settings: Arc<Settings>, store: MappingStore, has_downstream: bool) -> Self {
        let origin = settings.zone.clone();
        Self {
            origin,
            responder: QueryResponder::new(store, settings, has_downstream),
            has_downstream,
        }
    }

    /// Get a reference to the underlying responder.
    pub fn responder(&self) -> &QueryResponder {
        &self.responder
    }

    fn answer(
        &self,
        name: &Name,
        rtype: RecordType,
        class: DNSClass,
        lookup_options: LookupOptions,
    ) -> LookupControlFlow<LookupRecords> {
        match self.responder.respond(name, rtype, class) {
            Response::Answer(records) => {
                let Some(first) = records.first() else {
                    return LookupControlFlow::Break(Err(LookupError::ResponseCode(
                        ResponseCode::NXDomain,
                    )));
                };
                let mut record_set = RecordSet::new(name.clone(), first.record_type(), 0);
                for record in records {
                    record_set.insert(record, 0);
                }
                LookupControlFlow::Break(Ok(LookupRecords::new(
                    lookup_options,
                    Arc::new(record_set),
                )))
            }
            Response::Delegate if self.has_downstream => LookupControlFlow::Skip,
            Response::Delegate => {
                LookupControlFlow::Break(Err(LookupError::ResponseCode(ResponseCode::ServFail)))
            }
            Response::NxDomain => {
                LookupControlFlow::Break(Err(LookupError::ResponseCode(ResponseCode::NXDomain)))
            }
        }
    }
}

#[async_trait]
impl Authority for TraefikAuthority {
    type Lookup = LookupRecords;

    fn zone_type(&self) -> ZoneType {
        ZoneType::Primary
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
        self.answer(&Name::from(name.clone()), rtype, DNSClass::IN, lookup_options)
    }

    async fn search(
        &self,
        request_info: RequestInfo<'_>,
        lookup_options: LookupOptions,
    ) -> LookupControlFlow<Self::Lookup> {
        // Answers carry the name exactly as the client asked for it.
        let query = request_info.query.original();
        self.answer(
            query.name(),
            query.query_type(),
            query.query_class(),
            lookup_options,
        )
    }

    async fn get_nsec_records(
        &self,
        _name: &LowerName,
        _lookup_options: LookupOptions,
    ) -> LookupControlFlow<Self::Lookup> {
        // DNSSEC not supported
        LookupControlFlow::Continue(Err(LookupError::ResponseCode(ResponseCode::NoError)))
    }

    async fn update(&self, _update: &MessageRequest) -> UpdateResult<bool> {
        // Dynamic updates not supported
        Err(ResponseCode::NotImp)
    }
}
