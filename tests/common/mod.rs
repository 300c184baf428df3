//! Shared test infrastructure for catalog-level integration tests.

#![allow(dead_code)]

use std::io;
use std::net::{Ipv4Addr, SocketAddr};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use hickory_proto::op::{Message, MessageType, OpCode, Query, ResponseCode};
use hickory_proto::rr::rdata::{A, SOA};
use hickory_proto::rr::{DNSClass, LowerName, Name, RData, RecordSet, RecordType};
use hickory_proto::serialize::binary::{BinDecodable, BinDecoder, BinEncoder};
use hickory_server::authority::{
    Authority, AuthorityObject, Catalog, LookupControlFlow, LookupError, LookupOptions,
    LookupRecords, MessageRequest, MessageResponse, UpdateResult, ZoneType,
};
use hickory_server::proto::rr::Record;
use hickory_server::proto::xfer::Protocol;
use hickory_server::server::{
    Request, RequestHandler, RequestInfo, ResponseHandler, ResponseInfo,
};
use hickory_server::ServerFuture;
use tokio::net::UdpSocket;

use traefik_dns::config::{DnsConfig, Settings};
use traefik_dns::server::build_catalog;
use traefik_dns::state::MappingStore;

// --- Constants ---

pub const CNAME_TARGET: &str = "traefik.example.com";
pub const API_URL: &str = "https://traefik.example.com/api";

pub const UPSTREAM_ZONE: &str = "example.org.";
pub const UPSTREAM_HOST: &str = "x.example.org.";
pub const UPSTREAM_ADDR: Ipv4Addr = Ipv4Addr::new(192, 0, 2, 44);

// --- TestResponseHandler ---

/// Captures the serialized DNS response for inspection in tests.
///
/// The response is serialized via `MessageResponse::destructive_emit()` and
/// stored as raw wire-format bytes, parsed back with `Message::from_vec()`.
#[derive(Clone)]
pub struct TestResponseHandler {
    buf: Arc<Mutex<Vec<u8>>>,
}

impl TestResponseHandler {
    pub fn new() -> Self {
        Self {
            buf: Arc::new(Mutex::new(Vec::with_capacity(512))),
        }
    }

    /// Parse the captured wire bytes into a `Message` for assertions.
    pub fn into_message(self) -> Message {
        let buf = self.buf.lock().unwrap();
        assert!(!buf.is_empty(), "no response was captured");
        Message::from_vec(&buf).expect("failed to parse captured DNS response")
    }
}

#[async_trait]
impl ResponseHandler for TestResponseHandler {
    async fn send_response<'a>(
        &mut self,
        response: MessageResponse<
            '_,
            'a,
            impl Iterator<Item = &'a Record> + Send + 'a,
            impl Iterator<Item = &'a Record> + Send + 'a,
            impl Iterator<Item = &'a Record> + Send + 'a,
            impl Iterator<Item = &'a Record> + Send + 'a,
        >,
    ) -> io::Result<ResponseInfo> {
        let mut buf = self.buf.lock().unwrap();
        buf.clear();
        let mut encoder = BinEncoder::new(&mut *buf);
        encoder.set_max_size(u16::MAX);
        let info = response
            .destructive_emit(&mut encoder)
            .map_err(|e| io::Error::new(io::ErrorKind::Other, e))?;
        Ok(info)
    }
}

// --- Settings builders ---

pub fn cname_config() -> DnsConfig {
    serde_json::from_value(serde_json::json!({
        "listen_addr": "127.0.0.1:5353",
        "api_url": API_URL,
        "cname": CNAME_TARGET,
        "ttl": 60,
    }))
    .unwrap()
}

pub fn address_config(addresses: &[Ipv4Addr]) -> DnsConfig {
    DnsConfig {
        cname: None,
        a: Some(addresses.to_vec()),
        ..cname_config()
    }
}

pub fn settings(config: &DnsConfig) -> Arc<Settings> {
    Arc::new(config.settings().expect("test config is valid"))
}

// --- Store builder ---

/// Build a ready store holding `hosts`, each mapped to the settings' entry.
pub fn build_store(settings: &Settings, hosts: &[&str]) -> MappingStore {
    let store = MappingStore::new();
    store.apply_diff(
        hosts
            .iter()
            .map(|host| (host.to_string(), Arc::clone(&settings.entry))),
        Vec::<String>::new(),
    );
    store.set_ready();
    store
}

// --- Upstream resolver ---

/// Zone served by the upstream test server: `UPSTREAM_HOST` has a single A
/// record, every other name under the zone is NXDOMAIN.
struct UpstreamZone {
    origin: LowerName,
    host: LowerName,
}

impl UpstreamZone {
    fn new() -> Self {
        Self {
            origin: Name::from_ascii(UPSTREAM_ZONE).unwrap().into(),
            host: Name::from_ascii(UPSTREAM_HOST).unwrap().into(),
        }
    }

    fn soa() -> RData {
        RData::SOA(SOA::new(
            Name::from_ascii("ns.example.org.").unwrap(),
            Name::from_ascii("hostmaster.example.org.").unwrap(),
            1,
            3600,
            600,
            86400,
            60,
        ))
    }
}

#[async_trait]
impl Authority for UpstreamZone {
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
        let rdata = if *name == self.origin && rtype == RecordType::SOA {
            Self::soa()
        } else if *name == self.host && rtype == RecordType::A {
            RData::A(A::from(UPSTREAM_ADDR))
        } else if *name == self.host || *name == self.origin {
            return LookupControlFlow::Break(Ok(LookupRecords::Empty));
        } else {
            return LookupControlFlow::Break(Err(LookupError::ResponseCode(
                ResponseCode::NXDomain,
            )));
        };

        let owner = Name::from(name.clone());
        let mut set = RecordSet::new(owner.clone(), rtype, 0);
        set.insert(Record::from_rdata(owner, 300, rdata), 0);
        LookupControlFlow::Break(Ok(LookupRecords::new(lookup_options, Arc::new(set))))
    }

    async fn search(
        &self,
        request_info: RequestInfo<'_>,
        lookup_options: LookupOptions,
    ) -> LookupControlFlow<Self::Lookup> {
        let query = request_info.query;
        Authority::lookup(self, query.name(), query.query_type(), lookup_options)
            .await
    }

    async fn get_nsec_records(
        &self,
        _name: &LowerName,
        _lookup_options: LookupOptions,
    ) -> LookupControlFlow<Self::Lookup> {
        LookupControlFlow::Continue(Err(LookupError::ResponseCode(ResponseCode::NoError)))
    }

    async fn update(&self, _update: &MessageRequest) -> UpdateResult<bool> {
        Err(ResponseCode::NotImp)
    }
}

/// Serve `UPSTREAM_ZONE` over UDP on an ephemeral loopback port and return
/// its address. The server runs until the test runtime shuts down.
pub async fn spawn_upstream() -> SocketAddr {
    let socket = UdpSocket::bind("127.0.0.1:0").await.unwrap();
    let addr = socket.local_addr().unwrap();

    let zone = UpstreamZone::new();
    let origin = zone.origin.clone();
    let zone: Arc<dyn AuthorityObject> = Arc::new(zone);
    let mut catalog = Catalog::new();
    catalog.upsert(origin, vec![zone]);

    let mut server = ServerFuture::new(catalog);
    server.register_socket(socket);
    tokio::spawn(async move {
        let _ = server.block_until_done().await;
    });

    addr
}

// --- Query/Request construction ---

/// Source address for test queries.
pub fn client_src() -> SocketAddr {
    "10.0.0.1:12345".parse().unwrap()
}

/// Build wire-format bytes for a DNS query.
pub fn build_query_bytes(name: &str, record_type: RecordType, id: u16) -> Vec<u8> {
    let mut msg = Message::new();
    msg.set_id(id);
    msg.set_message_type(MessageType::Query);
    msg.set_op_code(OpCode::Query);
    msg.set_recursion_desired(true);
    let mut query = Query::new();
    query.set_name(Name::from_ascii(name).unwrap());
    query.set_query_type(record_type);
    query.set_query_class(DNSClass::IN);
    msg.add_query(query);
    msg.to_vec().unwrap()
}

/// Parse wire bytes into a MessageRequest.
pub fn parse_message_request(bytes: &[u8]) -> MessageRequest {
    let mut decoder = BinDecoder::new(bytes);
    MessageRequest::read(&mut decoder).expect("failed to parse MessageRequest")
}

/// Build a full `Request` as if it arrived over UDP.
pub fn build_request(name: &str, record_type: RecordType, id: u16) -> Request {
    let bytes = build_query_bytes(name, record_type, id);
    let msg = parse_message_request(&bytes);
    Request::new(msg, client_src(), Protocol::Udp)
}

/// Build the production catalog over a store.
pub fn catalog(settings: Arc<Settings>, store: MappingStore) -> Catalog {
    build_catalog(settings, store).expect("failed to build catalog")
}

// --- Response helpers ---

/// Execute a query through the catalog and return the parsed response.
pub async fn execute_query(
    catalog: &Catalog,
    name: &str,
    record_type: RecordType,
    id: u16,
) -> Message {
    let request = build_request(name, record_type, id);
    let handler = TestResponseHandler::new();
    catalog.handle_request(&request, handler.clone()).await;
    handler.into_message()
}

/// Extract A addresses from a response, in answer order.
pub fn extract_a_ips(msg: &Message) -> Vec<Ipv4Addr> {
    msg.answers()
        .iter()
        .filter_map(|r| match r.data() {
            RData::A(a) => Some(a.0),
            _ => None,
        })
        .collect()
}

/// Extract CNAME targets from a response.
pub fn extract_cname_targets(msg: &Message) -> Vec<Name> {
    msg.answers()
        .iter()
        .filter_map(|r| match r.data() {
            RData::CNAME(cname) => Some(cname.0.clone()),
            _ => None,
        })
        .collect()
}

/// Assert response code.
pub fn assert_response_code(msg: &Message, expected: ResponseCode) {
    assert_eq!(
        msg.response_code(),
        expected,
        "expected {:?}, got {:?}",
        expected,
        msg.response_code()
    );
}
