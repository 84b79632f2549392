//! Test helpers: a response builder and an in-memory network of mock servers.

use std::cell::RefCell;
use std::collections::HashMap;
use std::net::Ipv4Addr;

use crate::dns::{
    pack_domain_name, DnsHeader, DnsMessage, DnsQuestion, QueryType, RData, ResourceRecord,
    CLASS_IN,
};
use crate::transport::{Transport, TransportError};

const TTL: u32 = 3600;

fn record(name: &str, rtype: QueryType, data: RData) -> ResourceRecord {
    ResourceRecord {
        name: name.to_string(),
        rtype: rtype as u16,
        rclass: CLASS_IN,
        ttl: TTL,
        data,
    }
}

pub fn a(name: &str, octets: [u8; 4]) -> ResourceRecord {
    record(name, QueryType::A, RData::A(Ipv4Addr::from(octets)))
}

pub fn ns(zone: &str, server: &str) -> ResourceRecord {
    record(zone, QueryType::NS, RData::NS(server.to_string()))
}

pub fn cname(name: &str, target: &str) -> ResourceRecord {
    record(name, QueryType::CNAME, RData::CNAME(target.to_string()))
}

pub fn mx(name: &str, preference: u16, exchange: &str) -> ResourceRecord {
    record(
        name,
        QueryType::MX,
        RData::MX {
            preference,
            exchange: exchange.to_string(),
        },
    )
}

pub fn soa(zone: &str, primary: &str) -> ResourceRecord {
    record(
        zone,
        QueryType::SOA,
        RData::SOA {
            mname: primary.to_string(),
            rname: format!("hostmaster.{}", zone),
            serial: 1,
            refresh: 7200,
            retry: 3600,
            expire: 1_209_600,
            minimum: 300,
        },
    )
}

/// Builds uncompressed response messages.
#[derive(Debug, Clone)]
pub struct ResponseBuilder {
    id: u16,
    rcode: u16,
    question: DnsQuestion,
    answers: Vec<ResourceRecord>,
    authorities: Vec<ResourceRecord>,
    additionals: Vec<ResourceRecord>,
}

impl ResponseBuilder {
    pub fn new(name: &str, qtype: QueryType) -> Self {
        Self {
            id: 0,
            rcode: 0,
            question: DnsQuestion {
                name: name.to_string(),
                qtype,
                qclass: CLASS_IN,
            },
            answers: Vec::new(),
            authorities: Vec::new(),
            additionals: Vec::new(),
        }
    }

    /// A response echoing the question of `query`.
    pub fn reply_to(query: &DnsQuestion) -> Self {
        Self::new(&query.name, query.qtype)
    }

    pub fn id(mut self, id: u16) -> Self {
        self.id = id;
        self
    }

    pub fn rcode(mut self, rcode: u16) -> Self {
        self.rcode = rcode;
        self
    }

    pub fn answer(mut self, record: ResourceRecord) -> Self {
        self.answers.push(record);
        self
    }

    pub fn authority(mut self, record: ResourceRecord) -> Self {
        self.authorities.push(record);
        self
    }

    pub fn additional(mut self, record: ResourceRecord) -> Self {
        self.additionals.push(record);
        self
    }

    pub fn build(&self) -> Vec<u8> {
        let mut buffer = Vec::new();
        DnsHeader {
            id: self.id,
            flags: 0x8000 | (self.rcode & 0x000F),
            question_count: 1,
            answer_count: self.answers.len() as u16,
            authority_count: self.authorities.len() as u16,
            additional_count: self.additionals.len() as u16,
        }
        .pack(&mut buffer);
        self.question.pack(&mut buffer).unwrap();

        for record in self
            .answers
            .iter()
            .chain(&self.authorities)
            .chain(&self.additionals)
        {
            pack_record(&mut buffer, record);
        }
        buffer
    }

    /// The built message, decoded again.
    pub fn message(&self) -> DnsMessage {
        DnsMessage::from_bytes(&self.build()).unwrap()
    }
}

fn pack_record(buffer: &mut Vec<u8>, record: &ResourceRecord) {
    pack_domain_name(buffer, &record.name).unwrap();
    buffer.extend_from_slice(&record.rtype.to_be_bytes());
    buffer.extend_from_slice(&record.rclass.to_be_bytes());
    buffer.extend_from_slice(&record.ttl.to_be_bytes());

    let mut rdata = Vec::new();
    match &record.data {
        RData::A(addr) => rdata.extend_from_slice(&addr.octets()),
        RData::NS(name) | RData::CNAME(name) => pack_domain_name(&mut rdata, name).unwrap(),
        RData::SOA {
            mname,
            rname,
            serial,
            refresh,
            retry,
            expire,
            minimum,
        } => {
            pack_domain_name(&mut rdata, mname).unwrap();
            pack_domain_name(&mut rdata, rname).unwrap();
            for value in [serial, refresh, retry, expire, minimum] {
                rdata.extend_from_slice(&value.to_be_bytes());
            }
        }
        RData::MX {
            preference,
            exchange,
        } => {
            rdata.extend_from_slice(&preference.to_be_bytes());
            pack_domain_name(&mut rdata, exchange).unwrap();
        }
        RData::Other { data, .. } => rdata.extend_from_slice(data),
    }

    buffer.extend_from_slice(&(rdata.len() as u16).to_be_bytes());
    buffer.extend_from_slice(&rdata);
}

/// What a mock server does with a query.
pub enum Reply {
    /// Answer with this message; the query id is filled in.
    Message(ResponseBuilder),
    /// Answer with raw bytes, as-is.
    Bytes(Vec<u8>),
    /// Never answer.
    Silence,
}

type Handler = Box<dyn Fn(&DnsQuestion) -> Reply>;

/// A set of mock servers keyed by address. Servers that are not registered
/// behave like hosts that never answer.
#[derive(Default)]
pub struct MockNetwork {
    servers: HashMap<Ipv4Addr, Handler>,
    log: RefCell<Vec<(Ipv4Addr, String, QueryType)>>,
}

impl MockNetwork {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn server(
        mut self,
        addr: [u8; 4],
        handler: impl Fn(&DnsQuestion) -> Reply + 'static,
    ) -> Self {
        self.servers.insert(Ipv4Addr::from(addr), Box::new(handler));
        self
    }

    /// Number of queries sent so far, answered or not.
    pub fn exchanges(&self) -> usize {
        self.log.borrow().len()
    }

    /// Every query sent so far, in order.
    pub fn queries(&self) -> Vec<(Ipv4Addr, String, QueryType)> {
        self.log.borrow().clone()
    }
}

impl Transport for MockNetwork {
    fn exchange(&self, server: Ipv4Addr, query: &[u8]) -> Result<Vec<u8>, TransportError> {
        let message = DnsMessage::from_bytes(query).unwrap();
        let question = &message.questions[0];
        self.log
            .borrow_mut()
            .push((server, question.name.clone(), question.qtype));

        let reply = match self.servers.get(&server) {
            Some(handler) => handler(question),
            None => Reply::Silence,
        };
        match reply {
            Reply::Message(builder) => Ok(builder.id(message.header.id).build()),
            Reply::Bytes(bytes) => Ok(bytes),
            Reply::Silence => Err(TransportError::Timeout { server }),
        }
    }
}
