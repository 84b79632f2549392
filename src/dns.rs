//! DNS message codec.
//!
//! This module builds query messages and parses response messages in the DNS
//! wire format described by RFC 1035. Only the pieces an iterative resolver
//! needs are interpreted: A, NS, CNAME, SOA and MX records. Every other record
//! type is skipped by its declared RDATA length and kept as opaque bytes.
//!
//! # Core Types
//!
//! - [`QueryType`] - The record types the resolver understands
//! - [`DnsHeader`] - The 12-byte message header
//! - [`DnsMessage`] - A complete message with all four sections
//! - [`ResourceRecord`] / [`RData`] - A decoded record and its typed payload
//! - [`WireError`] - Everything that can go wrong while encoding or decoding
//!
//! # Examples
//!
//! ```rust
//! use iterative_resolver::dns::{build_query, DnsMessage, QueryType};
//!
//! let query = build_query(0x1234, "example.com", QueryType::MX).unwrap();
//! assert_eq!(query.len(), 12 + 13 + 4);
//!
//! let decoded = DnsMessage::from_bytes(&query).unwrap();
//! assert_eq!(decoded.header.id, 0x1234);
//! assert_eq!(decoded.questions[0].name, "example.com");
//! assert_eq!(decoded.questions[0].qtype, QueryType::MX);
//! ```
//!
//! # Name Compression
//!
//! Responses routinely replace a repeated name (or name suffix) with a
//! two-byte pointer to an earlier occurrence. [`unpack_domain_name`] follows
//! those pointers, but only backwards: a pointer must target an offset that
//! strictly precedes the label run it appears in. That keeps every chain of
//! pointers finite, no matter what a hostile server sends.

use core::fmt;
use std::{
    io::{Cursor, Read},
    net::Ipv4Addr,
};

use thiserror::Error;

/// Size of the fixed DNS header in bytes.
pub const HEADER_LEN: usize = 12;

/// Longest permitted label, in bytes.
pub const MAX_LABEL_LENGTH: usize = 63;

/// Longest permitted name in wire form, length octets and terminator included.
pub const MAX_NAME_LENGTH: usize = 255;

/// The Internet class.
pub const CLASS_IN: u16 = 1;

// A name has at most 127 labels, so no legitimate name needs more pointers.
const MAX_POINTER_HOPS: usize = 127;

const FLAG_RESPONSE: u16 = 0x8000;
const FLAG_TRUNCATED: u16 = 0x0200;

/// Errors raised while encoding a query or decoding a response.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum WireError {
    /// A read ran past the end of the message.
    #[error("message truncated")]
    Truncated,

    /// The server flagged our query as malformed (RCODE 1).
    #[error("server reported a format error")]
    FormatError,

    #[error("label '{0}' exceeds maximum length of 63 bytes")]
    LabelTooLong(String),

    #[error("empty label in name '{0}'")]
    EmptyLabel(String),

    #[error("name exceeds maximum length of 255 bytes")]
    NameTooLong,

    /// A compression pointer that does not point strictly backwards.
    #[error("compression pointer at offset {at} targets offset {target}, which does not precede it")]
    BadPointer { at: usize, target: usize },

    #[error("too many compression pointers in one name")]
    PointerChain,

    /// Label type bits `01` and `10` are reserved.
    #[error("reserved label type {0:#04x}")]
    BadLabelType(u8),

    #[error("invalid RDATA for record type {rtype}: {reason}")]
    BadRdata { rtype: u16, reason: &'static str },

    #[error("unsupported question type {0}")]
    UnsupportedQuestionType(u16),

    /// The QR bit is clear: a query came back instead of a response.
    #[error("message is not a response")]
    NotResponse,
}

/// Represents the type of a DNS record according to RFC 1035.
///
/// This is a closed set: it lists exactly the record kinds the resolver knows
/// how to interpret. `NS` is never asked for by users, but the resolver has to
/// read name server names out of referrals.
///
/// # Examples
///
/// ```rust
/// use iterative_resolver::dns::QueryType;
///
/// assert_eq!(QueryType::MX as u16, 15);
/// assert_eq!(QueryType::MX.to_string(), "MX");
/// assert_eq!(QueryType::try_from(6), Ok(QueryType::SOA));
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u16)]
pub enum QueryType {
    /// IPv4 host address.
    A = 1,
    /// Authoritative name server.
    NS = 2,
    /// Canonical name (alias).
    CNAME = 5,
    /// Start of a zone of authority.
    SOA = 6,
    /// Mail exchange.
    MX = 15,
}

impl fmt::Display for QueryType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            QueryType::A => write!(f, "A"),
            QueryType::NS => write!(f, "NS"),
            QueryType::CNAME => write!(f, "CNAME"),
            QueryType::SOA => write!(f, "SOA"),
            QueryType::MX => write!(f, "MX"),
        }
    }
}

impl TryFrom<u16> for QueryType {
    type Error = String;

    fn try_from(value: u16) -> Result<Self, Self::Error> {
        match value {
            1 => Ok(QueryType::A),
            2 => Ok(QueryType::NS),
            5 => Ok(QueryType::CNAME),
            6 => Ok(QueryType::SOA),
            15 => Ok(QueryType::MX),
            _ => Err(format!("Unknown query type code: {}", value)),
        }
    }
}

/// The 12-byte header that starts every DNS message.
///
/// ```text
///   0  1  2  3  4  5  6  7  8  9 10 11 12 13 14 15
/// +--+--+--+--+--+--+--+--+--+--+--+--+--+--+--+--+
/// |                      ID                       |
/// |QR|   Opcode  |AA|TC|RD|RA|   Z    |   RCODE   |
/// |                    QDCOUNT                    |
/// |                    ANCOUNT                    |
/// |                    NSCOUNT                    |
/// |                    ARCOUNT                    |
/// +--+--+--+--+--+--+--+--+--+--+--+--+--+--+--+--+
/// ```
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DnsHeader {
    /// Transaction id, echoed back by the server.
    pub id: u16,

    /// Raw flag word (QR, opcode, AA, TC, RD, RA, Z and RCODE).
    pub flags: u16,

    pub question_count: u16,

    pub answer_count: u16,

    pub authority_count: u16,

    pub additional_count: u16,
}

/// Response codes from the low four bits of the header flags.
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum ResponseCode {
    /// No error condition.
    NoError = 0,

    /// The server was unable to interpret the query.
    FormatError = 1,

    /// The server was unable to process the query.
    ServerFailure = 2,

    /// The queried name does not exist (NXDOMAIN).
    NameError = 3,

    /// The server does not support the requested kind of query.
    NotImplemented = 4,

    /// The server refused to answer for policy reasons.
    Refused = 5,
}

impl DnsHeader {
    /// Creates a header with every field zeroed.
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends the header to `buffer` in network byte order.
    pub fn pack(&self, buffer: &mut Vec<u8>) {
        buffer.extend_from_slice(&self.id.to_be_bytes());
        buffer.extend_from_slice(&self.flags.to_be_bytes());
        buffer.extend_from_slice(&self.question_count.to_be_bytes());
        buffer.extend_from_slice(&self.answer_count.to_be_bytes());
        buffer.extend_from_slice(&self.authority_count.to_be_bytes());
        buffer.extend_from_slice(&self.additional_count.to_be_bytes());
    }

    /// Reads a header from the cursor.
    pub fn from_bytes(cursor: &mut Cursor<&[u8]>) -> Result<Self, WireError> {
        Ok(DnsHeader {
            id: read_u16(cursor)?,
            flags: read_u16(cursor)?,
            question_count: read_u16(cursor)?,
            answer_count: read_u16(cursor)?,
            authority_count: read_u16(cursor)?,
            additional_count: read_u16(cursor)?,
        })
    }

    /// Decodes the RCODE field. Codes outside the RFC 1035 range are reported
    /// as [`ResponseCode::ServerFailure`].
    pub fn get_response_code(&self) -> ResponseCode {
        match self.flags & 0x000F {
            0 => ResponseCode::NoError,
            1 => ResponseCode::FormatError,
            2 => ResponseCode::ServerFailure,
            3 => ResponseCode::NameError,
            4 => ResponseCode::NotImplemented,
            5 => ResponseCode::Refused,
            _ => ResponseCode::ServerFailure,
        }
    }

    /// Whether the QR bit marks this message as a response.
    pub fn is_response(&self) -> bool {
        self.flags & FLAG_RESPONSE != 0
    }

    /// Whether the server cut the message short (TC bit).
    pub fn is_truncated(&self) -> bool {
        self.flags & FLAG_TRUNCATED != 0
    }
}

/// A single entry of the question section.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DnsQuestion {
    pub name: String,
    pub qtype: QueryType,
    pub qclass: u16,
}

impl DnsQuestion {
    /// Appends the question in wire format: name, type, class.
    pub fn pack(&self, buffer: &mut Vec<u8>) -> Result<(), WireError> {
        pack_domain_name(buffer, &self.name)?;
        buffer.extend_from_slice(&(self.qtype as u16).to_be_bytes());
        buffer.extend_from_slice(&self.qclass.to_be_bytes());
        Ok(())
    }

    /// Reads a question from the cursor.
    ///
    /// # Errors
    ///
    /// Fails with [`WireError::UnsupportedQuestionType`] if the question asks
    /// for a type outside [`QueryType`]. Servers echo our own question, so
    /// this only happens with a response to somebody else's query.
    pub fn from_bytes(cursor: &mut Cursor<&[u8]>) -> Result<Self, WireError> {
        let name = unpack_domain_name(cursor)?;
        let qtype_val = read_u16(cursor)?;
        let qtype = QueryType::try_from(qtype_val)
            .map_err(|_| WireError::UnsupportedQuestionType(qtype_val))?;
        let qclass = read_u16(cursor)?;

        Ok(DnsQuestion {
            name,
            qtype,
            qclass,
        })
    }
}

/// A decoded resource record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourceRecord {
    /// Owner name.
    pub name: String,
    /// Raw type code; see [`ResourceRecord::record_type`] for the typed view.
    pub rtype: u16,
    pub rclass: u16,
    pub ttl: u32,
    pub data: RData,
}

/// Type-specific record payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RData {
    A(Ipv4Addr),
    NS(String),
    CNAME(String),
    SOA {
        mname: String,
        rname: String,
        serial: u32,
        refresh: u32,
        retry: u32,
        expire: u32,
        minimum: u32,
    },
    MX {
        preference: u16,
        exchange: String,
    },
    /// Any record type the resolver does not interpret.
    Other { rtype: u16, data: Vec<u8> },
}

impl fmt::Display for ResourceRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:<30} {:<10} {}", self.name, self.ttl, self.data)
    }
}

impl fmt::Display for RData {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RData::A(addr) => write!(f, "A {}", addr),
            RData::NS(name) => write!(f, "NS {}", name),
            RData::CNAME(name) => write!(f, "CNAME {}", name),
            RData::SOA {
                mname,
                rname,
                serial,
                refresh,
                retry,
                expire,
                minimum,
            } => write!(
                f,
                "SOA {} {} {} {} {} {} {}",
                mname, rname, serial, refresh, retry, expire, minimum
            ),
            RData::MX {
                preference,
                exchange,
            } => write!(f, "MX {} {}", preference, exchange),
            RData::Other { rtype, data } => write!(f, "TYPE{} ({} bytes)", rtype, data.len()),
        }
    }
}

impl ResourceRecord {
    /// The record type, if it is one the resolver understands.
    pub fn record_type(&self) -> Option<QueryType> {
        QueryType::try_from(self.rtype).ok()
    }

    pub fn get_ipv4_address(&self) -> Option<Ipv4Addr> {
        match &self.data {
            RData::A(addr) => Some(*addr),
            _ => None,
        }
    }

    pub fn get_name_server(&self) -> Option<&str> {
        match &self.data {
            RData::NS(name) => Some(name),
            _ => None,
        }
    }

    pub fn get_cname(&self) -> Option<&str> {
        match &self.data {
            RData::CNAME(name) => Some(name),
            _ => None,
        }
    }

    /// Deserializes a resource record from a byte cursor.
    ///
    /// The record layout is owner name, type, class, TTL, RDLENGTH and then
    /// RDLENGTH bytes of RDATA. The RDATA of known types is decoded into the
    /// matching [`RData`] variant; names inside RDATA may use compression
    /// pointers into earlier parts of the message, but must not run past the
    /// declared RDATA end. On success the cursor sits right after the RDATA.
    ///
    /// # Errors
    ///
    /// - [`WireError::Truncated`] if the RDATA extends past the message
    /// - [`WireError::BadRdata`] if an A record is not 4 bytes long or a
    ///   decoded payload overruns RDLENGTH
    /// - any error from [`unpack_domain_name`]
    pub fn from_bytes(cursor: &mut Cursor<&[u8]>) -> Result<Self, WireError> {
        let name = unpack_domain_name(cursor)?;
        let rtype = read_u16(cursor)?;
        let rclass = read_u16(cursor)?;
        let ttl = read_u32(cursor)?;
        let data_len = read_u16(cursor)? as usize;

        let data_start = cursor.position() as usize;
        let data_end = data_start + data_len;
        if data_end > cursor.get_ref().len() {
            return Err(WireError::Truncated);
        }

        let data = match QueryType::try_from(rtype) {
            Ok(QueryType::A) => {
                if data_len != 4 {
                    return Err(WireError::BadRdata {
                        rtype,
                        reason: "address must be 4 bytes",
                    });
                }
                RData::A(Ipv4Addr::from(read_u32(cursor)?))
            }
            Ok(QueryType::NS) => RData::NS(unpack_domain_name(cursor)?),
            Ok(QueryType::CNAME) => RData::CNAME(unpack_domain_name(cursor)?),
            Ok(QueryType::SOA) => RData::SOA {
                mname: unpack_domain_name(cursor)?,
                rname: unpack_domain_name(cursor)?,
                serial: read_u32(cursor)?,
                refresh: read_u32(cursor)?,
                retry: read_u32(cursor)?,
                expire: read_u32(cursor)?,
                minimum: read_u32(cursor)?,
            },
            Ok(QueryType::MX) => {
                let preference = read_u16(cursor)?;
                let exchange = unpack_domain_name(cursor)?;
                RData::MX {
                    preference,
                    exchange,
                }
            }
            Err(_) => RData::Other {
                rtype,
                data: read_bytes(cursor, data_len)?,
            },
        };

        if cursor.position() as usize > data_end {
            return Err(WireError::BadRdata {
                rtype,
                reason: "payload overruns declared length",
            });
        }
        cursor.set_position(data_end as u64);

        Ok(ResourceRecord {
            name,
            rtype,
            rclass,
            ttl,
            data,
        })
    }
}

/// A complete DNS message.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DnsMessage {
    pub header: DnsHeader,
    pub questions: Vec<DnsQuestion>,
    pub answers: Vec<ResourceRecord>,
    pub authorities: Vec<ResourceRecord>,
    pub additionals: Vec<ResourceRecord>,
}

impl DnsMessage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Serializes the header and question section.
    ///
    /// Resource record sections are not packed: the resolver only ever sends
    /// queries.
    pub fn pack(&self, buffer: &mut Vec<u8>) -> Result<(), WireError> {
        self.header.pack(buffer);
        for question in &self.questions {
            question.pack(buffer)?;
        }
        Ok(())
    }

    /// Parses a complete message.
    ///
    /// Sections are read in wire order: header, questions, answers,
    /// authorities, additionals. Every count in the header must be backed by
    /// bytes in `bytes`.
    ///
    /// # Errors
    ///
    /// - [`WireError::FormatError`] if the server set RCODE 1
    /// - [`WireError::Truncated`] if a section count promises more data than
    ///   the buffer holds
    /// - any error from decoding a question, record or name
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, WireError> {
        let mut cursor = Cursor::new(bytes);
        let header = DnsHeader::from_bytes(&mut cursor)?;

        if header.get_response_code() == ResponseCode::FormatError {
            return Err(WireError::FormatError);
        }

        let mut questions = Vec::new();
        for _ in 0..header.question_count {
            questions.push(DnsQuestion::from_bytes(&mut cursor)?);
        }

        let answers = read_records(&mut cursor, header.answer_count)?;
        let authorities = read_records(&mut cursor, header.authority_count)?;
        let additionals = read_records(&mut cursor, header.additional_count)?;

        Ok(DnsMessage {
            header,
            questions,
            answers,
            authorities,
            additionals,
        })
    }
}

fn read_records(cursor: &mut Cursor<&[u8]>, count: u16) -> Result<Vec<ResourceRecord>, WireError> {
    // Counts are attacker-controlled, so the vector grows as records are read.
    let mut records = Vec::new();
    for _ in 0..count {
        records.push(ResourceRecord::from_bytes(cursor)?);
    }
    Ok(records)
}

/// Builds a standard query for `name` with the given transaction id.
///
/// The header carries QDCOUNT = 1 and an all-zero flag word: opcode 0
/// (standard query) with recursion not desired, since the caller walks the
/// hierarchy itself.
pub fn build_query(id: u16, name: &str, qtype: QueryType) -> Result<Vec<u8>, WireError> {
    let mut message = DnsMessage::new();
    message.header.id = id;
    message.header.question_count = 1;
    message.questions.push(DnsQuestion {
        name: name.to_string(),
        qtype,
        qclass: CLASS_IN,
    });

    let mut buffer = Vec::with_capacity(HEADER_LEN + name.len() + 6);
    message.pack(&mut buffer)?;
    Ok(buffer)
}

/// Builds a query with a freshly chosen random transaction id.
///
/// Returns the id alongside the encoded bytes so the response can be matched
/// against it.
pub fn encode_query(name: &str, qtype: QueryType) -> Result<(u16, Vec<u8>), WireError> {
    let id = fastrand::u16(..);
    Ok((id, build_query(id, name, qtype)?))
}

/// Compares two names the way DNS does: ASCII case-insensitively, ignoring a
/// trailing root dot.
pub fn same_name(a: &str, b: &str) -> bool {
    let a = a.strip_suffix('.').unwrap_or(a);
    let b = b.strip_suffix('.').unwrap_or(b);
    a.eq_ignore_ascii_case(b)
}

/// Writes `domain` as a sequence of length-prefixed labels followed by a zero
/// byte.
///
/// A single trailing dot is accepted; `""` and `"."` both encode the root.
///
/// # Errors
///
/// - [`WireError::LabelTooLong`] for a label over 63 bytes
/// - [`WireError::EmptyLabel`] for `a..b` style names
/// - [`WireError::NameTooLong`] if the encoded name exceeds 255 bytes
pub fn pack_domain_name(buffer: &mut Vec<u8>, domain: &str) -> Result<(), WireError> {
    let trimmed = domain.strip_suffix('.').unwrap_or(domain);
    let mut wire_len = 1;

    if !trimmed.is_empty() {
        for label in trimmed.split('.') {
            if label.is_empty() {
                return Err(WireError::EmptyLabel(domain.to_string()));
            }
            if label.len() > MAX_LABEL_LENGTH {
                return Err(WireError::LabelTooLong(label.to_string()));
            }

            wire_len += label.len() + 1;
            if wire_len > MAX_NAME_LENGTH {
                return Err(WireError::NameTooLong);
            }

            buffer.push(label.len() as u8);
            buffer.extend_from_slice(label.as_bytes());
        }
    }

    buffer.push(0);
    Ok(())
}

/// Reads a possibly compressed name starting at the cursor position.
///
/// Labels are joined with `.`; the root name comes back as an empty string.
/// When the name ends in a compression pointer, the cursor is left just past
/// that first pointer rather than wherever the pointer chain ended.
///
/// # Errors
///
/// - [`WireError::Truncated`] if a label or pointer runs off the buffer
/// - [`WireError::BadPointer`] if a pointer does not target an offset
///   strictly before the label run containing it
/// - [`WireError::PointerChain`] after 127 pointer hops
/// - [`WireError::BadLabelType`] for the reserved `01`/`10` label types
/// - [`WireError::NameTooLong`] if the decoded name exceeds 255 bytes
pub fn unpack_domain_name(cursor: &mut Cursor<&[u8]>) -> Result<String, WireError> {
    let buffer = *cursor.get_ref();
    let start = cursor.position() as usize;

    let mut labels = Vec::new();
    let mut wire_len = 1;
    let end = read_labels(buffer, start, 0, &mut labels, &mut wire_len)?;

    cursor.set_position(end as u64);
    Ok(labels.join("."))
}

/// Reads one run of labels starting at `run_start` and returns the offset just
/// past it. A pointer ends the run; its target must lie before the run's start.
fn read_labels(
    buffer: &[u8],
    run_start: usize,
    hops: usize,
    labels: &mut Vec<String>,
    wire_len: &mut usize,
) -> Result<usize, WireError> {
    let mut pos = run_start;

    loop {
        let len = *buffer.get(pos).ok_or(WireError::Truncated)?;

        match len & 0xC0 {
            0xC0 => {
                let low = *buffer.get(pos + 1).ok_or(WireError::Truncated)?;
                let target = (((len & 0x3F) as usize) << 8) | low as usize;

                if target >= run_start {
                    return Err(WireError::BadPointer { at: pos, target });
                }
                if hops + 1 > MAX_POINTER_HOPS {
                    return Err(WireError::PointerChain);
                }

                read_labels(buffer, target, hops + 1, labels, wire_len)?;
                return Ok(pos + 2);
            }
            0x00 => {
                pos += 1;
                if len == 0 {
                    return Ok(pos);
                }

                let label = buffer
                    .get(pos..pos + len as usize)
                    .ok_or(WireError::Truncated)?;

                *wire_len += len as usize + 1;
                if *wire_len > MAX_NAME_LENGTH {
                    return Err(WireError::NameTooLong);
                }

                labels.push(String::from_utf8_lossy(label).into_owned());
                pos += len as usize;
            }
            other => return Err(WireError::BadLabelType(other)),
        }
    }
}

fn read_u16(cursor: &mut Cursor<&[u8]>) -> Result<u16, WireError> {
    let mut buf = [0u8; 2];
    cursor.read_exact(&mut buf).map_err(|_| WireError::Truncated)?;
    Ok(u16::from_be_bytes(buf))
}

fn read_u32(cursor: &mut Cursor<&[u8]>) -> Result<u32, WireError> {
    let mut buf = [0u8; 4];
    cursor.read_exact(&mut buf).map_err(|_| WireError::Truncated)?;
    Ok(u32::from_be_bytes(buf))
}

fn read_bytes(cursor: &mut Cursor<&[u8]>, len: usize) -> Result<Vec<u8>, WireError> {
    let mut buf = vec![0u8; len];
    cursor.read_exact(&mut buf).map_err(|_| WireError::Truncated)?;
    Ok(buf)
}
