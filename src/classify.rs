//! Response classification.
//!
//! Every response the resolver receives ends up as exactly one [`Outcome`],
//! which tells the resolver whether to stop, descend to another set of
//! servers, or move on to the next candidate. The checks run in a fixed
//! priority order; see [`classify`].

use std::net::Ipv4Addr;

use tracing::warn;

use crate::dns::{same_name, DnsMessage, QueryType, RData, ResponseCode, WireError};

/// A terminal answer for the requested name and type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Answer {
    /// Every A record in the answer section, in order.
    Addresses(Vec<Ipv4Addr>),
    /// The most preferred (lowest preference) mail exchange.
    MailExchange { preference: u16, exchange: String },
    /// Target of a CNAME, when CNAME itself was asked for.
    Alias(String),
    NameServers(Vec<String>),
    Authority {
        mname: String,
        rname: String,
        serial: u32,
    },
}

/// What the resolver should do with one response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// The response could not be decoded.
    Corrupt(WireError),
    /// The server answered with SERVFAIL, NOTIMP or REFUSED.
    Lame(ResponseCode),
    Answer(Answer),
    /// The queried name is an alias for the contained target.
    Alias(String),
    /// The name does not exist (SOA in authority, or NXDOMAIN).
    Negative,
    /// Delegation with glue: the next candidate list.
    Referral(Vec<Ipv4Addr>),
    /// Delegation without glue: names of the delegated name servers.
    NameReferral(Vec<String>),
    Empty,
}

/// Decodes `bytes` and classifies the result.
///
/// A decoding failure, or a message without the QR bit set, becomes
/// [`Outcome::Corrupt`].
pub fn inspect(name: &str, qtype: QueryType, bytes: &[u8]) -> Outcome {
    match DnsMessage::from_bytes(bytes) {
        Ok(message) if !message.header.is_response() => Outcome::Corrupt(WireError::NotResponse),
        Ok(message) => {
            if message.header.is_truncated() {
                warn!(name, %qtype, "response truncated, using what fit");
            }
            classify(name, qtype, &message)
        }
        Err(e) => Outcome::Corrupt(e),
    }
}

/// Classifies a decoded response to a `qtype` query for `name`.
///
/// Checked in order:
///
/// 1. A SERVFAIL, NOTIMP or REFUSED response code yields [`Outcome::Lame`].
/// 2. Answer records of the requested type yield [`Outcome::Answer`].
/// 3. A CNAME owned by `name` yields [`Outcome::Alias`].
/// 4. An SOA as the first authority record, or NXDOMAIN, yields
///    [`Outcome::Negative`].
/// 5. Authority NS records with matching A glue in the additional section
///    yield [`Outcome::Referral`] with the glue addresses.
/// 6. Authority NS records without glue yield [`Outcome::NameReferral`].
/// 7. Anything else is [`Outcome::Empty`].
pub fn classify(name: &str, qtype: QueryType, message: &DnsMessage) -> Outcome {
    match message.header.get_response_code() {
        ResponseCode::NoError | ResponseCode::NameError => {}
        code => return Outcome::Lame(code),
    }

    if let Some(answer) = extract_answer(qtype, message) {
        return Outcome::Answer(answer);
    }

    let alias = message
        .answers
        .iter()
        .filter(|record| same_name(&record.name, name))
        .find_map(|record| record.get_cname());
    if let Some(target) = alias {
        return Outcome::Alias(target.to_string());
    }

    let soa_first = matches!(
        message.authorities.first().map(|record| &record.data),
        Some(RData::SOA { .. })
    );
    if soa_first || message.header.get_response_code() == ResponseCode::NameError {
        return Outcome::Negative;
    }

    let mut name_servers: Vec<&str> = Vec::new();
    for ns in message.authorities.iter().filter_map(|r| r.get_name_server()) {
        if !name_servers.iter().any(|known| same_name(known, ns)) {
            name_servers.push(ns);
        }
    }
    if name_servers.is_empty() {
        return Outcome::Empty;
    }

    let mut glue: Vec<Ipv4Addr> = Vec::new();
    for record in &message.additionals {
        let Some(addr) = record.get_ipv4_address() else {
            continue;
        };
        let is_glue = name_servers.iter().any(|ns| same_name(ns, &record.name));
        if is_glue && !glue.contains(&addr) {
            glue.push(addr);
        }
    }

    if glue.is_empty() {
        Outcome::NameReferral(name_servers.into_iter().map(str::to_string).collect())
    } else {
        Outcome::Referral(glue)
    }
}

fn extract_answer(qtype: QueryType, message: &DnsMessage) -> Option<Answer> {
    let mut matching = message
        .answers
        .iter()
        .filter(|record| record.record_type() == Some(qtype))
        .peekable();
    matching.peek()?;

    let answer = match qtype {
        QueryType::A => Answer::Addresses(matching.filter_map(|r| r.get_ipv4_address()).collect()),
        QueryType::MX => {
            let mut best: Option<(u16, &str)> = None;
            for record in matching {
                if let RData::MX {
                    preference,
                    exchange,
                } = &record.data
                {
                    // Strictly lower, so the first of equal preferences wins.
                    if best.is_none_or(|(current, _)| *preference < current) {
                        best = Some((*preference, exchange.as_str()));
                    }
                }
            }
            let (preference, exchange) = best?;
            Answer::MailExchange {
                preference,
                exchange: exchange.to_string(),
            }
        }
        QueryType::CNAME => Answer::Alias(matching.find_map(|r| r.get_cname())?.to_string()),
        QueryType::NS => Answer::NameServers(
            matching
                .filter_map(|r| r.get_name_server())
                .map(str::to_string)
                .collect(),
        ),
        QueryType::SOA => matching.find_map(|r| match &r.data {
            RData::SOA {
                mname,
                rname,
                serial,
                ..
            } => Some(Answer::Authority {
                mname: mname.clone(),
                rname: rname.clone(),
                serial: *serial,
            }),
            _ => None,
        })?,
    };
    Some(answer)
}
