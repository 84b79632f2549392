//! Iterative resolver.
//!
//! This module walks the DNS hierarchy the way a recursive name server does:
//! it asks a root server, follows the referral it gets back to the servers of
//! the top-level domain, follows the next referral, and so on until some
//! server answers authoritatively.
//!
//! Candidate servers are tried strictly one after another. A server that times
//! out, cannot be reached or answers with SERVFAIL/REFUSED is skipped; every
//! other outcome settles the current step. Referrals that name their servers
//! without glue addresses trigger a nested lookup of those names, starting
//! again from the root.
//!
//! Two guards keep a single lookup bounded:
//!
//! - a hop budget ([`ResolverConfig::max_hops`]) shared by every step of the
//!   lookup, nested ones included
//! - the set of steps currently in progress: re-entering a step that is still
//!   on the stack is a referral cycle
//!
//! Either guard tripping ends the lookup with [`ResolveError::ResolutionLoop`].
//!
//! # Examples
//!
//! ```rust,no_run
//! use iterative_resolver::classify::Answer;
//! use iterative_resolver::config::ResolverConfig;
//! use iterative_resolver::dns::QueryType;
//! use iterative_resolver::resolver::Resolver;
//! use iterative_resolver::transport::UdpTransport;
//!
//! let config = ResolverConfig::default();
//! let resolver = Resolver::new(UdpTransport::from_config(&config), &config);
//!
//! match resolver.resolve("example.com", QueryType::A) {
//!     Ok(Answer::Addresses(addrs)) => println!("example.com has address {}", addrs[0]),
//!     Ok(other) => println!("unexpected answer: {:?}", other),
//!     Err(e) => eprintln!("Resolution failed: {}", e),
//! }
//! ```

use std::collections::HashSet;
use std::net::Ipv4Addr;

use thiserror::Error;
use tracing::{debug, info, warn};

use crate::classify::{inspect, Answer, Outcome};
use crate::config::ResolverConfig;
use crate::dns::{encode_query, QueryType, WireError};
use crate::transport::Transport;

/// Terminal failures of a lookup.
///
/// Transport failures never show up here directly: they only make the
/// resolver try the next server, and surface as
/// [`ResolveError::ExhaustedCandidates`] once no server is left.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ResolveError {
    /// The name cannot be put on the wire.
    #[error("invalid name: {0}")]
    InvalidName(#[source] WireError),

    #[error("corrupt message from {server}: {source}")]
    Protocol {
        server: Ipv4Addr,
        #[source]
        source: WireError,
    },

    #[error("no such domain: {name}")]
    NameError { name: String },

    /// Only returned when alias following is turned off.
    #[error("CNAME encountered: {name} is an alias for {target}")]
    AliasEncountered { name: String, target: String },

    #[error("empty response from {server} for {name}")]
    NoAnswer { name: String, server: Ipv4Addr },

    #[error("no server answered for {name} ({tried} tried)")]
    ExhaustedCandidates { name: String, tried: usize },

    #[error("resolution of {name} did not converge within {hops} steps")]
    ResolutionLoop { name: String, hops: usize },
}

/// One resolution step on the active path of a lookup.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct Step {
    name: String,
    qtype: QueryType,
    servers: Vec<Ipv4Addr>,
}

impl Step {
    fn new(name: &str, qtype: QueryType, candidates: &[Ipv4Addr]) -> Self {
        let mut servers = candidates.to_vec();
        servers.sort_unstable();
        servers.dedup();
        Self {
            name: name.trim_end_matches('.').to_ascii_lowercase(),
            qtype,
            servers,
        }
    }
}

/// Per-lookup state; never shared between top-level calls.
#[derive(Debug, Default)]
struct Walk {
    hops: usize,
    active: HashSet<Step>,
}

/// Resolves names by iterating from the root servers.
pub struct Resolver<T> {
    transport: T,
    root_servers: Vec<Ipv4Addr>,
    max_hops: usize,
    follow_aliases: bool,
}

impl<T: Transport> Resolver<T> {
    pub fn new(transport: T, config: &ResolverConfig) -> Self {
        Self {
            transport,
            root_servers: config.root_servers.clone(),
            max_hops: config.max_hops,
            follow_aliases: config.follow_aliases,
        }
    }

    /// Resolves `name` starting from the root servers.
    ///
    /// # Errors
    ///
    /// - [`ResolveError::NameError`] when an authoritative server denies the name
    /// - [`ResolveError::Protocol`] when a server sends an undecodable message
    /// - [`ResolveError::AliasEncountered`] for a CNAME with alias following off
    /// - [`ResolveError::NoAnswer`] when a server answers with nothing usable
    /// - [`ResolveError::ExhaustedCandidates`] when no server of a step answered
    /// - [`ResolveError::ResolutionLoop`] when the hop budget runs out or a
    ///   referral cycle is detected
    pub fn resolve(&self, name: &str, qtype: QueryType) -> Result<Answer, ResolveError> {
        self.resolve_from(name, qtype, &self.root_servers)
    }

    /// Resolves `name` starting from an explicit candidate list.
    pub fn resolve_from(
        &self,
        name: &str,
        qtype: QueryType,
        candidates: &[Ipv4Addr],
    ) -> Result<Answer, ResolveError> {
        let mut walk = Walk::default();
        self.descend(&mut walk, name, qtype, candidates)
    }

    /// Looks up the IPv4 addresses of `host`, for example a mail exchange
    /// returned by an MX lookup. This is an independent lookup with its own
    /// hop budget.
    pub fn resolve_address(&self, host: &str) -> Result<Vec<Ipv4Addr>, ResolveError> {
        match self.resolve(host, QueryType::A)? {
            Answer::Addresses(addrs) => Ok(addrs),
            other => {
                debug!(host, answer = ?other, "A lookup produced a non-address answer");
                Ok(Vec::new())
            }
        }
    }

    fn descend(
        &self,
        walk: &mut Walk,
        name: &str,
        qtype: QueryType,
        candidates: &[Ipv4Addr],
    ) -> Result<Answer, ResolveError> {
        if walk.hops >= self.max_hops {
            warn!(name, hops = walk.hops, "hop budget exhausted");
            return Err(ResolveError::ResolutionLoop {
                name: name.to_string(),
                hops: walk.hops,
            });
        }
        walk.hops += 1;

        let step = Step::new(name, qtype, candidates);
        if !walk.active.insert(step.clone()) {
            warn!(name, %qtype, servers = ?step.servers, "referral cycle detected");
            return Err(ResolveError::ResolutionLoop {
                name: name.to_string(),
                hops: walk.hops,
            });
        }

        let result = self.query_candidates(walk, name, qtype, candidates);
        walk.active.remove(&step);
        result
    }

    fn query_candidates(
        &self,
        walk: &mut Walk,
        name: &str,
        qtype: QueryType,
        candidates: &[Ipv4Addr],
    ) -> Result<Answer, ResolveError> {
        let (_, query) = encode_query(name, qtype).map_err(ResolveError::InvalidName)?;

        for &server in candidates {
            info!(%server, name, %qtype, "Querying server");

            let response = match self.transport.exchange(server, &query) {
                Ok(response) => response,
                Err(e) => {
                    warn!(%server, error = %e, "no response, trying next server");
                    continue;
                }
            };

            match inspect(name, qtype, &response) {
                Outcome::Answer(answer) => {
                    debug!(%server, name, answer = ?answer, "answer received");
                    return Ok(answer);
                }
                Outcome::Negative => {
                    return Err(ResolveError::NameError {
                        name: name.to_string(),
                    });
                }
                Outcome::Corrupt(source) => {
                    return Err(ResolveError::Protocol { server, source });
                }
                Outcome::Lame(code) => {
                    warn!(%server, ?code, "lame server, trying next server");
                    continue;
                }
                Outcome::Referral(next) => {
                    debug!(%server, servers = ?next, "following referral");
                    return self.descend(walk, name, qtype, &next);
                }
                Outcome::NameReferral(name_servers) => {
                    debug!(%server, ?name_servers, "referral without glue");
                    return self.follow_name_referral(walk, name, qtype, &name_servers);
                }
                Outcome::Alias(target) => {
                    if !self.follow_aliases {
                        return Err(ResolveError::AliasEncountered {
                            name: name.to_string(),
                            target,
                        });
                    }
                    info!(name, %target, "following alias");
                    return self.descend(walk, &target, qtype, &self.root_servers);
                }
                Outcome::Empty => {
                    return Err(ResolveError::NoAnswer {
                        name: name.to_string(),
                        server,
                    });
                }
            }
        }

        Err(ResolveError::ExhaustedCandidates {
            name: name.to_string(),
            tried: candidates.len(),
        })
    }

    /// Follows a referral that names its servers without glue.
    ///
    /// Name servers are located one at a time, from the root. The first one
    /// that resolves is used to continue the lookup; the next name is only
    /// tried if none of its addresses answered. A loop found while locating a
    /// name server is reported only once every name server has failed.
    fn follow_name_referral(
        &self,
        walk: &mut Walk,
        name: &str,
        qtype: QueryType,
        name_servers: &[String],
    ) -> Result<Answer, ResolveError> {
        let mut loop_error = None;

        for ns in name_servers {
            let addresses = match self.descend(walk, ns, QueryType::A, &self.root_servers) {
                Ok(Answer::Addresses(found)) if !found.is_empty() => found,
                Ok(other) => {
                    debug!(name_server = %ns, answer = ?other, "ignoring non-address answer");
                    continue;
                }
                Err(e @ ResolveError::ResolutionLoop { .. }) => {
                    warn!(name_server = %ns, error = %e, "could not locate name server");
                    if loop_error.is_none() {
                        loop_error = Some(e);
                    }
                    continue;
                }
                Err(e) => {
                    warn!(name_server = %ns, error = %e, "could not locate name server");
                    continue;
                }
            };

            match self.descend(walk, name, qtype, &addresses) {
                Err(e @ ResolveError::ExhaustedCandidates { .. }) => {
                    warn!(name_server = %ns, error = %e, "name server unreachable, trying next");
                }
                result => return result,
            }
        }

        Err(loop_error.unwrap_or_else(|| ResolveError::ExhaustedCandidates {
            name: name.to_string(),
            tried: name_servers.len(),
        }))
    }
}
