//! An iterative DNS resolver.
//!
//! Names are resolved by walking the DNS hierarchy directly: the resolver asks
//! a root server, follows referrals down through the top-level and
//! authoritative servers, and returns the first authoritative answer. Nothing
//! is delegated to the operating system's resolver.
//!
//! - [`dns`] encodes queries and decodes responses (RFC 1035 wire format)
//! - [`transport`] exchanges one datagram with one server
//! - [`classify`] turns a response into the next resolution step
//! - [`resolver`] drives the walk from the root servers
//! - [`config`] and [`logging`] hold the ambient setup used by the `resolve` binary

pub mod classify;
pub mod config;
pub mod dns;
pub mod logging;
pub mod resolver;
pub mod transport;

#[cfg(test)]
mod testing;
