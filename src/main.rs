//! Command-line front end for the iterative resolver.
//!
//! Resolves a host name to its IPv4 addresses, or with `-m` to its mail
//! exchange, by walking the DNS hierarchy from the root servers. Every server
//! contacted along the way is logged to stderr.
//!
//! # Usage
//!
//! ```bash
//! # A record lookup
//! resolve example.com
//!
//! # Mail exchange lookup
//! resolve -m example.com
//!
//! # Quieter, with a shorter per-server timeout
//! resolve --log-level warn --timeout-ms 2000 example.com
//! ```
//!
//! # Examples
//!
//! ```bash
//! $ resolve example.com
//! INFO Querying server server=198.41.0.4 name="example.com" qtype=A
//! INFO Querying server server=192.5.6.30 name="example.com" qtype=A
//! INFO Querying server server=199.43.135.53 name="example.com" qtype=A
//! example.com has address 93.184.216.34
//! ```
//!
//! The process exits with a non-zero status when the name does not exist, a
//! server sends a corrupt message, or no server could be reached.

use anyhow::Context;
use clap::Parser;
use tracing::warn;

use iterative_resolver::classify::Answer;
use iterative_resolver::config::{CliOverrides, Config};
use iterative_resolver::dns::QueryType;
use iterative_resolver::logging::init_logging;
use iterative_resolver::resolver::Resolver;
use iterative_resolver::transport::UdpTransport;

#[derive(Parser)]
#[command(name = "resolve")]
#[command(version)]
#[command(about = "Resolve a domain name by walking the DNS hierarchy from the root servers")]
struct Cli {
    /// Name to resolve
    name: String,

    /// Look up the mail exchange (MX) instead of the address (A)
    #[arg(short = 'm', long = "mx")]
    mail: bool,

    /// Configuration file path
    #[arg(short = 'c', long, value_name = "FILE")]
    config: Option<String>,

    /// Per-server timeout in milliseconds
    #[arg(long)]
    timeout_ms: Option<u64>,

    /// Resolution steps allowed before giving up
    #[arg(long)]
    max_hops: Option<usize>,

    /// Destination port for queries
    #[arg(long)]
    port: Option<u16>,

    /// Report CNAMEs as an error instead of following them
    #[arg(long)]
    no_follow_cname: bool,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long)]
    log_level: Option<String>,
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let cli_overrides = CliOverrides {
        timeout_ms: cli.timeout_ms,
        port: cli.port,
        max_hops: cli.max_hops,
        follow_aliases: cli.no_follow_cname.then_some(false),
        log_level: cli.log_level.clone(),
    };
    let config = Config::load(cli.config.as_deref(), cli_overrides)?;

    init_logging(&config.logging.level);

    let resolver = Resolver::new(UdpTransport::from_config(&config.resolver), &config.resolver);
    let qtype = if cli.mail { QueryType::MX } else { QueryType::A };

    let answer = resolver
        .resolve(&cli.name, qtype)
        .with_context(|| format!("failed to resolve {} ({})", cli.name, qtype))?;

    match answer {
        Answer::Addresses(addrs) => {
            for addr in addrs {
                println!("{} has address {}", cli.name, addr);
            }
        }
        Answer::MailExchange {
            preference,
            exchange,
        } => {
            println!(
                "{} mail is handled by {} {}",
                cli.name, preference, exchange
            );

            // Also locate the exchange itself; the MX answer stands on its own
            // if that fails.
            match resolver.resolve_address(&exchange) {
                Ok(addrs) => {
                    for addr in addrs {
                        println!("{} has address {}", exchange, addr);
                    }
                }
                Err(e) => warn!(%exchange, error = %e, "could not resolve mail exchange"),
            }
        }
        _ => anyhow::bail!("{} lookup for {} returned a non-{} answer", qtype, cli.name, qtype),
    }

    Ok(())
}
