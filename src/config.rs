//! Process-wide parameters, resolved once at startup and shared read-only.
use std::net::Ipv4Addr;
use std::path::PathBuf;
use std::time::Duration;

use crate::qname::AnswerIp;
use crate::strategy::RebindStrategy;

/// Everything the responder, routers and sweeper need to know. Wrapped in an
/// `Arc` by the caller; never mutated after startup, so reads take no lock.
#[derive(Debug, Clone)]
pub struct AppConfig {
    /// Port the DNS responder binds, UDP and TCP.
    pub dns_port: u16,
    /// Static HTTP listener ports, started in order.
    pub http_ports: Vec<u16>,
    /// Attacker address answered when a query name carries none.
    pub response_ip: AnswerIp,
    /// Target address answered when a query name carries none.
    pub rebound_ip: AnswerIp,
    /// Used whenever a query names no strategy, or an unknown one.
    pub default_strategy: RebindStrategy,
    /// Window within which first-then-second keeps answering the target.
    pub rebound_timeout: Duration,
    /// Sessions idle longer than this are swept away.
    pub session_ttl: Duration,
    /// How often the expiry sweep runs.
    pub sweep_interval: Duration,
    /// Whether `/servers` PUT may manage the dynamic listener slot.
    pub allow_dynamic_servers: bool,
    /// Root of the static payload files served on `/`.
    pub www_root: PathBuf,
}

impl Default for AppConfig {
    fn default() -> Self {
        AppConfig {
            dns_port: 53,
            http_ports: vec![8080],
            response_ip: AnswerIp::V4(Ipv4Addr::LOCALHOST),
            rebound_ip: AnswerIp::V4(Ipv4Addr::LOCALHOST),
            default_strategy: RebindStrategy::FirstThenSecond,
            rebound_timeout: Duration::from_secs(300),
            session_ttl: Duration::from_secs(600),
            sweep_interval: Duration::from_secs(60),
            allow_dynamic_servers: false,
            www_root: PathBuf::from("html"),
        }
    }
}
