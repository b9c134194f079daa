//! Server side of a DNS-rebinding attack framework: an authoritative-style
//! DNS responder and a set of HTTP listeners sharing one session store, so
//! that a victim browser can be pointed at the attacker first and the target
//! right after.
pub mod config;
pub mod error;
pub mod firewall;
pub mod http;
pub mod macros;
pub mod network_order;
pub mod qname;
pub mod responder;
pub mod rfc1035;
pub mod session;
pub mod strategy;
