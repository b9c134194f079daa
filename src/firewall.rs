//! Short-lived packet-filter rules that cut a hijacked TCP flow hard enough
//! for the browser to come back and resolve again.
use std::net::{IpAddr, SocketAddr};
use std::time::Duration;

use log::{debug, warn};
use tokio::process::Command;

/// How long the drop rule stays installed.
pub const RULE_LIFETIME: Duration = Duration::from_secs(5);

// browsers retry from nearby ephemeral ports, so the rule covers a small
// source-port window instead of a single port
const SOURCE_PORT_SPAN: u16 = 10;

/// One drop rule, scoped to the observed flow: packets from the victim's
/// address and source-port window towards our listener are rejected with a
/// TCP reset.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DropRule {
    src: IpAddr,
    sport_low: u16,
    sport_high: u16,
    dst: IpAddr,
    dport: u16,
}

impl DropRule {
    /// Build the rule for a connection seen from `peer` on local side
    /// `local`.
    pub fn for_flow(peer: SocketAddr, local: SocketAddr) -> Self {
        DropRule {
            src: peer.ip(),
            sport_low: peer.port(),
            sport_high: peer.port().saturating_add(SOURCE_PORT_SPAN),
            dst: local.ip(),
            dport: local.port(),
        }
    }

    // iptables argument list; `action` is -I to install and -D to remove,
    // with identical match arguments so the delete finds the insert
    fn command_args(&self, action: &str) -> Vec<String> {
        vec![
            action.to_string(),
            "INPUT".to_string(),
            "-p".to_string(),
            "tcp".to_string(),
            "-s".to_string(),
            self.src.to_string(),
            "--sport".to_string(),
            format!("{}:{}", self.sport_low, self.sport_high),
            "-d".to_string(),
            self.dst.to_string(),
            "--dport".to_string(),
            self.dport.to_string(),
            "-j".to_string(),
            "REJECT".to_string(),
            "--reject-with".to_string(),
            "tcp-reset".to_string(),
        ]
    }

    pub async fn install(&self) -> bool {
        run_iptables(self.command_args("-I")).await
    }

    pub async fn remove(&self) -> bool {
        run_iptables(self.command_args("-D")).await
    }
}

/// Fire-and-forget: install the drop rule for the flow and take it out again
/// after [`RULE_LIFETIME`]. Filter failures are logged and swallowed; the
/// caller already closed the connection, which is a weaker but acceptable
/// fallback.
pub fn hijack_flow(peer: SocketAddr, local: SocketAddr) {
    // the filter speaks IPv4; an IPv6 flow only gets the connection close
    if peer.is_ipv6() || local.is_ipv6() {
        warn!("cannot install drop rule for ipv6 flow {} -> {}", peer, local);
        return;
    }

    let rule = DropRule::for_flow(peer, local);
    debug!("installing drop rule {:?}", rule);

    tokio::spawn(async move {
        if rule.install().await {
            tokio::time::sleep(RULE_LIFETIME).await;
            rule.remove().await;
        }
    });
}

async fn run_iptables(args: Vec<String>) -> bool {
    match Command::new("iptables").args(&args).output().await {
        Ok(output) if output.status.success() => true,
        Ok(output) => {
            warn!(
                "iptables {} failed: {}",
                args.join(" "),
                String::from_utf8_lossy(&output.stderr).trim()
            );
            false
        }
        Err(e) => {
            warn!("could not run iptables: {}", e);
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rule_matches_the_flow() {
        let peer: SocketAddr = "198.51.100.23:49152".parse().unwrap();
        let local: SocketAddr = "203.0.113.5:8080".parse().unwrap();

        let rule = DropRule::for_flow(peer, local);
        assert_eq!(
            rule.command_args("-I"),
            vec![
                "-I",
                "INPUT",
                "-p",
                "tcp",
                "-s",
                "198.51.100.23",
                "--sport",
                "49152:49162",
                "-d",
                "203.0.113.5",
                "--dport",
                "8080",
                "-j",
                "REJECT",
                "--reject-with",
                "tcp-reset",
            ]
        );
    }

    #[test]
    fn delete_mirrors_insert() {
        let peer: SocketAddr = "198.51.100.23:65530".parse().unwrap();
        let local: SocketAddr = "203.0.113.5:80".parse().unwrap();

        let rule = DropRule::for_flow(peer, local);
        let install = rule.command_args("-I");
        let remove = rule.command_args("-D");
        assert_eq!(install[0], "-I");
        assert_eq!(remove[0], "-D");
        assert_eq!(install[1..], remove[1..]);

        // the port window saturates instead of wrapping
        assert_eq!(install[7], "65530:65535");
    }
}
