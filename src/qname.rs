//! Parser for the rebinding parameters a victim browser smuggles inside a
//! query name. The shape is, case-insensitively:
//!
//! `<anything> s- <response-ip> - <rebound-ip> - <session> - <strategy> -e. <domain>`
//!
//! e.g. `s-192.168.0.1-10.0.0.7-8f4a-fromqueryroundrobin-e.evil.tld`
use std::fmt;
use std::net::Ipv4Addr;
use std::str::FromStr;

/// Opens the parameter block inside a query name.
pub const START_TAG: &str = "s-";
/// Closes the parameter block; everything after it is the delegated domain.
pub const END_TAG: &str = "-e.";

/// An answer value: a plain IPv4 literal, or the `localhost` token which is
/// answered with a CNAME instead of an A record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AnswerIp {
    Localhost,
    V4(Ipv4Addr),
}

impl fmt::Display for AnswerIp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AnswerIp::Localhost => write!(f, "localhost"),
            AnswerIp::V4(address) => write!(f, "{}", address),
        }
    }
}

impl FromStr for AnswerIp {
    type Err = std::net::AddrParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.eq_ignore_ascii_case("localhost") {
            Ok(AnswerIp::Localhost)
        } else {
            Ok(AnswerIp::V4(s.parse::<Ipv4Addr>()?))
        }
    }
}

/// The decoded parameter block of one query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RebindQuery {
    pub response_ip: AnswerIp,
    pub rebound_ip: AnswerIp,
    /// Opaque browser-generated token, kept in its original case.
    pub session: String,
    /// Lowercased strategy token; may be empty, and unknown names fall back
    /// to the configured default at lookup time.
    pub strategy: String,
    /// Plumbed through to the session; no query encoding sets it today.
    pub cache_flush: bool,
}

/// Why a name failed to decode. Callers treat every variant the same way
/// (fall back to defaults) but tests and logs want the distinction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QnameError {
    NoEndTag,
    NoStartTag,
    BadDomain,
    WrongArity,
    BadFirstIp,
    BadSecondIp,
    EmptySession,
}

/// Decode the rebinding parameters out of a query name.
///
/// Tag matching is case-insensitive; the session keeps the case the browser
/// sent. The strategy token is only a lookup key here, so an unknown one is
/// not an error.
pub fn parse_qname(qname: &str) -> Result<RebindQuery, QnameError> {
    // tags are matched on a lowercased copy, fields are sliced from the
    // original so the session case survives
    let lower = qname.to_lowercase();

    let end = lower.find(END_TAG).ok_or(QnameError::NoEndTag)?;
    let start = lower[..end].find(START_TAG).ok_or(QnameError::NoStartTag)?;

    // a delegated domain is at least "x.y"-shaped
    let domain = &qname[end + END_TAG.len()..];
    if domain.len() < 3 || !domain.contains('.') {
        return Err(QnameError::BadDomain);
    }

    let fields: Vec<&str> = qname[start + START_TAG.len()..end].split('-').collect();
    if fields.len() != 4 {
        return Err(QnameError::WrongArity);
    }

    let response_ip = fields[0].parse().map_err(|_| QnameError::BadFirstIp)?;
    let rebound_ip = fields[1].parse().map_err(|_| QnameError::BadSecondIp)?;

    if fields[2].is_empty() {
        return Err(QnameError::EmptySession);
    }

    Ok(RebindQuery {
        response_ip,
        rebound_ip,
        session: fields[2].to_string(),
        strategy: fields[3].to_lowercase(),
        cache_flush: false,
    })
}

/// Inverse of [`parse_qname`] for names the formatter accepts: build the
/// query name that encodes `query` under `domain`.
pub fn format_qname(query: &RebindQuery, domain: &str) -> String {
    format!(
        "{}{}-{}-{}-{}{}{}",
        START_TAG, query.response_ip, query.rebound_ip, query.session, query.strategy, END_TAG, domain
    )
}

/// Apply [`parse_qname`] to an HTTP `Host` header value (the optional
/// `:port` suffix is dropped first).
pub fn parse_host(host: &str) -> Result<RebindQuery, QnameError> {
    let name = host.split(':').next().unwrap_or(host);
    parse_qname(name)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ip(s: &str) -> AnswerIp {
        s.parse().unwrap()
    }

    #[test]
    fn full_name() {
        let q =
            parse_qname("s-192.168.0.1-10.0.0.7-8f4a-fromqueryroundrobin-e.evil.tld").unwrap();
        assert_eq!(q.response_ip, ip("192.168.0.1"));
        assert_eq!(q.rebound_ip, ip("10.0.0.7"));
        assert_eq!(q.session, "8f4a");
        assert_eq!(q.strategy, "fromqueryroundrobin");
        assert!(!q.cache_flush);
    }

    #[test]
    fn leading_labels_and_trailing_dot() {
        let q = parse_qname("www.s-1.2.3.4-localhost-k-fromquerymultia-e.evil.tld.").unwrap();
        assert_eq!(q.response_ip, ip("1.2.3.4"));
        assert_eq!(q.rebound_ip, AnswerIp::Localhost);
        assert_eq!(q.session, "k");
    }

    #[test]
    fn case_insensitive_tags_but_session_case_kept() {
        let q = parse_qname("S-1.2.3.4-LOCALHOST-AbCd-FROMQUERYRANDOM-E.evil.tld").unwrap();
        assert_eq!(q.rebound_ip, AnswerIp::Localhost);
        assert_eq!(q.session, "AbCd");
        assert_eq!(q.strategy, "fromqueryrandom");
    }

    #[test]
    fn empty_strategy_selects_default_later() {
        let q = parse_qname("s-1.2.3.4-10.0.0.7-abc--e.evil.tld").unwrap();
        assert_eq!(q.strategy, "");
    }

    #[test]
    fn failure_classification() {
        use QnameError::*;

        assert_eq!(parse_qname("www.example.com").unwrap_err(), NoEndTag);
        assert_eq!(parse_qname("1.2.3.4-10.0.0.7-abc-x-e.evil.tld").unwrap_err(), NoStartTag);
        assert_eq!(parse_qname("s-1.2.3.4-10.0.0.7-abc-x-e.ab").unwrap_err(), BadDomain);
        assert_eq!(parse_qname("s-1.2.3.4-10.0.0.7-abc-x-e.evilcom").unwrap_err(), BadDomain);
        assert_eq!(parse_qname("s-1.2.3.4-abc-x-e.evil.tld").unwrap_err(), WrongArity);
        assert_eq!(
            parse_qname("s-1.2.3.4-10.0.0.7-a-b-c-e.evil.tld").unwrap_err(),
            WrongArity
        );
        assert_eq!(parse_qname("s-nope-10.0.0.7-abc-x-e.evil.tld").unwrap_err(), BadFirstIp);
        assert_eq!(parse_qname("s-1.2.3.4-999.0.0.7-abc-x-e.evil.tld").unwrap_err(), BadSecondIp);
        assert_eq!(parse_qname("s-1.2.3.4-10.0.0.7--x-e.evil.tld").unwrap_err(), EmptySession);
    }

    #[test]
    fn format_then_parse_is_identity() {
        let mut query = RebindQuery {
            response_ip: ip("1.2.3.4"),
            rebound_ip: ip("10.0.0.7"),
            session: "Sess42".to_string(),
            strategy: String::new(),
            cache_flush: false,
        };

        for strategy in [
            "",
            "fromqueryfirstthensecond",
            "fromqueryrandom",
            "fromqueryroundrobin",
            "fromquerymultia",
        ] {
            query.strategy = strategy.to_string();
            let name = format_qname(&query, "evil.tld");
            assert_eq!(parse_qname(&name).unwrap(), query);
        }
    }

    #[test]
    fn host_header_port_is_stripped() {
        let q = parse_host("s-1.2.3.4-127.0.0.1-xyz-fromquerymultia-e.evil.tld:8080").unwrap();
        assert_eq!(q.session, "xyz");
        assert_eq!(q.strategy, "fromquerymultia");
    }
}
