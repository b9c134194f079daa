//! Manage command line arguments here.
use clap::{App, Arg};

use rebindns::{config::AppConfig, error::RebindResult, qname::AnswerIp, strategy::RebindStrategy};

/// This structure holds the command line arguments.
#[derive(Debug)]
pub struct CliOptions {
    pub config: AppConfig,
}

impl CliOptions {
    pub fn options() -> RebindResult<Self> {
        let defaults = AppConfig::default();
        let matches = App::new("DNS rebinding server")
            .version("0.1")
            .about("Authoritative-style DNS responder plus HTTP payload listeners for DNS rebinding")
            .arg(
                Arg::new("dns-port")
                    .long("dns-port")
                    .long_help("Port the DNS responder binds, UDP and TCP")
                    .default_value("53")
                    .takes_value(true),
            )
            .arg(
                Arg::new("http-ports")
                    .long("http-ports")
                    .long_help("Comma-separated list of static HTTP listener ports")
                    .default_value("8080")
                    .takes_value(true),
            )
            .arg(
                Arg::new("response-ip")
                    .long("response-ip")
                    .long_help("Attacker address answered for names that carry none")
                    .default_value("127.0.0.1")
                    .takes_value(true),
            )
            .arg(
                Arg::new("rebound-ip")
                    .long("rebound-ip")
                    .long_help("Target address answered for names that carry none")
                    .default_value("127.0.0.1")
                    .takes_value(true),
            )
            .arg(
                Arg::new("strategy")
                    .long("strategy")
                    .long_help("Default rebinding strategy when a query names none")
                    .default_value("fromqueryfirstthensecond")
                    .takes_value(true),
            )
            .arg(
                Arg::new("rebound-timeout")
                    .long("rebound-timeout")
                    .long_help("Window in seconds within which first-then-second answers the target")
                    .default_value("300")
                    .takes_value(true),
            )
            .arg(
                Arg::new("session-ttl")
                    .long("session-ttl")
                    .long_help("Seconds of idleness after which a session is swept")
                    .default_value("600")
                    .takes_value(true),
            )
            .arg(
                Arg::new("allow-dynamic-servers")
                    .long("allow-dynamic-servers")
                    .long_help("Let /servers PUT manage the dynamic HTTP listener slot")
                    .takes_value(false),
            )
            .arg(
                Arg::new("www")
                    .long("www")
                    .long_help("Directory the payload files are served from")
                    .default_value("html")
                    .takes_value(true),
            )
            .get_matches();

        // save all cli options into the shared config
        let mut config = defaults;

        config.dns_port = parse_number(matches.value_of("dns-port").unwrap(), "dns-port")?;
        config.http_ports = matches
            .value_of("http-ports")
            .unwrap()
            .split(',')
            .map(|port| parse_number(port.trim(), "http-ports"))
            .collect::<RebindResult<Vec<u16>>>()?;
        config.response_ip = matches.value_of("response-ip").unwrap().parse::<AnswerIp>()?;
        config.rebound_ip = matches.value_of("rebound-ip").unwrap().parse::<AnswerIp>()?;

        let strategy = matches.value_of("strategy").unwrap();
        config.default_strategy = RebindStrategy::from_name(strategy)
            .ok_or_else(|| format!("unknown strategy <{}>", strategy))?;

        config.rebound_timeout = std::time::Duration::from_secs(parse_number(
            matches.value_of("rebound-timeout").unwrap(),
            "rebound-timeout",
        )?);
        config.session_ttl = std::time::Duration::from_secs(parse_number(
            matches.value_of("session-ttl").unwrap(),
            "session-ttl",
        )?);
        config.allow_dynamic_servers = matches.is_present("allow-dynamic-servers");
        config.www_root = matches.value_of("www").unwrap().into();

        Ok(CliOptions { config })
    }
}

fn parse_number<T: std::str::FromStr>(value: &str, flag: &str) -> RebindResult<T> {
    value
        .parse::<T>()
        .map_err(|_| format!("value <{}> for --{} does not parse", value, flag).into())
}
