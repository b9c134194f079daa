//! Process entry point: wire the session store, the HTTP listener pool and
//! the DNS responder together and keep them running.
use std::sync::Arc;
use std::time::Instant;

use log::{error, info, warn};
use tokio::net::{TcpListener, UdpSocket};

use rebindns::{
    error::RebindResult, http::server::HttpServerPool, responder::DnsResponder,
    session::SessionStore,
};

mod args;
use args::CliOptions;

#[tokio::main]
async fn main() -> RebindResult<()> {
    env_logger::try_init()?;

    // manage arguments from command line
    let options = CliOptions::options()?;
    let config = Arc::new(options.config);
    info!("config: {:?}", config);

    let store = Arc::new(SessionStore::new());

    // HTTP side first: the supervisor owns the inventory, each listener
    // composes its routing around the shared store and config
    let (pool, mut exits) = HttpServerPool::new(Arc::clone(&config), Arc::clone(&store));
    for port in &config.http_ports {
        // a static port that cannot bind aborts startup
        Arc::clone(&pool).start_listener(*port, false).await?;
    }

    // listener exits are reported once and dropped
    tokio::spawn(async move {
        while let Some(exit) = exits.recv().await {
            warn!("http listener on port {} exited: {}", exit.port, exit.error);
        }
    });

    // the expiry sweep walks the whole store on a timer
    {
        let store = Arc::clone(&store);
        let config = Arc::clone(&config);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(config.sweep_interval);
            loop {
                ticker.tick().await;
                let removed = store.expire_older_than(config.session_ttl, Instant::now());
                if removed > 0 {
                    info!("swept {} expired sessions, {} left", removed, store.len());
                }
            }
        });
    }

    // DNS side: same responder behind UDP and TCP
    let responder = Arc::new(DnsResponder::new(Arc::clone(&config), Arc::clone(&store)));

    let tcp = TcpListener::bind(("0.0.0.0", config.dns_port)).await?;
    let tcp_responder = Arc::clone(&responder);
    tokio::spawn(async move {
        if let Err(e) = tcp_responder.run_tcp(tcp).await {
            error!("tcp dns loop failed: {:?}", e);
        }
    });

    let udp = UdpSocket::bind(("0.0.0.0", config.dns_port)).await?;
    responder.run_udp(udp).await
}
