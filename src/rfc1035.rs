//! Base structures for DNS messages. Taken from https://datatracker.ietf.org/doc/html/rfc1035
//!
//! The DnsStruct procedural macro automatically defines the implementation of the ToFromNetworkOrder trait.
//! The DnsEnum procedural macro automatically implements Default, FromStr, TryFrom<u8> and TryFrom<u16>
use std::fmt;
use std::net::Ipv4Addr;

use crate::error::RebindResult;
use crate::network_order::ToFromNetworkOrder;

use dns_derive::{DnsEnum, DnsStruct};

// DNS packets are called "messages" in RFC1035:
// "All communications inside of the domain protocol are carried in a single format called a message"
pub const MAX_DNS_PACKET_SIZE: usize = 512;

// longest label a name may carry; the two top bits of the length byte flag a
// compression pointer instead
pub const MAX_LABEL_SIZE: usize = 63;

// DNS packet header: https://datatracker.ietf.org/doc/html/rfc1035#section-4.1.1
#[derive(Debug, Default, Clone, DnsStruct)]
pub struct DNSPacketHeader {
    pub id: u16, // A 16 bit identifier assigned by the program that
    //   generates any kind of query.  This identifier is copied
    //   the corresponding reply and can be used by the requester
    //   to match up replies to outstanding queries.
    pub flags: DNSPacketFlags,
    pub qd_count: u16, // an unsigned 16 bit integer specifying the number of
    //    entries in the question section.
    pub an_count: u16, // an unsigned 16 bit integer specifying the number of
    // resource records in the answer section.
    pub ns_count: u16, // an unsigned 16 bit integer specifying the number of name
    // server resource records in the authority records section.
    pub ar_count: u16, // an unsigned 16 bit integer specifying the number of
                       // resource records in the additional records section.
}

// Flags: https://datatracker.ietf.org/doc/html/rfc1035#section-4.1.1
#[derive(Debug, Default, Clone)]
pub struct DNSPacketFlags {
    pub packet_type: PacketType, // A one bit field that specifies whether this message is a query (0), or a response (1).
    pub op_code: OpCode, // A four bit field that specifies kind of query in this message.
    pub authoritative_answer: bool, // valid in responses: the responding name server is an
    // authority for the domain name in question section.
    pub truncated: bool, // specifies that this message was truncated due to length
    // greater than that permitted on the transmission channel.
    pub recursion_desired: bool, // this bit may be set in a query and is copied into
    // the response.
    pub recursion_available: bool, // set or cleared in a response: denotes whether
    // recursive query support is available in the name server.
    pub z: u8, // Reserved for future use.  Must be zero in all queries and responses.
    pub response_code: ResponseCode, // set as part of responses.
}

/// The flags' first bit is 0 or 1 meaning a question or a response. Better is to use an enum which is
/// both clearer and type oriented.
#[derive(Debug, Clone, Copy, PartialEq, DnsEnum)]
#[repr(u8)]
pub enum PacketType {
    Query = 0,
    Response = 1,
}

// op codes: https://www.iana.org/assignments/dns-parameters/dns-parameters.xhtml#dns-parameters-5
#[derive(Debug, Clone, Copy, PartialEq, DnsEnum)]
#[repr(u8)]
pub enum OpCode {
    Query = 0,  // [RFC1035]
    IQuery = 1, // (Inverse Query, OBSOLETE)	[RFC3425]
    Status = 2, // [RFC1035]
    Unassigned = 3,
    Notify = 4, // [RFC1996]
    Update = 5, // [RFC2136]
    DOS = 6,    // DNS Stateful Operations (DSO)	[RFC8490]
                // 7-15 Unassigned
}

// response codes: https://www.iana.org/assignments/dns-parameters/dns-parameters.xhtml#dns-parameters-6
#[derive(Debug, Clone, Copy, PartialEq, DnsEnum)]
#[repr(u16)]
pub enum ResponseCode {
    NoError = 0,  // No Error	[RFC1035]
    FormErr = 1,  // Format Error	[RFC1035]
    ServFail = 2, // Server Failure	[RFC1035]
    NXDomain = 3, // Non-Existent Domain	[RFC1035]
    NotImp = 4,   // Not Implemented	[RFC1035]
    Refused = 5,  // Query Refused	[RFC1035]
}

// RR type codes: https://www.iana.org/assignments/dns-parameters/dns-parameters.xhtml#dns-parameters-4
// Only the types a rebinding responder actually sees on the wire are listed;
// anything else is answered with FormErr by the caller.
#[derive(Debug, Copy, Clone, PartialEq, DnsEnum)]
#[repr(u16)]
pub enum QType {
    A = 1,      // a host address	[RFC1035]
    NS = 2,     // an authoritative name server	[RFC1035]
    CNAME = 5,  // the canonical name for an alias	[RFC1035]
    SOA = 6,    // marks the start of a zone of authority	[RFC1035]
    NULL = 10,  // a null RR (EXPERIMENTAL)	[RFC1035]
    PTR = 12,   // a domain name pointer	[RFC1035]
    MX = 15,    // mail exchange	[RFC1035]
    TXT = 16,   // text strings	[RFC1035]
    AAAA = 28,  // IP6 Address	[RFC3596]
    SRV = 33,   // Server Selection	[RFC2782]
    OPT = 41,   // OPT	[RFC3225][RFC6891]
    SVCB = 64,  // Service Binding	[draft-ietf-dnsop-svcb-https-00]
    HTTPS = 65, // HTTPS Binding	[draft-ietf-dnsop-svcb-https-00]
    ANY = 255,  // A request for some or all records the server has available	[RFC1035]
    CAA = 257,  // Certification Authority Restriction	[RFC8659]
}

// RR Class values: https://datatracker.ietf.org/doc/html/rfc1035#section-3.2.4
#[derive(Debug, Copy, Clone, PartialEq, DnsEnum)]
#[repr(u16)]
pub enum QClass {
    IN = 1, // the Internet
    CS = 2, // the CSNET class (Obsolete - used only for examples in some obsolete RFCs)
    CH = 3, // the CHAOS class
    HS = 4, // Hesiod [Dyer 87]
    ANY = 255,
}

// Domain name: https://datatracker.ietf.org/doc/html/rfc1035#section-3.1
// Labels borrow from the receive buffer; replies are built from the very
// names the query carried.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct DomainName<'a> {
    pub labels: Vec<&'a str>,
}

impl<'a> DomainName<'a> {
    pub fn is_root(&self) -> bool {
        self.labels.is_empty()
    }
}

/// ```
/// use rebindns::rfc1035::DomainName;
///
/// let dn = DomainName::try_from("www.example.com").unwrap();
/// assert_eq!(dn.labels, &["www", "example", "com"]);
/// assert_eq!(dn.to_string(), "www.example.com.");
/// ```
impl<'a> TryFrom<&'a str> for DomainName<'a> {
    type Error = String;

    fn try_from(domain: &'a str) -> Result<Self, Self::Error> {
        if domain.is_empty() {
            return Err(String::from("empty domain name"));
        }

        let labels: Vec<&str> = domain
            .trim_end_matches('.')
            .split('.')
            .filter(|l| !l.is_empty())
            .collect();

        if labels.iter().any(|l| l.len() > MAX_LABEL_SIZE) {
            return Err(format!("label too long in domain name <{}>", domain));
        }

        Ok(DomainName { labels })
    }
}

impl<'a> fmt::Display for DomainName<'a> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // the root is just the empty label
        if self.is_root() {
            write!(f, ".")?;
        } else {
            for label in &self.labels {
                write!(f, "{}.", label)?;
            }
        }
        Ok(())
    }
}

// Question section entry: https://datatracker.ietf.org/doc/html/rfc1035#section-4.1.2
#[derive(Debug, Default, Clone, DnsStruct)]
pub struct DNSQuestion<'a> {
    pub name: DomainName<'a>, // a domain name represented as a sequence of labels
    pub r#type: QType,        // two octets containing one of the RR TYPE codes.
    pub class: QClass,        // two octets containing one of the RR CLASS codes.
}

// The rdata variants this responder emits. Serialization lives in
// network_order::dns next to the other wire impls.
#[derive(Debug, Clone)]
pub enum RData<'a> {
    A(Ipv4Addr),
    CName(DomainName<'a>),
}

// RR format: https://datatracker.ietf.org/doc/html/rfc1035#section-4.1.3
#[derive(Debug, Clone)]
pub struct ResourceRecord<'a> {
    pub name: DomainName<'a>, // an owner name, i.e., the name of the node to which this resource record pertains.
    pub r#type: QType,        // two octets containing one of the RR TYPE codes.
    pub class: QClass,        // two octets containing one of the RR CLASS codes.
    pub ttl: u32, // a 32 bit integer that specifies the time interval that the
    // resource record may be cached before the source of the
    // information should again be consulted.  Zero values are
    // interpreted to mean that the RR can only be used for the
    // transaction in progress, and should not be cached.
    pub r_data: RData<'a>, // rd_length is derived from this at serialization time
}

impl<'a> ResourceRecord<'a> {
    pub fn a(name: DomainName<'a>, ttl: u32, address: Ipv4Addr) -> Self {
        ResourceRecord {
            name,
            r#type: QType::A,
            class: QClass::IN,
            ttl,
            r_data: RData::A(address),
        }
    }

    pub fn cname(name: DomainName<'a>, ttl: u32, target: DomainName<'a>) -> Self {
        ResourceRecord {
            name,
            r#type: QType::CNAME,
            class: QClass::IN,
            ttl,
            r_data: RData::CName(target),
        }
    }
}

impl<'a> fmt::Display for ResourceRecord<'a> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "NAME:{} TYPE:{:?} CLASS:{:?} TTL:{} RDATA:{:?}",
            self.name, self.r#type, self.class, self.ttl, self.r_data
        )
    }
}

// A full reply message. Questions are echoed from the query; names are never
// compressed on the way out.
#[derive(Debug, Default, DnsStruct)]
pub struct DnsReply<'a> {
    pub header: DNSPacketHeader,
    pub questions: Vec<DNSQuestion<'a>>,
    pub answers: Vec<ResourceRecord<'a>>,
}

impl<'a> DnsReply<'a> {
    // Start a reply mirroring the query header: same id, same opcode, RD
    // copied, QR/AA set.
    pub fn for_query(header: &DNSPacketHeader) -> Self {
        let mut reply = DnsReply::default();

        reply.header.id = header.id;
        reply.header.flags.packet_type = PacketType::Response;
        reply.header.flags.op_code = header.flags.op_code;
        reply.header.flags.authoritative_answer = true;
        reply.header.flags.recursion_desired = header.flags.recursion_desired;
        reply.header.flags.response_code = ResponseCode::NoError;

        reply
    }

    // Add another question into the echoed section
    pub fn push_question(&mut self, question: DNSQuestion<'a>) {
        self.questions.push(question);

        // as we add a question, we need to increment the counter
        self.header.qd_count += 1;
    }

    pub fn push_answer(&mut self, answer: ResourceRecord<'a>) {
        self.answers.push(answer);
        self.header.an_count += 1;
    }
}
