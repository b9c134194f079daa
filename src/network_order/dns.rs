//! All functions/trait to convert DNS structures to network order back & forth
use byteorder::{BigEndian, ReadBytesExt, WriteBytesExt};
use std::io::{Cursor, Result};
use std::str;

use crate::derive_enum;
use crate::error::{RebindError, RebindResult};
use crate::network_order::ToFromNetworkOrder;
use crate::rfc1035::{
    DNSPacketFlags, DomainName, OpCode, PacketType, QClass, QType, RData, ResourceRecord,
    ResponseCode, MAX_LABEL_SIZE,
};

// Impl QType & QClass enums
derive_enum!(QType, u16);
derive_enum!(QClass, u16);

impl<'a> ToFromNetworkOrder<'a> for DomainName<'a> {
    /// ```
    /// use rebindns::network_order::ToFromNetworkOrder;
    /// use rebindns::rfc1035::DomainName;
    ///
    /// let dn = DomainName::try_from("www.google.ie").unwrap();
    /// let mut buffer: Vec<u8> = Vec::new();
    ///
    /// assert_eq!(dn.to_network_bytes(&mut buffer).unwrap(), 15);
    /// assert_eq!(
    ///     &buffer,
    ///     &[0x03, 0x77, 0x77, 0x77, 0x06, 0x67, 0x6f, 0x6f, 0x67, 0x6c, 0x65, 0x02, 0x69, 0x65, 0x00]
    /// );
    /// ```
    fn to_network_bytes(&self, buffer: &mut Vec<u8>) -> Result<usize> {
        let mut length = 0usize;

        for label in &self.labels {
            // write length first
            buffer.write_u8(label.len() as u8)?;

            // write label
            buffer.extend_from_slice(label.as_bytes());

            length += label.len() + 1;
        }

        // add sentinel 0x00
        buffer.write_u8(0)?;

        Ok(length + 1)
    }

    /// ```
    /// use std::io::Cursor;
    /// use rebindns::network_order::ToFromNetworkOrder;
    /// use rebindns::rfc1035::DomainName;
    ///
    /// let b = &[0x03, 0x77, 0x77, 0x77, 0x06, 0x67, 0x6f, 0x6f, 0x67, 0x6c, 0x65, 0x02, 0x69, 0x65, 0x00];
    /// let mut buffer = Cursor::new(b.as_slice());
    /// let mut dn = DomainName::default();
    /// assert!(dn.from_network_bytes(&mut buffer).is_ok());
    /// assert_eq!(dn.labels, &["www", "google", "ie"]);
    /// assert_eq!(buffer.position(), 15);
    /// ```
    fn from_network_bytes(&mut self, buffer: &mut Cursor<&'a [u8]>) -> RebindResult<()> {
        // From RFC1035, a domain name in a message is either:
        // - a sequence of labels ending in a zero octet
        // - a pointer
        // - a sequence of labels ending with a pointer
        //
        // The pointer takes the form of a two octet sequence:
        // +--+--+--+--+--+--+--+--+--+--+--+--+--+--+--+--+
        // | 1  1|                OFFSET                   |
        // +--+--+--+--+--+--+--+--+--+--+--+--+--+--+--+--+
        let data = *buffer.get_ref();
        let mut index = buffer.position() as usize;

        // the cursor lands after the in-place part of the name, not after
        // whatever a pointer referenced
        let mut resume_at = None;

        loop {
            let prefix = *data
                .get(index)
                .ok_or_else(|| RebindError::new("domain name runs past the buffer"))? as usize;

            // the zero sentinel closes the name
            if prefix == 0 {
                index += 1;
                break;
            }

            // compression pointer: jump to the offset and keep reading labels
            if prefix >= 192 {
                let low = *data
                    .get(index + 1)
                    .ok_or_else(|| RebindError::new("truncated compression pointer"))?;
                let pointer = (u16::from_be_bytes([prefix as u8, low]) & 0b0011_1111_1111_1111) as usize;

                // only backward pointers are legal, which also rules out loops
                if pointer >= index {
                    return Err(RebindError::new("forward compression pointer"));
                }
                if resume_at.is_none() {
                    resume_at = Some(index + 2);
                }
                index = pointer;
                continue;
            }

            if prefix > MAX_LABEL_SIZE {
                return Err(RebindError::new("unsupported label type"));
            }

            let label = data
                .get(index + 1..index + 1 + prefix)
                .ok_or_else(|| RebindError::new("label runs past the buffer"))?;
            self.labels.push(str::from_utf8(label)?);

            index += prefix + 1;
        }

        buffer.set_position(resume_at.unwrap_or(index) as u64);
        Ok(())
    }
}

impl<'a> ToFromNetworkOrder<'a> for DNSPacketFlags {
    /// ```
    /// use rebindns::network_order::ToFromNetworkOrder;
    /// use rebindns::rfc1035::{DNSPacketFlags, ResponseCode, OpCode, PacketType};
    ///
    /// let flags = DNSPacketFlags {
    ///     packet_type: PacketType::Response,
    ///     op_code: OpCode::IQuery,
    ///     authoritative_answer: true,
    ///     truncated: true,
    ///     recursion_desired: true,
    ///     recursion_available: true,
    ///     z: 0b111,
    ///     response_code: ResponseCode::NoError
    /// };
    ///
    /// let mut buffer: Vec<u8> = Vec::new();
    /// assert!(flags.to_network_bytes(&mut buffer).is_ok());
    /// assert_eq!(buffer, &[0b1000_1111, 0b1111_0000]);
    /// ```
    fn to_network_bytes(&self, buffer: &mut Vec<u8>) -> Result<usize> {
        // combine all flags according to structure
        //                               1  1  1  1  1  1
        // 0  1  2  3  4  5  6  7  8  9  0  1  2  3  4  5
        // +--+--+--+--+--+--+--+--+--+--+--+--+--+--+--+--+
        // |QR|   Opcode  |AA|TC|RD|RA|   Z    |   RCODE   |
        // +--+--+--+--+--+--+--+--+--+--+--+--+--+--+--+--+
        let mut flags = (self.packet_type as u16) << 15;
        flags |= (self.op_code as u16) << 11;
        flags |= (self.authoritative_answer as u16) << 10;
        flags |= (self.truncated as u16) << 9;
        flags |= (self.recursion_desired as u16) << 8;
        flags |= (self.recursion_available as u16) << 7;
        flags |= (self.z as u16) << 4;
        flags |= self.response_code as u16;

        buffer.write_u16::<BigEndian>(flags)?;
        Ok(2)
    }

    /// ```
    /// use std::io::Cursor;
    /// use rebindns::network_order::ToFromNetworkOrder;
    /// use rebindns::rfc1035::{DNSPacketFlags, ResponseCode, OpCode, PacketType};
    ///
    /// let b = vec![0b1000_1111, 0b1111_0000];
    /// let mut buffer = Cursor::new(b.as_slice());
    /// let mut v = DNSPacketFlags::default();
    /// assert!(v.from_network_bytes(&mut buffer).is_ok());
    /// assert_eq!(v.packet_type, PacketType::Response);
    /// assert_eq!(v.op_code, OpCode::IQuery);
    /// assert!(v.authoritative_answer);
    /// assert!(v.truncated);
    /// assert!(v.recursion_desired);
    /// assert!(v.recursion_available);
    /// assert_eq!(v.z, 0b111);
    /// assert_eq!(v.response_code, ResponseCode::NoError);
    /// ```
    fn from_network_bytes(&mut self, buffer: &mut Cursor<&'a [u8]>) -> RebindResult<()> {
        // read as u16 and decode the fields using the same layout as above
        let flags = buffer.read_u16::<BigEndian>()?;

        self.packet_type = if flags >> 15 == 1 {
            PacketType::Response
        } else {
            PacketType::Query
        };

        // unknown opcodes are folded into Unassigned: the caller still sends
        // an empty well-formed reply instead of dropping the query
        self.op_code = OpCode::try_from(flags >> 11 & 0b1111).unwrap_or(OpCode::Unassigned);

        self.authoritative_answer = (flags >> 10) & 1 == 1;
        self.truncated = (flags >> 9) & 1 == 1;
        self.recursion_desired = (flags >> 8) & 1 == 1;
        self.recursion_available = (flags >> 7) & 1 == 1;
        self.z = (flags >> 4 & 0b111) as u8;

        // queries carry NoError; be as lenient for anything else
        self.response_code = ResponseCode::try_from(flags & 0b1111).unwrap_or_default();

        Ok(())
    }
}

impl<'a> ToFromNetworkOrder<'a> for RData<'a> {
    fn to_network_bytes(&self, buffer: &mut Vec<u8>) -> Result<usize> {
        match self {
            RData::A(address) => address.to_network_bytes(buffer),
            RData::CName(target) => target.to_network_bytes(buffer),
        }
    }

    // the server never parses rdata: it only synthesizes it
    fn from_network_bytes(&mut self, _buffer: &mut Cursor<&'a [u8]>) -> RebindResult<()> {
        Ok(())
    }
}

impl<'a> ToFromNetworkOrder<'a> for ResourceRecord<'a> {
    fn to_network_bytes(&self, buffer: &mut Vec<u8>) -> Result<usize> {
        let mut length = self.name.to_network_bytes(buffer)?;
        length += self.r#type.to_network_bytes(buffer)?;
        length += self.class.to_network_bytes(buffer)?;
        length += self.ttl.to_network_bytes(buffer)?;

        // rdata goes through its own buffer first so rd_length can precede it
        let mut rdata: Vec<u8> = Vec::new();
        let rd_length = self.r_data.to_network_bytes(&mut rdata)?;
        length += (rd_length as u16).to_network_bytes(buffer)?;
        buffer.append(&mut rdata);

        Ok(length + rd_length)
    }

    // see RData: records are write-only on the server side
    fn from_network_bytes(&mut self, _buffer: &mut Cursor<&'a [u8]>) -> RebindResult<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // sample taken from real data using wireshark to exercise domain name
    // compression: the second name is a pointer to offset 12
    const SAMPLE: &[u8] = &[
        0x41, 0x2a, 0x81, 0x80, 0x00, 0x01, 0x00, 0x00, 0x00, 0x01, 0x00, 0x01, 0x06, 0x67, 0x6f,
        0x6f, 0x67, 0x6c, 0x65, 0x03, 0x63, 0x6f, 0x6d, 0x00, 0x00, 0x05, 0x00, 0x01, 0xc0, 0x0c,
    ];

    #[test]
    fn domain_name() {
        let mut buffer = Cursor::new(SAMPLE);

        // plain labels at offset 12
        buffer.set_position(12);
        let mut dn = DomainName::default();
        assert!(dn.from_network_bytes(&mut buffer).is_ok());
        assert_eq!(dn.labels, &["google", "com"]);
        assert_eq!(&dn.to_string(), "google.com.");
        assert_eq!(buffer.position(), 24);

        // compressed name at offset 28 pointing back to 12
        buffer.set_position(28);
        let mut dn = DomainName::default();
        assert!(dn.from_network_bytes(&mut buffer).is_ok());
        assert_eq!(dn.labels, &["google", "com"]);
        assert_eq!(buffer.position(), 30);
    }

    #[test]
    fn bogus_domain_names() {
        // a forward pointer must be refused
        let bytes: &[u8] = &[0xc0, 0x10];
        let mut buffer = Cursor::new(bytes);
        let mut dn = DomainName::default();
        assert!(dn.from_network_bytes(&mut buffer).is_err());

        // a name running past the end of the buffer too
        let bytes: &[u8] = &[0x05, b'a', b'b'];
        let mut buffer = Cursor::new(bytes);
        let mut dn = DomainName::default();
        assert!(dn.from_network_bytes(&mut buffer).is_err());
    }

    #[test]
    fn flags_round() {
        let flags = DNSPacketFlags {
            packet_type: PacketType::Response,
            op_code: OpCode::Query,
            authoritative_answer: true,
            truncated: false,
            recursion_desired: true,
            recursion_available: false,
            z: 0,
            response_code: ResponseCode::NXDomain,
        };

        let mut buffer: Vec<u8> = Vec::new();
        flags.to_network_bytes(&mut buffer).unwrap();
        assert_eq!(buffer, &[0b1000_0101, 0b0000_0011]);

        let owned = buffer.clone();
        let mut cursor = Cursor::new(owned.as_slice());
        let mut decoded = DNSPacketFlags::default();
        decoded.from_network_bytes(&mut cursor).unwrap();
        assert_eq!(decoded.packet_type, PacketType::Response);
        assert!(decoded.authoritative_answer);
        assert!(decoded.recursion_desired);
        assert_eq!(decoded.response_code, ResponseCode::NXDomain);
    }

    #[test]
    fn unknown_opcode_is_folded() {
        // opcode 0b1111 is unassigned; parsing must not fail
        let bytes: &[u8] = &[0b0111_1000, 0x00];
        let mut buffer = Cursor::new(bytes);
        let mut flags = DNSPacketFlags::default();
        assert!(flags.from_network_bytes(&mut buffer).is_ok());
        assert_eq!(flags.op_code, OpCode::Unassigned);
    }
}
