//! Conversions between primitive values and their network-order form.
use std::io::{Cursor, Result};
use std::net::Ipv4Addr;

use byteorder::{BigEndian, ReadBytesExt, WriteBytesExt};

use crate::error::RebindResult;
use crate::network_order::ToFromNetworkOrder;

impl<'a> ToFromNetworkOrder<'a> for u8 {
    /// ```
    /// use rebindns::network_order::ToFromNetworkOrder;
    ///
    /// let mut buffer: Vec<u8> = Vec::new();
    /// assert!(255_u8.to_network_bytes(&mut buffer).is_ok());
    /// assert_eq!(buffer, &[0xFF]);
    /// ```
    fn to_network_bytes(&self, buffer: &mut Vec<u8>) -> Result<usize> {
        buffer.write_u8(*self)?;
        Ok(1)
    }

    /// ```
    /// use std::io::Cursor;
    /// use rebindns::network_order::ToFromNetworkOrder;
    ///
    /// let b = vec![0xFF];
    /// let mut buffer = Cursor::new(b.as_slice());
    /// let mut v = 0u8;
    /// assert!(v.from_network_bytes(&mut buffer).is_ok());
    /// assert_eq!(v, 255);
    /// ```
    fn from_network_bytes(&mut self, buffer: &mut Cursor<&'a [u8]>) -> RebindResult<()> {
        *self = buffer.read_u8()?;
        Ok(())
    }
}

impl<'a> ToFromNetworkOrder<'a> for u16 {
    /// ```
    /// use rebindns::network_order::ToFromNetworkOrder;
    ///
    /// let mut buffer: Vec<u8> = Vec::new();
    /// assert!(0x1234_u16.to_network_bytes(&mut buffer).is_ok());
    /// assert_eq!(buffer, &[0x12, 0x34]);
    /// ```
    fn to_network_bytes(&self, buffer: &mut Vec<u8>) -> Result<usize> {
        buffer.write_u16::<BigEndian>(*self)?;
        Ok(2)
    }

    /// ```
    /// use std::io::Cursor;
    /// use rebindns::network_order::ToFromNetworkOrder;
    ///
    /// let b = vec![0x12, 0x34];
    /// let mut buffer = Cursor::new(b.as_slice());
    /// let mut v = 0u16;
    /// assert!(v.from_network_bytes(&mut buffer).is_ok());
    /// assert_eq!(v, 0x1234);
    /// ```
    fn from_network_bytes(&mut self, buffer: &mut Cursor<&'a [u8]>) -> RebindResult<()> {
        *self = buffer.read_u16::<BigEndian>()?;
        Ok(())
    }
}

impl<'a> ToFromNetworkOrder<'a> for u32 {
    /// ```
    /// use rebindns::network_order::ToFromNetworkOrder;
    ///
    /// let mut buffer: Vec<u8> = Vec::new();
    /// assert!(0x12345678_u32.to_network_bytes(&mut buffer).is_ok());
    /// assert_eq!(buffer, &[0x12, 0x34, 0x56, 0x78]);
    /// ```
    fn to_network_bytes(&self, buffer: &mut Vec<u8>) -> Result<usize> {
        buffer.write_u32::<BigEndian>(*self)?;
        Ok(4)
    }

    /// ```
    /// use std::io::Cursor;
    /// use rebindns::network_order::ToFromNetworkOrder;
    ///
    /// let b = vec![0x12, 0x34, 0x56, 0x78];
    /// let mut buffer = Cursor::new(b.as_slice());
    /// let mut v = 0u32;
    /// assert!(v.from_network_bytes(&mut buffer).is_ok());
    /// assert_eq!(v, 0x12345678);
    /// ```
    fn from_network_bytes(&mut self, buffer: &mut Cursor<&'a [u8]>) -> RebindResult<()> {
        *self = buffer.read_u32::<BigEndian>()?;
        Ok(())
    }
}

impl<'a> ToFromNetworkOrder<'a> for Ipv4Addr {
    /// ```
    /// use std::net::Ipv4Addr;
    /// use rebindns::network_order::ToFromNetworkOrder;
    ///
    /// let mut buffer: Vec<u8> = Vec::new();
    /// let ip = Ipv4Addr::new(192, 168, 0, 1);
    /// assert_eq!(ip.to_network_bytes(&mut buffer).unwrap(), 4);
    /// assert_eq!(buffer, &[192, 168, 0, 1]);
    /// ```
    fn to_network_bytes(&self, buffer: &mut Vec<u8>) -> Result<usize> {
        buffer.extend_from_slice(&self.octets());
        Ok(4)
    }

    /// ```
    /// use std::io::Cursor;
    /// use std::net::Ipv4Addr;
    /// use rebindns::network_order::ToFromNetworkOrder;
    ///
    /// let b = vec![10, 0, 0, 7];
    /// let mut buffer = Cursor::new(b.as_slice());
    /// let mut v = Ipv4Addr::UNSPECIFIED;
    /// assert!(v.from_network_bytes(&mut buffer).is_ok());
    /// assert_eq!(v, Ipv4Addr::new(10, 0, 0, 7));
    /// ```
    fn from_network_bytes(&mut self, buffer: &mut Cursor<&'a [u8]>) -> RebindResult<()> {
        *self = Ipv4Addr::from(buffer.read_u32::<BigEndian>()?);
        Ok(())
    }
}

impl<'a, T> ToFromNetworkOrder<'a> for Vec<T>
where
    T: ToFromNetworkOrder<'a>,
{
    /// ```
    /// use rebindns::network_order::ToFromNetworkOrder;
    ///
    /// let mut buffer: Vec<u8> = Vec::new();
    /// let v = vec![0xFFFF_u16, 0xFFFF, 0xFFFF];
    /// assert_eq!(v.to_network_bytes(&mut buffer).unwrap(), 6);
    /// assert_eq!(&buffer, &[0xFF; 6]);
    /// ```
    fn to_network_bytes(&self, buffer: &mut Vec<u8>) -> Result<usize> {
        let mut length = 0usize;

        // copy data for each element
        for item in self {
            length += item.to_network_bytes(buffer)?;
        }

        Ok(length)
    }

    // element counts live in the enclosing message header, so the message
    // parser reads sections explicitly instead of going through Vec
    fn from_network_bytes(&mut self, _buffer: &mut Cursor<&'a [u8]>) -> RebindResult<()> {
        Ok(())
    }
}
