// auto-implement the ToFromNetworkOrder trait for enums
#[macro_export]
macro_rules! derive_enum {
    ($t:ty, u8) => {
        impl<'a> ToFromNetworkOrder<'a> for $t {
            fn to_network_bytes(&self, buffer: &mut Vec<u8>) -> std::io::Result<usize> {
                buffer.write_u8(*self as u8)?;
                Ok(1)
            }

            fn from_network_bytes(
                &mut self,
                buffer: &mut std::io::Cursor<&'a [u8]>,
            ) -> RebindResult<()> {
                let value = buffer.read_u8()?;
                match <$t>::try_from(value) {
                    Ok(ct) => {
                        *self = ct;
                        Ok(())
                    }
                    Err(e) => Err(RebindError::from(e)),
                }
            }
        }
    };

    ($t:ty, u16) => {
        impl<'a> ToFromNetworkOrder<'a> for $t {
            fn to_network_bytes(&self, buffer: &mut Vec<u8>) -> std::io::Result<usize> {
                buffer.write_u16::<BigEndian>(*self as u16)?;
                Ok(2)
            }

            fn from_network_bytes(
                &mut self,
                buffer: &mut std::io::Cursor<&'a [u8]>,
            ) -> RebindResult<()> {
                let value = buffer.read_u16::<BigEndian>()?;
                match <$t>::try_from(value) {
                    Ok(ct) => {
                        *self = ct;
                        Ok(())
                    }
                    Err(e) => Err(RebindError::from(e)),
                }
            }
        }
    };
}

// render a byte buffer for debug logs, either as hex ("X") or as printable
// chars ("C")
#[macro_export]
macro_rules! format_buffer {
    ("X", $buf:expr) => {
        $buf.iter()
            .map(|b| format!("{:02X} ", b))
            .collect::<String>()
    };
    ("C", $buf:expr) => {
        $buf.iter()
            .map(|b| {
                if b.is_ascii_graphic() {
                    *b as char
                } else {
                    '.'
                }
            })
            .collect::<String>()
    };
}

// useful helper for codec tests
#[macro_export]
macro_rules! test_to_network {
    ($data:ident) => {{
        let mut buffer: Vec<u8> = Vec::new();
        let bytes_written = $data.to_network_bytes(&mut buffer).unwrap();

        (buffer, bytes_written)
    }};
}
