use std::collections::HashMap;
use std::io::{Cursor, Write};

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use common::err::MysqlError;

use crate::codec::{
    read_lenenc_bytes, read_lenenc_int, read_null_term_string, write_null_term_string,
};
use crate::declar::capability_flags::Capabilities;
use crate::declar::charset::CharacterSet;
use crate::declar::status_flags::StatusFlags;
use crate::AUTH_PLUGIN_DATA_LEN;

const PROTOCOL_VERSION: u8 = 10;

/// The server's initial handshake packet (`Protocol::HandshakeV10`).
pub struct HandshakeV10<'a> {
    pub capabilities: Capabilities,
    pub charset: CharacterSet,
    pub server_version: &'a str,
    pub connection_id: u32,
    /// 20-byte auth nonce; split as 8 + 12 bytes across the packet per the
    /// wire format, with a trailing zero appended to the second half.
    pub auth_plugin_data: [u8; AUTH_PLUGIN_DATA_LEN],
    pub status_flags: StatusFlags,
    pub auth_plugin_name: &'a str,
}

impl<'a> HandshakeV10<'a> {
    pub fn serialize(&self) -> Result<Vec<u8>, MysqlError> {
        let mut buf = Vec::new();
        buf.write_u8(PROTOCOL_VERSION)?;
        write_null_term_string(&mut buf, self.server_version)?;
        buf.write_u32::<LittleEndian>(self.connection_id)?;
        buf.write_all(&self.auth_plugin_data[..8])?;
        buf.write_u8(0)?; // filler

        let caps = self.capabilities.bits();
        buf.write_u16::<LittleEndian>((caps & 0xFFFF) as u16)?;
        buf.write_u8(self.charset.id() as u8)?;
        buf.write_u16::<LittleEndian>(self.status_flags.bits())?;
        buf.write_u16::<LittleEndian>((caps >> 16) as u16)?;

        if self.capabilities.contains(Capabilities::PLUGIN_AUTH) {
            buf.write_u8((AUTH_PLUGIN_DATA_LEN + 1) as u8)?;
        } else {
            buf.write_u8(0)?;
        }
        buf.write_all(&[0u8; 10])?; // reserved

        if self.capabilities.contains(Capabilities::SECURE_CONNECTION) {
            buf.write_all(&self.auth_plugin_data[8..])?;
            buf.write_u8(0)?;
        }

        if self.capabilities.contains(Capabilities::PLUGIN_AUTH) {
            write_null_term_string(&mut buf, self.auth_plugin_name)?;
        }

        Ok(buf)
    }
}

/// The client's reply to the handshake (`Protocol::HandshakeResponse41`),
/// parsed under the server's advertised capabilities.
#[derive(Debug, Clone)]
pub struct HandshakeResponse41 {
    pub client_capabilities: Capabilities,
    pub max_packet_size: u32,
    pub client_charset: u8,
    pub username: String,
    pub auth_response: Vec<u8>,
    pub database: Option<String>,
    pub client_plugin: Option<String>,
    pub connect_attrs: HashMap<String, String>,
    pub zstd_compression_level: u8,
}

impl HandshakeResponse41 {
    pub fn parse(packet: &[u8]) -> Result<Self, MysqlError> {
        let mut cursor = Cursor::new(packet);

        let client_capabilities =
            Capabilities::from_bits_truncate(cursor.read_u32::<LittleEndian>()?);
        let max_packet_size = cursor.read_u32::<LittleEndian>()?;
        let client_charset = cursor.read_u8()?;

        let mut reserved = [0u8; 23];
        std::io::Read::read_exact(&mut cursor, &mut reserved)?;

        let username = read_null_term_string(&mut cursor)?;

        let auth_response = if client_capabilities
            .contains(Capabilities::PLUGIN_AUTH_LENENC_CLIENT_DATA)
        {
            read_lenenc_bytes(&mut cursor)?
        } else if client_capabilities.contains(Capabilities::SECURE_CONNECTION) {
            let len = cursor.read_u8()? as usize;
            let mut buf = vec![0u8; len];
            std::io::Read::read_exact(&mut cursor, &mut buf)?;
            buf
        } else {
            read_null_term_string(&mut cursor)?.into_bytes()
        };

        let database = if client_capabilities.contains(Capabilities::CONNECT_WITH_DB) {
            Some(read_null_term_string(&mut cursor)?)
        } else {
            None
        };

        let client_plugin = if client_capabilities.contains(Capabilities::PLUGIN_AUTH) {
            Some(read_null_term_string(&mut cursor)?)
        } else {
            None
        };

        let mut connect_attrs = HashMap::new();
        if client_capabilities.contains(Capabilities::CONNECT_ATTRS) {
            let total_len = read_lenenc_int(&mut cursor)?.unwrap_or(0);
            let end = cursor.position() + total_len;
            while cursor.position() < end {
                let key = crate::codec::read_lenenc_string(&mut cursor)?;
                let value = crate::codec::read_lenenc_string(&mut cursor)?;
                connect_attrs.insert(key, value);
            }
        }

        let zstd_compression_level = if client_capabilities
            .contains(Capabilities::ZSTD_COMPRESSION_ALGORITHM)
            && crate::codec::has_remaining(&cursor)
        {
            cursor.read_u8()?
        } else {
            0
        };

        Ok(HandshakeResponse41 {
            client_capabilities,
            max_packet_size,
            client_charset,
            username,
            auth_response,
            database,
            client_plugin,
            connect_attrs,
            zstd_compression_level,
        })
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn handshake_v10_carries_full_nonce_when_secure_connection_negotiated() {
        let handshake = HandshakeV10 {
            capabilities: Capabilities::PROTOCOL_41
                | Capabilities::SECURE_CONNECTION
                | Capabilities::PLUGIN_AUTH,
            charset: CharacterSet::Utf8Mb4GeneralCi,
            server_version: "8.0.34-mysql-server-rs",
            connection_id: 42,
            auth_plugin_data: *b"01234567890123456789",
            status_flags: StatusFlags::AUTOCOMMIT,
            auth_plugin_name: "mysql_native_password",
        };

        let serialized = handshake.serialize().unwrap();
        assert_eq!(serialized[0], 10);
        assert!(serialized
            .windows("mysql_native_password".len())
            .any(|w| w == b"mysql_native_password"));
    }

    #[test]
    fn handshake_response_round_trips_plugin_and_database() {
        let mut buf = Vec::new();
        buf.write_u32::<LittleEndian>(
            (Capabilities::PROTOCOL_41
                | Capabilities::SECURE_CONNECTION
                | Capabilities::PLUGIN_AUTH
                | Capabilities::CONNECT_WITH_DB)
                .bits(),
        )
        .unwrap();
        buf.write_u32::<LittleEndian>(16_777_216).unwrap();
        buf.write_u8(45).unwrap();
        buf.write_all(&[0u8; 23]).unwrap();
        write_null_term_string(&mut buf, "root").unwrap();
        buf.write_u8(4).unwrap();
        buf.write_all(b"resp").unwrap();
        write_null_term_string(&mut buf, "testdb").unwrap();
        write_null_term_string(&mut buf, "mysql_native_password").unwrap();

        let parsed = HandshakeResponse41::parse(&buf).unwrap();
        assert_eq!(parsed.username, "root");
        assert_eq!(parsed.auth_response, b"resp");
        assert_eq!(parsed.database.as_deref(), Some("testdb"));
        assert_eq!(parsed.client_plugin.as_deref(), Some("mysql_native_password"));
    }
}
