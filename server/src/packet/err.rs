use std::io::Write;

use byteorder::{LittleEndian, WriteBytesExt};
use common::err::MysqlError;

use crate::packet::response_type;

/// The `ERR_Packet` sent in place of any expected response.
pub struct ErrPacket {
    pub error_code: u16,
    pub sql_state: &'static str,
    pub message: String,
}

impl ErrPacket {
    pub fn from_error(err: &MysqlError) -> Self {
        ErrPacket {
            error_code: err.code(),
            sql_state: err.sql_state(),
            message: err.to_string(),
        }
    }

    pub fn serialize(&self) -> Vec<u8> {
        let mut buf = Vec::new();
        buf.write_u8(response_type::ERROR).unwrap();
        buf.write_u16::<LittleEndian>(self.error_code).unwrap();
        buf.write_u8(b'#').unwrap();
        let state = self.sql_state.as_bytes();
        let mut padded = [b'0'; 5];
        let n = state.len().min(5);
        padded[..n].copy_from_slice(&state[..n]);
        buf.write_all(&padded).unwrap();
        buf.write_all(self.message.as_bytes()).unwrap();
        buf
    }
}
