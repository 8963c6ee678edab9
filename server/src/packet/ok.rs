use byteorder::{LittleEndian, WriteBytesExt};

use crate::codec::{write_lenenc_int, write_lenenc_string};
use crate::declar::capability_flags::Capabilities;
use crate::declar::status_flags::StatusFlags;
use crate::packet::response_type;

/// The `OK_Packet` sent after any successful command that doesn't return a
/// result set.
pub struct OkPacket {
    pub affected_rows: u64,
    pub last_insert_id: u64,
    pub status_flags: StatusFlags,
    pub warnings: u16,
    pub info: String,
}

impl OkPacket {
    pub fn new(affected_rows: u64, last_insert_id: u64, status_flags: StatusFlags) -> Self {
        OkPacket {
            affected_rows,
            last_insert_id,
            status_flags,
            warnings: 0,
            info: String::new(),
        }
    }

    pub fn serialize(&self, capabilities: Capabilities) -> Vec<u8> {
        let mut buf = Vec::new();
        buf.write_u8(response_type::OK).unwrap();
        write_lenenc_int(&mut buf, self.affected_rows).unwrap();
        write_lenenc_int(&mut buf, self.last_insert_id).unwrap();

        if capabilities.contains(Capabilities::PROTOCOL_41) {
            buf.write_u16::<LittleEndian>(self.status_flags.bits())
                .unwrap();
            buf.write_u16::<LittleEndian>(self.warnings).unwrap();
        } else if capabilities.contains(Capabilities::TRANSACTIONS) {
            buf.write_u16::<LittleEndian>(self.status_flags.bits())
                .unwrap();
        }

        if capabilities.contains(Capabilities::SESSION_TRACK) {
            write_lenenc_string(&mut buf, &self.info).unwrap();
        } else {
            buf.extend_from_slice(self.info.as_bytes());
        }

        buf
    }
}
