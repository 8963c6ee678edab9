use byteorder::{LittleEndian, WriteBytesExt};

use crate::declar::capability_flags::Capabilities;
use crate::declar::status_flags::StatusFlags;
use crate::packet::ok::OkPacket;
use crate::packet::response_type;

/// The classic `EOF_Packet`, superseded by `OK_Packet` once
/// `CLIENT_DEPRECATE_EOF` is negotiated.
pub struct EofPacket {
    pub warning_count: u16,
    pub status_flags: StatusFlags,
}

impl EofPacket {
    pub fn serialize(&self) -> Vec<u8> {
        let mut buf = Vec::new();
        buf.write_u8(response_type::EOF).unwrap();
        buf.write_u16::<LittleEndian>(self.warning_count).unwrap();
        buf.write_u16::<LittleEndian>(self.status_flags.bits())
            .unwrap();
        buf
    }
}

/// True when `packet` is short enough (`< 9` bytes) and headed `0xFE` to be
/// parsed as an `EOF_Packet` rather than a long result-set row that happens
/// to start with the same byte.
pub fn is_eof(packet: &[u8]) -> bool {
    !packet.is_empty() && packet[0] == response_type::EOF && packet.len() < 9
}

/// Emits the row-terminator packet appropriate to the negotiated
/// capabilities: an `OK_Packet` once `DEPRECATE_EOF` is set, else the
/// classic `EOF_Packet`.
pub fn ok_or_eof(capabilities: Capabilities, warning_count: u16, status_flags: StatusFlags) -> Vec<u8> {
    if capabilities.contains(Capabilities::DEPRECATE_EOF) {
        OkPacket {
            affected_rows: 0,
            last_insert_id: 0,
            status_flags,
            warnings: warning_count,
            info: String::new(),
        }
        .serialize(capabilities)
    } else {
        EofPacket {
            warning_count,
            status_flags,
        }
        .serialize()
    }
}
