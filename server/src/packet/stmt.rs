use byteorder::{LittleEndian, WriteBytesExt};

/// `COM_STMT_PREPARE_OK`, the header that precedes a prepared statement's
/// parameter and (if any) column definition blocks.
pub struct ComStmtPrepareOk {
    pub statement_id: u32,
    pub num_columns: u16,
    pub num_params: u16,
    pub warning_count: u16,
}

impl ComStmtPrepareOk {
    pub fn serialize(&self) -> Vec<u8> {
        let mut buf = Vec::new();
        buf.write_u8(0x00).unwrap();
        buf.write_u32::<LittleEndian>(self.statement_id).unwrap();
        buf.write_u16::<LittleEndian>(self.num_columns).unwrap();
        buf.write_u16::<LittleEndian>(self.num_params).unwrap();
        buf.write_u8(0).unwrap(); // reserved
        buf.write_u16::<LittleEndian>(self.warning_count).unwrap();
        buf
    }
}
