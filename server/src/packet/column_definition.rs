use byteorder::{LittleEndian, WriteBytesExt};

use crate::codec::write_lenenc_string;
use crate::declar::charset::CharacterSet;
use crate::declar::column_type::ColumnType;

/// `Protocol::ColumnDefinition41`, one per column in a result-set header.
pub struct ColumnDefinition41<'a> {
    pub schema: &'a str,
    pub table: &'a str,
    pub org_table: &'a str,
    pub name: &'a str,
    pub org_name: &'a str,
    pub charset: CharacterSet,
    pub column_length: u32,
    pub column_type: ColumnType,
    pub flags: u16,
    pub decimals: u8,
}

impl<'a> ColumnDefinition41<'a> {
    pub fn serialize(&self) -> Vec<u8> {
        let mut buf = Vec::new();
        write_lenenc_string(&mut buf, "def").unwrap();
        write_lenenc_string(&mut buf, self.schema).unwrap();
        write_lenenc_string(&mut buf, self.table).unwrap();
        write_lenenc_string(&mut buf, self.org_table).unwrap();
        write_lenenc_string(&mut buf, self.name).unwrap();
        write_lenenc_string(&mut buf, self.org_name).unwrap();

        buf.write_u8(0x0c).unwrap(); // length of fixed-length fields, always 12
        buf.write_u16::<LittleEndian>(self.charset.id()).unwrap();
        buf.write_u32::<LittleEndian>(self.column_length).unwrap();
        buf.write_u8(self.column_type.into()).unwrap();
        buf.write_u16::<LittleEndian>(self.flags).unwrap();
        buf.write_u8(self.decimals).unwrap();
        buf.write_u16::<LittleEndian>(0).unwrap(); // filler
        buf
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn fixed_length_block_marker_is_twelve() {
        let col = ColumnDefinition41 {
            schema: "test",
            table: "t",
            org_table: "t",
            name: "id",
            org_name: "id",
            charset: CharacterSet::default(),
            column_length: 11,
            column_type: ColumnType::Long,
            flags: 0,
            decimals: 0,
        };
        let buf = col.serialize();
        assert!(buf.ends_with(&[0, 0]));
        assert!(buf.contains(&0x0c));
    }
}
