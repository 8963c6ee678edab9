use num_enum::{IntoPrimitive, TryFromPrimitive};

/// The `MYSQL_TYPE_*` wire enumeration used in `ColumnDefinition41` and to
/// pick a binary-row encoding for `Value`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, IntoPrimitive, TryFromPrimitive)]
#[repr(u8)]
pub enum ColumnType {
    Decimal = 0x00,
    Tiny = 0x01,
    Short = 0x02,
    Long = 0x03,
    Float = 0x04,
    Double = 0x05,
    Null = 0x06,
    LongLong = 0x08,
    Date = 0x0A,
    VarString = 0xFD,
    VarChar = 0x0F,
    Blob = 0xFC,
    String = 0xFE,
}

impl Default for ColumnType {
    fn default() -> Self {
        ColumnType::VarString
    }
}
