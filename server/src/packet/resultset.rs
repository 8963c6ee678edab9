//! Text and binary result-set row encoding.

use byteorder::{LittleEndian, WriteBytesExt};

use crate::codec::{write_lenenc_bytes, write_lenenc_int};
use crate::declar::charset::CharacterSet;
use crate::declar::column_type::ColumnType;

/// A single result-set value, independent of wire encoding.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Tiny(i8),
    Short(i16),
    Long(i32),
    LongLong(i64),
    Double(f64),
    Str(String),
    Bytes(Vec<u8>),
}

/// Column metadata carried alongside a result set, independent of the
/// wire-level `ColumnDefinition41` packet shape.
#[derive(Debug, Clone)]
pub struct ColumnDescriptor {
    pub name: String,
    pub column_type: ColumnType,
    pub charset: CharacterSet,
}

/// A fully materialized result set: columns plus rows, ready to be
/// serialized in either text or binary row format.
pub struct ResultSet {
    pub columns: Vec<ColumnDescriptor>,
    pub rows: Vec<Vec<Value>>,
}

fn value_bytes(value: &Value) -> Option<Vec<u8>> {
    match value {
        Value::Null => None,
        Value::Tiny(v) => Some(v.to_string().into_bytes()),
        Value::Short(v) => Some(v.to_string().into_bytes()),
        Value::Long(v) => Some(v.to_string().into_bytes()),
        Value::LongLong(v) => Some(v.to_string().into_bytes()),
        Value::Double(v) => Some(v.to_string().into_bytes()),
        Value::Str(v) => Some(v.clone().into_bytes()),
        Value::Bytes(v) => Some(v.clone()),
    }
}

/// `Text resultset row`: one lenenc-string per column, `0xFB` for NULL.
pub fn encode_text_row(row: &[Value]) -> Vec<u8> {
    let mut buf = Vec::new();
    for value in row {
        match value_bytes(value) {
            Some(bytes) => write_lenenc_bytes(&mut buf, &bytes).unwrap(),
            None => buf.write_u8(crate::codec::LENENC_NULL).unwrap(),
        }
    }
    buf
}

/// `Binary resultset row`: leading `0x00`, a NULL-bitmap offset by 2 bits,
/// then each non-NULL value in its column's binary representation.
pub fn encode_binary_row(columns: &[ColumnDescriptor], row: &[Value]) -> Vec<u8> {
    let mut buf = Vec::new();
    buf.write_u8(0x00).unwrap();

    let bitmap_len = (columns.len() + 7 + 2) / 8;
    let mut bitmap = vec![0u8; bitmap_len];
    for (i, value) in row.iter().enumerate() {
        if matches!(value, Value::Null) {
            let bit_pos = i + 2;
            bitmap[bit_pos / 8] |= 1 << (bit_pos % 8);
        }
    }
    buf.extend_from_slice(&bitmap);

    for value in row.iter() {
        match value {
            Value::Null => {}
            Value::Tiny(v) => buf.write_i8(*v).unwrap(),
            Value::Short(v) => buf.write_i16::<LittleEndian>(*v).unwrap(),
            Value::Long(v) => buf.write_i32::<LittleEndian>(*v).unwrap(),
            Value::LongLong(v) => buf.write_i64::<LittleEndian>(*v).unwrap(),
            Value::Double(v) => buf.write_f64::<LittleEndian>(*v).unwrap(),
            Value::Str(v) => write_lenenc_bytes(&mut buf, v.as_bytes()).unwrap(),
            Value::Bytes(v) => write_lenenc_bytes(&mut buf, v).unwrap(),
        }
    }
    buf
}

/// Writes the lenenc-int column count that opens a result set.
pub fn encode_column_count(columns: usize) -> Vec<u8> {
    let mut buf = Vec::new();
    write_lenenc_int(&mut buf, columns as u64).unwrap();
    buf
}
