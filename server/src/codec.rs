//! Primitive wire encoders/decoders: fixed-width little-endian integers,
//! the length-encoded integer/string forms, and null-terminated strings.

use std::io::{self, Cursor, Read, Write};

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use bytes::Buf;
use common::err::MysqlError;

use crate::NULL_TERMINATOR;

/// Sentinel first byte of a length-encoded integer meaning "NULL value".
pub const LENENC_NULL: u8 = 0xFB;
/// Sentinel first byte reserved for the error-packet marker.
pub const LENENC_ERROR: u8 = 0xFF;

/// Reads a length-encoded integer. Returns `Ok(None)` for the `0xFB` NULL
/// marker, which is only legal inside row values.
pub fn read_lenenc_int(cursor: &mut Cursor<&[u8]>) -> Result<Option<u64>, MysqlError> {
    let first = cursor.read_u8()?;
    match first {
        0..=0xFA => Ok(Some(first as u64)),
        LENENC_NULL => Ok(None),
        0xFC => Ok(Some(cursor.read_u16::<LittleEndian>()? as u64)),
        0xFD => {
            let mut buf = [0u8; 4];
            cursor.read_exact(&mut buf[..3])?;
            Ok(Some(u32::from_le_bytes(buf) as u64))
        }
        0xFE => Ok(Some(cursor.read_u64::<LittleEndian>()?)),
        LENENC_ERROR => Err(MysqlError::Protocol(
            "0xFF is reserved for the error marker, not a length-encoded integer".to_string(),
        )),
        _ => unreachable!(),
    }
}

/// Writes `value` using the shortest length-encoded integer encoding.
pub fn write_lenenc_int<W: Write>(out: &mut W, value: u64) -> io::Result<()> {
    if value < 0xFB {
        out.write_u8(value as u8)
    } else if value <= 0xFFFF {
        out.write_u8(0xFC)?;
        out.write_u16::<LittleEndian>(value as u16)
    } else if value <= 0xFF_FF_FF {
        out.write_u8(0xFD)?;
        out.write_all(&value.to_le_bytes()[..3])
    } else {
        out.write_u8(0xFE)?;
        out.write_u64::<LittleEndian>(value)
    }
}

/// Reads a length-encoded string (lenenc-int length, then raw bytes),
/// rejecting the NULL marker — callers that accept NULL use
/// `read_lenenc_bytes_allow_null`.
pub fn read_lenenc_string(cursor: &mut Cursor<&[u8]>) -> Result<String, MysqlError> {
    let bytes = read_lenenc_bytes(cursor)?;
    String::from_utf8(bytes).map_err(MysqlError::Encoding)
}

pub fn read_lenenc_bytes(cursor: &mut Cursor<&[u8]>) -> Result<Vec<u8>, MysqlError> {
    let len = read_lenenc_int(cursor)?.unwrap_or(0) as usize;
    let mut buf = vec![0u8; len];
    cursor.read_exact(&mut buf)?;
    Ok(buf)
}

/// A row-value column: `None` decodes the `0xFB` NULL marker.
pub fn read_lenenc_bytes_allow_null(
    cursor: &mut Cursor<&[u8]>,
) -> Result<Option<Vec<u8>>, MysqlError> {
    match read_lenenc_int(cursor)? {
        None => Ok(None),
        Some(len) => {
            let mut buf = vec![0u8; len as usize];
            cursor.read_exact(&mut buf)?;
            Ok(Some(buf))
        }
    }
}

pub fn write_lenenc_string<W: Write>(out: &mut W, value: &str) -> io::Result<()> {
    write_lenenc_bytes(out, value.as_bytes())
}

pub fn write_lenenc_bytes<W: Write>(out: &mut W, value: &[u8]) -> io::Result<()> {
    write_lenenc_int(out, value.len() as u64)?;
    out.write_all(value)
}

/// Reads bytes until (and consuming) the first `0x00`.
pub fn read_null_term_string(cursor: &mut Cursor<&[u8]>) -> Result<String, MysqlError> {
    let mut bytes = Vec::new();
    loop {
        let b = cursor.read_u8()?;
        if b == NULL_TERMINATOR {
            break;
        }
        bytes.push(b);
    }
    String::from_utf8(bytes).map_err(MysqlError::Encoding)
}

pub fn write_null_term_string<W: Write>(out: &mut W, value: &str) -> io::Result<()> {
    out.write_all(value.as_bytes())?;
    out.write_u8(NULL_TERMINATOR)
}

/// Reads every remaining byte in the cursor as a fixed-length string.
pub fn read_rest_string(cursor: &mut Cursor<&[u8]>) -> Result<String, MysqlError> {
    let mut bytes = Vec::new();
    cursor.read_to_end(&mut bytes)?;
    String::from_utf8(bytes).map_err(MysqlError::Encoding)
}

pub fn has_remaining(cursor: &Cursor<&[u8]>) -> bool {
    cursor.get_ref().len() as u64 > cursor.position()
}

pub fn remaining(cursor: &Cursor<&[u8]>) -> usize {
    Buf::remaining(cursor)
}
