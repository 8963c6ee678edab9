//! Parsers for the command-phase request packets.

use std::io::Cursor;

use byteorder::{LittleEndian, ReadBytesExt};
use common::err::MysqlError;

use crate::codec::{
    read_lenenc_bytes_allow_null, read_lenenc_int, read_lenenc_string, read_null_term_string,
    read_rest_string,
};
use crate::declar::capability_flags::Capabilities;
use crate::packet::resultset::Value;

/// `COM_QUERY`: the SQL text plus, when `CLIENT_QUERY_ATTRIBUTES` is
/// negotiated, a leading block of named query attributes.
pub struct ComQuery {
    pub query: String,
    pub attributes: Vec<(String, Value)>,
}

impl ComQuery {
    pub fn parse(body: &[u8], capabilities: Capabilities) -> Result<Self, MysqlError> {
        let mut cursor = Cursor::new(body);
        let mut attributes = Vec::new();

        if capabilities.contains(Capabilities::QUERY_ATTRIBUTES) {
            let param_count = read_lenenc_int(&mut cursor)?.unwrap_or(0);
            let _param_set_count = read_lenenc_int(&mut cursor)?.unwrap_or(0);
            if param_count > 0 {
                let null_bitmap_len = ((param_count as usize) + 7) / 8;
                let mut null_bitmap = vec![0u8; null_bitmap_len];
                std::io::Read::read_exact(&mut cursor, &mut null_bitmap)?;
                let new_params_bound = cursor.read_u8()?;
                let mut types = Vec::with_capacity(param_count as usize);
                if new_params_bound == 1 {
                    for _ in 0..param_count {
                        let col_type = cursor.read_u8()?;
                        let _flags = cursor.read_u8()?;
                        let name = read_lenenc_string(&mut cursor)?;
                        types.push((col_type, name));
                    }
                }
                for (i, (_col_type, name)) in types.into_iter().enumerate() {
                    let is_null = null_bitmap
                        .get(i / 8)
                        .map(|b| b & (1 << (i % 8)) != 0)
                        .unwrap_or(false);
                    let value = if is_null {
                        Value::Null
                    } else {
                        Value::Bytes(read_lenenc_bytes_allow_null(&mut cursor)?.unwrap_or_default())
                    };
                    attributes.push((name, value));
                }
            }
        }

        let query = read_rest_string(&mut cursor)?;
        Ok(ComQuery { query, attributes })
    }
}

/// `COM_STMT_PREPARE`: raw SQL text with placeholders.
pub struct ComStmtPrepare {
    pub query: String,
}

impl ComStmtPrepare {
    pub fn parse(body: &[u8]) -> Result<Self, MysqlError> {
        let mut cursor = Cursor::new(body);
        Ok(ComStmtPrepare {
            query: read_rest_string(&mut cursor)?,
        })
    }
}

/// `COM_STMT_EXECUTE`: statement id, cursor flags, and bound parameter
/// values, if the statement declares any.
pub struct ComStmtExecute {
    pub statement_id: u32,
    pub flags: u8,
    pub iteration_count: u32,
    pub new_params_bound: bool,
    pub param_types: Vec<(u8, u8)>,
    pub params: Vec<Value>,
}

impl ComStmtExecute {
    /// `long_data_params` lists the indices whose value was instead
    /// accumulated via prior `COM_STMT_SEND_LONG_DATA` calls; the execute
    /// packet carries no value (not even a null-bitmap bit) for them, so
    /// the caller is expected to splice in the buffered bytes afterward.
    pub fn parse(
        body: &[u8],
        param_count: usize,
        long_data_params: &std::collections::HashSet<u16>,
    ) -> Result<Self, MysqlError> {
        let mut cursor = Cursor::new(body);
        let statement_id = cursor.read_u32::<LittleEndian>()?;
        let flags = cursor.read_u8()?;
        let iteration_count = cursor.read_u32::<LittleEndian>()?;

        let mut param_types = Vec::new();
        let mut params = Vec::new();
        let mut new_params_bound = false;

        if param_count > 0 {
            let null_bitmap_len = (param_count + 7) / 8;
            let mut null_bitmap = vec![0u8; null_bitmap_len];
            std::io::Read::read_exact(&mut cursor, &mut null_bitmap)?;
            new_params_bound = cursor.read_u8()? == 1;

            if new_params_bound {
                for _ in 0..param_count {
                    let col_type = cursor.read_u8()?;
                    let unsigned_flag = cursor.read_u8()?;
                    param_types.push((col_type, unsigned_flag));
                }
            }

            for i in 0..param_count {
                if long_data_params.contains(&(i as u16)) {
                    params.push(Value::Null); // placeholder, spliced in by the caller
                    continue;
                }
                let is_null = null_bitmap
                    .get(i / 8)
                    .map(|b| b & (1 << (i % 8)) != 0)
                    .unwrap_or(false);
                if is_null {
                    params.push(Value::Null);
                    continue;
                }
                let col_type = param_types.get(i).map(|(t, _)| *t).unwrap_or(0xFE);
                params.push(read_binary_param(&mut cursor, col_type)?);
            }
        }

        Ok(ComStmtExecute {
            statement_id,
            flags,
            iteration_count,
            new_params_bound,
            param_types,
            params,
        })
    }
}

fn read_binary_param(cursor: &mut Cursor<&[u8]>, col_type: u8) -> Result<Value, MysqlError> {
    use crate::declar::column_type::ColumnType;
    let parsed = ColumnType::try_from(col_type)
        .map_err(|_| MysqlError::Protocol(format!("unknown binary param type 0x{:02x}", col_type)))?;
    let value = match parsed {
        ColumnType::Tiny => Value::Tiny(cursor.read_i8()?),
        ColumnType::Short => Value::Short(cursor.read_i16::<LittleEndian>()?),
        ColumnType::Long => Value::Long(cursor.read_i32::<LittleEndian>()?),
        ColumnType::LongLong => Value::LongLong(cursor.read_i64::<LittleEndian>()?),
        ColumnType::Float => Value::Double(cursor.read_f32::<LittleEndian>()? as f64),
        ColumnType::Double => Value::Double(cursor.read_f64::<LittleEndian>()?),
        ColumnType::Null => Value::Null,
        _ => Value::Bytes(read_lenenc_bytes_allow_null(cursor)?.unwrap_or_default()),
    };
    Ok(value)
}

/// `COM_STMT_SEND_LONG_DATA`: appends raw bytes to a parameter's
/// accumulation buffer; never acknowledged.
pub struct ComStmtSendLongData {
    pub statement_id: u32,
    pub param_id: u16,
    pub data: Vec<u8>,
}

impl ComStmtSendLongData {
    pub fn parse(body: &[u8]) -> Result<Self, MysqlError> {
        let mut cursor = Cursor::new(body);
        let statement_id = cursor.read_u32::<LittleEndian>()?;
        let param_id = cursor.read_u16::<LittleEndian>()?;
        let mut data = Vec::new();
        std::io::Read::read_to_end(&mut cursor, &mut data)?;
        Ok(ComStmtSendLongData {
            statement_id,
            param_id,
            data,
        })
    }
}

/// `COM_STMT_FETCH`: pulls the next `num_rows` from an open cursor.
pub struct ComStmtFetch {
    pub statement_id: u32,
    pub num_rows: u32,
}

impl ComStmtFetch {
    pub fn parse(body: &[u8]) -> Result<Self, MysqlError> {
        let mut cursor = Cursor::new(body);
        Ok(ComStmtFetch {
            statement_id: cursor.read_u32::<LittleEndian>()?,
            num_rows: cursor.read_u32::<LittleEndian>()?,
        })
    }
}

/// `COM_STMT_CLOSE` / `COM_STMT_RESET`: just the statement id.
pub struct ComStmtId {
    pub statement_id: u32,
}

impl ComStmtId {
    pub fn parse(body: &[u8]) -> Result<Self, MysqlError> {
        let mut cursor = Cursor::new(body);
        Ok(ComStmtId {
            statement_id: cursor.read_u32::<LittleEndian>()?,
        })
    }
}

/// `COM_CHANGE_USER`: re-authenticates the live connection as a different
/// user without a fresh handshake.
pub struct ComChangeUser {
    pub username: String,
    pub auth_response: Vec<u8>,
    pub database: Option<String>,
    pub charset: u8,
    pub client_plugin: Option<String>,
}

impl ComChangeUser {
    pub fn parse(body: &[u8], capabilities: Capabilities) -> Result<Self, MysqlError> {
        let mut cursor = Cursor::new(body);
        let username = read_null_term_string(&mut cursor)?;

        let auth_response = if capabilities.contains(Capabilities::SECURE_CONNECTION) {
            let len = cursor.read_u8()? as usize;
            let mut buf = vec![0u8; len];
            std::io::Read::read_exact(&mut cursor, &mut buf)?;
            buf
        } else {
            read_null_term_string(&mut cursor)?.into_bytes()
        };

        let database = read_null_term_string(&mut cursor).ok();
        let charset = if crate::codec::has_remaining(&cursor) {
            cursor.read_u16::<LittleEndian>()? as u8
        } else {
            0
        };
        let client_plugin = if capabilities.contains(Capabilities::PLUGIN_AUTH)
            && crate::codec::has_remaining(&cursor)
        {
            read_null_term_string(&mut cursor).ok()
        } else {
            None
        };

        Ok(ComChangeUser {
            username,
            auth_response,
            database,
            charset,
            client_plugin,
        })
    }
}
