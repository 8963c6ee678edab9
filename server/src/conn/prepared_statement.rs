use std::collections::HashMap;

use crate::packet::resultset::{ColumnDescriptor, Value};

/// A prepared statement's accumulated state between `COM_STMT_PREPARE` and
/// its eventual `COM_STMT_CLOSE`.
pub struct PreparedStatement {
    pub id: u32,
    pub query: String,
    pub param_count: u16,
    /// Buffers accumulated via `COM_STMT_SEND_LONG_DATA`, keyed by
    /// parameter index; merged into the bound parameters at execute time.
    pub long_data: HashMap<u16, Vec<u8>>,
    /// Rows buffered by a cursor-backed `COM_STMT_EXECUTE`, drained by
    /// subsequent `COM_STMT_FETCH` calls.
    pub cursor: Option<CursorState>,
}

pub struct CursorState {
    pub columns: Vec<ColumnDescriptor>,
    pub rows: std::vec::IntoIter<Vec<Value>>,
}

impl PreparedStatement {
    pub fn new(id: u32, query: String, param_count: u16) -> Self {
        PreparedStatement {
            id,
            query,
            param_count,
            long_data: HashMap::new(),
            cursor: None,
        }
    }

    pub fn reset(&mut self) {
        self.long_data.clear();
        self.cursor = None;
    }
}

/// Allocates and stores prepared statements for one connection. Ids skip
/// whichever low 32 bits are still live, wrapping past `u32::MAX` back to
/// 1 — the same discipline `ConnectionRegistry` uses for connection ids,
/// scoped per-connection instead of per-server.
#[derive(Default)]
pub struct StatementRegistry {
    next: u32,
    statements: HashMap<u32, PreparedStatement>,
}

impl StatementRegistry {
    pub fn new() -> Self {
        StatementRegistry {
            next: 1,
            statements: HashMap::new(),
        }
    }

    pub fn prepare(&mut self, query: String, param_count: u16) -> u32 {
        loop {
            let candidate = self.next;
            self.next = self.next.wrapping_add(1);
            if candidate == 0 {
                continue;
            }
            if !self.statements.contains_key(&candidate) {
                self.statements
                    .insert(candidate, PreparedStatement::new(candidate, query, param_count));
                return candidate;
            }
        }
    }

    pub fn get(&self, id: u32) -> Option<&PreparedStatement> {
        self.statements.get(&id)
    }

    pub fn get_mut(&mut self, id: u32) -> Option<&mut PreparedStatement> {
        self.statements.get_mut(&id)
    }

    pub fn remove(&mut self, id: u32) -> Option<PreparedStatement> {
        self.statements.remove(&id)
    }
}
