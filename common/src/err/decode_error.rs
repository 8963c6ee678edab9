use std::io;
use std::string::FromUtf8Error;

use thiserror::Error;

/// Stable, wire-visible error kinds for the MySQL server protocol engine.
///
/// Each variant carries (via `code`/`sql_state`) the MySQL numeric error
/// code and SQLSTATE that an `ErrPacket` reports for it. Session-reported
/// failures carry their own code/message pair, supplied by the embedding
/// `Session` implementation.
#[derive(Debug, Error)]
pub enum MysqlError {
    #[error("handshake failed: {0}")]
    HandshakeError(String),

    #[error("Access denied for user '{user}'{suffix}")]
    AccessDenied { user: String, suffix: String },

    #[error("User {0} does not exist")]
    UserDoesNotExist(String),

    #[error("Unknown command")]
    UnknownCommand,

    #[error("Unknown prepared statement handler ({0})")]
    UnknownProcedure(u32),

    #[error("{0}")]
    ParseError(String),

    #[error("{0}")]
    NotSupportedYet(String),

    #[error("connection closed")]
    ConnectionClosed,

    #[error("too many connections")]
    MaxConnectionsExceeded,

    #[error("protocol error: {0}")]
    Protocol(String),

    #[error("invalid character encoding: {0}")]
    Encoding(#[from] FromUtf8Error),

    #[error(transparent)]
    Io(#[from] io::Error),

    /// Opaque failure reported by the external session collaborator.
    #[error("{message}")]
    Session { code: u16, message: String },

    #[error("{0}")]
    Other(String),
}

impl MysqlError {
    /// Numeric MySQL error code surfaced on the wire in an `ErrPacket`.
    pub fn code(&self) -> u16 {
        match self {
            MysqlError::HandshakeError(_) => 1043,
            MysqlError::AccessDenied { .. } => 1045,
            MysqlError::UserDoesNotExist(_) => 1449,
            MysqlError::UnknownCommand => 1047,
            MysqlError::UnknownProcedure(_) => 1243,
            MysqlError::ParseError(_) => 1064,
            MysqlError::NotSupportedYet(_) => 1235,
            MysqlError::ConnectionClosed => 2013,
            MysqlError::MaxConnectionsExceeded => 1040,
            MysqlError::Protocol(_) => 2027,
            MysqlError::Encoding(_) => 1366,
            MysqlError::Io(_) => 2013,
            MysqlError::Session { code, .. } => *code,
            MysqlError::Other(_) => 1105,
        }
    }

    /// Five-character SQLSTATE associated with the error kind.
    pub fn sql_state(&self) -> &'static str {
        match self {
            MysqlError::AccessDenied { .. } | MysqlError::UserDoesNotExist(_) => "28000",
            MysqlError::ParseError(_) => "42000",
            _ => "HY000",
        }
    }

    pub fn access_denied(user: &str, message: Option<String>) -> Self {
        match message {
            Some(msg) => MysqlError::AccessDenied {
                user: user.to_string(),
                suffix: format!(": {msg}"),
            },
            None => MysqlError::AccessDenied {
                user: user.to_string(),
                suffix: " (using password: YES)".to_string(),
            },
        }
    }
}

#[cfg(test)]
mod test {
    use super::MysqlError;

    #[test]
    fn access_denied_code_matches_mysql() {
        let err = MysqlError::access_denied("root", None);
        assert_eq!(err.code(), 1045);
        assert_eq!(err.sql_state(), "28000");
        assert!(err.to_string().contains("Access denied"));
    }

    #[test]
    fn user_does_not_exist_message() {
        let err = MysqlError::UserDoesNotExist("bob".to_string());
        assert_eq!(err.to_string(), "User bob does not exist");
    }
}
