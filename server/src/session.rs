//! The embedding boundary: everything a caller supplies to plug real user
//! accounts and real SQL execution into the protocol engine.

use async_trait::async_trait;
use common::err::MysqlError;

use crate::packet::resultset::{ResultSet, Value};

/// A registered account, as handed back by an `IdentityProvider`.
#[derive(Debug, Clone)]
pub struct User {
    pub username: String,
    /// Credential material in whatever shape `plugin` expects: a
    /// `SHA1(SHA1(password))` double hash for `mysql_native_password`, the
    /// plaintext password for `clear_password`, unused for `trust`.
    pub credential: Vec<u8>,
    pub plugin: String,
    pub default_database: Option<String>,
}

/// Identity and connection metadata gathered over the handshake, handed to
/// `Session::init` once authentication succeeds.
#[derive(Debug, Clone)]
pub struct AuthInfo {
    pub username: String,
    pub database: Option<String>,
    pub client_plugin: Option<String>,
    pub connect_attrs: std::collections::HashMap<String, String>,
}

/// Looks up accounts and their authentication plugin assignment. Supplied
/// by the embedder; this crate never stores credentials itself.
pub trait IdentityProvider: Send + Sync {
    /// The plugin assumed for usernames with no explicit assignment.
    fn default_plugin(&self) -> &str;

    /// The plugin a specific, already-known user must authenticate with.
    /// `None` falls back to `default_plugin`.
    fn plugin(&self, username: &str) -> Option<String>;

    fn get_user(&self, username: &str) -> Option<User>;
}

/// A query's outcome, in the shape `Session::query` returns it back to the
/// connection's result-set / OK-packet encoder.
pub enum QueryOutcome {
    Rows(ResultSet),
    Affected {
        affected_rows: u64,
        last_insert_id: u64,
        warnings: u16,
    },
}

/// The external collaborator that actually understands SQL. The protocol
/// engine only frames bytes and manages auth/statement bookkeeping; every
/// query this crate can't answer itself (anything except the admin
/// variables) is delegated here.
#[async_trait]
pub trait Session: Send {
    async fn init(&mut self, auth: &AuthInfo) -> Result<(), MysqlError>;

    async fn query(
        &mut self,
        sql: &str,
        params: &[Value],
        attributes: &[(String, Value)],
    ) -> Result<QueryOutcome, MysqlError>;

    async fn close(&mut self);
}
