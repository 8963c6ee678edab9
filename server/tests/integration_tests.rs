//! End-to-end tests driving `handle_connection` over an in-memory duplex
//! stream, with a small hand-rolled client-side encoder standing in for a
//! real MySQL client.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use byteorder::{LittleEndian, WriteBytesExt};
use sha1::{Digest, Sha1};
use tokio::io::duplex;

use common::err::MysqlError;
use server::auth::{AuthEngine, CLEAR_PASSWORD, MYSQL_NATIVE_PASSWORD, TRUST};
use server::conn::connection::{handle_connection, ServerParams};
use server::conn::registry::ConnectionRegistry;
use server::declar::capability_flags::Capabilities;
use server::declar::charset::CharacterSet;
use server::declar::column_type::ColumnType;
use server::declar::status_flags::StatusFlags;
use server::framer::PacketFramer;
use server::packet::resultset::{ColumnDescriptor, ResultSet, Value};
use server::session::{AuthInfo, IdentityProvider, QueryOutcome, Session, User};

struct FixedIdentityProvider {
    users: HashMap<String, User>,
}

impl FixedIdentityProvider {
    fn new(users: Vec<User>) -> Self {
        FixedIdentityProvider {
            users: users.into_iter().map(|u| (u.username.clone(), u)).collect(),
        }
    }
}

impl IdentityProvider for FixedIdentityProvider {
    fn default_plugin(&self) -> &str {
        MYSQL_NATIVE_PASSWORD
    }

    fn plugin(&self, username: &str) -> Option<String> {
        self.users.get(username).map(|u| u.plugin.clone())
    }

    fn get_user(&self, username: &str) -> Option<User> {
        self.users.get(username).cloned()
    }
}

/// Records every `query()` call and answers from a canned table keyed by
/// exact SQL text, falling back to echoing the SQL back as a single row.
struct RecordingSession {
    calls: Arc<Mutex<Vec<(String, Vec<Value>)>>>,
    canned: HashMap<String, Vec<Vec<Value>>>,
}

impl RecordingSession {
    fn new(calls: Arc<Mutex<Vec<(String, Vec<Value>)>>>, canned: HashMap<String, Vec<Vec<Value>>>) -> Self {
        RecordingSession { calls, canned }
    }
}

#[async_trait]
impl Session for RecordingSession {
    async fn init(&mut self, _auth: &AuthInfo) -> Result<(), MysqlError> {
        Ok(())
    }

    async fn query(
        &mut self,
        sql: &str,
        params: &[Value],
        _attributes: &[(String, Value)],
    ) -> Result<QueryOutcome, MysqlError> {
        self.calls.lock().unwrap().push((sql.to_string(), params.to_vec()));

        if let Some(rows) = self.canned.get(sql) {
            let width = rows.first().map(|r| r.len()).unwrap_or(1);
            let columns = (0..width)
                .map(|i| ColumnDescriptor {
                    name: format!("col{i}"),
                    column_type: ColumnType::VarString,
                    charset: CharacterSet::default(),
                })
                .collect();
            return Ok(QueryOutcome::Rows(ResultSet {
                columns,
                rows: rows.clone(),
            }));
        }

        Ok(QueryOutcome::Rows(ResultSet {
            columns: vec![ColumnDescriptor {
                name: "echo".to_string(),
                column_type: ColumnType::VarString,
                charset: CharacterSet::default(),
            }],
            rows: vec![vec![Value::Str(sql.to_string())]],
        }))
    }

    async fn close(&mut self) {}
}

fn sha1(data: &[u8]) -> Vec<u8> {
    let mut hasher = Sha1::new();
    hasher.update(data);
    hasher.finalize().to_vec()
}

fn xor(a: &[u8], b: &[u8]) -> Vec<u8> {
    a.iter().zip(b.iter().cycle()).map(|(x, y)| x ^ y).collect()
}

/// Replicates the client-side `mysql_native_password` computation:
/// `SHA1(password) XOR SHA1(scramble || SHA1(SHA1(password)))`.
fn native_password_response(scramble: &[u8], password: &[u8]) -> Vec<u8> {
    if password.is_empty() {
        return Vec::new();
    }
    let stage1 = sha1(password);
    let stored_hash = sha1(&stage1);
    let mixin = sha1(&[scramble, stored_hash.as_slice()].concat());
    xor(&stage1, &mixin)
}

fn write_null_term(buf: &mut Vec<u8>, s: &str) {
    buf.extend_from_slice(s.as_bytes());
    buf.push(0);
}

fn handshake_response(
    capabilities: Capabilities,
    username: &str,
    auth_response: &[u8],
    database: Option<&str>,
    client_plugin: Option<&str>,
) -> Vec<u8> {
    let mut buf = Vec::new();
    buf.write_u32::<LittleEndian>(capabilities.bits()).unwrap();
    buf.write_u32::<LittleEndian>(16_777_216).unwrap();
    buf.write_u8(45).unwrap();
    buf.extend_from_slice(&[0u8; 23]);
    write_null_term(&mut buf, username);

    buf.push(auth_response.len() as u8);
    buf.extend_from_slice(auth_response);

    if let Some(db) = database {
        write_null_term(&mut buf, db);
    }
    if let Some(plugin) = client_plugin {
        write_null_term(&mut buf, plugin);
    }
    buf
}

/// Parses just enough of the serialized `HandshakeV10` to recover the
/// 20-byte scramble (8 bytes up front, 12 more past the reserved block).
fn scramble_from_handshake(packet: &[u8]) -> Vec<u8> {
    let mut i = 1; // protocol version
    while packet[i] != 0 {
        i += 1;
    }
    i += 1; // server version terminator
    i += 4; // connection id
    let mut scramble = packet[i..i + 8].to_vec();
    i += 8 + 1; // first half + filler
    i += 2 + 1 + 2 + 2; // caps low, charset, status, caps high
    let auth_plugin_data_len = packet[i] as usize;
    i += 1 + 10; // length byte + reserved
    let second_half_len = (auth_plugin_data_len - 8).max(13) - 1;
    scramble.extend_from_slice(&packet[i..i + second_half_len]);
    scramble
}

const CLIENT_CAPS: u32 = 0x0000_0001 // LONG_PASSWORD
    | 0x0000_0008 // CONNECT_WITH_DB
    | 0x0000_0200 // PROTOCOL_41
    | 0x0000_2000 // TRANSACTIONS
    | 0x0000_8000 // SECURE_CONNECTION
    | 0x0008_0000; // PLUGIN_AUTH

fn client_capabilities() -> Capabilities {
    Capabilities::from_bits_truncate(CLIENT_CAPS)
}

async fn spawn_server(
    provider: FixedIdentityProvider,
    session: RecordingSession,
) -> (
    PacketFramer<tokio::io::DuplexStream>,
    tokio::task::JoinHandle<Result<(), MysqlError>>,
) {
    let (client, server_stream) = duplex(64 * 1024);
    let params = ServerParams {
        server_version: "8.0.34-mysql-server-rs".to_string(),
        identity_provider: Arc::new(provider),
        auth_engine: Arc::new(AuthEngine::new()),
        connection_registry: Arc::new(ConnectionRegistry::new(1)),
    };

    let handle = tokio::spawn(async move { handle_connection(server_stream, 1, &params, Box::new(session)).await });

    (PacketFramer::new(client), handle)
}

async fn authenticate(
    provider: FixedIdentityProvider,
    session: RecordingSession,
    username: &str,
) -> (
    PacketFramer<tokio::io::DuplexStream>,
    tokio::task::JoinHandle<Result<(), MysqlError>>,
) {
    let (mut client, handle) = spawn_server(provider, session).await;
    let _handshake = client.read_packet().await.unwrap();
    client
        .write_packet(&handshake_response(client_capabilities(), username, b"", None, Some(TRUST)))
        .await
        .unwrap();
    let ok = client.read_packet().await.unwrap();
    assert_eq!(ok[0], 0x00);
    (client, handle)
}

#[tokio::test]
async fn trust_plugin_accepts_any_response_and_answers_select_user() {
    let provider = FixedIdentityProvider::new(vec![User {
        username: "levon".to_string(),
        credential: Vec::new(),
        plugin: TRUST.to_string(),
        default_database: None,
    }]);
    let calls = Arc::new(Mutex::new(Vec::new()));
    let session = RecordingSession::new(calls, HashMap::new());
    let (mut client, _handle) = authenticate(provider, session, "levon").await;

    client.reset_seq();
    client
        .write_packet(&[0x03, b'S', b'E', b'L', b'E', b'C', b'T', b' ', b'U', b'S', b'E', b'R', b'(', b')'])
        .await
        .unwrap();

    let column_count = client.read_packet().await.unwrap();
    assert_eq!(column_count[0], 1);
    let _column_def = client.read_packet().await.unwrap();
    let eof = client.read_packet().await.unwrap();
    assert_eq!(eof[0], 0xFE);
    let row = client.read_packet().await.unwrap();
    let text = String::from_utf8(row[1..].to_vec()).unwrap();
    assert!(text.starts_with("levon@"));
}

#[tokio::test]
async fn native_password_fast_path_skips_auth_switch() {
    let stored_hash = sha1(&sha1(b"nazareth"));
    let provider = FixedIdentityProvider::new(vec![User {
        username: "rick".to_string(),
        credential: stored_hash,
        plugin: MYSQL_NATIVE_PASSWORD.to_string(),
        default_database: None,
    }]);
    let calls = Arc::new(Mutex::new(Vec::new()));
    let session = RecordingSession::new(calls, HashMap::new());
    let (mut client, _handle) = spawn_server(provider, session).await;

    let handshake = client.read_packet().await.unwrap();
    let scramble = scramble_from_handshake(&handshake);
    let response = native_password_response(&scramble, b"nazareth");

    client
        .write_packet(&handshake_response(
            client_capabilities(),
            "rick",
            &response,
            None,
            Some(MYSQL_NATIVE_PASSWORD),
        ))
        .await
        .unwrap();

    let reply = client.read_packet().await.unwrap();
    assert_eq!(reply[0], 0x00, "matching plugins must go straight to OK, no AuthSwitchRequest");
}

#[tokio::test]
async fn plugin_mismatch_triggers_exactly_one_auth_switch() {
    let provider = FixedIdentityProvider::new(vec![User {
        username: "garth".to_string(),
        credential: b"letmein".to_vec(),
        plugin: CLEAR_PASSWORD.to_string(),
        default_database: None,
    }]);
    let calls = Arc::new(Mutex::new(Vec::new()));
    let session = RecordingSession::new(calls, HashMap::new());
    let (mut client, _handle) = spawn_server(provider, session).await;

    let _handshake = client.read_packet().await.unwrap();
    client
        .write_packet(&handshake_response(
            client_capabilities(),
            "garth",
            b"",
            None,
            Some(MYSQL_NATIVE_PASSWORD),
        ))
        .await
        .unwrap();

    let switch = client.read_packet().await.unwrap();
    assert_eq!(switch[0], 0xFE, "expected AuthSwitchRequest");

    client.write_packet(b"letmein\0").await.unwrap();
    let ok = client.read_packet().await.unwrap();
    assert_eq!(ok[0], 0x00);
}

#[tokio::test]
async fn wrong_password_is_access_denied() {
    let stored_hash = sha1(&sha1(b"correct"));
    let provider = FixedIdentityProvider::new(vec![User {
        username: "richard".to_string(),
        credential: stored_hash,
        plugin: MYSQL_NATIVE_PASSWORD.to_string(),
        default_database: None,
    }]);
    let calls = Arc::new(Mutex::new(Vec::new()));
    let session = RecordingSession::new(calls, HashMap::new());
    let (mut client, handle) = spawn_server(provider, session).await;

    let handshake = client.read_packet().await.unwrap();
    let scramble = scramble_from_handshake(&handshake);
    let response = native_password_response(&scramble, b"wrong");

    client
        .write_packet(&handshake_response(
            client_capabilities(),
            "richard",
            &response,
            None,
            Some(MYSQL_NATIVE_PASSWORD),
        ))
        .await
        .unwrap();

    let err = client.read_packet().await.unwrap();
    assert_eq!(err[0], 0xFF);
    let code = u16::from_le_bytes([err[1], err[2]]);
    assert_eq!(code, 1045);
    assert!(handle.await.unwrap().is_err());
}

#[tokio::test]
async fn unknown_user_gets_user_does_not_exist() {
    let provider = FixedIdentityProvider::new(vec![]);
    let calls = Arc::new(Mutex::new(Vec::new()));
    let session = RecordingSession::new(calls, HashMap::new());
    let (mut client, _handle) = spawn_server(provider, session).await;

    let _handshake = client.read_packet().await.unwrap();
    client
        .write_packet(&handshake_response(client_capabilities(), "nobody", b"", None, Some(MYSQL_NATIVE_PASSWORD)))
        .await
        .unwrap();

    let err = client.read_packet().await.unwrap();
    assert_eq!(err[0], 0xFF);
    let code = u16::from_le_bytes([err[1], err[2]]);
    assert_eq!(code, 1449);
}

#[tokio::test]
async fn prepared_statement_execute_delivers_decoded_params_to_session() {
    let provider = FixedIdentityProvider::new(vec![User {
        username: "anybody".to_string(),
        credential: Vec::new(),
        plugin: TRUST.to_string(),
        default_database: None,
    }]);
    let calls = Arc::new(Mutex::new(Vec::new()));
    let session = RecordingSession::new(Arc::clone(&calls), HashMap::new());
    let (mut client, _handle) = authenticate(provider, session, "anybody").await;

    client.reset_seq();
    let mut prepare = vec![0x16];
    prepare.extend_from_slice(b"SELECT ?, ?");
    client.write_packet(&prepare).await.unwrap();

    let prepare_ok = client.read_packet().await.unwrap();
    assert_eq!(prepare_ok[0], 0x00);
    let statement_id = u32::from_le_bytes([prepare_ok[1], prepare_ok[2], prepare_ok[3], prepare_ok[4]]);
    let num_params = u16::from_le_bytes([prepare_ok[7], prepare_ok[8]]);
    assert_eq!(num_params, 2);
    let _param_col_1 = client.read_packet().await.unwrap();
    let _param_col_2 = client.read_packet().await.unwrap();
    let _eof = client.read_packet().await.unwrap();

    client.reset_seq();
    let mut execute = vec![0x17];
    execute.extend_from_slice(&statement_id.to_le_bytes());
    execute.push(0x00); // flags: no cursor
    execute.extend_from_slice(&1u32.to_le_bytes()); // iteration count
    execute.push(0b0000_0000); // null bitmap, 2 params, none null
    execute.push(1); // new_params_bound
    execute.push(0x03); // param 0 type: LONG
    execute.push(0);
    execute.push(0xFD); // param 1 type: VAR_STRING
    execute.push(0);
    execute.extend_from_slice(&42i32.to_le_bytes());
    execute.push(1); // lenenc length 1
    execute.push(b'x');
    client.write_packet(&execute).await.unwrap();

    let _column_count = client.read_packet().await.unwrap();
    let _col_defs = client.read_packet().await.unwrap();
    let _eof_or_ok = client.read_packet().await.unwrap();
    let _row = client.read_packet().await.unwrap();
    let _terminator = client.read_packet().await.unwrap();

    let recorded = calls.lock().unwrap();
    let (sql, params) = recorded.last().unwrap();
    assert_eq!(sql, "SELECT ?, ?");
    assert_eq!(params, &vec![Value::Long(42), Value::Bytes(b"x".to_vec())]);
}

#[tokio::test]
async fn long_data_is_concatenated_before_execute() {
    let provider = FixedIdentityProvider::new(vec![User {
        username: "anybody".to_string(),
        credential: Vec::new(),
        plugin: TRUST.to_string(),
        default_database: None,
    }]);
    let calls = Arc::new(Mutex::new(Vec::new()));
    let session = RecordingSession::new(Arc::clone(&calls), HashMap::new());
    let (mut client, _handle) = authenticate(provider, session, "anybody").await;

    client.reset_seq();
    let mut prepare = vec![0x16];
    prepare.extend_from_slice(b"SELECT ?");
    client.write_packet(&prepare).await.unwrap();
    let prepare_ok = client.read_packet().await.unwrap();
    let statement_id = u32::from_le_bytes([prepare_ok[1], prepare_ok[2], prepare_ok[3], prepare_ok[4]]);
    let _param_col = client.read_packet().await.unwrap();
    let _eof = client.read_packet().await.unwrap();

    for _ in 0..2 {
        client.reset_seq();
        let mut send_long_data = vec![0x18];
        send_long_data.extend_from_slice(&statement_id.to_le_bytes());
        send_long_data.extend_from_slice(&0u16.to_le_bytes());
        send_long_data.extend_from_slice(b"abc");
        client.write_packet(&send_long_data).await.unwrap();
    }

    client.reset_seq();
    let mut execute = vec![0x17];
    execute.extend_from_slice(&statement_id.to_le_bytes());
    execute.push(0x00);
    execute.extend_from_slice(&1u32.to_le_bytes());
    execute.push(0b0000_0000); // null bitmap, 1 param
    execute.push(1); // new_params_bound
    execute.push(0xFC); // type is irrelevant: value is long-data backed
    execute.push(0);
    // no value bytes: the one param is entirely supplied via long data
    client.write_packet(&execute).await.unwrap();

    let _column_count = client.read_packet().await.unwrap();
    let _col_defs = client.read_packet().await.unwrap();
    let _eof_or_ok = client.read_packet().await.unwrap();
    let _row = client.read_packet().await.unwrap();
    let _terminator = client.read_packet().await.unwrap();

    let recorded = calls.lock().unwrap();
    let (_sql, params) = recorded.last().unwrap();
    assert_eq!(params, &vec![Value::Bytes(b"abcabc".to_vec())]);
}

#[tokio::test]
async fn cursor_fetch_drains_rows_then_reports_last_row_sent() {
    let provider = FixedIdentityProvider::new(vec![User {
        username: "anybody".to_string(),
        credential: Vec::new(),
        plugin: TRUST.to_string(),
        default_database: None,
    }]);
    let mut canned = HashMap::new();
    canned.insert(
        "SELECT * FROM numbers".to_string(),
        (0..5).map(|i| vec![Value::Long(i)]).collect(),
    );
    let calls = Arc::new(Mutex::new(Vec::new()));
    let session = RecordingSession::new(calls, canned);
    let (mut client, _handle) = authenticate(provider, session, "anybody").await;

    client.reset_seq();
    let mut prepare = vec![0x16];
    prepare.extend_from_slice(b"SELECT * FROM numbers");
    client.write_packet(&prepare).await.unwrap();
    let prepare_ok = client.read_packet().await.unwrap();
    let statement_id = u32::from_le_bytes([prepare_ok[1], prepare_ok[2], prepare_ok[3], prepare_ok[4]]);

    client.reset_seq();
    let mut execute = vec![0x17];
    execute.extend_from_slice(&statement_id.to_le_bytes());
    execute.push(0x01); // CURSOR_TYPE_READ_ONLY
    execute.extend_from_slice(&1u32.to_le_bytes());
    client.write_packet(&execute).await.unwrap();

    let _column_count = client.read_packet().await.unwrap();
    let _col_def = client.read_packet().await.unwrap();
    let eof = client.read_packet().await.unwrap();
    assert_eq!(eof[0], 0xFE);
    let status = u16::from_le_bytes([eof[3], eof[4]]);
    assert!(status & StatusFlags::CURSOR_EXISTS.bits() != 0);

    client.reset_seq();
    let mut fetch = vec![0x1C];
    fetch.extend_from_slice(&statement_id.to_le_bytes());
    fetch.extend_from_slice(&3u32.to_le_bytes());
    client.write_packet(&fetch).await.unwrap();

    for _ in 0..3 {
        let _row = client.read_packet().await.unwrap();
    }
    let terminator = client.read_packet().await.unwrap();
    assert_eq!(terminator[0], 0xFE);
    let status = u16::from_le_bytes([terminator[3], terminator[4]]);
    assert!(status & StatusFlags::CURSOR_EXISTS.bits() != 0);

    client.reset_seq();
    let mut fetch_more = vec![0x1C];
    fetch_more.extend_from_slice(&statement_id.to_le_bytes());
    fetch_more.extend_from_slice(&3u32.to_le_bytes());
    client.write_packet(&fetch_more).await.unwrap();

    for _ in 0..2 {
        let _row = client.read_packet().await.unwrap();
    }
    let final_terminator = client.read_packet().await.unwrap();
    assert_eq!(final_terminator[0], 0xFE);
    let status = u16::from_le_bytes([final_terminator[3], final_terminator[4]]);
    assert!(status & StatusFlags::LAST_ROW_SENT.bits() != 0);
}

#[tokio::test]
async fn change_user_reauthenticates_and_updates_username() {
    let provider = FixedIdentityProvider::new(vec![
        User {
            username: "first".to_string(),
            credential: Vec::new(),
            plugin: TRUST.to_string(),
            default_database: None,
        },
        User {
            username: "second".to_string(),
            credential: Vec::new(),
            plugin: TRUST.to_string(),
            default_database: None,
        },
    ]);
    let calls = Arc::new(Mutex::new(Vec::new()));
    let session = RecordingSession::new(calls, HashMap::new());
    let (mut client, _handle) = authenticate(provider, session, "first").await;

    client.reset_seq();
    let mut change_user = vec![0x11];
    write_null_term(&mut change_user, "second");
    change_user.push(0); // zero-length auth response
    change_user.push(0); // empty database, null-terminated
    change_user.extend_from_slice(&45u16.to_le_bytes());
    write_null_term(&mut change_user, TRUST);
    client.write_packet(&change_user).await.unwrap();

    let ok = client.read_packet().await.unwrap();
    assert_eq!(ok[0], 0x00, "CHANGE_USER should succeed for a trust-plugin account");
}
