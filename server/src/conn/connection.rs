//! The per-connection state machine: handshake/auth, then the
//! command-phase dispatch loop until `COM_QUIT` or the stream
//! closes.

use std::collections::HashSet;
use std::sync::Arc;

use rand::Rng;
use tokio::io::{AsyncRead, AsyncWrite};
use tracing::{info, instrument, warn};

use common::err::MysqlError;

use crate::admin::{self, AdminOutcome, SessionVars};
use crate::auth::{AuthEngine, Decision};
use crate::conn::prepared_statement::{CursorState, StatementRegistry};
use crate::conn::registry::ConnectionRegistry;
use crate::declar::capability_flags::Capabilities;
use crate::declar::charset::CharacterSet;
use crate::declar::column_type::ColumnType;
use crate::declar::command::Command;
use crate::declar::status_flags::StatusFlags;
use crate::framer::PacketFramer;
use crate::packet::auth_switch::{AuthMoreData, AuthSwitchRequest};
use crate::packet::column_definition::ColumnDefinition41;
use crate::packet::command_request::{
    ComChangeUser, ComQuery, ComStmtExecute, ComStmtFetch, ComStmtId, ComStmtPrepare,
    ComStmtSendLongData,
};
use crate::packet::eof::ok_or_eof;
use crate::packet::err::ErrPacket;
use crate::packet::handshake::{HandshakeResponse41, HandshakeV10};
use crate::packet::ok::OkPacket;
use crate::packet::resultset::{encode_binary_row, encode_column_count, encode_text_row, ResultSet, Value};
use crate::packet::stmt::ComStmtPrepareOk;
use crate::session::{AuthInfo, IdentityProvider, QueryOutcome, Session, User};
use crate::AUTH_PLUGIN_DATA_LEN;

/// Statically configured, connection-independent server parameters.
pub struct ServerParams {
    pub server_version: String,
    pub identity_provider: Arc<dyn IdentityProvider>,
    pub auth_engine: Arc<AuthEngine>,
    pub connection_registry: Arc<ConnectionRegistry>,
}

fn random_scramble() -> [u8; AUTH_PLUGIN_DATA_LEN] {
    let mut scramble = [0u8; AUTH_PLUGIN_DATA_LEN];
    let mut rng = rand::thread_rng();
    for byte in scramble.iter_mut() {
        // Nonce bytes must never be NUL; a NUL half-way through would
        // truncate the scramble wherever a client reads it as a C string.
        *byte = rng.gen_range(1..=255);
    }
    scramble
}

/// Drives one accepted connection end to end: handshake, authentication,
/// then the command loop. Returns once the client disconnects or the
/// connection is torn down by a protocol error.
#[instrument(skip(stream, params, session), fields(connection_id))]
pub async fn handle_connection<S>(
    stream: S,
    connection_id: u32,
    params: &ServerParams,
    mut session: Box<dyn Session>,
) -> Result<(), MysqlError>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let mut framer = PacketFramer::new(stream);
    let server_caps = Capabilities::server_default();

    let scramble = random_scramble();
    let handshake = HandshakeV10 {
        capabilities: server_caps,
        charset: CharacterSet::default(),
        server_version: &params.server_version,
        connection_id,
        auth_plugin_data: scramble,
        status_flags: StatusFlags::AUTOCOMMIT,
        auth_plugin_name: params.auth_engine.default_plugin_name(),
    };
    let handshake_bytes = match handshake.serialize() {
        Ok(bytes) => bytes,
        Err(e) => {
            let err = MysqlError::HandshakeError(e.to_string());
            framer.write_packet(&ErrPacket::from_error(&err).serialize()).await?;
            return Err(err);
        }
    };
    framer.write_packet(&handshake_bytes).await?;

    let response_packet = framer.read_packet().await?;
    let response = match HandshakeResponse41::parse(&response_packet) {
        Ok(r) => r,
        Err(e) => {
            let err = MysqlError::HandshakeError(e.to_string());
            framer.write_packet(&ErrPacket::from_error(&err).serialize()).await?;
            return Err(err);
        }
    };
    let negotiated = server_caps & response.client_capabilities;

    let user = match params.identity_provider.get_user(&response.username) {
        Some(user) => user,
        None => {
            let err = MysqlError::UserDoesNotExist(response.username.clone());
            framer.write_packet(&ErrPacket::from_error(&err).serialize()).await?;
            return Err(err);
        }
    };

    let assigned_plugin = params
        .identity_provider
        .plugin(&user.username)
        .unwrap_or_else(|| params.auth_engine.default_plugin_name().to_string());
    let client_plugin = response
        .client_plugin
        .clone()
        .unwrap_or_else(|| params.auth_engine.default_plugin_name().to_string());

    let authenticated_as = match authenticate(
        &mut framer,
        params,
        &user,
        &assigned_plugin,
        &client_plugin,
        scramble,
        response.auth_response.clone(),
    )
    .await
    {
        Ok(name) => name,
        Err(e) => {
            framer.write_packet(&ErrPacket::from_error(&e).serialize()).await?;
            return Err(e);
        }
    };

    // Sequence ids run continuously through the whole handshake/auth
    // exchange; they only reset to 0 once the command phase starts, which
    // the dispatch loop below does on every iteration.
    framer
        .write_packet(&OkPacket::new(0, 0, StatusFlags::AUTOCOMMIT).serialize(negotiated))
        .await?;

    let database = response.database.clone().or_else(|| user.default_database.clone());
    let mut vars = SessionVars::new(&authenticated_as, &params.server_version);
    vars.current_database = database.clone();

    session
        .init(&AuthInfo {
            username: authenticated_as.clone(),
            database,
            client_plugin: response.client_plugin.clone(),
            connect_attrs: response.connect_attrs.clone(),
        })
        .await?;

    info!(connection_id, user = %authenticated_as, "authenticated");

    let mut statements = StatementRegistry::new();
    let status = StatusFlags::AUTOCOMMIT;

    loop {
        framer.reset_seq();
        let packet = match framer.read_packet().await {
            Ok(p) => p,
            Err(MysqlError::ConnectionClosed) => break,
            Err(e) => return Err(e),
        };
        if packet.is_empty() {
            return Err(MysqlError::Protocol("empty command packet".into()));
        }

        let command_byte = packet[0];
        let body = &packet[1..];

        if command_byte == u8::from(Command::ChangeUser) {
            match handle_change_user(&mut framer, params, body, negotiated, &scramble, &mut vars, session.as_mut()).await
            {
                Ok(new_username) => {
                    info!(connection_id, user = %new_username, "changed user");
                    framer.write_packet(&OkPacket::new(0, 0, status).serialize(negotiated)).await?;
                }
                Err(e) => {
                    warn!(connection_id, error = %e, "change user failed");
                    framer.write_packet(&ErrPacket::from_error(&e).serialize()).await?;
                }
            }
            continue;
        }

        let mut frames = Vec::new();
        let outcome = dispatch(
            command_byte,
            body,
            negotiated,
            status,
            &mut vars,
            &mut statements,
            session.as_mut(),
            &mut frames,
        )
        .await;

        for frame in frames {
            framer.write_packet(&frame).await?;
        }

        match outcome {
            Ok(DispatchResult::Quit) => break,
            Ok(DispatchResult::Continue) => {}
            Err(e) => {
                warn!(connection_id, error = %e, "command failed");
                framer.write_packet(&ErrPacket::from_error(&e).serialize()).await?;
            }
        }
    }

    session.close().await;
    params.connection_registry.release(connection_id);
    Ok(())
}

/// Runs the plugin decision loop for one identity: resolves which plugin
/// governs `user`, takes the direct path unless that plugin actually
/// requires a client-announced name the client didn't send, then drives
/// `start`/`advance` until a terminal decision. Returns the name the
/// plugin authenticated the connection as. Used for the initial handshake
/// and for `COM_CHANGE_USER`'s re-authentication; neither gets a fast
/// path that skips this.
async fn authenticate<S>(
    framer: &mut PacketFramer<S>,
    params: &ServerParams,
    user: &User,
    assigned_plugin: &str,
    client_plugin: &str,
    scramble: [u8; AUTH_PLUGIN_DATA_LEN],
    initial_response: Vec<u8>,
) -> Result<String, MysqlError>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let plugin = params
        .auth_engine
        .plugin(assigned_plugin)
        .ok_or_else(|| MysqlError::NotSupportedYet(format!("auth plugin {assigned_plugin}")))?;

    let needs_switch = match plugin.client_plugin_name() {
        Some(required) => required != client_plugin,
        None => false,
    };

    let (mut effective_scramble, mut auth_response) = (scramble.to_vec(), initial_response);
    if needs_switch {
        let switch_scramble = random_scramble();
        framer
            .write_packet(
                &AuthSwitchRequest {
                    plugin_name: assigned_plugin,
                    auth_plugin_data: &switch_scramble,
                }
                .serialize(),
            )
            .await?;
        auth_response = framer.read_packet().await?;
        effective_scramble = switch_scramble.to_vec();
    }

    let mut decision = plugin.start(user, &effective_scramble, &auth_response);
    loop {
        match decision {
            Decision::Success(as_user) => return Ok(as_user.unwrap_or_else(|| user.username.clone())),
            Decision::Forbidden(detail) => return Err(MysqlError::access_denied(&user.username, detail)),
            Decision::Challenge(data) => {
                framer.write_packet(&AuthMoreData { data: &data }.serialize()).await?;
                let next = framer.read_packet().await?;
                decision = plugin.advance(user, &effective_scramble, &next);
            }
        }
    }
}

/// `COM_CHANGE_USER`: re-runs the full authentication engine against the
/// new username with no fast path, swapping the session identity only once
/// it succeeds. The connection keeps its prior identity on failure.
async fn handle_change_user<S>(
    framer: &mut PacketFramer<S>,
    params: &ServerParams,
    body: &[u8],
    negotiated: Capabilities,
    scramble: &[u8; AUTH_PLUGIN_DATA_LEN],
    vars: &mut SessionVars,
    session: &mut dyn Session,
) -> Result<String, MysqlError>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let request = ComChangeUser::parse(body, negotiated)?;

    let user = params
        .identity_provider
        .get_user(&request.username)
        .ok_or_else(|| MysqlError::UserDoesNotExist(request.username.clone()))?;

    let assigned_plugin = params
        .identity_provider
        .plugin(&user.username)
        .unwrap_or_else(|| params.auth_engine.default_plugin_name().to_string());
    let client_plugin = request
        .client_plugin
        .clone()
        .unwrap_or_else(|| params.auth_engine.default_plugin_name().to_string());

    let authenticated_as = authenticate(
        framer,
        params,
        &user,
        &assigned_plugin,
        &client_plugin,
        *scramble,
        request.auth_response.clone(),
    )
    .await?;

    vars.username = authenticated_as.clone();
    vars.current_database = request.database.clone();
    session
        .init(&AuthInfo {
            username: authenticated_as.clone(),
            database: request.database,
            client_plugin: request.client_plugin,
            connect_attrs: std::collections::HashMap::new(),
        })
        .await?;

    Ok(authenticated_as)
}

enum DispatchResult {
    Quit,
    Continue,
}

#[allow(clippy::too_many_arguments)]
async fn dispatch(
    command_byte: u8,
    body: &[u8],
    negotiated: Capabilities,
    status: StatusFlags,
    vars: &mut SessionVars,
    statements: &mut StatementRegistry,
    session: &mut dyn Session,
    frames: &mut Vec<Vec<u8>>,
) -> Result<DispatchResult, MysqlError> {
    let command = Command::try_from(command_byte).map_err(|_| MysqlError::UnknownCommand)?;

    match command {
        Command::Quit => Ok(DispatchResult::Quit),

        Command::Ping | Command::Debug => {
            frames.push(OkPacket::new(0, 0, status).serialize(negotiated));
            Ok(DispatchResult::Continue)
        }

        // COM_RESET_CONNECTION is a no-op here: it acknowledges but does not
        // clear prepared statements or session variables, matching the
        // upstream behavior this server tracks rather than the stricter
        // reset a client might expect.
        Command::ResetConnection => {
            frames.push(OkPacket::new(0, 0, status).serialize(negotiated));
            Ok(DispatchResult::Continue)
        }

        Command::ChangeUser => {
            unreachable!("COM_CHANGE_USER is intercepted before dispatch, since it needs the framer")
        }

        Command::Query => {
            let query = ComQuery::parse(body, negotiated)?;
            if let Some(outcome) = admin::try_handle(&query.query, vars) {
                emit_admin_outcome(outcome, negotiated, status, frames);
            } else {
                let sql = admin::substitute_variables(&query.query, vars);
                let outcome = session.query(&sql, &[], &query.attributes).await?;
                emit_query_outcome(outcome, negotiated, status, false, frames);
            }
            Ok(DispatchResult::Continue)
        }

        Command::StmtPrepare => {
            let request = ComStmtPrepare::parse(body)?;
            let param_count = request.query.matches('?').count() as u16;
            let id = statements.prepare(request.query, param_count);
            frames.push(
                ComStmtPrepareOk {
                    statement_id: id,
                    num_columns: 0,
                    num_params: param_count,
                    warning_count: 0,
                }
                .serialize(),
            );
            for _ in 0..param_count {
                frames.push(placeholder_param_column().serialize());
            }
            if param_count > 0 && !negotiated.contains(Capabilities::DEPRECATE_EOF) {
                frames.push(ok_or_eof(negotiated, 0, status));
            }
            Ok(DispatchResult::Continue)
        }

        Command::StmtExecute => {
            let statement_id = u32::from_le_bytes(
                body.get(0..4)
                    .ok_or_else(|| MysqlError::Protocol("short execute packet".into()))?
                    .try_into()
                    .unwrap(),
            );
            let statement = statements
                .get_mut(statement_id)
                .ok_or(MysqlError::UnknownProcedure(statement_id))?;
            let long_data_keys: HashSet<u16> = statement.long_data.keys().copied().collect();
            let request = ComStmtExecute::parse(body, statement.param_count as usize, &long_data_keys)?;

            let mut params = request.params;
            for (idx, buf) in &statement.long_data {
                if let Some(slot) = params.get_mut(*idx as usize) {
                    *slot = Value::Bytes(buf.clone());
                }
            }

            let cursor_requested = request.flags & 0x01 != 0;
            let outcome = session.query(&statement.query, &params, &[]).await?;

            match outcome {
                QueryOutcome::Rows(result) if cursor_requested => {
                    frames.push(encode_column_count(result.columns.len()));
                    for column in &result.columns {
                        frames.push(
                            ColumnDefinition41 {
                                schema: vars.current_database.as_deref().unwrap_or(""),
                                table: "",
                                org_table: "",
                                name: &column.name,
                                org_name: &column.name,
                                charset: column.charset,
                                column_length: 0,
                                column_type: column.column_type,
                                flags: 0,
                                decimals: 0,
                            }
                            .serialize(),
                        );
                    }
                    if !negotiated.contains(Capabilities::DEPRECATE_EOF) {
                        frames.push(ok_or_eof(negotiated, 0, status | StatusFlags::CURSOR_EXISTS));
                    }
                    statement.cursor = Some(CursorState {
                        columns: result.columns,
                        rows: result.rows.into_iter(),
                    });
                }
                other => emit_query_outcome(other, negotiated, status, true, frames),
            }
            Ok(DispatchResult::Continue)
        }

        Command::StmtSendLongData => {
            let request = ComStmtSendLongData::parse(body)?;
            if let Some(statement) = statements.get_mut(request.statement_id) {
                statement
                    .long_data
                    .entry(request.param_id)
                    .or_default()
                    .extend_from_slice(&request.data);
            }
            Ok(DispatchResult::Continue)
        }

        Command::StmtFetch => {
            let request = ComStmtFetch::parse(body)?;
            let statement = statements
                .get_mut(request.statement_id)
                .ok_or(MysqlError::UnknownProcedure(request.statement_id))?;
            let cursor = statement
                .cursor
                .as_mut()
                .ok_or_else(|| MysqlError::Protocol("fetch on a statement with no open cursor".into()))?;

            let mut sent = 0u32;
            let columns = cursor.columns.clone();
            while sent < request.num_rows {
                match cursor.rows.next() {
                    Some(row) => {
                        frames.push(encode_binary_row(&columns, &row));
                        sent += 1;
                    }
                    None => break,
                }
            }

            let exhausted = cursor.rows.len() == 0;
            let terminal_status = if exhausted {
                status | StatusFlags::LAST_ROW_SENT
            } else {
                status | StatusFlags::CURSOR_EXISTS
            };
            frames.push(ok_or_eof(negotiated, 0, terminal_status));
            if exhausted {
                statement.cursor = None;
            }
            Ok(DispatchResult::Continue)
        }

        Command::StmtClose => {
            let request = ComStmtId::parse(body)?;
            statements.remove(request.statement_id);
            Ok(DispatchResult::Continue)
        }

        Command::StmtReset => {
            let request = ComStmtId::parse(body)?;
            if let Some(statement) = statements.get_mut(request.statement_id) {
                statement.reset();
            }
            frames.push(OkPacket::new(0, 0, status).serialize(negotiated));
            Ok(DispatchResult::Continue)
        }
    }
}

/// Placeholder `ColumnDefinition41` for a bound parameter. This server
/// infers only the parameter *count* from `?` markers at prepare time, not
/// real types, since that requires a SQL parser the embedded `Session`
/// owns, not this crate.
fn placeholder_param_column() -> ColumnDefinition41<'static> {
    ColumnDefinition41 {
        schema: "",
        table: "",
        org_table: "",
        name: "?",
        org_name: "?",
        charset: CharacterSet::Binary,
        column_length: 0,
        column_type: ColumnType::VarString,
        flags: 0,
        decimals: 0,
    }
}

fn emit_admin_outcome(
    outcome: AdminOutcome,
    negotiated: Capabilities,
    status: StatusFlags,
    frames: &mut Vec<Vec<u8>>,
) {
    match outcome {
        AdminOutcome::Ok => frames.push(OkPacket::new(0, 0, status).serialize(negotiated)),
        AdminOutcome::Rows(result) => emit_text_result(result, negotiated, status, frames),
    }
}

fn emit_query_outcome(
    outcome: QueryOutcome,
    negotiated: Capabilities,
    status: StatusFlags,
    binary: bool,
    frames: &mut Vec<Vec<u8>>,
) {
    match outcome {
        QueryOutcome::Affected {
            affected_rows,
            last_insert_id,
            warnings,
        } => {
            let mut ok = OkPacket::new(affected_rows, last_insert_id, status);
            ok.warnings = warnings;
            frames.push(ok.serialize(negotiated));
        }
        QueryOutcome::Rows(result) => {
            if binary {
                emit_binary_result(result, negotiated, status, frames);
            } else {
                emit_text_result(result, negotiated, status, frames);
            }
        }
    }
}

fn push_column_definitions(columns: &[crate::packet::resultset::ColumnDescriptor], frames: &mut Vec<Vec<u8>>) {
    for column in columns {
        frames.push(
            ColumnDefinition41 {
                schema: "",
                table: "",
                org_table: "",
                name: &column.name,
                org_name: &column.name,
                charset: column.charset,
                column_length: 0,
                column_type: column.column_type,
                flags: 0,
                decimals: 0,
            }
            .serialize(),
        );
    }
}

fn emit_text_result(result: ResultSet, negotiated: Capabilities, status: StatusFlags, frames: &mut Vec<Vec<u8>>) {
    frames.push(encode_column_count(result.columns.len()));
    push_column_definitions(&result.columns, frames);
    if !negotiated.contains(Capabilities::DEPRECATE_EOF) {
        frames.push(ok_or_eof(negotiated, 0, status));
    }
    for row in &result.rows {
        frames.push(encode_text_row(row));
    }
    frames.push(ok_or_eof(negotiated, 0, status));
}

fn emit_binary_result(result: ResultSet, negotiated: Capabilities, status: StatusFlags, frames: &mut Vec<Vec<u8>>) {
    frames.push(encode_column_count(result.columns.len()));
    push_column_definitions(&result.columns, frames);
    if !negotiated.contains(Capabilities::DEPRECATE_EOF) {
        frames.push(ok_or_eof(negotiated, 0, status));
    }
    for row in &result.rows {
        frames.push(encode_binary_row(&result.columns, row));
    }
    frames.push(ok_or_eof(negotiated, 0, status));
}
