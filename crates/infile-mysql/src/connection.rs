//! Synchronous MySQL connection.
//!
//! Covers what bulk loading needs: the login handshake, text-protocol
//! queries and the `LOAD DATA LOCAL INFILE` exchange, in which the server
//! answers the statement with a file request and the client streams the
//! rows back as a sequence of packets closed by an empty one.

// Packet lengths are bounded by MAX_PACKET_SIZE, which fits in u32.
#![allow(clippy::cast_possible_truncation)]

use std::io::{self, Read, Write};
use std::net::{TcpStream, ToSocketAddrs};

use infile_core::{
    ConnectionError, ConnectionErrorKind, Error, ProtocolError, QueryError, QueryErrorKind,
    Result,
};

use crate::auth;
use crate::config::MySqlConfig;
use crate::protocol::{
    Command, ErrPacket, MAX_PACKET_SIZE, OkPacket, PacketHeader, PacketReader, PacketType,
    PacketWriter, capabilities, frame,
};

/// Largest chunk of file data sent per packet.
const INFILE_CHUNK: usize = 64 * 1024;

/// Connection state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// Handshake in progress
    Connecting,
    /// Ready for statements
    Ready,
    /// A statement is in flight
    InQuery,
    /// The stream broke mid-exchange; the connection cannot be reused
    Broken,
    /// `COM_QUIT` was sent
    Closed,
}

/// What the server announced in its initial handshake.
#[derive(Debug, Clone)]
pub struct ServerHandshake {
    pub protocol_version: u8,
    pub server_version: String,
    pub connection_id: u32,
    pub capabilities: u32,
    pub charset: u8,
    pub status_flags: u16,
    pub auth_plugin: String,
    pub scramble: Vec<u8>,
}

/// A synchronous MySQL connection over any byte stream.
///
/// [`MySqlConnection::connect`] opens a TCP connection;
/// [`MySqlConnection::handshake`] logs in over a stream the caller already
/// holds.
pub struct MySqlConnection<S = TcpStream> {
    stream: S,
    state: ConnectionState,
    config: MySqlConfig,
    server: Option<ServerHandshake>,
    client_capabilities: u32,
    sequence_id: u8,
    status_flags: u16,
    affected_rows: u64,
    last_insert_id: u64,
    warnings: u16,
}

impl<S> std::fmt::Debug for MySqlConnection<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MySqlConnection")
            .field("state", &self.state)
            .field(
                "connection_id",
                &self.server.as_ref().map(|s| s.connection_id),
            )
            .field("host", &self.config.host)
            .field("port", &self.config.port)
            .field("database", &self.config.database)
            .finish_non_exhaustive()
    }
}

impl MySqlConnection<TcpStream> {
    /// Open a TCP connection and log in.
    #[tracing::instrument(level = "debug", skip(config), fields(addr = %config.socket_addr()))]
    pub fn connect(config: MySqlConfig) -> Result<Self> {
        let addr = config.socket_addr();
        let addrs = addr.to_socket_addrs().map_err(|e| {
            connect_error(
                ConnectionErrorKind::Connect,
                format!("cannot resolve {addr}: {e}"),
                e,
            )
        })?;

        let mut last_err = None;
        let mut stream = None;
        for candidate in addrs {
            match TcpStream::connect_timeout(&candidate, config.connect_timeout) {
                Ok(s) => {
                    stream = Some(s);
                    break;
                }
                Err(e) => last_err = Some(e),
            }
        }
        let stream = match (stream, last_err) {
            (Some(stream), _) => stream,
            (None, Some(e)) => {
                let kind = if e.kind() == io::ErrorKind::ConnectionRefused {
                    ConnectionErrorKind::Refused
                } else {
                    ConnectionErrorKind::Connect
                };
                return Err(connect_error(
                    kind,
                    format!("failed to connect to {addr}: {e}"),
                    e,
                ));
            }
            (None, None) => {
                return Err(connection_error(
                    ConnectionErrorKind::Connect,
                    format!("{addr} resolved to no addresses"),
                ));
            }
        };

        stream.set_nodelay(true).ok();
        stream.set_read_timeout(Some(config.connect_timeout)).ok();
        stream.set_write_timeout(Some(config.connect_timeout)).ok();

        Self::handshake(stream, config)
    }
}

impl<S: Read + Write> MySqlConnection<S> {
    /// Log in over an established stream.
    pub fn handshake(stream: S, config: MySqlConfig) -> Result<Self> {
        let mut conn = Self {
            stream,
            state: ConnectionState::Connecting,
            config,
            server: None,
            client_capabilities: 0,
            sequence_id: 0,
            status_flags: 0,
            affected_rows: 0,
            last_insert_id: 0,
            warnings: 0,
        };

        let server = conn.read_server_handshake()?;
        tracing::debug!(
            server_version = %server.server_version,
            connection_id = server.connection_id,
            auth_plugin = %server.auth_plugin,
            "mysql handshake received"
        );
        conn.client_capabilities = conn.config.capability_flags() & server.capabilities;
        if conn.config.local_infile
            && conn.client_capabilities & capabilities::CLIENT_LOCAL_FILES == 0
        {
            tracing::warn!("server does not advertise LOCAL INFILE support");
        }
        conn.send_handshake_response(&server)?;
        let plugin = server.auth_plugin.clone();
        conn.server = Some(server);
        conn.finish_auth(plugin)?;

        conn.state = ConnectionState::Ready;
        Ok(conn)
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    pub fn is_ready(&self) -> bool {
        self.state == ConnectionState::Ready
    }

    pub fn config(&self) -> &MySqlConfig {
        &self.config
    }

    pub fn server(&self) -> Option<&ServerHandshake> {
        self.server.as_ref()
    }

    pub fn connection_id(&self) -> u32 {
        self.server.as_ref().map_or(0, |s| s.connection_id)
    }

    pub fn server_version(&self) -> Option<&str> {
        self.server.as_ref().map(|s| s.server_version.as_str())
    }

    /// Rows affected by the last statement.
    pub fn affected_rows(&self) -> u64 {
        self.affected_rows
    }

    pub fn last_insert_id(&self) -> u64 {
        self.last_insert_id
    }

    /// Warnings reported by the last statement.
    pub fn warnings(&self) -> u16 {
        self.warnings
    }

    /// Server status flags from the last OK or EOF packet.
    pub fn status_flags(&self) -> u16 {
        self.status_flags
    }

    pub fn get_ref(&self) -> &S {
        &self.stream
    }

    /// Run a statement that returns no rows; yields the affected row count.
    pub fn execute(&mut self, sql: &str) -> Result<u64> {
        let payload = self.send_query(sql)?;
        match PacketType::of(&payload) {
            PacketType::Ok => {
                self.apply_ok(&payload)?;
                Ok(self.affected_rows)
            }
            PacketType::Error => Err(self.server_error(&payload, sql)),
            PacketType::LocalInfile => {
                // Not asked for; decline and drain the server's answer.
                self.decline_infile(sql)
            }
            _ => {
                self.read_rows(&payload, sql)?;
                Ok(0)
            }
        }
    }

    /// Run a query and return its rows as text; `None` is SQL NULL.
    pub fn query(&mut self, sql: &str) -> Result<Vec<Vec<Option<String>>>> {
        let payload = self.send_query(sql)?;
        match PacketType::of(&payload) {
            PacketType::Ok => {
                self.apply_ok(&payload)?;
                Ok(Vec::new())
            }
            PacketType::Error => Err(self.server_error(&payload, sql)),
            PacketType::LocalInfile => self.decline_infile(sql).map(|_| Vec::new()),
            _ => self.read_rows(&payload, sql),
        }
    }

    /// Run a `LOAD DATA LOCAL INFILE` statement, answering the server's
    /// file request with the bytes of `data`.
    ///
    /// Returns the number of rows the server reports as loaded.
    #[tracing::instrument(level = "debug", skip(self, data), fields(connection_id = self.connection_id()))]
    pub fn load_local_infile(&mut self, sql: &str, data: &mut dyn Read) -> Result<u64> {
        if !self.config.local_infile {
            return Err(infile_rejected(
                sql,
                "LOCAL INFILE is disabled in the connection config",
            ));
        }

        let payload = self.send_query(sql)?;
        match PacketType::of(&payload) {
            PacketType::LocalInfile => {}
            PacketType::Ok => {
                // The server loaded without asking for data; nothing to stream.
                self.apply_ok(&payload)?;
                return Ok(self.affected_rows);
            }
            PacketType::Error => return Err(self.server_error(&payload, sql)),
            _ => {
                self.state = ConnectionState::Broken;
                return Err(protocol_error(
                    "unexpected result set in reply to LOAD DATA",
                    Some(payload),
                ));
            }
        }

        let filename = String::from_utf8_lossy(&payload[1..]).into_owned();
        tracing::trace!(filename = %filename, "server requested local file");

        let (sent, read_err) = self.stream_file(data)?;
        // An empty packet ends the file, even after a read failure.
        self.write_packet(&[])?;

        let reply = self.read_packet()?;
        let result = match PacketType::of(&reply) {
            PacketType::Ok => {
                self.apply_ok(&reply)?;
                Ok(self.affected_rows)
            }
            PacketType::Error => Err(self.server_error(&reply, sql)),
            _ => {
                self.state = ConnectionState::Broken;
                Err(protocol_error(
                    "unexpected reply after LOCAL INFILE data",
                    Some(reply),
                ))
            }
        };

        if let Some(e) = read_err {
            return Err(Error::Io(e));
        }
        let rows = result?;
        tracing::debug!(
            bytes = sent,
            rows,
            warnings = self.warnings,
            "local infile streamed"
        );
        Ok(rows)
    }

    /// Check the connection is alive.
    pub fn ping(&mut self) -> Result<()> {
        self.sequence_id = 0;
        self.write_packet(&[Command::Ping as u8])?;
        let reply = self.read_packet()?;
        match PacketType::of(&reply) {
            PacketType::Ok => Ok(()),
            PacketType::Error => Err(self.server_error(&reply, "COM_PING")),
            _ => Err(protocol_error("unexpected reply to ping", Some(reply))),
        }
    }

    /// Send `COM_QUIT` and give back the stream.
    pub fn close(mut self) -> S {
        if self.state != ConnectionState::Broken {
            self.sequence_id = 0;
            // Best effort: the server closes the socket either way.
            let _ = self.write_packet(&[Command::Quit as u8]);
        }
        self.state = ConnectionState::Closed;
        self.stream
    }

    fn read_server_handshake(&mut self) -> Result<ServerHandshake> {
        let payload = self.read_packet()?;
        if PacketType::of(&payload) == PacketType::Error {
            let err = parse_err(&payload)?;
            return Err(connection_error(
                ConnectionErrorKind::Connect,
                format!("server refused connection: {} ({})", err.error_message, err.error_code),
            ));
        }

        let mut r = PacketReader::new(&payload);
        let protocol_version = r.read_u8().ok_or_else(|| short("protocol version"))?;
        if protocol_version != 10 {
            return Err(protocol_error(
                format!("unsupported protocol version {protocol_version}"),
                None,
            ));
        }
        let server_version = r.read_null_string().ok_or_else(|| short("server version"))?;
        let connection_id = r.read_u32_le().ok_or_else(|| short("connection id"))?;
        let mut scramble = r.read_bytes(8).ok_or_else(|| short("scramble"))?.to_vec();
        r.skip(1);
        let caps_lower = r.read_u16_le().ok_or_else(|| short("capability flags"))?;
        let charset = r.read_u8().unwrap_or(self.config.charset);
        let status_flags = r.read_u16_le().unwrap_or(0);
        let caps_upper = r.read_u16_le().unwrap_or(0);
        let capabilities = u32::from(caps_lower) | (u32::from(caps_upper) << 16);

        let scramble_len = usize::from(r.read_u8().unwrap_or(0));
        r.skip(10);
        if capabilities & capabilities::CLIENT_SECURE_CONNECTION != 0 {
            let len = scramble_len.saturating_sub(8).max(13);
            if let Some(part) = r.read_bytes(len.min(r.remaining())) {
                scramble.extend_from_slice(part.strip_suffix(&[0]).unwrap_or(part));
            }
        }
        let auth_plugin = if capabilities & capabilities::CLIENT_PLUGIN_AUTH != 0 {
            r.read_null_string().unwrap_or_default()
        } else {
            auth::plugins::MYSQL_NATIVE_PASSWORD.to_string()
        };

        Ok(ServerHandshake {
            protocol_version,
            server_version,
            connection_id,
            capabilities,
            charset,
            status_flags,
            auth_plugin,
            scramble,
        })
    }

    fn send_handshake_response(&mut self, server: &ServerHandshake) -> Result<()> {
        let caps = self.client_capabilities;
        let auth_response = self.scramble(&server.auth_plugin, &server.scramble)?;

        let mut w = PacketWriter::new();
        w.write_u32_le(caps);
        w.write_u32_le(self.config.max_packet_size);
        w.write_u8(self.config.charset);
        w.write_zeros(23);
        w.write_null_string(&self.config.user);
        if caps & capabilities::CLIENT_PLUGIN_AUTH_LENENC_CLIENT_DATA != 0 {
            w.write_lenenc_bytes(&auth_response);
        } else {
            // Scrambles are 20 or 32 bytes.
            w.write_u8(auth_response.len() as u8);
            w.write_bytes(&auth_response);
        }
        if caps & capabilities::CLIENT_CONNECT_WITH_DB != 0 {
            w.write_null_string(self.config.database.as_deref().unwrap_or_default());
        }
        if caps & capabilities::CLIENT_PLUGIN_AUTH != 0 {
            w.write_null_string(&server.auth_plugin);
        }
        self.write_packet(w.as_bytes())
    }

    fn scramble(&self, plugin: &str, scramble: &[u8]) -> Result<Vec<u8>> {
        let password = self.config.password.as_deref().unwrap_or_default();
        auth::scramble_for(plugin, password, scramble).ok_or_else(|| {
            connection_error(
                ConnectionErrorKind::Authentication,
                format!("unsupported authentication plugin '{plugin}'"),
            )
        })
    }

    fn finish_auth(&mut self, mut plugin: String) -> Result<()> {
        loop {
            let payload = self.read_packet()?;
            match (PacketType::of(&payload), payload.first()) {
                (PacketType::Ok, _) => {
                    self.apply_ok(&payload)?;
                    return Ok(());
                }
                (PacketType::Error, _) => {
                    let err = parse_err(&payload)?;
                    return Err(connection_error(
                        ConnectionErrorKind::Authentication,
                        format!(
                            "authentication failed: {} ({})",
                            err.error_message, err.error_code
                        ),
                    ));
                }
                (_, Some(0xFE)) => {
                    // Auth switch: new plugin name and scramble.
                    let mut r = PacketReader::new(&payload[1..]);
                    plugin = r.read_null_string().ok_or_else(|| short("auth switch"))?;
                    let data = r.read_rest();
                    let scramble = data.strip_suffix(&[0]).unwrap_or(data);
                    tracing::debug!(plugin = %plugin, "auth switch requested");
                    let response = self.scramble(&plugin, scramble)?;
                    self.write_packet(&response)?;
                }
                (_, Some(0x01)) => match payload.get(1).copied() {
                    Some(auth::caching_sha2::FAST_AUTH_SUCCESS) => {}
                    Some(auth::caching_sha2::PERFORM_FULL_AUTH) => {
                        return Err(connection_error(
                            ConnectionErrorKind::Authentication,
                            format!(
                                "{plugin} requested full authentication, which needs a TLS \
                                 connection; log in once with another client to populate \
                                 the server's cache"
                            ),
                        ));
                    }
                    _ => {
                        return Err(protocol_error(
                            format!("unexpected {plugin} auth data"),
                            Some(payload),
                        ));
                    }
                },
                _ => {
                    return Err(protocol_error("unexpected auth response", Some(payload)));
                }
            }
        }
    }

    /// Send `COM_QUERY` and return the first reply packet.
    fn send_query(&mut self, sql: &str) -> Result<Vec<u8>> {
        if !self.is_ready() {
            return Err(connection_error(
                ConnectionErrorKind::Disconnected,
                format!("connection not ready ({:?})", self.state),
            ));
        }
        tracing::trace!(sql = %sql, "COM_QUERY");
        self.state = ConnectionState::InQuery;
        self.sequence_id = 0;

        let mut w = PacketWriter::with_capacity(sql.len() + 1);
        w.write_u8(Command::Query as u8);
        w.write_bytes(sql.as_bytes());
        self.write_packet(w.as_bytes())?;
        let reply = self.read_packet()?;
        if reply.is_empty() {
            self.state = ConnectionState::Broken;
            return Err(protocol_error("empty reply to query", None));
        }
        Ok(reply)
    }

    /// Copy `data` to the server in packets. Returns the byte count and the
    /// read error that stopped it, if any.
    fn stream_file(&mut self, data: &mut dyn Read) -> Result<(u64, Option<io::Error>)> {
        let packet_limit = (self.config.max_packet_size as usize)
            .min(MAX_PACKET_SIZE - 1)
            .max(1);
        let mut chunk = vec![0u8; INFILE_CHUNK.min(packet_limit)];
        let mut sent = 0u64;
        loop {
            // Fill whole chunks so chained readers do not produce runt packets.
            let mut filled = 0;
            let mut done = None;
            while filled < chunk.len() {
                match data.read(&mut chunk[filled..]) {
                    Ok(0) => {
                        done = Some(None);
                        break;
                    }
                    Ok(n) => filled += n,
                    Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
                    Err(e) => {
                        done = Some(Some(e));
                        break;
                    }
                }
            }
            if filled > 0 {
                self.write_packet(&chunk[..filled])?;
                sent += filled as u64;
            }
            if let Some(read_err) = done {
                return Ok((sent, read_err));
            }
        }
    }

    fn decline_infile(&mut self, sql: &str) -> Result<u64> {
        self.write_packet(&[])?;
        let reply = self.read_packet()?;
        match PacketType::of(&reply) {
            PacketType::Error => Err(self.server_error(&reply, sql)),
            _ => {
                self.state = ConnectionState::Ready;
                Err(infile_rejected(sql, "server requested a local file unexpectedly"))
            }
        }
    }

    fn read_rows(&mut self, header: &[u8], sql: &str) -> Result<Vec<Vec<Option<String>>>> {
        let column_count = PacketReader::new(header)
            .read_lenenc_int()
            .and_then(|n| usize::try_from(n).ok())
            .ok_or_else(|| protocol_error("bad column count", Some(header.to_vec())))?;

        for _ in 0..column_count {
            self.read_packet()?;
        }
        if self.client_capabilities & capabilities::CLIENT_DEPRECATE_EOF == 0 {
            self.read_packet()?;
        }

        let mut rows = Vec::new();
        loop {
            let payload = self.read_packet()?;
            match payload.first() {
                Some(0xFE) if payload.len() < MAX_PACKET_SIZE => {
                    self.apply_end_of_rows(&payload)?;
                    return Ok(rows);
                }
                Some(0xFF) => return Err(self.server_error(&payload, sql)),
                _ => rows.push(parse_text_row(&payload, column_count)?),
            }
        }
    }

    fn apply_end_of_rows(&mut self, payload: &[u8]) -> Result<()> {
        if self.client_capabilities & capabilities::CLIENT_DEPRECATE_EOF == 0 {
            let mut r = PacketReader::new(&payload[1..]);
            self.warnings = r.read_u16_le().unwrap_or(0);
            self.status_flags = r.read_u16_le().unwrap_or(self.status_flags);
            self.state = ConnectionState::Ready;
            Ok(())
        } else {
            self.apply_ok(payload)
        }
    }

    fn apply_ok(&mut self, payload: &[u8]) -> Result<()> {
        let ok: OkPacket = PacketReader::new(payload)
            .parse_ok_packet()
            .ok_or_else(|| protocol_error("malformed OK packet", Some(payload.to_vec())))?;
        self.affected_rows = ok.affected_rows;
        self.last_insert_id = ok.last_insert_id;
        self.status_flags = ok.status_flags;
        self.warnings = ok.warnings;
        self.state = ConnectionState::Ready;
        Ok(())
    }

    fn server_error(&mut self, payload: &[u8], sql: &str) -> Error {
        self.state = ConnectionState::Ready;
        match parse_err(payload) {
            Ok(err) => query_error(&err, sql),
            Err(e) => e,
        }
    }

    fn read_packet(&mut self) -> Result<Vec<u8>> {
        let mut payload = Vec::new();
        loop {
            let mut header = [0u8; PacketHeader::SIZE];
            self.read_exact(&mut header)?;
            let header = PacketHeader::from_bytes(header);
            self.sequence_id = header.sequence_id.wrapping_add(1);

            let len = header.payload_length as usize;
            let start = payload.len();
            payload.resize(start + len, 0);
            self.read_exact(&mut payload[start..])?;
            if len < MAX_PACKET_SIZE {
                return Ok(payload);
            }
        }
    }

    fn read_exact(&mut self, buf: &mut [u8]) -> Result<()> {
        self.stream.read_exact(buf).map_err(|e| {
            self.state = ConnectionState::Broken;
            connect_error(
                ConnectionErrorKind::Disconnected,
                format!("failed to read packet: {e}"),
                e,
            )
        })
    }

    fn write_packet(&mut self, payload: &[u8]) -> Result<()> {
        let (bytes, next) = frame(payload, self.sequence_id);
        self.sequence_id = next;
        self.stream
            .write_all(&bytes)
            .and_then(|()| self.stream.flush())
            .map_err(|e| {
                self.state = ConnectionState::Broken;
                connect_error(
                    ConnectionErrorKind::Disconnected,
                    format!("failed to write packet: {e}"),
                    e,
                )
            })
    }
}

fn parse_text_row(payload: &[u8], column_count: usize) -> Result<Vec<Option<String>>> {
    let mut r = PacketReader::new(payload);
    let mut row = Vec::with_capacity(column_count);
    for _ in 0..column_count {
        if r.peek() == Some(0xFB) {
            r.skip(1);
            row.push(None);
        } else {
            let value = r
                .read_lenenc_string()
                .ok_or_else(|| protocol_error("truncated row", Some(payload.to_vec())))?;
            row.push(Some(value));
        }
    }
    Ok(row)
}

fn parse_err(payload: &[u8]) -> Result<ErrPacket> {
    PacketReader::new(payload)
        .parse_err_packet()
        .ok_or_else(|| protocol_error("malformed ERR packet", Some(payload.to_vec())))
}

fn short(what: &str) -> Error {
    protocol_error(format!("handshake truncated at {what}"), None)
}

fn protocol_error(message: impl Into<String>, raw_data: Option<Vec<u8>>) -> Error {
    Error::Protocol(ProtocolError {
        message: message.into(),
        raw_data,
    })
}

fn connection_error(kind: ConnectionErrorKind, message: impl Into<String>) -> Error {
    Error::Connection(ConnectionError {
        kind,
        message: message.into(),
        source: None,
    })
}

fn connect_error(kind: ConnectionErrorKind, message: String, source: io::Error) -> Error {
    Error::Connection(ConnectionError {
        kind,
        message,
        source: Some(Box::new(source)),
    })
}

fn query_error(err: &ErrPacket, sql: &str) -> Error {
    let kind = if err.is_infile_rejected() {
        QueryErrorKind::InfileRejected
    } else if err.is_constraint_violation() {
        QueryErrorKind::Constraint
    } else if err.sql_state.starts_with("42") {
        QueryErrorKind::Syntax
    } else {
        QueryErrorKind::Database
    };
    Error::Query(QueryError {
        kind,
        sql: Some(sql.to_string()),
        sqlstate: (!err.sql_state.is_empty()).then(|| err.sql_state.clone()),
        message: format!("{} ({})", err.error_message, err.error_code),
        source: None,
    })
}

fn infile_rejected(sql: &str, message: &str) -> Error {
    Error::Query(QueryError {
        kind: QueryErrorKind::InfileRejected,
        sql: Some(sql.to_string()),
        sqlstate: None,
        message: message.to_string(),
        source: None,
    })
}
