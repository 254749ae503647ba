//! MySQL wire protocol pieces used by the loader client.
//!
//! Every packet starts with a 4-byte header: a 3-byte little-endian
//! payload length and a 1-byte sequence number. Payloads of
//! [`MAX_PACKET_SIZE`] bytes or more are split across several packets.

pub mod reader;
pub mod writer;

pub use reader::PacketReader;
pub use writer::{PacketWriter, frame};

/// Maximum payload size for a single MySQL packet (2^24 - 1 bytes).
pub const MAX_PACKET_SIZE: usize = 0xFF_FF_FF;

/// Capability flags exchanged in the handshake.
#[allow(dead_code)]
pub mod capabilities {
    pub const CLIENT_LONG_PASSWORD: u32 = 1;
    pub const CLIENT_CONNECT_WITH_DB: u32 = 1 << 3;
    pub const CLIENT_LOCAL_FILES: u32 = 1 << 7;
    pub const CLIENT_PROTOCOL_41: u32 = 1 << 9;
    pub const CLIENT_SSL: u32 = 1 << 11;
    pub const CLIENT_TRANSACTIONS: u32 = 1 << 13;
    pub const CLIENT_SECURE_CONNECTION: u32 = 1 << 15;
    pub const CLIENT_MULTI_RESULTS: u32 = 1 << 17;
    pub const CLIENT_PLUGIN_AUTH: u32 = 1 << 19;
    pub const CLIENT_PLUGIN_AUTH_LENENC_CLIENT_DATA: u32 = 1 << 21;
    pub const CLIENT_DEPRECATE_EOF: u32 = 1 << 24;

    /// Baseline client capabilities.
    pub const DEFAULT_CLIENT_FLAGS: u32 = CLIENT_PROTOCOL_41
        | CLIENT_SECURE_CONNECTION
        | CLIENT_LONG_PASSWORD
        | CLIENT_TRANSACTIONS
        | CLIENT_MULTI_RESULTS
        | CLIENT_PLUGIN_AUTH
        | CLIENT_PLUGIN_AUTH_LENENC_CLIENT_DATA
        | CLIENT_DEPRECATE_EOF;
}

/// Command bytes (COM_xxx) this client sends.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Command {
    Quit = 0x01,
    Query = 0x03,
    Ping = 0x0e,
}

/// Collation ids.
#[allow(dead_code)]
pub mod charset {
    pub const UTF8MB4_GENERAL_CI: u8 = 45;
    pub const BINARY: u8 = 63;
    pub const UTF8MB4_0900_AI_CI: u8 = 255;
}

/// MySQL error codes the client classifies.
pub mod error_codes {
    /// ER_DUP_ENTRY
    pub const DUPLICATE_ENTRY: u16 = 1062;
    /// ER_NOT_ALLOWED_COMMAND (local_infile disabled on the server)
    pub const NOT_ALLOWED_COMMAND: u16 = 1148;
    /// ER_ROW_IS_REFERENCED_2
    pub const ROW_IS_REFERENCED: u16 = 1451;
    /// ER_NO_REFERENCED_ROW_2
    pub const NO_REFERENCED_ROW: u16 = 1452;
    /// ER_CLIENT_LOCAL_FILES_DISABLED
    pub const LOCAL_FILES_DISABLED: u16 = 3948;
}

/// A packet header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PacketHeader {
    pub payload_length: u32,
    pub sequence_id: u8,
}

impl PacketHeader {
    pub const SIZE: usize = 4;

    pub fn from_bytes(bytes: [u8; 4]) -> Self {
        Self {
            payload_length: u32::from_le_bytes([bytes[0], bytes[1], bytes[2], 0]),
            sequence_id: bytes[3],
        }
    }

    pub fn to_bytes(self) -> [u8; 4] {
        let len = self.payload_length.to_le_bytes();
        [len[0], len[1], len[2], self.sequence_id]
    }
}

/// What a server response packet is, judged by its first byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PacketType {
    /// 0x00
    Ok,
    /// 0xFF
    Error,
    /// 0xFE with a short payload (EOF, or an auth switch during login)
    Eof,
    /// 0xFB: the server asks for a local file
    LocalInfile,
    /// Anything else (result set header, row, auth continuation)
    Data,
}

impl PacketType {
    pub fn of(payload: &[u8]) -> Self {
        match payload.first() {
            Some(0x00) => PacketType::Ok,
            Some(0xFF) => PacketType::Error,
            Some(0xFE) if payload.len() < 9 => PacketType::Eof,
            Some(0xFB) => PacketType::LocalInfile,
            _ => PacketType::Data,
        }
    }
}

/// Parsed OK packet.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OkPacket {
    pub affected_rows: u64,
    pub last_insert_id: u64,
    pub status_flags: u16,
    pub warnings: u16,
    pub info: String,
}

/// Parsed ERR packet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ErrPacket {
    pub error_code: u16,
    /// Five-character SQLSTATE, empty if the server sent none.
    pub sql_state: String,
    pub error_message: String,
}

impl ErrPacket {
    pub fn is_constraint_violation(&self) -> bool {
        matches!(
            self.error_code,
            error_codes::DUPLICATE_ENTRY
                | error_codes::ROW_IS_REFERENCED
                | error_codes::NO_REFERENCED_ROW
        )
    }

    /// The server refuses `LOAD DATA LOCAL INFILE`.
    pub fn is_infile_rejected(&self) -> bool {
        matches!(
            self.error_code,
            error_codes::NOT_ALLOWED_COMMAND | error_codes::LOCAL_FILES_DISABLED
        )
    }
}
