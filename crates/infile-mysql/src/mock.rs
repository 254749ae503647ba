//! Scripted server side for wire tests.

use std::io::{self, Cursor, Read, Write};

use crate::protocol::{PacketHeader, PacketWriter, capabilities, frame};

/// Replays canned server bytes and records what the client writes.
#[derive(Debug)]
pub struct ScriptedStream {
    input: Cursor<Vec<u8>>,
    output: Vec<u8>,
}

impl ScriptedStream {
    pub fn new(input: Vec<u8>) -> Self {
        Self {
            input: Cursor::new(input),
            output: Vec::new(),
        }
    }

    pub fn written(&self) -> &[u8] {
        &self.output
    }
}

impl Read for ScriptedStream {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.input.read(buf)
    }
}

impl Write for ScriptedStream {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.output.extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

pub fn packet(seq: u8, payload: &[u8]) -> Vec<u8> {
    frame(payload, seq).0
}

/// Split client output back into `(sequence_id, payload)` pairs.
pub fn packets_from(mut bytes: &[u8]) -> Vec<(u8, Vec<u8>)> {
    let mut out = Vec::new();
    while bytes.len() >= PacketHeader::SIZE {
        let header = PacketHeader::from_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]);
        let end = PacketHeader::SIZE + header.payload_length as usize;
        out.push((header.sequence_id, bytes[PacketHeader::SIZE..end].to_vec()));
        bytes = &bytes[end..];
    }
    out
}

pub const SERVER_CAPABILITIES: u32 = capabilities::DEFAULT_CLIENT_FLAGS
    | capabilities::CLIENT_CONNECT_WITH_DB
    | capabilities::CLIENT_LOCAL_FILES;

/// Protocol 10 greeting: version 8.0.36, connection id 42, 20-byte scramble.
pub fn handshake_packet(plugin: &str) -> Vec<u8> {
    let [a, b, c, d] = SERVER_CAPABILITIES.to_le_bytes();

    let mut w = PacketWriter::new();
    w.write_u8(10);
    w.write_null_string("8.0.36");
    w.write_u32_le(42);
    w.write_bytes(b"abcdefgh");
    w.write_u8(0);
    w.write_bytes(&[a, b]);
    w.write_u8(255);
    w.write_u16_le(2);
    w.write_bytes(&[c, d]);
    w.write_u8(21);
    w.write_zeros(10);
    w.write_bytes(b"ijklmnopqrst\0");
    w.write_null_string(plugin);
    packet(0, w.as_bytes())
}

pub fn ok_packet(seq: u8, affected_rows: u64) -> Vec<u8> {
    let mut w = PacketWriter::new();
    w.write_u8(0x00);
    w.write_lenenc_int(affected_rows);
    w.write_lenenc_int(0);
    w.write_u16_le(2);
    w.write_u16_le(0);
    packet(seq, w.as_bytes())
}

pub fn err_packet(seq: u8, code: u16, sql_state: &str, message: &str) -> Vec<u8> {
    let mut w = PacketWriter::new();
    w.write_u8(0xFF);
    w.write_u16_le(code);
    w.write_u8(b'#');
    w.write_bytes(sql_state.as_bytes());
    w.write_bytes(message.as_bytes());
    packet(seq, w.as_bytes())
}

pub fn infile_request(seq: u8, filename: &str) -> Vec<u8> {
    let mut payload = vec![0xFB];
    payload.extend_from_slice(filename.as_bytes());
    packet(seq, &payload)
}

/// One-column result set with one row per value, as answered to a
/// `COM_QUERY` (sequence ids from 1, deprecate-EOF framing).
pub fn result_set(values: &[Option<&str>]) -> Vec<u8> {
    let mut out = packet(1, &[1]);

    let mut column = PacketWriter::new();
    for part in ["def", "shop", "t", "t", "MAX(`id`)", ""] {
        column.write_lenenc_bytes(part.as_bytes());
    }
    column.write_u8(0x0c);
    column.write_u16_le(63);
    column.write_u32_le(20);
    column.write_u8(0x08);
    column.write_u16_le(0x80);
    column.write_u8(0);
    column.write_zeros(2);
    out.extend(packet(2, column.as_bytes()));

    let mut seq = 3;
    for value in values {
        let mut row = PacketWriter::new();
        match value {
            Some(v) => row.write_lenenc_bytes(v.as_bytes()),
            None => row.write_u8(0xFB),
        }
        out.extend(packet(seq, row.as_bytes()));
        seq += 1;
    }

    let mut end = PacketWriter::new();
    end.write_u8(0xFE);
    end.write_lenenc_int(0);
    end.write_lenenc_int(0);
    end.write_u16_le(2);
    end.write_u16_le(0);
    out.extend(packet(seq, end.as_bytes()));
    out
}
