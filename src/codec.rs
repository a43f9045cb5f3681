//! The on-wire frame format: `<id> '|' <len> '|' <payload> '|'`.
//!
//! `id` is always the literal `0`. `len` is exactly two decimal digits
//! giving the byte length of everything after the second `|`, including
//! the trailing `|`. Both directions use the same framing.

use std::io::{self, Read, Write};

use crate::error::FrameError;

pub const MIN_PAYLOAD_LEN: usize = 5;
pub const MAX_PAYLOAD_LEN: usize = 104;

/// A decoded frame: the payload bytes, from the verb through the final `|`.
pub struct Frame {
    pub payload: Vec<u8>,
}

/// Read one frame from `r`, blocking until it is complete.
///
/// Reads the `id|` and `len|` header one byte at a time (there is no
/// guarantee the peer writes a whole header in one packet), then reads
/// exactly `len` payload bytes with short-read retry.
pub fn read_frame<R: Read>(r: &mut R) -> Result<Frame, FrameError> {
    let id = read_header_field(r)?;
    if id != b"0" {
        return Err(FrameError::BadFrame);
    }

    let len_field = read_header_field(r)?;
    if len_field.len() != 2 || !len_field.iter().all(|b| b.is_ascii_digit()) {
        return Err(FrameError::BadFrame);
    }
    let len = (len_field[0] - b'0') as usize * 10 + (len_field[1] - b'0') as usize;
    if !(MIN_PAYLOAD_LEN..=MAX_PAYLOAD_LEN).contains(&len) {
        return Err(FrameError::BadFrame);
    }

    let mut payload = vec![0u8; len];
    read_exact_retrying(r, &mut payload)?;

    if payload[len - 1] != b'|' {
        return Err(FrameError::BadFrame);
    }

    Ok(Frame { payload })
}

/// Read bytes up to and including the next `|`, returning the bytes before it.
fn read_header_field<R: Read>(r: &mut R) -> Result<Vec<u8>, FrameError> {
    let mut field = Vec::new();
    loop {
        let mut byte = [0u8; 1];
        match r.read(&mut byte) {
            Ok(0) => return Err(FrameError::Eof),
            Ok(_) => {}
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(FrameError::Io(e)),
        }
        if byte[0] == b'|' {
            return Ok(field);
        }
        field.push(byte[0]);
    }
}

fn read_exact_retrying<R: Read>(r: &mut R, buf: &mut [u8]) -> Result<(), FrameError> {
    let mut read = 0;
    while read < buf.len() {
        match r.read(&mut buf[read..]) {
            Ok(0) => return Err(FrameError::Eof),
            Ok(n) => read += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(FrameError::Io(e)),
        }
    }
    Ok(())
}

/// Write a frame given its payload (the verb through the trailing `|`).
/// Panics if the payload does not fit in the two-digit length field — all
/// callers in this crate build payloads well under that bound.
pub fn write_frame<W: Write>(w: &mut W, payload: &[u8]) -> io::Result<()> {
    debug_assert!((MIN_PAYLOAD_LEN..=99).contains(&payload.len()));
    let mut buf = Vec::with_capacity(payload.len() + 4);
    buf.extend_from_slice(b"0|");
    buf.extend_from_slice(format!("{:02}", payload.len()).as_bytes());
    buf.push(b'|');
    buf.extend_from_slice(payload);
    w.write_all(&buf)
}
