//! Data-channel byte movement
//!
//! Buffered copy loops between the data connection and the
//! caller-supplied source/sink, plus a small statistics record for
//! front-end display.

use std::io::{Read, Write};
use std::time::{Duration, Instant};

use log::debug;

use crate::connection::DataConnection;
use crate::error::{FtpError, Result};

const BUFFER_SIZE: usize = 8192;

/// Outcome of a completed transfer.
#[derive(Debug, Clone, Copy)]
pub struct TransferStats {
    pub bytes: u64,
    pub elapsed: Duration,
}

impl TransferStats {
    /// Throughput in bytes per second.
    pub fn speed_bps(&self) -> f64 {
        let secs = self.elapsed.as_secs_f64();
        if secs > 0.0 { self.bytes as f64 / secs } else { 0.0 }
    }
}

/// Format a byte count for humans.
pub fn format_bytes(bytes: u64) -> String {
    const UNITS: &[&str] = &["B", "KB", "MB", "GB"];
    let mut size = bytes as f64;
    let mut unit = 0;
    while size >= 1024.0 && unit < UNITS.len() - 1 {
        size /= 1024.0;
        unit += 1;
    }
    if unit == 0 {
        format!("{bytes} {}", UNITS[0])
    } else {
        format!("{size:.1} {}", UNITS[unit])
    }
}

/// STOR payload: write the source's bytes to the data connection, then
/// close it so the server sees EOF.
pub fn send_stream<R: Read>(data: &mut DataConnection, source: &mut R) -> Result<TransferStats> {
    let start = Instant::now();
    let mut buffer = [0u8; BUFFER_SIZE];
    let mut total = 0u64;

    loop {
        let read = source.read(&mut buffer).map_err(|e| FtpError::Transfer {
            code: None,
            message: format!("reading local source failed: {e}"),
        })?;
        if read == 0 {
            break;
        }
        data.stream()?
            .write_all(&buffer[..read])
            .map_err(|e| FtpError::Transfer {
                code: None,
                message: format!("writing to data connection failed: {e}"),
            })?;
        total += read as u64;
    }

    data.close();
    debug!("Sent {total} bytes over data connection");
    Ok(TransferStats {
        bytes: total,
        elapsed: start.elapsed(),
    })
}

/// RETR payload: read the data connection into the sink until the
/// server closes it.
pub fn receive_stream<W: Write>(data: &mut DataConnection, sink: &mut W) -> Result<TransferStats> {
    let start = Instant::now();
    let mut buffer = [0u8; BUFFER_SIZE];
    let mut total = 0u64;

    loop {
        let read = data.stream()?.read(&mut buffer).map_err(|e| FtpError::Transfer {
            code: None,
            message: format!("reading data connection failed: {e}"),
        })?;
        if read == 0 {
            break;
        }
        sink.write_all(&buffer[..read]).map_err(|e| FtpError::Transfer {
            code: None,
            message: format!("writing local sink failed: {e}"),
        })?;
        total += read as u64;
    }

    sink.flush().map_err(|e| FtpError::Transfer {
        code: None,
        message: format!("flushing local sink failed: {e}"),
    })?;
    data.close();
    debug!("Received {total} bytes over data connection");
    Ok(TransferStats {
        bytes: total,
        elapsed: start.elapsed(),
    })
}

/// LIST payload: read until close and hand the raw text back for the
/// listing parser. Listings are text; lossy decoding keeps odd bytes
/// from aborting the whole directory.
pub fn receive_listing_text(data: &mut DataConnection) -> Result<String> {
    let mut raw = Vec::new();
    receive_stream(data, &mut raw)?;
    Ok(String::from_utf8_lossy(&raw).into_owned())
}
