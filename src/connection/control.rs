//! Control-channel management
//!
//! Owns the persistent text connection carrying FTP commands and
//! replies. Strict request/response discipline: one command in flight
//! at a time, no pipelining.

use std::io::{self, BufReader, Write};
use std::net::{IpAddr, Ipv4Addr, TcpStream, ToSocketAddrs};
use std::time::Duration;

use log::{debug, info, warn};

use crate::command::Command;
use crate::error::{FtpError, Result};
use crate::reply::{self, Reply, ReplyClass};

/// The FTP control connection.
///
/// The stream is owned through a `BufReader` so bytes buffered while
/// reading one reply are never lost before the next.
pub struct ControlConnection {
    reader: Option<BufReader<TcpStream>>,
    peer: String,
}

impl ControlConnection {
    /// Open the control connection, apply timeouts, and read the
    /// server greeting. Fails with a protocol error unless the
    /// greeting's class is preliminary or success.
    pub fn connect(host: &str, port: u16, timeout: Duration) -> Result<(Self, Reply)> {
        let peer = format!("{host}:{port}");
        let addr = (host, port)
            .to_socket_addrs()
            .map_err(|e| FtpError::Connection(format!("cannot resolve {peer}: {e}")))?
            .next()
            .ok_or_else(|| FtpError::Connection(format!("no addresses for {peer}")))?;

        let stream = TcpStream::connect_timeout(&addr, timeout).map_err(|e| match e.kind() {
            io::ErrorKind::TimedOut => {
                FtpError::Connection(format!("connection to {peer} timed out"))
            }
            io::ErrorKind::ConnectionRefused => {
                FtpError::Connection(format!("connection refused by {peer}"))
            }
            _ => FtpError::Connection(format!("connect to {peer} failed: {e}")),
        })?;

        stream
            .set_read_timeout(Some(timeout))
            .map_err(|e| FtpError::Connection(format!("set read timeout: {e}")))?;
        stream
            .set_write_timeout(Some(timeout))
            .map_err(|e| FtpError::Connection(format!("set write timeout: {e}")))?;

        let mut conn = Self {
            reader: Some(BufReader::new(stream)),
            peer,
        };

        let greeting = conn.read_reply()?;
        match greeting.class() {
            ReplyClass::Preliminary | ReplyClass::Success => {
                info!("Connected to {}: {greeting}", conn.peer);
                Ok((conn, greeting))
            }
            _ => {
                conn.release();
                Err(FtpError::Protocol(format!(
                    "server rejected connection: {greeting}"
                )))
            }
        }
    }

    pub fn is_open(&self) -> bool {
        self.reader.is_some()
    }

    pub fn peer(&self) -> &str {
        &self.peer
    }

    /// Local IPv4 address of the control socket. Advertised in PORT
    /// arguments, since it is the address the server can reach us on.
    pub fn local_ipv4(&self) -> Result<Ipv4Addr> {
        let reader = self
            .reader
            .as_ref()
            .ok_or_else(|| FtpError::Connection("control channel is closed".to_string()))?;
        match reader
            .get_ref()
            .local_addr()
            .map_err(|e| FtpError::Connection(format!("local address: {e}")))?
            .ip()
        {
            IpAddr::V4(ip) => Ok(ip),
            IpAddr::V6(_) => Err(FtpError::Connection(
                "active mode requires an IPv4 control connection".to_string(),
            )),
        }
    }

    /// Write one command line. Drops the stream on a broken pipe so
    /// later calls fail fast.
    pub fn send_command(&mut self, command: &Command) -> Result<()> {
        let reader = self
            .reader
            .as_mut()
            .ok_or_else(|| FtpError::Connection("control channel is closed".to_string()))?;

        debug!("-> {command}");
        let wire = command.to_wire();
        let result = {
            let stream = reader.get_mut();
            stream.write_all(wire.as_bytes()).and_then(|_| stream.flush())
        };

        result.map_err(|e| match e.kind() {
            io::ErrorKind::BrokenPipe
            | io::ErrorKind::ConnectionAborted
            | io::ErrorKind::ConnectionReset => {
                self.reader = None;
                FtpError::Connection("control channel lost while sending".to_string())
            }
            _ => FtpError::Connection(format!("send failed: {e}")),
        })
    }

    /// Block until one complete reply is available.
    pub fn read_reply(&mut self) -> Result<Reply> {
        let reader = self
            .reader
            .as_mut()
            .ok_or_else(|| FtpError::Connection("control channel is closed".to_string()))?;

        let result = reply::read_reply(reader);
        if let Err(FtpError::Connection(_)) = &result {
            self.reader = None;
        }
        result
    }

    /// Convenience for the strict request/response cycle.
    pub fn exchange(&mut self, command: &Command) -> Result<Reply> {
        self.send_command(command)?;
        self.read_reply()
    }

    /// Graceful close: best-effort QUIT (errors swallowed), then
    /// release the socket. Idempotent.
    pub fn close(&mut self) {
        if self.reader.is_none() {
            return;
        }
        match self.exchange(&Command::Quit) {
            Ok(reply) => debug!("QUIT acknowledged: {reply}"),
            Err(e) => warn!("QUIT failed during close: {e}"),
        }
        self.release();
        info!("Disconnected from {}", self.peer);
    }

    /// Drop the socket without the QUIT exchange.
    fn release(&mut self) {
        if let Some(reader) = self.reader.take() {
            let _ = reader.get_ref().shutdown(std::net::Shutdown::Both);
        }
    }
}

impl Drop for ControlConnection {
    fn drop(&mut self) {
        self.close();
    }
}
