//! Data-channel management
//!
//! One `DataConnection` exists for the duration of a single transfer
//! (LIST, STOR, RETR) and never outlives it. Passive mode connects out
//! to the address the server advertised in its 227 reply; active mode
//! binds a local listener and advertises it with PORT.

use std::net::{Ipv4Addr, SocketAddr, SocketAddrV4, TcpListener, TcpStream};
use std::time::Duration;

use log::{debug, info};

use crate::error::{FtpError, Result};
use crate::reply::Reply;

/// How the data channel is established.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DataMode {
    /// Client connects to the server's advertised address (PASV).
    Passive,
    /// Client listens and the server connects back (PORT).
    Active,
}

/// Parse a `227 Entering Passive Mode (h1,h2,h3,h4,p1,p2)` reply into
/// the data-channel address. Port is p1*256 + p2.
pub fn parse_pasv_reply(reply: &Reply) -> Result<SocketAddrV4> {
    let text = reply
        .lines
        .first()
        .map(String::as_str)
        .unwrap_or_default();

    let open = text
        .find('(')
        .ok_or_else(|| FtpError::Protocol(format!("PASV reply without '(': {text}")))?;
    let close = text[open..]
        .find(')')
        .map(|i| open + i)
        .ok_or_else(|| FtpError::Protocol(format!("PASV reply without ')': {text}")))?;

    let fields: Vec<&str> = text[open + 1..close].split(',').map(str::trim).collect();
    if fields.len() != 6 {
        return Err(FtpError::Protocol(format!(
            "PASV address has {} fields, expected 6: {text}",
            fields.len()
        )));
    }

    let mut numbers = [0u8; 6];
    for (slot, field) in numbers.iter_mut().zip(&fields) {
        *slot = field.parse().map_err(|_| {
            FtpError::Protocol(format!("non-numeric PASV field '{field}': {text}"))
        })?;
    }

    let ip = Ipv4Addr::new(numbers[0], numbers[1], numbers[2], numbers[3]);
    let port = u16::from(numbers[4]) * 256 + u16::from(numbers[5]);
    Ok(SocketAddrV4::new(ip, port))
}

/// Format a local address as the PORT argument `h1,h2,h3,h4,p1,p2`.
pub fn format_port_argument(addr: &SocketAddrV4) -> String {
    let [a, b, c, d] = addr.ip().octets();
    let port = addr.port();
    format!("{a},{b},{c},{d},{},{}", port / 256, port % 256)
}

enum Endpoint {
    Connected(TcpStream),
    Listening(TcpListener),
    Closed,
}

/// The secondary connection carrying file or listing payload bytes.
pub struct DataConnection {
    endpoint: Endpoint,
    timeout: Duration,
}

impl DataConnection {
    /// Passive mode: connect out to the address from the 227 reply.
    pub fn open_passive(addr: SocketAddrV4, timeout: Duration) -> Result<Self> {
        debug!("Opening passive data connection to {addr}");
        let stream = TcpStream::connect_timeout(&SocketAddr::V4(addr), timeout)
            .map_err(|e| FtpError::Connection(format!("data connection to {addr} failed: {e}")))?;
        stream
            .set_read_timeout(Some(timeout))
            .and_then(|_| stream.set_write_timeout(Some(timeout)))
            .map_err(|e| FtpError::Connection(format!("data connection timeouts: {e}")))?;

        Ok(Self {
            endpoint: Endpoint::Connected(stream),
            timeout,
        })
    }

    /// Active mode: bind a listener on the first free port in the
    /// range. The server connects back after a PORT exchange.
    pub fn listen_active(local_ip: Ipv4Addr, ports: (u16, u16), timeout: Duration) -> Result<Self> {
        let (start, end) = ports;
        for port in start..=end {
            match TcpListener::bind(SocketAddrV4::new(local_ip, port)) {
                Ok(listener) => {
                    info!("Data listener bound on port {port}");
                    return Ok(Self {
                        endpoint: Endpoint::Listening(listener),
                        timeout,
                    });
                }
                Err(e) => debug!("Port {port} unavailable: {e}"),
            }
        }
        Err(FtpError::Connection(format!(
            "no free data port in range {start}-{end}"
        )))
    }

    /// The port this listener is bound on (active mode only). The
    /// session pairs it with the control socket's local IP to build
    /// the PORT argument, since the bind address may be unspecified.
    pub fn local_port(&self) -> Result<u16> {
        match &self.endpoint {
            Endpoint::Listening(listener) => listener
                .local_addr()
                .map(|addr| addr.port())
                .map_err(|e| FtpError::Connection(format!("listener address: {e}"))),
            _ => Err(FtpError::Connection(
                "no active-mode listener on this data connection".to_string(),
            )),
        }
    }

    /// Wait for the server's inbound connection (active mode only).
    /// A failed accept leaves the connection closed.
    pub fn accept(&mut self) -> Result<()> {
        match std::mem::replace(&mut self.endpoint, Endpoint::Closed) {
            Endpoint::Listening(listener) => {
                let (stream, peer) = listener
                    .accept()
                    .map_err(|e| FtpError::Connection(format!("data accept failed: {e}")))?;
                debug!("Server connected from {peer} for data transfer");
                stream
                    .set_read_timeout(Some(self.timeout))
                    .and_then(|_| stream.set_write_timeout(Some(self.timeout)))
                    .map_err(|e| FtpError::Connection(format!("data connection timeouts: {e}")))?;
                self.endpoint = Endpoint::Connected(stream);
                Ok(())
            }
            Endpoint::Connected(stream) => {
                self.endpoint = Endpoint::Connected(stream);
                Ok(())
            }
            Endpoint::Closed => Err(FtpError::Connection(
                "data connection already closed".to_string(),
            )),
        }
    }

    /// The established payload stream.
    pub fn stream(&mut self) -> Result<&mut TcpStream> {
        match &mut self.endpoint {
            Endpoint::Connected(stream) => Ok(stream),
            _ => Err(FtpError::Connection(
                "data connection not established".to_string(),
            )),
        }
    }

    /// Close deterministically; safe to call more than once.
    pub fn close(&mut self) {
        match std::mem::replace(&mut self.endpoint, Endpoint::Closed) {
            Endpoint::Connected(stream) => {
                let _ = stream.shutdown(std::net::Shutdown::Both);
                debug!("Data connection closed");
            }
            Endpoint::Listening(_) => debug!("Data listener closed before accept"),
            Endpoint::Closed => {}
        }
    }
}

impl Drop for DataConnection {
    fn drop(&mut self) {
        self.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pasv_reply(text: &str) -> Reply {
        Reply {
            code: 227,
            is_multiline: false,
            lines: vec![text.to_string()],
        }
    }

    #[test]
    fn parses_pasv_address() {
        let addr =
            parse_pasv_reply(&pasv_reply("227 Entering Passive Mode (192,168,1,5,19,136)"))
                .unwrap();
        assert_eq!(addr.ip(), &Ipv4Addr::new(192, 168, 1, 5));
        assert_eq!(addr.port(), 19 * 256 + 136);
    }

    #[test]
    fn pasv_rejects_wrong_field_count() {
        let err = parse_pasv_reply(&pasv_reply("227 Passive (1,2,3,4,5)")).unwrap_err();
        assert!(matches!(err, FtpError::Protocol(_)));
    }

    #[test]
    fn pasv_rejects_non_numeric_fields() {
        let err = parse_pasv_reply(&pasv_reply("227 Passive (a,b,c,d,e,f)")).unwrap_err();
        assert!(matches!(err, FtpError::Protocol(_)));
    }

    #[test]
    fn pasv_rejects_missing_parentheses() {
        let err = parse_pasv_reply(&pasv_reply("227 Entering Passive Mode")).unwrap_err();
        assert!(matches!(err, FtpError::Protocol(_)));
    }

    #[test]
    fn port_argument_round_trips_pasv_arithmetic() {
        let addr = SocketAddrV4::new(Ipv4Addr::new(127, 0, 0, 1), 5000);
        assert_eq!(format_port_argument(&addr), "127,0,0,1,19,136");
    }
}
