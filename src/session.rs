//! Session state machine
//!
//! Sequences the login handshake and every subsequent command/response
//! exchange, and enforces that operations are only issued in states
//! where they are valid. One session is owned by one caller context at
//! a time; commands are strictly sequential.

use std::io::{Read, Write};
use std::net::{Ipv4Addr, SocketAddrV4};
use std::time::Duration;

use log::{debug, info, warn};

use crate::command::{Command, TransferType};
use crate::connection::{
    format_port_argument, parse_pasv_reply, ControlConnection, DataConnection, DataMode,
};
use crate::error::{FtpError, Result};
use crate::listing::{parse_listing, DirectoryEntry};
use crate::reply::{codes, Reply, ReplyClass};
use crate::transfer::{self, TransferStats};

/// Lifecycle state of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Disconnected,
    Connected,
    AwaitingPassword,
    LoggedIn,
    Transferring,
}

impl std::fmt::Display for SessionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SessionState::Disconnected => write!(f, "disconnected"),
            SessionState::Connected => write!(f, "connected"),
            SessionState::AwaitingPassword => write!(f, "awaiting password"),
            SessionState::LoggedIn => write!(f, "logged in"),
            SessionState::Transferring => write!(f, "transferring"),
        }
    }
}

/// Per-session settings supplied at connect time. Host, port, and
/// credentials are call arguments, not configuration.
#[derive(Debug, Clone)]
pub struct SessionOptions {
    /// Deadline applied to connects, reads, and writes on both
    /// channels. Expiry surfaces as a connection error to the
    /// in-flight call.
    pub timeout: Duration,

    /// How data channels are established.
    pub data_mode: DataMode,

    /// Local port range tried for active-mode listeners.
    pub data_ports: (u16, u16),
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(30),
            data_mode: DataMode::Passive,
            data_ports: (49152, 49251),
        }
    }
}

/// One FTP session: control channel plus state.
pub struct FtpSession {
    control: ControlConnection,
    state: SessionState,
    current_path: String,
    options: SessionOptions,
}

impl FtpSession {
    /// Connect to a server. The greeting is read and validated before
    /// this returns; the session starts in the connected state.
    pub fn connect(host: &str, port: u16, options: SessionOptions) -> Result<Self> {
        let (control, _greeting) = ControlConnection::connect(host, port, options.timeout)?;
        Ok(Self {
            control,
            state: SessionState::Connected,
            current_path: "/".to_string(),
            options,
        })
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn current_path(&self) -> &str {
        &self.current_path
    }

    pub fn peer(&self) -> &str {
        self.control.peer()
    }

    pub fn data_mode(&self) -> DataMode {
        self.options.data_mode
    }

    pub fn set_data_mode(&mut self, mode: DataMode) {
        self.options.data_mode = mode;
    }

    /// USER/PASS handshake. 331 after USER means a password is
    /// required; 230 at either step completes the login. A rejection
    /// leaves the session connected so the caller may retry with other
    /// credentials.
    pub fn login(&mut self, user: &str, pass: &str) -> Result<()> {
        self.require_state(SessionState::Connected, "login")?;

        let reply = self.exchange(&Command::User(user.to_string()))?;
        match reply.code {
            codes::USER_LOGGED_IN => {
                info!("Logged in as {user} (no password required)");
                self.state = SessionState::LoggedIn;
                Ok(())
            }
            codes::NEED_PASSWORD => {
                self.state = SessionState::AwaitingPassword;
                let reply = match self.exchange(&Command::Pass(pass.to_string())) {
                    Ok(reply) => reply,
                    Err(e) => {
                        if !e.is_fatal() {
                            self.state = SessionState::Connected;
                        }
                        return Err(e);
                    }
                };
                if reply.code == codes::USER_LOGGED_IN {
                    info!("Logged in as {user}");
                    self.state = SessionState::LoggedIn;
                    Ok(())
                } else {
                    self.state = SessionState::Connected;
                    Err(FtpError::Auth {
                        code: reply.code,
                        message: reply.message().to_string(),
                    })
                }
            }
            _ => {
                self.state = SessionState::Connected;
                Err(FtpError::Auth {
                    code: reply.code,
                    message: reply.message().to_string(),
                })
            }
        }
    }

    /// CWD. On 250 the session's current path is updated; on rejection
    /// it is left untouched.
    pub fn change_directory(&mut self, path: &str) -> Result<()> {
        self.require_state(SessionState::LoggedIn, "change directory")?;

        let reply = self.exchange(&Command::Cwd(path.to_string()))?;
        if reply.code == codes::FILE_ACTION_COMPLETE {
            self.current_path = join_remote_path(&self.current_path, path);
            debug!("Current remote path is now {}", self.current_path);
            Ok(())
        } else {
            Err(FtpError::Navigation {
                code: reply.code,
                message: reply.message().to_string(),
            })
        }
    }

    /// PWD. Returns the server's idea of the working directory and
    /// resynchronises the session's cached path with it.
    pub fn working_directory(&mut self) -> Result<String> {
        self.require_state(SessionState::LoggedIn, "query working directory")?;

        let reply = self.exchange(&Command::Pwd)?;
        if reply.code != codes::PATHNAME_CREATED {
            return Err(FtpError::Navigation {
                code: reply.code,
                message: reply.message().to_string(),
            });
        }

        // 257 carries the path in double quotes: 257 "/pub" is cwd.
        let message = reply.message().to_string();
        let path = message
            .split('"')
            .nth(1)
            .ok_or_else(|| FtpError::Protocol(format!("PWD reply without quoted path: {reply}")))?
            .to_string();
        self.current_path = path.clone();
        Ok(path)
    }

    /// LIST over a fresh data channel. Returns parsed entries; they are
    /// not retained by the session.
    pub fn list(&mut self, path: Option<&str>) -> Result<Vec<DirectoryEntry>> {
        self.require_state(SessionState::LoggedIn, "list directory")?;

        let reject = |code, message| FtpError::Listing { code, message };
        self.set_transfer_type(TransferType::Ascii, reject)?;
        let mut data = self.open_data_channel(reject)?;

        let command = Command::List(path.map(str::to_string));
        let opening = self.exchange(&command)?;
        if !opening.is_preliminary() && !opening.is_success() {
            data.close();
            return Err(reject(opening.code, opening.message().to_string()));
        }

        let raw = match self.receive_listing(&mut data) {
            Ok(raw) => raw,
            Err(e) => {
                self.abort_transfer(&mut data);
                return Err(e);
            }
        };

        let closing = self.read_reply()?;
        if !closing.is_success() {
            return Err(reject(closing.code, closing.message().to_string()));
        }

        let entries = parse_listing(&raw);
        debug!("Parsed {} directory entries", entries.len());
        Ok(entries)
    }

    /// STOR: stream the source's bytes to the given remote path.
    ///
    /// At-most-once, no auto-retry. A mid-transfer failure aborts the
    /// data connection and rolls the session back to logged in; a
    /// partially written remote file may remain on the server.
    pub fn upload<R: Read>(&mut self, remote_path: &str, source: &mut R) -> Result<TransferStats> {
        self.require_state(SessionState::LoggedIn, "upload")?;
        self.run_transfer(Command::Stor(remote_path.to_string()), |data| {
            transfer::send_stream(data, source)
        })
    }

    /// RETR: stream the remote file into the caller's sink.
    pub fn download<W: Write>(&mut self, remote_path: &str, sink: &mut W) -> Result<TransferStats> {
        self.require_state(SessionState::LoggedIn, "download")?;
        self.run_transfer(Command::Retr(remote_path.to_string()), |data| {
            transfer::receive_stream(data, sink)
        })
    }

    /// MKD.
    pub fn make_directory(&mut self, path: &str) -> Result<()> {
        self.file_operation(Command::Mkd(path.to_string()), "create directory")
    }

    /// RMD.
    pub fn remove_directory(&mut self, path: &str) -> Result<()> {
        self.file_operation(Command::Rmd(path.to_string()), "remove directory")
    }

    /// DELE.
    pub fn delete_file(&mut self, path: &str) -> Result<()> {
        self.file_operation(Command::Dele(path.to_string()), "delete file")
    }

    /// Graceful teardown: best-effort QUIT, then the socket is
    /// released. The session is terminal afterwards; connect a new one
    /// to reach the server again.
    pub fn disconnect(&mut self) {
        self.control.close();
        self.state = SessionState::Disconnected;
    }

    // --- internals ---

    fn require_state(&self, required: SessionState, operation: &'static str) -> Result<()> {
        if self.state == required {
            Ok(())
        } else {
            Err(FtpError::State {
                operation,
                state: self.state,
            })
        }
    }

    /// One command/reply exchange. A lost control channel is fatal and
    /// forces the session into the disconnected state.
    fn exchange(&mut self, command: &Command) -> Result<Reply> {
        let result = self.control.exchange(command);
        self.note_fatal(&result);
        result
    }

    fn read_reply(&mut self) -> Result<Reply> {
        let result = self.control.read_reply();
        self.note_fatal(&result);
        result
    }

    fn note_fatal<T>(&mut self, result: &Result<T>) {
        if let Err(e) = result {
            if e.is_fatal() {
                warn!("Control channel lost, session is disconnected");
                self.state = SessionState::Disconnected;
            }
        }
    }

    fn set_transfer_type(
        &mut self,
        transfer_type: TransferType,
        reject: impl Fn(u16, String) -> FtpError,
    ) -> Result<()> {
        let reply = self.exchange(&Command::Type(transfer_type))?;
        if reply.is_success() {
            Ok(())
        } else {
            Err(reject(reply.code, reply.message().to_string()))
        }
    }

    /// Negotiate the data channel per the session's mode. Passive mode
    /// connects to the 227 address before the transfer command is
    /// sent; active mode binds a listener and advertises it with PORT,
    /// accepting only after the server acknowledges the command.
    fn open_data_channel(
        &mut self,
        reject: impl Fn(u16, String) -> FtpError,
    ) -> Result<DataConnection> {
        match self.options.data_mode {
            DataMode::Passive => {
                let reply = self.exchange(&Command::Pasv)?;
                if reply.code != codes::ENTERING_PASSIVE_MODE {
                    return Err(reject(reply.code, reply.message().to_string()));
                }
                let addr = parse_pasv_reply(&reply)?;
                DataConnection::open_passive(addr, self.options.timeout)
            }
            DataMode::Active => {
                let data = DataConnection::listen_active(
                    Ipv4Addr::UNSPECIFIED,
                    self.options.data_ports,
                    self.options.timeout,
                )?;
                let advertised =
                    SocketAddrV4::new(self.control.local_ipv4()?, data.local_port()?);
                let reply =
                    self.exchange(&Command::Port(format_port_argument(&advertised)))?;
                if !reply.is_success() {
                    return Err(reject(reply.code, reply.message().to_string()));
                }
                Ok(data)
            }
        }
    }

    /// Shared STOR/RETR sequencing: TYPE I, data-channel negotiation,
    /// transfer command, byte movement, final reply.
    fn run_transfer(
        &mut self,
        command: Command,
        move_bytes: impl FnOnce(&mut DataConnection) -> Result<TransferStats>,
    ) -> Result<TransferStats> {
        let reject = |code, message| FtpError::Transfer {
            code: Some(code),
            message,
        };
        self.set_transfer_type(TransferType::Binary, reject)?;
        let mut data = self.open_data_channel(reject)?;

        let opening = self.exchange(&command)?;
        if !opening.is_preliminary() && !opening.is_success() {
            data.close();
            return Err(reject(opening.code, opening.message().to_string()));
        }

        self.state = SessionState::Transferring;
        let stats = match self.move_payload(&mut data, move_bytes) {
            Ok(stats) => stats,
            Err(e) => {
                self.abort_transfer(&mut data);
                return Err(e);
            }
        };
        data.close();

        let closing = match self.read_reply() {
            Ok(reply) => reply,
            Err(e) => {
                if !e.is_fatal() {
                    self.state = SessionState::LoggedIn;
                }
                return Err(e);
            }
        };
        self.state = SessionState::LoggedIn;
        if !closing.is_success() {
            return Err(FtpError::Transfer {
                code: Some(closing.code),
                message: closing.message().to_string(),
            });
        }

        info!(
            "Transfer complete: {} bytes in {:.1?}",
            stats.bytes, stats.elapsed
        );
        Ok(stats)
    }

    /// Finish the inbound side of the data channel (active mode waits
    /// for the server to dial in) and move the payload bytes.
    fn move_payload(
        &mut self,
        data: &mut DataConnection,
        move_bytes: impl FnOnce(&mut DataConnection) -> Result<TransferStats>,
    ) -> Result<TransferStats> {
        if self.options.data_mode == DataMode::Active {
            data.accept()?;
        }
        move_bytes(data)
    }

    /// Listing counterpart of `move_payload`.
    fn receive_listing(&mut self, data: &mut DataConnection) -> Result<String> {
        if self.options.data_mode == DataMode::Active {
            data.accept()?;
        }
        transfer::receive_listing_text(data)
    }

    /// Abandon a transfer the server has already acknowledged: close
    /// the data connection and drain the final reply it still owes us
    /// best-effort, so the control channel stays in lockstep. Losing
    /// the control channel during the drain forces disconnection.
    fn abort_transfer(&mut self, data: &mut DataConnection) {
        data.close();
        let _ = self.control.read_reply();
        self.state = if self.control.is_open() {
            SessionState::LoggedIn
        } else {
            SessionState::Disconnected
        };
    }

    /// Single command/reply operations: MKD, RMD, DELE.
    fn file_operation(&mut self, command: Command, operation: &'static str) -> Result<()> {
        self.require_state(SessionState::LoggedIn, operation)?;

        let reply = self.exchange(&command)?;
        if reply.class() == ReplyClass::Success {
            Ok(())
        } else {
            Err(FtpError::FileOperation {
                code: reply.code,
                message: reply.message().to_string(),
            })
        }
    }
}

impl Drop for FtpSession {
    fn drop(&mut self) {
        if self.state != SessionState::Disconnected {
            self.disconnect();
        }
    }
}

/// Resolve a CWD argument against the cached path. Absolute arguments
/// replace it; `..` pops one component; other relative arguments
/// append.
fn join_remote_path(current: &str, arg: &str) -> String {
    if arg.starts_with('/') {
        return normalise(arg);
    }

    let mut parts: Vec<&str> = current.split('/').filter(|p| !p.is_empty()).collect();
    for piece in arg.split('/').filter(|p| !p.is_empty() && *p != ".") {
        if piece == ".." {
            parts.pop();
        } else {
            parts.push(piece);
        }
    }
    format!("/{}", parts.join("/"))
}

fn normalise(path: &str) -> String {
    let parts: Vec<&str> = path.split('/').filter(|p| !p.is_empty()).collect();
    format!("/{}", parts.join("/"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn absolute_cwd_replaces_path() {
        assert_eq!(join_remote_path("/pub/docs", "/var/ftp"), "/var/ftp");
        assert_eq!(join_remote_path("/pub", "/"), "/");
    }

    #[test]
    fn relative_cwd_appends() {
        assert_eq!(join_remote_path("/", "pub"), "/pub");
        assert_eq!(join_remote_path("/pub", "docs/2024"), "/pub/docs/2024");
    }

    #[test]
    fn dot_dot_pops_a_component() {
        assert_eq!(join_remote_path("/pub/docs", ".."), "/pub");
        assert_eq!(join_remote_path("/", ".."), "/");
        assert_eq!(join_remote_path("/pub", "../uploads"), "/uploads");
    }

    #[test]
    fn state_displays_lowercase() {
        assert_eq!(SessionState::LoggedIn.to_string(), "logged in");
        assert_eq!(SessionState::Disconnected.to_string(), "disconnected");
    }
}
