use std::fmt;

use crate::session::SessionState;

/// Error type covering every failure mode of the FTP session core.
///
/// Variants that represent a server rejection carry the numeric reply
/// code and the server's message text so front ends can display them.
#[derive(Debug)]
pub enum FtpError {
    /// Socket/transport failure or unexpected close of a connection.
    Connection(String),

    /// Malformed reply line, unclosed multi-line reply, or an
    /// unparsable PASV address.
    Protocol(String),

    /// Credentials rejected during USER/PASS handshake.
    Auth { code: u16, message: String },

    /// Server rejected CWD/PWD.
    Navigation { code: u16, message: String },

    /// Server rejected LIST.
    Listing { code: u16, message: String },

    /// Server rejected MKD/RMD/DELE.
    FileOperation { code: u16, message: String },

    /// I/O failure while moving bytes over the data channel, or a
    /// non-success final reply after a transfer.
    Transfer { code: Option<u16>, message: String },

    /// Operation invalid in the session's current state. Nothing was
    /// sent over the wire.
    State {
        operation: &'static str,
        state: SessionState,
    },

    /// Configuration file missing, unreadable, or invalid.
    Config(String),

    /// Local I/O outside the protocol paths (terminal input, local files).
    Io(std::io::Error),
}

impl fmt::Display for FtpError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Connection(msg) => write!(f, "Connection error: {msg}"),
            Self::Protocol(msg) => write!(f, "Protocol error: {msg}"),
            Self::Auth { code, message } => {
                write!(f, "Authentication failed ({code}): {message}")
            }
            Self::Navigation { code, message } => {
                write!(f, "Navigation failed ({code}): {message}")
            }
            Self::Listing { code, message } => {
                write!(f, "Listing failed ({code}): {message}")
            }
            Self::FileOperation { code, message } => {
                write!(f, "File operation failed ({code}): {message}")
            }
            Self::Transfer { code, message } => match code {
                Some(code) => write!(f, "Transfer failed ({code}): {message}"),
                None => write!(f, "Transfer failed: {message}"),
            },
            Self::State { operation, state } => {
                write!(f, "Cannot {operation} while {state}")
            }
            Self::Config(msg) => write!(f, "Configuration error: {msg}"),
            Self::Io(err) => write!(f, "IO error: {err}"),
        }
    }
}

impl std::error::Error for FtpError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Io(err) => Some(err),
            _ => None,
        }
    }
}

impl From<std::io::Error> for FtpError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err)
    }
}

impl FtpError {
    /// The server reply code attached to this error, if any.
    pub fn reply_code(&self) -> Option<u16> {
        match self {
            Self::Auth { code, .. }
            | Self::Navigation { code, .. }
            | Self::Listing { code, .. }
            | Self::FileOperation { code, .. } => Some(*code),
            Self::Transfer { code, .. } => *code,
            _ => None,
        }
    }

    /// True when the control channel itself is gone and the session
    /// can no longer be used without reconnecting.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::Connection(_))
    }
}

/// Result type alias for convenience.
pub type Result<T> = std::result::Result<T, FtpError>;
