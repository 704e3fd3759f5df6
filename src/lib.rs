//! A minimal FTP control-channel client core.
//!
//! Connection lifecycle, command/response sequencing, reply-code
//! interpretation, and PASV/PORT data transfers, behind a narrow
//! operation-call interface. No TLS, no pipelining: one session, one
//! command in flight, synchronous throughout. Callers supply the byte
//! sinks and sources for transfers; the core never opens local files.
//!
//! # Example
//! ```no_run
//! use ftp_session::{FtpSession, SessionOptions};
//!
//! fn main() -> ftp_session::Result<()> {
//!     let mut session = FtpSession::connect("test.rebex.net", 21, SessionOptions::default())?;
//!     session.login("demo", "password")?;
//!
//!     for entry in session.list(None)? {
//!         println!("{}", entry.name);
//!     }
//!
//!     let mut readme = Vec::new();
//!     session.download("/readme.txt", &mut readme)?;
//!
//!     session.disconnect();
//!     Ok(())
//! }
//! ```

pub mod command;
pub mod config;
pub mod connection;
pub mod error;
pub mod listing;
pub mod reply;
pub mod session;
pub mod terminal;
pub mod transfer;

pub use command::{Command, TransferType};
pub use connection::{ControlConnection, DataConnection, DataMode};
pub use error::{FtpError, Result};
pub use listing::DirectoryEntry;
pub use reply::{Reply, ReplyClass};
pub use session::{FtpSession, SessionOptions, SessionState};
pub use transfer::TransferStats;
