//! Control and data connection management

pub mod control;
pub mod data;

pub use control::ControlConnection;
pub use data::{format_port_argument, parse_pasv_reply, DataConnection, DataMode};
