//! Reply decoding for the FTP control channel

pub mod codes;
pub mod parser;

pub use parser::{read_reply, Reply, ReplyClass};
