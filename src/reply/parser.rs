//! FTP reply parsing
//!
//! Decodes raw control-channel lines into structured replies. A line
//! `DDD<space>text` is a complete single-line reply; `DDD-text` opens a
//! multi-line block that runs until a `DDD<space>...` line with the same
//! code closes it.

use std::io::BufRead;

use log::debug;

use crate::error::{FtpError, Result};

/// Class of a reply, taken from the first digit of its code.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReplyClass {
    Preliminary,
    Success,
    Intermediate,
    TransientFailure,
    PermanentFailure,
}

/// Structured reply from the server.
#[derive(Debug, Clone, PartialEq)]
pub struct Reply {
    /// Three-digit reply code (e.g. 230, 331, 550).
    pub code: u16,

    /// Whether the reply spanned more than one line.
    pub is_multiline: bool,

    /// All lines of the reply, verbatim, CRLF stripped.
    pub lines: Vec<String>,
}

impl Reply {
    pub fn class(&self) -> ReplyClass {
        match self.code / 100 {
            1 => ReplyClass::Preliminary,
            2 => ReplyClass::Success,
            3 => ReplyClass::Intermediate,
            4 => ReplyClass::TransientFailure,
            _ => ReplyClass::PermanentFailure,
        }
    }

    pub fn is_success(&self) -> bool {
        self.class() == ReplyClass::Success
    }

    pub fn is_preliminary(&self) -> bool {
        self.class() == ReplyClass::Preliminary
    }

    /// The message text of the first line, without the code prefix.
    pub fn message(&self) -> &str {
        self.lines
            .first()
            .map(|line| line[4.min(line.len())..].trim())
            .unwrap_or("")
    }

    /// All lines joined for display, multi-line payload included.
    pub fn text(&self) -> String {
        self.lines.join("\n")
    }
}

impl std::fmt::Display for Reply {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} {}", self.code, self.message())
    }
}

/// Decoded first line of a reply: code plus whether more lines follow.
struct FirstLine {
    code: u16,
    opens_multiline: bool,
}

/// Parse the `DDD<sep>` prefix of a reply's first line.
///
/// Works on raw bytes: the line may carry arbitrary UTF-8, so no
/// string slicing happens before the ASCII prefix is validated.
fn parse_first_line(line: &str) -> Result<FirstLine> {
    let bytes = line.as_bytes();
    if bytes.len() < 3 || !bytes[..3].iter().all(|b| b.is_ascii_digit()) {
        return Err(FtpError::Protocol(format!(
            "reply does not start with a three-digit code: '{line}'"
        )));
    }
    let code = bytes[..3]
        .iter()
        .fold(0u16, |acc, b| acc * 10 + u16::from(b - b'0'));

    match bytes.get(3) {
        Some(b' ') => Ok(FirstLine {
            code,
            opens_multiline: false,
        }),
        Some(b'-') => Ok(FirstLine {
            code,
            opens_multiline: true,
        }),
        Some(_) => Err(FtpError::Protocol(format!(
            "missing separator after reply code: '{line}'"
        ))),
        None => Err(FtpError::Protocol(format!(
            "reply line truncated after code: '{line}'"
        ))),
    }
}

/// True for the `DDD<space>` line that closes a multi-line reply.
fn closes_multiline(line: &str, code: u16) -> bool {
    line.len() >= 4
        && line.starts_with(&format!("{code:03}"))
        && line.as_bytes()[3] == b' '
}

/// Read one complete reply from the stream, blocking until the final
/// line of a multi-line block is seen.
pub fn read_reply<R: BufRead>(reader: &mut R) -> Result<Reply> {
    let first = read_line(reader)?.ok_or_else(|| {
        FtpError::Connection("control channel closed while awaiting reply".to_string())
    })?;

    let FirstLine {
        code,
        opens_multiline,
    } = parse_first_line(&first)?;

    let mut lines = vec![first];
    if opens_multiline {
        loop {
            let line = read_line(reader)?.ok_or_else(|| {
                FtpError::Protocol(format!(
                    "control channel closed inside a {code} multi-line reply"
                ))
            })?;
            let done = closes_multiline(&line, code);
            lines.push(line);
            if done {
                break;
            }
        }
    }

    let reply = Reply {
        code,
        is_multiline: opens_multiline,
        lines,
    };
    debug!("<- {reply}");
    Ok(reply)
}

/// Read one CRLF-terminated line, `None` on a cleanly closed stream.
fn read_line<R: BufRead>(reader: &mut R) -> Result<Option<String>> {
    let mut line = String::new();
    let n = reader
        .read_line(&mut line)
        .map_err(|e| FtpError::Connection(format!("read failed: {e}")))?;
    if n == 0 {
        return Ok(None);
    }
    while line.ends_with('\n') || line.ends_with('\r') {
        line.pop();
    }
    Ok(Some(line))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn parse(input: &str) -> Result<Reply> {
        read_reply(&mut Cursor::new(input.as_bytes()))
    }

    #[test]
    fn single_line_reply() {
        let reply = parse("220 ready\r\n").unwrap();
        assert_eq!(reply.code, 220);
        assert!(!reply.is_multiline);
        assert_eq!(reply.message(), "ready");
        assert_eq!(reply.class(), ReplyClass::Success);
    }

    #[test]
    fn multiline_reply_accumulates_until_closing_code() {
        let reply = parse("211-Features:\r\n extra\r\n211 End\r\n").unwrap();
        assert_eq!(reply.code, 211);
        assert!(reply.is_multiline);
        assert_eq!(
            reply.lines,
            vec!["211-Features:", " extra", "211 End"]
        );
    }

    #[test]
    fn interleaved_code_lines_do_not_close_early() {
        let reply = parse("230-Welcome\r\n230-still going\r\n230 done\r\n").unwrap();
        assert_eq!(reply.lines.len(), 3);
        assert_eq!(reply.code, 230);
    }

    #[test]
    fn malformed_first_line_is_protocol_error() {
        assert!(matches!(parse("abc text\r\n"), Err(FtpError::Protocol(_))));
        assert!(matches!(parse("22 ready\r\n"), Err(FtpError::Protocol(_))));
        assert!(matches!(parse("220_ready\r\n"), Err(FtpError::Protocol(_))));
    }

    #[test]
    fn multibyte_garbage_first_line_is_protocol_error() {
        // A multi-byte character straddling the code prefix must not panic.
        assert!(matches!(
            parse("ab\u{e9} hello\r\n"),
            Err(FtpError::Protocol(_))
        ));
        assert!(matches!(parse("\u{e9}\u{e9} 220\r\n"), Err(FtpError::Protocol(_))));
    }

    #[test]
    fn unterminated_multiline_is_protocol_error() {
        assert!(matches!(
            parse("220-hello\r\nmore\r\n"),
            Err(FtpError::Protocol(_))
        ));
    }

    #[test]
    fn closed_channel_before_any_line_is_connection_error() {
        assert!(matches!(parse(""), Err(FtpError::Connection(_))));
    }

    #[test]
    fn reply_classes() {
        assert_eq!(parse("150 opening\r\n").unwrap().class(), ReplyClass::Preliminary);
        assert_eq!(parse("331 need pass\r\n").unwrap().class(), ReplyClass::Intermediate);
        assert_eq!(parse("421 busy\r\n").unwrap().class(), ReplyClass::TransientFailure);
        assert_eq!(parse("550 missing\r\n").unwrap().class(), ReplyClass::PermanentFailure);
    }
}
