//! Wire-level FTP command definitions

/// Transfer representation negotiated before a data-channel operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransferType {
    /// ASCII mode, for directory listings.
    Ascii,
    /// Binary (image) mode, for file payloads.
    Binary,
}

/// One command sent over the control channel: a verb plus an optional
/// argument. Constructed per call, never persisted.
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    User(String),
    Pass(String),
    Cwd(String),
    Pwd,
    Type(TransferType),
    Pasv,
    Port(String),
    List(Option<String>),
    Stor(String),
    Retr(String),
    Mkd(String),
    Rmd(String),
    Dele(String),
    Quit,
}

impl Command {
    /// Serialise as an RFC-959 command line, CRLF included.
    pub fn to_wire(&self) -> String {
        match self {
            Command::User(name) => format!("USER {name}\r\n"),
            Command::Pass(pass) => format!("PASS {pass}\r\n"),
            Command::Cwd(path) => format!("CWD {path}\r\n"),
            Command::Pwd => "PWD\r\n".to_string(),
            Command::Type(TransferType::Ascii) => "TYPE A\r\n".to_string(),
            Command::Type(TransferType::Binary) => "TYPE I\r\n".to_string(),
            Command::Pasv => "PASV\r\n".to_string(),
            Command::Port(addr) => format!("PORT {addr}\r\n"),
            Command::List(Some(path)) => format!("LIST {path}\r\n"),
            Command::List(None) => "LIST\r\n".to_string(),
            Command::Stor(path) => format!("STOR {path}\r\n"),
            Command::Retr(path) => format!("RETR {path}\r\n"),
            Command::Mkd(path) => format!("MKD {path}\r\n"),
            Command::Rmd(path) => format!("RMD {path}\r\n"),
            Command::Dele(path) => format!("DELE {path}\r\n"),
            Command::Quit => "QUIT\r\n".to_string(),
        }
    }
}

impl std::fmt::Display for Command {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // Never echo passwords into logs.
        if let Command::Pass(_) = self {
            return write!(f, "PASS ****");
        }
        write!(f, "{}", self.to_wire().trim_end())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn commands_serialise_with_crlf() {
        assert_eq!(Command::User("anna".into()).to_wire(), "USER anna\r\n");
        assert_eq!(Command::Pwd.to_wire(), "PWD\r\n");
        assert_eq!(Command::List(None).to_wire(), "LIST\r\n");
        assert_eq!(
            Command::List(Some("/pub".into())).to_wire(),
            "LIST /pub\r\n"
        );
        assert_eq!(Command::Type(TransferType::Binary).to_wire(), "TYPE I\r\n");
    }

    #[test]
    fn password_is_masked_in_display() {
        let shown = format!("{}", Command::Pass("secret".into()));
        assert!(!shown.contains("secret"));
    }
}
