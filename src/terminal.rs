//! Interactive terminal front end
//!
//! A thin shell over the session core: parses user input, invokes
//! session operations, and renders results and errors. Local files for
//! uploads and downloads are resolved against the configured local
//! directory.

use std::fs::File;
use std::io::{self, BufReader, BufWriter, Write};
use std::path::PathBuf;

use log::debug;

use crate::config::ClientConfig;
use crate::connection::DataMode;
use crate::error::{FtpError, Result};
use crate::listing::DirectoryEntry;
use crate::session::{FtpSession, SessionState};
use crate::transfer::format_bytes;

/// One parsed line of user input.
#[derive(Debug, Clone, PartialEq)]
enum ShellCommand {
    Login(String, String),
    User(String),
    Pass(String),
    List(Option<String>),
    Cwd(String),
    Pwd,
    Get(String),
    Put(String),
    Mkdir(String),
    Rmdir(String),
    Delete(String),
    Passive,
    Active,
    Help,
    Quit,
    Invalid(String),
}

fn parse_input(input: &str) -> ShellCommand {
    let mut parts = input.trim().splitn(3, char::is_whitespace);
    let verb = parts.next().unwrap_or("").to_uppercase();
    let first = parts.next().unwrap_or("").trim();
    let second = parts.next().unwrap_or("").trim();

    let required = |arg: &str, make: fn(String) -> ShellCommand, usage: &str| {
        if arg.is_empty() {
            ShellCommand::Invalid(format!("usage: {usage}"))
        } else {
            make(arg.to_string())
        }
    };

    match verb.as_str() {
        "LOGIN" => {
            if first.is_empty() || second.is_empty() {
                ShellCommand::Invalid("usage: LOGIN <user> <password>".to_string())
            } else {
                ShellCommand::Login(first.to_string(), second.to_string())
            }
        }
        "USER" => required(first, ShellCommand::User, "USER <name>"),
        "PASS" => required(first, ShellCommand::Pass, "PASS <password>"),
        "LIST" | "LS" => ShellCommand::List((!first.is_empty()).then(|| first.to_string())),
        "CWD" | "CD" => required(first, ShellCommand::Cwd, "CWD <path>"),
        "PWD" => ShellCommand::Pwd,
        "RETR" | "GET" => required(first, ShellCommand::Get, "GET <remote-file>"),
        "STOR" | "PUT" => required(first, ShellCommand::Put, "PUT <local-file>"),
        "MKD" | "MKDIR" => required(first, ShellCommand::Mkdir, "MKD <path>"),
        "RMD" | "RMDIR" => required(first, ShellCommand::Rmdir, "RMD <path>"),
        "DELE" | "RM" => required(first, ShellCommand::Delete, "DELE <path>"),
        "PASV" => ShellCommand::Passive,
        "PORT" => ShellCommand::Active,
        "HELP" | "?" => ShellCommand::Help,
        "QUIT" | "EXIT" => ShellCommand::Quit,
        other => ShellCommand::Invalid(format!("unknown command '{other}', try HELP")),
    }
}

const HELP_TEXT: &str = "\
Commands:
  LOGIN <user> <pass>   authenticate in one step
  USER <name>           supply username (follow with PASS)
  PASS <password>       supply password for the pending USER
  LIST [path]  (LS)     list a remote directory
  CWD <path>   (CD)     change remote directory
  PWD                   show remote working directory
  GET <file>   (RETR)   download into the local directory
  PUT <file>   (STOR)   upload from the local directory
  MKD <path>   (MKDIR)  create remote directory
  RMD <path>   (RMDIR)  remove remote directory
  DELE <path>  (RM)     delete remote file
  PASV / PORT           choose passive or active data mode
  HELP                  this text
  QUIT                  close the session and exit";

/// Interactive shell bound to one server.
pub struct Terminal {
    config: ClientConfig,
    session: Option<FtpSession>,
    pending_user: Option<String>,
}

impl Terminal {
    pub fn new(config: ClientConfig) -> Self {
        Self {
            config,
            session: None,
            pending_user: None,
        }
    }

    /// Connect, then loop on user input until QUIT or EOF.
    pub fn run(&mut self) -> Result<()> {
        println!("ftp-session interactive shell");
        println!("Server: {}", self.config);

        match FtpSession::connect(
            &self.config.server.host,
            self.config.server.port,
            self.config.session_options()?,
        ) {
            Ok(session) => {
                println!("Connected to {}", session.peer());
                self.session = Some(session);
            }
            Err(e) => {
                println!("Connection failed: {e}");
                return Err(e);
            }
        }

        let stdin = io::stdin();
        loop {
            let state = self
                .session
                .as_ref()
                .map(|s| s.state())
                .unwrap_or(SessionState::Disconnected);
            print!("ftp ({state})> ");
            io::stdout().flush()?;

            let mut input = String::new();
            if stdin.read_line(&mut input)? == 0 {
                break; // EOF
            }
            if input.trim().is_empty() {
                continue;
            }

            debug!("User input: {}", input.trim());
            match self.dispatch(parse_input(&input)) {
                Ok(keep_going) => {
                    if !keep_going {
                        break;
                    }
                }
                Err(e) => println!("Error: {e}"),
            }
        }

        if let Some(mut session) = self.session.take() {
            session.disconnect();
        }
        Ok(())
    }

    fn dispatch(&mut self, command: ShellCommand) -> Result<bool> {
        match command {
            ShellCommand::Help => {
                println!("{HELP_TEXT}");
                return Ok(true);
            }
            ShellCommand::Invalid(message) => {
                println!("{message}");
                return Ok(true);
            }
            ShellCommand::Quit => {
                if let Some(mut session) = self.session.take() {
                    session.disconnect();
                }
                println!("Goodbye.");
                return Ok(false);
            }
            _ => {}
        }

        let session = self.session.as_mut().ok_or_else(|| {
            FtpError::Connection("no active session, restart to reconnect".to_string())
        })?;

        match command {
            ShellCommand::Login(user, pass) => {
                session.login(&user, &pass)?;
                println!("Logged in.");
            }
            ShellCommand::User(name) => {
                self.pending_user = Some(name);
                println!("Username noted; supply PASS <password> to log in.");
            }
            ShellCommand::Pass(pass) => match self.pending_user.take() {
                Some(user) => {
                    session.login(&user, &pass)?;
                    println!("Logged in.");
                }
                None => println!("No pending username; use USER <name> first."),
            },
            ShellCommand::List(path) => {
                let entries = session.list(path.as_deref())?;
                print_listing(&entries);
            }
            ShellCommand::Cwd(path) => {
                session.change_directory(&path)?;
                println!("Remote directory: {}", session.current_path());
            }
            ShellCommand::Pwd => println!("{}", session.working_directory()?),
            ShellCommand::Get(remote) => {
                let local = local_path(&self.config.client.local_directory, file_name_of(&remote));
                let file = File::create(&local)?;
                let mut sink = BufWriter::new(file);
                let stats = session.download(&remote, &mut sink)?;
                println!(
                    "Downloaded {} to {} ({} in {:.1?})",
                    remote,
                    local.display(),
                    format_bytes(stats.bytes),
                    stats.elapsed
                );
            }
            ShellCommand::Put(local_name) => {
                let local = local_path(&self.config.client.local_directory, &local_name);
                let file = File::open(&local).map_err(|e| {
                    FtpError::Io(io::Error::new(
                        e.kind(),
                        format!("cannot open '{}': {e}", local.display()),
                    ))
                })?;
                let mut source = BufReader::new(file);
                let stats = session.upload(file_name_of(&local_name), &mut source)?;
                println!(
                    "Uploaded {} ({} in {:.1?})",
                    local.display(),
                    format_bytes(stats.bytes),
                    stats.elapsed
                );
            }
            ShellCommand::Mkdir(path) => {
                session.make_directory(&path)?;
                println!("Directory created: {path}");
            }
            ShellCommand::Rmdir(path) => {
                session.remove_directory(&path)?;
                println!("Directory removed: {path}");
            }
            ShellCommand::Delete(path) => {
                session.delete_file(&path)?;
                println!("Deleted: {path}");
            }
            ShellCommand::Passive => {
                session.set_data_mode(DataMode::Passive);
                println!("Data mode: passive");
            }
            ShellCommand::Active => {
                session.set_data_mode(DataMode::Active);
                println!("Data mode: active");
            }
            ShellCommand::Help | ShellCommand::Invalid(_) | ShellCommand::Quit => unreachable!(),
        }
        Ok(true)
    }

}

fn local_path(local_directory: &str, name: &str) -> PathBuf {
    PathBuf::from(local_directory).join(name)
}

fn file_name_of(path: &str) -> &str {
    path.rsplit('/').next().unwrap_or(path)
}

fn print_listing(entries: &[DirectoryEntry]) {
    if entries.is_empty() {
        println!("Directory is empty.");
        return;
    }

    println!("{:<40} {:>6} {:>10} {:>16}", "Name", "Type", "Size", "Modified");
    println!("{}", "-".repeat(76));
    for entry in entries {
        let kind = if entry.is_directory { "dir" } else { "file" };
        let size = entry
            .size
            .map(format_bytes)
            .unwrap_or_else(|| "-".to_string());
        let modified = entry
            .modified
            .map(|dt| dt.format("%Y-%m-%d %H:%M").to_string())
            .unwrap_or_else(|| "-".to_string());
        println!("{:<40} {:>6} {:>10} {:>16}", entry.name, kind, size, modified);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_commands_with_aliases() {
        assert_eq!(parse_input("ls /pub"), ShellCommand::List(Some("/pub".into())));
        assert_eq!(parse_input("LIST"), ShellCommand::List(None));
        assert_eq!(parse_input("cd uploads"), ShellCommand::Cwd("uploads".into()));
        assert_eq!(parse_input("get a.txt"), ShellCommand::Get("a.txt".into()));
        assert_eq!(
            parse_input("login anna hunter2"),
            ShellCommand::Login("anna".into(), "hunter2".into())
        );
    }

    #[test]
    fn missing_arguments_are_invalid() {
        assert!(matches!(parse_input("CWD"), ShellCommand::Invalid(_)));
        assert!(matches!(parse_input("LOGIN anna"), ShellCommand::Invalid(_)));
        assert!(matches!(parse_input("frobnicate"), ShellCommand::Invalid(_)));
    }

    #[test]
    fn file_name_strips_remote_directories() {
        assert_eq!(file_name_of("/pub/docs/a.txt"), "a.txt");
        assert_eq!(file_name_of("plain.txt"), "plain.txt");
    }
}
