//! End-to-end session tests against a scripted in-process FTP server.
//!
//! The server speaks just enough RFC 959 over real sockets to exercise
//! the full command/reply and data-channel paths: greeting, USER/PASS,
//! CWD/PWD, TYPE, PASV/PORT, LIST, STOR/RETR, MKD/RMD/DELE, QUIT.

use std::collections::HashMap;
use std::io::{self, BufRead, BufReader, Read, Write};
use std::net::{Ipv4Addr, SocketAddr, SocketAddrV4, TcpListener, TcpStream};
use std::sync::{Arc, Mutex};
use std::thread;

use ftp_session::{DataMode, FtpError, FtpSession, SessionOptions, SessionState};

type FileStore = Arc<Mutex<HashMap<String, Vec<u8>>>>;

const LISTING: &str = "drwxr-xr-x 2 ftp ftp 4096 Jan 12 10:30 pub\r\n\
                       -rw-r--r-- 1 ftp ftp 5120 Mar 3 2024 notes.txt\r\n";

fn start_server() -> (SocketAddr, FileStore) {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();
    let files: FileStore = Arc::new(Mutex::new(HashMap::new()));
    let store = Arc::clone(&files);
    thread::spawn(move || {
        if let Ok((stream, _)) = listener.accept() {
            serve(stream, store);
        }
    });
    (addr, files)
}

fn connect(addr: SocketAddr) -> FtpSession {
    FtpSession::connect(&addr.ip().to_string(), addr.port(), SessionOptions::default()).unwrap()
}

fn logged_in(addr: SocketAddr) -> FtpSession {
    let mut session = connect(addr);
    session.login("anna", "hunter2").unwrap();
    session
}

fn send(control: &mut TcpStream, line: &str) {
    control.write_all(line.as_bytes()).unwrap();
    control.write_all(b"\r\n").unwrap();
}

enum DataEndpoint {
    Pasv(TcpListener),
    Port(SocketAddr),
}

/// Establish the data connection the previous PASV/PORT set up.
fn open_data(endpoint: &mut Option<DataEndpoint>) -> TcpStream {
    match endpoint.take().expect("no data negotiation before transfer") {
        DataEndpoint::Pasv(listener) => listener.accept().unwrap().0,
        DataEndpoint::Port(addr) => TcpStream::connect(addr).unwrap(),
    }
}

fn parse_port_argument(arg: &str) -> SocketAddr {
    let fields: Vec<u16> = arg.split(',').map(|f| f.parse().unwrap()).collect();
    assert_eq!(fields.len(), 6);
    SocketAddr::V4(SocketAddrV4::new(
        Ipv4Addr::new(
            fields[0] as u8,
            fields[1] as u8,
            fields[2] as u8,
            fields[3] as u8,
        ),
        fields[4] * 256 + fields[5],
    ))
}

fn serve(mut control: TcpStream, files: FileStore) {
    let mut reader = BufReader::new(control.try_clone().unwrap());
    send(&mut control, "220-Welcome to the scripted test server");
    send(&mut control, "220 ready");

    let mut data: Option<DataEndpoint> = None;
    let mut line = String::new();
    loop {
        line.clear();
        if reader.read_line(&mut line).unwrap_or(0) == 0 {
            return;
        }
        let input = line.trim_end();
        let (verb, arg) = input.split_once(' ').unwrap_or((input, ""));

        match verb {
            "USER" => {
                if arg == "anon" {
                    send(&mut control, "230 Logged in without password");
                } else {
                    send(&mut control, "331 Password required");
                }
            }
            "PASS" => {
                if arg == "hunter2" {
                    send(&mut control, "230 User logged in, proceed");
                } else {
                    send(&mut control, "530 Login incorrect");
                }
            }
            "CWD" => {
                if arg == "missing" {
                    send(&mut control, "550 No such directory");
                } else {
                    send(&mut control, "250 Directory changed");
                }
            }
            "PWD" => send(&mut control, "257 \"/pub\" is current directory"),
            "TYPE" => send(&mut control, "200 Type set"),
            "PASV" => {
                let listener = TcpListener::bind("127.0.0.1:0").unwrap();
                let port = listener.local_addr().unwrap().port();
                send(
                    &mut control,
                    &format!(
                        "227 Entering Passive Mode (127,0,0,1,{},{})",
                        port / 256,
                        port % 256
                    ),
                );
                data = Some(DataEndpoint::Pasv(listener));
            }
            "PORT" => {
                data = Some(DataEndpoint::Port(parse_port_argument(arg)));
                send(&mut control, "200 PORT command successful");
            }
            "LIST" => {
                send(&mut control, "150 Opening data connection");
                let mut stream = open_data(&mut data);
                stream.write_all(LISTING.as_bytes()).unwrap();
                drop(stream);
                send(&mut control, "226 Transfer complete");
            }
            "STOR" => {
                send(&mut control, "150 Ok to send data");
                let mut stream = open_data(&mut data);
                let mut payload = Vec::new();
                stream.read_to_end(&mut payload).unwrap();
                drop(stream);
                files.lock().unwrap().insert(arg.to_string(), payload);
                send(&mut control, "226 Transfer complete");
            }
            "RETR" => {
                if arg == "truncated.bin" {
                    // Simulate a transfer that dies mid-flight: part of
                    // the payload, an abrupt data close, then a 426.
                    send(&mut control, "150 Opening data connection");
                    let mut stream = open_data(&mut data);
                    stream.write_all(&[0u8; 100]).unwrap();
                    drop(stream);
                    send(&mut control, "426 Transfer aborted");
                    continue;
                }
                let payload = files.lock().unwrap().get(arg).cloned();
                match payload {
                    None => send(&mut control, "550 File unavailable"),
                    Some(payload) => {
                        send(&mut control, "150 Opening data connection");
                        let mut stream = open_data(&mut data);
                        stream.write_all(&payload).unwrap();
                        drop(stream);
                        send(&mut control, "226 Transfer complete");
                    }
                }
            }
            "MKD" => send(&mut control, &format!("257 \"{arg}\" created")),
            "RMD" => send(&mut control, "250 Directory removed"),
            "DELE" => {
                if files.lock().unwrap().remove(arg).is_some() {
                    send(&mut control, "250 File deleted");
                } else {
                    send(&mut control, "550 File unavailable");
                }
            }
            "QUIT" => {
                send(&mut control, "221 Goodbye");
                return;
            }
            _ => send(&mut control, "502 Command not implemented"),
        }
    }
}

#[test]
fn connect_reads_multiline_greeting_and_enters_connected_state() {
    let (addr, _) = start_server();
    let session = connect(addr);
    assert_eq!(session.state(), SessionState::Connected);
}

#[test]
fn login_with_password_reaches_logged_in() {
    let (addr, _) = start_server();
    let mut session = connect(addr);
    session.login("anna", "hunter2").unwrap();
    assert_eq!(session.state(), SessionState::LoggedIn);
}

#[test]
fn login_without_password_requirement_reaches_logged_in() {
    let (addr, _) = start_server();
    let mut session = connect(addr);
    session.login("anon", "ignored").unwrap();
    assert_eq!(session.state(), SessionState::LoggedIn);
}

#[test]
fn rejected_password_is_auth_error_and_leaves_session_connected() {
    let (addr, _) = start_server();
    let mut session = connect(addr);

    let err = session.login("anna", "wrong").unwrap_err();
    match err {
        FtpError::Auth { code, .. } => assert_eq!(code, 530),
        other => panic!("expected Auth error, got {other:?}"),
    }
    assert_eq!(session.state(), SessionState::Connected);

    // A retry with good credentials succeeds on the same session.
    session.login("anna", "hunter2").unwrap();
    assert_eq!(session.state(), SessionState::LoggedIn);
}

#[test]
fn second_login_is_a_state_error_and_sends_nothing() {
    let (addr, _) = start_server();
    let mut session = logged_in(addr);

    let err = session.login("anna", "hunter2").unwrap_err();
    assert!(matches!(err, FtpError::State { .. }));
    assert_eq!(session.state(), SessionState::LoggedIn);

    // The control channel never saw the second USER; it is still in
    // lockstep for the next exchange.
    assert_eq!(session.working_directory().unwrap(), "/pub");
}

#[test]
fn operations_before_login_fail_without_touching_the_network() {
    let (addr, _) = start_server();
    let mut session = connect(addr);

    assert!(matches!(
        session.list(None),
        Err(FtpError::State { .. })
    ));
    assert!(matches!(
        session.upload("x", &mut &b"data"[..]),
        Err(FtpError::State { .. })
    ));

    // Still connected and able to log in afterwards.
    session.login("anna", "hunter2").unwrap();
}

#[test]
fn change_directory_updates_current_path() {
    let (addr, _) = start_server();
    let mut session = logged_in(addr);

    session.change_directory("pub").unwrap();
    assert_eq!(session.current_path(), "/pub");
    session.change_directory("/var/ftp").unwrap();
    assert_eq!(session.current_path(), "/var/ftp");
}

#[test]
fn change_directory_rejection_keeps_path_unchanged() {
    let (addr, _) = start_server();
    let mut session = logged_in(addr);

    let err = session.change_directory("missing").unwrap_err();
    assert_eq!(err.reply_code(), Some(550));
    match err {
        FtpError::Navigation { .. } => {}
        other => panic!("expected Navigation error, got {other:?}"),
    }
    assert_eq!(session.current_path(), "/");
    assert_eq!(session.state(), SessionState::LoggedIn);
}

#[test]
fn working_directory_parses_quoted_path() {
    let (addr, _) = start_server();
    let mut session = logged_in(addr);
    assert_eq!(session.working_directory().unwrap(), "/pub");
    assert_eq!(session.current_path(), "/pub");
}

#[test]
fn upload_then_download_round_trips_content() {
    let (addr, files) = start_server();
    let mut session = logged_in(addr);

    let payload: Vec<u8> = (0..=255u8).cycle().take(20_000).collect();
    let stats = session.upload("blob.bin", &mut payload.as_slice()).unwrap();
    assert_eq!(stats.bytes, payload.len() as u64);
    assert_eq!(
        files.lock().unwrap().get("blob.bin"),
        Some(&payload)
    );

    let mut fetched = Vec::new();
    session.download("blob.bin", &mut fetched).unwrap();
    assert_eq!(fetched, payload);
    assert_eq!(session.state(), SessionState::LoggedIn);
}

#[test]
fn download_of_missing_file_is_transfer_error() {
    let (addr, _) = start_server();
    let mut session = logged_in(addr);

    let mut sink = Vec::new();
    let err = session.download("nope.txt", &mut sink).unwrap_err();
    match err {
        FtpError::Transfer { code, .. } => assert_eq!(code, Some(550)),
        other => panic!("expected Transfer error, got {other:?}"),
    }
    assert!(sink.is_empty());
    assert_eq!(session.state(), SessionState::LoggedIn);
}

#[test]
fn aborted_transfer_rolls_back_and_control_channel_stays_usable() {
    let (addr, _) = start_server();
    let mut session = logged_in(addr);

    let mut sink = Vec::new();
    let err = session.download("truncated.bin", &mut sink).unwrap_err();
    match err {
        FtpError::Transfer { code, .. } => assert_eq!(code, Some(426)),
        other => panic!("expected Transfer error, got {other:?}"),
    }

    // The session rolled back to logged in and the control channel
    // still answers the next command.
    assert_eq!(session.state(), SessionState::LoggedIn);
    assert_eq!(session.working_directory().unwrap(), "/pub");
}

/// Local source that fails partway through being read.
struct FailingReader {
    remaining: usize,
}

impl Read for FailingReader {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if self.remaining == 0 {
            return Err(io::Error::other("local source failed"));
        }
        let n = self.remaining.min(buf.len());
        buf[..n].fill(b'x');
        self.remaining -= n;
        Ok(n)
    }
}

#[test]
fn failed_upload_drains_final_reply_and_stays_in_lockstep() {
    let (addr, _) = start_server();
    let mut session = logged_in(addr);

    // The server has already sent 150 when the local read fails, so it
    // still owes a final reply for the aborted transfer.
    let err = session
        .upload("partial.bin", &mut FailingReader { remaining: 10_000 })
        .unwrap_err();
    assert!(matches!(err, FtpError::Transfer { .. }));

    // The owed reply was drained, not left for the next command.
    assert_eq!(session.state(), SessionState::LoggedIn);
    assert_eq!(session.working_directory().unwrap(), "/pub");
}

#[test]
fn list_returns_parsed_entries() {
    let (addr, _) = start_server();
    let mut session = logged_in(addr);

    let entries = session.list(None).unwrap();
    assert_eq!(entries.len(), 2);
    assert_eq!(entries[0].name, "pub");
    assert!(entries[0].is_directory);
    assert_eq!(entries[1].name, "notes.txt");
    assert!(!entries[1].is_directory);
    assert_eq!(entries[1].size, Some(5120));
}

#[test]
fn active_mode_list_uses_port_negotiation() {
    let (addr, _) = start_server();
    let mut session = logged_in(addr);
    session.set_data_mode(DataMode::Active);

    let entries = session.list(Some("/pub")).unwrap();
    assert_eq!(entries.len(), 2);
    assert_eq!(session.state(), SessionState::LoggedIn);
}

#[test]
fn directory_management_operations() {
    let (addr, files) = start_server();
    let mut session = logged_in(addr);

    session.make_directory("incoming").unwrap();
    session.remove_directory("incoming").unwrap();

    files
        .lock()
        .unwrap()
        .insert("old.txt".to_string(), b"x".to_vec());
    session.delete_file("old.txt").unwrap();

    let err = session.delete_file("old.txt").unwrap_err();
    match err {
        FtpError::FileOperation { code, .. } => assert_eq!(code, 550),
        other => panic!("expected FileOperation error, got {other:?}"),
    }
    assert_eq!(session.state(), SessionState::LoggedIn);
}

#[test]
fn disconnect_is_terminal() {
    let (addr, _) = start_server();
    let mut session = logged_in(addr);

    session.disconnect();
    assert_eq!(session.state(), SessionState::Disconnected);
    assert!(matches!(
        session.change_directory("pub"),
        Err(FtpError::State { .. })
    ));
}
