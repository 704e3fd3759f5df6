use std::process;

use ftp_session::config::ClientConfig;
use ftp_session::terminal::Terminal;

const DEFAULT_CONFIG_PATH: &str = "ftp-session.toml";

fn main() {
    env_logger::init();

    let config_path = std::env::args()
        .nth(1)
        .unwrap_or_else(|| DEFAULT_CONFIG_PATH.to_string());

    let config = match ClientConfig::load(&config_path) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Configuration error: {e}");
            print_usage();
            process::exit(1);
        }
    };

    let mut terminal = Terminal::new(config);
    if let Err(e) = terminal.run() {
        eprintln!("Session error: {e}");
        process::exit(1);
    }
}

fn print_usage() {
    println!("ftp-session [config.toml]");
    println!("Environment overrides:");
    println!("  FTP_SESSION_HOST=ftp.example.net");
    println!("  FTP_SESSION_PORT=21");
    println!("  FTP_SESSION_TIMEOUT=30");
    println!("  FTP_SESSION_LOCAL_DIR=./downloads");
    println!("  FTP_SESSION_DATA_MODE=passive");
    println!("  RUST_LOG=debug");
}
