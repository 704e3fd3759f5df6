//! Configuration for the interactive front end
//!
//! The protocol core takes host, port, and credentials per call; this
//! file-plus-environment layer only serves the terminal binary. Values
//! come from a TOML file, with `FTP_SESSION_*` environment variables
//! overriding it.

use std::env;
use std::fs;
use std::time::Duration;

use serde::Deserialize;

use crate::connection::DataMode;
use crate::error::{FtpError, Result};
use crate::session::SessionOptions;

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    pub server: ServerConfig,
    pub client: ClientSettings,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// FTP server hostname or IP address.
    pub host: String,

    /// FTP server control port.
    pub port: u16,

    /// Deadline for connects, reads, and writes, in seconds.
    pub timeout: u64,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ClientSettings {
    /// Local directory used for uploads and downloads.
    pub local_directory: String,

    /// "passive" or "active" data-channel establishment.
    pub data_mode: String,

    /// Port range tried for active-mode listeners.
    pub data_port_start: u16,
    pub data_port_end: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 21,
            timeout: 30,
        }
    }
}

impl Default for ClientSettings {
    fn default() -> Self {
        Self {
            local_directory: ".".to_string(),
            data_mode: "passive".to_string(),
            data_port_start: 49152,
            data_port_end: 49251,
        }
    }
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            server: ServerConfig::default(),
            client: ClientSettings::default(),
        }
    }
}

impl ClientConfig {
    /// Load configuration: the TOML file if present, defaults
    /// otherwise, then environment overrides, then validation.
    pub fn load(config_path: &str) -> Result<Self> {
        let mut config = if std::path::Path::new(config_path).exists() {
            let content = fs::read_to_string(config_path).map_err(|e| {
                FtpError::Config(format!("cannot read config file '{config_path}': {e}"))
            })?;
            toml::from_str(&content).map_err(|e| {
                FtpError::Config(format!("invalid TOML in '{config_path}': {e}"))
            })?
        } else {
            ClientConfig::default()
        };

        config.apply_env_overrides()?;
        config.validate()?;
        Ok(config)
    }

    fn apply_env_overrides(&mut self) -> Result<()> {
        if let Ok(host) = env::var("FTP_SESSION_HOST") {
            self.server.host = host;
        }
        if let Ok(port) = env::var("FTP_SESSION_PORT") {
            self.server.port = port.parse().map_err(|_| {
                FtpError::Config("FTP_SESSION_PORT must be a valid port number".to_string())
            })?;
        }
        if let Ok(timeout) = env::var("FTP_SESSION_TIMEOUT") {
            self.server.timeout = timeout.parse().map_err(|_| {
                FtpError::Config("FTP_SESSION_TIMEOUT must be a number of seconds".to_string())
            })?;
        }
        if let Ok(dir) = env::var("FTP_SESSION_LOCAL_DIR") {
            self.client.local_directory = dir;
        }
        if let Ok(mode) = env::var("FTP_SESSION_DATA_MODE") {
            self.client.data_mode = mode;
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        if self.server.host.is_empty() {
            return Err(FtpError::Config("host cannot be empty".to_string()));
        }
        if self.server.port == 0 {
            return Err(FtpError::Config("port cannot be 0".to_string()));
        }
        if self.server.timeout == 0 {
            return Err(FtpError::Config("timeout cannot be 0".to_string()));
        }
        if self.client.data_port_start > self.client.data_port_end {
            return Err(FtpError::Config(
                "data port start must not exceed data port end".to_string(),
            ));
        }
        self.data_mode()?;
        Ok(())
    }

    pub fn data_mode(&self) -> Result<DataMode> {
        match self.client.data_mode.as_str() {
            "passive" => Ok(DataMode::Passive),
            "active" => Ok(DataMode::Active),
            other => Err(FtpError::Config(format!(
                "data_mode must be 'passive' or 'active', got '{other}'"
            ))),
        }
    }

    /// The session options this configuration describes.
    pub fn session_options(&self) -> Result<SessionOptions> {
        Ok(SessionOptions {
            timeout: Duration::from_secs(self.server.timeout),
            data_mode: self.data_mode()?,
            data_ports: (self.client.data_port_start, self.client.data_port_end),
        })
    }
}

impl std::fmt::Display for ClientConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}:{} (timeout {}s, {} mode, local dir {})",
            self.server.host,
            self.server.port,
            self.server.timeout,
            self.client.data_mode,
            self.client.local_directory
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let config = ClientConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.data_mode().unwrap(), DataMode::Passive);
    }

    #[test]
    fn parses_toml_sections() {
        let config: ClientConfig = toml::from_str(
            r#"
            [server]
            host = "ftp.example.net"
            port = 2121

            [client]
            data_mode = "active"
            "#,
        )
        .unwrap();
        assert_eq!(config.server.host, "ftp.example.net");
        assert_eq!(config.server.port, 2121);
        assert_eq!(config.data_mode().unwrap(), DataMode::Active);
        // Unspecified fields keep their defaults.
        assert_eq!(config.server.timeout, 30);
    }

    #[test]
    fn rejects_unknown_data_mode() {
        let mut config = ClientConfig::default();
        config.client.data_mode = "carrier-pigeon".to_string();
        assert!(matches!(config.validate(), Err(FtpError::Config(_))));
    }

    #[test]
    fn rejects_inverted_port_range() {
        let mut config = ClientConfig::default();
        config.client.data_port_start = 5000;
        config.client.data_port_end = 4000;
        assert!(matches!(config.validate(), Err(FtpError::Config(_))));
    }
}
