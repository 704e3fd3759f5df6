//! Named FTP reply codes

// Preliminary (1xx)
pub const OPENING_DATA_CONNECTION: u16 = 150;

// Success (2xx)
pub const COMMAND_OK: u16 = 200;
pub const SERVICE_READY: u16 = 220;
pub const SERVICE_CLOSING: u16 = 221;
pub const CLOSING_DATA_CONNECTION: u16 = 226;
pub const ENTERING_PASSIVE_MODE: u16 = 227;
pub const USER_LOGGED_IN: u16 = 230;
pub const FILE_ACTION_COMPLETE: u16 = 250;
pub const PATHNAME_CREATED: u16 = 257;

// Intermediate (3xx)
pub const NEED_PASSWORD: u16 = 331;

// Transient failure (4xx)
pub const CANT_OPEN_DATA_CONNECTION: u16 = 425;
pub const TRANSFER_ABORTED: u16 = 426;

// Permanent failure (5xx)
pub const NOT_LOGGED_IN: u16 = 530;
pub const FILE_UNAVAILABLE: u16 = 550;
