//! A dedicated error for everything the server can trip on: I/O, DNS packet
//! inconsistencies, bad JSON bodies, etc.
use std::io;
use std::str;

#[derive(Debug)]
pub enum RebindError {
    Io(io::Error),
    FromUtf8(std::string::FromUtf8Error),
    Utf8(str::Utf8Error),
    AddrParse(std::net::AddrParseError),
    LoggerError(log::SetLoggerError),
    Json(serde_json::Error),
    Dns(String),
}

impl RebindError {
    // Helper function to create a new DNS error from a string
    pub fn new(s: &str) -> Self {
        RebindError::Dns(String::from(s))
    }
}

/// A specific custom `Result` for all functions
pub type RebindResult<T> = Result<T, RebindError>;

// All conversions from internal errors to RebindError
impl From<io::Error> for RebindError {
    fn from(err: io::Error) -> Self {
        RebindError::Io(err)
    }
}

impl From<String> for RebindError {
    fn from(err: String) -> Self {
        RebindError::Dns(err)
    }
}

impl From<std::string::FromUtf8Error> for RebindError {
    fn from(err: std::string::FromUtf8Error) -> Self {
        RebindError::FromUtf8(err)
    }
}

impl From<str::Utf8Error> for RebindError {
    fn from(err: str::Utf8Error) -> Self {
        RebindError::Utf8(err)
    }
}

impl From<std::net::AddrParseError> for RebindError {
    fn from(err: std::net::AddrParseError) -> Self {
        RebindError::AddrParse(err)
    }
}

impl From<log::SetLoggerError> for RebindError {
    fn from(err: log::SetLoggerError) -> Self {
        RebindError::LoggerError(err)
    }
}

impl From<serde_json::Error> for RebindError {
    fn from(err: serde_json::Error) -> Self {
        RebindError::Json(err)
    }
}
