use std::fmt;
use std::io;

/// A `FAIL` code as defined by the wire protocol, paired with its fixed
/// message token. Non-fatal codes (`Impatient`, `PileIndex`, `Quantity`) are
/// reported to the sender without ending the connection or the game.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailCode {
    Invalid,
    LongName,
    AlreadyPlaying,
    AlreadyOpen,
    NotPlaying,
    Impatient,
    PileIndex,
    Quantity,
}

impl FailCode {
    pub fn code(self) -> u32 {
        match self {
            FailCode::Invalid => 10,
            FailCode::LongName => 21,
            FailCode::AlreadyPlaying => 22,
            FailCode::AlreadyOpen => 23,
            FailCode::NotPlaying => 24,
            FailCode::Impatient => 31,
            FailCode::PileIndex => 32,
            FailCode::Quantity => 33,
        }
    }

    pub fn token(self) -> &'static str {
        match self {
            FailCode::Invalid => "Invalid",
            FailCode::LongName => "Long Name",
            FailCode::AlreadyPlaying => "Already Playing",
            FailCode::AlreadyOpen => "Already Open",
            FailCode::NotPlaying => "Not Playing",
            FailCode::Impatient => "Impatient",
            FailCode::PileIndex => "Pile Index",
            FailCode::Quantity => "Quantity",
        }
    }
}

impl fmt::Display for FailCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.code(), self.token())
    }
}

/// Errors surfaced while reading a frame off the wire.
#[derive(Debug)]
pub enum FrameError {
    /// Peer closed the connection cleanly (possibly mid-header).
    Eof,
    Io(io::Error),
    BadFrame,
}

impl From<io::Error> for FrameError {
    fn from(e: io::Error) -> Self {
        FrameError::Io(e)
    }
}

impl fmt::Display for FrameError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FrameError::Eof => write!(f, "connection closed"),
            FrameError::Io(e) => write!(f, "I/O error: {e}"),
            FrameError::BadFrame => write!(f, "malformed frame"),
        }
    }
}

impl std::error::Error for FrameError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            FrameError::Io(e) => Some(e),
            _ => None,
        }
    }
}

/// Startup-time failures reported by the supervisor.
#[derive(Debug)]
pub enum StartupError {
    Bind(io::Error),
    Io(io::Error),
    InvalidArgs(String),
}

impl fmt::Display for StartupError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StartupError::Bind(e) => write!(f, "failed to bind listener: {e}"),
            StartupError::Io(e) => write!(f, "I/O error during startup: {e}"),
            StartupError::InvalidArgs(msg) => write!(f, "invalid arguments: {msg}"),
        }
    }
}

impl std::error::Error for StartupError {}
