use std::{fmt, io};

use thiserror::Error;

////////////////////////////////////////////////////////////////////////////////

/// Outcome of a single operation on an underlying socket primitive.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub enum Status {
    /// The operation completed.
    Done,
    /// The socket is not ready yet, nothing was transferred.
    NotReady,
    /// Only part of the data was transferred, or more data is waiting.
    Partial,
    /// The connection was closed.
    Disconnected,
    /// Any other failure.
    Error,
}

impl Status {
    pub fn is_done(self) -> bool {
        self == Status::Done
    }

    pub fn result(self) -> Result<()> {
        match self {
            Status::Done => Ok(()),
            other => Err(Error::Status(other)),
        }
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Status::Done => "done",
            Status::NotReady => "not ready",
            Status::Partial => "partial",
            Status::Disconnected => "disconnected",
            Status::Error => "error",
        };
        f.write_str(s)
    }
}

impl From<&io::Error> for Status {
    fn from(err: &io::Error) -> Self {
        match err.kind() {
            io::ErrorKind::WouldBlock => Status::NotReady,
            io::ErrorKind::ConnectionReset
            | io::ErrorKind::ConnectionAborted
            | io::ErrorKind::BrokenPipe
            | io::ErrorKind::NotConnected
            | io::ErrorKind::UnexpectedEof => Status::Disconnected,
            _ => Status::Error,
        }
    }
}

////////////////////////////////////////////////////////////////////////////////

#[derive(Error, Debug)]
pub enum Error {
    #[error("invalid address '{0}': DNS is not supported")]
    InvalidAddress(String),
    #[error("socket operation finished with status: {0}")]
    Status(Status),
}

pub type Result<T> = std::result::Result<T, Error>;

////////////////////////////////////////////////////////////////////////////////
