//! Crate-wide error taxonomy (spec §7).
//!
//! Each variant maps to one of the categories the reactor must classify
//! errors into at the site they occur, then translate to a connection-local
//! disposition (continue / respond-and-close / close).

use thiserror::Error;

use crate::http::ParseError;

#[derive(Debug, Error)]
pub enum CoreError {
    /// Malformed request line or headers. Disposition: 400, close after write.
    #[error("protocol error: {0}")]
    Protocol(String),

    /// File missing, forbidden, unreadable, or mmap failure. Disposition:
    /// appropriate 4xx with canonical body, or an inline diagnostic.
    #[error("resource error: {0}")]
    Resource(String),

    /// Recoverable EAGAIN, peer reset, or a terminal write failure.
    #[error("transport error: {0}")]
    Transport(#[from] std::io::Error),

    /// Connection registry is at capacity.
    #[error("server busy: registry full ({0} connections)")]
    Exhaustion(usize),

    /// Unexpected failure inside a worker task; contained, never propagated
    /// to the reactor loop.
    #[error("internal error: {0}")]
    Internal(String),

    #[error("config error: {0}")]
    Config(String),
}

pub type Result<T> = std::result::Result<T, CoreError>;

impl From<ParseError> for CoreError {
    fn from(e: ParseError) -> Self {
        CoreError::Protocol(e.to_string())
    }
}
