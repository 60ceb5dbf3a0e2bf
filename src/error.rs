use crate::auth::AuthError;
use std::io;

/// ErrorKind groups every failure by how it ends a connection
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Malformed or unsupported input from the client
    Protocol,
    /// Credentials rejected during subnegotiation
    Authentication,
    /// Read, write or dial failure on either socket
    Transport,
    /// Listener could not be set up; fatal to the server
    Configuration,
}

/// Socks5Error is returned by every protocol operation in this crate
#[derive(Debug, thiserror::Error)]
pub enum Socks5Error {
    #[error("unsupported SOCKS version: {0:#04x}")]
    UnsupportedVersion(u8),

    #[error("unsupported command: {0:#04x}")]
    UnsupportedCommand(u8),

    #[error("unsupported address type: {0:#04x}")]
    UnsupportedAddressType(u8),

    #[error("unknown reply code: {0:#04x}")]
    UnknownReplyCode(u8),

    #[error("stream closed before the frame was complete")]
    TruncatedRead,

    #[error("invalid username/password subnegotiation version: {0:#04x}")]
    InvalidSubnegotiationVersion(u8),

    #[error("client offered no acceptable authentication method")]
    NoAcceptableMethods,

    #[error("authentication failed: {0}")]
    Authentication(#[from] AuthError),

    #[error("domain name too long: {0} bytes (max 255)")]
    DomainTooLong(usize),

    #[error("failed to bind {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: io::Error,
    },

    #[error("server is already bound to {0}")]
    AlreadyBound(String),

    #[error("I/O error: {0}")]
    Io(io::Error),
}

impl Socks5Error {
    /// kind classifies the error
    pub fn kind(&self) -> ErrorKind {
        match self {
            Socks5Error::UnsupportedVersion(_)
            | Socks5Error::UnsupportedCommand(_)
            | Socks5Error::UnsupportedAddressType(_)
            | Socks5Error::UnknownReplyCode(_)
            | Socks5Error::InvalidSubnegotiationVersion(_)
            | Socks5Error::NoAcceptableMethods
            | Socks5Error::DomainTooLong(_) => ErrorKind::Protocol,
            Socks5Error::Authentication(_) => ErrorKind::Authentication,
            Socks5Error::TruncatedRead | Socks5Error::Io(_) => ErrorKind::Transport,
            Socks5Error::Bind { .. } | Socks5Error::AlreadyBound(_) => ErrorKind::Configuration,
        }
    }
}

// A short read means the peer hung up mid-frame
impl From<io::Error> for Socks5Error {
    fn from(err: io::Error) -> Self {
        match err.kind() {
            io::ErrorKind::UnexpectedEof => Socks5Error::TruncatedRead,
            _ => Socks5Error::Io(err),
        }
    }
}
