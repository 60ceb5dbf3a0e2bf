use crate::error::Socks5Error;
use crate::protocol::{AuthMethod, AuthStatus, SUBNEGOTIATION_VERSION};
use std::fmt;
use std::num::NonZeroU8;
use std::sync::Arc;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

/// AuthError is returned by a verification function to reject a client.
/// Its code is written back as the subnegotiation STATUS byte, so it can
/// never be 0x00
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthError {
    pub message: String,
    pub code: NonZeroU8,
}

impl AuthError {
    pub fn new(message: impl Into<String>, code: NonZeroU8) -> Self {
        Self {
            message: message.into(),
            code,
        }
    }

    /// rejected builds an AuthError with the generic failure code 0x01
    pub fn rejected(message: impl Into<String>) -> Self {
        Self::new(message, NonZeroU8::MIN)
    }
}

impl fmt::Display for AuthError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (code {:#04x})", self.message, self.code.get())
    }
}

impl std::error::Error for AuthError {}

/// UserPass holds username/password credentials as dictated
/// server-side
#[derive(Clone)]
pub struct UserPass {
    pub username: String,
    pub password: String,
}

/// Verifier checks a (username, password) pair. It is called from every
/// connection task at once and must be safe to share
pub type Verifier = Arc<dyn Fn(&str, &str) -> Result<(), AuthError> + Send + Sync>;

/// Authenticator decides which method the server accepts and validates
/// clients that negotiated it
#[derive(Clone, Default)]
pub enum Authenticator {
    /// Accept every client without credentials
    #[default]
    NoAuth,
    /// RFC 1929 username/password checked by the verifier
    UserPass(Verifier),
}

impl fmt::Debug for Authenticator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Authenticator::NoAuth => f.write_str("NoAuth"),
            Authenticator::UserPass(_) => f.write_str("UserPass(..)"),
        }
    }
}

impl From<UserPass> for Authenticator {
    fn from(creds: UserPass) -> Self {
        Authenticator::basic(move |username, password| {
            if username == creds.username && password == creds.password {
                Ok(())
            } else {
                Err(AuthError::rejected("invalid username or password"))
            }
        })
    }
}

impl Authenticator {
    /// basic requires username/password and checks them with `verify`
    pub fn basic<F>(verify: F) -> Self
    where
        F: Fn(&str, &str) -> Result<(), AuthError> + Send + Sync + 'static,
    {
        Authenticator::UserPass(Arc::new(verify))
    }

    /// method returns the one method this authenticator is configured for
    pub fn method(&self) -> AuthMethod {
        match self {
            Authenticator::NoAuth => AuthMethod::NoAuth,
            Authenticator::UserPass(_) => AuthMethod::UserPass,
        }
    }

    /// negotiate picks the configured method if the client offered it,
    /// otherwise NoAcceptable
    pub fn negotiate(&self, offered: &[u8]) -> AuthMethod {
        let method = self.method();
        if offered.contains(&(method as u8)) {
            method
        } else {
            AuthMethod::NoAcceptable
        }
    }

    /// subnegotiate runs the method specific exchange after method
    /// selection. Nothing is exchanged for NoAuth
    pub async fn subnegotiate<S>(&self, stream: &mut S) -> Result<(), Socks5Error>
    where
        S: AsyncRead + AsyncWrite + Unpin,
    {
        match self {
            Authenticator::NoAuth => Ok(()),
            Authenticator::UserPass(verify) => authenticate_userpass(stream, verify).await,
        }
    }
}

/// authenticate_userpass handles username/password authentication according to RFC 1929.
/// Exactly one status record is written unless the stream itself fails
async fn authenticate_userpass<S>(stream: &mut S, verify: &Verifier) -> Result<(), Socks5Error>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    // Client Username/Password Request
    // +----+------+----------+------+----------+
    // |VER | ULEN |  UNAME   | PLEN |  PASSWD  |
    // +----+------+----------+------+----------+
    // | 1  |  1   | 1 to 255 |  1   | 1 to 255 |
    // +----+------+----------+------+----------+

    let version = stream.read_u8().await?;
    if version != SUBNEGOTIATION_VERSION {
        write_status(stream, AuthStatus::Failure as u8).await?;
        return Err(Socks5Error::InvalidSubnegotiationVersion(version));
    }

    let username = read_field(stream).await?;
    let password = read_field(stream).await?;

    // Username/Password Server response
    // +----+--------+
    // |VER | STATUS |
    // +----+--------+
    // | 1  |   1    |
    // +----+--------+

    match verify(&username, &password) {
        Ok(()) => {
            write_status(stream, AuthStatus::Success as u8).await?;
            Ok(())
        }
        Err(e) => {
            write_status(stream, e.code.get()).await?;
            Err(Socks5Error::Authentication(e))
        }
    }
}

/// read_field reads a one-byte length and that many bytes as text
async fn read_field<R>(reader: &mut R) -> Result<String, Socks5Error>
where
    R: AsyncRead + Unpin,
{
    let len = reader.read_u8().await?;
    let mut field = vec![0u8; len as usize];
    reader.read_exact(&mut field).await?;

    Ok(String::from_utf8_lossy(&field).into_owned())
}

async fn write_status<W>(writer: &mut W, status: u8) -> Result<(), Socks5Error>
where
    W: AsyncWrite + Unpin,
{
    writer.write_all(&[SUBNEGOTIATION_VERSION, status]).await?;
    writer.flush().await?;
    Ok(())
}
