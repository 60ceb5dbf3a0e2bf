use crate::address;
use crate::auth::Authenticator;
use crate::error::Socks5Error;
use crate::protocol::{AddressType, AuthMethod, Command, ReplyCode, Version};
use crate::request::{Reply, Request};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, BufReader};
use tracing::debug;

/// Connection owns the client side of one SOCKS5 session and walks it
/// through greeting, authentication, request and reply.
///
/// Every step either advances or fails; nothing is retried, since a
/// partially consumed frame leaves the stream out of sync.
pub struct Connection<S> {
    stream: BufReader<S>,
}

impl<S> Connection<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    pub fn new(stream: S) -> Self {
        Self {
            stream: BufReader::new(stream),
        }
    }

    /// check_version reads one byte and requires it to be 0x05
    async fn check_version(&mut self) -> Result<(), Socks5Error> {
        let version = self.stream.read_u8().await?;
        if version != Version::SOCKS5 as u8 {
            return Err(Socks5Error::UnsupportedVersion(version));
        }
        Ok(())
    }

    /// read_methods reads the client greeting and returns the offered methods
    pub async fn read_methods(&mut self) -> Result<Vec<u8>, Socks5Error> {
        // ClientHello format
        // +----+----------+----------+
        // |VER | NMETHODS | METHODS  |
        // +----+----------+----------+
        // | 1  |    1     | 1 to 255 |
        // +----+----------+----------+
        self.check_version().await?;

        let n_methods = self.stream.read_u8().await?;
        let mut methods = vec![0u8; n_methods as usize];
        self.stream.read_exact(&mut methods).await?;

        Ok(methods)
    }

    /// negotiate reads the greeting and answers with the method the
    /// authenticator is configured for. When the client did not offer it,
    /// 0xFF is sent and the session ends
    pub async fn negotiate(&mut self, auth: &Authenticator) -> Result<AuthMethod, Socks5Error> {
        let methods = self.read_methods().await?;
        let method = auth.negotiate(&methods);

        // ServerChoice method selection reply format
        // +----+--------+
        // |VER | METHOD |
        // +----+--------+
        // | 1  |   1    |
        // +----+--------+
        self.stream
            .write_all(&[Version::SOCKS5 as u8, method as u8])
            .await?;
        self.stream.flush().await?;

        match method {
            AuthMethod::NoAcceptable => Err(Socks5Error::NoAcceptableMethods),
            method => Ok(method),
        }
    }

    /// authenticate runs the subnegotiation for the selected method
    pub async fn authenticate(&mut self, auth: &Authenticator) -> Result<(), Socks5Error> {
        auth.subnegotiate(&mut self.stream).await
    }

    /// read_request reads a CONNECT request. Unsupported commands and
    /// address types are answered with a failure reply before the error
    /// is returned
    pub async fn read_request(&mut self) -> Result<Request, Socks5Error> {
        self.check_version().await?;

        let cmd = self.stream.read_u8().await?;
        let command = match Command::from_byte(cmd) {
            Some(Command::Connect) => Command::Connect,
            _ => {
                self.reply_best_effort(ReplyCode::CommandNotSupported).await;
                return Err(Socks5Error::UnsupportedCommand(cmd));
            }
        };

        // Not checking RSV (RESERVED) -> 0x00
        let reserved = self.stream.read_u8().await?;

        let atyp = self.stream.read_u8().await?;
        let Some(addr_type) = AddressType::from_byte(atyp) else {
            self.reply_best_effort(ReplyCode::AddrTypeUnsupported).await;
            return Err(Socks5Error::UnsupportedAddressType(atyp));
        };

        let address = address::read_address_body(&mut self.stream, addr_type).await?;
        let port = self.stream.read_u16().await?;

        Ok(Request {
            version: Version::SOCKS5 as u8,
            command,
            reserved,
            address,
            port,
        })
    }

    /// write_reply sends a reply frame in a single write
    pub async fn write_reply(&mut self, reply: &Reply) -> Result<(), Socks5Error> {
        self.stream.write_all(&reply.to_bytes()).await?;
        self.stream.flush().await?;
        Ok(())
    }

    // The protocol error that triggered this reply is what the caller reports
    async fn reply_best_effort(&mut self, code: ReplyCode) {
        if let Err(e) = self.write_reply(&Reply::failure(code)).await {
            debug!("failed to send {:?} reply: {}", code, e);
        }
    }

    /// into_inner hands the client stream over for relaying. Bytes the
    /// client pipelined after its request stay in the buffer
    pub fn into_inner(self) -> BufReader<S> {
        self.stream
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::address::Address;
    use crate::auth::{AuthError, UserPass};
    use tokio_test::io::Builder;

    #[tokio::test]
    async fn negotiate_no_auth() {
        let stream = Builder::new()
            .read(&[0x05, 0x02, 0x02, 0x00])
            .write(&[0x05, 0x00])
            .build();
        let mut conn = Connection::new(stream);

        let method = conn.negotiate(&Authenticator::NoAuth).await.unwrap();
        assert_eq!(method, AuthMethod::NoAuth);
    }

    #[tokio::test]
    async fn negotiate_without_offered_method() {
        let stream = Builder::new()
            .read(&[0x05, 0x01, 0x00])
            .write(&[0x05, 0xFF])
            .build();
        let mut conn = Connection::new(stream);
        let auth = Authenticator::basic(|_, _| Ok(()));

        let err = conn.negotiate(&auth).await.unwrap_err();
        assert!(matches!(err, Socks5Error::NoAcceptableMethods));
    }

    #[tokio::test]
    async fn greeting_with_wrong_version() {
        let stream = Builder::new().read(&[0x04, 0x01, 0x00]).build();
        let mut conn = Connection::new(stream);

        let err = conn.negotiate(&Authenticator::NoAuth).await.unwrap_err();
        assert!(matches!(err, Socks5Error::UnsupportedVersion(0x04)));
    }

    #[tokio::test]
    async fn userpass_handshake_then_request() {
        let stream = Builder::new()
            .read(&[0x05, 0x01, 0x02])
            .write(&[0x05, 0x02])
            .read(&[0x01, 0x04, b'u', b's', b'e', b'r', 0x04, b'p', b'a', b's', b's'])
            .write(&[0x01, 0x00])
            .read(&[0x05, 0x01, 0x00, 0x01, 10, 0, 0, 1, 0x00, 0x50])
            .build();
        let mut conn = Connection::new(stream);
        let auth = Authenticator::from(UserPass {
            username: "user".to_string(),
            password: "pass".to_string(),
        });

        conn.negotiate(&auth).await.unwrap();
        conn.authenticate(&auth).await.unwrap();
        let request = conn.read_request().await.unwrap();

        assert_eq!(request.command, Command::Connect);
        assert_eq!(request.address, Address::IPv4([10, 0, 0, 1]));
        assert_eq!(request.port, 80);
    }

    #[tokio::test]
    async fn failed_authentication_stops_before_request() {
        let stream = Builder::new()
            .read(&[0x05, 0x01, 0x02])
            .write(&[0x05, 0x02])
            .read(&[0x01, 0x01, b'x', 0x01, b'y'])
            .write(&[0x01, 0x01])
            .build();
        let mut conn = Connection::new(stream);
        let auth = Authenticator::basic(|_, _| Err(AuthError::rejected("bad")));

        conn.negotiate(&auth).await.unwrap();
        let err = conn.authenticate(&auth).await.unwrap_err();
        assert!(matches!(err, Socks5Error::Authentication(_)));
    }

    #[tokio::test]
    async fn read_domain_request() {
        let mut frame = vec![0x05, 0x01, 0x00, 0x03, 0x0B];
        frame.extend_from_slice(b"example.com");
        frame.extend_from_slice(&443u16.to_be_bytes());
        let mut conn = Connection::new(Builder::new().read(&frame).build());

        let request = conn.read_request().await.unwrap();

        assert_eq!(request.address, Address::domain("example.com").unwrap());
        assert_eq!(request.port, 443);
        assert_eq!(request.target(), "example.com:443");
    }

    #[tokio::test]
    async fn bind_command_is_refused_with_one_reply() {
        let stream = Builder::new()
            .read(&[0x05, 0x02])
            .write(&[0x05, 0x07, 0x00, 0x01, 0, 0, 0, 0, 0, 0])
            .build();
        let mut conn = Connection::new(stream);

        let err = conn.read_request().await.unwrap_err();
        assert!(matches!(err, Socks5Error::UnsupportedCommand(0x02)));
    }

    #[tokio::test]
    async fn unknown_address_type_is_refused() {
        let stream = Builder::new()
            .read(&[0x05, 0x01, 0x00, 0x02])
            .write(&[0x05, 0x08, 0x00, 0x01, 0, 0, 0, 0, 0, 0])
            .build();
        let mut conn = Connection::new(stream);

        let err = conn.read_request().await.unwrap_err();
        assert!(matches!(err, Socks5Error::UnsupportedAddressType(0x02)));
    }

    #[tokio::test]
    async fn request_with_wrong_version() {
        let mut conn = Connection::new(Builder::new().read(&[0x04]).build());

        let err = conn.read_request().await.unwrap_err();
        assert!(matches!(err, Socks5Error::UnsupportedVersion(0x04)));
    }

    #[tokio::test]
    async fn truncated_port() {
        let stream = Builder::new()
            .read(&[0x05, 0x01, 0x00, 0x01, 1, 2, 3, 4, 0x00])
            .build();
        let mut conn = Connection::new(stream);

        let err = conn.read_request().await.unwrap_err();
        assert!(matches!(err, Socks5Error::TruncatedRead));
    }

    #[tokio::test]
    async fn write_reply_single_frame() {
        let reply = Reply::new(ReplyCode::Succeeded, Address::IPv4([1, 2, 3, 4]), 0x1F90);
        let stream = Builder::new()
            .write(&[0x05, 0x00, 0x00, 0x01, 1, 2, 3, 4, 0x1F, 0x90])
            .build();
        let mut conn = Connection::new(stream);

        conn.write_reply(&reply).await.unwrap();
    }
}
