use crate::address::{self, Address};
use crate::error::Socks5Error;
use crate::protocol::{AddressType, Command, RSV, ReplyCode, Version};
use tokio::io::{AsyncRead, AsyncReadExt};

/// Request is a client CONNECT request
// +----+-----+-------+------+----------+----------+
// |VER | CMD |  RSV  | ATYP | DST.ADDR | DST.PORT |
// +----+-----+-------+------+----------+----------+
// | 1  |  1  | X'00' |  1   | Variable |    2     |
// +----+-----+-------+------+----------+----------+
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Request {
    pub version: u8,
    pub command: Command,
    pub reserved: u8,
    pub address: Address,
    pub port: u16,
}

impl Request {
    /// target renders host:port for logging
    pub fn target(&self) -> String {
        match self.address.addr_type() {
            AddressType::IPv6 => format!("[{}]:{}", self.address, self.port),
            _ => format!("{}:{}", self.address, self.port),
        }
    }
}

/// Reply is the server answer to a request
// +----+-----+-------+------+----------+----------+
// |VER | REP |  RSV  | ATYP | BND.ADDR | BND.PORT |
// +----+-----+-------+------+----------+----------+
// | 1  |  1  | X'00' |  1   | Variable |    2     |
// +----+-----+-------+------+----------+----------+
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reply {
    pub version: u8,
    pub code: ReplyCode,
    pub reserved: u8,
    pub address: Address,
    pub port: u16,
}

impl Reply {
    pub fn new(code: ReplyCode, address: Address, port: u16) -> Self {
        Self {
            version: Version::SOCKS5 as u8,
            code,
            reserved: RSV,
            address,
            port,
        }
    }

    /// failure builds an error reply bound to 0.0.0.0:0
    pub fn failure(code: ReplyCode) -> Self {
        Self::new(code, Address::unspecified(), 0)
    }

    /// to_bytes serializes the full reply frame
    pub fn to_bytes(&self) -> Vec<u8> {
        let addr = self.address.to_bytes();
        let mut frame = Vec::with_capacity(6 + addr.len());

        frame.extend_from_slice(&[
            self.version,
            self.code as u8,
            self.reserved,
            self.address.addr_type() as u8,
        ]);
        frame.extend_from_slice(&addr);
        frame.extend_from_slice(&self.port.to_be_bytes());

        frame
    }

    /// read_from parses a reply frame, as a client would
    pub async fn read_from<R>(reader: &mut R) -> Result<Self, Socks5Error>
    where
        R: AsyncRead + Unpin,
    {
        let mut head = [0u8; 3];
        reader.read_exact(&mut head).await?;

        if head[0] != Version::SOCKS5 as u8 {
            return Err(Socks5Error::UnsupportedVersion(head[0]));
        }
        let code = ReplyCode::from_byte(head[1]).ok_or(Socks5Error::UnknownReplyCode(head[1]))?;

        let address = address::read_address(reader).await?;
        let port = reader.read_u16().await?;

        Ok(Self {
            version: head[0],
            code,
            reserved: head[2],
            address,
            port,
        })
    }
}
