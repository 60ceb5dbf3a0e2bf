use crate::error::Socks5Error;
use crate::protocol::AddressType;
use std::fmt;
use std::io;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr};
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::net::TcpStream;

/// Domain is a DOMAINNAME payload. It holds the raw octets the client sent
/// and is never longer than 255 bytes, so its length always fits the
/// one-byte prefix
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Domain(Vec<u8>);

impl Domain {
    pub fn new(name: impl Into<Vec<u8>>) -> Result<Self, Socks5Error> {
        let name = name.into();
        if name.len() > u8::MAX as usize {
            return Err(Socks5Error::DomainTooLong(name.len()));
        }
        Ok(Domain(name))
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}

impl fmt::Display for Domain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&String::from_utf8_lossy(&self.0))
    }
}

/// Address represents a network address or domain to be used as the
/// SOCKS5 target (DST.ADDR) or bound (BND.ADDR) address
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Address {
    IPv4([u8; 4]),
    IPv6([u8; 16]),
    DomainName(Domain),
}

impl Address {
    /// domain builds a DomainName address, rejecting names whose byte
    /// length does not fit the one-byte length prefix
    pub fn domain(name: impl Into<Vec<u8>>) -> Result<Self, Socks5Error> {
        Ok(Address::DomainName(Domain::new(name)?))
    }

    /// unspecified is 0.0.0.0, used as BND.ADDR in failure replies
    pub fn unspecified() -> Self {
        Address::IPv4([0; 4])
    }

    /// addr_type returns the ATYP byte tag for this address
    pub fn addr_type(&self) -> AddressType {
        match self {
            Address::IPv4(_) => AddressType::IPv4,
            Address::IPv6(_) => AddressType::IPv6,
            Address::DomainName(_) => AddressType::DomainName,
        }
    }

    /// network is the dial family implied by the address type
    pub fn network(&self) -> &'static str {
        match self {
            Address::IPv4(_) => "tcp4",
            Address::IPv6(_) => "tcp6",
            Address::DomainName(_) => "tcp",
        }
    }

    /// host returns the human readable form of the address
    pub fn host(&self) -> String {
        match self {
            Address::IPv4(octets) => Ipv4Addr::from(*octets).to_string(),
            Address::IPv6(octets) => Ipv6Addr::from(*octets).to_string(),
            Address::DomainName(name) => name.to_string(),
        }
    }

    /// to_bytes returns the wire form of the address, without the ATYP byte.
    /// Domain names carry their one-byte length prefix
    pub fn to_bytes(&self) -> Vec<u8> {
        match self {
            Address::IPv4(octets) => octets.to_vec(),
            Address::IPv6(octets) => octets.to_vec(),
            Address::DomainName(name) => {
                let name = name.as_bytes();
                let mut bytes = Vec::with_capacity(name.len() + 1);
                bytes.push(name.len() as u8);
                bytes.extend_from_slice(name);
                bytes
            }
        }
    }

    /// connect dials host:port using the family implied by the address type.
    /// Domain names are resolved and each result tried in turn
    pub async fn connect(&self, port: u16) -> io::Result<TcpStream> {
        match self {
            Address::IPv4(octets) => {
                TcpStream::connect(SocketAddr::from((Ipv4Addr::from(*octets), port))).await
            }
            Address::IPv6(octets) => {
                TcpStream::connect(SocketAddr::from((Ipv6Addr::from(*octets), port))).await
            }
            Address::DomainName(name) => {
                let host = std::str::from_utf8(name.as_bytes()).map_err(|_| {
                    io::Error::new(io::ErrorKind::InvalidInput, "domain name is not valid UTF-8")
                })?;
                TcpStream::connect((host, port)).await
            }
        }
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.host())
    }
}

impl From<IpAddr> for Address {
    fn from(ip: IpAddr) -> Self {
        match ip {
            IpAddr::V4(ip) => Address::IPv4(ip.octets()),
            IpAddr::V6(ip) => Address::IPv6(ip.octets()),
        }
    }
}

/// read_address reads an ATYP byte followed by the address it announces
pub async fn read_address<R>(reader: &mut R) -> Result<Address, Socks5Error>
where
    R: AsyncRead + Unpin,
{
    let atyp = reader.read_u8().await?;
    let addr_type = AddressType::from_byte(atyp).ok_or(Socks5Error::UnsupportedAddressType(atyp))?;

    read_address_body(reader, addr_type).await
}

/// read_address_body reads the address payload for an already known
/// address type: 4 bytes for IPv4, 16 for IPv6, or a length byte and
/// that many bytes for a domain name
pub async fn read_address_body<R>(
    reader: &mut R,
    addr_type: AddressType,
) -> Result<Address, Socks5Error>
where
    R: AsyncRead + Unpin,
{
    match addr_type {
        AddressType::IPv4 => {
            let mut octets = [0u8; 4];
            reader.read_exact(&mut octets).await?;
            Ok(Address::IPv4(octets))
        }
        AddressType::IPv6 => {
            let mut octets = [0u8; 16];
            reader.read_exact(&mut octets).await?;
            Ok(Address::IPv6(octets))
        }
        AddressType::DomainName => {
            // First octet in DomainName contains the number of
            // octets to follow
            let len = reader.read_u8().await?;

            let mut domain = vec![0u8; len as usize];
            reader.read_exact(&mut domain).await?;

            Ok(Address::DomainName(Domain(domain)))
        }
    }
}
