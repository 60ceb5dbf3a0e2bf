//! A lightweight SOCKS5 proxy library
//!
//! ## SOCKS5 Implementation
//!
//! - Features:
//!     - CONNECT
//!     - No Authentication
//!     - Username/Password Authentication against a caller supplied verifier
//!     - Per-direction packet interception during relay
//!     - Async using tokio, one task per client
//! - [SOCKS5 (RFC 1928)](https://datatracker.ietf.org/doc/html/rfc1928)
//! - [Username/Password Authentication (RFC 1929)](https://datatracker.ietf.org/doc/html/rfc1929)
//!
//! # Example
//! ```no_run
//! use socksd::{Socks5Server, auth::UserPass};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let auth = UserPass {
//!         username: "user".to_string(),
//!         password: "pass".to_string(),
//!     };
//!     let mut server = Socks5Server::new("127.0.0.1:1080").with_auth(Some(auth));
//!     server.run().await
//! }
//! ```

pub mod address;
pub mod auth;
pub mod connection;
pub mod error;
pub mod protocol;
pub mod relay;
pub mod request;
pub mod server;

// Re-export main types at crate root for convenience
pub use address::{Address, Domain};
pub use auth::{AuthError, Authenticator, UserPass};
pub use error::{ErrorKind, Socks5Error};
pub use protocol::{AddressType, AuthMethod, Command, ReplyCode, Version};
pub use relay::{Interceptor, PacketHandle};
pub use request::{Reply, Request};
pub use server::{ServerConfig, Socks5Server, StopHandle};
