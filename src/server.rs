use crate::{
    auth::{Authenticator, UserPass},
    connection::Connection,
    error::{ErrorKind, Socks5Error},
    protocol::ReplyCode,
    relay::{self, Interceptor},
    request::Reply,
};
use anyhow::{Context, Result, anyhow};
use std::{net::SocketAddr, sync::Arc};
use tokio::net::{TcpListener, TcpStream};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// ServerConfig is fixed before the listener starts and shared read-only
/// with every connection task
#[derive(Clone, Debug)]
pub struct ServerConfig {
    pub listen_addr: String,
    pub authenticator: Authenticator,
    pub interceptor: Interceptor,
}

/// StopHandle asks a running server to stop accepting. Connections
/// already being served are left alone
#[derive(Clone, Debug)]
pub struct StopHandle {
    token: CancellationToken,
}

impl StopHandle {
    pub fn stop(&self) {
        self.token.cancel();
    }

    pub fn is_stopped(&self) -> bool {
        self.token.is_cancelled()
    }
}

/// Socks5Server represents a SOCKS5 server and houses related
/// configuration data
pub struct Socks5Server {
    pub config: ServerConfig,
    listener: Option<TcpListener>,
    stop: CancellationToken,
}

/// Socks5Server implementation block
impl Socks5Server {
    /// new is a constructor for the Socks5Server type
    pub fn new(listen_addr: impl Into<String>) -> Self {
        Self {
            config: ServerConfig {
                listen_addr: listen_addr.into(),
                authenticator: Authenticator::NoAuth,
                interceptor: Interceptor::default(),
            },
            listener: None,
            stop: CancellationToken::new(),
        }
    }

    /// with_auth requires the given static credentials; None keeps no-auth
    pub fn with_auth(self, auth: Option<UserPass>) -> Self {
        match auth {
            Some(creds) => self.with_authenticator(creds.into()),
            None => self.with_authenticator(Authenticator::NoAuth),
        }
    }

    /// with_authenticator applies an arbitrary authenticator
    pub fn with_authenticator(mut self, authenticator: Authenticator) -> Self {
        self.config.authenticator = authenticator;
        self
    }

    /// with_interceptor hooks every relayed chunk
    pub fn with_interceptor(mut self, interceptor: Interceptor) -> Self {
        self.config.interceptor = interceptor;
        self
    }

    pub fn stop_handle(&self) -> StopHandle {
        StopHandle {
            token: self.stop.clone(),
        }
    }

    /// stop makes run return after its pending accept
    pub fn stop(&self) {
        self.stop.cancel();
    }

    /// bind to the listen address and return the bound socket address.
    /// A server holds one listener, so a second bind fails
    pub async fn bind(&mut self) -> Result<SocketAddr, Socks5Error> {
        if self.listener.is_some() {
            return Err(Socks5Error::AlreadyBound(self.config.listen_addr.clone()));
        }

        let bind_err = |source| Socks5Error::Bind {
            addr: self.config.listen_addr.clone(),
            source,
        };

        // Instantiate tokio listener
        let listener = TcpListener::bind(&self.config.listen_addr)
            .await
            .map_err(bind_err)?;
        let addr = listener.local_addr().map_err(bind_err)?;

        info!("SOCKS5 proxy listening on {}", addr);

        self.listener = Some(listener);
        Ok(addr)
    }

    /// run handles server spinup and listens for incoming connections
    /// until stopped or until accept fails
    pub async fn run(&mut self) -> Result<()> {
        if self.listener.is_none() {
            self.bind().await?;
        }
        let listener = self
            .listener
            .take()
            .ok_or_else(|| anyhow!("[ERR] listener missing after bind"))?;

        let config = Arc::new(self.config.clone());

        loop {
            let (inbound, peer_addr) = tokio::select! {
                _ = self.stop.cancelled() => {
                    info!("SOCKS5 proxy stopped");
                    return Ok(());
                }
                accepted = listener.accept() => accepted.context("[ERR] accept failed")?,
            };

            // Clone for this connection
            let config = Arc::clone(&config);

            tokio::spawn(async move {
                info!("new client: {}", peer_addr);

                if let Err(e) = handle_connection(inbound, config).await {
                    match e.downcast_ref::<Socks5Error>().map(Socks5Error::kind) {
                        Some(ErrorKind::Authentication) => warn!("{}: {:#}", peer_addr, e),
                        _ => error!("{}: connection error: {:#}", peer_addr, e),
                    }
                }
            });
        }
    }
}

/// handle_connection drives one client through the full SOCKS5 flow and
/// then relays until both sides are done. The client socket is closed
/// when this returns
async fn handle_connection(stream: TcpStream, config: Arc<ServerConfig>) -> Result<()> {
    let mut conn = Connection::new(stream);

    // Negotiate authentication with client
    let method = conn
        .negotiate(&config.authenticator)
        .await
        .context("[ERR] method negotiation failed")?;
    debug!("selected auth method {:?}", method);

    conn.authenticate(&config.authenticator).await?;

    // Handle connection request from client
    let request = conn
        .read_request()
        .await
        .context("[ERR] failed to read request")?;
    let target = request.target();

    // No reply on dial failure, the client sees the socket close
    let outbound = request
        .address
        .connect(request.port)
        .await
        .with_context(|| format!("[ERR] failed to connect to {target}"))?;
    debug!(
        "connected to {} over {} from {:?}",
        target,
        request.address.network(),
        outbound.local_addr().ok()
    );

    // BND.ADDR/BND.PORT echo the requested destination rather than the
    // outbound socket's local endpoint
    let reply = Reply::new(ReplyCode::Succeeded, request.address.clone(), request.port);
    conn.write_reply(&reply).await?;

    let (from_client, from_server) =
        relay::relay(conn.into_inner(), outbound, &config.interceptor).await?;

    info!(
        "connection closed: {} bytes from client, {} bytes from server",
        from_client, from_server
    );

    Ok(())
}
