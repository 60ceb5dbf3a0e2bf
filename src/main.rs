use anyhow::{Result, bail};
use clap::Parser;
use socksd::{Socks5Server, StopHandle, UserPass};
use tracing::{Level, info};

#[derive(Parser, Debug)]
#[command(author, version, about = "A lightweight SOCKS5 CONNECT proxy", long_about = None)]
struct Args {
    /// Listener address
    #[arg(short, long, default_value = "127.0.0.1:1080")]
    listen: String,

    /// Username clients must present (requires --password)
    #[arg(short, long)]
    username: Option<String>,

    /// Password clients must present (requires --username)
    #[arg(short, long)]
    password: Option<String>,

    /// Verbose logging
    #[arg(short, long)]
    verbose: bool,
}

impl Args {
    fn log_level(&self) -> Level {
        if self.verbose { Level::DEBUG } else { Level::INFO }
    }

    /// credentials turns the username/password flags into the static
    /// credential set. Giving only one of them is an error
    fn credentials(&self) -> Result<Option<UserPass>> {
        match (&self.username, &self.password) {
            (Some(username), Some(password)) => Ok(Some(UserPass {
                username: username.clone(),
                password: password.clone(),
            })),
            (None, None) => Ok(None),
            _ => bail!("[ERR] must provide both username and password (or neither)"),
        }
    }

    fn into_server(self) -> Result<Socks5Server> {
        let auth = self.credentials()?;
        if auth.is_some() {
            info!("Authentication enabled");
        }
        Ok(Socks5Server::new(self.listen).with_auth(auth))
    }
}

/// Ctrl-C stops accepting; live connections are not interrupted
fn stop_on_interrupt(stop: StopHandle) {
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("interrupt received, shutting down");
            stop.stop();
        }
    });
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    tracing_subscriber::fmt().with_max_level(args.log_level()).init();

    let mut server = args.into_server()?;
    stop_on_interrupt(server.stop_handle());

    info!("Starting SOCKS5 proxy: {}", server.config.listen_addr);
    server.run().await
}

#[cfg(test)]
mod tests {
    use super::*;
    use socksd::AuthMethod;

    #[test]
    fn defaults_to_loopback_without_auth() {
        let args = Args::try_parse_from(["socksd"]).unwrap();
        assert_eq!(args.log_level(), Level::INFO);

        let server = args.into_server().unwrap();
        assert_eq!(server.config.listen_addr, "127.0.0.1:1080");
        assert_eq!(server.config.authenticator.method(), AuthMethod::NoAuth);
    }

    #[test]
    fn both_credentials_enable_userpass() {
        let args =
            Args::try_parse_from(["socksd", "-l", "0.0.0.0:9050", "-u", "user", "-p", "pass", "-v"])
                .unwrap();
        assert_eq!(args.log_level(), Level::DEBUG);

        let server = args.into_server().unwrap();
        assert_eq!(server.config.listen_addr, "0.0.0.0:9050");
        assert_eq!(server.config.authenticator.method(), AuthMethod::UserPass);
    }

    #[test]
    fn lone_username_is_rejected() {
        let args = Args::try_parse_from(["socksd", "--username", "user"]).unwrap();
        assert!(args.credentials().is_err());
    }
}
