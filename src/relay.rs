use std::fmt;
use std::io;
use std::sync::Arc;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

const RELAY_BUFFER_SIZE: usize = 16 * 1024;

/// PacketHandle sees every chunk read from one side before it is written
/// to the other. Returning the bytes to forward (possibly rewritten), or
/// `None`/an empty vector to drop the chunk. Dropped bytes are still
/// consumed from the source
pub type PacketHandle = Arc<dyn Fn(&[u8]) -> Option<Vec<u8>> + Send + Sync>;

/// Interceptor holds the optional per-direction packet handles
#[derive(Clone, Default)]
pub struct Interceptor {
    pub client_to_target: Option<PacketHandle>,
    pub target_to_client: Option<PacketHandle>,
}

impl Interceptor {
    pub fn on_client_to_target<F>(mut self, handle: F) -> Self
    where
        F: Fn(&[u8]) -> Option<Vec<u8>> + Send + Sync + 'static,
    {
        self.client_to_target = Some(Arc::new(handle));
        self
    }

    pub fn on_target_to_client<F>(mut self, handle: F) -> Self
    where
        F: Fn(&[u8]) -> Option<Vec<u8>> + Send + Sync + 'static,
    {
        self.target_to_client = Some(Arc::new(handle));
        self
    }
}

impl fmt::Debug for Interceptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Interceptor")
            .field("client_to_target", &self.client_to_target.is_some())
            .field("target_to_client", &self.target_to_client.is_some())
            .finish()
    }
}

/// relay copies client -> target and target -> client concurrently until
/// both directions have stopped, and returns the bytes read from each side.
///
/// A direction stops on end of stream or on the first error; the other
/// direction keeps running. Neither side is half-closed
pub async fn relay<C, T>(client: C, target: T, interceptor: &Interceptor) -> io::Result<(u64, u64)>
where
    C: AsyncRead + AsyncWrite,
    T: AsyncRead + AsyncWrite,
{
    let (mut client_read, mut client_write) = tokio::io::split(client);
    let (mut target_read, mut target_write) = tokio::io::split(target);

    let (from_client, from_target) = tokio::join!(
        copy_chunks(
            &mut client_read,
            &mut target_write,
            interceptor.client_to_target.as_ref()
        ),
        copy_chunks(
            &mut target_read,
            &mut client_write,
            interceptor.target_to_client.as_ref()
        ),
    );

    Ok((from_client?, from_target?))
}

async fn copy_chunks<R, W>(
    reader: &mut R,
    writer: &mut W,
    handle: Option<&PacketHandle>,
) -> io::Result<u64>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut buf = vec![0u8; RELAY_BUFFER_SIZE];
    let mut total = 0u64;

    loop {
        let n = reader.read(&mut buf).await?;
        if n == 0 {
            return Ok(total);
        }
        total += n as u64;

        let chunk = &buf[..n];
        match handle {
            Some(handle) => match handle(chunk) {
                Some(rewritten) if !rewritten.is_empty() => writer.write_all(&rewritten).await?,
                // suppressed
                _ => continue,
            },
            None => writer.write_all(chunk).await?,
        }
        writer.flush().await?;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::duplex;

    #[tokio::test]
    async fn relays_both_directions() {
        let (mut client_app, client_proxy) = duplex(1024);
        let (target_proxy, mut target_app) = duplex(1024);

        let relay_task = tokio::spawn(async move {
            relay(client_proxy, target_proxy, &Interceptor::default()).await
        });

        client_app.write_all(b"ping").await.unwrap();
        let mut buf = [0u8; 4];
        target_app.read_exact(&mut buf).await.unwrap();
        assert_eq!(&buf, b"ping");

        target_app.write_all(b"pong!").await.unwrap();
        let mut buf = [0u8; 5];
        client_app.read_exact(&mut buf).await.unwrap();
        assert_eq!(&buf, b"pong!");

        drop(client_app);
        drop(target_app);

        let (from_client, from_target) = relay_task.await.unwrap().unwrap();
        assert_eq!(from_client, 4);
        assert_eq!(from_target, 5);
    }

    #[tokio::test]
    async fn handle_rewrites_chunks() {
        let (mut client_app, client_proxy) = duplex(1024);
        let (target_proxy, mut target_app) = duplex(1024);
        let interceptor =
            Interceptor::default().on_client_to_target(|chunk| Some(chunk.to_ascii_uppercase()));

        tokio::spawn(async move { relay(client_proxy, target_proxy, &interceptor).await });

        client_app.write_all(b"hello").await.unwrap();
        let mut buf = [0u8; 5];
        target_app.read_exact(&mut buf).await.unwrap();
        assert_eq!(&buf, b"HELLO");

        // Untouched direction
        target_app.write_all(b"hello").await.unwrap();
        client_app.read_exact(&mut buf).await.unwrap();
        assert_eq!(&buf, b"hello");
    }

    #[tokio::test]
    async fn suppressed_chunks_are_consumed_not_forwarded() {
        let (mut client_app, client_proxy) = duplex(1024);
        let (target_proxy, mut target_app) = duplex(1024);
        let interceptor = Interceptor::default().on_client_to_target(|_| None);

        let relay_task =
            tokio::spawn(async move { relay(client_proxy, target_proxy, &interceptor).await });

        client_app.write_all(b"secret").await.unwrap();
        drop(client_app);
        target_app.shutdown().await.unwrap();

        let (from_client, from_target) = relay_task.await.unwrap().unwrap();
        assert_eq!(from_client, 6);
        assert_eq!(from_target, 0);

        let mut received = Vec::new();
        target_app.read_to_end(&mut received).await.unwrap();
        assert!(received.is_empty());
    }
}
