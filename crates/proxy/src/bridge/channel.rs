//! External side of the bridge: stdio or one loopback TCP connection

use common::{Error, Result};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpStream;
use tracing::info;

pub type ChannelReader = Box<dyn AsyncRead + Unpin + Send>;
pub type ChannelWriter = Box<dyn AsyncWrite + Unpin + Send>;

pub enum ExternalChannel {
    Stdio,
    Tcp(TcpStream),
}

impl ExternalChannel {
    /// Connect to `localhost:<port>` when a port is given, else use stdio
    pub async fn open(connect_port: Option<u16>) -> Result<Self> {
        let Some(port) = connect_port else {
            return Ok(ExternalChannel::Stdio);
        };

        let stream = TcpStream::connect(("localhost", port))
            .await
            .map_err(|source| Error::Connect { port, source })?;
        stream.set_nodelay(true)?;
        info!("Connected to localhost:{}", port);
        Ok(ExternalChannel::Tcp(stream))
    }

    /// Split into independently owned halves. For TCP the socket closes
    /// once both halves are dropped.
    pub fn split(self) -> (ChannelReader, ChannelWriter) {
        match self {
            ExternalChannel::Stdio => (
                Box::new(tokio::io::stdin()),
                Box::new(tokio::io::stdout()),
            ),
            ExternalChannel::Tcp(stream) => {
                let (reader, writer) = stream.into_split();
                (Box::new(reader), Box::new(writer))
            }
        }
    }

    pub fn describe(&self) -> String {
        match self {
            ExternalChannel::Stdio => "stdio".to_string(),
            ExternalChannel::Tcp(stream) => match stream.peer_addr() {
                Ok(addr) => format!("tcp {}", addr),
                Err(_) => "tcp".to_string(),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    #[tokio::test]
    async fn test_no_port_means_stdio() {
        let channel = ExternalChannel::open(None).await.unwrap();
        assert_eq!(channel.describe(), "stdio");
    }

    #[tokio::test]
    async fn test_tcp_halves_share_socket() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();

        let channel = ExternalChannel::Tcp(
            TcpStream::connect(("127.0.0.1", port)).await.unwrap(),
        );
        let (mut peer, _) = listener.accept().await.unwrap();
        let (mut reader, mut writer) = channel.split();

        writer.write_all(b"ping").await.unwrap();
        let mut buf = [0u8; 4];
        peer.read_exact(&mut buf).await.unwrap();
        assert_eq!(&buf, b"ping");

        peer.write_all(b"pong").await.unwrap();
        reader.read_exact(&mut buf).await.unwrap();
        assert_eq!(&buf, b"pong");

        drop(reader);
        drop(writer);
        assert_eq!(peer.read(&mut buf).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_connect_refused() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        let err = ExternalChannel::open(Some(port)).await.err().unwrap();
        assert!(matches!(err, Error::Connect { .. }));
    }
}
