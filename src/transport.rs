//! Socket transport, grounded on `mysql::stream::Stream`: a small enum
//! wrapping a plain or TLS-wrapped `TcpStream` behind `AsyncRead`/
//! `AsyncWrite`, so the rest of the crate never matches on the TLS feature
//! flag directly.

use std::io;
use std::net::SocketAddr;
use std::pin::Pin;
use std::task::{Context, Poll};

use tokio::io::{AsyncRead, AsyncWrite, BufStream, ReadBuf};
use tokio::net::TcpStream;

#[cfg(feature = "tls")]
use openssl::ssl::SslConnector;
#[cfg(feature = "tls")]
use tokio_openssl::SslStream;

#[derive(Debug)]
pub enum Stream {
  Tcp(BufStream<TcpStream>),
  #[cfg(feature = "tls")]
  Tls(SslStream<BufStream<TcpStream>>),
}

impl Stream {
  pub async fn connect_tcp(addr: SocketAddr) -> io::Result<Self> {
    let stream = TcpStream::connect(addr).await?;
    stream.set_nodelay(true)?;
    Ok(Self::Tcp(BufStream::new(stream)))
  }

  #[cfg(feature = "tls")]
  pub async fn into_tls(self, domain: &str, connector: SslConnector) -> io::Result<Self> {
    match self {
      Stream::Tcp(inner) => {
        let configuration = connector
          .configure()
          .map_err(|e| io::Error::new(io::ErrorKind::Other, e.to_string()))?;
        let ssl = configuration
          .into_ssl(domain)
          .map_err(|e| io::Error::new(io::ErrorKind::Other, e.to_string()))?;
        let mut tls = SslStream::new(ssl, inner).map_err(|e| io::Error::new(io::ErrorKind::Other, e.to_string()))?;
        Pin::new(&mut tls)
          .connect()
          .await
          .map_err(|e| io::Error::new(io::ErrorKind::ConnectionRefused, e.to_string()))?;
        Ok(Self::Tls(tls))
      }
      s @ Stream::Tls(_) => Ok(s),
    }
  }
}

impl AsyncRead for Stream {
  fn poll_read(self: Pin<&mut Self>, cx: &mut Context<'_>, buf: &mut ReadBuf<'_>) -> Poll<io::Result<()>> {
    match self.get_mut() {
      Stream::Tcp(s) => Pin::new(s).poll_read(cx, buf),
      #[cfg(feature = "tls")]
      Stream::Tls(s) => Pin::new(s).poll_read(cx, buf),
    }
  }
}

impl AsyncWrite for Stream {
  fn poll_write(self: Pin<&mut Self>, cx: &mut Context<'_>, buf: &[u8]) -> Poll<io::Result<usize>> {
    match self.get_mut() {
      Stream::Tcp(s) => Pin::new(s).poll_write(cx, buf),
      #[cfg(feature = "tls")]
      Stream::Tls(s) => Pin::new(s).poll_write(cx, buf),
    }
  }

  fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
    match self.get_mut() {
      Stream::Tcp(s) => Pin::new(s).poll_flush(cx),
      #[cfg(feature = "tls")]
      Stream::Tls(s) => Pin::new(s).poll_flush(cx),
    }
  }

  fn poll_shutdown(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
    match self.get_mut() {
      Stream::Tcp(s) => Pin::new(s).poll_shutdown(cx),
      #[cfg(feature = "tls")]
      Stream::Tls(s) => Pin::new(s).poll_shutdown(cx),
    }
  }
}
