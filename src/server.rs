//! HTTPS listener
//!
//! Binds the router to a TLS-only listener. Connection timeouts:
//! - read: the TLS handshake and each request's headers must arrive within
//!   a few seconds, which bounds slow or idle authentication attempts
//! - write: a connection that makes no write progress for several minutes
//!   is dropped, generous enough for large media transfers
//! - idle: a connection with no traffic in either direction for a couple of
//!   minutes is closed. A response still being sent does not count as idle.

use std::future::Future;
use std::io;
use std::net::SocketAddr;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Duration;

use axum::Router;
use axum_server::accept::Accept;
use axum_server::tls_rustls::{RustlsAcceptor, RustlsConfig};
use axum_server::Handle;
use hyper_util::rt::TokioTimer;
use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};
use tokio::time::{Instant, Sleep};

use crate::config::ServerConfig;
use crate::error::{KubaruError, Result};
use crate::http::create_router;
use crate::state::AppState;
use crate::tls::CertificateStore;

pub const READ_TIMEOUT: Duration = Duration::from_secs(5);
pub const WRITE_TIMEOUT: Duration = Duration::from_secs(10 * 60);
pub const IDLE_TIMEOUT: Duration = Duration::from_secs(2 * 60);

/// Per-connection timeouts
#[derive(Debug, Clone, Copy)]
pub struct Timeouts {
    pub read: Duration,
    pub write: Duration,
    pub idle: Duration,
}

impl Default for Timeouts {
    fn default() -> Self {
        Self {
            read: READ_TIMEOUT,
            write: WRITE_TIMEOUT,
            idle: IDLE_TIMEOUT,
        }
    }
}

/// Start the server for the given configuration. Only returns on error.
pub async fn run(config: ServerConfig, certs: &CertificateStore) -> Result<()> {
    let tls = certs.load().await?;
    let addr = listen_addr(&config).await?;

    let credentials = &config.credentials;
    tracing::info!("Username: {}", credentials.user());
    tracing::info!("Password: {}", credentials.pass());
    tracing::info!("Serving {} media files from {:?}", config.media_files.len(), config.root);
    tracing::info!("Now listening on {}", addr);
    tracing::info!(
        "Access the media playlist locally at https://{}:{}@localhost:{}/",
        credentials.user(),
        credentials.pass(),
        addr.port()
    );

    let state = Arc::new(AppState::new(config));
    let app = create_router(state);

    serve(addr, tls, app, Timeouts::default(), Handle::new()).await
}

/// Serve `app` over TLS on `addr` until the handle shuts it down.
pub async fn serve(
    addr: SocketAddr,
    tls: RustlsConfig,
    app: Router,
    timeouts: Timeouts,
    handle: Handle<SocketAddr>,
) -> Result<()> {
    let acceptor = RustlsAcceptor::new(tls)
        .handshake_timeout(timeouts.read)
        .acceptor(TimeoutAcceptor::new(timeouts.idle, timeouts.write));

    let mut server = axum_server::bind(addr).acceptor(acceptor).handle(handle);
    server
        .http_builder()
        .http1()
        .timer(TokioTimer::new())
        .header_read_timeout(timeouts.read);

    server.serve(app.into_make_service()).await?;
    Ok(())
}

/// Resolve the configured host (IP literal or name) and port.
async fn listen_addr(config: &ServerConfig) -> Result<SocketAddr> {
    tokio::net::lookup_host((config.host.as_str(), config.port))
        .await?
        .next()
        .ok_or_else(|| {
            KubaruError::validation(format!("cannot resolve listen address {}", config.socket_addr()))
        })
}

/// Wraps accepted sockets in a [`TimeoutStream`] before the TLS handshake.
#[derive(Debug, Clone, Copy)]
pub struct TimeoutAcceptor {
    idle_timeout: Duration,
    write_timeout: Duration,
}

impl TimeoutAcceptor {
    pub fn new(idle_timeout: Duration, write_timeout: Duration) -> Self {
        Self {
            idle_timeout,
            write_timeout,
        }
    }
}

impl<I, S> Accept<I, S> for TimeoutAcceptor
where
    I: AsyncRead + AsyncWrite + Unpin,
{
    type Stream = TimeoutStream<I>;
    type Service = S;
    type Future = std::future::Ready<io::Result<(Self::Stream, Self::Service)>>;

    fn accept(&self, stream: I, service: S) -> Self::Future {
        let stream = TimeoutStream::new(stream, self.idle_timeout, self.write_timeout);
        std::future::ready(Ok((stream, service)))
    }
}

/// A stream with two inactivity limits.
///
/// A pending read fails with `TimedOut` once nothing has moved in either
/// direction for `idle_timeout`. While a write is blocked on the peer the
/// connection is busy sending a response, so only `write_timeout` applies.
pub struct TimeoutStream<S> {
    inner: S,
    idle_timeout: Duration,
    write_timeout: Duration,
    last_activity: Instant,
    write_blocked: bool,
    idle_deadline: Option<Pin<Box<Sleep>>>,
    write_deadline: Option<Pin<Box<Sleep>>>,
}

impl<S> TimeoutStream<S> {
    pub fn new(inner: S, idle_timeout: Duration, write_timeout: Duration) -> Self {
        Self {
            inner,
            idle_timeout,
            write_timeout,
            last_activity: Instant::now(),
            write_blocked: false,
            idle_deadline: None,
            write_deadline: None,
        }
    }

    fn mark_activity(&mut self) {
        self.last_activity = Instant::now();
    }

    // Called while a read is pending. The deadline is pushed back instead
    // of firing if the connection was active in the meantime.
    fn poll_idle(&mut self, cx: &mut Context<'_>) -> io::Result<()> {
        let deadline = self.last_activity + self.idle_timeout;
        let sleep = self
            .idle_deadline
            .get_or_insert_with(|| Box::pin(tokio::time::sleep_until(deadline)));

        loop {
            if sleep.as_mut().poll(cx).is_pending() {
                return Ok(());
            }

            let now = Instant::now();
            let next = if self.write_blocked {
                now + self.idle_timeout
            } else {
                self.last_activity + self.idle_timeout
            };
            if next <= now {
                self.idle_deadline = None;
                return Err(timed_out());
            }
            sleep.as_mut().reset(next);
        }
    }

    fn poll_write_op<T>(
        &mut self,
        cx: &mut Context<'_>,
        op: impl FnOnce(Pin<&mut S>, &mut Context<'_>) -> Poll<io::Result<T>>,
    ) -> Poll<io::Result<T>>
    where
        S: Unpin,
    {
        match op(Pin::new(&mut self.inner), cx) {
            Poll::Ready(result) => {
                self.write_blocked = false;
                self.write_deadline = None;
                self.mark_activity();
                Poll::Ready(result)
            }
            Poll::Pending => {
                self.write_blocked = true;
                let timeout = self.write_timeout;
                let sleep = self
                    .write_deadline
                    .get_or_insert_with(|| Box::pin(tokio::time::sleep(timeout)));
                match sleep.as_mut().poll(cx) {
                    Poll::Ready(()) => {
                        self.write_deadline = None;
                        Poll::Ready(Err(timed_out()))
                    }
                    Poll::Pending => Poll::Pending,
                }
            }
        }
    }
}

fn timed_out() -> io::Error {
    io::Error::new(io::ErrorKind::TimedOut, "connection timed out")
}

impl<S: AsyncRead + Unpin> AsyncRead for TimeoutStream<S> {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        let this = self.get_mut();
        match Pin::new(&mut this.inner).poll_read(cx, buf) {
            Poll::Ready(result) => {
                this.idle_deadline = None;
                this.mark_activity();
                Poll::Ready(result)
            }
            Poll::Pending => match this.poll_idle(cx) {
                Ok(()) => Poll::Pending,
                Err(e) => Poll::Ready(Err(e)),
            },
        }
    }
}

impl<S: AsyncWrite + Unpin> AsyncWrite for TimeoutStream<S> {
    fn poll_write(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        self.get_mut()
            .poll_write_op(cx, |inner, cx| inner.poll_write(cx, buf))
    }

    fn poll_write_vectored(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        bufs: &[io::IoSlice<'_>],
    ) -> Poll<io::Result<usize>> {
        self.get_mut()
            .poll_write_op(cx, |inner, cx| inner.poll_write_vectored(cx, bufs))
    }

    fn is_write_vectored(&self) -> bool {
        self.inner.is_write_vectored()
    }

    fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        self.get_mut()
            .poll_write_op(cx, |inner, cx| inner.poll_flush(cx))
    }

    fn poll_shutdown(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.get_mut().inner).poll_shutdown(cx)
    }
}
