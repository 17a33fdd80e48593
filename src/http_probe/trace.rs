use std::fmt;
use std::io;
use std::pin::Pin;
use std::sync::{Arc, Mutex, OnceLock};
use std::task::{Context, Poll};
use std::time::Duration;

use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};
use tokio::time::Instant;

/// Where the time of one HTTP probe went.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PhaseTimings {
    pub dns: Duration,
    /// TCP connect, plus the CONNECT tunnel when going through a proxy.
    pub connect: Duration,
    /// Only set for https.
    pub tls: Option<Duration>,
    /// From connection ready until the request was fully written.
    pub request: Duration,
    /// From request written until the first response byte.
    pub wait_response: Duration,
    pub response_body: Duration,
}

impl fmt::Display for PhaseTimings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "connect={:.3?}", self.connect)?;
        if let Some(tls) = self.tls {
            write!(f, " tls={tls:.3?}")?;
        }
        write!(
            f,
            " request={:.3?} wait_response={:.3?} response_body={:.3?}",
            self.request, self.wait_response, self.response_body
        )
    }
}

/// Timestamps of the I/O on one connection.
#[derive(Debug, Default)]
pub(crate) struct IoClock {
    last_write: Mutex<Option<Instant>>,
    first_read: OnceLock<Instant>,
}

impl IoClock {
    fn mark_write(&self) {
        if self.first_read.get().is_some() {
            return;
        }
        if let Ok(mut last) = self.last_write.lock() {
            *last = Some(Instant::now());
        }
    }

    fn mark_read(&self) {
        let _ = self.first_read.set(Instant::now());
    }

    /// Last write before the first byte came back.
    pub(crate) fn request_written(&self) -> Option<Instant> {
        self.last_write.lock().ok().and_then(|last| *last)
    }

    pub(crate) fn first_byte(&self) -> Option<Instant> {
        self.first_read.get().copied()
    }
}

/// Stream wrapper that records when the request went out and the response started.
pub(crate) struct TimedIo<S> {
    inner: S,
    clock: Arc<IoClock>,
}

impl<S> TimedIo<S> {
    pub(crate) fn new(inner: S, clock: Arc<IoClock>) -> Self {
        Self { inner, clock }
    }
}

impl<S: AsyncRead + Unpin> AsyncRead for TimedIo<S> {
    fn poll_read(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        let before = buf.filled().len();
        let res = Pin::new(&mut self.inner).poll_read(cx, buf);
        if let Poll::Ready(Ok(())) = res {
            if buf.filled().len() > before {
                self.clock.mark_read();
            }
        }
        res
    }
}

impl<S: AsyncWrite + Unpin> AsyncWrite for TimedIo<S> {
    fn poll_write(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        let res = Pin::new(&mut self.inner).poll_write(cx, buf);
        if let Poll::Ready(Ok(n)) = res {
            if n > 0 {
                self.clock.mark_write();
            }
        }
        res
    }

    fn poll_write_vectored(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        bufs: &[io::IoSlice<'_>],
    ) -> Poll<io::Result<usize>> {
        let res = Pin::new(&mut self.inner).poll_write_vectored(cx, bufs);
        if let Poll::Ready(Ok(n)) = res {
            if n > 0 {
                self.clock.mark_write();
            }
        }
        res
    }

    fn is_write_vectored(&self) -> bool {
        self.inner.is_write_vectored()
    }

    fn poll_flush(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.inner).poll_flush(cx)
    }

    fn poll_shutdown(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.inner).poll_shutdown(cx)
    }
}

#[cfg(test)]
mod tests {
    use tokio::io::{AsyncReadExt, AsyncWriteExt};

    use super::*;

    #[test]
    fn test_display_without_tls() {
        let phases = PhaseTimings {
            dns: Duration::from_millis(1),
            connect: Duration::from_millis(2),
            tls: None,
            request: Duration::from_micros(150),
            wait_response: Duration::from_millis(30),
            response_body: Duration::from_millis(4),
        };
        assert_eq!(
            phases.to_string(),
            "connect=2.000ms request=150.000µs wait_response=30.000ms response_body=4.000ms"
        );
    }

    #[test]
    fn test_display_with_tls() {
        let phases = PhaseTimings {
            tls: Some(Duration::from_millis(12)),
            ..Default::default()
        };
        assert!(phases.to_string().contains(" tls=12.000ms request="));
    }

    #[tokio::test]
    async fn test_clock_orders_write_before_read() {
        let (client, mut server) = tokio::io::duplex(64);
        let clock = Arc::new(IoClock::default());
        let mut timed = TimedIo::new(client, clock.clone());

        assert!(clock.request_written().is_none());
        timed.write_all(b"ping").await.expect("write");
        let written = clock.request_written().expect("write recorded");

        let mut buf = [0u8; 4];
        server.read_exact(&mut buf).await.expect("server read");
        server.write_all(b"pong").await.expect("server write");
        timed.read_exact(&mut buf).await.expect("read");

        let first = clock.first_byte().expect("read recorded");
        assert!(first >= written);

        // Writes after the response started do not move the request mark.
        timed.write_all(b"late").await.expect("write");
        assert_eq!(clock.request_written(), Some(written));
    }
}
