//! Wraps a stream's write half so every write is metered through the same
//! `TokenBucket` primitive used for connection/request admission (spec.md
//! §4.1 "Byte-rate limiters use the same state machine with
//! tokens=bytes... issued in chunks up to `maxQueueGrantSize`").

use std::io;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use futures::future::BoxFuture;
use pin_project_lite::pin_project;
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt, ReadBuf};
use tokio_util::sync::CancellationToken;

use token_bucket::{Grant, TokenBucket};

pin_project! {
    /// An `AsyncWrite` adapter that requests a byte grant from `bucket`
    /// before forwarding bytes to `inner`, so a connection's outbound
    /// throughput is capped by a `DataRateLimiter` without the caller
    /// needing to chunk writes itself.
    pub struct ShapedWriter<W> {
        #[pin]
        inner: W,
        bucket: Arc<TokenBucket>,
        cancel: CancellationToken,
        pending: Option<BoxFuture<'static, Grant>>,
    }
}

impl<W> ShapedWriter<W> {
    #[must_use]
    pub fn new(inner: W, bucket: Arc<TokenBucket>, cancel: CancellationToken) -> Self {
        Self { inner, bucket, cancel, pending: None }
    }
}

impl<W: AsyncWrite> AsyncWrite for ShapedWriter<W> {
    fn poll_write(self: Pin<&mut Self>, cx: &mut Context<'_>, buf: &[u8]) -> Poll<io::Result<usize>> {
        let mut this = self.project();
        loop {
            if this.pending.is_none() {
                let requested = buf.len() as f64;
                let bucket = Arc::clone(this.bucket);
                let cancel = this.cancel.clone();
                *this.pending = Some(Box::pin(async move { bucket.request_grant(requested, &cancel).await }));
            }
            let grant = match this.pending.as_mut().expect("just set").as_mut().poll(cx) {
                Poll::Ready(grant) => {
                    *this.pending = None;
                    grant
                }
                Poll::Pending => return Poll::Pending,
            };
            if !grant.granted {
                return Poll::Ready(Err(io::Error::new(io::ErrorKind::Other, "data rate limit denied write")));
            }
            let allowed = (grant.grant_size as usize).min(buf.len()).max(1);
            return this.inner.as_mut().poll_write(cx, &buf[..allowed]);
        }
    }

    fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        self.project().inner.poll_flush(cx)
    }

    fn poll_shutdown(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        self.project().inner.poll_shutdown(cx)
    }
}

pin_project! {
    /// A full-duplex variant of [`ShapedWriter`]: reads pass straight
    /// through, writes are metered. Used to wrap a TCP connection before
    /// handing it to the HTTP engine, so a `DataRateLimiter` can shape a
    /// connection's egress without the engine needing to know about rate
    /// limiting at all.
    pub struct ShapedStream<S> {
        #[pin]
        io: S,
        bucket: Arc<TokenBucket>,
        cancel: CancellationToken,
        pending: Option<BoxFuture<'static, Grant>>,
    }
}

impl<S> ShapedStream<S> {
    #[must_use]
    pub fn new(io: S, bucket: Arc<TokenBucket>, cancel: CancellationToken) -> Self {
        Self { io, bucket, cancel, pending: None }
    }
}

impl<S: AsyncRead> AsyncRead for ShapedStream<S> {
    fn poll_read(self: Pin<&mut Self>, cx: &mut Context<'_>, buf: &mut ReadBuf<'_>) -> Poll<io::Result<()>> {
        self.project().io.poll_read(cx, buf)
    }
}

impl<S: AsyncWrite> AsyncWrite for ShapedStream<S> {
    fn poll_write(self: Pin<&mut Self>, cx: &mut Context<'_>, buf: &[u8]) -> Poll<io::Result<usize>> {
        let mut this = self.project();
        loop {
            if this.pending.is_none() {
                let requested = buf.len() as f64;
                let bucket = Arc::clone(this.bucket);
                let cancel = this.cancel.clone();
                *this.pending = Some(Box::pin(async move { bucket.request_grant(requested, &cancel).await }));
            }
            let grant = match this.pending.as_mut().expect("just set").as_mut().poll(cx) {
                Poll::Ready(grant) => {
                    *this.pending = None;
                    grant
                }
                Poll::Pending => return Poll::Pending,
            };
            if !grant.granted {
                return Poll::Ready(Err(io::Error::new(io::ErrorKind::Other, "data rate limit denied write")));
            }
            let allowed = (grant.grant_size as usize).min(buf.len()).max(1);
            return this.io.as_mut().poll_write(cx, &buf[..allowed]);
        }
    }

    fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        self.project().io.poll_flush(cx)
    }

    fn poll_shutdown(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        self.project().io.poll_shutdown(cx)
    }
}

#[cfg(test)]
mod tests {
    use token_bucket::TokenBucketConfig;

    use super::*;

    #[tokio::test(start_paused = true)]
    async fn shaped_writer_forwards_bytes_within_burst() {
        let bucket = Arc::new(TokenBucket::new(TokenBucketConfig {
            flow_rate_per_sec: 1000.0,
            max_burst_size: 1000.0,
            max_queue_size: 0.0,
            max_queue_grant_size: None,
        }));
        let mut buf = Vec::new();
        let mut writer = ShapedWriter::new(&mut buf, bucket, CancellationToken::new());
        writer.write_all(b"hello").await.unwrap();
        assert_eq!(buf, b"hello");
    }

    #[tokio::test(start_paused = true)]
    async fn shaped_writer_errors_once_bucket_denies() {
        let bucket = Arc::new(TokenBucket::new(TokenBucketConfig {
            flow_rate_per_sec: 0.0,
            max_burst_size: 0.0,
            max_queue_size: 0.0,
            max_queue_grant_size: None,
        }));
        let mut buf = Vec::new();
        let mut writer = ShapedWriter::new(&mut buf, bucket, CancellationToken::new());
        assert!(writer.write_all(b"hello").await.is_err());
    }
}
