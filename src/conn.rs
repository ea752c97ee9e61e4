//! Connection capability boundary between the engine and the transport.
//!
//! The engine needs exactly three things from a transport: a read, a write,
//! and a way to tell whether a given I/O error is a retryable timeout.
//! Concrete TCP/TLS behavior lives behind this trait so tests can substitute
//! scripted doubles without touching the driver.

use std::io;
use std::time::Duration;

use async_trait::async_trait;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tokio::sync::Mutex;
use tokio::time::timeout;

/// Minimal byte-channel capability the engine requires.
///
/// The two directions are independent; a write may return a short count and
/// is never assumed atomic. The engine never issues two concurrent reads,
/// or two concurrent writes, on the same connection.
#[async_trait]
pub trait Connection: Send + Sync {
    /// Read up to `buf.len()` bytes, returning how many were read.
    async fn read(&self, buf: &mut [u8]) -> io::Result<usize>;

    /// Write a prefix of `buf`, returning how many bytes were accepted.
    async fn write(&self, buf: &[u8]) -> io::Result<usize>;

    /// Classify an I/O error as a retryable timeout.
    ///
    /// A timeout means the transport is slow but live; the canonical I/O
    /// actions retry with the unsent remainder instead of aborting.
    fn is_timeout(&self, err: &io::Error) -> bool {
        matches!(
            err.kind(),
            io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock
        )
    }
}

/// TCP adapter satisfying the [`Connection`] capability set.
///
/// The stream is split so the read and write directions stay independent;
/// each half sits behind its own lock so the adapter can be shared as
/// `Arc<dyn Connection>` while honoring the engine's non-reentrancy rule.
pub struct TcpConn {
    reader: Mutex<OwnedReadHalf>,
    writer: Mutex<OwnedWriteHalf>,
    read_timeout: Option<Duration>,
    write_timeout: Option<Duration>,
}

impl TcpConn {
    /// Wrap a connected TCP stream with no per-call deadlines.
    pub fn new(stream: TcpStream) -> Self {
        Self::with_timeouts(stream, None, None)
    }

    /// Wrap a connected TCP stream with optional per-call deadlines.
    ///
    /// When a deadline elapses the call returns a `TimedOut` error, which
    /// the engine classifies as retryable.
    pub fn with_timeouts(
        stream: TcpStream,
        read_timeout: Option<Duration>,
        write_timeout: Option<Duration>,
    ) -> Self {
        let (reader, writer) = stream.into_split();
        Self {
            reader: Mutex::new(reader),
            writer: Mutex::new(writer),
            read_timeout,
            write_timeout,
        }
    }
}

#[async_trait]
impl Connection for TcpConn {
    async fn read(&self, buf: &mut [u8]) -> io::Result<usize> {
        let mut reader = self.reader.lock().await;
        match self.read_timeout {
            Some(limit) => match timeout(limit, reader.read(buf)).await {
                Ok(res) => res,
                Err(_) => Err(io::Error::new(io::ErrorKind::TimedOut, "read timed out")),
            },
            None => reader.read(buf).await,
        }
    }

    async fn write(&self, buf: &[u8]) -> io::Result<usize> {
        let mut writer = self.writer.lock().await;
        match self.write_timeout {
            Some(limit) => match timeout(limit, writer.write(buf)).await {
                Ok(res) => res,
                Err(_) => Err(io::Error::new(io::ErrorKind::TimedOut, "write timed out")),
            },
            None => writer.write(buf).await,
        }
    }
}

#[cfg(test)]
pub(crate) mod testing {
    //! Scripted connection double for engine and plugin tests.

    use std::collections::VecDeque;
    use std::io;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;
    use parking_lot::Mutex;

    use super::Connection;

    /// What a scripted connection does once its script runs dry.
    pub(crate) enum Exhausted {
        /// Accept every write in full; reads return `Ok(0)`.
        AcceptAll,
        /// Report a timeout forever (stalled-but-live transport).
        TimeoutForever,
        /// Fail hard, catching tests that issue unexpected I/O.
        Fail,
    }

    /// Connection double driven by per-call scripts, in the spirit of a
    /// hand-rolled mock with a `WriteFn`.
    pub(crate) struct ScriptedConn {
        write_script: Mutex<VecDeque<io::Result<usize>>>,
        read_script: Mutex<VecDeque<io::Result<Vec<u8>>>>,
        written: Mutex<Vec<u8>>,
        write_calls: AtomicUsize,
        read_calls: AtomicUsize,
        exhausted: Exhausted,
    }

    impl ScriptedConn {
        /// A connection that accepts everything written to it.
        pub(crate) fn accepting() -> Self {
            Self::new(Vec::new(), Vec::new(), Exhausted::AcceptAll)
        }

        /// A connection that follows `write_script` exactly and then fails.
        pub(crate) fn scripted_writes(write_script: Vec<io::Result<usize>>) -> Self {
            Self::new(write_script, Vec::new(), Exhausted::Fail)
        }

        /// A connection that delivers `read_script` chunks and then fails.
        pub(crate) fn scripted_reads(read_script: Vec<io::Result<Vec<u8>>>) -> Self {
            Self::new(Vec::new(), read_script, Exhausted::Fail)
        }

        /// A connection whose every call times out, without ever suspending.
        pub(crate) fn stalled() -> Self {
            Self::new(Vec::new(), Vec::new(), Exhausted::TimeoutForever)
        }

        fn new(
            write_script: Vec<io::Result<usize>>,
            read_script: Vec<io::Result<Vec<u8>>>,
            exhausted: Exhausted,
        ) -> Self {
            Self {
                write_script: Mutex::new(write_script.into()),
                read_script: Mutex::new(read_script.into()),
                written: Mutex::new(Vec::new()),
                write_calls: AtomicUsize::new(0),
                read_calls: AtomicUsize::new(0),
                exhausted,
            }
        }

        /// All bytes the connection has accepted so far.
        pub(crate) fn written(&self) -> Vec<u8> {
            self.written.lock().clone()
        }

        pub(crate) fn write_calls(&self) -> usize {
            self.write_calls.load(Ordering::SeqCst)
        }

        pub(crate) fn read_calls(&self) -> usize {
            self.read_calls.load(Ordering::SeqCst)
        }

        pub(crate) fn io_calls(&self) -> usize {
            self.write_calls() + self.read_calls()
        }

        fn timeout_err() -> io::Error {
            io::Error::new(io::ErrorKind::TimedOut, "scripted timeout")
        }
    }

    #[async_trait]
    impl Connection for ScriptedConn {
        async fn read(&self, buf: &mut [u8]) -> io::Result<usize> {
            self.read_calls.fetch_add(1, Ordering::SeqCst);
            let step = self.read_script.lock().pop_front();
            match step {
                Some(Ok(chunk)) => {
                    let n = chunk.len().min(buf.len());
                    buf[..n].copy_from_slice(&chunk[..n]);
                    Ok(n)
                }
                Some(Err(e)) => Err(e),
                None => match self.exhausted {
                    Exhausted::AcceptAll => Ok(0),
                    // Completes without ever suspending, like a transport
                    // that fails fast.
                    Exhausted::TimeoutForever => Err(Self::timeout_err()),
                    Exhausted::Fail => Err(io::Error::other("unexpected read")),
                },
            }
        }

        async fn write(&self, buf: &[u8]) -> io::Result<usize> {
            self.write_calls.fetch_add(1, Ordering::SeqCst);
            let step = self.write_script.lock().pop_front();
            match step {
                Some(Ok(n)) => {
                    let n = n.min(buf.len());
                    self.written.lock().extend_from_slice(&buf[..n]);
                    Ok(n)
                }
                Some(Err(e)) => Err(e),
                None => match self.exhausted {
                    Exhausted::AcceptAll => {
                        self.written.lock().extend_from_slice(buf);
                        Ok(buf.len())
                    }
                    Exhausted::TimeoutForever => Err(Self::timeout_err()),
                    Exhausted::Fail => Err(io::Error::other("unexpected write")),
                },
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::io;

    use super::testing::ScriptedConn;
    use super::Connection;

    #[tokio::test]
    async fn test_timeout_classification() {
        let conn = ScriptedConn::accepting();

        assert!(conn.is_timeout(&io::Error::new(io::ErrorKind::TimedOut, "t")));
        assert!(conn.is_timeout(&io::Error::new(io::ErrorKind::WouldBlock, "w")));
        assert!(!conn.is_timeout(&io::Error::new(io::ErrorKind::BrokenPipe, "b")));
    }

    #[tokio::test]
    async fn test_scripted_partial_write() {
        let conn = ScriptedConn::scripted_writes(vec![Ok(2), Ok(1)]);

        let n = conn.write(b"foo").await.unwrap();
        assert_eq!(n, 2);
        let n = conn.write(b"o").await.unwrap();
        assert_eq!(n, 1);

        assert_eq!(conn.written(), b"foo");
        assert_eq!(conn.write_calls(), 2);
    }

    #[tokio::test]
    async fn test_scripted_read_chunks() {
        let conn = ScriptedConn::scripted_reads(vec![Ok(b"he".to_vec()), Ok(b"y".to_vec())]);

        let mut buf = [0u8; 8];
        let n = conn.read(&mut buf).await.unwrap();
        assert_eq!(&buf[..n], b"he");
        let n = conn.read(&mut buf).await.unwrap();
        assert_eq!(&buf[..n], b"y");
        assert_eq!(conn.read_calls(), 2);
    }

    #[tokio::test]
    async fn test_script_exhaustion_fails() {
        let conn = ScriptedConn::scripted_writes(vec![Ok(1)]);
        conn.write(b"x").await.unwrap();

        let err = conn.write(b"y").await.unwrap_err();
        assert_eq!(err.to_string(), "unexpected write");
    }
}
