//! Logical stream multiplexing over a single connection.
//!
//! Each application byte stream gets an independent ordered view while the
//! connection carries all streams interleaved as format-defined cells. The
//! engine only needs the per-stream buffers and cursors; cell framing is
//! format data, not engine logic.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use bytes::Bytes;
use parking_lot::{Mutex, RwLock};

/// Stream identifier.
pub type StreamId = u32;

/// A logical, ordered application byte channel.
///
/// Both cursors are monotonic: consumed bytes are gone, nothing rewinds.
/// A stream is created lazily on first reference and lives until the
/// session is torn down.
pub struct Stream {
    id: StreamId,
    inner: Mutex<Inner>,
}

struct Inner {
    /// Bytes received off the wire, not yet consumed by the application.
    recv: VecDeque<u8>,
    /// Outbound application bytes not yet shaped onto the wire.
    send: VecDeque<u8>,
    /// Read cursor: total bytes ever consumed from `recv`.
    bytes_read: u64,
    /// Write cursor: total bytes ever appended to `send`.
    bytes_written: u64,
}

impl Stream {
    fn new(id: StreamId) -> Self {
        Self {
            id,
            inner: Mutex::new(Inner {
                recv: VecDeque::new(),
                send: VecDeque::new(),
                bytes_read: 0,
                bytes_written: 0,
            }),
        }
    }

    /// Get the stream ID.
    pub fn id(&self) -> StreamId {
        self.id
    }

    /// Append bytes received off the wire for this stream.
    pub fn enqueue(&self, data: &[u8]) {
        self.inner.lock().recv.extend(data.iter().copied());
    }

    /// Consume received bytes into `buf`, advancing the read cursor.
    ///
    /// Returns how many bytes were copied; never blocks.
    pub fn read(&self, buf: &mut [u8]) -> usize {
        let mut inner = self.inner.lock();
        let n = buf.len().min(inner.recv.len());
        for (i, b) in inner.recv.drain(..n).enumerate() {
            buf[i] = b;
        }
        inner.bytes_read += n as u64;
        n
    }

    /// Copy of the most recent unconsumed received bytes, up to `max`.
    ///
    /// Transition guards match against this window; peeking does not
    /// advance the read cursor.
    pub fn peek(&self, max: usize) -> Vec<u8> {
        let inner = self.inner.lock();
        let skip = inner.recv.len().saturating_sub(max);
        inner.recv.iter().skip(skip).copied().collect()
    }

    /// Append outbound application bytes, advancing the write cursor.
    pub fn write(&self, data: &[u8]) {
        let mut inner = self.inner.lock();
        inner.send.extend(data.iter().copied());
        inner.bytes_written += data.len() as u64;
    }

    /// Take up to `max` buffered outbound bytes for shaping onto the wire.
    pub fn drain(&self, max: usize) -> Bytes {
        let mut inner = self.inner.lock();
        let n = max.min(inner.send.len());
        let out: Vec<u8> = inner.send.drain(..n).collect();
        Bytes::from(out)
    }

    /// Unconsumed received byte count.
    pub fn pending_recv(&self) -> usize {
        self.inner.lock().recv.len()
    }

    /// Outbound byte count not yet drained.
    pub fn pending_send(&self) -> usize {
        self.inner.lock().send.len()
    }

    /// Total bytes ever consumed from this stream.
    pub fn bytes_read(&self) -> u64 {
        self.inner.lock().bytes_read
    }

    /// Total bytes ever written to this stream.
    pub fn bytes_written(&self) -> u64 {
        self.inner.lock().bytes_written
    }
}

/// All logical streams of one session.
///
/// Streams are created lazily by [`StreamSet::get`] and never destroyed
/// mid-session. Only the single task driving the owning FSM mutates the
/// set; that is a contract with the caller, not something enforced here.
#[derive(Default)]
pub struct StreamSet {
    streams: RwLock<HashMap<StreamId, Arc<Stream>>>,
}

impl StreamSet {
    /// Create an empty stream set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Get the stream with `id`, creating it on first access.
    pub fn get(&self, id: StreamId) -> Arc<Stream> {
        if let Some(stream) = self.streams.read().get(&id) {
            return Arc::clone(stream);
        }

        let mut streams = self.streams.write();
        Arc::clone(
            streams
                .entry(id)
                .or_insert_with(|| Arc::new(Stream::new(id))),
        )
    }

    /// Visit every stream, in no particular order.
    ///
    /// Used at session teardown to drain leftover buffers.
    pub fn for_each<F: FnMut(&Stream)>(&self, mut f: F) {
        for stream in self.streams.read().values() {
            f(stream);
        }
    }

    /// All stream IDs, sorted.
    pub fn ids(&self) -> Vec<StreamId> {
        let mut ids: Vec<_> = self.streams.read().keys().copied().collect();
        ids.sort_unstable();
        ids
    }

    /// Number of streams created so far.
    pub fn len(&self) -> usize {
        self.streams.read().len()
    }

    /// True if no stream has been referenced yet.
    pub fn is_empty(&self) -> bool {
        self.streams.read().is_empty()
    }
}
