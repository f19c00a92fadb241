//! Output accumulation for a running shell.
//!
//! [`OutputBuffer`] is appended to by the background reader and consumed by
//! the expectation engine. Offsets are absolute: they count every byte the
//! shell has produced, so they stay valid after the consumed prefix has been
//! compacted away.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::sync::{oneshot, watch};
use tokio::task::JoinHandle;

use crate::types::Match;

/// Default maximum retained size (1 MB).
pub const DEFAULT_MAX_SIZE: usize = 1024 * 1024;

/// Size of a single read from the terminal.
const READ_CHUNK: usize = 4096;

#[derive(Debug)]
struct Inner {
    data: Vec<u8>,
    /// Absolute offset of `data[0]`.
    base: usize,
    /// Absolute offset of the first unconsumed byte.
    consumed: usize,
    closed: bool,
    max_size: usize,
}

impl Inner {
    const fn end(&self) -> usize {
        self.base + self.data.len()
    }

    fn unconsumed(&self) -> &[u8] {
        &self.data[self.consumed - self.base..]
    }

    fn consume_through(&mut self, offset: usize) {
        self.consumed = offset.clamp(self.consumed, self.end());
    }

    fn compact(&mut self) {
        if self.data.len() <= self.max_size {
            return;
        }
        let discard = self.consumed - self.base;
        if discard > 0 {
            self.data.drain(..discard);
            self.base = self.consumed;
        }
    }
}

#[derive(Debug)]
struct Shared {
    inner: Mutex<Inner>,
    changes: watch::Sender<usize>,
}

/// Shared accumulator of a shell's output.
///
/// Cloning yields another handle to the same buffer.
#[derive(Debug, Clone)]
pub struct OutputBuffer {
    shared: Arc<Shared>,
}

impl Default for OutputBuffer {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_SIZE)
    }
}

impl OutputBuffer {
    /// Create an empty buffer.
    ///
    /// Once more than `max_size` bytes are retained, the consumed prefix is
    /// discarded. Unconsumed output is never dropped.
    #[must_use]
    pub fn new(max_size: usize) -> Self {
        let (changes, _) = watch::channel(0);
        Self {
            shared: Arc::new(Shared {
                inner: Mutex::new(Inner {
                    data: Vec::new(),
                    base: 0,
                    consumed: 0,
                    closed: false,
                    max_size,
                }),
                changes,
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.shared.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Append output read from the shell.
    pub fn append(&self, bytes: &[u8]) {
        let end = {
            let mut inner = self.lock();
            inner.data.extend_from_slice(bytes);
            inner.compact();
            inner.end()
        };
        self.shared.changes.send_replace(end);
    }

    /// Mark the output stream as finished.
    pub fn close(&self) {
        let end = {
            let mut inner = self.lock();
            inner.closed = true;
            inner.end()
        };
        self.shared.changes.send_replace(end);
    }

    /// Whether the reader has observed end-of-stream.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.lock().closed
    }

    /// Subscribe to append and close notifications.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<usize> {
        self.shared.changes.subscribe()
    }

    /// Total bytes received so far.
    #[must_use]
    pub fn total_received(&self) -> usize {
        self.lock().end()
    }

    /// Absolute offset of the first unconsumed byte.
    #[must_use]
    pub fn consumed_offset(&self) -> usize {
        self.lock().consumed
    }

    /// Copy of the unconsumed suffix.
    #[must_use]
    pub fn peek_unconsumed(&self) -> Vec<u8> {
        self.lock().unconsumed().to_vec()
    }

    /// The unconsumed suffix as text, for diagnostics.
    #[must_use]
    pub fn unconsumed_lossy(&self) -> String {
        String::from_utf8_lossy(self.lock().unconsumed()).into_owned()
    }

    /// Everything still retained, consumed or not.
    #[must_use]
    pub fn snapshot(&self) -> String {
        String::from_utf8_lossy(&self.lock().data).into_owned()
    }

    /// Advance the consumed offset to `offset`.
    ///
    /// The offset never moves backwards or past the received data.
    pub fn consume_through(&self, offset: usize) {
        let mut inner = self.lock();
        inner.consume_through(offset);
        inner.compact();
    }

    /// Search the unconsumed suffix and consume through the match.
    ///
    /// `find` receives the unconsumed bytes and returns the range of the
    /// leftmost match within them.
    pub fn consume_match<F>(&self, find: F) -> Option<Match>
    where
        F: FnOnce(&[u8]) -> Option<(usize, usize)>,
    {
        let mut inner = self.lock();
        let unconsumed = inner.unconsumed();
        let (start, end) = find(unconsumed)?;

        let found = Match {
            matched: String::from_utf8_lossy(&unconsumed[start..end]).into_owned(),
            before: String::from_utf8_lossy(&unconsumed[..start]).into_owned(),
            offset: inner.consumed + start,
        };
        let through = inner.consumed + end;
        inner.consume_through(through);
        inner.compact();
        Some(found)
    }
}

/// Background task draining the terminal into an [`OutputBuffer`].
#[derive(Debug)]
pub(crate) struct ReaderTask {
    handle: JoinHandle<()>,
    shutdown: Option<oneshot::Sender<()>>,
}

impl ReaderTask {
    /// Start draining `reader` into `buffer`.
    pub(crate) fn spawn<R>(reader: R, buffer: OutputBuffer) -> Self
    where
        R: AsyncRead + Unpin + Send + 'static,
    {
        let (shutdown, stop) = oneshot::channel();
        let handle = tokio::spawn(read_loop(reader, buffer, stop));
        Self {
            handle,
            shutdown: Some(shutdown),
        }
    }

    /// Stop the task, waiting at most `wait` for it to finish.
    pub(crate) async fn stop(mut self, wait: Duration) {
        if let Some(shutdown) = self.shutdown.take() {
            let _ = shutdown.send(());
        }
        if tokio::time::timeout(wait, &mut self.handle).await.is_err() {
            tracing::warn!("reader task did not stop in time, aborting");
            self.handle.abort();
        }
    }

    /// Abort the task without waiting.
    pub(crate) fn abort(&self) {
        self.handle.abort();
    }
}

async fn read_loop<R>(mut reader: R, buffer: OutputBuffer, mut stop: oneshot::Receiver<()>)
where
    R: AsyncRead + Unpin,
{
    let mut chunk = vec![0u8; READ_CHUNK];
    loop {
        tokio::select! {
            _ = &mut stop => {
                tracing::debug!("reader stopped");
                break;
            }
            read = reader.read(&mut chunk) => match read {
                Ok(0) => {
                    tracing::debug!(total = buffer.total_received(), "end of output");
                    break;
                }
                Ok(n) => {
                    tracing::trace!(bytes = n, "read output");
                    buffer.append(&chunk[..n]);
                }
                Err(e) if e.kind() == std::io::ErrorKind::Interrupted => {}
                Err(e) => {
                    tracing::debug!(error = %e, "read failed, treating as end of output");
                    break;
                }
            },
        }
    }
    buffer.close();
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use tokio::io::AsyncWriteExt;

    fn literal(needle: &'static [u8]) -> impl FnOnce(&[u8]) -> Option<(usize, usize)> {
        move |hay| {
            hay.windows(needle.len())
                .position(|w| w == needle)
                .map(|s| (s, s + needle.len()))
        }
    }

    #[test]
    fn match_consumes_through_end() {
        let buf = OutputBuffer::default();
        buf.append(b"one\r\ncush> two\r\ncush> ");

        let m = buf.consume_match(literal(b"cush> ")).unwrap();
        assert_eq!(m.before, "one\r\n");
        assert_eq!(m.offset, 5);
        assert_eq!(buf.consumed_offset(), 11);
        assert_eq!(buf.unconsumed_lossy(), "two\r\ncush> ");
    }

    #[test]
    fn consumed_text_is_never_rematched() {
        let buf = OutputBuffer::default();
        buf.append(b"cush> ");
        assert!(buf.consume_match(literal(b"cush> ")).is_some());
        assert!(buf.consume_match(literal(b"cush> ")).is_none());
    }

    #[test]
    fn consume_through_is_monotonic_and_bounded() {
        let buf = OutputBuffer::default();
        buf.append(b"abcdef");
        buf.consume_through(4);
        buf.consume_through(2);
        assert_eq!(buf.consumed_offset(), 4);
        buf.consume_through(100);
        assert_eq!(buf.consumed_offset(), 6);
    }

    #[test]
    fn compaction_keeps_unconsumed_bytes() {
        let buf = OutputBuffer::new(8);
        buf.append(b"0123456789");
        assert_eq!(buf.snapshot(), "0123456789");

        buf.consume_through(6);
        buf.append(b"ab");
        assert_eq!(buf.snapshot(), "6789ab");
        assert_eq!(buf.total_received(), 12);
        assert_eq!(buf.consumed_offset(), 6);

        let m = buf.consume_match(literal(b"9a")).unwrap();
        assert_eq!(m.offset, 9);
    }

    #[test]
    fn appends_notify_subscribers() {
        let buf = OutputBuffer::default();
        let mut rx = buf.subscribe();
        buf.append(b"xyz");
        assert!(rx.has_changed().unwrap());
        assert_eq!(*rx.borrow_and_update(), 3);
    }

    #[tokio::test]
    async fn reader_task_drains_until_eof() {
        let (mut tx, rx) = tokio::io::duplex(64);
        let buf = OutputBuffer::default();
        let mut changes = buf.subscribe();
        let task = ReaderTask::spawn(rx, buf.clone());

        tx.write_all(b"hello ").await.unwrap();
        tx.write_all(b"world").await.unwrap();
        drop(tx);

        while !buf.is_closed() {
            changes.changed().await.unwrap();
        }
        assert_eq!(buf.snapshot(), "hello world");
        task.stop(Duration::from_secs(1)).await;
    }

    #[tokio::test]
    async fn stop_interrupts_pending_read() {
        let (_tx, rx) = tokio::io::duplex(64);
        let buf = OutputBuffer::default();
        let task = ReaderTask::spawn(rx, buf.clone());

        task.stop(Duration::from_secs(1)).await;
        assert!(buf.is_closed());
    }

    proptest! {
        #[test]
        fn tokens_match_in_production_order(
            count in 1usize..20,
            splits in proptest::collection::vec(0usize..200, 0..10),
        ) {
            let stream: Vec<u8> = (0..count)
                .flat_map(|i| format!("out-{i:02};").into_bytes())
                .collect();
            let mut cuts: Vec<usize> = splits.into_iter().map(|s| s % (stream.len() + 1)).collect();
            cuts.sort_unstable();

            let buf = OutputBuffer::new(16);
            let mut prev = 0;
            for cut in cuts.into_iter().chain(std::iter::once(stream.len())) {
                buf.append(&stream[prev..cut]);
                prev = cut;
            }

            let mut last = 0;
            for i in 0..count {
                let token = format!("out-{i:02};");
                let needle = token.as_bytes();
                let m = buf
                    .consume_match(|hay| {
                        hay.windows(needle.len())
                            .position(|w| w == needle)
                            .map(|s| (s, s + needle.len()))
                    })
                    .unwrap();
                prop_assert_eq!(&m.matched, &token);
                prop_assert!(m.offset >= last);
                last = buf.consumed_offset();
            }
            prop_assert_eq!(buf.consumed_offset(), buf.total_received());
        }
    }
}
