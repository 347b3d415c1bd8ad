//! Response bodies.
//!
//! Buffered bodies wrap a [`Full`] byte buffer. Streamed bodies are fed by a
//! blocking producer that owns the underlying reader (an archive entry or a
//! plain file) and pushes fixed-size chunks through a bounded channel:
//!
//! ```text
//! blocking pool                       connection task
//! ┌──────────────────────┐  chunks   ┌──────────────┐
//! │ producer owns reader │ ────────► │  ByteStream  │ ──► hyper
//! └──────────────────────┘  (mpsc)   └──────────────┘
//! ```
//!
//! Dropping the [`ByteStream`] (the client went away, or hyper discarded the
//! body of a `HEAD` response) closes the channel. The producer's next send
//! fails, it returns, and the reader is dropped on the blocking thread.

use std::io::{self, Read};
use std::pin::Pin;
use std::task::{Context, Poll};

use bytes::Bytes;
use futures_util::Stream;
use http_body_util::combinators::UnsyncBoxBody;
use http_body_util::{BodyExt, Empty, Full, StreamBody};
use hyper::body::Frame;
use tokio::sync::mpsc;

/// Default size of a streamed chunk.
pub const DEFAULT_CHUNK_SIZE: usize = 64 * 1024;

/// Default number of chunks buffered between producer and connection.
pub const DEFAULT_CHANNEL_CAPACITY: usize = 4;

/// Boxed body used by every response this crate builds.
pub type ResponseBody = UnsyncBoxBody<Bytes, io::Error>;

/// Creates a buffered body.
pub fn full(bytes: impl Into<Bytes>) -> ResponseBody {
    Full::new(bytes.into())
        .map_err(|never| match never {})
        .boxed_unsync()
}

/// Creates an empty body.
pub fn empty() -> ResponseBody {
    Empty::<Bytes>::new()
        .map_err(|never| match never {})
        .boxed_unsync()
}

/// Chunking parameters for streamed bodies.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StreamSettings {
    /// Bytes read per chunk.
    pub chunk_size: usize,
    /// Chunks buffered ahead of the client.
    pub channel_capacity: usize,
}

impl Default for StreamSettings {
    fn default() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
            channel_capacity: DEFAULT_CHANNEL_CAPACITY,
        }
    }
}

/// Sending half handed to a stream producer.
pub struct ChunkSender {
    tx: mpsc::Sender<io::Result<Bytes>>,
    chunk_size: usize,
}

impl ChunkSender {
    /// Copies `reader` into the channel chunk by chunk.
    ///
    /// Returns `Ok(())` both when the reader is exhausted and when the
    /// receiving side has been dropped; the caller cannot tell them apart and
    /// does not need to.
    pub fn pump<R: Read>(&self, mut reader: R) -> io::Result<()> {
        let mut buf = vec![0u8; self.chunk_size.max(1)];
        loop {
            let n = match reader.read(&mut buf) {
                Ok(0) => return Ok(()),
                Ok(n) => n,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e),
            };
            if self
                .tx
                .blocking_send(Ok(Bytes::copy_from_slice(&buf[..n])))
                .is_err()
            {
                tracing::debug!("stream receiver dropped, releasing reader");
                return Ok(());
            }
        }
    }
}

/// A lazily produced byte stream backed by a blocking reader.
pub struct ByteStream {
    rx: mpsc::Receiver<io::Result<Bytes>>,
}

impl ByteStream {
    /// Spawns `producer` on the blocking pool and returns the stream it feeds.
    ///
    /// Everything the producer captures is dropped on the blocking thread when
    /// it returns. An error returned by the producer is forwarded as the last
    /// item of the stream.
    pub fn spawn<F>(settings: StreamSettings, producer: F) -> Self
    where
        F: FnOnce(&ChunkSender) -> io::Result<()> + Send + 'static,
    {
        let (tx, rx) = mpsc::channel(settings.channel_capacity.max(1));
        let sender = ChunkSender {
            tx,
            chunk_size: settings.chunk_size,
        };

        tokio::task::spawn_blocking(move || {
            if let Err(e) = producer(&sender) {
                tracing::error!(error = %e, "stream producer failed");
                let _ = sender.tx.blocking_send(Err(e));
            }
        });

        Self { rx }
    }

    /// Streams an owned reader to exhaustion.
    pub fn from_reader<R>(settings: StreamSettings, reader: R) -> Self
    where
        R: Read + Send + 'static,
    {
        Self::spawn(settings, move |sender| sender.pump(reader))
    }

    /// Converts the stream into a response body.
    pub fn into_body(self) -> ResponseBody {
        StreamBody::new(self).boxed_unsync()
    }
}

impl Stream for ByteStream {
    type Item = io::Result<Frame<Bytes>>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.rx
            .poll_recv(cx)
            .map(|item| item.map(|chunk| chunk.map(Frame::data)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;
    use std::time::Duration;

    use futures_util::StreamExt;

    /// Endless reader that records when it is dropped.
    struct Endless {
        dropped: Arc<AtomicBool>,
    }

    impl Read for Endless {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            buf.fill(b'x');
            Ok(buf.len())
        }
    }

    impl Drop for Endless {
        fn drop(&mut self) {
            self.dropped.store(true, Ordering::SeqCst);
        }
    }

    fn small_chunks() -> StreamSettings {
        StreamSettings {
            chunk_size: 4,
            channel_capacity: 1,
        }
    }

    #[tokio::test]
    async fn test_stream_yields_all_bytes_in_chunks() {
        let data = b"hello, streamed world".to_vec();
        let mut stream = ByteStream::from_reader(small_chunks(), Cursor::new(data.clone()));

        let mut collected = Vec::new();
        let mut chunks = 0;
        while let Some(frame) = stream.next().await {
            let frame = frame.unwrap();
            let chunk = frame.into_data().unwrap();
            assert!(chunk.len() <= 4);
            collected.extend_from_slice(&chunk);
            chunks += 1;
        }

        assert_eq!(collected, data);
        assert_eq!(chunks, 6);
    }

    #[tokio::test]
    async fn test_body_collects_to_original_bytes() {
        let body = ByteStream::from_reader(small_chunks(), Cursor::new(b"abcdefghij".to_vec()))
            .into_body();
        let bytes = body.collect().await.unwrap().to_bytes();
        assert_eq!(&bytes[..], b"abcdefghij");
    }

    #[tokio::test]
    async fn test_dropping_stream_releases_reader() {
        let dropped = Arc::new(AtomicBool::new(false));
        let reader = Endless {
            dropped: Arc::clone(&dropped),
        };

        let mut stream = ByteStream::from_reader(small_chunks(), reader);
        let first = stream.next().await.unwrap().unwrap();
        assert_eq!(first.into_data().unwrap().len(), 4);
        drop(stream);

        tokio::time::timeout(Duration::from_secs(5), async {
            while !dropped.load(Ordering::SeqCst) {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("reader should be released after the stream is dropped");
    }

    #[tokio::test]
    async fn test_producer_error_is_forwarded() {
        let mut stream = ByteStream::spawn(small_chunks(), |_sender| {
            Err(io::Error::other("corrupt entry"))
        });

        let item = stream.next().await.unwrap();
        assert_eq!(item.unwrap_err().to_string(), "corrupt entry");
        assert!(stream.next().await.is_none());
    }

    #[tokio::test]
    async fn test_full_and_empty_bodies() {
        let bytes = full("abc").collect().await.unwrap().to_bytes();
        assert_eq!(&bytes[..], b"abc");

        let bytes = empty().collect().await.unwrap().to_bytes();
        assert!(bytes.is_empty());
    }
}
