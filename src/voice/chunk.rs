//! Audio chunk source and pacing.
//!
//! [`AudioChunkSource`] turns any byte source (file, stdin, in-memory) into
//! a lazy, finite, non-restartable sequence of fixed-size chunks; the final
//! chunk may be shorter, never padded. [`ChunkPacer`] inserts a fixed delay
//! between chunks to approximate real-time playback rate so the transport
//! and server are not flooded.

use std::io;
use std::path::Path;
use std::time::Duration;

use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::time::Instant;

/// Default chunk size in bytes.
pub const DEFAULT_CHUNK_SIZE: usize = 6400;

/// Default delay between chunk deliveries.
pub const DEFAULT_CHUNK_INTERVAL: Duration = Duration::from_millis(200);

// ── Chunk source ───────────────────────────────────────────────────

/// Lazy chunker over an async byte source.
///
/// Bytes accumulate in an internal buffer; full chunks are sliced off as
/// they become available and a final partial chunk is flushed at
/// end-of-input.
pub struct AudioChunkSource {
    reader: Box<dyn AsyncRead + Send + Unpin>,
    chunk_size: usize,
    pending: Vec<u8>,
    scratch: Vec<u8>,
    eof: bool,
}

impl std::fmt::Debug for AudioChunkSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AudioChunkSource")
            .field("chunk_size", &self.chunk_size)
            .field("pending", &self.pending.len())
            .field("scratch", &self.scratch.len())
            .field("eof", &self.eof)
            .finish_non_exhaustive()
    }
}

impl AudioChunkSource {
    pub fn from_reader(reader: Box<dyn AsyncRead + Send + Unpin>, chunk_size: usize) -> Self {
        Self {
            reader,
            chunk_size: chunk_size.max(1),
            pending: Vec::new(),
            scratch: vec![0u8; 8192],
            eof: false,
        }
    }

    /// Open a file as a chunk source. Fails before any chunk is produced if
    /// the file cannot be opened.
    pub async fn open(path: &Path, chunk_size: usize) -> io::Result<Self> {
        let file = tokio::fs::File::open(path).await?;
        Ok(Self::from_reader(Box::new(file), chunk_size))
    }

    /// Read chunks from standard input.
    pub fn stdin(chunk_size: usize) -> Self {
        Self::from_reader(Box::new(tokio::io::stdin()), chunk_size)
    }

    /// Next chunk, or `None` once the source is exhausted.
    ///
    /// Cancel-safe: partially accumulated bytes stay in the internal buffer
    /// if the returned future is dropped before completion.
    pub async fn next_chunk(&mut self) -> Option<io::Result<Vec<u8>>> {
        loop {
            if self.pending.len() >= self.chunk_size {
                let rest = self.pending.split_off(self.chunk_size);
                let chunk = std::mem::replace(&mut self.pending, rest);
                return Some(Ok(chunk));
            }
            if self.eof {
                if self.pending.is_empty() {
                    return None;
                }
                return Some(Ok(std::mem::take(&mut self.pending)));
            }
            match self.reader.read(&mut self.scratch).await {
                Ok(0) => self.eof = true,
                Ok(n) => self.pending.extend_from_slice(&self.scratch[..n]),
                Err(e) => {
                    self.eof = true;
                    return Some(Err(e));
                }
            }
        }
    }
}

// ── Pacer ──────────────────────────────────────────────────────────

/// Wraps an [`AudioChunkSource`] and enforces a minimum interval between
/// chunk deliveries. Deadline-based, so dropping and re-polling the future
/// (e.g. from a `select!` loop) neither skips nor shortens the delay.
pub struct ChunkPacer {
    source: AudioChunkSource,
    interval: Duration,
    not_before: Option<Instant>,
}

impl ChunkPacer {
    pub fn new(source: AudioChunkSource, interval: Duration) -> Self {
        Self {
            source,
            interval,
            not_before: None,
        }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Push the next delivery out by at least `delay` from now. Used by the
    /// sender as a pace-based response to transport backpressure.
    pub fn defer(&mut self, delay: Duration) {
        let deadline = Instant::now() + delay;
        self.not_before = Some(match self.not_before {
            Some(existing) if existing > deadline => existing,
            _ => deadline,
        });
    }

    pub async fn next_chunk(&mut self) -> Option<io::Result<Vec<u8>>> {
        if let Some(deadline) = self.not_before {
            tokio::time::sleep_until(deadline).await;
            self.not_before = None;
        }
        let chunk = self.source.next_chunk().await?;
        if !self.interval.is_zero() {
            self.not_before = Some(Instant::now() + self.interval);
        }
        Some(chunk)
    }
}

// ── Tests ──────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn source_of(bytes: &[u8], chunk_size: usize) -> AudioChunkSource {
        AudioChunkSource::from_reader(Box::new(Cursor::new(bytes.to_vec())), chunk_size)
    }

    async fn drain(mut source: AudioChunkSource) -> Vec<Vec<u8>> {
        let mut chunks = Vec::new();
        while let Some(chunk) = source.next_chunk().await {
            chunks.push(chunk.unwrap());
        }
        chunks
    }

    #[tokio::test]
    async fn last_chunk_may_be_short() {
        let chunks = drain(source_of(&[1, 2, 3, 4, 5, 6, 7], 4)).await;
        assert_eq!(chunks, vec![vec![1, 2, 3, 4], vec![5, 6, 7]]);
    }

    #[tokio::test]
    async fn exact_multiple_has_no_trailing_empty_chunk() {
        let chunks = drain(source_of(&[1, 2, 3, 4], 2)).await;
        assert_eq!(chunks, vec![vec![1, 2], vec![3, 4]]);
    }

    #[tokio::test]
    async fn empty_input_yields_nothing() {
        let chunks = drain(source_of(&[], 4)).await;
        assert!(chunks.is_empty());
    }

    #[tokio::test]
    async fn sequence_is_not_restartable() {
        let mut source = source_of(&[1, 2, 3], 8);
        assert!(source.next_chunk().await.is_some());
        assert!(source.next_chunk().await.is_none());
        assert!(source.next_chunk().await.is_none());
    }

    #[tokio::test]
    async fn missing_file_fails_before_first_chunk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("does-not-exist.wav");
        let err = AudioChunkSource::open(&path, 4).await.unwrap_err();
        assert_eq!(err.kind(), std::io::ErrorKind::NotFound);
    }

    #[tokio::test]
    async fn file_source_chunks_contents() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("audio.raw");
        std::fs::write(&path, [9u8, 8, 7, 6, 5]).unwrap();
        let source = AudioChunkSource::open(&path, 2).await.unwrap();
        assert_eq!(drain(source).await, vec![vec![9, 8], vec![7, 6], vec![5]]);
    }

    #[tokio::test(start_paused = true)]
    async fn pacer_delays_between_chunks() {
        let source = source_of(&[1, 2, 3, 4], 2);
        let mut pacer = ChunkPacer::new(source, Duration::from_millis(200));

        let start = Instant::now();
        assert!(pacer.next_chunk().await.is_some());
        assert_eq!(start.elapsed(), Duration::ZERO);

        assert!(pacer.next_chunk().await.is_some());
        assert!(start.elapsed() >= Duration::from_millis(200));
    }

    #[tokio::test(start_paused = true)]
    async fn pacer_defer_extends_deadline() {
        let source = source_of(&[1, 2, 3, 4], 2);
        let mut pacer = ChunkPacer::new(source, Duration::from_millis(100));

        let start = Instant::now();
        assert!(pacer.next_chunk().await.is_some());
        pacer.defer(Duration::from_millis(500));
        assert!(pacer.next_chunk().await.is_some());
        assert!(start.elapsed() >= Duration::from_millis(500));
    }

    #[tokio::test]
    async fn zero_interval_pacer_is_immediate() {
        let source = source_of(&[1, 2, 3], 1);
        let mut pacer = ChunkPacer::new(source, Duration::ZERO);
        let mut n = 0;
        while pacer.next_chunk().await.is_some() {
            n += 1;
        }
        assert_eq!(n, 3);
    }
}
