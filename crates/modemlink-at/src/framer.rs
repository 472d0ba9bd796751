//! Line framing for AT channels.
//!
//! Modem replies are CR/LF-delimited ASCII lines, with one exception: the
//! SMS body prompt `"> "` is sent without a terminator and counts as a
//! complete line on its own. [`LineBuffer`] implements the framing over a
//! fixed-size buffer with a consume cursor; [`LineReader`] drives it from an
//! [`AsyncRead`] channel half.

use std::time::Duration;

use tokio::io::{AsyncRead, AsyncReadExt};
use tracing::{trace, warn};

use modemlink_core::error::{Error, Result};

/// The two-byte SMS prompt that is a line without a terminator.
pub const PROMPT: &[u8] = b"> ";

/// Default read buffer size per channel.
///
/// AT lines are rarely longer than a few hundred bytes; a long `+CMGL`
/// listing still fits comfortably.
pub const DEFAULT_BUFFER_SIZE: usize = 8192;

/// How many consecutive zero-length reads are tolerated before the channel
/// is declared closed.
pub const DEFAULT_ZERO_READ_RETRIES: u32 = 3;

/// Pause between tolerated zero-length reads.
pub const DEFAULT_ZERO_READ_BACKOFF: Duration = Duration::from_millis(100);

fn is_terminator(b: u8) -> bool {
    b == b'\r' || b == b'\n'
}

/// A bounded byte buffer that yields framed lines.
///
/// Bytes are appended at `end`; lines are consumed from `start`. When the
/// buffer fills up, the consumed prefix is discarded to make room.
#[derive(Debug)]
pub struct LineBuffer {
    buf: Vec<u8>,
    start: usize,
    end: usize,
}

impl LineBuffer {
    /// Create a buffer holding at most `capacity` unconsumed bytes.
    pub fn with_capacity(capacity: usize) -> Self {
        LineBuffer {
            buf: vec![0; capacity.max(PROMPT.len())],
            start: 0,
            end: 0,
        }
    }

    /// Number of buffered bytes not yet returned as lines.
    pub fn pending_len(&self) -> usize {
        self.end - self.start
    }

    /// Return the next complete line, if one is buffered.
    ///
    /// Leading CR/LF runs are skipped. The returned text excludes the
    /// terminator; non-UTF-8 bytes are replaced.
    pub fn take_line(&mut self) -> Option<String> {
        while self.start < self.end && is_terminator(self.buf[self.start]) {
            self.start += 1;
        }
        if self.start == self.end {
            self.start = 0;
            self.end = 0;
            return None;
        }

        let data = &self.buf[self.start..self.end];
        if data.starts_with(PROMPT) {
            self.start += PROMPT.len();
            return Some(String::from_utf8_lossy(PROMPT).into_owned());
        }

        let pos = data.iter().position(|&b| is_terminator(b))?;
        let line = String::from_utf8_lossy(&data[..pos]).into_owned();
        self.start += pos + 1;
        Some(line)
    }

    /// Free space at the end of the buffer for the next read.
    ///
    /// Compacts first when the buffer is full. If it is full of a single
    /// unterminated line, that line is dropped so framing can resync.
    pub fn spare(&mut self) -> &mut [u8] {
        if self.end == self.buf.len() {
            if self.start > 0 {
                self.buf.copy_within(self.start..self.end, 0);
                self.end -= self.start;
                self.start = 0;
            } else {
                warn!(
                    len = self.end,
                    "line buffer full without a terminator, discarding"
                );
                self.start = 0;
                self.end = 0;
            }
        }
        &mut self.buf[self.end..]
    }

    /// Mark `n` bytes written into [`spare`](Self::spare) as buffered.
    pub fn commit(&mut self, n: usize) {
        self.end = (self.end + n).min(self.buf.len());
    }
}

impl Default for LineBuffer {
    fn default() -> Self {
        Self::with_capacity(DEFAULT_BUFFER_SIZE)
    }
}

/// Reads framed lines from one channel's read half.
pub struct LineReader<R> {
    reader: R,
    buffer: LineBuffer,
    name: String,
    zero_read_retries: u32,
    zero_read_backoff: Duration,
}

impl<R: AsyncRead + Unpin> LineReader<R> {
    /// Wrap a read half with the default buffer size and retry policy.
    pub fn new(name: impl Into<String>, reader: R) -> Self {
        LineReader {
            reader,
            buffer: LineBuffer::default(),
            name: name.into(),
            zero_read_retries: DEFAULT_ZERO_READ_RETRIES,
            zero_read_backoff: DEFAULT_ZERO_READ_BACKOFF,
        }
    }

    /// Override the read buffer size.
    pub fn buffer_size(mut self, size: usize) -> Self {
        self.buffer = LineBuffer::with_capacity(size);
        self
    }

    /// Override how many zero-length reads are tolerated, and the pause
    /// between them.
    pub fn zero_read_policy(mut self, retries: u32, backoff: Duration) -> Self {
        self.zero_read_retries = retries;
        self.zero_read_backoff = backoff;
        self
    }

    /// Channel name used in logs.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Issue one read into the buffer. Returns the number of bytes added.
    ///
    /// A zero-length read is retried up to the configured count before
    /// returning [`Error::ChannelClosed`]; any other read error returns
    /// `ChannelClosed` immediately.
    pub async fn fill(&mut self) -> Result<usize> {
        let mut zero_reads = 0;
        loop {
            let spare = self.buffer.spare();
            match self.reader.read(spare).await {
                Ok(0) => {
                    zero_reads += 1;
                    if zero_reads > self.zero_read_retries {
                        warn!(channel = %self.name, "channel returned EOF, closing");
                        return Err(Error::ChannelClosed);
                    }
                    trace!(channel = %self.name, zero_reads, "zero-length read, retrying");
                    tokio::time::sleep(self.zero_read_backoff).await;
                }
                Ok(n) => {
                    self.buffer.commit(n);
                    trace!(channel = %self.name, bytes = n, "read");
                    return Ok(n);
                }
                Err(e) if e.kind() == std::io::ErrorKind::Interrupted => {}
                Err(e) => {
                    warn!(channel = %self.name, error = %e, "channel read failed, closing");
                    return Err(Error::ChannelClosed);
                }
            }
        }
    }

    /// Return the next already-buffered line without reading.
    pub fn take_line(&mut self) -> Option<String> {
        self.buffer.take_line()
    }

    /// Return the next line, reading as many times as needed.
    pub async fn next_line(&mut self) -> Result<String> {
        loop {
            if let Some(line) = self.buffer.take_line() {
                return Ok(line);
            }
            self.fill().await?;
        }
    }
}
