use std::cmp;
use std::fmt;
use std::io;

use csv_stream_core::Source;
use log::{debug, trace};

use crate::encoding::Encoding;

/// The default number of bytes read from the underlying reader at a time.
pub const DEFAULT_CHUNK_SIZE: usize = 8 * 1024;

/// Refills happen whenever at most this many bytes are left unread.
const MIN_REFILL_THRESHOLD: usize = 10;

/// Sniffing looks at no fewer bytes than the longest byte order mark.
const MIN_SNIFF_LEN: usize = 4;

/// A character buffer with lookahead over an `io::Read`.
///
/// Bytes are read in chunks and decoded into a window of text. The encoding
/// is decided on the first refill, either from the configured override or by
/// sniffing the first read. Text before the cursor is kept until
/// `compact` is called, so that the caller can slice out everything it
/// advanced over since then. Compacted text is only dropped from the window
/// on the next refill.
pub struct Lookahead<R> {
    rdr: R,
    /// Fixed encoding, or the sniffed one after the first refill.
    encoding: Option<Encoding>,
    sniffed: bool,
    /// Bytes read but not decoded yet.
    raw: Vec<u8>,
    chunk: Vec<u8>,
    window: String,
    /// Start of the live part of the window, set by `compact`.
    start: usize,
    pos: usize,
    eof: bool,
}

impl<R: fmt::Debug> fmt::Debug for Lookahead<R> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("Lookahead")
            .field("rdr", &self.rdr)
            .field("encoding", &self.encoding)
            .field("pending", &self.raw.len())
            .field("window", &self.window.len())
            .field("start", &self.start)
            .field("pos", &self.pos)
            .field("eof", &self.eof)
            .finish()
    }
}

impl<R: io::Read> Lookahead<R> {
    /// Creates a new buffer that reads `chunk_size` bytes at a time.
    ///
    /// When `encoding` is `None`, it is sniffed from the data.
    pub fn new(
        rdr: R,
        encoding: Option<Encoding>,
        chunk_size: usize,
    ) -> Lookahead<R> {
        Lookahead {
            rdr,
            encoding,
            sniffed: false,
            raw: vec![],
            chunk: vec![0; cmp::max(1, chunk_size)],
            window: String::new(),
            start: 0,
            pos: 0,
            eof: false,
        }
    }

    /// Returns the encoding of the data, reading the first chunk if that
    /// has not happened yet.
    pub fn encoding(&mut self) -> io::Result<Encoding> {
        if !self.sniffed {
            self.refill()?;
        }
        Ok(self.encoding.unwrap_or_default())
    }

    /// Gets a reference to the underlying reader.
    pub fn get_ref(&self) -> &R {
        &self.rdr
    }

    /// Unwraps this buffer, returning the underlying reader.
    ///
    /// Any data read but not yet consumed is lost.
    pub fn into_inner(self) -> R {
        self.rdr
    }

    fn unread(&self) -> &str {
        &self.window[self.pos..]
    }

    /// Make sure `want` characters are available after the cursor, unless
    /// the data ends first.
    fn fill(&mut self, want: usize) -> io::Result<()> {
        let unread = self.window.len() - self.pos;
        let live = self.window.len() - self.start;
        let threshold = cmp::max(live / 3, MIN_REFILL_THRESHOLD);
        if !self.eof && unread <= threshold {
            self.refill()?;
        }
        while !self.eof && self.unread().chars().take(want).count() < want {
            self.refill()?;
        }
        Ok(())
    }

    fn refill(&mut self) -> io::Result<()> {
        if !self.sniffed {
            return self.sniff();
        }
        let n = self.read_chunk()?;
        self.raw.extend_from_slice(&self.chunk[..n]);
        self.decode();
        Ok(())
    }

    /// Does the first read and settles the encoding.
    ///
    /// A read shorter than the longest byte order mark is topped up with
    /// further reads, so that a slow stream still delivers events as soon
    /// as its first bytes arrive.
    fn sniff(&mut self) -> io::Result<()> {
        loop {
            let n = self.read_chunk()?;
            self.raw.extend_from_slice(&self.chunk[..n]);
            if self.eof || self.raw.len() >= MIN_SNIFF_LEN {
                break;
            }
        }
        let (encoding, bom_len) = match self.encoding {
            Some(enc) => {
                let sig = enc.signature();
                let len = if !sig.is_empty() && self.raw.starts_with(sig) {
                    sig.len()
                } else {
                    0
                };
                (enc, len)
            }
            None => Encoding::sniff(&self.raw),
        };
        debug!(
            "reading {} (byte order mark: {} bytes, configured: {})",
            encoding,
            bom_len,
            self.encoding.is_some(),
        );
        self.raw.drain(..bom_len);
        self.encoding = Some(encoding);
        self.sniffed = true;
        self.decode();
        Ok(())
    }

    fn read_chunk(&mut self) -> io::Result<usize> {
        loop {
            match self.rdr.read(&mut self.chunk) {
                Ok(0) => {
                    self.eof = true;
                    return Ok(0);
                }
                Ok(n) => return Ok(n),
                Err(ref err) if err.kind() == io::ErrorKind::Interrupted => {}
                Err(err) => return Err(err),
            }
        }
    }

    fn decode(&mut self) {
        if self.start > 0 {
            self.window.drain(..self.start);
            self.pos -= self.start;
            self.start = 0;
        }
        let encoding = self.encoding.unwrap_or_default();
        let before = self.window.len();
        let consumed = encoding.decode(&self.raw, &mut self.window, self.eof);
        self.raw.drain(..consumed);
        trace!(
            "refill decoded {} bytes into {} bytes of text ({} pending)",
            consumed,
            self.window.len() - before,
            self.raw.len(),
        );
    }
}

impl<R: io::Read> Source for Lookahead<R> {
    fn peek(&mut self) -> io::Result<Option<char>> {
        self.fill(1)?;
        Ok(self.unread().chars().next())
    }

    fn peek_next(&mut self) -> io::Result<Option<char>> {
        self.fill(2)?;
        Ok(self.unread().chars().nth(1))
    }

    fn advance(&mut self) {
        if let Some(ch) = self.unread().chars().next() {
            self.pos += ch.len_utf8();
        }
    }

    fn cursor(&self) -> usize {
        self.pos - self.start
    }

    fn slice(&self, start: usize) -> &str {
        &self.window[self.start + start..self.pos]
    }

    fn compact(&mut self) {
        self.start = self.pos;
    }

    fn encoded_len(&self, ch: char) -> usize {
        self.encoding.unwrap_or_default().encoded_len(ch)
    }
}
