use std::fs::File;
use std::io;
use std::path::Path;

use csv_stream_core::{
    CancelToken, Dialect, Handler, Outcome, Position, Tokenizer,
};

use crate::buffered::{Lookahead, DEFAULT_CHUNK_SIZE};
use crate::encoding::Encoding;
use crate::error::Result;
use crate::table::Table;

/// Builds a CSV reader with various configuration knobs.
///
/// This builder can be used to tweak the field delimiter, comment and
/// escape handling, the text encoding and more. Once a `Reader` is built,
/// its configuration cannot be changed.
#[derive(Debug)]
pub struct ReaderBuilder {
    dialect: Dialect,
    encoding: Option<Encoding>,
    chunk_size: usize,
}

impl Default for ReaderBuilder {
    fn default() -> ReaderBuilder {
        ReaderBuilder {
            dialect: Dialect::default(),
            encoding: None,
            chunk_size: DEFAULT_CHUNK_SIZE,
        }
    }
}

impl ReaderBuilder {
    /// Create a new builder for configuring CSV parsing.
    ///
    /// To convert a builder into a reader, call one of the methods starting
    /// with `from_`.
    ///
    /// # Example
    ///
    /// ```
    /// use csv_stream::ReaderBuilder;
    ///
    /// # fn main() { example().unwrap(); }
    /// fn example() -> csv_stream::Result<()> {
    ///     let data = "\
    /// city;country;pop
    /// Boston;United States;4628910
    /// ";
    ///     let rdr = ReaderBuilder::new().delimiter(';').from_str(data)?;
    ///     let table = rdr.collect(true)?;
    ///     assert_eq!(table.get(0, "pop"), Some("4628910"));
    ///     Ok(())
    /// }
    /// ```
    pub fn new() -> ReaderBuilder {
        ReaderBuilder::default()
    }

    /// Build a CSV parser from this configuration that reads data from the
    /// given file path.
    ///
    /// If there was a problem opening the file at the given path, then this
    /// returns the corresponding error.
    pub fn from_path<P: AsRef<Path>>(&self, path: P) -> Result<Reader<File>> {
        self.from_reader(File::open(path)?)
    }

    /// Build a CSV parser from this configuration that reads data from `rdr`.
    ///
    /// Note that the CSV reader is buffered automatically, so you should not
    /// wrap `rdr` in a buffered reader like `io::BufReader`.
    ///
    /// This fails if the configured delimiter cannot be used.
    pub fn from_reader<R: io::Read>(&self, rdr: R) -> Result<Reader<R>> {
        let src = Lookahead::new(rdr, self.encoding, self.chunk_size);
        Ok(Reader { tok: Tokenizer::new(self.dialect, src)? })
    }

    /// Build a CSV parser from this configuration that reads bytes held in
    /// memory.
    ///
    /// The bytes go through encoding detection like any other input.
    pub fn from_bytes<'a>(&self, bytes: &'a [u8]) -> Result<Reader<&'a [u8]>> {
        self.from_reader(bytes)
    }

    /// Build a CSV parser from this configuration that reads a string.
    pub fn from_str<'a>(&self, text: &'a str) -> Result<Reader<&'a [u8]>> {
        self.from_reader(text.as_bytes())
    }

    /// The field delimiter to use when parsing CSV.
    ///
    /// The default is `','`. It must not be `\r`, `\n`, `"` or `#`.
    pub fn delimiter(&mut self, delimiter: char) -> &mut ReaderBuilder {
        self.dialect.delimiter = delimiter;
        self
    }

    /// Enable or disable comment lines.
    ///
    /// When enabled, a line whose first character is `#` is delivered as a
    /// comment instead of a record. A `#` anywhere else, or in a quoted
    /// field, has no special meaning.
    ///
    /// This is disabled by default.
    pub fn comments(&mut self, yes: bool) -> &mut ReaderBuilder {
        self.dialect.comments = yes;
        self
    }

    /// Enable or disable backslash escapes.
    ///
    /// When enabled, a `\` takes away any special meaning from the character
    /// that follows it, both inside and outside of quotes, and in comments.
    ///
    /// This is disabled by default.
    pub fn backslash_escapes(&mut self, yes: bool) -> &mut ReaderBuilder {
        self.dialect.backslash_escapes = yes;
        self
    }

    /// Whether fields and comments are delivered with quotes and escapes
    /// resolved.
    ///
    /// When disabled, the raw text of each field is delivered exactly as it
    /// appears in the data, including any quotes.
    ///
    /// This is disabled by default.
    pub fn sanitize(&mut self, yes: bool) -> &mut ReaderBuilder {
        self.dialect.sanitize = yes;
        self
    }

    /// Read the data in a fixed encoding.
    ///
    /// When `None` (the default), the encoding is detected from a byte order
    /// mark at the start of the data, and otherwise assumed to be UTF-8 if
    /// the first chunk is valid UTF-8, or Windows-1252 if it is not. A byte
    /// order mark matching a fixed encoding is skipped.
    pub fn encoding(
        &mut self,
        encoding: Option<Encoding>,
    ) -> &mut ReaderBuilder {
        self.encoding = encoding;
        self
    }

    /// The number of bytes read from the underlying reader at a time.
    ///
    /// The first chunk is also what the encoding is detected from.
    ///
    /// The default is 8 KiB.
    pub fn chunk_size(&mut self, size: usize) -> &mut ReaderBuilder {
        self.chunk_size = size;
        self
    }
}

/// A streaming CSV reader.
///
/// A reader pushes the structure of CSV data to a [`Handler`] as it reads
/// it. It never holds more than one field or comment in memory, plus what is
/// buffered ahead, so it can process data of any size.
///
/// A reader is used exactly once: `parse` and `collect` consume it.
///
/// # Example
///
/// ```
/// use csv_stream::{Control, ErrorKind, Handler, Position, Reader};
///
/// struct Longest(usize);
///
/// impl Handler for Longest {
///     fn field(&mut self, text: &str, _: &Position) -> Result<Control, ErrorKind> {
///         self.0 = self.0.max(text.chars().count());
///         Ok(Control::Continue)
///     }
/// }
///
/// let mut longest = Longest(0);
/// let rdr = Reader::from_str("a,bcd\nef,g\n").unwrap();
/// rdr.parse(&mut longest).unwrap();
/// assert_eq!(longest.0, 3);
/// ```
#[derive(Debug)]
pub struct Reader<R> {
    tok: Tokenizer<Lookahead<R>>,
}

impl<R: io::Read> Reader<R> {
    /// Create a new CSV reader with a default configuration for the given
    /// reader.
    pub fn from_reader(rdr: R) -> Result<Reader<R>> {
        ReaderBuilder::new().from_reader(rdr)
    }

    /// Share the given token for cancellation instead of the reader's own.
    pub fn with_cancel_token(self, token: CancelToken) -> Reader<R> {
        Reader { tok: self.tok.with_cancel_token(token) }
    }

    /// A token that stops the parse when cancelled.
    ///
    /// The token may be cancelled from another thread, or from a handler.
    /// It does not interrupt a read in progress.
    pub fn cancel_token(&self) -> CancelToken {
        self.tok.cancel_token()
    }

    /// The current position.
    pub fn position(&self) -> &Position {
        self.tok.position()
    }

    /// The encoding of the data.
    ///
    /// This reads the first chunk of data if it was not read yet.
    pub fn encoding(&mut self) -> Result<Encoding> {
        Ok(self.tok.get_mut().encoding()?)
    }

    /// Read all of the data, pushing events to `handler`.
    ///
    /// See `Tokenizer::parse` for the guarantees around errors and
    /// cancellation.
    pub fn parse<H: Handler>(self, handler: H) -> Result<Outcome> {
        self.tok.parse(handler)
    }

    /// Read all of the data into a table.
    ///
    /// When `headers` is true, the first record names the columns and every
    /// other record must have the same number of fields.
    ///
    /// A cancelled parse returns the rows read so far.
    pub fn collect(self, headers: bool) -> Result<Table> {
        let mut table =
            if headers { Table::with_headers() } else { Table::new() };
        self.parse(&mut table)?;
        Ok(table)
    }
}

impl Reader<File> {
    /// Create a new CSV reader with a default configuration for the file at
    /// the given path.
    pub fn from_path<P: AsRef<Path>>(path: P) -> Result<Reader<File>> {
        ReaderBuilder::new().from_path(path)
    }
}

impl<'a> Reader<&'a [u8]> {
    /// Create a new CSV reader with a default configuration over bytes held
    /// in memory.
    pub fn from_bytes(bytes: &'a [u8]) -> Result<Reader<&'a [u8]>> {
        ReaderBuilder::new().from_bytes(bytes)
    }

    /// Create a new CSV reader with a default configuration over a string.
    pub fn from_str(text: &'a str) -> Result<Reader<&'a [u8]>> {
        ReaderBuilder::new().from_str(text)
    }
}
