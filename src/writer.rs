use std::fs::File;
use std::io;
use std::path::Path;
use std::result;

use csv_stream_core::{
    QuoteStyle, Writer as CoreWriter, WriterBuilder as CoreWriterBuilder,
};
use log::trace;

use crate::encoding::Encoding;
use crate::error::{IntoInnerError, Result};

const DEFAULT_BUFFER_CAPACITY: usize = 8 * (1 << 10);

/// Builds a CSV writer with various configuration knobs.
///
/// This builder can be used to tweak the field delimiter, quoting style,
/// output encoding and more. Once a CSV `Writer` is built, its configuration
/// cannot be changed.
#[derive(Debug)]
pub struct WriterBuilder {
    builder: CoreWriterBuilder,
    encoding: Encoding,
    bom: Option<bool>,
    capacity: usize,
}

impl Default for WriterBuilder {
    fn default() -> WriterBuilder {
        WriterBuilder {
            builder: CoreWriterBuilder::default(),
            encoding: Encoding::Utf8,
            bom: None,
            capacity: DEFAULT_BUFFER_CAPACITY,
        }
    }
}

impl WriterBuilder {
    /// Create a new builder for configuring CSV writing.
    ///
    /// To convert a builder into a writer, call one of the methods starting
    /// with `from_`.
    ///
    /// # Example
    ///
    /// ```
    /// use std::error::Error;
    /// use csv_stream::{Encoding, WriterBuilder};
    ///
    /// # fn main() { example().unwrap(); }
    /// fn example() -> Result<(), Box<dyn Error>> {
    ///     let mut wtr = WriterBuilder::new()
    ///         .encoding(Encoding::Utf16Le)
    ///         .from_writer(vec![])?;
    ///     wtr.write_line(&["a", "b"])?;
    ///
    ///     let data = wtr.into_inner()?;
    ///     assert_eq!(data, b"\xFF\xFEa\x00,\x00b\x00\n\x00");
    ///     Ok(())
    /// }
    /// ```
    pub fn new() -> WriterBuilder {
        WriterBuilder::default()
    }

    /// Build a CSV writer from this configuration that writes data to the
    /// given file path. The file is truncated if it already exists.
    ///
    /// If there was a problem opening the file at the given path, then this
    /// returns the corresponding error.
    pub fn from_path<P: AsRef<Path>>(&self, path: P) -> Result<Writer<File>> {
        self.from_writer(File::create(path)?)
    }

    /// Build a CSV writer from this configuration that writes data to `wtr`.
    ///
    /// Note that the CSV writer is buffered automatically, so you should not
    /// wrap `wtr` in a buffered writer like `io::BufWriter`.
    ///
    /// This fails if the configured delimiter cannot be used.
    pub fn from_writer<W: io::Write>(&self, wtr: W) -> Result<Writer<W>> {
        let core = self.builder.build()?;
        let mut buf = Vec::with_capacity(self.capacity);
        let bom = match self.bom {
            Some(true) => Some(self.encoding.signature()),
            Some(false) => None,
            None => self.encoding.byte_order_mark(),
        };
        if let Some(bom) = bom {
            buf.extend_from_slice(bom);
        }
        Ok(Writer {
            core,
            wtr: Some(wtr),
            encoding: self.encoding,
            text: String::new(),
            buf,
            capacity: self.capacity,
            panicked: false,
        })
    }

    /// The field delimiter to use when writing CSV.
    ///
    /// The default is `','`.
    pub fn delimiter(&mut self, delimiter: char) -> &mut WriterBuilder {
        self.builder.delimiter(delimiter);
        self
    }

    /// The quoting style to use when writing CSV.
    ///
    /// By default, this is set to `QuoteStyle::Necessary`, which will only
    /// use quotes when they are necessary to preserve the integrity of data.
    pub fn quote_style(&mut self, style: QuoteStyle) -> &mut WriterBuilder {
        self.builder.quote_style(style);
        self
    }

    /// The encoding of the output. The default is UTF-8.
    pub fn encoding(&mut self, encoding: Encoding) -> &mut WriterBuilder {
        self.encoding = encoding;
        self
    }

    /// Whether to start the output with a byte order mark.
    ///
    /// By default, one is written for UTF-16 and UTF-32 but not for UTF-8.
    /// Enabling this for UTF-8 writes `EF BB BF`. Windows-1252 has no byte
    /// order mark.
    pub fn byte_order_mark(&mut self, yes: bool) -> &mut WriterBuilder {
        self.bom = Some(yes);
        self
    }

    /// Set the capacity (in bytes) of the buffer used in the CSV writer.
    pub fn buffer_capacity(&mut self, capacity: usize) -> &mut WriterBuilder {
        self.capacity = capacity;
        self
    }
}

/// A buffered CSV writer.
///
/// Lines are always terminated by `\n`. A byte order mark, when there is
/// one, is written once before anything else.
///
/// Dropping a writer flushes it, but errors are ignored. Call `flush` or
/// `into_inner` to observe them.
///
/// # Example
///
/// ```
/// use std::error::Error;
/// use csv_stream::Writer;
///
/// # fn main() { example().unwrap(); }
/// fn example() -> Result<(), Box<dyn Error>> {
///     let mut wtr = Writer::from_writer(vec![])?;
///     wtr.write_comment("weather")?;
///     wtr.write_field("Boston, MA")?;
///     wtr.write_float(-3.5f64)?;
///     wtr.write_integer(12u8)?;
///     wtr.finish_line()?;
///
///     let data = String::from_utf8(wtr.into_inner()?)?;
///     assert_eq!(data, "#weather\n\"Boston, MA\",-3.5,12\n");
///     Ok(())
/// }
/// ```
#[derive(Debug)]
pub struct Writer<W: io::Write> {
    core: CoreWriter,
    wtr: Option<W>,
    encoding: Encoding,
    /// Text written by the core writer and not encoded yet.
    text: String,
    /// Encoded bytes not written to `wtr` yet.
    buf: Vec<u8>,
    capacity: usize,
    // If the inner writer panics on a call to write, we don't want to
    // write the buffered data a second time in Writer's destructor.
    panicked: bool,
}

impl<W: io::Write> Drop for Writer<W> {
    fn drop(&mut self) {
        if self.wtr.is_some() && !self.panicked {
            let _ = self.flush();
        }
    }
}

impl Writer<File> {
    /// Build a CSV writer with a default configuration that writes data to
    /// the given file path. The file is truncated if it already exists.
    pub fn from_path<P: AsRef<Path>>(path: P) -> Result<Writer<File>> {
        WriterBuilder::new().from_path(path)
    }
}

impl<W: io::Write> Writer<W> {
    /// Build a CSV writer with a default configuration that writes data to
    /// `wtr`.
    pub fn from_writer(wtr: W) -> Result<Writer<W>> {
        WriterBuilder::new().from_writer(wtr)
    }

    /// The encoding of the output.
    pub fn encoding(&self) -> Encoding {
        self.encoding
    }

    /// Write a single field.
    ///
    /// The field is quoted when necessary. Call `finish_line` to end the
    /// line.
    pub fn write_field<T: AsRef<str>>(&mut self, field: T) -> Result<()> {
        self.core.field(field.as_ref(), &mut self.text);
        self.drain()
    }

    /// Write a complete line of fields.
    ///
    /// A line in progress is finished first.
    pub fn write_line<I, T>(&mut self, fields: I) -> Result<()>
    where
        I: IntoIterator<Item = T>,
        T: AsRef<str>,
    {
        self.core.line(fields, &mut self.text);
        self.drain()
    }

    /// Write an integer as a single field.
    pub fn write_integer<I: itoa::Integer>(&mut self, n: I) -> Result<()> {
        let mut buf = itoa::Buffer::new();
        self.write_field(buf.format(n))
    }

    /// Write a floating point number as a single field.
    pub fn write_float<F: ryu::Float>(&mut self, n: F) -> Result<()> {
        let mut buf = ryu::Buffer::new();
        self.write_field(buf.format(n))
    }

    /// Write a comment. Every line of `text` becomes a line starting with
    /// `#`.
    ///
    /// A line in progress is finished first.
    pub fn write_comment<T: AsRef<str>>(&mut self, text: T) -> Result<()> {
        self.core.comment(text.as_ref(), &mut self.text);
        self.drain()
    }

    /// End the current line.
    pub fn finish_line(&mut self) -> Result<()> {
        self.core.finish_line(&mut self.text);
        self.drain()
    }

    /// Flush the contents of the internal buffer to the underlying writer.
    ///
    /// If there was a problem writing to the underlying writer, then an error
    /// is returned.
    ///
    /// Note that this also flushes the underlying writer.
    pub fn flush(&mut self) -> io::Result<()> {
        self.flush_buf()?;
        match self.wtr {
            Some(ref mut wtr) => wtr.flush(),
            None => Ok(()),
        }
    }

    /// Flush the internal buffer and return the underlying writer.
    pub fn into_inner(
        mut self,
    ) -> result::Result<W, IntoInnerError<Writer<W>>> {
        match self.flush() {
            Ok(()) => match self.wtr.take() {
                Some(wtr) => Ok(wtr),
                None => {
                    let err = io::Error::new(
                        io::ErrorKind::Other,
                        "CSV writer has no underlying writer",
                    );
                    Err(IntoInnerError::new(self, err))
                }
            },
            Err(err) => Err(IntoInnerError::new(self, err)),
        }
    }

    /// Returns a reference to the underlying writer.
    pub fn get_ref(&self) -> Option<&W> {
        self.wtr.as_ref()
    }

    /// Encode pending text, flushing the buffer once it is full.
    fn drain(&mut self) -> Result<()> {
        self.encoding.encode(&self.text, &mut self.buf);
        self.text.clear();
        if self.buf.len() >= self.capacity {
            self.flush_buf()?;
        }
        Ok(())
    }

    fn flush_buf(&mut self) -> io::Result<()> {
        let wtr = match self.wtr {
            Some(ref mut wtr) => wtr,
            None => return Ok(()),
        };
        if self.buf.is_empty() {
            return Ok(());
        }
        trace!("writing {} buffered bytes", self.buf.len());
        self.panicked = true;
        let result = wtr.write_all(&self.buf);
        self.panicked = false;
        result?;
        self.buf.clear();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::io::{self, Write};

    use csv_stream_core::QuoteStyle;

    use super::{Writer, WriterBuilder};
    use crate::encoding::Encoding;

    fn wtr_as_string(wtr: Writer<Vec<u8>>) -> String {
        String::from_utf8(wtr.into_inner().unwrap()).unwrap()
    }

    #[test]
    fn one_line() {
        let mut wtr = Writer::from_writer(vec![]).unwrap();
        wtr.write_line(&["a", "b", "c"]).unwrap();
        assert_eq!(wtr_as_string(wtr), "a,b,c\n");
    }

    #[test]
    fn fields_and_lines() {
        let mut wtr = Writer::from_writer(vec![]).unwrap();
        wtr.write_field("a").unwrap();
        wtr.write_field("b\"c").unwrap();
        wtr.write_line(vec!["x".to_string()]).unwrap();
        wtr.write_field("").unwrap();
        wtr.finish_line().unwrap();
        assert_eq!(wtr_as_string(wtr), "a,\"b\"\"c\"\nx\n\"\"\n");
    }

    #[test]
    fn numbers() {
        let mut wtr = Writer::from_writer(vec![]).unwrap();
        wtr.write_integer(-42i64).unwrap();
        wtr.write_integer(u64::max_value()).unwrap();
        wtr.write_float(0.1f32).unwrap();
        wtr.write_float(1e21f64).unwrap();
        wtr.finish_line().unwrap();
        assert_eq!(
            wtr_as_string(wtr),
            "-42,18446744073709551615,0.1,1e21\n"
        );
    }

    #[test]
    fn quote_always_with_delimiter() {
        let mut wtr = WriterBuilder::new()
            .delimiter(';')
            .quote_style(QuoteStyle::Always)
            .from_writer(vec![])
            .unwrap();
        wtr.write_line(&["a", "b;c"]).unwrap();
        assert_eq!(wtr_as_string(wtr), "\"a\";\"b;c\"\n");
    }

    #[test]
    fn utf8_has_no_bom_by_default() {
        let mut wtr = Writer::from_writer(vec![]).unwrap();
        wtr.write_line(&["é"]).unwrap();
        assert_eq!(wtr.into_inner().unwrap(), "é\n".as_bytes());
    }

    #[test]
    fn utf8_bom_on_request() {
        let mut wtr = WriterBuilder::new()
            .byte_order_mark(true)
            .from_writer(vec![])
            .unwrap();
        wtr.write_line(&["a"]).unwrap();
        wtr.write_line(&["b"]).unwrap();
        assert_eq!(wtr.into_inner().unwrap(), b"\xEF\xBB\xBFa\nb\n");
    }

    #[test]
    fn utf16_bom_written_once() {
        let mut wtr = WriterBuilder::new()
            .encoding(Encoding::Utf16Be)
            .buffer_capacity(1)
            .from_writer(vec![])
            .unwrap();
        wtr.write_line(&["a"]).unwrap();
        wtr.write_comment("b").unwrap();
        wtr.flush().unwrap();
        wtr.write_line(&["c"]).unwrap();
        assert_eq!(
            wtr.into_inner().unwrap(),
            b"\xFE\xFF\x00a\x00\n\x00#\x00b\x00\n\x00c\x00\n"
        );
    }

    #[test]
    fn utf32_bom_can_be_disabled() {
        let mut wtr = WriterBuilder::new()
            .encoding(Encoding::Utf32Le)
            .byte_order_mark(false)
            .from_writer(vec![])
            .unwrap();
        wtr.write_field("a").unwrap();
        assert_eq!(wtr.into_inner().unwrap(), b"a\x00\x00\x00");
    }

    #[test]
    fn windows_1252_output() {
        let mut wtr = WriterBuilder::new()
            .encoding(Encoding::Windows1252)
            .byte_order_mark(true)
            .from_writer(vec![])
            .unwrap();
        wtr.write_line(&["café", "☃"]).unwrap();
        assert_eq!(wtr.into_inner().unwrap(), b"caf\xE9,?\n");
    }

    #[test]
    fn drop_flushes() {
        let mut out = vec![];
        {
            let mut wtr = Writer::from_writer(&mut out).unwrap();
            wtr.write_line(&["a", "b"]).unwrap();
        }
        assert_eq!(out, b"a,b\n");
    }

    #[test]
    fn bad_delimiter() {
        let res = WriterBuilder::new().delimiter('\n').from_writer(vec![]);
        assert!(res.is_err());
    }

    #[derive(Debug)]
    struct Full;

    impl Write for Full {
        fn write(&mut self, _: &[u8]) -> io::Result<usize> {
            Err(io::Error::new(io::ErrorKind::Other, "disk full"))
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn into_inner_error() {
        let mut wtr = Writer::from_writer(Full).unwrap();
        wtr.write_line(&["a"]).unwrap();
        let err = wtr.into_inner().unwrap_err();
        assert_eq!(err.error().kind(), io::ErrorKind::Other);
        assert_eq!(err.to_string(), "disk full");
        let wtr = err.into_inner();
        assert!(wtr.get_ref().is_some());
    }

    #[test]
    fn small_buffer_writes_through() {
        let mut wtr = WriterBuilder::new()
            .buffer_capacity(2)
            .from_writer(Full)
            .unwrap();
        assert!(wtr.write_field("abc").unwrap_err().is_io_error());
    }
}
