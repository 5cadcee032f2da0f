use memchr::{memchr3, memchr_iter, memmem};

use crate::error::{Error, ErrorKind, Result};

/// The quoting style to use when writing CSV data.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum QuoteStyle {
    /// This puts quotes around every field. Always.
    Always,
    /// This puts quotes around fields only when necessary.
    ///
    /// They are necessary when fields contain a quote, delimiter or newline,
    /// when the first field of a line starts with `#`, and when a line
    /// consists of a single empty field.
    ///
    /// This is the default.
    Necessary,
}

impl Default for QuoteStyle {
    fn default() -> QuoteStyle {
        QuoteStyle::Necessary
    }
}

/// A builder for configuring a CSV writer.
#[derive(Debug)]
pub struct WriterBuilder {
    wtr: Writer,
}

impl Default for WriterBuilder {
    fn default() -> WriterBuilder {
        WriterBuilder::new()
    }
}

impl WriterBuilder {
    /// Create a new builder for configuring a CSV writer.
    pub fn new() -> WriterBuilder {
        WriterBuilder { wtr: Writer::default() }
    }

    /// Build a CSV writer from this configuration.
    ///
    /// This fails if the delimiter is a newline, `"` or `#`.
    pub fn build(&self) -> Result<Writer> {
        match self.wtr.delimiter {
            '\r' | '\n' | '"' | '#' => {
                Err(Error::new(ErrorKind::InvalidDelimiter(self.wtr.delimiter)))
            }
            _ => Ok(self.wtr.clone()),
        }
    }

    /// The field delimiter to use when writing CSV.
    ///
    /// The default is `','`.
    pub fn delimiter(&mut self, delimiter: char) -> &mut WriterBuilder {
        self.wtr.delimiter = delimiter;
        self
    }

    /// The quoting style to use when writing CSV.
    ///
    /// By default, this is set to `QuoteStyle::Necessary`, which will only
    /// use quotes when they are necessary to preserve the integrity of data.
    pub fn quote_style(&mut self, style: QuoteStyle) -> &mut WriterBuilder {
        self.wtr.style = style;
        self
    }
}

/// A writer for CSV text.
///
/// The writer appends to a caller supplied `String` and never does any I/O.
/// It only remembers how many fields have been written to the current line.
///
/// Lines are always terminated by `\n`. The writer does not check that all
/// lines have the same number of fields.
///
/// # Example
///
/// ```
/// use csv_stream_core::Writer;
///
/// let mut wtr = Writer::new();
/// let mut out = String::new();
/// wtr.line(&["a", "b,c"], &mut out);
/// wtr.comment("done", &mut out);
/// assert_eq!(out, "a,\"b,c\"\n#done\n");
/// ```
#[derive(Clone, Debug)]
pub struct Writer {
    delimiter: char,
    style: QuoteStyle,
    fields: u64,
    /// Whether the only field on the current line was written as nothing.
    blank: bool,
}

impl Default for Writer {
    fn default() -> Writer {
        Writer {
            delimiter: ',',
            style: QuoteStyle::default(),
            fields: 0,
            blank: false,
        }
    }
}

impl Writer {
    /// Creates a new CSV writer with the default configuration.
    pub fn new() -> Writer {
        Writer::default()
    }

    /// The delimiter this writer uses.
    pub fn delimiter(&self) -> char {
        self.delimiter
    }

    /// The number of fields written to the current line.
    pub fn fields(&self) -> u64 {
        self.fields
    }

    /// Write a single field, preceded by a delimiter unless it is the first
    /// field of the line.
    pub fn field(&mut self, value: &str, out: &mut String) {
        if self.fields > 0 {
            out.push(self.delimiter);
        }
        if self.should_quote(value) {
            out.push('"');
            let mut last = 0;
            for i in memchr_iter(b'"', value.as_bytes()) {
                out.push_str(&value[last..=i]);
                out.push('"');
                last = i + 1;
            }
            out.push_str(&value[last..]);
            out.push('"');
            self.blank = false;
        } else {
            out.push_str(value);
            self.blank = self.fields == 0 && value.is_empty();
        }
        self.fields += 1;
    }

    /// End the current line.
    pub fn finish_line(&mut self, out: &mut String) {
        if self.fields == 1 && self.blank {
            out.push_str("\"\"");
        }
        out.push('\n');
        self.fields = 0;
        self.blank = false;
    }

    /// Write a comment, one `#` line per line of `text`.
    ///
    /// A line that is in progress is finished first.
    pub fn comment(&mut self, text: &str, out: &mut String) {
        if self.fields > 0 {
            self.finish_line(out);
        }
        let mut rest = text;
        loop {
            out.push('#');
            match rest.find(|c: char| c == '\r' || c == '\n') {
                None => {
                    out.push_str(rest);
                    out.push('\n');
                    return;
                }
                Some(i) => {
                    out.push_str(&rest[..i]);
                    out.push('\n');
                    let len = if rest[i..].starts_with("\r\n") { 2 } else { 1 };
                    rest = &rest[i + len..];
                }
            }
        }
    }

    /// Write a complete line of fields.
    ///
    /// A line that is in progress is finished first.
    pub fn line<I, T>(&mut self, values: I, out: &mut String)
    where
        I: IntoIterator<Item = T>,
        T: AsRef<str>,
    {
        if self.fields > 0 {
            self.finish_line(out);
        }
        for value in values {
            self.field(value.as_ref(), out);
        }
        self.finish_line(out);
    }

    fn should_quote(&self, value: &str) -> bool {
        if self.style == QuoteStyle::Always {
            return true;
        }
        let bytes = value.as_bytes();
        if self.fields == 0 && bytes.first() == Some(&b'#') {
            return true;
        }
        if memchr3(b'"', b'\r', b'\n', bytes).is_some() {
            return true;
        }
        let mut buf = [0; 4];
        let delimiter = self.delimiter.encode_utf8(&mut buf);
        memmem::find(bytes, delimiter.as_bytes()).is_some()
    }
}
