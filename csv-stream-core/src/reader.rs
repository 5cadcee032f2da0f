use std::io;

use log::debug;

use crate::error::{Error, ErrorKind, InvalidFormat, Result};
use crate::event::{CancelToken, Control, Handler, Outcome, Position};

/// The rules used to recognize CSV data.
///
/// A dialect is fixed once a tokenizer or writer has been built from it.
///
/// # Example
///
/// ```
/// use csv_stream_core::Dialect;
///
/// let dialect = Dialect { delimiter: ';', comments: true, ..Dialect::default() };
/// assert!(dialect.validate().is_ok());
/// ```
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct Dialect {
    /// The field delimiter. The default is `,`.
    ///
    /// It must not be `\r`, `\n`, `"` or `#`.
    pub delimiter: char,
    /// Whether lines starting with `#` are comments. Disabled by default.
    pub comments: bool,
    /// Whether a `\` makes the character after it lose any special
    /// meaning. Disabled by default.
    pub backslash_escapes: bool,
    /// Whether fields and comments are delivered with quoting and escapes
    /// resolved. When disabled (the default), the raw text is delivered.
    pub sanitize: bool,
}

impl Default for Dialect {
    fn default() -> Dialect {
        Dialect {
            delimiter: ',',
            comments: false,
            backslash_escapes: false,
            sanitize: false,
        }
    }
}

impl Dialect {
    /// Returns an error if this dialect cannot be used.
    pub fn validate(&self) -> Result<()> {
        match self.delimiter {
            '\r' | '\n' | '"' | '#' => {
                Err(Error::new(ErrorKind::InvalidDelimiter(self.delimiter)))
            }
            _ => Ok(()),
        }
    }
}

/// A source of decoded characters with one character of lookahead and one
/// character of peek-ahead.
///
/// Sources keep a window of text that the tokenizer slices fields out of.
/// The tokenizer calls `compact` after every field and comment, after which
/// the window only needs to hold the text from the cursor onwards.
pub trait Source {
    /// The character at the cursor, or `None` at the end of the data.
    fn peek(&mut self) -> io::Result<Option<char>>;

    /// The character after the one at the cursor, or `None`.
    fn peek_next(&mut self) -> io::Result<Option<char>>;

    /// Move the cursor past the character returned by `peek`.
    fn advance(&mut self);

    /// The position of the cursor in the current window.
    fn cursor(&self) -> usize;

    /// The text from `start` up to the cursor.
    fn slice(&self, start: usize) -> &str;

    /// Discard all text before the cursor. The cursor becomes `0`.
    fn compact(&mut self);

    /// The number of bytes the character occupied in the raw data.
    fn encoded_len(&self, ch: char) -> usize {
        ch.len_utf8()
    }
}

/// A source over text that is already in memory.
#[derive(Clone, Debug)]
pub struct StrSource<'a> {
    text: &'a str,
    start: usize,
    pos: usize,
}

impl<'a> StrSource<'a> {
    /// Create a new source over the given text.
    pub fn new(text: &'a str) -> StrSource<'a> {
        StrSource { text, start: 0, pos: 0 }
    }
}

impl<'a> Source for StrSource<'a> {
    fn peek(&mut self) -> io::Result<Option<char>> {
        Ok(self.text[self.pos..].chars().next())
    }

    fn peek_next(&mut self) -> io::Result<Option<char>> {
        Ok(self.text[self.pos..].chars().nth(1))
    }

    fn advance(&mut self) {
        if let Some(ch) = self.text[self.pos..].chars().next() {
            self.pos += ch.len_utf8();
        }
    }

    fn cursor(&self) -> usize {
        self.pos - self.start
    }

    fn slice(&self, start: usize) -> &str {
        &self.text[self.start + start..self.pos]
    }

    fn compact(&mut self) {
        self.start = self.pos;
    }
}

/// What happened after trying to read one record.
#[derive(Debug, Eq, PartialEq)]
enum Step {
    /// A record terminated by a newline was read.
    Record,
    /// The data is exhausted.
    End,
    Cancelled,
}

/// A CSV tokenizer.
///
/// The tokenizer pulls characters from a `Source` and pushes structural
/// events (documents, records, fields and comments) to a `Handler`. It
/// holds no more text than one field or comment plus whatever the source
/// buffers ahead.
///
/// A tokenizer is single use: `parse` consumes it.
///
/// # Example
///
/// ```
/// use csv_stream_core::{
///     Control, Dialect, ErrorKind, Handler, Position, StrSource, Tokenizer,
/// };
///
/// #[derive(Default)]
/// struct Count(usize);
///
/// impl Handler for Count {
///     fn field(&mut self, _: &str, _: &Position) -> Result<Control, ErrorKind> {
///         self.0 += 1;
///         Ok(Control::Continue)
///     }
/// }
///
/// let src = StrSource::new("a,b\nc,d\n");
/// let mut count = Count::default();
/// Tokenizer::new(Dialect::default(), src).unwrap().parse(&mut count).unwrap();
/// assert_eq!(count.0, 4);
/// ```
#[derive(Debug)]
pub struct Tokenizer<S> {
    src: S,
    dialect: Dialect,
    cancel: CancelToken,
    pos: Position,
    /// Escape-resolved text of the current field or comment. Only
    /// maintained when the dialect sanitizes.
    value: String,
    last_cr: bool,
}

impl<S: Source> Tokenizer<S> {
    /// Create a tokenizer that reads from `src` using `dialect`.
    ///
    /// This fails if the dialect is invalid.
    pub fn new(dialect: Dialect, src: S) -> Result<Tokenizer<S>> {
        dialect.validate()?;
        Ok(Tokenizer {
            src,
            dialect,
            cancel: CancelToken::new(),
            pos: Position::new(),
            value: String::new(),
            last_cr: false,
        })
    }

    /// Use the given token for cancellation instead of a fresh one.
    pub fn with_cancel_token(mut self, token: CancelToken) -> Tokenizer<S> {
        self.cancel = token;
        self
    }

    /// A token that stops this tokenizer when cancelled.
    pub fn cancel_token(&self) -> CancelToken {
        self.cancel.clone()
    }

    /// The dialect in use.
    pub fn dialect(&self) -> &Dialect {
        &self.dialect
    }

    /// The current position.
    pub fn position(&self) -> &Position {
        &self.pos
    }

    /// A reference to the underlying source.
    pub fn get_ref(&self) -> &S {
        &self.src
    }

    /// A mutable reference to the underlying source.
    ///
    /// Moving the source's cursor confuses the tokenizer.
    pub fn get_mut(&mut self) -> &mut S {
        &mut self.src
    }

    /// Tokenize all of the data, pushing events to `handler`.
    ///
    /// Parsing stops after a record that is not followed by a newline, on
    /// error or on cancellation. Errors (including errors returned by the
    /// handler) are delivered to `Handler::error` and `Handler::end_document`
    /// before being returned. Cancellation is not an error: it returns
    /// `Outcome::Cancelled` and no further events are delivered, even when
    /// the record being cancelled was malformed.
    pub fn parse<H: Handler>(mut self, mut handler: H) -> Result<Outcome> {
        if self.is_cancelled() {
            return Ok(Outcome::Cancelled);
        }
        if self.proceed(handler.begin_document()) == Control::Cancel {
            return Ok(Outcome::Cancelled);
        }
        loop {
            match self.read_record(&mut handler) {
                Ok(Step::Record) => {}
                Ok(Step::End) => break,
                Ok(Step::Cancelled) => {
                    debug!("parse cancelled at record {}", self.pos.record());
                    return Ok(Outcome::Cancelled);
                }
                Err(err) => {
                    if self.is_cancelled() {
                        debug!("parse cancelled with pending error: {}", err);
                        return Ok(Outcome::Cancelled);
                    }
                    debug!("parse stopped: {}", err);
                    handler.error(&err);
                    handler.end_document(&self.pos, Some(&err));
                    return Err(err);
                }
            }
        }
        if self.is_cancelled() {
            return Ok(Outcome::Cancelled);
        }
        handler.end_document(&self.pos, None);
        Ok(Outcome::Completed)
    }

    fn read_record<H: Handler>(&mut self, handler: &mut H) -> Result<Step> {
        loop {
            self.read_newlines()?;
            if self.dialect.comments && self.peek()? == Some('#') {
                if self.read_comment(handler)? == Control::Cancel {
                    return Ok(Step::Cancelled);
                }
                continue;
            }
            break;
        }
        if self.is_cancelled() {
            return Ok(Step::Cancelled);
        }
        if self.peek()?.is_none() {
            return Ok(Step::End);
        }

        let record = self.pos.record() + 1;
        self.pos.set_record(record).set_field(0);
        if self.proceed(handler.begin_record(record)) == Control::Cancel {
            return Ok(Step::Cancelled);
        }
        let mut failed = None;
        loop {
            match self.read_field(handler) {
                Ok(Control::Continue) => {}
                Ok(Control::Cancel) => return Ok(Step::Cancelled),
                Err(err) => {
                    failed = Some(err);
                    break;
                }
            }
            match self.read_delimiter() {
                Ok(true) => {}
                Ok(false) => break,
                Err(err) => {
                    failed = Some(err);
                    break;
                }
            }
        }
        let mut terminated = false;
        if failed.is_none() {
            match self.read_newlines() {
                Ok(yes) => terminated = yes,
                Err(err) => failed = Some(err),
            }
        }

        if !self.is_cancelled() {
            match handler.end_record(record, &self.pos) {
                Ok(control) => {
                    self.proceed(control);
                }
                Err(kind) => {
                    if failed.is_none() {
                        failed = Some(Error::at(kind, self.pos.clone()));
                    }
                }
            }
        }
        if let Some(err) = failed {
            return Err(err);
        }
        if self.is_cancelled() {
            Ok(Step::Cancelled)
        } else if terminated {
            Ok(Step::Record)
        } else {
            Ok(Step::End)
        }
    }

    fn read_field<H: Handler>(&mut self, handler: &mut H) -> Result<Control> {
        if self.is_cancelled() {
            return Ok(Control::Cancel);
        }
        self.pos.set_field(self.pos.field() + 1);
        self.value.clear();
        let start = self.src.cursor();
        if self.peek()? == Some('"') {
            self.read_quoted()?;
        } else {
            self.read_unquoted()?;
        }
        if self.is_cancelled() {
            return Ok(Control::Cancel);
        }

        let res = {
            let text = if self.dialect.sanitize {
                &self.value[..]
            } else {
                self.src.slice(start)
            };
            handler.field(text, &self.pos)
        };
        self.src.compact();
        match res {
            Ok(control) => Ok(self.proceed(control)),
            Err(kind) => Err(Error::at(kind, self.pos.clone())),
        }
    }

    fn read_quoted(&mut self) -> Result<()> {
        self.bump('"');
        loop {
            match self.peek()? {
                None => {
                    return Err(self.invalid(InvalidFormat::UnterminatedQuote))
                }
                Some('"') => {
                    if self.peek_next()? == Some('"') {
                        self.bump('"');
                        self.bump('"');
                        self.keep('"');
                    } else {
                        self.bump('"');
                        return Ok(());
                    }
                }
                Some('\\') if self.dialect.backslash_escapes => {
                    self.read_escape()?;
                }
                Some(ch) => {
                    self.bump(ch);
                    self.keep(ch);
                }
            }
        }
    }

    fn read_unquoted(&mut self) -> Result<()> {
        loop {
            match self.peek()? {
                None => return Ok(()),
                Some(ch)
                    if ch == self.dialect.delimiter
                        || ch == '"'
                        || is_newline(ch) =>
                {
                    return Ok(());
                }
                Some('\\') if self.dialect.backslash_escapes => {
                    self.read_escape()?;
                }
                Some(ch) => {
                    self.bump(ch);
                    self.keep(ch);
                }
            }
        }
    }

    fn read_comment<H: Handler>(&mut self, handler: &mut H) -> Result<Control> {
        if self.is_cancelled() {
            return Ok(Control::Cancel);
        }
        self.bump('#');
        self.value.clear();
        let start = self.src.cursor();
        loop {
            match self.peek()? {
                None => break,
                Some(ch) if is_newline(ch) => break,
                Some('\\') if self.dialect.backslash_escapes => {
                    self.read_escape()?;
                }
                Some(ch) => {
                    self.bump(ch);
                    self.keep(ch);
                }
            }
        }
        if self.is_cancelled() {
            return Ok(Control::Cancel);
        }

        let control = {
            let text = if self.dialect.sanitize {
                &self.value[..]
            } else {
                self.src.slice(start)
            };
            handler.comment(text, &self.pos)
        };
        self.src.compact();
        Ok(self.proceed(control))
    }

    /// Consume a backslash and the character after it, which is kept
    /// literally. A backslash at the very end of the data is kept as is.
    fn read_escape(&mut self) -> Result<()> {
        self.bump('\\');
        match self.peek()? {
            Some(ch) => {
                self.bump(ch);
                self.keep(ch);
            }
            None => self.keep('\\'),
        }
        Ok(())
    }

    /// Consume a delimiter. Returns false if the record ends instead.
    fn read_delimiter(&mut self) -> Result<bool> {
        match self.peek()? {
            Some(ch) if ch == self.dialect.delimiter => {
                self.bump(ch);
                Ok(true)
            }
            None => Ok(false),
            Some(ch) if is_newline(ch) => Ok(false),
            Some(ch) => {
                Err(self.invalid(InvalidFormat::UnexpectedCharacter(ch)))
            }
        }
    }

    /// Consume any number of newline characters. Returns true if there was
    /// at least one.
    fn read_newlines(&mut self) -> Result<bool> {
        let mut any = false;
        while let Some(ch) = self.peek()? {
            if !is_newline(ch) {
                break;
            }
            self.bump(ch);
            any = true;
        }
        Ok(any)
    }

    fn peek(&mut self) -> Result<Option<char>> {
        match self.src.peek() {
            Ok(ch) => Ok(ch),
            Err(err) => Err(Error::at(ErrorKind::Io(err), self.pos.clone())),
        }
    }

    fn peek_next(&mut self) -> Result<Option<char>> {
        match self.src.peek_next() {
            Ok(ch) => Ok(ch),
            Err(err) => Err(Error::at(ErrorKind::Io(err), self.pos.clone())),
        }
    }

    /// Advance past `ch`, which must be the character at the cursor.
    fn bump(&mut self, ch: char) {
        self.src.advance();
        let byte = self.pos.byte() + self.src.encoded_len(ch) as u64;
        let chars = self.pos.char() + 1;
        self.pos.set_byte(byte).set_char(chars);
        // `\r\n` counts as one line break.
        if ch == '\r' || (ch == '\n' && !self.last_cr) {
            let line = self.pos.line() + 1;
            self.pos.set_line(line);
        }
        self.last_cr = ch == '\r';
    }

    fn keep(&mut self, ch: char) {
        if self.dialect.sanitize {
            self.value.push(ch);
        }
    }

    fn invalid(&self, kind: InvalidFormat) -> Error {
        Error::at(ErrorKind::InvalidFormat(kind), self.pos.clone())
    }

    fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Latch a handler's request to cancel.
    fn proceed(&self, control: Control) -> Control {
        if control == Control::Cancel {
            self.cancel.cancel();
        }
        control
    }
}

fn is_newline(ch: char) -> bool {
    ch == '\r' || ch == '\n'
}

#[cfg(test)]
mod tests {
    use std::io;

    use crate::error::{Error, ErrorKind, InvalidFormat};
    use crate::event::{Control, Handler, Outcome, Position};

    use super::{Dialect, Source, StrSource, Tokenizer};

    type Csv = Vec<Vec<String>>;

    /// Records every event as a line of text, and the fields as rows.
    #[derive(Debug, Default)]
    struct Events {
        log: Vec<String>,
        rows: Csv,
        comments: Vec<String>,
        cancel_after_fields: Option<usize>,
        /// Cancel from the handler whose log entry starts with this.
        cancel_on: Option<&'static str>,
        fields: usize,
    }

    impl Events {
        fn control(&self) -> Control {
            let last = self.log.last().map(|s| s.as_str()).unwrap_or("");
            match self.cancel_on {
                Some(event) if last.starts_with(event) => Control::Cancel,
                _ => Control::Continue,
            }
        }
    }

    impl Handler for Events {
        fn begin_document(&mut self) -> Control {
            self.log.push("begin".to_string());
            self.control()
        }

        fn end_document(&mut self, _: &Position, err: Option<&Error>) {
            self.log.push(format!("end err={}", err.is_some()));
        }

        fn begin_record(&mut self, record: u64) -> Control {
            self.log.push(format!("record {}", record));
            self.rows.push(vec![]);
            Control::Continue
        }

        fn end_record(
            &mut self,
            record: u64,
            _: &Position,
        ) -> Result<Control, ErrorKind> {
            self.log.push(format!("/record {}", record));
            Ok(self.control())
        }

        fn field(
            &mut self,
            text: &str,
            _: &Position,
        ) -> Result<Control, ErrorKind> {
            self.log.push(format!("field {:?}", text));
            self.rows.last_mut().unwrap().push(text.to_string());
            self.fields += 1;
            if Some(self.fields) == self.cancel_after_fields {
                return Ok(Control::Cancel);
            }
            Ok(Control::Continue)
        }

        fn comment(&mut self, text: &str, _: &Position) -> Control {
            self.log.push(format!("comment {:?}", text));
            self.comments.push(text.to_string());
            self.control()
        }

        fn error(&mut self, err: &Error) {
            self.log.push(format!("error {}", err.kind()));
        }
    }

    fn parse(dialect: Dialect, data: &str) -> (Events, Result<Outcome, Error>) {
        let mut events = Events::default();
        let res = Tokenizer::new(dialect, StrSource::new(data))
            .unwrap()
            .parse(&mut events);
        (events, res)
    }

    fn sanitized() -> Dialect {
        Dialect { sanitize: true, ..Dialect::default() }
    }

    macro_rules! csv {
        ($([$($field:expr),*]),*) => {{
            #[allow(unused_mut)]
            let mut csv: Csv = vec![];
            $(
                #[allow(unused_mut)]
                let mut row: Vec<String> = vec![];
                $(
                    row.push($field.to_string());
                )*
                csv.push(row);
            )*
            csv
        }}
    }

    macro_rules! parses_to {
        ($name:ident, $data:expr, $expected:expr) => {
            parses_to!($name, $data, $expected, |_: &mut Dialect| {});
        };
        ($name:ident, $data:expr, $expected:expr, $config:expr) => {
            #[test]
            fn $name() {
                let mut dialect = sanitized();
                $config(&mut dialect);
                let (events, res) = parse(dialect, $data);
                assert_eq!(res.unwrap(), Outcome::Completed);
                assert_eq!($expected, events.rows);
            }
        };
    }

    parses_to!(one_row_one_field, "a", csv![["a"]]);
    parses_to!(one_row_many_fields, "a,b,c", csv![["a", "b", "c"]]);
    parses_to!(one_row_trailing_comma, "a,b,", csv![["a", "b", ""]]);
    parses_to!(one_row_one_field_lf, "a\n", csv![["a"]]);
    parses_to!(one_row_many_fields_lf, "a,b,c\n", csv![["a", "b", "c"]]);
    parses_to!(one_row_trailing_comma_lf, "a,b,\n", csv![["a", "b", ""]]);
    parses_to!(one_row_one_field_crlf, "a\r\n", csv![["a"]]);
    parses_to!(one_row_many_fields_crlf, "a,b,c\r\n", csv![["a", "b", "c"]]);
    parses_to!(one_row_one_field_cr, "a\r", csv![["a"]]);

    parses_to!(many_rows_one_field, "a\nb", csv![["a"], ["b"]]);
    parses_to!(
        many_rows_many_fields,
        "a,b,c\nx,y,z",
        csv![["a", "b", "c"], ["x", "y", "z"]]
    );
    parses_to!(
        many_rows_many_fields_crlf,
        "a,b,c\r\nx,y,z\r\n",
        csv![["a", "b", "c"], ["x", "y", "z"]]
    );
    parses_to!(
        many_rows_many_fields_cr,
        "a,b,c\rx,y,z\r",
        csv![["a", "b", "c"], ["x", "y", "z"]]
    );

    parses_to!(empty, "", csv![]);
    parses_to!(empty_lines, "\n\n\n\n", csv![]);
    parses_to!(
        empty_lines_interspersed,
        "\n\na,b\n\n\nx,y\n\n\nm,n\n",
        csv![["a", "b"], ["x", "y"], ["m", "n"]]
    );
    parses_to!(
        empty_lines_mixed,
        "\r\n\n\ra,b\r\n\n\r\nx,y\r\n",
        csv![["a", "b"], ["x", "y"]]
    );

    parses_to!(quote_empty, "\"\"", csv![[""]]);
    parses_to!(quote_lf, "\"\"\n", csv![[""]]);
    parses_to!(quote_space, "\" \"", csv![[" "]]);
    parses_to!(quote_inner_space, "\" a \"", csv![[" a "]]);
    parses_to!(quote_doubled, "\"a\"\"b\"\n", csv![["a\"b"]]);
    parses_to!(quote_delimiter_inside, "\"a,b\",c", csv![["a,b", "c"]]);
    parses_to!(
        quote_newline_inside,
        "\"a\nb\",c\r\nd",
        csv![["a\nb", "c"], ["d"]]
    );
    parses_to!(quote_only_doubled, "\"\"\"\"", csv![["\""]]);
    parses_to!(unicode_fields, "αβ,γ\n€,δ", csv![["αβ", "γ"], ["€", "δ"]]);

    parses_to!(
        delimiter_tabs,
        "a\tb",
        csv![["a", "b"]],
        |d: &mut Dialect| d.delimiter = '\t'
    );
    parses_to!(
        delimiter_unicode,
        "a§b§\"c§d\"",
        csv![["a", "b", "c§d"]],
        |d: &mut Dialect| d.delimiter = '§'
    );

    parses_to!(
        backslash_delimiter,
        "a\\,b,c\n",
        csv![["a,b", "c"]],
        |d: &mut Dialect| d.backslash_escapes = true
    );
    parses_to!(
        backslash_in_quotes,
        r#""a\"b",c"#,
        csv![[r#"a"b"#, "c"]],
        |d: &mut Dialect| d.backslash_escapes = true
    );
    parses_to!(
        backslash_newline,
        "a\\\nb,c",
        csv![["a\nb", "c"]],
        |d: &mut Dialect| d.backslash_escapes = true
    );
    parses_to!(
        backslash_trailing,
        "a\\",
        csv![["a\\"]],
        |d: &mut Dialect| d.backslash_escapes = true
    );
    parses_to!(backslash_disabled, "a\\b,c", csv![["a\\b", "c"]]);

    parses_to!(
        comments_skipped,
        "#one\na,b\n#two\n\n#three\nc,d\n",
        csv![["a", "b"], ["c", "d"]],
        |d: &mut Dialect| d.comments = true
    );
    parses_to!(comments_disabled, "#a,b\n", csv![["#a", "b"]]);
    parses_to!(
        comment_only,
        "#nothing here",
        csv![],
        |d: &mut Dialect| d.comments = true
    );
    parses_to!(
        comment_hash_inside_record,
        "a,#b\n",
        csv![["a", "#b"]],
        |d: &mut Dialect| d.comments = true
    );

    #[test]
    fn raw_fields_keep_quotes() {
        let (events, res) = parse(Dialect::default(), "\"a\"\"b\",c\\d\n");
        res.unwrap();
        assert_eq!(events.rows, csv![["\"a\"\"b\"", "c\\d"]]);
    }

    #[test]
    fn raw_fields_keep_backslashes() {
        let dialect =
            Dialect { backslash_escapes: true, ..Dialect::default() };
        let (events, res) = parse(dialect, "a\\,b,c\n");
        res.unwrap();
        assert_eq!(events.rows, csv![["a\\,b", "c"]]);
    }

    #[test]
    fn event_order() {
        let (events, res) = parse(sanitized(), "a,b\nc\n");
        assert_eq!(res.unwrap(), Outcome::Completed);
        assert_eq!(
            events.log,
            vec![
                "begin",
                "record 1",
                "field \"a\"",
                "field \"b\"",
                "/record 1",
                "record 2",
                "field \"c\"",
                "/record 2",
                "end err=false",
            ]
        );
    }

    #[test]
    fn comment_events() {
        let dialect = Dialect { comments: true, ..sanitized() };
        let (events, res) = parse(dialect, "#hello\n#\n");
        res.unwrap();
        assert_eq!(events.comments, vec!["hello", ""]);
        assert_eq!(events.log, vec![
            "begin",
            "comment \"hello\"",
            "comment \"\"",
            "end err=false",
        ]);
    }

    // An escaped character in a comment is exactly one character: the
    // escape does not leak into the rest of the comment.
    #[test]
    fn comment_escapes() {
        let dialect = Dialect {
            comments: true,
            backslash_escapes: true,
            ..sanitized()
        };
        let (events, res) = parse(dialect, "#a\\\nb\\\\\nc,d\n");
        res.unwrap();
        assert_eq!(events.comments, vec!["a\nb\\"]);
        assert_eq!(events.rows, csv![["c", "d"]]);
    }

    #[test]
    fn raw_comment_keeps_escapes() {
        let dialect = Dialect {
            comments: true,
            backslash_escapes: true,
            ..Dialect::default()
        };
        let (events, res) = parse(dialect, "#a\\\nb\n");
        res.unwrap();
        assert_eq!(events.comments, vec!["a\\\nb"]);
    }

    #[test]
    fn comments_do_not_count_as_records() {
        let dialect = Dialect { comments: true, ..sanitized() };
        let (events, res) = parse(dialect, "#x\na\n#y\nb\n#z\n");
        res.unwrap();
        assert!(events.log.contains(&"record 2".to_string()));
        assert!(!events.log.contains(&"record 3".to_string()));
    }

    #[test]
    fn unexpected_delimiter() {
        let (events, res) = parse(sanitized(), "a,\"b\";c\nd,e\n");
        let err = res.unwrap_err();
        match *err.kind() {
            ErrorKind::InvalidFormat(InvalidFormat::UnexpectedCharacter(';')) => {}
            ref kind => panic!("unexpected error kind: {:?}", kind),
        }
        let pos = err.position().unwrap();
        assert_eq!(pos.record(), 1);
        assert_eq!(pos.field(), 2);
        assert_eq!(pos.byte(), 5);
        assert_eq!(events.rows, csv![["a", "b"]]);
        assert_eq!(
            &events.log[events.log.len() - 3..],
            &["/record 1", "error invalid format: expected delimiter or \
               end of record, found ';'", "end err=true"]
        );
    }

    #[test]
    fn text_after_closing_quote() {
        let (_, res) = parse(sanitized(), "\"a\"b,c\n");
        let err = res.unwrap_err();
        assert!(err.is_invalid_format());
        assert_eq!(err.position().unwrap().field(), 1);
    }

    #[test]
    fn quote_inside_unquoted_field() {
        let (_, res) = parse(sanitized(), "ab\"c\n");
        assert!(res.unwrap_err().is_invalid_format());
    }

    #[test]
    fn unterminated_quote() {
        let (events, res) = parse(sanitized(), "a,\"bc\nd");
        let err = res.unwrap_err();
        match *err.kind() {
            ErrorKind::InvalidFormat(InvalidFormat::UnterminatedQuote) => {}
            ref kind => panic!("unexpected error kind: {:?}", kind),
        }
        assert_eq!(events.rows, csv![["a"]]);
        assert!(events.log.contains(&"/record 1".to_string()));
    }

    #[test]
    fn line_numbers() {
        let (_, res) = parse(sanitized(), "a\r\nb\rc\n\"d\ne\";");
        let err = res.unwrap_err();
        assert_eq!(err.position().unwrap().line(), 5);
        assert_eq!(err.position().unwrap().record(), 4);
    }

    #[test]
    fn cancel_after_fields() {
        let mut events = Events::default();
        events.cancel_after_fields = Some(3);
        let tok =
            Tokenizer::new(sanitized(), StrSource::new("a,b\nc,d\ne\n"))
                .unwrap();
        let token = tok.cancel_token();
        let res = tok.parse(&mut events).unwrap();
        assert_eq!(res, Outcome::Cancelled);
        assert!(token.is_cancelled());
        assert_eq!(events.fields, 3);
        assert_eq!(events.log.last().unwrap(), "field \"c\"");
    }

    fn parse_cancelling_on(
        dialect: Dialect,
        data: &str,
        event: &'static str,
    ) -> Events {
        let mut events = Events::default();
        events.cancel_on = Some(event);
        let res = Tokenizer::new(dialect, StrSource::new(data))
            .unwrap()
            .parse(&mut events);
        assert_eq!(res.unwrap(), Outcome::Cancelled);
        events
    }

    #[test]
    fn cancel_from_begin_document() {
        let events = parse_cancelling_on(sanitized(), "a\n", "begin");
        assert_eq!(events.log, vec!["begin"]);
        assert!(events.rows.is_empty());
    }

    #[test]
    fn cancel_from_comment() {
        let dialect = Dialect { comments: true, ..sanitized() };
        let events = parse_cancelling_on(dialect, "#x\n#y\na\n", "comment");
        assert_eq!(events.log, vec!["begin", "comment \"x\""]);
        assert!(events.rows.is_empty());
    }

    #[test]
    fn cancel_from_end_record() {
        let events = parse_cancelling_on(sanitized(), "a\nb\n", "/record");
        assert_eq!(
            events.log,
            vec!["begin", "record 1", "field \"a\"", "/record 1"]
        );
    }

    #[test]
    fn cancel_wins_over_pending_error() {
        let events =
            parse_cancelling_on(sanitized(), "\"a\"b,c\n", "/record");
        assert_eq!(
            events.log,
            vec!["begin", "record 1", "field \"a\"", "/record 1"]
        );
    }

    #[test]
    fn cancel_before_parse() {
        let mut events = Events::default();
        let tok =
            Tokenizer::new(sanitized(), StrSource::new("a,b\n")).unwrap();
        tok.cancel_token().cancel();
        assert_eq!(tok.parse(&mut events).unwrap(), Outcome::Cancelled);
        assert!(events.log.is_empty());
    }

    #[test]
    fn handler_error_stops_parse() {
        struct Picky;

        impl Handler for Picky {
            fn end_record(
                &mut self,
                record: u64,
                _: &Position,
            ) -> Result<Control, ErrorKind> {
                if record == 2 {
                    Err(ErrorKind::IllegalNumberOfFields {
                        expected: 1,
                        len: 2,
                    })
                } else {
                    Ok(Control::Continue)
                }
            }
        }

        let tok =
            Tokenizer::new(sanitized(), StrSource::new("a\nb,c\nd\n"))
                .unwrap();
        let err = tok.parse(Picky).unwrap_err();
        assert_eq!(err.position().unwrap().record(), 2);
        match *err.kind() {
            ErrorKind::IllegalNumberOfFields { expected: 1, len: 2 } => {}
            ref kind => panic!("unexpected error kind: {:?}", kind),
        }
    }

    #[test]
    fn invalid_delimiters() {
        for &delimiter in &['\n', '\r', '"', '#'] {
            let dialect = Dialect { delimiter, ..Dialect::default() };
            let err = Tokenizer::new(dialect, StrSource::new("")).unwrap_err();
            match *err.kind() {
                ErrorKind::InvalidDelimiter(d) => assert_eq!(d, delimiter),
                ref kind => panic!("unexpected error kind: {:?}", kind),
            }
        }
    }

    /// A source that fails after a number of characters.
    struct Failing<'a> {
        inner: StrSource<'a>,
        left: usize,
    }

    impl<'a> Source for Failing<'a> {
        fn peek(&mut self) -> io::Result<Option<char>> {
            if self.left == 0 {
                return Err(io::Error::new(io::ErrorKind::Other, "boom"));
            }
            self.inner.peek()
        }

        fn peek_next(&mut self) -> io::Result<Option<char>> {
            self.inner.peek_next()
        }

        fn advance(&mut self) {
            self.left -= 1;
            self.inner.advance()
        }

        fn cursor(&self) -> usize {
            self.inner.cursor()
        }

        fn slice(&self, start: usize) -> &str {
            self.inner.slice(start)
        }

        fn compact(&mut self) {
            self.inner.compact()
        }
    }

    #[test]
    fn io_error_is_returned() {
        let src = Failing { inner: StrSource::new("a,b\nc,d\n"), left: 5 };
        let mut events = Events::default();
        let err = Tokenizer::new(sanitized(), src)
            .unwrap()
            .parse(&mut events)
            .unwrap_err();
        assert!(err.is_io_error());
        assert_eq!(err.position().unwrap().record(), 2);
        assert_eq!(events.log.last().unwrap(), "end err=true");
    }

    #[test]
    fn str_source_compacts() {
        let mut src = StrSource::new("ab,c");
        src.advance();
        src.advance();
        assert_eq!(src.slice(0), "ab");
        src.compact();
        assert_eq!(src.cursor(), 0);
        src.advance();
        assert_eq!(src.slice(0), ",");
        assert_eq!(src.peek().unwrap(), Some('c'));
        assert_eq!(src.peek_next().unwrap(), None);
    }
}
