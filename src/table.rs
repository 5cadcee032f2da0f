use csv_stream_core::{Control, ErrorKind, Handler, Position};
#[cfg(feature = "serde")]
use serde::Serialize;

/// Rows of CSV data collected in memory.
///
/// A table is a `Handler`, so it can be filled by any reader or tokenizer.
/// Optionally, the first record is taken as the names of the columns, in
/// which case every other record must have exactly as many fields.
///
/// # Example
///
/// ```
/// use csv_stream::ReaderBuilder;
///
/// let data = "\
/// ## population estimates
/// city,pop
/// Boston,4628910
/// Concord,42695
/// ";
/// let rdr = ReaderBuilder::new().comments(true).from_str(data).unwrap();
/// let table = rdr.collect(true).unwrap();
///
/// assert_eq!(table.len(), 2);
/// assert_eq!(table.get(1, "city"), Some("Concord"));
/// assert_eq!(table.comments(), &[" population estimates"]);
/// ```
#[derive(Clone, Debug, Default, Eq, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize))]
pub struct Table {
    headers: Option<Vec<String>>,
    rows: Vec<Vec<String>>,
    comments: Vec<String>,
    #[cfg_attr(feature = "serde", serde(skip))]
    keyed: bool,
    #[cfg_attr(feature = "serde", serde(skip))]
    current: Vec<String>,
}

impl Table {
    /// Create an empty table that collects every record as a row.
    pub fn new() -> Table {
        Table::default()
    }

    /// Create an empty table that takes its first record as column names.
    pub fn with_headers() -> Table {
        Table { keyed: true, ..Table::default() }
    }

    /// The column names, once the first record was read.
    ///
    /// This is always `None` for a table created with `new`.
    pub fn headers(&self) -> Option<&[String]> {
        self.headers.as_ref().map(|h| &h[..])
    }

    /// All rows, not including the header record.
    pub fn rows(&self) -> &[Vec<String>] {
        &self.rows
    }

    /// Consumes the table, returning its rows.
    pub fn into_rows(self) -> Vec<Vec<String>> {
        self.rows
    }

    /// The text of every comment, in order.
    pub fn comments(&self) -> &[String] {
        &self.comments
    }

    /// The number of rows, not including the header record.
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    /// Returns true if the table has no rows.
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// The value in the column named `key` of the given row.
    pub fn get(&self, row: usize, key: &str) -> Option<&str> {
        let i = self.headers.as_ref()?.iter().position(|h| h == key)?;
        self.rows.get(row)?.get(i).map(|v| v.as_str())
    }

    /// Iterate over the rows as `(column name, value)` pairs.
    ///
    /// Rows have no pairs when the table has no headers.
    pub fn keyed_rows<'a>(
        &'a self,
    ) -> impl Iterator<Item = impl Iterator<Item = (&'a str, &'a str)> + 'a> + 'a
    {
        let headers: &'a [String] = match self.headers {
            Some(ref headers) => headers,
            None => &[],
        };
        self.rows.iter().map(move |row| {
            headers.iter().zip(row).map(|(k, v)| (k.as_str(), v.as_str()))
        })
    }
}

impl Handler for Table {
    fn begin_record(&mut self, _: u64) -> Control {
        self.current.clear();
        Control::Continue
    }

    fn end_record(
        &mut self,
        _: u64,
        _: &Position,
    ) -> Result<Control, ErrorKind> {
        let row = std::mem::replace(&mut self.current, vec![]);
        if !self.keyed {
            self.rows.push(row);
            return Ok(Control::Continue);
        }
        match self.headers.as_ref().map(|h| h.len()) {
            None => self.headers = Some(row),
            Some(expected) if expected != row.len() => {
                return Err(ErrorKind::IllegalNumberOfFields {
                    expected,
                    len: row.len(),
                });
            }
            Some(_) => self.rows.push(row),
        }
        Ok(Control::Continue)
    }

    fn field(
        &mut self,
        text: &str,
        _: &Position,
    ) -> Result<Control, ErrorKind> {
        self.current.push(text.to_string());
        Ok(Control::Continue)
    }

    fn comment(&mut self, text: &str, _: &Position) -> Control {
        self.comments.push(text.to_string());
        Control::Continue
    }
}
