/*!
`csv-stream-core` provides an I/O free CSV tokenizer and writer.

The tokenizer works on decoded text. It pulls characters one at a time from
a [`Source`] and pushes what it recognizes (documents, records, fields and
comments) to a [`Handler`]. Nothing is buffered beyond the field or comment
being read, so arbitrarily large inputs can be processed in constant memory
as long as the source compacts its window when asked to.

The writer is its mirror image: it appends correctly quoted CSV text to a
`String`.

Most users want the `csv-stream` crate instead, which handles byte streams,
text encodings and files on top of this crate.

# Example

This counts the records and fields in some CSV data, skipping comments.

```
use csv_stream_core::{
    Control, Dialect, ErrorKind, Handler, Outcome, Position, StrSource,
    Tokenizer,
};

#[derive(Default)]
struct Counts {
    records: u64,
    fields: u64,
}

impl Handler for Counts {
    fn begin_record(&mut self, _: u64) -> Control {
        self.records += 1;
        Control::Continue
    }

    fn field(&mut self, _: &str, _: &Position) -> Result<Control, ErrorKind> {
        self.fields += 1;
        Ok(Control::Continue)
    }
}

let data = "\
## cities
city,country,pop
Boston,United States,4628910
Concord,United States,42695
";

let dialect = Dialect { comments: true, ..Dialect::default() };
let mut counts = Counts::default();
let tok = Tokenizer::new(dialect, StrSource::new(data)).unwrap();
assert_eq!(tok.parse(&mut counts).unwrap(), Outcome::Completed);
assert_eq!((counts.records, counts.fields), (3, 9));
```
*/

#![deny(missing_docs)]

pub use crate::error::{Error, ErrorKind, InvalidFormat, Result};
pub use crate::event::{CancelToken, Control, Handler, Outcome, Position};
pub use crate::reader::{Dialect, Source, StrSource, Tokenizer};
pub use crate::writer::{QuoteStyle, Writer, WriterBuilder};

mod error;
mod event;
mod reader;
mod writer;
