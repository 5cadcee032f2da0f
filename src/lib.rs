/*!
The `csv-stream` crate provides streaming CSV reading and writing over byte
streams in UTF-8, UTF-16, UTF-32 or Windows-1252.

# Overview

A [`Reader`] decodes its input incrementally and pushes the structure of the
data (records, fields and comments) to a [`Handler`] as soon as it is
recognized. It never holds more than one field in memory, so files of any
size can be processed. The text encoding is detected from a byte order mark
or from the first chunk of data, unless it is configured explicitly.

A [`Writer`] is the other direction: it quotes fields as needed and encodes
the output, starting it with a byte order mark where appropriate.

For small inputs, [`Reader::collect`] gathers everything into a [`Table`].

The tokenizer and the quoting rules live in the `csv-stream-core` crate,
which does no I/O at all.

# Example

This reads semicolon separated data with comments and prints every field
along with its position.

```
use csv_stream::{Control, ErrorKind, Handler, Position, ReaderBuilder};

struct Print;

impl Handler for Print {
    fn field(&mut self, text: &str, pos: &Position) -> Result<Control, ErrorKind> {
        println!("record {}, field {}: {}", pos.record(), pos.field(), text);
        Ok(Control::Continue)
    }
}

# fn main() { example().unwrap(); }
fn example() -> csv_stream::Result<()> {
    let data = "\
## a comment
Boston;\"United States\";4628910
";
    let rdr = ReaderBuilder::new()
        .delimiter(';')
        .comments(true)
        .sanitize(true)
        .from_str(data)?;
    rdr.parse(Print)?;
    Ok(())
}
```

# Errors

Malformed data stops the parse with an error that records where it
happened. Handlers may fail too, by returning an [`ErrorKind`], which stops
the parse in the same way. Undecodable bytes are never an error: they are
replaced with U+FFFD.

# Cancellation

Every reader has a [`CancelToken`] that can be shared with other threads.
Once it is cancelled, the reader stops at the next record, field or
comment, and `parse` returns `Outcome::Cancelled`.
*/

#![deny(missing_docs)]

pub use csv_stream_core::{
    CancelToken, Control, Dialect, Handler, Outcome, Position, QuoteStyle,
    Source, Tokenizer,
};

pub use crate::buffered::Lookahead;
pub use crate::encoding::Encoding;
pub use crate::error::{Error, ErrorKind, IntoInnerError, InvalidFormat, Result};
pub use crate::reader::{Reader, ReaderBuilder};
pub use crate::table::Table;
pub use crate::writer::{Writer, WriterBuilder};

mod buffered;
mod encoding;
mod error;
mod reader;
mod table;
mod writer;
