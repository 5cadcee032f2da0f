use std::error;
use std::fmt;
use std::io;
use std::result;

use thiserror::Error;

use crate::event::Position;

/// A type alias for `Result<T, csv_stream_core::Error>`.
pub type Result<T> = result::Result<T, Error>;

/// An error that can occur while tokenizing or writing CSV data.
///
/// Every error carries an [`ErrorKind`] and, when it was raised while
/// parsing, the position at which the tokenizer stopped.
#[derive(Debug)]
pub struct Error {
    kind: ErrorKind,
    pos: Option<Position>,
}

/// The specific type of an error.
#[derive(Debug, Error)]
pub enum ErrorKind {
    /// The input is not well formed CSV for the configured dialect.
    #[error("invalid format: {0}")]
    InvalidFormat(InvalidFormat),
    /// A record has a different number of fields than the header record.
    ///
    /// This is never raised by the tokenizer itself. It is raised by
    /// handlers that track field counts, such as a table with headers.
    #[error(
        "found record with {len} fields, but the header record \
         has {expected} fields"
    )]
    IllegalNumberOfFields {
        /// The number of fields in the header record.
        expected: usize,
        /// The number of fields in the offending record.
        len: usize,
    },
    /// The configured delimiter cannot be used as a delimiter.
    #[error("invalid delimiter {0:?}: must not be a newline, '\"' or '#'")]
    InvalidDelimiter(char),
    /// An I/O error that occurred while reading or writing CSV data.
    #[error("{0}")]
    Io(#[from] io::Error),
}

/// The ways in which CSV data can be malformed.
#[derive(Clone, Debug, Eq, Error, PartialEq)]
pub enum InvalidFormat {
    /// A character other than a delimiter or newline followed a field.
    #[error("expected delimiter or end of record, found {0:?}")]
    UnexpectedCharacter(char),
    /// The data ended inside a quoted field.
    #[error("unterminated quoted field")]
    UnterminatedQuote,
}

impl Error {
    /// Create a new error without positional information.
    pub fn new(kind: ErrorKind) -> Error {
        Error { kind, pos: None }
    }

    /// Create a new error that occurred at the given position.
    pub fn at(kind: ErrorKind, pos: Position) -> Error {
        Error { kind, pos: Some(pos) }
    }

    /// Return the specific type of this error.
    pub fn kind(&self) -> &ErrorKind {
        &self.kind
    }

    /// Unwrap this error into its underlying type.
    pub fn into_kind(self) -> ErrorKind {
        self.kind
    }

    /// The position at which this error occurred, if available.
    pub fn position(&self) -> Option<&Position> {
        self.pos.as_ref()
    }

    /// Returns true if this is a malformed data error.
    pub fn is_invalid_format(&self) -> bool {
        match self.kind {
            ErrorKind::InvalidFormat(_) => true,
            _ => false,
        }
    }

    /// Returns true if this is an I/O error.
    ///
    /// If this is true, the underlying `ErrorKind` is guaranteed to be
    /// `ErrorKind::Io`.
    pub fn is_io_error(&self) -> bool {
        match self.kind {
            ErrorKind::Io(_) => true,
            _ => false,
        }
    }
}

impl From<ErrorKind> for Error {
    fn from(kind: ErrorKind) -> Error {
        Error::new(kind)
    }
}

impl From<io::Error> for Error {
    fn from(err: io::Error) -> Error {
        Error::new(ErrorKind::Io(err))
    }
}

impl From<Error> for io::Error {
    fn from(err: Error) -> io::Error {
        match err.kind {
            ErrorKind::Io(err) => err,
            kind => io::Error::new(
                io::ErrorKind::InvalidData,
                Error { kind, pos: err.pos },
            ),
        }
    }
}

impl error::Error for Error {
    fn source(&self) -> Option<&(dyn error::Error + 'static)> {
        match self.kind {
            ErrorKind::Io(ref err) => Some(err),
            _ => None,
        }
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match (&self.kind, &self.pos) {
            (ErrorKind::Io(err), _) => write!(f, "{}", err),
            (ErrorKind::InvalidDelimiter(_), _) | (_, None) => {
                write!(f, "CSV error: {}", self.kind)
            }
            (_, Some(pos)) => write!(
                f,
                "CSV parse error: record {} \
                 (byte {}, line {}, field: {}): {}",
                pos.record(),
                pos.byte(),
                pos.line(),
                pos.field(),
                self.kind
            ),
        }
    }
}
