use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

#[cfg(feature = "serde")]
use serde::Serialize;

use crate::error::{Error, ErrorKind};

/// What a handler wants the tokenizer to do after an event.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Control {
    /// Keep parsing.
    Continue,
    /// Stop parsing. No further events are delivered.
    Cancel,
}

impl Default for Control {
    fn default() -> Control {
        Control::Continue
    }
}

/// How a call to `parse` ended.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Outcome {
    /// All of the data was read and `end_document` was delivered.
    Completed,
    /// Parsing was cancelled, either by a handler or through a
    /// `CancelToken`.
    Cancelled,
}

/// Receives the structural events recognized by a tokenizer.
///
/// Every method has a default implementation that does nothing and lets
/// parsing continue, so implementors only override the events they care
/// about.
///
/// Methods that can fail return an `ErrorKind`. The tokenizer attaches the
/// current position to it and stops parsing exactly as it would for
/// malformed data: `error` and `end_document` are delivered and the error is
/// returned from `parse`.
pub trait Handler {
    /// Called once before anything else.
    fn begin_document(&mut self) -> Control {
        Control::Continue
    }

    /// Called once after the last record, or after an error.
    ///
    /// This is not called when parsing was cancelled.
    fn end_document(&mut self, _pos: &Position, _err: Option<&Error>) {}

    /// Called when a new record begins. Records are numbered from `1`.
    fn begin_record(&mut self, _record: u64) -> Control {
        Control::Continue
    }

    /// Called when a record ends.
    ///
    /// This is also called for a record that was cut short by an error.
    fn end_record(
        &mut self,
        _record: u64,
        _pos: &Position,
    ) -> Result<Control, ErrorKind> {
        Ok(Control::Continue)
    }

    /// Called for every field.
    fn field(
        &mut self,
        _text: &str,
        _pos: &Position,
    ) -> Result<Control, ErrorKind> {
        Ok(Control::Continue)
    }

    /// Called for every comment line, without the leading `#`.
    fn comment(&mut self, _text: &str, _pos: &Position) -> Control {
        Control::Continue
    }

    /// Called when parsing stops because of an error, right before
    /// `end_document`.
    fn error(&mut self, _err: &Error) {}
}

impl<'a, H: Handler + ?Sized> Handler for &'a mut H {
    fn begin_document(&mut self) -> Control {
        (**self).begin_document()
    }

    fn end_document(&mut self, pos: &Position, err: Option<&Error>) {
        (**self).end_document(pos, err)
    }

    fn begin_record(&mut self, record: u64) -> Control {
        (**self).begin_record(record)
    }

    fn end_record(
        &mut self,
        record: u64,
        pos: &Position,
    ) -> Result<Control, ErrorKind> {
        (**self).end_record(record, pos)
    }

    fn field(
        &mut self,
        text: &str,
        pos: &Position,
    ) -> Result<Control, ErrorKind> {
        (**self).field(text, pos)
    }

    fn comment(&mut self, text: &str, pos: &Position) -> Control {
        (**self).comment(text, pos)
    }

    fn error(&mut self, err: &Error) {
        (**self).error(err)
    }
}

/// A one-way latch used to stop a tokenizer.
///
/// Tokens are cheap to clone and may be sent to other threads. Setting a
/// token never interrupts a read that is in progress. The tokenizer checks
/// it at the start of every record, field and comment, and before
/// delivering any event.
#[derive(Clone, Debug, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    /// Create a new token that is not cancelled.
    pub fn new() -> CancelToken {
        CancelToken::default()
    }

    /// Request cancellation. This cannot be undone.
    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    /// Returns true if cancellation was requested.
    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// A position in CSV data.
///
/// All counters are running totals maintained while parsing. Once the
/// underlying buffer has been compacted, they are best-effort values and not
/// exact seek positions.
#[derive(Clone, Debug, Eq, Hash, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize))]
pub struct Position {
    byte: u64,
    char: u64,
    line: u64,
    record: u64,
    field: u64,
}

impl Default for Position {
    fn default() -> Position {
        Position::new()
    }
}

impl Position {
    /// Returns a new position at the start of the data.
    ///
    /// Lines start at `1`. Records and fields are `0` until the first one is
    /// begun.
    pub fn new() -> Position {
        Position { byte: 0, char: 0, line: 1, record: 0, field: 0 }
    }

    /// The byte offset, starting at `0`.
    pub fn byte(&self) -> u64 {
        self.byte
    }

    /// The character offset, starting at `0`.
    pub fn char(&self) -> u64 {
        self.char
    }

    /// The line number, starting at `1`.
    pub fn line(&self) -> u64 {
        self.line
    }

    /// The record index, starting at `1`.
    pub fn record(&self) -> u64 {
        self.record
    }

    /// The index of the field being read in the current record, starting at
    /// `1`.
    pub fn field(&self) -> u64 {
        self.field
    }

    /// Set the byte offset.
    pub fn set_byte(&mut self, byte: u64) -> &mut Position {
        self.byte = byte;
        self
    }

    /// Set the character offset.
    pub fn set_char(&mut self, char: u64) -> &mut Position {
        self.char = char;
        self
    }

    /// Set the line number.
    pub fn set_line(&mut self, line: u64) -> &mut Position {
        self.line = line;
        self
    }

    /// Set the record index.
    pub fn set_record(&mut self, record: u64) -> &mut Position {
        self.record = record;
        self
    }

    /// Set the field index.
    pub fn set_field(&mut self, field: u64) -> &mut Position {
        self.field = field;
        self
    }
}

#[cfg(test)]
mod tests {
    use std::thread;

    use super::{CancelToken, Position};

    #[test]
    fn cancel_token_is_shared() {
        let token = CancelToken::new();
        let other = token.clone();
        assert!(!token.is_cancelled());
        thread::spawn(move || other.cancel()).join().unwrap();
        assert!(token.is_cancelled());
    }

    #[test]
    fn position_starts_on_line_one() {
        let pos = Position::new();
        assert_eq!(pos.line(), 1);
        assert_eq!(pos.record(), 0);
        assert_eq!(pos.byte(), 0);
    }
}
