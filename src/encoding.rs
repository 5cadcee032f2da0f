use std::char;
use std::fmt;

use bstr::ByteSlice;
use byteorder::{BigEndian, ByteOrder, LittleEndian};
use log::debug;

const REPLACEMENT: char = '\u{FFFD}';

const UTF32BE_BOM: &[u8] = b"\x00\x00\xFE\xFF";
const UTF32LE_BOM: &[u8] = b"\xFF\xFE\x00\x00";
const UTF16BE_BOM: &[u8] = b"\xFE\xFF";
const UTF16LE_BOM: &[u8] = b"\xFF\xFE";
const UTF8_BOM: &[u8] = b"\xEF\xBB\xBF";

/// Code points of the bytes `0x80` through `0x9F` in Windows-1252. The five
/// bytes without an assignment map to the C1 control with the same value.
static WINDOWS_1252_HIGH: [char; 32] = [
    '\u{20AC}', '\u{0081}', '\u{201A}', '\u{0192}', '\u{201E}', '\u{2026}',
    '\u{2020}', '\u{2021}', '\u{02C6}', '\u{2030}', '\u{0160}', '\u{2039}',
    '\u{0152}', '\u{008D}', '\u{017D}', '\u{008F}', '\u{0090}', '\u{2018}',
    '\u{2019}', '\u{201C}', '\u{201D}', '\u{2022}', '\u{2013}', '\u{2014}',
    '\u{02DC}', '\u{2122}', '\u{0161}', '\u{203A}', '\u{0153}', '\u{009D}',
    '\u{017E}', '\u{0178}',
];

/// A text encoding that CSV data can be read from or written in.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum Encoding {
    /// UTF-8. This is the default for writing.
    Utf8,
    /// UTF-16, big endian.
    Utf16Be,
    /// UTF-16, little endian.
    Utf16Le,
    /// UTF-32, big endian.
    Utf32Be,
    /// UTF-32, little endian.
    Utf32Le,
    /// Windows-1252, used when data is neither marked with a byte order mark
    /// nor valid UTF-8.
    Windows1252,
}

impl Default for Encoding {
    fn default() -> Encoding {
        Encoding::Utf8
    }
}

impl fmt::Display for Encoding {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl Encoding {
    /// Guess the encoding of data from its first bytes.
    ///
    /// Returns the encoding along with the length of the byte order mark
    /// that `prefix` starts with, which is `0` when there is none.
    ///
    /// Without a byte order mark, data that is valid UTF-8 is assumed to be
    /// UTF-8. A multi-byte sequence cut off at the end of `prefix` does not
    /// count as invalid. Anything else is assumed to be Windows-1252.
    ///
    /// ```
    /// use csv_stream::Encoding;
    ///
    /// assert_eq!(Encoding::sniff(b"\xEF\xBB\xBFa,b"), (Encoding::Utf8, 3));
    /// assert_eq!(Encoding::sniff(b"\xFF\xFEa\x00"), (Encoding::Utf16Le, 2));
    /// assert_eq!(Encoding::sniff(b"caf\xE9,b"), (Encoding::Windows1252, 0));
    /// ```
    pub fn sniff(prefix: &[u8]) -> (Encoding, usize) {
        // UTF-32LE must be tested before UTF-16LE since their marks overlap.
        let marked = [
            (UTF32BE_BOM, Encoding::Utf32Be),
            (UTF32LE_BOM, Encoding::Utf32Le),
            (UTF16BE_BOM, Encoding::Utf16Be),
            (UTF16LE_BOM, Encoding::Utf16Le),
            (UTF8_BOM, Encoding::Utf8),
        ];
        for &(bom, enc) in marked.iter() {
            if prefix.starts_with(bom) {
                debug!("found {} byte order mark", enc);
                return (enc, bom.len());
            }
        }
        match prefix.to_str() {
            Ok(_) => (Encoding::Utf8, 0),
            Err(err) if err.error_len().is_none() => (Encoding::Utf8, 0),
            Err(err) => {
                debug!(
                    "invalid UTF-8 at byte {} of {:?}, falling back to {}",
                    err.valid_up_to(),
                    prefix[err.valid_up_to()..].as_bstr(),
                    Encoding::Windows1252,
                );
                (Encoding::Windows1252, 0)
            }
        }
    }

    /// A human readable name for this encoding.
    pub fn name(&self) -> &'static str {
        match *self {
            Encoding::Utf8 => "UTF-8",
            Encoding::Utf16Be => "UTF-16BE",
            Encoding::Utf16Le => "UTF-16LE",
            Encoding::Utf32Be => "UTF-32BE",
            Encoding::Utf32Le => "UTF-32LE",
            Encoding::Windows1252 => "windows-1252",
        }
    }

    /// The byte order mark written by default at the start of data in this
    /// encoding.
    ///
    /// This is `None` for UTF-8 and Windows-1252. See `signature` for the
    /// UTF-8 byte order mark.
    pub fn byte_order_mark(&self) -> Option<&'static [u8]> {
        match *self {
            Encoding::Utf8 | Encoding::Windows1252 => None,
            _ => Some(self.signature()),
        }
    }

    /// The byte order mark of this encoding, or an empty slice if it has
    /// none.
    pub fn signature(&self) -> &'static [u8] {
        match *self {
            Encoding::Utf8 => UTF8_BOM,
            Encoding::Utf16Be => UTF16BE_BOM,
            Encoding::Utf16Le => UTF16LE_BOM,
            Encoding::Utf32Be => UTF32BE_BOM,
            Encoding::Utf32Le => UTF32LE_BOM,
            Encoding::Windows1252 => b"",
        }
    }

    /// The number of bytes `ch` occupies in this encoding.
    pub fn encoded_len(&self, ch: char) -> usize {
        match *self {
            Encoding::Utf8 => ch.len_utf8(),
            Encoding::Utf16Be | Encoding::Utf16Le => ch.len_utf16() * 2,
            Encoding::Utf32Be | Encoding::Utf32Le => 4,
            Encoding::Windows1252 => 1,
        }
    }

    /// Decode `bytes`, appending the text to `out`.
    ///
    /// Returns the number of bytes consumed. Unless `last` is set, a
    /// sequence cut off at the end of `bytes` is not consumed so that it can
    /// be completed by the next call. Invalid sequences, and incomplete ones
    /// when `last` is set, decode to U+FFFD.
    pub fn decode(&self, bytes: &[u8], out: &mut String, last: bool) -> usize {
        match *self {
            Encoding::Utf8 => decode_utf8(bytes, out, last),
            Encoding::Utf16Be => decode_utf16::<BigEndian>(bytes, out, last),
            Encoding::Utf16Le => decode_utf16::<LittleEndian>(bytes, out, last),
            Encoding::Utf32Be => decode_utf32::<BigEndian>(bytes, out, last),
            Encoding::Utf32Le => decode_utf32::<LittleEndian>(bytes, out, last),
            Encoding::Windows1252 => {
                out.extend(bytes.iter().cloned().map(windows_1252_char));
                bytes.len()
            }
        }
    }

    /// Encode `text`, appending the bytes to `out`.
    ///
    /// Characters that Windows-1252 cannot represent are written as `?`.
    pub fn encode(&self, text: &str, out: &mut Vec<u8>) {
        match *self {
            Encoding::Utf8 => out.extend_from_slice(text.as_bytes()),
            Encoding::Utf16Be => encode_utf16::<BigEndian>(text, out),
            Encoding::Utf16Le => encode_utf16::<LittleEndian>(text, out),
            Encoding::Utf32Be => encode_utf32::<BigEndian>(text, out),
            Encoding::Utf32Le => encode_utf32::<LittleEndian>(text, out),
            Encoding::Windows1252 => {
                out.extend(text.chars().map(windows_1252_byte));
            }
        }
    }
}

fn decode_utf8(bytes: &[u8], out: &mut String, last: bool) -> usize {
    let mut rest = bytes;
    loop {
        match rest.to_str() {
            Ok(text) => {
                out.push_str(text);
                return bytes.len();
            }
            Err(err) => {
                let (valid, invalid) = rest.split_at(err.valid_up_to());
                valid.to_str_lossy_into(out);
                match err.error_len() {
                    Some(len) => {
                        out.push(REPLACEMENT);
                        rest = &invalid[len..];
                    }
                    None if last => {
                        out.push(REPLACEMENT);
                        return bytes.len();
                    }
                    None => return bytes.len() - invalid.len(),
                }
            }
        }
    }
}

fn decode_utf16<B: ByteOrder>(
    bytes: &[u8],
    out: &mut String,
    last: bool,
) -> usize {
    let mut units = bytes.len() / 2;
    if !last && units > 0 {
        // A leading surrogate needs the next chunk to be decoded.
        let unit = B::read_u16(&bytes[(units - 1) * 2..]);
        if (0xD800..0xDC00).contains(&unit) {
            units -= 1;
        }
    }
    let decoded = char::decode_utf16(
        bytes[..units * 2].chunks(2).map(|unit| B::read_u16(unit)),
    );
    out.extend(decoded.map(|r| r.unwrap_or(REPLACEMENT)));
    if last && units * 2 < bytes.len() {
        out.push(REPLACEMENT);
        return bytes.len();
    }
    units * 2
}

fn decode_utf32<B: ByteOrder>(
    bytes: &[u8],
    out: &mut String,
    last: bool,
) -> usize {
    let units = bytes.len() / 4;
    out.extend(bytes[..units * 4].chunks(4).map(|unit| {
        char::from_u32(B::read_u32(unit)).unwrap_or(REPLACEMENT)
    }));
    if last && units * 4 < bytes.len() {
        out.push(REPLACEMENT);
        return bytes.len();
    }
    units * 4
}

fn encode_utf16<B: ByteOrder>(text: &str, out: &mut Vec<u8>) {
    let mut buf = [0; 2];
    for unit in text.encode_utf16() {
        B::write_u16(&mut buf, unit);
        out.extend_from_slice(&buf);
    }
}

fn encode_utf32<B: ByteOrder>(text: &str, out: &mut Vec<u8>) {
    let mut buf = [0; 4];
    for ch in text.chars() {
        B::write_u32(&mut buf, ch as u32);
        out.extend_from_slice(&buf);
    }
}

fn windows_1252_char(byte: u8) -> char {
    match byte {
        0x80..=0x9F => WINDOWS_1252_HIGH[(byte - 0x80) as usize],
        _ => byte as char,
    }
}

fn windows_1252_byte(ch: char) -> u8 {
    match ch as u32 {
        0x00..=0x7F | 0xA0..=0xFF => ch as u8,
        _ => WINDOWS_1252_HIGH
            .iter()
            .position(|&c| c == ch)
            .map_or(b'?', |i| 0x80 + i as u8),
    }
}
