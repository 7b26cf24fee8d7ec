//! Crate-wide error type.
//!
//! Most structural problems encountered while parsing (truncated reads,
//! out-of-range cross-references, duplicate relocations) are *not*
//! reported through this type: per the reader contract, those are warned
//! to stderr and the parse continues best-effort. `Error` is reserved for
//! conditions that make it impossible to keep going at all: an I/O
//! failure, a magic mismatch on an explicitly-selected format, or a table
//! so short it cannot even be framed.

use std::fmt;
use std::io;

#[derive(Debug)]
pub enum Error {
    Io(io::Error),
    Scroll(scroll::Error),
    BadMagic(u64),
    Malformed(String),
    BufferTooShort(usize, &'static str),
    UnimplementedFormat(&'static str),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Io(err) => write!(f, "I/O error: {err}"),
            Error::Scroll(err) => write!(f, "scroll error: {err}"),
            Error::BadMagic(magic) => write!(f, "invalid magic number: {magic:#x}"),
            Error::Malformed(msg) => write!(f, "malformed entity: {msg}"),
            Error::BufferTooShort(n, what) => {
                write!(f, "buffer too short for {n} {what}")
            }
            Error::UnimplementedFormat(name) => write!(f, "parser not implemented: {name}"),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Io(err) => Some(err),
            Error::Scroll(err) => Some(err),
            _ => None,
        }
    }
}

impl From<io::Error> for Error {
    fn from(err: io::Error) -> Self {
        Error::Io(err)
    }
}

impl From<scroll::Error> for Error {
    fn from(err: scroll::Error) -> Self {
        Error::Scroll(err)
    }
}

pub type Result<T> = std::result::Result<T, Error>;
