//! Reader library for historical and contemporary executable-file formats.
//!
//! A [`formats::Format`] names a concrete reader; [`magic::detect`]
//! guesses one from a file's leading bytes when the caller hasn't named
//! one explicitly (see the `dump` binary crate). Every reader implements
//! [`formats::FormatReader`] and writes plain text to a caller-supplied
//! sink — there is no structured return value, matching the line-oriented
//! dump format this crate reproduces.

pub mod byte_reader;
pub mod endian;
pub mod error;
pub mod formats;
pub mod hexdump;
pub mod magic;
pub mod options;
pub mod pybytes;
pub mod reloc_map;
pub mod text;

pub use error::{Error, Result};
pub use options::ReadOptions;
