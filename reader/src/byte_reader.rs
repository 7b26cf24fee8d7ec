//! Seekable cursor over an in-memory file image.
//!
//! Modeled after the cursor discipline `goblin::pe` uses around `scroll`'s
//! `Pread`/`gread`: every format reader holds one `ByteReader` and advances
//! it explicitly, saving and restoring position around cross-reference
//! lookups (name tables, hint/name tables) rather than threading a fresh
//! offset through every call.

use crate::endian::Endian;
use log::warn;

/// Cursor over a byte buffer with short-read tolerance.
///
/// A `read` past the end of the buffer does not error: it returns the
/// available bytes zero-padded to the requested length and logs a warning,
/// matching the reader's best-effort philosophy (see `error` module docs).
pub struct ByteReader<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> ByteReader<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        ByteReader { data, pos: 0 }
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn data(&self) -> &'a [u8] {
        self.data
    }

    pub fn tell(&self) -> usize {
        self.pos
    }

    pub fn seek(&mut self, absolute: usize) {
        self.pos = absolute;
    }

    pub fn skip(&mut self, delta: isize) {
        self.pos = (self.pos as isize + delta).max(0) as usize;
    }

    /// Seek relative to end of buffer; `delta` is typically zero or negative.
    pub fn seek_end(&mut self, delta: isize) {
        self.pos = (self.data.len() as isize + delta).max(0) as usize;
    }

    /// Read `n` bytes, advancing the cursor. Short reads are zero-padded
    /// and logged rather than treated as fatal.
    pub fn read(&mut self, n: usize) -> Vec<u8> {
        let start = self.pos.min(self.data.len());
        let end = (start + n).min(self.data.len());
        let mut out = vec![0u8; n];
        out[..end - start].copy_from_slice(&self.data[start..end]);
        if end - start < n {
            warn!(
                "short read at offset {:#x}: wanted {} bytes, got {}",
                start,
                n,
                end - start
            );
        }
        self.pos = start + n;
        out
    }

    /// Read and interpret `n` bytes (1, 2, 3, 4 or 8) as an integer under
    /// `endian`, optionally sign-extended.
    pub fn read_word(&mut self, n: usize, signed: bool, endian: Endian) -> i64 {
        let bytes = self.read(n);
        Self::parse_word(&bytes, signed, endian)
    }

    /// Interpret an already-read byte slice as an integer under `endian`.
    /// Widths 1, 2, 4, 8 go through the native decoder; width 3 is
    /// assembled byte by byte the same way the rest are.
    pub fn parse_word(bytes: &[u8], signed: bool, endian: Endian) -> i64 {
        endian.parse_word(bytes, signed)
    }

    /// Read bytes up to (not including) the next zero byte, or end of
    /// buffer, advancing the cursor past the terminator if one was found.
    pub fn read_to_zero(&mut self) -> Vec<u8> {
        let start = self.pos.min(self.data.len());
        let rest = &self.data[start..];
        match rest.iter().position(|&b| b == 0) {
            Some(zero_pos) => {
                self.pos = start + zero_pos + 1;
                rest[..zero_pos].to_vec()
            }
            None => {
                self.pos = self.data.len();
                rest.to_vec()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn short_read_is_zero_padded() {
        let data = [1u8, 2, 3];
        let mut reader = ByteReader::new(&data);
        reader.seek(1);
        let bytes = reader.read(4);
        assert_eq!(bytes, vec![2, 3, 0, 0]);
        assert_eq!(reader.tell(), 5);
    }

    #[test]
    fn seek_skip_seek_end() {
        let data = [0u8; 16];
        let mut reader = ByteReader::new(&data);
        reader.seek(4);
        reader.skip(2);
        assert_eq!(reader.tell(), 6);
        reader.seek_end(0);
        assert_eq!(reader.tell(), 16);
        reader.seek_end(-4);
        assert_eq!(reader.tell(), 12);
    }

    #[test]
    fn skip_does_not_go_negative() {
        let data = [0u8; 4];
        let mut reader = ByteReader::new(&data);
        reader.skip(-10);
        assert_eq!(reader.tell(), 0);
    }

    #[test]
    fn read_to_zero_stops_at_nul() {
        let data = [b'a', b'b', 0, b'c'];
        let mut reader = ByteReader::new(&data);
        assert_eq!(reader.read_to_zero(), vec![b'a', b'b']);
        assert_eq!(reader.tell(), 3);
        assert_eq!(reader.read_to_zero(), vec![b'c']);
    }

    #[test]
    fn width_three_assembly_little_endian() {
        let bytes = [0x01u8, 0x02, 0x03];
        assert_eq!(ByteReader::parse_word(&bytes, false, Endian::Little), 0x030201);
    }

    #[test]
    fn cursor_save_restore_pattern() {
        let data = [0u8; 32];
        let mut reader = ByteReader::new(&data);
        reader.seek(20);
        let saved = reader.tell();
        reader.seek(4);
        let _ = reader.read(8);
        reader.seek(saved);
        assert_eq!(reader.tell(), 20);
    }
}
