//! Amiga Hunk reader.
//!
//! Ported from `HunkReader`. The data hunk types defer their own hex
//! dump: when relocation annotation is requested the code/data bytes are
//! skipped on first pass and only dumped once the following `HUNK_END`
//! (or the relocation block in between) has populated `self.relocs`,
//! matching `last_hunk_data`/`ReadEndBlock` in the original. A stray
//! unknown hunk type aborts the whole read, same as the Python's `exit(1)`.

use std::collections::BTreeMap;
use std::io::Write;

use crate::byte_reader::ByteReader;
use crate::endian::Endian;
use crate::error::{Error, Result};
use crate::hexdump;
use crate::options::ReadOptions;
use crate::text::TextDecoder;

use super::FormatReader;

pub struct HunkReader<'a> {
    data: &'a [u8],
}

impl<'a> HunkReader<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        HunkReader { data }
    }
}

struct State {
    last_hunk_data: Option<(usize, usize)>,
    relocs: Option<BTreeMap<u32, usize>>,
}

fn read_string(rd: &mut ByteReader, decoder: TextDecoder) -> Option<String> {
    let size = rd.read_word(4, false, Endian::Big) as usize;
    if size == 0 {
        return None;
    }
    let raw = rd.read(size * 4);
    let end = raw.iter().position(|&b| b == 0).unwrap_or(raw.len());
    Some(decoder.decode(&raw[..end]))
}

fn display_data(rd: &mut ByteReader, out: &mut dyn Write, size: usize, state: &State) -> Result<()> {
    writeln!(out, "- Hunk data")?;
    let offset = rd.tell();
    let data = rd.read(size);
    let lookup = |position: usize| state.relocs.as_ref().and_then(|m| m.get(&(position as u32)).copied());
    let rows = hexdump::dump_rows(&data, 0, TextDecoder::AsciiGraphic, Some(&lookup), 4);
    for row in rows {
        writeln!(out, "[{:08X}] {:08X}\t{}\t{}", offset + row.offset, row.offset, row.hex, row.text)?;
    }
    Ok(())
}

fn read_header_block(rd: &mut ByteReader, out: &mut dyn Write, decoder: TextDecoder) -> Result<()> {
    writeln!(out, "== Header block")?;
    while let Some(library) = read_string(rd, decoder) {
        writeln!(out, "Library: {library:?}")?;
    }
    let table_size = rd.read_word(4, false, Endian::Big) as u32;
    let first_hunk = rd.read_word(4, false, Endian::Big) as u32;
    let last_hunk = rd.read_word(4, false, Endian::Big) as u32;
    writeln!(out, "Total hunk: {table_size:#010x}")?;
    writeln!(out, "First hunk: #{first_hunk:#010x}")?;
    writeln!(out, "Last hunk: #{last_hunk:#010x}")?;
    for i in first_hunk..=last_hunk {
        let hunk_size = rd.read_word(4, false, Endian::Big) as u32;
        writeln!(out, "Hunk #{i} size: {:#010x}", hunk_size * 4)?;
    }
    Ok(())
}

fn read_code_or_data_block(
    rd: &mut ByteReader,
    out: &mut dyn Write,
    hunk_type: u32,
    options: &ReadOptions,
    state: &mut State,
) -> Result<()> {
    match hunk_type {
        0x3E9 => writeln!(out, "== Code block (Motorola 68000 instructions)")?,
        0x3EA => writeln!(out, "== Data block")?,
        0x4E9 => writeln!(out, "== Code block (PowerPC instructions)")?,
        _ => {}
    }
    let size = rd.read_word(4, false, Endian::Big) as u32;
    let offset = rd.tell();
    writeln!(out, "- Offset: {offset:#010x}")?;
    writeln!(out, "- Length: {:#010x}", size * 4)?;
    if options.wants_data() {
        if !options.wants_relshow() {
            display_data(rd, out, size as usize * 4, state)?;
        } else {
            state.last_hunk_data = Some((size as usize * 4, rd.tell()));
            state.relocs = Some(BTreeMap::new());
            rd.skip((size * 4) as isize);
        }
    } else {
        rd.skip((size * 4) as isize);
    }
    Ok(())
}

fn read_bss_block(rd: &mut ByteReader, out: &mut dyn Write) -> Result<()> {
    writeln!(out, "== Bss block")?;
    let size = rd.read_word(4, false, Endian::Big) as u32;
    writeln!(out, "- Length: {:#010x}", size * 4)?;
    Ok(())
}

fn read_reloc_block(rd: &mut ByteReader, out: &mut dyn Write, hunk_type: u32, options: &ReadOptions, state: &mut State) -> Result<()> {
    if hunk_type == 0x3EC {
        writeln!(out, "== 32-bit relocations")?;
    } else {
        eprintln!("Internal error: unhandled type {hunk_type:#010x}");
    }
    loop {
        let offset_count = rd.read_word(4, false, Endian::Big) as u32;
        if offset_count == 0 {
            break;
        }
        let hunk_number = rd.read_word(4, false, Endian::Big) as u32;
        writeln!(out, "- Offsets to hunk number #{hunk_number} (number: {offset_count})")?;
        if options.rel || options.relshow || options.showall {
            for _ in 0..offset_count {
                let offset = rd.read_word(4, false, Endian::Big) as u32;
                if options.wants_rel() {
                    writeln!(out, "[{offset:08X}] 32-bit relocation at {offset:#010x} to #{hunk_number}")?;
                }
                if options.wants_relshow() {
                    if let Some(relocs) = state.relocs.as_mut() {
                        relocs.insert(offset, 4);
                    }
                }
            }
        } else {
            rd.skip((offset_count * 4) as isize);
        }
    }
    Ok(())
}

fn read_end_block(rd: &mut ByteReader, out: &mut dyn Write, options: &ReadOptions, state: &mut State) -> Result<()> {
    if ((options.data && options.relshow) || options.showall) && state.last_hunk_data.is_some() {
        let pos = rd.tell();
        let (size, data_offset) = state.last_hunk_data.take().unwrap();
        rd.seek(data_offset);
        display_data(rd, out, size, state)?;
        state.relocs = None;
        rd.seek(pos);
    }
    writeln!(out, "== End hunk")?;
    Ok(())
}

impl<'a> FormatReader for HunkReader<'a> {
    fn read_file(&mut self, options: &ReadOptions, out: &mut dyn Write) -> Result<()> {
        writeln!(out, "==== Hunk format ====")?;
        let mut rd = ByteReader::new(self.data);
        let size = self.data.len();
        let decoder = options.decoder(TextDecoder::AsciiGraphic);
        let mut state = State {
            last_hunk_data: None,
            relocs: None,
        };
        rd.seek(0);
        while rd.tell() < size {
            let hunk_type = rd.read_word(4, false, Endian::Big) as u32;
            match hunk_type {
                0x3E9 | 0x3EA | 0x4E9 => read_code_or_data_block(&mut rd, out, hunk_type, options, &mut state)?,
                0x3EB => read_bss_block(&mut rd, out)?,
                0x3EC => read_reloc_block(&mut rd, out, hunk_type, options, &mut state)?,
                0x3F2 => read_end_block(&mut rd, out, options, &mut state)?,
                0x3F3 => read_header_block(&mut rd, out, decoder)?,
                _ => {
                    eprintln!("Error: unknown hunk type ({hunk_type:#010x}), exiting");
                    return Err(Error::Malformed(format!("unknown hunk type {hunk_type:#x}")));
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_file_reads_nothing() {
        let data: Vec<u8> = Vec::new();
        let mut reader = HunkReader::new(&data);
        let options = ReadOptions::default();
        let mut out = Vec::new();
        reader.read_file(&options, &mut out).unwrap();
        assert_eq!(String::from_utf8(out).unwrap(), "==== Hunk format ====\n");
    }

    #[test]
    fn bss_block_parses() {
        let mut data = Vec::new();
        data.extend(0x3EBu32.to_be_bytes());
        data.extend(4u32.to_be_bytes());
        let mut reader = HunkReader::new(&data);
        let options = ReadOptions::default();
        let mut out = Vec::new();
        reader.read_file(&options, &mut out).unwrap();
        let text = String::from_utf8(out).unwrap();
        assert!(text.contains("Bss block"));
        assert!(text.contains("Length: 0x00000010"));
    }

    #[test]
    fn unknown_hunk_type_errors() {
        let mut data = Vec::new();
        data.extend(0xFFFFu32.to_be_bytes());
        let mut reader = HunkReader::new(&data);
        let options = ReadOptions::default();
        let mut out = Vec::new();
        assert!(reader.read_file(&options, &mut out).is_err());
    }
}
