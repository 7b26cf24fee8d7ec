//! 32-bit a.out reader (djgpp/pdos32 little-endian variants).
//!
//! Ported from `AOutReader.ReadFile`. djgpp's ZMAGIC image gets the same
//! "stub page rounds the header up" special case the Python carries as a
//! `TODO: others` comment; we keep only the two systems it actually
//! implements.

use std::io::Write;

use crate::byte_reader::ByteReader;
use crate::endian::Endian;
use crate::error::Result;
use crate::hexdump;
use crate::options::ReadOptions;
use crate::text::TextDecoder;

use super::mz::mz_file_size;
use super::FormatReader;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum System {
    Djgpp,
    Pdos32,
}

pub struct AOutReader<'a> {
    data: &'a [u8],
    system: System,
}

impl<'a> AOutReader<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        AOutReader {
            data,
            system: System::Djgpp,
        }
    }

    pub fn with_system(data: &'a [u8], system: System) -> Self {
        AOutReader { data, system }
    }
}

fn magic_name(magic: &[u8]) -> Option<&'static str> {
    match magic {
        [0x07, 0x01] => Some("OMAGIC (impure)"),
        [0x08, 0x01] => Some("NMAGIC (pure)"),
        [0x0B, 0x01] => Some("ZMAGIC (demand-paged)"),
        [0xCC, 0x00] => Some("QMAGIC (demand-paged)"),
        _ => None,
    }
}

fn is_valid_magic(magic: &[u8]) -> bool {
    matches!(magic, [0x07, 0x01] | [0x08, 0x01] | [0x0B, 0x01] | [0xCC, 0x00])
}

impl<'a> FormatReader for AOutReader<'a> {
    fn read_file(&mut self, options: &ReadOptions, out: &mut dyn Write) -> Result<()> {
        writeln!(out, "==== 32-bit a.out format ====")?;
        let mut rd = ByteReader::new(self.data);
        rd.seek(0);
        let mut magic = rd.read(2);
        let new_header_offset = if is_valid_magic(&magic) {
            0usize
        } else {
            if magic != b"MZ" {
                eprintln!("Error: invalid stub magic {magic:?}");
            }
            let last_page_bytes = rd.read_word(2, false, Endian::Little) as u32;
            let pages = rd.read_word(2, false, Endian::Little) as u32;
            let offset = mz_file_size(pages, last_page_bytes) as usize;
            rd.seek(offset);
            magic = rd.read(2);
            if !is_valid_magic(&magic) {
                eprintln!("Error: invalid magic {magic:?} at {:#x}", rd.tell());
            }
            offset
        };
        if new_header_offset != 0 {
            writeln!(out, "- Image offset: {new_header_offset:#010x}")?;
        }
        let name = magic_name(&magic).unwrap_or("unknown");
        writeln!(out, "Magic number: {name} ({:#06x})", u16::from_le_bytes([magic[0], magic[1]]))?;

        let cpu = rd.read_word(1, false, Endian::Little) as u32;
        let cpu_name = match cpu {
            0x64 => "Intel 80386",
            _ => "unknown",
        };
        writeln!(out, "CPU: {cpu_name} ({cpu:#04x})")?;
        rd.skip(1);
        let textsize = rd.read_word(4, false, Endian::Little) as u32;
        let datasize = rd.read_word(4, false, Endian::Little) as u32;
        let bsssize = rd.read_word(4, false, Endian::Little) as u32;
        let symtabsize = rd.read_word(4, false, Endian::Little) as u32;
        let entry = rd.read_word(4, false, Endian::Little) as u32;
        let _trsize = rd.read_word(4, false, Endian::Little) as u32;
        let _drsize = rd.read_word(4, false, Endian::Little) as u32;

        writeln!(out, "Entry: {entry:#010x}")?;
        writeln!(out, "Text")?;
        writeln!(out, "- Offset: {:#010x}", new_header_offset as u32 + 32)?;
        writeln!(out, "- Length: {textsize:#010x}")?;
        writeln!(out, "Data")?;
        writeln!(out, "- Offset: {:#010x}", new_header_offset as u32 + 32 + textsize)?;
        writeln!(out, "- Length: {datasize:#010x}")?;
        writeln!(out, "Bss")?;
        writeln!(out, "- Length: {bsssize:#010x}")?;
        if symtabsize != 0 {
            writeln!(out, "Symbol table")?;
            writeln!(out, "- Offset: {:#010x}", new_header_offset as u32 + 32 + textsize + datasize)?;
        }

        if options.wants_data() {
            writeln!(out, "= Text segment")?;
            writeln!(out, "[FILE    ] (SEGMENT ) MEMORY  \tDATA")?;
            let decoder = TextDecoder::AsciiGraphic;
            let (textbase, textoffset, textsize_adj) = if self.system == System::Djgpp && magic == [0x0B, 0x01] {
                let mut base = 0u32;
                if entry >= 0x1000 {
                    base += 0x1000;
                }
                (base, new_header_offset, textsize + 32)
            } else {
                (0u32, rd.tell(), textsize)
            };
            rd.seek(textoffset);
            let start = textoffset.min(self.data.len());
            let end = (textoffset + textsize_adj as usize).min(self.data.len());
            let rows = hexdump::dump_rows(&self.data[start..end.max(start)], 0, decoder, None, 0);
            for row in &rows {
                writeln!(
                    out,
                    "[{:08X}] ({:08X}) {:08X}\t{}\t{}",
                    textoffset + row.offset,
                    row.offset,
                    textbase + row.offset as u32,
                    row.hex,
                    row.text
                )?;
            }

            writeln!(out, "= Data segment")?;
            writeln!(out, "[FILE    ] (SEGMENT ) MEMORY  \tDATA")?;
            let (database, dataoffset) = if self.system == System::Djgpp && magic == [0x0B, 0x01] {
                let database = (textbase + textsize_adj + 0x3FFFFF) & !0x3FFFFF;
                let dataoffset =
                    ((textoffset.wrapping_sub(new_header_offset) + textsize_adj as usize + 0xFFF) & !0xFFF)
                        + new_header_offset;
                (database, dataoffset)
            } else {
                (textbase + textsize_adj, textoffset + textsize_adj as usize)
            };
            let start = dataoffset.min(self.data.len());
            let end = (dataoffset + datasize as usize).min(self.data.len());
            let rows = hexdump::dump_rows(&self.data[start..end.max(start)], 0, decoder, None, 0);
            for row in &rows {
                writeln!(
                    out,
                    "[{:08X}] ({:08X}) {:08X}\t{}\t{}",
                    dataoffset + row.offset,
                    row.offset,
                    database + row.offset as u32,
                    row.hex,
                    row.text
                )?;
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn magic_names() {
        assert_eq!(magic_name(&[0x0B, 0x01]), Some("ZMAGIC (demand-paged)"));
        assert_eq!(magic_name(&[0xCC, 0x00]), Some("QMAGIC (demand-paged)"));
        assert_eq!(magic_name(&[0x00, 0x00]), None);
    }

    #[test]
    fn stubless_header_parses() {
        let mut data = vec![0u8; 32];
        data[0] = 0x0B;
        data[1] = 0x01;
        data[2] = 0x64; // cpu
        data[32 - 28..].copy_from_slice(&[0u8; 0]); // no-op, keep header size obvious
        data[8..12].copy_from_slice(&0x100u32.to_le_bytes()); // textsize
        let mut reader = AOutReader::new(&data);
        let options = ReadOptions::default();
        let mut out = Vec::new();
        reader.read_file(&options, &mut out).unwrap();
        let text = String::from_utf8(out).unwrap();
        assert!(text.contains("Magic number: ZMAGIC (demand-paged)"));
        assert!(text.contains("CPU: Intel 80386"));
    }
}
