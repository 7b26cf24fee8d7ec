//! Human68k HU .X format reader.
//!
//! Ported from `HUReader.ReadFile`.

use std::collections::BTreeMap;
use std::io::Write;

use crate::byte_reader::ByteReader;
use crate::endian::Endian;
use crate::error::Result;
use crate::hexdump;
use crate::options::ReadOptions;
use crate::text::TextDecoder;

use super::FormatReader;

pub struct HuReader<'a> {
    data: &'a [u8],
}

impl<'a> HuReader<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        HuReader { data }
    }
}

fn loadmode_name(mode: u32) -> &'static str {
    match mode {
        0 => "normal",
        1 => "smallest",
        2 => "high",
        _ => "unknown",
    }
}

impl<'a> FormatReader for HuReader<'a> {
    fn read_file(&mut self, options: &ReadOptions, out: &mut dyn Write) -> Result<()> {
        writeln!(out, "==== Human68k HU .X format ====")?;
        let mut rd = ByteReader::new(self.data);
        rd.seek(0);
        let magic = rd.read(2);
        if magic != b"HU" {
            eprintln!("Error: invalid magic {magic:?} at {:#x}", rd.tell());
        }

        rd.skip(1);
        let loadmode = rd.read_word(1, false, Endian::Big) as u32;
        writeln!(out, "Load mode: {} ({loadmode:#04x})", loadmode_name(loadmode))?;
        let textbase = rd.read_word(4, false, Endian::Big) as u32;
        let entry = rd.read_word(4, false, Endian::Big) as u32;
        writeln!(out, "PC = {entry:#010x}")?;
        let textsize = rd.read_word(4, false, Endian::Big) as u32;
        let datasize = rd.read_word(4, false, Endian::Big) as u32;
        let bsssize = rd.read_word(4, false, Endian::Big) as u32;
        let relocsize = rd.read_word(4, false, Endian::Big) as u32;
        let symtabsize = rd.read_word(4, false, Endian::Big) as u32;
        let scd_lineno_size = rd.read_word(4, false, Endian::Big) as u32;
        let scd_symtab_size = rd.read_word(4, false, Endian::Big) as u32;
        let scd_strtab_size = rd.read_word(4, false, Endian::Big) as u32;
        rd.skip(16);
        let bml_offset = rd.read_word(4, false, Endian::Big) as u32;

        writeln!(out, "Text segment:")?;
        writeln!(out, "- Offset: {:#010x}", 0x40u32)?;
        writeln!(out, "- Length: {textsize:#010x}")?;
        writeln!(out, "- Address: {textbase:#010x}")?;
        writeln!(out, "Data segment:")?;
        writeln!(out, "- Offset: {:#010x}", 0x40 + textsize)?;
        writeln!(out, "- Length: {datasize:#010x}")?;
        writeln!(out, "- Address: {:#010x}", textbase + textsize)?;
        writeln!(out, "Bss segment:")?;
        writeln!(out, "- Length: {bsssize:#010x}")?;
        writeln!(out, "- Address: {:#010x}", textbase + textsize + datasize)?;
        if relocsize != 0 {
            writeln!(out, "Relocation table:")?;
            writeln!(out, "- Offset: {:#010x}", 0x40 + textsize + datasize)?;
            writeln!(out, "- Length: {relocsize:#010x}")?;
        }
        if symtabsize != 0 {
            writeln!(out, "Symbol table:")?;
            writeln!(out, "- Offset: {:#010x}", 0x40 + textsize + datasize + relocsize)?;
            writeln!(out, "- Length: {symtabsize:#010x}")?;
        }

        if scd_lineno_size != 0 || scd_symtab_size != 0 || scd_strtab_size != 0 {
            writeln!(out, "SCD line number table size: {scd_lineno_size:#010x}")?;
            writeln!(out, "SCD symbol table size: {scd_symtab_size:#010x}")?;
            writeln!(out, "SCD string table size: {scd_strtab_size:#010x}")?;
        }

        if bml_offset != 0 {
            writeln!(out, "Bound module list offset: {bml_offset:#010x}")?;
        }

        let mut relocs: BTreeMap<u32, usize> = BTreeMap::new();
        if options.wants_rel() {
            writeln!(out, "== Fixups ==")?;
            rd.seek((0x40 + textsize + datasize) as usize);
            let mut offset = 0u32;
            let mut count = 0u32;
            while count < relocsize {
                let mut word = rd.read_word(2, false, Endian::Big) as u32;
                count += 2;
                if word == 1 {
                    word = rd.read_word(4, false, Endian::Big) as u32;
                    count += 4;
                }
                let (size, sizename) = if word & 1 != 0 {
                    word &= !1;
                    (2, "word")
                } else {
                    (4, "long word")
                };
                offset += word;
                writeln!(out, "- {offset:#010x}: {sizename}")?;
                relocs.insert(offset, size);
            }
        }

        if options.wants_data() {
            let decoder = options.decoder(TextDecoder::AsciiGraphic);
            writeln!(out, "== Text segment ==")?;
            writeln!(out, "[FILE    ] (SEGMENT ) MEMORY  \tDATA")?;
            let start = 0x40usize.min(self.data.len());
            let end = (0x40 + textsize as usize).min(self.data.len());
            let lookup = |position: usize| relocs.get(&(position as u32)).copied();
            let rows = hexdump::dump_rows(&self.data[start..end.max(start)], 0, decoder, Some(&lookup), 4);
            for row in &rows {
                writeln!(
                    out,
                    "[{:08X}] ({:08X}) {:08X}\t{}\t{}",
                    0x40 + row.offset,
                    row.offset,
                    textbase + row.offset as u32,
                    row.hex,
                    row.text
                )?;
            }

            writeln!(out, "== Data segment ==")?;
            writeln!(out, "[FILE    ] (SEGMENT ) MEMORY  \tDATA")?;
            let current_offset = (textsize % 16) as usize;
            let segment_offset = 0x40 + textsize as usize - current_offset;
            let segment_base = textbase + textsize - current_offset as u32;
            let start = segment_offset.min(self.data.len());
            let end = (0x40 + textsize as usize + datasize as usize).min(self.data.len());
            let lookup2 = |position: usize| relocs.get(&(textsize + position as u32)).copied();
            let rows = hexdump::dump_rows(&self.data[start..end.max(start)], current_offset, decoder, Some(&lookup2), 4);
            for row in &rows {
                writeln!(
                    out,
                    "[{:08X}] ({:08X}) {:08X}\t{}\t{}",
                    segment_offset + row.offset,
                    row.offset,
                    segment_base + row.offset as u32,
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
    fn loadmode_names() {
        assert_eq!(loadmode_name(0), "normal");
        assert_eq!(loadmode_name(2), "high");
        assert_eq!(loadmode_name(9), "unknown");
    }

    #[test]
    fn minimal_header_parses() {
        let mut data = vec![0u8; 0x40];
        data[0] = b'H';
        data[1] = b'U';
        let mut reader = HuReader::new(&data);
        let options = ReadOptions::default();
        let mut out = Vec::new();
        reader.read_file(&options, &mut out).unwrap();
        let text = String::from_utf8(out).unwrap();
        assert!(text.contains("Load mode: normal"));
        assert!(text.contains("Text segment:"));
    }
}
