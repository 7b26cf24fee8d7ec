//! CP/M-68K family reader: CP/M-68K, GEMDOS, Human68k, Concurrent DOS 68K.
//!
//! Ported from `CPM68KReader.ReadFile`. One struct covers all four
//! systems named in `sys` there; `Variant` plays that role here and is
//! also the type `formats::variant_of` returns to pick a reader.

use std::collections::BTreeMap;
use std::io::Write;

use crate::byte_reader::ByteReader;
use crate::endian::Endian;
use crate::error::Result;
use crate::hexdump;
use crate::options::ReadOptions;
use crate::text::TextDecoder;

use super::FormatReader;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Variant {
    CpmContiguous,
    Gemdos,
    Human68k,
    ConcurrentDos68k,
}

pub struct Cpm68kReader<'a> {
    data: &'a [u8],
    variant: Variant,
}

impl<'a> Cpm68kReader<'a> {
    pub fn new(data: &'a [u8], variant: Variant) -> Self {
        Cpm68kReader { data, variant }
    }
}

impl<'a> FormatReader for Cpm68kReader<'a> {
    fn read_file(&mut self, options: &ReadOptions, out: &mut dyn Write) -> Result<()> {
        writeln!(out, "==== CP/M-68K format ====")?;
        let mut rd = ByteReader::new(self.data);
        rd.seek(0);
        let magic = rd.read_word(2, false, Endian::Big) as u32;
        let valid = matches!(magic, 0x601A | 0x601B | 0x601C)
            && !(magic == 0x601B && self.variant != Variant::CpmContiguous)
            && !(magic == 0x601C && self.variant != Variant::ConcurrentDos68k);
        if !valid {
            eprintln!("Error: invalid magic {magic:#06x} at {:#x}", rd.tell());
        }

        let default_encoding = if self.variant == Variant::Gemdos {
            TextDecoder::StFull
        } else {
            TextDecoder::AsciiGraphic
        };
        let decoder = options.decoder(default_encoding);

        let textsize = rd.read_word(4, false, Endian::Big) as u32;
        let datasize = rd.read_word(4, false, Endian::Big) as u32;
        let bsssize = rd.read_word(4, false, Endian::Big) as u32;
        let symtabsize = rd.read_word(4, false, Endian::Big) as u32;
        let _stacksize = rd.read_word(4, false, Endian::Big) as u32;
        let mut textbase = rd.read_word(4, false, Endian::Big) as u32;
        let noreloc_raw = rd.read_word(2, false, Endian::Big) as u32;
        let mut noreloc = noreloc_raw;
        if self.variant == Variant::Human68k && noreloc_raw != 0xFFFF {
            eprintln!("Error: Expected 0xFFFF at offset 0x1A, received {noreloc_raw:#06x}");
            noreloc = 0xFFFF;
        }
        if self.variant == Variant::Gemdos {
            let prgflags = textbase;
            textbase = 0;
            write!(out, "Program flags: {prgflags:#010x}")?;
            writeln!(out)?;
        }
        let (database, bssbase, textoffset) = if magic == 0x601B {
            let database = rd.read_word(4, false, Endian::Big) as u32;
            let bssbase = rd.read_word(4, false, Endian::Big) as u32;
            (database, bssbase, 0x24usize)
        } else {
            let database = textbase + textsize;
            let bssbase = database + datasize;
            (database, bssbase, 0x1Cusize)
        };
        let dataoffset = textoffset + textsize as usize;
        let symtaboffset = dataoffset + datasize as usize;
        let fixupoffset = symtaboffset + symtabsize as usize;

        writeln!(out, "Text segment:")?;
        writeln!(out, "- Offset: {textoffset:#010x}")?;
        writeln!(out, "- Length: {textsize:#010x}")?;
        if self.variant != Variant::Gemdos {
            writeln!(out, "- Address: {textbase:#010x}")?;
        }
        writeln!(out, "Data segment:")?;
        writeln!(out, "- Offset: {dataoffset:#010x}")?;
        writeln!(out, "- Length: {datasize:#010x}")?;
        if self.variant != Variant::Gemdos {
            writeln!(out, "- Address: {database:#010x}")?;
        }
        writeln!(out, "Bss segment:")?;
        writeln!(out, "- Length: {bsssize:#010x}")?;
        if self.variant != Variant::Gemdos {
            writeln!(out, "- Address: {bssbase:#010x}")?;
        }
        if self.variant != Variant::Human68k {
            writeln!(out, "Symbol table:")?;
            writeln!(out, "- Offset: {symtaboffset:#010x}")?;
            writeln!(out, "- Length: {symtabsize:#010x}")?;
        } else if symtabsize != 0 {
            writeln!(out, "Reserved field - Symbol table size: {symtabsize:#010x}")?;
        }
        if noreloc == 0 {
            writeln!(out, "Fixup information:")?;
            writeln!(out, "- Offset: {fixupoffset:#010x}")?;
        }

        let mut relocs: BTreeMap<u32, usize> = BTreeMap::new();
        let show_relocs = options.wants_rel();
        if (show_relocs || options.wants_relshow()) && noreloc == 0 {
            if show_relocs {
                writeln!(out, "== Fixups ==")?;
            }
            rd.seek(fixupoffset);
            if self.variant == Variant::Gemdos {
                let mut offset = rd.read_word(4, false, Endian::Big) as u32;
                relocs.insert(offset, 4);
                if show_relocs {
                    writeln!(out, "Fixup longword at {offset:#010x}")?;
                }
                loop {
                    let delta = rd.read_word(1, false, Endian::Big) as u32;
                    if delta == 0 {
                        break;
                    } else if delta == 1 {
                        // only this exact value means "skip 254, no fixup here"
                        offset += 254;
                    } else {
                        offset += delta;
                        relocs.insert(offset, 4);
                        if show_relocs {
                            writeln!(out, "Fixup longword at {offset:#010x}")?;
                        }
                    }
                }
            } else if magic != 0x601C {
                let mut size = 2usize;
                let mut sizename = "word";
                let total = textsize + datasize;
                let mut offset = 0u32;
                while offset < total {
                    let word = rd.read_word(2, false, Endian::Big) as u32;
                    let mut name = None;
                    match word & 7 {
                        1 => name = Some("data"),
                        2 => name = Some("text"),
                        3 => name = Some("bss"),
                        4 => {
                            if show_relocs {
                                writeln!(
                                    out,
                                    "- {:#010x}: {sizename} to undefined symbol",
                                    offset + 2 - size as u32
                                )?;
                            }
                        }
                        5 => {
                            size = 4;
                            sizename = "long word";
                            offset += 2;
                            continue;
                        }
                        _ => {}
                    }
                    if let Some(name) = name {
                        if show_relocs {
                            writeln!(out, "- {:#010x}: {sizename} to {name}", offset + 2 - size as u32)?;
                        }
                        relocs.insert(offset + 2 - size as u32, size);
                    }
                    size = 2;
                    sizename = "word";
                    offset += 2;
                }
            }
        }

        if options.wants_data() {
            writeln!(out, "== Text segment ==")?;
            writeln!(out, "[FILE    ] (SEGMENT ) MEMORY  \tDATA")?;
            rd.seek(textoffset);
            let start = textoffset.min(self.data.len());
            let end = (textoffset + textsize as usize).min(self.data.len());
            let lookup = |position: usize| relocs.get(&(position as u32)).copied();
            let reloc_lookup: Option<&dyn Fn(usize) -> Option<usize>> =
                if options.wants_relshow() { Some(&lookup) } else { None };
            let rows = hexdump::dump_rows(&self.data[start..end.max(start)], 0, decoder, reloc_lookup, 4);
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

            writeln!(out, "== Data segment ==")?;
            writeln!(out, "[FILE    ] (SEGMENT ) MEMORY  \tDATA")?;
            let current_offset = (textsize % 16) as usize;
            let segment_offset = dataoffset - current_offset;
            let segment_base = database - current_offset as u32;
            let start = segment_offset.min(self.data.len());
            let end = (dataoffset + datasize as usize).min(self.data.len());
            let lookup2 = |position: usize| relocs.get(&(textsize + position as u32)).copied();
            let reloc_lookup2: Option<&dyn Fn(usize) -> Option<usize>> =
                if options.wants_relshow() { Some(&lookup2) } else { None };
            let rows = hexdump::dump_rows(&self.data[start..end.max(start)], current_offset, decoder, reloc_lookup2, 4);
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
    fn variant_gates_symbol_table_line() {
        assert_ne!(Variant::Human68k, Variant::Gemdos);
    }

    #[test]
    fn gemdos_header_parses() {
        let mut data = vec![0u8; 0x24];
        data[0] = 0x60;
        data[1] = 0x1A;
        data[16..20].copy_from_slice(&0u32.to_be_bytes()); // prgflags / textbase slot
        data[20..22].copy_from_slice(&0xFFFFu16.to_be_bytes());
        let mut reader = Cpm68kReader::new(&data, Variant::Gemdos);
        let options = ReadOptions::default();
        let mut out = Vec::new();
        reader.read_file(&options, &mut out).unwrap();
        let text = String::from_utf8(out).unwrap();
        assert!(text.contains("Program flags: 0x00000000"));
        assert!(text.contains("Text segment:"));
    }
}
