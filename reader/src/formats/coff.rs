//! COFF reader (Intel 80386 little-endian / Motorola 68000 big-endian).
//!
//! Ported from `COFFReader.ReadFile`. Shares the MZ-stub-chase with `pe`,
//! but the two-byte machine magic also picks the endianness used for
//! everything downstream, which PE always assumes little-endian.

use std::collections::BTreeMap;
use std::io::Write;

use crate::byte_reader::ByteReader;
use crate::endian::Endian;
use crate::error::Result;
use crate::hexdump;
use crate::options::ReadOptions;
use crate::text::TextDecoder;

use super::mz::mz_file_size;
use super::FormatReader;

pub struct CoffReader<'a> {
    data: &'a [u8],
}

impl<'a> CoffReader<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        CoffReader { data }
    }
}

fn machine(magic: &[u8]) -> Option<(&'static str, Endian, TextDecoder)> {
    match magic {
        [0x4C, 0x01] => Some(("Intel 80386", Endian::Little, TextDecoder::Cp437Full)),
        [0x01, 0x50] => Some(("Motorola 68000", Endian::Big, TextDecoder::AsciiGraphic)),
        _ => None,
    }
}

impl<'a> FormatReader for CoffReader<'a> {
    fn read_file(&mut self, options: &ReadOptions, out: &mut dyn Write) -> Result<()> {
        writeln!(out, "==== COFF format ====")?;
        let mut rd = ByteReader::new(self.data);
        rd.seek(0);
        let mut magic = rd.read(2);
        let new_header_offset = if machine(&magic).is_some() {
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
            if machine(&magic).is_none() {
                eprintln!("Error: invalid magic {magic:?} at {:#x}", rd.tell());
            }
            offset
        };
        if new_header_offset != 0 {
            writeln!(out, "- Image offset: {new_header_offset:#010x}")?;
        }
        let Some((cpu_name, endian, default_encoding)) = machine(&magic) else {
            writeln!(out, "CPU: unknown ({:#04x} {:#04x})", magic.get(0).copied().unwrap_or(0), magic.get(1).copied().unwrap_or(0))?;
            return Ok(());
        };
        writeln!(out, "CPU: {cpu_name} ({:#04x} {:#04x})", magic[0], magic[1])?;

        let section_count = rd.read_word(2, false, endian) as usize;
        writeln!(out, "Section count: {section_count}")?;
        let timestamp = rd.read_word(4, false, endian) as u32;
        if timestamp != 0 {
            writeln!(out, "Time stamp: {timestamp}")?;
        }
        let symtab_offset = rd.read_word(4, false, endian) as u32;
        let symtab_count = rd.read_word(4, false, endian) as u32;
        if symtab_offset != 0 || symtab_count != 0 {
            writeln!(out, "COFF symbol table:")?;
            writeln!(out, "- Offset: {symtab_offset:#010x}")?;
            writeln!(out, "- Count:  {symtab_count:#010x}")?;
        }
        let opthdr_length = rd.read_word(2, false, endian) as usize;
        writeln!(out, "Optional header:")?;
        writeln!(out, "- Offset: {:#010x}", new_header_offset + 0x18)?;
        writeln!(out, "- Length: {opthdr_length:#04x}")?;
        let flags = rd.read_word(2, false, endian) as u32;
        write!(out, "File flags: {flags:#06x}")?;
        if flags & 0x0001 != 0 {
            write!(out, ", stripped (non-relocatable)")?;
        }
        if flags & 0x0002 != 0 {
            write!(out, ", executable")?;
        }
        if flags & 0x0004 != 0 {
            write!(out, ", COFF line numbers removed")?;
        }
        if flags & 0x0008 != 0 {
            write!(out, ", COFF symbols removed")?;
        }
        if flags & 0x0100 != 0 {
            write!(out, ", 32-bit little endian")?;
        }
        if flags & 0x0200 != 0 {
            write!(out, ", 32-bit big endian")?;
        }
        writeln!(out)?;

        if opthdr_length >= 2 {
            let magic = rd.read_word(2, false, endian) as u32;
            if magic != 0 {
                let magic_name = match magic {
                    0x010B => "ZMAGIC",
                    _ => "unknown",
                };
                writeln!(out, "Magic: {magic_name} ({magic:#06x})")?;
            }
        }
        if opthdr_length >= 4 {
            let a = rd.read_word(1, false, endian);
            let b = rd.read_word(1, false, endian);
            if (a, b) != (0, 0) {
                writeln!(out, "Linker version: {a}.{b}")?;
            }
        }
        if opthdr_length >= 8 {
            let code_size = rd.read_word(4, false, endian) as u32;
            writeln!(out, "Total size of code sections: {code_size:#010x}")?;
        }
        if opthdr_length >= 12 {
            let data_size = rd.read_word(4, false, endian) as u32;
            writeln!(out, "Total size of data sections: {data_size:#010x}")?;
        }
        if opthdr_length >= 16 {
            let bss_size = rd.read_word(4, false, endian) as u32;
            writeln!(out, "Total size of bss sections:  {bss_size:#010x}")?;
        }
        if opthdr_length >= 20 {
            let entry = rd.read_word(4, false, endian) as u32;
            writeln!(out, "Entry: {entry:#010x}")?;
        }
        if opthdr_length >= 24 {
            let code_base = rd.read_word(4, false, endian) as u32;
            writeln!(out, "Base address of code: {code_base:#010x}")?;
        }
        if opthdr_length >= 28 {
            let data_base = rd.read_word(4, false, endian) as u32;
            writeln!(out, "Base address of data: {data_base:#010x}")?;
        }
        let mut reloc_offset = None;
        if opthdr_length >= 32 {
            let r = rd.read_word(4, false, endian) as u32;
            writeln!(out, "Relocation offset: {r:#010x}")?;
            reloc_offset = Some(r);
        }
        if opthdr_length >= 36 {
            let stack_size = rd.read_word(4, false, endian) as u32;
            writeln!(out, "Stack size: {stack_size:#010x}")?;
        }

        writeln!(out, "= Section table")?;
        rd.seek(new_header_offset + 0x14 + opthdr_length);
        let decoder = options.decoder(default_encoding);
        let mut section_offsets: Vec<Option<u32>> = Vec::with_capacity(section_count);
        let mut section_lengths = Vec::with_capacity(section_count);
        let mut section_bases = Vec::with_capacity(section_count);
        for section_number in 1..=section_count {
            let raw_name = rd.read(8);
            let end = raw_name.iter().position(|&b| b == 0).unwrap_or(raw_name.len());
            let section_name = decoder.decode(&raw_name[..end]);
            let section_p_address = rd.read_word(4, false, endian) as u32;
            let section_address = rd.read_word(4, false, endian) as u32;
            let section_length = rd.read_word(4, false, endian) as u32;
            let section_offset = rd.read_word(4, false, endian) as u32;
            let section_reloc_offset = rd.read_word(4, false, endian) as u32;
            let section_lineno_offset = rd.read_word(4, false, endian) as u32;
            let section_reloc_count = rd.read_word(2, false, endian) as u32;
            let section_lineno_count = rd.read_word(2, false, endian) as u32;
            let section_flags = rd.read_word(4, false, endian) as u32;
            writeln!(out, "Section #{section_number}: {section_name}")?;
            writeln!(out, "- Address: {section_address:#010x}")?;
            if section_p_address != 0 && section_p_address != section_address {
                writeln!(out, "- Physical: {section_p_address:#010x}")?;
            }
            if new_header_offset == 0 {
                writeln!(out, "- Offset: {section_offset:#010x}")?;
            } else {
                writeln!(
                    out,
                    "- Offset: {section_offset:#010x} ({:#010x} in file)",
                    new_header_offset as u32 + section_offset
                )?;
            }
            writeln!(out, "- Length: {section_length:#010x}")?;
            write!(out, "- Flags: {section_flags:#010x}")?;
            let mut include = false;
            if section_flags & 0x00000020 != 0 {
                write!(out, ", code")?;
                include = true;
            }
            if section_flags & 0x00000040 != 0 {
                write!(out, ", data")?;
                include = true;
            }
            if section_flags & 0x00000080 != 0 {
                write!(out, ", bss")?;
                include = false;
            }
            writeln!(out)?;
            section_offsets.push(if include { Some(section_offset) } else { None });
            section_lengths.push(section_length);
            section_bases.push(section_address);
            if section_reloc_count != 0 {
                writeln!(out, "COFF relocations:")?;
                writeln!(out, "- Offset: {section_reloc_offset:#010x}")?;
                writeln!(out, "- Count: {section_reloc_count:#06x}")?;
            }
            if section_lineno_count != 0 {
                writeln!(out, "COFF line numbers:")?;
                writeln!(out, "- Offset: {section_lineno_offset:#010x}")?;
                writeln!(out, "- Count: {section_lineno_count:#06x}")?;
            }
        }

        let mut relocs: BTreeMap<u32, usize> = BTreeMap::new();
        if options.wants_rel() {
            if let Some(reloc_offset) = reloc_offset {
                writeln!(out, "= Concurrent DOS 68K relocations")?;
                rd.seek(new_header_offset + reloc_offset as usize);
                let mut offset = 0i64;
                loop {
                    let location = rd.tell();
                    let mut displacement = rd.read_word(1, false, endian) as i64;
                    if displacement == 0 {
                        break;
                    }
                    let (size, sizename) = if displacement & 0x80 != 0 {
                        displacement |= 0x7F;
                        (2, "word")
                    } else {
                        (4, "long word")
                    };
                    if displacement == 0x7F {
                        displacement = rd.read_word(4, false, endian);
                    } else if displacement == 0x7E {
                        displacement = rd.read_word(2, false, endian);
                    } else if displacement == 0x7D {
                        displacement = rd.read_word(1, false, endian);
                    }
                    offset += displacement;
                    writeln!(out, "- [{location:#010x}] Relocation at {offset:#010x} to {sizename}")?;
                    relocs.insert(offset as u32, size);
                }
            }
        }

        if options.wants_data() {
            writeln!(out, "== Section data")?;
            for section_number in 0..section_count {
                let Some(section_offset) = section_offsets[section_number] else {
                    continue;
                };
                writeln!(out, "Section #{:#x} data", section_number + 1)?;
                let section_base = (section_bases[section_number] / 16) * 16;
                let section_file_offset = new_header_offset as i64 + section_offset as i64
                    - (section_bases[section_number] % 16) as i64;
                writeln!(out, "[FILE    ] (SECTION ) MEMORY  \tDATA")?;
                let start = (new_header_offset as u32 + section_offset) as usize;
                let end = (start + section_lengths[section_number] as usize).min(self.data.len());
                let lookup = |position: usize| relocs.get(&(section_base + position as u32)).copied();
                let rows = hexdump::dump_rows(
                    &self.data[start.min(self.data.len())..end.max(start.min(self.data.len()))],
                    (section_bases[section_number] % 16) as usize,
                    decoder,
                    Some(&lookup),
                    4,
                );
                for row in rows {
                    writeln!(
                        out,
                        "[{:08X}] ({:08X}) {:08X}\t{}\t{}",
                        section_file_offset + row.offset as i64,
                        row.offset,
                        section_base + row.offset as u32,
                        row.hex,
                        row.text
                    )?;
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
    fn machine_table() {
        assert_eq!(machine(&[0x4C, 0x01]).unwrap().0, "Intel 80386");
        assert_eq!(machine(&[0x01, 0x50]).unwrap().0, "Motorola 68000");
        assert!(machine(&[0, 0]).is_none());
    }

    #[test]
    fn stubless_i386_header_parses() {
        let mut data = vec![0u8; 0x20];
        data[0] = 0x4C;
        data[1] = 0x01;
        data[2] = 0; // section count
        data[3] = 0;
        let mut reader = CoffReader::new(&data);
        let options = ReadOptions::default();
        let mut out = Vec::new();
        reader.read_file(&options, &mut out).unwrap();
        let text = String::from_utf8(out).unwrap();
        assert!(text.contains("CPU: Intel 80386"));
        assert!(text.contains("Section count: 0"));
    }
}
