//! MINIX a.out reader.
//!
//! Ported from `MINIXAOutReader.ReadFile`. The CPU byte's low two bits
//! select the endianness for everything that follows it, the one quirk
//! that makes this format distinct from plain a.out.

use std::io::Write;

use crate::byte_reader::ByteReader;
use crate::endian::Endian;
use crate::error::Result;
use crate::hexdump;
use crate::options::ReadOptions;
use crate::text::TextDecoder;

use super::FormatReader;

pub struct MinixReader<'a> {
    data: &'a [u8],
}

impl<'a> MinixReader<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        MinixReader { data }
    }
}

fn cpu_name(cpu: u32) -> &'static str {
    match cpu {
        0x04 => "Intel 8086",
        0x0B => "Motorola 68000",
        0x0C => "NS32000 (16032)",
        0x10 => "Intel 80386",
        0x17 => "SPARC",
        _ => "unknown",
    }
}

impl<'a> FormatReader for MinixReader<'a> {
    fn read_file(&mut self, options: &ReadOptions, out: &mut dyn Write) -> Result<()> {
        writeln!(out, "==== MINIX a.out format ====")?;
        let mut rd = ByteReader::new(self.data);
        rd.seek(2);
        let flags = rd.read_word(1, false, Endian::Little) as u32;
        let cpu = rd.read_word(1, false, Endian::Little) as u32;
        let endian = match cpu & 3 {
            0 => Endian::Little,
            1 => Endian::AntiPdp11,
            2 => Endian::Pdp11,
            _ => Endian::Big,
        };
        writeln!(out, "CPU: {} ({cpu:#04x})", cpu_name(cpu))?;
        write!(out, "Flags: {flags:#04x}")?;
        if flags & 0x01 != 0 {
            write!(out, ", unmapped zero page")?;
        }
        if flags & 0x02 != 0 {
            write!(out, ", page aligned executable")?;
        }
        if flags & 0x04 != 0 {
            write!(out, ", new symbol table")?;
        }
        if flags & 0x10 != 0 {
            write!(out, ", executable")?;
        }
        if flags & 0x20 != 0 {
            write!(out, ", separate code/data")?;
        }
        if flags & 0x40 != 0 {
            write!(out, ", pure text")?;
        }
        if flags & 0x80 != 0 {
            write!(out, ", text overlay")?;
        }
        writeln!(out)?;

        let header_size = rd.read_word(1, false, endian) as u32;
        rd.skip(1);

        let version = if header_size >= 8 {
            let a = rd.read_word(1, false, endian);
            let b = rd.read_word(1, false, endian);
            writeln!(out, "Header length: {header_size:#04x}")?;
            Some((a, b))
        } else {
            None
        };
        if let Some((a, b)) = version {
            if (a, b) != (0, 0) {
                writeln!(out, "Version: {a}.{b} (TODO: order)")?;
            }
        }

        let code_size = if header_size >= 12 { rd.read_word(4, false, endian) as u32 } else { 0 };
        let data_size = if header_size >= 16 { rd.read_word(4, false, endian) as u32 } else { 0 };
        let bss_size = if header_size >= 20 { rd.read_word(4, false, endian) as u32 } else { 0 };
        let entry = if header_size >= 24 { rd.read_word(4, false, endian) as u32 } else { 0 };
        let total_size = if header_size >= 28 { rd.read_word(4, false, endian) as u32 } else { 0 };
        let symtab_size = if header_size >= 32 { rd.read_word(4, false, endian) as u32 } else { 0 };
        let code_relsize = if header_size >= 36 { rd.read_word(4, false, endian) as u32 } else { 0 };
        let data_relsize = if header_size >= 40 { rd.read_word(4, false, endian) as u32 } else { 0 };
        let code_base = if header_size >= 44 { rd.read_word(4, false, endian) as u32 } else { 0 };
        let data_base = if header_size >= 48 {
            rd.read_word(4, false, endian) as u32
        } else if flags & 0x20 != 0 {
            0
        } else {
            code_base.wrapping_add(code_size)
        };

        writeln!(out, "Code segment:")?;
        writeln!(out, "- Offset: {header_size:#010x}")?;
        writeln!(out, "- Length: {code_size:#010x}")?;
        writeln!(out, "- Address: {code_base:#010x}")?;
        if code_relsize != 0 {
            writeln!(out, "- Relocations length: {code_relsize:#010x}")?;
        }

        writeln!(out, "Data segment:")?;
        writeln!(out, "- Offset: {:#010x}", header_size + code_size)?;
        writeln!(out, "- Length: {data_size:#010x}")?;
        writeln!(out, "- Address: {data_base:#010x}")?;
        if data_relsize != 0 {
            writeln!(out, "- Relocations length: {data_relsize:#010x}")?;
        }

        writeln!(out, "Bss segment:")?;
        writeln!(out, "- Length: {bss_size:#010x}")?;
        writeln!(out, "- Address: {:#010x}", data_base + data_size)?;

        writeln!(out, "Symbol table:")?;
        writeln!(out, "- Offset: {:#010x}", header_size + code_size + data_size)?;
        writeln!(out, "- Length: {symtab_size:#010x}")?;

        writeln!(out, "Entry: {entry:#010x}")?;
        writeln!(out, "Total memory: {total_size:#010x}")?;

        if options.wants_data() {
            let decoder = options.decoder(TextDecoder::Cp437Full);
            writeln!(out, "== Code data")?;
            writeln!(out, "[FILE    ] (SEGMENT ) MEMORY  \tDATA")?;
            let section_base = (code_base / 16) * 16;
            let section_offset = header_size as i64 - (code_base % 16) as i64;
            let start = header_size as usize;
            let end = (start + code_size as usize).min(self.data.len());
            let rows = hexdump::dump_rows(&self.data[start.min(self.data.len())..end.max(start.min(self.data.len()))], (code_base % 16) as usize, decoder, None, 0);
            for row in &rows {
                writeln!(
                    out,
                    "[{:08X}] ({:08X}) {:08X}\t{}\t{}",
                    (section_offset + row.offset as i64) as i64,
                    row.offset,
                    section_base + row.offset as u32,
                    row.hex,
                    row.text
                )?;
            }

            writeln!(out, "== Data data")?;
            writeln!(out, "[FILE    ] (SEGMENT ) MEMORY  \tDATA")?;
            let section_base = (data_base / 16) * 16;
            let section_offset = (header_size + code_size) as i64 - (data_base % 16) as i64;
            let start = (header_size + code_size) as usize;
            let end = (start + data_size as usize).min(self.data.len());
            let rows = hexdump::dump_rows(&self.data[start.min(self.data.len())..end.max(start.min(self.data.len()))], (data_base % 16) as usize, decoder, None, 0);
            for row in &rows {
                writeln!(
                    out,
                    "[{:08X}] ({:08X}) {:08X}\t{}\t{}",
                    section_offset + row.offset as i64,
                    row.offset,
                    section_base + row.offset as u32,
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
    fn cpu_endianness_table() {
        assert_eq!(cpu_name(0x10), "Intel 80386");
        assert_eq!(cpu_name(0xFF), "unknown");
    }

    #[test]
    fn minimal_header_parses() {
        let mut data = vec![0u8; 48];
        data[2] = 0x10; // flags: executable
        data[3] = 0x10; // cpu: 80386, little endian
        data[4] = 32; // header_size
        let mut reader = MinixReader::new(&data);
        let options = ReadOptions::default();
        let mut out = Vec::new();
        reader.read_file(&options, &mut out).unwrap();
        let text = String::from_utf8(out).unwrap();
        assert!(text.contains("CPU: Intel 80386"));
        assert!(text.contains("Header length: 0x20"));
    }
}
