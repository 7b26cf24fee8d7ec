//! AppleSingle/AppleDouble container reader.
//!
//! Ported from `AppleReader.ReadFile`. An unrecognized magic falls back
//! to treating the whole file as a bare Macintosh resource fork, and a
//! "Resource Fork" entry recurses into [`super::macrsrc::MacRsrcReader`]
//! at that entry's offset — both exactly as in the original.

use std::collections::HashSet;
use std::io::Write;

use crate::byte_reader::ByteReader;
use crate::endian::Endian;
use crate::error::Result;
use crate::hexdump;
use crate::options::ReadOptions;
use crate::text::TextDecoder;

use super::macrsrc::MacRsrcReader;
use super::FormatReader;

pub struct AppleReader<'a> {
    data: &'a [u8],
}

impl<'a> AppleReader<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        AppleReader { data }
    }
}

fn entry_id_name(id: u32) -> &'static str {
    match id {
        1 => "Data Fork",
        2 => "Resource Fork",
        3 => "Real Name",
        4 => "Comment",
        5 => "Icon, Black & White",
        6 => "Icon, Color",
        7 => "File Info",
        8 => "File Dates Info",
        9 => "Finder Info",
        10 => "Macintosh File Info",
        11 => "ProDOS File Info",
        12 => "MS-DOS File Info",
        13 => "AFP Short Name",
        14 => "AFP File Info",
        15 => "Directory ID",
        _ => "undefined",
    }
}

impl<'a> FormatReader for AppleReader<'a> {
    fn read_file(&mut self, options: &ReadOptions, out: &mut dyn Write) -> Result<()> {
        writeln!(out, "==== AppleSingle/AppleDouble format ====")?;
        let mut rd = ByteReader::new(self.data);
        rd.seek(0);
        let magic = rd.read_word(4, false, Endian::Big) as u32;
        match magic {
            0x00051600 => writeln!(out, "AppleSingle")?,
            0x00051607 => writeln!(out, "AppleDouble")?,
            0x4A6F7921 => {
                writeln!(out, "PEF")?;
                eprintln!("Error: unsupported file format");
                return Ok(());
            }
            _ => {
                writeln!(out, "Unknown magic format, assuming Macintosh resource file")?;
                return MacRsrcReader::new(self.data, 0).read_file(options, out);
            }
        }
        let version = rd.read_word(4, false, Endian::Big) as u32;
        match version {
            0x10000 => writeln!(out, "Version 1")?,
            0x20000 => writeln!(out, "Version 2")?,
            _ => writeln!(out, "Unknown version {version:#010x}")?,
        }
        let host_system = rd.read(16);
        let decoder = options.decoder(TextDecoder::MacromanGraphic);
        if host_system != [0u8; 16] {
            writeln!(out, "Host system: {}", decoder.decode(&host_system))?;
            if version != 0x10000 {
                eprintln!("Warning: only version 1 allows a host system to be present");
            }
        }
        let entry_count = rd.read_word(2, false, Endian::Big) as u32;
        writeln!(out, "Entry count: {entry_count}")?;
        let mut entries = Vec::with_capacity(entry_count as usize);
        let mut entry_types: HashSet<u32> = HashSet::new();
        for _ in 0..entry_count {
            let entry_id = rd.read_word(4, false, Endian::Big) as u32;
            let entry_offset = rd.read_word(4, false, Endian::Big) as u32;
            let entry_length = rd.read_word(4, false, Endian::Big) as u32;
            let name = entry_id_name(entry_id);
            if entry_types.contains(&entry_id) && (1..=15).contains(&entry_id) {
                eprintln!("Warning: Duplicate {name}");
            } else if version != 0x00010000 && entry_id == 7 {
                eprintln!("Warning: File Info only supported for version 1");
            } else if version == 0x00010000 && (10..=15).contains(&entry_id) {
                eprintln!("Warning: {name} only supported for version 2");
            } else if magic == 0x00051607 && entry_id == 1 {
                eprintln!("Warning: Data Fork only supposed to be in AppleSingle");
            }
            entry_types.insert(entry_id);
            writeln!(out, "Entry: {name} ({entry_id:#010x}), offset: {entry_offset:#010x}, length: {entry_length:#010x}")?;
            entries.push((entry_id, entry_offset, entry_length));
        }
        for (entry_id, entry_offset, entry_length) in entries {
            let section_name = match entry_id {
                1 => "Data Fork",
                2 => "Resource Fork",
                3 => "Real Name",
                4 => "Comment",
                5 => "Icon, Black & White",
                6 => "Icon, Color",
                7 => "File Info",
                8 => "File Dates Info",
                9 => "Finder Info",
                10 => "Macintosh File Info",
                11 => "ProDOS File Info",
                12 => "MS-DOS File Info",
                13 => "AFP Short Name",
                14 => "AFP File Info",
                15 => "AFP Directory ID",
                _ => "",
            };
            if !section_name.is_empty() {
                writeln!(out, "=== {section_name} ===")?;
            }
            if entry_id == 2 {
                MacRsrcReader::new(self.data, entry_offset as usize).read_file(options, out)?;
                continue;
            }
            if options.wants_data() {
                writeln!(out, "[FILE    ] ENTRY   \tDATA")?;
                let start = (entry_offset as usize).min(self.data.len());
                let end = (entry_offset as usize + entry_length as usize).min(self.data.len());
                let rows = hexdump::dump_rows(&self.data[start..end.max(start)], 0, TextDecoder::MacromanGraphic, None, 0);
                for row in rows {
                    writeln!(out, "[{:08X}] {:08X}\t{}\t{}", entry_offset as usize + row.offset, row.offset, row.hex, row.text)?;
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
    fn entry_id_names() {
        assert_eq!(entry_id_name(1), "Data Fork");
        assert_eq!(entry_id_name(2), "Resource Fork");
        assert_eq!(entry_id_name(99), "undefined");
    }

    #[test]
    fn applesingle_header_with_no_entries() {
        let mut data = Vec::new();
        data.extend(0x00051600u32.to_be_bytes());
        data.extend(0x00010000u32.to_be_bytes());
        data.extend([0u8; 16]);
        data.extend(0u16.to_be_bytes()); // entry count
        let mut reader = AppleReader::new(&data);
        let options = ReadOptions::default();
        let mut out = Vec::new();
        reader.read_file(&options, &mut out).unwrap();
        let text = String::from_utf8(out).unwrap();
        assert!(text.contains("AppleSingle"));
        assert!(text.contains("Version 1"));
        assert!(text.contains("Entry count: 0"));
    }

    #[test]
    fn unknown_magic_falls_back_to_resource_fork() {
        let data = vec![0u8; 16];
        let mut reader = AppleReader::new(&data);
        let options = ReadOptions::default();
        let mut out = Vec::new();
        reader.read_file(&options, &mut out).unwrap();
        let text = String::from_utf8(out).unwrap();
        assert!(text.contains("assuming Macintosh resource file"));
    }
}
