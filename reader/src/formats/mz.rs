//! MS-DOS MZ .EXE reader.
//!
//! Ported from `MZReader.ReadFile`. This is the simplest reader and the
//! one every other DOS-descended format's stub detection borrows its
//! file-size formula from.

use std::collections::BTreeSet;
use std::io::Write;

use crate::byte_reader::ByteReader;
use crate::endian::Endian;
use crate::error::Result;
use crate::hexdump;
use crate::options::ReadOptions;
use crate::text::TextDecoder;

use super::FormatReader;

pub struct MzReader<'a> {
    data: &'a [u8],
}

impl<'a> MzReader<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        MzReader { data }
    }
}

/// `(pages << 9) - (-last_page_bytes & 0x1FF)`, the formula every
/// MZ-descended stub check reuses to find the end of the embedded image.
pub fn mz_file_size(pages: u32, last_page_bytes: u32) -> u32 {
    (pages << 9).wrapping_sub((last_page_bytes.wrapping_neg()) & 0x1FF)
}

impl<'a> FormatReader for MzReader<'a> {
    fn read_file(&mut self, options: &ReadOptions, out: &mut dyn Write) -> Result<()> {
        writeln!(out, "==== MS-DOS MZ .EXE format ====")?;
        let size = self.data.len();
        let mut rd = ByteReader::new(self.data);

        rd.seek(0);
        let magic = rd.read(2);
        if magic != b"MZ" && magic != b"ZM" {
            eprintln!("Error: invalid magic {magic:?} at {:#x}", rd.tell());
        }
        writeln!(out, "Magic number: {}", crate::pybytes::repr(&magic))?;

        let last_page_bytes = rd.read_word(2, false, Endian::Little) as u32;
        if last_page_bytes > 0x1FF {
            eprintln!(
                "Error: invalid last block count {last_page_bytes:#x} at {:#x}",
                rd.tell()
            );
        }
        let pages = rd.read_word(2, false, Endian::Little) as u32;
        let file_size = mz_file_size(pages, last_page_bytes);
        writeln!(out, "File size: {file_size:#010x}")?;
        if file_size as usize > size {
            eprintln!(
                "Error: reported file size larger than actual file size: {file_size:#010x} > {size:#010x}"
            );
        }
        if file_size as usize != size {
            writeln!(out, "Actual size: {size:#010x}")?;
            if (file_size as usize) < size {
                writeln!(out, "Trailing data: {:#010x}", size - file_size as usize)?;
            }
        }

        let reloc_count = rd.read_word(2, false, Endian::Little) as u32;
        let header_size = (rd.read_word(2, false, Endian::Little) as u32) << 4;
        writeln!(out, "Header length: {header_size:#010x}")?;
        let min_memory = (rd.read_word(2, false, Endian::Little) as u32) << 4;
        writeln!(out, "Minimum extra memory: {min_memory:#010x}")?;
        let max_memory = (rd.read_word(2, false, Endian::Little) as u32) << 4;
        if min_memory > max_memory {
            eprintln!(
                "Warning: minimum required additional memory exceeds maximum memory: {min_memory:#010x} > {max_memory:#010x}"
            );
        }
        writeln!(out, "Maximum extra memory: {max_memory:#010x}")?;
        writeln!(out, "Image offset: {header_size:#010x}")?;
        if file_size < header_size {
            eprintln!("Error: header is longer than entire file: {file_size:#010x} < {header_size:#010x}");
        } else if file_size == header_size {
            eprintln!("Error: header takes up entire file: {file_size:#010x} < {header_size:#010x}");
        }
        let image_length = file_size.saturating_sub(header_size);
        writeln!(out, "Image length: {image_length:#010x}")?;
        writeln!(out, "Total length: {:#010x}", image_length + min_memory)?;

        let ss = rd.read_word(2, false, Endian::Little) as u32;
        let sp = rd.read_word(2, false, Endian::Little) as u32;
        writeln!(out, "SS:SP = {ss:#06x}:{sp:#06x}")?;
        let checksum = rd.read_word(2, false, Endian::Little) as u32;
        if checksum != 0 {
            writeln!(out, "Checksum: {checksum:#06x}")?;
        }
        let ip = rd.read_word(2, false, Endian::Little) as u32;
        let cs = rd.read_word(2, false, Endian::Little) as u32;
        writeln!(out, "CS:IP = {cs:#06x}:{ip:#06x}")?;

        let reloc_offset = rd.read_word(2, false, Endian::Little) as u32;
        if reloc_offset != 0 || reloc_count != 0 {
            writeln!(out, "Relocations offset: {reloc_offset:#06x}")?;
        }
        if reloc_count != 0 {
            writeln!(out, "Relocations length: {:#06x}", reloc_count * 4)?;
            writeln!(out, "Relocations count: {reloc_count}")?;
            if reloc_offset < 0x1C {
                eprintln!("Warning: Relocations start in standard header fields at {reloc_offset:#06x}");
            }
            if reloc_offset > header_size {
                eprintln!(
                    "Warning: Relocations begin outside header at {reloc_offset:#06x}, after {header_size:#06x}"
                );
            } else if reloc_offset + 4 * reloc_count > header_size {
                eprintln!(
                    "Warning: Relocations cross header boundary from {:#06x} to {:#06x}, after {header_size:#06x}",
                    reloc_offset,
                    reloc_offset + 4 * reloc_count
                );
            }
        }
        let overlay_number = rd.read_word(2, false, Endian::Little) as u32;
        if overlay_number != 0 {
            writeln!(out, "Overlay number: {overlay_number}")?;
        }

        let mut relocs: BTreeSet<u32> = BTreeSet::new();
        let show_relocs = options.wants_rel();
        if (show_relocs || options.wants_relshow()) && reloc_count != 0 {
            rd.seek(reloc_offset as usize);
            for index in 0..reloc_count {
                let offset = rd.read_word(2, false, Endian::Little) as u32;
                let segment = rd.read_word(2, false, Endian::Little) as u32;
                let position = (segment << 4) + offset;
                if show_relocs {
                    writeln!(
                        out,
                        "Relocation #{} ({:#06x}) at {segment:#06x}:{offset:#06x} ({position:#08x})",
                        index + 1,
                        reloc_offset + 4 * index,
                    )?;
                    if relocs.contains(&position) {
                        eprintln!("Warning: duplicate relocation {position:#08x}");
                    }
                }
                relocs.insert(position);
            }
        }

        if options.wants_data() {
            rd.seek(header_size as usize);
            writeln!(out, "[FILE    ] SEGMENT \tDATA")?;
            let decoder = options.decoder(TextDecoder::Cp437Full);
            let start = (header_size as usize).min(self.data.len());
            let end = (header_size as usize + image_length as usize).min(self.data.len());
            let segment_data = &self.data[start..end.max(start)];
            let lookup = |position: usize| {
                if relocs.contains(&(position as u32)) {
                    Some(2)
                } else {
                    None
                }
            };
            let reloc_lookup: Option<&dyn Fn(usize) -> Option<usize>> =
                if options.wants_relshow() { Some(&lookup) } else { None };
            let rows = hexdump::dump_rows(segment_data, 0, decoder, reloc_lookup, 2);
            for row in rows {
                writeln!(
                    out,
                    "[{:08X}] {:08X}\t{}\t{}",
                    header_size as usize + row.offset,
                    row.offset,
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
    fn file_size_formula() {
        assert_eq!(mz_file_size(2, 0), 0x400);
        assert_eq!(mz_file_size(1, 0x100), 0x100);
    }

    #[test]
    fn file_size_formula_property() {
        for pages in [0u32, 1, 2, 5, 100] {
            for last in 0..0x200u32 {
                let expected = pages * 512 - ((512 - last) % 512);
                assert_eq!(mz_file_size(pages, last), expected, "pages={pages} last={last}");
            }
        }
    }

    #[test]
    fn s1_mz_no_relocations() {
        let mut data = vec![0u8; 0x400];
        let header: [u8; 28] = [
            0x4D, 0x5A, 0x00, 0x02, 0x02, 0x00, 0x00, 0x00, 0x20, 0x00, 0x00, 0x00, 0xFF, 0xFF,
            0x00, 0x01, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00,
        ];
        data[..header.len()].copy_from_slice(&header);
        let mut reader = MzReader::new(&data);
        let options = ReadOptions::default();
        let mut out = Vec::new();
        reader.read_file(&options, &mut out).unwrap();
        let text = String::from_utf8(out).unwrap();
        assert!(text.contains("File size: 0x00000400"));
        assert!(text.contains("Header length: 0x00000200"));
        assert!(!text.contains("Relocations count"));
    }
}
