//! Macintosh resource fork reader.
//!
//! Ported from `MacintoshResourceReader.ReadFile`. Takes a byte offset so
//! `apple.rs` can point it at the resource-fork entry embedded inside an
//! AppleSingle/AppleDouble container instead of only ever reading from
//! the start of the file.

use std::io::Write;

use crate::byte_reader::ByteReader;
use crate::endian::Endian;
use crate::error::Result;
use crate::hexdump;
use crate::options::ReadOptions;
use crate::text::TextDecoder;

use super::FormatReader;

const MOVE_DATA_SP: u32 = 0x3F3C;
const LOADSEG: u32 = 0xA9F0;

pub struct MacRsrcReader<'a> {
    data: &'a [u8],
    offset: usize,
}

impl<'a> MacRsrcReader<'a> {
    pub fn new(data: &'a [u8], offset: usize) -> Self {
        MacRsrcReader { data, offset }
    }
}

impl<'a> FormatReader for MacRsrcReader<'a> {
    fn read_file(&mut self, options: &ReadOptions, out: &mut dyn Write) -> Result<()> {
        if self.offset == 0 {
            writeln!(out, "==== Macintosh resource format ====")?;
        } else {
            writeln!(out, "- Resource fork offset: {:#010x}", self.offset)?;
        }
        let mut rd = ByteReader::new(self.data);
        rd.seek(self.offset);
        let data_offset = rd.read_word(4, false, Endian::Big) as u32;
        let map_offset = rd.read_word(4, false, Endian::Big) as u32;
        let data_length = rd.read_word(4, false, Endian::Big) as u32;
        let map_length = rd.read_word(4, false, Endian::Big) as u32;
        writeln!(
            out,
            "Data offset: {data_offset:#010x} ({:#010x} in file), length: {data_length:#010x}",
            self.offset as u32 + data_offset
        )?;
        writeln!(
            out,
            "Map offset: {map_offset:#010x} ({:#010x} in file), length: {map_length:#010x}",
            self.offset as u32 + map_offset
        )?;
        rd.seek(self.offset + map_offset as usize + 22);
        let fork_attributes = rd.read_word(2, false, Endian::Big) as u32;
        writeln!(out, "Fork attributes: {fork_attributes:#06x}")?;
        let resource_type_list_offset = rd.read_word(2, false, Endian::Big) as u32;
        writeln!(
            out,
            "Offset to resource type list: {resource_type_list_offset:#04x} ({:#010x} in file)",
            self.offset as u32 + map_offset + resource_type_list_offset
        )?;
        let resource_name_list_offset = rd.read_word(2, false, Endian::Big) as u32;
        writeln!(
            out,
            "Offset to resource name list: {resource_name_list_offset:#04x} ({:#010x} in file)",
            self.offset as u32 + map_offset + resource_name_list_offset
        )?;
        let expected = self.offset + map_offset as usize + resource_type_list_offset as usize;
        if rd.tell() != expected {
            eprintln!("Warning: skipped bytes before resource type list: {}", expected - rd.tell());
        }
        rd.seek(expected);
        let decoder = options.decoder(TextDecoder::MacromanGraphic);
        let resource_type_count = rd.read_word(2, false, Endian::Big) as u32 + 1;
        writeln!(out, "Number of resource types: {resource_type_count:#06x}")?;
        for type_number in 0..resource_type_count {
            rd.seek(self.offset + map_offset as usize + resource_type_list_offset as usize + 2 + type_number as usize * 8);
            let resource_type = rd.read(4);
            let resource_type_text = decoder.decode(&resource_type);
            let resource_count = rd.read_word(2, false, Endian::Big) as u32 + 1;
            let resource_offset = rd.read_word(2, false, Endian::Big) as u32;
            writeln!(
                out,
                "Type #{}: {resource_type_text}, count: {resource_count}, offset: {resource_offset:#06x} ({:#x} in file)",
                type_number + 1,
                self.offset as u32 + map_offset + resource_type_list_offset + resource_offset
            )?;
            for resource_number in 0..resource_count {
                rd.seek(
                    self.offset
                        + map_offset as usize
                        + resource_type_list_offset as usize
                        + resource_offset as usize
                        + resource_number as usize * 12,
                );
                let resource_id = rd.read_word(2, false, Endian::Big) as u32;
                let resource_name_offset = rd.read_word(2, false, Endian::Big) as u32;
                let mut resource_data_offset = rd.read_word(4, false, Endian::Big) as u32;
                let resource_attributes = resource_data_offset >> 24;
                resource_data_offset &= 0x00FFFFFF;
                write!(out, "- Resource #{resource_number} ID: {resource_id:#06x}")?;
                if resource_name_offset != 0xFFFF {
                    rd.seek(self.offset + map_offset as usize + resource_name_list_offset as usize + resource_offset as usize + resource_name_offset as usize);
                    let resource_name_length = rd.read_word(1, false, Endian::Big) as usize;
                    let resource_name = rd.read(resource_name_length);
                    let resource_name_text = decoder.decode(&resource_name);
                    write!(
                        out,
                        ", name: {resource_name_text} (offset: {resource_name_offset:#06x} {:#06x} in file",
                        self.offset as u32 + map_offset + resource_name_list_offset + resource_offset + resource_name_offset
                    )?;
                }
                if resource_attributes != 0 {
                    write!(out, ", attributes: {resource_attributes:#04x}")?;
                }
                writeln!(
                    out,
                    ", data offset: {resource_data_offset:#08x} ({:#010x} in file)",
                    self.offset as u32 + data_offset + resource_data_offset
                )?;
                rd.seek(self.offset + data_offset as usize + resource_data_offset as usize);
                let resource_size = rd.read_word(4, false, Endian::Big) as u32;
                writeln!(
                    out,
                    "Resource offset in file: {:#010x}",
                    self.offset as u32 + data_offset + resource_data_offset + 4
                )?;
                writeln!(out, "Resource length: {resource_size:#010x}")?;

                if &resource_type == b"CODE" {
                    if resource_id == 0 {
                        let above_a5 = rd.read_word(4, false, Endian::Big) as u32;
                        writeln!(out, "Above A5: {above_a5:#010x}")?;
                        let below_a5 = rd.read_word(4, false, Endian::Big) as u32;
                        writeln!(out, "Below A5: {below_a5:#010x}")?;
                        let jump_table_size = rd.read_word(4, false, Endian::Big) as u32;
                        writeln!(out, "Jump table size: {jump_table_size:#010x}")?;
                        if 16 + jump_table_size != resource_size {
                            eprintln!("Warning: expected jump table size to be {:#x}", resource_size - 16);
                        }
                        if jump_table_size % 8 != 0 {
                            eprintln!("Warning: expected jump table size to be multiple of 8 bytes");
                        }
                        let jump_table_offset = rd.read_word(4, false, Endian::Big) as u32;
                        if jump_table_offset != 0x20 {
                            eprintln!("Warning: expected jump table offset to be 0x20");
                        }
                        let mut far_entries = false;
                        let mut offset = 0u32;
                        while offset < jump_table_size {
                            let word1 = rd.read_word(2, false, Endian::Big) as u32;
                            let word2 = rd.read_word(2, false, Endian::Big) as u32;
                            let word3 = rd.read_word(2, false, Endian::Big) as u32;
                            let word4 = rd.read_word(2, false, Endian::Big) as u32;
                            if word2 == LOADSEG {
                                if !far_entries {
                                    eprintln!("Error: far entry before separator at offset {offset:#010x}");
                                }
                                writeln!(out, "Entry at {offset:#010x}: far, segment {word1:#06x}:{:#06x}", (word3 << 16) | word4)?;
                            } else if word4 == LOADSEG {
                                if word2 == MOVE_DATA_SP {
                                    if far_entries {
                                        eprintln!("Error: near entry after separator at offset {offset:#010x}");
                                    }
                                    writeln!(out, "Entry at {offset:#010x}: near, segment {word3:#06x}:{word1:#06x}")?;
                                } else {
                                    writeln!(
                                        out,
                                        "Entry at {offset:#010x}: near (unknown format), segment {word3:#06x}, content: {:#010x}",
                                        (word1 << 16) | word2
                                    )?;
                                }
                            } else if word1 == 0 && word3 == 0 && word4 == 0 && word2 == 0xFFFF {
                                if far_entries {
                                    eprintln!("Error: multiple separator entries at offset {offset:#010x}");
                                }
                                writeln!(out, "Entry at {offset:#010x}: separator")?;
                                far_entries = true;
                            } else {
                                eprintln!("Error: invalid entry at offset {offset:#010x}");
                                writeln!(out, "Entry at {offset:#010x}: unknown, {word1:#06x}, {word2:#06x}, {word3:#06x}, {word4:#06x}")?;
                            }
                            offset += 8;
                        }
                    } else {
                        let mut near_entry_offset = rd.read_word(2, false, Endian::Big) as u32;
                        let mut near_entry_count = rd.read_word(2, false, Endian::Big) as u32;
                        let (segment_offset, segment_length);
                        if near_entry_offset == 0xFFFF && near_entry_count == 0x0000 {
                            near_entry_offset = rd.read_word(4, false, Endian::Big) as u32;
                            near_entry_count = rd.read_word(4, false, Endian::Big) as u32;
                            let far_entry_offset = rd.read_word(4, false, Endian::Big) as u32;
                            let far_entry_count = rd.read_word(4, false, Endian::Big) as u32;
                            let a5_reloc_offset = rd.read_word(4, false, Endian::Big) as u32;
                            let a5_address = rd.read_word(4, false, Endian::Big) as u32;
                            let segment_reloc_offset = rd.read_word(4, false, Endian::Big) as u32;
                            let segment_address = rd.read_word(4, false, Endian::Big) as u32;
                            rd.skip(4);
                            segment_offset = self.offset + data_offset as usize + resource_data_offset as usize + 44;
                            segment_length = a5_reloc_offset.saturating_sub(40);
                            writeln!(out, "Segment offset: {segment_offset:#010x}")?;
                            writeln!(out, "Segment length: {segment_length:#010x}")?;
                            writeln!(out, "Near entry offset: {near_entry_offset:#010x}")?;
                            writeln!(out, "Near entry count: {near_entry_count:#010x}")?;
                            writeln!(out, "Far entry offset: {far_entry_offset:#010x}")?;
                            writeln!(out, "Far entry count: {far_entry_count:#010x}")?;
                            writeln!(
                                out,
                                "A5 base address: {a5_address:#010x} ({:#010x} in file)",
                                self.offset as u32 + data_offset + resource_data_offset + 4 + a5_address
                            )?;
                            writeln!(out, "A5 relocations offset: {a5_reloc_offset:#010x}")?;
                            writeln!(
                                out,
                                "Segment base address: {segment_address:#010x} ({:#010x} in file)",
                                self.offset as u32 + data_offset + resource_data_offset + 4 + segment_address
                            )?;
                            writeln!(out, "Segment relocations offset: {segment_reloc_offset:#010x}")?;
                        } else {
                            segment_offset = self.offset + data_offset as usize + resource_data_offset as usize + 8;
                            segment_length = resource_size.saturating_sub(4);
                            writeln!(out, "Segment offset: {segment_offset:#010x}")?;
                            writeln!(out, "Segment length: {segment_length:#010x}")?;
                            writeln!(out, "Near entry offset: {near_entry_offset:#06x}")?;
                            writeln!(out, "Near entry count: {near_entry_count:#06x}")?;
                        }
                        if options.wants_data() {
                            writeln!(out, "[FILE    ] SEGMENT \tDATA")?;
                            let start = segment_offset.min(self.data.len());
                            let end = (segment_offset + segment_length as usize).min(self.data.len());
                            let rows = hexdump::dump_rows(&self.data[start..end.max(start)], 0, TextDecoder::MacromanGraphic, None, 0);
                            for row in rows {
                                writeln!(out, "[{:08X}] {:08X}\t{}\t{}", segment_offset + row.offset, row.offset, row.hex, row.text)?;
                            }
                        }
                    }
                } else if options.wants_data() {
                    writeln!(out, "[FILE    ] SEGMENT \tDATA")?;
                    let base = self.offset as u32 + data_offset + resource_data_offset + 4;
                    let start = base as usize;
                    let end = (start + resource_size as usize).min(self.data.len());
                    let rows = hexdump::dump_rows(&self.data[start.min(self.data.len())..end.max(start.min(self.data.len()))], 0, TextDecoder::MacromanGraphic, None, 0);
                    for row in rows {
                        writeln!(out, "[{:08X}] {:08X}\t{}\t{}", base as usize + row.offset, row.offset, row.hex, row.text)?;
                    }
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// A resource map with zero resource types is the smallest legal
    /// fork: data/map header, an empty type list (count-1 field 0xFFFF).
    fn minimal_image() -> Vec<u8> {
        let mut data = vec![0u8; 16];
        data[0..4].copy_from_slice(&16u32.to_be_bytes()); // data_offset
        data[4..8].copy_from_slice(&16u32.to_be_bytes()); // map_offset
        data.resize(16 + 28, 0);
        let map_start = 16;
        data[map_start + 22..map_start + 24].copy_from_slice(&28u16.to_be_bytes()); // type list offset
        data[map_start + 24..map_start + 26].copy_from_slice(&28u16.to_be_bytes()); // name list offset
        data.resize(map_start + 30, 0);
        data[map_start + 28..map_start + 30].copy_from_slice(&0xFFFFu16.to_be_bytes()); // count - 1
        data
    }

    #[test]
    fn empty_type_list_parses() {
        let data = minimal_image();
        let mut reader = MacRsrcReader::new(&data, 0);
        let options = ReadOptions::default();
        let mut out = Vec::new();
        reader.read_file(&options, &mut out).unwrap();
        let text = String::from_utf8(out).unwrap();
        assert!(text.contains("Number of resource types: 0x0000"));
    }

    #[test]
    fn nonzero_offset_reports_embedded_location() {
        let data = minimal_image();
        let mut reader = MacRsrcReader::new(&data, 0);
        let options = ReadOptions::default();
        let mut out = Vec::new();
        reader.read_file(&options, &mut out).unwrap();
        assert!(!String::from_utf8(out).unwrap().contains("Resource fork offset"));
    }
}
