//! Apple IIgs GS/OS OMF reader.
//!
//! Ported from `GSOSOMFReader.ReadFile`. A file is a sequence of
//! self-delimiting segments (`segment_file_size` advances the cursor to
//! the next one), each holding its own little tokenized record stream;
//! `SUPER` records (0xF7) are themselves a nested stream of compact
//! relocation entries keyed by a sub-type byte.

use std::collections::BTreeMap;
use std::io::Write;

use crate::byte_reader::ByteReader;
use crate::endian::Endian;
use crate::error::Result;
use crate::hexdump;
use crate::options::ReadOptions;
use crate::text::TextDecoder;

use super::FormatReader;

pub struct GsosReader<'a> {
    data: &'a [u8],
    label_size: u8,
}

impl<'a> GsosReader<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        GsosReader { data, label_size: 0 }
    }

    fn read_name(&self, rd: &mut ByteReader) -> Vec<u8> {
        if self.label_size == 0 {
            let len = rd.read_word(1, false, Endian::Little) as usize;
            rd.read(len)
        } else {
            rd.read(self.label_size as usize)
        }
    }
}

fn record_name(record_type: u8) -> (&'static str, bool) {
    match record_type {
        0x00 => ("END", true),
        0xE0 => ("ALIGN", false),
        0xE1 => ("ORG", false),
        0xE2 => ("RELOC", false),
        0xE3 => ("INTERSEG", false),
        0xE4 => ("USING", false),
        0xE5 => ("STRONG", false),
        0xE6 => ("GLOBAL", false),
        0xE7 => ("GEQU", false),
        0xE8 => ("MEM", false),
        0xEB => ("EXPR", false),
        0xEC => ("ZEXPR", false),
        0xED => ("BEXPR", false),
        0xEE => ("RELEXPR", false),
        0xEF => ("LOCAL", false),
        0xF0 => ("EQU", false),
        0xF1 => ("DS", false),
        0xF2 => ("LCONST", false),
        0xF3 => ("LEXPR", false),
        0xF4 => ("ENTRY", false),
        0xF5 => ("cRELOC", false),
        0xF6 => ("cINTERSEG", false),
        0xF7 => ("SUPER", false),
        0xE9 | 0xEA | 0xF8..=0xFF => ("undefined", false),
        _ => ("CONST", false),
    }
}

impl<'a> FormatReader for GsosReader<'a> {
    fn read_file(&mut self, options: &ReadOptions, out: &mut dyn Write) -> Result<()> {
        writeln!(out, "==== GS/OS OMF format ====")?;
        let size = self.data.len();
        let mut rd = ByteReader::new(self.data);
        writeln!(out, "Total file size: {size:#010x}")?;

        let mut current_segment_offset = 0usize;
        let mut segment_number = 1u32;
        let decoder = options.decoder(TextDecoder::AsciiGraphic);
        let show_records = options.wants_relshow();

        while current_segment_offset < size {
            rd.seek(current_segment_offset + 0x0F);
            let version = rd.read_word(1, false, Endian::Little) as u32;
            rd.seek(current_segment_offset + 0x20);
            let endian_byte = rd.read_word(1, false, Endian::Little) as u32;
            let endian = match endian_byte {
                0 => Endian::Little,
                1 => Endian::Big,
                _ => Endian::Little,
            };
            rd.seek(current_segment_offset);
            let mut segment_file_size = rd.read_word(4, false, endian) as u32;
            let unshifted_segment_file_size = segment_file_size;
            if version == 1 {
                segment_file_size <<= 9;
            }
            let zero_fill_size = rd.read_word(4, false, endian) as u32;
            let memory_size = rd.read_word(4, false, endian) as u32;

            let endian_name = match endian_byte {
                0 => "little-endian",
                1 => "big-endian",
                _ => "undefined",
            };

            let kind_v1 = if version == 1 {
                Some(rd.read_word(1, false, endian) as u32)
            } else {
                rd.skip(1);
                None
            };
            self.label_size = rd.read_word(1, false, endian) as u8;
            let number_size = rd.read_word(1, false, endian) as usize;
            rd.skip(1);
            let bank_size = rd.read_word(4, false, endian) as u32;

            let kind_v2 = if version == 2 {
                let k = rd.read_word(2, false, endian) as u32;
                rd.skip(2);
                Some(k)
            } else {
                rd.skip(4);
                None
            };

            let base = rd.read_word(4, false, endian) as u32;
            let align = rd.read_word(4, false, endian) as u32;

            rd.skip(1);

            let (lcbank, revision) = if version == 1 {
                (Some(rd.read_word(1, false, endian) as u32), 0u32)
            } else {
                (None, rd.read_word(1, false, endian) as u32)
            };

            let segnum = rd.read_word(2, false, endian) as u32;
            if segnum != segment_number {
                eprintln!("Error: invalid segment number, expected {segment_number:#06x}, received {segnum:#06x}");
            }

            let entry = rd.read_word(4, false, endian) as u32;

            let loadname_offset = rd.read_word(2, false, endian) as u32;
            let segment_data_offset = rd.read_word(2, false, endian) as u32;
            let virtual_base = if loadname_offset >= 48 {
                Some(rd.read_word(4, false, endian) as u32)
            } else {
                None
            };

            rd.seek(current_segment_offset + loadname_offset as usize);
            let object_name = decoder.decode(&rd.read(10));
            let segment_name = decoder.decode(&self.read_name(&mut rd));

            writeln!(out, "=== Segment #{segment_number}:")?;
            writeln!(
                out,
                "Name: {segment_name:?} (object: {object_name:?}) at offset {loadname_offset:#06x} ({:#010x} in file)",
                current_segment_offset as u32 + loadname_offset
            )?;
            writeln!(out, "- Header offset: {current_segment_offset:#010x}")?;
            writeln!(
                out,
                "- Data offset: {segment_data_offset:#06x} ({:#010x} in file)",
                current_segment_offset as u32 + segment_data_offset
            )?;
            if version == 1 {
                writeln!(out, "- File length: {segment_file_size:#010x} ({unshifted_segment_file_size:#010x})")?;
            } else {
                writeln!(out, "- File length: {segment_file_size:#010x}")?;
            }
            writeln!(out, "- Memory size: {memory_size:#010x}")?;
            writeln!(out, "- Zero fill: {zero_fill_size:#010x}")?;
            writeln!(out, "- Address: {base:#010x}")?;
            if let Some(virtual_base) = virtual_base {
                writeln!(out, "- Virtual address: {virtual_base:#010x}")?;
            }
            writeln!(out, "- Align: {align:#010x}")?;
            writeln!(out, "Version: {version}.{revision}")?;
            writeln!(out, "Endian: {endian_name} ({endian_byte:#04x})")?;
            writeln!(out, "Number size: {number_size:#04x}")?;

            if version == 2 {
                let kind = kind_v2.unwrap_or(0);
                let kind_name = match kind & 0x1F {
                    0x00 => "code segment",
                    0x01 => "data segment",
                    0x02 => "jump table segment",
                    0x04 => "pathname segment",
                    0x08 => "library dictionary segment",
                    0x10 => "initialization segment",
                    0x12 => "direct page/stack segment",
                    _ => "undefined",
                };
                write!(out, "Kind: {kind_name} ({kind:#04x})")?;
                if kind & 0x0100 != 0 {
                    write!(out, ", bank relative")?;
                }
                if kind & 0x0200 != 0 {
                    write!(out, ", skip")?;
                }
                if kind & 0x0400 != 0 {
                    write!(out, ", reload")?;
                }
                if kind & 0x0800 != 0 {
                    write!(out, ", absolute bank")?;
                }
                if kind & 0x1000 == 0 {
                    write!(out, ", can be loaded to special memory")?;
                }
                if kind & 0x2000 != 0 {
                    write!(out, ", position independent")?;
                }
                if kind & 0x4000 != 0 {
                    write!(out, ", private")?;
                }
                if kind & 0x8000 != 0 {
                    write!(out, ", dynamic")?;
                } else {
                    write!(out, ", static")?;
                }
                writeln!(out)?;
            } else {
                let kind = kind_v1.unwrap_or(0);
                let kind_name = match kind & 0x1F {
                    0x00 => "code segment",
                    0x01 => "data segment",
                    0x02 => "jump table segment",
                    0x04 => "pathname segment",
                    0x08 => "library dictionary segment",
                    0x10 => "initialization segment",
                    0x11 => "absolute bank segment",
                    0x12 => "direct page/stack segment",
                    _ => "undefined",
                };
                write!(out, "Kind: {kind_name} ({kind:#04x})")?;
                if kind & 0x20 != 0 {
                    write!(out, ", position independent")?;
                }
                if kind & 0x40 != 0 {
                    write!(out, ", private")?;
                }
                if kind & 0x80 != 0 {
                    write!(out, ", dynamic")?;
                } else {
                    write!(out, ", static")?;
                }
                writeln!(out)?;
            }

            if self.label_size == 0 {
                writeln!(out, "Label size: variable length")?;
            } else {
                writeln!(out, "Label size: {:#04x}", self.label_size)?;
            }
            writeln!(out, "Bank size: {bank_size:#010x}")?;
            if let Some(lcbank) = lcbank {
                writeln!(out, "Language card bank: {}", lcbank + 1)?;
            }
            writeln!(out, "Entry: {entry:#010x} within segment")?;

            rd.seek(current_segment_offset + segment_data_offset as usize);
            let segment_data_end = current_segment_offset + segment_file_size as usize;

            if show_records {
                writeln!(out, "== Records")?;
            }

            let mut segment_data: Vec<u8> = Vec::new();
            let mut relocs: BTreeMap<u32, usize> = BTreeMap::new();

            while rd.tell() < segment_data_end {
                let record_location = rd.tell();
                let record_type = rd.read_word(1, false, endian) as u8;
                let (record_name, is_terminal) = record_name(record_type);
                if show_records {
                    writeln!(out, "[{record_location:#010x}] {record_name} ({record_type:#04x})")?;
                }
                if is_terminal {
                    break;
                }
                match record_type {
                    0xE2 | 0xF5 => {
                        let reloc_size = rd.read_word(1, false, endian) as u32;
                        let reloc_shift = rd.read_word(1, true, endian);
                        let reloc_offset = rd.read_word(if record_type == 0xE2 { 4 } else { 2 }, false, endian) as u32;
                        let reloc_addend = rd.read_word(if record_type == 0xE2 { 4 } else { 2 }, false, endian) as u32;
                        if show_records {
                            write!(out, "- Size: {reloc_size:#04x}")?;
                            if reloc_shift != 0 {
                                write!(out, ", shift: {reloc_shift}")?;
                            }
                            writeln!(out, ", offset: {reloc_offset:#010x}, target: {reloc_addend:#010x}")?;
                        }
                        relocs.insert(reloc_offset, reloc_size as usize);
                    }
                    0xE3 | 0xF6 => {
                        let reloc_size = rd.read_word(1, false, endian) as u32;
                        let reloc_shift = rd.read_word(1, true, endian);
                        let reloc_offset = rd.read_word(if record_type == 0xE3 { 4 } else { 2 }, false, endian) as u32;
                        let reloc_file = if record_type == 0xE3 { rd.read_word(2, false, endian) as u32 } else { 1 };
                        let reloc_segment = rd.read_word(if record_type == 0xE3 { 2 } else { 1 }, false, endian) as u32;
                        let reloc_addend = rd.read_word(if record_type == 0xE3 { 4 } else { 2 }, false, endian) as u32;
                        if show_records {
                            write!(out, "- Size: {reloc_size:#04x}")?;
                            if reloc_shift != 0 {
                                write!(out, ", shift: {reloc_shift}")?;
                            }
                            write!(out, ", offset: {reloc_offset:#010x}, target: ")?;
                            if reloc_file != 1 {
                                write!(out, ", file #{reloc_file}")?;
                            }
                            writeln!(out, "#{reloc_segment:#04x}:{reloc_addend:#010x}")?;
                        }
                        relocs.insert(reloc_offset, reloc_size as usize);
                    }
                    0xF1 => {
                        let count = rd.read_word(number_size, false, endian) as usize;
                        if show_records {
                            writeln!(out, "- Zero bytes: {count:#01$x}", 2 * number_size)?;
                        }
                        segment_data.extend(std::iter::repeat(0u8).take(count));
                    }
                    0xF2 => {
                        let count = rd.read_word(4, false, endian) as usize;
                        let chunk = rd.read(count);
                        if show_records {
                            writeln!(out, "- Data: {:?}", decoder.decode(&chunk))?;
                        }
                        segment_data.extend(chunk);
                    }
                    0xF7 => {
                        let record_size = rd.read_word(4, false, endian) as usize;
                        if record_size == 0 {
                            if show_records {
                                writeln!(out, "- Size: {record_size:#010x}")?;
                            }
                            continue;
                        }
                        let record_end = rd.tell() + record_size;
                        let sub_type = rd.read_word(1, false, endian) as u32;
                        if sub_type > 37 {
                            if show_records {
                                writeln!(out, "- Size: {record_size:#010x}, type: unknown ({sub_type:#04x})")?;
                            }
                            rd.seek(record_end);
                            continue;
                        }
                        if show_records {
                            let label = if sub_type == 0 {
                                "RELOC2".to_string()
                            } else if sub_type == 1 {
                                "RELOC3".to_string()
                            } else {
                                format!("INTERSEG{}", sub_type - 1)
                            };
                            writeln!(out, "- Size: {record_size:#010x}, type: {label} ({sub_type:#04x})")?;
                        }
                        while rd.tell() < record_end {
                            if sub_type <= 1 {
                                let reloc_size = 2 + sub_type;
                                let reloc_offset = rd.read_word(2, false, endian) as u32;
                                let reloc_addend = rd.read_word(2, false, endian) as u32;
                                if show_records {
                                    writeln!(out, "-- Size: {reloc_size:#04x}, offset: {reloc_offset:#010x}, target: {reloc_addend:#010x}")?;
                                }
                                relocs.insert(reloc_offset, reloc_size as usize);
                            } else {
                                let (reloc_size, reloc_shift, reloc_offset, reloc_file, reloc_segment, reloc_addend);
                                if sub_type == 2 {
                                    reloc_size = 3;
                                    reloc_shift = 0i64;
                                    reloc_offset = rd.read_word(2, false, endian) as u32;
                                    reloc_file = 1u32;
                                    reloc_segment = rd.read_word(1, false, endian) as u32;
                                    reloc_addend = rd.read_word(2, false, endian) as u32;
                                } else if sub_type < 14 {
                                    reloc_size = 3;
                                    reloc_shift = 0;
                                    reloc_offset = rd.read_word(2, false, endian) as u32;
                                    reloc_file = sub_type - 1;
                                    reloc_segment = rd.read_word(1, false, endian) as u32;
                                    reloc_addend = rd.read_word(2, false, endian) as u32;
                                } else if sub_type < 26 {
                                    reloc_size = 2;
                                    reloc_shift = 0;
                                    reloc_offset = rd.read_word(2, false, endian) as u32;
                                    reloc_file = 1;
                                    reloc_segment = sub_type - 14;
                                    reloc_addend = rd.read_word(2, false, endian) as u32;
                                } else {
                                    reloc_size = 2;
                                    reloc_shift = -16;
                                    reloc_offset = rd.read_word(2, false, endian) as u32;
                                    reloc_file = 1;
                                    reloc_segment = sub_type - 26;
                                    reloc_addend = rd.read_word(2, false, endian) as u32;
                                }
                                if show_records {
                                    write!(out, "- Size: {reloc_size:#04x}")?;
                                    if reloc_shift != 0 {
                                        write!(out, ", shift: {reloc_shift}")?;
                                    }
                                    write!(out, ", offset: {reloc_offset:#010x}, target: ")?;
                                    if reloc_file != 1 {
                                        write!(out, ", file #{reloc_file}")?;
                                    }
                                    writeln!(out, "#{reloc_segment:#04x}:{reloc_addend:#010x}")?;
                                }
                                relocs.insert(reloc_offset, reloc_size as usize);
                            }
                        }
                    }
                    _ => {
                        eprintln!("Warning: skipping record type {record_type:#04x} of unknown size");
                    }
                }
            }

            if options.wants_data() {
                writeln!(out, "[FILE    ] MEMORY  \tDATA")?;
                let lookup = |position: usize| relocs.get(&(position as u32)).copied();
                let rows = hexdump::dump_rows(&segment_data, 0, decoder, Some(&lookup), 4);
                for row in rows {
                    writeln!(out, "({:08X}) {:08X}\t{}\t{}", row.offset, base + row.offset as u32, row.hex, row.text)?;
                }
            }

            segment_number += 1;
            current_segment_offset += segment_file_size as usize;
            rd.seek(current_segment_offset);
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn record_names_terminal_flag() {
        assert_eq!(record_name(0x00), ("END", true));
        assert_eq!(record_name(0xF7), ("SUPER", false));
        assert_eq!(record_name(0x10), ("CONST", false));
    }
}
