//! 16-bit Windows/OS2 NE .EXE reader.
//!
//! Ported from `NEReader.ReadFile`: a stub-aware header dump (stubless
//! `NE`/`DX` images are accepted directly, otherwise the 0x3C pointer in
//! an `MZ` stub is chased), the segment and resource tables, the
//! resident/non-resident/imported name tables and the entry table, and
//! per-segment relocation records with module/name cross-references.

use std::io::Write;

use crate::byte_reader::ByteReader;
use crate::endian::Endian;
use crate::error::Result;
use crate::hexdump;
use crate::options::ReadOptions;
use crate::reloc_map::RelocMap;
use crate::text::TextDecoder;

use super::FormatReader;

pub struct NeReader<'a> {
    data: &'a [u8],
}

impl<'a> NeReader<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        NeReader { data }
    }

    /// Read a length-prefixed name at `offset`, restoring the cursor
    /// afterwards. Short reads are zero-padded rather than failing.
    fn fetch_name(&self, rd: &mut ByteReader, offset: usize) -> Vec<u8> {
        let pos = rd.tell();
        rd.seek(offset);
        let name_length = rd.read_word(1, false, Endian::Little) as usize;
        let name = rd.read(name_length);
        rd.seek(pos);
        name
    }

    /// Read a module reference table entry (a 2-byte name-table offset)
    /// at `index`, then resolve it through `imported_name_table_offset`.
    fn fetch_module_name(
        &self,
        rd: &mut ByteReader,
        imported_name_table_offset: usize,
        index: usize,
    ) -> Vec<u8> {
        let pos = rd.tell();
        rd.seek(index);
        let name_offset = rd.read_word(2, false, Endian::Little) as usize;
        let name = self.fetch_name(rd, imported_name_table_offset + name_offset);
        rd.seek(pos);
        name
    }
}

fn os_type_name(os_type: u32) -> &'static str {
    match os_type {
        0x01 => "OS/2",
        0x02 => "Windows",
        0x03 => "Multitasking/European MS-DOS 4.x",
        0x04 => "Windows 386",
        0x05 => "Borland Operating System Services",
        0x81 => "Phar Lap 286|DOS-Extender, OS/2",
        0x82 => "Phar Lap 286|DOS-Extender, Windows",
        _ => "unknown",
    }
}

fn reloc_type_name(rel_type: u32) -> (&'static str, usize) {
    match rel_type & 0xF {
        0x0 => ("8-bit offset", 1),
        0x2 => ("16-bit selector", 2),
        0x3 => ("16:16-bit pointer", 4),
        0x5 => ("16-bit offset", 2),
        0xB => ("16:32-bit pointer", 6),
        0xD => ("32-bit offset", 4),
        _ => ("undefined", 0),
    }
}

fn reloc_flag_name(rel_flags: u32) -> &'static str {
    match rel_flags & 3 {
        0 => "internal",
        1 => "imported by ordinal",
        2 => "imported by name",
        _ => "OS fixup",
    }
}

impl<'a> FormatReader for NeReader<'a> {
    fn read_file(&mut self, options: &ReadOptions, out: &mut dyn Write) -> Result<()> {
        writeln!(out, "==== NE .EXE format ====")?;
        let mut rd = ByteReader::new(self.data);

        rd.seek(0);
        let magic = rd.read(2);
        let new_header_offset = if magic == b"NE" || magic == b"DX" {
            writeln!(out, "Stubless image")?;
            0usize
        } else {
            if magic != b"MZ" && magic != b"ZM" {
                eprintln!("Warning: invalid stub magic {magic:?}");
            }
            rd.seek(0x18);
            let reloc_offset = rd.read_word(2, false, Endian::Little) as u32;
            if reloc_offset < 0x40 {
                eprintln!(
                    "Warning: stub relocation offset at 0x18 is supposed to be at least 0x0040, received: {reloc_offset:#06x}"
                );
            }
            rd.seek(0x3C);
            let offset = rd.read_word(4, false, Endian::Little) as usize;
            rd.seek(offset);
            let header_magic = rd.read(2);
            if header_magic != b"NE" && header_magic != b"DX" {
                eprintln!(
                    "Error: invalid magic {header_magic:?} at {:#x}",
                    rd.tell()
                );
            }
            offset
        };
        if new_header_offset != 0 {
            writeln!(out, "- Image offset: {new_header_offset:#010x}")?;
        }
        rd.seek(new_header_offset);
        let magic = rd.read(2);
        writeln!(out, "Magic number: {}", crate::pybytes::repr(&magic))?;

        let linker_major = rd.read_word(1, false, Endian::Little);
        let linker_minor = rd.read_word(1, false, Endian::Little);
        writeln!(out, "Linker version: {linker_major}.{linker_minor}")?;
        let entry_table_offset = rd.read_word(2, false, Endian::Little) as usize;
        let entry_table_length = rd.read_word(2, false, Endian::Little) as usize;
        let checksum = rd.read_word(4, false, Endian::Little) as u32;
        writeln!(out, "File checksum: {checksum:#06x}")?;
        let program_flags = rd.read_word(1, false, Endian::Little) as u32;
        let application_flags = rd.read_word(1, false, Endian::Little) as u32;
        let dll = application_flags & 0x80 != 0;
        let auto_data_segment = rd.read_word(2, false, Endian::Little) as u32;
        writeln!(out, "Automatic data segment: {auto_data_segment:#06x}")?;
        let heap_size = rd.read_word(2, false, Endian::Little) as u32;
        writeln!(out, "Heap size: {heap_size:#06x}")?;
        let stack_size = rd.read_word(2, false, Endian::Little) as u32;
        writeln!(out, "Stack size: {stack_size:#06x}")?;
        let ip = rd.read_word(2, false, Endian::Little) as u32;
        let cs = rd.read_word(2, false, Endian::Little) as u32;
        writeln!(out, "CS:IP: Segment {cs:#06x}:{ip:#06x}")?;
        let sp = rd.read_word(2, false, Endian::Little) as u32;
        let ss = rd.read_word(2, false, Endian::Little) as u32;
        writeln!(out, "SS:SP: Segment {ss:#06x}:{sp:#06x}")?;
        let segment_count = rd.read_word(2, false, Endian::Little) as usize;
        let module_reference_count = rd.read_word(2, false, Endian::Little) as usize;
        let nonresident_name_table_length = rd.read_word(2, false, Endian::Little) as u32;
        let segment_table_offset = rd.read_word(2, false, Endian::Little) as usize;
        let resource_table_offset = rd.read_word(2, false, Endian::Little) as usize;
        let resident_name_table_offset = rd.read_word(2, false, Endian::Little) as usize;
        let module_reference_table_offset = rd.read_word(2, false, Endian::Little) as usize;
        let imported_name_table_offset = rd.read_word(2, false, Endian::Little) as usize;
        let nonresident_name_table_offset = rd.read_word(4, false, Endian::Little) as usize;
        let movable_entry_count = rd.read_word(2, false, Endian::Little) as u32;
        let sector_shift_count = rd.read_word(2, false, Endian::Little) as u32;
        writeln!(out, "Sector shift count: {sector_shift_count:#06x}")?;
        let resource_count = rd.read_word(2, false, Endian::Little) as usize;
        let os_type = rd.read_word(1, false, Endian::Little) as u32;
        writeln!(
            out,
            "Operating system type: {} ({os_type:#04x})",
            os_type_name(os_type)
        )?;
        let os2 = (os_type & 0x7F) == 1;
        let exe_flags = rd.read_word(1, false, Endian::Little) as u32;
        write!(out, "Other flags: {exe_flags:#04x}")?;
        if exe_flags & 0x01 != 0 {
            write!(out, ", long file names")?;
        }
        if exe_flags & 0x02 != 0 {
            write!(out, ", proportional fonts")?;
        }
        if exe_flags & 0x04 != 0 {
            write!(out, ", protected mode")?;
        }
        if exe_flags & 0x08 != 0 {
            write!(out, ", gangload area present")?;
        }
        writeln!(out)?;

        write!(out, "Program flags: {program_flags:#04x}")?;
        match program_flags & 3 {
            0x00 => write!(out, ", NODATA")?,
            0x01 => write!(out, ", SINGLEDATA")?,
            0x02 => write!(out, ", MULTIPLEDATA")?,
            _ => write!(out, ", unknown DATA status")?,
        }
        if program_flags & 0x04 != 0 {
            write!(out, ", per-process library initialization")?;
        } else if dll {
            write!(out, ", global library initialization")?;
        }
        if program_flags & 0x08 != 0 {
            write!(out, ", protected mode")?;
        }
        if program_flags & 0x10 != 0 {
            write!(out, ", LIM EMS")?;
        }
        if program_flags & 0x20 != 0 {
            if os2 {
                write!(out, ", Intel 80286")?;
            } else {
                write!(out, ", per-instance EMS bank")?;
            }
        }
        if program_flags & 0x40 != 0 {
            if os2 {
                write!(out, ", Intel 80386")?;
            } else if dll {
                write!(out, ", global memory above EMS line")?;
            }
        }
        if program_flags & 0x40 != 0 {
            write!(out, ", Intel 80x87")?;
        }
        writeln!(out)?;

        write!(out, "Application flags: {application_flags:#04x}")?;
        match application_flags & 0x03 {
            0x01 => write!(out, ", GUI incompatible")?,
            0x02 => write!(out, ", GUI compatible")?,
            0x03 => write!(out, ", uses GUI")?,
            _ => write!(out, ", unknown GUI status")?,
        }
        if application_flags & 0x08 != 0 {
            if os2 {
                write!(out, ", Family Application")?;
            } else {
                write!(out, ", first segment loads application")?;
            }
        }
        if application_flags & 0x20 != 0 {
            write!(out, ", errors during linking")?;
        }
        if application_flags & 0x40 != 0 {
            if os2 {
                write!(out, ", non-conforming program")?;
            } else if dll {
                write!(out, ", private DLL")?;
            }
        }
        if dll {
            write!(out, ", library (DLL)")?;
        } else {
            write!(out, ", program (EXE)")?;
        }
        writeln!(out)?;

        let extra1 = rd.read_word(2, false, Endian::Little) as u32;
        if os2 {
            writeln!(out, "Offset to return thunks: {extra1:#06x}")?;
        } else {
            writeln!(
                out,
                "Gangload area offset: {:#010x}",
                extra1 << sector_shift_count
            )?;
        }
        let extra2 = rd.read_word(2, false, Endian::Little) as u32;
        if os2 {
            writeln!(out, "Offset to segment reference thunks: {extra2:#06x}")?;
        } else {
            writeln!(
                out,
                "Gangload area length: {:#010x}",
                extra2 << sector_shift_count
            )?;
        }
        let swap_size = rd.read_word(2, false, Endian::Little) as u32;
        writeln!(out, "Minimum swap size area: {swap_size:#06x}")?;
        let windows_minor = rd.read_word(1, false, Endian::Little);
        let windows_major = rd.read_word(1, false, Endian::Little);
        writeln!(out, "Windows version: {windows_major}.{windows_minor}")?;
        writeln!(
            out,
            "Segment table offset: {segment_table_offset:#06x} ({:#06x} in file)",
            new_header_offset + segment_table_offset
        )?;
        writeln!(out, "Segment count: {segment_count:#06x}")?;
        writeln!(
            out,
            "Resource table offset: {resource_table_offset:#06x} ({:#06x} in file)",
            new_header_offset + resource_table_offset
        )?;
        writeln!(out, "Resource count: {resource_count:#06x}")?;
        writeln!(
            out,
            "Resident name table offset: {resident_name_table_offset:#06x} ({:#06x} in file)",
            new_header_offset + resident_name_table_offset
        )?;
        writeln!(
            out,
            "Module reference table offset: {module_reference_table_offset:#06x} ({:#06x} in file)",
            new_header_offset + module_reference_table_offset
        )?;
        writeln!(out, "Module reference count: {module_reference_count:#06x}")?;
        writeln!(
            out,
            "Imported name table offset: {imported_name_table_offset:#06x} ({:#06x} in file)",
            new_header_offset + imported_name_table_offset
        )?;
        writeln!(
            out,
            "Entry table offset: {entry_table_offset:#06x} ({:#06x} in file)",
            new_header_offset + entry_table_offset
        )?;
        writeln!(out, "Entry table length: {entry_table_length:#06x}")?;
        writeln!(out, "Movable entry count: {movable_entry_count:#06x}")?;
        writeln!(
            out,
            "Non-Resident name table offset: {nonresident_name_table_offset:#010x}"
        )?;
        writeln!(
            out,
            "Non-Resident name table length: {nonresident_name_table_length:#06x}"
        )?;

        // Segment table
        writeln!(out, "= Segment table =")?;
        if rd.tell() != new_header_offset + segment_table_offset {
            eprintln!(
                "Warning: gap of {:#010x}",
                (new_header_offset + segment_table_offset) as isize - rd.tell() as isize
            );
        }
        rd.seek(new_header_offset + segment_table_offset);
        let mut segment_offsets = Vec::with_capacity(segment_count);
        let mut segment_lengths = Vec::with_capacity(segment_count);
        let mut segment_relocatable = Vec::with_capacity(segment_count);
        for segment_number in 0..segment_count {
            let segment_offset =
                (rd.read_word(2, false, Endian::Little) as u32) << sector_shift_count;
            segment_offsets.push(segment_offset);
            let mut segment_length = rd.read_word(2, false, Endian::Little) as u32;
            if segment_length == 0 {
                segment_length = 0x10000;
            }
            segment_lengths.push(segment_length);
            let segment_flags = rd.read_word(2, false, Endian::Little) as u32;
            segment_relocatable.push(segment_flags & 0x0100 != 0);
            let mut segment_size = rd.read_word(2, false, Endian::Little) as u32;
            if segment_size == 0 {
                segment_size = 0x10000;
            }
            writeln!(out, "Segment #{}:", segment_number + 1)?;
            writeln!(out, "Offset: {segment_offset:#010x}")?;
            writeln!(out, "Length: {segment_length:#06x}")?;
            writeln!(out, "Minimum size: {segment_size:#06x}")?;
            write!(out, "Flags: {segment_flags:#06x}")?;
            if segment_flags & 0x0001 != 0 {
                write!(out, ", data")?;
            } else {
                write!(out, ", code")?;
            }
            if segment_flags & 0x0002 != 0 {
                write!(out, ", allocated")?;
            }
            if segment_flags & 0x0004 != 0 {
                write!(out, ", loaded")?;
            }
            if segment_flags & 0x0010 != 0 {
                write!(out, ", movable")?;
            }
            if segment_flags & 0x0020 != 0 {
                write!(out, ", sharable")?;
            }
            if segment_flags & 0x0040 != 0 {
                write!(out, ", preload")?;
            } else {
                write!(out, ", load on call")?;
            }
            if segment_flags & 0x0080 != 0 {
                if segment_flags & 0x0001 != 0 {
                    write!(out, ", read-only")?;
                } else {
                    write!(out, ", execute-only")?;
                }
            } else if segment_flags & 0x0001 != 0 {
                write!(out, ", read-write")?;
            } else {
                write!(out, ", read-execute")?;
            }
            if segment_flags & 0x0100 != 0 {
                write!(out, ", has relocations")?;
            }
            if segment_flags & 0x0200 != 0 {
                write!(out, ", has debug info")?;
            }
            write!(out, ", CPL = {}", (segment_flags >> 10) & 3)?;
            if segment_flags & 0x1000 != 0 {
                write!(out, ", discardable")?;
            }
            writeln!(out)?;
        }

        // Resource table
        if resource_table_offset != resident_name_table_offset {
            writeln!(out, "= Resource table =")?;
            if rd.tell() != new_header_offset + resource_table_offset {
                eprintln!(
                    "Warning: gap of {:#010x}",
                    (new_header_offset + resource_table_offset) as isize - rd.tell() as isize
                );
            }
            rd.seek(new_header_offset + resource_table_offset);
            let resource_shift = rd.read_word(2, false, Endian::Little) as u32;
            writeln!(out, "Resource shift: {resource_shift:#06x}")?;
            loop {
                let resource_type = rd.read_word(2, false, Endian::Little) as u32;
                if resource_type == 0 {
                    break;
                }
                let type_resource_count = rd.read_word(2, false, Endian::Little) as usize;
                writeln!(
                    out,
                    "- Resource type: {resource_type:#06x}, count: {type_resource_count:#06x}"
                )?;
                for resource_number in 0..type_resource_count {
                    writeln!(out, "Resource #{}", resource_number + 1)?;
                    let resource_offset =
                        (rd.read_word(2, false, Endian::Little) as u32) << resource_shift;
                    writeln!(out, "Offset: {resource_offset:#010x}")?;
                    let resource_length = rd.read_word(2, false, Endian::Little) as u32;
                    writeln!(out, "Length: {resource_length:#010x}")?;
                    let resource_flags = rd.read_word(2, false, Endian::Little) as u32;
                    write!(out, "Flags: {resource_flags:#06x}")?;
                    if resource_flags & 0x0010 != 0 {
                        write!(out, ", movable")?;
                    }
                    if resource_flags & 0x0020 != 0 {
                        write!(out, ", sharable")?;
                    }
                    if resource_flags & 0x0040 != 0 {
                        write!(out, ", preload")?;
                    } else {
                        write!(out, ", load on call")?;
                    }
                    writeln!(out)?;
                    let resource_id = rd.read_word(2, false, Endian::Little) as u32;
                    writeln!(out, "- Resource ID: {resource_id:#06x}")?;
                    rd.skip(4);
                }
                writeln!(out, "- Resource name table")?;
                let mut resource_name_offset = 0u32;
                loop {
                    let resource_name_length = rd.read_word(1, false, Endian::Little) as usize;
                    if resource_name_length == 0 {
                        break;
                    }
                    let decoder = options.decoder(TextDecoder::Cp437Full);
                    let name_bytes = rd.read(resource_name_length);
                    let name = decoder.decode(&name_bytes);
                    writeln!(
                        out,
                        "Resource name offset: {resource_name_offset:#010x} ({:#010x} in file), name: {name}",
                        rd.tell() - resource_name_length - 1
                    )?;
                    resource_name_offset += resource_name_length as u32 + 1;
                }
            }
        }

        // Resident name table
        writeln!(out, "= Resident name table =")?;
        if rd.tell() != new_header_offset + resident_name_table_offset {
            eprintln!(
                "Warning: gap of {:#010x}",
                (new_header_offset + resident_name_table_offset) as isize - rd.tell() as isize
            );
        }
        rd.seek(new_header_offset + resident_name_table_offset);
        {
            let mut name_offset = 0u32;
            let decoder = options.decoder(TextDecoder::Cp437Full);
            loop {
                let name_length = rd.read_word(1, false, Endian::Little) as usize;
                if name_length == 0 {
                    break;
                }
                let name_bytes = rd.read(name_length);
                let name = decoder.decode(&name_bytes);
                let ordinal = rd.read_word(2, false, Endian::Little) as u32;
                writeln!(
                    out,
                    "Name offset: {name_offset:#010x} ({:#010x} in file), name: {name:?}, ordinal: {ordinal:#06x}",
                    new_header_offset as u32 + resident_name_table_offset as u32 + name_offset
                )?;
                name_offset += name_length as u32 + 3;
            }
        }

        // Module reference table
        writeln!(out, "= Module reference table =")?;
        if rd.tell() != new_header_offset + module_reference_table_offset {
            eprintln!(
                "Warning: gap of {:#010x}",
                (new_header_offset + module_reference_table_offset) as isize - rd.tell() as isize
            );
        }
        rd.seek(new_header_offset + module_reference_table_offset);
        let ascii = TextDecoder::AsciiGraphic;
        for module_number in 0..module_reference_count {
            let name_offset = rd.read_word(2, false, Endian::Little) as usize;
            let name = self.fetch_name(&mut rd, new_header_offset + imported_name_table_offset + name_offset);
            writeln!(
                out,
                "Module #{}: name {:?} (offset {name_offset:#06x})",
                module_number + 1,
                ascii.decode(&name)
            )?;
        }

        // Imported name table
        writeln!(out, "= Imported name table =")?;
        if rd.tell() != new_header_offset + imported_name_table_offset {
            eprintln!(
                "Warning: gap of {:#010x}",
                (new_header_offset + imported_name_table_offset) as isize - rd.tell() as isize
            );
        }
        rd.seek(new_header_offset + imported_name_table_offset);
        {
            let mut name_offset = 0u32;
            let decoder = options.decoder(TextDecoder::Cp437Full);
            while rd.tell() < new_header_offset + entry_table_offset {
                let name_length = rd.read_word(1, false, Endian::Little) as usize;
                let name_bytes = rd.read(name_length);
                let name = decoder.decode(&name_bytes);
                writeln!(
                    out,
                    "Name offset: {name_offset:#010x} ({:#010x} in file): name: {name:?}",
                    new_header_offset as u32 + imported_name_table_offset as u32 + name_offset
                )?;
                name_offset += name_length as u32 + 1;
            }
        }

        if rd.tell() != new_header_offset + entry_table_offset {
            eprintln!("Error: imported names overflow into entry table");
        }
        rd.seek(new_header_offset + entry_table_offset);
        let mut entry_index = 0u32;
        loop {
            let bundle_count = rd.read_word(1, false, Endian::Little) as u32;
            if bundle_count == 0 {
                break;
            }
            let bundle_offset = rd.tell() - 1;
            if bundle_count != 1 {
                writeln!(
                    out,
                    "-- Entry bundle of {bundle_count} at {bundle_offset:#010x} in file"
                )?;
            }
            let entry_type = rd.read_word(1, false, Endian::Little) as u32;
            let entry_type_name = match entry_type {
                0x00 => "unused",
                0xFE => "constant",
                0xFF => "movable",
                _ => "fixed",
            };
            for number in 0..bundle_count {
                writeln!(out, "- Entry #{:#06x}", entry_index + number + 1)?;
                writeln!(out, "Type: {entry_type_name} ({entry_type:#04x})")?;
                if entry_type == 0x00 {
                    continue;
                } else if entry_type == 0xFF {
                    let entry_flags = rd.read_word(1, false, Endian::Little) as u32;
                    write!(out, "Flags: {entry_flags:#04x}")?;
                    if entry_flags & 0x01 != 0 {
                        write!(out, ", exported")?;
                    }
                    if entry_flags & 0x02 != 0 {
                        write!(out, ", shared data")?;
                    }
                    if entry_flags & 0xF8 != 0 {
                        write!(out, ", parameter bytes: {:#04x}", (entry_flags >> 2) & !1)?;
                    }
                    writeln!(out)?;
                    rd.skip(2);
                    let entry_segment = rd.read_word(1, false, Endian::Little) as u32;
                    let entry_offset = rd.read_word(2, false, Endian::Little) as u32;
                    writeln!(out, "Segment {entry_segment:#04x}:{entry_offset:#06x}")?;
                } else {
                    let entry_flags = rd.read_word(1, false, Endian::Little) as u32;
                    write!(out, "Flags: {entry_flags:#04x}")?;
                    if entry_flags & 0x01 != 0 {
                        write!(out, ", exported")?;
                    }
                    if entry_flags & 0x02 != 0 {
                        write!(out, ", shared data")?;
                    }
                    if entry_flags & 0xF8 != 0 {
                        write!(out, ", parameter bytes: {:#04x}", (entry_flags >> 2) & !1)?;
                    }
                    writeln!(out)?;
                    let entry_offset = rd.read_word(2, false, Endian::Little) as u32;
                    writeln!(out, "Segment {entry_type:#04x}:{entry_offset:#06x}")?;
                }
            }
            entry_index += bundle_count;
        }

        // Non-Resident name table
        writeln!(out, "= Non-Resident name table =")?;
        if rd.tell() != nonresident_name_table_offset {
            eprintln!(
                "Warning: gap of {:#010x}",
                nonresident_name_table_offset as isize - rd.tell() as isize
            );
        }
        rd.seek(nonresident_name_table_offset);
        {
            let mut name_offset = 0u32;
            let decoder = options.decoder(TextDecoder::Cp437Full);
            loop {
                let name_length = rd.read_word(1, false, Endian::Little) as usize;
                if name_length == 0 {
                    break;
                }
                let name_bytes = rd.read(name_length);
                let name = decoder.decode(&name_bytes);
                let ordinal = rd.read_word(2, false, Endian::Little) as u32;
                writeln!(
                    out,
                    "Name offset: {name_offset:#010x} ({:#010x} in file), name: {name:?}, ordinal: {ordinal:#06x}",
                    new_header_offset as u32 + resident_name_table_offset as u32 + name_offset
                )?;
                name_offset += name_length as u32 + 3;
            }
        }

        // Segment data and relocations
        for segment_number in 0..segment_count {
            writeln!(out, "= Segment #{}", segment_number + 1)?;
            let mut relocs = RelocMap::new();
            if segment_relocatable[segment_number] {
                writeln!(out, "- Relocations")?;
                rd.seek((segment_offsets[segment_number] + segment_lengths[segment_number]) as usize);
                let record_count = rd.read_word(2, false, Endian::Little) as u32;
                for _ in 0..record_count {
                    let rel_type = rd.read_word(1, false, Endian::Little) as u32;
                    let (rel_type_name, rel_size) = reloc_type_name(rel_type);
                    write!(out, "{rel_type_name} ({rel_type:#04x})")?;
                    let rel_flags = rd.read_word(1, false, Endian::Little) as u32;
                    write!(out, " {}", reloc_flag_name(rel_flags))?;
                    if rel_flags & 0x04 != 0 {
                        write!(out, ", additive")?;
                    }
                    write!(out, " ({rel_flags:#04x})")?;
                    let rel_offset = rd.read_word(2, false, Endian::Little) as usize;
                    relocs.insert(rel_offset, rel_size);
                    write!(out, " offset {rel_offset:#06x} ")?;
                    match rel_flags & 3 {
                        0 => {
                            let rel_segment = rd.read_word(1, false, Endian::Little) as u32;
                            rd.skip(1);
                            let rel_target_offset = rd.read_word(2, false, Endian::Little) as u32;
                            if rel_segment == 0xFF {
                                write!(out, "entry {rel_target_offset:#06x}")?;
                            } else {
                                write!(out, "segment {rel_segment:#04x}:{rel_target_offset:#06x}")?;
                            }
                        }
                        1 => {
                            let rel_module = rd.read_word(2, false, Endian::Little) as usize;
                            let rel_ordinal = rd.read_word(2, false, Endian::Little) as u32;
                            let module_name = self.fetch_module_name(
                                &mut rd,
                                new_header_offset + imported_name_table_offset,
                                new_header_offset + module_reference_table_offset + 2 * (rel_module - 1),
                            );
                            write!(
                                out,
                                "module {:?} ({rel_module:#06x}) ordinal {rel_ordinal:#06x}",
                                ascii.decode(&module_name)
                            )?;
                        }
                        2 => {
                            let rel_module = rd.read_word(2, false, Endian::Little) as usize;
                            let rel_name = rd.read_word(2, false, Endian::Little) as usize;
                            let module_name = self.fetch_module_name(
                                &mut rd,
                                new_header_offset + imported_name_table_offset,
                                new_header_offset + module_reference_table_offset + 2 * (rel_module - 1),
                            );
                            let procedure_name =
                                self.fetch_name(&mut rd, new_header_offset + imported_name_table_offset + rel_name);
                            write!(
                                out,
                                "module {:?} ({rel_module:#06x}) name {:?} ({rel_name:#010x})",
                                ascii.decode(&module_name),
                                ascii.decode(&procedure_name)
                            )?;
                        }
                        _ => {
                            rd.skip(4);
                        }
                    }
                    writeln!(out)?;
                }
            }
            if options.wants_data() {
                writeln!(out, "- Data")?;
                let seg_offset = segment_offsets[segment_number] as usize;
                let seg_length = segment_lengths[segment_number] as usize;
                writeln!(out, "[FILE    ] SEGMENT \tDATA")?;
                let decoder = options.decoder(TextDecoder::Cp437Full);
                let start = seg_offset.min(self.data.len());
                let end = (seg_offset + seg_length).min(self.data.len());
                let segment_data = &self.data[start..end.max(start)];
                let lookup = |position: usize| relocs.width_at(position);
                let rows = hexdump::dump_rows(segment_data, 0, decoder, Some(&lookup), 6);
                for row in rows {
                    writeln!(
                        out,
                        "[{:08X}] {:04X}\t{}\t{}",
                        seg_offset + row.offset,
                        row.offset,
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

    /// A minimal stubless NE image: one data-only segment, no
    /// relocations, no resources, empty name/entry tables.
    fn minimal_image() -> Vec<u8> {
        let mut data = Vec::new();
        data.extend(b"NE"); // magic
        data.push(5); // linker major
        data.push(1); // linker minor
        data.extend(0x40u16.to_le_bytes()); // entry table offset
        data.extend(1u16.to_le_bytes()); // entry table length
        data.extend(0u32.to_le_bytes()); // checksum
        data.push(0x01); // program_flags: SINGLEDATA
        data.push(0x03); // application_flags: uses GUI, not a DLL
        data.extend(0u16.to_le_bytes()); // auto data segment
        data.extend(0u16.to_le_bytes()); // heap size
        data.extend(0u16.to_le_bytes()); // stack size
        data.extend(0u16.to_le_bytes()); // ip
        data.extend(1u16.to_le_bytes()); // cs
        data.extend(0u16.to_le_bytes()); // sp
        data.extend(0u16.to_le_bytes()); // ss
        data.extend(1u16.to_le_bytes()); // segment_count
        data.extend(0u16.to_le_bytes()); // module_reference_count
        data.extend(0u16.to_le_bytes()); // nonresident_name_table_length
        data.extend(0x26u16.to_le_bytes()); // segment_table_offset
        data.extend(0x2Eu16.to_le_bytes()); // resource_table_offset == resident (none)
        data.extend(0x2Eu16.to_le_bytes()); // resident_name_table_offset
        data.extend(0x30u16.to_le_bytes()); // module_reference_table_offset
        data.extend(0x30u16.to_le_bytes()); // imported_name_table_offset
        data.extend(0x42u32.to_le_bytes()); // nonresident_name_table_offset (absolute)
        data.extend(0u16.to_le_bytes()); // movable_entry_count
        data.extend(9u16.to_le_bytes()); // sector_shift_count
        data.extend(0u16.to_le_bytes()); // resource_count
        data.push(0x02); // os_type: Windows
        data.push(0x00); // exe_flags
        data.extend(0u16.to_le_bytes()); // extra1 (gangload offset)
        data.extend(0u16.to_le_bytes()); // extra2 (gangload length)
        data.extend(0u16.to_le_bytes()); // swap_size
        data.push(0); // windows minor
        data.push(3); // windows major
        assert_eq!(data.len(), 0x26);
        // segment table: one segment, offset sector 1 (<<9 = 0x200), length 0x10, flags=data
        data.extend(1u16.to_le_bytes());
        data.extend(0x10u16.to_le_bytes());
        data.extend(0x0001u16.to_le_bytes());
        data.extend(0x10u16.to_le_bytes());
        assert_eq!(data.len(), 0x2E);
        // resident name table: empty
        data.push(0);
        assert_eq!(data.len(), 0x2F);
        // module reference table: empty (count 0)
        // imported name table: empty, entry table starts immediately
        // pad up to entry_table_offset (0x40)
        data.resize(0x40, 0);
        // entry table: terminator
        data.push(0);
        // pad up to nonresident name table offset (0x42)
        data.resize(0x42, 0);
        data.push(0); // nonresident name table terminator
        // pad up to segment data at 0x200, then 16 bytes of segment data
        data.resize(0x200, 0);
        data.extend([0xAAu8; 0x10]);
        data
    }

    #[test]
    fn stubless_header_parses() {
        let data = minimal_image();
        let mut reader = NeReader::new(&data);
        let options = ReadOptions::default();
        let mut out = Vec::new();
        reader.read_file(&options, &mut out).unwrap();
        let text = String::from_utf8(out).unwrap();
        assert!(text.contains("Stubless image"));
        assert!(text.contains("Segment #1:"));
        assert!(text.contains("Offset: 0x00000200"));
    }

    #[test]
    fn segment_data_dump_when_requested() {
        let data = minimal_image();
        let mut reader = NeReader::new(&data);
        let mut options = ReadOptions::default();
        options.data = true;
        let mut out = Vec::new();
        reader.read_file(&options, &mut out).unwrap();
        let text = String::from_utf8(out).unwrap();
        assert!(text.contains("AA AA AA AA"));
    }
}
