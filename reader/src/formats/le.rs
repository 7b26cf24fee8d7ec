//! Linear Executable (LE) / Linear eXecutable (LX) reader.
//!
//! Ported from `LEReader.ReadFile`. LE and LX share almost the entire
//! header; they differ only in the object page table entry layout (big-
//! endian 3-byte fixup index + type byte for LE, shifted offset/size/flags
//! triple for LX) and in one header field (`last_page_size` for LE vs
//! `page_shift_count` for LX).

use std::io::Write;

use crate::byte_reader::ByteReader;
use crate::endian::Endian;
use crate::error::Result;
use crate::hexdump;
use crate::options::ReadOptions;
use crate::reloc_map::RelocMap;
use crate::text::TextDecoder;

use super::FormatReader;

pub struct LeReader<'a> {
    data: &'a [u8],
}

impl<'a> LeReader<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        LeReader { data }
    }

    fn fetch_name(&self, rd: &mut ByteReader, offset: usize) -> Vec<u8> {
        let pos = rd.tell();
        rd.seek(offset);
        let name_length = rd.read_word(1, false, Endian::Little) as usize;
        let name = rd.read(name_length);
        rd.seek(pos);
        name
    }

    /// Walk `index` length-prefixed entries starting at `offset` before
    /// reading the one that follows, per the source's `FetchModuleName`.
    fn fetch_module_name(&self, rd: &mut ByteReader, offset: usize, index: usize) -> Vec<u8> {
        let pos = rd.tell();
        rd.seek(offset);
        for _ in 0..index {
            let skip = rd.read_word(1, false, Endian::Little) as usize;
            rd.skip(skip as isize);
        }
        let name_length = rd.read_word(1, false, Endian::Little) as usize;
        let name = rd.read(name_length);
        rd.seek(pos);
        name
    }
}

fn endian_name(byte_order: u32) -> &'static str {
    match byte_order {
        0 => "little endian",
        1 => "big endian",
        _ => "invalid",
    }
}

fn src_type_name(src: u32) -> (&'static str, usize) {
    match src & 0xF {
        0x0 => ("8-bit offset", 1),
        0x2 => ("16-bit selector", 2),
        0x3 => ("16:16-bit pointer", 4),
        0x5 => ("16-bit offset", 2),
        0x6 => ("16:32-bit pointer", 6),
        0x7 => ("32-bit offset", 4),
        0x8 => ("32-bit self-relative offset", 4),
        _ => ("undefined", 0),
    }
}

impl<'a> FormatReader for LeReader<'a> {
    fn read_file(&mut self, options: &ReadOptions, out: &mut dyn Write) -> Result<()> {
        writeln!(out, "==== LE/LX .EXE format ====")?;
        let mut rd = ByteReader::new(self.data);
        rd.seek(0);
        let magic = rd.read(2);
        let new_header_offset = if magic == b"LE" || magic == b"LX" {
            writeln!(out, "Stubless image")?;
            0usize
        } else {
            if magic != b"MZ" {
                eprintln!("Error: invalid stub magic {magic:?}");
            }
            rd.seek(0x18);
            let reloc_offset = rd.read_word(2, false, Endian::Little) as u32;
            if reloc_offset != 0x40 {
                eprintln!(
                    "Warning: stub relocation offset at 0x18 is supposed to be 0x0040, received: {reloc_offset:#06x}"
                );
            }
            rd.seek(0x3C);
            let offset = rd.read_word(4, false, Endian::Little) as usize;
            rd.seek(offset);
            let header_magic = rd.read(2);
            if header_magic != b"LE" && header_magic != b"LX" {
                eprintln!("Error: invalid magic {header_magic:?} at {:#x}", rd.tell());
            }
            offset
        };
        if new_header_offset != 0 {
            writeln!(out, "- Image offset: {new_header_offset:#010x}")?;
        }
        rd.seek(new_header_offset);
        let magic = rd.read(2);
        writeln!(out, "Magic number: {}", crate::pybytes::repr(&magic))?;

        let byte_order = rd.read_word(1, false, Endian::Little) as u32;
        writeln!(
            out,
            "Byte order: {} ({byte_order:#04x})",
            endian_name(byte_order)
        )?;
        let word_order = rd.read_word(1, false, Endian::Little) as u32;
        writeln!(
            out,
            "Word order: {} ({word_order:#04x})",
            endian_name(word_order)
        )?;
        let endian = match (byte_order, word_order) {
            (0, 0) => Endian::Little,
            (0, 1) => Endian::Pdp11,
            (1, 0) => Endian::AntiPdp11,
            _ => Endian::Big,
        };

        let format_level = rd.read_word(4, false, Endian::Little) as u32;
        if format_level != 0 {
            eprintln!("Warning: unknown format level {format_level:#010x} might impact parsing");
        }
        writeln!(out, "Format level: {format_level:#010x}")?;
        let cpu_type = rd.read_word(2, false, endian) as u32;
        let cpu_type_name = match cpu_type {
            0x01 => "Intel 80286",
            0x02 => "Intel 80386",
            0x03 => "Intel 80486",
            0x04 => "Intel Pentium/80586",
            0x20 => "Intel i860 (N10)",
            0x21 => "Intel i860 (N11)",
            0x40 => "MIPS Mark I (R2000, R3000)",
            0x41 => "MIPS Mark II (R6000)",
            0x42 => "MIPS Mark III (R4000)",
            _ => "unknown",
        };
        writeln!(out, "CPU type: {cpu_type_name} ({cpu_type:#06x})")?;
        let os_type = rd.read_word(2, false, endian) as u32;
        let os_type_name = match os_type {
            0x01 => "OS/2 or DOS/4G",
            0x02 => "Windows",
            0x03 => "Multitasking/European MS-DOS 4.x",
            0x04 => "Windows 386",
            0x05 => "IBM Microkernel Personality Neutral",
            _ => "unknown",
        };
        writeln!(out, "Operating system type: {os_type_name} ({os_type:#06x})")?;
        let module_version = rd.read_word(4, false, endian) as u32;
        writeln!(out, "Module version: {module_version:#010x}")?;
        let module_flags = rd.read_word(4, false, endian) as u32;
        write!(out, "Module flags: {module_flags:#010x}")?;
        let dll = (module_flags & 0x00038000) == 0x00008000;
        if module_flags & 0x00000001 != 0 {
            write!(out, ", single data")?;
        }
        if module_flags & 0x00000004 != 0 {
            write!(out, ", per-process library initialization")?;
        } else if dll {
            write!(out, ", global library initialization")?;
        }
        if module_flags & 0x00000010 != 0 {
            write!(out, ", no internal fixups")?;
        }
        if module_flags & 0x00000020 != 0 {
            write!(out, ", no external fixups")?;
        }
        match module_flags & 0x00000300 {
            0x00000100 => write!(out, ", GUI incompatible")?,
            0x00000200 => write!(out, ", GUI compatible")?,
            0x00000300 => write!(out, ", uses GUI")?,
            _ => write!(out, ", unknown GUI status")?,
        }
        if module_flags & 0x00001000 != 0 {
            write!(out, ", non-loadable")?;
        }
        match module_flags & 0x00038000 {
            0x00000000 => write!(out, ", program (EXE)")?,
            0x00008000 => write!(out, ", library (DLL)")?,
            0x00018000 => write!(out, ", protected memory library (DLL)")?,
            0x00020000 => write!(out, ", physical device driver")?,
            0x00028000 => write!(out, ", virtual device driver")?,
            _ => write!(out, ", unknown module type")?,
        }
        if module_flags & 0x00080000 != 0 {
            write!(out, ", MP-unsafe")?;
        }
        if module_flags & 0x40000000 != 0 {
            write!(out, ", per-process library termination")?;
        } else if dll {
            write!(out, ", global library termination")?;
        }
        writeln!(out)?;

        let page_count = rd.read_word(4, false, endian) as usize;
        writeln!(out, "Total page count: {page_count:#010x}")?;
        let eip_object = rd.read_word(4, false, endian) as u32;
        let eip = rd.read_word(4, false, endian) as u32;
        writeln!(out, "EIP = Object {eip_object:#x}:{eip:#010x}")?;
        let esp_object = rd.read_word(4, false, endian) as u32;
        let esp = rd.read_word(4, false, endian) as u32;
        writeln!(out, "ESP = Object {esp_object:#x}:{esp:#010x}")?;
        let page_size = rd.read_word(4, false, endian) as u32;
        writeln!(out, "Page size: {page_size:#010x}")?;
        let mut last_page_size = 0u32;
        let mut page_shift_count = 0u32;
        if magic == b"LE" {
            last_page_size = rd.read_word(4, false, endian) as u32;
            writeln!(out, "Last page size: {last_page_size:#010x}")?;
        } else {
            page_shift_count = rd.read_word(4, false, endian) as u32;
            writeln!(out, "Page shift count: {page_shift_count:#010x}")?;
        }
        let fixup_section_size = rd.read_word(4, false, endian) as u32;
        writeln!(out, "Fixup section size: {fixup_section_size:#010x}")?;
        let fixup_section_checksum = rd.read_word(4, false, endian) as u32;
        writeln!(out, "Fixup section checksum: {fixup_section_checksum:#010x}")?;
        let loader_section_size = rd.read_word(4, false, endian) as u32;
        writeln!(out, "Loader section size: {loader_section_size:#010x}")?;
        let loader_section_checksum = rd.read_word(4, false, endian) as u32;
        writeln!(out, "Loader section checksum: {loader_section_checksum:#010x}")?;
        let object_table_offset = rd.read_word(4, false, endian) as usize;
        writeln!(
            out,
            "Object table offset: {object_table_offset:#010x} ({:#010x} in file)",
            new_header_offset + object_table_offset
        )?;
        let object_count = rd.read_word(4, false, endian) as usize;
        writeln!(out, "Object count: {object_count:#010x}")?;
        writeln!(out, "Object table length: {:#010x}", object_count * 24)?;
        let object_page_table_offset = rd.read_word(4, false, endian) as usize;
        writeln!(
            out,
            "Object page table offset: {object_page_table_offset:#010x} ({:#010x} in file)",
            new_header_offset + object_page_table_offset
        )?;
        let object_iterated_page_table_offset = rd.read_word(4, false, endian) as usize;
        if object_iterated_page_table_offset != 0 {
            writeln!(
                out,
                "Object iterated page table offset: {object_iterated_page_table_offset:#010x} ({:#010x} in file)",
                new_header_offset + object_iterated_page_table_offset
            )?;
        }
        let resource_table_offset = rd.read_word(4, false, endian) as usize;
        writeln!(
            out,
            "Resource table offset: {resource_table_offset:#010x} ({:#010x} in file)",
            new_header_offset + resource_table_offset
        )?;
        let resource_count = rd.read_word(4, false, endian) as usize;
        writeln!(out, "Resource count: {resource_count:#010x}")?;
        writeln!(out, "Resource table length: {:#010x}", resource_count * 14)?;
        let resident_name_table_offset = rd.read_word(4, false, endian) as usize;
        writeln!(
            out,
            "Resident name table offset: {resident_name_table_offset:#010x} ({:#010x} in file)",
            new_header_offset + resident_name_table_offset
        )?;
        let entry_table_offset = rd.read_word(4, false, endian) as usize;
        writeln!(
            out,
            "Entry table offset: {entry_table_offset:#010x} ({:#010x} in file)",
            new_header_offset + entry_table_offset
        )?;
        let module_directives_table_offset = rd.read_word(4, false, endian) as usize;
        let module_directive_count = rd.read_word(4, false, endian) as u32;
        if module_directives_table_offset != 0 || module_directive_count != 0 {
            writeln!(
                out,
                "Module format directives table offset: {module_directives_table_offset:#010x} ({:#010x} in file)",
                new_header_offset + module_directives_table_offset
            )?;
            writeln!(out, "Module format directive count: {module_directive_count:#010x}")?;
        }
        let fixup_page_table_offset = rd.read_word(4, false, endian) as usize;
        writeln!(
            out,
            "Fixup page table offset: {fixup_page_table_offset:#010x} ({:#010x} in file)",
            new_header_offset + fixup_page_table_offset
        )?;
        let fixup_record_table_offset = rd.read_word(4, false, endian) as usize;
        writeln!(
            out,
            "Fixup record table offset: {fixup_record_table_offset:#010x} ({:#010x} in file)",
            new_header_offset + fixup_record_table_offset
        )?;
        let imported_module_table_offset = rd.read_word(4, false, endian) as usize;
        writeln!(
            out,
            "Imported module table offset: {imported_module_table_offset:#010x} ({:#010x} in file)",
            new_header_offset + imported_module_table_offset
        )?;
        let imported_module_count = rd.read_word(4, false, endian) as usize;
        writeln!(out, "Imported module count: {imported_module_count:#010x}")?;
        let imported_procedure_table_offset = rd.read_word(4, false, endian) as usize;
        writeln!(
            out,
            "Imported procedure table offset: {imported_procedure_table_offset:#010x} ({:#010x} in file)",
            new_header_offset + imported_procedure_table_offset
        )?;
        let per_page_checksum_table_offset = rd.read_word(4, false, endian) as usize;
        if per_page_checksum_table_offset != 0 {
            writeln!(
                out,
                "Per-page checksum table offset: {per_page_checksum_table_offset:#010x} ({:#010x} in file)",
                new_header_offset + per_page_checksum_table_offset
            )?;
        }
        let data_pages_offset = rd.read_word(4, false, endian) as usize;
        writeln!(out, "Data pages offset: {data_pages_offset:#010x}")?;
        let preload_page_count = rd.read_word(4, false, endian) as u32;
        if preload_page_count != 0 {
            writeln!(out, "Preload page count: {preload_page_count:#010x}")?;
        }
        let nonresident_name_table_offset = rd.read_word(4, false, endian) as u32;
        writeln!(out, "Non-Resident name table offset: {nonresident_name_table_offset:#010x}")?;
        let nonresident_name_table_length = rd.read_word(4, false, endian) as u32;
        writeln!(out, "Non-Resident name table length: {nonresident_name_table_length:#010x}")?;
        let nonresident_name_table_checksum = rd.read_word(4, false, endian) as u32;
        writeln!(out, "Non-Resident name table checksum: {nonresident_name_table_checksum:#010x}")?;
        let auto_data_segment_object = rd.read_word(4, false, endian) as u32;
        writeln!(out, "Automatic data segment object: {auto_data_segment_object:#010x}")?;
        let debug_info_offset = rd.read_word(4, false, endian) as u32;
        let debug_info_length = rd.read_word(4, false, endian) as u32;
        if debug_info_offset != 0 || debug_info_length != 0 {
            writeln!(out, "Debug information offset: {debug_info_offset:#010x}")?;
            writeln!(out, "Debug information length: {debug_info_length:#010x}")?;
        }
        let preload_instance_page_count = rd.read_word(4, false, endian) as u32;
        if preload_instance_page_count != 0 {
            writeln!(out, "Preload instance page count: {preload_instance_page_count:#010x}")?;
        }
        let demand_instance_page_count = rd.read_word(4, false, endian) as u32;
        if demand_instance_page_count != 0 {
            writeln!(out, "Demand instance page count: {demand_instance_page_count:#010x}")?;
        }
        let heap_size = rd.read_word(4, false, endian) as u32;
        writeln!(out, "Heap size: {heap_size}")?;
        let stack_size = rd.read_word(4, false, endian) as u32;
        writeln!(out, "Stack size: {stack_size}")?;
        rd.skip(8);
        let version_info_resource_offset = rd.read_word(4, false, endian) as u32;
        let version_info_resource_length = rd.read_word(4, false, endian) as u32;
        if version_info_resource_offset != 0 || version_info_resource_length != 0 {
            writeln!(out, "Windows VxD version info resource offset: {version_info_resource_offset:#010x}")?;
            writeln!(out, "Windows VxD version info resource length: {version_info_resource_length:#010x}")?;
        }
        let device_id = rd.read_word(2, false, endian) as u32;
        if device_id != 0 {
            writeln!(out, "Windows VxD device ID: {device_id:#010x}")?;
        }
        let ddk_version = rd.read_word(2, false, endian) as u32;
        if ddk_version != 0 {
            writeln!(out, "Windows VxD DDK version: {ddk_version:#010x}")?;
        }

        writeln!(out, "=== Loader section ===")?;
        writeln!(out, "= Object table =")?;
        if rd.tell() != new_header_offset + object_table_offset {
            eprintln!(
                "Warning: gap of {:#010x}",
                (new_header_offset + object_table_offset) as isize - rd.tell() as isize
            );
        }
        rd.seek(new_header_offset + object_table_offset);
        let mut object_bases = Vec::with_capacity(object_count);
        let mut page_objects: Vec<Option<usize>> = vec![None; page_count];
        for number in 0..object_count {
            writeln!(out, "- Object #{}", number + 1)?;
            let virtual_size = rd.read_word(4, false, endian) as u32;
            writeln!(out, "Total size: {virtual_size:#010x}")?;
            let base_address = rd.read_word(4, false, endian) as u32;
            writeln!(out, "Base address: {base_address:#010x}")?;
            object_bases.push(base_address);
            let flags = rd.read_word(4, false, endian) as u32;
            write!(out, "Flags: {flags:#010x}")?;
            if flags & 0x00000002 != 0 {
                if flags & 0x00000001 != 0 {
                    write!(out, ", readable")?;
                }
                write!(out, ", writable")?;
            } else if flags & 0x00000001 != 0 {
                write!(out, ", read-only")?;
            }
            if flags & 0x00000004 != 0 {
                write!(out, ", executable")?;
            }
            if flags & 0x00000008 != 0 {
                write!(out, ", resource")?;
            }
            if flags & 0x00000010 != 0 {
                write!(out, ", discardable")?;
            }
            if flags & 0x00000020 != 0 {
                write!(out, ", shared")?;
            }
            if flags & 0x00000040 != 0 {
                write!(out, ", has preload pages")?;
            }
            if flags & 0x00000080 != 0 {
                write!(out, ", has invalid pages")?;
            }
            match flags & 0x00000700 {
                0x00000100 => write!(out, ", has zero-filled pages")?,
                0x00000200 => write!(out, ", resident")?,
                0x00000300 => write!(out, ", resident and contiguous")?,
                0x00000400 => write!(out, ", resident and long-lockable")?,
                _ => {}
            }
            if flags & 0x00000800 != 0 {
                write!(out, ", IBM Microkernel extension")?;
            }
            if flags & 0x00001000 != 0 {
                write!(out, ", 16:16 alias required")?;
            }
            if flags & 0x00002000 != 0 {
                write!(out, ", 32-bit")?;
            }
            if flags & 0x00004000 != 0 {
                write!(out, ", conforming code")?;
            }
            if flags & 0x00008000 != 0 {
                write!(out, ", I/O privilege level")?;
            }
            writeln!(out)?;
            let page_table_index = rd.read_word(4, false, endian) as usize;
            writeln!(out, "Page table index: {page_table_index:#010x}")?;
            let page_table_count = rd.read_word(4, false, endian) as usize;
            writeln!(out, "Page table count: {page_table_count:#010x}")?;
            rd.skip(4);
            for i in 0..page_table_count {
                let idx = page_table_index + i;
                if idx >= 1 && idx - 1 < page_objects.len() {
                    if page_objects[idx - 1].is_some() {
                        eprintln!("Error: Overlapping pages by object #{:#010x}", number + 1);
                    }
                    page_objects[idx - 1] = Some(number);
                }
            }
        }

        writeln!(out, "= Object page table =")?;
        if rd.tell() != new_header_offset + object_page_table_offset {
            eprintln!(
                "Warning: gap of {:#010x}",
                (new_header_offset + object_page_table_offset) as isize - rd.tell() as isize
            );
        }
        rd.seek(new_header_offset + object_page_table_offset);
        let mut page_offsets = Vec::with_capacity(page_count);
        let mut page_sizes = Vec::with_capacity(page_count);
        if magic == b"LE" {
            for number in 0..page_count {
                match page_objects[number] {
                    None => {
                        eprintln!("Error: page #{} does not belong to an object", number + 1);
                        writeln!(out, "- Page #{}", number + 1)?;
                    }
                    Some(obj) => writeln!(out, "- Page #{} in object #{}", number + 1, obj + 1)?,
                }
                let page_fixup_index = rd.read_word(3, false, Endian::Big) as u32;
                writeln!(out, "Page fixup index: {page_fixup_index:#08x}")?;
                let page_type = rd.read_word(1, false, endian) as u32;
                writeln!(out, "Page type: {page_type:#04x}")?;
                page_offsets.push(page_size as u64 * number as u64);
                page_sizes.push(if number != page_count - 1 {
                    page_size
                } else {
                    last_page_size
                });
            }
        } else {
            for number in 0..page_count {
                match page_objects[number] {
                    None => {
                        eprintln!("Error: page #{} does not belong to an object", number + 1);
                        writeln!(out, "- Page #{}", number + 1)?;
                    }
                    Some(obj) => writeln!(out, "- Page #{} in object #{}", number + 1, obj + 1)?,
                }
                let page_data_offset =
                    (rd.read_word(4, false, endian) as u32) << page_shift_count;
                writeln!(out, "Page data offset: {page_data_offset:#010x}")?;
                let page_data_size = (rd.read_word(2, false, endian) as u32) << page_shift_count;
                writeln!(out, "Page size: {page_data_size:#06x}")?;
                let page_flags = (rd.read_word(2, false, endian) as u32) << page_shift_count;
                let page_type = match page_flags {
                    0 => "data",
                    1 => "iterated",
                    2 => "invalid",
                    3 => "zero-filled",
                    4 => "range",
                    5 => "compressed",
                    _ => "unknown",
                };
                writeln!(out, "Page flags: {page_type}, {page_flags:#06x}")?;
                page_offsets.push(page_data_offset as u64);
                page_sizes.push(page_data_size);
            }
        }

        writeln!(out, "= Resource table =")?;
        if rd.tell() != new_header_offset + resource_table_offset {
            eprintln!(
                "Warning: gap of {:#010x}",
                (new_header_offset + resource_table_offset) as isize - rd.tell() as isize
            );
        }
        rd.seek(new_header_offset + resource_table_offset);
        for number in 0..resource_count {
            writeln!(out, "- Resource #{}", number + 1)?;
            let resource_type = rd.read_word(2, false, endian) as u32;
            let resource_type_name = match resource_type {
                0x01 => "RT_POINTER (cursor)",
                0x02 => "RT_BITMAP",
                0x03 => "RT_MENU",
                0x04 => "RT_DIALOG",
                0x05 => "RT_STRING",
                0x06 => "RT_FONTDIR",
                0x07 => "RT_FONT",
                0x08 => "RT_ACCELERATOR",
                0x09 => "RT_RCDATA (binary)",
                0x0A => "RT_MESSAGE (error message)",
                0x0B => "RT_DLGINCLUDE",
                0x0C => "RT_VKEYTBL",
                0x0D => "RT_KEYTBL",
                0x0E => "RT_CHARTBL",
                0x0F => "RT_DISPLAYINFO",
                0x10 => "RT_FKASHORT (function key area)",
                0x11 => "RT_FKALONG (function key area)",
                0x12 => "RT_HELPTABLE",
                0x13 => "RT_HELPSUBTABLE",
                0x14 => "RT_FDDIR",
                0x15 => "RT_FD",
                _ => "unknown",
            };
            writeln!(out, "Resource type: {resource_type_name} ({resource_type:#06x})")?;
            let resource_id = rd.read_word(2, false, endian) as u32;
            writeln!(out, "Resource ID: {resource_id:#06x}")?;
            let resource_size = rd.read_word(4, false, endian) as u32;
            writeln!(out, "Resource size: {resource_size:#010x}")?;
            let resource_object = rd.read_word(2, false, endian) as u32;
            let resource_offset = rd.read_word(4, false, endian) as u32;
            writeln!(out, "Resource position: Object {resource_object:#06x}:{resource_offset:#010x}")?;
        }

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
            let ascii = TextDecoder::AsciiGraphic;
            loop {
                let name_length = rd.read_word(1, false, endian) as usize;
                if name_length == 0 {
                    break;
                }
                let name = rd.read(name_length);
                let ordinal = rd.read_word(2, false, endian) as u32;
                writeln!(
                    out,
                    "Offset {name_offset:#06x}: name {:?}, ordinal {ordinal:#06x}",
                    ascii.decode(&name)
                )?;
                name_offset += name_length as u32 + 3;
            }
        }

        writeln!(out, "= Entry table =")?;
        if rd.tell() != new_header_offset + entry_table_offset {
            eprintln!(
                "Warning: gap of {:#010x}",
                (new_header_offset + entry_table_offset) as isize - rd.tell() as isize
            );
        }
        rd.seek(new_header_offset + entry_table_offset);
        let mut entry_index = 0u32;
        loop {
            let entry_count = rd.read_word(1, false, endian) as u32;
            if entry_count == 0 {
                break;
            }
            if entry_count != 1 {
                writeln!(out, "-- Entry bundle of {entry_count}")?;
            }
            let entry_type = rd.read_word(1, false, endian) as u32;
            let mut entry_type_name = match entry_type & 0x7 {
                0 => "unused".to_string(),
                1 => "16-bit".to_string(),
                2 => "286 call gate".to_string(),
                3 => "32-bit".to_string(),
                4 => "forwarder".to_string(),
                _ => "unknown".to_string(),
            };
            if entry_type & 0x80 != 0 {
                entry_type_name.push_str(" with parameter typing information");
            }
            let entry_object = if matches!(entry_type & 0x7, 1 | 2 | 3) {
                rd.read_word(2, false, endian) as u32
            } else {
                if entry_type & 0x7 == 4 {
                    rd.skip(2);
                }
                0
            };
            for number in 0..entry_count {
                writeln!(out, "- Entry #{:#06x}", entry_index + number)?;
                writeln!(out, "Type: {entry_type_name} ({entry_type:#04x})")?;
                match entry_type & 0x7 {
                    1 => {
                        let entry_flags = rd.read_word(1, false, endian) as u32;
                        let entry_offset = rd.read_word(2, false, endian) as u32;
                        write!(out, "Object {entry_object:#06x}:{entry_offset:#06x}, flags: {entry_flags}")?;
                        if entry_flags & 1 != 0 {
                            write!(out, ", exported")?;
                        }
                        if entry_flags & 0xF8 != 0 {
                            write!(out, ", parameter bytes: {:#04x}", (entry_flags >> 2) & !1)?;
                        }
                        writeln!(out)?;
                    }
                    2 => {
                        let entry_flags = rd.read_word(1, false, endian) as u32;
                        let entry_offset = rd.read_word(2, false, endian) as u32;
                        rd.skip(2);
                        write!(out, "Object {entry_object:#06x}:{entry_offset:#06x}, flags: {entry_flags}")?;
                        if entry_flags & 1 != 0 {
                            write!(out, ", exported")?;
                        }
                        if entry_flags & 0xF8 != 0 {
                            write!(out, ", parameter bytes: {:#04x}", (entry_flags >> 2) & !1)?;
                        }
                        writeln!(out)?;
                    }
                    3 => {
                        let entry_flags = rd.read_word(1, false, endian) as u32;
                        let entry_offset = rd.read_word(4, false, endian) as u32;
                        write!(out, "Object {entry_object:#06x}:{entry_offset:#010x}, flags: {entry_flags}")?;
                        if entry_flags & 1 != 0 {
                            write!(out, ", exported")?;
                        }
                        if entry_flags & 0xF8 != 0 {
                            write!(out, ", parameter bytes: {:#04x}", (entry_flags >> 1) & !3)?;
                        }
                        writeln!(out)?;
                    }
                    _ => {}
                }
            }
            entry_index += entry_count;
        }

        writeln!(out, "= Fixup page table =")?;
        if rd.tell() != new_header_offset + fixup_page_table_offset {
            eprintln!(
                "Warning: gap of {:#010x}",
                (new_header_offset + fixup_page_table_offset) as isize - rd.tell() as isize
            );
        }
        rd.seek(new_header_offset + fixup_page_table_offset);
        let mut page_fixup_offsets = Vec::with_capacity(page_count + 1);
        for number in 0..=page_count {
            let page_fixup_offset = rd.read_word(4, false, endian) as u32;
            if number == page_count {
                writeln!(out, "Page fixup offset end: {page_fixup_offset:#010x}")?;
            } else {
                writeln!(out, "Page {:#010x} fixup offset: {page_fixup_offset:#010x}", number + 1)?;
            }
            page_fixup_offsets.push(page_fixup_offset as usize);
        }

        writeln!(out, "= Fixup record table =")?;
        if rd.tell() != new_header_offset + fixup_record_table_offset {
            eprintln!(
                "Warning: gap of {:#010x}",
                (new_header_offset + fixup_record_table_offset) as isize - rd.tell() as isize
            );
        }
        rd.seek(new_header_offset + fixup_record_table_offset);
        let mut page_relocs: Vec<RelocMap> = Vec::new();
        let ascii = TextDecoder::AsciiGraphic;
        if options.wants_rel() {
            let base = new_header_offset + fixup_record_table_offset;
            let mut current_page = 0usize;
            'outer: loop {
                while rd.tell() - base >= page_fixup_offsets[current_page] {
                    let skip_count = rd.tell() - base - page_fixup_offsets[current_page];
                    if skip_count > 0 {
                        eprintln!("Warning: skipped over {skip_count:#x} bytes to page fixup table for the next page");
                    }
                    current_page += 1;
                    if current_page == page_count + 1 {
                        break 'outer;
                    }
                    writeln!(out, "- Relocations for page {:#010x}", current_page)?;
                    page_relocs.push(RelocMap::new());
                }
                let src = rd.read_word(1, false, endian) as u32;
                let (src_name, src_size) = src_type_name(src);
                write!(out, "{src_name}")?;
                if src & 0x10 != 0 {
                    write!(out, ", 16-bit alias")?;
                }
                if src & 0x20 != 0 {
                    write!(out, ", source list")?;
                }
                write!(out, " ({src:#04x})")?;
                let flags = rd.read_word(1, false, endian) as u32;
                let target_name = match flags & 3 {
                    0 => "internal",
                    1 => "imported by ordinal",
                    2 => "imported by name",
                    _ => "internal entry",
                };
                write!(out, " {target_name}")?;
                if flags & 0x04 != 0 {
                    write!(out, ", additive")?;
                }
                if flags & 0x08 != 0 {
                    write!(out, ", chained")?;
                }
                if flags & 0x10 != 0 {
                    write!(out, ", 32-bit target offset")?;
                }
                if flags & 0x20 != 0 {
                    write!(out, ", 32-bit additive fixup")?;
                }
                if flags & 0x40 != 0 {
                    write!(out, ", 16-bit number/ordinal")?;
                }
                if flags & 0x80 != 0 {
                    write!(out, ", 8-bit ordinal")?;
                }
                write!(out, " ({flags:#04x}) to ")?;
                let mut srcoffs = Vec::new();
                let mut srcoff = 0u32;
                let mut cnt = 0u32;
                if src & 0x20 != 0 {
                    cnt = rd.read_word(1, false, endian) as u32;
                } else {
                    srcoff = rd.read_word(2, false, endian) as u32;
                }
                match flags & 3 {
                    0 => {
                        let rel_object = rd.read_word(if flags & 0x40 != 0 { 2 } else { 1 }, false, endian) as u32;
                        if src & 0xF != 2 {
                            let rel_offset =
                                rd.read_word(if flags & 0x10 != 0 { 4 } else { 2 }, false, endian) as u32;
                            write!(out, "object {rel_object:#06x}:{rel_offset:#010x}")?;
                        } else {
                            write!(out, "object {rel_object:#06x}")?;
                        }
                    }
                    1 => {
                        let rel_module = rd.read_word(if flags & 0x40 != 0 { 2 } else { 1 }, false, endian) as usize;
                        let width = if flags & 0x80 != 0 { 1 } else if flags & 0x10 != 0 { 4 } else { 2 };
                        let rel_ordinal = rd.read_word(width, false, endian) as u32;
                        let module_name =
                            self.fetch_module_name(&mut rd, new_header_offset + imported_module_table_offset, rel_module.wrapping_sub(1));
                        write!(out, "module {} ({rel_module:#06x}) ordinal {rel_ordinal:#010x}", ascii.decode(&module_name))?;
                        if flags & 0x04 != 0 {
                            let rel_add = rd.read_word(if flags & 0x20 != 0 { 4 } else { 2 }, false, endian) as u32;
                            write!(out, ", add {rel_add:#010x}")?;
                        }
                    }
                    2 => {
                        let rel_module = rd.read_word(if flags & 0x40 != 0 { 2 } else { 1 }, false, endian) as usize;
                        let rel_name = rd.read_word(if flags & 0x10 != 0 { 4 } else { 2 }, false, endian) as usize;
                        let module_name =
                            self.fetch_module_name(&mut rd, new_header_offset + imported_module_table_offset, rel_module.wrapping_sub(1));
                        let procedure_name =
                            self.fetch_name(&mut rd, new_header_offset + imported_procedure_table_offset + rel_name);
                        write!(
                            out,
                            "module {} ({rel_module:#06x}) name {} ({rel_name:#010x})",
                            ascii.decode(&module_name),
                            ascii.decode(&procedure_name)
                        )?;
                        if flags & 0x04 != 0 {
                            let rel_add = rd.read_word(if flags & 0x20 != 0 { 4 } else { 2 }, false, endian) as u32;
                            write!(out, ", add {rel_add:#010x}")?;
                        }
                    }
                    _ => {
                        let width = if flags & 0x80 != 0 { 1 } else if flags & 0x10 != 0 { 4 } else { 2 };
                        let rel_ordinal = rd.read_word(width, false, endian) as u32;
                        write!(out, "entry {rel_ordinal:#010x}")?;
                        if flags & 0x04 != 0 {
                            let rel_add = rd.read_word(if flags & 0x20 != 0 { 4 } else { 2 }, false, endian) as u32;
                            write!(out, ", add {rel_add:#010x}")?;
                        }
                    }
                }
                if let Some(map) = page_relocs.last_mut() {
                    if src & 0x20 != 0 {
                        for _ in 0..cnt {
                            let off = rd.read_word(2, false, endian) as usize;
                            srcoffs.push(off);
                            map.insert(off, src_size);
                        }
                        write!(out, ", offsets: ")?;
                        let rendered: Vec<String> = srcoffs.iter().map(|o| format!("{o:#06x}")).collect();
                        writeln!(out, "{}", rendered.join(", "))?;
                    } else {
                        map.insert(srcoff as usize, src_size);
                        writeln!(out, ", offset: {srcoff:#06x}")?;
                    }
                }
            }
        }

        writeln!(out, "= Imported module name table =")?;
        if rd.tell() != new_header_offset + imported_module_table_offset {
            eprintln!(
                "Warning: gap of {:#010x}",
                (new_header_offset + imported_module_table_offset) as isize - rd.tell() as isize
            );
        }
        rd.seek(new_header_offset + imported_module_table_offset);
        {
            let mut name_offset = 0u32;
            for name_count in 0..imported_module_count {
                let name_length = rd.read_word(1, false, endian) as usize;
                let name = rd.read(name_length);
                writeln!(
                    out,
                    "Module {:#06x}, offset {name_offset:#06x}: name {:?}",
                    name_count + 1,
                    ascii.decode(&name)
                )?;
                name_offset += name_length as u32 + 1;
            }
        }

        writeln!(out, "= Imported procedure name table =")?;
        if rd.tell() != new_header_offset + imported_procedure_table_offset {
            eprintln!(
                "Warning: gap of {:#010x}",
                (new_header_offset + imported_procedure_table_offset) as isize - rd.tell() as isize
            );
        }
        rd.seek(new_header_offset + imported_procedure_table_offset);
        {
            let mut name_offset = 0u32;
            while rd.tell() < new_header_offset + fixup_page_table_offset + fixup_section_size as usize {
                let name_length = rd.read_word(1, false, endian) as usize;
                let name = rd.read(name_length);
                writeln!(out, "Procedure offset {name_offset:#06x}: name {:?}", ascii.decode(&name))?;
                name_offset += name_length as u32 + 1;
            }
        }

        writeln!(out, "= Data pages =")?;
        if options.wants_data() {
            let decoder = options.decoder(TextDecoder::Cp437Full);
            for page_number in 0..page_count {
                let page_start = data_pages_offset as u64 + page_offsets[page_number];
                writeln!(out, "Page {:#x} data", page_number + 1)?;
                writeln!(out, "[FILE    ] (PAGE) OBJECT  \tDATA")?;
                let start = (page_start as usize).min(self.data.len());
                let end = (page_start as usize + page_sizes[page_number] as usize).min(self.data.len());
                let page_data = &self.data[start..end.max(start)];
                let relocs = page_relocs.get(page_number);
                let lookup = |position: usize| relocs.and_then(|m| m.width_at(position));
                let rows = hexdump::dump_rows(page_data, 0, decoder, Some(&lookup), 4);
                let base_object = page_objects[page_number]
                    .and_then(|obj| object_bases.get(obj).copied())
                    .unwrap_or(0);
                for row in rows {
                    writeln!(
                        out,
                        "[{:08X}] ({:04X}) {:08X}\t{}\t{}",
                        start + row.offset,
                        row.offset,
                        base_object as usize + row.offset,
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
    fn endian_name_table() {
        assert_eq!(endian_name(0), "little endian");
        assert_eq!(endian_name(1), "big endian");
        assert_eq!(endian_name(9), "invalid");
    }

    #[test]
    fn src_type_sizes() {
        assert_eq!(src_type_name(0x7).1, 4);
        assert_eq!(src_type_name(0x8).1, 4);
        assert_eq!(src_type_name(0xF).1, 0);
    }
}
