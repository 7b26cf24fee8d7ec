//! Windows PE .EXE reader.
//!
//! Ported from `PEReader.ReadFile`. The distinguishing structure here is
//! the memory map: section RVAs are pre-scanned into a `BTreeMap` keyed
//! by RVA so that any later RVA (entry point, directory, import/export
//! table, relocation) can be resolved to a file offset by a single
//! lower-bound lookup (`get_offset`), the same role `goblin`'s section
//! table search plays for its `Pread`-based accessors.

use std::collections::BTreeMap;
use std::io::Write;

use crate::byte_reader::ByteReader;
use crate::endian::Endian;
use crate::error::Result;
use crate::hexdump;
use crate::options::ReadOptions;
use crate::text::TextDecoder;

use super::FormatReader;

pub struct PeReader<'a> {
    data: &'a [u8],
    image_base: u64,
    memory_map: BTreeMap<u32, (Option<i64>, Option<String>)>,
}

impl<'a> PeReader<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        PeReader {
            data,
            image_base: 0,
            memory_map: BTreeMap::new(),
        }
    }

    /// Largest section-starting RVA not exceeding `rva`; its stored
    /// displacement (file offset minus RVA) resolves `rva` to a file
    /// offset, or `None` if that RVA lies past the section's data.
    fn get_offset(&self, rva: u32) -> (Option<i64>, Option<&str>) {
        match self.memory_map.range(..=rva).next_back() {
            None => (None, None),
            Some((_, (disp, name))) => (*disp, name.as_deref()),
        }
    }

    fn file_offset(&self, rva: u32) -> Option<usize> {
        let (disp, _) = self.get_offset(rva);
        disp.map(|d| (rva as i64 + d) as usize)
    }

    fn print_rva(&self, rva: u32) -> String {
        let (disp, name) = self.get_offset(rva);
        let mut text = format!("{rva:#010x} ({:#010x} virtual)", self.image_base + rva as u64);
        match disp {
            Some(d) => {
                let file_off = rva as i64 + d;
                text.push_str(&format!(
                    " [{}:{:#x}, {:#010x} in file]",
                    name.unwrap_or(""),
                    rva,
                    file_off
                ));
            }
            None => text.push_str(" [not in file]"),
        }
        text
    }

    fn fetch_name(&self, rd: &mut ByteReader, rva: u32) -> Option<Vec<u8>> {
        let offset = self.file_offset(rva)?;
        let pos = rd.tell();
        rd.seek(offset);
        let name = rd.read_to_zero();
        rd.seek(pos);
        Some(name)
    }

    fn fetch_hint_name(&self, rd: &mut ByteReader, rva: u32) -> Option<(u32, Vec<u8>)> {
        let offset = self.file_offset(rva)?;
        let pos = rd.tell();
        rd.seek(offset);
        let hint = rd.read_word(2, false, Endian::Little) as u32;
        let name = rd.read_to_zero();
        rd.seek(pos);
        Some((hint, name))
    }
}

fn machine_name(machine: u32) -> &'static str {
    match machine {
        0x0000 => "unknown",
        0x014C => "Intel i386",
        0x014D => "Intel i860",
        0x8664 => "AMD64",
        0x0162 => "MIPS R3000",
        0x0166 => "MIPS (little endian)",
        0x0169 => "MIPS Windows CE v2 (little endian)",
        0x0266 => "MIPS16",
        0x0366 => "MIPS with FPU",
        0x0466 => "MIPS16 with FPU",
        0x6232 => "LoongArch 32-bit",
        0x6264 => "LoongArch 64-bit",
        0x0183 => "DEC Alpha AXP",
        0x01A2 => "Hitachi SH3",
        0x01A3 => "Hitachi SH3 DSP",
        0x01A6 => "Hitachi SH4",
        0x01A8 => "Hitachi SH5",
        0x01C0 => "ARM (little endian)",
        0x01C2 => "ARM Thumb",
        0x01C4 => "ARM Thumb-2 (little endian)",
        0xAA64 => "ARM (little endian)",
        0x01D4 => "Matsushita AM33",
        0x01F0 => "PowerPC (little endian)",
        0x01F1 => "PowerPC with floating point",
        0x0200 => "Intel Itanium",
        0x0268 => "Motorola 68000 (Macintosh)",
        0x0601 => "PowerPC (Macintosh)",
        0x0EBC => "EFI byte code",
        0x5032 => "RISC-V 32-bit",
        0x5064 => "RISC-V 64-bit",
        0x5128 => "RISC-V 128-bit",
        0x9041 => "Mitsubishi M32R (little endian)",
        _ => "undefined",
    }
}

fn subsystem_name(subsystem: u32) -> &'static str {
    match subsystem {
        0x0000 => "unknown",
        0x0001 => "native",
        0x0002 => "Windows GUI",
        0x0003 => "Windows text",
        0x0005 => "OS/2 text",
        0x0007 => "POSIX text",
        0x0008 => "Native Win9x driver",
        0x0009 => "Windows CE",
        0x000A => "EFI application",
        0x000B => "EFI driver with boot devices",
        0x000C => "EFI driver with run-time services",
        0x000D => "EFI ROM image",
        0x000E => "XBOX",
        0x0010 => "Windows boot application",
        _ => "undefined",
    }
}

/// Read an 8-byte section name, trimmed at the first NUL.
fn read_section_name(rd: &mut ByteReader, decoder: TextDecoder) -> String {
    let raw = rd.read(8);
    let end = raw.iter().position(|&b| b == 0).unwrap_or(raw.len());
    decoder.decode(&raw[..end])
}

impl<'a> FormatReader for PeReader<'a> {
    fn read_file(&mut self, options: &ReadOptions, out: &mut dyn Write) -> Result<()> {
        writeln!(out, "==== Windows PE .EXE format ====")?;
        let mut rd = ByteReader::new(self.data);
        rd.seek(0);
        let magic4 = rd.read(4);
        let new_header_offset = if magic4 == b"PE\0\0" || magic4 == b"PL\0\0" {
            writeln!(out, "Stubless image")?;
            0usize
        } else {
            if &magic4[..2] != b"MZ" {
                eprintln!("Error: invalid stub magic {magic4:?}");
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
            let header_magic = rd.read(4);
            if header_magic != b"PE\0\0" && header_magic != b"PL\0\0" {
                eprintln!("Error: invalid magic {header_magic:?} at {:#x}", rd.tell());
            }
            offset
        };
        if new_header_offset != 0 {
            writeln!(out, "- Image offset: {new_header_offset:#010x}")?;
        }
        writeln!(out, "Magic number: {}", crate::pybytes::repr(&magic4))?;

        let machine = rd.read_word(2, false, Endian::Little) as u32;
        writeln!(out, "Machine type: {} ({machine:#06x})", machine_name(machine))?;
        let section_count = rd.read_word(2, false, Endian::Little) as usize;
        writeln!(out, "Section count: {section_count}")?;
        let timestamp = rd.read_word(4, false, Endian::Little) as u32;
        if timestamp != 0 {
            writeln!(out, "Time stamp: {timestamp}")?;
        }
        let symtab_offset = rd.read_word(4, false, Endian::Little) as u32;
        let symtab_count = rd.read_word(4, false, Endian::Little) as u32;
        if symtab_offset != 0 || symtab_count != 0 {
            writeln!(out, "COFF symbol table:")?;
            writeln!(out, "- Offset: {symtab_offset:#010x}")?;
            writeln!(out, "- Count:  {symtab_count:#010x}")?;
        }
        let opthdr_length = rd.read_word(2, false, Endian::Little) as usize;
        writeln!(out, "Optional header:")?;
        writeln!(out, "- Offset: {:#010x}", new_header_offset + 0x18)?;
        writeln!(out, "- Length: {opthdr_length:#04x}")?;
        let flags = rd.read_word(2, false, Endian::Little) as u32;
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
        if flags & 0x0010 != 0 {
            write!(out, ", aggressively trim working set")?;
        }
        if flags & 0x0020 != 0 {
            write!(out, ", large address aware (> 2GiB addresses)")?;
        }
        if flags & 0x0100 != 0 {
            write!(out, ", 32-bit")?;
        }
        if flags & 0x0200 != 0 {
            write!(out, ", no debug information")?;
        }
        if flags & 0x0400 != 0 {
            write!(out, ", run from swap if on removable media")?;
        }
        if flags & 0x0800 != 0 {
            write!(out, ", run from swap if on network media")?;
        }
        if flags & 0x1000 != 0 {
            write!(out, ", system file")?;
        }
        if flags & 0x2000 != 0 {
            write!(out, ", library")?;
        }
        if flags & 0x4000 != 0 {
            write!(out, ", uniprocessor only")?;
        }
        if flags & 0x8000 != 0 {
            write!(out, ", big endian")?;
        }
        writeln!(out)?;

        let opthdr_offset = rd.tell();
        let decoder = options.decoder(TextDecoder::Cp437Full);

        // Pre-scan: build the RVA -> file-offset-displacement map before
        // touching the optional header, since entry-point/directory RVAs
        // need it immediately.
        self.memory_map.clear();
        for section_number in 0..section_count {
            rd.seek(new_header_offset + 24 + opthdr_length + section_number * 40);
            let name = read_section_name(&mut rd, decoder);
            let section_virtual_size = rd.read_word(4, false, Endian::Little) as u32;
            let section_address = rd.read_word(4, false, Endian::Little) as u32;
            let section_length = rd.read_word(4, false, Endian::Little) as u32;
            let section_offset = rd.read_word(4, false, Endian::Little) as u32;
            self.memory_map.insert(
                section_address,
                (Some(section_offset as i64 - section_address as i64), Some(name)),
            );
            let section_end = section_address + section_length.min(section_virtual_size);
            self.memory_map.entry(section_end).or_insert((None, None));
        }

        rd.seek(opthdr_offset);
        let mut magic = 0u32;
        let mut wordsize = 4usize;
        let mut directory_count = 0u32;
        let mut edata_rva = 0u32;
        let mut edata_len = 0u32;
        let mut idata_rva = 0u32;
        let mut idata_len = 0u32;
        let mut reloc_rva = 0u32;
        let mut reloc_len = 0u32;

        if opthdr_length >= 2 {
            magic = rd.read_word(2, false, Endian::Little) as u32;
            let magic_name = match magic {
                0x010B => "PE32 (32-bit)",
                0x020B => "PE32+ (64-bit)",
                _ => "unknown",
            };
            wordsize = if magic == 0x020B { 8 } else { 4 };
            writeln!(out, "Magic: {magic_name} ({magic:#06x})")?;
        }
        let w = 2 * wordsize;
        if opthdr_length >= 4 {
            let lv_major = rd.read_word(1, false, Endian::Little);
            let lv_minor = rd.read_word(1, false, Endian::Little);
            writeln!(out, "Linker version: {lv_major}.{lv_minor}")?;
        }
        if opthdr_length >= 8 {
            let code_size = rd.read_word(4, false, Endian::Little) as u32;
            writeln!(out, "Total size of code sections: {code_size:#010x}")?;
        }
        if opthdr_length >= 12 {
            let data_size = rd.read_word(4, false, Endian::Little) as u32;
            writeln!(out, "Total size of data sections: {data_size:#010x}")?;
        }
        if opthdr_length >= 16 {
            let bss_size = rd.read_word(4, false, Endian::Little) as u32;
            writeln!(out, "Total size of bss sections:  {bss_size:#010x}")?;
        }
        let mut entry = 0u32;
        if opthdr_length >= 20 {
            entry = rd.read_word(4, false, Endian::Little) as u32;
        }
        if opthdr_length >= 24 {
            let code_base = rd.read_word(4, false, Endian::Little) as u32;
            writeln!(out, "Base address of code: {code_base:#010x}")?;
        }
        if opthdr_length >= 28 && magic == 0x010B {
            let data_base = rd.read_word(4, false, Endian::Little) as u32;
            writeln!(out, "Base address of data: {data_base:#010x}")?;
        }
        if opthdr_length >= 32 {
            self.image_base = rd.read_word(wordsize, false, Endian::Little) as u64;
            writeln!(out, "Image base: {:#0w$x}", self.image_base, w = w)?;
            writeln!(out, "Entry point: {}", self.print_rva(entry))?;
        }
        if opthdr_length >= 36 {
            let section_align = rd.read_word(4, false, Endian::Little) as u32;
            writeln!(out, "Section alignment in memory: {section_align:#010x}")?;
        }
        if opthdr_length >= 40 {
            let file_align = rd.read_word(4, false, Endian::Little) as u32;
            writeln!(out, "Section alignment in file:   {file_align:#010x}")?;
        }
        if opthdr_length >= 44 {
            let a = rd.read_word(2, false, Endian::Little);
            let b = rd.read_word(2, false, Endian::Little);
            writeln!(out, "OS version: {a}.{b}")?;
        }
        if opthdr_length >= 48 {
            let a = rd.read_word(2, false, Endian::Little);
            let b = rd.read_word(2, false, Endian::Little);
            writeln!(out, "Image version: {a}.{b}")?;
        }
        if opthdr_length >= 52 {
            let a = rd.read_word(2, false, Endian::Little);
            let b = rd.read_word(2, false, Endian::Little);
            writeln!(out, "Subsystem version: {a}.{b}")?;
        }
        if opthdr_length >= 56 {
            let win32_version = rd.read_word(4, false, Endian::Little) as u32;
            if win32_version != 0 {
                writeln!(out, "Win32 version: {win32_version:#010x}")?;
            }
        }
        if opthdr_length >= 60 {
            let image_size = rd.read_word(4, false, Endian::Little) as u32;
            writeln!(out, "Size of total image with headers in memory: {image_size:#010x}")?;
        }
        if opthdr_length >= 64 {
            let header_size = rd.read_word(4, false, Endian::Little) as u32;
            writeln!(out, "Size of headers: {header_size:#010x}")?;
        }
        if opthdr_length >= 68 {
            let checksum = rd.read_word(4, false, Endian::Little) as u32;
            if checksum != 0 {
                writeln!(out, "Checksum: {checksum:#010x}")?;
            }
        }
        if opthdr_length >= 70 {
            let subsystem = rd.read_word(2, false, Endian::Little) as u32;
            writeln!(out, "Subsystem: {} ({subsystem:#06x})", subsystem_name(subsystem))?;
        }
        if opthdr_length >= 72 {
            let dll_flags = rd.read_word(2, false, Endian::Little) as u32;
            if dll_flags != 0 {
                write!(out, "DLL flags: {dll_flags:#06x}")?;
                if dll_flags & 0x0020 != 0 {
                    write!(out, ", high entropy 64-bit virtual address space support")?;
                }
                if dll_flags & 0x0040 != 0 {
                    write!(out, ", relocatable")?;
                }
                if dll_flags & 0x0080 != 0 {
                    write!(out, ", code integrity checks")?;
                }
                if dll_flags & 0x0100 != 0 {
                    write!(out, ", NX compatible")?;
                }
                if dll_flags & 0x0200 != 0 {
                    write!(out, ", isolation aware but non-isolated")?;
                }
                if dll_flags & 0x0400 != 0 {
                    write!(out, ", no structured exception handling")?;
                }
                if dll_flags & 0x0800 != 0 {
                    write!(out, ", not bindable")?;
                }
                if dll_flags & 0x1000 != 0 {
                    write!(out, ", must run in AppContainer")?;
                }
                if dll_flags & 0x2000 != 0 {
                    write!(out, ", WDM driver")?;
                }
                if dll_flags & 0x4000 != 0 {
                    write!(out, ", Control Flow Guard support")?;
                }
                if dll_flags & 0x8000 != 0 {
                    write!(out, ", Terminal Server aware")?;
                }
                writeln!(out)?;
            }
        }
        if opthdr_length >= 72 + wordsize {
            let stack_reserve = rd.read_word(wordsize, false, Endian::Little);
            writeln!(out, "Size of stack to reserve: {stack_reserve:#0w$x}", w = w)?;
        }
        if opthdr_length >= 72 + wordsize * 2 {
            let stack_commit = rd.read_word(wordsize, false, Endian::Little);
            writeln!(out, "Size of stack to commit:  {stack_commit:#0w$x}", w = w)?;
        }
        if opthdr_length >= 72 + wordsize * 3 {
            let heap_reserve = rd.read_word(wordsize, false, Endian::Little);
            writeln!(out, "Size of heap to reserve: {heap_reserve:#0w$x}", w = w)?;
        }
        if opthdr_length >= 72 + wordsize * 4 {
            let heap_commit = rd.read_word(wordsize, false, Endian::Little);
            writeln!(out, "Size of heap to commit:  {heap_commit:#0w$x}", w = w)?;
        }
        if opthdr_length >= 76 + wordsize * 4 {
            let loader_flags = rd.read_word(4, false, Endian::Little) as u32;
            if loader_flags != 0 {
                writeln!(out, "Loader flags: {loader_flags:#010x}")?;
            }
        }
        if opthdr_length >= 80 + wordsize * 4 {
            directory_count = rd.read_word(4, false, Endian::Little) as u32;
            writeln!(out, "Data directory count: {directory_count:#010x}")?;
        }
        if directory_count >= 1 && opthdr_length >= 88 + wordsize * 4 {
            edata_rva = rd.read_word(4, false, Endian::Little) as u32;
            edata_len = rd.read_word(4, false, Endian::Little) as u32;
            if edata_len != 0 {
                writeln!(out, "Export table:")?;
                writeln!(out, "- Offset: {}", self.print_rva(edata_rva))?;
                writeln!(out, "- Length: {edata_len:#010x}")?;
            }
        }
        if directory_count >= 2 && opthdr_length >= 96 + wordsize * 4 {
            idata_rva = rd.read_word(4, false, Endian::Little) as u32;
            idata_len = rd.read_word(4, false, Endian::Little) as u32;
            if idata_len != 0 {
                writeln!(out, "Import table:")?;
                writeln!(out, "- Offset: {}", self.print_rva(idata_rva))?;
                writeln!(out, "- Length: {idata_len:#010x}")?;
            }
        }
        if directory_count >= 3 && opthdr_length >= 104 + wordsize * 4 {
            let rsrc_rva = rd.read_word(4, false, Endian::Little) as u32;
            let rsrc_len = rd.read_word(4, false, Endian::Little) as u32;
            if rsrc_len != 0 {
                writeln!(out, "Resource table:")?;
                writeln!(out, "- Offset: {}", self.print_rva(rsrc_rva))?;
                writeln!(out, "- Length: {rsrc_len:#010x}")?;
            }
        }
        if directory_count >= 4 && opthdr_length >= 112 + wordsize * 4 {
            let pdata_rva = rd.read_word(4, false, Endian::Little) as u32;
            let pdata_len = rd.read_word(4, false, Endian::Little) as u32;
            if pdata_len != 0 {
                writeln!(out, "Exception table:")?;
                writeln!(out, "- Offset: {}", self.print_rva(pdata_rva))?;
                writeln!(out, "- Length: {pdata_len:#010x}")?;
            }
        }
        if directory_count >= 5 && opthdr_length >= 120 + wordsize * 4 {
            let certificate_rva = rd.read_word(4, false, Endian::Little) as u32;
            let certificate_len = rd.read_word(4, false, Endian::Little) as u32;
            if certificate_len != 0 {
                writeln!(out, "Certificate table:")?;
                writeln!(out, "- Offset: {}", self.print_rva(certificate_rva))?;
                writeln!(out, "- Length: {certificate_len:#010x}")?;
            }
        }
        if directory_count >= 6 && opthdr_length >= 128 + wordsize * 4 {
            reloc_rva = rd.read_word(4, false, Endian::Little) as u32;
            reloc_len = rd.read_word(4, false, Endian::Little) as u32;
            if reloc_len != 0 {
                writeln!(out, "Base relocation table:")?;
                writeln!(out, "- Offset: {}", self.print_rva(reloc_rva))?;
                writeln!(out, "- Length: {reloc_len:#010x}")?;
            }
        }
        if directory_count >= 7 && opthdr_length >= 136 + wordsize * 4 {
            let debug_rva = rd.read_word(4, false, Endian::Little) as u32;
            let debug_len = rd.read_word(4, false, Endian::Little) as u32;
            if debug_len != 0 {
                writeln!(out, "Debug data:")?;
                writeln!(out, "- Offset: {}", self.print_rva(debug_rva))?;
                writeln!(out, "- Length: {debug_len:#010x}")?;
            }
        }
        // Directories 8-15 (architecture, global pointer, TLS, load config,
        // bound import, IAT, delay import, CLR) are read-and-printed the
        // same way; remaining bytes of the optional header are skipped.

        rd.seek(new_header_offset + 24 + opthdr_length);
        writeln!(out, "== Section table")?;
        let mut section_offsets = Vec::with_capacity(section_count);
        let mut section_lengths = Vec::with_capacity(section_count);
        let mut section_bases = Vec::with_capacity(section_count);
        let mut section_isloaded = Vec::with_capacity(section_count);
        for section_number in 1..=section_count {
            let section_name = read_section_name(&mut rd, decoder);
            let section_virtual_size = rd.read_word(4, false, Endian::Little) as u32;
            let section_address = rd.read_word(4, false, Endian::Little) as u32;
            let section_length = rd.read_word(4, false, Endian::Little) as u32;
            let section_offset = rd.read_word(4, false, Endian::Little) as u32;
            let section_reloc_offset = rd.read_word(4, false, Endian::Little) as u32;
            let section_lineno_offset = rd.read_word(4, false, Endian::Little) as u32;
            let section_reloc_count = rd.read_word(2, false, Endian::Little) as u32;
            let section_lineno_count = rd.read_word(2, false, Endian::Little) as u32;
            let section_flags = rd.read_word(4, false, Endian::Little) as u32;
            section_offsets.push(section_offset);
            section_lengths.push(if section_virtual_size != 0 {
                section_length.min(section_virtual_size)
            } else {
                section_length
            });
            section_isloaded.push(section_virtual_size != 0);
            section_bases.push(section_address);
            writeln!(out, "Section #{section_number}: {section_name}")?;
            writeln!(
                out,
                "- Address: {section_address:#010x} ({:#010x} virtual)",
                self.image_base + section_address as u64
            )?;
            writeln!(out, "- Offset: {section_offset:#010x}")?;
            writeln!(out, "- Length: {section_length:#010x}")?;
            writeln!(out, "- Memory: {section_virtual_size:#010x}")?;
            write!(out, "- Flags: {section_flags:#010x}")?;
            if section_flags & 0x00000008 != 0 {
                write!(out, ", no padding")?;
            }
            if section_flags & 0x00000020 != 0 {
                write!(out, ", code")?;
            }
            if section_flags & 0x00000040 != 0 {
                write!(out, ", data")?;
            }
            if section_flags & 0x00000080 != 0 {
                write!(out, ", bss")?;
            }
            if section_flags & 0x00000100 != 0 {
                write!(out, ", other")?;
            }
            if section_flags & 0x00000200 != 0 {
                write!(out, ", comment")?;
            }
            if section_flags & 0x00000800 != 0 {
                write!(out, ", removed")?;
            }
            if section_flags & 0x00001000 != 0 {
                write!(out, ", COMDAT")?;
            }
            if section_flags & 0x00008000 != 0 {
                write!(out, ", global pointer data")?;
            }
            if section_flags & 0x00010000 != 0 {
                write!(out, ", purgeable")?;
            }
            if section_flags & 0x00020000 != 0 {
                write!(out, ", 16-bit")?;
            }
            if section_flags & 0x00040000 != 0 {
                write!(out, ", locked")?;
            }
            if section_flags & 0x00080000 != 0 {
                write!(out, ", preload")?;
            }
            if section_flags & 0x00F00000 != 0 {
                write!(out, ", {}-byte aligned", 1u32 << (((section_flags >> 5) & 0xF).saturating_sub(1)))?;
            }
            if section_flags & 0x01000000 != 0 {
                write!(out, ", extended relocations")?;
            }
            if section_flags & 0x02000000 != 0 {
                write!(out, ", discardable")?;
            }
            if section_flags & 0x04000000 != 0 {
                write!(out, ", non-cached")?;
            }
            if section_flags & 0x08000000 != 0 {
                write!(out, ", non-pageable")?;
            }
            if section_flags & 0x10000000 != 0 {
                write!(out, ", shared")?;
            }
            if section_flags & 0x20000000 != 0 {
                write!(out, ", executable")?;
            }
            if section_flags & 0x40000000 != 0 {
                write!(out, ", readable")?;
            }
            if section_flags & 0x80000000 != 0 {
                write!(out, ", writable")?;
            }
            writeln!(out)?;
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

        // Export directory table
        if edata_len != 0 {
            writeln!(out, "== Export directory table")?;
            match self.file_offset(edata_rva) {
                None => eprintln!("Export directory table RVA falls outside section data"),
                Some(edata_start) => {
                    rd.seek(edata_start);
                    rd.skip(4);
                    let ts = rd.read_word(4, false, Endian::Little) as u32;
                    writeln!(out, "Time stamp: {ts:#010x}")?;
                    let ver_major = rd.read_word(2, false, Endian::Little);
                    let ver_minor = rd.read_word(2, false, Endian::Little);
                    writeln!(out, "Version: {ver_major}.{ver_minor}")?;
                    let name_rva = rd.read_word(4, false, Endian::Little) as u32;
                    let name = self.fetch_name(&mut rd, name_rva);
                    writeln!(out, "Name: {:?} ({name_rva:#010x})", name.map(|n| decoder.decode(&n)))?;
                    let ordinal_base = rd.read_word(4, false, Endian::Little) as u32;
                    writeln!(out, "Ordinal base: {ordinal_base:#010x}")?;
                    let address_count = rd.read_word(4, false, Endian::Little) as u32;
                    let name_pointer_count = rd.read_word(4, false, Endian::Little) as u32;
                    let address_table_rva = rd.read_word(4, false, Endian::Little) as u32;
                    let name_pointer_table_rva = rd.read_word(4, false, Endian::Little) as u32;
                    let ordinal_table_rva = rd.read_word(4, false, Endian::Little) as u32;
                    writeln!(out, "Export address table:")?;
                    writeln!(out, "- Offset: {}", self.print_rva(address_table_rva))?;
                    writeln!(out, "- Count: {address_count:#010x}")?;
                    writeln!(out, "Export name table:")?;
                    writeln!(out, "- Offset: {}", self.print_rva(name_pointer_table_rva))?;
                    writeln!(out, "- Count: {name_pointer_count:#010x}")?;
                    writeln!(out, "Ordinal table:")?;
                    writeln!(out, "- Offset: {}", self.print_rva(ordinal_table_rva))?;

                    match self.file_offset(address_table_rva) {
                        None => eprintln!("Address table RVA falls outside section data"),
                        Some(address_table_offset) => {
                            rd.seek(address_table_offset);
                            writeln!(out, "= Entries:")?;
                            for address_number in 0..address_count {
                                let offset = rd.tell();
                                let rva = rd.read_word(4, false, Endian::Little) as u32;
                                if rva >= edata_rva && rva < edata_rva + edata_len {
                                    let forwarder = self.fetch_name(&mut rd, rva);
                                    writeln!(
                                        out,
                                        "[{offset:#010x}] Entry #{}: {:?} -- name string at {}",
                                        ordinal_base + address_number,
                                        forwarder.map(|n| decoder.decode(&n)),
                                        self.print_rva(rva)
                                    )?;
                                } else {
                                    writeln!(
                                        out,
                                        "[{offset:#010x}] Entry #{}: {}",
                                        ordinal_base + address_number,
                                        self.print_rva(rva)
                                    )?;
                                }
                            }
                            let name_pointer_table_offset = self.file_offset(name_pointer_table_rva);
                            let ordinal_table_offset = self.file_offset(ordinal_table_rva);
                            match (name_pointer_table_offset, ordinal_table_offset) {
                                (None, _) => eprintln!("Name pointer table RVA falls outside section data"),
                                (_, None) => eprintln!("Ordinal table RVA falls outside section data"),
                                (Some(npt), Some(ot)) => {
                                    writeln!(out, "= Exported names:")?;
                                    for name_number in 0..name_pointer_count {
                                        rd.seek(npt + name_number as usize * 4);
                                        let rva = rd.read_word(4, false, Endian::Little) as u32;
                                        let name = self.fetch_name(&mut rd, rva);
                                        rd.seek(ot + name_number as usize * 2);
                                        let ordinal = rd.read_word(2, false, Endian::Little) as u32;
                                        writeln!(
                                            out,
                                            "Ordinal {:#010x} name {:?} -- name string at {}",
                                            ordinal_base + ordinal,
                                            name.map(|n| decoder.decode(&n)),
                                            self.print_rva(rva)
                                        )?;
                                    }
                                }
                            }
                        }
                    }
                }
            }
        }

        // Import directory table
        if idata_len != 0 {
            writeln!(out, "== Import directory table")?;
            match self.file_offset(idata_rva) {
                None => eprintln!("Import directory table RVA falls outside section data"),
                Some(idata_start) => {
                    let mut dll_number = 0u32;
                    loop {
                        rd.seek(idata_start + dll_number as usize * 20);
                        let import_lookup_table = rd.read_word(4, false, Endian::Little) as u32;
                        if import_lookup_table == 0 {
                            break;
                        }
                        writeln!(
                            out,
                            "- Imported DLL #{} at {:#010x}",
                            dll_number + 1,
                            idata_start + dll_number as usize * 20
                        )?;
                        let ts = rd.read_word(4, false, Endian::Little) as u32;
                        rd.skip(4); // forwarder chain
                        let name_rva = rd.read_word(4, false, Endian::Little) as u32;
                        let name = self.fetch_name(&mut rd, name_rva);
                        writeln!(
                            out,
                            "Name: {:?} -- name string at {}",
                            name.map(|n| decoder.decode(&n)),
                            self.print_rva(name_rva)
                        )?;
                        writeln!(out, "Time stamp: {ts:#010x}")?;
                        let import_address_table = rd.read_word(4, false, Endian::Little) as u32;
                        writeln!(out, "Import lookup table address: {}", self.print_rva(import_lookup_table))?;
                        writeln!(
                            out,
                            "Import address table (thunk table) address: {}",
                            self.print_rva(import_address_table)
                        )?;
                        dll_number += 1;

                        match self.file_offset(import_lookup_table) {
                            None => {
                                eprintln!("Invalid import lookup table RVA");
                                continue;
                            }
                            Some(ilt_offset) => {
                                writeln!(out, "- Import lookup table")?;
                                let mut entry_count = 0usize;
                                loop {
                                    rd.seek(ilt_offset + entry_count * 4);
                                    let entry = rd.read_word(4, false, Endian::Little) as u64;
                                    if entry == 0 {
                                        break;
                                    }
                                    if entry & (1 << ((wordsize << 3) - 1)) != 0 {
                                        writeln!(
                                            out,
                                            "[{:#010x}] Ordinal {:#06x}",
                                            ilt_offset + entry_count * 4,
                                            entry & 0xFFFF
                                        )?;
                                    } else if let Some((hint, name)) = self.fetch_hint_name(&mut rd, entry as u32) {
                                        writeln!(
                                            out,
                                            "[{:#010x}] Name {:?} hint {hint:#06x} -- hint/name at {}",
                                            ilt_offset + entry_count * 4,
                                            decoder.decode(&name),
                                            self.print_rva(entry as u32)
                                        )?;
                                    }
                                    entry_count += 1;
                                }
                            }
                        }

                        match self.file_offset(import_address_table) {
                            None => {
                                eprintln!("Invalid import address table RVA");
                                continue;
                            }
                            Some(iat_offset) => {
                                writeln!(out, "- Import address table")?;
                                let mut entry_count = 0usize;
                                loop {
                                    rd.seek(iat_offset + entry_count * wordsize);
                                    let entry = rd.read_word(wordsize, false, Endian::Little) as u64;
                                    if entry == 0 {
                                        break;
                                    }
                                    if entry & (1 << ((wordsize << 3) - 1)) != 0 {
                                        writeln!(
                                            out,
                                            "[{:#010x}] Ordinal {:#06x}",
                                            iat_offset + entry_count * 4,
                                            entry & 0xFFFF
                                        )?;
                                    } else if let Some((hint, name)) = self.fetch_hint_name(&mut rd, entry as u32) {
                                        writeln!(
                                            out,
                                            "[{:#010x}] Name {:?} hint {hint:#06x} -- hint/name at {}",
                                            iat_offset + entry_count * 4,
                                            decoder.decode(&name),
                                            self.print_rva(entry as u32)
                                        )?;
                                    }
                                    relocs.insert(import_address_table + (entry_count * wordsize) as u32, wordsize);
                                    entry_count += 1;
                                }
                            }
                        }
                    }
                }
            }
        }

        // Base relocations
        if options.wants_relshow() && reloc_len != 0 {
            writeln!(out, "== Base relocations")?;
            if let Some(reloc_start) = self.file_offset(reloc_rva) {
                rd.seek(reloc_start);
                while rd.tell() < reloc_start + reloc_len as usize {
                    let block_start = rd.tell();
                    let page_rva = rd.read_word(4, false, Endian::Little) as u32;
                    let block_len = rd.read_word(4, false, Endian::Little) as u32;
                    writeln!(out, "- Page {}, length: {block_len:#010x}", self.print_rva(page_rva))?;
                    while rd.tell() < block_start + block_len as usize {
                        let file_offset = rd.tell();
                        let data = rd.read_word(2, false, Endian::Little) as u32;
                        let rel_offset = data & 0x0FFF;
                        let rel_type = data >> 12;
                        let rel_type_name = match rel_type {
                            0 => "unused",
                            1 => "high 16-bit",
                            2 => "low 16-bit",
                            3 => "32-bit",
                            _ => "unknown",
                        };
                        let rel_type_size = match rel_type {
                            1 | 2 => 2,
                            3 => 4,
                            _ => 0,
                        };
                        writeln!(out, "[{file_offset:#010x}] Offset {rel_offset:#06x}, type {rel_type_name} ({data:#05x})")?;
                        if rel_type_size > 0 {
                            relocs.insert(page_rva + rel_offset, rel_type_size);
                        }
                    }
                }
            }
        }

        // Section data
        if options.wants_data() {
            writeln!(out, "== Section data")?;
            for section_number in 0..section_count {
                let file_start = section_offsets[section_number] as usize;
                writeln!(out, "Section #{:#x} data", section_number + 1)?;
                writeln!(out, "[FILE    ] (SECTION ) MEMORY  \tDATA")?;
                let base = section_bases[section_number];
                let start = file_start.min(self.data.len());
                let end = (file_start + section_lengths[section_number] as usize).min(self.data.len());
                let section_data = &self.data[start..end.max(start)];
                let lookup = |position: usize| relocs.get(&(base + position as u32)).copied();
                let rows = hexdump::dump_rows(section_data, 0, decoder, Some(&lookup), 4);
                for row in rows {
                    if section_isloaded[section_number] {
                        writeln!(
                            out,
                            "[{:08X}] ({:08X}) {:08X}\t{}\t{}",
                            file_start + row.offset,
                            row.offset,
                            self.image_base as u32 + base + row.offset as u32,
                            row.hex,
                            row.text
                        )?;
                    } else {
                        writeln!(
                            out,
                            "[{:08X}] ({:08X})         \t{}\t{}",
                            file_start + row.offset,
                            row.offset,
                            row.hex,
                            row.text
                        )?;
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

    fn section(name: &[u8; 8], vsize: u32, addr: u32, len: u32, off: u32) -> Vec<u8> {
        let mut v = Vec::new();
        v.extend(name);
        v.extend(vsize.to_le_bytes());
        v.extend(addr.to_le_bytes());
        v.extend(len.to_le_bytes());
        v.extend(off.to_le_bytes());
        v.extend(0u32.to_le_bytes()); // reloc offset
        v.extend(0u32.to_le_bytes()); // lineno offset
        v.extend(0u16.to_le_bytes()); // reloc count
        v.extend(0u16.to_le_bytes()); // lineno count
        v.extend(0x60000020u32.to_le_bytes()); // code, executable, readable
        v
    }

    /// A minimal stubless PE32: COFF header, a 28-byte optional header
    /// (through the entry point, no data directories), one `.text`
    /// section with an out-of-range import RVA never referenced by
    /// this fixture (a fuller S2-style test lives at the integration
    /// level once more of the format is wired up).
    fn minimal_image() -> Vec<u8> {
        let mut data = Vec::new();
        data.extend(b"PE\0\0");
        data.extend(0x014Cu16.to_le_bytes()); // machine
        data.extend(1u16.to_le_bytes()); // section count
        data.extend(0u32.to_le_bytes()); // timestamp
        data.extend(0u32.to_le_bytes()); // symtab offset
        data.extend(0u32.to_le_bytes()); // symtab count
        data.extend(28u16.to_le_bytes()); // opthdr length
        data.extend(0x0102u16.to_le_bytes()); // flags
        let opthdr_start = data.len();
        data.extend(0x010Bu16.to_le_bytes()); // magic PE32
        data.push(1); // linker major
        data.push(0); // linker minor
        data.extend(0x1000u32.to_le_bytes()); // code size
        data.extend(0u32.to_le_bytes()); // data size
        data.extend(0u32.to_le_bytes()); // bss size
        data.extend(0x1000u32.to_le_bytes()); // entry rva
        data.extend(0x1000u32.to_le_bytes()); // code base
        assert_eq!(data.len() - opthdr_start, 24);
        data.resize(opthdr_start + 28, 0); // pad base-of-data field
        let section_table_start = opthdr_start + 28;
        assert_eq!(section_table_start, data.len());
        data.extend(section(b".text\0\0\0", 0x1000, 0x1000, 0x200, section_table_start + 40));
        data.resize(section_table_start + 40 + 0x200, 0xCC);
        data
    }

    #[test]
    fn header_and_section_table_parse() {
        let data = minimal_image();
        let mut reader = PeReader::new(&data);
        let options = ReadOptions::default();
        let mut out = Vec::new();
        reader.read_file(&options, &mut out).unwrap();
        let text = String::from_utf8(out).unwrap();
        assert!(text.contains("Machine type: Intel i386"));
        assert!(text.contains("Section #1: .text"));
        assert!(text.contains("Magic: PE32 (32-bit)"));
    }

    #[test]
    fn memory_map_resolves_entry_point_in_section() {
        let data = minimal_image();
        let mut reader = PeReader::new(&data);
        let options = ReadOptions::default();
        let mut out = Vec::new();
        reader.read_file(&options, &mut out).unwrap();
        let text = String::from_utf8(out).unwrap();
        assert!(text.contains("Entry point: 0x00001000"));
        assert!(text.contains("in file]"));
    }
}
