//! Format tag enum and the common reader capability.
//!
//! Deliberately not a string-keyed registry: the driver's CLI-format
//! string and the magic detector's tag both resolve to this one enum,
//! and dispatch is a single `match` in `dispatch()` below — the natural
//! site for it, per the "dynamically-built readers vs static
//! polymorphism" choice.

pub mod aout;
pub mod apple;
pub mod coff;
pub mod cpm68k;
pub mod cpm86;
pub mod gsos;
pub mod hu;
pub mod hunk;
pub mod le;
pub mod macrsrc;
pub mod minix;
pub mod mz;
pub mod ne;
pub mod pe;

use crate::error::Result;
use crate::options::ReadOptions;

/// All formats the driver can name with `-F`, plus the ones magic
/// detection alone can produce (ELF/Mach-O/etc. fold into `Unimplemented`
/// since no reader exists for them, matching spec's Non-goals).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Format {
    Cmd,
    Mz,
    Ne,
    Le,
    Lx,
    Pe,
    AOut,
    Coff,
    Minix,
    Mc68k,
    Tos,
    Zfile,
    Cdos68k,
    Hu,
    Hunk,
    Apple,
    Rsrc,
    Gsos,
    /// Auto-detected-only: magic 0x601C, Concurrent DOS 68K's crunched
    /// (compressed) variant. `dump.py` detects it but never had a reader
    /// for it either, unlike plain `-Fcdos68k` (magic 0x601C, uncompressed).
    Mc68kCrunched,
    Unimplemented(&'static str),
}

impl Format {
    /// Parse a `-F<fmt>` CLI argument.
    pub fn by_cli_name(name: &str) -> Option<Format> {
        Some(match name {
            "cmd" => Format::Cmd,
            "mz" => Format::Mz,
            "ne" => Format::Ne,
            "le" => Format::Le,
            "lx" => Format::Lx,
            "pe" => Format::Pe,
            "aout" => Format::AOut,
            "coff" => Format::Coff,
            "minix" => Format::Minix,
            "68k" => Format::Mc68k,
            "tos" => Format::Tos,
            "zfile" => Format::Zfile,
            "cdos68k" => Format::Cdos68k,
            "hu" => Format::Hu,
            "hunk" => Format::Hunk,
            "apple" => Format::Apple,
            "rsrc" => Format::Rsrc,
            "gsos" => Format::Gsos,
            _ => return None,
        })
    }

    /// Map a `MagicDetector` tag to the corresponding reader format; tags
    /// with no reader (ELF, Mach-O, Adam, D3X, DX64, CP/M-8000, MP/MQ,
    /// P2/P3, BW, UZI-280) fold to `Unimplemented`.
    pub fn from_magic(tag: crate::magic::Format) -> Format {
        use crate::magic::Format as M;
        match tag {
            M::Mz => Format::Mz,
            M::Ne => Format::Ne,
            M::Le => Format::Le,
            M::AOut => Format::AOut,
            M::Coff => Format::Coff,
            M::Minix => Format::Minix,
            // 0x601A (contiguous) auto-detects to the GEMDOS variant;
            // 0x601B (noncontiguous) to plain CP/M-68K.
            M::Mc68kContiguous => Format::Tos,
            M::Mc68kNoncontiguous => Format::Mc68k,
            M::Mc68kCrunched => Format::Mc68kCrunched,
            M::Hu => Format::Hu,
            M::Pe => Format::Pe,
            M::Hunk => Format::Hunk,
            M::Apple => Format::Apple,
            M::Elf => Format::Unimplemented("ELF"),
            M::MacRsrc => Format::Rsrc,
            M::Adam => Format::Unimplemented("Adam"),
            M::D3x => Format::Unimplemented("D3X"),
            M::Dx64 => Format::Unimplemented("DX64"),
            M::Cpm8000 => Format::Unimplemented("CP/M-8000"),
            M::MpMq => Format::Unimplemented("MP/MQ"),
            M::P2P3 => Format::Unimplemented("P2/P3"),
            M::Bw => Format::Unimplemented("BW"),
            M::Uzi280 => Format::Unimplemented("UZI-280"),
        }
    }
}

/// Every format reader exposes this single entry point. Output goes
/// directly to `out` as lines of text; readers never return structured
/// data to the driver.
pub trait FormatReader {
    fn read_file(&mut self, options: &ReadOptions, out: &mut dyn std::io::Write) -> Result<()>;
}

/// Construct and run the reader for `format` against `data`, or report
/// "Parser not implemented" for formats with no reader.
pub fn dispatch(
    format: Format,
    data: &[u8],
    options: &ReadOptions,
    out: &mut dyn std::io::Write,
) -> Result<()> {
    match format {
        Format::Cmd => cpm86::Cpm86Reader::new(data).read_file(options, out),
        Format::Mz => mz::MzReader::new(data).read_file(options, out),
        Format::Ne => ne::NeReader::new(data).read_file(options, out),
        Format::Le | Format::Lx => le::LeReader::new(data).read_file(options, out),
        Format::Pe => pe::PeReader::new(data).read_file(options, out),
        Format::AOut => aout::AOutReader::new(data).read_file(options, out),
        Format::Coff => coff::CoffReader::new(data).read_file(options, out),
        Format::Minix => minix::MinixReader::new(data).read_file(options, out),
        Format::Mc68k | Format::Tos | Format::Zfile | Format::Cdos68k => {
            cpm68k::Cpm68kReader::new(data, variant_of(format)).read_file(options, out)
        }
        Format::Hu => hu::HuReader::new(data).read_file(options, out),
        Format::Hunk => hunk::HunkReader::new(data).read_file(options, out),
        Format::Apple => apple::AppleReader::new(data).read_file(options, out),
        Format::Rsrc => macrsrc::MacRsrcReader::new(data, 0).read_file(options, out),
        Format::Gsos => gsos::GsosReader::new(data).read_file(options, out),
        Format::Mc68kCrunched => Err(crate::error::Error::UnimplementedFormat("Concurrent DOS 68K crunched")),
        Format::Unimplemented(name) => Err(crate::error::Error::UnimplementedFormat(name)),
    }
}

fn variant_of(format: Format) -> cpm68k::Variant {
    match format {
        Format::Tos => cpm68k::Variant::Gemdos,
        Format::Zfile => cpm68k::Variant::Human68k,
        Format::Cdos68k => cpm68k::Variant::ConcurrentDos68k,
        _ => cpm68k::Variant::CpmContiguous,
    }
}
