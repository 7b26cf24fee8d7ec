//! CLI front-end for `execdump-reader`.
//!
//! `-F<fmt>` and repeatable `-Okey[=value]` options don't map onto a
//! clap derive struct cleanly, so they're peeled off in a small
//! hand-rolled pass over the raw args first (mirroring `dump.py`'s own
//! `main()` argv loop), and what's left — the filename and `-v` — goes
//! through clap for everything else.

use std::fs;
use std::process::ExitCode;

use clap::Parser;

use execdump_reader::formats::{self, Format};
use execdump_reader::options::ReadOptions;
use execdump_reader::{magic, Error};

#[derive(Parser, Debug)]
#[command(name = "dump", about = "Dump headers, tables and relocations of historical executable formats")]
struct Cli {
    /// Increase log verbosity (-v, -vv); otherwise controlled by RUST_LOG
    #[arg(short = 'v', long = "verbose", action = clap::ArgAction::Count)]
    verbose: u8,

    /// File to analyze
    filename: Option<String>,
}

fn usage(argv0: &str) {
    eprintln!(
        "Usage: {argv0} -F{{cmd|mz|ne|le|pe|aout|coff|minix|68k|tos|zfile|cdos68k|hu|hunk|apple|rsrc|gsos}} <filename>"
    );
}

/// Split `args` (excluding argv0) into `-F`/`-O` flags, handled here, and
/// everything else, handed on to clap.
fn split_args(args: &[String]) -> Result<(Option<Format>, ReadOptions, Vec<String>), String> {
    let mut fmt = None;
    let mut options = ReadOptions::default();
    let mut rest = Vec::new();

    for arg in args {
        if let Some(name) = arg.strip_prefix("-F") {
            match Format::by_cli_name(name) {
                Some(f) => fmt = Some(f),
                None => return Err(format!("unknown format {arg}")),
            }
        } else if let Some(option) = arg.strip_prefix("-O") {
            match option.split_once('=') {
                Some((key, value)) => options.set(key, Some(value)),
                None => options.set(option, None),
            }
        } else {
            rest.push(arg.clone());
        }
    }
    Ok((fmt, options, rest))
}

fn run() -> ExitCode {
    let argv0 = std::env::args().next().unwrap_or_else(|| "dump".to_string());
    let raw_args: Vec<String> = std::env::args().skip(1).collect();
    if raw_args.is_empty() {
        usage(&argv0);
        return ExitCode::SUCCESS;
    }

    let (fmt, options, rest) = match split_args(&raw_args) {
        Ok(parsed) => parsed,
        Err(msg) => {
            eprintln!("Error: {msg}");
            usage(&argv0);
            return ExitCode::SUCCESS;
        }
    };

    let cli = match Cli::try_parse_from(std::iter::once(argv0.clone()).chain(rest)) {
        Ok(cli) => cli,
        Err(err) => {
            err.print().ok();
            return ExitCode::SUCCESS;
        }
    };

    env_logger::Builder::new()
        .filter_level(match cli.verbose {
            0 => log::LevelFilter::Warn,
            1 => log::LevelFilter::Info,
            _ => log::LevelFilter::Debug,
        })
        .parse_default_env()
        .init();

    let Some(filename) = cli.filename else {
        eprintln!("Error: no file provided");
        usage(&argv0);
        return ExitCode::SUCCESS;
    };

    let data = match fs::read(&filename) {
        Ok(data) => data,
        Err(err) => {
            eprintln!("Error: unable to open {filename}: {err}");
            return ExitCode::from(1);
        }
    };

    let format = match fmt {
        Some(fmt) => fmt,
        None => {
            println!("No format provided, attempting to automatically determine it");
            let tag = magic::detect(&data);
            let format = Format::from_magic(tag);
            match format {
                Format::Unimplemented(name) => {
                    eprintln!("Error: unable to determine file format, exiting ({name})");
                    return ExitCode::from(1);
                }
                Format::Mz => println!("Attempting MZ format"),
                Format::Ne => println!("Attempting NE format"),
                Format::Le | Format::Lx => println!("Attempting LE/LX format"),
                Format::Pe => println!("Attempting PE format"),
                Format::AOut => println!("Attempting 32-bit a.out format"),
                Format::Coff => println!("Attempting COFF format"),
                Format::Minix => println!("Attempting MINIX a.out format"),
                Format::Tos => println!("Attempting GEMDOS format"),
                Format::Mc68k => println!("Attempting CP/M-68K non-contiguous format"),
                Format::Mc68kCrunched => println!("Attempting Concurrent DOS 68K crunched format"),
                Format::Hu => println!("Attempting HU format"),
                Format::Hunk => println!("Attempting Hunk format"),
                Format::Apple => println!("Attempting AppleSingle/AppleDouble format"),
                Format::Rsrc => println!("Attempting Macintosh resource format"),
                Format::Cmd | Format::Zfile | Format::Cdos68k | Format::Gsos => {}
            }
            format
        }
    };

    let stdout = std::io::stdout();
    let mut out = stdout.lock();
    match formats::dispatch(format, &data, &options, &mut out) {
        Ok(()) => ExitCode::SUCCESS,
        Err(Error::UnimplementedFormat(name)) => {
            eprintln!("Parser not implemented ({name})");
            ExitCode::from(1)
        }
        Err(err) => {
            eprintln!("Error: {err}");
            ExitCode::from(1)
        }
    }
}

fn main() -> ExitCode {
    run()
}
