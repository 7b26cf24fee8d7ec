//! Per-invocation dump options, threaded by value into every
//! `FormatReader::read_file`.
//!
//! The Rust shape of `dump.py`'s `options` dict: there, flags are looked
//! up with `options.get('data', False)` at each call site; here they are
//! named fields so a reader can destructure once at the top of
//! `read_file` instead of repeating string lookups.

use crate::text::TextDecoder;

#[derive(Debug, Clone)]
pub struct ReadOptions {
    /// Dump raw segment/section bytes through the hex-dump formatter.
    pub data: bool,
    /// Emit relocation records as text (one line per entry).
    pub rel: bool,
    /// Annotate the hex dump with underlined relocation spans.
    pub relshow: bool,
    /// Implies `data`, `rel` and `relshow` together.
    pub showall: bool,
    /// Override the reader's default text encoding for hex-dump text
    /// columns; `None` means "use the format's own default".
    pub encoding: Option<String>,
}

impl Default for ReadOptions {
    fn default() -> Self {
        ReadOptions {
            data: false,
            rel: false,
            relshow: false,
            showall: false,
            encoding: None,
        }
    }
}

impl ReadOptions {
    pub fn wants_data(&self) -> bool {
        self.data || self.showall
    }

    pub fn wants_rel(&self) -> bool {
        self.rel || self.showall
    }

    pub fn wants_relshow(&self) -> bool {
        self.relshow || self.showall
    }

    /// Resolve the effective decoder: an explicit `-Oencoding=` override if
    /// named and valid, otherwise the format's own default.
    pub fn decoder(&self, format_default: TextDecoder) -> TextDecoder {
        self.encoding
            .as_deref()
            .and_then(TextDecoder::by_name)
            .unwrap_or(format_default)
    }

    /// Apply one `-Okey[=value]` pair, as parsed by the CLI layer.
    pub fn set(&mut self, key: &str, value: Option<&str>) {
        match key {
            "data" => self.data = true,
            "rel" => self.rel = true,
            "relshow" => self.relshow = true,
            "showall" => self.showall = true,
            "encoding" => self.encoding = value.map(str::to_string),
            _ => log::warn!("unrecognized option -O{key}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn showall_implies_everything() {
        let mut opts = ReadOptions::default();
        opts.set("showall", None);
        assert!(opts.wants_data());
        assert!(opts.wants_rel());
        assert!(opts.wants_relshow());
    }

    #[test]
    fn encoding_override_falls_back_on_unknown_name() {
        let mut opts = ReadOptions::default();
        opts.set("encoding", Some("bogus"));
        assert_eq!(opts.decoder(TextDecoder::StFull), TextDecoder::StFull);
        opts.set("encoding", Some("ascii_graphic"));
        assert_eq!(opts.decoder(TextDecoder::StFull), TextDecoder::AsciiGraphic);
    }
}
