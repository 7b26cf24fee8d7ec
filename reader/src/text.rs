//! Text decoders for the hex dump's text column.
//!
//! Each decoder turns one input byte into exactly one displayed character
//! so the text column stays aligned with the hex column; none of them can
//! fail or consume a variable number of bytes.

/// Control pictures (U+2400 + byte) for bytes below 0x20, and "␡" for 0x7F.
fn control_glyph(byte: u8) -> Option<char> {
    if byte < 0x20 {
        char::from_u32(0x2400 + byte as u32)
    } else if byte == 0x7F {
        Some('␡')
    } else {
        None
    }
}

/// 7-bit ASCII with control pictures; anything outside 0x20..0x7E (besides
/// the control range) becomes the Unicode replacement character.
pub fn ascii_graphic(byte: u8) -> char {
    if let Some(glyph) = control_glyph(byte) {
        return glyph;
    }
    if byte.is_ascii_graphic() || byte == b' ' {
        byte as char
    } else {
        '\u{FFFD}'
    }
}

/// Code Page 437's own low-control glyphs (indices 0x00-0x1F of the classic
/// IBM PC character set), used instead of the generic control pictures.
const CP437_CONTROL: [char; 32] = [
    '␀', '☺', '☻', '♥', '♦', '♣', '♠', '•', '◘', '○', '◙', '♂', '♀', '♪', '♫', '☼', '►', '◄', '↕',
    '‼', '¶', '§', '▬', '↨', '↑', '↓', '→', '←', '∟', '↔', '▲', '▼',
];

/// Printable CP437 glyphs for 0x20..0xFF (0x7F and 0xA0 handled specially).
const CP437_HIGH: [char; 224] = [
    ' ', '!', '"', '#', '$', '%', '&', '\'', '(', ')', '*', '+', ',', '-', '.', '/', '0', '1', '2',
    '3', '4', '5', '6', '7', '8', '9', ':', ';', '<', '=', '>', '?', '@', 'A', 'B', 'C', 'D', 'E',
    'F', 'G', 'H', 'I', 'J', 'K', 'L', 'M', 'N', 'O', 'P', 'Q', 'R', 'S', 'T', 'U', 'V', 'W', 'X',
    'Y', 'Z', '[', '\\', ']', '^', '_', '`', 'a', 'b', 'c', 'd', 'e', 'f', 'g', 'h', 'i', 'j', 'k',
    'l', 'm', 'n', 'o', 'p', 'q', 'r', 's', 't', 'u', 'v', 'w', 'x', 'y', 'z', '{', '|', '}', '~',
    '⌂', 'Ç', 'ü', 'é', 'â', 'ä', 'à', 'å', 'ç', 'ê', 'ë', 'è', 'ï', 'î', 'ì', 'Ä', 'Å', 'É', 'æ',
    'Æ', 'ô', 'ö', 'ò', 'û', 'ù', 'ÿ', 'Ö', 'Ü', '¢', '£', '¥', '₧', 'ƒ', 'á', 'í', 'ó', 'ú', 'ñ',
    'Ñ', 'ª', 'º', '¿', '⌐', '¬', '½', '¼', '¡', '«', '»', '░', '▒', '▓', '│', '┤', '╡', '╢', '╖',
    '╕', '╣', '║', '╗', '╝', '╜', '╛', '┐', '└', '┴', '┬', '├', '─', '┼', '╞', '╟', '╚', '╔', '╩',
    '╦', '╠', '═', '╬', '╧', '╨', '╤', '╥', '╙', '╘', '╒', '╓', '╫', '╪', '┘', '┌', '█', '▄', '▌',
    '▐', '▀', 'α', 'ß', 'Γ', 'π', 'Σ', 'σ', 'µ', 'τ', 'Φ', 'Θ', 'Ω', 'δ', '∞', 'φ', 'ε', '∩', '≡',
    '±', '≥', '≤', '⌠', '⌡', '÷', '≈', '°', '∙', '·', '√', 'ⁿ', '²', '■', '\u{00A0}',
];

/// Full Code Page 437 mapping with its own control-picture set and two
/// specific substitutions (0x7F -> house glyph, 0xA0 -> replacement glyph).
pub fn cp437_full(byte: u8) -> char {
    if byte == 0xA0 {
        '\u{FFFD}'
    } else if byte == 0x7F {
        '⌂'
    } else if byte < 0x20 {
        CP437_CONTROL[byte as usize]
    } else {
        CP437_HIGH[byte as usize - 0x20]
    }
}

/// Mac OS Roman high half (0x80..0xFF), in byte order.
const MACROMAN_HIGH: [char; 128] = [
    'Ä', 'Å', 'Ç', 'É', 'Ñ', 'Ö', 'Ü', 'á', 'à', 'â', 'ä', 'ã', 'å', 'ç', 'é', 'è', 'ê', 'ë', 'í',
    'ì', 'î', 'ï', 'ñ', 'ó', 'ò', 'ô', 'ö', 'õ', 'ú', 'ù', 'û', 'ü', '†', '°', '¢', '£', '§', '•',
    '¶', 'ß', '®', '©', '™', '´', '¨', '≠', 'Æ', 'Ø', '∞', '±', '≤', '≥', '¥', 'µ', '∂', '∑', '∏',
    'π', '∫', 'ª', 'º', 'Ω', 'æ', 'ø', '¿', '¡', '¬', '√', 'ƒ', '≈', '∆', '«', '»', '…', '\u{00A0}',
    'À', 'Ã', 'Õ', 'Œ', 'œ', '–', '—', '“', '”', '‘', '’', '÷', '◊', 'ÿ', 'Ÿ', '⁄', '€', '‹', '›',
    'ﬁ', 'ﬂ', '‡', '·', '‚', '„', '‰', 'Â', 'Ê', 'Á', 'Ë', 'È', 'Í', 'Î', 'Ï', 'Ì', 'Ó', 'Ô',
    '\u{F8FF}', 'Ò', 'Ú', 'Û', 'Ù', 'ı', 'ˆ', '˜', '¯', '˘', '˙', '˚', '¸', '˝', '˛', 'ˇ',
];

/// Mac OS Roman, ASCII graphic range untouched, control pictures visualized.
pub fn macroman_graphic(byte: u8) -> char {
    if let Some(glyph) = control_glyph(byte) {
        return glyph;
    }
    if byte < 0x80 {
        byte as char
    } else {
        MACROMAN_HIGH[byte as usize - 0x80]
    }
}

/// The Atari ST character table: all 256 bytes index directly into it, no
/// separate control-picture handling.
const ST_TABLE: [char; 256] = [
    '␀', '⇧', '⇩', '⇨', '⇦', '\u{FFFD}', '\u{FFFD}', '\u{FFFD}', '✓', '\u{FFFD}', '\u{FFFD}', '♪',
    '␌', '␍', '\u{FFFD}', '\u{FFFD}', '\u{FFFD}', '\u{FFFD}', '\u{FFFD}', '\u{FFFD}', '\u{FFFD}',
    '\u{FFFD}', '\u{FFFD}', '\u{FFFD}', '\u{FFFD}', '\u{FFFD}', 'ə', '␛', '\u{FFFD}', '\u{FFFD}',
    '\u{FFFD}', '\u{FFFD}', ' ', '!', '\\', '"', '#', '$', '%', '&', '\'', '(', ')', '*', '+', ',',
    '-', '.', '/', '0', '1', '2', '3', '4', '5', '6', '7', '8', '9', ':', ';', '<', '=', '>', '?',
    '@', 'A', 'B', 'C', 'D', 'E', 'F', 'G', 'H', 'I', 'J', 'K', 'L', 'M', 'N', 'O', 'P', 'Q', 'R',
    'S', 'T', 'U', 'V', 'W', 'X', 'Y', 'Z', '[', '\\', ']', '^', '_', '`', 'a', 'b', 'c', 'd', 'e',
    'f', 'g', 'h', 'i', 'j', 'k', 'l', 'm', 'n', 'o', 'p', 'q', 'r', 's', 't', 'u', 'v', 'w', 'x',
    'y', 'z', '{', '|', '}', '~', '⌂', 'Ç', 'ü', 'é', 'â', 'ä', 'à', 'å', 'ç', 'ê', 'ë', 'è', 'ï',
    'î', 'ì', 'Ä', 'Å', 'É', 'æ', 'Æ', 'ô', 'ö', 'ò', 'û', 'ù', 'ÿ', 'Ö', 'Ü', '¢', '£', '¥', 'ß',
    'ƒ', 'á', 'í', 'ó', 'ú', 'ñ', 'Ñ', 'ª', 'º', '¿', '⌐', '¬', '½', '¼', '¡', '«', '»', 'ã', 'õ',
    'Ø', 'ø', 'œ', 'Œ', 'À', 'Ã', 'Õ', '¨', '´', '†', '¶', '©', '®', '™', 'ĳ', 'Ĳ', 'א', 'ב', 'ג',
    'ד', 'ה', 'ו', 'ז', 'ח', 'ט', 'י', 'כ', 'ל', 'מ', 'נ', 'ס', 'ע', 'פ', 'צ', 'ק', 'ר', 'ש', 'ת',
    'ן', 'ך', 'ם', 'ף', 'ץ', '§', '∧', '∞', 'α', 'β', 'Γ', 'π', 'Σ', 'σ', 'µ', 'τ', 'Φ', 'Θ', 'Ω',
    'δ', '∮', 'ϕ', '∈', '∩', '≡', '±', '≥', '≤', '⌠', '⌡', '÷', '≈', '°', '•', '·', '√', 'ⁿ', '²',
    '³',
];

pub fn st_full(byte: u8) -> char {
    ST_TABLE[byte as usize]
}

/// One of the four named decoders, selected by the format's default or an
/// explicit `-Oencoding=` override.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TextDecoder {
    AsciiGraphic,
    Cp437Full,
    MacromanGraphic,
    StFull,
}

impl TextDecoder {
    pub fn by_name(name: &str) -> Option<TextDecoder> {
        match name {
            "ascii_graphic" => Some(TextDecoder::AsciiGraphic),
            "cp437_full" => Some(TextDecoder::Cp437Full),
            "macroman_graphic" => Some(TextDecoder::MacromanGraphic),
            "st_full" => Some(TextDecoder::StFull),
            _ => None,
        }
    }

    pub fn decode_byte(self, byte: u8) -> char {
        match self {
            TextDecoder::AsciiGraphic => ascii_graphic(byte),
            TextDecoder::Cp437Full => cp437_full(byte),
            TextDecoder::MacromanGraphic => macroman_graphic(byte),
            TextDecoder::StFull => st_full(byte),
        }
    }

    pub fn decode(self, bytes: &[u8]) -> String {
        bytes.iter().map(|&b| self.decode_byte(b)).collect()
    }
}

impl Default for TextDecoder {
    fn default() -> Self {
        TextDecoder::Cp437Full
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn one_char_per_byte_all_decoders() {
        let data: Vec<u8> = (0..=255u8).collect();
        for decoder in [
            TextDecoder::AsciiGraphic,
            TextDecoder::Cp437Full,
            TextDecoder::MacromanGraphic,
            TextDecoder::StFull,
        ] {
            let decoded = decoder.decode(&data);
            assert_eq!(decoded.chars().count(), data.len());
        }
    }

    #[test]
    fn ascii_control_pictures() {
        assert_eq!(ascii_graphic(0x00), '␀');
        assert_eq!(ascii_graphic(0x0A), '␊');
        assert_eq!(ascii_graphic(0x7F), '␡');
        assert_eq!(ascii_graphic(b'A'), 'A');
        assert_eq!(ascii_graphic(0x80), '\u{FFFD}');
    }

    #[test]
    fn cp437_specials() {
        assert_eq!(cp437_full(0x00), '␀');
        assert_eq!(cp437_full(0x7F), '⌂');
        assert_eq!(cp437_full(0xA0), '\u{FFFD}');
        assert_eq!(cp437_full(b'A'), 'A');
    }

    #[test]
    fn by_name_roundtrip() {
        assert_eq!(TextDecoder::by_name("cp437_full"), Some(TextDecoder::Cp437Full));
        assert_eq!(TextDecoder::by_name("bogus"), None);
    }
}
