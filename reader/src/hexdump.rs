//! Row-oriented hex dump with relocation-span underlining.
//!
//! Ported from `FileReader.get_rows`/`signal_reloc`/`process_data`: rows
//! are always 16 bytes wide and aligned to 16-byte boundaries regardless
//! of where the dumped window actually starts; a short first row is
//! padded on the left, and a relocation whose span crosses a row
//! boundary is truncated at the boundary and picked back up on the next
//! row, by re-querying the callback for `row + offset` with `offset`
//! ranging down to `-(max_reloc_size - 1)`.

use crate::text::TextDecoder;

const ROW_LENGTH: usize = 16;
const ESC_START: &str = "\u{1b}[4m";
const ESC_END: &str = "\u{1b}[m";

/// One rendered row: absolute byte offset, the hex column, the text column.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Row {
    pub offset: usize,
    pub hex: String,
    pub text: String,
}

/// A relocation span clipped to the current row, in row-relative
/// character coordinates (`0..16` for the text column).
struct Span {
    start: usize,
    end: usize,
}

fn row_span(offset: isize, size: isize) -> Option<Span> {
    if offset + size <= 0 {
        return None;
    }
    let start = offset.max(0);
    let length = size.min(ROW_LENGTH as isize - offset);
    let end = offset + length;
    Some(Span {
        start: start.clamp(0, ROW_LENGTH as isize) as usize,
        end: end.clamp(0, ROW_LENGTH as isize) as usize,
    })
}

fn apply_spans_text(chars: &[char], spans: &[Span]) -> String {
    let mut out = String::with_capacity(chars.len() + spans.len() * 8);
    let mut cursor = 0;
    for span in spans {
        out.extend(chars[cursor..span.start].iter());
        out.push_str(ESC_START);
        out.extend(chars[span.start..span.end].iter());
        out.push_str(ESC_END);
        cursor = span.end;
    }
    out.extend(chars[cursor..].iter());
    out
}

/// A span in text-column coordinates translates to hex-column coordinates
/// as `3*start .. 3*end - 1` (each byte is "XX ", the trailing space of
/// the last underlined byte is excluded to match the un-padded column).
fn apply_spans_hex(hex_chars: &[char], spans: &[Span]) -> String {
    let mut out = String::with_capacity(hex_chars.len() + spans.len() * 8);
    let mut cursor = 0;
    for span in spans {
        let start = (3 * span.start).min(hex_chars.len());
        let end = (3 * span.end).saturating_sub(1).min(hex_chars.len());
        out.extend(hex_chars[cursor..start].iter());
        out.push_str(ESC_START);
        out.extend(hex_chars[start..end].iter());
        out.push_str(ESC_END);
        cursor = end;
    }
    out.extend(hex_chars[cursor..].iter());
    out
}

/// Render `data` (starting at absolute file/segment offset `start_offset`)
/// as 16-byte-aligned rows. `reloc_width_at(position)` returns the width
/// of a relocation beginning exactly at that absolute position, if any;
/// pass `None` to render a plain dump with no underlining.
pub fn dump_rows(
    data: &[u8],
    start_offset: usize,
    decoder: TextDecoder,
    reloc_width_at: Option<&dyn Fn(usize) -> Option<usize>>,
    max_reloc_size: usize,
) -> Vec<Row> {
    if data.is_empty() {
        return Vec::new();
    }
    let row_start0 = (start_offset / ROW_LENGTH) * ROW_LENGTH;
    let mut leading = start_offset - row_start0;
    let end_offset = start_offset + data.len();

    let mut rows = Vec::new();
    let mut row = row_start0;
    let mut data_pos = 0usize;
    while row < end_offset {
        let count = ROW_LENGTH - leading;
        let take = count.min(end_offset - row - leading);
        let row_bytes = &data[data_pos..data_pos + take];
        data_pos += take;

        let mut hex_chars: Vec<char> = Vec::with_capacity(ROW_LENGTH * 3 - 1);
        let mut text_chars: Vec<char> = Vec::with_capacity(ROW_LENGTH);
        for _ in 0..leading {
            hex_chars.extend([' ', ' ', ' ']);
            text_chars.push(' ');
        }
        for (i, &byte) in row_bytes.iter().enumerate() {
            if i > 0 || leading > 0 {
                hex_chars.push(' ');
            }
            for c in format!("{byte:02X}").chars() {
                hex_chars.push(c);
            }
            text_chars.push(decoder.decode_byte(byte));
        }
        while hex_chars.len() < ROW_LENGTH * 3 - 1 {
            hex_chars.push(' ');
        }
        while text_chars.len() < leading + row_bytes.len() {
            text_chars.push(' ');
        }

        let mut spans = Vec::new();
        if let Some(lookup) = reloc_width_at {
            for off in (-(max_reloc_size as isize - 1)..ROW_LENGTH as isize).rev() {
                let absolute = row as isize + off;
                if absolute < 0 {
                    continue;
                }
                if let Some(size) = lookup(absolute as usize) {
                    if let Some(span) = row_span(off, size as isize) {
                        spans.push(span);
                    }
                }
            }
            spans.sort_by_key(|s| s.start);
        }

        let hex = apply_spans_hex(&hex_chars, &spans);
        let text = apply_spans_text(&text_chars, &spans);
        rows.push(Row {
            offset: row,
            hex,
            text,
        });

        leading = 0;
        row += ROW_LENGTH;
    }
    rows
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_row_no_relocations() {
        let data = [0x41u8, 0x42, 0x43];
        let rows = dump_rows(&data, 0, TextDecoder::AsciiGraphic, None, 2);
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].offset, 0);
        assert_eq!(rows[0].hex, "41 42 43                                       ");
        assert!(rows[0].text.starts_with("ABC"));
    }

    #[test]
    fn leading_padding_when_offset_not_aligned() {
        let data = [0xFFu8; 4];
        let rows = dump_rows(&data, 2, TextDecoder::AsciiGraphic, None, 2);
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].offset, 0);
        assert!(rows[0].hex.starts_with("      "));
    }

    #[test]
    fn row_boundary_split() {
        let data = [0u8; 20];
        let rows = dump_rows(&data, 0, TextDecoder::AsciiGraphic, None, 2);
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].offset, 0);
        assert_eq!(rows[1].offset, 16);
    }

    #[test]
    fn relocation_span_underlines_hex_and_text() {
        let data = [0x00u8, 0x00, 0x11, 0x22, 0x00, 0x00];
        let lookup = |pos: usize| if pos == 2 { Some(2) } else { None };
        let rows = dump_rows(&data, 0, TextDecoder::AsciiGraphic, Some(&lookup), 2);
        assert_eq!(rows.len(), 1);
        assert!(rows[0].hex.contains("\u{1b}[4m"));
        assert!(rows[0].hex.contains("\u{1b}[m"));
        assert!(rows[0].text.contains("\u{1b}[4m"));
    }

    #[test]
    fn relocation_crossing_row_boundary_truncates_and_reapplies() {
        let data = [0u8; 20];
        // a 4-byte relocation starting at position 15 spans into the next row
        let lookup = |pos: usize| if pos == 15 { Some(4) } else { None };
        let rows = dump_rows(&data, 0, TextDecoder::AsciiGraphic, Some(&lookup), 4);
        assert_eq!(rows.len(), 2);
        assert!(rows[0].hex.contains("\u{1b}[4m"));
        assert!(rows[1].hex.contains("\u{1b}[4m"));
    }
}
