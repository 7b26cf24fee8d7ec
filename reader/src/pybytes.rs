//! Python `bytes.__repr__`-style formatting for magic numbers and other
//! short byte strings the original printed directly as a `bytes` value.
//!
//! CPython picks the quote character (prefers `'`, falls back to `"` only
//! if the bytes contain a `'` but no `"`) and escapes non-printable bytes
//! as `\xHH`, matching `\t`/`\n`/`\r`/`\\` to their short escapes.

/// Render `data` the way `repr(data)` would for a Python `bytes` object.
pub fn repr(data: &[u8]) -> String {
    let quote = if data.contains(&b'\'') && !data.contains(&b'"') {
        b'"'
    } else {
        b'\''
    };
    let mut out = String::with_capacity(data.len() + 3);
    out.push('b');
    out.push(quote as char);
    for &byte in data {
        match byte {
            b'\\' => out.push_str("\\\\"),
            b'\t' => out.push_str("\\t"),
            b'\n' => out.push_str("\\n"),
            b'\r' => out.push_str("\\r"),
            byte if byte == quote => {
                out.push('\\');
                out.push(byte as char);
            }
            0x20..=0x7E => out.push(byte as char),
            _ => out.push_str(&format!("\\x{byte:02x}")),
        }
    }
    out.push(quote as char);
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prints_ascii_magic() {
        assert_eq!(repr(b"MZ"), "b'MZ'");
        assert_eq!(repr(b"PE\0\0"), "b'PE\\x00\\x00'");
    }

    #[test]
    fn escapes_backslash_and_quote() {
        assert_eq!(repr(b"a'b"), "b\"a'b\"");
        assert_eq!(repr(b"a\\b"), "b'a\\\\b'");
    }
}
