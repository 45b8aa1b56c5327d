use std::borrow::Cow;

/// Control bytes removed from feed text: C0 controls except tab, LF and CR,
/// plus DEL.
fn is_control_byte(b: u8) -> bool {
    b == 0x7f || (b < 0x20 && b != 0x09 && b != 0x0a && b != 0x0d)
}

/// Strip control characters and ANSI escape sequences from feed text.
///
/// Feed titles and descriptions end up in chat messages and in log lines;
/// escape sequences are removed whole, payload included.
///
/// Strips:
/// - ASCII control chars: 0x00-0x08, 0x0B-0x0C, 0x0E-0x1F, 0x7F
/// - ANSI CSI sequences: `\x1b[` ... (final byte 0x40-0x7E)
/// - ANSI OSC sequences: `\x1b]` ... (until BEL 0x07 or ST `\x1b\\`)
/// - Bare ESC (0x1b) not followed by `[` or `]`
///
/// Preserves tab, newline and carriage return. Returns `Cow::Borrowed` when
/// there is nothing to strip.
pub fn strip_control_chars(s: &str) -> Cow<'_, str> {
    let bytes = s.as_bytes();
    let len = bytes.len();

    if !bytes.iter().any(|&b| b == 0x1b || is_control_byte(b)) {
        return Cow::Borrowed(s);
    }

    let mut out = String::with_capacity(len);
    let mut i = 0;

    while i < len {
        let b = bytes[i];

        if b == 0x1b {
            match bytes.get(i + 1) {
                Some(b'[') => {
                    // CSI: parameter/intermediate bytes up to and including the final byte
                    i += 2;
                    while i < len {
                        let c = bytes[i];
                        i += 1;
                        if (0x40..=0x7e).contains(&c) {
                            break;
                        }
                    }
                }
                Some(b']') => {
                    // OSC: everything up to BEL or ST
                    i += 2;
                    while i < len {
                        if bytes[i] == 0x07 {
                            i += 1;
                            break;
                        }
                        if bytes[i] == 0x1b && bytes.get(i + 1) == Some(&b'\\') {
                            i += 2;
                            break;
                        }
                        i += 1;
                    }
                }
                _ => i += 1,
            }
        } else if is_control_byte(b) {
            i += 1;
        } else {
            let start = i;
            i += 1;
            while i < len && bytes[i] != 0x1b && !is_control_byte(bytes[i]) {
                i += 1;
            }
            // Only ASCII bytes end a run, so the slice is on char boundaries
            out.push_str(&s[start..i]);
        }
    }

    Cow::Owned(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strip_clean_text_returns_borrowed() {
        let input = "line1\nline2\ttabbed\r\nwindows";
        let result = strip_control_chars(input);
        assert!(matches!(result, Cow::Borrowed(_)));
        assert_eq!(result, input);
    }

    #[test]
    fn test_strip_control_chars_removes_controls() {
        let result = strip_control_chars("he\x00ll\x07o\x08 w\x0bor\x0cld\x01!\x7f");
        assert!(matches!(result, Cow::Owned(_)));
        assert_eq!(result, "hello world!");
    }

    #[test]
    fn test_strip_ansi_sequences_with_payload() {
        assert_eq!(strip_control_chars("\x1b[31mRed text\x1b[0m"), "Red text");
        assert_eq!(strip_control_chars("before\x1b[2Aafter"), "beforeafter");
    }

    #[test]
    fn test_strip_osc_sequences() {
        assert_eq!(strip_control_chars("\x1b]0;title\x07safe"), "safe");
        assert_eq!(strip_control_chars("\x1b]0;title\x1b\\safe"), "safe");
    }

    #[test]
    fn test_strip_bare_and_trailing_esc() {
        assert_eq!(strip_control_chars("before\x1bafter"), "beforeafter");
        assert_eq!(strip_control_chars("end\x1b"), "end");
        assert_eq!(strip_control_chars("end\x1b["), "end");
    }

    #[test]
    fn test_strip_unicode_preserved() {
        let input = "\u{65e5}\u{672c} \x1b[31m\u{8d64}\x1b[0m caf\u{e9}";
        assert_eq!(strip_control_chars(input), "\u{65e5}\u{672c} \u{8d64} caf\u{e9}");
    }
}
