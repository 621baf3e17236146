//! TEXT value escaping (RFC 5545 section 3.3.11).
//!
//! Both directions work in a single left-to-right pass, so each escape
//! sequence is consumed exactly once and `\\n` never turns into a newline.

/// Escape a TEXT value: backslash, then `;` and `,`, then newlines.
pub fn escape_text(text: &str) -> String {
    let mut out = String::with_capacity(text.len() + 8);
    let mut chars = text.chars().peekable();

    while let Some(c) = chars.next() {
        match c {
            '\\' => out.push_str("\\\\"),
            ';' => out.push_str("\\;"),
            ',' => out.push_str("\\,"),
            '\n' => out.push_str("\\n"),
            '\r' => {
                // CRLF and lone CR both become one escaped newline
                if chars.peek() == Some(&'\n') {
                    chars.next();
                }
                out.push_str("\\n");
            }
            other => out.push(other),
        }
    }

    out
}

/// Reverse [`escape_text`]: `\n`/`\N`, `\,`, `\;` and `\\`.
///
/// Unknown escapes are kept verbatim, including the backslash.
pub fn unescape_text(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut chars = text.chars();

    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('n' | 'N') => out.push('\n'),
            Some(',') => out.push(','),
            Some(';') => out.push(';'),
            Some('\\') => out.push('\\'),
            Some(other) => {
                out.push('\\');
                out.push(other);
            }
            None => out.push('\\'),
        }
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_escape_order() {
        assert_eq!(
            escape_text("Room 101; Bldg A, 2nd floor\nBring a \\ laptop"),
            "Room 101\\; Bldg A\\, 2nd floor\\nBring a \\\\ laptop"
        );
        assert_eq!(escape_text("line\r\nbreak"), "line\\nbreak");
    }

    #[test]
    fn test_carriage_returns_come_back_as_newlines() {
        assert_eq!(escape_text("a\rb"), "a\\nb");
        assert_eq!(unescape_text(&escape_text("a\rb")), "a\nb");
        assert_eq!(unescape_text(&escape_text("a\r\nb")), "a\nb");
    }

    #[test]
    fn test_unescape_feed_text() {
        assert_eq!(
            unescape_text("Snacks\\, drinks\\; games\\nRSVP \\\\ email"),
            "Snacks, drinks; games\nRSVP \\ email"
        );
        assert_eq!(unescape_text("Upper\\Ncase"), "Upper\ncase");
        assert_eq!(unescape_text("C:\\temp"), "C:\\temp");
        assert_eq!(unescape_text("trailing\\"), "trailing\\");
    }

    #[test]
    fn test_escaped_backslash_before_n_is_not_a_newline() {
        assert_eq!(unescape_text("path\\\\new"), "path\\new");
    }

    #[test]
    fn test_round_trip_preserves_special_characters() {
        let samples = [
            "\\n",
            "\\,;\n",
            "a\\\\b",
            ",,;;\n\n\\\\",
            "end with backslash \\",
            "Meet at \\N, not \\;",
            "",
            "plain text",
            "\\\n,\\;\\,",
        ];
        for sample in samples {
            assert_eq!(
                unescape_text(&escape_text(sample)),
                sample,
                "round trip failed for {sample:?}"
            );
        }
    }
}
