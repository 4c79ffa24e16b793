//! Text preparation shared by the renderers.

/// Replace typographic punctuation with ASCII equivalents, then replace anything the
/// built-in PDF fonts cannot draw with `?`. Newlines survive.
pub fn sanitize(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '\u{2018}' | '\u{2019}' | '\u{201A}' | '\u{2032}' => out.push('\''),
            '\u{201C}' | '\u{201D}' | '\u{201E}' | '\u{2033}' => out.push('"'),
            '\u{2013}' | '\u{2014}' | '\u{2212}' => out.push('-'),
            '\u{2022}' | '\u{25CF}' | '\u{25AA}' => out.push('-'),
            '\u{2026}' => out.push_str("..."),
            '\u{00A0}' | '\u{2009}' | '\u{202F}' | '\t' => out.push(' '),
            '\n' => out.push('\n'),
            '\r' => {}
            ' '..='~' | '\u{00A1}'..='\u{00FF}' => out.push(c),
            _ => out.push('?'),
        }
    }
    out
}

/// Encode already-sanitized text as single-byte WinAnsi (Latin-1 range) bytes.
pub fn latin1_bytes(text: &str) -> Vec<u8> {
    text.chars().map(|c| if (c as u32) < 256 { c as u32 as u8 } else { b'?' }).collect()
}

/// Body point size for a slide carrying `char_count` characters of body text.
pub fn body_font_size(char_count: usize) -> f32 {
    match char_count {
        0..=300 => 24.0,
        301..=600 => 20.0,
        601..=1000 => 16.0,
        _ => 14.0,
    }
}

/// Rough Helvetica advance width as a fraction of the point size.
const AVG_GLYPH_WIDTH: f32 = 0.5;

/// Greedy word wrap to fit `width` points at `font_size`.
pub fn wrap(text: &str, width: f32, font_size: f32) -> Vec<String> {
    let max_chars = ((width / (font_size * AVG_GLYPH_WIDTH)).floor() as usize).max(8);
    let mut lines = Vec::new();

    for paragraph in text.split('\n') {
        let mut current = String::new();
        for word in paragraph.split_whitespace() {
            let mut word = word.to_string();
            while word.chars().count() > max_chars {
                if !current.is_empty() {
                    lines.push(std::mem::take(&mut current));
                }
                let split: String = word.chars().take(max_chars).collect();
                word = word.chars().skip(max_chars).collect();
                lines.push(split);
            }
            if current.is_empty() {
                current = word;
            } else if current.chars().count() + 1 + word.chars().count() <= max_chars {
                current.push(' ');
                current.push_str(&word);
            } else {
                lines.push(std::mem::replace(&mut current, word));
            }
        }
        if !current.is_empty() {
            lines.push(current);
        }
    }
    lines
}

/// Escape the five XML special characters and drop control characters XML forbids.
pub fn xml_escape(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&apos;"),
            '\t' | '\n' | '\r' => out.push(c),
            c if (c as u32) < 0x20 => {}
            c => out.push(c),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sanitize_typographic_punctuation() {
        assert_eq!(sanitize("\u{201C}Don\u{2019}t\u{201D} \u{2014} wait\u{2026}"), "\"Don't\" - wait...");
        assert_eq!(sanitize("\u{2022} point"), "- point");
    }

    #[test]
    fn test_sanitize_keeps_latin1_and_replaces_the_rest() {
        assert_eq!(sanitize("caf\u{e9} na\u{ef}ve"), "caf\u{e9} na\u{ef}ve");
        assert_eq!(sanitize("\u{4F60}\u{597D} ok"), "?? ok");
        assert_eq!(sanitize("rocket \u{1F680}"), "rocket ?");
        assert_eq!(sanitize("a\r\nb"), "a\nb");
    }

    #[test]
    fn test_latin1_bytes() {
        assert_eq!(latin1_bytes("caf\u{e9}"), vec![b'c', b'a', b'f', 0xE9]);
    }

    #[test]
    fn test_font_ladder() {
        assert_eq!(body_font_size(0), 24.0);
        assert_eq!(body_font_size(300), 24.0);
        assert_eq!(body_font_size(301), 20.0);
        assert_eq!(body_font_size(600), 20.0);
        assert_eq!(body_font_size(601), 16.0);
        assert_eq!(body_font_size(1000), 16.0);
        assert_eq!(body_font_size(1001), 14.0);
        assert_eq!(body_font_size(50_000), 14.0);
    }

    #[test]
    fn test_wrap_respects_width() {
        let text = "the quick brown fox jumps over the lazy dog ".repeat(10);
        let lines = wrap(&text, 200.0, 20.0);
        assert!(lines.len() > 1);
        assert!(lines.iter().all(|l| l.chars().count() <= 20));
        assert_eq!(lines.join(" ").split_whitespace().count(), 90);
    }

    #[test]
    fn test_wrap_splits_long_words_and_keeps_paragraphs() {
        let lines = wrap(&format!("{}\nnext", "x".repeat(25)), 100.0, 20.0);
        assert_eq!(lines, vec!["x".repeat(10), "x".repeat(10), "x".repeat(5), "next".to_string()]);
    }

    #[test]
    fn test_xml_escape() {
        assert_eq!(xml_escape("a < b & \"c\"\u{7}"), "a &lt; b &amp; &quot;c&quot;");
    }
}
