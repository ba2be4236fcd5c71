/// Whether a character is outside the ranges XML 1.0 allows.
///
/// Surrogates cannot occur in a Rust string, so only the C0 controls other
/// than tab, newline and carriage return, and the two non-characters
/// U+FFFE and U+FFFF are checked.
pub fn is_xml_invalid(c: char) -> bool {
    matches!(c, '\u{0}'..='\u{8}' | '\u{b}' | '\u{c}' | '\u{e}'..='\u{1f}' | '\u{fffe}' | '\u{ffff}')
}

/// Replace characters that XML cannot carry.
pub fn escape_invalid_chars(text: &str, replacement: char) -> String {
    text.chars()
        .map(|c| if is_xml_invalid(c) { replacement } else { c })
        .collect()
}
