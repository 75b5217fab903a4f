//! Normalization of raw command output.

/// Convert raw command output to text, stripping ANSI escape sequences.
pub fn clean_output(raw: &[u8]) -> String {
    let cleaned = strip_ansi_escapes::strip(raw);
    String::from_utf8_lossy(&cleaned).into_owned()
}

/// Replace CRLF line endings with LF.
pub fn normalize_line_endings(text: &str) -> String {
    text.replace("\r\n", "\n")
}
