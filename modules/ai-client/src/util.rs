/// Truncate a string to at most `max_chars` Unicode scalar values.
pub fn truncate_chars(s: &str, max_chars: usize) -> &str {
    match s.char_indices().nth(max_chars) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}

/// Replace every line break with a single space.
pub fn flatten_newlines(s: &str) -> String {
    s.replace("\r\n", " ").replace(['\n', '\r'], " ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_truncate_chars_counts_scalars_not_bytes() {
        let text = "שלום עולם";
        assert_eq!(truncate_chars(text, 4), "שלום");
        assert_eq!(truncate_chars(text, 100), text);
        assert_eq!(truncate_chars("", 3), "");
    }

    #[test]
    fn test_flatten_newlines() {
        assert_eq!(flatten_newlines("a\nb\r\nc\rd"), "a b c d");
    }
}
