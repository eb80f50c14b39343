//! UTF-8 safe string helpers.
//!
//! PTY output arrives in arbitrary byte chunks, so a multi-byte character can be
//! split across two reads. `Utf8ChunkDecoder` holds back an incomplete trailing
//! sequence until the next chunk completes it, so escape sequences and text reach
//! the client unmodified and in order.

/// Returns a prefix of the string up to `max_chars` characters.
/// Respects UTF-8 boundaries and won't panic on multi-byte characters.
pub fn safe_prefix(s: &str, max_chars: usize) -> &str {
    if s.is_empty() || max_chars == 0 {
        return "";
    }

    let mut end = s.len();
    for (count, (idx, ch)) in s.char_indices().enumerate() {
        if count == max_chars {
            return &s[..idx];
        }
        end = idx + ch.len_utf8();
    }

    &s[..end.min(s.len())]
}

/// Truncate to `max_chars` characters and append an ellipsis when shortened.
pub fn ellipsize(s: &str, max_chars: usize) -> String {
    if s.chars().count() <= max_chars {
        return s.to_string();
    }
    let mut out = safe_prefix(s, max_chars.saturating_sub(1)).to_string();
    out.push('…');
    out
}

/// Incremental decoder that turns a stream of byte chunks into valid UTF-8 strings.
#[derive(Debug, Default)]
pub struct Utf8ChunkDecoder {
    pending: Vec<u8>,
}

impl Utf8ChunkDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Decode `chunk`, carrying an incomplete trailing sequence over to the next call.
    /// Invalid bytes are replaced with U+FFFD.
    pub fn decode(&mut self, chunk: &[u8]) -> String {
        let mut bytes = std::mem::take(&mut self.pending);
        bytes.extend_from_slice(chunk);

        let mut out = String::with_capacity(bytes.len());
        let mut rest = bytes.as_slice();
        loop {
            match std::str::from_utf8(rest) {
                Ok(valid) => {
                    out.push_str(valid);
                    break;
                }
                Err(err) => {
                    let (valid, after) = rest.split_at(err.valid_up_to());
                    // valid_up_to() guarantees this prefix is UTF-8.
                    out.push_str(std::str::from_utf8(valid).unwrap_or_default());
                    match err.error_len() {
                        Some(bad) => {
                            out.push(char::REPLACEMENT_CHARACTER);
                            rest = &after[bad..];
                        }
                        None => {
                            self.pending = after.to_vec();
                            break;
                        }
                    }
                }
            }
        }
        out
    }

    /// Flush whatever is still pending (lossy) once the stream has ended.
    pub fn finish(&mut self) -> String {
        let pending = std::mem::take(&mut self.pending);
        String::from_utf8_lossy(&pending).into_owned()
    }

    pub fn has_pending(&self) -> bool {
        !self.pending.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_safe_prefix() {
        assert_eq!(safe_prefix("hello", 3), "hel");
        assert_eq!(safe_prefix("hello", 10), "hello");
        assert_eq!(safe_prefix("", 3), "");
        assert_eq!(safe_prefix("héllo", 2), "hé");
        assert_eq!(safe_prefix("日本語", 2), "日本");
    }

    #[test]
    fn test_ellipsize() {
        assert_eq!(ellipsize("short", 10), "short");
        assert_eq!(ellipsize("a longer sentence", 8), "a longe…");
    }

    #[test]
    fn decoder_holds_back_split_multibyte_sequence() {
        let mut decoder = Utf8ChunkDecoder::new();
        let bytes = "é→".as_bytes();
        // Split inside the three-byte arrow.
        let first = decoder.decode(&bytes[..3]);
        assert_eq!(first, "é");
        assert!(decoder.has_pending());
        let second = decoder.decode(&bytes[3..]);
        assert_eq!(second, "→");
        assert!(!decoder.has_pending());
    }

    #[test]
    fn decoder_passes_escape_sequences_through() {
        let mut decoder = Utf8ChunkDecoder::new();
        let out = decoder.decode(b"\x1b[1;32mok\x1b[0m\r\n");
        assert_eq!(out, "\x1b[1;32mok\x1b[0m\r\n");
    }

    #[test]
    fn decoder_replaces_invalid_bytes_and_keeps_going() {
        let mut decoder = Utf8ChunkDecoder::new();
        let out = decoder.decode(b"a\xffb");
        assert_eq!(out, "a\u{FFFD}b");
    }

    #[test]
    fn finish_flushes_truncated_tail() {
        let mut decoder = Utf8ChunkDecoder::new();
        let _ = decoder.decode(&[0xe2, 0x86]);
        assert_eq!(decoder.finish(), "\u{FFFD}");
        assert!(!decoder.has_pending());
    }
}
