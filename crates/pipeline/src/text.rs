//! Reply text shaping
//!
//! LLM replies are written for screens; these helpers make them speakable:
//! markdown artifacts are stripped, the reply is truncated at a sentence
//! boundary, and terminal punctuation is guaranteed so the TTS voice falls
//! at the end. Also home to the token-buffer flush heuristic.

/// Remove `[text](url)` links, keeping the link text
fn strip_links(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut rest = text;

    while let Some(open) = rest.find('[') {
        if let Some(close) = rest[open..].find(']').map(|p| open + p) {
            if rest[close + 1..].starts_with('(') {
                if let Some(end) = rest[close + 2..].find(')').map(|p| close + 2 + p) {
                    out.push_str(&rest[..open]);
                    out.push_str(&rest[open + 1..close]);
                    rest = &rest[end + 1..];
                    continue;
                }
            }
        }
        out.push_str(&rest[..=open]);
        rest = &rest[open + 1..];
    }

    out.push_str(rest);
    out
}

/// Remove paired occurrences of a delimiter, keeping the wrapped text
fn strip_paired(text: &str, delim: &str) -> String {
    let mut out = text.to_string();
    loop {
        let Some(first) = out.find(delim) else { break };
        let after = first + delim.len();
        let Some(second) = out[after..].find(delim).map(|p| after + p) else {
            break;
        };
        out.replace_range(second..second + delim.len(), "");
        out.replace_range(first..first + delim.len(), "");
    }
    out
}

/// Drop leading `#` markers from heading lines
fn strip_headings(text: &str) -> String {
    text.lines()
        .map(|line| {
            let trimmed = line.trim_start();
            if trimmed.starts_with('#') {
                trimmed.trim_start_matches('#').trim_start()
            } else {
                line
            }
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// Strip the markdown artifacts LLMs habitually emit
pub fn strip_markdown(text: &str) -> String {
    let text = strip_links(text);
    let text = strip_paired(&text, "**");
    let text = strip_paired(&text, "__");
    let text = strip_paired(&text, "*");
    let text = strip_paired(&text, "_");
    let text = strip_paired(&text, "`");
    strip_headings(&text)
}

/// Byte index just past the `max_chars`-th character
fn char_limit_index(text: &str, max_chars: usize) -> Option<usize> {
    text.char_indices().nth(max_chars).map(|(i, _)| i)
}

/// Truncate to at most `max_chars` characters, preferring a sentence
/// boundary, then a word boundary
pub fn truncate_at_sentence(text: &str, max_chars: usize) -> String {
    let Some(limit) = char_limit_index(text, max_chars) else {
        return text.to_string();
    };
    let head = &text[..limit];

    let sentence_end = head
        .char_indices()
        .filter(|(_, c)| matches!(c, '.' | '!' | '?'))
        .map(|(i, c)| i + c.len_utf8())
        .next_back();

    if let Some(end) = sentence_end {
        return head[..end].trim_end().to_string();
    }
    if let Some(space) = head.rfind(' ') {
        return head[..space].trim_end().to_string();
    }
    head.to_string()
}

/// Append a period when the text does not already end in terminal punctuation
pub fn ensure_terminal_punctuation(text: String) -> String {
    let trimmed = text.trim_end();
    if trimmed.is_empty() {
        return String::new();
    }
    if trimmed.ends_with(['.', '!', '?']) {
        trimmed.to_string()
    } else {
        format!("{}.", trimmed)
    }
}

/// Full reply post-processing applied before the reply enters history
pub fn postprocess_reply(text: &str, max_chars: usize) -> String {
    let stripped = strip_markdown(text);
    let truncated = truncate_at_sentence(stripped.trim(), max_chars);
    ensure_terminal_punctuation(truncated)
}

/// Decide whether the token buffer holds a flushable fragment.
///
/// Returns the byte index to cut at: just past a sentence terminator that is
/// followed by whitespace, or - once the buffer is long enough - at the last
/// space before `hard_limit` characters.
pub fn flush_boundary(
    buffer: &str,
    min_chars: usize,
    min_words: usize,
    hard_limit: usize,
) -> Option<usize> {
    let mut chars = buffer.char_indices().peekable();
    while let Some((i, c)) = chars.next() {
        if matches!(c, '.' | '!' | '?') {
            if let Some((_, next)) = chars.peek() {
                if next.is_whitespace() {
                    return Some(i + c.len_utf8());
                }
            }
        }
    }

    if buffer.chars().count() > min_chars && buffer.split_whitespace().count() >= min_words {
        let mut cut = None;
        for (seen, (i, c)) in buffer.char_indices().enumerate() {
            if seen >= hard_limit {
                break;
            }
            if c == ' ' {
                cut = Some(i);
            }
        }
        return cut;
    }

    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strip_links() {
        assert_eq!(
            strip_links("See [our pricing](https://example.com/p) today"),
            "See our pricing today"
        );
        assert_eq!(strip_links("array[0] stays"), "array[0] stays");
    }

    #[test]
    fn test_strip_emphasis_and_code() {
        assert_eq!(strip_markdown("**Bold** and *italic* and `code`"), "Bold and italic and code");
        assert_eq!(strip_markdown("unpaired * stays"), "unpaired * stays");
    }

    #[test]
    fn test_strip_headings() {
        assert_eq!(strip_markdown("## Plans\nBasic and Pro."), "Plans\nBasic and Pro.");
    }

    #[test]
    fn test_truncate_prefers_sentence_boundary() {
        let text = "First sentence here. Second one is much longer and keeps going on.";
        let out = truncate_at_sentence(text, 30);
        assert_eq!(out, "First sentence here.");
    }

    #[test]
    fn test_truncate_falls_back_to_word_boundary() {
        let text = "no terminal punctuation in this very long stretch of words at all";
        let out = truncate_at_sentence(text, 30);
        assert!(out.chars().count() <= 30);
        assert!(!out.ends_with(' '));
        assert!(text.starts_with(&out));
    }

    #[test]
    fn test_short_text_untouched() {
        assert_eq!(truncate_at_sentence("Short.", 300), "Short.");
    }

    #[test]
    fn test_terminal_punctuation() {
        assert_eq!(ensure_terminal_punctuation("Hello".into()), "Hello.");
        assert_eq!(ensure_terminal_punctuation("Hello!".into()), "Hello!");
        assert_eq!(ensure_terminal_punctuation("  ".into()), "");
    }

    #[test]
    fn test_postprocess_combined() {
        let reply = "**Sure!** Check [the docs](http://x) for details";
        assert_eq!(
            postprocess_reply(reply, 300),
            "Sure! Check the docs for details."
        );
    }

    #[test]
    fn test_flush_on_sentence_boundary() {
        let buffer = "This is done. And this continues";
        let cut = flush_boundary(buffer, 50, 8, 100).unwrap();
        assert_eq!(&buffer[..cut], "This is done.");
    }

    #[test]
    fn test_no_flush_without_trailing_whitespace() {
        // Terminator at the end of the buffer: wait for more tokens
        assert!(flush_boundary("Hello, how are you?", 50, 8, 100).is_none());
    }

    #[test]
    fn test_length_based_flush() {
        let buffer = "one two three four five six seven eight nine ten eleven twelve";
        assert!(buffer.len() > 50);
        let cut = flush_boundary(buffer, 50, 8, 100).unwrap();
        // Cuts at a space; both sides non-empty
        assert!(buffer.as_bytes()[cut] == b' ');
        assert!(!buffer[..cut].trim().is_empty());
    }

    #[test]
    fn test_short_buffer_not_flushed() {
        assert!(flush_boundary("just a few words", 50, 8, 100).is_none());
    }
}
