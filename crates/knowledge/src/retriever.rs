//! Keyword retrieval over knowledge chunks
//!
//! Deterministic and reproducible: no embeddings, no randomness. A chunk's
//! score is the sum of word-boundary hits for each query token, plus a bonus
//! when the full query phrase appears verbatim, plus a small bonus for
//! heading- or definition-shaped chunks.

/// Lowercased query tokens, whitespace-split, single-character tokens dropped
fn tokenize(query: &str) -> Vec<String> {
    query
        .to_lowercase()
        .split_whitespace()
        .filter(|t| t.chars().count() >= 2)
        .map(str::to_string)
        .collect()
}

/// Occurrences of `token` in `haystack` bounded by non-alphanumeric chars
fn word_boundary_count(haystack: &str, token: &str) -> u32 {
    if token.is_empty() {
        return 0;
    }
    let mut count = 0;
    for (pos, _) in haystack.match_indices(token) {
        let before_ok = haystack[..pos]
            .chars()
            .next_back()
            .map_or(true, |c| !c.is_alphanumeric());
        let after_ok = haystack[pos + token.len()..]
            .chars()
            .next()
            .map_or(true, |c| !c.is_alphanumeric());
        if before_ok && after_ok {
            count += 1;
        }
    }
    count
}

fn score_chunk(chunk: &str, query_lower: &str, tokens: &[String]) -> u32 {
    let chunk_lower = chunk.to_lowercase();

    let mut score: u32 = tokens
        .iter()
        .map(|t| word_boundary_count(&chunk_lower, t))
        .sum();

    if !query_lower.is_empty() && chunk_lower.contains(query_lower) {
        score += 5;
    }
    if chunk.starts_with('#') || chunk.trim_end().ends_with(':') {
        score += 1;
    }

    score
}

/// Rank `chunks` against `query` and return the top `k` texts.
///
/// Only chunks with a positive score are returned, ordered by score
/// descending with ties broken by ascending chunk index.
pub fn rank_chunks(chunks: &[String], query: &str, k: usize) -> Vec<String> {
    let query_lower = query.trim().to_lowercase();
    let tokens = tokenize(query);
    if tokens.is_empty() && query_lower.is_empty() {
        return Vec::new();
    }

    let mut scored: Vec<(u32, usize)> = chunks
        .iter()
        .enumerate()
        .map(|(index, chunk)| (score_chunk(chunk, &query_lower, &tokens), index))
        .filter(|(score, _)| *score > 0)
        .collect();

    scored.sort_by(|a, b| b.0.cmp(&a.0).then(a.1.cmp(&b.1)));

    scored
        .into_iter()
        .take(k)
        .map(|(_, index)| chunks[index].clone())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chunks(texts: &[&str]) -> Vec<String> {
        texts.iter().map(|t| t.to_string()).collect()
    }

    #[test]
    fn test_tokenize_drops_short_tokens() {
        assert_eq!(tokenize("a to the Moon"), vec!["to", "the", "moon"]);
        assert!(tokenize("a b c").is_empty());
    }

    #[test]
    fn test_word_boundary_counting() {
        assert_eq!(word_boundary_count("the cat sat on the mat", "the"), 2);
        // "cat" inside "category" is not a word-boundary hit
        assert_eq!(word_boundary_count("category of cats, one cat", "cat"), 1);
        assert_eq!(word_boundary_count("price: 10. price!", "price"), 2);
    }

    #[test]
    fn test_phrase_match_outranks_per_token_match() {
        let corpus = chunks(&[
            "Bulk pricing varies by volume, and whatsapp media is supported.",
            "Current whatsapp pricing starts at Rs 0.30 per message.",
        ]);

        // Both chunks contain both tokens; only the second has the phrase
        let top = rank_chunks(&corpus, "whatsapp pricing", 3);
        assert_eq!(top[0], corpus[1]);
    }

    #[test]
    fn test_both_tokens_outrank_single_token() {
        let corpus = chunks(&[
            "Our whatsapp integration supports rich media messages.",
            "WhatsApp bulk messaging pricing: starts at Rs 0.30 per message.",
            "Volume pricing tiers apply to SMS campaigns.",
        ]);

        let top = rank_chunks(&corpus, "whatsapp pricing", 3);
        assert_eq!(top[0], corpus[1]);
    }

    #[test]
    fn test_heading_and_definition_bonus() {
        let corpus = chunks(&["# Pricing guide", "pricing guide details here"]);
        let top = rank_chunks(&corpus, "pricing", 2);
        assert_eq!(top[0], "# Pricing guide");
    }

    #[test]
    fn test_ties_break_by_chunk_index() {
        let corpus = chunks(&["delivery time is fast", "delivery time is quick"]);
        let top = rank_chunks(&corpus, "delivery time", 2);
        assert_eq!(top, corpus);
    }

    #[test]
    fn test_zero_score_chunks_excluded() {
        let corpus = chunks(&["nothing relevant here", "completely unrelated"]);
        assert!(rank_chunks(&corpus, "whatsapp pricing", 3).is_empty());
    }

    #[test]
    fn test_top_k_limit() {
        let corpus = chunks(&[
            "pricing one",
            "pricing two",
            "pricing three",
            "pricing four",
        ]);
        assert_eq!(rank_chunks(&corpus, "pricing", 3).len(), 3);
    }
}
