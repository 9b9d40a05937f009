//! Deterministic heuristic token counter.
//!
//! Used wherever a provider reports only a combined output-token count but a
//! transformer must split it between visible text and reasoning content
//! (Anthropic's imputation, §4.2). This is not a tokenizer: its only contract
//! is that the same input always produces the same integer, and that it
//! tracks a real tokenizer's output for Latin and CJK text within roughly
//! ±15%. Do not assert exact counts against it in tests.

use std::sync::LazyLock;

use regex::Regex;

static BASE_TOKEN_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\w+|[^\w\s]|\s+").expect("static pattern is valid"));

/// Counts `text` using the shared heuristic.
pub fn count(text: &str) -> u64 {
    if text.is_empty() {
        return 0;
    }

    let mut count: u64 = 0;

    for token in BASE_TOKEN_PATTERN.find_iter(text) {
        let token = token.as_str();
        count += 1;

        if is_word(token) {
            let len = token.chars().count();
            if len > 4 {
                count += ((len - 1) / 4) as u64;
            }
        }

        let cjk_chars = token.chars().filter(|c| is_cjk(*c)).count() as u64;
        if cjk_chars > 0 {
            // The token was already counted once above; each CJK character
            // inside it counts as its own token beyond that.
            count += cjk_chars.saturating_sub(1);
        }
    }

    count
}

fn is_word(token: &str) -> bool {
    token.chars().next().is_some_and(|c| c.is_alphanumeric() || c == '_')
}

fn is_cjk(c: char) -> bool {
    let cp = c as u32;
    (0x4E00..=0x9FA5).contains(&cp) || (0x3040..=0x30FF).contains(&cp) || (0xAC00..=0xD7AF).contains(&cp)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_input_is_zero() {
        assert_eq!(count(""), 0);
    }

    #[test]
    fn short_word_counts_once() {
        assert_eq!(count("Hello"), 1 + 1); // base token + sub-word penalty floor((5-1)/4)=1
    }

    #[test]
    fn simple_ascii_sentence() {
        // "let me consider" -> 3 word tokens + 2 whitespace tokens, no word > 4 chars
        // "consider" has length 8 -> floor((8-1)/4) = 1 extra.
        assert_eq!(count("let me consider"), 5 + 1);
    }

    #[test]
    fn cjk_characters_each_count() {
        // Two CJK characters in one matched token: 1 base + 1 extra = 2.
        assert_eq!(count("你好"), 2);
    }

    #[test]
    fn monotonic_under_concatenation() {
        let a = "hello world";
        let b = "goodbye friend";
        let combined = count(&format!("{a}{b}"));
        assert!(count(a) + count(b) >= combined);
        assert!(combined >= count(a).max(count(b)));
    }
}
