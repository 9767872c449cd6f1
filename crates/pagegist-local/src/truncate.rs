//! Token counting and prefix truncation.
//!
//! All counts use `cl100k_base`, so sizes are comparable across every truncation in a call.

use pagegist_core::{Error, Result};
use std::sync::{Arc, OnceLock};
use tiktoken_rs::CoreBPE;

static CL100K: OnceLock<Arc<CoreBPE>> = OnceLock::new();

#[derive(Clone)]
pub struct TokenBudget {
    bpe: Arc<CoreBPE>,
}

impl std::fmt::Debug for TokenBudget {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenBudget")
            .field("encoding", &"cl100k_base")
            .finish()
    }
}

impl TokenBudget {
    /// Loads the (embedded) encoding once per process.
    pub fn cl100k() -> Result<Self> {
        if let Some(bpe) = CL100K.get() {
            return Ok(Self { bpe: bpe.clone() });
        }
        let bpe = tiktoken_rs::cl100k_base().map_err(|e| Error::Tokenizer(e.to_string()))?;
        let bpe = CL100K.get_or_init(|| Arc::new(bpe)).clone();
        Ok(Self { bpe })
    }

    pub fn count(&self, text: &str) -> usize {
        self.bpe.encode_ordinary(text).len()
    }

    /// Longest decodable prefix of `text` holding at most `max_tokens` tokens.
    ///
    /// Text already within budget is returned as-is, never re-encoded.
    pub fn truncate(&self, text: &str, max_tokens: usize) -> String {
        let tokens = self.bpe.encode_ordinary(text);
        if tokens.len() <= max_tokens {
            return text.to_string();
        }
        // A cut can land inside a multi-byte character, and a re-encoded prefix can
        // occasionally count higher than the cut; back off until both hold.
        let mut end = max_tokens;
        while end > 0 {
            if let Ok(s) = self.bpe.decode(tokens[..end].to_vec()) {
                if self.count(&s) <= max_tokens {
                    return s;
                }
            }
            end -= 1;
        }
        String::new()
    }
}

/// Character-boundary prefix holding `floor(len_chars * factor)` chars.
pub fn shrink_chars(text: &str, factor: f64) -> String {
    let keep = (text.chars().count() as f64 * factor).floor() as usize;
    match text.char_indices().nth(keep) {
        Some((byte, _)) => text[..byte].to_string(),
        None => text.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn budget() -> TokenBudget {
        TokenBudget::cl100k().unwrap()
    }

    #[test]
    fn under_budget_is_identity() {
        let b = budget();
        let s = "Alibaba is a technology company.\n  odd   spacing\u{a0}kept ";
        assert_eq!(b.truncate(s, 10_000), s);
    }

    #[test]
    fn over_budget_keeps_a_prefix_within_the_ceiling() {
        let b = budget();
        let s = "word ".repeat(5_000);
        let t = b.truncate(&s, 1_000);
        assert!(s.starts_with(&t));
        let n = b.count(&t);
        assert!(n <= 1_000 && n >= 990, "count={n}");
    }

    #[test]
    fn multibyte_text_truncates_to_valid_utf8_prefix() {
        let b = budget();
        let s = "日本語のテキスト🙂".repeat(500);
        let t = b.truncate(&s, 37);
        assert!(s.starts_with(&t));
        assert!(b.count(&t) <= 37);
        assert!(!t.is_empty());
    }

    #[test]
    fn zero_budget_yields_empty_text() {
        assert_eq!(budget().truncate("hello world", 0), "");
    }

    #[test]
    fn shrink_chars_is_char_safe() {
        assert_eq!(shrink_chars("abcdefghij", 0.7), "abcdefg");
        assert_eq!(shrink_chars("ééééé", 0.5), "éé");
        assert_eq!(shrink_chars("", 0.7), "");
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(64))]

        #[test]
        fn truncation_is_idempotent_within_budget(s in "\\PC{0,300}") {
            let b = budget();
            let n = b.count(&s);
            prop_assert_eq!(b.truncate(&s, n), s.clone());
            prop_assert_eq!(b.truncate(&s, n + 5), s);
        }

        #[test]
        fn truncation_respects_the_ceiling(s in "[a-zA-Z0-9 ,.\n]{0,400}", max in 0usize..80) {
            let b = budget();
            let t = b.truncate(&s, max);
            prop_assert!(b.count(&t) <= max);
            prop_assert!(s.starts_with(&t));
        }
    }
}
