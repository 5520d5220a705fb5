//! Punctuation-aware truncation for title fields.
//!
//! The target form caps titles at 25 characters. A hard cut in the
//! middle of a clause reads badly, so the cut prefers the last
//! sentence-ending or pausing punctuation inside the limit, as long as
//! at least half of the budget is kept.

/// Characters that make an acceptable cut point (Japanese + ASCII).
const CUT_PUNCTUATION: [char; 8] = ['。', '、', '！', '？', '!', '?', ',', '.'];

/// Truncate `text` to at most `max_chars` characters, cutting at the
/// nearest trailing punctuation mark when one falls in the second half
/// of the budget. Counts characters, not bytes.
pub fn smart_truncate(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        return text.to_string();
    }
    if max_chars == 0 {
        return String::new();
    }

    let truncated: String = text.chars().take(max_chars).collect();

    let last_punct = truncated
        .char_indices()
        .filter(|(_, c)| CUT_PUNCTUATION.contains(c))
        .map(|(i, c)| i + c.len_utf8())
        .next_back();

    if let Some(cut) = last_punct {
        let kept = truncated[..cut].chars().count();
        // A cut that throws away more than half the budget is worse
        // than a hard cut.
        if kept * 2 >= max_chars {
            return truncated[..cut].to_string();
        }
    }

    truncated
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn short_text_is_untouched() {
        assert_eq!(smart_truncate("短いタイトル", 25), "短いタイトル");
    }

    #[test]
    fn cuts_at_japanese_sentence_end() {
        let text = "春の新色カラーが登場しました。今月のおすすめスタイル紹介";
        let result = smart_truncate(text, 25);
        assert_eq!(result, "春の新色カラーが登場しました。");
    }

    #[test]
    fn cut_counts_characters_not_bytes() {
        let text = "あいうえおかきくけこさしすせそたちつてとなにぬねのはひふ";
        let result = smart_truncate(text, 25);
        assert_eq!(result.chars().count(), 25);
    }

    #[test]
    fn hard_cut_when_punctuation_is_too_early() {
        // The only punctuation is at position 2; cutting there would
        // keep under half the budget.
        let text = "A. bcdefghijklmnopqrstuvwxyz";
        let result = smart_truncate(text, 20);
        assert_eq!(result.chars().count(), 20);
    }

    #[test]
    fn ascii_comma_is_a_cut_point() {
        let text = "new spring colors here, come see the rest of it";
        let result = smart_truncate(text, 25);
        assert_eq!(result, "new spring colors here,");
    }

    #[test]
    fn zero_budget_yields_empty() {
        assert_eq!(smart_truncate("anything", 0), "");
    }
}
