// SPDX-FileCopyrightText: 2026 Wabridge Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Splitting long bodies into Telegram-sized pieces.
//!
//! Telegram measures message and caption length in UTF-16 code units, so
//! limits here are in code units and every split lands on a char boundary.

/// Longest caption Telegram accepts on a media message.
pub const CAPTION_MAX_LENGTH: usize = 1024;

/// Length of `text` as Telegram counts it.
pub fn telegram_len(text: &str) -> usize {
    text.encode_utf16().count()
}

/// Byte index of the longest prefix of `text` within `max_units`.
fn prefix_end(text: &str, max_units: usize) -> usize {
    let mut units = 0;
    for (idx, ch) in text.char_indices() {
        units += ch.len_utf16();
        if units > max_units {
            return idx;
        }
    }
    text.len()
}

/// Splits text at a paragraph boundary within `max_units`.
///
/// Priority: double newline > single newline > space > hard split.
pub fn split_at_paragraph_boundary(text: &str, max_units: usize) -> (&str, &str) {
    if telegram_len(text) <= max_units {
        return (text, "");
    }

    let mut end = prefix_end(text, max_units);
    if end == 0 {
        // A single char wider than the limit still has to go somewhere.
        end = text.chars().next().map_or(text.len(), char::len_utf8);
    }
    let search_region = &text[..end];

    if let Some(pos) = search_region.rfind("\n\n").filter(|&p| p > 0) {
        return (&text[..pos], text[pos + 2..].trim_start());
    }
    if let Some(pos) = search_region.rfind('\n').filter(|&p| p > 0) {
        return (&text[..pos], text[pos + 1..].trim_start());
    }
    if let Some(pos) = search_region.rfind(' ').filter(|&p| p > 0) {
        return (&text[..pos], &text[pos + 1..]);
    }
    (&text[..end], &text[end..])
}

/// Splits `text` into consecutive pieces of at most `max_units` each.
pub fn split_message(text: &str, max_units: usize) -> Vec<String> {
    let max_units = max_units.max(1);
    let mut pieces = Vec::new();
    let mut rest = text;
    while !rest.is_empty() {
        let (first, remainder) = split_at_paragraph_boundary(rest, max_units);
        if !first.trim().is_empty() {
            pieces.push(first.to_string());
        }
        rest = remainder;
    }
    if pieces.is_empty() {
        pieces.push(text.to_string());
    }
    pieces
}

/// Splits a media body into a caption and follow-up text pieces.
pub fn split_caption(text: &str, max_message_length: usize) -> (String, Vec<String>) {
    let (caption, overflow) = split_at_paragraph_boundary(text, CAPTION_MAX_LENGTH);
    let overflow = if overflow.trim().is_empty() {
        Vec::new()
    } else {
        split_message(overflow, max_message_length)
    };
    (caption.to_string(), overflow)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn short_text_is_one_piece() {
        assert_eq!(split_message("Short text", 100), vec!["Short text"]);
    }

    #[test]
    fn prefers_double_newline_over_single() {
        let (first, rest) = split_at_paragraph_boundary("A\nB\n\nC\nD", 6);
        assert_eq!(first, "A\nB");
        assert_eq!(rest, "C\nD");
    }

    #[test]
    fn falls_back_to_space_then_hard_split() {
        let (first, rest) = split_at_paragraph_boundary("OneLongWordThen another word", 20);
        assert_eq!(first, "OneLongWordThen");
        assert_eq!(rest, "another word");

        let (first, rest) = split_at_paragraph_boundary("abcdefghijklmnopqrstuvwxyz", 10);
        assert_eq!(first, "abcdefghij");
        assert_eq!(rest, "klmnopqrstuvwxyz");
    }

    #[test]
    fn emoji_count_as_two_units_and_are_never_cut() {
        assert_eq!(telegram_len("📥"), 2);
        let text = "📥📥📥📥📥";
        let pieces = split_message(text, 3);
        assert!(pieces.iter().all(|p| telegram_len(p) <= 3));
        assert_eq!(pieces.concat(), text);
    }

    #[test]
    fn caption_overflow_becomes_follow_up_text() {
        let body = format!("📥 Received WhatsApp Media\n{}", "word ".repeat(400));
        let (caption, overflow) = split_caption(&body, 4096);
        assert!(telegram_len(&caption) <= CAPTION_MAX_LENGTH);
        assert!(caption.starts_with("📥 Received WhatsApp Media"));
        assert_eq!(overflow.len(), 1);

        let (caption, overflow) = split_caption("short caption", 4096);
        assert_eq!(caption, "short caption");
        assert!(overflow.is_empty());
    }

    proptest! {
        #[test]
        fn pieces_fit_and_keep_every_word(
            words in proptest::collection::vec("[a-zé📎]{1,12}", 1..200),
            max in 30usize..200,
        ) {
            let text = words.join(" ");
            let pieces = split_message(&text, max);
            for piece in &pieces {
                prop_assert!(telegram_len(piece) <= max);
            }
            let rejoined: Vec<&str> = pieces.iter().flat_map(|p| p.split_whitespace()).collect();
            let original: Vec<&str> = text.split_whitespace().collect();
            prop_assert_eq!(rejoined, original);
        }
    }
}
