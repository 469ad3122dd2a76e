use std::sync::LazyLock;
use std::time::Duration;

use regex::Regex;
use tracing::debug;

use crate::{
    channel::ChatChannel,
    error::ChannelError,
    types::{InboundEvent, OutboundFile},
};

/// Discord rejects messages over 2000 characters; stay under with margin.
pub const CHUNK_MAX_CHARS: usize = 1900;
pub const CHUNK_MAX_PARAGRAPHS: usize = 3;
pub const CHUNK_DELAY: Duration = Duration::from_millis(1500);

const SEPARATOR: &str = "\n\n";

static PARAGRAPH_BREAK: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\n\s*\n").expect("paragraph pattern compiles"));
static SENTENCE_END: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[.!?]+\s+").expect("sentence pattern compiles"));

/// Limits applied when splitting and pacing a reply.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkOptions {
    pub max_paragraphs: usize,
    pub max_chars: usize,
    /// Pause before every chunk after the first.
    pub delay: Duration,
}

impl Default for ChunkOptions {
    fn default() -> Self {
        Self {
            max_paragraphs: CHUNK_MAX_PARAGRAPHS,
            max_chars: CHUNK_MAX_CHARS,
            delay: CHUNK_DELAY,
        }
    }
}

fn char_len(s: &str) -> usize {
    s.chars().count()
}

fn split_paragraphs(text: &str) -> Vec<&str> {
    PARAGRAPH_BREAK
        .split(text.trim())
        .map(str::trim)
        .filter(|p| !p.is_empty())
        .collect()
}

/// Split on sentence ends, keeping the terminal punctuation with each sentence.
fn split_sentences(text: &str) -> Vec<&str> {
    let mut out = Vec::new();
    let mut start = 0;
    for m in SENTENCE_END.find_iter(text) {
        let sentence = text[start..m.end()].trim();
        if !sentence.is_empty() {
            out.push(sentence);
        }
        start = m.end();
    }
    let tail = text[start..].trim();
    if !tail.is_empty() {
        out.push(tail);
    }
    out
}

/// Pack words into pieces of at most `max_chars`. A single word longer than
/// the limit becomes its own oversized piece.
fn hard_split(unit: &str, max_chars: usize, out: &mut Vec<String>) {
    let mut current: Vec<&str> = Vec::new();
    let mut len = 0;
    for word in unit.split_whitespace() {
        let word_len = char_len(word);
        let needed = if current.is_empty() { word_len } else { len + 1 + word_len };
        if !current.is_empty() && needed > max_chars {
            out.push(current.join(" "));
            current.clear();
            len = word_len;
        } else {
            len = needed;
        }
        current.push(word);
    }
    if !current.is_empty() {
        out.push(current.join(" "));
    }
}

/// Split `text` into ordered chunks that respect both a paragraph count and a
/// character budget, preferring paragraph, then sentence, then word boundaries.
///
/// Lengths are counted in `char`s. Returns an empty vec for empty input and
/// the input unchanged when it already fits.
pub fn chunk_message(text: &str, max_paragraphs: usize, max_chars: usize) -> Vec<String> {
    if text.is_empty() {
        return Vec::new();
    }
    if char_len(text) <= max_chars {
        return vec![text.to_string()];
    }
    let max_paragraphs = max_paragraphs.max(1);

    let mut units = split_paragraphs(text);
    if units.len() <= 1 {
        units = split_sentences(text.trim());
    }

    let mut chunks = Vec::new();
    let mut current: Vec<&str> = Vec::new();
    let mut current_len = 0;

    for unit in units {
        let unit_len = char_len(unit);

        if !current.is_empty()
            && (current.len() >= max_paragraphs || current_len + unit_len > max_chars)
        {
            chunks.push(current.join(SEPARATOR));
            current.clear();
            current_len = 0;
        }

        if unit_len > max_chars {
            hard_split(unit, max_chars, &mut chunks);
            continue;
        }

        current_len += unit_len + SEPARATOR.len();
        current.push(unit);
    }

    if !current.is_empty() {
        chunks.push(current.join(SEPARATOR));
    }
    chunks
}

/// Chunk `text` and deliver it: the first chunk as a threaded reply carrying
/// `files`, every later chunk as a plain send preceded by `opts.delay`.
///
/// Returns the number of chunks delivered.
pub async fn send_chunked_reply(
    channel: &dyn ChatChannel,
    to: &InboundEvent,
    text: &str,
    files: &[OutboundFile],
    opts: &ChunkOptions,
) -> Result<usize, ChannelError> {
    let chunks = chunk_message(text, opts.max_paragraphs, opts.max_chars);
    let total = chunks.len();

    for (i, chunk) in chunks.iter().enumerate() {
        if i == 0 {
            channel.reply(to, chunk, files).await?;
        } else {
            tokio::time::sleep(opts.delay).await;
            channel.send(&to.channel_id, chunk).await?;
        }
        debug!(
            channel = %channel.name(),
            channel_id = %to.channel_id,
            chunk = i + 1,
            total,
            chars = char_len(chunk),
            "sent reply chunk"
        );
    }
    Ok(total)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn para(n: usize, fill: char) -> String {
        std::iter::repeat(fill).take(n).collect()
    }

    #[test]
    fn empty_text_has_no_chunks() {
        assert!(chunk_message("", 3, 1900).is_empty());
    }

    #[test]
    fn short_text_is_returned_unchanged() {
        let text = "  hello\n\nworld  ";
        assert_eq!(chunk_message(text, 3, 1900), vec![text.to_string()]);
    }

    #[test]
    fn paragraph_count_limit_applies() {
        let text = ["one", "two", "three", "four", "five"].join("\n\n");
        let chunks = chunk_message(&text, 2, 10);
        assert_eq!(chunks, vec!["one\n\ntwo", "three", "four\n\nfive"]);

        let chunks = chunk_message(&text, 2, 16);
        assert_eq!(chunks, vec!["one\n\ntwo", "three\n\nfour", "five"]);
    }

    #[test]
    fn blank_lines_with_whitespace_are_paragraph_breaks() {
        let text = format!("{}\n   \n{}", para(30, 'a'), para(30, 'b'));
        let chunks = chunk_message(&text, 3, 40);
        assert_eq!(chunks, vec![para(30, 'a'), para(30, 'b')]);
    }

    #[test]
    fn single_paragraph_splits_on_sentences() {
        let text = "First sentence here. Second one follows! Is this the third? Yes.";
        let chunks = chunk_message(text, 1, 30);
        assert_eq!(
            chunks,
            vec![
                "First sentence here.",
                "Second one follows!",
                "Is this the third?",
                "Yes.",
            ]
        );
    }

    #[test]
    fn oversized_unit_is_split_on_words() {
        let words: Vec<String> = (0..50).map(|i| format!("word{i:02}")).collect();
        let text = words.join(" ");
        let chunks = chunk_message(&text, 3, 40);
        assert!(chunks.len() > 1);
        for c in &chunks {
            assert!(c.chars().count() <= 40, "chunk too long: {c:?}");
        }
        assert_eq!(chunks.join(" "), text);
    }

    #[test]
    fn accumulated_chunk_is_flushed_before_hard_split() {
        let long = vec!["x"; 30].join(" ");
        let text = format!("short\n\n{long}\n\ntail");
        let chunks = chunk_message(&text, 3, 20);
        assert_eq!(chunks[0], "short");
        assert_eq!(chunks.last().map(String::as_str), Some("tail"));
    }

    #[test]
    fn indivisible_word_may_exceed_limit() {
        let text = format!("ok {} ok", para(50, 'z'));
        let chunks = chunk_message(&text, 3, 20);
        assert_eq!(chunks, vec!["ok".to_string(), para(50, 'z'), "ok".to_string()]);
    }

    #[test]
    fn lengths_are_counted_in_chars() {
        // 10 chars, 30 bytes.
        let text = "ありがとうございます";
        assert_eq!(chunk_message(text, 3, 10), vec![text.to_string()]);
    }

    #[test]
    fn chunks_rejoin_to_stripped_text() {
        let paras: Vec<String> = (0..7).map(|i| format!("Paragraph {i}. {}", para(300, 'q'))).collect();
        let text = format!("\n\n{}\n\n", paras.join("\n\n"));
        let chunks = chunk_message(&text, 3, 1000);
        assert_eq!(chunks.join("\n\n"), text.trim());
        for c in &chunks {
            assert!(c.chars().count() <= 1000);
        }
    }

    #[test]
    fn rechunking_is_stable() {
        let paras: Vec<String> = (0..9).map(|_| para(498, 'r')).collect();
        let text = paras.join("\n\n");
        let first = chunk_message(&text, 3, 1900);
        let second = chunk_message(&first.join("\n\n"), 3, 1900);
        assert_eq!(first, second);
    }

    #[test]
    fn long_reply_splits_into_three_chunks() {
        // 8 × 498 + 1 × 500 chars of body plus separators ≈ 4500 chars.
        let mut paras: Vec<String> = (0..8).map(|_| para(498, 'm')).collect();
        paras.push(para(500, 'n'));
        let text = paras.join("\n\n");
        let chunks = chunk_message(&text, 3, 1900);
        assert_eq!(chunks.len(), 3);
        for c in &chunks {
            assert!(c.chars().count() <= 1900);
        }
    }

    proptest::proptest! {
        #[test]
        fn chunks_fit_budget_and_keep_every_word(
            text in "[a-zé0-9 .!?\n\t]{0,600}",
            max_paragraphs in 1usize..5,
            max_chars in 1usize..200,
        ) {
            let chunks = chunk_message(&text, max_paragraphs, max_chars);
            for c in &chunks {
                let single_word = c.split_whitespace().count() == 1;
                proptest::prop_assert!(
                    c.chars().count() <= max_chars || single_word,
                    "chunk of {} chars over budget {}: {:?}",
                    c.chars().count(),
                    max_chars,
                    c
                );
            }
            let words_in: Vec<&str> = text.split_whitespace().collect();
            let words_out: Vec<&str> = chunks.iter().flat_map(|c| c.split_whitespace()).collect();
            proptest::prop_assert_eq!(words_out, words_in);
        }
    }
}
