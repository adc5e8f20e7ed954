//! Structural document analysis.
//!
//! [`analyze`] is a pure function from text to a [`Profile`]: byte-offset
//! spans for lines, paragraphs and sentences plus aggregate counters. The
//! profile is computed once at ingest time and stored with the document so
//! quote lookups never re-scan content.
//!
//! Offsets are byte positions into the analyzed text, half-open `[start,
//! end)`; line spans exclude the terminating newline. Given identical input
//! and timestamp the output is identical, which the tests rely on.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Bumped whenever boundary rules change.
pub const ANALYZER_VERSION: u32 = 3;

/// Sentence array cap.
pub const MAX_SENTENCES: usize = 2000;
/// Paragraph array cap.
pub const MAX_PARAGRAPHS: usize = 1000;
/// Line array cap.
pub const MAX_LINES: usize = 5000;
/// Entries kept from each end when an array exceeds its cap.
pub const CAP_KEEP: usize = 100;

/// Tokens before a period that never end a sentence.
const ABBREVIATIONS: &[&str] = &[
    "mr", "mrs", "ms", "dr", "prof", "rev", "gen", "gov", "sgt", "cpl", "jr", "sr", "lt", "col",
    "maj", "capt", "st", "ave", "blvd", "rd", "apt", "etc", "e.g", "i.e", "vs", "viz", "al",
    "approx", "dept", "est", "fig", "no", "vol", "ch", "sec", "ed", "jan", "feb", "mar", "apr",
    "jun", "jul", "aug", "sept", "sep", "oct", "nov", "dec",
];

/// Characters that may close a sentence after the terminal punctuation.
const CLOSERS: &[char] = &[')', '"', '\'', '\u{201d}', '\u{2019}'];

/// Quote characters that can open a sentence after an ellipsis.
const OPENERS: &[char] = &['"', '\'', '\u{201c}', '\u{2018}', '('];

/// One physical line, newline excluded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LineSpan {
    /// Position in the uncapped line sequence.
    pub index: usize,
    /// Byte offset of the first char.
    pub start: usize,
    /// Byte offset past the last char (before the newline).
    pub end: usize,
}

/// One sentence with its location and text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SentenceSpan {
    /// Position in the uncapped sentence sequence.
    pub index: usize,
    /// Byte offset where the sentence begins.
    pub start: usize,
    /// Byte offset past the terminal punctuation and closers.
    pub end: usize,
    /// Index into the line array where the sentence begins.
    pub line_number: usize,
    /// Whitespace-separated word count.
    pub word_count: usize,
    /// Trimmed slice of the content.
    pub text: String,
}

/// A maximal run of non-blank lines.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ParagraphSpan {
    /// Position in the uncapped paragraph sequence.
    pub index: usize,
    /// Byte offset of the first line's start.
    pub start: usize,
    /// Byte offset of the last line's end.
    pub end: usize,
    /// Index of the first line in the paragraph.
    pub line_start: usize,
    /// Index of the last line in the paragraph.
    pub line_end: usize,
    /// Index of the first sentence starting inside the paragraph.
    pub sentence_start: Option<usize>,
    /// Index of the last sentence starting inside the paragraph.
    pub sentence_end: Option<usize>,
    /// Whitespace-separated word count over the paragraph slice.
    pub word_count: usize,
}

/// Precomputed structural index enabling O(1) quote lookups.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Profile {
    /// Unicode scalar count.
    pub char_count: usize,
    /// Whitespace-separated word count.
    pub word_count: usize,
    /// Physical line count.
    pub line_count: usize,
    /// Lines containing at least one non-whitespace char.
    pub non_blank_line_count: usize,
    /// True sentence count (even when the array is capped).
    pub sentence_count: usize,
    /// True paragraph count (even when the array is capped).
    pub paragraph_count: usize,
    /// Sentence spans, possibly capped to first/last [`CAP_KEEP`].
    pub sentences: Vec<SentenceSpan>,
    /// Paragraph spans, possibly capped to first/last [`CAP_KEEP`].
    pub paragraphs: Vec<ParagraphSpan>,
    /// Line spans, possibly capped to first/last [`CAP_KEEP`].
    pub lines: Vec<LineSpan>,
    /// Text of the first sentence.
    pub first_sentence: Option<String>,
    /// Text of the last sentence.
    pub last_sentence: Option<String>,
    /// Mean sentence length in words.
    pub avg_words_per_sentence: f64,
    /// Mean paragraph length in sentences.
    pub avg_sentences_per_paragraph: f64,
    /// Whether the middle of the sentence array was elided.
    pub sentences_capped: bool,
    /// Whether the middle of the paragraph array was elided.
    pub paragraphs_capped: bool,
    /// Whether the middle of the line array was elided.
    pub lines_capped: bool,
    /// When the analysis ran (caller-supplied).
    pub analyzed_at: DateTime<Utc>,
    /// Boundary-rule revision that produced this profile.
    pub analyzer_version: u32,
}

/// Analyze `text` into a [`Profile`].
///
/// `analyzed_at` is caller-supplied so the function stays deterministic.
#[must_use]
pub fn analyze(text: &str, analyzed_at: DateTime<Utc>) -> Profile {
    let lines = scan_lines(text);
    let non_blank_line_count = lines
        .iter()
        .filter(|l| !text[l.start..l.end].trim().is_empty())
        .count();
    let mut paragraphs = scan_paragraphs(text, &lines);

    // Sentences are discovered per paragraph, so they never cross a blank
    // line and the paragraph back-wiring is exact.
    let mut sentences = Vec::new();
    for paragraph in &mut paragraphs {
        let first = sentences.len();
        scan_sentences_into(text, &lines, paragraph.start, paragraph.end, &mut sentences);
        if sentences.len() > first {
            paragraph.sentence_start = Some(first);
            paragraph.sentence_end = Some(sentences.len() - 1);
        }
    }

    let sentence_count = sentences.len();
    let paragraph_count = paragraphs.len();
    let word_count = text.split_whitespace().count();

    let total_sentence_words: usize = sentences.iter().map(|s| s.word_count).sum();
    let avg_words_per_sentence = if sentence_count == 0 {
        0.0
    } else {
        total_sentence_words as f64 / sentence_count as f64
    };
    let avg_sentences_per_paragraph = if paragraph_count == 0 {
        0.0
    } else {
        sentence_count as f64 / paragraph_count as f64
    };

    let first_sentence = sentences.first().map(|s| s.text.clone());
    let last_sentence = sentences.last().map(|s| s.text.clone());

    let line_count = lines.len();
    let (sentences, sentences_capped) = cap_spans(sentences, MAX_SENTENCES);
    let (paragraphs, paragraphs_capped) = cap_spans(paragraphs, MAX_PARAGRAPHS);
    let (lines, lines_capped) = cap_spans(lines, MAX_LINES);

    Profile {
        char_count: text.chars().count(),
        word_count,
        line_count,
        non_blank_line_count,
        sentence_count,
        paragraph_count,
        sentences,
        paragraphs,
        lines,
        first_sentence,
        last_sentence,
        avg_words_per_sentence,
        avg_sentences_per_paragraph,
        sentences_capped,
        paragraphs_capped,
        lines_capped,
        analyzed_at,
        analyzer_version: ANALYZER_VERSION,
    }
}

impl Profile {
    /// Whether the entry with the given uncapped `index` fell into the
    /// elided middle of a capped array.
    #[must_use]
    pub fn index_elided(capped: bool, total: usize, index: usize) -> bool {
        capped && index >= CAP_KEEP && index < total - CAP_KEEP
    }
}

/// Keep the first and last [`CAP_KEEP`] entries when `spans` exceeds `max`.
/// Kept entries retain their original `index` values.
fn cap_spans<T>(spans: Vec<T>, max: usize) -> (Vec<T>, bool) {
    if spans.len() <= max {
        return (spans, false);
    }
    let tail_start = spans.len() - CAP_KEEP;
    let mut kept = Vec::with_capacity(CAP_KEEP * 2);
    for (i, span) in spans.into_iter().enumerate() {
        if i < CAP_KEEP || i >= tail_start {
            kept.push(span);
        }
    }
    (kept, true)
}

fn scan_lines(text: &str) -> Vec<LineSpan> {
    let mut lines = Vec::new();
    let mut start = 0usize;
    for (pos, byte) in text.bytes().enumerate() {
        if byte == b'\n' {
            lines.push(LineSpan {
                index: lines.len(),
                start,
                end: pos,
            });
            start = pos + 1;
        }
    }
    // A trailing newline does not open an empty final line.
    if start < text.len() {
        lines.push(LineSpan {
            index: lines.len(),
            start,
            end: text.len(),
        });
    }
    lines
}

fn scan_paragraphs(text: &str, lines: &[LineSpan]) -> Vec<ParagraphSpan> {
    let mut paragraphs: Vec<ParagraphSpan> = Vec::new();
    let mut run_start: Option<usize> = None;

    for line in lines {
        let blank = text[line.start..line.end].trim().is_empty();
        match (blank, run_start) {
            (false, None) => run_start = Some(line.index),
            (true, Some(first)) => {
                paragraphs.push(make_paragraph(text, lines, paragraphs.len(), first, line.index - 1));
                run_start = None;
            },
            _ => {},
        }
    }
    if let Some(first) = run_start {
        paragraphs.push(make_paragraph(
            text,
            lines,
            paragraphs.len(),
            first,
            lines.len() - 1,
        ));
    }
    paragraphs
}

fn make_paragraph(
    text: &str,
    lines: &[LineSpan],
    index: usize,
    line_start: usize,
    line_end: usize,
) -> ParagraphSpan {
    let start = lines[line_start].start;
    let end = lines[line_end].end;
    ParagraphSpan {
        index,
        start,
        end,
        line_start,
        line_end,
        sentence_start: None,
        sentence_end: None,
        word_count: text[start..end].split_whitespace().count(),
    }
}

/// Discover sentences inside `[region_start, region_end)`, appending to
/// `sentences` with global indices.
fn scan_sentences_into(
    text: &str,
    lines: &[LineSpan],
    region_start: usize,
    region_end: usize,
    sentences: &mut Vec<SentenceSpan>,
) {
    let chars: Vec<(usize, char)> = text[region_start..region_end]
        .char_indices()
        .map(|(i, c)| (region_start + i, c))
        .collect();
    let mut sent_start: Option<usize> = None;
    let mut i = 0usize;

    while i < chars.len() {
        let (pos, ch) = chars[i];

        if sent_start.is_none() {
            if ch.is_whitespace() {
                i += 1;
                continue;
            }
            sent_start = Some(pos);
        }

        if ch == '.' {
            let dot_run = chars[i..].iter().take_while(|(_, c)| *c == '.').count();
            if dot_run >= 3 {
                // Ellipsis: boundary only before whitespace + uppercase/quote.
                let after = i + dot_run;
                if ellipsis_breaks(&chars, after) {
                    let end = chars.get(after).map_or(region_end, |(p, _)| *p);
                    push_sentence(text, lines, sentences, sent_start.take(), end);
                }
                i += dot_run;
                continue;
            }
            if is_decimal_point(&chars, i) || is_abbreviation(text, pos) {
                i += 1;
                continue;
            }
            if let Some(end) = boundary_end(&chars, i, region_end) {
                push_sentence(text, lines, sentences, sent_start.take(), end);
                i = skip_to(&chars, end);
                continue;
            }
        } else if ch == '!' || ch == '?' {
            if let Some(end) = boundary_end(&chars, i, region_end) {
                push_sentence(text, lines, sentences, sent_start.take(), end);
                i = skip_to(&chars, end);
                continue;
            }
        }

        i += 1;
    }

    if sent_start.is_some() {
        push_sentence(text, lines, sentences, sent_start, region_end);
    }
}

/// Advance the char cursor to the first char at or past byte offset `end`.
fn skip_to(chars: &[(usize, char)], end: usize) -> usize {
    chars.partition_point(|(p, _)| *p < end)
}

/// End offset of a sentence terminated at char position `i`, if the
/// closer/whitespace rule holds: after skipping closing quotes and
/// parentheses, the next char must be whitespace or end-of-text.
fn boundary_end(chars: &[(usize, char)], i: usize, text_len: usize) -> Option<usize> {
    let mut j = i + 1;
    while j < chars.len() && CLOSERS.contains(&chars[j].1) {
        j += 1;
    }
    match chars.get(j) {
        None => Some(text_len),
        Some((pos, c)) if c.is_whitespace() => Some(*pos),
        Some(_) => None,
    }
}

fn ellipsis_breaks(chars: &[(usize, char)], after: usize) -> bool {
    let Some((_, next)) = chars.get(after) else {
        return false;
    };
    if !next.is_whitespace() {
        return false;
    }
    chars[after..]
        .iter()
        .find(|(_, c)| !c.is_whitespace())
        .is_some_and(|(_, c)| c.is_uppercase() || OPENERS.contains(c))
}

fn is_decimal_point(chars: &[(usize, char)], i: usize) -> bool {
    i > 0
        && chars[i - 1].1.is_ascii_digit()
        && chars.get(i + 1).is_some_and(|(_, c)| c.is_ascii_digit())
}

/// Whether the token ending at the period at byte offset `dot_pos` is an
/// abbreviation, a single uppercase initial, or a dotted initialism.
fn is_abbreviation(text: &str, dot_pos: usize) -> bool {
    let before = &text[..dot_pos];
    let token_start = before
        .rfind(|c: char| !(c.is_alphanumeric() || c == '.'))
        .map_or(0, |p| p + before[p..].chars().next().map_or(1, char::len_utf8));
    let token = before[token_start..].trim_start_matches('.');
    if token.is_empty() {
        return false;
    }

    let lower = token.to_lowercase();
    if ABBREVIATIONS.contains(&lower.as_str()) {
        return true;
    }

    // Single initial: "A." / "J." / "U."
    let mut token_chars = token.chars();
    if let (Some(first), None) = (token_chars.next(), token_chars.next()) {
        if first.is_uppercase() {
            return true;
        }
    }

    // Dotted initialism: "U.S" (examining the final dot of "U.S.").
    let parts: Vec<&str> = token.split('.').collect();
    parts.len() >= 2
        && parts.iter().all(|p| {
            let mut cs = p.chars();
            matches!((cs.next(), cs.next()), (Some(c), None) if c.is_uppercase())
        })
}

fn push_sentence(
    text: &str,
    lines: &[LineSpan],
    sentences: &mut Vec<SentenceSpan>,
    start: Option<usize>,
    end: usize,
) {
    let Some(start) = start else { return };
    let slice = text[start..end].trim();
    if slice.is_empty() {
        return;
    }
    sentences.push(SentenceSpan {
        index: sentences.len(),
        start,
        end,
        line_number: line_index_at(lines, start),
        word_count: slice.split_whitespace().count(),
        text: slice.to_string(),
    });
}

/// Index of the line containing byte offset `pos`.
fn line_index_at(lines: &[LineSpan], pos: usize) -> usize {
    match lines.binary_search_by(|l| l.start.cmp(&pos)) {
        Ok(i) => i,
        Err(0) => 0,
        Err(i) => i - 1,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 6, 1, 0, 0, 0).unwrap()
    }

    #[test]
    fn empty_text_yields_zero_profile() {
        let profile = analyze("", now());
        assert_eq!(profile.char_count, 0);
        assert_eq!(profile.word_count, 0);
        assert_eq!(profile.line_count, 0);
        assert_eq!(profile.sentence_count, 0);
        assert_eq!(profile.paragraph_count, 0);
        assert!(profile.sentences.is_empty());
        assert!(profile.first_sentence.is_none());
        assert_eq!(profile.avg_words_per_sentence, 0.0);
    }

    #[test]
    fn unpunctuated_text_is_one_sentence() {
        let profile = analyze("just some words with no terminal punctuation", now());
        assert_eq!(profile.sentence_count, 1);
        assert_eq!(
            profile.sentences[0].text,
            "just some words with no terminal punctuation"
        );
        assert_eq!(profile.sentences[0].start, 0);
    }

    #[test]
    fn abbreviation_does_not_end_sentence() {
        let profile = analyze("Dr. Smith arrived. He spoke.", now());
        assert_eq!(profile.sentence_count, 2);
        assert_eq!(profile.sentences[0].text, "Dr. Smith arrived.");
        assert_eq!(profile.sentences[1].text, "He spoke.");
    }

    #[test]
    fn single_initials_do_not_end_sentences() {
        let profile = analyze("A. J. Ayer wrote it. It sold well.", now());
        assert_eq!(profile.sentence_count, 2);
        assert_eq!(profile.sentences[0].text, "A. J. Ayer wrote it.");
    }

    #[test]
    fn dotted_initialism_does_not_end_sentence() {
        let profile = analyze("The U.S. economy grew. Exports rose.", now());
        assert_eq!(profile.sentence_count, 2);
        assert_eq!(profile.sentences[0].text, "The U.S. economy grew.");
    }

    #[test]
    fn decimal_point_is_not_a_boundary() {
        let profile = analyze("Inflation hit 3.5 percent. Rates held.", now());
        assert_eq!(profile.sentence_count, 2);
        assert_eq!(profile.sentences[0].text, "Inflation hit 3.5 percent.");
    }

    #[test]
    fn ellipsis_breaks_only_before_uppercase() {
        let trailing = analyze("He waited... and waited some more", now());
        assert_eq!(trailing.sentence_count, 1);

        let breaking = analyze("He waited... Then it happened.", now());
        assert_eq!(breaking.sentence_count, 2);
        assert_eq!(breaking.sentences[0].text, "He waited...");
    }

    #[test]
    fn closing_quote_stays_with_sentence() {
        let profile = analyze("She said \"stop.\" Nobody moved.", now());
        assert_eq!(profile.sentence_count, 2);
        assert_eq!(profile.sentences[0].text, "She said \"stop.\"");
    }

    #[test]
    fn question_and_exclamation_terminate() {
        let profile = analyze("Really?! Yes. Go!", now());
        assert_eq!(profile.sentence_count, 3);
        assert_eq!(profile.sentences[0].text, "Really?!");
        assert_eq!(profile.sentences[2].text, "Go!");
    }

    #[test]
    fn lines_exclude_newline_and_trailing_newline_adds_no_line() {
        let profile = analyze("alpha\nbeta\n", now());
        assert_eq!(profile.line_count, 2);
        assert_eq!(profile.lines[0], LineSpan { index: 0, start: 0, end: 5 });
        assert_eq!(profile.lines[1], LineSpan { index: 1, start: 6, end: 10 });
    }

    #[test]
    fn paragraphs_are_runs_of_non_blank_lines() {
        let text = "First one. Second one.\n\nThird in para two.\nStill para two.";
        let profile = analyze(text, now());
        assert_eq!(profile.paragraph_count, 2);
        assert_eq!(profile.non_blank_line_count, 3);

        let p0 = &profile.paragraphs[0];
        assert_eq!((p0.line_start, p0.line_end), (0, 0));
        assert_eq!((p0.sentence_start, p0.sentence_end), (Some(0), Some(1)));

        let p1 = &profile.paragraphs[1];
        assert_eq!((p1.line_start, p1.line_end), (2, 3));
        assert_eq!((p1.sentence_start, p1.sentence_end), (Some(2), Some(3)));
        assert_eq!(&text[p1.start..p1.end], "Third in para two.\nStill para two.");
    }

    #[test]
    fn sentence_spans_trim_to_their_text() {
        let text = "One here.  Two here.";
        let profile = analyze(text, now());
        for sentence in &profile.sentences {
            assert_eq!(text[sentence.start..sentence.end].trim(), sentence.text);
        }
        assert_eq!(profile.sentences[1].start, 11);
    }

    #[test]
    fn sentence_line_numbers_index_lines() {
        let profile = analyze("First.\nSecond.\nThird.", now());
        assert_eq!(profile.sentence_count, 3);
        let numbers: Vec<usize> = profile.sentences.iter().map(|s| s.line_number).collect();
        assert_eq!(numbers, vec![0, 1, 2]);
    }

    #[test]
    fn aggregates_and_first_last() {
        let profile = analyze("One two. Three four five.", now());
        assert_eq!(profile.word_count, 5);
        assert_eq!(profile.sentence_count, 2);
        assert_eq!(profile.first_sentence.as_deref(), Some("One two."));
        assert_eq!(profile.last_sentence.as_deref(), Some("Three four five."));
        assert!((profile.avg_words_per_sentence - 2.5).abs() < f64::EPSILON);
    }

    #[test]
    fn capping_keeps_first_and_last_with_original_indices() {
        let spans: Vec<LineSpan> = (0..350)
            .map(|i| LineSpan { index: i, start: i * 2, end: i * 2 + 1 })
            .collect();
        let (kept, capped) = cap_spans(spans, 300);
        assert!(capped);
        assert_eq!(kept.len(), CAP_KEEP * 2);
        assert_eq!(kept[0].index, 0);
        assert_eq!(kept[CAP_KEEP - 1].index, CAP_KEEP - 1);
        assert_eq!(kept[CAP_KEEP].index, 250);
        assert_eq!(kept.last().map(|s| s.index), Some(349));

        assert!(Profile::index_elided(true, 350, 175));
        assert!(!Profile::index_elided(true, 350, 20));
        assert!(!Profile::index_elided(true, 350, 320));
        assert!(!Profile::index_elided(false, 350, 175));
    }

    #[test]
    fn no_cap_below_threshold() {
        let spans: Vec<LineSpan> = (0..10)
            .map(|i| LineSpan { index: i, start: i, end: i + 1 })
            .collect();
        let (kept, capped) = cap_spans(spans, 300);
        assert!(!capped);
        assert_eq!(kept.len(), 10);
    }

    #[test]
    fn identical_input_identical_profile() {
        let text = "Dr. Smith arrived. He spoke of 3.5 percent growth... Then he left.";
        let a = analyze(text, now());
        let b = analyze(text, now());
        assert_eq!(a, b);
    }

    #[test]
    fn heading_line_is_its_own_sentence() {
        let profile = analyze("# Title\n\nBody sentence.", now());
        assert_eq!(profile.sentence_count, 2);
        assert_eq!(profile.sentences[0].text, "# Title");
        assert_eq!(profile.sentences[1].text, "Body sentence.");
    }

    proptest::proptest! {
        #[test]
        fn profile_invariants_hold_for_arbitrary_text(text in "[ -~\\n]{0,400}") {
            let profile = analyze(&text, now());

            // Spans sorted and non-overlapping; text is the trimmed slice.
            let mut prev_end = 0usize;
            for sentence in &profile.sentences {
                proptest::prop_assert!(sentence.start >= prev_end);
                proptest::prop_assert!(sentence.start < sentence.end);
                proptest::prop_assert_eq!(
                    text[sentence.start..sentence.end].trim(),
                    sentence.text.as_str()
                );
                proptest::prop_assert!(sentence.line_number < profile.line_count);
                prev_end = sentence.end;
            }

            let mut prev_end = 0usize;
            for paragraph in &profile.paragraphs {
                proptest::prop_assert!(paragraph.start >= prev_end);
                proptest::prop_assert!(paragraph.line_start <= paragraph.line_end);
                prev_end = paragraph.end.max(prev_end);
            }

            proptest::prop_assert_eq!(profile.char_count, text.chars().count());
            proptest::prop_assert_eq!(profile.word_count, text.split_whitespace().count());
        }
    }
}
