//! Exact quote retrieval over stored profiles.
//!
//! [`QuoteEngine::get_quote`] resolves a natural-language request to one
//! mode (see [`request`]), then answers it from the stored content and its
//! precomputed [`Profile`] — span lookups are array indexing, never a
//! re-scan. Requests that index into the elided middle of a capped profile
//! array get a dedicated "not retained" error instead of a wrong answer.

pub mod numbers;
pub mod request;

use serde_json::json;

use crate::analyzer::{CAP_KEEP, Profile};
use crate::error::{Error, Result};
use crate::store::{Db, documents};

pub use request::{QuoteArgs, QuoteMode, SpanUnit, StatUnit};

use request::{CompoundSelector, parse_request};

/// Display cap for `full` mode.
const FULL_DISPLAY_CHARS: usize = 5_000;

/// Context window around `search` matches.
const SEARCH_CONTEXT_CHARS: usize = 100;

/// Context window around `search_all` matches.
const SEARCH_ALL_CONTEXT_CHARS: usize = 50;

/// A resolved quote answer.
#[derive(Debug, Clone)]
pub struct QuoteAnswer {
    /// Which mode answered.
    pub mode: &'static str,
    /// The quoted text or a human-readable summary.
    pub text: String,
    /// Structured payload (counters, positions, matches).
    pub data: serde_json::Value,
}

/// Answers quote requests against the verbatim store.
pub struct QuoteEngine<'a> {
    db: &'a Db,
}

impl<'a> QuoteEngine<'a> {
    /// Build an engine over the store.
    #[must_use]
    pub const fn new(db: &'a Db) -> Self {
        Self { db }
    }

    /// Resolve and answer one request about the document stored at `url`.
    pub async fn get_quote(
        &self,
        url: &str,
        request_text: &str,
        structured_args: Option<&serde_json::Value>,
    ) -> Result<QuoteAnswer> {
        let doc = documents::get_by_url(self.db, url)
            .await?
            .ok_or_else(|| Error::NotFound(format!("document not found for URL '{url}'")))?;

        let args = structured_args.map(QuoteArgs::from_value).unwrap_or_default();
        let mode = parse_request(request_text, &args)?;

        // Profiles are written at ingest time; a missing one (legacy row)
        // is recomputed transiently.
        let profile = match doc.profile {
            Some(profile) => profile,
            None => crate::analyzer::analyze(&doc.content, doc.created_at),
        };
        execute(&doc.content, &profile, mode)
    }
}

/// Answer one resolved mode. Pure: content and profile in, answer out.
#[allow(clippy::too_many_lines)]
pub fn execute(content: &str, profile: &Profile, mode: QuoteMode) -> Result<QuoteAnswer> {
    let label = mode.label();
    match mode {
        QuoteMode::Stats => Ok(QuoteAnswer {
            mode: label,
            text: format!(
                "{} chars, {} words, {} lines ({} non-blank), {} sentences, {} paragraphs; \
                 {:.1} words/sentence, {:.1} sentences/paragraph",
                profile.char_count,
                profile.word_count,
                profile.line_count,
                profile.non_blank_line_count,
                profile.sentence_count,
                profile.paragraph_count,
                profile.avg_words_per_sentence,
                profile.avg_sentences_per_paragraph,
            ),
            data: json!({
                "charCount": profile.char_count,
                "wordCount": profile.word_count,
                "lineCount": profile.line_count,
                "nonBlankLineCount": profile.non_blank_line_count,
                "sentenceCount": profile.sentence_count,
                "paragraphCount": profile.paragraph_count,
                "avgWordsPerSentence": profile.avg_words_per_sentence,
                "avgSentencesPerParagraph": profile.avg_sentences_per_paragraph,
            }),
        }),

        QuoteMode::StatSpecific(unit) => {
            let (name, count) = match unit {
                StatUnit::Chars => ("characters", profile.char_count),
                StatUnit::Words => ("words", profile.word_count),
                StatUnit::Lines => ("lines", profile.line_count),
                StatUnit::Sentences => ("sentences", profile.sentence_count),
                StatUnit::Paragraphs => ("paragraphs", profile.paragraph_count),
            };
            Ok(QuoteAnswer {
                mode: label,
                text: format!("{count} {name}"),
                data: json!({ "unit": name, "count": count }),
            })
        },

        QuoteMode::Nth { position, unit } => {
            let text = nth_text(content, profile, position, unit)?;
            Ok(QuoteAnswer {
                mode: label,
                text,
                data: json!({ "position": position, "unit": unit.name() }),
            })
        },

        QuoteMode::Paragraph { position } => {
            let text = nth_text(content, profile, position, SpanUnit::Paragraph)?;
            Ok(QuoteAnswer {
                mode: label,
                text,
                data: json!({ "position": position, "unit": "paragraph" }),
            })
        },

        QuoteMode::FirstParagraph => {
            let text = nth_text(content, profile, 1, SpanUnit::Paragraph)?;
            Ok(QuoteAnswer {
                mode: label,
                text,
                data: json!({ "position": 1 }),
            })
        },

        QuoteMode::LastParagraph => {
            let position = require_nonempty(profile.paragraph_count, "paragraph")?;
            let text = nth_text(content, profile, position, SpanUnit::Paragraph)?;
            Ok(QuoteAnswer {
                mode: label,
                text,
                data: json!({ "position": position }),
            })
        },

        QuoteMode::FirstN { count, unit } => {
            let text = edge_slice(content, profile, count, unit, true)?;
            Ok(QuoteAnswer {
                mode: label,
                text,
                data: json!({ "count": count, "unit": unit.name() }),
            })
        },

        QuoteMode::LastN { count, unit } => {
            let text = edge_slice(content, profile, count, unit, false)?;
            Ok(QuoteAnswer {
                mode: label,
                text,
                data: json!({ "count": count, "unit": unit.name() }),
            })
        },

        QuoteMode::ImplicitStart => {
            let text = edge_slice(content, profile, 3, SpanUnit::Sentence, true)?;
            Ok(QuoteAnswer {
                mode: label,
                text,
                data: json!({ "count": 3, "unit": "sentence" }),
            })
        },

        QuoteMode::ImplicitEnd => {
            let text = edge_slice(content, profile, 3, SpanUnit::Sentence, false)?;
            Ok(QuoteAnswer {
                mode: label,
                text,
                data: json!({ "count": 3, "unit": "sentence" }),
            })
        },

        QuoteMode::SentenceRange { start, end } => {
            let (text, actual_end) =
                span_range(content, profile, start, Some(end), SpanUnit::Sentence)?;
            Ok(QuoteAnswer {
                mode: label,
                text,
                data: json!({ "start": start, "end": actual_end, "unit": "sentence" }),
            })
        },

        QuoteMode::ParagraphRange { start, end } => {
            let (text, actual_end) =
                span_range(content, profile, start, Some(end), SpanUnit::Paragraph)?;
            Ok(QuoteAnswer {
                mode: label,
                text,
                data: json!({ "start": start, "end": actual_end, "unit": "paragraph" }),
            })
        },

        QuoteMode::Range { start, end } => {
            let (text, actual_end) = span_range(content, profile, start, end, SpanUnit::Line)?;
            Ok(QuoteAnswer {
                mode: label,
                text,
                data: json!({ "start": start, "end": actual_end, "unit": "line" }),
            })
        },

        QuoteMode::Line { number } => {
            let text = nth_text(content, profile, number, SpanUnit::Line)?;
            Ok(QuoteAnswer {
                mode: label,
                text,
                data: json!({ "lineNumber": number }),
            })
        },

        QuoteMode::Full => {
            let mut display = content.to_string();
            let truncated = truncate_display(&mut display, FULL_DISPLAY_CHARS);
            Ok(QuoteAnswer {
                mode: label,
                text: display,
                data: json!({
                    "byteCount": content.len(),
                    "displayTruncated": truncated,
                }),
            })
        },

        QuoteMode::Search { needle } => {
            if needle.is_empty() {
                return Err(Error::Validation("search needle is empty".to_string()));
            }
            let Some((start, end)) = search_ci(content, &needle, 0) else {
                return Ok(QuoteAnswer {
                    mode: label,
                    text: format!("'{needle}' not found"),
                    data: json!({ "found": false }),
                });
            };
            let hit = hit_payload(content, start, end, SEARCH_CONTEXT_CHARS);
            Ok(QuoteAnswer {
                mode: label,
                text: content[start..end].to_string(),
                data: json!({ "found": true, "match": hit }),
            })
        },

        QuoteMode::SearchAll { needle, count_only } => {
            if needle.is_empty() {
                return Err(Error::Validation("search needle is empty".to_string()));
            }
            let mut hits = Vec::new();
            let mut from = 0;
            while let Some((start, end)) = search_ci(content, &needle, from) {
                hits.push((start, end));
                // Advance by one char so adjacent matches still surface.
                from = next_char_boundary(content, start);
            }
            let total = hits.len();
            if count_only {
                return Ok(QuoteAnswer {
                    mode: label,
                    text: format!("{total} occurrences of '{needle}'"),
                    data: json!({ "totalCount": total }),
                });
            }
            let matches: Vec<serde_json::Value> = hits
                .into_iter()
                .map(|(start, end)| hit_payload(content, start, end, SEARCH_ALL_CONTEXT_CHARS))
                .collect();
            Ok(QuoteAnswer {
                mode: label,
                text: format!("{total} occurrences of '{needle}'"),
                data: json!({ "totalCount": total, "matches": matches }),
            })
        },

        QuoteMode::Section { name } => section_text(content, &name, label),

        QuoteMode::SectionList => {
            let headings = heading_lines(content);
            let listed: Vec<serde_json::Value> = headings
                .iter()
                .map(|(line_number, title)| {
                    json!({ "lineNumber": line_number + 1, "title": title })
                })
                .collect();
            let text = if headings.is_empty() {
                "no headings found".to_string()
            } else {
                headings
                    .iter()
                    .map(|(_, title)| title.as_str())
                    .collect::<Vec<_>>()
                    .join("\n")
            };
            Ok(QuoteAnswer {
                mode: label,
                text,
                data: json!({ "sections": listed }),
            })
        },

        QuoteMode::Compound { parts } => {
            let mut pieces = Vec::with_capacity(parts.len());
            for part in parts {
                let position = match part.selector {
                    CompoundSelector::Nth(n) => n,
                    CompoundSelector::Last => match part.unit {
                        SpanUnit::Sentence => require_nonempty(profile.sentence_count, "sentence")?,
                        SpanUnit::Paragraph => {
                            require_nonempty(profile.paragraph_count, "paragraph")?
                        },
                        SpanUnit::Line => require_nonempty(profile.line_count, "line")?,
                        SpanUnit::Word => require_nonempty(profile.word_count, "word")?,
                    },
                };
                pieces.push(nth_text(content, profile, position, part.unit)?);
            }
            Ok(QuoteAnswer {
                mode: label,
                text: pieces.join("\n"),
                data: json!({ "parts": pieces.len() }),
            })
        },
    }
}

fn require_nonempty(total: usize, unit: &str) -> Result<usize> {
    if total == 0 {
        return Err(Error::Validation(format!("document has no {unit}s")));
    }
    Ok(total)
}

/// Fetch one span's text by 1-based position.
fn nth_text(content: &str, profile: &Profile, position: usize, unit: SpanUnit) -> Result<String> {
    if position == 0 {
        return Err(Error::Validation("positions are 1-based".to_string()));
    }
    let n0 = position - 1;
    match unit {
        SpanUnit::Sentence => {
            let span = locate(
                &profile.sentences,
                |s| s.index,
                profile.sentences_capped,
                profile.sentence_count,
                n0,
                "sentence",
            )?;
            Ok(span.text.clone())
        },
        SpanUnit::Paragraph => {
            let span = locate(
                &profile.paragraphs,
                |p| p.index,
                profile.paragraphs_capped,
                profile.paragraph_count,
                n0,
                "paragraph",
            )?;
            Ok(content[span.start..span.end].to_string())
        },
        SpanUnit::Line => {
            let span = locate(
                &profile.lines,
                |l| l.index,
                profile.lines_capped,
                profile.line_count,
                n0,
                "line",
            )?;
            Ok(content[span.start..span.end].to_string())
        },
        SpanUnit::Word => content
            .split_whitespace()
            .nth(n0)
            .map(str::to_string)
            .ok_or_else(|| not_found_err("word", position, profile.word_count)),
    }
}

/// Contiguous slice of the first or last `count` spans.
fn edge_slice(
    content: &str,
    profile: &Profile,
    count: usize,
    unit: SpanUnit,
    from_start: bool,
) -> Result<String> {
    if count == 0 {
        return Err(Error::Validation("counts are 1-based".to_string()));
    }
    match unit {
        SpanUnit::Word => {
            let words: Vec<&str> = content.split_whitespace().collect();
            let take = count.min(words.len());
            let slice = if from_start {
                &words[..take]
            } else {
                &words[words.len() - take..]
            };
            Ok(slice.join(" "))
        },
        SpanUnit::Sentence => contiguous_slice(
            content,
            &profile.sentences,
            |s| (s.index, s.start, s.end),
            profile.sentences_capped,
            profile.sentence_count,
            count,
            from_start,
            "sentence",
        ),
        SpanUnit::Paragraph => contiguous_slice(
            content,
            &profile.paragraphs,
            |p| (p.index, p.start, p.end),
            profile.paragraphs_capped,
            profile.paragraph_count,
            count,
            from_start,
            "paragraph",
        ),
        SpanUnit::Line => contiguous_slice(
            content,
            &profile.lines,
            |l| (l.index, l.start, l.end),
            profile.lines_capped,
            profile.line_count,
            count,
            from_start,
            "line",
        ),
    }
}

/// Inclusive 1-based range over a span array; the end clamps to the array,
/// and an absent end means "to end".
fn span_range(
    content: &str,
    profile: &Profile,
    start: usize,
    end: Option<usize>,
    unit: SpanUnit,
) -> Result<(String, usize)> {
    if start == 0 {
        return Err(Error::Validation("positions are 1-based".to_string()));
    }
    let (spans, capped, total, name): (Vec<(usize, usize, usize)>, bool, usize, &str) = match unit {
        SpanUnit::Sentence => (
            profile.sentences.iter().map(|s| (s.index, s.start, s.end)).collect(),
            profile.sentences_capped,
            profile.sentence_count,
            "sentence",
        ),
        SpanUnit::Paragraph => (
            profile.paragraphs.iter().map(|p| (p.index, p.start, p.end)).collect(),
            profile.paragraphs_capped,
            profile.paragraph_count,
            "paragraph",
        ),
        SpanUnit::Line => (
            profile.lines.iter().map(|l| (l.index, l.start, l.end)).collect(),
            profile.lines_capped,
            profile.line_count,
            "line",
        ),
        SpanUnit::Word => {
            return Err(Error::Validation(
                "word ranges are not supported; ask for first/last N words".to_string(),
            ));
        },
    };

    if start > total {
        return Err(not_found_err(name, start, total));
    }
    let end = end.map_or(total, |e| e.min(total).max(start));

    let first_idx = start - 1;
    let last_idx = end - 1;
    for idx in [first_idx, last_idx] {
        if Profile::index_elided(capped, total, idx) {
            return Err(elided_err());
        }
    }
    // A range crossing the elided middle cannot be assembled either.
    if capped && first_idx < CAP_KEEP && last_idx >= total - CAP_KEEP {
        return Err(elided_err());
    }

    let first = spans
        .iter()
        .find(|(i, _, _)| *i == first_idx)
        .ok_or_else(elided_err)?;
    let last = spans
        .iter()
        .find(|(i, _, _)| *i == last_idx)
        .ok_or_else(elided_err)?;
    Ok((content[first.1..last.2].trim().to_string(), end))
}

/// Binary-search a (possibly capped) span array by uncapped index.
fn locate<'s, T>(
    spans: &'s [T],
    idx_of: impl Fn(&T) -> usize,
    capped: bool,
    total: usize,
    n0: usize,
    unit: &str,
) -> Result<&'s T> {
    if n0 >= total {
        return Err(not_found_err(unit, n0 + 1, total));
    }
    if Profile::index_elided(capped, total, n0) {
        return Err(elided_err());
    }
    spans
        .binary_search_by(|span| idx_of(span).cmp(&n0))
        .ok()
        .and_then(|i| spans.get(i))
        .ok_or_else(elided_err)
}

#[allow(clippy::too_many_arguments)]
fn contiguous_slice<T>(
    content: &str,
    spans: &[T],
    span_of: impl Fn(&T) -> (usize, usize, usize),
    capped: bool,
    total: usize,
    count: usize,
    from_start: bool,
    unit: &str,
) -> Result<String> {
    if total == 0 {
        return Err(Error::Validation(format!("document has no {unit}s")));
    }
    let take = count.min(total);
    if capped && take > CAP_KEEP {
        return Err(elided_err());
    }
    let (first_idx, last_idx) = if from_start {
        (0, take - 1)
    } else {
        (total - take, total - 1)
    };

    let first = spans
        .iter()
        .map(&span_of)
        .find(|(i, _, _)| *i == first_idx)
        .ok_or_else(elided_err)?;
    let last = spans
        .iter()
        .map(&span_of)
        .find(|(i, _, _)| *i == last_idx)
        .ok_or_else(elided_err)?;
    Ok(content[first.1..last.2].trim().to_string())
}

fn not_found_err(unit: &str, position: usize, total: usize) -> Error {
    Error::Validation(format!(
        "{unit} {position} not found, document has {total} {unit}s"
    ))
}

fn elided_err() -> Error {
    Error::Validation(
        "boundary not retained for this document size; only the first and last 100 spans are kept"
            .to_string(),
    )
}

/// Case-insensitive search from byte offset `from`; returns the matched
/// byte span in the original content.
///
/// ASCII content takes the lowercased-bytes fast path. Otherwise a
/// per-char scan folds both sides through `char::to_lowercase`, so
/// reported positions always index the original string.
fn search_ci(content: &str, needle: &str, from: usize) -> Option<(usize, usize)> {
    if from >= content.len() {
        return None;
    }
    if content.is_ascii() && needle.is_ascii() {
        let haystack = content[from..].to_ascii_lowercase();
        let target = needle.to_ascii_lowercase();
        return haystack.find(&target).map(|i| (from + i, from + i + needle.len()));
    }

    let folded_needle: Vec<char> = needle.chars().flat_map(char::to_lowercase).collect();
    if folded_needle.is_empty() {
        return None;
    }
    let starts: Vec<usize> = content[from..].char_indices().map(|(i, _)| from + i).collect();
    for &start in &starts {
        let mut folded = content[start..].chars().flat_map(char::to_lowercase);
        if folded_needle.iter().all(|fc| folded.next() == Some(*fc)) {
            // Count original chars consumed to find the end offset.
            let mut needed = folded_needle.len();
            let mut end = start;
            for (i, ch) in content[start..].char_indices() {
                if needed == 0 {
                    break;
                }
                let folds = ch.to_lowercase().count();
                needed = needed.saturating_sub(folds);
                end = start + i + ch.len_utf8();
            }
            return Some((start, end));
        }
    }
    None
}

fn hit_payload(content: &str, start: usize, end: usize, context_chars: usize) -> serde_json::Value {
    let line_number = 1 + content[..start].bytes().filter(|b| *b == b'\n').count();
    let ctx_start = chars_back(content, start, context_chars);
    let ctx_end = chars_forward(content, end, context_chars);
    json!({
        "quote": &content[start..end],
        "lineNumber": line_number,
        "charPosition": start,
        "context": &content[ctx_start..ctx_end],
    })
}

/// Byte offset `count` chars before `pos` (clamped to 0).
fn chars_back(content: &str, pos: usize, count: usize) -> usize {
    content[..pos]
        .char_indices()
        .rev()
        .nth(count.saturating_sub(1))
        .map_or(0, |(i, _)| i)
}

/// Byte offset `count` chars past `pos` (clamped to the end).
fn chars_forward(content: &str, pos: usize, count: usize) -> usize {
    content[pos..]
        .char_indices()
        .nth(count)
        .map_or(content.len(), |(i, _)| pos + i)
}

/// First char boundary strictly after `pos`.
fn next_char_boundary(content: &str, pos: usize) -> usize {
    content[pos..]
        .char_indices()
        .nth(1)
        .map_or(content.len(), |(i, _)| pos + i)
}

fn truncate_display(text: &mut String, max_chars: usize) -> bool {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => {
            text.truncate(idx);
            true
        },
        None => false,
    }
}

/// Heading-like lines: markdown `#` headings and setext headings (a line
/// underlined with `===` or `---`). Returns `(line_index, title)` pairs.
fn heading_lines(content: &str) -> Vec<(usize, String)> {
    let lines: Vec<&str> = content.split('\n').collect();
    let mut headings = Vec::new();
    for (i, line) in lines.iter().enumerate() {
        let trimmed = line.trim();
        if trimmed.starts_with('#') {
            headings.push((i, trimmed.trim_start_matches('#').trim().to_string()));
            continue;
        }
        if !trimmed.is_empty() && is_setext_underline(lines.get(i + 1).copied()) {
            headings.push((i, trimmed.to_string()));
        }
    }
    headings
}

fn is_setext_underline(line: Option<&str>) -> bool {
    line.is_some_and(|l| {
        let t = l.trim();
        t.len() >= 3 && (t.bytes().all(|b| b == b'=') || t.bytes().all(|b| b == b'-'))
    })
}

/// Resolve a named section: the content between its heading and the next
/// heading.
fn section_text(content: &str, name: &str, label: &'static str) -> Result<QuoteAnswer> {
    let headings = heading_lines(content);
    let lower_name = name.to_lowercase();
    let position = headings
        .iter()
        .position(|(_, title)| title.to_lowercase().contains(&lower_name))
        .ok_or_else(|| Error::NotFound(format!("section '{name}' not found")))?;

    let lines: Vec<&str> = content.split('\n').collect();
    let (heading_line, title) = &headings[position];
    let body_start = if is_setext_underline(lines.get(heading_line + 1).copied()) {
        heading_line + 2
    } else {
        heading_line + 1
    };
    let body_end = headings
        .get(position + 1)
        .map_or(lines.len(), |(next_line, _)| *next_line);

    let body = lines[body_start..body_end].join("\n").trim().to_string();
    Ok(QuoteAnswer {
        mode: label,
        text: body,
        data: json!({ "section": title, "headingLine": heading_line + 1 }),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analyzer::analyze;
    use chrono::{TimeZone, Utc};

    fn profile_for(content: &str) -> Profile {
        analyze(content, Utc.with_ymd_and_hms(2025, 6, 1, 0, 0, 0).unwrap())
    }

    // Sentence/paragraph-level tests use a heading-free body; section tests
    // use the markdown document below.
    const DOC: &str = "\
Intro sentence one. Intro sentence two. Intro closes here.

Run the installer. Check the output.

Call the function. Done.";

    const DOC_MD: &str = "\
# Guide

Intro sentence one. Intro sentence two. Intro closes here.

## Installation

Run the installer. Check the output.

## Usage

Call the function. Done.";

    #[test]
    fn stats_report_all_counters() {
        let profile = profile_for(DOC);
        let answer = execute(DOC, &profile, QuoteMode::Stats).unwrap();
        assert_eq!(answer.mode, "stats");
        assert_eq!(answer.data["sentenceCount"], 7);
        assert_eq!(answer.data["paragraphCount"], 3);
        assert!(answer.text.contains("7 sentences"));
    }

    #[test]
    fn stat_specific_returns_only_one_counter() {
        let profile = profile_for(DOC);
        let answer =
            execute(DOC, &profile, QuoteMode::StatSpecific(StatUnit::Sentences)).unwrap();
        assert_eq!(answer.data, serde_json::json!({ "unit": "sentences", "count": 7 }));
        assert!(answer.data.get("wordCount").is_none());
    }

    #[test]
    fn nth_sentence_and_out_of_range() {
        let profile = profile_for(DOC);
        let answer = execute(
            DOC,
            &profile,
            QuoteMode::Nth {
                position: 2,
                unit: SpanUnit::Sentence,
            },
        )
        .unwrap();
        assert_eq!(answer.text, "Intro sentence two.");

        let err = execute(
            DOC,
            &profile,
            QuoteMode::Nth {
                position: 99,
                unit: SpanUnit::Sentence,
            },
        )
        .unwrap_err();
        assert!(err.to_string().contains("document has 7 sentences"));
    }

    #[test]
    fn nth_word_lookup() {
        let profile = profile_for("alpha beta gamma");
        let answer = execute(
            "alpha beta gamma",
            &profile,
            QuoteMode::Nth {
                position: 2,
                unit: SpanUnit::Word,
            },
        )
        .unwrap();
        assert_eq!(answer.text, "beta");
    }

    #[test]
    fn first_and_last_slices() {
        let profile = profile_for(DOC);
        let first = execute(
            DOC,
            &profile,
            QuoteMode::FirstN {
                count: 2,
                unit: SpanUnit::Sentence,
            },
        )
        .unwrap();
        assert_eq!(first.text, "Intro sentence one. Intro sentence two.");

        let last = execute(
            DOC,
            &profile,
            QuoteMode::LastN {
                count: 2,
                unit: SpanUnit::Sentence,
            },
        )
        .unwrap();
        assert_eq!(last.text, "Call the function. Done.");
    }

    #[test]
    fn implicit_start_is_first_three_sentences() {
        let profile = profile_for(DOC);
        let answer = execute(DOC, &profile, QuoteMode::ImplicitStart).unwrap();
        assert_eq!(
            answer.text,
            "Intro sentence one. Intro sentence two. Intro closes here."
        );
        assert_eq!(answer.mode, "implicit_start");
    }

    #[test]
    fn ranges_clamp_to_the_end() {
        let profile = profile_for(DOC);
        let answer = execute(
            DOC,
            &profile,
            QuoteMode::SentenceRange { start: 6, end: 50 },
        )
        .unwrap();
        assert_eq!(answer.text, "Call the function. Done.");
        assert_eq!(answer.data["end"], 7);
    }

    #[test]
    fn line_range_with_open_end() {
        let content = "one\ntwo\nthree\nfour";
        let profile = profile_for(content);
        let answer = execute(
            content,
            &profile,
            QuoteMode::Range {
                start: 3,
                end: None,
            },
        )
        .unwrap();
        assert_eq!(answer.text, "three\nfour");
    }

    #[test]
    fn line_lookup() {
        let content = "one\ntwo\nthree";
        let profile = profile_for(content);
        let answer = execute(content, &profile, QuoteMode::Line { number: 2 }).unwrap();
        assert_eq!(answer.text, "two");
    }

    #[test]
    fn full_reports_byte_count_and_truncates_display() {
        let content = "x".repeat(6_000);
        let profile = profile_for(&content);
        let answer = execute(&content, &profile, QuoteMode::Full).unwrap();
        assert_eq!(answer.data["byteCount"], 6_000);
        assert_eq!(answer.data["displayTruncated"], true);
        assert_eq!(answer.text.chars().count(), FULL_DISPLAY_CHARS);
    }

    #[test]
    fn search_preserves_original_case() {
        let content = "Neural Networks are cool. neural networks scale.";
        let profile = profile_for(content);
        let answer = execute(
            content,
            &profile,
            QuoteMode::Search {
                needle: "neural networks".to_string(),
            },
        )
        .unwrap();
        assert_eq!(answer.text, "Neural Networks");
        assert_eq!(answer.data["match"]["lineNumber"], 1);
        assert_eq!(answer.data["match"]["charPosition"], 0);
    }

    #[test]
    fn search_all_counts_every_occurrence() {
        let content = "Neural Networks are cool. neural networks scale.";
        let profile = profile_for(content);
        let answer = execute(
            content,
            &profile,
            QuoteMode::SearchAll {
                needle: "neural networks".to_string(),
                count_only: false,
            },
        )
        .unwrap();
        assert_eq!(answer.data["totalCount"], 2);
        assert_eq!(answer.data["matches"].as_array().unwrap().len(), 2);

        let count_only = execute(
            content,
            &profile,
            QuoteMode::SearchAll {
                needle: "neural networks".to_string(),
                count_only: true,
            },
        )
        .unwrap();
        assert_eq!(count_only.data["totalCount"], 2);
        assert!(count_only.data.get("matches").is_none());
    }

    #[test]
    fn search_line_numbers_count_newlines() {
        let content = "first line\nsecond line with Target here";
        let profile = profile_for(content);
        let answer = execute(
            content,
            &profile,
            QuoteMode::Search {
                needle: "target".to_string(),
            },
        )
        .unwrap();
        assert_eq!(answer.data["match"]["lineNumber"], 2);
        let pos = answer.data["match"]["charPosition"].as_u64().unwrap() as usize;
        assert_eq!(
            content[pos..pos + "target".len()].to_lowercase(),
            "target"
        );
    }

    #[test]
    fn advance_by_one_counts_overlapping_hits() {
        let content = "aaaa";
        let profile = profile_for(content);
        let answer = execute(
            content,
            &profile,
            QuoteMode::SearchAll {
                needle: "aa".to_string(),
                count_only: true,
            },
        )
        .unwrap();
        assert_eq!(answer.data["totalCount"], 3);
    }

    #[test]
    fn section_lookup_runs_to_next_heading() {
        let profile = profile_for(DOC_MD);
        let answer = execute(
            DOC_MD,
            &profile,
            QuoteMode::Section {
                name: "installation".to_string(),
            },
        )
        .unwrap();
        assert_eq!(answer.text, "Run the installer. Check the output.");

        let missing = execute(
            DOC_MD,
            &profile,
            QuoteMode::Section {
                name: "deployment".to_string(),
            },
        );
        assert!(matches!(missing, Err(Error::NotFound(_))));
    }

    #[test]
    fn section_list_returns_headings() {
        let profile = profile_for(DOC_MD);
        let answer = execute(DOC_MD, &profile, QuoteMode::SectionList).unwrap();
        assert_eq!(answer.text, "Guide\nInstallation\nUsage");
        assert_eq!(answer.data["sections"].as_array().unwrap().len(), 3);
    }

    #[test]
    fn compound_concatenates_parts() {
        let profile = profile_for(DOC);
        let answer = execute(
            DOC,
            &profile,
            QuoteMode::Compound {
                parts: vec![
                    request::CompoundPart {
                        selector: CompoundSelector::Nth(1),
                        unit: SpanUnit::Sentence,
                    },
                    request::CompoundPart {
                        selector: CompoundSelector::Last,
                        unit: SpanUnit::Sentence,
                    },
                ],
            },
        )
        .unwrap();
        assert_eq!(answer.text, "Intro sentence one.\nDone.");
    }

    #[test]
    fn empty_document_stats_are_zero() {
        let profile = profile_for("");
        let answer = execute("", &profile, QuoteMode::Stats).unwrap();
        assert_eq!(answer.data["charCount"], 0);
        assert_eq!(answer.data["sentenceCount"], 0);
    }

    #[test]
    fn capped_middle_indices_are_rejected() {
        // Profile with a synthetically capped sentence array.
        let content = "One. Two. Three.";
        let mut profile = profile_for(content);
        profile.sentences_capped = true;
        profile.sentence_count = 500;

        let err = execute(
            content,
            &profile,
            QuoteMode::Nth {
                position: 250,
                unit: SpanUnit::Sentence,
            },
        )
        .unwrap_err();
        assert!(err.to_string().contains("not retained"));

        let err = execute(
            content,
            &profile,
            QuoteMode::FirstN {
                count: 200,
                unit: SpanUnit::Sentence,
            },
        )
        .unwrap_err();
        assert!(err.to_string().contains("not retained"));
    }

    #[test]
    fn unicode_search_positions_index_the_original() {
        let content = "Zurück zur Übersicht. mehr ZURÜCK hier.";
        let profile = profile_for(content);
        let answer = execute(
            content,
            &profile,
            QuoteMode::SearchAll {
                needle: "zurück".to_string(),
                count_only: false,
            },
        )
        .unwrap();
        assert_eq!(answer.data["totalCount"], 2);
        for hit in answer.data["matches"].as_array().unwrap() {
            let pos = hit["charPosition"].as_u64().unwrap() as usize;
            let quote = hit["quote"].as_str().unwrap();
            assert_eq!(&content[pos..pos + quote.len()], quote);
            assert_eq!(quote.to_lowercase(), "zurück");
        }
    }
}
