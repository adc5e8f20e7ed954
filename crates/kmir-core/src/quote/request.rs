//! Natural-language quote request parsing.
//!
//! Requests resolve to exactly one [`QuoteMode`] through an ordered regex
//! cascade — first match wins. Structured arguments, when supplied,
//! override what the text parse produced; unknown argument keys are
//! ignored.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::Deserialize;

use super::numbers::parse_number;
use crate::error::{Error, Result};

/// Span-addressable units.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpanUnit {
    /// Sentence spans.
    Sentence,
    /// Paragraph spans.
    Paragraph,
    /// Line spans.
    Line,
    /// Whitespace-separated words.
    Word,
}

impl SpanUnit {
    /// Singular display name.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Sentence => "sentence",
            Self::Paragraph => "paragraph",
            Self::Line => "line",
            Self::Word => "word",
        }
    }

    fn from_word(word: &str) -> Option<Self> {
        match word.trim_end_matches('s').to_ascii_lowercase().as_str() {
            "sentence" => Some(Self::Sentence),
            "paragraph" => Some(Self::Paragraph),
            "line" => Some(Self::Line),
            "word" => Some(Self::Word),
            _ => None,
        }
    }
}

/// Counter kinds for `stat_specific`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatUnit {
    /// Unicode scalar count.
    Chars,
    /// Word count.
    Words,
    /// Line count.
    Lines,
    /// Sentence count.
    Sentences,
    /// Paragraph count.
    Paragraphs,
}

impl StatUnit {
    fn from_word(word: &str) -> Option<Self> {
        match word.trim_end_matches('s').to_ascii_lowercase().as_str() {
            "char" | "character" => Some(Self::Chars),
            "word" => Some(Self::Words),
            "line" => Some(Self::Lines),
            "sentence" => Some(Self::Sentences),
            "paragraph" => Some(Self::Paragraphs),
            _ => None,
        }
    }
}

/// One element of a compound request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CompoundPart {
    /// Which span within the unit array.
    pub selector: CompoundSelector,
    /// The unit the selector indexes.
    pub unit: SpanUnit,
}

/// Position selector inside a compound request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompoundSelector {
    /// 1-based position.
    Nth(usize),
    /// The final span.
    Last,
}

/// The closed set of quote modes.
#[derive(Debug, Clone, PartialEq)]
pub enum QuoteMode {
    /// All counters and averages.
    Stats,
    /// One requested counter.
    StatSpecific(StatUnit),
    /// Leading slice of a unit array.
    FirstN {
        /// How many spans.
        count: usize,
        /// Which unit.
        unit: SpanUnit,
    },
    /// Trailing slice of a unit array.
    LastN {
        /// How many spans.
        count: usize,
        /// Which unit.
        unit: SpanUnit,
    },
    /// One span by 1-based position.
    Nth {
        /// 1-based position.
        position: usize,
        /// Which unit.
        unit: SpanUnit,
    },
    /// One paragraph by 1-based position (the `paragraph N` phrasing).
    Paragraph {
        /// 1-based position.
        position: usize,
    },
    /// The opening paragraph.
    FirstParagraph,
    /// The closing paragraph.
    LastParagraph,
    /// Inclusive line range; `end = None` means "to end".
    Range {
        /// 1-based first line.
        start: usize,
        /// 1-based last line, open when absent.
        end: Option<usize>,
    },
    /// Inclusive sentence range.
    SentenceRange {
        /// 1-based first sentence.
        start: usize,
        /// 1-based last sentence.
        end: usize,
    },
    /// Inclusive paragraph range.
    ParagraphRange {
        /// 1-based first paragraph.
        start: usize,
        /// 1-based last paragraph.
        end: usize,
    },
    /// The whole document (display-truncated).
    Full,
    /// One line by 1-based number.
    Line {
        /// 1-based line number.
        number: usize,
    },
    /// First case-insensitive match.
    Search {
        /// What to look for.
        needle: String,
    },
    /// Every case-insensitive match.
    SearchAll {
        /// What to look for.
        needle: String,
        /// Only report the total.
        count_only: bool,
    },
    /// "How does it start" — rewritten to the first three sentences.
    ImplicitStart,
    /// "How does it end" — rewritten to the last three sentences.
    ImplicitEnd,
    /// A named section up to the next heading.
    Section {
        /// Heading name, matched case-insensitively.
        name: String,
    },
    /// All heading-like lines.
    SectionList,
    /// Several positional picks, concatenated.
    Compound {
        /// The picks, in request order.
        parts: Vec<CompoundPart>,
    },
}

impl QuoteMode {
    /// Stable mode label used in results.
    #[must_use]
    pub const fn label(&self) -> &'static str {
        match self {
            Self::Stats => "stats",
            Self::StatSpecific(_) => "stat_specific",
            Self::FirstN { .. } => "first_n",
            Self::LastN { .. } => "last_n",
            Self::Nth { .. } => "nth",
            Self::Paragraph { .. } => "paragraph",
            Self::FirstParagraph => "first_paragraph",
            Self::LastParagraph => "last_paragraph",
            Self::Range { .. } => "range",
            Self::SentenceRange { .. } => "sentence_range",
            Self::ParagraphRange { .. } => "paragraph_range",
            Self::Full => "full",
            Self::Line { .. } => "line",
            Self::Search { .. } => "search",
            Self::SearchAll { .. } => "search_all",
            Self::ImplicitStart => "implicit_start",
            Self::ImplicitEnd => "implicit_end",
            Self::Section { .. } => "section",
            Self::SectionList => "section_list",
            Self::Compound { .. } => "compound",
        }
    }
}

/// Recognized structured arguments; unknown keys are dropped during
/// deserialization.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuoteArgs {
    /// Span count for first/last/nth.
    #[serde(default)]
    pub count: Option<usize>,
    /// Unit word (`sentence`, `paragraph`, `line`, `word`).
    #[serde(default)]
    pub unit: Option<String>,
    /// Search needle.
    #[serde(default)]
    pub needle: Option<String>,
    /// Only report totals for `search_all`.
    #[serde(default)]
    pub count_only: Option<bool>,
    /// Range start (1-based).
    #[serde(default)]
    pub start: Option<usize>,
    /// Range end (1-based).
    #[serde(default)]
    pub end: Option<usize>,
    /// Section name.
    #[serde(default)]
    pub name: Option<String>,
}

impl QuoteArgs {
    /// Deserialize from an opaque JSON bag, ignoring unknown keys.
    pub fn from_value(value: &serde_json::Value) -> Self {
        serde_json::from_value(value.clone()).unwrap_or_default()
    }
}

macro_rules! cascade_regex {
    ($name:ident, $pattern:literal) => {
        #[allow(clippy::expect_used)]
        static $name: Lazy<Regex> = Lazy::new(|| Regex::new($pattern).expect("static regex"));
    };
}

cascade_regex!(
    SECTION_LIST,
    r"(?i)\btable of contents\b|\b(?:list|what|which|show)\b.*\b(?:sections|headings)\b|\b(?:sections|headings)\b.*\bare there\b"
);
cascade_regex!(
    STATS,
    r"(?i)^\s*(?:document\s+|doc\s+)?stat(?:s|istics)?\s*\??\s*$|^\s*(?:an?\s+|the\s+)?overview\s*\??\s*$|\bsummary of (?:the\s+)?structure\b|\bdocument (?:overview|structure)\b|\b(?:overview|structure) of (?:the|this) document\b"
);
cascade_regex!(
    STAT_SPECIFIC,
    r"(?i)\b(?:how many|number of|count of|total)\s+(words?|sentences?|paragraphs?|lines?|characters?|chars?)\b"
);
cascade_regex!(
    STAT_COUNT_SUFFIX,
    r"(?i)\b(word|sentence|paragraph|line|char(?:acter)?)\s+count\b"
);
cascade_regex!(
    COUNT_ONLY_TIMES,
    r"(?i)\bhow many times\b.*?\b(?:does|do|is|are)\s+(.+?)\s+(?:appear|occur|show up)s?\b"
);
cascade_regex!(
    COUNT_ONLY_OCCURRENCES,
    r"(?i)\bcount\s+(?:the\s+)?occurrences\s+of\s+(.+)$"
);
cascade_regex!(
    SEARCH_ALL,
    r"(?i)\b(?:find|show|list|get)\s+(?:all|every)\s+(?:occurrences?\s+of\s+)?(.+)$|\b(?:all occurrences|every occurrence)\s+of\s+(.+)$"
);
cascade_regex!(
    SEARCH,
    r"(?i)\b(?:search for|look for|find|locate)\s+(.+)$|\bwhere does it (?:say|mention)\s+(.+)$"
);
cascade_regex!(
    SECTION_NAMED,
    r#"(?i)\bsection\s+(?:called|named|titled)\s+(.+)$|\bsection\s+["'“](.+?)["'”]"#
);
cascade_regex!(SECTION_THE, r"(?i)\bthe\s+(.+?)\s+section\b");
cascade_regex!(
    PARAGRAPH_RANGE,
    r"(?i)\bparagraphs\s+(\S+)\s*(?:-|–|—|to|through)\s*(\S+)"
);
cascade_regex!(
    SENTENCE_RANGE,
    r"(?i)\bsentences\s+(\S+)\s*(?:-|–|—|to|through)\s*(\S+)|\bfrom sentence\s+(\S+)\s+(?:to|through)\s+(\S+)"
);
cascade_regex!(
    LINE_RANGE,
    r"(?i)\blines\s+(\S+)\s*(?:-|–|—|to|through)\s*(\S+)|\bfrom line\s+(\S+)\s+(?:to|through)\s+(\S+)"
);
cascade_regex!(LINE_RANGE_OPEN, r"(?i)\blines?\s+(\S+?)\s*\+");
cascade_regex!(LINE_SINGLE, r"(?i)\bline\s+(?:number\s+)?(\S+)");
cascade_regex!(FIRST_PARAGRAPH, r"(?i)\b(?:first|opening)\s+paragraph\b");
cascade_regex!(LAST_PARAGRAPH, r"(?i)\b(?:last|final|closing)\s+paragraph\b");
cascade_regex!(
    FIRST_N,
    r"(?i)\bfirst\s+(\S+)\s+(sentences?|paragraphs?|lines?|words?)\b"
);
cascade_regex!(
    LAST_N,
    r"(?i)\blast\s+(\S+)\s+(sentences?|paragraphs?|lines?|words?)\b"
);
cascade_regex!(FIRST_ONE, r"(?i)\bfirst\s+(sentence|line|word)\b");
cascade_regex!(LAST_ONE, r"(?i)\blast\s+(sentence|line|word)\b");
cascade_regex!(
    NTH_PREFIX,
    r"(?i)\b(\S+)\s+(sentence|paragraph|line|word)\b"
);
cascade_regex!(
    NTH_SUFFIX,
    r"(?i)\b(sentence|paragraph|word)\s+(?:number\s+)?(\S+)"
);
cascade_regex!(
    IMPLICIT_START,
    r"(?i)\bhow does (?:it|the document|this) (?:start|begin|open)\b|\bthe beginning\b|\bthe start\b"
);
cascade_regex!(
    IMPLICIT_END,
    r"(?i)\bhow does (?:it|the document|this) (?:end|finish|close)\b|\bthe end(?:ing)?\b|\bconclusion\b"
);
cascade_regex!(
    FULL,
    r"(?i)\bfull (?:text|document|contents?)\b|\bentire (?:document|text)\b|\bwhole (?:document|thing|text)\b|^\s*everything\s*$"
);

/// Resolve a request to one mode: text cascade first, structured argument
/// overrides second.
pub fn parse_request(text: &str, args: &QuoteArgs) -> Result<QuoteMode> {
    let parsed = parse_text(text);
    match apply_args(parsed, args) {
        Some(mode) => Ok(mode),
        None => Err(Error::Validation(format!(
            "could not understand quote request '{}'; try phrasings like \
             'third sentence', 'first 3 paragraphs', 'sentences 2-5', 'line 12', \
             'find <text>', 'find all <text>', 'the <name> section', 'stats', or 'full text'",
            text.trim()
        ))),
    }
}

#[allow(clippy::too_many_lines)]
fn parse_text(text: &str) -> Option<QuoteMode> {
    let text = text.trim();

    if SECTION_LIST.is_match(text) {
        return Some(QuoteMode::SectionList);
    }
    if STATS.is_match(text) {
        return Some(QuoteMode::Stats);
    }
    if let Some(caps) = STAT_SPECIFIC.captures(text) {
        if let Some(unit) = StatUnit::from_word(&caps[1]) {
            return Some(QuoteMode::StatSpecific(unit));
        }
    }
    if let Some(caps) = STAT_COUNT_SUFFIX.captures(text) {
        if let Some(unit) = StatUnit::from_word(&caps[1]) {
            return Some(QuoteMode::StatSpecific(unit));
        }
    }
    if let Some(caps) = COUNT_ONLY_TIMES.captures(text) {
        return Some(QuoteMode::SearchAll {
            needle: clean_needle(&caps[1]),
            count_only: true,
        });
    }
    if let Some(caps) = COUNT_ONLY_OCCURRENCES.captures(text) {
        return Some(QuoteMode::SearchAll {
            needle: clean_needle(&caps[1]),
            count_only: true,
        });
    }
    if let Some(caps) = SEARCH_ALL.captures(text) {
        let needle = caps.get(1).or_else(|| caps.get(2));
        if let Some(needle) = needle {
            return Some(QuoteMode::SearchAll {
                needle: clean_needle(needle.as_str()),
                count_only: false,
            });
        }
    }
    if let Some(caps) = SEARCH.captures(text) {
        let needle = caps.get(1).or_else(|| caps.get(2));
        if let Some(needle) = needle {
            return Some(QuoteMode::Search {
                needle: clean_needle(needle.as_str()),
            });
        }
    }
    if let Some(caps) = SECTION_NAMED.captures(text) {
        let name = caps.get(1).or_else(|| caps.get(2));
        if let Some(name) = name {
            return Some(QuoteMode::Section {
                name: clean_needle(name.as_str()),
            });
        }
    }
    if let Some(caps) = SECTION_THE.captures(text) {
        return Some(QuoteMode::Section {
            name: clean_needle(&caps[1]),
        });
    }
    if let Some(parts) = parse_compound(text) {
        return Some(QuoteMode::Compound { parts });
    }
    if let Some(caps) = PARAGRAPH_RANGE.captures(text) {
        if let (Some(start), Some(end)) = (parse_number(&caps[1]), parse_number(&caps[2])) {
            return Some(QuoteMode::ParagraphRange { start, end });
        }
    }
    if let Some(caps) = SENTENCE_RANGE.captures(text) {
        let pair = captured_pair(&caps);
        if let Some((start, end)) = pair {
            return Some(QuoteMode::SentenceRange { start, end });
        }
    }
    if let Some(caps) = LINE_RANGE.captures(text) {
        let first = caps.get(1).or_else(|| caps.get(3));
        let second = caps.get(2).or_else(|| caps.get(4));
        if let (Some(first), Some(second)) = (first, second) {
            if let Some(start) = parse_number(first.as_str()) {
                if second.as_str().eq_ignore_ascii_case("end") {
                    return Some(QuoteMode::Range { start, end: None });
                }
                if let Some(end) = parse_number(second.as_str()) {
                    return Some(QuoteMode::Range {
                        start,
                        end: Some(end),
                    });
                }
            }
        }
    }
    if let Some(caps) = LINE_RANGE_OPEN.captures(text) {
        if let Some(start) = parse_number(&caps[1]) {
            return Some(QuoteMode::Range { start, end: None });
        }
    }
    if FIRST_PARAGRAPH.is_match(text) {
        return Some(QuoteMode::FirstParagraph);
    }
    if LAST_PARAGRAPH.is_match(text) {
        return Some(QuoteMode::LastParagraph);
    }
    if let Some(caps) = FIRST_N.captures(text) {
        if let (Some(count), Some(unit)) = (parse_number(&caps[1]), SpanUnit::from_word(&caps[2])) {
            return Some(QuoteMode::FirstN { count, unit });
        }
    }
    if let Some(caps) = LAST_N.captures(text) {
        if let (Some(count), Some(unit)) = (parse_number(&caps[1]), SpanUnit::from_word(&caps[2])) {
            return Some(QuoteMode::LastN { count, unit });
        }
    }
    if let Some(caps) = FIRST_ONE.captures(text) {
        if let Some(unit) = SpanUnit::from_word(&caps[1]) {
            return Some(QuoteMode::FirstN { count: 1, unit });
        }
    }
    if let Some(caps) = LAST_ONE.captures(text) {
        if let Some(unit) = SpanUnit::from_word(&caps[1]) {
            return Some(QuoteMode::LastN { count: 1, unit });
        }
    }
    if let Some(caps) = NTH_PREFIX.captures(text) {
        if let (Some(position), Some(unit)) =
            (parse_number(&caps[1]), SpanUnit::from_word(&caps[2]))
        {
            if unit == SpanUnit::Line {
                return Some(QuoteMode::Line { number: position });
            }
            if unit == SpanUnit::Paragraph {
                return Some(QuoteMode::Paragraph { position });
            }
            return Some(QuoteMode::Nth { position, unit });
        }
    }
    if let Some(caps) = NTH_SUFFIX.captures(text) {
        if let (Some(unit), Some(position)) =
            (SpanUnit::from_word(&caps[1]), parse_number(&caps[2]))
        {
            if unit == SpanUnit::Paragraph {
                return Some(QuoteMode::Paragraph { position });
            }
            return Some(QuoteMode::Nth { position, unit });
        }
    }
    if let Some(caps) = LINE_SINGLE.captures(text) {
        if let Some(number) = parse_number(&caps[1]) {
            return Some(QuoteMode::Line { number });
        }
    }
    if IMPLICIT_START.is_match(text) {
        return Some(QuoteMode::ImplicitStart);
    }
    if IMPLICIT_END.is_match(text) {
        return Some(QuoteMode::ImplicitEnd);
    }
    if FULL.is_match(text) {
        return Some(QuoteMode::Full);
    }
    None
}

fn captured_pair(caps: &regex::Captures<'_>) -> Option<(usize, usize)> {
    let first = caps.get(1).or_else(|| caps.get(3))?;
    let second = caps.get(2).or_else(|| caps.get(4))?;
    Some((parse_number(first.as_str())?, parse_number(second.as_str())?))
}

/// Compound: two or more positional picks joined by "and", with units
/// inherited from the nearest pick to the right that names one.
fn parse_compound(text: &str) -> Option<Vec<CompoundPart>> {
    #[allow(clippy::expect_used)]
    static LEAD_VERBS: Lazy<Regex> = Lazy::new(|| {
        Regex::new(r"(?i)^\s*(?:get|show|give me|quote|read)\s+").expect("static regex")
    });
    #[allow(clippy::expect_used)]
    static PART: Lazy<Regex> = Lazy::new(|| {
        Regex::new(r"(?i)^(?:the\s+)?(\S+)(?:\s+(sentences?|paragraphs?|lines?|words?))?$")
            .expect("static regex")
    });

    let stripped = LEAD_VERBS.replace(text.trim(), "");
    let pieces: Vec<&str> = stripped.split(" and ").map(str::trim).collect();
    if pieces.len() < 2 {
        return None;
    }

    let mut selectors = Vec::with_capacity(pieces.len());
    let mut units: Vec<Option<SpanUnit>> = Vec::with_capacity(pieces.len());
    for piece in pieces {
        let caps = PART.captures(piece)?;
        let selector = match caps[1].to_ascii_lowercase().as_str() {
            "last" | "final" => CompoundSelector::Last,
            other => CompoundSelector::Nth(parse_number(other)?),
        };
        selectors.push(selector);
        units.push(caps.get(2).and_then(|m| SpanUnit::from_word(m.as_str())));
    }

    // Units inherit rightward: "first and last sentence" reads as two
    // sentence picks.
    let mut next_unit = None;
    for unit in units.iter_mut().rev() {
        match unit {
            Some(u) => next_unit = Some(*u),
            None => *unit = next_unit,
        }
    }
    if units.iter().any(Option::is_none) {
        return None;
    }

    Some(
        selectors
            .into_iter()
            .zip(units)
            .filter_map(|(selector, unit)| unit.map(|unit| CompoundPart { selector, unit }))
            .collect(),
    )
}

/// Strip quotes and trailing request punctuation from a captured needle.
fn clean_needle(raw: &str) -> String {
    raw.trim()
        .trim_end_matches(['?', '.', '!'])
        .trim()
        .trim_matches(['"', '\'', '\u{201c}', '\u{201d}', '\u{2018}', '\u{2019}'])
        .to_string()
}

/// Layer structured arguments over the text parse.
fn apply_args(parsed: Option<QuoteMode>, args: &QuoteArgs) -> Option<QuoteMode> {
    let arg_unit = args.unit.as_deref().and_then(SpanUnit::from_word);

    let mut mode = match parsed {
        Some(mode) => mode,
        // No text match: a fully specified argument set still resolves.
        None => {
            if let Some(needle) = &args.needle {
                if args.count_only == Some(true) {
                    QuoteMode::SearchAll {
                        needle: needle.clone(),
                        count_only: true,
                    }
                } else {
                    QuoteMode::Search {
                        needle: needle.clone(),
                    }
                }
            } else if let Some(name) = &args.name {
                QuoteMode::Section { name: name.clone() }
            } else if let (Some(start), Some(end)) = (args.start, args.end) {
                QuoteMode::SentenceRange { start, end }
            } else if let (Some(count), Some(unit)) = (args.count, arg_unit) {
                QuoteMode::Nth {
                    position: count,
                    unit,
                }
            } else {
                return None;
            }
        },
    };

    match &mut mode {
        QuoteMode::Search { needle } | QuoteMode::SearchAll { needle, .. } => {
            if let Some(over) = &args.needle {
                needle.clone_from(over);
            }
        },
        QuoteMode::Section { name } => {
            if let Some(over) = &args.name {
                name.clone_from(over);
            }
        },
        QuoteMode::FirstN { count, unit } | QuoteMode::LastN { count, unit } => {
            if let Some(over) = args.count {
                *count = over;
            }
            if let Some(over) = arg_unit {
                *unit = over;
            }
        },
        QuoteMode::Nth { position, unit } => {
            if let Some(over) = args.count {
                *position = over;
            }
            if let Some(over) = arg_unit {
                *unit = over;
            }
        },
        QuoteMode::SentenceRange { start, end } | QuoteMode::ParagraphRange { start, end } => {
            if let Some(over) = args.start {
                *start = over;
            }
            if let Some(over) = args.end {
                *end = over;
            }
        },
        QuoteMode::Range { start, end } => {
            if let Some(over) = args.start {
                *start = over;
            }
            if let Some(over) = args.end {
                *end = Some(over);
            }
        },
        _ => {},
    }
    if let QuoteMode::SearchAll { count_only, .. } = &mut mode {
        if let Some(over) = args.count_only {
            *count_only = over;
        }
    }

    Some(mode)
}
