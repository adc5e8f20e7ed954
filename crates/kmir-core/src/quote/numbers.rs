//! Number-word parsing for quote requests.
//!
//! Positions and counts arrive as digits (`3`), ordinal suffixes (`3rd`,
//! `21st`), cardinal words (`three`, `twenty`, `hundred`) or ordinal words
//! (`third`, `twentieth`). Everything is matched case-insensitively.

const CARDINALS: &[(&str, usize)] = &[
    ("one", 1),
    ("two", 2),
    ("three", 3),
    ("four", 4),
    ("five", 5),
    ("six", 6),
    ("seven", 7),
    ("eight", 8),
    ("nine", 9),
    ("ten", 10),
    ("eleven", 11),
    ("twelve", 12),
    ("thirteen", 13),
    ("fourteen", 14),
    ("fifteen", 15),
    ("sixteen", 16),
    ("seventeen", 17),
    ("eighteen", 18),
    ("nineteen", 19),
    ("twenty", 20),
    ("hundred", 100),
];

const ORDINALS: &[(&str, usize)] = &[
    ("first", 1),
    ("second", 2),
    ("third", 3),
    ("fourth", 4),
    ("fifth", 5),
    ("sixth", 6),
    ("seventh", 7),
    ("eighth", 8),
    ("ninth", 9),
    ("tenth", 10),
    ("eleventh", 11),
    ("twelfth", 12),
    ("thirteenth", 13),
    ("fourteenth", 14),
    ("fifteenth", 15),
    ("sixteenth", 16),
    ("seventeenth", 17),
    ("eighteenth", 18),
    ("nineteenth", 19),
    ("twentieth", 20),
];

/// Parse one token as a count or position.
#[must_use]
pub fn parse_number(token: &str) -> Option<usize> {
    let token = token.trim().to_ascii_lowercase();
    if token.is_empty() {
        return None;
    }

    if let Ok(n) = token.parse::<usize>() {
        return Some(n);
    }

    // Ordinal suffix: 1st, 2nd, 3rd, 21st, 112th.
    if let Some(digits) = token
        .strip_suffix("st")
        .or_else(|| token.strip_suffix("nd"))
        .or_else(|| token.strip_suffix("rd"))
        .or_else(|| token.strip_suffix("th"))
    {
        if !digits.is_empty() && digits.bytes().all(|b| b.is_ascii_digit()) {
            return digits.parse().ok();
        }
    }

    CARDINALS
        .iter()
        .chain(ORDINALS.iter())
        .find(|(word, _)| *word == token)
        .map(|(_, n)| *n)
}
