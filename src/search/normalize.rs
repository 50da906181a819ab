//! Text cleanup shared by corpus indexing and query preprocessing.

use regex::Regex;
use std::sync::OnceLock;

/// Hebrew query terms and their English replacements.
///
/// Applied top to bottom as literal replacements over the whole query, so the
/// order matters wherever one entry's output could feed another.
pub const HEBREW_TO_ENGLISH: &[(&str, &str)] = &[
    ("צ'אט", "chat"),
    ("צאט", "chat"),
    ("בוט", "bot"),
    ("תמונה", "image"),
    ("תמונות", "image"),
    ("וידאו", "video"),
    ("וידיו", "video"),
    ("סרטון", "video"),
    ("טקסט", "text"),
    ("כתיבה", "writing"),
    ("עיצוב", "design"),
    ("יצירה", "generation create"),
    ("חינמי", "free"),
    ("בחינם", "free"),
    ("בתשלום", "paid"),
    ("עריכה", "editing"),
    ("קוד", "code"),
    ("תכנות", "programming code"),
    ("אתר", "website"),
    ("לוגו", "logo"),
    ("מוסיקה", "music"),
    ("קול", "voice audio"),
    ("תרגום", "translation"),
    ("שפה", "language"),
];

fn special_chars() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"[^\p{L}\p{N}_\s]").expect("valid special character pattern"))
}

fn whitespace() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\s+").expect("valid whitespace pattern"))
}

/// Replace every character that is not a letter, digit, `_` or whitespace
/// with a space, collapse runs of whitespace and trim.
///
/// Combining marks (Hebrew niqqud, decomposed accents) and joiners are
/// stripped like any other punctuation.
pub fn normalize(text: &str) -> String {
    let text = special_chars().replace_all(text, " ");
    let text = whitespace().replace_all(&text, " ");
    text.trim().to_string()
}

/// Translate known Hebrew terms, then [`normalize`].
pub fn preprocess_query(query: &str) -> String {
    let translated = HEBREW_TO_ENGLISH
        .iter()
        .fold(query.to_string(), |acc, (hebrew, english)| {
            acc.replace(hebrew, english)
        });
    normalize(&translated)
}
