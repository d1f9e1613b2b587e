use std::sync::OnceLock;

use regex::Regex;

fn mention_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"<@!?\d+>").expect("valid mention regex"))
}

/// Strips platform mention markup (`<@!123>`, `<@123>`) and surrounding
/// spaces / NBSP.
pub fn strip_mentions(raw: &str) -> String {
    let stripped = mention_re().replace_all(raw, "");
    stripped
        .trim_matches(|c: char| c == ' ' || c == '\u{00A0}')
        .to_string()
}

/// Router input: mentions stripped, lower-cased.
pub fn normalize(raw: &str) -> String {
    strip_mentions(raw).to_lowercase()
}

/// True when a reply candidate should be sent as uploaded media.
pub fn looks_like_media_url(text: &str) -> bool {
    text.starts_with("http")
}
