// src/pipeline/text.rs
use once_cell::sync::OnceCell;
use regex::Regex;

pub const TITLE_MIN_CHARS: usize = 5;
pub const TITLE_MAX_CHARS: usize = 150;
pub const DESCRIPTION_MAX_CHARS: usize = 1500;

/// Generic/navigational phrases scraped pages commonly surface as "titles".
pub const DEFAULT_BLACKLIST: &[&str] = &[
    "privacy policy",
    "cookie policy",
    "cookies policy",
    "terms of service",
    "terms of use",
    "terms and conditions",
    "newsletter",
    "click here",
    "read more",
    "learn more",
    "view all",
    "see all events",
    "skip to content",
    "sign up",
    "log in",
    "subscribe",
    "contact us",
    "accessibility statement",
    "all rights reserved",
];

/// Clean scraped text: decode entities, strip tags, normalize quotes, collapse whitespace.
pub fn clean_text(s: &str) -> String {
    let mut out = html_escape::decode_html_entities(s).to_string();

    static RE_TAGS: OnceCell<Regex> = OnceCell::new();
    let re_tags = RE_TAGS.get_or_init(|| Regex::new(r"(?is)</?[a-z!][^>]*>").unwrap());
    out = re_tags.replace_all(&out, " ").to_string();

    // “ ” « » → ", ‘ ’ → '
    out = out
        .replace(['\u{201C}', '\u{201D}', '\u{00AB}', '\u{00BB}'], "\"")
        .replace(['\u{2018}', '\u{2019}'], "'");

    static RE_WS: OnceCell<Regex> = OnceCell::new();
    let re_ws = RE_WS.get_or_init(|| Regex::new(r"\s+").unwrap());
    re_ws.replace_all(&out, " ").trim().to_string()
}

/// Clean and cap a free-text field; empty results become `None`.
pub fn clean_optional(s: Option<&str>, max_chars: usize) -> Option<String> {
    let cleaned = clean_text(s?);
    if cleaned.is_empty() {
        return None;
    }
    if cleaned.chars().count() > max_chars {
        return Some(cleaned.chars().take(max_chars).collect());
    }
    Some(cleaned)
}

/// Length in `[TITLE_MIN_CHARS, TITLE_MAX_CHARS]` and at least one letter.
pub fn title_has_valid_shape(title: &str) -> bool {
    let n = title.chars().count();
    (TITLE_MIN_CHARS..=TITLE_MAX_CHARS).contains(&n) && title.chars().any(char::is_alphabetic)
}

/// Case-insensitive substring blacklist.
#[derive(Debug, Clone)]
pub struct Blacklist {
    terms: Vec<String>,
}

impl Blacklist {
    pub fn new<I, S>(terms: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut terms: Vec<String> = terms
            .into_iter()
            .map(|t| t.as_ref().trim().to_lowercase())
            .filter(|t| !t.is_empty())
            .collect();
        terms.sort();
        terms.dedup();
        Self { terms }
    }

    /// First blacklisted term contained in `text`, if any.
    pub fn matched(&self, text: &str) -> Option<&str> {
        let lower = text.to_lowercase();
        self.terms
            .iter()
            .find(|t| lower.contains(t.as_str()))
            .map(String::as_str)
    }

    pub fn terms(&self) -> &[String] {
        &self.terms
    }
}

impl Default for Blacklist {
    fn default() -> Self {
        Self::new(DEFAULT_BLACKLIST)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clean_text_decodes_strips_and_collapses() {
        let s = "  <b>Jazz&nbsp;&amp; Blues</b>\n\t&ldquo;Night&rdquo;  ";
        assert_eq!(clean_text(s), r#"Jazz & Blues "Night""#);
    }

    #[test]
    fn clean_text_keeps_comparison_signs() {
        assert_eq!(clean_text("Kids < 5 free"), "Kids < 5 free");
    }

    #[test]
    fn title_shape_bounds() {
        assert!(!title_has_valid_shape("Gig"));
        assert!(title_has_valid_shape("Gig 2"));
        assert!(title_has_valid_shape(&"a".repeat(150)));
        assert!(!title_has_valid_shape(&"a".repeat(151)));
        assert!(!title_has_valid_shape("2025 - 08 - 21"));
        assert!(!title_has_valid_shape("!!!!!!"));
    }

    #[test]
    fn blacklist_is_case_insensitive_substring() {
        let bl = Blacklist::default();
        assert_eq!(bl.matched("Cookies Policy"), Some("cookies policy"));
        assert_eq!(bl.matched("Sign up for our NEWSLETTER"), Some("newsletter"));
        assert!(bl.matched("Live Show").is_none());
    }

    #[test]
    fn blacklist_ignores_blank_terms() {
        let bl = Blacklist::new(["", "  ", "Click Here"]);
        assert_eq!(bl.terms(), &["click here".to_string()]);
    }

    #[test]
    fn clean_optional_caps_and_drops_empty() {
        assert_eq!(clean_optional(Some("   "), 10), None);
        assert_eq!(clean_optional(None, 10), None);
        assert_eq!(clean_optional(Some("abcdefghijkl"), 5).as_deref(), Some("abcde"));
    }
}
