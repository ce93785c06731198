// src/pipeline/dates.rs
//! Date resolution for scraped listings.
//!
//! Adapters hand over dates in whatever shape the source page uses: ISO stamps,
//! RSS `pubDate`s, `08/21/2025`, `Thursday, August 21st at 7:30 PM`, `tomorrow 8pm`.
//! Everything without an explicit offset is read as wall-clock time in the
//! reference timezone and converted to UTC. Date-only values resolve to local
//! midnight.

use chrono::{
    DateTime, Datelike, Duration, LocalResult, NaiveDate, NaiveDateTime, NaiveTime, TimeZone,
    Utc, Weekday,
};
use chrono_tz::Tz;
use once_cell::sync::OnceCell;
use regex::Regex;

use crate::model::RawDate;

pub const REFERENCE_TZ: Tz = chrono_tz::America::Los_Angeles;

const MONTHS: [&str; 12] = [
    "january",
    "february",
    "march",
    "april",
    "may",
    "june",
    "july",
    "august",
    "september",
    "october",
    "november",
    "december",
];

const WEEKDAYS: [(&str, Weekday); 7] = [
    ("monday", Weekday::Mon),
    ("tuesday", Weekday::Tue),
    ("wednesday", Weekday::Wed),
    ("thursday", Weekday::Thu),
    ("friday", Weekday::Fri),
    ("saturday", Weekday::Sat),
    ("sunday", Weekday::Sun),
];

/// Filler words that carry no date information.
const FILLER: [&str; 9] = ["at", "from", "on", "@", "-", "–", "|", "starting", "begins"];

const DAYPARTS: [&str; 5] = ["night", "evening", "morning", "afternoon", "tonight"];

const NAIVE_FORMATS: [&str; 5] = [
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%dT%H:%M",
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%d %H:%M",
];

/// Resolve a raw date to an absolute instant. `now` anchors relative tokens
/// and year inference.
pub fn resolve(raw: &RawDate, now: DateTime<Utc>, tz: Tz) -> Option<DateTime<Utc>> {
    match raw {
        RawDate::Value(dt) => Some(*dt),
        RawDate::Text(s) => parse_date_text(s, now, tz),
    }
}

pub fn parse_date_text(text: &str, now: DateTime<Utc>, tz: Tz) -> Option<DateTime<Utc>> {
    let t = text.trim();
    if t.is_empty() {
        return None;
    }

    // Offset-carrying formats first: they need no zone assumption.
    if let Ok(dt) = DateTime::parse_from_rfc3339(t) {
        return Some(dt.with_timezone(&Utc));
    }
    if let Ok(dt) = DateTime::parse_from_rfc2822(t) {
        return Some(dt.with_timezone(&Utc));
    }
    for fmt in NAIVE_FORMATS {
        if let Ok(ndt) = NaiveDateTime::parse_from_str(t, fmt) {
            return localize(ndt, tz);
        }
    }

    let today = now.with_timezone(&tz).date_naive();
    let mut s = normalize(t);
    let time = extract_time(&mut s);
    let date = parse_day(&s, today)?;
    localize(date.and_time(time.unwrap_or(NaiveTime::MIN)), tz)
}

/// Local wall-clock time → UTC. Ambiguous times (fall-back) take the earlier
/// instant; non-existent times (spring-forward gap) move one hour later.
pub fn localize(ndt: NaiveDateTime, tz: Tz) -> Option<DateTime<Utc>> {
    let local = match tz.from_local_datetime(&ndt) {
        LocalResult::Single(dt) => Some(dt),
        LocalResult::Ambiguous(early, _) => Some(early),
        LocalResult::None => tz
            .from_local_datetime(&(ndt + Duration::hours(1)))
            .earliest(),
    };
    local.map(|dt| dt.with_timezone(&Utc))
}

/// Calendar day of an instant in the reference zone.
pub fn local_day(dt: DateTime<Utc>, tz: Tz) -> NaiveDate {
    dt.with_timezone(&tz).date_naive()
}

fn normalize(t: &str) -> String {
    static RE_ORDINAL: OnceCell<Regex> = OnceCell::new();
    static RE_ABBR_DOT: OnceCell<Regex> = OnceCell::new();
    static RE_WS: OnceCell<Regex> = OnceCell::new();

    let re_ordinal = RE_ORDINAL.get_or_init(|| Regex::new(r"(\d)(?:st|nd|rd|th)\b").unwrap());
    let re_abbr_dot = RE_ABBR_DOT.get_or_init(|| Regex::new(r"([a-z])\.").unwrap());
    let re_ws = RE_WS.get_or_init(|| Regex::new(r"\s+").unwrap());

    let lower = t.to_lowercase();
    let s = re_ordinal.replace_all(&lower, "$1");
    let s = re_abbr_dot.replace_all(&s, "$1");
    re_ws.replace_all(&s, " ").trim().to_string()
}

/// Pull the first time-of-day out of `s` (removing every time mention) and
/// return it. Ranges such as `7-10pm` resolve to their start.
fn extract_time(s: &mut String) -> Option<NaiveTime> {
    static RE_RANGE: OnceCell<Regex> = OnceCell::new();
    static RE_12H: OnceCell<Regex> = OnceCell::new();
    static RE_24H: OnceCell<Regex> = OnceCell::new();
    static RE_WORD: OnceCell<Regex> = OnceCell::new();

    let re_range = RE_RANGE.get_or_init(|| {
        Regex::new(
            r"\b(\d{1,2})(?::(\d{2}))?\s*(am|pm)?\s*(?:-|–|to)\s*(\d{1,2})(?::\d{2})?\s*(am|pm)\b",
        )
        .unwrap()
    });
    let re_12h = RE_12H.get_or_init(|| {
        Regex::new(r"(?:(?:\bat|@)\s*)?\b(\d{1,2})(?::(\d{2}))?\s*(am|pm)\b").unwrap()
    });
    let re_24h = RE_24H
        .get_or_init(|| Regex::new(r"\b([01]?\d|2[0-3]):([0-5]\d)(?::[0-5]\d)?\b").unwrap());
    let re_word = RE_WORD.get_or_init(|| Regex::new(r"\b(noon|midnight)\b").unwrap());

    let mut found: Option<NaiveTime> = None;

    if let Some(c) = re_range.captures(s.as_str()) {
        let start = c.get(1)?.as_str();
        let meridiem = match (c.get(3), c.get(5)) {
            (Some(m), _) => Some(m.as_str()),
            (None, Some(end)) => {
                Some(range_start_meridiem(start, c.get(4)?.as_str(), end.as_str()))
            }
            (None, None) => None,
        };
        found = twelve_hour(start, c.get(2).map(|m| m.as_str()), meridiem);
    }
    if found.is_none() {
        if let Some(c) = re_12h.captures(s.as_str()) {
            found = twelve_hour(
                c.get(1)?.as_str(),
                c.get(2).map(|m| m.as_str()),
                c.get(3).map(|m| m.as_str()),
            );
        }
    }
    if found.is_none() {
        if let Some(c) = re_24h.captures(s.as_str()) {
            let h: u32 = c.get(1)?.as_str().parse().ok()?;
            let m: u32 = c.get(2)?.as_str().parse().ok()?;
            found = NaiveTime::from_hms_opt(h, m, 0);
        }
    }
    if found.is_none() {
        if let Some(c) = re_word.captures(s.as_str()) {
            found = match c.get(1)?.as_str() {
                "noon" => NaiveTime::from_hms_opt(12, 0, 0),
                _ => Some(NaiveTime::MIN),
            };
        }
    }

    let stripped = {
        let out = re_range.replace_all(s.as_str(), " ");
        let out = re_12h.replace_all(&out, " ");
        let out = re_24h.replace_all(&out, " ");
        re_word.replace_all(&out, " ").into_owned()
    };
    *s = stripped;

    found
}

/// Meridiem for a range start written without one. It shares the end's
/// meridiem unless its clock hour is later, which means the range crosses
/// noon or midnight (`11-1pm` starts at 11am).
fn range_start_meridiem(start: &str, end: &str, end_meridiem: &str) -> &'static str {
    let clock = |h: &str| h.parse::<u32>().map(|h| h % 12).unwrap_or(0);
    let crosses = clock(start) > clock(end);
    match (end_meridiem, crosses) {
        ("pm", false) | ("am", true) => "pm",
        _ => "am",
    }
}

fn twelve_hour(hour: &str, minute: Option<&str>, meridiem: Option<&str>) -> Option<NaiveTime> {
    let h: u32 = hour.parse().ok()?;
    let m: u32 = minute.map(str::parse::<u32>).transpose().ok()?.unwrap_or(0);
    let h24 = match meridiem {
        Some("pm") if (1..12).contains(&h) => h + 12,
        Some("pm") if h == 12 => 12,
        Some("am") if h == 12 => 0,
        Some("am") if (1..12).contains(&h) => h,
        None if h < 24 => h,
        _ => return None,
    };
    NaiveTime::from_hms_opt(h24, m, 0)
}

fn parse_day(s: &str, today: NaiveDate) -> Option<NaiveDate> {
    let cleaned = s.replace(',', " ");
    let mut tokens: Vec<&str> = cleaned
        .split_whitespace()
        .filter(|t| !FILLER.contains(t))
        .collect();
    if tokens.is_empty() {
        return None;
    }

    // Relative tokens, optionally followed by a day part ("tomorrow night").
    if tokens[1..].iter().all(|t| DAYPARTS.contains(t)) {
        match tokens[0] {
            "today" | "tonight" => return Some(today),
            "tomorrow" => return today.succ_opt(),
            _ => {}
        }
    }

    let leading_weekday = weekday(tokens[0]);
    if let Some(wd) = leading_weekday {
        tokens.remove(0);
        if tokens.iter().all(|t| DAYPARTS.contains(t)) {
            return Some(next_weekday(today, wd));
        }
    }

    match tokens.as_slice() {
        [iso] if iso.contains('-') => NaiveDate::parse_from_str(iso, "%Y-%m-%d").ok(),
        [slashed] if slashed.contains('/') => parse_slashed(slashed, today),
        [a, b] => month_day(a, b, None, today).or_else(|| month_day(b, a, None, today)),
        [a, b, y] => {
            let year = parse_year(y)?;
            month_day(a, b, Some(year), today).or_else(|| month_day(b, a, Some(year), today))
        }
        _ => None,
    }
}

/// `MM/DD/YYYY`, `MM/DD/YY`, or `MM/DD`.
fn parse_slashed(s: &str, today: NaiveDate) -> Option<NaiveDate> {
    let parts: Vec<&str> = s.split('/').collect();
    let (m, d) = (
        parts.first()?.parse::<u32>().ok()?,
        parts.get(1)?.parse::<u32>().ok()?,
    );
    match parts.get(2) {
        Some(y) if parts.len() == 3 => NaiveDate::from_ymd_opt(parse_year(y)?, m, d),
        None => nearest_occurrence(m, d, today),
        _ => None,
    }
}

fn parse_year(y: &str) -> Option<i32> {
    let n: i32 = y.parse().ok()?;
    match y.len() {
        2 => Some(2000 + n),
        4 => Some(n),
        _ => None,
    }
}

fn month_day(month_tok: &str, day_tok: &str, year: Option<i32>, today: NaiveDate) -> Option<NaiveDate> {
    let m = month(month_tok)?;
    let d: u32 = day_tok.parse().ok()?;
    match year {
        Some(y) => NaiveDate::from_ymd_opt(y, m, d),
        None => nearest_occurrence(m, d, today),
    }
}

/// Year-less dates resolve to the occurrence closest to `today`.
fn nearest_occurrence(m: u32, d: u32, today: NaiveDate) -> Option<NaiveDate> {
    (today.year() - 1..=today.year() + 1)
        .filter_map(|y| NaiveDate::from_ymd_opt(y, m, d))
        .min_by_key(|date| (*date - today).num_days().abs())
}

fn month(tok: &str) -> Option<u32> {
    if tok.len() < 3 {
        return None;
    }
    MONTHS
        .iter()
        .position(|full| full.starts_with(tok))
        .map(|i| i as u32 + 1)
}

fn weekday(tok: &str) -> Option<Weekday> {
    if tok.len() < 3 {
        return None;
    }
    WEEKDAYS
        .iter()
        .find(|(full, _)| full.starts_with(tok))
        .map(|(_, wd)| *wd)
}

/// Next date falling on `wd`, counting `today` itself.
fn next_weekday(today: NaiveDate, wd: Weekday) -> NaiveDate {
    let ahead = (7 + wd.num_days_from_monday() as i64
        - today.weekday().num_days_from_monday() as i64)
        % 7;
    today + Duration::days(ahead)
}
