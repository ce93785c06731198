// src/pipeline/mod.rs
//! Normalization & validation of raw adapter output.
//!
//! `normalize_candidate` is pure: same candidate, source, clock and config in,
//! same verdict out. Checks run in a fixed order and stop at the first failure:
//! presence → title shape → blacklist → date resolution → window → construction.
//! `process_batch` adds the per-source, per-run dedup on top.

pub mod dates;
pub mod text;

use std::collections::{BTreeMap, HashSet};
use std::fmt;

use chrono::{DateTime, Duration, NaiveDate, Utc};
use chrono_tz::Tz;
use metrics::counter;

use crate::metrics as m;
use crate::model::{NormalizedEvent, RawCandidate, Source};
use text::{clean_optional, clean_text, title_has_valid_shape, Blacklist, DESCRIPTION_MAX_CHARS};

pub const DEFAULT_PRICE_TEXT: &str = "Varies";
pub const DEFAULT_CATEGORY: &str = "General";

const FIELD_MAX_CHARS: usize = 300;

/// Why a candidate was not accepted. Expected outcome, not an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Rejection {
    MissingField,
    BadTitle,
    GenericTitle,
    BadDate,
    OutOfWindow,
}

impl Rejection {
    pub fn code(&self) -> &'static str {
        match self {
            Rejection::MissingField => "missing-field",
            Rejection::BadTitle => "bad-title",
            Rejection::GenericTitle => "generic-title",
            Rejection::BadDate => "bad-date",
            Rejection::OutOfWindow => "out-of-window",
        }
    }
}

impl fmt::Display for Rejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

/// Logging/metrics view of one pipeline decision. Never persisted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationVerdict {
    pub accepted: bool,
    pub reason: Option<Rejection>,
}

impl<T> From<&Result<T, Rejection>> for ValidationVerdict {
    fn from(r: &Result<T, Rejection>) -> Self {
        match r {
            Ok(_) => Self {
                accepted: true,
                reason: None,
            },
            Err(reason) => Self {
                accepted: false,
                reason: Some(*reason),
            },
        }
    }
}

#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Tolerance for events that started slightly before `now`.
    pub grace_period: Duration,
    pub forward_window: Duration,
    pub blacklist: Blacklist,
    pub timezone: Tz,
    pub default_price_text: String,
    pub default_category: String,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            grace_period: Duration::days(1),
            forward_window: Duration::days(14),
            blacklist: Blacklist::default(),
            timezone: dates::REFERENCE_TZ,
            default_price_text: DEFAULT_PRICE_TEXT.to_string(),
            default_category: DEFAULT_CATEGORY.to_string(),
        }
    }
}

impl PipelineConfig {
    /// `[now - grace_period, now + forward_window]`, clamped to the representable range.
    pub fn window(&self, now: DateTime<Utc>) -> (DateTime<Utc>, DateTime<Utc>) {
        let lo = now
            .checked_sub_signed(self.grace_period)
            .unwrap_or(DateTime::<Utc>::MIN_UTC);
        let hi = now
            .checked_add_signed(self.forward_window)
            .unwrap_or(DateTime::<Utc>::MAX_UTC);
        (lo, hi)
    }

    pub fn in_window(&self, start: DateTime<Utc>, now: DateTime<Utc>) -> bool {
        let (lo, hi) = self.window(now);
        lo <= start && start <= hi
    }
}

/// Map one raw candidate into a normalized event or a rejection.
pub fn normalize_candidate(
    raw: &RawCandidate,
    source: &Source,
    now: DateTime<Utc>,
    cfg: &PipelineConfig,
) -> Result<NormalizedEvent, Rejection> {
    // 1) presence
    let title = raw.title.as_deref().map(clean_text).unwrap_or_default();
    let date = match &raw.date {
        Some(d) if !d.is_blank() => d,
        _ => return Err(Rejection::MissingField),
    };
    if title.is_empty() {
        return Err(Rejection::MissingField);
    }

    // 2) title shape
    if !title_has_valid_shape(&title) {
        return Err(Rejection::BadTitle);
    }

    // 3) blacklist
    if cfg.blacklist.matched(&title).is_some() {
        return Err(Rejection::GenericTitle);
    }

    // 4) date resolution
    let start_time = dates::resolve(date, now, cfg.timezone).ok_or(Rejection::BadDate)?;

    // 5) window
    if !cfg.in_window(start_time, now) {
        return Err(Rejection::OutOfWindow);
    }

    // 6) construction
    let end_time = raw
        .end
        .as_ref()
        .and_then(|e| dates::resolve(e, now, cfg.timezone))
        .filter(|end| *end >= start_time);

    Ok(NormalizedEvent {
        title,
        start_time,
        start_day: dates::local_day(start_time, cfg.timezone),
        end_time,
        location: clean_optional(raw.location.as_deref(), FIELD_MAX_CHARS),
        price_text: clean_optional(raw.price.as_deref(), FIELD_MAX_CHARS)
            .unwrap_or_else(|| cfg.default_price_text.clone()),
        description: clean_optional(raw.description.as_deref(), DESCRIPTION_MAX_CHARS),
        source_name: source.name.clone(),
        source_url: trimmed_url(raw.url.as_deref()),
        category: source
            .category
            .as_deref()
            .map(str::trim)
            .filter(|c| !c.is_empty())
            .unwrap_or(cfg.default_category.as_str())
            .to_string(),
        image_url: trimmed_url(raw.image_url.as_deref()),
    })
}

fn trimmed_url(u: Option<&str>) -> Option<String> {
    u.map(str::trim)
        .filter(|u| !u.is_empty())
        .map(str::to_string)
}

/// Per-source, per-run duplicate filter keyed by `(title, local day)`.
#[derive(Debug, Default)]
pub struct Deduper {
    seen: HashSet<(String, NaiveDate)>,
}

impl Deduper {
    pub fn new() -> Self {
        Self::default()
    }

    /// `true` the first time a key is offered, `false` for every repeat.
    pub fn first_seen(&mut self, ev: &NormalizedEvent) -> bool {
        self.seen.insert((ev.title.to_lowercase(), ev.start_day))
    }
}

/// Result of pushing one source's candidates through the pipeline.
#[derive(Debug, Default)]
pub struct BatchOutcome {
    pub candidates: usize,
    pub accepted: Vec<NormalizedEvent>,
    pub rejected: BTreeMap<Rejection, usize>,
    pub dedup_hits: usize,
}

impl BatchOutcome {
    pub fn rejected_total(&self) -> usize {
        self.rejected.values().sum()
    }

    pub fn rejected_for(&self, reason: Rejection) -> usize {
        self.rejected.get(&reason).copied().unwrap_or(0)
    }
}

/// Normalize, validate and dedup all candidates of one source from one run.
/// Later duplicates are dropped silently and counted as dedup hits.
pub fn process_batch(
    source: &Source,
    candidates: Vec<RawCandidate>,
    now: DateTime<Utc>,
    cfg: &PipelineConfig,
) -> BatchOutcome {
    m::ensure_described();

    let mut out = BatchOutcome {
        candidates: candidates.len(),
        ..Default::default()
    };
    let mut dedup = Deduper::new();

    for raw in &candidates {
        let result = normalize_candidate(raw, source, now, cfg);
        let verdict = ValidationVerdict::from(&result);
        match result {
            Ok(ev) => {
                if dedup.first_seen(&ev) {
                    out.accepted.push(ev);
                } else {
                    out.dedup_hits += 1;
                }
            }
            Err(reason) => {
                tracing::debug!(
                    source = %source.name,
                    title = raw.title.as_deref().unwrap_or_default(),
                    accepted = verdict.accepted,
                    reason = %reason,
                    "candidate rejected"
                );
                counter!(m::REJECTED_TOTAL, "reason" => reason.code()).increment(1);
                *out.rejected.entry(reason).or_default() += 1;
            }
        }
    }

    counter!(m::CANDIDATES_TOTAL).increment(out.candidates as u64);
    counter!(m::ACCEPTED_TOTAL).increment(out.accepted.len() as u64);
    counter!(m::DEDUP_TOTAL).increment(out.dedup_hits as u64);

    out
}
