//! Date range extraction and single-digit year correction
//!
//! Unit dates arrive as an ISO-8601 `normal` attribute (`start/end` or a single
//! date) plus a free-text display string. Each side is parsed independently.
//! When both sides parse but the span is implausible, one digit of the outlier
//! year is substituted to undo typical transcription slips (1040 → 1940).

use chrono::{Datelike, NaiveDate, Utc};

/// Placeholder year the source system uses for undated records
pub const SENTINEL_YEAR: i32 = 2222;

/// Earliest year any holding can plausibly carry
pub const MIN_PLAUSIBLE_YEAR: i32 = 800;

/// Widest span between start and end that is accepted without correction
pub const MAX_PLAUSIBLE_SPAN: i32 = 150;

/// Maximum distance a corrected year may have from the other side of the range
pub const MAX_CORRECTION_DISTANCE: i32 = 100;

/// Latest plausible year: one past the current year
pub fn max_plausible_year() -> i32 {
    Utc::now().year() + 1
}

/// Parsed and validated date range of a record
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct UnitDate {
    start: Option<NaiveDate>,
    end: Option<NaiveDate>,
    start_uncorrected: Option<NaiveDate>,
    end_uncorrected: Option<NaiveDate>,
    text: Option<String>,
}

impl UnitDate {
    /// Parse a `normal` attribute value and display text
    pub fn parse(normal: Option<&str>, text: Option<&str>) -> Self {
        Self::parse_with_max_year(normal, text, max_plausible_year())
    }

    /// Parse against an explicit upper bound for plausible years
    pub fn parse_with_max_year(normal: Option<&str>, text: Option<&str>, max_year: i32) -> Self {
        let (start_raw, end_raw) = match normal.map(str::trim).filter(|n| !n.is_empty()) {
            Some(n) => match n.split_once('/') {
                Some((s, e)) => (Some(s), Some(e)),
                None => (Some(n), None),
            },
            None => (None, None),
        };

        let start = start_raw.and_then(|s| parse_side(s, max_year));
        let end = end_raw.and_then(|e| parse_side(e, max_year));

        let mut date = Self {
            start,
            end,
            start_uncorrected: start,
            end_uncorrected: end,
            text: text.map(|t| t.trim().to_string()),
        };
        date.correct_implausible_span(max_year);
        date
    }

    /// Corrected start date
    pub fn start_date(&self) -> Option<NaiveDate> {
        self.start
    }

    /// Corrected end date, falling back to the start for single dates
    pub fn end_date(&self) -> Option<NaiveDate> {
        self.end.or(self.start)
    }

    /// Start date as parsed, before any correction
    pub fn start_uncorrected(&self) -> Option<NaiveDate> {
        self.start_uncorrected
    }

    /// End date as parsed, before any correction (falls back like `end_date`)
    pub fn end_uncorrected(&self) -> Option<NaiveDate> {
        self.end_uncorrected.or(self.start_uncorrected)
    }

    /// Free-text display string
    pub fn text(&self) -> Option<&str> {
        self.text.as_deref()
    }

    /// True when an explicit end date was present and valid
    pub fn is_range(&self) -> bool {
        self.end.is_some()
    }

    /// True when either side was changed by the digit correction
    pub fn was_corrected(&self) -> bool {
        self.start != self.start_uncorrected || self.end != self.end_uncorrected
    }

    fn correct_implausible_span(&mut self, max_year: i32) {
        let (Some(start), Some(end)) = (self.start, self.end) else {
            return;
        };

        let span = end.year() - start.year();
        if (0..=MAX_PLAUSIBLE_SPAN).contains(&span) {
            return;
        }

        if span > MAX_PLAUSIBLE_SPAN {
            // start is suspiciously old relative to end
            if let Some(fixed) = fix_single_digit(start, end, max_year) {
                self.start = Some(fixed);
            }
        } else if let Some(fixed) = fix_single_digit(end, start, max_year) {
            // inverted range
            self.end = Some(fixed);
        }
    }
}

fn parse_side(raw: &str, max_year: i32) -> Option<NaiveDate> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }

    let date = NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .ok()
        .or_else(|| parse_compact(raw))
        .or_else(|| parse_year_month(raw))?;

    if date.year() == SENTINEL_YEAR || date.year() > max_year {
        return None;
    }
    Some(date)
}

/// Basic format without separators (`19590315`)
fn parse_compact(raw: &str) -> Option<NaiveDate> {
    if raw.len() != 8 || !raw.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    NaiveDate::from_ymd_opt(
        raw[..4].parse().ok()?,
        raw[4..6].parse().ok()?,
        raw[6..].parse().ok()?,
    )
}

/// Year-month form (`1959-05`) resolves to the first of the month
fn parse_year_month(raw: &str) -> Option<NaiveDate> {
    let (y, m) = raw.split_once('-')?;
    if y.len() != 4 || m.len() != 2 {
        return None;
    }
    NaiveDate::from_ymd_opt(y.parse().ok()?, m.parse().ok()?, 1)
}

/// Try every single-digit substitution of `bad`'s four-digit year and keep the
/// candidate closest to `good` that stays inside the plausible window
fn fix_single_digit(bad: NaiveDate, good: NaiveDate, max_year: i32) -> Option<NaiveDate> {
    let digits: Vec<u32> = format!("{:04}", bad.year())
        .chars()
        .filter_map(|c| c.to_digit(10))
        .collect();
    if digits.len() != 4 {
        return None;
    }

    let good_year = good.year();
    let mut best: Option<(i32, NaiveDate)> = None;

    for position in 0..4 {
        for replacement in 0..10u32 {
            if digits[position] == replacement {
                continue;
            }

            let candidate_year = digits
                .iter()
                .enumerate()
                .map(|(i, &d)| if i == position { replacement } else { d })
                .fold(0i32, |acc, d| acc * 10 + d as i32);

            if !(MIN_PLAUSIBLE_YEAR..=max_year).contains(&candidate_year) {
                continue;
            }

            let distance = (candidate_year - good_year).abs();
            if distance > MAX_CORRECTION_DISTANCE {
                continue;
            }

            // Feb 29 has no counterpart in non-leap candidate years
            let Some(candidate) = NaiveDate::from_ymd_opt(candidate_year, bad.month(), bad.day())
            else {
                continue;
            };

            if best.map_or(true, |(d, _)| distance < d) {
                best = Some((distance, candidate));
            }
        }
    }

    best.map(|(_, date)| date)
}
