use chrono::{NaiveDate, NaiveDateTime};

/// Maximum squared L2 distance for a candidate to count as relevant.
/// Embeddings are L2-normalized, so squared distances live in `[0, 4]`;
/// anything past this bound is noise, not a low-confidence match.
pub const DEFAULT_RELEVANCE_CUTOFF: f32 = 1.5;

/// A query-expansion rewrite shorter than this (or no longer than the
/// original query) adds nothing and is discarded.
pub(crate) const MIN_EXPANDED_CHARS: usize = 12;

/// Knobs for one search call.
#[derive(Debug, Clone)]
pub struct SearchOptions {
    /// Maximum number of candidates pulled from the index.
    pub k: usize,
    /// Inclusive lower bound on the EXIF capture date.
    pub date_from: Option<NaiveDate>,
    /// Inclusive upper bound on the EXIF capture date.
    pub date_to: Option<NaiveDate>,
    /// Relevance cutoff on squared L2 distance.
    pub max_distance: f32,
}

impl Default for SearchOptions {
    fn default() -> Self {
        Self {
            k: 12,
            date_from: None,
            date_to: None,
            max_distance: DEFAULT_RELEVANCE_CUTOFF,
        }
    }
}

/// Inclusive date-range check on the EXIF capture date. A record with no
/// capture date passes every filter: absence of data is not "out of
/// range".
pub(crate) fn date_in_range(
    exif_date: Option<NaiveDateTime>,
    from: Option<NaiveDate>,
    to: Option<NaiveDate>,
) -> bool {
    let Some(date) = exif_date.map(|d| d.date()) else {
        return true;
    };
    from.map_or(true, |f| date >= f) && to.map_or(true, |t| date <= t)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn datetime(y: i32, m: u32, d: u32) -> Option<NaiveDateTime> {
        date(y, m, d).and_hms_opt(10, 0, 0)
    }

    #[test]
    fn missing_exif_date_is_never_excluded() {
        assert!(date_in_range(None, Some(date(2020, 1, 1)), Some(date(2020, 12, 31))));
        assert!(date_in_range(None, Some(date(2020, 1, 1)), None));
        assert!(date_in_range(None, None, Some(date(2020, 12, 31))));
    }

    #[test]
    fn bounds_are_inclusive() {
        let d = datetime(2021, 6, 15);
        assert!(date_in_range(d, Some(date(2021, 6, 15)), Some(date(2021, 6, 15))));
        assert!(!date_in_range(d, Some(date(2021, 6, 16)), None));
        assert!(!date_in_range(d, None, Some(date(2021, 6, 14))));
    }

    #[test]
    fn unbounded_filter_keeps_everything() {
        assert!(date_in_range(datetime(1999, 1, 1), None, None));
    }
}
