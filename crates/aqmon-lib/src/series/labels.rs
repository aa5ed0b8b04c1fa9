//! Human-readable point labels

use super::window::{RangeSelector, TimeWindow};
use chrono::{DateTime, Duration, Utc};

/// Points newer than this get relative phrasing
const RELATIVE_HORIZON_DAYS: i64 = 7;

/// Calendar granularity for absolute labels
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LabelGranularity {
    Hour,
    Day,
    FullDate,
}

impl LabelGranularity {
    /// Granularity keyed to the selected range
    pub fn for_range(selector: &RangeSelector, window: &TimeWindow) -> Self {
        match selector {
            RangeSelector::Last24h | RangeSelector::Last7d => LabelGranularity::Hour,
            RangeSelector::Last30d => LabelGranularity::Day,
            RangeSelector::Last90d | RangeSelector::All => LabelGranularity::FullDate,
            RangeSelector::Custom { .. } => {
                if window.duration() <= Duration::days(30) {
                    LabelGranularity::Day
                } else {
                    LabelGranularity::FullDate
                }
            }
        }
    }

    fn format(&self) -> &'static str {
        match self {
            LabelGranularity::Hour => "%b %-d, %H:00",
            LabelGranularity::Day => "%b %-d",
            LabelGranularity::FullDate => "%b %-d, %Y",
        }
    }
}

/// Label a point relative to `now`, falling back to calendar phrasing
pub fn display_label(ts: DateTime<Utc>, now: DateTime<Utc>, granularity: LabelGranularity) -> String {
    relative_label(ts, now).unwrap_or_else(|| ts.format(granularity.format()).to_string())
}

/// "3 hours ago" style phrasing for points in the last 7 days
pub fn relative_label(ts: DateTime<Utc>, now: DateTime<Utc>) -> Option<String> {
    let age = now - ts;
    if age < Duration::zero() || age >= Duration::days(RELATIVE_HORIZON_DAYS) {
        return None;
    }

    let label = if age < Duration::minutes(1) {
        "just now".to_string()
    } else if age < Duration::hours(1) {
        plural(age.num_minutes(), "minute")
    } else if age < Duration::days(1) {
        plural(age.num_hours(), "hour")
    } else {
        plural(age.num_days(), "day")
    };

    Some(label)
}

fn plural(n: i64, unit: &str) -> String {
    if n == 1 {
        format!("1 {} ago", unit)
    } else {
        format!("{} {}s ago", n, unit)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::series::window::resolve;
    use chrono::TimeZone;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 6, 15, 12, 30, 0).unwrap()
    }

    #[test]
    fn test_relative_phrasing() {
        let now = now();
        assert_eq!(relative_label(now, now).as_deref(), Some("just now"));
        assert_eq!(
            relative_label(now - Duration::minutes(1), now).as_deref(),
            Some("1 minute ago")
        );
        assert_eq!(
            relative_label(now - Duration::minutes(45), now).as_deref(),
            Some("45 minutes ago")
        );
        assert_eq!(
            relative_label(now - Duration::hours(3), now).as_deref(),
            Some("3 hours ago")
        );
        assert_eq!(
            relative_label(now - Duration::days(2), now).as_deref(),
            Some("2 days ago")
        );
        assert_eq!(relative_label(now - Duration::days(7), now), None);
        assert_eq!(relative_label(now + Duration::hours(1), now), None);
    }

    #[test]
    fn test_absolute_granularity() {
        let ts = Utc.with_ymd_and_hms(2024, 3, 4, 9, 41, 0).unwrap();
        assert_eq!(display_label(ts, now(), LabelGranularity::Hour), "Mar 4, 09:00");
        assert_eq!(display_label(ts, now(), LabelGranularity::Day), "Mar 4");
        assert_eq!(display_label(ts, now(), LabelGranularity::FullDate), "Mar 4, 2024");
    }

    #[test]
    fn test_granularity_for_range() {
        let now = now();
        let cases = [
            (RangeSelector::Last24h, LabelGranularity::Hour),
            (RangeSelector::Last7d, LabelGranularity::Hour),
            (RangeSelector::Last30d, LabelGranularity::Day),
            (RangeSelector::Last90d, LabelGranularity::FullDate),
            (RangeSelector::All, LabelGranularity::FullDate),
        ];
        for (selector, expected) in cases {
            let window = resolve(selector, now);
            assert_eq!(LabelGranularity::for_range(&selector, &window), expected);
        }

        let custom = RangeSelector::Custom {
            start: Some(now - Duration::days(200)),
            end: Some(now),
        };
        let window = resolve(custom, now);
        assert_eq!(
            LabelGranularity::for_range(&custom, &window),
            LabelGranularity::FullDate
        );
    }
}
