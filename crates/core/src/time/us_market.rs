use anyhow::Context;
use chrono::{DateTime, Datelike, Duration, FixedOffset, NaiveDate, NaiveTime, Utc, Weekday};

const EST_OFFSET_SECS: i32 = -5 * 3600;
const EDT_OFFSET_SECS: i32 = -4 * 3600;

// US DST switches at 02:00 local: 07:00 UTC in March (EST), 06:00 UTC in November (EDT).
const DST_START_HOUR_UTC: u32 = 7;
const DST_END_HOUR_UTC: u32 = 6;

const SECS_PER_DAY: i64 = 86_400;

/// Reference instants shared by every ticker of one sweep.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReferenceClock {
    pub now_market: DateTime<FixedOffset>,
    /// Earliest instant an item may carry and still be retained.
    pub cutoff: DateTime<Utc>,
    /// UTC midnight of the current day; ages are measured against it.
    pub today: DateTime<Utc>,
}

impl ReferenceClock {
    pub fn resolve(now_utc: DateTime<Utc>, retention_days: i64) -> anyhow::Result<Self> {
        anyhow::ensure!(
            retention_days >= 1,
            "retention window must be >= 1 day (got {retention_days})"
        );

        let now_market = now_utc.with_timezone(&eastern_offset(now_utc)?);
        let cutoff = (now_market - Duration::days(retention_days)).with_timezone(&Utc);

        Ok(Self {
            now_market,
            cutoff,
            today: utc_midnight(now_utc),
        })
    }
}

pub fn eastern_offset(now_utc: DateTime<Utc>) -> anyhow::Result<FixedOffset> {
    let secs = if is_eastern_dst(now_utc) {
        EDT_OFFSET_SECS
    } else {
        EST_OFFSET_SECS
    };
    FixedOffset::east_opt(secs).context("invalid US/Eastern offset")
}

pub fn utc_midnight(now_utc: DateTime<Utc>) -> DateTime<Utc> {
    now_utc.date_naive().and_time(NaiveTime::MIN).and_utc()
}

/// Whole days between `today` and the item's calendar day.
///
/// The item is truncated to midnight in its *own* offset before the difference is taken, and the
/// difference is floored, so future-dated items yield negative ages.
pub fn age_in_days(published: DateTime<FixedOffset>, today: DateTime<Utc>) -> i64 {
    let local_midnight = published.date_naive().and_time(NaiveTime::MIN);
    let offset_secs = i64::from(published.offset().local_minus_utc());
    let midnight_utc = (local_midnight - Duration::seconds(offset_secs)).and_utc();

    (today - midnight_utc).num_seconds().div_euclid(SECS_PER_DAY)
}

fn is_eastern_dst(now_utc: DateTime<Utc>) -> bool {
    let year = now_utc.year();
    let (Some(start), Some(end)) = (nth_sunday(year, 3, 2), nth_sunday(year, 11, 1)) else {
        return false;
    };

    let (Some(start), Some(end)) = (
        start.and_hms_opt(DST_START_HOUR_UTC, 0, 0),
        end.and_hms_opt(DST_END_HOUR_UTC, 0, 0),
    ) else {
        return false;
    };

    let now = now_utc.naive_utc();
    start <= now && now < end
}

fn nth_sunday(year: i32, month: u32, n: u32) -> Option<NaiveDate> {
    let first = NaiveDate::from_ymd_opt(year, month, 1)?;
    let to_sunday = (7 - first.weekday().num_days_from_sunday()) % 7;
    let d = first + Duration::days(i64::from(to_sunday + 7 * (n - 1)));
    debug_assert_eq!(d.weekday(), Weekday::Sun);
    Some(d)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(s: &str) -> DateTime<FixedOffset> {
        DateTime::parse_from_rfc3339(s).unwrap()
    }

    #[test]
    fn winter_uses_est() {
        let now = Utc.with_ymd_and_hms(2026, 1, 15, 12, 0, 0).unwrap();
        assert_eq!(eastern_offset(now).unwrap().local_minus_utc(), -5 * 3600);
    }

    #[test]
    fn summer_uses_edt() {
        let now = Utc.with_ymd_and_hms(2026, 7, 1, 12, 0, 0).unwrap();
        assert_eq!(eastern_offset(now).unwrap().local_minus_utc(), -4 * 3600);
    }

    #[test]
    fn dst_boundaries_follow_us_rule() {
        // 2026: DST from Sunday 2026-03-08 07:00Z to Sunday 2026-11-01 06:00Z.
        let before = Utc.with_ymd_and_hms(2026, 3, 8, 6, 59, 59).unwrap();
        let start = Utc.with_ymd_and_hms(2026, 3, 8, 7, 0, 0).unwrap();
        let last = Utc.with_ymd_and_hms(2026, 11, 1, 5, 59, 59).unwrap();
        let end = Utc.with_ymd_and_hms(2026, 11, 1, 6, 0, 0).unwrap();
        assert!(!is_eastern_dst(before));
        assert!(is_eastern_dst(start));
        assert!(is_eastern_dst(last));
        assert!(!is_eastern_dst(end));
    }

    #[test]
    fn cutoff_is_retention_window_before_now() {
        let now = Utc.with_ymd_and_hms(2026, 10, 17, 14, 30, 0).unwrap();
        let clock = ReferenceClock::resolve(now, 7).unwrap();
        assert_eq!(clock.cutoff, now - Duration::days(7));
        assert_eq!(clock.today, Utc.with_ymd_and_hms(2026, 10, 17, 0, 0, 0).unwrap());
        assert_eq!(clock.now_market.offset().local_minus_utc(), -4 * 3600);
        assert!(ReferenceClock::resolve(now, 0).is_err());
    }

    #[test]
    fn ages_are_whole_days_from_utc_midnight() {
        let today = Utc.with_ymd_and_hms(2026, 10, 17, 0, 0, 0).unwrap();
        assert_eq!(age_in_days(at("2026-10-17T23:59:59Z"), today), 0);
        assert_eq!(age_in_days(at("2026-10-16T00:00:00Z"), today), 1);
        assert_eq!(age_in_days(at("2026-10-10T08:00:00Z"), today), 7);
        assert_eq!(age_in_days(at("2026-10-18T01:00:00Z"), today), -1);
    }

    #[test]
    fn negative_offsets_truncate_in_local_day() {
        // Local midnight 2026-10-16T00:00-04:00 is 04:00Z, 20h before today: floors to 0.
        let today = Utc.with_ymd_and_hms(2026, 10, 17, 0, 0, 0).unwrap();
        assert_eq!(age_in_days(at("2026-10-16T23:00:00-04:00"), today), 0);
        // Positive offset: local midnight 2026-10-16T00:00+09:00 is 2026-10-15T15:00Z.
        assert_eq!(age_in_days(at("2026-10-16T10:00:00+09:00"), today), 1);
    }
}
