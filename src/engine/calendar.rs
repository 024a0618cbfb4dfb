//! Wall-clock ↔ instant conversion in a professional's timezone.
//!
//! All DST handling lives here. Nothing else in the engine does offset arithmetic.

use chrono::{DateTime, Datelike, Duration, LocalResult, NaiveDate, NaiveDateTime, NaiveTime, Offset, TimeZone, Utc};
use chrono_tz::Tz;

use crate::model::DayOfWeek;

/// One local calendar day expressed as the half-open instant range `[start, end)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LocalDay {
    pub date: NaiveDate,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub weekday: DayOfWeek,
}

pub fn parse_timezone(name: &str) -> Option<Tz> {
    name.parse::<Tz>().ok()
}

/// `YYYY-MM-DD` only, years 0001 through 9999; no time component.
pub fn parse_date(s: &str) -> Option<NaiveDate> {
    let bytes = s.as_bytes();
    if bytes.len() != 10 || !bytes[..4].iter().all(u8::is_ascii_digit) {
        return None;
    }
    let date = NaiveDate::parse_from_str(s, "%Y-%m-%d").ok()?;
    (date.year() >= 1).then_some(date)
}

/// `HH:mm`, also accepting `HH:mm:ss`.
pub fn parse_wall_clock(s: &str) -> Option<NaiveTime> {
    NaiveTime::parse_from_str(s, "%H:%M")
        .or_else(|_| NaiveTime::parse_from_str(s, "%H:%M:%S"))
        .ok()
}

/// Map a wall-clock reading in `tz` to an instant.
///
/// Ambiguous readings (clocks falling back) take the earlier instant. Readings inside a
/// spring-forward gap are read with the offset in force before the jump, which lands them
/// past the gap by the same amount (02:30 on a 02:00→03:00 day becomes 03:30).
///
/// `None` when the reading has no instant inside chrono's representable range.
pub fn resolve_local(tz: Tz, local: NaiveDateTime) -> Option<DateTime<Utc>> {
    match tz.from_local_datetime(&local) {
        LocalResult::Single(dt) => Some(dt.with_timezone(&Utc)),
        LocalResult::Ambiguous(earliest, _) => Some(earliest.with_timezone(&Utc)),
        LocalResult::None => {
            // Zone offsets stay within ±14h, so one day earlier is always before the gap.
            let day_before = local.checked_sub_signed(Duration::days(1))?;
            let before = tz.offset_from_utc_datetime(&day_before).fix();
            let utc =
                local.checked_sub_signed(Duration::seconds(i64::from(before.local_minus_utc())))?;
            Some(DateTime::<Utc>::from_naive_utc_and_offset(utc, Utc))
        }
    }
}

/// Bounds and weekday of `date` as lived in `tz`. `None` only at the edges of the calendar range.
pub fn local_day(date: NaiveDate, tz: Tz) -> Option<LocalDay> {
    let next = date.succ_opt()?;
    Some(LocalDay {
        date,
        start: resolve_local(tz, date.and_time(NaiveTime::MIN))?,
        end: resolve_local(tz, next.and_time(NaiveTime::MIN))?,
        weekday: DayOfWeek::from_weekday(date.weekday()),
    })
}

/// The local calendar date an instant falls on in `tz`.
pub fn local_date_of(instant: DateTime<Utc>, tz: Tz) -> NaiveDate {
    instant.with_timezone(&tz).date_naive()
}
