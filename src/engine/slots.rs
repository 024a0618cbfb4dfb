use std::collections::{BTreeSet, HashSet};

use chrono::{DateTime, Duration, NaiveDate, Utc};
use chrono_tz::Tz;

use crate::model::*;

use super::calendar::{self, LocalDay};
use super::EngineError;

// ── Slot Algorithm ────────────────────────────────────────────────

/// Open appointment start instants for one local day.
///
/// Each rule matching the day's weekday is anchored onto the date in `tz` and walked in
/// `duration` steps; a slot is emitted only if it ends within the rule window. Slots that
/// coincide with a booked start, or are not strictly after `now`, are dropped. Output is
/// ascending and free of duplicates.
pub(crate) fn generate_slots<'a>(
    rules: impl IntoIterator<Item = &'a AvailabilityRule>,
    duration: Duration,
    tz: Tz,
    day: &LocalDay,
    booked: &HashSet<DateTime<Utc>>,
    now: DateTime<Utc>,
) -> Vec<DateTime<Utc>> {
    if duration <= Duration::zero() {
        return Vec::new();
    }

    let mut candidates = BTreeSet::new();
    for rule in rules.into_iter().filter(|r| r.day_of_week == day.weekday) {
        let (Some(rule_start), Some(rule_end)) = (
            calendar::resolve_local(tz, day.date.and_time(rule.start_time)),
            calendar::resolve_local(tz, day.date.and_time(rule.end_time)),
        ) else {
            continue;
        };

        let mut slot = rule_start;
        while let Some(slot_end) = slot.checked_add_signed(duration)
            && slot_end <= rule_end
        {
            candidates.insert(slot);
            slot = slot_end;
        }
    }

    candidates
        .into_iter()
        .filter(|slot| !booked.contains(slot))
        .filter(|slot| *slot > now)
        .collect()
}

/// Slot generation against a professional's current state.
///
/// A professional without a duration or timezone has no slots yet; that is not an error.
pub(crate) fn open_slots(
    ps: &ProfessionalState,
    date: NaiveDate,
    now: DateTime<Utc>,
) -> Result<Vec<DateTime<Utc>>, EngineError> {
    let (Some(minutes), Some(zone)) = (
        ps.config.appointment_duration_minutes,
        ps.config.timezone.as_deref(),
    ) else {
        return Ok(Vec::new());
    };
    let tz = calendar::parse_timezone(zone)
        .ok_or_else(|| EngineError::InvalidInput(format!("unknown timezone: {zone}")))?;
    let day = calendar::local_day(date, tz)
        .ok_or_else(|| EngineError::InvalidInput(format!("date out of range: {date}")))?;

    let booked: HashSet<DateTime<Utc>> = ps
        .active_starting_in(day.start, day.end)
        .map(|a| a.start_time)
        .collect();

    Ok(generate_slots(
        ps.rules_on(day.weekday),
        Duration::minutes(i64::from(minutes)),
        tz,
        &day,
        &booked,
        now,
    ))
}
