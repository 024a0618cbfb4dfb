use chrono::{DateTime, NaiveTime, Utc};
use serde::{Deserialize, Serialize};
use ulid::Ulid;

/// Day of week as stored on a rule: 0 = Sunday .. 6 = Saturday.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DayOfWeek(u8);

impl DayOfWeek {
    pub const SUNDAY: DayOfWeek = DayOfWeek(0);
    pub const MONDAY: DayOfWeek = DayOfWeek(1);

    pub fn new(day: u8) -> Option<Self> {
        (day <= 6).then_some(Self(day))
    }

    pub fn from_weekday(weekday: chrono::Weekday) -> Self {
        Self(weekday.num_days_from_sunday() as u8)
    }

    pub fn number(self) -> u8 {
        self.0
    }
}

/// Recurring weekly window during which a professional accepts bookings.
/// Times are wall-clock in the professional's timezone; the window is `[start_time, end_time)`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AvailabilityRule {
    pub id: Ulid,
    pub professional_id: Ulid,
    pub day_of_week: DayOfWeek,
    pub start_time: NaiveTime,
    pub end_time: NaiveTime,
}

impl AvailabilityRule {
    pub fn overlaps(&self, other: &RuleWindow) -> bool {
        self.window().overlaps(other)
    }

    pub fn window(&self) -> RuleWindow {
        RuleWindow {
            day_of_week: self.day_of_week,
            start_time: self.start_time,
            end_time: self.end_time,
        }
    }
}

/// A rule without identity: what callers submit to the availability writer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RuleWindow {
    pub day_of_week: DayOfWeek,
    pub start_time: NaiveTime,
    pub end_time: NaiveTime,
}

impl RuleWindow {
    /// Half-open overlap on the same weekday. Touching windows (09:00-10:00, 10:00-11:00) do not overlap.
    pub fn overlaps(&self, other: &RuleWindow) -> bool {
        self.day_of_week == other.day_of_week
            && self.start_time < other.end_time
            && other.start_time < self.end_time
    }

    pub fn is_well_formed(&self) -> bool {
        self.start_time < self.end_time
    }
}

impl std::fmt::Display for RuleWindow {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "day {} {}-{}",
            self.day_of_week.number(),
            self.start_time.format("%H:%M"),
            self.end_time.format("%H:%M")
        )
    }
}

/// Scheduling fields of the externally owned professional profile.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScheduleConfig {
    pub appointment_duration_minutes: Option<u32>,
    /// IANA zone name, e.g. `Europe/Berlin`.
    pub timezone: Option<String>,
    pub auto_confirm_appointments: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AppointmentStatus {
    Pending,
    Scheduled,
    ConfirmedByProfessional,
    CanceledByClient,
    CanceledByProfessional,
    Completed,
}

impl AppointmentStatus {
    /// Active appointments occupy their slot.
    pub fn is_active(self) -> bool {
        matches!(self, AppointmentStatus::Pending | AppointmentStatus::Scheduled)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Appointment {
    pub id: Ulid,
    pub client_id: Ulid,
    pub professional_id: Ulid,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub status: AppointmentStatus,
    pub created_at: DateTime<Utc>,
}

impl Appointment {
    pub fn involves(&self, user_id: Ulid) -> bool {
        self.client_id == user_id || self.professional_id == user_id
    }
}

/// Everything the engine knows about one professional. Guarded by the professional lock.
#[derive(Debug, Clone)]
pub struct ProfessionalState {
    pub id: Ulid,
    pub config: ScheduleConfig,
    /// Sorted by `(day_of_week, start_time)`.
    pub rules: Vec<AvailabilityRule>,
    /// Sorted by `start_time`.
    pub appointments: Vec<Appointment>,
}

impl ProfessionalState {
    pub fn new(id: Ulid, config: ScheduleConfig) -> Self {
        Self {
            id,
            config,
            rules: Vec::new(),
            appointments: Vec::new(),
        }
    }

    pub fn insert_rule(&mut self, rule: AvailabilityRule) {
        let key = (rule.day_of_week, rule.start_time);
        let pos = self
            .rules
            .binary_search_by_key(&key, |r| (r.day_of_week, r.start_time))
            .unwrap_or_else(|e| e);
        self.rules.insert(pos, rule);
    }

    pub fn remove_rule(&mut self, id: Ulid) -> Option<AvailabilityRule> {
        let pos = self.rules.iter().position(|r| r.id == id)?;
        Some(self.rules.remove(pos))
    }

    pub fn replace_rules(&mut self, rules: Vec<AvailabilityRule>) -> Vec<AvailabilityRule> {
        let old = std::mem::take(&mut self.rules);
        for rule in rules {
            self.insert_rule(rule);
        }
        old
    }

    pub fn rules_on(&self, day: DayOfWeek) -> impl Iterator<Item = &AvailabilityRule> {
        self.rules.iter().filter(move |r| r.day_of_week == day)
    }

    /// First stored rule that overlaps `window`, if any.
    pub fn conflicting_rule(&self, window: &RuleWindow) -> Option<&AvailabilityRule> {
        self.rules_on(window.day_of_week).find(|r| r.overlaps(window))
    }

    /// Insert appointment maintaining sort order by start_time.
    pub fn insert_appointment(&mut self, appointment: Appointment) {
        let pos = self
            .appointments
            .partition_point(|a| a.start_time <= appointment.start_time);
        self.appointments.insert(pos, appointment);
    }

    pub fn remove_appointment(&mut self, id: Ulid) -> Option<Appointment> {
        let pos = self.appointments.iter().position(|a| a.id == id)?;
        Some(self.appointments.remove(pos))
    }

    pub fn appointment(&self, id: Ulid) -> Option<&Appointment> {
        self.appointments.iter().find(|a| a.id == id)
    }

    /// Active appointments whose start falls in `[from, to)`.
    pub fn active_starting_in(
        &self,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> impl Iterator<Item = &Appointment> {
        let lo = self.appointments.partition_point(|a| a.start_time < from);
        let hi = self.appointments.partition_point(|a| a.start_time < to);
        self.appointments[lo..hi]
            .iter()
            .filter(|a| a.status.is_active())
    }
}

/// The event types — flat, no nesting. This is the WAL record format.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Event {
    ProfessionalConfigured {
        id: Ulid,
        config: ScheduleConfig,
    },
    RulesReplaced {
        professional_id: Ulid,
        rules: Vec<AvailabilityRule>,
    },
    RuleAdded {
        rule: AvailabilityRule,
    },
    RuleRemoved {
        id: Ulid,
        professional_id: Ulid,
    },
    AppointmentBooked {
        appointment: Appointment,
    },
    AppointmentCanceled {
        id: Ulid,
        professional_id: Ulid,
    },
}

impl Event {
    pub fn professional_id(&self) -> Ulid {
        match self {
            Event::ProfessionalConfigured { id, .. } => *id,
            Event::RulesReplaced { professional_id, .. }
            | Event::RuleRemoved { professional_id, .. }
            | Event::AppointmentCanceled { professional_id, .. } => *professional_id,
            Event::RuleAdded { rule } => rule.professional_id,
            Event::AppointmentBooked { appointment } => appointment.professional_id,
        }
    }
}
