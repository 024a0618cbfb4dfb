/// Longest appointment a professional may configure (one day).
pub const MAX_APPOINTMENT_MINUTES: u32 = 24 * 60;

pub const MAX_RULES_PER_PROFESSIONAL: usize = 64;

/// Rules accepted in one bulk availability write.
pub const MAX_RULES_PER_REQUEST: usize = 64;

pub const MAX_TIMEZONE_NAME_LEN: usize = 64;
