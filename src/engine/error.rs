use chrono::{DateTime, Utc};
use ulid::Ulid;

use crate::model::RuleWindow;

#[derive(Debug)]
pub enum EngineError {
    /// Appointment or availability rule id unknown.
    NotFound(Ulid),
    ProfessionalNotFound(Ulid),
    /// Requested start is not among the freshly computed open slots.
    SlotUnavailable(DateTime<Utc>),
    /// Professional lacks a duration or timezone, so nothing can be booked.
    NotConfigured(Ulid),
    Overlap {
        rule: RuleWindow,
        conflicting: RuleWindow,
    },
    InvalidRule(RuleWindow),
    InvalidInput(String),
    Forbidden(Ulid),
    LimitExceeded(&'static str),
    WalError(String),
}

impl std::fmt::Display for EngineError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EngineError::NotFound(id) => write!(f, "not found: {id}"),
            EngineError::ProfessionalNotFound(id) => write!(f, "professional not found: {id}"),
            EngineError::SlotUnavailable(at) => {
                write!(f, "slot not valid or already taken: {}", at.to_rfc3339())
            }
            EngineError::NotConfigured(id) => {
                write!(f, "professional {id} has no appointment duration or timezone")
            }
            EngineError::Overlap { rule, conflicting } => {
                write!(f, "availability {rule} overlaps {conflicting}")
            }
            EngineError::InvalidRule(rule) => {
                write!(f, "availability {rule} must start before it ends")
            }
            EngineError::InvalidInput(msg) => write!(f, "invalid input: {msg}"),
            EngineError::Forbidden(id) => write!(f, "not permitted on {id}"),
            EngineError::LimitExceeded(msg) => write!(f, "limit exceeded: {msg}"),
            EngineError::WalError(e) => write!(f, "WAL error: {e}"),
        }
    }
}

impl std::error::Error for EngineError {}
