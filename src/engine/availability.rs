use tracing::info;
use ulid::Ulid;

use crate::limits::*;
use crate::model::*;

use super::{Engine, EngineError};

// ── Overlap checks ────────────────────────────────────────────────

/// Reject malformed windows and any two submitted windows that overlap on the same day.
/// Runs before storage is touched.
pub(crate) fn check_self_overlap(windows: &[RuleWindow]) -> Result<(), EngineError> {
    if let Some(bad) = windows.iter().find(|w| !w.is_well_formed()) {
        return Err(EngineError::InvalidRule(*bad));
    }

    let mut sorted = windows.to_vec();
    sorted.sort_by_key(|w| (w.day_of_week, w.start_time));
    // Sorted by start, any overlap shows up between neighbours.
    for pair in sorted.windows(2) {
        if pair[0].overlaps(&pair[1]) {
            return Err(EngineError::Overlap {
                rule: pair[1],
                conflicting: pair[0],
            });
        }
    }
    Ok(())
}

/// Turn windows into rules one at a time, refusing any that collides with a rule
/// already present for the professional or staged earlier in the same write.
fn stage_rules(
    professional_id: Ulid,
    existing: &[AvailabilityRule],
    windows: &[RuleWindow],
) -> Result<Vec<AvailabilityRule>, EngineError> {
    let mut staged: Vec<AvailabilityRule> = Vec::with_capacity(windows.len());
    for window in windows {
        if let Some(conflict) = existing
            .iter()
            .chain(staged.iter())
            .find(|r| r.overlaps(window))
        {
            return Err(EngineError::Overlap {
                rule: *window,
                conflicting: conflict.window(),
            });
        }
        staged.push(AvailabilityRule {
            id: Ulid::new(),
            professional_id,
            day_of_week: window.day_of_week,
            start_time: window.start_time,
            end_time: window.end_time,
        });
    }
    Ok(staged)
}

impl Engine {
    /// Replace the professional's whole weekly rule set in one commit.
    pub async fn replace_availability(
        &self,
        professional_id: Ulid,
        windows: &[RuleWindow],
    ) -> Result<Vec<AvailabilityRule>, EngineError> {
        if windows.len() > MAX_RULES_PER_REQUEST {
            return Err(EngineError::LimitExceeded("too many rules in one request"));
        }
        check_self_overlap(windows)?;

        let mut guard = self.lock_professional(professional_id).await?;
        // Old rules go away in the same event, so only the new set needs guarding.
        let rules = stage_rules(professional_id, &[], windows)?;

        let event = Event::RulesReplaced {
            professional_id,
            rules: rules.clone(),
        };
        self.persist_and_apply(&mut guard, &event).await?;
        info!(
            professional = %professional_id,
            rules = rules.len(),
            "availability replaced"
        );
        Ok(rules)
    }

    /// Add one rule unless it overlaps a stored rule on the same day.
    pub async fn add_availability(
        &self,
        professional_id: Ulid,
        window: RuleWindow,
    ) -> Result<AvailabilityRule, EngineError> {
        if !window.is_well_formed() {
            return Err(EngineError::InvalidRule(window));
        }

        let mut guard = self.lock_professional(professional_id).await?;
        if guard.rules.len() >= MAX_RULES_PER_PROFESSIONAL {
            return Err(EngineError::LimitExceeded("too many availability rules"));
        }
        if let Some(conflict) = guard.conflicting_rule(&window) {
            return Err(EngineError::Overlap {
                rule: window,
                conflicting: conflict.window(),
            });
        }
        let mut staged = stage_rules(professional_id, &[], &[window])?;
        let rule = staged.remove(0);

        let event = Event::RuleAdded { rule: rule.clone() };
        self.persist_and_apply(&mut guard, &event).await?;
        info!(professional = %professional_id, rule = %rule.id, "availability rule added");
        Ok(rule)
    }

    /// Delete a rule owned by `professional_id`. Unknown and foreign rules are
    /// indistinguishable to the caller.
    pub async fn remove_availability(
        &self,
        rule_id: Ulid,
        professional_id: Ulid,
    ) -> Result<(), EngineError> {
        if self.get_professional_for_entity(&rule_id) != Some(professional_id) {
            return Err(EngineError::Forbidden(rule_id));
        }
        let mut guard = self.lock_professional(professional_id).await?;
        if !guard.rules.iter().any(|r| r.id == rule_id) {
            return Err(EngineError::Forbidden(rule_id));
        }

        let event = Event::RuleRemoved {
            id: rule_id,
            professional_id,
        };
        self.persist_and_apply(&mut guard, &event).await?;
        info!(professional = %professional_id, rule = %rule_id, "availability rule removed");
        Ok(())
    }

    /// All rules owned by the professional, ordered by weekday then start.
    pub async fn list_availability(&self, professional_id: Ulid) -> Vec<AvailabilityRule> {
        match self.get_professional(&professional_id) {
            Some(ps) => ps.read().await.rules.clone(),
            None => Vec::new(),
        }
    }
}
