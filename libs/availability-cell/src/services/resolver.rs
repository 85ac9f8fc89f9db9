// libs/availability-cell/src/services/resolver.rs
use std::sync::Arc;

use chrono::{Datelike, NaiveDate};
use tracing::{debug, info};

use shared_models::StaffId;

use crate::models::{
    AvailabilityError, AvailabilityPolicy, ClosedReason, DateOverride, EffectiveAvailability,
};
use crate::store::AvailabilityStore;

/// Two-level lookup: the staff member's override map first, then the
/// clinic's default [`AvailabilityPolicy`].
pub struct AvailabilityResolver {
    store: Arc<dyn AvailabilityStore>,
    policy: AvailabilityPolicy,
}

impl AvailabilityResolver {
    pub fn new(store: Arc<dyn AvailabilityStore>, policy: AvailabilityPolicy) -> Self {
        Self { store, policy }
    }

    pub fn policy(&self) -> &AvailabilityPolicy {
        &self.policy
    }

    /// Effective open and blocked ranges for `staff_id` on `date`.
    pub async fn resolve(
        &self,
        staff_id: StaffId,
        date: NaiveDate,
    ) -> Result<EffectiveAvailability, AvailabilityError> {
        // The rest day is closed whatever the override map says, so skip the lookup.
        if date.weekday() == self.policy.rest_day {
            debug!("{} is the rest day, staff {} unavailable", date, staff_id);
            return Ok(EffectiveAvailability::closed(date, ClosedReason::RestDay));
        }

        let date_override = self.store.get_override(staff_id, date).await?;
        Ok(resolve_with_policy(&self.policy, date, date_override.as_ref()))
    }

    pub async fn set_override(
        &self,
        staff_id: StaffId,
        date: NaiveDate,
        date_override: DateOverride,
    ) -> Result<(), AvailabilityError> {
        if date_override.is_available() && date.weekday() == self.policy.rest_day {
            return Err(AvailabilityError::RestDayOverride(date));
        }
        if let Some(range) = date_override.unavailable_ranges().iter().find(|r| !r.is_valid()) {
            return Err(AvailabilityError::InvalidRange {
                start: range.start,
                end: range.end,
            });
        }

        self.store.put_override(staff_id, date, date_override).await?;
        info!("Availability override stored for staff {} on {}", staff_id, date);
        Ok(())
    }

    pub async fn clear_override(
        &self,
        staff_id: StaffId,
        date: NaiveDate,
    ) -> Result<bool, AvailabilityError> {
        let removed = self.store.delete_override(staff_id, date).await?;
        if removed {
            info!("Availability override cleared for staff {} on {}", staff_id, date);
        }
        Ok(removed)
    }
}

/// Pure resolution step, shared with callers that already hold the override.
pub fn resolve_with_policy(
    policy: &AvailabilityPolicy,
    date: NaiveDate,
    date_override: Option<&DateOverride>,
) -> EffectiveAvailability {
    if date.weekday() == policy.rest_day {
        return EffectiveAvailability::closed(date, ClosedReason::RestDay);
    }

    let unavailable_ranges = match date_override {
        Some(DateOverride::Unavailable) => {
            return EffectiveAvailability::closed(date, ClosedReason::MarkedUnavailable);
        }
        Some(DateOverride::AvailableWithExceptions { unavailable_ranges }) => unavailable_ranges.clone(),
        None => vec![],
    };

    match policy.open_range() {
        Some(range) => EffectiveAvailability {
            date,
            enabled: true,
            open_ranges: vec![range],
            unavailable_ranges,
            closed_reason: None,
        },
        None => EffectiveAvailability::closed(date, ClosedReason::NoOpenHours),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveTime;
    use shared_models::time::TimeRange;

    fn t(h: u32, m: u32) -> NaiveTime {
        NaiveTime::from_hms_opt(h, m, 0).unwrap()
    }

    #[test]
    fn test_inverted_policy_hours_close_the_day() {
        let policy = AvailabilityPolicy {
            day_start: t(18, 0),
            day_end: t(9, 0),
            ..AvailabilityPolicy::default()
        };
        let monday = NaiveDate::from_ymd_opt(2024, 3, 4).unwrap();

        let resolved = resolve_with_policy(&policy, monday, None);
        assert!(!resolved.enabled);
        assert_eq!(resolved.closed_reason, Some(ClosedReason::NoOpenHours));
    }

    #[test]
    fn test_exception_ranges_pass_through() {
        let policy = AvailabilityPolicy::default();
        let monday = NaiveDate::from_ymd_opt(2024, 3, 4).unwrap();
        let lunch = TimeRange::new(t(12, 0), t(13, 0));
        let date_override = DateOverride::AvailableWithExceptions {
            unavailable_ranges: vec![lunch],
        };

        let resolved = resolve_with_policy(&policy, monday, Some(&date_override));
        assert!(resolved.enabled);
        assert_eq!(resolved.open_ranges, vec![TimeRange::new(t(9, 0), t(18, 0))]);
        assert_eq!(resolved.unavailable_ranges, vec![lunch]);
    }
}
