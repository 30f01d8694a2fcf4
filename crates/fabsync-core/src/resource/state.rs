//! On/off state derivation.
//!
//! Every consumer (HTTP views, webhook handling, tests) goes through
//! [`derive_state`]; no other code decides whether a resource is on.

use chrono::{DateTime, Utc};

use super::types::{ControlType, Resource};

/// Instant at which a door's grace period ends, if it has one.
///
/// `None` for non-doors, doors without a grace period and doors whose last
/// usage carries no timestamp.
pub fn grace_deadline(resource: &Resource) -> Option<DateTime<Utc>> {
    if !resource.has_delayed_close() {
        return None;
    }
    let at = resource.last_used.as_ref()?.at?;
    Some(
        at.checked_add_signed(resource.grace_period())
            .unwrap_or(DateTime::<Utc>::MAX_UTC),
    )
}

/// Whether `resource` is on (machine running, door open) at `now`.
///
/// A machine is on iff its last usage is running. A door is additionally on
/// while `now` is before `lastUsed.at + maxOfflineUsage`.
pub fn derive_state(resource: &Resource, now: DateTime<Utc>) -> bool {
    if resource.in_use() {
        return true;
    }
    match resource.control_type {
        ControlType::Door => grace_deadline(resource).is_some_and(|deadline| now < deadline),
        ControlType::Machine | ControlType::Other => false,
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use chrono::Duration;

    use super::*;
    use crate::resource::types::{LastUsed, ResourceId};

    fn t0() -> DateTime<Utc> {
        DateTime::parse_from_rfc3339("2026-03-01T12:00:00Z")
            .unwrap()
            .with_timezone(&Utc)
    }

    fn resource(control_type: ControlType, grace: u64, last_used: Option<LastUsed>) -> Resource {
        Resource {
            control_type,
            max_offline_usage: grace,
            last_used,
            ..Resource::new(ResourceId(1))
        }
    }

    fn running() -> LastUsed {
        LastUsed {
            usage_id: Some("u1".into()),
            stop_type: None,
            at: Some(t0()),
        }
    }

    fn stopped_at(at: DateTime<Utc>) -> LastUsed {
        LastUsed {
            usage_id: Some("u1".into()),
            stop_type: Some("normal".into()),
            at: Some(at),
        }
    }

    #[test]
    fn machine_running_is_on() {
        let machine = resource(ControlType::Machine, 0, Some(running()));
        assert!(derive_state(&machine, t0()));
    }

    #[test]
    fn machine_ignores_grace_period() {
        let machine = resource(ControlType::Machine, 300, Some(stopped_at(t0())));
        assert!(!derive_state(&machine, t0() + Duration::seconds(10)));
    }

    #[test]
    fn machine_without_usage_is_off() {
        let machine = resource(ControlType::Machine, 0, None);
        assert!(!derive_state(&machine, t0()));

        let no_id = resource(
            ControlType::Machine,
            0,
            Some(LastUsed {
                usage_id: None,
                stop_type: None,
                at: Some(t0()),
            }),
        );
        assert!(!derive_state(&no_id, t0()));
    }

    #[test]
    fn door_open_within_grace_period() {
        let door = resource(ControlType::Door, 300, Some(stopped_at(t0())));
        assert!(derive_state(&door, t0()));
        assert!(derive_state(&door, t0() + Duration::seconds(299)));
    }

    #[test]
    fn door_closes_exactly_at_grace_deadline() {
        let door = resource(ControlType::Door, 300, Some(stopped_at(t0())));
        assert_eq!(grace_deadline(&door), Some(t0() + Duration::seconds(300)));
        assert!(!derive_state(&door, t0() + Duration::seconds(300)));
        assert!(!derive_state(&door, t0() + Duration::seconds(301)));
    }

    #[test]
    fn door_in_use_is_open_past_grace() {
        let door = resource(ControlType::Door, 300, Some(running()));
        assert!(derive_state(&door, t0() + Duration::hours(5)));
    }

    #[test]
    fn door_without_grace_behaves_like_machine() {
        let door = resource(ControlType::Door, 0, Some(stopped_at(t0())));
        assert!(!derive_state(&door, t0()));
        assert_eq!(grace_deadline(&door), None);
    }

    #[test]
    fn door_without_timestamp_has_no_grace() {
        let door = resource(
            ControlType::Door,
            300,
            Some(LastUsed {
                usage_id: Some("u1".into()),
                stop_type: Some("normal".into()),
                at: None,
            }),
        );
        assert!(!derive_state(&door, t0()));
    }

    #[test]
    fn huge_grace_period_saturates() {
        let door = resource(ControlType::Door, u64::MAX, Some(stopped_at(t0())));
        assert!(derive_state(&door, t0() + Duration::days(365 * 100)));
    }
}
