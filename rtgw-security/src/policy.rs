//! Authorization Policy (C9): pure functions mapping `(Principal, topic,
//! filter, payload)` to allow/deny (spec §4.9). No I/O.

use std::collections::BTreeMap;

use crate::identity::{Principal, Role};

/// The closed topic enumeration (spec §3), shared with the pub/sub bus and
/// the subscription registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Topic {
    MetricUpdated,
    FlowStateUpdated,
    AlertCreated,
    DashboardUpdated,
    TeamUpdated,
    UserStatusUpdated,
}

impl Topic {
    pub fn as_str(self) -> &'static str {
        match self {
            Topic::MetricUpdated => "metric_updated",
            Topic::FlowStateUpdated => "flow_state_updated",
            Topic::AlertCreated => "alert_created",
            Topic::DashboardUpdated => "dashboard_updated",
            Topic::TeamUpdated => "team_updated",
            Topic::UserStatusUpdated => "user_status_updated",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "metric_updated" => Some(Topic::MetricUpdated),
            "flow_state_updated" => Some(Topic::FlowStateUpdated),
            "alert_created" => Some(Topic::AlertCreated),
            "dashboard_updated" => Some(Topic::DashboardUpdated),
            "team_updated" => Some(Topic::TeamUpdated),
            "user_status_updated" => Some(Topic::UserStatusUpdated),
            _ => None,
        }
    }
}

impl std::fmt::Display for Topic {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A flat key -> string/id filter map, as carried on a `subscribe` frame or
/// derived from an event's payload.
pub type Filters = BTreeMap<String, String>;

fn filter_user_matches(filters: &Filters, principal: &Principal) -> bool {
    filters
        .get("userId")
        .is_some_and(|user_id| user_id == &principal.user_id)
}

fn filter_team_matches(filters: &Filters, principal: &Principal) -> bool {
    filters
        .get("teamId")
        .is_some_and(|team_id| principal.has_team(team_id))
}

/// Evaluate the authorization rule table for `(principal, topic, filters)`
/// (spec §4.9).
pub fn authorize(principal: &Principal, topic: Topic, filters: &Filters) -> bool {
    if principal.role == Role::Admin {
        return true;
    }
    match topic {
        Topic::MetricUpdated | Topic::FlowStateUpdated => {
            filter_user_matches(filters, principal)
                || (filter_team_matches(filters, principal)
                    && principal.role.satisfies(Role::TeamLead))
        }
        Topic::AlertCreated | Topic::DashboardUpdated | Topic::UserStatusUpdated => {
            filter_user_matches(filters, principal)
        }
        Topic::TeamUpdated => filter_team_matches(filters, principal),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn principal(role: Role, user_id: &str, teams: &[&str]) -> Principal {
        Principal {
            user_id: user_id.to_string(),
            display_name: user_id.to_string(),
            role,
            team_ids: teams.iter().map(|t| t.to_string()).collect(),
            active: true,
        }
    }

    fn filters(pairs: &[(&str, &str)]) -> Filters {
        pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect()
    }

    #[test]
    fn admin_bypasses_every_rule() {
        let admin = principal(Role::Admin, "admin-1", &[]);
        assert!(authorize(&admin, Topic::TeamUpdated, &filters(&[("teamId", "other")])));
    }

    #[test]
    fn metric_updated_allows_own_user_filter() {
        let user = principal(Role::Developer, "user-1", &[]);
        assert!(authorize(&user, Topic::MetricUpdated, &filters(&[("userId", "user-1")])));
        assert!(!authorize(&user, Topic::MetricUpdated, &filters(&[("userId", "user-2")])));
    }

    #[test]
    fn metric_updated_team_filter_requires_team_lead_or_above() {
        let lead = principal(Role::TeamLead, "lead-1", &["team-a"]);
        let dev = principal(Role::Developer, "dev-1", &["team-a"]);
        let team_filter = filters(&[("teamId", "team-a")]);
        assert!(authorize(&lead, Topic::MetricUpdated, &team_filter));
        assert!(!authorize(&dev, Topic::MetricUpdated, &team_filter));
    }

    #[test]
    fn alert_created_denies_other_users() {
        let user = principal(Role::Manager, "user-1", &[]);
        assert!(!authorize(&user, Topic::AlertCreated, &filters(&[("userId", "user-2")])));
    }

    #[test]
    fn team_updated_requires_membership() {
        let member = principal(Role::Developer, "user-1", &["team-a"]);
        let outsider = principal(Role::Developer, "user-2", &["team-b"]);
        let team_filter = filters(&[("teamId", "team-a")]);
        assert!(authorize(&member, Topic::TeamUpdated, &team_filter));
        assert!(!authorize(&outsider, Topic::TeamUpdated, &team_filter));
    }

    #[test]
    fn topic_round_trips_through_parse_and_display() {
        for topic in [
            Topic::MetricUpdated,
            Topic::FlowStateUpdated,
            Topic::AlertCreated,
            Topic::DashboardUpdated,
            Topic::TeamUpdated,
            Topic::UserStatusUpdated,
        ] {
            assert_eq!(Topic::parse(topic.as_str()), Some(topic));
        }
    }
}
