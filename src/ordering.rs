//! Priority reassignment for trip activities.
//!
//! Callers name only the relative order of a subset. The subset is overlaid on
//! the pool of sortable activities (already prioritised, or currently active)
//! slot by slot, so members the caller left out keep their positions.

use crate::errors::{AppError, AppResult, EntityKind};
use crate::models::TripActivity;
use std::collections::HashSet;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PriorityAssignment {
    pub trip_activity_id: i64,
    pub priority: i64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReorderPlan {
    /// Pool ids in their new order; position `i` receives priority `i + 1`.
    pub order: Vec<i64>,
    /// Only the assignments that differ from the stored priority.
    pub changes: Vec<PriorityAssignment>,
}

/// Default listing order: priority ascending (unset last), then name.
pub fn sort_activities(activities: &mut [TripActivity]) {
    activities.sort_by(|a, b| {
        a.priority
            .cmp(&b.priority)
            .then_with(|| a.name.cmp(&b.name))
            .then_with(|| a.id.cmp(&b.id))
    });
}

pub fn plan_reorder(
    trip_activities: &[TripActivity],
    active_ids: &[i64],
    requested: &[i64],
) -> AppResult<ReorderPlan> {
    let mut seen = HashSet::new();
    for id in requested {
        if !seen.insert(*id) {
            return Err(AppError::InvalidInput(format!(
                "activity {} appears more than once in the requested order",
                id
            )));
        }
    }

    let active: HashSet<i64> = active_ids.iter().copied().collect();
    if let Some(missing) = requested.iter().find(|id| !active.contains(id)) {
        return Err(AppError::not_found(EntityKind::Activity, missing));
    }

    let mut pool: Vec<TripActivity> = trip_activities
        .iter()
        .filter(|activity| activity.has_priority() || active.contains(&activity.id))
        .cloned()
        .collect();
    sort_activities(&mut pool);

    let mut replacements = requested.iter().copied();
    let order: Vec<i64> = pool
        .iter()
        .map(|member| {
            if seen.contains(&member.id) {
                replacements.next().unwrap_or(member.id)
            } else {
                member.id
            }
        })
        .collect();

    let changes = order
        .iter()
        .enumerate()
        .filter_map(|(index, id)| {
            let priority = index as i64 + 1;
            let current = pool.iter().find(|member| member.id == *id)?;
            (current.priority != priority).then_some(PriorityAssignment {
                trip_activity_id: *id,
                priority,
            })
        })
        .collect();

    Ok(ReorderPlan { order, changes })
}

#[cfg(test)]
mod tests {
    use super::{plan_reorder, sort_activities, PriorityAssignment};
    use crate::errors::{AppError, EntityKind};
    use crate::models::{TripActivity, UNSET_PRIORITY};
    use chrono::Utc;

    fn activity(id: i64, name: &str, priority: i64) -> TripActivity {
        TripActivity {
            id,
            trip_id: 1,
            activity_id: id,
            name: name.to_string(),
            priority,
            comments: String::new(),
            tags: Vec::new(),
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn subset_reorder_keeps_untouched_slots() {
        let pool = vec![activity(1, "a1", 1), activity(2, "a2", 2), activity(3, "a3", 3)];
        let plan = plan_reorder(&pool, &[1, 3], &[3, 1]).expect("plan");
        assert_eq!(plan.order, vec![3, 2, 1]);
        assert_eq!(
            plan.changes,
            vec![
                PriorityAssignment { trip_activity_id: 3, priority: 1 },
                PriorityAssignment { trip_activity_id: 1, priority: 3 },
            ]
        );
    }

    #[test]
    fn unprioritised_active_members_join_after_sorted_ones() {
        let pool = vec![
            activity(1, "zoo", UNSET_PRIORITY),
            activity(2, "aquarium", 1),
            activity(3, "botanic garden", UNSET_PRIORITY),
            activity(4, "castle", UNSET_PRIORITY),
        ];
        // castle is neither prioritised nor active, so it stays out of the pool.
        let plan = plan_reorder(&pool, &[1, 2, 3], &[1]).expect("plan");
        assert_eq!(plan.order, vec![2, 3, 1]);
        assert!(!plan.order.contains(&4));
    }

    #[test]
    fn explicit_full_order_is_applied_verbatim() {
        let pool = vec![
            activity(1, "a", UNSET_PRIORITY),
            activity(2, "b", UNSET_PRIORITY),
            activity(3, "c", UNSET_PRIORITY),
        ];
        let plan = plan_reorder(&pool, &[1, 2, 3], &[2, 3, 1]).expect("plan");
        assert_eq!(plan.order, vec![2, 3, 1]);
        assert_eq!(plan.changes.len(), 3);
    }

    #[test]
    fn unknown_id_aborts_without_a_plan() {
        let pool = vec![activity(1, "a", 1), activity(2, "b", 2)];
        let error = plan_reorder(&pool, &[1], &[1, 2]).expect_err("2 is not active");
        assert!(matches!(
            error,
            AppError::NotFound { kind: EntityKind::Activity, ref identifier } if identifier == "2"
        ));
    }

    #[test]
    fn duplicate_ids_are_rejected() {
        let pool = vec![activity(1, "a", 1)];
        let error = plan_reorder(&pool, &[1], &[1, 1]).expect_err("duplicate");
        assert!(error.is_invalid_input());
    }

    #[test]
    fn reordering_an_already_ordered_pool_changes_nothing() {
        let pool = vec![activity(1, "a", 1), activity(2, "b", 2)];
        let plan = plan_reorder(&pool, &[1, 2], &[1, 2]).expect("plan");
        assert!(plan.changes.is_empty());
    }

    #[test]
    fn default_sort_puts_unset_priority_last_then_by_name() {
        let mut activities = vec![
            activity(1, "b", UNSET_PRIORITY),
            activity(2, "z", 2),
            activity(3, "a", UNSET_PRIORITY),
            activity(4, "m", 1),
        ];
        sort_activities(&mut activities);
        let ids: Vec<i64> = activities.iter().map(|activity| activity.id).collect();
        assert_eq!(ids, vec![4, 2, 3, 1]);
    }
}
