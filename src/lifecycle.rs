//! Derivation of a trip's day rows from its duration and start date.
//!
//! The plan is computed against whatever rows currently exist, so applying it
//! is idempotent: a second pass over unchanged inputs yields an empty plan.

use crate::errors::{AppError, AppResult};
use crate::models::Day;
use chrono::{Duration, NaiveDate};
use std::collections::BTreeSet;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DayPlan {
    /// Orders to delete, highest first.
    pub delete_orders: Vec<u32>,
    pub create: Vec<NewDay>,
    pub redate: Vec<Redate>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewDay {
    pub order: u32,
    pub date: Option<NaiveDate>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Redate {
    pub day_id: i64,
    pub date: Option<NaiveDate>,
}

impl DayPlan {
    pub fn is_empty(&self) -> bool {
        self.delete_orders.is_empty() && self.create.is_empty() && self.redate.is_empty()
    }

    pub fn write_count(&self) -> usize {
        self.delete_orders.len() + self.create.len() + self.redate.len()
    }
}

pub fn day_date(start_date: NaiveDate, order: u32) -> AppResult<NaiveDate> {
    let offset = i64::from(order.saturating_sub(1));
    start_date
        .checked_add_signed(Duration::days(offset))
        .ok_or_else(|| AppError::InvalidInput(format!("day {} falls outside the calendar", order)))
}

pub fn check_duration(duration: u32, max_duration: u32) -> AppResult<()> {
    if duration > max_duration {
        return Err(AppError::InvalidInput(format!(
            "a trip can last at most {} days, got {}",
            max_duration, duration
        )));
    }
    Ok(())
}

/// Plans the writes that bring `existing` in line with `duration` days dated
/// from `start_date`. Without a start date every day's date is cleared.
pub fn plan_days(existing: &[Day], duration: u32, start_date: Option<NaiveDate>) -> AppResult<DayPlan> {
    let desired_date = |order: u32| start_date.map(|start| day_date(start, order)).transpose();

    let mut delete_orders: Vec<u32> = existing
        .iter()
        .map(|day| day.order)
        .filter(|order| *order > duration)
        .collect();
    delete_orders.sort_unstable_by(|a, b| b.cmp(a));

    let mut redate = Vec::new();
    let mut present = BTreeSet::new();
    for day in existing.iter().filter(|day| day.order <= duration) {
        present.insert(day.order);
        let date = desired_date(day.order)?;
        if day.date != date {
            redate.push(Redate { day_id: day.id, date });
        }
    }

    let mut create = Vec::new();
    for order in (1..=duration).filter(|order| !present.contains(order)) {
        create.push(NewDay {
            order,
            date: desired_date(order)?,
        });
    }

    Ok(DayPlan {
        delete_orders,
        create,
        redate,
    })
}

#[cfg(test)]
mod tests {
    use super::{check_duration, plan_days, DayPlan};
    use crate::models::Day;
    use chrono::{Duration, NaiveDate};

    fn apply(days: &mut Vec<Day>, plan: &DayPlan, next_id: &mut i64) {
        for order in &plan.delete_orders {
            days.retain(|day| day.order != *order);
        }
        for redate in &plan.redate {
            if let Some(day) = days.iter_mut().find(|day| day.id == redate.day_id) {
                day.date = redate.date;
            }
        }
        for new_day in &plan.create {
            *next_id += 1;
            days.push(Day {
                id: *next_id,
                trip_id: 1,
                order: new_day.order,
                date: new_day.date,
                comments: String::new(),
            });
        }
        days.sort_by_key(|day| day.order);
    }

    fn start() -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 12, 30).expect("date")
    }

    #[test]
    fn day_count_tracks_duration_through_edits() {
        let mut days = Vec::new();
        let mut next_id = 0;
        for duration in [7, 3, 3, 10, 0, 2] {
            let plan = plan_days(&days, duration, Some(start())).expect("plan");
            apply(&mut days, &plan, &mut next_id);
            assert_eq!(days.len(), duration as usize);
            for (index, day) in days.iter().enumerate() {
                assert_eq!(day.order as usize, index + 1);
                assert_eq!(day.date, Some(start() + Duration::days(index as i64)));
            }
        }
    }

    #[test]
    fn shrinking_deletes_trailing_days_highest_first() {
        let mut days = Vec::new();
        let mut next_id = 0;
        let plan = plan_days(&days, 5, None).expect("plan");
        apply(&mut days, &plan, &mut next_id);

        let plan = plan_days(&days, 2, None).expect("plan");
        assert_eq!(plan.delete_orders, vec![5, 4, 3]);
        assert!(plan.create.is_empty());
    }

    #[test]
    fn planning_twice_is_idempotent() {
        let mut days = Vec::new();
        let mut next_id = 0;
        let plan = plan_days(&days, 4, Some(start())).expect("plan");
        apply(&mut days, &plan, &mut next_id);

        let again = plan_days(&days, 4, Some(start())).expect("plan");
        assert!(again.is_empty());
        assert_eq!(again.write_count(), 0);
    }

    #[test]
    fn moving_start_date_redates_every_day() {
        let mut days = Vec::new();
        let mut next_id = 0;
        let plan = plan_days(&days, 3, Some(start())).expect("plan");
        apply(&mut days, &plan, &mut next_id);

        let moved = start() + Duration::days(10);
        let plan = plan_days(&days, 3, Some(moved)).expect("plan");
        assert_eq!(plan.redate.len(), 3);
        apply(&mut days, &plan, &mut next_id);
        assert_eq!(days[2].date, Some(moved + Duration::days(2)));
    }

    #[test]
    fn clearing_start_date_clears_day_dates() {
        let mut days = Vec::new();
        let mut next_id = 0;
        let plan = plan_days(&days, 2, Some(start())).expect("plan");
        apply(&mut days, &plan, &mut next_id);

        let plan = plan_days(&days, 2, None).expect("plan");
        apply(&mut days, &plan, &mut next_id);
        assert!(days.iter().all(|day| day.date.is_none()));
    }

    #[test]
    fn rejects_dates_past_the_calendar() {
        assert!(plan_days(&[], 3, Some(NaiveDate::MAX)).is_err());
    }

    #[test]
    fn duration_is_capped_inclusively() {
        check_duration(0, 366).expect("empty trip");
        check_duration(366, 366).expect("at the cap");
        let error = check_duration(4_000_000_000, 366).expect_err("over the cap");
        assert!(error.is_invalid_input());
    }
}
