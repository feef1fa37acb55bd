use crate::errors::{AppError, AppResult};
use crate::models::{Tag, TripActivity};
use crate::validation::{check_tag_name, Identifier};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum TagOperator {
    #[default]
    And,
    Or,
}

impl TagOperator {
    pub fn parse(raw: &str) -> AppResult<Self> {
        match raw {
            "AND" => Ok(Self::And),
            "OR" => Ok(Self::Or),
            other => Err(AppError::InvalidOperator(format!(
                "the only allowed tag operators are AND and OR, got '{}'",
                other
            ))),
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::And => "AND",
            Self::Or => "OR",
        }
    }
}

/// Splits a comma-separated tag expression into validated references.
pub fn parse_tag_expression(expression: &str) -> AppResult<Vec<Identifier>> {
    expression
        .split(',')
        .map(|part| {
            check_tag_name(part)?;
            Identifier::parse(part)
        })
        .collect()
}

/// Splits a comma-separated list of 1-based day orders.
pub fn parse_day_expression(expression: &str) -> AppResult<BTreeSet<u32>> {
    expression
        .split(',')
        .map(|part| {
            let trimmed = part.trim();
            match trimmed.parse::<u32>() {
                Ok(order) if order > 0 => Ok(order),
                _ => Err(AppError::InvalidInput(format!(
                    "'{}' is not a day number",
                    trimmed
                ))),
            }
        })
        .collect()
}

/// Keeps the activities matching `tags` under `operator`, preserving order.
/// Tags are resolved by the caller beforehand so an unknown tag aborts before
/// anything is filtered.
pub fn filter_by_tags(activities: Vec<TripActivity>, tags: &[Tag], operator: TagOperator) -> Vec<TripActivity> {
    activities
        .into_iter()
        .filter(|activity| matches_tags(activity, tags, operator))
        .collect()
}

fn matches_tags(activity: &TripActivity, tags: &[Tag], operator: TagOperator) -> bool {
    match operator {
        TagOperator::And => tags.iter().all(|tag| activity.has_tag(tag.id)),
        TagOperator::Or => tags.iter().any(|tag| activity.has_tag(tag.id)),
    }
}

/// Keeps activities scheduled on any of `days`. `scheduled` maps a trip
/// activity id to the day orders of its time intervals.
pub fn filter_by_days(
    activities: Vec<TripActivity>,
    days: &BTreeSet<u32>,
    scheduled: &HashMap<i64, Vec<u32>>,
) -> Vec<TripActivity> {
    activities
        .into_iter()
        .filter(|activity| {
            scheduled
                .get(&activity.id)
                .is_some_and(|orders| orders.iter().any(|order| days.contains(order)))
        })
        .collect()
}
