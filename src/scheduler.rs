use crate::errors::{AppError, AppResult, EntityKind};
use crate::models::{Day, TimeInterval, Trip, TripActivity};
use chrono::NaiveTime;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TimeRange {
    pub start: NaiveTime,
    pub end: NaiveTime,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IntervalDraft {
    pub day_id: i64,
    pub trip_activity_id: i64,
    pub start_time: Option<NaiveTime>,
    pub end_time: Option<NaiveTime>,
}

/// Parses an `hmm`/`hhmm` token such as `800` or `1730`.
pub fn parse_time_token(token: &str) -> AppResult<NaiveTime> {
    let malformed = || {
        AppError::InvalidTimeFormat(format!(
            "'{}' is not a time, use hhmm digits such as 800 or 1730",
            token
        ))
    };

    if !(3..=4).contains(&token.len()) || !token.bytes().all(|byte| byte.is_ascii_digit()) {
        return Err(malformed());
    }
    let padded = format!("{:0>4}", token);
    let hours: u32 = padded[..2].parse().map_err(|_| malformed())?;
    let minutes: u32 = padded[2..].parse().map_err(|_| malformed())?;
    NaiveTime::from_hms_opt(hours, minutes, 0).ok_or_else(malformed)
}

pub fn parse_time_range(start: &str, end: &str) -> AppResult<TimeRange> {
    let range = TimeRange {
        start: parse_time_token(start)?,
        end: parse_time_token(end)?,
    };
    if range.end < range.start {
        return Err(AppError::InvalidTimeFormat(format!(
            "end time {} is before start time {}",
            end, start
        )));
    }
    Ok(range)
}

/// Binds a trip activity to one of the trip's days. Both must belong to `trip`.
pub fn draft_interval(
    trip: &Trip,
    trip_activity: &TripActivity,
    day: &Day,
    range: Option<TimeRange>,
) -> AppResult<IntervalDraft> {
    if trip_activity.trip_id != trip.id {
        return Err(AppError::not_found(EntityKind::Activity, trip_activity.id));
    }
    if day.trip_id != trip.id {
        return Err(AppError::not_found(EntityKind::Day, day.order));
    }
    Ok(IntervalDraft {
        day_id: day.id,
        trip_activity_id: trip_activity.id,
        start_time: range.map(|range| range.start),
        end_time: range.map(|range| range.end),
    })
}

/// Ids of intervals on the draft's day that share time with it. All-day
/// intervals overlap everything on their day.
pub fn overlapping(draft: &IntervalDraft, existing: &[TimeInterval]) -> Vec<i64> {
    existing
        .iter()
        .filter(|interval| interval.day_id == draft.day_id)
        .filter(|interval| {
            match (
                draft.start_time.zip(draft.end_time),
                interval.start_time.zip(interval.end_time),
            ) {
                (Some((start, end)), Some((other_start, other_end))) => {
                    start < other_end && other_start < end
                }
                _ => true,
            }
        })
        .map(|interval| interval.id)
        .collect()
}
