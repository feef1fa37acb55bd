use super::{now_rfc3339, parse_time, Database};
use crate::errors::{AppError, AppResult};
use crate::lifecycle::{plan_days, DayPlan};
use crate::models::{Day, DeleteSummary, NewTripPayload, Trip, TripUpdate};
use crate::validation::Identifier;
use chrono::NaiveDate;
use rusqlite::{params, Connection, OptionalExtension};

const TRIP_COLUMNS: &str = "id, user_id, name, start_date, duration, created_at, updated_at";
const DAY_COLUMNS: &str = "id, trip_id, day_order, date, comments";

impl Database {
    /// Inserts the trip and its day rows in one transaction.
    pub fn create_trip(&self, user_id: i64, payload: &NewTripPayload, default_duration: u32) -> AppResult<Trip> {
        let duration = payload.duration.unwrap_or(default_duration);
        let mut conn = self.conn()?;
        let tx = conn.transaction()?;
        ensure_trip_name_free(&tx, user_id, &payload.name)?;

        let now = now_rfc3339();
        tx.execute(
            "INSERT INTO trips (user_id, name, start_date, duration, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?5)",
            params![user_id, payload.name, payload.start_date, duration, now],
        )?;
        let trip_id = tx.last_insert_rowid();
        let plan = reconcile_days(&tx, trip_id, duration, payload.start_date)?;
        let trip = load_trip(&tx, trip_id)?
            .ok_or_else(|| AppError::Internal(format!("trip {} vanished after insert", trip_id)))?;
        tx.commit()?;

        tracing::info!(trip_id, duration, days_created = plan.create.len(), "trip created");
        Ok(trip)
    }

    pub fn find_trip(&self, user_id: i64, identifier: &Identifier) -> AppResult<Option<Trip>> {
        let conn = self.conn()?;
        let trip = match identifier {
            Identifier::Name(name) => conn
                .query_row(
                    &format!("SELECT {TRIP_COLUMNS} FROM trips WHERE user_id = ?1 AND name = ?2"),
                    params![user_id, name],
                    parse_trip_row,
                )
                .optional()?,
            Identifier::Id(id) => load_trip(&conn, *id)?.filter(|trip| trip.user_id == user_id),
        };
        Ok(trip)
    }

    pub fn list_trips(&self, user_id: i64) -> AppResult<Vec<Trip>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {TRIP_COLUMNS} FROM trips WHERE user_id = ?1 ORDER BY name ASC"
        ))?;
        let trips = stmt
            .query_map([user_id], parse_trip_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(trips)
    }

    /// Applies `update` and re-derives the day rows in the same transaction.
    pub fn update_trip(&self, trip: &Trip, update: &TripUpdate) -> AppResult<Trip> {
        let name = update.name.clone().unwrap_or_else(|| trip.name.clone());
        let start_date = update.start_date.unwrap_or(trip.start_date);
        let duration = update.duration.unwrap_or(trip.duration);

        let mut conn = self.conn()?;
        let tx = conn.transaction()?;
        if name != trip.name {
            ensure_trip_name_free(&tx, trip.user_id, &name)?;
        }
        tx.execute(
            "UPDATE trips SET name = ?1, start_date = ?2, duration = ?3, updated_at = ?4 WHERE id = ?5",
            params![name, start_date, duration, now_rfc3339(), trip.id],
        )?;
        let plan = reconcile_days(&tx, trip.id, duration, start_date)?;
        let updated = load_trip(&tx, trip.id)?
            .ok_or_else(|| AppError::not_found(crate::errors::EntityKind::Trip, trip.id))?;
        tx.commit()?;

        tracing::info!(
            trip_id = trip.id,
            duration,
            days_deleted = plan.delete_orders.len(),
            days_created = plan.create.len(),
            days_redated = plan.redate.len(),
            "trip updated"
        );
        Ok(updated)
    }

    /// Deletes the trip with its days, trip activities and their time
    /// intervals. Catalog activities are kept.
    pub fn delete_trip(&self, trip_id: i64) -> AppResult<DeleteSummary> {
        let mut conn = self.conn()?;
        let tx = conn.transaction()?;
        let summary = delete_trip_rows(&tx, trip_id)?;
        tx.commit()?;
        tracing::info!(
            trip_id,
            days = summary.days,
            trip_activities = summary.trip_activities,
            time_intervals = summary.time_intervals,
            "trip deleted"
        );
        Ok(summary)
    }

    pub fn list_days(&self, trip_id: i64) -> AppResult<Vec<Day>> {
        let conn = self.conn()?;
        load_days(&conn, trip_id)
    }

    pub fn find_day(&self, trip_id: i64, order: u32) -> AppResult<Option<Day>> {
        let conn = self.conn()?;
        conn.query_row(
            &format!("SELECT {DAY_COLUMNS} FROM days WHERE trip_id = ?1 AND day_order = ?2"),
            params![trip_id, order],
            parse_day_row,
        )
        .optional()
        .map_err(AppError::from)
    }

    pub fn set_day_comments(&self, day_id: i64, comments: &str) -> AppResult<()> {
        let conn = self.conn()?;
        conn.execute(
            "UPDATE days SET comments = ?1 WHERE id = ?2",
            params![comments, day_id],
        )?;
        Ok(())
    }
}

/// Brings the trip's day rows in line with `duration` and `start_date`.
fn reconcile_days(
    conn: &Connection,
    trip_id: i64,
    duration: u32,
    start_date: Option<NaiveDate>,
) -> AppResult<DayPlan> {
    let existing = load_days(conn, trip_id)?;
    let plan = plan_days(&existing, duration, start_date)?;

    for order in &plan.delete_orders {
        conn.execute(
            "DELETE FROM time_intervals WHERE day_id IN (
               SELECT id FROM days WHERE trip_id = ?1 AND day_order = ?2)",
            params![trip_id, order],
        )?;
        conn.execute(
            "DELETE FROM days WHERE trip_id = ?1 AND day_order = ?2",
            params![trip_id, order],
        )?;
    }
    for redate in &plan.redate {
        conn.execute(
            "UPDATE days SET date = ?1 WHERE id = ?2",
            params![redate.date, redate.day_id],
        )?;
    }
    for new_day in &plan.create {
        conn.execute(
            "INSERT INTO days (trip_id, day_order, date, comments) VALUES (?1, ?2, ?3, '')",
            params![trip_id, new_day.order, new_day.date],
        )?;
    }

    if !plan.is_empty() {
        tracing::debug!(trip_id, writes = plan.write_count(), "days reconciled");
    }
    Ok(plan)
}

pub(super) fn delete_trip_rows(conn: &Connection, trip_id: i64) -> AppResult<DeleteSummary> {
    let time_intervals = conn.execute(
        "DELETE FROM time_intervals WHERE trip_activity_id IN (
           SELECT id FROM trip_activities WHERE trip_id = ?1)
         OR day_id IN (SELECT id FROM days WHERE trip_id = ?1)",
        [trip_id],
    )?;
    conn.execute(
        "DELETE FROM trip_activity_tags WHERE trip_activity_id IN (
           SELECT id FROM trip_activities WHERE trip_id = ?1)",
        [trip_id],
    )?;
    let trip_activities = conn.execute("DELETE FROM trip_activities WHERE trip_id = ?1", [trip_id])?;
    let days = conn.execute("DELETE FROM days WHERE trip_id = ?1", [trip_id])?;
    let deleted = conn.execute("DELETE FROM trips WHERE id = ?1", [trip_id])?;
    if deleted == 0 {
        return Err(AppError::not_found(crate::errors::EntityKind::Trip, trip_id));
    }
    Ok(DeleteSummary {
        days,
        trip_activities,
        time_intervals,
    })
}

fn ensure_trip_name_free(conn: &Connection, user_id: i64, name: &str) -> AppResult<()> {
    let exists: bool = conn.query_row(
        "SELECT EXISTS(SELECT 1 FROM trips WHERE user_id = ?1 AND name = ?2)",
        params![user_id, name],
        |row| row.get(0),
    )?;
    if exists {
        return Err(AppError::DuplicateName(format!(
            "the trip '{}' already exists, the name must be unique",
            name
        )));
    }
    Ok(())
}

pub(super) fn load_trip(conn: &Connection, trip_id: i64) -> AppResult<Option<Trip>> {
    conn.query_row(
        &format!("SELECT {TRIP_COLUMNS} FROM trips WHERE id = ?1"),
        [trip_id],
        parse_trip_row,
    )
    .optional()
    .map_err(AppError::from)
}

pub(super) fn load_days(conn: &Connection, trip_id: i64) -> AppResult<Vec<Day>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {DAY_COLUMNS} FROM days WHERE trip_id = ?1 ORDER BY day_order ASC"
    ))?;
    let days = stmt
        .query_map([trip_id], parse_day_row)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(days)
}

fn parse_trip_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Trip> {
    Ok(Trip {
        id: row.get(0)?,
        user_id: row.get(1)?,
        name: row.get(2)?,
        start_date: row.get(3)?,
        duration: row.get(4)?,
        created_at: parse_time(&row.get::<_, String>(5)?)?,
        updated_at: parse_time(&row.get::<_, String>(6)?)?,
    })
}

pub(super) fn parse_day_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Day> {
    Ok(Day {
        id: row.get(0)?,
        trip_id: row.get(1)?,
        order: row.get(2)?,
        date: row.get(3)?,
        comments: row.get(4)?,
    })
}

#[cfg(test)]
mod tests {
    use crate::db::test_database;
    use crate::errors::AppError;
    use crate::models::{NewTripPayload, TripUpdate};
    use crate::validation::Identifier;
    use chrono::{Duration, NaiveDate};

    fn start() -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 3, 28).expect("date")
    }

    fn payload(name: &str, duration: Option<u32>, start_date: Option<NaiveDate>) -> NewTripPayload {
        NewTripPayload {
            name: name.to_string(),
            duration,
            start_date,
        }
    }

    #[test]
    fn new_trip_gets_default_duration_days() {
        let (_dir, db) = test_database();
        let user = db.create_user("ana", "Ana").expect("user");
        let trip = db.create_trip(user.id, &payload("Rome", None, None), 7).expect("trip");
        assert_eq!(trip.duration, 7);

        let days = db.list_days(trip.id).expect("days");
        assert_eq!(days.len(), 7);
        assert_eq!(days.iter().map(|day| day.order).collect::<Vec<_>>(), (1..=7).collect::<Vec<_>>());
        assert!(days.iter().all(|day| day.date.is_none()));
    }

    #[test]
    fn duration_and_start_date_edits_keep_days_consistent() {
        let (_dir, db) = test_database();
        let user = db.create_user("ana", "Ana").expect("user");
        let trip = db
            .create_trip(user.id, &payload("Rome", Some(3), Some(start())), 7)
            .expect("trip");

        let trip = db
            .update_trip(
                &trip,
                &TripUpdate {
                    duration: Some(5),
                    ..TripUpdate::default()
                },
            )
            .expect("grow");
        let days = db.list_days(trip.id).expect("days");
        assert_eq!(days.len(), 5);
        for (index, day) in days.iter().enumerate() {
            assert_eq!(day.date, Some(start() + Duration::days(index as i64)));
        }

        let moved = NaiveDate::from_ymd_opt(2025, 4, 1).expect("date");
        let trip = db
            .update_trip(
                &trip,
                &TripUpdate {
                    duration: Some(2),
                    start_date: Some(Some(moved)),
                    ..TripUpdate::default()
                },
            )
            .expect("shrink and move");
        let days = db.list_days(trip.id).expect("days");
        assert_eq!(days.len(), 2);
        assert_eq!(days[1].date, Some(moved + Duration::days(1)));

        let trip = db
            .update_trip(
                &trip,
                &TripUpdate {
                    start_date: Some(None),
                    ..TripUpdate::default()
                },
            )
            .expect("clear start");
        assert!(trip.start_date.is_none());
        assert!(db.list_days(trip.id).expect("days").iter().all(|day| day.date.is_none()));
    }

    #[test]
    fn trip_names_are_unique_per_user() {
        let (_dir, db) = test_database();
        let user = db.create_user("ana", "Ana").expect("user");
        db.create_trip(user.id, &payload("Rome", None, None), 7).expect("rome");
        let paris = db.create_trip(user.id, &payload("Paris", None, None), 7).expect("paris");

        let error = db.create_trip(user.id, &payload("Rome", None, None), 7).expect_err("duplicate");
        assert!(matches!(error, AppError::DuplicateName(_)));

        let error = db
            .update_trip(
                &paris,
                &TripUpdate {
                    name: Some("Rome".to_string()),
                    ..TripUpdate::default()
                },
            )
            .expect_err("rename onto existing");
        assert!(matches!(error, AppError::DuplicateName(_)));
        assert_eq!(db.list_days(paris.id).expect("days").len(), 7);
    }

    #[test]
    fn find_trip_by_name_or_id_within_owner() {
        let (_dir, db) = test_database();
        let ana = db.create_user("ana", "Ana").expect("ana");
        let ben = db.create_user("ben", "Ben").expect("ben");
        let trip = db.create_trip(ana.id, &payload("Oslo", Some(1), None), 7).expect("trip");

        assert!(db.find_trip(ana.id, &Identifier::Name("Oslo".to_string())).expect("name").is_some());
        assert!(db.find_trip(ana.id, &Identifier::Id(trip.id)).expect("id").is_some());
        assert!(db.find_trip(ben.id, &Identifier::Id(trip.id)).expect("other user").is_none());
    }

    #[test]
    fn zero_duration_trip_has_no_days() {
        let (_dir, db) = test_database();
        let user = db.create_user("ana", "Ana").expect("user");
        let trip = db
            .create_trip(user.id, &payload("Someday", Some(0), Some(start())), 7)
            .expect("trip");
        assert!(db.list_days(trip.id).expect("days").is_empty());
        assert!(db.find_day(trip.id, 1).expect("lookup").is_none());
    }
}
