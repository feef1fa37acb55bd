use super::accounts::parse_tag_row;
use super::{now_rfc3339, parse_time, placeholders, trips, Database};
use crate::errors::{AppError, AppResult, EntityKind};
use crate::models::{
    Activity, DaySchedule, ScheduledEntry, Tag, TimeInterval, TripActivity, TripActivityUpdate, UNSET_PRIORITY,
};
use crate::ordering::PriorityAssignment;
use crate::scheduler::IntervalDraft;
use rusqlite::{params, Connection, OptionalExtension};
use std::collections::HashMap;

const TRIP_ACTIVITY_COLUMNS: &str =
    "ta.id, ta.trip_id, ta.activity_id, ta.name, ta.priority, ta.comments, ta.created_at, ta.updated_at";
const INTERVAL_COLUMNS: &str = "ti.id, ti.day_id, ti.trip_activity_id, ti.start_time, ti.end_time, ti.created_at";

impl Database {
    /// One row per (trip, activity); the trip-local name starts as the activity's name.
    pub fn get_or_create_trip_activity(&self, trip_id: i64, activity: &Activity) -> AppResult<TripActivity> {
        let mut conn = self.conn()?;
        let tx = conn.transaction()?;
        let existing: Option<i64> = tx
            .query_row(
                "SELECT id FROM trip_activities WHERE trip_id = ?1 AND activity_id = ?2",
                params![trip_id, activity.id],
                |row| row.get(0),
            )
            .optional()?;
        let id = match existing {
            Some(id) => id,
            None => {
                let now = now_rfc3339();
                tx.execute(
                    "INSERT INTO trip_activities (trip_id, activity_id, name, priority, comments, created_at, updated_at)
                     VALUES (?1, ?2, ?3, ?4, '', ?5, ?5)",
                    params![trip_id, activity.id, activity.name, UNSET_PRIORITY, now],
                )?;
                let id = tx.last_insert_rowid();
                tracing::info!(trip_id, activity_id = activity.id, trip_activity_id = id, "activity added to trip");
                id
            }
        };
        let trip_activity = load_trip_activity(&tx, id)?
            .ok_or_else(|| AppError::not_found(EntityKind::Activity, id))?;
        tx.commit()?;
        Ok(trip_activity)
    }

    pub fn get_trip_activity(&self, trip_activity_id: i64) -> AppResult<Option<TripActivity>> {
        let conn = self.conn()?;
        load_trip_activity(&conn, trip_activity_id)
    }

    /// Every activity of the trip ordered by priority (unset last), then name.
    pub fn list_trip_activities(&self, trip_id: i64) -> AppResult<Vec<TripActivity>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {TRIP_ACTIVITY_COLUMNS} FROM trip_activities ta
             WHERE ta.trip_id = ?1 ORDER BY ta.priority ASC, ta.name ASC, ta.id ASC"
        ))?;
        let mut activities = stmt
            .query_map([trip_id], parse_trip_activity_row)?
            .collect::<Result<Vec<_>, _>>()?;

        let mut tags = load_trip_tags(&conn, trip_id)?;
        for activity in &mut activities {
            activity.tags = tags.remove(&activity.id).unwrap_or_default();
        }
        Ok(activities)
    }

    pub fn update_trip_activity(
        &self,
        trip_activity_id: i64,
        update: &TripActivityUpdate,
    ) -> AppResult<TripActivity> {
        let mut conn = self.conn()?;
        let tx = conn.transaction()?;
        let touched = tx.execute(
            "UPDATE trip_activities SET updated_at = ?1 WHERE id = ?2",
            params![now_rfc3339(), trip_activity_id],
        )?;
        if touched == 0 {
            return Err(AppError::not_found(EntityKind::Activity, trip_activity_id));
        }
        if let Some(name) = &update.name {
            tx.execute(
                "UPDATE trip_activities SET name = ?1 WHERE id = ?2",
                params![name, trip_activity_id],
            )?;
        }
        if let Some(comments) = &update.comments {
            tx.execute(
                "UPDATE trip_activities SET comments = ?1 WHERE id = ?2",
                params![comments, trip_activity_id],
            )?;
        }
        let updated = load_trip_activity(&tx, trip_activity_id)?
            .ok_or_else(|| AppError::not_found(EntityKind::Activity, trip_activity_id))?;
        tx.commit()?;
        Ok(updated)
    }

    /// Removes the trip activity with its intervals and tag links. The catalog
    /// activity it points at stays. Returns the number of intervals removed.
    pub fn delete_trip_activity(&self, trip_activity_id: i64) -> AppResult<usize> {
        let mut conn = self.conn()?;
        let tx = conn.transaction()?;
        let intervals = tx.execute(
            "DELETE FROM time_intervals WHERE trip_activity_id = ?1",
            [trip_activity_id],
        )?;
        tx.execute(
            "DELETE FROM trip_activity_tags WHERE trip_activity_id = ?1",
            [trip_activity_id],
        )?;
        tx.execute("DELETE FROM trip_activities WHERE id = ?1", [trip_activity_id])?;
        tx.commit()?;
        Ok(intervals)
    }

    /// Returns false when the tag was already attached.
    pub fn attach_tag(&self, trip_activity_id: i64, tag_id: i64) -> AppResult<bool> {
        let conn = self.conn()?;
        let inserted = conn.execute(
            "INSERT OR IGNORE INTO trip_activity_tags (trip_activity_id, tag_id) VALUES (?1, ?2)",
            params![trip_activity_id, tag_id],
        )?;
        Ok(inserted > 0)
    }

    /// Returns false when the tag was not attached.
    pub fn detach_tag(&self, trip_activity_id: i64, tag_id: i64) -> AppResult<bool> {
        let conn = self.conn()?;
        let removed = conn.execute(
            "DELETE FROM trip_activity_tags WHERE trip_activity_id = ?1 AND tag_id = ?2",
            params![trip_activity_id, tag_id],
        )?;
        Ok(removed > 0)
    }

    /// Writes every assignment or none of them.
    pub fn apply_priorities(&self, assignments: &[PriorityAssignment]) -> AppResult<usize> {
        if assignments.is_empty() {
            return Ok(0);
        }
        let now = now_rfc3339();
        let mut conn = self.conn()?;
        let tx = conn.transaction()?;
        let mut affected = 0usize;
        for assignment in assignments {
            let changed = tx.execute(
                "UPDATE trip_activities SET priority = ?1, updated_at = ?2 WHERE id = ?3",
                params![assignment.priority, now, assignment.trip_activity_id],
            )?;
            if changed == 0 {
                return Err(AppError::not_found(EntityKind::Activity, assignment.trip_activity_id));
            }
            affected += changed;
        }
        tx.commit()?;
        Ok(affected)
    }

    pub fn create_time_interval(&self, draft: &IntervalDraft) -> AppResult<TimeInterval> {
        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO time_intervals (day_id, trip_activity_id, start_time, end_time, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                draft.day_id,
                draft.trip_activity_id,
                draft.start_time,
                draft.end_time,
                now_rfc3339()
            ],
        )?;
        let id = conn.last_insert_rowid();
        conn.query_row(
            &format!("SELECT {INTERVAL_COLUMNS} FROM time_intervals ti WHERE ti.id = ?1"),
            [id],
            parse_interval_row,
        )
        .map_err(AppError::from)
    }

    pub fn list_day_intervals(&self, day_id: i64) -> AppResult<Vec<TimeInterval>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {INTERVAL_COLUMNS} FROM time_intervals ti WHERE ti.day_id = ?1
             ORDER BY ti.start_time ASC, ti.id ASC"
        ))?;
        let intervals = stmt
            .query_map([day_id], parse_interval_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(intervals)
    }

    /// The interval, provided it sits on one of the trip's days.
    pub fn find_trip_interval(&self, trip_id: i64, interval_id: i64) -> AppResult<Option<TimeInterval>> {
        let conn = self.conn()?;
        conn.query_row(
            &format!(
                "SELECT {INTERVAL_COLUMNS} FROM time_intervals ti
                 JOIN days d ON d.id = ti.day_id
                 WHERE ti.id = ?1 AND d.trip_id = ?2"
            ),
            params![interval_id, trip_id],
            parse_interval_row,
        )
        .optional()
        .map_err(AppError::from)
    }

    pub fn delete_time_interval(&self, interval_id: i64) -> AppResult<bool> {
        let conn = self.conn()?;
        let removed = conn.execute("DELETE FROM time_intervals WHERE id = ?1", [interval_id])?;
        Ok(removed > 0)
    }

    /// Day orders each trip activity is scheduled on.
    pub fn scheduled_day_orders(&self, trip_id: i64) -> AppResult<HashMap<i64, Vec<u32>>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT ti.trip_activity_id, d.day_order FROM time_intervals ti
             JOIN days d ON d.id = ti.day_id
             WHERE d.trip_id = ?1 ORDER BY d.day_order ASC",
        )?;
        let mut rows = stmt.query([trip_id])?;
        let mut scheduled: HashMap<i64, Vec<u32>> = HashMap::new();
        while let Some(row) = rows.next()? {
            scheduled
                .entry(row.get(0)?)
                .or_default()
                .push(row.get(1)?);
        }
        Ok(scheduled)
    }

    /// The trip's days with their intervals, earliest first, all-day entries leading.
    pub fn day_schedules(&self, trip_id: i64) -> AppResult<Vec<DaySchedule>> {
        let conn = self.conn()?;
        let days = trips::load_days(&conn, trip_id)?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {INTERVAL_COLUMNS}, ta.name FROM time_intervals ti
             JOIN days d ON d.id = ti.day_id
             JOIN trip_activities ta ON ta.id = ti.trip_activity_id
             WHERE d.trip_id = ?1
             ORDER BY ti.start_time ASC, ti.id ASC"
        ))?;
        let mut by_day: HashMap<i64, Vec<ScheduledEntry>> = HashMap::new();
        let entries = stmt.query_map([trip_id], |row| {
            Ok(ScheduledEntry {
                interval: parse_interval_row(row)?,
                trip_activity_name: row.get(6)?,
            })
        })?;
        for entry in entries {
            let entry = entry?;
            by_day.entry(entry.interval.day_id).or_default().push(entry);
        }

        Ok(days
            .into_iter()
            .map(|day| DaySchedule {
                entries: by_day.remove(&day.id).unwrap_or_default(),
                day,
            })
            .collect())
    }

    /// Trip activities of `trip_id` among `ids`, in the order of `ids`.
    pub fn trip_activities_by_ids(&self, trip_id: i64, ids: &[i64]) -> AppResult<Vec<TripActivity>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let conn = self.conn()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {TRIP_ACTIVITY_COLUMNS} FROM trip_activities ta
             WHERE ta.trip_id = ? AND ta.id IN ({})",
            placeholders(ids.len())
        ))?;
        let mut values: Vec<&dyn rusqlite::ToSql> = vec![&trip_id];
        values.extend(ids.iter().map(|id| id as &dyn rusqlite::ToSql));
        let mut found: HashMap<i64, TripActivity> = stmt
            .query_map(rusqlite::params_from_iter(values), parse_trip_activity_row)?
            .map(|row| row.map(|activity| (activity.id, activity)))
            .collect::<Result<_, _>>()?;

        let mut tags = load_trip_tags(&conn, trip_id)?;
        Ok(ids
            .iter()
            .filter_map(|id| found.remove(id))
            .map(|mut activity| {
                activity.tags = tags.remove(&activity.id).unwrap_or_default();
                activity
            })
            .collect())
    }
}

fn load_trip_activity(conn: &Connection, trip_activity_id: i64) -> AppResult<Option<TripActivity>> {
    let Some(mut activity) = conn
        .query_row(
            &format!("SELECT {TRIP_ACTIVITY_COLUMNS} FROM trip_activities ta WHERE ta.id = ?1"),
            [trip_activity_id],
            parse_trip_activity_row,
        )
        .optional()?
    else {
        return Ok(None);
    };

    let mut stmt = conn.prepare(
        "SELECT t.id, t.user_id, t.name, t.created_at, t.updated_at FROM trip_activity_tags tat
         JOIN tags t ON t.id = tat.tag_id
         WHERE tat.trip_activity_id = ?1 ORDER BY t.name ASC",
    )?;
    activity.tags = stmt
        .query_map([trip_activity_id], parse_tag_row)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(Some(activity))
}

fn load_trip_tags(conn: &Connection, trip_id: i64) -> AppResult<HashMap<i64, Vec<Tag>>> {
    let mut stmt = conn.prepare(
        "SELECT tat.trip_activity_id, t.id, t.user_id, t.name, t.created_at, t.updated_at
         FROM trip_activity_tags tat
         JOIN tags t ON t.id = tat.tag_id
         JOIN trip_activities ta ON ta.id = tat.trip_activity_id
         WHERE ta.trip_id = ?1 ORDER BY t.name ASC",
    )?;
    let mut rows = stmt.query([trip_id])?;
    let mut tags: HashMap<i64, Vec<Tag>> = HashMap::new();
    while let Some(row) = rows.next()? {
        let trip_activity_id: i64 = row.get(0)?;
        let tag = Tag {
            id: row.get(1)?,
            user_id: row.get(2)?,
            name: row.get(3)?,
            created_at: parse_time(&row.get::<_, String>(4)?)?,
            updated_at: parse_time(&row.get::<_, String>(5)?)?,
        };
        tags.entry(trip_activity_id).or_default().push(tag);
    }
    Ok(tags)
}

fn parse_trip_activity_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<TripActivity> {
    Ok(TripActivity {
        id: row.get(0)?,
        trip_id: row.get(1)?,
        activity_id: row.get(2)?,
        name: row.get(3)?,
        priority: row.get(4)?,
        comments: row.get(5)?,
        tags: Vec::new(),
        created_at: parse_time(&row.get::<_, String>(6)?)?,
        updated_at: parse_time(&row.get::<_, String>(7)?)?,
    })
}

fn parse_interval_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<TimeInterval> {
    Ok(TimeInterval {
        id: row.get(0)?,
        day_id: row.get(1)?,
        trip_activity_id: row.get(2)?,
        start_time: row.get(3)?,
        end_time: row.get(4)?,
        created_at: parse_time(&row.get::<_, String>(5)?)?,
    })
}

#[cfg(test)]
mod tests {
    use crate::db::{test_database, Database};
    use crate::errors::EntityKind;
    use crate::models::{Activity, NewTripPayload, Trip, TripActivityUpdate, UserActivityDraft, UNSET_PRIORITY};
    use crate::ordering::PriorityAssignment;
    use crate::scheduler::IntervalDraft;
    use chrono::NaiveTime;

    fn setup(db: &Database) -> (i64, Trip) {
        let user = db.create_user("ana", "Ana").expect("user");
        let trip = db
            .create_trip(
                user.id,
                &NewTripPayload {
                    name: "Lisbon".to_string(),
                    duration: Some(3),
                    start_date: None,
                },
                7,
            )
            .expect("trip");
        (user.id, trip)
    }

    fn activity(db: &Database, user_id: i64, name: &str) -> Activity {
        db.get_or_create_user_activity(
            user_id,
            &UserActivityDraft {
                name: name.to_string(),
                ..UserActivityDraft::default()
            },
        )
        .expect("activity")
    }

    #[test]
    fn updating_a_missing_trip_activity_is_not_found() {
        let (_dir, db) = test_database();
        setup(&db);
        let error = db
            .update_trip_activity(
                404,
                &TripActivityUpdate {
                    comments: Some("closed on Mondays".to_string()),
                    ..TripActivityUpdate::default()
                },
            )
            .expect_err("missing");
        assert!(error.is_not_found(EntityKind::Activity));
    }

    #[test]
    fn trip_activity_is_created_once_per_pair() {
        let (_dir, db) = test_database();
        let (user_id, trip) = setup(&db);
        let tram = activity(&db, user_id, "Tram 28");

        let first = db.get_or_create_trip_activity(trip.id, &tram).expect("first");
        let second = db.get_or_create_trip_activity(trip.id, &tram).expect("second");
        assert_eq!(first.id, second.id);
        assert_eq!(first.name, "Tram 28");
        assert_eq!(first.priority, UNSET_PRIORITY);
        assert_eq!(db.list_trip_activities(trip.id).expect("list").len(), 1);
    }

    #[test]
    fn listing_orders_by_priority_then_name() {
        let (_dir, db) = test_database();
        let (user_id, trip) = setup(&db);
        let b = db
            .get_or_create_trip_activity(trip.id, &activity(&db, user_id, "b"))
            .expect("b");
        let a = db
            .get_or_create_trip_activity(trip.id, &activity(&db, user_id, "a"))
            .expect("a");
        let c = db
            .get_or_create_trip_activity(trip.id, &activity(&db, user_id, "c"))
            .expect("c");

        db.apply_priorities(&[PriorityAssignment {
            trip_activity_id: c.id,
            priority: 1,
        }])
        .expect("priorities");
        let ids: Vec<i64> = db
            .list_trip_activities(trip.id)
            .expect("list")
            .iter()
            .map(|activity| activity.id)
            .collect();
        assert_eq!(ids, vec![c.id, a.id, b.id]);
    }

    #[test]
    fn failed_priority_batch_writes_nothing() {
        let (_dir, db) = test_database();
        let (user_id, trip) = setup(&db);
        let a = db
            .get_or_create_trip_activity(trip.id, &activity(&db, user_id, "a"))
            .expect("a");

        let result = db.apply_priorities(&[
            PriorityAssignment {
                trip_activity_id: a.id,
                priority: 1,
            },
            PriorityAssignment {
                trip_activity_id: 9_999,
                priority: 2,
            },
        ]);
        assert!(result.is_err());
        let stored = db.get_trip_activity(a.id).expect("get").expect("exists");
        assert_eq!(stored.priority, UNSET_PRIORITY);
    }

    #[test]
    fn tags_attach_and_detach_idempotently() {
        let (_dir, db) = test_database();
        let (user_id, trip) = setup(&db);
        let tag = db.create_tag(user_id, "rainy day").expect("tag");
        let tram = db
            .get_or_create_trip_activity(trip.id, &activity(&db, user_id, "Tram 28"))
            .expect("tram");

        assert!(db.attach_tag(tram.id, tag.id).expect("attach"));
        assert!(!db.attach_tag(tram.id, tag.id).expect("attach again"));
        let listed = db.list_trip_activities(trip.id).expect("list");
        assert_eq!(listed[0].tags.len(), 1);

        assert!(db.detach_tag(tram.id, tag.id).expect("detach"));
        assert!(!db.detach_tag(tram.id, tag.id).expect("detach again"));
    }

    #[test]
    fn intervals_follow_days_and_trip_activities() {
        let (_dir, db) = test_database();
        let (user_id, trip) = setup(&db);
        let tram = db
            .get_or_create_trip_activity(trip.id, &activity(&db, user_id, "Tram 28"))
            .expect("tram");
        let day_three = db.find_day(trip.id, 3).expect("lookup").expect("day 3");
        let day_one = db.find_day(trip.id, 1).expect("lookup").expect("day 1");

        let timed = db
            .create_time_interval(&IntervalDraft {
                day_id: day_three.id,
                trip_activity_id: tram.id,
                start_time: NaiveTime::from_hms_opt(8, 0, 0),
                end_time: NaiveTime::from_hms_opt(17, 30, 0),
            })
            .expect("timed");
        assert_eq!(timed.end_time, NaiveTime::from_hms_opt(17, 30, 0));
        db.create_time_interval(&IntervalDraft {
            day_id: day_one.id,
            trip_activity_id: tram.id,
            start_time: None,
            end_time: None,
        })
        .expect("all day");

        let scheduled = db.scheduled_day_orders(trip.id).expect("scheduled");
        assert_eq!(scheduled.get(&tram.id), Some(&vec![1, 3]));

        let schedules = db.day_schedules(trip.id).expect("schedules");
        assert_eq!(schedules.len(), 3);
        assert_eq!(schedules[2].entries[0].trip_activity_name, "Tram 28");
        assert!(schedules[1].entries.is_empty());

        // Shrinking the trip drops day 3 together with its interval.
        db.update_trip(
            &trip,
            &crate::models::TripUpdate {
                duration: Some(2),
                ..Default::default()
            },
        )
        .expect("shrink");
        assert!(db.find_trip_interval(trip.id, timed.id).expect("lookup").is_none());
        assert_eq!(db.list_day_intervals(day_one.id).expect("day one").len(), 1);
    }

    #[test]
    fn deleting_trip_activity_keeps_catalog_activity() {
        let (_dir, db) = test_database();
        let (user_id, trip) = setup(&db);
        let tram = activity(&db, user_id, "Tram 28");
        let trip_activity = db.get_or_create_trip_activity(trip.id, &tram).expect("trip activity");
        let renamed = db
            .update_trip_activity(
                trip_activity.id,
                &TripActivityUpdate {
                    name: Some("Tram ride".to_string()),
                    comments: Some("sit on the left".to_string()),
                },
            )
            .expect("rename");
        assert_eq!(renamed.name, "Tram ride");
        assert_eq!(renamed.comments, "sit on the left");

        db.delete_trip_activity(trip_activity.id).expect("delete");
        assert!(db.get_trip_activity(trip_activity.id).expect("get").is_none());
        assert!(db.get_activity(tram.id).expect("catalog").is_some());
    }

    #[test]
    fn trip_activities_by_ids_keeps_requested_order_and_scope() {
        let (_dir, db) = test_database();
        let (user_id, trip) = setup(&db);
        let a = db
            .get_or_create_trip_activity(trip.id, &activity(&db, user_id, "a"))
            .expect("a");
        let b = db
            .get_or_create_trip_activity(trip.id, &activity(&db, user_id, "b"))
            .expect("b");

        let found = db
            .trip_activities_by_ids(trip.id, &[b.id, 12_345, a.id])
            .expect("lookup");
        let ids: Vec<i64> = found.iter().map(|activity| activity.id).collect();
        assert_eq!(ids, vec![b.id, a.id]);
    }
}
