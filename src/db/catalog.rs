use super::{now_rfc3339, parse_time, Database};
use crate::catalog::{validate_rating, validate_review_count, ActivityField};
use crate::errors::{AppError, AppResult};
use crate::models::{Activity, ActivityUpdate, Category, Coordinate, Location, Provenance, UserActivityDraft};
use crate::search::Business;
use rusqlite::{params, Connection, OptionalExtension};

const ACTIVITY_COLUMNS: &str = "id, name, provenance, catalog_id, owner_user_id, rating, review_count, phone, display_phone, description, location_id, created_at, updated_at";
const DEFAULT_USER_RATING: f64 = 3.0;

impl Database {
    /// Returns the stored activity for the directory record, importing it
    /// together with its location and categories on first sight.
    pub fn get_or_create_external_activity(&self, business: &Business) -> AppResult<Activity> {
        let mut conn = self.conn()?;
        let tx = conn.transaction()?;
        let existing: Option<i64> = tx
            .query_row(
                "SELECT id FROM activities WHERE catalog_id = ?1",
                [&business.id],
                |row| row.get(0),
            )
            .optional()?;
        if let Some(id) = existing {
            let activity = load_activity(&tx, id)?;
            tx.commit()?;
            return Ok(activity);
        }

        validate_rating(business.rating)?;
        validate_review_count(business.review_count)?;
        let location_id = upsert_location(&tx, &business.location)?;
        let now = now_rfc3339();
        tx.execute(
            "INSERT INTO activities (
               name, provenance, catalog_id, owner_user_id, rating, review_count,
               phone, display_phone, description, location_id, created_at, updated_at
             ) VALUES (?1, 'external', ?2, NULL, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?9)",
            params![
                business.name,
                business.id,
                business.rating,
                business.review_count,
                business.phone,
                business.display_phone,
                business.snippet_text,
                location_id,
                now,
            ],
        )?;
        let id = tx.last_insert_rowid();
        link_categories(&tx, id, &business.categories)?;
        let activity = load_activity(&tx, id)?;
        tx.commit()?;

        tracing::info!(activity_id = id, catalog_id = %business.id, "imported catalog activity");
        Ok(activity)
    }

    /// User-created activities are keyed by (owner, name).
    pub fn get_or_create_user_activity(&self, owner_id: i64, draft: &UserActivityDraft) -> AppResult<Activity> {
        let mut conn = self.conn()?;
        let tx = conn.transaction()?;
        let existing: Option<i64> = tx
            .query_row(
                "SELECT id FROM activities WHERE owner_user_id = ?1 AND name = ?2",
                params![owner_id, draft.name],
                |row| row.get(0),
            )
            .optional()?;
        if let Some(id) = existing {
            let activity = load_activity(&tx, id)?;
            tx.commit()?;
            return Ok(activity);
        }

        let rating = draft.rating.unwrap_or(DEFAULT_USER_RATING);
        let review_count = draft.review_count.unwrap_or(0);
        validate_rating(rating)?;
        validate_review_count(review_count)?;
        let location_id = draft
            .location
            .as_ref()
            .map(|location| upsert_location(&tx, location))
            .transpose()?;
        let now = now_rfc3339();
        tx.execute(
            "INSERT INTO activities (
               name, provenance, catalog_id, owner_user_id, rating, review_count,
               phone, display_phone, description, location_id, created_at, updated_at
             ) VALUES (?1, 'user', NULL, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?9)",
            params![
                draft.name,
                owner_id,
                rating,
                review_count,
                draft.phone,
                draft.display_phone,
                draft.description,
                location_id,
                now,
            ],
        )?;
        let id = tx.last_insert_rowid();
        link_categories(&tx, id, &draft.categories)?;
        let activity = load_activity(&tx, id)?;
        tx.commit()?;

        tracing::info!(activity_id = id, owner_id, "created user activity");
        Ok(activity)
    }

    pub fn get_activity(&self, activity_id: i64) -> AppResult<Option<Activity>> {
        let conn = self.conn()?;
        let exists: bool = conn.query_row(
            "SELECT EXISTS(SELECT 1 FROM activities WHERE id = ?1)",
            [activity_id],
            |row| row.get(0),
        )?;
        if !exists {
            return Ok(None);
        }
        load_activity(&conn, activity_id).map(Some)
    }

    /// Writes the already-authorized `fields` of `update`.
    pub fn update_activity(
        &self,
        activity: &Activity,
        update: &ActivityUpdate,
        fields: &[ActivityField],
    ) -> AppResult<Activity> {
        let mut conn = self.conn()?;
        let tx = conn.transaction()?;
        if let Provenance::User { owner_id } = &activity.provenance {
            if let Some(name) = update.name.as_ref().filter(|_| fields.contains(&ActivityField::Name)) {
                let taken: bool = tx.query_row(
                    "SELECT EXISTS(SELECT 1 FROM activities WHERE owner_user_id = ?1 AND name = ?2 AND id != ?3)",
                    params![owner_id, name, activity.id],
                    |row| row.get(0),
                )?;
                if taken {
                    return Err(AppError::DuplicateName(format!(
                        "you already have an activity named '{}'",
                        name
                    )));
                }
            }
        }

        for field in fields {
            match field {
                ActivityField::Name => set_column(&tx, activity.id, "name", &update.name)?,
                ActivityField::Rating => set_column(&tx, activity.id, "rating", &update.rating)?,
                ActivityField::ReviewCount => set_column(&tx, activity.id, "review_count", &update.review_count)?,
                ActivityField::Phone => set_column(&tx, activity.id, "phone", &update.phone)?,
                ActivityField::DisplayPhone => set_column(&tx, activity.id, "display_phone", &update.display_phone)?,
                ActivityField::Description => set_column(&tx, activity.id, "description", &update.description)?,
                ActivityField::Categories => {
                    if let Some(categories) = &update.categories {
                        link_categories(&tx, activity.id, categories)?;
                    }
                }
                ActivityField::Location => {
                    if let Some(location) = &update.location {
                        let location_id = upsert_location(&tx, location)?;
                        tx.execute(
                            "UPDATE activities SET location_id = ?1 WHERE id = ?2",
                            params![location_id, activity.id],
                        )?;
                    }
                }
            }
        }
        tx.execute(
            "UPDATE activities SET updated_at = ?1 WHERE id = ?2",
            params![now_rfc3339(), activity.id],
        )?;
        let updated = load_activity(&tx, activity.id)?;
        tx.commit()?;
        Ok(updated)
    }
}

fn set_column<T: rusqlite::ToSql>(conn: &Connection, activity_id: i64, column: &str, value: &Option<T>) -> AppResult<()> {
    if let Some(value) = value {
        conn.execute(
            &format!("UPDATE activities SET {} = ?1 WHERE id = ?2", column),
            params![value, activity_id],
        )?;
    }
    Ok(())
}

fn load_activity(conn: &Connection, activity_id: i64) -> AppResult<Activity> {
    let (mut activity, location_id) = conn.query_row(
        &format!("SELECT {ACTIVITY_COLUMNS} FROM activities WHERE id = ?1"),
        [activity_id],
        parse_activity_row,
    )?;
    activity.location = location_id.map(|id| load_location(conn, id)).transpose()?;
    activity.categories = load_categories(conn, activity_id)?;
    Ok(activity)
}

fn parse_activity_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<(Activity, Option<i64>)> {
    let provenance = match row.get::<_, String>(2)?.as_str() {
        "external" => Provenance::External {
            catalog_id: row.get(3)?,
        },
        "user" => Provenance::User {
            owner_id: row.get(4)?,
        },
        other => return Err(super::conversion_error(format!("unknown provenance '{}'", other))),
    };
    let activity = Activity {
        id: row.get(0)?,
        name: row.get(1)?,
        provenance,
        rating: row.get(5)?,
        review_count: row.get(6)?,
        phone: row.get(7)?,
        display_phone: row.get(8)?,
        description: row.get(9)?,
        location: None,
        categories: Vec::new(),
        created_at: parse_time(&row.get::<_, String>(11)?)?,
        updated_at: parse_time(&row.get::<_, String>(12)?)?,
    };
    Ok((activity, row.get(10)?))
}

fn link_categories(conn: &Connection, activity_id: i64, categories: &[Category]) -> AppResult<()> {
    conn.execute("DELETE FROM activity_categories WHERE activity_id = ?1", [activity_id])?;
    for (position, category) in categories.iter().enumerate() {
        let category_id = upsert_category(conn, category)?;
        conn.execute(
            "INSERT OR IGNORE INTO activity_categories (activity_id, category_id, position) VALUES (?1, ?2, ?3)",
            params![activity_id, category_id, position as i64],
        )?;
    }
    Ok(())
}

fn load_categories(conn: &Connection, activity_id: i64) -> AppResult<Vec<Category>> {
    let mut stmt = conn.prepare(
        "SELECT c.name, c.search_name FROM activity_categories ac
         JOIN categories c ON c.id = ac.category_id
         WHERE ac.activity_id = ?1 ORDER BY ac.position ASC",
    )?;
    let categories = stmt
        .query_map([activity_id], |row| {
            Ok(Category {
                name: row.get(0)?,
                search_name: row.get(1)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(categories)
}

fn upsert_category(conn: &Connection, category: &Category) -> AppResult<i64> {
    conn.execute(
        "INSERT INTO categories (name, search_name) VALUES (?1, ?2)
         ON CONFLICT(name, search_name) DO NOTHING",
        params![category.name, category.search_name],
    )?;
    conn.query_row(
        "SELECT id FROM categories WHERE name = ?1 AND search_name = ?2",
        params![category.name, category.search_name],
        |row| row.get(0),
    )
    .map_err(AppError::from)
}

fn upsert_coordinate(conn: &Connection, coordinate: &Coordinate) -> AppResult<i64> {
    conn.execute(
        "INSERT INTO coordinates (latitude, longitude) VALUES (?1, ?2)
         ON CONFLICT(latitude, longitude) DO NOTHING",
        params![coordinate.latitude, coordinate.longitude],
    )?;
    conn.query_row(
        "SELECT id FROM coordinates WHERE latitude = ?1 AND longitude = ?2",
        params![coordinate.latitude, coordinate.longitude],
        |row| row.get(0),
    )
    .map_err(AppError::from)
}

fn upsert_country_code(conn: &Connection, code: &str) -> AppResult<i64> {
    conn.execute(
        "INSERT INTO country_codes (code) VALUES (?1) ON CONFLICT(code) DO NOTHING",
        [code],
    )?;
    conn.query_row("SELECT id FROM country_codes WHERE code = ?1", [code], |row| row.get(0))
        .map_err(AppError::from)
}

fn upsert_state_code(conn: &Connection, country_code_id: i64, code: &str) -> AppResult<i64> {
    conn.execute(
        "INSERT INTO state_codes (country_code_id, code) VALUES (?1, ?2)
         ON CONFLICT(country_code_id, code) DO NOTHING",
        params![country_code_id, code],
    )?;
    conn.query_row(
        "SELECT id FROM state_codes WHERE country_code_id = ?1 AND code = ?2",
        params![country_code_id, code],
        |row| row.get(0),
    )
    .map_err(AppError::from)
}

fn upsert_neighborhood(conn: &Connection, name: &str) -> AppResult<i64> {
    conn.execute(
        "INSERT INTO neighborhoods (name) VALUES (?1) ON CONFLICT(name) DO NOTHING",
        [name],
    )?;
    conn.query_row("SELECT id FROM neighborhoods WHERE name = ?1", [name], |row| row.get(0))
        .map_err(AppError::from)
}

/// Matches on the address fields; neighborhoods and coordinate ride along
/// only when the location is first stored.
fn upsert_location(conn: &Connection, location: &Location) -> AppResult<i64> {
    let address_json = serde_json::to_string(&location.address)?;
    let display_address_json = serde_json::to_string(&location.display_address)?;
    let country_code_id = upsert_country_code(conn, &location.country_code)?;
    let state_code_id = location
        .state_code
        .as_deref()
        .filter(|code| !code.is_empty())
        .map(|code| upsert_state_code(conn, country_code_id, code))
        .transpose()?;

    let existing: Option<i64> = conn
        .query_row(
            "SELECT id FROM locations
             WHERE address_json = ?1 AND display_address_json = ?2 AND city = ?3 AND postal_code = ?4
               AND country_code_id = ?5 AND state_code_id IS ?6 AND geo_accuracy = ?7",
            params![
                address_json,
                display_address_json,
                location.city,
                location.postal_code,
                country_code_id,
                state_code_id,
                location.geo_accuracy,
            ],
            |row| row.get(0),
        )
        .optional()?;
    if let Some(id) = existing {
        return Ok(id);
    }

    let coordinate_id = location
        .coordinate
        .as_ref()
        .map(|coordinate| upsert_coordinate(conn, coordinate))
        .transpose()?;
    conn.execute(
        "INSERT INTO locations (
           address_json, display_address_json, city, postal_code, country_code_id,
           state_code_id, geo_accuracy, coordinate_id
         ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
        params![
            address_json,
            display_address_json,
            location.city,
            location.postal_code,
            country_code_id,
            state_code_id,
            location.geo_accuracy,
            coordinate_id,
        ],
    )?;
    let location_id = conn.last_insert_rowid();
    for neighborhood in &location.neighborhoods {
        let neighborhood_id = upsert_neighborhood(conn, neighborhood)?;
        conn.execute(
            "INSERT OR IGNORE INTO location_neighborhoods (location_id, neighborhood_id) VALUES (?1, ?2)",
            params![location_id, neighborhood_id],
        )?;
    }
    Ok(location_id)
}

fn parse_address(raw: &str) -> rusqlite::Result<Vec<String>> {
    serde_json::from_str(raw).map_err(|error| super::conversion_error(format!("invalid address json: {}", error)))
}

fn load_location(conn: &Connection, location_id: i64) -> AppResult<Location> {
    let mut location = conn.query_row(
        "SELECT l.address_json, l.display_address_json, l.city, l.postal_code, cc.code, sc.code,
                l.geo_accuracy, co.latitude, co.longitude
         FROM locations l
         JOIN country_codes cc ON cc.id = l.country_code_id
         LEFT JOIN state_codes sc ON sc.id = l.state_code_id
         LEFT JOIN coordinates co ON co.id = l.coordinate_id
         WHERE l.id = ?1",
        [location_id],
        |row| {
            let latitude: Option<f64> = row.get(7)?;
            let longitude: Option<f64> = row.get(8)?;
            Ok(Location {
                address: parse_address(&row.get::<_, String>(0)?)?,
                display_address: parse_address(&row.get::<_, String>(1)?)?,
                city: row.get(2)?,
                postal_code: row.get(3)?,
                country_code: row.get(4)?,
                state_code: row.get(5)?,
                geo_accuracy: row.get(6)?,
                neighborhoods: Vec::new(),
                coordinate: latitude
                    .zip(longitude)
                    .map(|(latitude, longitude)| Coordinate { latitude, longitude }),
            })
        },
    )?;

    let mut stmt = conn.prepare(
        "SELECT n.name FROM location_neighborhoods ln
         JOIN neighborhoods n ON n.id = ln.neighborhood_id
         WHERE ln.location_id = ?1 ORDER BY n.name ASC",
    )?;
    location.neighborhoods = stmt
        .query_map([location_id], |row| row.get(0))?
        .collect::<Result<Vec<String>, _>>()?;
    Ok(location)
}
