use super::{now_rfc3339, parse_time, trips, Database};
use crate::errors::{AppError, AppResult};
use crate::models::{DeleteSummary, Tag, User};
use crate::validation::Identifier;
use rusqlite::{params, Connection, OptionalExtension};

const USER_COLUMNS: &str = "id, username, name, created_at, updated_at";
const TAG_COLUMNS: &str = "id, user_id, name, created_at, updated_at";

impl Database {
    pub fn create_user(&self, username: &str, name: &str) -> AppResult<User> {
        let mut conn = self.conn()?;
        let tx = conn.transaction()?;
        if load_user_by_username(&tx, username)?.is_some() {
            return Err(AppError::DuplicateName(format!(
                "a user already exists with the username '{}', please try another",
                username
            )));
        }

        let now = now_rfc3339();
        tx.execute(
            "INSERT INTO users (username, name, created_at, updated_at) VALUES (?1, ?2, ?3, ?3)",
            params![username, name, now],
        )?;
        let id = tx.last_insert_rowid();
        let user = load_user(&tx, id)?
            .ok_or_else(|| AppError::Internal(format!("user {} vanished after insert", id)))?;
        tx.commit()?;
        Ok(user)
    }

    pub fn find_user_by_username(&self, username: &str) -> AppResult<Option<User>> {
        let conn = self.conn()?;
        load_user_by_username(&conn, username)
    }

    /// Removes the user with every trip, tag and user-created activity they own.
    pub fn delete_user(&self, user_id: i64) -> AppResult<DeleteSummary> {
        let mut conn = self.conn()?;
        let tx = conn.transaction()?;

        let trip_ids = {
            let mut stmt = tx.prepare("SELECT id FROM trips WHERE user_id = ?1")?;
            let ids = stmt
                .query_map([user_id], |row| row.get::<_, i64>(0))?
                .collect::<Result<Vec<_>, _>>()?;
            ids
        };
        let mut summary = DeleteSummary::default();
        for trip_id in trip_ids {
            let removed = trips::delete_trip_rows(&tx, trip_id)?;
            summary.days += removed.days;
            summary.trip_activities += removed.trip_activities;
            summary.time_intervals += removed.time_intervals;
        }

        // Owned catalog entries may still be linked from other users' trips.
        summary.time_intervals += tx.execute(
            "DELETE FROM time_intervals WHERE trip_activity_id IN (
               SELECT ta.id FROM trip_activities ta
               JOIN activities a ON a.id = ta.activity_id
               WHERE a.owner_user_id = ?1)",
            [user_id],
        )?;
        summary.trip_activities += tx.execute(
            "DELETE FROM trip_activities WHERE activity_id IN (
               SELECT id FROM activities WHERE owner_user_id = ?1)",
            [user_id],
        )?;
        tx.execute("DELETE FROM activities WHERE owner_user_id = ?1", [user_id])?;
        tx.execute("DELETE FROM tags WHERE user_id = ?1", [user_id])?;
        tx.execute("DELETE FROM users WHERE id = ?1", [user_id])?;
        tx.commit()?;
        Ok(summary)
    }

    pub fn create_tag(&self, user_id: i64, name: &str) -> AppResult<Tag> {
        let mut conn = self.conn()?;
        let tx = conn.transaction()?;
        ensure_tag_name_free(&tx, user_id, name)?;

        let now = now_rfc3339();
        tx.execute(
            "INSERT INTO tags (user_id, name, created_at, updated_at) VALUES (?1, ?2, ?3, ?3)",
            params![user_id, name, now],
        )?;
        let id = tx.last_insert_rowid();
        let tag = load_tag(&tx, id)?
            .ok_or_else(|| AppError::Internal(format!("tag {} vanished after insert", id)))?;
        tx.commit()?;
        Ok(tag)
    }

    /// Looks a tag up by name or id, only among `user_id`'s tags.
    pub fn find_tag(&self, user_id: i64, identifier: &Identifier) -> AppResult<Option<Tag>> {
        let conn = self.conn()?;
        let tag = match identifier {
            Identifier::Name(name) => conn
                .query_row(
                    &format!("SELECT {TAG_COLUMNS} FROM tags WHERE user_id = ?1 AND name = ?2"),
                    params![user_id, name],
                    parse_tag_row,
                )
                .optional()?,
            Identifier::Id(id) => load_tag(&conn, *id)?.filter(|tag| tag.user_id == user_id),
        };
        Ok(tag)
    }

    pub fn list_tags(&self, user_id: i64) -> AppResult<Vec<Tag>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {TAG_COLUMNS} FROM tags WHERE user_id = ?1 ORDER BY name ASC"
        ))?;
        let tags = stmt
            .query_map([user_id], parse_tag_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(tags)
    }

    pub fn rename_tag(&self, tag: &Tag, name: &str) -> AppResult<Tag> {
        let mut conn = self.conn()?;
        let tx = conn.transaction()?;
        if tag.name != name {
            ensure_tag_name_free(&tx, tag.user_id, name)?;
        }
        tx.execute(
            "UPDATE tags SET name = ?1, updated_at = ?2 WHERE id = ?3",
            params![name, now_rfc3339(), tag.id],
        )?;
        let renamed = load_tag(&tx, tag.id)?
            .ok_or_else(|| AppError::Internal(format!("tag {} vanished during rename", tag.id)))?;
        tx.commit()?;
        Ok(renamed)
    }

    /// Deletes the tag and returns how many activities lost it.
    pub fn delete_tag(&self, tag_id: i64) -> AppResult<usize> {
        let mut conn = self.conn()?;
        let tx = conn.transaction()?;
        let unlinked = tx.execute("DELETE FROM trip_activity_tags WHERE tag_id = ?1", [tag_id])?;
        tx.execute("DELETE FROM tags WHERE id = ?1", [tag_id])?;
        tx.commit()?;
        Ok(unlinked)
    }
}

fn ensure_tag_name_free(conn: &Connection, user_id: i64, name: &str) -> AppResult<()> {
    let exists: bool = conn.query_row(
        "SELECT EXISTS(SELECT 1 FROM tags WHERE user_id = ?1 AND name = ?2)",
        params![user_id, name],
        |row| row.get(0),
    )?;
    if exists {
        return Err(AppError::DuplicateName(format!(
            "the tag '{}' already exists, the name must be unique",
            name
        )));
    }
    Ok(())
}

fn load_user(conn: &Connection, user_id: i64) -> AppResult<Option<User>> {
    conn.query_row(
        &format!("SELECT {USER_COLUMNS} FROM users WHERE id = ?1"),
        [user_id],
        parse_user_row,
    )
    .optional()
    .map_err(AppError::from)
}

fn load_user_by_username(conn: &Connection, username: &str) -> AppResult<Option<User>> {
    conn.query_row(
        &format!("SELECT {USER_COLUMNS} FROM users WHERE username = ?1"),
        [username],
        parse_user_row,
    )
    .optional()
    .map_err(AppError::from)
}

pub(super) fn load_tag(conn: &Connection, tag_id: i64) -> AppResult<Option<Tag>> {
    conn.query_row(
        &format!("SELECT {TAG_COLUMNS} FROM tags WHERE id = ?1"),
        [tag_id],
        parse_tag_row,
    )
    .optional()
    .map_err(AppError::from)
}

fn parse_user_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<User> {
    Ok(User {
        id: row.get(0)?,
        username: row.get(1)?,
        name: row.get(2)?,
        created_at: parse_time(&row.get::<_, String>(3)?)?,
        updated_at: parse_time(&row.get::<_, String>(4)?)?,
    })
}

pub(super) fn parse_tag_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Tag> {
    Ok(Tag {
        id: row.get(0)?,
        user_id: row.get(1)?,
        name: row.get(2)?,
        created_at: parse_time(&row.get::<_, String>(3)?)?,
        updated_at: parse_time(&row.get::<_, String>(4)?)?,
    })
}
