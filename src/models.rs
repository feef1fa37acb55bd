use chrono::{DateTime, Duration, NaiveDate, NaiveTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};

/// Priority stored on trip activities that were never ordered. Sorts after every real priority.
pub const UNSET_PRIORITY: i64 = i64::MAX;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: i64,
    pub username: String,
    pub name: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Tag {
    pub id: i64,
    pub user_id: i64,
    pub name: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Trip {
    pub id: i64,
    pub user_id: i64,
    pub name: String,
    pub start_date: Option<NaiveDate>,
    pub duration: u32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Trip {
    pub fn end_date(&self) -> Option<NaiveDate> {
        let start = self.start_date?;
        if self.duration == 0 {
            return None;
        }
        start.checked_add_signed(Duration::days(i64::from(self.duration) - 1))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Day {
    pub id: i64,
    pub trip_id: i64,
    /// 1-based position within the trip.
    pub order: u32,
    pub date: Option<NaiveDate>,
    pub comments: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum Provenance {
    External { catalog_id: String },
    User { owner_id: i64 },
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Coordinate {
    pub latitude: f64,
    pub longitude: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(from = "(String, String)", into = "(String, String)")]
pub struct Category {
    pub name: String,
    pub search_name: String,
}

impl From<(String, String)> for Category {
    fn from((name, search_name): (String, String)) -> Self {
        Self { name, search_name }
    }
}

impl From<Category> for (String, String) {
    fn from(value: Category) -> Self {
        (value.name, value.search_name)
    }
}

/// Address block shared by catalog records and stored activities. Its fields
/// (minus neighborhoods and coordinate) form the natural key of a stored location.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(default)]
pub struct Location {
    pub address: Vec<String>,
    pub display_address: Vec<String>,
    pub city: String,
    pub postal_code: String,
    pub country_code: String,
    pub state_code: Option<String>,
    pub geo_accuracy: f64,
    pub neighborhoods: Vec<String>,
    pub coordinate: Option<Coordinate>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Activity {
    pub id: i64,
    pub name: String,
    pub provenance: Provenance,
    pub rating: f64,
    pub review_count: i64,
    pub phone: String,
    pub display_phone: String,
    pub description: String,
    pub location: Option<Location>,
    pub categories: Vec<Category>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct TripActivity {
    pub id: i64,
    pub trip_id: i64,
    pub activity_id: i64,
    pub name: String,
    pub priority: i64,
    pub comments: String,
    pub tags: Vec<Tag>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl TripActivity {
    pub fn has_priority(&self) -> bool {
        self.priority != UNSET_PRIORITY
    }

    pub fn has_tag(&self, tag_id: i64) -> bool {
        self.tags.iter().any(|tag| tag.id == tag_id)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct TimeInterval {
    pub id: i64,
    pub day_id: i64,
    pub trip_activity_id: i64,
    pub start_time: Option<NaiveTime>,
    pub end_time: Option<NaiveTime>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ScheduledEntry {
    pub interval: TimeInterval,
    pub trip_activity_name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct DaySchedule {
    pub day: Day,
    pub entries: Vec<ScheduledEntry>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "camelCase")]
pub struct DeleteSummary {
    pub days: usize,
    pub trip_activities: usize,
    pub time_intervals: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct NewTripPayload {
    pub name: String,
    pub duration: Option<u32>,
    pub start_date: Option<NaiveDate>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct TripUpdate {
    pub name: Option<String>,
    /// `Some(None)` clears the start date.
    #[serde(default, deserialize_with = "double_option")]
    pub start_date: Option<Option<NaiveDate>>,
    pub duration: Option<u32>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct UserActivityDraft {
    pub name: String,
    pub rating: Option<f64>,
    pub review_count: Option<i64>,
    #[serde(default)]
    pub phone: String,
    #[serde(default)]
    pub display_phone: String,
    #[serde(default)]
    pub description: String,
    pub location: Option<Location>,
    #[serde(default)]
    pub categories: Vec<Category>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct ActivityUpdate {
    pub name: Option<String>,
    pub rating: Option<f64>,
    pub review_count: Option<i64>,
    pub phone: Option<String>,
    pub display_phone: Option<String>,
    pub description: Option<String>,
    pub categories: Option<Vec<Category>>,
    pub location: Option<Location>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct TripActivityUpdate {
    pub name: Option<String>,
    pub comments: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct FilterRequest {
    /// Comma-separated tag names or ids.
    pub tags: Option<String>,
    /// `AND` or `OR`; `AND` when absent.
    pub operator: Option<String>,
    /// Comma-separated day orders.
    pub days: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlanRequest {
    pub trip_activity_id: i64,
    pub day: u32,
    pub start: Option<String>,
    pub end: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct StatusReport {
    pub session_id: String,
    pub username: String,
    pub name: String,
    pub trip: Option<String>,
}

fn double_option<'de, D, T>(deserializer: D) -> Result<Option<Option<T>>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    Option::<T>::deserialize(deserializer).map(Some)
}
