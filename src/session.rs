use crate::errors::{AppError, AppResult, EntityKind};
use crate::models::{Trip, User};
use crate::search::Business;
use uuid::Uuid;

/// Context of one logged-in user. Created by login and dropped by logout;
/// every planner operation receives it explicitly.
#[derive(Debug, Clone)]
pub struct Session {
    pub session_id: String,
    pub user: User,
    trip: Option<Trip>,
    search_results: Vec<Business>,
    /// Trip activity ids produced by the last filter. `None` means every
    /// activity of the trip is active.
    active_activity_ids: Option<Vec<i64>>,
}

impl Session {
    pub fn open(user: User) -> Self {
        Self {
            session_id: Uuid::new_v4().to_string(),
            user,
            trip: None,
            search_results: Vec::new(),
            active_activity_ids: None,
        }
    }

    pub fn user_id(&self) -> i64 {
        self.user.id
    }

    pub fn trip(&self) -> Option<&Trip> {
        self.trip.as_ref()
    }

    pub fn require_trip(&self) -> AppResult<&Trip> {
        self.trip.as_ref().ok_or(AppError::NoActiveTrip)
    }

    /// Entering a trip resets the active list, which belongs to the old trip.
    pub fn enter_trip(&mut self, trip: Trip) {
        self.trip = Some(trip);
        self.active_activity_ids = None;
    }

    /// Refreshes the stored trip after an edit without touching the active list.
    pub fn refresh_trip(&mut self, trip: Trip) {
        if self.trip.as_ref().is_some_and(|current| current.id == trip.id) {
            self.trip = Some(trip);
        }
    }

    pub fn leave_trip(&mut self) -> Option<Trip> {
        self.active_activity_ids = None;
        self.trip.take()
    }

    pub fn search_results(&self) -> &[Business] {
        &self.search_results
    }

    pub fn replace_search_results(&mut self, results: Vec<Business>) {
        self.search_results = results;
    }

    pub fn search_result(&self, index: usize) -> AppResult<&Business> {
        self.search_results
            .get(index)
            .ok_or_else(|| AppError::not_found(EntityKind::SearchResult, index))
    }

    pub fn active_activity_ids(&self) -> Option<&[i64]> {
        self.active_activity_ids.as_deref()
    }

    pub fn set_active_activity_ids(&mut self, ids: Option<Vec<i64>>) {
        self.active_activity_ids = ids;
    }

    /// Drops a deleted trip activity from the active list.
    pub fn forget_activity(&mut self, trip_activity_id: i64) {
        if let Some(ids) = self.active_activity_ids.as_mut() {
            ids.retain(|id| *id != trip_activity_id);
        }
    }
}
