use crate::catalog::authorize_update;
use crate::config::PlannerConfig;
use crate::db::Database;
use crate::errors::{AppError, AppResult, EntityKind};
use crate::filter::{filter_by_days, filter_by_tags, parse_day_expression, parse_tag_expression, TagOperator};
use crate::lifecycle::check_duration;
use crate::models::{
    Activity, ActivityUpdate, Day, DaySchedule, DeleteSummary, FilterRequest, NewTripPayload, PlanRequest,
    StatusReport, Tag, TimeInterval, Trip, TripActivity, TripActivityUpdate, TripUpdate, User, UserActivityDraft,
};
use crate::ordering::{plan_reorder, sort_activities};
use crate::scheduler::{draft_interval, overlapping, parse_time_range};
use crate::search::{CatalogSearch, SearchCacheEntry, SearchQuery};
use crate::session::Session;
use crate::validation::{check_display_name, check_entity_name, check_tag_name, check_username, Identifier};

/// Every planner operation. Stateless apart from the store; per-user context
/// travels in the `Session` handed to each call.
pub struct PlannerCore {
    db: Database,
    catalog: Box<dyn CatalogSearch>,
    config: PlannerConfig,
}

impl PlannerCore {
    pub fn new(config: PlannerConfig, catalog: Box<dyn CatalogSearch>) -> AppResult<Self> {
        let db = Database::new(&config.database_path())?;
        Ok(Self::with_database(db, catalog, config))
    }

    pub fn with_database(db: Database, catalog: Box<dyn CatalogSearch>, config: PlannerConfig) -> Self {
        Self { db, catalog, config }
    }

    pub fn database(&self) -> &Database {
        &self.db
    }

    // Accounts

    pub fn create_user(&self, username: &str, name: &str) -> AppResult<User> {
        check_username(username)?;
        check_display_name(name)?;
        let user = self.db.create_user(username, name)?;
        tracing::info!(user_id = user.id, username = %user.username, "user created");
        Ok(user)
    }

    pub fn login(&self, username: &str) -> AppResult<Session> {
        let user = self
            .db
            .find_user_by_username(username)?
            .ok_or_else(|| AppError::not_found(EntityKind::User, username))?;
        let session = Session::open(user);
        tracing::info!(user_id = session.user_id(), session_id = %session.session_id, "logged in");
        Ok(session)
    }

    /// Only the logged-in user can delete their own account.
    pub fn delete_user(&self, session: &Session, username: &str) -> AppResult<DeleteSummary> {
        if session.user.username != username {
            return Err(AppError::PermissionDenied(format!(
                "you can only delete your own account, not '{}'",
                username
            )));
        }
        let summary = self.db.delete_user(session.user_id())?;
        tracing::info!(
            user_id = session.user_id(),
            days = summary.days,
            trip_activities = summary.trip_activities,
            "user deleted"
        );
        Ok(summary)
    }

    pub fn status(&self, session: &Session) -> StatusReport {
        StatusReport {
            session_id: session.session_id.clone(),
            username: session.user.username.clone(),
            name: session.user.name.clone(),
            trip: session.trip().map(|trip| trip.name.clone()),
        }
    }

    // Tags

    pub fn create_tag(&self, session: &Session, name: &str) -> AppResult<Tag> {
        check_new_tag_name(name)?;
        let tag = self.db.create_tag(session.user_id(), name)?;
        tracing::info!(tag_id = tag.id, "tag created");
        Ok(tag)
    }

    pub fn rename_tag(&self, session: &Session, tag: &str, name: &str) -> AppResult<Tag> {
        check_new_tag_name(name)?;
        let existing = self.resolve_tag(session, tag)?;
        self.db.rename_tag(&existing, name)
    }

    /// Returns how many trip activities lost the tag.
    pub fn delete_tag(&self, session: &Session, tag: &str) -> AppResult<usize> {
        let existing = self.resolve_tag(session, tag)?;
        let unlinked = self.db.delete_tag(existing.id)?;
        tracing::info!(tag_id = existing.id, unlinked, "tag deleted");
        Ok(unlinked)
    }

    pub fn list_tags(&self, session: &Session) -> AppResult<Vec<Tag>> {
        self.db.list_tags(session.user_id())
    }

    /// Attaches a tag to a trip activity of the current trip. With `force` an
    /// unknown tag name is created first.
    pub fn tag_activity(
        &self,
        session: &Session,
        trip_activity_id: i64,
        tag: &str,
        force: bool,
    ) -> AppResult<TripActivity> {
        let trip_activity = self.current_trip_activity(session, trip_activity_id)?;
        let identifier = Identifier::parse(tag)?;
        let tag = match (self.db.find_tag(session.user_id(), &identifier)?, &identifier) {
            (Some(found), _) => found,
            (None, Identifier::Name(name)) if force => self.create_tag(session, name)?,
            (None, _) => return Err(AppError::not_found(EntityKind::Tag, &identifier)),
        };
        if !self.db.attach_tag(trip_activity.id, tag.id)? {
            tracing::debug!(trip_activity_id, tag_id = tag.id, "tag already attached");
        }
        self.reload_trip_activity(trip_activity.id)
    }

    pub fn untag_activity(&self, session: &Session, trip_activity_id: i64, tag: &str) -> AppResult<TripActivity> {
        let trip_activity = self.current_trip_activity(session, trip_activity_id)?;
        let tag = self.resolve_tag(session, tag)?;
        if !self.db.detach_tag(trip_activity.id, tag.id)? {
            tracing::debug!(trip_activity_id, tag_id = tag.id, "tag was not attached");
        }
        self.reload_trip_activity(trip_activity.id)
    }

    // Trips and days

    pub fn create_trip(&self, session: &Session, payload: &NewTripPayload) -> AppResult<Trip> {
        check_entity_name(&payload.name)?;
        let duration = payload.duration.unwrap_or(self.config.default_trip_duration);
        check_duration(duration, self.config.max_trip_duration)?;
        self.db
            .create_trip(session.user_id(), payload, self.config.default_trip_duration)
    }

    pub fn edit_trip(&self, session: &mut Session, trip: &str, update: &TripUpdate) -> AppResult<Trip> {
        if let Some(name) = &update.name {
            check_entity_name(name)?;
        }
        if let Some(duration) = update.duration {
            check_duration(duration, self.config.max_trip_duration)?;
        }
        let existing = self.resolve_trip(session, trip)?;
        let updated = self.db.update_trip(&existing, update)?;
        session.refresh_trip(updated.clone());
        Ok(updated)
    }

    /// Deletes a trip; leaving it first when it is the current one.
    pub fn delete_trip(&self, session: &mut Session, trip: &str) -> AppResult<DeleteSummary> {
        let existing = self.resolve_trip(session, trip)?;
        let summary = self.db.delete_trip(existing.id)?;
        if session.trip().is_some_and(|current| current.id == existing.id) {
            session.leave_trip();
        }
        Ok(summary)
    }

    pub fn list_trips(&self, session: &Session) -> AppResult<Vec<Trip>> {
        self.db.list_trips(session.user_id())
    }

    pub fn goto_trip(&self, session: &mut Session, trip: &str) -> AppResult<Trip> {
        let found = self.resolve_trip(session, trip)?;
        tracing::info!(trip_id = found.id, session_id = %session.session_id, "entered trip");
        session.enter_trip(found.clone());
        Ok(found)
    }

    pub fn leave_trip(&self, session: &mut Session) -> AppResult<Trip> {
        session.leave_trip().ok_or(AppError::NoActiveTrip)
    }

    pub fn list_days(&self, session: &Session) -> AppResult<Vec<DaySchedule>> {
        let trip = session.require_trip()?;
        self.db.day_schedules(trip.id)
    }

    pub fn comment_day(&self, session: &Session, order: u32, comments: &str) -> AppResult<Day> {
        let trip = session.require_trip()?;
        let day = self.current_day(trip, order)?;
        self.db.set_day_comments(day.id, comments)?;
        self.current_day(trip, order)
    }

    // Search and catalog

    /// Runs a directory search; the results replace the session's cache.
    pub fn search(&self, session: &mut Session, query: &SearchQuery) -> AppResult<Vec<SearchCacheEntry>> {
        let mut query = query.clone();
        if query.lang.is_none() {
            query.lang = Some(self.config.default_search_language.clone());
        }
        tracing::debug!(params = ?query.to_params(&self.config.default_search_language), "catalog search");

        let results = self.catalog.search(&query).map_err(|error| match error {
            AppError::ExternalService(_) => error,
            other => AppError::ExternalService(other.to_string()),
        })?;
        tracing::info!(results = results.len(), "catalog search finished");
        session.replace_search_results(results);
        Ok(self.list_search_cache(session))
    }

    pub fn list_search_cache(&self, session: &Session) -> Vec<SearchCacheEntry> {
        SearchCacheEntry::list(session.search_results())
    }

    /// Adds the cached search result at `index` to the current trip.
    pub fn add_activity(&self, session: &Session, index: usize) -> AppResult<TripActivity> {
        let trip = session.require_trip()?;
        let business = session.search_result(index)?;
        let activity = self.db.get_or_create_external_activity(business)?;
        self.db.get_or_create_trip_activity(trip.id, &activity)
    }

    pub fn create_activity(&self, session: &Session, draft: &UserActivityDraft) -> AppResult<TripActivity> {
        let trip = session.require_trip()?;
        check_display_name(&draft.name)?;
        let activity = self.db.get_or_create_user_activity(session.user_id(), draft)?;
        self.db.get_or_create_trip_activity(trip.id, &activity)
    }

    pub fn edit_activity(&self, session: &Session, activity_id: i64, update: &ActivityUpdate) -> AppResult<Activity> {
        if let Some(name) = &update.name {
            check_display_name(name)?;
        }
        let activity = self
            .db
            .get_activity(activity_id)?
            .ok_or_else(|| AppError::not_found(EntityKind::Activity, activity_id))?;
        let fields = authorize_update(&activity, session.user_id(), update)?;
        if fields.is_empty() {
            return Ok(activity);
        }
        let updated = self.db.update_activity(&activity, update, &fields)?;
        tracing::info!(
            activity_id,
            fields = ?fields.iter().map(|field| field.as_str()).collect::<Vec<_>>(),
            "activity updated"
        );
        Ok(updated)
    }

    pub fn edit_trip_activity(
        &self,
        session: &Session,
        trip_activity_id: i64,
        update: &TripActivityUpdate,
    ) -> AppResult<TripActivity> {
        if let Some(name) = &update.name {
            check_display_name(name)?;
        }
        let trip_activity = self.current_trip_activity(session, trip_activity_id)?;
        self.db.update_trip_activity(trip_activity.id, update)
    }

    /// Removes an activity from the current trip. Returns how many time
    /// intervals went with it.
    pub fn delete_trip_activity(&self, session: &mut Session, trip_activity_id: i64) -> AppResult<usize> {
        let trip_activity = self.current_trip_activity(session, trip_activity_id)?;
        let intervals = self.db.delete_trip_activity(trip_activity.id)?;
        session.forget_activity(trip_activity.id);
        tracing::info!(trip_activity_id, intervals, "trip activity deleted");
        Ok(intervals)
    }

    pub fn list_activities(&self, session: &Session) -> AppResult<Vec<TripActivity>> {
        let trip = session.require_trip()?;
        self.db.list_trip_activities(trip.id)
    }

    // Filter, order, plan

    /// Tag pass then day pass. The result becomes the session's active list;
    /// a request with neither tags nor days resets it.
    pub fn filter(&self, session: &mut Session, request: &FilterRequest) -> AppResult<Vec<TripActivity>> {
        let operator = match request.operator.as_deref() {
            Some(raw) => TagOperator::parse(raw)?,
            None => TagOperator::default(),
        };
        let tag_refs = request
            .tags
            .as_deref()
            .map(parse_tag_expression)
            .transpose()?;
        let day_orders = request
            .days
            .as_deref()
            .map(parse_day_expression)
            .transpose()?;

        let trip_id = session.require_trip()?.id;
        let mut activities = self.db.list_trip_activities(trip_id)?;
        if tag_refs.is_none() && day_orders.is_none() {
            session.set_active_activity_ids(None);
            return Ok(activities);
        }

        if let Some(refs) = tag_refs {
            let tags = refs
                .iter()
                .map(|identifier| {
                    self.db
                        .find_tag(session.user_id(), identifier)?
                        .ok_or_else(|| AppError::not_found(EntityKind::Tag, identifier))
                })
                .collect::<AppResult<Vec<_>>>()?;
            activities = filter_by_tags(activities, &tags, operator);
        }
        if let Some(days) = day_orders {
            let scheduled = self.db.scheduled_day_orders(trip_id)?;
            activities = filter_by_days(activities, &days, &scheduled);
        }

        tracing::debug!(trip_id, matched = activities.len(), operator = operator.as_str(), "filter applied");
        session.set_active_activity_ids(Some(activities.iter().map(|activity| activity.id).collect()));
        Ok(activities)
    }

    /// Reorders a subset of the active list; returns the active list sorted
    /// by its new priorities.
    pub fn order(&self, session: &Session, requested: &[i64]) -> AppResult<Vec<TripActivity>> {
        let trip = session.require_trip()?;
        let trip_activities = self.db.list_trip_activities(trip.id)?;
        let active_ids: Vec<i64> = match session.active_activity_ids() {
            Some(ids) => ids.to_vec(),
            None => trip_activities.iter().map(|activity| activity.id).collect(),
        };

        let plan = plan_reorder(&trip_activities, &active_ids, requested)?;
        let written = self.db.apply_priorities(&plan.changes)?;
        tracing::info!(trip_id = trip.id, pool = plan.order.len(), written, "priorities reassigned");

        let mut active = self.db.trip_activities_by_ids(trip.id, &active_ids)?;
        sort_activities(&mut active);
        Ok(active)
    }

    /// Places a trip activity on a day of the current trip, all day unless a
    /// start and end token are given.
    pub fn plan(&self, session: &Session, request: &PlanRequest) -> AppResult<TimeInterval> {
        let trip = session.require_trip()?;
        let range = match (request.start.as_deref(), request.end.as_deref()) {
            (Some(start), Some(end)) => Some(parse_time_range(start, end)?),
            (None, None) => None,
            _ => {
                return Err(AppError::InvalidTimeFormat(
                    "a time range needs both a start and an end time".to_string(),
                ))
            }
        };

        let trip_activity = self.current_trip_activity(session, request.trip_activity_id)?;
        let day = self.current_day(trip, request.day)?;
        let draft = draft_interval(trip, &trip_activity, &day, range)?;

        let overlaps = overlapping(&draft, &self.db.list_day_intervals(day.id)?);
        if !overlaps.is_empty() {
            tracing::debug!(day = day.order, ?overlaps, "planned interval overlaps existing intervals");
        }
        let interval = self.db.create_time_interval(&draft)?;
        tracing::info!(
            trip_id = trip.id,
            trip_activity_id = trip_activity.id,
            day = day.order,
            interval_id = interval.id,
            "interval planned"
        );
        Ok(interval)
    }

    pub fn unplan(&self, session: &Session, interval_id: i64) -> AppResult<TimeInterval> {
        let trip = session.require_trip()?;
        let interval = self
            .db
            .find_trip_interval(trip.id, interval_id)?
            .ok_or_else(|| AppError::not_found(EntityKind::TimeInterval, interval_id))?;
        self.db.delete_time_interval(interval.id)?;
        tracing::info!(trip_id = trip.id, interval_id, "interval removed");
        Ok(interval)
    }

    fn resolve_tag(&self, session: &Session, raw: &str) -> AppResult<Tag> {
        let identifier = Identifier::parse(raw)?;
        self.db
            .find_tag(session.user_id(), &identifier)?
            .ok_or_else(|| AppError::not_found(EntityKind::Tag, identifier))
    }

    fn resolve_trip(&self, session: &Session, raw: &str) -> AppResult<Trip> {
        let identifier = Identifier::parse(raw)?;
        self.db
            .find_trip(session.user_id(), &identifier)?
            .ok_or_else(|| AppError::not_found(EntityKind::Trip, identifier))
    }

    fn current_trip_activity(&self, session: &Session, trip_activity_id: i64) -> AppResult<TripActivity> {
        let trip = session.require_trip()?;
        self.db
            .get_trip_activity(trip_activity_id)?
            .filter(|activity| activity.trip_id == trip.id)
            .ok_or_else(|| AppError::not_found(EntityKind::Activity, trip_activity_id))
    }

    fn reload_trip_activity(&self, trip_activity_id: i64) -> AppResult<TripActivity> {
        self.db
            .get_trip_activity(trip_activity_id)?
            .ok_or_else(|| AppError::not_found(EntityKind::Activity, trip_activity_id))
    }

    fn current_day(&self, trip: &Trip, order: u32) -> AppResult<Day> {
        self.db
            .find_day(trip.id, order)?
            .ok_or_else(|| AppError::not_found(EntityKind::Day, order))
    }
}

fn check_new_tag_name(name: &str) -> AppResult<()> {
    check_entity_name(name)?;
    check_tag_name(name)
}
