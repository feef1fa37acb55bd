use crate::errors::{AppError, AppResult};
use crate::models::{
    ActivityUpdate, FilterRequest, NewTripPayload, PlanRequest, TripActivityUpdate, TripUpdate, UserActivityDraft,
};
use crate::planner::PlannerCore;
use crate::search::SearchQuery;
use crate::session::Session;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

/// One user command. Tags and trips are addressed by name or numeric id,
/// activities by id.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "command", rename_all = "snake_case")]
pub enum Command {
    CreateUser { username: String, name: String },
    Login { username: String },
    Logout,
    DeleteUser { username: String },
    Status,

    CreateTag { name: String },
    RenameTag { tag: String, name: String },
    DeleteTag { tag: String },
    ListTags,
    Tag {
        #[serde(rename = "activity")]
        trip_activity_id: i64,
        tag: String,
        #[serde(default)]
        force: bool,
    },
    Untag {
        #[serde(rename = "activity")]
        trip_activity_id: i64,
        tag: String,
    },

    CreateTrip(NewTripPayload),
    EditTrip {
        trip: String,
        #[serde(flatten)]
        update: TripUpdate,
    },
    DeleteTrip { trip: String },
    ListTrips,
    Goto { trip: String },
    Leave,
    ListDays,
    CommentDay { day: u32, comments: String },

    Search(SearchQuery),
    ListSearchCache,
    AddActivity { index: usize },
    CreateActivity(UserActivityDraft),
    EditActivity {
        #[serde(rename = "activity")]
        activity_id: i64,
        #[serde(flatten)]
        update: ActivityUpdate,
    },
    EditTripActivity {
        #[serde(rename = "activity")]
        trip_activity_id: i64,
        #[serde(flatten)]
        update: TripActivityUpdate,
    },
    DeleteActivity {
        #[serde(rename = "activity")]
        trip_activity_id: i64,
    },
    ListActivities,

    Filter(FilterRequest),
    Order { activities: Vec<i64> },
    Plan(PlanRequest),
    Unplan { interval: i64 },
}

impl Command {
    pub fn name(&self) -> &'static str {
        match self {
            Self::CreateUser { .. } => "create_user",
            Self::Login { .. } => "login",
            Self::Logout => "logout",
            Self::DeleteUser { .. } => "delete_user",
            Self::Status => "status",
            Self::CreateTag { .. } => "create_tag",
            Self::RenameTag { .. } => "rename_tag",
            Self::DeleteTag { .. } => "delete_tag",
            Self::ListTags => "list_tags",
            Self::Tag { .. } => "tag",
            Self::Untag { .. } => "untag",
            Self::CreateTrip(_) => "create_trip",
            Self::EditTrip { .. } => "edit_trip",
            Self::DeleteTrip { .. } => "delete_trip",
            Self::ListTrips => "list_trips",
            Self::Goto { .. } => "goto",
            Self::Leave => "leave",
            Self::ListDays => "list_days",
            Self::CommentDay { .. } => "comment_day",
            Self::Search(_) => "search",
            Self::ListSearchCache => "list_search_cache",
            Self::AddActivity { .. } => "add_activity",
            Self::CreateActivity(_) => "create_activity",
            Self::EditActivity { .. } => "edit_activity",
            Self::EditTripActivity { .. } => "edit_trip_activity",
            Self::DeleteActivity { .. } => "delete_activity",
            Self::ListActivities => "list_activities",
            Self::Filter(_) => "filter",
            Self::Order { .. } => "order",
            Self::Plan(_) => "plan",
            Self::Unplan { .. } => "unplan",
        }
    }
}

/// Owns the optional session and routes commands to the planner.
pub struct CommandDispatcher {
    core: PlannerCore,
    session: Option<Session>,
}

impl CommandDispatcher {
    pub fn new(core: PlannerCore) -> Self {
        Self { core, session: None }
    }

    pub fn session(&self) -> Option<&Session> {
        self.session.as_ref()
    }

    pub fn execute(&mut self, command: Command) -> AppResult<Value> {
        let name = command.name();
        tracing::debug!(command = name, "dispatching command");
        let result = self.route(command);
        if let Err(error) = &result {
            tracing::debug!(command = name, error = %error, "command failed");
        }
        result
    }

    fn route(&mut self, command: Command) -> AppResult<Value> {
        let core = &self.core;
        match command {
            Command::CreateUser { username, name } => to_value(core.create_user(&username, &name)?),
            Command::Login { username } => {
                if let Some(active) = &self.session {
                    return Err(AppError::AlreadyAuthenticated(active.user.username.clone()));
                }
                let session = core.login(&username)?;
                let status = core.status(&session);
                self.session = Some(session);
                to_value(status)
            }
            Command::Logout => {
                let session = self.session.take().ok_or(AppError::NotAuthenticated)?;
                tracing::info!(session_id = %session.session_id, "logged out");
                Ok(json!({ "username": session.user.username }))
            }
            Command::DeleteUser { username } => {
                let summary = core.delete_user(require(&self.session)?, &username)?;
                self.session = None;
                to_value(summary)
            }
            Command::Status => to_value(core.status(require(&self.session)?)),

            Command::CreateTag { name } => to_value(core.create_tag(require(&self.session)?, &name)?),
            Command::RenameTag { tag, name } => to_value(core.rename_tag(require(&self.session)?, &tag, &name)?),
            Command::DeleteTag { tag } => {
                let unlinked = core.delete_tag(require(&self.session)?, &tag)?;
                Ok(json!({ "unlinked": unlinked }))
            }
            Command::ListTags => to_value(core.list_tags(require(&self.session)?)?),
            Command::Tag {
                trip_activity_id,
                tag,
                force,
            } => to_value(core.tag_activity(require(&self.session)?, trip_activity_id, &tag, force)?),
            Command::Untag { trip_activity_id, tag } => {
                to_value(core.untag_activity(require(&self.session)?, trip_activity_id, &tag)?)
            }

            Command::CreateTrip(payload) => to_value(core.create_trip(require(&self.session)?, &payload)?),
            Command::EditTrip { trip, update } => {
                to_value(core.edit_trip(require_mut(&mut self.session)?, &trip, &update)?)
            }
            Command::DeleteTrip { trip } => to_value(core.delete_trip(require_mut(&mut self.session)?, &trip)?),
            Command::ListTrips => to_value(core.list_trips(require(&self.session)?)?),
            Command::Goto { trip } => to_value(core.goto_trip(require_mut(&mut self.session)?, &trip)?),
            Command::Leave => to_value(core.leave_trip(require_mut(&mut self.session)?)?),
            Command::ListDays => to_value(core.list_days(require(&self.session)?)?),
            Command::CommentDay { day, comments } => {
                to_value(core.comment_day(require(&self.session)?, day, &comments)?)
            }

            Command::Search(query) => to_value(core.search(require_mut(&mut self.session)?, &query)?),
            Command::ListSearchCache => to_value(core.list_search_cache(require(&self.session)?)),
            Command::AddActivity { index } => to_value(core.add_activity(require(&self.session)?, index)?),
            Command::CreateActivity(draft) => to_value(core.create_activity(require(&self.session)?, &draft)?),
            Command::EditActivity { activity_id, update } => {
                to_value(core.edit_activity(require(&self.session)?, activity_id, &update)?)
            }
            Command::EditTripActivity {
                trip_activity_id,
                update,
            } => to_value(core.edit_trip_activity(require(&self.session)?, trip_activity_id, &update)?),
            Command::DeleteActivity { trip_activity_id } => {
                let intervals = core.delete_trip_activity(require_mut(&mut self.session)?, trip_activity_id)?;
                Ok(json!({ "deletedIntervals": intervals }))
            }
            Command::ListActivities => to_value(core.list_activities(require(&self.session)?)?),

            Command::Filter(request) => to_value(core.filter(require_mut(&mut self.session)?, &request)?),
            Command::Order { activities } => to_value(core.order(require(&self.session)?, &activities)?),
            Command::Plan(request) => to_value(core.plan(require(&self.session)?, &request)?),
            Command::Unplan { interval } => to_value(core.unplan(require(&self.session)?, interval)?),
        }
    }
}

fn require(session: &Option<Session>) -> AppResult<&Session> {
    session.as_ref().ok_or(AppError::NotAuthenticated)
}

fn require_mut(session: &mut Option<Session>) -> AppResult<&mut Session> {
    session.as_mut().ok_or(AppError::NotAuthenticated)
}

fn to_value(value: impl Serialize) -> AppResult<Value> {
    serde_json::to_value(value).map_err(AppError::from)
}

pub fn to_client_error(error: impl std::fmt::Display) -> String {
    error.to_string()
}

#[cfg(test)]
mod tests {
    use super::{Command, CommandDispatcher};
    use crate::config::PlannerConfig;
    use crate::db::Database;
    use crate::errors::AppError;
    use crate::planner::PlannerCore;
    use crate::search::FixtureCatalog;
    use tempfile::TempDir;

    fn dispatcher() -> (TempDir, CommandDispatcher) {
        let dir = tempfile::tempdir().expect("tempdir");
        let db = Database::new(&dir.path().join("commands.db")).expect("db");
        let core = PlannerCore::with_database(db, Box::new(FixtureCatalog::new(Vec::new())), PlannerConfig::default());
        (dir, CommandDispatcher::new(core))
    }

    fn command(raw: &str) -> Command {
        serde_json::from_str(raw).expect("command json")
    }

    #[test]
    fn commands_parse_from_tagged_json() {
        let edit = command(r#"{"command": "edit_trip", "trip": "Rome", "startDate": null, "duration": 3}"#);
        match edit {
            Command::EditTrip { trip, update } => {
                assert_eq!(trip, "Rome");
                assert_eq!(update.start_date, Some(None));
                assert_eq!(update.duration, Some(3));
            }
            other => panic!("unexpected command {:?}", other),
        }

        let tag = command(r#"{"command": "tag", "activity": 4, "tag": "food"}"#);
        assert!(matches!(tag, Command::Tag { trip_activity_id: 4, force: false, .. }));
    }

    #[test]
    fn session_commands_require_login() {
        let (_dir, mut dispatcher) = dispatcher();
        let error = dispatcher.execute(Command::ListTrips).expect_err("logged out");
        assert!(matches!(error, AppError::NotAuthenticated));
        let error = dispatcher.execute(Command::Logout).expect_err("logged out");
        assert!(matches!(error, AppError::NotAuthenticated));
    }

    #[test]
    fn second_login_is_rejected_until_logout() {
        let (_dir, mut dispatcher) = dispatcher();
        dispatcher
            .execute(command(r#"{"command": "create_user", "username": "ana", "name": "Ana"}"#))
            .expect("create");
        dispatcher
            .execute(command(r#"{"command": "login", "username": "ana"}"#))
            .expect("login");
        let error = dispatcher
            .execute(command(r#"{"command": "login", "username": "ana"}"#))
            .expect_err("again");
        assert!(matches!(error, AppError::AlreadyAuthenticated(_)));

        dispatcher.execute(Command::Logout).expect("logout");
        assert!(dispatcher.session().is_none());
        dispatcher
            .execute(command(r#"{"command": "login", "username": "ana"}"#))
            .expect("login again");
    }

    #[test]
    fn deleting_the_account_ends_the_session() {
        let (_dir, mut dispatcher) = dispatcher();
        dispatcher
            .execute(command(r#"{"command": "create_user", "username": "ana", "name": "Ana"}"#))
            .expect("create");
        dispatcher
            .execute(command(r#"{"command": "login", "username": "ana"}"#))
            .expect("login");
        dispatcher
            .execute(command(r#"{"command": "delete_user", "username": "ana"}"#))
            .expect("delete");
        assert!(dispatcher.session().is_none());
    }
}
