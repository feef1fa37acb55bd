use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum EntityKind {
    User,
    Tag,
    Trip,
    Activity,
    Day,
    SearchResult,
    TimeInterval,
}

impl EntityKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Tag => "tag",
            Self::Trip => "trip",
            Self::Activity => "activity",
            Self::Day => "day",
            Self::SearchResult => "search result",
            Self::TimeInterval => "time interval",
        }
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Error)]
pub enum AppError {
    #[error("NOT_AUTHENTICATED: you must be logged in, please login")]
    NotAuthenticated,
    #[error("ALREADY_AUTHENTICATED: {0} is already logged in, please logout")]
    AlreadyAuthenticated(String),
    #[error("NO_ACTIVE_TRIP: you must be in a trip, please goto a trip")]
    NoActiveTrip,
    #[error("NOT_FOUND: {kind} '{identifier}'")]
    NotFound { kind: EntityKind, identifier: String },
    #[error("DUPLICATE_NAME: {0}")]
    DuplicateName(String),
    #[error("INVALID_INPUT: {0}")]
    InvalidInput(String),
    #[error("INVALID_OPERATOR: {0}")]
    InvalidOperator(String),
    #[error("INVALID_TIME_FORMAT: {0}")]
    InvalidTimeFormat(String),
    #[error("PERMISSION_DENIED: {0}")]
    PermissionDenied(String),
    #[error("IMMUTABLE_FIELD: {0}")]
    ImmutableField(String),
    #[error("EXTERNAL_SERVICE: {0}")]
    ExternalService(String),
    #[error("IO_FAILURE: {0}")]
    Io(String),
    #[error("INTERNAL: {0}")]
    Internal(String),
}

impl AppError {
    pub fn not_found(kind: EntityKind, identifier: impl ToString) -> Self {
        Self::NotFound {
            kind,
            identifier: identifier.to_string(),
        }
    }

    /// Malformed user input of any flavour (dates, times, integers, tag names, operators).
    pub fn is_invalid_input(&self) -> bool {
        matches!(
            self,
            Self::InvalidInput(_) | Self::InvalidOperator(_) | Self::InvalidTimeFormat(_)
        )
    }

    pub fn is_not_found(&self, expected: EntityKind) -> bool {
        matches!(self, Self::NotFound { kind, .. } if *kind == expected)
    }
}

impl From<std::io::Error> for AppError {
    fn from(value: std::io::Error) -> Self {
        Self::Io(value.to_string())
    }
}

impl From<rusqlite::Error> for AppError {
    fn from(value: rusqlite::Error) -> Self {
        Self::Internal(value.to_string())
    }
}

impl From<serde_json::Error> for AppError {
    fn from(value: serde_json::Error) -> Self {
        Self::Internal(value.to_string())
    }
}

impl From<serde_yaml::Error> for AppError {
    fn from(value: serde_yaml::Error) -> Self {
        Self::InvalidInput(format!("config: {}", value))
    }
}

pub type AppResult<T> = Result<T, AppError>;
