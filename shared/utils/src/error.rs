use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::response::ApiResponse;

/// Name of the partial unique index that keeps one ACTIVE scenario per year.
pub const ACTIVE_PER_YEAR_INDEX: &str = "uq_one_active_per_year";

const ACTIVE_INDEX_MESSAGE: &str = "There is already an ACTIVE scenario for this contractual year.";

#[derive(Error, Debug, Clone, Serialize, Deserialize, PartialEq)]
pub enum BauxiteError {
    #[error("Validation failed: {}", errors.join("; "))]
    Validation { errors: Vec<String> },

    #[error("Not found: {resource}")]
    NotFound { resource: String },

    #[error("Duplicate: {message}")]
    Duplicate {
        message: String,
        constraint: Option<String>,
    },

    #[error("{message}")]
    Operation { message: String },

    #[error("Authentication error: {message}")]
    Authentication { message: String },

    #[error("Configuration error: {message}")]
    Configuration { message: String },

    #[error("Database error: {message}")]
    Database { message: String },

    #[error("Internal server error: {message}")]
    Internal { message: String },
}

impl BauxiteError {
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation {
            errors: vec![message.into()],
        }
    }

    pub fn validation_errors(errors: Vec<String>) -> Self {
        Self::Validation { errors }
    }

    pub fn not_found(resource: impl Into<String>) -> Self {
        Self::NotFound {
            resource: resource.into(),
        }
    }

    pub fn duplicate(message: impl Into<String>) -> Self {
        Self::Duplicate {
            message: message.into(),
            constraint: None,
        }
    }

    pub fn operation(message: impl Into<String>) -> Self {
        Self::Operation {
            message: message.into(),
        }
    }

    pub fn authentication(message: impl Into<String>) -> Self {
        Self::Authentication {
            message: message.into(),
        }
    }

    pub fn database(message: impl Into<String>) -> Self {
        Self::Database {
            message: message.into(),
        }
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// The error raised whenever a second scenario would become ACTIVE for a year.
    pub fn active_conflict(year: i32) -> Self {
        Self::validation(format!(
            "There is already an ACTIVE scenario for the year {}.",
            year
        ))
    }

    /// Names the year on an ACTIVE index violation. The database error only
    /// carries the index name, so the repositories pass the year they wrote.
    pub fn with_active_year(self, year: i32) -> Self {
        if self.is_active_index_violation() {
            Self::active_conflict(year)
        } else {
            self
        }
    }

    fn is_active_index_violation(&self) -> bool {
        matches!(self, Self::Validation { errors } if errors.len() == 1 && errors[0] == ACTIVE_INDEX_MESSAGE)
    }

    pub fn error_code(&self) -> &'static str {
        match self {
            Self::Validation { .. } => "VALIDATION_ERROR",
            Self::NotFound { .. } => "NOT_FOUND",
            Self::Duplicate { .. } => "DUPLICATE_ERROR",
            Self::Operation { .. } => "OPERATION_ERROR",
            Self::Authentication { .. } => "AUTHENTICATION_ERROR",
            Self::Configuration { .. } => "CONFIGURATION_ERROR",
            Self::Database { .. } => "DATABASE_ERROR",
            Self::Internal { .. } => "INTERNAL_SERVER_ERROR",
        }
    }

    pub fn http_status_code(&self) -> u16 {
        match self {
            Self::Validation { .. } => 400,
            Self::NotFound { .. } => 404,
            Self::Duplicate { .. } => 400,
            Self::Operation { .. } => 400,
            Self::Authentication { .. } => 401,
            Self::Configuration { .. } => 500,
            Self::Database { .. } => 500,
            Self::Internal { .. } => 500,
        }
    }

    /// Messages listed in the envelope's `errors` array.
    pub fn messages(&self) -> Vec<String> {
        match self {
            Self::Validation { errors } => errors.clone(),
            Self::NotFound { resource } => vec![format!("{} not found", resource)],
            Self::Duplicate { message, .. }
            | Self::Operation { message }
            | Self::Authentication { message } => vec![message.clone()],
            // storage and internal details stay in the logs
            Self::Configuration { .. } | Self::Database { .. } | Self::Internal { .. } => {
                vec!["Internal server error".to_string()]
            }
        }
    }

    /// Short message used as the envelope's `message`.
    pub fn summary(&self) -> String {
        match self {
            Self::Validation { .. } => "Validation failed".to_string(),
            Self::NotFound { resource } => format!("{} not found", resource),
            Self::Duplicate { message, .. }
            | Self::Operation { message }
            | Self::Authentication { message } => message.clone(),
            Self::Configuration { .. } | Self::Database { .. } | Self::Internal { .. } => {
                "Internal server error".to_string()
            }
        }
    }

    pub fn is_server_error(&self) -> bool {
        self.http_status_code() >= 500
    }
}

pub type BauxiteResult<T> = Result<T, BauxiteError>;

impl IntoResponse for BauxiteError {
    fn into_response(self) -> Response {
        if self.is_server_error() {
            crate::log_error!(self, "Request failed");
        }

        let status = StatusCode::from_u16(self.http_status_code())
            .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        let body: ApiResponse<()> = ApiResponse::failure(self.summary(), self.messages());

        (status, Json(body)).into_response()
    }
}

/// Error for a violated unique constraint, named when known.
pub fn unique_violation(constraint: Option<&str>) -> BauxiteError {
    if constraint == Some(ACTIVE_PER_YEAR_INDEX) {
        return BauxiteError::validation(ACTIVE_INDEX_MESSAGE);
    }
    BauxiteError::Duplicate {
        message: match constraint {
            Some(name) => format!("Unique constraint violated: {}", name),
            None => "Unique constraint violated".to_string(),
        },
        constraint: constraint.map(str::to_string),
    }
}

/// Error for a violated foreign key (missing parent or restricted delete).
pub fn foreign_key_violation(constraint: Option<&str>) -> BauxiteError {
    BauxiteError::operation(match constraint {
        Some(name) => format!("Referenced record constraint violated: {}", name),
        None => "Referenced record constraint violated".to_string(),
    })
}

pub fn check_violation(constraint: Option<&str>) -> BauxiteError {
    BauxiteError::validation(match constraint {
        Some(name) => format!("Check constraint violated: {}", name),
        None => "Check constraint violated".to_string(),
    })
}

/// Maps a storage error onto the domain taxonomy by inspecting the
/// database error kind and constraint name.
pub fn translate_db_error(error: sqlx::Error) -> BauxiteError {
    match error {
        sqlx::Error::RowNotFound => BauxiteError::not_found("Record"),
        sqlx::Error::Database(db_err) => match db_err.kind() {
            sqlx::error::ErrorKind::UniqueViolation => unique_violation(db_err.constraint()),
            sqlx::error::ErrorKind::ForeignKeyViolation => foreign_key_violation(db_err.constraint()),
            sqlx::error::ErrorKind::CheckViolation => check_violation(db_err.constraint()),
            _ => BauxiteError::database(db_err.to_string()),
        },
        other => BauxiteError::database(other.to_string()),
    }
}

impl From<sqlx::Error> for BauxiteError {
    fn from(error: sqlx::Error) -> Self {
        translate_db_error(error)
    }
}

impl From<serde_json::Error> for BauxiteError {
    fn from(error: serde_json::Error) -> Self {
        Self::validation(format!("Invalid JSON: {}", error))
    }
}

impl From<config::ConfigError> for BauxiteError {
    fn from(error: config::ConfigError) -> Self {
        Self::Configuration {
            message: error.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        assert_eq!(BauxiteError::validation("x").http_status_code(), 400);
        assert_eq!(BauxiteError::duplicate("x").http_status_code(), 400);
        assert_eq!(BauxiteError::operation("x").http_status_code(), 400);
        assert_eq!(BauxiteError::not_found("Mine").http_status_code(), 404);
        assert_eq!(BauxiteError::authentication("x").http_status_code(), 401);
        assert_eq!(BauxiteError::database("x").http_status_code(), 500);
        assert_eq!(BauxiteError::internal("x").http_status_code(), 500);
    }

    #[test]
    fn test_server_errors_hide_details() {
        let error = BauxiteError::database("connection refused on 10.0.0.3");
        assert_eq!(error.messages(), vec!["Internal server error".to_string()]);
        assert_eq!(error.summary(), "Internal server error");
    }

    #[test]
    fn test_active_conflict_message() {
        let error = BauxiteError::active_conflict(2025);
        assert_eq!(error.error_code(), "VALIDATION_ERROR");
        assert_eq!(
            error.messages(),
            vec!["There is already an ACTIVE scenario for the year 2025.".to_string()]
        );
    }

    #[test]
    fn test_active_index_violation_names_the_year() {
        let error = unique_violation(Some(ACTIVE_PER_YEAR_INDEX)).with_active_year(2025);
        assert_eq!(error, BauxiteError::active_conflict(2025));

        let other = unique_violation(Some("uq_mines_name"));
        assert_eq!(other.clone().with_active_year(2025), other);
        let validation = BauxiteError::validation("name is required");
        assert_eq!(validation.clone().with_active_year(2025), validation);
    }

    #[test]
    fn test_row_not_found_maps_to_404() {
        let error: BauxiteError = sqlx::Error::RowNotFound.into();
        assert_eq!(error.http_status_code(), 404);
    }

    #[test]
    fn test_active_index_violation_is_validation() {
        let error = unique_violation(Some(ACTIVE_PER_YEAR_INDEX));
        assert_eq!(error.error_code(), "VALIDATION_ERROR");

        let error = unique_violation(Some("uq_mines_name"));
        assert_eq!(
            error,
            BauxiteError::Duplicate {
                message: "Unique constraint violated: uq_mines_name".to_string(),
                constraint: Some("uq_mines_name".to_string()),
            }
        );
    }
}
