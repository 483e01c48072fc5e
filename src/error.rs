use actix_web::{http::StatusCode, HttpResponse, ResponseError};
use sqlx::error::ErrorKind;
use thiserror::Error;

pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Error, Debug)]
pub enum Error {
    /// Rejected input. The message is shown to the client as is.
    #[error("{0}")]
    Invalid(String),

    #[error("{0}")]
    NotFound(String),

    #[error("Invalid credentials")]
    BadCredentials,

    #[error("Authentication credentials were not provided.")]
    NotAuthenticated,

    #[error("You do not have permission to perform this action.")]
    Forbidden,

    #[error("database error: {0}")]
    Database(sqlx::Error),

    #[error("migration failed: {0}")]
    Migrate(#[from] sqlx::migrate::MigrateError),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Kept as text, actix's multipart error is not `Send`.
    #[error("malformed upload: {0}")]
    Multipart(String),

    #[error("password hashing failed: {0}")]
    PasswordHash(String),
}

impl Error {
    pub fn invalid(message: impl Into<String>) -> Self {
        Self::Invalid(message.into())
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::NotFound(message.into())
    }
}

impl From<actix_multipart::MultipartError> for Error {
    fn from(err: actix_multipart::MultipartError) -> Self {
        Self::Multipart(err.to_string())
    }
}

impl From<sqlx::Error> for Error {
    fn from(err: sqlx::Error) -> Self {
        if let sqlx::Error::RowNotFound = err {
            return Self::not_found("Not found.");
        }

        let Some(db_err) = err.as_database_error() else {
            return Self::Database(err);
        };

        match db_err.kind() {
            // sqlite reports "UNIQUE constraint failed: category.name"
            ErrorKind::UniqueViolation => {
                let target = db_err
                    .message()
                    .rsplit(": ")
                    .next()
                    .unwrap_or_default()
                    .to_string();
                let message = match target.split_once('.') {
                    Some((table, column)) if !column.contains(',') => {
                        format!("{} with this {column} already exists.", table.replace('_', " "))
                    }
                    _ => "This record already exists.".to_string(),
                };
                Self::Invalid(message)
            }
            ErrorKind::ForeignKeyViolation => {
                Self::invalid("Invalid pk - object does not exist.")
            }
            ErrorKind::CheckViolation => {
                Self::Invalid(format!("Value out of range: {}", db_err.message()))
            }
            _ => Self::Database(err),
        }
    }
}

#[derive(serde::Serialize)]
struct ErrJsonResp {
    error: String,
}

impl ResponseError for Error {
    fn status_code(&self) -> StatusCode {
        match self {
            Self::Invalid(_) | Self::Multipart(_) => StatusCode::BAD_REQUEST,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::BadCredentials => StatusCode::UNAUTHORIZED,
            Self::NotAuthenticated | Self::Forbidden => StatusCode::FORBIDDEN,
            Self::Database(_) | Self::Migrate(_) | Self::Io(_) | Self::PasswordHash(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    fn error_response(&self) -> HttpResponse {
        let status = self.status_code();
        if status.is_server_error() {
            tracing::error!("request failed: {self}");
        }
        HttpResponse::build(status).json(ErrJsonResp {
            error: self.to_string(),
        })
    }
}
