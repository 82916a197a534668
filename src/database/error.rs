use std::{collections::BTreeMap, convert::Infallible, fmt};

use serde_json::{json, Value};
use thiserror::Error;
use warp::{
    http::StatusCode,
    reject::{self, Rejection},
    reply::{self, Reply},
};

/// Field name -> messages, rendered as-is in a 400 body.
pub type FieldErrors = BTreeMap<String, Vec<String>>;

const UNIQUE_VIOLATION: &str = "23505";

#[derive(Debug)]
pub struct QueryError {
    info: String,
    code: Option<String>,
    constraint: Option<String>,
}

impl QueryError {
    pub fn new(info: String) -> Self {
        Self {
            info,
            code: None,
            constraint: None,
        }
    }

    #[cfg(test)]
    pub fn unique_violation(constraint: &str) -> Self {
        Self {
            info: format!("duplicate key value violates unique constraint \"{constraint}\""),
            code: Some(UNIQUE_VIOLATION.to_owned()),
            constraint: Some(constraint.to_owned()),
        }
    }

    pub fn is_unique_violation(&self) -> bool {
        self.code.as_deref() == Some(UNIQUE_VIOLATION)
    }

    pub fn constraint(&self) -> Option<&str> {
        self.constraint.as_deref()
    }
}

impl From<sqlx::Error> for QueryError {
    fn from(value: sqlx::Error) -> Self {
        match value {
            sqlx::Error::Database(e) => Self {
                info: format!("{e}"),
                code: e.code().map(|code| code.into_owned()),
                constraint: e.constraint().map(str::to_owned),
            },
            sqlx::Error::Configuration(e) => Self::new(format!("{e}")),
            sqlx::Error::Io(e) => Self::new(format!("{e}")),
            sqlx::Error::Tls(e) => Self::new(format!("{e}")),
            sqlx::Error::Protocol(e) => Self::new(e),
            sqlx::Error::RowNotFound => Self::new("RowNotFound".to_owned()),
            sqlx::Error::TypeNotFound { type_name } => {
                Self::new(format!("Type not found: {type_name}"))
            }
            sqlx::Error::ColumnIndexOutOfBounds { index, len } => {
                Self::new(format!("Column index out of bounds {index} ({len})"))
            }
            sqlx::Error::ColumnNotFound(e) => Self::new(e),
            sqlx::Error::ColumnDecode { index, source } => {
                Self::new(format!("Column decode {index} ({source})"))
            }
            sqlx::Error::Decode(e) => Self::new(format!("{e}")),
            sqlx::Error::PoolTimedOut => Self::new("Pool timed out".to_owned()),
            sqlx::Error::PoolClosed => Self::new("Pool closed".to_owned()),
            sqlx::Error::WorkerCrashed => Self::new("Worker crashed".to_owned()),
            sqlx::Error::Migrate(e) => Self::new(format!("{e}")),
            _ => Self::new("Unknown error".to_owned()),
        }
    }
}

impl fmt::Display for QueryError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({})", self.info)
    }
}

impl std::error::Error for QueryError {}

#[derive(Error, Debug)]
pub enum Error {
    #[error("Invalid input")]
    Validation(FieldErrors),

    #[error("{0}")]
    Conflict(String),

    #[error("{0}")]
    NotInMembership(String),

    #[error("{0}")]
    SelfReference(String),

    #[error("Not found.")]
    NotFound,

    #[error("Invalid page.")]
    InvalidPage,

    #[error("{0}")]
    Unauthorized(String),

    #[error("You do not have permission to perform this action.")]
    Forbidden,

    #[error("Unable to log in with provided credentials.")]
    InvalidCredentials,

    #[error("Database error {0}")]
    Query(#[from] QueryError),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    pub fn field(field: &str, message: &str) -> Self {
        let mut errors = FieldErrors::new();
        errors.insert(field.to_owned(), vec![message.to_owned()]);
        Self::Validation(errors)
    }

    pub fn unauthorized() -> Self {
        Self::Unauthorized("Authentication credentials were not provided.".to_owned())
    }

    pub fn code(&self) -> StatusCode {
        match self {
            Error::Validation(_)
            | Error::Conflict(_)
            | Error::NotInMembership(_)
            | Error::SelfReference(_)
            | Error::InvalidCredentials => StatusCode::BAD_REQUEST,
            Error::NotFound | Error::InvalidPage => StatusCode::NOT_FOUND,
            Error::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            Error::Forbidden => StatusCode::FORBIDDEN,
            Error::Query(_) | Error::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn body(&self) -> Value {
        match self {
            Error::Validation(errors) => json!(errors),
            Error::NotFound
            | Error::InvalidPage
            | Error::Unauthorized(_)
            | Error::Forbidden => {
                json!({ "detail": self.to_string() })
            }
            Error::Query(_) | Error::Internal(_) => {
                json!({ "detail": "Internal server error" })
            }
            _ => json!({ "errors": self.to_string() }),
        }
    }
}

// `From<Error> for Rejection` comes from warp's blanket impl over `Reject`,
// which wraps the value with `reject::custom`.
impl reject::Reject for Error {}

/// Renders every rejection the API can produce as a JSON body.
pub async fn handle_rejection(err: Rejection) -> Result<impl Reply, Infallible> {
    let (code, body) = if err.is_not_found() {
        (StatusCode::NOT_FOUND, json!({ "detail": "Not found." }))
    } else if let Some(e) = err.find::<Error>() {
        match e {
            Error::Query(_) | Error::Internal(_) => log::error!("{e}"),
            _ => log::debug!("Rejected request: {e}"),
        }
        (e.code(), e.body())
    } else if let Some(e) = err.find::<warp::filters::body::BodyDeserializeError>() {
        (
            StatusCode::BAD_REQUEST,
            json!({ "errors": format!("Malformed payload: {e}") }),
        )
    } else if err.find::<reject::InvalidQuery>().is_some() {
        (
            StatusCode::BAD_REQUEST,
            json!({ "errors": "Invalid query string" }),
        )
    } else if err.find::<reject::MethodNotAllowed>().is_some() {
        (
            StatusCode::METHOD_NOT_ALLOWED,
            json!({ "detail": "Method not allowed." }),
        )
    } else if err.find::<reject::UnsupportedMediaType>().is_some() {
        (
            StatusCode::UNSUPPORTED_MEDIA_TYPE,
            json!({ "detail": "Unsupported media type." }),
        )
    } else if err.find::<reject::LengthRequired>().is_some() {
        (
            StatusCode::LENGTH_REQUIRED,
            json!({ "detail": "Content-Length header is required." }),
        )
    } else if err.find::<reject::PayloadTooLarge>().is_some() {
        (
            StatusCode::PAYLOAD_TOO_LARGE,
            json!({ "detail": "Payload too large." }),
        )
    } else {
        log::error!("Unhandled rejection: {err:?}");
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            json!({ "detail": "Internal server error" }),
        )
    };

    Ok(reply::with_status(reply::json(&body), code))
}
