use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("Azure DevOps API error: {0}")]
    Ado(String),

    #[error("Asana API error: {0}")]
    Asana(String),

    #[error("database error: {0}")]
    Database(String),

    #[error("migration error: {0}")]
    Migration(String),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("missing property {0}")]
    MissingField(&'static str),

    #[error("workspace not found: {0}")]
    WorkspaceNotFound(String),

    #[error("project not found: {0}")]
    ProjectNotFound(String),

    #[error("tag not found: {0}")]
    TagNotFound(String),

    #[error("custom field not found")]
    CustomFieldNotFound,

    /// The workspace plan does not include custom fields (HTTP 402).
    /// Callers treat this as a soft miss, never as a task failure.
    #[error("custom fields unavailable on this workspace plan")]
    CustomFieldsUnavailable,

    #[error("task mapping already exists")]
    DuplicateMapping,

    #[error("ADO project already mapped to a different Asana project")]
    ProjectAlreadyMapped,
}

impl From<sqlx::Error> for Error {
    fn from(e: sqlx::Error) -> Self {
        Error::Database(e.to_string())
    }
}

impl From<sqlx::migrate::MigrateError> for Error {
    fn from(e: sqlx::migrate::MigrateError) -> Self {
        Error::Migration(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, Error>;
