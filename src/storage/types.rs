use thiserror::Error;

/// Database-specific errors with user-facing messages.
#[derive(Debug, Error)]
pub enum DatabaseError {
    /// Another instance of the bot has locked the database
    #[error("another instance of herald appears to be running; close it and try again")]
    InstanceLocked,

    /// Migration failed
    #[error("database migration failed: {0}")]
    Migration(String),

    /// A stored config document failed to (de)serialize
    #[error("service config document is not valid JSON: {0}")]
    Corrupt(#[from] serde_json::Error),

    /// Generic database error
    #[error("database error: {0}")]
    Other(#[from] sqlx::Error),
}

impl DatabaseError {
    /// Check if a sqlx error indicates database locking
    pub(crate) fn from_sqlx(err: sqlx::Error) -> Self {
        let error_string = err.to_string().to_lowercase();

        // SQLITE_BUSY (5): database is locked
        // SQLITE_LOCKED (6): database table is locked
        // SQLITE_CANTOPEN (14): unable to open database file
        if error_string.contains("database is locked")
            || error_string.contains("database table is locked")
            || error_string.contains("sqlite_busy")
            || error_string.contains("sqlite_locked")
            || error_string.contains("unable to open database file")
        {
            return DatabaseError::InstanceLocked;
        }

        DatabaseError::Other(err)
    }
}
