/// Storage-layer errors for SQLite operations.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("SQLite error: {message}")]
    SqliteError { message: String },

    #[error("migration failed at version {version}: {reason}")]
    MigrationFailed { version: u32, reason: String },

    /// A stored value no longer decodes, e.g. an enum column written by a
    /// newer schema.
    #[error("corrupt {column} value '{value}'")]
    CorruptValue { column: String, value: String },
}
