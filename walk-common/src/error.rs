//! Error type shared by the walk crates

use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug)]
pub enum Error {
    /// Checkpoint database failure
    #[cfg(feature = "sqlx")]
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Filesystem failure (root folder, photo directory, config file)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Unreadable or inconsistent TOML settings
    #[error("Configuration error: {0}")]
    Config(String),

    /// No checkpoint (or other record) with the given id
    #[error("Not found: {0}")]
    NotFound(String),

    /// Rejected coordinate, sample or checkpoint mutation
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_io_error_converts_with_question_mark() {
        fn open_missing() -> Result<()> {
            std::fs::read("/nonexistent/walk/photos/none.jpg")?;
            Ok(())
        }

        let err = open_missing().unwrap_err();
        assert!(matches!(err, Error::Io(_)));
        assert!(err.to_string().starts_with("IO error: "));
    }

    #[test]
    fn test_messages_carry_context() {
        let err = Error::InvalidInput("latitude 95 out of range".to_string());
        assert_eq!(err.to_string(), "Invalid input: latitude 95 out of range");

        let err = Error::NotFound("checkpoint 42".to_string());
        assert_eq!(err.to_string(), "Not found: checkpoint 42");
    }
}
