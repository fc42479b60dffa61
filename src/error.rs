//! Error type for tool configuration I/O and parsing.
//!
//! Interactive editing never fails: degenerate input turns into a no-op.
//! Reading and writing settings is the only fallible surface.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    /// Settings file could not be read or written.
    #[error("Config file access failed: {0}")]
    Io(#[from] std::io::Error),

    /// A known key carried a value that does not parse.
    #[error("Invalid value {value:?} for config key `{key}`")]
    InvalidValue {
        /// The offending key.
        key: String,
        /// The raw value as written.
        value: String,
    },

    /// The `tool` key named a tool this engine does not provide.
    #[error("Unknown tool `{0}`")]
    UnknownTool(String),
}

impl ConfigError {
    pub(crate) fn invalid(key: &str, value: &str) -> Self {
        ConfigError::InvalidValue {
            key: key.to_string(),
            value: value.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn messages_name_the_problem() {
        let err = ConfigError::invalid("opacity", "lots");
        assert_eq!(err.to_string(), "Invalid value \"lots\" for config key `opacity`");
        assert_eq!(ConfigError::UnknownTool("laser".into()).to_string(), "Unknown tool `laser`");
    }

    #[test]
    fn io_errors_convert() {
        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "gone");
        let err: ConfigError = io.into();
        assert!(matches!(err, ConfigError::Io(_)));
    }
}
