use thiserror::Error;

#[derive(Error, Debug)]
pub enum StyleSyncError {
    #[error("Config error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("{0} is not set")]
    ConfigurationMissing(&'static str),

    #[error("Other error: {0}")]
    Other(String),
}

/// Turn an optional credential into a `ConfigurationMissing` error when absent.
pub fn require(value: Option<String>, name: &'static str) -> Result<String, StyleSyncError> {
    value.ok_or(StyleSyncError::ConfigurationMissing(name))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_require_reports_variable_name() {
        let err = require(None, "PINECONE_API_KEY").unwrap_err();
        assert_eq!(err.to_string(), "PINECONE_API_KEY is not set");
        assert_eq!(require(Some("k".to_string()), "X").unwrap(), "k");
    }
}
