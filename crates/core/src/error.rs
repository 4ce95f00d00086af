//! Error types for the intraday feature pipeline.

use thiserror::Error;

/// Result type alias using our Error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for the pipeline.
#[derive(Error, Debug)]
pub enum Error {
    /// One or more required fields could not be resolved to a column.
    #[error("Missing column(s): {}", fields.join(", "))]
    MissingColumn {
        /// Logical field names that were not found.
        fields: Vec<String>,
    },

    /// Nothing left to process.
    #[error("Empty input: {0}")]
    EmptyInput(String),

    /// Stratified split impossible with the available label counts.
    #[error("Insufficient class balance: {0}")]
    InsufficientClassBalance(String),

    /// Stored table was produced by a different feature-set declaration.
    #[error("Feature set mismatch: {0}")]
    FeatureSetMismatch(String),

    /// Label column would be exposed as a servable feature.
    #[error("Label leak: {0}")]
    LabelLeak(String),

    /// Requested feature is not declared by any registered view.
    #[error("Unknown feature: {0}")]
    UnknownFeature(String),

    /// Configuration error.
    #[error("Configuration error: {0}")]
    Config(String),

    /// Data error (invalid or inconsistent data).
    #[error("Data error: {0}")]
    Data(String),

    /// Columnar storage error (parquet / arrow).
    #[error("Storage error: {0}")]
    Storage(String),

    /// Model fitting or inference error.
    #[error("Model error: {0}")]
    Model(String),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// CSV read/write error.
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),
}

impl Error {
    /// Create a missing-column error from logical field names.
    pub fn missing_columns<I, S>(fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Error::MissingColumn {
            fields: fields.into_iter().map(Into::into).collect(),
        }
    }

    /// Create an empty-input error.
    pub fn empty_input(msg: impl Into<String>) -> Self {
        Error::EmptyInput(msg.into())
    }

    /// Create an insufficient class balance error.
    pub fn class_balance(msg: impl Into<String>) -> Self {
        Error::InsufficientClassBalance(msg.into())
    }

    /// Create a feature set mismatch error.
    pub fn feature_set_mismatch(msg: impl Into<String>) -> Self {
        Error::FeatureSetMismatch(msg.into())
    }

    /// Create a label leak error.
    pub fn label_leak(msg: impl Into<String>) -> Self {
        Error::LabelLeak(msg.into())
    }

    /// Create an unknown feature error.
    pub fn unknown_feature(msg: impl Into<String>) -> Self {
        Error::UnknownFeature(msg.into())
    }

    /// Create a configuration error.
    pub fn config(msg: impl Into<String>) -> Self {
        Error::Config(msg.into())
    }

    /// Create a data error.
    pub fn data(msg: impl Into<String>) -> Self {
        Error::Data(msg.into())
    }

    /// Create a storage error.
    pub fn storage(msg: impl Into<String>) -> Self {
        Error::Storage(msg.into())
    }

    /// Create a model error.
    pub fn model(msg: impl Into<String>) -> Self {
        Error::Model(msg.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_column_names_every_field() {
        let err = Error::missing_columns(["close", "volume"]);
        let msg = err.to_string();
        assert!(msg.contains("close"));
        assert!(msg.contains("volume"));
    }

    #[test]
    fn test_missing_column_fields_accessible() {
        match Error::missing_columns(["close"]) {
            Error::MissingColumn { fields } => assert_eq!(fields, vec!["close".to_string()]),
            other => panic!("unexpected error: {other}"),
        }
    }
}
