//! Error types for the EmberDB client SDK.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
  #[error("Invalid reference '{path}': {reason}")]
  InvalidReference { path: String, reason: String },

  #[error("Missing field for {operator}")]
  MissingField { operator: String },

  #[error("Invalid operand for {operator} on '{field}': expected {expected}, found {found}")]
  InvalidOperandType {
    field: String,
    operator: String,
    expected: &'static str,
    found: &'static str,
  },

  #[error("Division by zero in {operator} on '{field}'")]
  DivisionByZero { field: String, operator: String },

  #[error("Array expected for {operator} on '{field}', found {found}")]
  ArrayExpected {
    field: String,
    operator: String,
    found: &'static str,
  },

  #[error("Geometry type {geometry_type} is not supported by {operator}")]
  UnsupportedGeometry {
    operator: String,
    geometry_type: String,
  },

  #[error("Schema mismatch at {path}: {reason}")]
  SchemaMismatch { path: String, reason: String },

  #[error("Unclosed ring at {path}: {reason}")]
  UnclosedRing { path: String, reason: String },

  #[error("Connection failed: {0}")]
  ConnectionFailed(String),

  #[error("Server error: {message}")]
  ServerReported {
    message: String,
    details: serde_json::Value,
  },

  #[error("Transport error ({status}): {message}")]
  Transport { status: u16, message: String },

  #[error("HTTP error: {0}")]
  Http(#[from] reqwest::Error),

  #[error("WebSocket error: {0}")]
  WebSocket(String),

  #[error("Invalid URL: {0}")]
  Url(#[from] url::ParseError),

  #[error("Serialization error: {0}")]
  Serialization(String),

  #[error("Configuration error: {0}")]
  Config(String),
}

impl Error {
  pub(crate) fn invalid_reference(path: impl Into<String>, reason: impl Into<String>) -> Self {
    Self::InvalidReference {
      path: path.into(),
      reason: reason.into(),
    }
  }

  pub(crate) fn schema_mismatch(path: impl Into<String>, reason: impl Into<String>) -> Self {
    Self::SchemaMismatch {
      path: path.into(),
      reason: reason.into(),
    }
  }

  /// True for errors raised by local validation (never worth retrying).
  pub fn is_validation(&self) -> bool {
    matches!(
      self,
      Self::InvalidReference { .. }
        | Self::MissingField { .. }
        | Self::InvalidOperandType { .. }
        | Self::DivisionByZero { .. }
        | Self::ArrayExpected { .. }
        | Self::UnsupportedGeometry { .. }
        | Self::SchemaMismatch { .. }
        | Self::UnclosedRing { .. }
    )
  }
}

impl From<serde_json::Error> for Error {
  fn from(e: serde_json::Error) -> Self {
    Self::Serialization(e.to_string())
  }
}

impl From<tokio_tungstenite::tungstenite::Error> for Error {
  fn from(e: tokio_tungstenite::tungstenite::Error) -> Self {
    Self::WebSocket(e.to_string())
  }
}

pub type Result<T> = std::result::Result<T, Error>;
