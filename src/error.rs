//! Error handling for texbake
//!
//! This module defines the crate-level error type and a Result alias used
//! by everything outside the graph layer. Graph-level failures have their
//! own types in [`crate::graph::error`] and convert into [`BakeError`].

use crate::graph::{CompileError, GraphError};
use thiserror::Error;

/// Main error type for texbake operations
#[derive(Error, Debug)]
pub enum BakeError {
    /// Errors related to configuration loading/saving
    #[error("Configuration error: {0}")]
    Config(String),

    /// A preset descriptor failed to load or validate
    #[error("Preset error: {0}")]
    Preset(String),

    /// Structural graph errors (bad links, unknown nodes)
    #[error("Graph error: {0}")]
    Graph(#[from] GraphError),

    /// Errors raised while flattening one output root
    #[error("Compile error: {0}")]
    Compile(#[from] CompileError),

    /// A referenced object, material, image or preset is absent
    #[error("Missing {kind}: {name}")]
    MissingResource { kind: &'static str, name: String },

    /// Worker process launch or protocol failures
    #[error("Worker error: {0}")]
    Worker(String),

    /// Shared buffer allocation/attachment failures
    #[error("Shared buffer error: {0}")]
    SharedBuffer(String),

    /// Errors related to channel communication
    #[error("Channel error: {0}")]
    Channel(String),

    /// Image encoding/decoding errors
    #[error("Image error: {0}")]
    Image(#[from] image::ImageError),

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization errors
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Generic errors with context
    #[error("{context}: {source}")]
    WithContext {
        context: String,
        #[source]
        source: Box<BakeError>,
    },
}

impl BakeError {
    /// Add context to an error
    pub fn with_context(self, context: impl Into<String>) -> Self {
        BakeError::WithContext {
            context: context.into(),
            source: Box::new(self),
        }
    }

    /// Shorthand for a [`BakeError::MissingResource`]
    pub fn missing(kind: &'static str, name: impl Into<String>) -> Self {
        BakeError::MissingResource {
            kind,
            name: name.into(),
        }
    }
}

impl From<serde_json::Error> for BakeError {
    fn from(err: serde_json::Error) -> Self {
        BakeError::Serialization(err.to_string())
    }
}

/// Result type alias for texbake operations
pub type Result<T> = std::result::Result<T, BakeError>;

/// Extension trait for adding context to Results
pub trait ResultExt<T> {
    /// Add context to an error result
    fn context(self, context: impl Into<String>) -> Result<T>;

    /// Add context lazily to an error result
    fn with_context<F>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> String;
}

impl<T> ResultExt<T> for Result<T> {
    fn context(self, context: impl Into<String>) -> Result<T> {
        self.map_err(|e| e.with_context(context))
    }

    fn with_context<F>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> String,
    {
        self.map_err(|e| e.with_context(f()))
    }
}

impl<T> ResultExt<T> for std::result::Result<T, std::io::Error> {
    fn context(self, context: impl Into<String>) -> Result<T> {
        self.map_err(|e| BakeError::Io(e).with_context(context))
    }

    fn with_context<F>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> String,
    {
        self.map_err(|e| BakeError::Io(e).with_context(f()))
    }
}
