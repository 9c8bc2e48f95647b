use std::path::PathBuf;

/// Crate-level error.
#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error(transparent)]
    Parse(#[from] ParseError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// The Markdown walk was aborted. Nothing from the partial tree survives.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
#[error("parse failed at event {event_index}: {message}")]
pub struct ParseError {
    pub message: String,
    /// Index of the tokenizer event that was being handled.
    pub event_index: usize,
}

impl ParseError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            event_index: 0,
        }
    }

    pub fn at(mut self, event_index: usize) -> Self {
        self.event_index = event_index;
        self
    }
}

#[derive(thiserror::Error, Debug)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid config: {0}")]
    Toml(#[from] toml::de::Error),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
