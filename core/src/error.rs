use thiserror::Error;

#[derive(Error, Debug)]
pub enum SimError {
    /// Bad or missing catalog reference. Fatal at startup.
    #[error("Configuration error: {reason}")]
    Configuration { reason: String },

    /// A random choice was requested over no candidates.
    #[error("Empty input: {context}")]
    EmptyInput { context: String },

    /// Negative or non-finite time advance on the tick loop.
    #[error("Invalid advance: cannot advance by {elapsed}")]
    InvalidAdvance { elapsed: f64 },

    #[error(transparent)]
    SaveGame(#[from] SaveGameError),

    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl SimError {
    pub fn config(reason: impl Into<String>) -> Self {
        Self::Configuration { reason: reason.into() }
    }
}

pub type SimResult<T> = Result<T, SimError>;

/// Everything that can go wrong reading or writing a savegame.
/// Callers treat any variant as "no usable save".
#[derive(Error, Debug)]
pub enum SaveGameError {
    #[error("Failed to access savegame at {path}")]
    Io {
        path:   String,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to decompress savegame payload")]
    Decompress(#[source] std::io::Error),

    #[error("Failed to encode savegame payload")]
    Encode(#[source] std::io::Error),

    #[error("Failed to decode savegame JSON payload")]
    Parse(#[source] serde_json::Error),

    #[error("Savegame JSON must decode into an object")]
    NotAnObject,

    #[error("Savegame payload is missing a valid version field")]
    MissingVersion,

    #[error("Unsupported savegame version: {0}")]
    UnsupportedVersion(u64),

    #[error("Savegame migration from version {from} to {to} failed: {reason}")]
    Migration { from: u32, to: u32, reason: String },

    #[error("Savegame payload failed validation")]
    Schema(#[source] serde_json::Error),

    #[error("Savegame invariant violated on {field}: {reason}")]
    Invariant { field: String, reason: String },
}
