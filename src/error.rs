//! Error types for the relay.

/// Error from handling one operator command.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Database error: {0}")]
    Database(#[from] DatabaseError),

    #[error("Channel error: {0}")]
    Channel(#[from] ChannelError),

    #[error("Identity error: {0}")]
    Identity(#[from] IdentityError),
}

/// Configuration-related errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingEnvVar(String),

    #[error("Invalid configuration value for {key}: {message}")]
    InvalidValue { key: String, message: String },
}

/// Store-related errors.
#[derive(Debug, thiserror::Error)]
pub enum DatabaseError {
    #[error("Connection pool error: {0}")]
    Pool(String),

    #[error("Query failed: {0}")]
    Query(String),

    #[error("Migration failed: {0}")]
    Migration(String),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

/// Channel client errors.
#[derive(Debug, thiserror::Error)]
pub enum ChannelError {
    #[error("Channel {name} failed to start: {reason}")]
    StartupFailed { name: String, reason: String },

    #[error("Failed to send message on channel {name}: {reason}")]
    SendFailed { name: String, reason: String },
}

/// Identity store errors.
#[derive(Debug, thiserror::Error)]
pub enum IdentityError {
    #[error("Could not mint a unique anonymized ID after {attempts} attempts")]
    Exhausted { attempts: u32 },

    #[error("Stored address could not be parsed: {0}")]
    InvalidAddress(String),

    #[error("Database error: {0}")]
    Database(#[from] DatabaseError),
}

/// Wire-level errors on the inbound command stream.
#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    #[error("Stream entry is missing field `{0}`")]
    MissingField(&'static str),

    #[error("Stream entry has a non-numeric timestamp: {0:?}")]
    InvalidTimestamp(String),
}

/// Relay consumer/dispatcher errors.
#[derive(Debug, thiserror::Error)]
pub enum RelayError {
    #[error("Malformed command on stream {stream} (entry {entry_id}): {source}")]
    Protocol {
        stream: String,
        entry_id: i64,
        #[source]
        source: ProtocolError,
    },

    #[error("Database error: {0}")]
    Database(#[from] DatabaseError),

    #[error("Delivery channel closed")]
    DeliveryClosed,
}
