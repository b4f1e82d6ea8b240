use thiserror::Error;

/// The error taxonomy surfaced by the driver, the wrapper, and the reference
/// backend/cache implementations.
#[derive(Debug, Error, Clone)]
pub enum Error {
    /// No cache context active when the driver entered CAPTURING, no backend
    /// attached, or a driver reused after reaching DONE.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// A user-supplied callback violated its contract (unhashable batch key,
    /// a batcher that dropped or duplicated an argument, and so on).
    #[error("contract violation: {0}")]
    Contract(String),

    /// Raised by a backend's `submit` or `prune`; aborts the current run.
    #[error("backend error: {0}")]
    Backend(String),

    /// A call issued during REPLAYING has no corresponding cache entry,
    /// meaning the two executions of the driven body did not issue the same
    /// sequence of calls.
    #[error("capture/replay determinism violation for `{identity}`: {reason}")]
    CaptureDeterminism { identity: String, reason: String },

    /// Failure (de)serializing call arguments or cached return values.
    #[error("serialization error: {0}")]
    Serialization(String),
}

impl Error {
    pub fn configuration(msg: impl Into<String>) -> Self {
        Error::Configuration(msg.into())
    }

    pub fn contract(msg: impl Into<String>) -> Self {
        Error::Contract(msg.into())
    }

    pub fn backend(msg: impl Into<String>) -> Self {
        Error::Backend(msg.into())
    }

    pub fn capture_determinism(identity: impl Into<String>, reason: impl Into<String>) -> Self {
        Error::CaptureDeterminism {
            identity: identity.into(),
            reason: reason.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
