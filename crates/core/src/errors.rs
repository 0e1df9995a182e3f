use thiserror::Error;

/// Session store failures. Reads degrade to "not in flow"; writes surface
/// through `EngineError` so the caller can apologize without touching the
/// stored session.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum SessionStoreError {
    #[error("session store backend failure: {0}")]
    Backend(String),
    #[error("session payload could not be decoded: {0}")]
    Decode(String),
}

/// Failure of a single price/discount source. The resolver maps every
/// variant to "unavailable" and falls through to the next source.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum SourceError {
    #[error("source `{origin}` unreachable: {detail}")]
    Unreachable { origin: &'static str, detail: String },
    #[error("source `{origin}` timed out")]
    Timeout { origin: &'static str },
    #[error("source `{origin}` returned malformed data: {detail}")]
    Malformed { origin: &'static str, detail: String },
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum EngineError {
    #[error(transparent)]
    Store(#[from] SessionStoreError),
}

impl EngineError {
    /// One generic apology for any unclassified failure; the session is left
    /// untouched so the same input can be retried.
    pub fn user_message(&self) -> &'static str {
        "Sorry, something went wrong on our side. Please try that again."
    }
}
