/// Result alias that carries the custom [`MetronomeError`] type.
pub type Result<T> = std::result::Result<T, MetronomeError>;

/// Common error type for the core crate.
///
/// None of these are fatal to a running engine: rejected requests leave the
/// previous state in place and the clock keeps ticking.
#[derive(Debug, thiserror::Error)]
pub enum MetronomeError {
    /// Requested tempo lies outside the configured bounds (or is zero).
    #[error("tempo {bpm} bpm is outside the accepted range {min}..={max}")]
    InvalidTempo { bpm: i64, min: u32, max: u32 },
    /// Resulting meter would fall outside the configured bounds.
    #[error("meter {requested} is outside the accepted range {min}..={max}")]
    InvalidMeter { requested: i64, min: usize, max: usize },
    /// Averaged tap interval came out as zero, so no tempo can be derived.
    #[error("tap interval averaged to zero; tempo left unchanged")]
    DegenerateTapInterval,
    /// A sound collaborator could not play.
    #[error("audio unavailable: {0}")]
    AudioUnavailable(String),
    /// Beat position does not exist in the current measure.
    #[error("beat {position} does not exist in a measure of {meter}")]
    BeatOutOfRange { position: usize, meter: usize },
    /// Malformed configuration document.
    #[error("invalid configuration: {0}")]
    Config(#[from] serde_json::Error),
    /// Free-form error for conditions without a dedicated variant.
    #[error("{0}")]
    Message(String),
    /// Wrapper around standard IO errors.
    #[error("{0}")]
    Io(#[from] std::io::Error),
}

impl MetronomeError {
    /// Creates a new error that simply wraps the provided message.
    pub fn msg<T: Into<String>>(msg: T) -> Self {
        Self::Message(msg.into())
    }
}

impl From<&str> for MetronomeError {
    fn from(value: &str) -> Self {
        Self::msg(value)
    }
}

impl From<String> for MetronomeError {
    fn from(value: String) -> Self {
        Self::Message(value)
    }
}
