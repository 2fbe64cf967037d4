//! Error types for the engine.
//!
//! The taxonomy separates what the caller can do about a failure:
//! - **Capability** ([`EngineError::NoOutputDevice`], [`EngineError::NoInputDevice`]):
//!   the platform lacks the hardware or backend. Fatal to the requested
//!   operation; no retry will help.
//! - **Permission** ([`EngineError::PermissionDenied`]): the user or OS refused
//!   microphone capture. Recoverable - program-audio-only recording remains
//!   available and the caller may re-prompt.
//! - **Programmer error** ([`EngineError::InvalidState`]): the caller broke the
//!   documented state machine. Guarded loudly at the API boundary rather than
//!   papered over.
//! - **Encoder fault** ([`EngineError::Encoder`]): the recording could not be
//!   finalized. Accumulated chunks are discarded; no partial artifact is ever
//!   produced.
//!
//! The engine never retries anything internally; retry policy belongs to the
//! caller.

/// Errors returned by engine operations.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    /// No audio output device is available on this system.
    #[error("no audio output device available")]
    NoOutputDevice,

    /// No audio input device is available on this system.
    #[error("no audio input device available")]
    NoInputDevice,

    /// Permission to capture from the microphone was denied.
    ///
    /// Program-audio-only recording is still possible; the caller may offer
    /// a retry after the user changes their OS capture settings.
    #[error("microphone permission denied (check OS capture settings)")]
    PermissionDenied,

    /// An operation was called in a state the engine's contract forbids,
    /// e.g. starting a recording while one is active, or switching topology
    /// before `initialize`.
    #[error("invalid state: {0}")]
    InvalidState(&'static str),

    /// The recording encoder failed. The session's chunks are discarded.
    #[error("recording encoder failed: {0}")]
    Encoder(String),

    /// An error from the underlying audio backend (cpal).
    #[error("audio backend error: {0}")]
    Backend(String),
}

impl From<hound::Error> for EngineError {
    fn from(err: hound::Error) -> Self {
        EngineError::Encoder(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn invalid_state_display() {
        let err = EngineError::InvalidState("recording already in progress");
        assert_eq!(
            err.to_string(),
            "invalid state: recording already in progress"
        );
    }

    #[test]
    fn encoder_fault_wraps_hound() {
        let err: EngineError = hound::Error::Unsupported.into();
        assert!(matches!(err, EngineError::Encoder(_)));
    }
}
