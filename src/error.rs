//! Error types for the voice streaming core.
//!
//! REST glue and the CLI layer use `anyhow`; the streaming session exposes a
//! closed taxonomy so callers can distinguish a server-reported protocol
//! error from an exhausted reconnect or a rejected URL.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum VoiceError {
    /// Bad session options (target language count, missing content type, ...).
    #[error("invalid session options: {0}")]
    Validation(String),

    /// Streaming URL failed scheme/host validation or did not parse.
    /// Never retried.
    #[error("invalid streaming URL: {0}")]
    InvalidStreamingUrl(String),

    /// The REST negotiation call failed (create or renew).
    #[error("session negotiation failed: {0}")]
    Negotiation(String),

    /// Server-reported in-band protocol error.
    #[error("voice stream error ({code}): {message}")]
    Stream { code: String, message: String },

    /// Transport closed without a terminal message and reconnection was
    /// disabled or exhausted.
    #[error("connection closed unexpectedly after {attempts} reconnect attempt(s)")]
    UnexpectedClose { attempts: u32 },

    /// Audio source read failure.
    #[error("audio source error: {0}")]
    Io(#[from] std::io::Error),

    /// The caller hard-cancelled the session.
    #[error("session cancelled")]
    Cancelled,

    /// A caller-supplied observer callback failed. Propagated rather than
    /// swallowed so display-logic bugs surface.
    #[error("observer callback failed: {0}")]
    Observer(anyhow::Error),
}

pub type VoiceResult<T> = std::result::Result<T, VoiceError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stream_error_display_includes_code() {
        let err = VoiceError::Stream {
            code: "quota_exceeded".into(),
            message: "plan limit reached".into(),
        };
        let text = err.to_string();
        assert!(text.contains("quota_exceeded"));
        assert!(text.contains("plan limit reached"));
    }

    #[test]
    fn unexpected_close_reports_attempts() {
        let err = VoiceError::UnexpectedClose { attempts: 3 };
        assert!(err.to_string().contains('3'));
    }

    #[test]
    fn io_error_converts() {
        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "no such file");
        let err: VoiceError = io.into();
        assert!(matches!(err, VoiceError::Io(_)));
    }
}
