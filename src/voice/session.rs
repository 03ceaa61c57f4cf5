//! Voice streaming session orchestrator.
//!
//! Drives one logical translation session end to end: negotiate
//! credentials, open the transport, pace audio chunks out while folding
//! transcript updates in, survive unexpected closes through bounded
//! reconnection with a fresh token, and resolve exactly once — either with
//! a [`VoiceSessionResult`] at `end_of_stream` or with a typed failure.
//!
//! ## Task model
//!
//! One `select!` loop owns the transport and the transcripts. The chunk
//! feed is polled in the same loop behind a state gate, so a chunk that
//! becomes ready while the connection is down simply waits for the
//! reconnect (or for termination) instead of racing it. The transport's
//! inbound pump is the only companion task.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;

use crate::error::{VoiceError, VoiceResult};

use super::chunk::ChunkPacer;
use super::protocol::{ClientMessage, ServerMessage, TranscriptUpdate};
use super::transcript::{TranscriptAccumulator, VoiceSessionResult};
use super::transport::{
    ConnectionCredential, SendStatus, StreamTransport, TransportConnector, TransportEvent,
    OUTBOUND_BUFFER_LIMIT,
};

/// Default bound on automatic reconnection attempts.
pub const DEFAULT_MAX_RECONNECT_ATTEMPTS: u32 = 3;

/// Most target languages accepted for one session.
pub const MAX_TARGET_LANGUAGES: usize = 5;

const MIN_BACKPRESSURE_DELAY: Duration = Duration::from_millis(50);

// ── Session data model ─────────────────────────────────────────────

/// One logical translation session, stable across reconnects. Immutable
/// once negotiated.
#[derive(Debug, Clone)]
pub struct VoiceSession {
    pub session_id: String,
    /// `None` while auto-detecting.
    pub source_language: Option<String>,
    /// Order defines result ordering.
    pub target_languages: Vec<String>,
    pub content_type: String,
}

/// Result of session negotiation: the session identity plus the first
/// one-shot connection credential.
#[derive(Debug, Clone)]
pub struct NegotiatedSession {
    pub session: VoiceSession,
    pub credential: ConnectionCredential,
}

/// Formality preference forwarded to the service.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Formality {
    More,
    Less,
}

impl Formality {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::More => "more",
            Self::Less => "less",
        }
    }
}

/// Bounded-retry configuration for automatic resumption after an
/// unexpected transport close.
#[derive(Debug, Clone, Copy)]
pub struct ReconnectPolicy {
    pub enabled: bool,
    pub max_attempts: u32,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            enabled: true,
            max_attempts: DEFAULT_MAX_RECONNECT_ATTEMPTS,
        }
    }
}

/// Caller-supplied options for one voice session.
#[derive(Debug, Clone)]
pub struct VoiceSessionOptions {
    /// `None` requests auto-detection.
    pub source_language: Option<String>,
    /// Detection mode hint, forwarded verbatim to negotiation.
    pub source_language_mode: Option<String>,
    pub target_languages: Vec<String>,
    pub content_type: String,
    pub formality: Option<Formality>,
    pub glossary_id: Option<String>,
    pub reconnect: ReconnectPolicy,
}

impl VoiceSessionOptions {
    pub fn validate(&self) -> VoiceResult<()> {
        if self.target_languages.is_empty() {
            return Err(VoiceError::Validation(
                "at least one target language is required".into(),
            ));
        }
        if self.target_languages.len() > MAX_TARGET_LANGUAGES {
            return Err(VoiceError::Validation(format!(
                "at most {MAX_TARGET_LANGUAGES} target languages are supported, got {}",
                self.target_languages.len()
            )));
        }
        if self.content_type.is_empty() {
            return Err(VoiceError::Validation(
                "a content type is required for the audio source".into(),
            ));
        }
        Ok(())
    }
}

// ── Collaborator seams ─────────────────────────────────────────────

/// The REST exchange that yields WebSocket credentials. Reconnection renews
/// against the most recent token, which the server may rotate on every
/// renewal.
#[async_trait]
pub trait SessionNegotiator: Send + Sync {
    async fn open_session(&self, options: &VoiceSessionOptions) -> VoiceResult<NegotiatedSession>;
    async fn renew_credential(&self, token: &str) -> VoiceResult<ConnectionCredential>;
}

/// Live-update observer. Errors are propagated to the session caller, never
/// swallowed. Callbacks receive read-only views and must not retain them.
pub trait VoiceObserver: Send {
    fn on_source_update(&mut self, update: &TranscriptUpdate) -> anyhow::Result<()> {
        let _ = update;
        Ok(())
    }
    fn on_target_update(&mut self, update: &TranscriptUpdate) -> anyhow::Result<()> {
        let _ = update;
        Ok(())
    }
    fn on_source_finished(&mut self) -> anyhow::Result<()> {
        Ok(())
    }
    fn on_target_finished(&mut self, language: &str) -> anyhow::Result<()> {
        let _ = language;
        Ok(())
    }
    fn on_reconnect(&mut self, attempt: u32) -> anyhow::Result<()> {
        let _ = attempt;
        Ok(())
    }
}

/// Observer that ignores every update.
pub struct NullObserver;

impl VoiceObserver for NullObserver {}

// ── Cancellation ───────────────────────────────────────────────────

/// Two-tier cancellation: `graceful` asks the session to send the
/// end-of-source-media marker and let the server flush final transcripts;
/// `hard` abandons the session immediately.
#[derive(Clone, Default)]
pub struct CancelSignal {
    pub graceful: CancellationToken,
    pub hard: CancellationToken,
}

// ── Stream state ───────────────────────────────────────────────────

/// Connection-level state machine, published through a watch channel so
/// state transitions are observable awaitable events rather than ad hoc
/// flags.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamState {
    Idle,
    Connecting,
    Open,
    Streaming,
    Reconnecting,
    Closed,
    Errored,
}

impl StreamState {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Closed | Self::Errored)
    }
}

// ── Orchestrator ───────────────────────────────────────────────────

enum Step {
    Inbound(TransportEvent),
    Chunk(Option<std::io::Result<Vec<u8>>>),
    GracefulStop,
    HardCancel,
}

pub struct VoiceStreamSession {
    negotiator: Arc<dyn SessionNegotiator>,
    connector: Arc<dyn TransportConnector>,
    options: VoiceSessionOptions,
    state_tx: watch::Sender<StreamState>,
}

impl VoiceStreamSession {
    /// Validates the options up front; only one session may own the
    /// transport at a time, which `run(self)` enforces by consuming the
    /// session.
    pub fn new(
        negotiator: Arc<dyn SessionNegotiator>,
        connector: Arc<dyn TransportConnector>,
        options: VoiceSessionOptions,
    ) -> VoiceResult<Self> {
        options.validate()?;
        let (state_tx, _) = watch::channel(StreamState::Idle);
        Ok(Self {
            negotiator,
            connector,
            options,
            state_tx,
        })
    }

    /// Subscribe to connection-state transitions.
    pub fn state(&self) -> watch::Receiver<StreamState> {
        self.state_tx.subscribe()
    }

    fn set_state(&self, state: StreamState) {
        self.state_tx.send_if_modified(|current| {
            if *current == state {
                return false;
            }
            tracing::debug!(from = ?current, to = ?state, "stream state transition");
            *current = state;
            true
        });
    }

    /// Run the session to completion. Resolves exactly once: with the final
    /// transcripts at `end_of_stream`, or with the first terminal failure.
    pub async fn run(
        self,
        mut pacer: ChunkPacer,
        observer: &mut dyn VoiceObserver,
        cancel: CancelSignal,
    ) -> VoiceResult<VoiceSessionResult> {
        self.set_state(StreamState::Connecting);
        let negotiated = self.negotiator.open_session(&self.options).await?;
        let session = negotiated.session;
        tracing::info!(
            session_id = %session.session_id,
            targets = session.target_languages.len(),
            content_type = %session.content_type,
            "voice session negotiated"
        );

        let mut accumulator = TranscriptAccumulator::new(
            session.source_language.as_deref(),
            &session.target_languages,
        );
        let mut current_token = negotiated.credential.token.clone();
        let mut attempts: u32 = 0;

        let mut transport = match self.connector.connect(&negotiated.credential).await {
            Ok(transport) => transport,
            Err(fatal @ VoiceError::InvalidStreamingUrl(_)) => {
                self.set_state(StreamState::Errored);
                return Err(fatal);
            }
            Err(e) => {
                tracing::warn!(error = %e, "initial connect failed");
                match self.reopen(&mut attempts, &mut current_token, observer).await {
                    Ok(transport) => transport,
                    Err(e) => {
                        self.set_state(StreamState::Errored);
                        return Err(e);
                    }
                }
            }
        };
        self.set_state(StreamState::Open);

        let backpressure_delay = pacer.interval().max(MIN_BACKPRESSURE_DELAY);
        let mut eos_due = false;
        let mut eos_sent = false;

        loop {
            let open_now = matches!(
                *self.state_tx.borrow(),
                StreamState::Open | StreamState::Streaming
            );
            let step = tokio::select! {
                event = transport.next_event() => Step::Inbound(event),
                chunk = pacer.next_chunk(), if !eos_due && open_now => Step::Chunk(chunk),
                _ = cancel.graceful.cancelled(), if !eos_due => Step::GracefulStop,
                _ = cancel.hard.cancelled() => Step::HardCancel,
            };

            match step {
                Step::Inbound(TransportEvent::Message(message)) => match message {
                    ServerMessage::SourceTranscriptUpdate(update) => {
                        accumulator.apply_source(&update);
                        observer
                            .on_source_update(&update)
                            .map_err(VoiceError::Observer)?;
                    }
                    ServerMessage::TargetTranscriptUpdate(update) => {
                        if accumulator.apply_target(&update) {
                            observer
                                .on_target_update(&update)
                                .map_err(VoiceError::Observer)?;
                        } else {
                            tracing::debug!(
                                language = update.language.as_deref().unwrap_or(""),
                                "ignoring update for language outside the negotiated targets"
                            );
                        }
                    }
                    ServerMessage::EndOfSourceTranscript {} => {
                        observer.on_source_finished().map_err(VoiceError::Observer)?;
                    }
                    ServerMessage::EndOfTargetTranscript { language } => {
                        observer
                            .on_target_finished(&language)
                            .map_err(VoiceError::Observer)?;
                    }
                    ServerMessage::EndOfStream {} => {
                        transport.close().await;
                        self.set_state(StreamState::Closed);
                        tracing::info!(session_id = %session.session_id, "voice stream finished");
                        return Ok(accumulator.finish(session.session_id));
                    }
                    ServerMessage::Error {
                        error_code,
                        reason_code,
                        error_message,
                        ..
                    } => {
                        transport.close().await;
                        self.set_state(StreamState::Errored);
                        return Err(VoiceError::Stream {
                            code: error_code
                                .or(reason_code)
                                .unwrap_or_else(|| "unknown".into()),
                            message: error_message
                                .unwrap_or_else(|| "server reported an error".into()),
                        });
                    }
                },
                Step::Inbound(TransportEvent::Closed) => {
                    tracing::warn!(
                        session_id = %session.session_id,
                        "streaming connection closed without a terminal message"
                    );
                    transport = match self
                        .reopen(&mut attempts, &mut current_token, observer)
                        .await
                    {
                        Ok(transport) => transport,
                        Err(e) => {
                            self.set_state(StreamState::Errored);
                            return Err(e);
                        }
                    };
                    // The fresh connection has not seen the end marker.
                    eos_sent = false;
                }
                Step::Chunk(Some(Ok(bytes))) => {
                    match transport.send(&ClientMessage::media_chunk(&bytes)).await {
                        SendStatus::Sent { buffered_bytes } => {
                            self.set_state(StreamState::Streaming);
                            if buffered_bytes > OUTBOUND_BUFFER_LIMIT {
                                tracing::debug!(
                                    buffered_bytes,
                                    "outbound buffer over limit, deferring next chunk"
                                );
                                pacer.defer(backpressure_delay);
                            }
                        }
                        // A chunk in transit at disconnect time is lost, not
                        // retried. The Closed event follows shortly.
                        SendStatus::NotOpen => {
                            tracing::debug!("transport not open, audio chunk dropped");
                        }
                    }
                }
                Step::Chunk(Some(Err(e))) => {
                    transport.close().await;
                    self.set_state(StreamState::Errored);
                    return Err(e.into());
                }
                Step::Chunk(None) => {
                    tracing::debug!(session_id = %session.session_id, "audio source exhausted");
                    eos_due = true;
                }
                Step::GracefulStop => {
                    tracing::info!(
                        session_id = %session.session_id,
                        "graceful stop requested, ending source media"
                    );
                    eos_due = true;
                }
                Step::HardCancel => {
                    transport.close().await;
                    self.set_state(StreamState::Closed);
                    return Err(VoiceError::Cancelled);
                }
            }

            if eos_due && !eos_sent {
                if let SendStatus::Sent { .. } =
                    transport.send(&ClientMessage::EndOfSourceMedia {}).await
                {
                    eos_sent = true;
                }
            }
        }
    }

    /// Bounded reconnection: renew the credential against the current
    /// (possibly rotated) token and open a fresh transport. A failed
    /// WebSocket connect consumes an attempt; a rejected URL is fatal.
    async fn reopen(
        &self,
        attempts: &mut u32,
        current_token: &mut String,
        observer: &mut dyn VoiceObserver,
    ) -> VoiceResult<Box<dyn StreamTransport>> {
        loop {
            if !self.options.reconnect.enabled || *attempts >= self.options.reconnect.max_attempts {
                return Err(VoiceError::UnexpectedClose {
                    attempts: *attempts,
                });
            }
            *attempts += 1;
            self.set_state(StreamState::Reconnecting);
            observer
                .on_reconnect(*attempts)
                .map_err(VoiceError::Observer)?;
            tracing::info!(
                attempt = *attempts,
                max = self.options.reconnect.max_attempts,
                "reconnecting voice stream"
            );

            let credential = self.negotiator.renew_credential(current_token).await?;
            *current_token = credential.token.clone();

            match self.connector.connect(&credential).await {
                Ok(transport) => {
                    self.set_state(StreamState::Open);
                    return Ok(transport);
                }
                Err(fatal @ VoiceError::InvalidStreamingUrl(_)) => return Err(fatal),
                Err(e) => {
                    tracing::warn!(attempt = *attempts, error = %e, "reconnect attempt failed");
                }
            }
        }
    }
}

// ── Tests ──────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn options(targets: &[&str]) -> VoiceSessionOptions {
        VoiceSessionOptions {
            source_language: Some("en".into()),
            source_language_mode: None,
            target_languages: targets.iter().map(|s| s.to_string()).collect(),
            content_type: "audio/wav".into(),
            formality: None,
            glossary_id: None,
            reconnect: ReconnectPolicy::default(),
        }
    }

    #[test]
    fn rejects_zero_target_languages() {
        assert!(matches!(
            options(&[]).validate(),
            Err(VoiceError::Validation(_))
        ));
    }

    #[test]
    fn rejects_six_target_languages() {
        let opts = options(&["de", "fr", "es", "it", "nl", "pl"]);
        assert!(matches!(opts.validate(), Err(VoiceError::Validation(_))));
    }

    #[test]
    fn accepts_one_through_five_targets() {
        let all = ["de", "fr", "es", "it", "nl"];
        for n in 1..=5 {
            assert!(options(&all[..n]).validate().is_ok());
        }
    }

    #[test]
    fn rejects_missing_content_type() {
        let mut opts = options(&["de"]);
        opts.content_type.clear();
        assert!(matches!(opts.validate(), Err(VoiceError::Validation(_))));
    }

    #[test]
    fn reconnect_policy_defaults() {
        let policy = ReconnectPolicy::default();
        assert!(policy.enabled);
        assert_eq!(policy.max_attempts, 3);
    }

    #[test]
    fn terminal_states() {
        assert!(StreamState::Closed.is_terminal());
        assert!(StreamState::Errored.is_terminal());
        assert!(!StreamState::Reconnecting.is_terminal());
        assert!(!StreamState::Streaming.is_terminal());
    }
}
