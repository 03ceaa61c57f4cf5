//! Real-time speech translation over a streaming WebSocket.
//!
//! The heart of the client: turns a local audio source into a live
//! bidirectional stream, reconciles incremental transcript updates,
//! survives mid-stream disconnects via bounded reconnection with a fresh
//! token, and produces a deterministic final transcript.
//!
//! ## Layout
//! - [`chunk`] — audio chunking and real-time pacing
//! - [`protocol`] — the tagged-JSON wire messages, as closed enums
//! - [`transport`] — one WebSocket connection (validation, pump, backpressure)
//! - [`transcript`] — append-only transcript folding
//! - [`session`] — the orchestrator tying it all together

pub mod chunk;
pub mod protocol;
pub mod session;
pub mod transcript;
pub mod transport;

pub use chunk::{AudioChunkSource, ChunkPacer, DEFAULT_CHUNK_INTERVAL, DEFAULT_CHUNK_SIZE};
pub use protocol::{ClientMessage, ServerMessage, TranscriptSegment, TranscriptUpdate};
pub use session::{
    CancelSignal, Formality, NegotiatedSession, NullObserver, ReconnectPolicy, SessionNegotiator,
    StreamState, VoiceObserver, VoiceSession, VoiceSessionOptions, VoiceStreamSession,
    DEFAULT_MAX_RECONNECT_ATTEMPTS, MAX_TARGET_LANGUAGES,
};
pub use transcript::{Transcript, TranscriptAccumulator, VoiceSessionResult};
pub use transport::{
    ConnectionCredential, SendStatus, StreamTransport, TransportConnector, TransportEvent,
    WsConnector, OUTBOUND_BUFFER_LIMIT, TRUSTED_STREAMING_DOMAIN,
};
