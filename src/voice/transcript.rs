//! Transcript state and the concluded-segment fold.
//!
//! One [`Transcript`] exists for the source language and one per requested
//! target language; all are created empty at session start and mutated in
//! place as concluded updates arrive. The fold is pure so it can be tested
//! without a transport.

use serde::Serialize;

use super::protocol::{TranscriptSegment, TranscriptUpdate};

/// Accumulated transcript for one language.
#[derive(Debug, Clone, Serialize)]
pub struct Transcript {
    /// For the source transcript this is the most recently detected (or
    /// fixed) language; empty until the first report in auto-detect mode.
    pub language: String,
    pub segments: Vec<TranscriptSegment>,
    /// Space-joined concatenation of concluded segment texts, in arrival
    /// order. Tentative text never lands here.
    pub text: String,
}

impl Transcript {
    pub fn empty(language: impl Into<String>) -> Self {
        Self {
            language: language.into(),
            segments: Vec::new(),
            text: String::new(),
        }
    }
}

/// Append newly concluded segments to `transcript` and return the updated
/// joined text. Append-only: arrival order is preserved, nothing is
/// deduplicated.
pub fn append_concluded<'a>(
    transcript: &'a mut Transcript,
    batch: &[TranscriptSegment],
) -> &'a str {
    for segment in batch {
        if !transcript.text.is_empty() {
            transcript.text.push(' ');
        }
        transcript.text.push_str(&segment.text);
        transcript.segments.push(segment.clone());
    }
    &transcript.text
}

/// The successful return value of a voice session, constructed exactly once
/// at `end_of_stream`.
#[derive(Debug, Clone, Serialize)]
pub struct VoiceSessionResult {
    pub session_id: String,
    pub source: Transcript,
    /// Ordered as in the originally requested target list.
    pub targets: Vec<Transcript>,
}

// ── Accumulator ────────────────────────────────────────────────────

/// Per-session transcript state: the source transcript plus one transcript
/// per negotiated target language.
pub struct TranscriptAccumulator {
    source: Transcript,
    targets: Vec<Transcript>,
}

impl TranscriptAccumulator {
    /// `source_language` is `None` for auto-detect; target order defines
    /// result ordering.
    pub fn new(source_language: Option<&str>, target_languages: &[String]) -> Self {
        Self {
            source: Transcript::empty(source_language.unwrap_or_default()),
            targets: target_languages
                .iter()
                .map(|lang| Transcript::empty(lang.clone()))
                .collect(),
        }
    }

    /// Fold a source update. The detected language follows the most recent
    /// report; already-accumulated segments are retained regardless of
    /// language changes.
    pub fn apply_source(&mut self, update: &TranscriptUpdate) {
        if let Some(language) = &update.language {
            self.source.language = language.clone();
        }
        append_concluded(&mut self.source, &update.concluded);
    }

    /// Fold a target update. Returns `false` when the update names a
    /// language outside the negotiated target list — such updates are
    /// ignored, guarding against server/client drift.
    pub fn apply_target(&mut self, update: &TranscriptUpdate) -> bool {
        let Some(language) = &update.language else {
            return false;
        };
        let Some(transcript) = self
            .targets
            .iter_mut()
            .find(|t| &t.language == language)
        else {
            return false;
        };
        append_concluded(transcript, &update.concluded);
        true
    }

    pub fn source(&self) -> &Transcript {
        &self.source
    }

    pub fn targets(&self) -> &[Transcript] {
        &self.targets
    }

    /// Consume the accumulator into the final session result.
    pub fn finish(self, session_id: String) -> VoiceSessionResult {
        VoiceSessionResult {
            session_id,
            source: self.source,
            targets: self.targets,
        }
    }
}

// ── Tests ──────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn segment(text: &str) -> TranscriptSegment {
        TranscriptSegment {
            text: text.into(),
            start_time: 0.0,
            end_time: 1.0,
            language: None,
        }
    }

    fn concluded_update(language: Option<&str>, texts: &[&str]) -> TranscriptUpdate {
        TranscriptUpdate {
            language: language.map(String::from),
            concluded: texts.iter().map(|t| segment(t)).collect(),
            tentative: Vec::new(),
        }
    }

    #[test]
    fn initializes_one_transcript_per_target_plus_source() {
        for n in 1..=5usize {
            let targets: Vec<String> = (0..n).map(|i| format!("l{i}")).collect();
            let acc = TranscriptAccumulator::new(Some("en"), &targets);
            assert_eq!(acc.targets().len(), n);
            assert!(acc.source().text.is_empty());
            assert!(acc.source().segments.is_empty());
            assert!(acc
                .targets()
                .iter()
                .all(|t| t.text.is_empty() && t.segments.is_empty()));
        }
    }

    #[test]
    fn join_is_order_sensitive() {
        let mut a = Transcript::empty("en");
        append_concluded(&mut a, &[segment("one"), segment("two"), segment("three")]);
        assert_eq!(a.text, "one two three");

        let mut b = Transcript::empty("en");
        append_concluded(&mut b, &[segment("three"), segment("two"), segment("one")]);
        assert_ne!(a.text, b.text);
    }

    #[test]
    fn repeated_segments_are_not_deduplicated() {
        let mut t = Transcript::empty("en");
        append_concluded(&mut t, &[segment("again"), segment("again")]);
        assert_eq!(t.text, "again again");
        assert_eq!(t.segments.len(), 2);
    }

    #[test]
    fn tentative_text_never_persists() {
        let mut acc = TranscriptAccumulator::new(Some("en"), &["de".into()]);
        let update = TranscriptUpdate {
            language: Some("en".into()),
            concluded: vec![segment("kept")],
            tentative: vec![segment("provisional")],
        };
        acc.apply_source(&update);
        assert_eq!(acc.source().text, "kept");
        assert!(!acc.source().text.contains("provisional"));
    }

    #[test]
    fn unknown_target_language_is_ignored() {
        let mut acc = TranscriptAccumulator::new(Some("en"), &["de".into(), "fr".into()]);
        assert!(!acc.apply_target(&concluded_update(Some("ja"), &["drift"])));
        assert!(acc.targets().iter().all(|t| t.text.is_empty()));

        assert!(acc.apply_target(&concluded_update(Some("fr"), &["bonjour"])));
        assert_eq!(acc.targets()[1].text, "bonjour");
    }

    #[test]
    fn detected_language_follows_latest_report_and_keeps_segments() {
        let mut acc = TranscriptAccumulator::new(None, &["de".into()]);
        assert_eq!(acc.source().language, "");

        acc.apply_source(&concluded_update(Some("en"), &["hello"]));
        acc.apply_source(&concluded_update(Some("nl"), &["hallo"]));
        assert_eq!(acc.source().language, "nl");
        assert_eq!(acc.source().text, "hello hallo");
        assert_eq!(acc.source().segments.len(), 2);
    }

    #[test]
    fn finish_preserves_target_order() {
        let mut acc = TranscriptAccumulator::new(Some("en"), &["de".into(), "fr".into()]);
        acc.apply_target(&concluded_update(Some("fr"), &["salut"]));
        let result = acc.finish("session-1".into());
        assert_eq!(result.session_id, "session-1");
        assert_eq!(result.targets[0].language, "de");
        assert_eq!(result.targets[1].language, "fr");
        assert_eq!(result.targets[1].text, "salut");
    }
}
