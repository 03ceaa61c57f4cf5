//! Result printing and the live observer used by the `voice` command.

use crate::api::TextTranslation;
use crate::voice::{TranscriptUpdate, VoiceObserver, VoiceSessionResult};

/// Prints concluded transcript lines as they arrive. Tentative text is
/// intentionally not rendered.
pub struct LivePrinter;

impl VoiceObserver for LivePrinter {
    fn on_source_update(&mut self, update: &TranscriptUpdate) -> anyhow::Result<()> {
        let language = update.language.as_deref().unwrap_or("src");
        for segment in &update.concluded {
            println!("[{language}] {}", segment.text);
        }
        Ok(())
    }

    fn on_target_update(&mut self, update: &TranscriptUpdate) -> anyhow::Result<()> {
        let language = update.language.as_deref().unwrap_or("?");
        for segment in &update.concluded {
            println!("[->{language}] {}", segment.text);
        }
        Ok(())
    }

    fn on_reconnect(&mut self, attempt: u32) -> anyhow::Result<()> {
        eprintln!("connection lost, reconnecting (attempt {attempt})...");
        Ok(())
    }
}

pub fn print_voice_result(result: &VoiceSessionResult, json: bool) -> anyhow::Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(result)?);
        return Ok(());
    }
    println!();
    println!("session {}", result.session_id);
    let source_language = if result.source.language.is_empty() {
        "source"
    } else {
        &result.source.language
    };
    println!("{source_language}: {}", result.source.text);
    for target in &result.targets {
        println!("{}: {}", target.language, target.text);
    }
    Ok(())
}

pub fn print_translations(translations: &[TextTranslation]) {
    for translation in translations {
        match &translation.detected_source_language {
            Some(language) => println!("[{language}] {}", translation.text),
            None => println!("{}", translation.text),
        }
    }
}
